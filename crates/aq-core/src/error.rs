//! Public error codes and warnings.
//!
//! Every fallible public operation ultimately reports one of these numeric
//! codes. Codes below 100 are warnings (non-fatal), 100-199 are system
//! errors, 200-299 input/argument errors, 300-399 file errors. Crate-level
//! error enums carry richer context and map onto a `Code` at the facade
//! boundary.

use thiserror::Error;

pub type CoreResult<T> = Result<T, Code>;

/// Numeric public error codes.
///
/// Discriminants are the wire-level code values and must not change.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Code {
    #[error("insufficient memory available")]
    OutOfMemory = 101,
    #[error("no network data available")]
    NotOpen = 102,
    #[error("hydraulics not initialized")]
    HydNotOpen = 103,
    #[error("no hydraulics for water quality analysis")]
    NoHydResults = 104,
    #[error("water quality not initialized")]
    QualNotOpen = 105,
    #[error("no results saved to report on")]
    NoQualResults = 106,
    #[error("hydraulics supplied from external file")]
    HydFileInUse = 107,
    #[error("cannot use external file while hydraulics solver is active")]
    HydOpenWhenUsingFile = 108,
    #[error("cannot solve network hydraulic equations")]
    EquationsUnsolvable = 110,

    #[error("syntax error")]
    SyntaxError = 201,
    #[error("illegal numeric value")]
    BadValue = 202,
    #[error("undefined node")]
    UndefinedNode = 203,
    #[error("undefined link")]
    UndefinedLink = 204,
    #[error("undefined time pattern")]
    UndefinedPattern = 205,
    #[error("undefined curve")]
    UndefinedCurve = 206,
    #[error("attempt to control a check valve pipe")]
    ControlOnCheckValve = 207,
    #[error("invalid ID name")]
    InvalidId = 209,
    #[error("duplicate ID name")]
    DuplicateId = 215,
    #[error("invalid pump data")]
    InvalidPumpData = 217,
    #[error("illegal valve connection to tank node")]
    ValveTankConnection = 219,
    #[error("illegal valve connection to another valve")]
    ValveValveConnection = 220,
    #[error("mis-placed rule clause")]
    MisplacedRuleClause = 221,
    #[error("link assigned same start and end nodes")]
    SameStartEndNodes = 222,
    #[error("not enough nodes in network")]
    TooFewNodes = 223,
    #[error("no tanks or reservoirs in network")]
    NoTanksOrReservoirs = 224,
    #[error("invalid lower/upper levels for tank")]
    InvalidTankLevels = 225,
    #[error("no head curve or power rating for pump")]
    NoPumpCurve = 226,
    #[error("invalid head curve for pump")]
    InvalidPumpCurve = 227,
    #[error("nonincreasing x-values for curve")]
    CurveNotIncreasing = 230,
    #[error("no water quality source at node")]
    NoSourceAtNode = 240,
    #[error("undefined control")]
    UndefinedControl = 241,
    #[error("function call contains invalid format")]
    InvalidFormat = 250,
    #[error("function call contains code out of range")]
    CodeOutOfRange = 251,
    #[error("undefined demand category")]
    UndefinedDemand = 253,
    #[error("node has no coordinates")]
    NoCoordinates = 254,
    #[error("invalid coordinates")]
    InvalidCoordinates = 255,
    #[error("undefined rule")]
    UndefinedRule = 257,
    #[error("undefined rule clause")]
    UndefinedRuleClause = 258,
    #[error("cannot delete node that traces water quality")]
    TraceNodeUndeletable = 260,
    #[error("cannot delete element referenced by controls or rules")]
    ControlledElementUndeletable = 261,
    #[error("pump has no efficiency curve")]
    NoEfficiencyCurve = 268,

    #[error("identical file names")]
    SameFileNames = 301,
    #[error("cannot open input file")]
    InputFileOpen = 302,
    #[error("cannot open report file")]
    ReportFileOpen = 303,
    #[error("cannot open output file")]
    OutputFileOpen = 304,
    #[error("cannot open hydraulics file")]
    HydFileOpen = 305,
    #[error("hydraulics file does not match network data")]
    HydFileMismatch = 306,
    #[error("cannot write to report file")]
    ReportFileWrite = 309,
}

impl Code {
    /// The numeric public code.
    pub fn value(self) -> u16 {
        self as u16
    }

    /// Look up a code from its numeric value.
    pub fn from_value(v: u16) -> Option<Code> {
        use Code::*;
        let all = [
            OutOfMemory,
            NotOpen,
            HydNotOpen,
            NoHydResults,
            QualNotOpen,
            NoQualResults,
            HydFileInUse,
            HydOpenWhenUsingFile,
            EquationsUnsolvable,
            SyntaxError,
            BadValue,
            UndefinedNode,
            UndefinedLink,
            UndefinedPattern,
            UndefinedCurve,
            ControlOnCheckValve,
            InvalidId,
            DuplicateId,
            InvalidPumpData,
            ValveTankConnection,
            ValveValveConnection,
            MisplacedRuleClause,
            SameStartEndNodes,
            TooFewNodes,
            NoTanksOrReservoirs,
            InvalidTankLevels,
            NoPumpCurve,
            InvalidPumpCurve,
            CurveNotIncreasing,
            NoSourceAtNode,
            UndefinedControl,
            InvalidFormat,
            CodeOutOfRange,
            UndefinedDemand,
            NoCoordinates,
            InvalidCoordinates,
            UndefinedRule,
            UndefinedRuleClause,
            TraceNodeUndeletable,
            ControlledElementUndeletable,
            NoEfficiencyCurve,
            SameFileNames,
            InputFileOpen,
            ReportFileOpen,
            OutputFileOpen,
            HydFileOpen,
            HydFileMismatch,
            ReportFileWrite,
        ];
        all.into_iter().find(|c| c.value() == v)
    }
}

/// Solver warnings (codes 1-6). Recorded on the project, never fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Warn {
    #[error("system hydraulically unbalanced - convergence not achieved")]
    Unbalanced = 1,
    #[error("system may be hydraulically unstable")]
    Unstable = 2,
    #[error("system disconnected - one or more nodes unreachable")]
    Disconnected = 3,
    #[error("pumps cannot deliver enough flow or head")]
    PumpLimited = 4,
    #[error("valves cannot deliver enough flow")]
    ValveLimited = 5,
    #[error("system has negative pressures")]
    NegativePressures = 6,
}

impl Warn {
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Highest code wins when multiple warnings are raised in one run.
    pub fn max(a: Option<Warn>, b: Option<Warn>) -> Option<Warn> {
        match (a, b) {
            (Some(x), Some(y)) => Some(if x.value() >= y.value() { x } else { y }),
            (x, None) => x,
            (None, y) => y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_round_trip() {
        for v in [101_u16, 102, 207, 215, 261, 306, 309] {
            let code = Code::from_value(v).unwrap();
            assert_eq!(code.value(), v);
        }
        assert!(Code::from_value(999).is_none());
    }

    #[test]
    fn warn_max_prefers_higher() {
        assert_eq!(
            Warn::max(Some(Warn::Unbalanced), Some(Warn::NegativePressures)),
            Some(Warn::NegativePressures)
        );
        assert_eq!(Warn::max(None, Some(Warn::Disconnected)), Some(Warn::Disconnected));
        assert_eq!(Warn::max(None, None), None);
    }

    #[test]
    fn messages_are_textual() {
        let msg = format!("{}", Code::UndefinedNode);
        assert!(msg.contains("undefined node"));
    }
}
