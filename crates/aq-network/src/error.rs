use aq_core::Code;
use thiserror::Error;

pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("invalid ID name: {id}")]
    InvalidId { id: String },

    #[error("duplicate ID name: {id}")]
    DuplicateId { id: String },

    #[error("undefined node")]
    UndefinedNode,

    #[error("undefined link")]
    UndefinedLink,

    #[error("undefined time pattern")]
    UndefinedPattern,

    #[error("undefined curve")]
    UndefinedCurve,

    #[error("undefined control")]
    UndefinedControl,

    #[error("link {id} assigned same start and end nodes")]
    SameStartEndNodes { id: String },

    #[error("invalid energy or speed data for pump {id}")]
    InvalidPumpData { id: String },

    #[error("illegal valve connection to tank node")]
    ValveTankConnection,

    #[error("illegal valve connection to another valve")]
    ValveValveConnection,

    #[error("attempt to control a check valve pipe")]
    ControlOnCheckValve,

    #[error("element is referenced by controls")]
    ElementInUse,

    #[error("illegal numeric value for {what}")]
    BadValue { what: &'static str },

    #[error("undefined demand category")]
    UndefinedDemand,

    #[error("node has no coordinates")]
    NoCoordinates,

    #[error("not enough nodes in network")]
    TooFewNodes,

    #[error("no tanks or reservoirs in network")]
    NoTanksOrReservoirs,

    #[error("invalid lower/upper levels for tank {id}")]
    InvalidTankLevels { id: String },

    #[error("no head curve or power rating for pump {id}")]
    NoPumpCurve { id: String },

    #[error("invalid head curve for pump {id}")]
    InvalidPumpCurve { id: String },

    #[error("nonincreasing x-values for curve {id}")]
    CurveNotIncreasing { id: String },

    #[error("no water quality source at node")]
    NoSourceAtNode,
}

impl NetworkError {
    /// Map onto the public numeric code space.
    pub fn code(&self) -> Code {
        match self {
            NetworkError::InvalidId { .. } => Code::InvalidId,
            NetworkError::DuplicateId { .. } => Code::DuplicateId,
            NetworkError::UndefinedNode => Code::UndefinedNode,
            NetworkError::UndefinedLink => Code::UndefinedLink,
            NetworkError::UndefinedPattern => Code::UndefinedPattern,
            NetworkError::UndefinedCurve => Code::UndefinedCurve,
            NetworkError::UndefinedControl => Code::UndefinedControl,
            NetworkError::SameStartEndNodes { .. } => Code::SameStartEndNodes,
            NetworkError::InvalidPumpData { .. } => Code::InvalidPumpData,
            NetworkError::ValveTankConnection => Code::ValveTankConnection,
            NetworkError::ValveValveConnection => Code::ValveValveConnection,
            NetworkError::ControlOnCheckValve => Code::ControlOnCheckValve,
            NetworkError::ElementInUse => Code::ControlledElementUndeletable,
            NetworkError::BadValue { .. } => Code::BadValue,
            NetworkError::UndefinedDemand => Code::UndefinedDemand,
            NetworkError::NoCoordinates => Code::NoCoordinates,
            NetworkError::TooFewNodes => Code::TooFewNodes,
            NetworkError::NoTanksOrReservoirs => Code::NoTanksOrReservoirs,
            NetworkError::InvalidTankLevels { .. } => Code::InvalidTankLevels,
            NetworkError::NoPumpCurve { .. } => Code::NoPumpCurve,
            NetworkError::InvalidPumpCurve { .. } => Code::InvalidPumpCurve,
            NetworkError::CurveNotIncreasing { .. } => Code::CurveNotIncreasing,
            NetworkError::NoSourceAtNode => Code::NoSourceAtNode,
        }
    }
}
