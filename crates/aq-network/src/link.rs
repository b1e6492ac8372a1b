//! Link records: pipes, pumps and valves.

use aq_core::{CurveIdx, LinkIdx, NodeIdx, PatternIdx};

/// Link classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkKind {
    /// Pipe that closes on reverse flow.
    CvPipe = 0,
    Pipe = 1,
    Pump = 2,
    /// Pressure reducing valve.
    Prv = 3,
    /// Pressure sustaining valve.
    Psv = 4,
    /// Pressure breaker valve.
    Pbv = 5,
    /// Flow control valve.
    Fcv = 6,
    /// Throttle control valve.
    Tcv = 7,
    /// General purpose valve (headloss curve).
    Gpv = 8,
}

impl LinkKind {
    pub fn is_pipe(self) -> bool {
        matches!(self, LinkKind::CvPipe | LinkKind::Pipe)
    }

    pub fn is_pump(self) -> bool {
        self == LinkKind::Pump
    }

    pub fn is_valve(self) -> bool {
        matches!(
            self,
            LinkKind::Prv | LinkKind::Psv | LinkKind::Pbv | LinkKind::Fcv | LinkKind::Tcv | LinkKind::Gpv
        )
    }

    pub fn from_value(v: u8) -> Option<Self> {
        use LinkKind::*;
        [CvPipe, Pipe, Pump, Prv, Psv, Pbv, Fcv, Tcv, Gpv]
            .into_iter()
            .find(|k| *k as u8 == v)
    }

    pub fn name(self) -> &'static str {
        match self {
            LinkKind::CvPipe => "CV",
            LinkKind::Pipe => "PIPE",
            LinkKind::Pump => "PUMP",
            LinkKind::Prv => "PRV",
            LinkKind::Psv => "PSV",
            LinkKind::Pbv => "PBV",
            LinkKind::Fcv => "FCV",
            LinkKind::Tcv => "TCV",
            LinkKind::Gpv => "GPV",
        }
    }
}

/// Link status, including the transient marker states the solver assigns.
///
/// Discriminants are the values written to the hydraulics file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LinkStatus {
    /// Pump cannot deliver the required head.
    XHead = 0,
    /// Closed by the solver (e.g. tank at limit).
    TempClosed = 1,
    Closed = 2,
    #[default]
    Open = 3,
    /// Valve operating at its setting.
    Active = 4,
    /// Pump flow exceeds its maximum.
    XFlow = 5,
    /// FCV cannot supply its flow setting.
    XFcv = 6,
    /// Valve cannot supply its pressure setting.
    XPressure = 7,
}

impl LinkStatus {
    /// Whether water can move through the link at all.
    pub fn is_open(self) -> bool {
        !matches!(
            self,
            LinkStatus::Closed | LinkStatus::TempClosed | LinkStatus::XHead
        )
    }

    pub fn from_value(v: u8) -> Option<Self> {
        use LinkStatus::*;
        [XHead, TempClosed, Closed, Open, Active, XFlow, XFcv, XPressure]
            .into_iter()
            .find(|s| *s as u8 == v)
    }
}

/// A network link. All quantities are internal units: feet for diameter and
/// length, headloss-formula units for the roughness coefficient.
#[derive(Debug, Clone)]
pub struct Link {
    pub(crate) id: String,
    pub(crate) n1: NodeIdx,
    pub(crate) n2: NodeIdx,
    pub kind: LinkKind,
    pub diameter: f64,
    pub length: f64,
    /// Roughness coefficient for pipes, speed for pumps, setting for valves.
    pub kc: f64,
    /// Minor loss coefficient converted to head units (0.02517 K / d^4).
    pub km: f64,
    /// Bulk and wall reaction coefficients (per second; per-length basis for walls).
    pub kb: f64,
    pub kw: f64,
    pub init_status: LinkStatus,
    /// Flow resistance computed from the headloss formula.
    pub resistance: f64,
    pub report: bool,
    pub comment: String,
}

impl Link {
    pub fn new(id: &str, kind: LinkKind, n1: NodeIdx, n2: NodeIdx) -> Self {
        let mut link = Self {
            id: id.to_string(),
            n1,
            n2,
            kind,
            diameter: 0.0,
            length: 0.0,
            kc: 0.0,
            km: 0.0,
            kb: aq_core::MISSING,
            kw: aq_core::MISSING,
            init_status: LinkStatus::Open,
            resistance: 0.0,
            report: false,
            comment: String::new(),
        };
        match kind {
            LinkKind::CvPipe | LinkKind::Pipe => {
                link.diameter = 10.0 / 12.0;
                link.length = 330.0;
                link.kc = 100.0;
            }
            LinkKind::Pump => {
                link.kc = 1.0;
            }
            _ => {
                link.diameter = 10.0 / 12.0;
            }
        }
        link
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn n1(&self) -> NodeIdx {
        self.n1
    }

    pub fn n2(&self) -> NodeIdx {
        self.n2
    }
}

/// Shape of a pump's head-flow characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PumpKind {
    /// Fixed horsepower, no curve.
    ConstHp = 0,
    /// Fitted h = h0 - r q^n function.
    PowerFunc = 1,
    /// Interpolated multi-point head curve.
    Custom = 2,
    /// Not yet assigned a curve or power.
    #[default]
    NoCurve = 3,
}

/// Running energy-usage tallies for one pump.
#[derive(Debug, Clone, Copy, Default)]
pub struct PumpEnergy {
    /// Fraction of time online.
    pub time_online: f64,
    /// Flow-weighted average efficiency, percent.
    pub avg_efficiency: f64,
    /// kw-hrs per unit of flow volume.
    pub kwhrs_per_vol: f64,
    /// Total kw-hrs consumed.
    pub total_kwhrs: f64,
    /// Peak kw drawn.
    pub max_kw: f64,
    /// Total cost at the energy price.
    pub total_cost: f64,
}

/// Pump side-record.
#[derive(Debug, Clone)]
pub struct Pump {
    pub link: LinkIdx,
    pub kind: PumpKind,
    pub hcurve: Option<CurveIdx>,
    pub ecurve: Option<CurveIdx>,
    /// Speed pattern.
    pub upat: Option<PatternIdx>,
    /// Energy price pattern.
    pub epat: Option<PatternIdx>,
    /// Unit energy price.
    pub ecost: f64,
    /// Design flow (cfs).
    pub q0: f64,
    /// Max allowed flow (cfs).
    pub qmax: f64,
    /// Shutoff head (ft).
    pub hmax: f64,
    /// Fitted curve coefficients: h = h0 - r q^n.
    pub h0: f64,
    pub r: f64,
    pub n: f64,
}

impl Pump {
    pub fn new(link: LinkIdx) -> Self {
        Self {
            link,
            kind: PumpKind::NoCurve,
            hcurve: None,
            ecurve: None,
            upat: None,
            epat: None,
            ecost: 0.0,
            q0: 0.0,
            qmax: 0.0,
            hmax: 0.0,
            h0: 0.0,
            r: 0.0,
            n: 0.0,
        }
    }
}

/// Valve side-record.
#[derive(Debug, Clone)]
pub struct Valve {
    pub link: LinkIdx,
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_core::Idx;

    #[test]
    fn kind_predicates() {
        assert!(LinkKind::CvPipe.is_pipe());
        assert!(LinkKind::Pipe.is_pipe());
        assert!(LinkKind::Pump.is_pump());
        assert!(LinkKind::Prv.is_valve());
        assert!(!LinkKind::Pipe.is_valve());
    }

    #[test]
    fn status_open_predicate() {
        assert!(LinkStatus::Open.is_open());
        assert!(LinkStatus::Active.is_open());
        assert!(!LinkStatus::Closed.is_open());
        assert!(!LinkStatus::TempClosed.is_open());
        assert!(!LinkStatus::XHead.is_open());
    }

    #[test]
    fn pipe_defaults() {
        let link = Link::new("P1", LinkKind::Pipe, Idx::from_index(0), Idx::from_index(1));
        assert!((link.diameter - 10.0 / 12.0).abs() < 1e-12);
        assert_eq!(link.length, 330.0);
        assert_eq!(link.kc, 100.0);
    }

    #[test]
    fn status_discriminants_stable() {
        assert_eq!(LinkStatus::Closed as u8, 2);
        assert_eq!(LinkStatus::Open as u8, 3);
        assert_eq!(LinkStatus::Active as u8, 4);
    }
}
