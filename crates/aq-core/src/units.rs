//! Flow-unit selection and conversion-factor tables.
//!
//! The engine computes in US customary units: feet for head/length, cfs for
//! flow, mg/ft3 for concentration, horsepower for power, seconds for time.
//! The user-facing unit system is implied by the chosen flow units; every
//! public getter multiplies by the matching factor and every setter divides.

// conversions per cfs / per foot
pub const GPM_PER_CFS: f64 = 448.831;
pub const AFD_PER_CFS: f64 = 1.9837;
pub const MGD_PER_CFS: f64 = 0.64632;
pub const IMGD_PER_CFS: f64 = 0.5382;
pub const LPS_PER_CFS: f64 = 28.317;
pub const LPM_PER_CFS: f64 = 1699.0;
pub const CMH_PER_CFS: f64 = 101.94;
pub const CMD_PER_CFS: f64 = 2446.6;
pub const MLD_PER_CFS: f64 = 2.4466;
pub const M3_PER_FT3: f64 = 0.028317;
pub const L_PER_FT3: f64 = 28.317;
pub const M_PER_FT: f64 = 0.3048;
pub const PSI_PER_FT: f64 = 0.4333;
pub const KPA_PER_PSI: f64 = 6.895;
pub const KW_PER_HP: f64 = 0.7457;

/// Flow units selectable by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FlowUnits {
    #[default]
    Cfs = 0,
    Gpm = 1,
    Mgd = 2,
    Imgd = 3,
    Afd = 4,
    Lps = 5,
    Lpm = 6,
    Mld = 7,
    Cmh = 8,
    Cmd = 9,
}

impl FlowUnits {
    /// Factor converting internal cfs to these units.
    pub fn per_cfs(self) -> f64 {
        match self {
            FlowUnits::Cfs => 1.0,
            FlowUnits::Gpm => GPM_PER_CFS,
            FlowUnits::Mgd => MGD_PER_CFS,
            FlowUnits::Imgd => IMGD_PER_CFS,
            FlowUnits::Afd => AFD_PER_CFS,
            FlowUnits::Lps => LPS_PER_CFS,
            FlowUnits::Lpm => LPM_PER_CFS,
            FlowUnits::Mld => MLD_PER_CFS,
            FlowUnits::Cmh => CMH_PER_CFS,
            FlowUnits::Cmd => CMD_PER_CFS,
        }
    }

    /// Metric flow units imply SI reporting for all other dimensions.
    pub fn is_si(self) -> bool {
        matches!(
            self,
            FlowUnits::Lps | FlowUnits::Lpm | FlowUnits::Mld | FlowUnits::Cmh | FlowUnits::Cmd
        )
    }

    pub fn from_value(v: u8) -> Option<Self> {
        use FlowUnits::*;
        [Cfs, Gpm, Mgd, Imgd, Afd, Lps, Lpm, Mld, Cmh, Cmd]
            .into_iter()
            .find(|u| *u as u8 == v)
    }

    pub fn name(self) -> &'static str {
        match self {
            FlowUnits::Cfs => "CFS",
            FlowUnits::Gpm => "GPM",
            FlowUnits::Mgd => "MGD",
            FlowUnits::Imgd => "IMGD",
            FlowUnits::Afd => "AFD",
            FlowUnits::Lps => "LPS",
            FlowUnits::Lpm => "LPM",
            FlowUnits::Mld => "MLD",
            FlowUnits::Cmh => "CMH",
            FlowUnits::Cmd => "CMD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        use FlowUnits::*;
        match s.to_ascii_uppercase().as_str() {
            "CFS" => Some(Cfs),
            "GPM" => Some(Gpm),
            "MGD" => Some(Mgd),
            "IMGD" => Some(Imgd),
            "AFD" => Some(Afd),
            "LPS" => Some(Lps),
            "LPM" => Some(Lpm),
            "MLD" => Some(Mld),
            "CMH" => Some(Cmh),
            "CMD" => Some(Cmd),
            _ => None,
        }
    }
}

/// Pressure units for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum PressureUnits {
    #[default]
    Psi = 0,
    Kpa = 1,
    Meters = 2,
}

/// Headloss formula selected globally for all pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum HeadlossModel {
    #[default]
    HazenWilliams = 0,
    DarcyWeisbach = 1,
    ChezyManning = 2,
}

impl HeadlossModel {
    pub fn from_value(v: u8) -> Option<Self> {
        use HeadlossModel::*;
        [HazenWilliams, DarcyWeisbach, ChezyManning]
            .into_iter()
            .find(|m| *m as u8 == v)
    }
}

/// Kind of water-quality analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum QualKind {
    #[default]
    None = 0,
    Chem = 1,
    Age = 2,
    Trace = 3,
}

impl QualKind {
    pub fn from_value(v: u8) -> Option<Self> {
        use QualKind::*;
        [None, Chem, Age, Trace].into_iter().find(|q| *q as u8 == v)
    }
}

/// Per-dimension conversion factors from internal to user units.
#[derive(Debug, Clone, Copy)]
pub struct Ucf {
    pub elev: f64,
    pub head: f64,
    pub length: f64,
    pub diam: f64,
    pub flow: f64,
    pub demand: f64,
    pub pressure: f64,
    pub velocity: f64,
    pub headloss: f64,
    pub volume: f64,
    pub power: f64,
    pub quality: f64,
    pub time: f64,
}

impl Ucf {
    /// Build the factor table implied by the flow units, pressure units,
    /// quality kind and specific gravity.
    pub fn new(flow: FlowUnits, pressure: PressureUnits, qual: QualKind, spgrav: f64) -> Self {
        let qcf = match qual {
            QualKind::Chem => 1.0 / L_PER_FT3,
            QualKind::Age => 1.0 / 3600.0,
            _ => 1.0,
        };
        if flow.is_si() {
            Ucf {
                elev: M_PER_FT,
                head: M_PER_FT,
                length: M_PER_FT,
                diam: 1000.0 * M_PER_FT,
                flow: flow.per_cfs(),
                demand: flow.per_cfs(),
                pressure: match pressure {
                    PressureUnits::Meters => M_PER_FT * spgrav,
                    _ => KPA_PER_PSI * PSI_PER_FT * spgrav,
                },
                velocity: M_PER_FT,
                headloss: M_PER_FT,
                volume: M3_PER_FT3,
                power: KW_PER_HP,
                quality: qcf,
                time: 1.0 / 3600.0,
            }
        } else {
            Ucf {
                elev: 1.0,
                head: 1.0,
                length: 1.0,
                diam: 12.0,
                flow: flow.per_cfs(),
                demand: flow.per_cfs(),
                pressure: PSI_PER_FT * spgrav,
                velocity: 1.0,
                headloss: 1.0,
                volume: 1.0,
                power: 1.0,
                quality: qcf,
                time: 1.0 / 3600.0,
            }
        }
    }
}

impl Default for Ucf {
    fn default() -> Self {
        Ucf::new(
            FlowUnits::default(),
            PressureUnits::default(),
            QualKind::default(),
            1.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cfs_table_is_identity_for_head() {
        let ucf = Ucf::new(FlowUnits::Cfs, PressureUnits::Psi, QualKind::None, 1.0);
        assert_eq!(ucf.head, 1.0);
        assert_eq!(ucf.diam, 12.0);
        assert!((ucf.pressure - PSI_PER_FT).abs() < 1e-12);
    }

    #[test]
    fn si_table_reports_metric() {
        let ucf = Ucf::new(FlowUnits::Lps, PressureUnits::Meters, QualKind::Chem, 1.0);
        assert!((ucf.flow - LPS_PER_CFS).abs() < 1e-12);
        assert!((ucf.head - M_PER_FT).abs() < 1e-12);
        assert!((ucf.diam - 304.8).abs() < 1e-9);
        assert!((ucf.pressure - M_PER_FT).abs() < 1e-12);
        assert!((ucf.quality - 1.0 / L_PER_FT3).abs() < 1e-12);
    }

    #[test]
    fn flow_units_parse_round_trip() {
        for u in [
            FlowUnits::Cfs,
            FlowUnits::Gpm,
            FlowUnits::Mgd,
            FlowUnits::Imgd,
            FlowUnits::Afd,
            FlowUnits::Lps,
            FlowUnits::Lpm,
            FlowUnits::Mld,
            FlowUnits::Cmh,
            FlowUnits::Cmd,
        ] {
            assert_eq!(FlowUnits::parse(u.name()), Some(u));
            assert_eq!(FlowUnits::from_value(u as u8), Some(u));
        }
    }
}
