//! Analysis options and time parameters parsed with the network.

use aq_core::time::Seconds;
use aq_core::units::{FlowUnits, HeadlossModel, PressureUnits, QualKind};
use aq_core::{NodeIdx, PatternIdx};

/// How junction demands respond to available pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DemandModel {
    /// Demand driven: full demand regardless of pressure.
    #[default]
    Dda = 0,
    /// Pressure driven: demand degrades between Pmin and Preq.
    Pda = 1,
}

impl DemandModel {
    pub fn from_value(v: u8) -> Option<Self> {
        [DemandModel::Dda, DemandModel::Pda]
            .into_iter()
            .find(|m| *m as u8 == v)
    }
}

/// Post-processing applied to reported results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Statistic {
    #[default]
    Series = 0,
    Average = 1,
    Minimum = 2,
    Maximum = 3,
    Range = 4,
}

impl Statistic {
    pub fn from_value(v: u8) -> Option<Self> {
        use Statistic::*;
        [Series, Average, Minimum, Maximum, Range]
            .into_iter()
            .find(|s| *s as u8 == v)
    }
}

/// Global analysis options. Thresholds are in internal units.
#[derive(Debug, Clone)]
pub struct Options {
    pub flow_units: FlowUnits,
    pub pressure_units: PressureUnits,
    pub headloss: HeadlossModel,

    // hydraulic solver
    pub trials: usize,
    pub accuracy: f64,
    /// Max head error for convergence, ft; 0 disables the test.
    pub head_error: f64,
    /// Max flow change for convergence, cfs; 0 disables the test.
    pub flow_change: f64,
    /// Status-check frequency and cutoff, solver tuning.
    pub check_freq: usize,
    pub max_check: usize,
    pub damp_limit: f64,

    // demands
    pub demand_mult: f64,
    pub demand_model: DemandModel,
    /// PDA pressure limits (head units) and exponent.
    pub pmin: f64,
    pub preq: f64,
    pub pexp: f64,
    pub def_pattern: Option<PatternIdx>,

    // emitters
    /// Emitter pressure exponent (flow = coeff * pressure^emit_expon).
    pub emit_expon: f64,

    // fluid properties
    pub spgrav: f64,
    /// Kinematic viscosity, ft2/s.
    pub viscos: f64,
    /// Molecular diffusivity, ft2/s.
    pub diffus: f64,

    // water quality
    pub qual: QualKind,
    pub chem_name: String,
    pub chem_units: String,
    pub trace_node: Option<NodeIdx>,
    /// Quality tolerance for merging segments, mass/ft3.
    pub ctol: f64,
    pub bulk_order: f64,
    pub wall_order: f64,
    pub tank_order: f64,
    /// Global bulk/wall reaction coefficients, per second.
    pub kbulk: f64,
    pub kwall: f64,
    /// Limiting concentration for growth/decay kinetics.
    pub climit: f64,
    /// Wall-reaction roughness correlation factor.
    pub rfactor: f64,

    // energy
    /// Global pump efficiency, percent.
    pub epump_effic: f64,
    /// Energy price per kw-hr and optional price pattern.
    pub eprice: f64,
    pub epat: Option<PatternIdx>,
    pub demand_charge: f64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            flow_units: FlowUnits::Cfs,
            pressure_units: PressureUnits::Psi,
            headloss: HeadlossModel::HazenWilliams,
            trials: 40,
            accuracy: 0.001,
            head_error: 0.0,
            flow_change: 0.0,
            check_freq: 2,
            max_check: 10,
            damp_limit: 0.0,
            demand_mult: 1.0,
            demand_model: DemandModel::Dda,
            pmin: 0.0,
            preq: 0.1,
            pexp: 0.5,
            def_pattern: None,
            emit_expon: 0.5,
            spgrav: 1.0,
            viscos: 1.1e-5,
            diffus: 1.3e-8,
            qual: QualKind::None,
            chem_name: "Chemical".to_string(),
            chem_units: "mg/L".to_string(),
            trace_node: None,
            ctol: 0.0,
            bulk_order: 1.0,
            wall_order: 1.0,
            tank_order: 1.0,
            kbulk: 0.0,
            kwall: 0.0,
            climit: 0.0,
            rfactor: 0.0,
            epump_effic: 75.0,
            eprice: 0.0,
            epat: None,
            demand_charge: 0.0,
        }
    }
}

/// Simulation time parameters, all in seconds.
#[derive(Debug, Clone)]
pub struct Times {
    pub duration: Seconds,
    /// Hydraulic time step.
    pub hstep: Seconds,
    /// Water-quality time step.
    pub qstep: Seconds,
    /// Pattern time step and start offset.
    pub pstep: Seconds,
    pub pstart: Seconds,
    /// Reporting time step and start time.
    pub rstep: Seconds,
    pub rstart: Seconds,
    /// Rule evaluation time step.
    pub rulestep: Seconds,
    /// Clock time at simulation start.
    pub start_clock: Seconds,
    pub statistic: Statistic,
}

impl Default for Times {
    fn default() -> Self {
        Self {
            duration: 0,
            hstep: 3600,
            qstep: 0,
            pstep: 3600,
            pstart: 0,
            rstep: 3600,
            rstart: 0,
            rulestep: 0,
            start_clock: 0,
            statistic: Statistic::Series,
        }
    }
}

impl Times {
    /// Effective quality step: defaults to a tenth of the hydraulic step.
    pub fn qstep_effective(&self) -> Seconds {
        if self.qstep > 0 {
            self.qstep
        } else {
            (self.hstep / 10).max(1)
        }
    }

    /// Effective rule step: defaults to a tenth of the hydraulic step.
    pub fn rulestep_effective(&self) -> Seconds {
        if self.rulestep > 0 {
            self.rulestep
        } else {
            (self.hstep / 10).max(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_steps() {
        let t = Times::default();
        assert_eq!(t.hstep, 3600);
        assert_eq!(t.qstep_effective(), 360);
        assert_eq!(t.rulestep_effective(), 360);
    }
}
