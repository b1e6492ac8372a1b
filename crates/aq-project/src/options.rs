//! Global options, time parameters, unit and quality-type selection.

use aq_core::Code;
use aq_core::time::Seconds;
use aq_core::units::{FlowUnits, HeadlossModel, QualKind};
use aq_network::{DemandModel, NetworkError, Statistic};

use crate::enums::{CountType, OptionParam, TimeParam};
use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

impl Project {
    pub fn count(&self, what: CountType) -> ProjectResult<usize> {
        self.require_open()?;
        Ok(match what {
            CountType::Nodes => self.network.n_nodes(),
            CountType::Tanks => self.network.n_tanks(),
            CountType::Links => self.network.n_links(),
            CountType::Patterns => self.network.patterns.len(),
            CountType::Curves => self.network.curves.len(),
            CountType::Controls => self.network.controls.len(),
            CountType::Rules => self.rules.len(),
        })
    }

    pub fn option(&self, which: OptionParam) -> ProjectResult<f64> {
        self.require_open()?;
        let opt = &self.network.options;
        use OptionParam::*;
        Ok(match which {
            Trials => opt.trials as f64,
            Accuracy => opt.accuracy,
            Tolerance => opt.ctol * self.ucf().quality,
            EmitExponent => opt.emit_expon,
            DemandMult => opt.demand_mult,
            HeadError => opt.head_error * self.ucf().head,
            FlowChange => opt.flow_change * self.ucf().flow,
            HeadlossForm => opt.headloss as u8 as f64,
            GlobalEffic => opt.epump_effic,
            GlobalPrice => opt.eprice,
            GlobalPattern => opt.epat.map(|p| p.position() as f64).unwrap_or(0.0),
            DemandCharge => opt.demand_charge,
        })
    }

    pub fn set_option(&mut self, which: OptionParam, value: f64) -> ProjectResult<()> {
        self.require_open()?;
        if !value.is_finite() {
            return Err(ProjectError::BadValue);
        }
        let ucf = *self.ucf();
        use OptionParam::*;
        match which {
            Trials => {
                if value < 1.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.trials = value as usize;
            }
            Accuracy => {
                if value <= 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.accuracy = value;
            }
            Tolerance => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.ctol = value / ucf.quality;
            }
            EmitExponent => {
                if value <= 0.0 {
                    return Err(ProjectError::BadValue);
                }
                // stored emitter coefficients were converted under the old
                // exponent; re-express them so user values round-trip
                let old = self.network.options.emit_expon;
                for i in 0..self.network.n_juncs() {
                    let idx = aq_core::Idx::from_index(i);
                    let node = self.network.node_mut(idx).expect("junction");
                    if node.emitter > 0.0 {
                        let user = node.emitter * ucf.flow / ucf.pressure.powf(old);
                        node.emitter = user * ucf.pressure.powf(value) / ucf.flow;
                    }
                }
                self.network.options.emit_expon = value;
            }
            DemandMult => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.demand_mult = value;
            }
            HeadError => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.head_error = value / ucf.head;
            }
            FlowChange => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.flow_change = value / ucf.flow;
            }
            HeadlossForm => {
                let model = HeadlossModel::from_value(value as u8)
                    .ok_or(ProjectError::CodeOutOfRange)?;
                self.network.options.headloss = model;
                aq_hydraul::resist::set_all_resistances(&mut self.network);
            }
            GlobalEffic => {
                if !(1.0..=100.0).contains(&value) {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.epump_effic = value;
            }
            GlobalPrice => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.eprice = value;
            }
            GlobalPattern => {
                self.network.options.epat = self.pattern_opt(value)?;
            }
            DemandCharge => {
                if value < 0.0 {
                    return Err(ProjectError::BadValue);
                }
                self.network.options.demand_charge = value;
            }
        }
        Ok(())
    }

    pub fn time_param(&self, which: TimeParam) -> ProjectResult<Seconds> {
        self.require_open()?;
        let times = &self.network.times;
        use TimeParam::*;
        Ok(match which {
            Duration => times.duration,
            HydStep => times.hstep,
            QualStep => times.qstep_effective(),
            PatternStep => times.pstep,
            PatternStart => times.pstart,
            ReportStep => times.rstep,
            ReportStart => times.rstart,
            RuleStep => times.rulestep_effective(),
            Statistic => times.statistic as u8 as Seconds,
            Periods => {
                if times.rstep > 0 && times.duration > 0 {
                    (times.duration - times.rstart) / times.rstep + 1
                } else {
                    1
                }
            }
            StartTime => times.start_clock,
            HTime => self.hyd.state.htime,
            QTime => self.qual.qtime,
        })
    }

    pub fn set_time_param(&mut self, which: TimeParam, value: Seconds) -> ProjectResult<()> {
        self.require_open()?;
        if value < 0 {
            return Err(ProjectError::BadValue);
        }
        let times = &mut self.network.times;
        use TimeParam::*;
        match which {
            Duration => times.duration = value,
            HydStep => {
                if value == 0 {
                    return Err(ProjectError::BadValue);
                }
                times.hstep = value;
            }
            QualStep => times.qstep = value,
            PatternStep => {
                if value == 0 {
                    return Err(ProjectError::BadValue);
                }
                times.pstep = value;
            }
            PatternStart => times.pstart = value,
            ReportStep => {
                if value == 0 {
                    return Err(ProjectError::BadValue);
                }
                times.rstep = value;
            }
            ReportStart => times.rstart = value,
            RuleStep => times.rulestep = value,
            Statistic => {
                times.statistic = aq_network::Statistic::from_value(value as u8)
                    .ok_or(ProjectError::CodeOutOfRange)?;
            }
            StartTime => times.start_clock = value % aq_core::time::SECS_PER_DAY,
            Periods | HTime | QTime => return Err(ProjectError::CodeOutOfRange),
        }
        Ok(())
    }

    pub fn flow_units(&self) -> ProjectResult<FlowUnits> {
        self.require_open()?;
        Ok(self.network.options.flow_units)
    }

    /// Select new flow units. Internal values are canonical, so only the
    /// conversion table changes; every user-visible value rescales.
    pub fn set_flow_units(&mut self, units: FlowUnits) -> ProjectResult<()> {
        self.require_open()?;
        self.network.options.flow_units = units;
        if units.is_si()
            && self.network.options.pressure_units == aq_core::units::PressureUnits::Psi
        {
            self.network.options.pressure_units = aq_core::units::PressureUnits::Meters;
        } else if !units.is_si() {
            self.network.options.pressure_units = aq_core::units::PressureUnits::Psi;
        }
        self.refresh_ucf();
        Ok(())
    }

    pub fn demand_model(&self) -> ProjectResult<(DemandModel, f64, f64, f64)> {
        self.require_open()?;
        let opt = &self.network.options;
        let ucf = self.ucf();
        Ok((
            opt.demand_model,
            opt.pmin * ucf.pressure,
            opt.preq * ucf.pressure,
            opt.pexp,
        ))
    }

    pub fn set_demand_model(
        &mut self,
        model: DemandModel,
        pmin: f64,
        preq: f64,
        pexp: f64,
    ) -> ProjectResult<()> {
        self.require_open()?;
        if model == DemandModel::Pda && (pexp <= 0.0 || preq < pmin || pmin < 0.0) {
            return Err(ProjectError::BadValue);
        }
        let ucf = *self.ucf();
        let opt = &mut self.network.options;
        opt.demand_model = model;
        opt.pmin = pmin / ucf.pressure;
        opt.preq = preq / ucf.pressure;
        opt.pexp = pexp;
        Ok(())
    }

    pub fn qual_type(&self) -> ProjectResult<(QualKind, usize)> {
        self.require_open()?;
        let trace = self
            .network
            .options
            .trace_node
            .map(|n| n.position())
            .unwrap_or(0);
        Ok((self.network.options.qual, trace))
    }

    /// Quality-analysis metadata: kind, constituent name, units, trace node.
    pub fn qual_info(&self) -> ProjectResult<(QualKind, String, String, usize)> {
        let (kind, trace) = self.qual_type()?;
        let (name, units) = match kind {
            QualKind::Chem => (
                self.network.options.chem_name.clone(),
                self.network.options.chem_units.clone(),
            ),
            QualKind::Age => ("Age".to_string(), "hrs".to_string()),
            QualKind::Trace => ("Trace".to_string(), "%".to_string()),
            QualKind::None => (String::new(), String::new()),
        };
        Ok((kind, name, units, trace))
    }

    pub fn set_qual_type(
        &mut self,
        kind: QualKind,
        chem_name: &str,
        chem_units: &str,
        trace_node: &str,
    ) -> ProjectResult<()> {
        self.require_open()?;
        match kind {
            QualKind::Trace => {
                let idx = self
                    .network
                    .find_node(trace_node)
                    .ok_or(NetworkError::UndefinedNode)?;
                self.network.options.trace_node = Some(idx);
            }
            QualKind::Chem => {
                if !chem_name.is_empty() {
                    self.network.options.chem_name = chem_name.to_string();
                }
                if !chem_units.is_empty() {
                    self.network.options.chem_units = chem_units.to_string();
                }
            }
            _ => {}
        }
        self.network.options.qual = kind;
        self.refresh_ucf();
        Ok(())
    }

    /// Text for a numeric error code.
    pub fn error_text(code: u16) -> String {
        match Code::from_value(code) {
            Some(c) => c.to_string(),
            None => format!("unknown error code {code}"),
        }
    }

    /// Engine version, packed decimal.
    pub fn version() -> i32 {
        crate::VERSION
    }

    /// Number of reporting periods written to the output file.
    pub fn periods_written(&self) -> usize {
        if self.network.times.statistic != Statistic::Series {
            return usize::from(self.out_written);
        }
        self.time_param(TimeParam::Periods).unwrap_or(1) as usize
    }
}
