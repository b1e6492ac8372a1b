//! Water-quality solution phases.
//!
//! The quality solver walks the stored hydraulic snapshots one period at a
//! time while advancing its own, finer clock; at every reporting instant a
//! result record goes to the output file.

use aq_core::Warn;
use aq_core::time::Seconds;
use aq_io::hydfile::HydReader;
use aq_io::outfile::{OutMeta, OutWriter, PeriodResults, PumpEnergyRecord};
use aq_network::Statistic;

use crate::error::{ProjectError, ProjectResult};
use crate::project::Project;

impl Project {
    /// Full water-quality run over the saved hydraulics.
    pub fn solve_q(&mut self) -> ProjectResult<Option<Warn>> {
        self.open_q()?;
        self.init_q(true)?;
        loop {
            self.run_q()?;
            if self.next_q()? == 0 {
                break;
            }
        }
        self.close_q()?;
        Ok(None)
    }

    pub fn open_q(&mut self) -> ProjectResult<()> {
        self.require_open()?;
        self.qual.open(&self.network)?;
        Ok(())
    }

    pub fn init_q(&mut self, save: bool) -> ProjectResult<()> {
        if !self.qual.is_open() {
            return Err(ProjectError::QualNotOpen);
        }
        if !self.hyd_results {
            return Err(ProjectError::NoHydResults);
        }
        self.qual.init(&self.network)?;
        let mut reader = HydReader::open(&self.hyd_path, &self.network)?;
        self.next_snap = reader.read_snapshot()?;
        self.current_snap = None;
        self.hyd_reader = Some(reader);
        self.hyd.state.rtime = self.network.times.rstart;
        self.qual_save = save;
        self.out_written = false;
        self.stat_buffer.clear();
        self.out_writer = if save {
            Some(OutWriter::create(
                &self.out_path,
                &self.network,
                &self.out_meta(),
            )?)
        } else {
            None
        };
        Ok(())
    }

    /// Load hydraulics for the period containing the quality clock and emit
    /// any due report record. Returns the quality clock.
    pub fn run_q(&mut self) -> ProjectResult<Seconds> {
        if !self.qual.is_initialized() {
            return Err(ProjectError::QualNotOpen);
        }
        self.advance_hydraulics()?;
        self.maybe_report()?;
        Ok(self.qual.qtime)
    }

    /// Transport across the current hydraulic period. Returns the step
    /// advanced; zero ends the simulation.
    pub fn next_q(&mut self) -> ProjectResult<Seconds> {
        if !self.qual.is_initialized() {
            return Err(ProjectError::QualNotOpen);
        }
        let start = self.qual.qtime;
        let target = self.period_end();
        let qstep = self.network.times.qstep_effective();
        while self.qual.qtime < target {
            let mut dt = qstep.min(target - self.qual.qtime);
            let rtime = self.hyd.state.rtime;
            if rtime > self.qual.qtime {
                dt = dt.min(rtime - self.qual.qtime);
            }
            self.qual.step(&self.network, dt)?;
            self.sync_rule_quality();
            self.maybe_report()?;
        }
        Ok(self.qual.qtime - start)
    }

    /// Single-substep variant; returns the simulation time remaining.
    pub fn step_q(&mut self) -> ProjectResult<Seconds> {
        if !self.qual.is_initialized() {
            return Err(ProjectError::QualNotOpen);
        }
        self.advance_hydraulics()?;
        let target = self.period_end();
        let qstep = self.network.times.qstep_effective();
        let dt = qstep.min((target - self.qual.qtime).max(0));
        if dt > 0 {
            self.qual.step(&self.network, dt)?;
            self.sync_rule_quality();
            self.maybe_report()?;
        }
        Ok((self.network.times.duration - self.qual.qtime).max(0))
    }

    pub fn close_q(&mut self) -> ProjectResult<()> {
        if !self.qual.is_open() {
            return Err(ProjectError::QualNotOpen);
        }
        self.finish_output()?;
        self.qual.close();
        self.hyd_reader = None;
        self.current_snap = None;
        self.next_snap = None;
        Ok(())
    }

    /// Water-quality mass-balance closure ratio.
    pub fn mass_balance_ratio(&self) -> f64 {
        self.qual.mass_ratio()
    }

    // --- internals ---

    /// When the quality clock sits at a snapshot boundary, adopt it.
    fn advance_hydraulics(&mut self) -> ProjectResult<()> {
        let due = match (&self.current_snap, &self.next_snap) {
            (None, Some(_)) => true,
            (Some(_), Some(next)) => self.qual.qtime >= next.time,
            _ => false,
        };
        if !due {
            return Ok(());
        }
        let snap = self.next_snap.take().expect("due snapshot");
        if let Some(reader) = &mut self.hyd_reader {
            self.next_snap = reader.read_snapshot()?;
        }
        self.qual
            .set_hydraulics(&self.network, &snap.demands, &snap.flows);
        self.current_snap = Some(snap);
        Ok(())
    }

    /// End of the hydraulic period the quality clock is inside.
    fn period_end(&self) -> Seconds {
        match &self.next_snap {
            Some(next) => next.time,
            None => self.network.times.duration,
        }
    }

    fn maybe_report(&mut self) -> ProjectResult<()> {
        if self.qual.qtime < self.hyd.state.rtime {
            return Ok(());
        }
        if self.qual_save {
            let record = self.period_results();
            if self.network.times.statistic == Statistic::Series {
                if let Some(writer) = &mut self.out_writer {
                    writer.write_period(&record)?;
                }
            } else {
                self.stat_buffer.push(record);
            }
        }
        self.hyd.state.rtime += self.network.times.rstep.max(1);
        Ok(())
    }

    /// Let rule premises read the latest node qualities.
    fn sync_rule_quality(&mut self) {
        if !self.rules.is_empty() {
            self.hyd
                .state
                .quality
                .copy_from_slice(&self.qual.node_qual);
        }
    }

    pub(crate) fn period_results(&self) -> PeriodResults {
        let ucf = self.ucf;
        let net = &self.network;
        let empty = aq_io::hydfile::HydSnapshot {
            time: 0,
            demands: vec![0.0; net.n_nodes()],
            heads: vec![0.0; net.n_nodes()],
            flows: vec![0.0; net.n_links()],
            statuses: vec![Default::default(); net.n_links()],
            settings: vec![0.0; net.n_links()],
        };
        let snap = self.current_snap.as_ref().unwrap_or(&empty);
        let mut out = PeriodResults::default();
        for (i, node) in net.nodes().iter().enumerate() {
            out.node_demand.push((snap.demands[i] * ucf.flow) as f32);
            out.node_head.push((snap.heads[i] * ucf.head) as f32);
            out.node_pressure
                .push(((snap.heads[i] - node.elevation) * ucf.pressure) as f32);
            out.node_quality
                .push((self.qual.quality_at(i) * ucf.quality) as f32);
        }
        for (k, link) in net.links().iter().enumerate() {
            let q = snap.flows[k];
            out.link_flow.push((q * ucf.flow) as f32);
            let area = std::f64::consts::PI / 4.0 * link.diameter * link.diameter;
            let velocity = if area > 0.0 { q.abs() / area } else { 0.0 };
            out.link_velocity.push((velocity * ucf.velocity) as f32);
            let h1 = snap.heads[link.n1().index()];
            let h2 = snap.heads[link.n2().index()];
            out.link_headloss.push(((h1 - h2).abs() * ucf.headloss) as f32);
            out.link_quality
                .push((self.qual.link_quality(k) * ucf.quality) as f32);
            out.link_status.push(snap.statuses[k] as u8 as f32);
            let setting = aq_io::convert::setting_to_user(link.kind, snap.settings[k], &ucf);
            out.link_setting.push(setting as f32);
        }
        out
    }

    pub(crate) fn out_meta(&self) -> OutMeta {
        let net = &self.network;
        OutMeta {
            title: net.title.clone(),
            qualflag: net.options.qual as i32,
            trace_node_position: net
                .options
                .trace_node
                .map(|n| n.position() as i32)
                .unwrap_or(0),
            flow_units: net.options.flow_units as i32,
            pressure_units: net.options.pressure_units as i32,
            statistic: net.times.statistic as i32,
            report_start: net.times.rstart,
            report_step: net.times.rstep,
            duration: net.times.duration,
            chem_name: net.options.chem_name.clone(),
            chem_units: net.options.chem_units.clone(),
        }
    }

    pub(crate) fn finish_output(&mut self) -> ProjectResult<()> {
        let Some(mut writer) = self.out_writer.take() else {
            return Ok(());
        };
        // non-series statistics collapse the buffered periods into one
        if self.network.times.statistic != Statistic::Series && !self.stat_buffer.is_empty() {
            let collapsed = collapse(&self.stat_buffer, self.network.times.statistic);
            writer.write_period(&collapsed)?;
            self.stat_buffer.clear();
        }

        let si = self.network.options.flow_units.is_si();
        let summaries = self.hyd.energy_summary(&self.network);
        let records: Vec<PumpEnergyRecord> = self
            .network
            .pumps
            .iter()
            .zip(summaries.iter())
            .map(|(pump, s)| {
                let (util, eff, kwhrs, avg_kw, peak_kw, cost, vol_ft3) = *s;
                let vol_user = if si {
                    vol_ft3 * aq_core::units::M3_PER_FT3
                } else {
                    vol_ft3 * 7.48052 / 1.0e6 // million gallons
                };
                PumpEnergyRecord {
                    link_position: pump.link.position() as i32,
                    time_online_pct: util as f32,
                    avg_efficiency: eff as f32,
                    kwhrs_per_vol: if vol_user > 0.0 {
                        (kwhrs / vol_user) as f32
                    } else {
                        0.0
                    },
                    avg_kw: avg_kw as f32,
                    peak_kw: peak_kw as f32,
                    total_cost: cost as f32,
                }
            })
            .collect();
        let demand_charge =
            (self.hyd.state.peak_kw * self.network.options.demand_charge) as f32;
        writer.finish(
            &records,
            demand_charge,
            self.hyd.warning_count as i32,
        )?;
        self.out_written = true;
        Ok(())
    }
}

/// Fold reported periods per the statistic option.
fn collapse(periods: &[PeriodResults], statistic: Statistic) -> PeriodResults {
    let n = periods.len() as f32;
    let mut out = periods[0].clone();
    let fold = |field: fn(&PeriodResults) -> &Vec<f32>,
                acc: &mut Vec<f32>,
                statistic: Statistic| {
        for period in &periods[1..] {
            for (a, v) in acc.iter_mut().zip(field(period).iter()) {
                match statistic {
                    Statistic::Average => *a += v,
                    Statistic::Minimum => *a = a.min(*v),
                    Statistic::Maximum | Statistic::Range => *a = a.max(*v),
                    Statistic::Series => {}
                }
            }
        }
        if statistic == Statistic::Average {
            for a in acc.iter_mut() {
                *a /= n;
            }
        }
    };
    macro_rules! each_field {
        ($($f:ident),+) => {
            $(fold(|p| &p.$f, &mut out.$f, statistic);)+
        };
    }
    each_field!(
        node_demand,
        node_head,
        node_pressure,
        node_quality,
        link_flow,
        link_velocity,
        link_headloss,
        link_quality,
        link_status,
        link_setting
    );
    if statistic == Statistic::Range {
        let mut mins = periods[0].clone();
        let fold_min = |field: fn(&PeriodResults) -> &Vec<f32>, acc: &mut Vec<f32>| {
            for period in &periods[1..] {
                for (a, v) in acc.iter_mut().zip(field(period).iter()) {
                    *a = a.min(*v);
                }
            }
        };
        macro_rules! each_min {
            ($($f:ident),+) => {
                $(fold_min(|p| &p.$f, &mut mins.$f);)+
            };
        }
        each_min!(
            node_demand,
            node_head,
            node_pressure,
            node_quality,
            link_flow,
            link_velocity,
            link_headloss,
            link_quality,
            link_status,
            link_setting
        );
        macro_rules! each_sub {
            ($($f:ident),+) => {
                $(for (a, b) in out.$f.iter_mut().zip(mins.$f.iter()) { *a -= b; })+
            };
        }
        each_sub!(
            node_demand,
            node_head,
            node_pressure,
            node_quality,
            link_flow,
            link_velocity,
            link_headloss,
            link_quality,
            link_status,
            link_setting
        );
    }
    out
}
