//! Results export: decode the binary output file into serializable records.

use serde::Serialize;

use crate::error::{IoError, IoResult};
use crate::outfile::OutReader;

/// Run-level summary for the CLI and bindings.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub nodes: usize,
    pub tanks: usize,
    pub links: usize,
    pub pumps: usize,
    pub valves: usize,
    pub periods: usize,
    pub duration: i64,
    pub report_step: i64,
    pub warnings: i32,
    pub quality_analysis: i32,
}

impl RunSummary {
    pub fn of(out: &OutReader) -> Self {
        Self {
            nodes: out.nnodes,
            tanks: out.ntanks,
            links: out.nlinks,
            pumps: out.npumps,
            valves: out.nvalves,
            periods: out.periods.len(),
            duration: out.duration,
            report_step: out.report_step,
            warnings: out.warnings,
            quality_analysis: out.qualflag,
        }
    }
}

/// One point of a reported time series.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct SeriesPoint {
    pub time: i64,
    pub value: f64,
}

/// Node variables exported by name.
pub const NODE_VARIABLES: [&str; 4] = ["demand", "head", "pressure", "quality"];
/// Link variables exported by name.
pub const LINK_VARIABLES: [&str; 6] =
    ["flow", "velocity", "headloss", "quality", "status", "setting"];

/// Extract a node time series by element id and variable name.
pub fn node_series(out: &OutReader, id: &str, variable: &str) -> IoResult<Vec<SeriesPoint>> {
    let node = out
        .node_ids
        .iter()
        .position(|n| n == id)
        .ok_or(IoError::OutputOpen)?;
    let series = out.periods.iter().enumerate().map(|(p, period)| {
        let value = match variable {
            "demand" => period.node_demand[node],
            "head" => period.node_head[node],
            "pressure" => period.node_pressure[node],
            "quality" => period.node_quality[node],
            _ => f32::NAN,
        };
        SeriesPoint {
            time: out.report_start + p as i64 * out.report_step,
            value: value as f64,
        }
    });
    let points: Vec<SeriesPoint> = series.collect();
    if points.iter().any(|p| p.value.is_nan()) {
        return Err(IoError::OutputOpen);
    }
    Ok(points)
}

/// Extract a link time series by element id and variable name.
pub fn link_series(out: &OutReader, id: &str, variable: &str) -> IoResult<Vec<SeriesPoint>> {
    let link = out
        .link_ids
        .iter()
        .position(|n| n == id)
        .ok_or(IoError::OutputOpen)?;
    let series = out.periods.iter().enumerate().map(|(p, period)| {
        let value = match variable {
            "flow" => period.link_flow[link],
            "velocity" => period.link_velocity[link],
            "headloss" => period.link_headloss[link],
            "quality" => period.link_quality[link],
            "status" => period.link_status[link],
            "setting" => period.link_setting[link],
            _ => f32::NAN,
        };
        SeriesPoint {
            time: out.report_start + p as i64 * out.report_step,
            value: value as f64,
        }
    });
    let points: Vec<SeriesPoint> = series.collect();
    if points.iter().any(|p| p.value.is_nan()) {
        return Err(IoError::OutputOpen);
    }
    Ok(points)
}

/// Render a series as CSV with a header row.
pub fn series_to_csv(points: &[SeriesPoint]) -> String {
    let mut csv = String::from("time_s,value\n");
    for p in points {
        csv.push_str(&format!("{},{}\n", p.time, p.value));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outfile::{OutMeta, OutWriter, PeriodResults};
    use aq_network::{LinkKind, Network, NodeKind};

    fn sample_out() -> OutReader {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        net.add_link("P1", LinkKind::Pipe, r, j).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.out");
        let meta = OutMeta {
            report_step: 3600,
            duration: 3600,
            ..OutMeta::default()
        };
        let mut w = OutWriter::create(&path, &net, &meta).unwrap();
        for flow in [5.0_f32, 6.0] {
            w.write_period(&PeriodResults {
                node_demand: vec![flow, -flow],
                node_head: vec![700.0, 710.0],
                node_pressure: vec![30.0, 0.0],
                node_quality: vec![0.0, 0.0],
                link_flow: vec![flow],
                link_velocity: vec![1.0],
                link_headloss: vec![2.0],
                link_quality: vec![0.0],
                link_status: vec![3.0],
                link_setting: vec![1.0],
            })
            .unwrap();
        }
        w.finish(&[], 0.0, 0).unwrap();
        OutReader::open(&path).unwrap()
    }

    #[test]
    fn link_series_by_name() {
        let out = sample_out();
        let series = link_series(&out, "P1", "flow").unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].value, 5.0);
        assert_eq!(series[1].time, 3600);
    }

    #[test]
    fn unknown_variable_errors() {
        let out = sample_out();
        assert!(node_series(&out, "J1", "banana").is_err());
        assert!(node_series(&out, "NOPE", "head").is_err());
    }

    #[test]
    fn csv_rendering() {
        let csv = series_to_csv(&[SeriesPoint { time: 0, value: 1.5 }]);
        assert_eq!(csv, "time_s,value\n0,1.5\n");
    }

    #[test]
    fn summary_counts() {
        let out = sample_out();
        let s = RunSummary::of(&out);
        assert_eq!(s.nodes, 2);
        assert_eq!(s.periods, 2);
        assert!(serde_json::to_string(&s).unwrap().contains("\"nodes\":2"));
    }
}
