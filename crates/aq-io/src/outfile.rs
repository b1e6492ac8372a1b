//! Binary output (reporting results) file.
//!
//! Layout, little-endian, INT32 integers and f32 floats:
//!
//! ```text
//! prolog:  magic, version
//!          nnodes, ntanks, nlinks, npumps, nvalves
//!          qualflag, tracenode (1-based position, 0 = none)
//!          flow-units code, pressure-units code, statistic flag
//!          report start, report step, duration (seconds)
//!          3 title lines (80 bytes each)
//!          chem name, chem units (32 bytes each)
//!          node IDs (nnodes x 32 bytes)
//!          link IDs (nlinks x 32 bytes)
//!          link start nodes, end nodes, types (nlinks x INT32 each)
//!          tank node positions (ntanks x INT32), tank areas (ntanks x f32)
//!          node elevations (nnodes x f32)
//!          link lengths, diameters (nlinks x f32 each)
//! period:  node demand, head, pressure, quality blocks (nnodes x f32 each)
//!          link flow, velocity, headloss, quality, status, setting blocks
//!          (nlinks x f32 each)
//! epilog:  per pump: link position INT32 + 6 f32 tallies; demand charge f32
//!          nperiods, warning count, magic
//! ```
//!
//! All values are in user units; conversion happens before writing.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use aq_network::Network;

use crate::error::{IoError, IoResult};

pub const OUT_MAGIC: i32 = 516114521;
pub const OUT_VERSION: i32 = super::hydfile::ENGINE_VERSION;

const ID_BYTES: usize = 32;
const TITLE_BYTES: usize = 80;

/// One reporting period, user units, f32 precision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodResults {
    pub node_demand: Vec<f32>,
    pub node_head: Vec<f32>,
    pub node_pressure: Vec<f32>,
    pub node_quality: Vec<f32>,
    pub link_flow: Vec<f32>,
    pub link_velocity: Vec<f32>,
    pub link_headloss: Vec<f32>,
    pub link_quality: Vec<f32>,
    pub link_status: Vec<f32>,
    pub link_setting: Vec<f32>,
}

/// Energy epilog entry for one pump.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpEnergyRecord {
    /// 1-based link position of the pump.
    pub link_position: i32,
    pub time_online_pct: f32,
    pub avg_efficiency: f32,
    pub kwhrs_per_vol: f32,
    pub avg_kw: f32,
    pub peak_kw: f32,
    pub total_cost: f32,
}

/// Prolog metadata needed beyond the network itself.
#[derive(Debug, Clone, Default)]
pub struct OutMeta {
    pub title: Vec<String>,
    pub qualflag: i32,
    pub trace_node_position: i32,
    pub flow_units: i32,
    pub pressure_units: i32,
    pub statistic: i32,
    pub report_start: i64,
    pub report_step: i64,
    pub duration: i64,
    pub chem_name: String,
    pub chem_units: String,
}

pub struct OutWriter {
    out: BufWriter<File>,
    nnodes: usize,
    nlinks: usize,
    periods: u32,
}

impl OutWriter {
    pub fn create(path: &Path, net: &Network, meta: &OutMeta) -> IoResult<Self> {
        let file = File::create(path).map_err(|_| IoError::OutputOpen)?;
        let mut w = Self {
            out: BufWriter::new(file),
            nnodes: net.n_nodes(),
            nlinks: net.n_links(),
            periods: 0,
        };
        w.i32(OUT_MAGIC)?;
        w.i32(OUT_VERSION)?;
        w.i32(net.n_nodes() as i32)?;
        w.i32(net.n_tanks() as i32)?;
        w.i32(net.n_links() as i32)?;
        w.i32(net.n_pumps() as i32)?;
        w.i32(net.n_valves() as i32)?;
        w.i32(meta.qualflag)?;
        w.i32(meta.trace_node_position)?;
        w.i32(meta.flow_units)?;
        w.i32(meta.pressure_units)?;
        w.i32(meta.statistic)?;
        w.i32(meta.report_start as i32)?;
        w.i32(meta.report_step as i32)?;
        w.i32(meta.duration as i32)?;
        for i in 0..3 {
            let line = meta.title.get(i).map(String::as_str).unwrap_or("");
            w.text(line, TITLE_BYTES)?;
        }
        w.text(&meta.chem_name, ID_BYTES)?;
        w.text(&meta.chem_units, ID_BYTES)?;
        for node in net.nodes() {
            w.text(node.id(), ID_BYTES)?;
        }
        for link in net.links() {
            w.text(link.id(), ID_BYTES)?;
        }
        for link in net.links() {
            w.i32(link.n1().position() as i32)?;
        }
        for link in net.links() {
            w.i32(link.n2().position() as i32)?;
        }
        for link in net.links() {
            w.i32(link.kind as i32)?;
        }
        for tank in &net.tanks {
            w.i32(tank.node.position() as i32)?;
        }
        for tank in &net.tanks {
            w.f32(tank.area as f32)?;
        }
        for node in net.nodes() {
            w.f32(node.elevation as f32)?;
        }
        for link in net.links() {
            w.f32(link.length as f32)?;
        }
        for link in net.links() {
            w.f32(link.diameter as f32)?;
        }
        Ok(w)
    }

    pub fn write_period(&mut self, res: &PeriodResults) -> IoResult<()> {
        debug_assert_eq!(res.node_demand.len(), self.nnodes);
        debug_assert_eq!(res.link_flow.len(), self.nlinks);
        for block in [
            &res.node_demand,
            &res.node_head,
            &res.node_pressure,
            &res.node_quality,
        ] {
            for v in block.iter() {
                self.f32(*v)?;
            }
        }
        for block in [
            &res.link_flow,
            &res.link_velocity,
            &res.link_headloss,
            &res.link_quality,
            &res.link_status,
            &res.link_setting,
        ] {
            for v in block.iter() {
                self.f32(*v)?;
            }
        }
        self.periods += 1;
        Ok(())
    }

    pub fn finish(
        mut self,
        pumps: &[PumpEnergyRecord],
        demand_charge: f32,
        warnings: i32,
    ) -> IoResult<()> {
        for p in pumps {
            self.i32(p.link_position)?;
            self.f32(p.time_online_pct)?;
            self.f32(p.avg_efficiency)?;
            self.f32(p.kwhrs_per_vol)?;
            self.f32(p.avg_kw)?;
            self.f32(p.peak_kw)?;
            self.f32(p.total_cost)?;
        }
        self.f32(demand_charge)?;
        let periods = self.periods;
        self.i32(periods as i32)?;
        self.i32(warnings)?;
        self.i32(OUT_MAGIC)?;
        self.out.flush()?;
        Ok(())
    }

    fn i32(&mut self, v: i32) -> IoResult<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn f32(&mut self, v: f32) -> IoResult<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }

    fn text(&mut self, s: &str, width: usize) -> IoResult<()> {
        let mut buf = vec![0_u8; width];
        let bytes = s.as_bytes();
        let n = bytes.len().min(width);
        buf[..n].copy_from_slice(&bytes[..n]);
        self.out.write_all(&buf)?;
        Ok(())
    }
}

/// Parsed output file, held fully in memory for reporting and export.
#[derive(Debug, Clone)]
pub struct OutReader {
    pub nnodes: usize,
    pub ntanks: usize,
    pub nlinks: usize,
    pub npumps: usize,
    pub nvalves: usize,
    pub qualflag: i32,
    pub flow_units: i32,
    pub pressure_units: i32,
    pub statistic: i32,
    pub report_start: i64,
    pub report_step: i64,
    pub duration: i64,
    pub title: Vec<String>,
    pub chem_name: String,
    pub chem_units: String,
    pub node_ids: Vec<String>,
    pub link_ids: Vec<String>,
    pub periods: Vec<PeriodResults>,
    pub pump_energy: Vec<PumpEnergyRecord>,
    pub demand_charge: f32,
    pub warnings: i32,
}

impl OutReader {
    pub fn open(path: &Path) -> IoResult<Self> {
        let file = File::open(path).map_err(|_| IoError::OutputOpen)?;
        let mut r = BufReader::new(file);
        if i32r(&mut r)? != OUT_MAGIC {
            return Err(IoError::OutputOpen);
        }
        let _version = i32r(&mut r)?;
        let nnodes = i32r(&mut r)? as usize;
        let ntanks = i32r(&mut r)? as usize;
        let nlinks = i32r(&mut r)? as usize;
        let npumps = i32r(&mut r)? as usize;
        let nvalves = i32r(&mut r)? as usize;
        let qualflag = i32r(&mut r)?;
        let _trace = i32r(&mut r)?;
        let flow_units = i32r(&mut r)?;
        let pressure_units = i32r(&mut r)?;
        let statistic = i32r(&mut r)?;
        let report_start = i32r(&mut r)? as i64;
        let report_step = i32r(&mut r)? as i64;
        let duration = i32r(&mut r)? as i64;
        let title = (0..3)
            .map(|_| textr(&mut r, TITLE_BYTES))
            .collect::<IoResult<Vec<_>>>()?;
        let chem_name = textr(&mut r, ID_BYTES)?;
        let chem_units = textr(&mut r, ID_BYTES)?;
        let node_ids = (0..nnodes)
            .map(|_| textr(&mut r, ID_BYTES))
            .collect::<IoResult<Vec<_>>>()?;
        let link_ids = (0..nlinks)
            .map(|_| textr(&mut r, ID_BYTES))
            .collect::<IoResult<Vec<_>>>()?;
        // link topology + static element data, skipped for export purposes
        skip(&mut r, nlinks * 4 * 3)?;
        skip(&mut r, ntanks * 4 * 2)?;
        skip(&mut r, nnodes * 4)?;
        skip(&mut r, nlinks * 4 * 2)?;

        // period blocks run until the epilog; the period count sits in the
        // trailer, so compute it from the remaining byte count instead
        let period_bytes = (4 * nnodes + 6 * nlinks) * 4;
        let epilog_bytes = npumps * 7 * 4 + 4 + 12;
        let mut rest = Vec::new();
        r.read_to_end(&mut rest)?;
        if rest.len() < epilog_bytes || (rest.len() - epilog_bytes) % period_bytes != 0 {
            return Err(IoError::OutputOpen);
        }
        let nperiods = (rest.len() - epilog_bytes) / period_bytes;

        let mut cursor = 0_usize;
        let take_f32 = |buf: &[u8], at: &mut usize| -> f32 {
            let v = f32::from_le_bytes(buf[*at..*at + 4].try_into().expect("length checked"));
            *at += 4;
            v
        };
        let mut periods = Vec::with_capacity(nperiods);
        for _ in 0..nperiods {
            let mut p = PeriodResults::default();
            for block in [
                &mut p.node_demand,
                &mut p.node_head,
                &mut p.node_pressure,
                &mut p.node_quality,
            ] {
                for _ in 0..nnodes {
                    block.push(take_f32(&rest, &mut cursor));
                }
            }
            for block in [
                &mut p.link_flow,
                &mut p.link_velocity,
                &mut p.link_headloss,
                &mut p.link_quality,
                &mut p.link_status,
                &mut p.link_setting,
            ] {
                for _ in 0..nlinks {
                    block.push(take_f32(&rest, &mut cursor));
                }
            }
            periods.push(p);
        }

        let mut pump_energy = Vec::with_capacity(npumps);
        for _ in 0..npumps {
            let link_position =
                i32::from_le_bytes(rest[cursor..cursor + 4].try_into().expect("length checked"));
            cursor += 4;
            pump_energy.push(PumpEnergyRecord {
                link_position,
                time_online_pct: take_f32(&rest, &mut cursor),
                avg_efficiency: take_f32(&rest, &mut cursor),
                kwhrs_per_vol: take_f32(&rest, &mut cursor),
                avg_kw: take_f32(&rest, &mut cursor),
                peak_kw: take_f32(&rest, &mut cursor),
                total_cost: take_f32(&rest, &mut cursor),
            });
        }
        let demand_charge = take_f32(&rest, &mut cursor);
        let stored_periods = i32::from_le_bytes(rest[cursor..cursor + 4].try_into().expect("length checked"));
        cursor += 4;
        let warnings = i32::from_le_bytes(rest[cursor..cursor + 4].try_into().expect("length checked"));
        cursor += 4;
        let trailer = i32::from_le_bytes(rest[cursor..cursor + 4].try_into().expect("length checked"));
        if trailer != OUT_MAGIC || stored_periods as usize != nperiods {
            return Err(IoError::OutputOpen);
        }

        Ok(Self {
            nnodes,
            ntanks,
            nlinks,
            npumps,
            nvalves,
            qualflag,
            flow_units,
            pressure_units,
            statistic,
            report_start,
            report_step,
            duration,
            title,
            chem_name,
            chem_units,
            node_ids,
            link_ids,
            periods,
            pump_energy,
            demand_charge,
            warnings,
        })
    }
}

fn i32r<R: Read>(r: &mut R) -> IoResult<i32> {
    let mut buf = [0_u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn textr<R: Read>(r: &mut R, width: usize) -> IoResult<String> {
    let mut buf = vec![0_u8; width];
    r.read_exact(&mut buf)?;
    let end = buf.iter().position(|b| *b == 0).unwrap_or(width);
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

fn skip<R: Read>(r: &mut R, bytes: usize) -> IoResult<()> {
    let mut buf = vec![0_u8; bytes];
    r.read_exact(&mut buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{LinkKind, NodeKind};

    #[test]
    fn prolog_period_epilog_round_trip() {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        net.add_link("P1", LinkKind::Pipe, r, j).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.out");
        let meta = OutMeta {
            title: vec!["test run".to_string()],
            report_step: 3600,
            duration: 3600,
            chem_name: "Chlorine".into(),
            chem_units: "mg/L".into(),
            ..OutMeta::default()
        };
        let mut w = OutWriter::create(&path, &net, &meta).unwrap();
        let period = PeriodResults {
            node_demand: vec![10.0, -10.0],
            node_head: vec![700.0, 710.0],
            node_pressure: vec![30.0, 0.0],
            node_quality: vec![0.5, 1.0],
            link_flow: vec![10.0],
            link_velocity: vec![2.5],
            link_headloss: vec![4.0],
            link_quality: vec![0.75],
            link_status: vec![3.0],
            link_setting: vec![1.0],
        };
        w.write_period(&period).unwrap();
        w.write_period(&period).unwrap();
        w.finish(&[], 0.0, 1).unwrap();

        let out = OutReader::open(&path).unwrap();
        assert_eq!(out.nnodes, 2);
        assert_eq!(out.nlinks, 1);
        assert_eq!(out.periods.len(), 2);
        assert_eq!(out.node_ids, vec!["J1".to_string(), "R1".to_string()]);
        assert_eq!(out.periods[0], period);
        assert_eq!(out.warnings, 1);
        assert_eq!(out.title[0], "test run");
    }
}
