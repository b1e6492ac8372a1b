//! Hydraulics scratch file.
//!
//! Binary layout, all integers little-endian INT32, floats f64:
//!
//! ```text
//! header:  magic, version, nnodes, nlinks, ntanks, npumps, nvalves, duration
//! period:  time (INT32 seconds)
//!          demands  (nnodes x f64)
//!          heads    (nnodes x f64)
//!          flows    (nlinks x f64)
//!          statuses (nlinks x INT32)
//!          settings (nlinks x f64)
//! ```
//!
//! The file doubles as the interchange format for `save_hyd_file` /
//! `use_hyd_file`; a reader validates all six header shape fields against
//! the current network before any snapshot is consumed.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use aq_core::time::Seconds;
use aq_network::{LinkStatus, Network};

use crate::error::{IoError, IoResult};

pub const HYD_MAGIC: i32 = 0x200;
pub const ENGINE_VERSION: i32 = 20012;

/// Network shape recorded in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HydHeader {
    pub nnodes: usize,
    pub nlinks: usize,
    pub ntanks: usize,
    pub npumps: usize,
    pub nvalves: usize,
    pub duration: Seconds,
}

impl HydHeader {
    pub fn of(net: &Network, duration: Seconds) -> Self {
        Self {
            nnodes: net.n_nodes(),
            nlinks: net.n_links(),
            ntanks: net.n_tanks(),
            npumps: net.n_pumps(),
            nvalves: net.n_valves(),
            duration,
        }
    }

    pub fn matches(&self, net: &Network) -> bool {
        self.nnodes == net.n_nodes()
            && self.nlinks == net.n_links()
            && self.ntanks == net.n_tanks()
            && self.npumps == net.n_pumps()
            && self.nvalves == net.n_valves()
    }
}

/// One converged hydraulic period.
#[derive(Debug, Clone, PartialEq)]
pub struct HydSnapshot {
    pub time: Seconds,
    pub demands: Vec<f64>,
    pub heads: Vec<f64>,
    pub flows: Vec<f64>,
    pub statuses: Vec<LinkStatus>,
    pub settings: Vec<f64>,
}

pub struct HydWriter {
    out: BufWriter<File>,
}

impl HydWriter {
    pub fn create(path: &Path, header: &HydHeader) -> IoResult<Self> {
        let file = File::create(path).map_err(|_| IoError::HydOpen)?;
        let mut writer = Self {
            out: BufWriter::new(file),
        };
        writer.write_i32(HYD_MAGIC)?;
        writer.write_i32(ENGINE_VERSION)?;
        writer.write_i32(header.nnodes as i32)?;
        writer.write_i32(header.nlinks as i32)?;
        writer.write_i32(header.ntanks as i32)?;
        writer.write_i32(header.npumps as i32)?;
        writer.write_i32(header.nvalves as i32)?;
        writer.write_i32(header.duration as i32)?;
        Ok(writer)
    }

    pub fn write_snapshot(&mut self, snap: &HydSnapshot) -> IoResult<()> {
        self.write_i32(snap.time as i32)?;
        for v in &snap.demands {
            self.out.write_all(&v.to_le_bytes())?;
        }
        for v in &snap.heads {
            self.out.write_all(&v.to_le_bytes())?;
        }
        for v in &snap.flows {
            self.out.write_all(&v.to_le_bytes())?;
        }
        for s in &snap.statuses {
            self.write_i32(*s as i32)?;
        }
        for v in &snap.settings {
            self.out.write_all(&v.to_le_bytes())?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> IoResult<()> {
        self.out.flush()?;
        Ok(())
    }

    fn write_i32(&mut self, v: i32) -> IoResult<()> {
        self.out.write_all(&v.to_le_bytes())?;
        Ok(())
    }
}

pub struct HydReader {
    input: BufReader<File>,
    header: HydHeader,
}

impl HydReader {
    /// Open a hydraulics file and validate its magic, version and shape.
    pub fn open(path: &Path, net: &Network) -> IoResult<Self> {
        let file = File::open(path).map_err(|_| IoError::HydOpen)?;
        let mut input = BufReader::new(file);
        let magic = read_i32(&mut input)?;
        let version = read_i32(&mut input)?;
        if magic != HYD_MAGIC || version != ENGINE_VERSION {
            return Err(IoError::HydMismatch);
        }
        let header = HydHeader {
            nnodes: read_i32(&mut input)? as usize,
            nlinks: read_i32(&mut input)? as usize,
            ntanks: read_i32(&mut input)? as usize,
            npumps: read_i32(&mut input)? as usize,
            nvalves: read_i32(&mut input)? as usize,
            duration: read_i32(&mut input)? as Seconds,
        };
        if !header.matches(net) {
            return Err(IoError::HydMismatch);
        }
        Ok(Self { input, header })
    }

    pub fn header(&self) -> &HydHeader {
        &self.header
    }

    /// Read the next period; None at end of file.
    pub fn read_snapshot(&mut self) -> IoResult<Option<HydSnapshot>> {
        let mut time_buf = [0_u8; 4];
        match self.input.read_exact(&mut time_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let time = i32::from_le_bytes(time_buf) as Seconds;

        let n = self.header.nnodes;
        let l = self.header.nlinks;
        let demands = read_f64_vec(&mut self.input, n)?;
        let heads = read_f64_vec(&mut self.input, n)?;
        let flows = read_f64_vec(&mut self.input, l)?;
        let mut statuses = Vec::with_capacity(l);
        for _ in 0..l {
            let raw = read_i32(&mut self.input)?;
            statuses.push(
                LinkStatus::from_value(raw.clamp(0, 7) as u8).unwrap_or(LinkStatus::Open),
            );
        }
        let settings = read_f64_vec(&mut self.input, l)?;
        Ok(Some(HydSnapshot {
            time,
            demands,
            heads,
            flows,
            statuses,
            settings,
        }))
    }
}

fn read_i32<R: Read>(r: &mut R) -> IoResult<i32> {
    let mut buf = [0_u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f64_vec<R: Read>(r: &mut R, n: usize) -> IoResult<Vec<f64>> {
    let mut out = Vec::with_capacity(n);
    let mut buf = [0_u8; 8];
    for _ in 0..n {
        r.read_exact(&mut buf)?;
        out.push(f64::from_le_bytes(buf));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aq_network::{LinkKind, NodeKind};

    fn two_node_net() -> Network {
        let mut net = Network::new();
        let j = net.add_node("J1", NodeKind::Junction).unwrap();
        let r = net.add_node("R1", NodeKind::Reservoir).unwrap();
        net.add_link("P1", LinkKind::Pipe, r, j).unwrap();
        net
    }

    #[test]
    fn snapshot_round_trip() {
        let net = two_node_net();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyd.bin");

        let header = HydHeader::of(&net, 3600);
        let mut writer = HydWriter::create(&path, &header).unwrap();
        let snap = HydSnapshot {
            time: 0,
            demands: vec![1.25, -1.25],
            heads: vec![700.0, 710.0],
            flows: vec![1.25],
            statuses: vec![LinkStatus::Open],
            settings: vec![1.0],
        };
        writer.write_snapshot(&snap).unwrap();
        writer.finish().unwrap();

        let mut reader = HydReader::open(&path, &net).unwrap();
        assert_eq!(reader.header().duration, 3600);
        let got = reader.read_snapshot().unwrap().unwrap();
        assert_eq!(got, snap);
        assert!(reader.read_snapshot().unwrap().is_none());
    }

    #[test]
    fn shape_mismatch_rejected() {
        let net = two_node_net();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyd.bin");
        let header = HydHeader::of(&net, 0);
        HydWriter::create(&path, &header).unwrap().finish().unwrap();

        let mut bigger = two_node_net();
        bigger.add_node("J2", NodeKind::Junction).unwrap();
        assert!(matches!(
            HydReader::open(&path, &bigger),
            Err(IoError::HydMismatch)
        ));
    }

    #[test]
    fn bad_magic_rejected() {
        let net = two_node_net();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hyd.bin");
        std::fs::write(&path, 99_i32.to_le_bytes()).unwrap();
        assert!(HydReader::open(&path, &net).is_err());
    }
}
