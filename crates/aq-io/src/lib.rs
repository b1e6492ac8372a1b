//! aq-io: file adapters for the engine.
//!
//! - INP text reader/writer (the network interchange format)
//! - hydraulics scratch file (binary per-period snapshots shared by the
//!   hydraulic and water-quality solvers)
//! - output file (binary reporting results)
//! - text report writer
//! - results export (JSON/CSV decoding of the output file)

pub mod convert;
pub mod error;
pub mod hydfile;
pub mod inp;
pub mod inp_write;
pub mod outfile;
pub mod report;
pub mod results;

pub use error::{IoError, IoResult};
pub use hydfile::{HydHeader, HydReader, HydSnapshot, HydWriter};
pub use inp::{ParsedModel, read_inp, read_inp_str};
pub use inp_write::write_inp;
pub use outfile::{OutReader, OutWriter, PeriodResults, PumpEnergyRecord};
pub use report::{ReportOptions, ReportWriter, StatusLevel};
