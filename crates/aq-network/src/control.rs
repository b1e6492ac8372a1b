//! Simple (single-condition) operational controls.

use crate::link::LinkStatus;
use aq_core::time::Seconds;
use aq_core::{LinkIdx, NodeIdx};

/// What triggers a simple control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlKind {
    /// Node grade/pressure drops below the threshold.
    LowLevel = 0,
    /// Node grade/pressure rises above the threshold.
    HiLevel = 1,
    /// Fires at an elapsed simulation time.
    Timer = 2,
    /// Fires at a time of day.
    TimeOfDay = 3,
}

impl ControlKind {
    pub fn from_value(v: u8) -> Option<Self> {
        use ControlKind::*;
        [LowLevel, HiLevel, Timer, TimeOfDay]
            .into_iter()
            .find(|k| *k as u8 == v)
    }
}

/// A simple control: when the condition holds, the target link is driven to
/// the stated status and setting.
#[derive(Debug, Clone, PartialEq)]
pub struct Control {
    pub kind: ControlKind,
    pub link: LinkIdx,
    /// Controlling node; None for time-based controls.
    pub node: Option<NodeIdx>,
    pub status: LinkStatus,
    pub setting: f64,
    /// Threshold grade (level controls), internal head units.
    pub grade: f64,
    /// Trigger time (time controls), seconds.
    pub time: Seconds,
}
