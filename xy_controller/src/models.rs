use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::controller::sequence::CoilPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    X,
    Y,
}

impl AxisId {
    pub const ALL: [AxisId; 2] = [AxisId::X, AxisId::Y];
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisId::X => write!(f, "x"),
            AxisId::Y => write!(f, "y"),
        }
    }
}

/// Point-in-time copy of one axis. Fields are read independently, so a
/// snapshot taken mid-move may mix values from adjacent steps.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisState {
    pub axis: AxisId,
    pub position: i32,
    pub lower_limit: i32,
    pub upper_limit: i32,
    pub sequence_index: usize,
    pub moving: bool,
    pub calibrating: bool,
    pub pulse_width: Duration,
    pub generation: u64,
    pub completed_moves: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LimitSwitches {
    pub min_switch: bool,
    pub max_switch: bool,
}

/// Snapshot served to the status page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusMessage {
    pub xpos: i32,
    pub ypos: i32,
    pub xminswitch: bool,
    pub xmaxswitch: bool,
    pub yminswitch: bool,
    pub ymaxswitch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cputemperature: Option<f64>,
}

/// Snapshot served to API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiStatus {
    pub xpos: i32,
    pub xmoving: bool,
    pub ypos: i32,
    pub ymoving: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    MoveRelative { axis: AxisId, steps: i32 },
    MoveToAbsolute { axis: AxisId, target: i32 },
    RawOutput(CoilPattern),
    Stop { axis: AxisId },
    Restart { delay: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Accepted,
    Ignored,
    Status(ApiStatus),
}
