use std::sync::Arc;

use crate::{
    controller::{axis::AxisController, limit_switches::LimitSwitchState},
    models::{ApiStatus, AxisId, LimitSwitches, StatusMessage},
};

/// Both axes and their limit switches, shared by the dispatcher, the
/// communication layer and the self test.
pub struct XyStage {
    x: Arc<AxisController>,
    y: Arc<AxisController>,
    x_switches: Arc<LimitSwitchState>,
    y_switches: Arc<LimitSwitchState>,
}

impl XyStage {
    pub fn new(
        x: Arc<AxisController>,
        y: Arc<AxisController>,
        x_switches: Arc<LimitSwitchState>,
        y_switches: Arc<LimitSwitchState>,
    ) -> Self {
        Self {
            x,
            y,
            x_switches,
            y_switches,
        }
    }

    pub fn axis(&self, axis: AxisId) -> &Arc<AxisController> {
        match axis {
            AxisId::X => &self.x,
            AxisId::Y => &self.y,
        }
    }

    pub fn switches(&self, axis: AxisId) -> LimitSwitches {
        match axis {
            AxisId::X => self.x_switches.snapshot(),
            AxisId::Y => self.y_switches.snapshot(),
        }
    }

    /// Live snapshot without the CPU temperature.
    pub fn status(&self) -> StatusMessage {
        let x_switches = self.switches(AxisId::X);
        let y_switches = self.switches(AxisId::Y);

        StatusMessage {
            xpos: self.x.position(),
            ypos: self.y.position(),
            xminswitch: x_switches.min_switch,
            xmaxswitch: x_switches.max_switch,
            yminswitch: y_switches.min_switch,
            ymaxswitch: y_switches.max_switch,
            cputemperature: None,
        }
    }

    pub fn api_status(&self) -> ApiStatus {
        ApiStatus {
            xpos: self.x.position(),
            xmoving: self.x.is_moving(),
            ypos: self.y.position(),
            ymoving: self.y.is_moving(),
        }
    }

    /// Persists both positions and stops both axes. Blocks on GPIO writes.
    pub fn shutdown(&self) {
        for axis in AxisId::ALL {
            let controller = self.axis(axis);
            controller.stop();
            controller.persist_position();
        }
    }
}
