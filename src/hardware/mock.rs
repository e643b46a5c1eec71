//! Mock robot implementation.
//!
//! Provides a simulated liquid-handling robot for protocol development and
//! testing without physical hardware. Every driver call is recorded in an
//! ordered action log that tests can assert against, and basic invalid-use
//! states (dispensing without a tip, double tip pick-up) fail the same way
//! real hardware would.
//!
//! By default the mock runs at zero wall-clock time: `delay_seconds` and
//! `pause` record themselves and return immediately, so a full simulated
//! assay run finishes in milliseconds. [`MockRobot::with_realtime_delays`]
//! restores real sleeps for demos that should feel like a run.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

use crate::hardware::driver::RobotDriver;
use crate::labware::Location;
use crate::pipette::Mount;

/// One recorded robot primitive, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum RobotAction {
    /// A tip was picked up.
    PickUpTip {
        /// Pipette mount.
        mount: Mount,
    },
    /// The tip was dropped into the trash.
    DropTip {
        /// Pipette mount.
        mount: Mount,
    },
    /// Liquid was drawn.
    Aspirate {
        /// Pipette mount.
        mount: Mount,
        /// Volume in uL.
        volume_ul: f64,
        /// Where the liquid was drawn from.
        location: Location,
        /// Flow-rate multiple.
        rate: f64,
    },
    /// Liquid was expelled at a location.
    Dispense {
        /// Pipette mount.
        mount: Mount,
        /// Volume in uL.
        volume_ul: f64,
        /// Where the liquid was expelled.
        location: Location,
        /// Flow-rate multiple.
        rate: f64,
    },
    /// Liquid was expelled at the current position.
    DispenseInPlace {
        /// Pipette mount.
        mount: Mount,
        /// Volume in uL.
        volume_ul: f64,
        /// Flow-rate multiple.
        rate: f64,
    },
    /// The tip was blown out at a location.
    BlowOut {
        /// Pipette mount.
        mount: Mount,
        /// Where the blow-out happened.
        location: Location,
    },
    /// The tip was blown out at the current position.
    BlowOutInPlace {
        /// Pipette mount.
        mount: Mount,
    },
    /// The tip touched the well rim.
    TouchTip {
        /// Pipette mount.
        mount: Mount,
        /// Rim-contact speed in mm/s.
        speed_mm_per_s: f64,
    },
    /// The gantry moved.
    MoveTo {
        /// Pipette mount.
        mount: Mount,
        /// Target location.
        location: Location,
        /// Whether the move was direct rather than arced.
        direct: bool,
    },
    /// The gantry homed.
    Home,
    /// The run waited.
    Delay {
        /// Wait time in seconds.
        seconds: f64,
    },
    /// The temperature module was set.
    SetTemperature {
        /// Target block temperature in Celsius.
        celsius: f64,
    },
    /// The temperature module was turned off.
    DeactivateTemperature,
    /// The run paused for the operator.
    Pause {
        /// Message shown to the operator.
        message: String,
    },
    /// The rail lights switched.
    SetRailLights {
        /// New light state.
        on: bool,
    },
    /// A comment was written to the run log.
    Comment {
        /// Comment text.
        text: String,
    },
}

#[derive(Default)]
struct MockState {
    actions: Vec<RobotAction>,
    left_tip: bool,
    right_tip: bool,
    target_temperature_c: Option<f64>,
    rail_lights_on: bool,
}

impl MockState {
    fn tip_mut(&mut self, mount: Mount) -> &mut bool {
        match mount {
            Mount::Left => &mut self.left_tip,
            Mount::Right => &mut self.right_tip,
        }
    }

    fn require_tip(&self, mount: Mount) -> Result<()> {
        let has_tip = match mount {
            Mount::Left => self.left_tip,
            Mount::Right => self.right_tip,
        };
        if !has_tip {
            bail!("MockRobot: {mount} pipette has no tip mounted");
        }
        Ok(())
    }
}

/// Simulated liquid-handling robot with an ordered action log.
///
/// Clones share state, so a protocol engine and a test can hold the same
/// mock and the test sees everything the engine did.
///
/// # Example
///
/// ```rust,ignore
/// let robot = MockRobot::new();
/// robot.pick_up_tip(Mount::Left).await?;
/// robot.aspirate(Mount::Left, 20.0, &source.bottom(1.0), 1.0).await?;
/// assert_eq!(robot.action_count().await, 2);
/// ```
#[derive(Clone)]
pub struct MockRobot {
    state: Arc<Mutex<MockState>>,
    realtime_delays: bool,
}

impl MockRobot {
    /// Creates a mock robot that records delays without sleeping.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            realtime_delays: false,
        }
    }

    /// Creates a mock robot whose delays take real wall-clock time.
    pub fn with_realtime_delays() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            realtime_delays: true,
        }
    }

    /// A copy of the recorded action log, in call order.
    pub async fn actions(&self) -> Vec<RobotAction> {
        self.state.lock().await.actions.clone()
    }

    /// Number of recorded actions.
    pub async fn action_count(&self) -> usize {
        self.state.lock().await.actions.len()
    }

    /// Clears the action log without touching tip or module state.
    pub async fn clear_actions(&self) {
        self.state.lock().await.actions.clear();
    }

    /// Whether the given mount currently has a tip.
    pub async fn has_tip(&self, mount: Mount) -> bool {
        let state = self.state.lock().await;
        match mount {
            Mount::Left => state.left_tip,
            Mount::Right => state.right_tip,
        }
    }

    /// The temperature module's current target, if it is on.
    pub async fn target_temperature(&self) -> Option<f64> {
        self.state.lock().await.target_temperature_c
    }

    /// Current rail-light state.
    pub async fn rail_lights_on(&self) -> bool {
        self.state.lock().await.rail_lights_on
    }
}

impl Default for MockRobot {
    fn default() -> Self {
        Self::new()
    }
}

fn check_volume(volume_ul: f64) -> Result<()> {
    if !volume_ul.is_finite() || volume_ul < 0.0 {
        bail!("MockRobot: liquid volume must be a non-negative number, got {volume_ul}");
    }
    Ok(())
}

#[async_trait]
impl RobotDriver for MockRobot {
    async fn pick_up_tip(&self, mount: Mount) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state.tip_mut(mount) {
            bail!("MockRobot: {mount} pipette already has a tip");
        }
        *state.tip_mut(mount) = true;
        state.actions.push(RobotAction::PickUpTip { mount });
        Ok(())
    }

    async fn drop_tip(&self, mount: Mount) -> Result<()> {
        let mut state = self.state.lock().await;
        if !*state.tip_mut(mount) {
            bail!("MockRobot: {mount} pipette has no tip to drop");
        }
        *state.tip_mut(mount) = false;
        state.actions.push(RobotAction::DropTip { mount });
        Ok(())
    }

    async fn aspirate(
        &self,
        mount: Mount,
        volume_ul: f64,
        location: &Location,
        rate: f64,
    ) -> Result<()> {
        check_volume(volume_ul)?;
        let mut state = self.state.lock().await;
        state.require_tip(mount)?;
        state.actions.push(RobotAction::Aspirate {
            mount,
            volume_ul,
            location: location.clone(),
            rate,
        });
        Ok(())
    }

    async fn dispense(
        &self,
        mount: Mount,
        volume_ul: f64,
        location: &Location,
        rate: f64,
    ) -> Result<()> {
        check_volume(volume_ul)?;
        let mut state = self.state.lock().await;
        state.require_tip(mount)?;
        state.actions.push(RobotAction::Dispense {
            mount,
            volume_ul,
            location: location.clone(),
            rate,
        });
        Ok(())
    }

    async fn dispense_in_place(&self, mount: Mount, volume_ul: f64, rate: f64) -> Result<()> {
        check_volume(volume_ul)?;
        let mut state = self.state.lock().await;
        state.require_tip(mount)?;
        state
            .actions
            .push(RobotAction::DispenseInPlace { mount, volume_ul, rate });
        Ok(())
    }

    async fn blow_out(&self, mount: Mount, location: &Location) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require_tip(mount)?;
        state.actions.push(RobotAction::BlowOut {
            mount,
            location: location.clone(),
        });
        Ok(())
    }

    async fn blow_out_in_place(&self, mount: Mount) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require_tip(mount)?;
        state.actions.push(RobotAction::BlowOutInPlace { mount });
        Ok(())
    }

    async fn touch_tip(&self, mount: Mount, speed_mm_per_s: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require_tip(mount)?;
        state
            .actions
            .push(RobotAction::TouchTip { mount, speed_mm_per_s });
        Ok(())
    }

    async fn move_to(&self, mount: Mount, location: &Location, direct: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.actions.push(RobotAction::MoveTo {
            mount,
            location: location.clone(),
            direct,
        });
        Ok(())
    }

    async fn home(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.actions.push(RobotAction::Home);
        Ok(())
    }

    async fn delay_seconds(&self, seconds: f64) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.actions.push(RobotAction::Delay { seconds });
        }
        if self.realtime_delays {
            sleep(Duration::from_secs_f64(seconds.max(0.0))).await;
        }
        Ok(())
    }

    async fn set_temperature_celsius(&self, celsius: f64) -> Result<()> {
        let mut state = self.state.lock().await;
        state.target_temperature_c = Some(celsius);
        state.actions.push(RobotAction::SetTemperature { celsius });
        Ok(())
    }

    async fn deactivate_temperature(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.target_temperature_c = None;
        state.actions.push(RobotAction::DeactivateTemperature);
        Ok(())
    }

    async fn pause(&self, message: &str) -> Result<()> {
        // The simulated operator resumes immediately; the message is kept
        // for assertions.
        let mut state = self.state.lock().await;
        state.actions.push(RobotAction::Pause {
            message: message.to_string(),
        });
        Ok(())
    }

    async fn set_rail_lights(&self, on: bool) -> Result<()> {
        let mut state = self.state.lock().await;
        state.rail_lights_on = on;
        state.actions.push(RobotAction::SetRailLights { on });
        Ok(())
    }

    async fn comment(&self, text: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.actions.push(RobotAction::Comment {
            text: text.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labware::Labware;

    #[tokio::test]
    async fn test_tip_lifecycle() {
        let robot = MockRobot::new();
        assert!(!robot.has_tip(Mount::Left).await);

        robot.pick_up_tip(Mount::Left).await.unwrap();
        assert!(robot.has_tip(Mount::Left).await);
        // The other mount is unaffected.
        assert!(!robot.has_tip(Mount::Right).await);

        robot.drop_tip(Mount::Left).await.unwrap();
        assert!(!robot.has_tip(Mount::Left).await);
    }

    #[tokio::test]
    async fn test_double_pick_up_fails() {
        let robot = MockRobot::new();
        robot.pick_up_tip(Mount::Right).await.unwrap();
        assert!(robot.pick_up_tip(Mount::Right).await.is_err());
    }

    #[tokio::test]
    async fn test_liquid_ops_require_a_tip() {
        let robot = MockRobot::new();
        let well = Labware::nest_12_reservoir_15ml("reservoir")
            .well("A1")
            .unwrap();

        assert!(robot
            .aspirate(Mount::Left, 20.0, &well.bottom(1.0), 1.0)
            .await
            .is_err());
        assert!(robot.dispense_in_place(Mount::Left, 20.0, 1.0).await.is_err());
        assert!(robot.touch_tip(Mount::Left, 60.0).await.is_err());
        assert!(robot.drop_tip(Mount::Left).await.is_err());
    }

    #[tokio::test]
    async fn test_negative_volume_is_rejected() {
        let robot = MockRobot::new();
        robot.pick_up_tip(Mount::Left).await.unwrap();
        let well = Labware::nest_12_reservoir_15ml("reservoir")
            .well("A1")
            .unwrap();
        assert!(robot
            .aspirate(Mount::Left, -5.0, &well.bottom(1.0), 1.0)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_actions_are_recorded_in_order() {
        let robot = MockRobot::new();
        let well = Labware::nest_12_reservoir_15ml("reservoir")
            .well("A1")
            .unwrap();

        robot.pick_up_tip(Mount::Left).await.unwrap();
        robot
            .aspirate(Mount::Left, 20.0, &well.bottom(1.0), 1.0)
            .await
            .unwrap();
        robot.delay_seconds(0.5).await.unwrap();
        robot.drop_tip(Mount::Left).await.unwrap();

        let actions = robot.actions().await;
        assert_eq!(actions.len(), 4);
        assert_eq!(actions[0], RobotAction::PickUpTip { mount: Mount::Left });
        assert!(matches!(actions[1], RobotAction::Aspirate { .. }));
        assert!(matches!(actions[2], RobotAction::Delay { .. }));
        assert_eq!(actions[3], RobotAction::DropTip { mount: Mount::Left });
    }

    #[tokio::test]
    async fn test_temperature_module_state() {
        let robot = MockRobot::new();
        assert_eq!(robot.target_temperature().await, None);

        robot.set_temperature_celsius(50.0).await.unwrap();
        assert_eq!(robot.target_temperature().await, Some(50.0));

        robot.deactivate_temperature().await.unwrap();
        assert_eq!(robot.target_temperature().await, None);
    }

    #[tokio::test]
    async fn test_rail_lights_state() {
        let robot = MockRobot::new();
        robot.set_rail_lights(true).await.unwrap();
        assert!(robot.rail_lights_on().await);
        robot.set_rail_lights(false).await.unwrap();
        assert!(!robot.rail_lights_on().await);
    }
}
