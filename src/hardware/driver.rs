//! The robot driver contract.
//!
//! Liquid-handling protocols are written against [`RobotDriver`], a single
//! async trait covering every physical primitive a run needs: tip handling,
//! liquid moves, gantry moves, the deck's temperature module, and the
//! operator-facing controls (rail lights, pauses, run-log comments).
//!
//! The contract is deliberately low-level. Nothing here batches, retries, or
//! tracks volumes: that is the engine's job. A driver implementation only
//! has to make one primitive happen and report whether the hardware did it.
//!
//! # Contract
//! - Every method runs to physical completion before resolving, so awaiting
//!   primitives one after another reproduces the strictly sequential motion
//!   a pipetting run requires. Implementations must not reorder or overlap
//!   calls.
//! - Volumes are in uL, distances in mm, speeds in mm/s. Rates are
//!   multiples of the instrument's default flow rate.
//! - All methods take `&self`; implementations use interior mutability for
//!   device state.
//! - Errors are hardware-level (`anyhow`), and the engine wraps them into
//!   its own error type at the boundary.

use anyhow::Result;
use async_trait::async_trait;

use crate::labware::Location;
use crate::pipette::Mount;

/// Physical primitives of a liquid-handling robot.
#[async_trait]
pub trait RobotDriver: Send + Sync {
    /// Picks up a fresh tip with the pipette on `mount`.
    ///
    /// # Returns
    /// - Err if a tip is already mounted or no tips remain.
    async fn pick_up_tip(&self, mount: Mount) -> Result<()>;

    /// Drops the current tip into the fixed trash.
    ///
    /// # Returns
    /// - Err if no tip is mounted.
    async fn drop_tip(&self, mount: Mount) -> Result<()>;

    /// Draws `volume_ul` from `location` at the given flow-rate multiple.
    async fn aspirate(
        &self,
        mount: Mount,
        volume_ul: f64,
        location: &Location,
        rate: f64,
    ) -> Result<()>;

    /// Expels `volume_ul` at `location` at the given flow-rate multiple.
    async fn dispense(
        &self,
        mount: Mount,
        volume_ul: f64,
        location: &Location,
        rate: f64,
    ) -> Result<()>;

    /// Expels `volume_ul` at the current gantry position.
    ///
    /// Used after an explicit positioning move, when re-targeting the well
    /// center would undo the offset the caller just set up.
    async fn dispense_in_place(&self, mount: Mount, volume_ul: f64, rate: f64) -> Result<()>;

    /// Pushes the remaining air/liquid out of the tip at `location`.
    async fn blow_out(&self, mount: Mount, location: &Location) -> Result<()>;

    /// Pushes the remaining air/liquid out at the current gantry position.
    async fn blow_out_in_place(&self, mount: Mount) -> Result<()>;

    /// Knocks clinging droplets off the tip against the well rim.
    ///
    /// # Arguments
    /// * `speed_mm_per_s` - Rim-contact speed; slower shakes off less
    ///   violently.
    async fn touch_tip(&self, mount: Mount, speed_mm_per_s: f64) -> Result<()>;

    /// Moves the pipette to `location` without moving liquid.
    ///
    /// # Arguments
    /// * `direct` - Move in a straight line instead of the default
    ///   arc over labware. Only safe for short in-well repositioning.
    async fn move_to(&self, mount: Mount, location: &Location, direct: bool) -> Result<()>;

    /// Homes the gantry to its reference position.
    async fn home(&self) -> Result<()>;

    /// Waits for the given wall-clock time.
    async fn delay_seconds(&self, seconds: f64) -> Result<()>;

    /// Sets the deck temperature module and waits until the block reaches
    /// the target.
    async fn set_temperature_celsius(&self, celsius: f64) -> Result<()>;

    /// Turns the temperature module off.
    async fn deactivate_temperature(&self) -> Result<()>;

    /// Suspends the run until the operator resumes it.
    async fn pause(&self, message: &str) -> Result<()>;

    /// Switches the deck rail lights.
    async fn set_rail_lights(&self, on: bool) -> Result<()>;

    /// Writes a human-readable line into the run log.
    async fn comment(&self, text: &str) -> Result<()>;
}
