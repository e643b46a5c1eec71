//! Hardware Abstraction
//!
//! The [`RobotDriver`] trait is the seam between protocol logic and the
//! physical robot. Protocol engines speak only in driver primitives, so the
//! same run executes against real hardware or against [`MockRobot`] in tests
//! and dry runs.

pub mod driver;
pub mod mock;

pub use driver::RobotDriver;
pub use mock::{MockRobot, RobotAction};
