//! Pipetting engines.
//!
//! Each submodule turns one kind of liquid-handling intent into robot
//! primitives: [`dispense`] places single dispenses inside a well,
//! [`transfer`] orchestrates multi-destination transfers, [`dilution`]
//! chains serial dilutions, and [`standard_curve`] lays out calibration
//! curves on the assay plate.
//!
//! The free functions here are the shared liquid primitives. They forward
//! to the robot driver and keep the [`Pipette`] bookkeeping (tip mounted,
//! liquid held) in step with what the hardware just did, so every engine
//! sees consistent state.

pub mod dilution;
pub mod dispense;
pub mod standard_curve;
pub mod transfer;

pub use dilution::{serial_dilution, SerialDilution};
pub use dispense::{offset_dispense, DispenseOptions};
pub use standard_curve::{standard_curve, StandardCurvePlan};
pub use transfer::{transfer, TransferRequest, TransferSource, TransferStrategy};

use tracing::info;

use crate::error::ProtocolResult;
use crate::hardware::RobotDriver;
use crate::labware::Location;
use crate::pipette::Pipette;

/// Picks up a tip if the pipette does not already hold one.
pub async fn ensure_tip(robot: &dyn RobotDriver, pipette: &mut Pipette) -> ProtocolResult<()> {
    if !pipette.has_tip() {
        info!(pipette = pipette.profile().api_name, "picking up a tip");
        robot.pick_up_tip(pipette.mount).await?;
        pipette.note_tip_picked();
    }
    Ok(())
}

/// Drops the mounted tip into the trash.
pub async fn drop_tip(robot: &dyn RobotDriver, pipette: &mut Pipette) -> ProtocolResult<()> {
    robot.drop_tip(pipette.mount).await?;
    pipette.note_tip_dropped();
    Ok(())
}

pub(crate) async fn aspirate(
    robot: &dyn RobotDriver,
    pipette: &mut Pipette,
    volume_ul: f64,
    location: &Location,
    rate: f64,
) -> ProtocolResult<()> {
    robot
        .aspirate(pipette.mount, volume_ul, location, rate)
        .await?;
    pipette.note_aspirated(volume_ul);
    Ok(())
}

pub(crate) async fn dispense_at(
    robot: &dyn RobotDriver,
    pipette: &mut Pipette,
    volume_ul: f64,
    location: &Location,
    rate: f64,
) -> ProtocolResult<()> {
    robot
        .dispense(pipette.mount, volume_ul, location, rate)
        .await?;
    pipette.note_dispensed(volume_ul);
    Ok(())
}

pub(crate) async fn blow_out_at(
    robot: &dyn RobotDriver,
    pipette: &mut Pipette,
    location: &Location,
) -> ProtocolResult<()> {
    robot.blow_out(pipette.mount, location).await?;
    pipette.note_blown_out();
    Ok(())
}
