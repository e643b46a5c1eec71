//! Serial dilution engine.
//!
//! Walks an ordered well sequence, carrying `transfer_volume_ul` from each
//! well into the next and mixing thoroughly at every stop. A dilution step
//! only achieves its intended ratio if the well is fully mixed before the
//! next draw, so each transfer is followed by a configurable number of
//! aspirate/dispense mix cycles with a short settle delay between them.
//!
//! After the last transfer the engine draws the transfer volume once more
//! from the final well and discards it to the trash, leaving every well in
//! the series holding the same volume.

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::ProtocolResult;
use crate::hardware::RobotDriver;
use crate::labware::WellRef;
use crate::ledger::VolumeLedger;
use crate::pipette::Pipette;
use crate::protocol::{aspirate, blow_out_at, dispense_at, drop_tip, ensure_tip};

/// Flow-rate multiple for mixing dispenses and in-series mix draws. The
/// fast stream is what actually stirs the well.
const MIXING_FLOW_RATE: f64 = 10.0;

/// One serial dilution pass over an ordered well sequence.
///
/// Liquid moves from `wells[0]` into `wells[1]`, from `wells[1]` into
/// `wells[2]`, and so on. Built with [`SerialDilution::new`] and refined
/// with the `with_` methods.
#[derive(Debug, Clone)]
pub struct SerialDilution {
    /// The dilution series, in transfer order. The first well is the
    /// source of the chain.
    pub wells: Vec<WellRef>,
    /// Volume carried from each well into the next, in uL.
    pub transfer_volume_ul: f64,
    /// Volume drawn and released per mix cycle, in uL.
    pub mix_volume_ul: f64,
    /// Number of mix cycles at each well.
    pub mix_steps: u32,
    /// Mix-dispense height above the well bottom, in mm. Values above the
    /// default give more axial mixing.
    pub dispense_height_mm: f64,
    /// Blow-out height above the well bottom, in mm.
    pub blowout_height_mm: f64,
    /// Mix the first well before any transfer.
    pub mix_before: bool,
    /// Whether to blow out after mixing at each well.
    pub blowout: bool,
    /// Discard the tip and pick a fresh one after every dilution step.
    pub fresh_tip_each_step: bool,
}

impl SerialDilution {
    /// A dilution pass with default mix parameters.
    pub fn new(wells: Vec<WellRef>, transfer_volume_ul: f64, mix_volume_ul: f64) -> Self {
        SerialDilution {
            wells,
            transfer_volume_ul,
            mix_volume_ul,
            mix_steps: 5,
            dispense_height_mm: 1.0,
            blowout_height_mm: 10.0,
            mix_before: false,
            blowout: true,
            fresh_tip_each_step: false,
        }
    }

    /// Sets the number of mix cycles at each well.
    pub fn with_mix_steps(mut self, steps: u32) -> Self {
        self.mix_steps = steps;
        self
    }

    /// Sets the mix-dispense height above the well bottom, in mm.
    pub fn with_dispense_height(mut self, height_mm: f64) -> Self {
        self.dispense_height_mm = height_mm;
        self
    }

    /// Sets the blow-out height above the well bottom, in mm.
    pub fn with_blowout_height(mut self, height_mm: f64) -> Self {
        self.blowout_height_mm = height_mm;
        self
    }

    /// Mixes the first well before the first transfer.
    pub fn with_mix_before(mut self, mix: bool) -> Self {
        self.mix_before = mix;
        self
    }

    /// Enables or disables blow-out after mixing.
    pub fn with_blowout(mut self, blowout: bool) -> Self {
        self.blowout = blowout;
        self
    }

    /// Discards the tip and picks a fresh one after every dilution step,
    /// trading time for less carryover between steps.
    pub fn with_fresh_tip_each_step(mut self, fresh: bool) -> Self {
        self.fresh_tip_each_step = fresh;
        self
    }
}

/// Executes one serial dilution pass.
///
/// A single-well sequence degenerates to the trailing disposal alone; an
/// empty sequence does nothing.
pub async fn serial_dilution(
    robot: &dyn RobotDriver,
    ledger: &mut VolumeLedger,
    pipette: &mut Pipette,
    plan: &SerialDilution,
    settings: &Settings,
) -> ProtocolResult<()> {
    if plan.wells.is_empty() {
        debug!("serial dilution over an empty well sequence, nothing to do");
        return Ok(());
    }
    let clearance = settings.motion.well_bottom_clearance_mm;
    let channels = pipette.profile().channels;

    ensure_tip(robot, pipette).await?;

    if plan.mix_before {
        info!(well = %plan.wells[0], "mixing before serial transfer");
        mix_at(robot, pipette, &plan.wells[0], plan, 1.0, settings).await?;
        if plan.blowout {
            info!("blowing out pipette");
            blow_out_at(robot, pipette, &plan.wells[0].bottom(plan.blowout_height_mm)).await?;
        }
        robot
            .touch_tip(pipette.mount, settings.motion.gentle_touch_tip_speed_mm_per_s)
            .await?;
    }

    for pair in plan.wells.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        info!(from = %from, to = %to, "serial transfer");
        aspirate(
            robot,
            pipette,
            plan.transfer_volume_ul,
            &from.bottom(clearance),
            1.0,
        )
        .await?;
        dispense_at(
            robot,
            pipette,
            plan.transfer_volume_ul,
            &to.bottom(clearance),
            MIXING_FLOW_RATE,
        )
        .await?;
        ledger.adjust(plan.transfer_volume_ul, from, to, channels)?;

        mix_at(robot, pipette, to, plan, MIXING_FLOW_RATE, settings).await?;
        if plan.blowout {
            info!("blowing out pipette");
            blow_out_at(robot, pipette, &to.bottom(plan.blowout_height_mm)).await?;
        }
        robot
            .touch_tip(pipette.mount, settings.motion.gentle_touch_tip_speed_mm_per_s)
            .await?;

        if plan.fresh_tip_each_step {
            drop_tip(robot, pipette).await?;
            info!("picking up a fresh tip");
            ensure_tip(robot, pipette).await?;
        }
    }

    // The final well received a transfer that was never passed on; draw it
    // back off so every well in the series ends at the same volume.
    if let Some(last) = plan.wells.last() {
        debug!(well = %last, "discarding excess volume");
        aspirate(
            robot,
            pipette,
            plan.transfer_volume_ul,
            &last.bottom(clearance),
            1.0,
        )
        .await?;
        let trash = ledger.trash_well()?;
        ledger.adjust(plan.transfer_volume_ul, last, &trash, channels)?;
        drop_tip(robot, pipette).await?;
    }

    Ok(())
}

async fn mix_at(
    robot: &dyn RobotDriver,
    pipette: &mut Pipette,
    well: &WellRef,
    plan: &SerialDilution,
    aspirate_rate: f64,
    settings: &Settings,
) -> ProtocolResult<()> {
    let clearance = settings.motion.well_bottom_clearance_mm;
    for step in 0..plan.mix_steps {
        debug!(step, well = %well, "mix cycle");
        aspirate(
            robot,
            pipette,
            plan.mix_volume_ul,
            &well.bottom(clearance),
            aspirate_rate,
        )
        .await?;
        dispense_at(
            robot,
            pipette,
            plan.mix_volume_ul,
            &well.bottom(plan.dispense_height_mm),
            MIXING_FLOW_RATE,
        )
        .await?;
        robot.delay_seconds(settings.liquid.mix_settle_s).await?;
    }
    Ok(())
}
