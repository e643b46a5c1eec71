//! The assay run: deck layout and machine-facing phases.
//!
//! [`AssayRun`] owns the driver handle, the volume ledger, and both
//! pipettes, and walks the four phases of a plate build in order: enzyme
//! dilutions, standard curves, reagent addition, and the heated reaction
//! start. Each phase is a public method, so a run can be driven whole with
//! [`AssayRun::execute`] or stepped phase by phase while troubleshooting.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{ProtocolError, ProtocolResult};
use crate::experiment::design::{level_batches, ExperimentDesign};
use crate::geometry::{dispense_height_for_volume, OffsetDirection};
use crate::hardware::RobotDriver;
use crate::labware::{Labware, WellAddress, WellRef};
use crate::ledger::VolumeLedger;
use crate::pipette::{Mount, Pipette, PipetteModel};
use crate::protocol::{
    drop_tip, ensure_tip, serial_dilution, standard_curve, transfer, SerialDilution,
    StandardCurvePlan, TransferRequest,
};

/// Block temperature while the reaction runs, in degrees C.
const REACTION_TEMPERATURE_C: f64 = 50.0;

/// Buffer volume drawn from one trough well before rotating to the next,
/// in uL.
const TROUGH_BUDGET_UL: f64 = 10_000.0;

/// Buffer volume moved into each well of the dilution row, in uL.
const DILUTION_TRANSFER_VOLUME_UL: f64 = 300.0;

/// Mix volume used while chaining the enzyme dilution series, in uL.
const DILUTION_MIX_VOLUME_UL: f64 = 200.0;

/// Wells in the enzyme dilution series, laid across deep-well row A.
const DILUTION_SERIES_LENGTH: u8 = 8;

/// Mix cycles per step of the enzyme dilution series.
const DILUTION_MIX_STEPS: u32 = 10;

/// Dispense height while chaining the enzyme dilutions, in mm.
const DILUTION_DISPENSE_HEIGHT_MM: f64 = 12.0;

/// Blow-out height for the enzyme dilution mixes, in mm.
const DILUTION_BLOWOUT_HEIGHT_MM: f64 = 20.0;

/// Reservoir columns holding dilution buffer, in rotation order.
const BUFFER_TROUGH_COLUMNS: [u8; 2] = [10, 11];

/// Reduced plunger rate for reagent dispenses into the assay plate.
const REAGENT_DISPENSE_RATE: f64 = 0.5;

/// The fixed deck layout the run is written against.
#[derive(Debug, Clone)]
pub struct Deck {
    /// 384-well assay plate, mounted on the temperature module.
    pub assay_plate: Labware,
    /// Deep-well plate holding enzyme dilutions and reagent stocks.
    pub deepwell: Labware,
    /// 12-channel buffer reservoir.
    pub reservoir: Labware,
    /// Fixed trash.
    pub trash: Labware,
}

impl Deck {
    /// The standard deck: assay plate on the heater block in slot 8, deep
    /// well in slot 5, reservoir in slot 2.
    pub fn standard() -> Self {
        Deck {
            assay_plate: Labware::corning_384_wellplate_112ul_flat("assay-plate"),
            deepwell: Labware::usascientific_96_wellplate_2400ul_deep("deepwell"),
            reservoir: Labware::nest_12_reservoir_15ml("reservoir"),
            trash: Labware::fixed_trash(),
        }
    }

    /// All plates, in the order a volume ledger should register them.
    pub fn plates(&self) -> Vec<Labware> {
        vec![
            self.assay_plate.clone(),
            self.deepwell.clone(),
            self.reservoir.clone(),
            self.trash.clone(),
        ]
    }
}

/// Blinks the rail lights to call the operator over, ending with them on.
pub async fn blink_rail_lights(
    robot: &dyn RobotDriver,
    times: u32,
    half_period_s: f64,
) -> ProtocolResult<()> {
    for _ in 0..times {
        robot.set_rail_lights(false).await?;
        robot.delay_seconds(half_period_s).await?;
        robot.set_rail_lights(true).await?;
        robot.delay_seconds(half_period_s).await?;
    }
    Ok(())
}

/// A full assay build, from enzyme dilutions to the heated reaction start.
pub struct AssayRun {
    robot: Arc<dyn RobotDriver>,
    settings: Settings,
    deck: Deck,
    design: ExperimentDesign,
    ledger: VolumeLedger,
    p20: Pipette,
    p300m: Pipette,
}

impl AssayRun {
    /// Sets up a run on the standard deck with the standard pipette pair:
    /// single-channel P20 on the left mount, 8-channel P300 on the right.
    pub fn new(robot: Arc<dyn RobotDriver>, design: ExperimentDesign, settings: Settings) -> Self {
        let deck = Deck::standard();
        let ledger = VolumeLedger::new(deck.plates());
        AssayRun {
            robot,
            settings,
            deck,
            design,
            ledger,
            p20: Pipette::new(PipetteModel::P20SingleGen2, Mount::Left),
            p300m: Pipette::new(PipetteModel::P300MultiGen2, Mount::Right),
        }
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    pub fn ledger(&self) -> &VolumeLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut VolumeLedger {
        &mut self.ledger
    }

    /// Runs all four phases in order.
    pub async fn execute(&mut self) -> ProtocolResult<()> {
        info!("starting assay run");
        self.robot.set_rail_lights(true).await?;
        self.prepare_enzyme_dilutions().await?;
        self.run_standard_curves().await?;
        self.distribute_reagents().await?;
        self.start_reaction().await?;
        info!("assay run complete");
        Ok(())
    }

    /// Lays dilution buffer across the deep-well dilution row and chains an
    /// enzyme dilution series down it.
    ///
    /// Tracked volumes are reset first, so from here on the ledger reads as
    /// net change. Buffer troughs rotate once the per-trough aspirate budget
    /// is spent.
    pub async fn prepare_enzyme_dilutions(&mut self) -> ProtocolResult<()> {
        info!("preparing enzyme dilution series");
        let robot = Arc::clone(&self.robot);
        if self.p300m.has_tip() {
            drop_tip(robot.as_ref(), &mut self.p300m).await?;
        }
        self.ledger.reset_all();
        robot.home().await?;

        let channels = f64::from(self.p300m.profile().channels);
        let aspirates_per_trough = TROUGH_BUDGET_UL / (DILUTION_TRANSFER_VOLUME_UL * channels);

        let dilution_wells: Vec<WellRef> = (0..DILUTION_SERIES_LENGTH)
            .map(|col| self.deck.deepwell.well_at(WellAddress::new(0, col)))
            .collect::<ProtocolResult<_>>()?;
        let trough_wells: Vec<WellRef> = BUFFER_TROUGH_COLUMNS
            .iter()
            .map(|&col| self.deck.reservoir.well_at(WellAddress::new(0, col)))
            .collect::<ProtocolResult<_>>()?;

        let mut troughs = trough_wells.into_iter();
        let mut source = troughs.next().ok_or_else(|| {
            ProtocolError::Configuration("no buffer trough wells configured".to_string())
        })?;
        let mut aspirates_from_trough = 0u32;

        for destination in &dilution_wells[1..] {
            if f64::from(aspirates_from_trough) >= aspirates_per_trough - 1.0 {
                source = troughs.next().ok_or_else(|| {
                    ProtocolError::Configuration(
                        "buffer troughs exhausted before the dilution row was filled".to_string(),
                    )
                })?;
                aspirates_from_trough = 0;
            }
            debug!(source = %source, destination = %destination, "adding dilution buffer");
            let request = TransferRequest::single(
                source.clone(),
                vec![destination.clone()],
                DILUTION_TRANSFER_VOLUME_UL,
            )
            .with_prewet(false)
            .with_drop_tip(false)
            .with_blowout(false);
            transfer(
                robot.as_ref(),
                &mut self.ledger,
                &mut self.p300m,
                &request,
                &self.settings,
            )
            .await?;
            aspirates_from_trough += 1;
        }

        let series = SerialDilution::new(
            dilution_wells,
            DILUTION_TRANSFER_VOLUME_UL,
            DILUTION_MIX_VOLUME_UL,
        )
        .with_mix_steps(DILUTION_MIX_STEPS)
        .with_dispense_height(DILUTION_DISPENSE_HEIGHT_MM)
        .with_blowout_height(DILUTION_BLOWOUT_HEIGHT_MM)
        .with_mix_before(true)
        .with_blowout(false)
        .with_fresh_tip_each_step(true);
        serial_dilution(
            robot.as_ref(),
            &mut self.ledger,
            &mut self.p300m,
            &series,
            &self.settings,
        )
        .await
    }

    /// Builds every standard curve named by the design.
    pub async fn run_standard_curves(&mut self) -> ProtocolResult<()> {
        if self.design.standard_curves.is_empty() {
            debug!("no standard curves in the design");
            return Ok(());
        }
        let robot = Arc::clone(&self.robot);
        robot.home().await?;
        for curve in &self.design.standard_curves {
            info!(
                compound = %curve.compound,
                curves = curve.start_wells.len(),
                dilutions = curve.dilutions,
                blanks = curve.blanks,
                "preparing standard curve"
            );
            let start_wells: Vec<WellRef> = curve
                .start_wells
                .iter()
                .map(|&well| self.deck.assay_plate.well_at(well))
                .collect::<ProtocolResult<_>>()?;
            let plan = StandardCurvePlan::new(
                curve.component_source.clone(),
                curve.buffer_source.clone(),
                start_wells,
            )
            .with_dilutions(curve.dilutions)
            .with_blanks(curve.blanks);
            standard_curve(
                robot.as_ref(),
                &mut self.ledger,
                &mut self.p20,
                &mut self.p300m,
                &plan,
                &self.settings,
            )
            .await?;
        }
        Ok(())
    }

    /// Adds every non-start reagent to the assay wells, compound by compound
    /// in order of addition.
    pub async fn distribute_reagents(&mut self) -> ProtocolResult<()> {
        info!("distributing reagents");
        let robot = Arc::clone(&self.robot);
        let blink_s = self.settings.operator.rail_blink_interval_s;
        blink_rail_lights(robot.as_ref(), 3, blink_s).await?;
        robot
            .pause(
                "The next step will start adding reagents with the p300 multichannel pipette. \
                 Press the Run button to resume.",
            )
            .await?;
        robot.home().await?;
        self.distribute_components(false).await
    }

    /// Heats the block, adds the reaction-start components, and walks the
    /// closing handoff to the operator.
    pub async fn start_reaction(&mut self) -> ProtocolResult<()> {
        let robot = Arc::clone(&self.robot);
        let blink_s = self.settings.operator.rail_blink_interval_s;
        blink_rail_lights(robot.as_ref(), 3, blink_s).await?;
        robot
            .pause(
                "The next step will heat the plate and add the start reagent. \
                 Press the Run button to resume.",
            )
            .await?;
        info!(
            temperature_c = REACTION_TEMPERATURE_C,
            "heating reaction block"
        );
        robot
            .set_temperature_celsius(REACTION_TEMPERATURE_C)
            .await?;
        robot.home().await?;
        self.distribute_components(true).await?;

        blink_rail_lights(robot.as_ref(), 1, blink_s).await?;
        robot
            .comment("Remove plate, apply sealing film, centrifuge, load into plate reader.")
            .await?;
        robot.deactivate_temperature().await?;
        robot.home().await?;
        robot.set_rail_lights(false).await?;
        robot.comment("The protocol has completed").await?;
        Ok(())
    }

    /// Distributes one half of the multichannel component list (the
    /// reaction-start compounds, or everything else) level by level.
    async fn distribute_components(&mut self, start_components: bool) -> ProtocolResult<()> {
        let robot = Arc::clone(&self.robot);
        let resolved = self.design.resolve_doses()?;
        let components: Vec<String> = self
            .design
            .components_for(PipetteModel::P300MultiGen2, start_components)
            .iter()
            .map(|p| p.compound.clone())
            .collect();

        for compound in &components {
            info!(component = %compound, "loading component");
            for batch in level_batches(&resolved, compound)? {
                info!(
                    component = %compound,
                    level = batch.level,
                    source = %batch.source,
                    "distributing level"
                );
                ensure_tip(robot.as_ref(), &mut self.p300m).await?;
                for group in &batch.volume_groups {
                    let first = match group.destinations.first() {
                        Some(&address) => self.deck.assay_plate.well_at(address)?,
                        None => continue,
                    };
                    let current_ul = self.ledger.volume(&first)?;
                    let height_mm = dispense_height_for_volume(
                        &self.deck.assay_plate,
                        current_ul,
                        0.0,
                        &self.settings.liquid,
                    );
                    info!(
                        well = %first.well,
                        current_ul,
                        adding_ul = group.volume_ul,
                        height_mm,
                        "distributing volume group"
                    );
                    let destinations: Vec<WellRef> = group
                        .destinations
                        .iter()
                        .map(|&address| self.deck.assay_plate.well_at(address))
                        .collect::<ProtocolResult<_>>()?;
                    let request = TransferRequest::distribute(
                        batch.source.clone(),
                        destinations,
                        group.volume_ul,
                    )
                    .with_dispense_height(height_mm)
                    .with_direction(OffsetDirection::Left)
                    .with_prewet(false)
                    .with_drop_tip(false)
                    .with_blowout(false)
                    .with_touch_tip(false)
                    .with_rate(REAGENT_DISPENSE_RATE)
                    .with_even_split(true);
                    transfer(
                        robot.as_ref(),
                        &mut self.ledger,
                        &mut self.p300m,
                        &request,
                        &self.settings,
                    )
                    .await?;
                }
                // Tips drop between levels, not between volume groups of one
                // level.
                if self.p300m.has_tip() {
                    drop_tip(robot.as_ref(), &mut self.p300m).await?;
                }
            }
        }
        Ok(())
    }
}
