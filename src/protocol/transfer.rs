//! Transfer orchestrator.
//!
//! Turns a [`TransferRequest`] into the full pipetting sequence: tip
//! acquisition, optional tip prewetting, one of two dispensing strategies,
//! and a ledger adjustment for every physical transfer.
//!
//! The `single` strategy pairs one aspirate with one dispense and is the
//! accurate-but-slow path. The `distribute` strategy aspirates enough for
//! several destinations at once, reserving a fraction of the pipette
//! capacity as carryover that is never dispensed, and refills as the batch
//! list drains. Distribute consumes the destination list from the back, so
//! callers that care about fill order pass the list reversed.

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{ProtocolError, ProtocolResult};
use crate::geometry::OffsetDirection;
use crate::hardware::RobotDriver;
use crate::labware::{Location, WellRef};
use crate::ledger::VolumeLedger;
use crate::pipette::Pipette;
use crate::protocol::dispense::{offset_dispense, DispenseOptions};
use crate::protocol::{aspirate, blow_out_at, dispense_at, drop_tip, ensure_tip};

/// How a multi-destination transfer is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStrategy {
    /// One aspirate per dispense.
    Single,
    /// One aspirate feeds several dispenses, refilling as needed.
    Distribute,
}

/// Where the liquid comes from: a bare well or a fully located point.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferSource {
    /// A well; the engine aspirates just above its bottom.
    Well(WellRef),
    /// An explicit location inside a well.
    Point(Location),
}

impl TransferSource {
    /// The well the source liquid sits in, regardless of representation.
    pub fn well(&self) -> &WellRef {
        match self {
            TransferSource::Well(well) => well,
            TransferSource::Point(location) => &location.well,
        }
    }

    /// The aspirate target. A bare well resolves to a point just above the
    /// well bottom.
    pub fn resolve(&self, bottom_clearance_mm: f64) -> Location {
        match self {
            TransferSource::Well(well) => well.bottom(bottom_clearance_mm),
            TransferSource::Point(location) => location.clone(),
        }
    }
}

impl From<WellRef> for TransferSource {
    fn from(well: WellRef) -> Self {
        TransferSource::Well(well)
    }
}

impl From<Location> for TransferSource {
    fn from(location: Location) -> Self {
        TransferSource::Point(location)
    }
}

/// One liquid transfer from a source to an ordered list of destinations.
///
/// Constructed with [`TransferRequest::single`] or
/// [`TransferRequest::distribute`] and refined with the `with_` methods.
///
/// # Example
///
/// ```rust,ignore
/// let request = TransferRequest::distribute(source, wells, 40.0)
///     .with_dispense_height(6.0)
///     .with_direction(OffsetDirection::Right)
///     .with_even_split(true);
/// transfer(&robot, &mut ledger, &mut p300m, &request, &settings).await?;
/// ```
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Source well or located point.
    pub source: TransferSource,
    /// Destination wells, in order.
    pub destinations: Vec<WellRef>,
    /// Volume per destination, in uL.
    pub volume_ul: f64,
    /// Scheduling strategy.
    pub strategy: TransferStrategy,
    /// Dispense height above the destination well bottom, in mm.
    pub dispense_height_mm: f64,
    /// Which destination well edge to dispense against.
    pub direction: OffsetDirection,
    /// Aspirate and dispense the pipette's full capacity at the source once
    /// before the first transfer, wetting the tip.
    pub prewet: bool,
    /// Drop the tip when the request completes.
    pub drop_tip: bool,
    /// Allow blow-out steps.
    pub blowout: bool,
    /// Allow touch-tip steps at the destination.
    pub touch_tip: bool,
    /// Dispense flow rate, as a multiple of the pipette default.
    pub rate: f64,
    /// Raise the tips for inspection before each dispense.
    pub inspect: bool,
    /// Split distribute batches into equal sizes instead of full batches
    /// with a small remainder.
    pub even_split: bool,
    /// Blow-out height above the source well bottom, in mm. Defaults to the
    /// configured value.
    pub source_blowout_height_mm: Option<f64>,
    /// Blow-out height above the destination well bottom, in mm. Defaults
    /// to the configured value.
    pub dest_blowout_height_mm: Option<f64>,
}

impl TransferRequest {
    fn new(
        source: TransferSource,
        destinations: Vec<WellRef>,
        volume_ul: f64,
        strategy: TransferStrategy,
    ) -> Self {
        TransferRequest {
            source,
            destinations,
            volume_ul,
            strategy,
            dispense_height_mm: 1.0,
            direction: OffsetDirection::Center,
            prewet: true,
            drop_tip: true,
            blowout: true,
            touch_tip: true,
            rate: 1.0,
            inspect: false,
            even_split: false,
            source_blowout_height_mm: None,
            dest_blowout_height_mm: None,
        }
    }

    /// A single-strategy request with default flags.
    pub fn single(
        source: impl Into<TransferSource>,
        destinations: Vec<WellRef>,
        volume_ul: f64,
    ) -> Self {
        Self::new(source.into(), destinations, volume_ul, TransferStrategy::Single)
    }

    /// A distribute-strategy request with default flags.
    pub fn distribute(
        source: impl Into<TransferSource>,
        destinations: Vec<WellRef>,
        volume_ul: f64,
    ) -> Self {
        Self::new(
            source.into(),
            destinations,
            volume_ul,
            TransferStrategy::Distribute,
        )
    }

    /// Sets the dispense height above the destination well bottom, in mm.
    pub fn with_dispense_height(mut self, height_mm: f64) -> Self {
        self.dispense_height_mm = height_mm;
        self
    }

    /// Sets the in-well offset direction for dispenses.
    pub fn with_direction(mut self, direction: OffsetDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Enables or disables tip prewetting.
    pub fn with_prewet(mut self, prewet: bool) -> Self {
        self.prewet = prewet;
        self
    }

    /// Whether the tip is dropped when the request completes.
    pub fn with_drop_tip(mut self, drop: bool) -> Self {
        self.drop_tip = drop;
        self
    }

    /// Enables or disables blow-out steps.
    pub fn with_blowout(mut self, blowout: bool) -> Self {
        self.blowout = blowout;
        self
    }

    /// Enables or disables destination touch-tip steps.
    pub fn with_touch_tip(mut self, touch: bool) -> Self {
        self.touch_tip = touch;
        self
    }

    /// Sets the dispense flow rate as a multiple of the pipette default.
    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    /// Enables the tip-inspection pause before each dispense.
    pub fn with_inspect(mut self, inspect: bool) -> Self {
        self.inspect = inspect;
        self
    }

    /// Enables equal-sized distribute batches.
    pub fn with_even_split(mut self, even: bool) -> Self {
        self.even_split = even;
        self
    }

    /// Overrides the source blow-out height, in mm above the well bottom.
    pub fn with_source_blowout_height(mut self, height_mm: f64) -> Self {
        self.source_blowout_height_mm = Some(height_mm);
        self
    }

    /// Overrides the destination blow-out height, in mm above the well
    /// bottom.
    pub fn with_dest_blowout_height(mut self, height_mm: f64) -> Self {
        self.dest_blowout_height_mm = Some(height_mm);
        self
    }
}

/// Executes one transfer request against the robot, keeping the pipette
/// state and the volume ledger in step with every physical action.
///
/// Fails with [`ProtocolError::VolumeOutOfRange`] if the per-destination
/// volume is outside the pipette's working range, or, for distribute, if
/// the volume leaves no capacity for even one destination once carryover
/// is reserved.
pub async fn transfer(
    robot: &dyn RobotDriver,
    ledger: &mut VolumeLedger,
    pipette: &mut Pipette,
    request: &TransferRequest,
    settings: &Settings,
) -> ProtocolResult<()> {
    let profile = pipette.profile();
    let volume = request.volume_ul;
    if volume < profile.min_volume_ul || volume > profile.max_volume_ul {
        return Err(ProtocolError::VolumeOutOfRange {
            volume_ul: volume,
            min_ul: profile.min_volume_ul,
            max_ul: profile.max_volume_ul,
            pipette: profile.api_name,
        });
    }

    let source_location = request
        .source
        .resolve(settings.motion.well_bottom_clearance_mm);
    let source_well = request.source.well().clone();
    debug!(
        pipette = profile.api_name,
        volume_ul = volume,
        source = %source_well,
        destinations = request.destinations.len(),
        "starting transfer"
    );

    ensure_tip(robot, pipette).await?;

    if request.prewet {
        let capacity = profile.max_volume_ul;
        aspirate(robot, pipette, capacity, &source_location, 1.0).await?;
        dispense_at(robot, pipette, capacity, &source_location, 1.0).await?;
        if request.blowout {
            let height = request
                .source_blowout_height_mm
                .unwrap_or(settings.liquid.source_blowout_height_mm);
            blow_out_at(robot, pipette, &source_well.bottom(height)).await?;
        }
        robot
            .touch_tip(pipette.mount, settings.motion.touch_tip_speed_mm_per_s)
            .await?;
    }

    let options = DispenseOptions {
        direction: request.direction,
        custom_offset_distance_mm: None,
        dispense_height_mm: request.dispense_height_mm,
        blowout: request.blowout,
        blowout_height_mm: request
            .dest_blowout_height_mm
            .unwrap_or(settings.liquid.dest_blowout_height_mm),
        touch_tip: request.touch_tip,
        rate: request.rate,
        inspect: request.inspect,
    };
    let channels = profile.channels;

    match request.strategy {
        TransferStrategy::Single => {
            for destination in &request.destinations {
                debug!(
                    source = %source_well,
                    destination = %destination,
                    tip_volume_ul = pipette.current_volume_ul(),
                    "single transfer"
                );
                aspirate(robot, pipette, volume, &source_location, 1.0).await?;
                robot
                    .touch_tip(pipette.mount, settings.motion.touch_tip_speed_mm_per_s)
                    .await?;
                let plate = ledger.labware(&destination.plate)?;
                offset_dispense(
                    robot,
                    pipette,
                    plate,
                    destination.well,
                    volume,
                    &options,
                    settings,
                )
                .await?;
                ledger.adjust(volume, &source_well, destination, channels)?;
            }
        }
        TransferStrategy::Distribute => {
            distribute(
                robot,
                ledger,
                pipette,
                request,
                &source_location,
                &source_well,
                &options,
                settings,
            )
            .await?;
        }
    }

    if request.drop_tip {
        drop_tip(robot, pipette).await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn distribute(
    robot: &dyn RobotDriver,
    ledger: &mut VolumeLedger,
    pipette: &mut Pipette,
    request: &TransferRequest,
    source_location: &Location,
    source_well: &WellRef,
    base_options: &DispenseOptions,
    settings: &Settings,
) -> ProtocolResult<()> {
    let profile = pipette.profile();
    let volume = request.volume_ul;
    let capacity = profile.max_volume_ul;
    let carryover = settings.liquid.carryover_fraction;

    let mut max_wells_per_aspirate = (capacity * (1.0 - carryover) / volume) as usize;
    if max_wells_per_aspirate == 0 {
        // Reserving carryover leaves no room for even one destination.
        return Err(ProtocolError::VolumeOutOfRange {
            volume_ul: volume,
            min_ul: profile.min_volume_ul,
            max_ul: capacity * (1.0 - carryover),
            pipette: profile.api_name,
        });
    }
    info!(max_wells_per_aspirate, "distribute transfer");

    let mut working = request.destinations.clone();
    if request.even_split && !working.is_empty() {
        let total = working.len();
        let groups = total.div_ceil(max_wells_per_aspirate);
        max_wells_per_aspirate = total.div_ceil(groups);
        info!(max_wells_per_aspirate, "evenly splitting distribute batches");
    }

    // Per-dispense blow-out is always suppressed while distributing; the
    // reserved carryover would be blown into the first well.
    let options = DispenseOptions {
        blowout: false,
        ..base_options.clone()
    };

    while !working.is_empty() {
        let batch_size = working.len().min(max_wells_per_aspirate);
        let mut batch = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            if let Some(well) = working.pop() {
                batch.push(well);
            }
        }
        debug!(
            batch = batch.len(),
            total = request.destinations.len(),
            "distributing batch"
        );

        let target_volume = volume * batch.len() as f64 + capacity * carryover;
        let top_up = target_volume - pipette.current_volume_ul();
        info!(
            aspirate_ul = format_args!("{target_volume:.1}"),
            source = %source_well,
            "aspirating for distribute batch"
        );
        aspirate(robot, pipette, top_up, source_location, 1.0).await?;
        if request.touch_tip {
            robot
                .touch_tip(pipette.mount, settings.motion.touch_tip_speed_mm_per_s)
                .await?;
        }

        for destination in &batch {
            debug!(
                source = %source_well,
                destination = %destination,
                "distribute dispense"
            );
            let plate = ledger.labware(&destination.plate)?;
            offset_dispense(
                robot,
                pipette,
                plate,
                destination.well,
                volume,
                &options,
                settings,
            )
            .await?;
            ledger.adjust(volume, source_well, destination, profile.channels)?;
        }
    }
    Ok(())
}
