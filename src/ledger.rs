//! Volume tracking for every well on the deck.
//!
//! The [`VolumeLedger`] mirrors each physical transfer as bookkeeping:
//! [`VolumeLedger::adjust`] subtracts from the source side and adds to the
//! destination side, expanding multichannel operations into the full set of
//! wells the pipette actually touched. Tracked volumes feed the
//! liquid-surface dispense heights in [`crate::geometry`] and let an
//! operator confirm after a run that the deck held what the design said it
//! should.
//!
//! Volumes are advisory: a well may go negative when a run draws from a
//! reservoir whose starting volume was never recorded. That is logged as a
//! warning and otherwise tolerated.

use std::collections::HashMap;
use std::fmt::Write as _;

use tracing::{debug, warn};

use crate::error::{ProtocolError, ProtocolResult, TransferRole};
use crate::labware::{Labware, PlateId, WellAddress, WellRef};

/// Expands one multichannel operation into the wells it touches on a plate.
///
/// Returns the affected wells and the per-well volume multiplier:
/// - 1 channel: the named well, multiplier 1.
/// - 8 channels on a 1-row trough: all channels share the named well,
///   multiplier 8.
/// - 8 channels on an 8-row plate: the operation must start at row A and
///   touches the named column's 8 wells, multiplier 1.
/// - 8 channels on a 16-row plate: the operation must start at row A or B
///   and touches every other well of the column from that start, multiplier
///   1.
///
/// Any other plate shape has no defined nozzle-to-well mapping and is
/// rejected, as is any channel count other than 1 or 8.
pub fn channel_fanout(
    channels: u8,
    plate: &Labware,
    start: WellAddress,
    role: TransferRole,
) -> ProtocolResult<(Vec<WellAddress>, f64)> {
    if !plate.contains(start) {
        return Err(ProtocolError::InvalidWellName {
            name: format!("{}/{}", plate.id, start),
            reason: format!(
                "plate '{}' has {} rows and {} columns",
                plate.id, plate.rows, plate.cols
            ),
        });
    }

    match channels {
        1 => Ok((vec![start], 1.0)),
        8 => match plate.rows {
            1 => Ok((vec![start], 8.0)),
            8 => {
                if start.row != 0 {
                    return Err(ProtocolError::InvalidMultichannelAlignment {
                        role,
                        plate_rows: plate.rows,
                        start_row: start.row_letter(),
                        expected: "A",
                    });
                }
                Ok((plate.column_wells(start.col), 1.0))
            }
            16 => {
                if start.row > 1 {
                    return Err(ProtocolError::InvalidMultichannelAlignment {
                        role,
                        plate_rows: plate.rows,
                        start_row: start.row_letter(),
                        expected: "A or B",
                    });
                }
                let wells = (start.row..plate.rows)
                    .step_by(2)
                    .map(|row| WellAddress::new(row, start.col))
                    .collect();
                Ok((wells, 1.0))
            }
            rows => Err(ProtocolError::UnsupportedPlateGeometry {
                plate: plate.id.to_string(),
                rows,
            }),
        },
        other => Err(ProtocolError::Configuration(format!(
            "unsupported channel count {other}: pipettes have 1 or 8 channels"
        ))),
    }
}

struct PlateVolumes {
    labware: Labware,
    volumes: HashMap<WellAddress, f64>,
}

impl PlateVolumes {
    fn new(labware: Labware) -> Self {
        let volumes = if labware.is_trash {
            HashMap::new()
        } else {
            labware.wells().map(|well| (well, 0.0)).collect()
        };
        PlateVolumes { labware, volumes }
    }
}

/// Tracked volumes for every registered plate.
pub struct VolumeLedger {
    plates: HashMap<PlateId, PlateVolumes>,
}

impl VolumeLedger {
    /// Creates a ledger over the given deck, every tracked well at zero.
    ///
    /// Trash labware is registered but not tracked: liquid sent there
    /// disappears from the books.
    pub fn new(plates: Vec<Labware>) -> Self {
        let plates = plates
            .into_iter()
            .map(|labware| (labware.id.clone(), PlateVolumes::new(labware)))
            .collect();
        VolumeLedger { plates }
    }

    /// Resets every tracked well to zero.
    pub fn reset_all(&mut self) {
        for plate in self.plates.values_mut() {
            for volume in plate.volumes.values_mut() {
                *volume = 0.0;
            }
        }
    }

    /// The labware record for a registered plate.
    pub fn labware(&self, id: &PlateId) -> ProtocolResult<&Labware> {
        self.plates
            .get(id)
            .map(|plate| &plate.labware)
            .ok_or_else(|| ProtocolError::UnknownPlate(id.to_string()))
    }

    /// The disposal well of the registered trash labware.
    pub fn trash_well(&self) -> ProtocolResult<WellRef> {
        self.plates
            .values()
            .find(|plate| plate.labware.is_trash)
            .map(|plate| WellRef::new(plate.labware.id.clone(), WellAddress::new(0, 0)))
            .ok_or_else(|| {
                ProtocolError::Configuration("no trash labware registered".to_string())
            })
    }

    /// The tracked volume of one well, in uL. The trash always reads zero.
    pub fn volume(&self, well: &WellRef) -> ProtocolResult<f64> {
        let plate = self
            .plates
            .get(&well.plate)
            .ok_or_else(|| ProtocolError::UnknownPlate(well.plate.to_string()))?;
        if plate.labware.is_trash {
            return Ok(0.0);
        }
        plate
            .volumes
            .get(&well.well)
            .copied()
            .ok_or_else(|| out_of_plate(&plate.labware, well.well))
    }

    /// Sets the absolute volume of one well, for recording what a run
    /// starts with. Filling the trash is a no-op.
    pub fn fill(&mut self, well: &WellRef, volume_ul: f64) -> ProtocolResult<()> {
        let plate = self
            .plates
            .get_mut(&well.plate)
            .ok_or_else(|| ProtocolError::UnknownPlate(well.plate.to_string()))?;
        if plate.labware.is_trash {
            return Ok(());
        }
        let slot = plate
            .volumes
            .get_mut(&well.well)
            .ok_or_else(|| out_of_plate(&plate.labware, well.well))?;
        *slot = volume_ul;
        Ok(())
    }

    /// Sum of all tracked volumes on one plate, in uL.
    pub fn plate_total(&self, id: &PlateId) -> ProtocolResult<f64> {
        let plate = self
            .plates
            .get(id)
            .ok_or_else(|| ProtocolError::UnknownPlate(id.to_string()))?;
        Ok(plate.volumes.values().sum())
    }

    /// Records one physical transfer: `volume_ul` moved from `source` to
    /// `destination` with `channels` nozzles.
    ///
    /// Both sides are expanded through [`channel_fanout`], so a multichannel
    /// dispense starting at A1 of the assay plate books volume into all
    /// eight wells the nozzles reached. A trash destination subtracts from
    /// the source only.
    pub fn adjust(
        &mut self,
        volume_ul: f64,
        source: &WellRef,
        destination: &WellRef,
        channels: u8,
    ) -> ProtocolResult<()> {
        // Both fan-outs are validated before any volume changes, so a
        // rejected transfer never half-books.
        let source_fan = self.fanout_for(source, TransferRole::Source, channels)?;
        let destination_fan = self.fanout_for(destination, TransferRole::Destination, channels)?;

        if let Some((wells, multiplier)) = source_fan {
            let PlateVolumes { labware, volumes } = self
                .plates
                .get_mut(&source.plate)
                .ok_or_else(|| ProtocolError::UnknownPlate(source.plate.to_string()))?;
            for well in wells {
                let slot = volumes
                    .get_mut(&well)
                    .ok_or_else(|| out_of_plate(labware, well))?;
                *slot -= volume_ul * multiplier;
                debug!(
                    plate = %labware.id,
                    well = %well,
                    removed_ul = volume_ul * multiplier,
                    now_ul = *slot,
                    "ledger: volume removed"
                );
                if *slot < 0.0 {
                    warn!(
                        plate = %labware.id,
                        well = %well,
                        volume_ul = *slot,
                        "tracked well volume went negative"
                    );
                }
            }
        }

        if let Some((wells, multiplier)) = destination_fan {
            let PlateVolumes { labware, volumes } = self
                .plates
                .get_mut(&destination.plate)
                .ok_or_else(|| ProtocolError::UnknownPlate(destination.plate.to_string()))?;
            for well in wells {
                let slot = volumes
                    .get_mut(&well)
                    .ok_or_else(|| out_of_plate(labware, well))?;
                *slot += volume_ul * multiplier;
                debug!(
                    plate = %labware.id,
                    well = %well,
                    added_ul = volume_ul * multiplier,
                    now_ul = *slot,
                    "ledger: volume added"
                );
            }
        }

        Ok(())
    }

    /// Resolves the channel fan-out for one side of a transfer, or `None`
    /// for the trash, whose volumes are not tracked.
    fn fanout_for(
        &self,
        well: &WellRef,
        role: TransferRole,
        channels: u8,
    ) -> ProtocolResult<Option<(Vec<WellAddress>, f64)>> {
        let plate = self
            .plates
            .get(&well.plate)
            .ok_or_else(|| ProtocolError::UnknownPlate(well.plate.to_string()))?;
        if plate.labware.is_trash {
            return Ok(None);
        }
        channel_fanout(channels, &plate.labware, well.well, role).map(Some)
    }

    /// Renders one plate's volumes as a row/column grid for run logs.
    pub fn render_plate(&self, id: &PlateId) -> ProtocolResult<String> {
        let plate = self
            .plates
            .get(id)
            .ok_or_else(|| ProtocolError::UnknownPlate(id.to_string()))?;
        let labware = &plate.labware;

        let mut out = format!("Well volumes for {} ({})\n", labware.id, labware.display_name);
        if labware.is_trash {
            out.push_str("  (volumes not tracked)\n");
            return Ok(out);
        }

        out.push_str("   ");
        for col in 0..labware.cols {
            let _ = write!(out, "{:>7}", col + 1);
        }
        out.push('\n');

        for row in 0..labware.rows {
            let _ = write!(out, "{:>3}", WellAddress::new(row, 0).row_letter());
            for col in 0..labware.cols {
                let volume = plate
                    .volumes
                    .get(&WellAddress::new(row, col))
                    .copied()
                    .unwrap_or_default();
                let _ = write!(out, "{volume:>7.0}");
            }
            out.push('\n');
        }
        Ok(out)
    }

    /// Renders every tracked plate, for end-of-phase status logs.
    pub fn render_all(&self) -> String {
        let mut ids: Vec<&PlateId> = self.plates.keys().collect();
        ids.sort();
        let mut out = String::new();
        for id in ids {
            if let Ok(grid) = self.render_plate(id) {
                out.push_str(&grid);
            }
        }
        out
    }
}

fn out_of_plate(labware: &Labware, well: WellAddress) -> ProtocolError {
    ProtocolError::InvalidWellName {
        name: format!("{}/{}", labware.id, well),
        reason: format!(
            "plate '{}' has {} rows and {} columns",
            labware.id, labware.rows, labware.cols
        ),
    }
}
