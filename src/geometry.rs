//! Pipetting geometry: in-well offsets and liquid-surface heights.
//!
//! Two calculations live here. [`well_edge_offset`] works out how far a tip
//! can move sideways before it touches the well wall, accounting for the
//! tip's taper: the deeper the tip sits, the narrower it is at the waterline
//! of the well. [`dispense_height_for_volume`] converts a tracked well volume
//! into a dispense height just above the liquid surface, which keeps tips out
//! of the liquid and limits cross-contamination.

use tracing::{debug, warn};

use crate::config::LiquidSettings;
use crate::error::{ProtocolError, ProtocolResult};
use crate::labware::Labware;
use crate::pipette::PipetteProfile;

/// Where within a well the tip is placed for a dispense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetDirection {
    /// The well center.
    #[default]
    Center,
    /// Toward the left wall (negative x).
    Left,
    /// Toward the right wall (positive x).
    Right,
    /// Toward the far wall (positive y).
    Top,
    /// Toward the near wall (negative y).
    Bottom,
}

impl OffsetDirection {
    /// Parses the textual form used by design tables.
    pub fn parse(name: &str) -> ProtocolResult<Self> {
        match name {
            "center" => Ok(OffsetDirection::Center),
            "left" => Ok(OffsetDirection::Left),
            "right" => Ok(OffsetDirection::Right),
            "top" => Ok(OffsetDirection::Top),
            "bottom" => Ok(OffsetDirection::Bottom),
            other => Err(ProtocolError::InvalidOffsetDirection(other.to_string())),
        }
    }

    /// The (x, y) displacement for this direction at the given offset
    /// distance.
    pub fn lateral_deltas(self, offset_distance_mm: f64) -> (f64, f64) {
        match self {
            OffsetDirection::Center => (0.0, 0.0),
            OffsetDirection::Right => (offset_distance_mm, 0.0),
            OffsetDirection::Left => (-offset_distance_mm, 0.0),
            OffsetDirection::Top => (0.0, offset_distance_mm),
            OffsetDirection::Bottom => (0.0, -offset_distance_mm),
        }
    }
}

impl std::fmt::Display for OffsetDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            OffsetDirection::Center => "center",
            OffsetDirection::Left => "left",
            OffsetDirection::Right => "right",
            OffsetDirection::Top => "top",
            OffsetDirection::Bottom => "bottom",
        };
        f.write_str(name)
    }
}

/// Lateral offset (mm) that places the tip against the well wall when
/// pipetting `height_above_bottom_mm` above the well floor.
///
/// The tip diameter at the well rim is interpolated from the pipette's tip
/// taper: at the rim the tip is `tip_base_diameter + distance-below-rim *
/// taper` wide. `extra_offset_mm` is added on top so the tip presses into
/// the wall rather than just grazing it.
///
/// Fails with [`ProtocolError::InvalidGeometry`] if the requested height is
/// at or above the top of the well.
pub fn well_edge_offset(
    profile: &PipetteProfile,
    plate: &Labware,
    height_above_bottom_mm: f64,
    extra_offset_mm: f64,
) -> ProtocolResult<f64> {
    let height_below_well_top = plate.well_depth_mm - height_above_bottom_mm;
    if height_below_well_top <= 0.0 {
        return Err(ProtocolError::InvalidGeometry {
            height_mm: height_above_bottom_mm,
            depth_mm: plate.well_depth_mm,
        });
    }

    let tip_width =
        profile.tip_base_diameter_mm + height_below_well_top * profile.tip_taper_mm_per_mm;
    let offset = (plate.well_width_mm - tip_width) / 2.0 + extra_offset_mm;
    debug!(
        pipette = profile.api_name,
        plate = %plate.id,
        height_above_bottom_mm,
        tip_width_mm = tip_width,
        offset_mm = offset,
        "computed well edge offset"
    );
    Ok(offset)
}

/// Dispense height (mm above the well floor) that keeps the tip just above
/// the liquid surface of a tracked well.
///
/// The liquid column height is `volume * well_depth / well_capacity`; for the
/// 384-well assay plate that is 11.43 mm per 112 uL. The configured surface
/// clearance is added, and the result is clamped to the configured minimum
/// so the tip never drags along the well floor.
///
/// Filling a well past the configured warning threshold logs a warning but
/// does not fail.
pub fn dispense_height_for_volume(
    plate: &Labware,
    current_volume_ul: f64,
    volume_to_add_ul: f64,
    liquid: &LiquidSettings,
) -> f64 {
    let planned_ul = current_volume_ul + volume_to_add_ul;
    if planned_ul > liquid.fill_warning_threshold_ul {
        warn!(
            plate = %plate.id,
            planned_ul,
            threshold_ul = liquid.fill_warning_threshold_ul,
            "planned well volume exceeds the safe fill threshold"
        );
    }

    let mm_per_ul = plate.well_depth_mm / plate.well_capacity_ul;
    let height = planned_ul * mm_per_ul + liquid.surface_clearance_mm;
    height.max(liquid.min_dispense_height_mm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipette::PipetteModel;
    use tracing_test::traced_test;

    fn assay_plate() -> Labware {
        Labware::corning_384_wellplate_112ul_flat("assay-plate")
    }

    #[test]
    fn test_offset_direction_parse() {
        assert_eq!(
            OffsetDirection::parse("left").unwrap(),
            OffsetDirection::Left
        );
        assert_eq!(
            OffsetDirection::parse("center").unwrap(),
            OffsetDirection::Center
        );
        assert!(matches!(
            OffsetDirection::parse("sideways"),
            Err(ProtocolError::InvalidOffsetDirection(_))
        ));
    }

    #[test]
    fn test_lateral_deltas() {
        assert_eq!(OffsetDirection::Left.lateral_deltas(1.5), (-1.5, 0.0));
        assert_eq!(OffsetDirection::Right.lateral_deltas(1.5), (1.5, 0.0));
        assert_eq!(OffsetDirection::Top.lateral_deltas(1.5), (0.0, 1.5));
        assert_eq!(OffsetDirection::Bottom.lateral_deltas(1.5), (0.0, -1.5));
        assert_eq!(OffsetDirection::Center.lateral_deltas(1.5), (0.0, 0.0));
    }

    #[test]
    fn test_edge_offset_interpolates_tip_taper() {
        // p20 on the 384 plate, 2 mm above the bottom: the tip sits 9.43 mm
        // below the rim, so its diameter there is 0.90 + 9.43 * 0.083.
        let profile = PipetteModel::P20SingleGen2.profile();
        let offset = well_edge_offset(profile, &assay_plate(), 2.0, 0.2).unwrap();
        let expected_tip_width = 0.90 + 9.43 * 0.083;
        let expected = (3.63 - expected_tip_width) / 2.0 + 0.2;
        assert!((offset - expected).abs() < 1e-9, "offset was {offset}");
    }

    #[test]
    fn test_edge_offset_rejects_height_above_well_top() {
        let profile = PipetteModel::P20SingleGen2.profile();
        let result = well_edge_offset(profile, &assay_plate(), 11.43, 0.2);
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidGeometry { .. })
        ));
        assert!(well_edge_offset(profile, &assay_plate(), 12.0, 0.2).is_err());
        assert!(well_edge_offset(profile, &assay_plate(), 11.0, 0.2).is_ok());
    }

    #[test]
    fn test_dispense_height_tracks_liquid_surface() {
        let liquid = LiquidSettings::default();
        // 60 uL in a 112 uL / 11.43 mm well is a 6.12 mm column.
        let height = dispense_height_for_volume(&assay_plate(), 60.0, 0.0, &liquid);
        let expected = 60.0 * (11.43 / 112.0) + 0.8;
        assert!((height - expected).abs() < 1e-9, "height was {height}");
    }

    #[test]
    fn test_dispense_height_clamps_to_minimum() {
        let liquid = LiquidSettings::default();
        let height = dispense_height_for_volume(&assay_plate(), 0.0, 0.0, &liquid);
        assert!((height - 1.0).abs() < f64::EPSILON);
    }

    #[traced_test]
    #[test]
    fn test_dispense_height_warns_on_overfill() {
        let liquid = LiquidSettings::default();
        let height = dispense_height_for_volume(&assay_plate(), 90.0, 20.0, &liquid);
        assert!(height > 1.0);
        assert!(logs_contain("exceeds the safe fill threshold"));
    }
}
