//! Dispense geometry engine.
//!
//! Releasing liquid against the well wall instead of mid-air lets the
//! droplet wick onto the plastic, which matters for the small volumes the
//! assay plate takes. [`offset_dispense`] computes the edge-offset target
//! for a well and issues the full motion sequence: arc into the well at
//! center, slide to the offset point with a direct move, dispense in place,
//! and return to center before any further travel.

use tracing::{debug, info};

use crate::config::Settings;
use crate::error::ProtocolResult;
use crate::geometry::{well_edge_offset, OffsetDirection};
use crate::hardware::RobotDriver;
use crate::labware::{Labware, Point, WellAddress};
use crate::pipette::Pipette;

/// Placement and post-dispense behavior for a single dispense.
#[derive(Debug, Clone)]
pub struct DispenseOptions {
    /// Which well edge to dispense against.
    pub direction: OffsetDirection,
    /// Overrides the computed edge-engagement distance, in mm.
    pub custom_offset_distance_mm: Option<f64>,
    /// Dispense height above the well bottom, in mm.
    pub dispense_height_mm: f64,
    /// Whether to blow out residual liquid after the dispense.
    pub blowout: bool,
    /// Retreat height above the well bottom for the blow-out, in mm.
    pub blowout_height_mm: f64,
    /// Whether to touch the tip against the well rim afterwards.
    pub touch_tip: bool,
    /// Dispense flow rate, as a multiple of the pipette default.
    pub rate: f64,
    /// Raise the tip above the well and pause before dispensing, so an
    /// operator can check the tips while troubleshooting.
    pub inspect: bool,
}

impl Default for DispenseOptions {
    fn default() -> Self {
        DispenseOptions {
            direction: OffsetDirection::Center,
            custom_offset_distance_mm: None,
            dispense_height_mm: 1.0,
            blowout: false,
            blowout_height_mm: 8.0,
            touch_tip: false,
            rate: 1.0,
            inspect: false,
        }
    }
}

/// Dispenses liquid already held in the tip at an offset point inside a
/// well.
///
/// The lateral offset either comes from `options.custom_offset_distance_mm`
/// or is computed from the tip and well geometry so the tip presses lightly
/// against the wall. After the dispense the tip moves back to the well
/// center, which keeps droplets from being flicked off the well edge on the
/// way out. The optional blow-out retreats to its own height, slides back
/// to the offset point, blows out, and retreats again.
pub async fn offset_dispense(
    robot: &dyn RobotDriver,
    pipette: &mut Pipette,
    plate: &Labware,
    well: WellAddress,
    volume_ul: f64,
    options: &DispenseOptions,
    settings: &Settings,
) -> ProtocolResult<()> {
    let well = plate.well_at(well)?;

    let offset_distance = match options.custom_offset_distance_mm {
        Some(distance) => distance,
        None => well_edge_offset(
            pipette.profile(),
            plate,
            options.dispense_height_mm,
            settings.motion.edge_engagement_extra_mm,
        )?,
    };
    let (x_offset, y_offset) = options.direction.lateral_deltas(offset_distance);
    let mount = pipette.mount;

    debug!(
        well = %well,
        direction = %options.direction,
        offset_mm = format_args!("{offset_distance:.2}"),
        "offset dispense"
    );

    if options.inspect {
        info!("raising tips above the well for inspection");
        robot
            .move_to(mount, &well.top(settings.motion.inspect_hover_mm), false)
            .await?;
        robot.delay_seconds(settings.motion.inspect_pause_s).await?;
    }

    let center = well.bottom(options.dispense_height_mm);
    let edge = center.translated(Point::new(x_offset, y_offset, 0.0));

    robot.move_to(mount, &center, false).await?;
    robot.move_to(mount, &edge, true).await?;
    info!(
        height_mm = format_args!("{:.2}", options.dispense_height_mm),
        "dispensing"
    );
    robot.dispense_in_place(mount, volume_ul, options.rate).await?;
    pipette.note_dispensed(volume_ul);
    robot.move_to(mount, &center, true).await?;

    if options.blowout {
        debug!("performing blowout");
        let retreat = well.bottom(options.blowout_height_mm);
        robot.move_to(mount, &retreat, false).await?;
        robot.move_to(mount, &edge, true).await?;
        robot.blow_out_in_place(mount).await?;
        pipette.note_blown_out();
        robot.move_to(mount, &retreat, true).await?;
    }

    if options.touch_tip {
        robot
            .touch_tip(mount, settings.motion.gentle_touch_tip_speed_mm_per_s)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{MockRobot, RobotAction};
    use crate::pipette::{Mount, PipetteModel};

    fn assay_plate() -> Labware {
        Labware::corning_384_wellplate_112ul_flat("assay-plate")
    }

    async fn primed_pipette(robot: &MockRobot) -> Pipette {
        let mut pipette = Pipette::new(PipetteModel::P20SingleGen2, Mount::Left);
        robot.pick_up_tip(Mount::Left).await.unwrap();
        pipette.note_tip_picked();
        pipette.note_aspirated(20.0);
        pipette
    }

    #[tokio::test]
    async fn test_center_dispense_motion_sequence() {
        let robot = MockRobot::new();
        let mut pipette = primed_pipette(&robot).await;
        let plate = assay_plate();
        let settings = Settings::default();
        let well = WellAddress::parse("A1").unwrap();

        let options = DispenseOptions {
            dispense_height_mm: 2.0,
            ..DispenseOptions::default()
        };
        offset_dispense(&robot, &mut pipette, &plate, well, 20.0, &options, &settings)
            .await
            .unwrap();

        let actions = robot.actions().await;
        // pick-up, arc in, direct slide, dispense, direct return
        assert_eq!(actions.len(), 5);
        assert!(matches!(
            actions[1],
            RobotAction::MoveTo { direct: false, .. }
        ));
        assert!(matches!(actions[2], RobotAction::MoveTo { direct: true, .. }));
        assert!(matches!(
            actions[3],
            RobotAction::DispenseInPlace { volume_ul, .. } if (volume_ul - 20.0).abs() < 1e-9
        ));
        assert!(matches!(actions[4], RobotAction::MoveTo { direct: true, .. }));
        // Center direction leaves the slide target at the well center.
        if let RobotAction::MoveTo { location, .. } = &actions[2] {
            assert!(location.offset.x.abs() < 1e-9);
            assert!(location.offset.y.abs() < 1e-9);
        }
        assert!(pipette.current_volume_ul().abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_left_offset_slides_in_negative_x() {
        let robot = MockRobot::new();
        let mut pipette = primed_pipette(&robot).await;
        let plate = assay_plate();
        let settings = Settings::default();
        let well = WellAddress::parse("B3").unwrap();

        let options = DispenseOptions {
            direction: OffsetDirection::Left,
            dispense_height_mm: 2.0,
            ..DispenseOptions::default()
        };
        offset_dispense(&robot, &mut pipette, &plate, well, 10.0, &options, &settings)
            .await
            .unwrap();

        let actions = robot.actions().await;
        let RobotAction::MoveTo { location, .. } = &actions[2] else {
            panic!("expected a slide move, got {:?}", actions[2]);
        };
        let expected = well_edge_offset(pipette.profile(), &plate, 2.0, 0.2).unwrap();
        assert!((location.offset.x + expected).abs() < 1e-9);
        assert!(location.offset.y.abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_custom_offset_distance_overrides_geometry() {
        let robot = MockRobot::new();
        let mut pipette = primed_pipette(&robot).await;
        let plate = assay_plate();
        let settings = Settings::default();
        let well = WellAddress::parse("A1").unwrap();

        let options = DispenseOptions {
            direction: OffsetDirection::Right,
            custom_offset_distance_mm: Some(0.75),
            dispense_height_mm: 2.0,
            ..DispenseOptions::default()
        };
        offset_dispense(&robot, &mut pipette, &plate, well, 10.0, &options, &settings)
            .await
            .unwrap();

        let actions = robot.actions().await;
        let RobotAction::MoveTo { location, .. } = &actions[2] else {
            panic!("expected a slide move, got {:?}", actions[2]);
        };
        assert!((location.offset.x - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_blowout_and_touch_tip_sequence() {
        let robot = MockRobot::new();
        let mut pipette = primed_pipette(&robot).await;
        let plate = assay_plate();
        let settings = Settings::default();
        let well = WellAddress::parse("A1").unwrap();

        let options = DispenseOptions {
            dispense_height_mm: 2.0,
            blowout: true,
            blowout_height_mm: 4.0,
            touch_tip: true,
            ..DispenseOptions::default()
        };
        offset_dispense(&robot, &mut pipette, &plate, well, 10.0, &options, &settings)
            .await
            .unwrap();

        let actions = robot.actions().await;
        // pick-up, arc in, slide, dispense, return, retreat, slide,
        // blow-out, retreat, touch
        assert_eq!(actions.len(), 10);
        assert!(matches!(
            actions[5],
            RobotAction::MoveTo { direct: false, .. }
        ));
        assert!(matches!(actions[7], RobotAction::BlowOutInPlace { .. }));
        assert!(matches!(
            actions[9],
            RobotAction::TouchTip { speed_mm_per_s, .. } if (speed_mm_per_s - 20.0).abs() < 1e-9
        ));
        if let RobotAction::MoveTo { location, .. } = &actions[8] {
            assert!((location.offset.z - 4.0).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_inspect_hovers_and_pauses_first() {
        let robot = MockRobot::new();
        let mut pipette = primed_pipette(&robot).await;
        let plate = assay_plate();
        let settings = Settings::default();
        let well = WellAddress::parse("A1").unwrap();

        let options = DispenseOptions {
            dispense_height_mm: 2.0,
            inspect: true,
            ..DispenseOptions::default()
        };
        offset_dispense(&robot, &mut pipette, &plate, well, 10.0, &options, &settings)
            .await
            .unwrap();

        let actions = robot.actions().await;
        assert!(matches!(
            &actions[1],
            RobotAction::MoveTo { location, .. }
                if location.anchor == crate::labware::WellAnchor::Top
                    && (location.offset.z - 10.0).abs() < 1e-9
        ));
        assert!(matches!(
            actions[2],
            RobotAction::Delay { seconds } if (seconds - 3.0).abs() < 1e-9
        ));
    }
}
