//! Standard-curve setup on the assay plate.
//!
//! A standard curve is a column of two-fold dilutions of one component
//! (typically NADH or NADPH) in assay buffer, used to calibrate the plate
//! reader. Each curve occupies one column: the start well holds a 1:3
//! dilution of the component source, every following dilution well starts
//! with buffer, and the single-channel pipette chains the dilution down the
//! column. The blanks at the end of the column receive buffer only.
//!
//! After every curve column is built, the multichannel pipette tops the
//! first two rows of each curve column off with buffer in one distribute
//! pass, which is why curves must start in row A.

use tracing::info;

use crate::config::Settings;
use crate::error::{ProtocolError, ProtocolResult, TransferRole};
use crate::geometry::OffsetDirection;
use crate::hardware::RobotDriver;
use crate::labware::{WellAddress, WellRef};
use crate::ledger::VolumeLedger;
use crate::pipette::Pipette;
use crate::protocol::dilution::{serial_dilution, SerialDilution};
use crate::protocol::transfer::{transfer, TransferRequest, TransferSource};

/// Per-step transfer volume within a curve, in uL.
const CURVE_TRANSFER_VOLUME_UL: f64 = 20.0;

/// Buffer volume added to the top two rows of each curve column, in uL.
const BUFFER_TOP_OFF_VOLUME_UL: f64 = 40.0;

/// One batch of standard curves, all built from the same component and
/// buffer sources.
#[derive(Debug, Clone)]
pub struct StandardCurvePlan {
    /// Where the undiluted component comes from.
    pub component_source: TransferSource,
    /// Where the assay buffer comes from.
    pub buffer_source: TransferSource,
    /// First well of each curve. One curve is built per entry, and every
    /// entry must sit in row A of the assay plate.
    pub start_wells: Vec<WellRef>,
    /// Number of dilution steps per curve, one row each.
    pub dilutions: u32,
    /// Number of buffer-only blank wells after the dilutions.
    pub blanks: u32,
}

impl StandardCurvePlan {
    /// A plan with the standard 14-dilution, 2-blank column layout.
    pub fn new(
        component_source: impl Into<TransferSource>,
        buffer_source: impl Into<TransferSource>,
        start_wells: Vec<WellRef>,
    ) -> Self {
        StandardCurvePlan {
            component_source: component_source.into(),
            buffer_source: buffer_source.into(),
            start_wells,
            dilutions: 14,
            blanks: 2,
        }
    }

    /// Sets the number of dilution steps per curve.
    pub fn with_dilutions(mut self, dilutions: u32) -> Self {
        self.dilutions = dilutions;
        self
    }

    /// Sets the number of blank wells per curve.
    pub fn with_blanks(mut self, blanks: u32) -> Self {
        self.blanks = blanks;
        self
    }
}

/// Builds every standard curve in the plan.
///
/// The single-channel pipette lays buffer and component into each curve
/// column and chains the dilution; the multichannel pipette then adds
/// buffer to rows A and B of all curve columns in one distribute pass.
/// Curves that do not start in row A fail with
/// [`ProtocolError::InvalidMultichannelAlignment`], because the closing
/// buffer pass relies on the row A/B alternating fan-out.
pub async fn standard_curve(
    robot: &dyn RobotDriver,
    ledger: &mut VolumeLedger,
    p20: &mut Pipette,
    p300m: &mut Pipette,
    plan: &StandardCurvePlan,
    settings: &Settings,
) -> ProtocolResult<()> {
    if plan.dilutions <= 1 {
        return Err(ProtocolError::Configuration(
            "a dilution series must have more than one dilution".to_string(),
        ));
    }
    // Re-home before the fine-pitched 384-well work to keep XY accuracy.
    robot.home().await?;

    for start in &plan.start_wells {
        robot
            .comment(&format!("Setting up standard curve in well {}", start.well))
            .await?;
        info!(start = %start, "setting up standard curve");

        let plate = ledger.labware(&start.plate)?.clone();
        let total_wells = (plan.dilutions + plan.blanks) as usize;
        let mut curve_wells = Vec::with_capacity(total_wells);
        for step in 0..total_wells {
            let address = start.well.offset_by(0, step as i32)?;
            curve_wells.push(plate.well_at(address)?);
        }

        // Buffer into every well except the start; the start well takes
        // undiluted component only.
        let buffer_request = TransferRequest::single(
            plan.buffer_source.clone(),
            curve_wells[1..].to_vec(),
            CURVE_TRANSFER_VOLUME_UL,
        )
        .with_dispense_height(2.0)
        .with_direction(OffsetDirection::Left)
        .with_blowout(false);
        transfer(robot, ledger, p20, &buffer_request, settings).await?;

        robot
            .comment("Adding component to the first well of the curve")
            .await?;
        info!(well = %start, "adding component to the first curve well");
        let first_request = TransferRequest::single(
            plan.component_source.clone(),
            vec![start.clone()],
            CURVE_TRANSFER_VOLUME_UL,
        )
        .with_dispense_height(2.0)
        .with_direction(OffsetDirection::Left)
        .with_blowout(false)
        .with_drop_tip(false);
        transfer(robot, ledger, p20, &first_request, settings).await?;

        // The second well already holds buffer, so this lands higher and
        // keeps the same tip without rewetting.
        let second_request = TransferRequest::single(
            plan.component_source.clone(),
            vec![curve_wells[1].clone()],
            CURVE_TRANSFER_VOLUME_UL,
        )
        .with_dispense_height(4.0)
        .with_direction(OffsetDirection::Left)
        .with_blowout(false)
        .with_drop_tip(false)
        .with_prewet(false);
        transfer(robot, ledger, p20, &second_request, settings).await?;

        robot.comment("Making serial dilution of component").await?;
        info!("making serial dilution of component");
        let chain = curve_wells[1..plan.dilutions as usize].to_vec();
        let dilution = SerialDilution::new(chain, CURVE_TRANSFER_VOLUME_UL, CURVE_TRANSFER_VOLUME_UL)
            .with_mix_steps(5)
            .with_dispense_height(4.0)
            .with_blowout_height(4.0)
            .with_mix_before(true)
            .with_blowout(false);
        serial_dilution(robot, ledger, p20, &dilution, settings).await?;
    }

    // Top off rows A and B of every curve column with buffer, B-row wells
    // first. The multichannel fan-out from those two rows covers the whole
    // column.
    let mut buffer_wells = Vec::with_capacity(plan.start_wells.len() * 2);
    for row in (0..2u8).rev() {
        for start in &plan.start_wells {
            if start.well.row != 0 {
                let plate = ledger.labware(&start.plate)?;
                return Err(ProtocolError::InvalidMultichannelAlignment {
                    role: TransferRole::Destination,
                    plate_rows: plate.rows,
                    start_row: start.well.row_letter(),
                    expected: "A",
                });
            }
            let plate = ledger.labware(&start.plate)?;
            buffer_wells.push(plate.well_at(WellAddress::new(row, start.well.col))?);
        }
    }

    let top_off = TransferRequest::distribute(
        plan.buffer_source.clone(),
        buffer_wells,
        BUFFER_TOP_OFF_VOLUME_UL,
    )
    .with_dispense_height(6.0)
    .with_direction(OffsetDirection::Right)
    .with_touch_tip(false)
    .with_blowout(false)
    .with_even_split(true);
    transfer(robot, ledger, p300m, &top_off, settings).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{MockRobot, RobotAction};
    use crate::labware::Labware;
    use crate::pipette::{Mount, PipetteModel};

    fn bench() -> (VolumeLedger, Settings) {
        let ledger = VolumeLedger::new(vec![
            Labware::corning_384_wellplate_112ul_flat("assay-plate"),
            Labware::usascientific_96_wellplate_2400ul_deep("deepwell"),
            Labware::nest_12_reservoir_15ml("reservoir"),
            Labware::fixed_trash(),
        ]);
        (ledger, Settings::default())
    }

    fn pipettes() -> (Pipette, Pipette) {
        (
            Pipette::new(PipetteModel::P20SingleGen2, Mount::Left),
            Pipette::new(PipetteModel::P300MultiGen2, Mount::Right),
        )
    }

    fn assay_well(name: &str) -> WellRef {
        Labware::corning_384_wellplate_112ul_flat("assay-plate")
            .well(name)
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_single_dilution_series() {
        let robot = MockRobot::new();
        let (mut ledger, settings) = bench();
        let (mut p20, mut p300m) = pipettes();

        let component = Labware::usascientific_96_wellplate_2400ul_deep("deepwell")
            .well("A5")
            .unwrap();
        let buffer = Labware::nest_12_reservoir_15ml("reservoir").well("A1").unwrap();
        let plan = StandardCurvePlan::new(component, buffer, vec![assay_well("A1")])
            .with_dilutions(1);
        let result =
            standard_curve(&robot, &mut ledger, &mut p20, &mut p300m, &plan, &settings).await;
        assert!(matches!(result, Err(ProtocolError::Configuration(_))));
        assert_eq!(robot.action_count().await, 0);
    }

    #[tokio::test]
    async fn test_rejects_start_well_outside_row_a() {
        let robot = MockRobot::new();
        let (mut ledger, settings) = bench();
        let (mut p20, mut p300m) = pipettes();

        let component = Labware::usascientific_96_wellplate_2400ul_deep("deepwell")
            .well("A5")
            .unwrap();
        let buffer = Labware::nest_12_reservoir_15ml("reservoir").well("A1").unwrap();
        let plan = StandardCurvePlan::new(component, buffer, vec![assay_well("B1")])
            .with_dilutions(3)
            .with_blanks(0);
        let result =
            standard_curve(&robot, &mut ledger, &mut p20, &mut p300m, &plan, &settings).await;
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidMultichannelAlignment {
                start_row: 'B',
                expected: "A",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_small_curve_volume_layout() {
        let robot = MockRobot::new();
        let (mut ledger, settings) = bench();
        let (mut p20, mut p300m) = pipettes();

        let component = Labware::usascientific_96_wellplate_2400ul_deep("deepwell")
            .well("A5")
            .unwrap();
        let buffer = Labware::nest_12_reservoir_15ml("reservoir").well("A1").unwrap();
        ledger.fill(&component, 2000.0).unwrap();
        ledger.fill(&buffer, 10_000.0).unwrap();

        let plan = StandardCurvePlan::new(
            component.clone(),
            buffer.clone(),
            vec![assay_well("A1")],
        )
        .with_dilutions(3)
        .with_blanks(1);
        standard_curve(&robot, &mut ledger, &mut p20, &mut p300m, &plan, &settings)
            .await
            .unwrap();

        // Buffer went into B1..D1, component into A1 and B1, the chain
        // carried 20 from B1 into C1 and drew the excess off C1, and the
        // closing distribute booked 40 into every other row from B and
        // from A.
        for name in ["A1", "B1", "C1", "D1"] {
            assert!(
                (ledger.volume(&assay_well(name)).unwrap() - 60.0).abs() < 1e-9,
                "well {name}"
            );
        }
        // Rows past the curve got the distribute fan-out only.
        assert!((ledger.volume(&assay_well("E1")).unwrap() - 40.0).abs() < 1e-9);

        // Component: one transfer into each of the first two wells.
        assert!((ledger.volume(&component).unwrap() - (2000.0 - 40.0)).abs() < 1e-9);
        // Buffer: three single transfers plus two 8-channel draws of 40.
        let expected_buffer = 10_000.0 - 3.0 * 20.0 - 2.0 * 40.0 * 8.0;
        assert!((ledger.volume(&buffer).unwrap() - expected_buffer).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_homes_before_building_curves() {
        let robot = MockRobot::new();
        let (mut ledger, settings) = bench();
        let (mut p20, mut p300m) = pipettes();

        let component = Labware::usascientific_96_wellplate_2400ul_deep("deepwell")
            .well("A5")
            .unwrap();
        let buffer = Labware::nest_12_reservoir_15ml("reservoir").well("A1").unwrap();
        let plan = StandardCurvePlan::new(component, buffer, vec![assay_well("A3")])
            .with_dilutions(2)
            .with_blanks(0);
        standard_curve(&robot, &mut ledger, &mut p20, &mut p300m, &plan, &settings)
            .await
            .unwrap();

        let actions = robot.actions().await;
        assert_eq!(actions[0], RobotAction::Home);
        assert!(actions.iter().any(|a| matches!(
            a,
            RobotAction::Comment { text } if text.contains("A3")
        )));
    }
}
