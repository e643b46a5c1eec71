//! Integration tests for serial dilution chains on the mock robot.

use pipettor::config::Settings;
use pipettor::hardware::{MockRobot, RobotAction};
use pipettor::labware::{Labware, WellRef};
use pipettor::ledger::VolumeLedger;
use pipettor::pipette::{Mount, Pipette, PipetteModel};
use pipettor::protocol::{serial_dilution, SerialDilution};

fn bench() -> (VolumeLedger, Settings) {
    let ledger = VolumeLedger::new(vec![
        Labware::usascientific_96_wellplate_2400ul_deep("deepwell"),
        Labware::fixed_trash(),
    ]);
    (ledger, Settings::default())
}

fn series(names: &[&str]) -> Vec<WellRef> {
    let plate = Labware::usascientific_96_wellplate_2400ul_deep("deepwell");
    names.iter().map(|n| plate.well(n).unwrap()).collect()
}

#[tokio::test]
async fn test_chain_moves_volume_down_and_off_the_series() {
    let robot = MockRobot::new();
    let (mut ledger, settings) = bench();
    let mut p300m = Pipette::new(PipetteModel::P300MultiGen2, Mount::Right);

    let wells = series(&["A1", "A2", "A3", "A4", "A5"]);
    let plan = SerialDilution::new(wells.clone(), 100.0, 100.0);
    serial_dilution(&robot, &mut ledger, &mut p300m, &plan, &settings)
        .await
        .unwrap();

    // The head of the chain only loses; every other well gains one transfer
    // and loses one, the last one losing its excess to the trash.
    assert_eq!(ledger.volume(&wells[0]).unwrap(), -100.0);
    for well in &wells[1..] {
        assert_eq!(ledger.volume(well).unwrap(), 0.0, "well {well}");
    }
    // The fan-out applies the same chain to every row of the plate.
    let h3 = Labware::usascientific_96_wellplate_2400ul_deep("deepwell")
        .well("H3")
        .unwrap();
    assert_eq!(ledger.volume(&h3).unwrap(), 0.0);
}

#[tokio::test]
async fn test_mix_counts_and_tip_discipline() {
    let robot = MockRobot::new();
    let (mut ledger, settings) = bench();
    let mut p300m = Pipette::new(PipetteModel::P300MultiGen2, Mount::Right);

    let wells = series(&["A1", "A2", "A3"]);
    let plan = SerialDilution::new(wells, 100.0, 150.0)
        .with_mix_steps(2)
        .with_mix_before(true)
        .with_blowout(false);
    serial_dilution(&robot, &mut ledger, &mut p300m, &plan, &settings)
        .await
        .unwrap();

    let actions = robot.actions().await;
    // Mix-before (2), one aspirate plus a 2-cycle mix per chain step (2
    // steps), and the trailing draw.
    let aspirates = actions
        .iter()
        .filter(|a| matches!(a, RobotAction::Aspirate { .. }))
        .count();
    assert_eq!(aspirates, 2 + 2 * (1 + 2) + 1);

    // One rim touch after the opening mix and one per chain step.
    let touches = actions
        .iter()
        .filter(|a| matches!(a, RobotAction::TouchTip { .. }))
        .count();
    assert_eq!(touches, 3);

    // A single tip serves the whole chain unless fresh tips are requested.
    let picks = actions
        .iter()
        .filter(|a| matches!(a, RobotAction::PickUpTip { .. }))
        .count();
    let drops = actions
        .iter()
        .filter(|a| matches!(a, RobotAction::DropTip { .. }))
        .count();
    assert_eq!(picks, 1);
    assert_eq!(drops, 1);
    assert!(matches!(actions.last(), Some(RobotAction::DropTip { .. })));
}

#[tokio::test]
async fn test_fresh_tip_chaining_changes_tips_between_steps() {
    let robot = MockRobot::new();
    let (mut ledger, settings) = bench();
    let mut p300m = Pipette::new(PipetteModel::P300MultiGen2, Mount::Right);

    let wells = series(&["A1", "A2", "A3", "A4"]);
    let plan = SerialDilution::new(wells, 100.0, 100.0).with_fresh_tip_each_step(true);
    serial_dilution(&robot, &mut ledger, &mut p300m, &plan, &settings)
        .await
        .unwrap();

    let actions = robot.actions().await;
    let picks = actions
        .iter()
        .filter(|a| matches!(a, RobotAction::PickUpTip { .. }))
        .count();
    let drops = actions
        .iter()
        .filter(|a| matches!(a, RobotAction::DropTip { .. }))
        .count();
    // One tip per chain step plus the one that carries the trailing draw to
    // the trash.
    assert_eq!(picks, 4);
    assert_eq!(drops, 4);
}
