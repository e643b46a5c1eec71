//! Simulated Assay Run
//!
//! This example walks a complete four-phase assay build on the mock robot:
//! enzyme dilutions, an NADH standard curve, reagent distribution, and the
//! heated reaction start. It finishes by printing the tracked volume grid
//! for every plate on the deck, where negative values read as consumption.
//!
//! Run with: cargo run --example assay_run

use std::sync::Arc;

use anyhow::Result;
use tracing::Level;

use pipettor::config::Settings;
use pipettor::experiment::{
    AssayRun, CompoundParameters, DoseRow, ExperimentDesign, StandardCurveSpec,
};
use pipettor::hardware::MockRobot;
use pipettor::labware::{Labware, PlateId, WellAddress};
use pipettor::pipette::PipetteModel;
use pipettor::tracing_setup::{self, OutputFormat, TracingConfig};

/// A small AdhE-style design: a titrated cell-free extract, a cofactor, a
/// heat-started reagent, and one full-column NADH standard curve.
fn demo_design() -> Result<ExperimentDesign> {
    let deepwell = PlateId::new("deepwell");
    let reservoir = Labware::nest_12_reservoir_15ml("reservoir");

    let mut doses = Vec::new();
    for well in ["A1", "B1"] {
        doses.push(DoseRow::new(WellAddress::parse(well)?, "CFE", 1, 20.0));
        doses.push(DoseRow::new(WellAddress::parse(well)?, "NAD", 1, 40.0));
        doses.push(DoseRow::new(WellAddress::parse(well)?, "ATP", 1, 20.0));
    }
    for well in ["A2", "B2"] {
        doses.push(DoseRow::new(WellAddress::parse(well)?, "CFE", 2, 20.0));
        doses.push(DoseRow::new(WellAddress::parse(well)?, "NAD", 1, 40.0));
        doses.push(DoseRow::new(WellAddress::parse(well)?, "ATP", 1, 20.0));
    }

    let parameters = vec![
        CompoundParameters::new(
            "CFE",
            deepwell.clone(),
            WellAddress::parse("A9")?,
            PipetteModel::P300MultiGen2,
        )
        .with_order_of_addition(1),
        CompoundParameters::new(
            "NAD",
            deepwell.clone(),
            WellAddress::parse("A11")?,
            PipetteModel::P300MultiGen2,
        )
        .with_order_of_addition(2),
        CompoundParameters::new(
            "ATP",
            deepwell,
            WellAddress::parse("A12")?,
            PipetteModel::P300MultiGen2,
        )
        .with_order_of_addition(3)
        .with_start_component(true),
    ];

    let curve = StandardCurveSpec::new(
        "NADH",
        reservoir.well("A2")?,
        reservoir.well("A1")?,
        vec![WellAddress::parse("A3")?],
    );

    Ok(ExperimentDesign::new(doses, parameters).with_standard_curves(vec![curve]))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_setup::init(TracingConfig::new(Level::INFO).with_format(OutputFormat::Compact))
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("=== Simulated Assay Run ===\n");

    // 1. Load the engine settings (config/pipettor.toml plus PIPETTOR_*
    //    environment overrides; defaults if neither is present).
    let settings = Settings::load()?;
    println!(
        "1. Settings loaded (carryover {:.0}%, blink every {:.1}s)",
        settings.liquid.carryover_fraction * 100.0,
        settings.operator.rail_blink_interval_s
    );

    // 2. Build the experiment design.
    let design = demo_design()?;
    println!(
        "2. Design: {} dose rows, {} compounds, {} standard curve(s)\n",
        design.doses.len(),
        design.parameters.len(),
        design.standard_curves.len()
    );

    // 3. Run all four phases against the mock robot.
    let robot = MockRobot::new();
    let mut run = AssayRun::new(Arc::new(robot.clone()), design, settings);
    run.execute().await?;
    println!(
        "\n3. Run complete: {} robot actions recorded",
        robot.action_count().await
    );

    // 4. Show where every microliter went.
    println!("\n=== Tracked volumes (net change since the run started) ===\n");
    print!("{}", run.ledger().render_all());

    Ok(())
}
