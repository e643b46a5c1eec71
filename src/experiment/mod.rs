//! Experiment layer: design tables and the phased assay run.
//!
//! [`design`] turns dose and parameter tables into resolved, batched
//! transfer work; [`phases`] executes that work against a deck as the four
//! phases of an assay build.

pub mod design;
pub mod phases;

pub use design::{
    level_batches, CompoundParameters, DoseRow, ExperimentDesign, LevelBatch, ResolvedDose,
    StandardCurveSpec, VolumeGroup,
};
pub use phases::{blink_rail_lights, AssayRun, Deck};
