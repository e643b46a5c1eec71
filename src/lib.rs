//! # Pipettor Core Library
//!
//! This crate is the core library for the `pipettor` protocol engine. It encapsulates the
//! components required to plan and execute a volume-tracked liquid-handling run: labware and
//! deck geometry, pipette profiles, the transfer engines, and the phased assay workflow. By
//! organizing the project as a library, the same protocol logic drives real hardware through
//! a driver implementation, the simulated `MockRobot` in dry runs, and the test suite.
//!
//! ## Crate Structure
//!
//! The library is organized into several modules, each with a distinct responsibility:
//!
//! - **`config`**: Defines the structures for loading and validating engine settings from
//!   TOML files and the environment. See `config::Settings`.
//! - **`error`**: Defines the custom `ProtocolError` enum for centralized error handling
//!   across the engine.
//! - **`labware`**: Plate geometry and well addressing: `WellAddress`, `Labware`, `WellRef`,
//!   and the `Location` type the driver moves to.
//! - **`pipette`**: Pipette models, their physical profiles, and mounted-state tracking.
//! - **`geometry`**: Well-edge offset math for offset dispensing and tracked-volume dispense
//!   heights.
//! - **`ledger`**: The `VolumeLedger` that books every transfer, expanding multichannel
//!   operations through the plate fan-out rules.
//! - **`hardware`**: The `RobotDriver` trait that protocol logic executes against, plus the
//!   recording `MockRobot`.
//! - **`protocol`**: The transfer engines: offset dispense, single and distribute transfers,
//!   serial dilution, and the standard-curve routine.
//! - **`experiment`**: The experiment design tables and the four-phase `AssayRun`.
//! - **`tracing_setup`**: Structured logging initialization shared by demos and services.

pub mod config;
pub mod error;
pub mod experiment;
pub mod geometry;
pub mod hardware;
pub mod labware;
pub mod ledger;
pub mod pipette;
pub mod protocol;
pub mod tracing_setup;
