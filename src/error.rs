//! Custom error types for the protocol engine.
//!
//! This module defines the primary error type, `ProtocolError`, for the entire
//! crate. Using the `thiserror` crate, it provides a centralized and consistent
//! way to handle every failure a run can hit, from malformed well names to
//! multichannel alignment problems.
//!
//! All engine errors are fatal to the run: a partially-completed pipetting run
//! cannot be rolled back, so nothing here is retried. Conditions that are risky
//! but survivable (a well filled past its safe capacity, a ledger volume dipping
//! negative) are logged as warnings instead of being raised; see
//! [`crate::ledger`] and [`crate::geometry`].

use thiserror::Error;

/// Convenience alias for results using the engine error type.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Which side of a transfer an alignment error refers to.
///
/// Kept as an explicit enum so multichannel diagnostics always name the side
/// that actually failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    /// The well liquid is drawn from.
    Source,
    /// The well liquid is dispensed into.
    Destination,
}

impl std::fmt::Display for TransferRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferRole::Source => write!(f, "source"),
            TransferRole::Destination => write!(f, "destination"),
        }
    }
}

/// Primary error type for the liquid-handling engine.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// A well name did not parse, or an address fell outside its plate.
    #[error("invalid well name '{name}': {reason}")]
    InvalidWellName {
        /// The offending name, verbatim.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A requested height sits at or above the top of the well.
    #[error(
        "invalid geometry: height {height_mm} mm above bottom is not below the well depth of {depth_mm} mm"
    )]
    InvalidGeometry {
        /// Requested height above the well bottom, in mm.
        height_mm: f64,
        /// Physical well depth, in mm.
        depth_mm: f64,
    },

    /// An offset direction string was not one of the five supported values.
    #[error(
        "invalid offset direction '{0}': must be \"center\", \"left\", \"right\", \"top\", or \"bottom\""
    )]
    InvalidOffsetDirection(String),

    /// A transfer volume lies outside the pipette's working range.
    #[error(
        "transfer volume {volume_ul} uL is outside the {pipette} range of {min_ul}-{max_ul} uL"
    )]
    VolumeOutOfRange {
        /// Requested per-destination volume, in uL.
        volume_ul: f64,
        /// Pipette minimum aspirate volume, in uL.
        min_ul: f64,
        /// Pipette maximum aspirate volume, in uL.
        max_ul: f64,
        /// Human-readable pipette model name.
        pipette: &'static str,
    },

    /// A multichannel transfer did not start at the row the plate geometry
    /// requires.
    #[error(
        "multichannel {role} transfers on a {plate_rows}-row plate must start at row {expected}, not row {start_row}"
    )]
    InvalidMultichannelAlignment {
        /// Side of the transfer that is misaligned.
        role: TransferRole,
        /// Row count of the offending plate.
        plate_rows: u8,
        /// Row letter the transfer actually started at.
        start_row: char,
        /// Description of the allowed start rows ("A" or "A or B").
        expected: &'static str,
    },

    /// A multichannel transfer addressed a plate whose row count has no
    /// defined channel fan-out.
    #[error(
        "plate '{plate}' has {rows} rows; multichannel transfers support 1-, 8-, or 16-row plates"
    )]
    UnsupportedPlateGeometry {
        /// Identifier of the offending plate.
        plate: String,
        /// Its row count.
        rows: u8,
    },

    /// One compound/level group in the design table resolved to more than one
    /// distinct source well.
    #[error("compound '{compound}' level {level} resolves to multiple sources: {sources:?}")]
    AmbiguousSource {
        /// Compound whose rows disagree.
        compound: String,
        /// Dilution level within the compound.
        level: u32,
        /// The distinct sources that were found.
        sources: Vec<String>,
    },

    /// A well reference named a plate that was never registered with the
    /// ledger.
    #[error("plate '{0}' is not registered with the volume ledger")]
    UnknownPlate(String),

    /// Configuration file or environment parsing failed.
    #[error("configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but failed semantic validation.
    #[error("configuration validation error: {0}")]
    Configuration(String),

    /// The robot driver reported a hardware or simulation failure.
    #[error("robot driver error: {0}")]
    Driver(anyhow::Error),
}

impl From<anyhow::Error> for ProtocolError {
    fn from(err: anyhow::Error) -> Self {
        ProtocolError::Driver(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_error_names_correct_side() {
        let err = ProtocolError::InvalidMultichannelAlignment {
            role: TransferRole::Destination,
            plate_rows: 8,
            start_row: 'B',
            expected: "A",
        };
        let msg = err.to_string();
        assert!(msg.contains("destination"), "message was: {msg}");
        assert!(msg.contains("row A"), "message was: {msg}");
        assert!(msg.contains("row B"), "message was: {msg}");
    }

    #[test]
    fn test_volume_out_of_range_display() {
        let err = ProtocolError::VolumeOutOfRange {
            volume_ul: 350.0,
            min_ul: 20.0,
            max_ul: 300.0,
            pipette: "p300_multi_gen2",
        };
        assert!(err.to_string().contains("350"));
        assert!(err.to_string().contains("p300_multi_gen2"));
    }

    #[test]
    fn test_driver_error_wraps_anyhow() {
        let err: ProtocolError = anyhow::anyhow!("tip not mounted").into();
        assert!(err.to_string().contains("tip not mounted"));
    }
}
