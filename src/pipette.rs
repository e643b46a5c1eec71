//! Pipette models and per-run pipette state.
//!
//! The two instruments the assay deck carries are described by
//! [`PipetteModel`], a closed enum whose profile data (tip geometry, working
//! volume range, channel count) is resolved by exhaustive match rather than
//! by name lookup. [`Pipette`] layers the mutable run state on top: which
//! mount the instrument occupies, whether a tip is mounted, and how much
//! liquid the tip currently holds.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// Which side of the gantry a pipette is mounted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mount {
    /// Left mount.
    Left,
    /// Right mount.
    Right,
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mount::Left => write!(f, "left"),
            Mount::Right => write!(f, "right"),
        }
    }
}

/// Static profile data for one pipette model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipetteProfile {
    /// Vendor API name, used in logs and diagnostics.
    pub api_name: &'static str,
    /// Tip outer diameter at the very tip, in mm.
    pub tip_base_diameter_mm: f64,
    /// Tip taper: added diameter per mm of distance up from the tip.
    pub tip_taper_mm_per_mm: f64,
    /// Smallest volume the pipette can transfer accurately, in uL.
    pub min_volume_ul: f64,
    /// Largest volume one aspirate can hold, in uL.
    pub max_volume_ul: f64,
    /// Number of channels drawing liquid in parallel (1 or 8).
    pub channels: u8,
}

const P20_SINGLE_GEN2: PipetteProfile = PipetteProfile {
    api_name: "p20_single_gen2",
    tip_base_diameter_mm: 0.90,
    tip_taper_mm_per_mm: 0.083,
    min_volume_ul: 1.0,
    max_volume_ul: 20.0,
    channels: 1,
};

const P300_MULTI_GEN2: PipetteProfile = PipetteProfile {
    api_name: "p300_multi_gen2",
    tip_base_diameter_mm: 1.07,
    tip_taper_mm_per_mm: 0.093,
    min_volume_ul: 20.0,
    max_volume_ul: 300.0,
    channels: 8,
};

/// The pipette models the engine knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipetteModel {
    /// Single-channel 1-20 uL pipette.
    P20SingleGen2,
    /// Eight-channel 20-300 uL pipette.
    P300MultiGen2,
}

impl PipetteModel {
    /// The model's static profile record.
    pub const fn profile(self) -> &'static PipetteProfile {
        match self {
            PipetteModel::P20SingleGen2 => &P20_SINGLE_GEN2,
            PipetteModel::P300MultiGen2 => &P300_MULTI_GEN2,
        }
    }

    /// Resolves a vendor API name ("p300_multi_gen2") to a model.
    pub fn parse(name: &str) -> ProtocolResult<Self> {
        match name {
            "p20_single_gen2" => Ok(PipetteModel::P20SingleGen2),
            "p300_multi_gen2" => Ok(PipetteModel::P300MultiGen2),
            other => Err(ProtocolError::Configuration(format!(
                "unknown pipette model '{other}'"
            ))),
        }
    }
}

impl fmt::Display for PipetteModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.profile().api_name)
    }
}

/// Run-time state of one mounted pipette.
///
/// The transfer engines keep this in sync with every tip and liquid
/// operation they issue, so batched distributes can account for liquid
/// already held in the tip.
#[derive(Debug, Clone)]
pub struct Pipette {
    /// The instrument model.
    pub model: PipetteModel,
    /// The mount it occupies.
    pub mount: Mount,
    has_tip: bool,
    current_volume_ul: f64,
}

impl Pipette {
    /// Creates a pipette with no tip mounted.
    pub fn new(model: PipetteModel, mount: Mount) -> Self {
        Pipette {
            model,
            mount,
            has_tip: false,
            current_volume_ul: 0.0,
        }
    }

    /// Whether a tip is currently mounted.
    pub fn has_tip(&self) -> bool {
        self.has_tip
    }

    /// Liquid volume currently held in the tip, in uL.
    pub fn current_volume_ul(&self) -> f64 {
        self.current_volume_ul
    }

    /// Shorthand for the model's profile record.
    pub fn profile(&self) -> &'static PipetteProfile {
        self.model.profile()
    }

    pub(crate) fn note_tip_picked(&mut self) {
        self.has_tip = true;
        self.current_volume_ul = 0.0;
    }

    pub(crate) fn note_tip_dropped(&mut self) {
        self.has_tip = false;
        self.current_volume_ul = 0.0;
    }

    pub(crate) fn note_aspirated(&mut self, volume_ul: f64) {
        self.current_volume_ul += volume_ul;
    }

    pub(crate) fn note_dispensed(&mut self, volume_ul: f64) {
        self.current_volume_ul = (self.current_volume_ul - volume_ul).max(0.0);
    }

    pub(crate) fn note_blown_out(&mut self) {
        self.current_volume_ul = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profiles_match_vendor_data() {
        let p20 = PipetteModel::P20SingleGen2.profile();
        assert_eq!(p20.channels, 1);
        assert!((p20.min_volume_ul - 1.0).abs() < f64::EPSILON);
        assert!((p20.max_volume_ul - 20.0).abs() < f64::EPSILON);
        assert!((p20.tip_base_diameter_mm - 0.90).abs() < f64::EPSILON);

        let p300m = PipetteModel::P300MultiGen2.profile();
        assert_eq!(p300m.channels, 8);
        assert!((p300m.min_volume_ul - 20.0).abs() < f64::EPSILON);
        assert!((p300m.max_volume_ul - 300.0).abs() < f64::EPSILON);
        assert!((p300m.tip_taper_mm_per_mm - 0.093).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_model_names() {
        assert_eq!(
            PipetteModel::parse("p20_single_gen2").unwrap(),
            PipetteModel::P20SingleGen2
        );
        assert_eq!(
            PipetteModel::parse("p300_multi_gen2").unwrap(),
            PipetteModel::P300MultiGen2
        );
        assert!(PipetteModel::parse("p1000_single_gen2").is_err());
    }

    #[test]
    fn test_volume_accounting() {
        let mut pipette = Pipette::new(PipetteModel::P300MultiGen2, Mount::Right);
        assert!(!pipette.has_tip());

        pipette.note_tip_picked();
        pipette.note_aspirated(290.0);
        assert!((pipette.current_volume_ul() - 290.0).abs() < 1e-9);

        pipette.note_dispensed(20.0);
        assert!((pipette.current_volume_ul() - 270.0).abs() < 1e-9);

        pipette.note_blown_out();
        assert!(pipette.current_volume_ul().abs() < f64::EPSILON);

        pipette.note_tip_dropped();
        assert!(!pipette.has_tip());
    }
}
