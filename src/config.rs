//! Engine configuration using Figment.
//!
//! Pipetting policy that is tunable per deployment lives here rather than in
//! the protocol code: clearances, speeds, carryover, blow-out heights, and
//! the operator-alert timing. Configuration is loaded from:
//! 1. `config/pipettor.toml` (base configuration)
//! 2. Environment variables (prefixed with `PIPETTOR_`, `__` separating the
//!    section from the key: `PIPETTOR_LIQUID__CARRYOVER_FRACTION=0.15`)
//!
//! # Example
//! ```no_run
//! use pipettor::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("carryover: {}", settings.liquid.carryover_fraction);
//! # Ok::<(), pipettor::error::ProtocolError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ProtocolError, ProtocolResult};

/// Top-level engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Gantry motion and tip-handling policy.
    #[serde(default)]
    pub motion: MotionSettings,
    /// Liquid-handling policy.
    #[serde(default)]
    pub liquid: LiquidSettings,
    /// Operator-interaction policy.
    #[serde(default)]
    pub operator: OperatorSettings,
}

/// Motion and tip-handling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotionSettings {
    /// Height above the well floor used when a bare well is given as a
    /// liquid target, in mm.
    #[serde(default = "default_well_bottom_clearance")]
    pub well_bottom_clearance_mm: f64,
    /// Extra lateral offset added when pipetting against a well wall so the
    /// tip stays engaged with the plastic, in mm.
    #[serde(default = "default_edge_engagement_extra")]
    pub edge_engagement_extra_mm: f64,
    /// Default touch-tip speed, in mm/s.
    #[serde(default = "default_touch_tip_speed")]
    pub touch_tip_speed_mm_per_s: f64,
    /// Reduced touch-tip speed used right after a dispense, when droplets
    /// cling to the tip, in mm/s.
    #[serde(default = "default_gentle_touch_tip_speed")]
    pub gentle_touch_tip_speed_mm_per_s: f64,
    /// Hover height above the well top for tip inspection, in mm.
    #[serde(default = "default_inspect_hover")]
    pub inspect_hover_mm: f64,
    /// How long to hold the inspection hover, in seconds.
    #[serde(default = "default_inspect_pause")]
    pub inspect_pause_s: f64,
}

/// Liquid-handling policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidSettings {
    /// Fraction of pipette capacity held back as disposal volume during
    /// batched distributes.
    #[serde(default = "default_carryover_fraction")]
    pub carryover_fraction: f64,
    /// Extra height above the computed liquid surface when dispensing by
    /// tracked volume, in mm.
    #[serde(default = "default_surface_clearance")]
    pub surface_clearance_mm: f64,
    /// Lowest allowed tracked-volume dispense height, in mm.
    #[serde(default = "default_min_dispense_height")]
    pub min_dispense_height_mm: f64,
    /// Planned assay-well volume above which a warning is logged, in uL.
    #[serde(default = "default_fill_warning_threshold")]
    pub fill_warning_threshold_ul: f64,
    /// Blow-out height above the source well bottom after a prewet, in mm.
    #[serde(default = "default_source_blowout_height")]
    pub source_blowout_height_mm: f64,
    /// Blow-out height above the destination well bottom, in mm.
    #[serde(default = "default_dest_blowout_height")]
    pub dest_blowout_height_mm: f64,
    /// Settle time between mix cycles, in seconds.
    #[serde(default = "default_mix_settle")]
    pub mix_settle_s: f64,
}

/// Operator-interaction policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSettings {
    /// Half-period of the rail-light blink used to call the operator over,
    /// in seconds.
    #[serde(default = "default_rail_blink_interval")]
    pub rail_blink_interval_s: f64,
}

// Default value functions
fn default_well_bottom_clearance() -> f64 {
    1.0
}

fn default_edge_engagement_extra() -> f64 {
    0.2
}

fn default_touch_tip_speed() -> f64 {
    60.0
}

fn default_gentle_touch_tip_speed() -> f64 {
    20.0
}

fn default_inspect_hover() -> f64 {
    10.0
}

fn default_inspect_pause() -> f64 {
    3.0
}

fn default_carryover_fraction() -> f64 {
    0.1
}

fn default_surface_clearance() -> f64 {
    0.8
}

fn default_min_dispense_height() -> f64 {
    1.0
}

fn default_fill_warning_threshold() -> f64 {
    100.0
}

fn default_source_blowout_height() -> f64 {
    25.0
}

fn default_dest_blowout_height() -> f64 {
    8.0
}

fn default_mix_settle() -> f64 {
    0.5
}

fn default_rail_blink_interval() -> f64 {
    0.5
}

impl Default for MotionSettings {
    fn default() -> Self {
        MotionSettings {
            well_bottom_clearance_mm: default_well_bottom_clearance(),
            edge_engagement_extra_mm: default_edge_engagement_extra(),
            touch_tip_speed_mm_per_s: default_touch_tip_speed(),
            gentle_touch_tip_speed_mm_per_s: default_gentle_touch_tip_speed(),
            inspect_hover_mm: default_inspect_hover(),
            inspect_pause_s: default_inspect_pause(),
        }
    }
}

impl Default for LiquidSettings {
    fn default() -> Self {
        LiquidSettings {
            carryover_fraction: default_carryover_fraction(),
            surface_clearance_mm: default_surface_clearance(),
            min_dispense_height_mm: default_min_dispense_height(),
            fill_warning_threshold_ul: default_fill_warning_threshold(),
            source_blowout_height_mm: default_source_blowout_height(),
            dest_blowout_height_mm: default_dest_blowout_height(),
            mix_settle_s: default_mix_settle(),
        }
    }
}

impl Default for OperatorSettings {
    fn default() -> Self {
        OperatorSettings {
            rail_blink_interval_s: default_rail_blink_interval(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            motion: MotionSettings::default(),
            liquid: LiquidSettings::default(),
            operator: OperatorSettings::default(),
        }
    }
}

impl Settings {
    /// Loads settings from `config/pipettor.toml` and the environment.
    ///
    /// Environment variables override file values with the `PIPETTOR_`
    /// prefix. Example: `PIPETTOR_MOTION__TOUCH_TIP_SPEED_MM_PER_S=40`.
    pub fn load() -> ProtocolResult<Self> {
        Self::load_from("config/pipettor.toml")
    }

    /// Loads settings from a specific file path plus the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> ProtocolResult<Self> {
        let settings: Settings = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PIPETTOR_").split("__"))
            .extract()?;
        settings
            .validate()
            .map_err(ProtocolError::Configuration)?;
        Ok(settings)
    }

    /// Validates settings after loading.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=0.5).contains(&self.liquid.carryover_fraction) {
            return Err(format!(
                "Invalid carryover_fraction {}. Must be 0.0-0.5",
                self.liquid.carryover_fraction
            ));
        }

        if self.motion.touch_tip_speed_mm_per_s <= 0.0
            || self.motion.gentle_touch_tip_speed_mm_per_s <= 0.0
        {
            return Err("Touch-tip speeds must be positive".to_string());
        }

        if self.motion.well_bottom_clearance_mm < 0.0 {
            return Err(format!(
                "Invalid well_bottom_clearance_mm {}. Must not be negative",
                self.motion.well_bottom_clearance_mm
            ));
        }

        if self.liquid.min_dispense_height_mm < 0.0 || self.liquid.surface_clearance_mm < 0.0 {
            return Err("Dispense heights must not be negative".to_string());
        }

        if self.liquid.fill_warning_threshold_ul <= 0.0 {
            return Err(format!(
                "Invalid fill_warning_threshold_ul {}. Must be positive",
                self.liquid.fill_warning_threshold_ul
            ));
        }

        if self.liquid.mix_settle_s < 0.0 || self.motion.inspect_pause_s < 0.0 {
            return Err("Delays must not be negative".to_string());
        }

        if self.operator.rail_blink_interval_s <= 0.0 {
            return Err(format!(
                "Invalid rail_blink_interval_s {}. Must be positive",
                self.operator.rail_blink_interval_s
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert!((settings.liquid.carryover_fraction - 0.1).abs() < f64::EPSILON);
        assert!((settings.motion.well_bottom_clearance_mm - 1.0).abs() < f64::EPSILON);
        assert!((settings.liquid.dest_blowout_height_mm - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validation_rejects_bad_carryover() {
        let mut settings = Settings::default();
        settings.liquid.carryover_fraction = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_blink_interval() {
        let mut settings = Settings::default();
        settings.operator.rail_blink_interval_s = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[liquid]\ncarryover_fraction = 0.2").unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert!((settings.liquid.carryover_fraction - 0.2).abs() < f64::EPSILON);
        // Untouched sections keep their defaults.
        assert!((settings.motion.touch_tip_speed_mm_per_s - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_load_from_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[liquid]\ncarryover_fraction = 0.8").unwrap();

        let result = Settings::load_from(file.path());
        assert!(matches!(result, Err(ProtocolError::Configuration(_))));
    }

    #[test]
    #[serial_test::serial]
    fn test_env_override() {
        std::env::set_var("PIPETTOR_LIQUID__CARRYOVER_FRACTION", "0.25");
        let settings = Settings::load_from("does-not-exist.toml").unwrap();
        std::env::remove_var("PIPETTOR_LIQUID__CARRYOVER_FRACTION");

        assert!((settings.liquid.carryover_fraction - 0.25).abs() < f64::EPSILON);
    }
}
