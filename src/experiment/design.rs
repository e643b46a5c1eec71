//! Experiment design tables: what goes where, and from where.
//!
//! The design interface mirrors the two tables an assay is planned from. The
//! dose table names a destination well, compound, dilution level, and volume
//! for every planned addition. The parameter table carries per-compound
//! handling details: which plate the compound's dilution series lives on,
//! which well holds level 1, which pipette moves it, and when it is added.
//! [`ExperimentDesign::resolve_doses`] joins the two, and [`level_batches`]
//! regroups the joined rows into the batches the multichannel reagent phases
//! walk.

use std::cmp::Ordering;

use tracing::debug;

use crate::error::{ProtocolError, ProtocolResult};
use crate::labware::{PlateId, WellAddress, WellRef};
use crate::pipette::PipetteModel;

/// One row of the dose table: a single planned addition into an assay well.
#[derive(Debug, Clone, PartialEq)]
pub struct DoseRow {
    /// Destination well on the assay plate.
    pub destination: WellAddress,
    /// Compound being added.
    pub compound: String,
    /// Dilution level to draw from. Level 1 is the compound's starting well;
    /// each level above it sits one column to the right.
    pub level: u32,
    /// Volume to add, in uL.
    pub volume_ul: f64,
}

impl DoseRow {
    pub fn new(
        destination: WellAddress,
        compound: impl Into<String>,
        level: u32,
        volume_ul: f64,
    ) -> Self {
        DoseRow {
            destination,
            compound: compound.into(),
            level,
            volume_ul,
        }
    }
}

/// Per-compound handling parameters from the design's parameter table.
#[derive(Debug, Clone, PartialEq)]
pub struct CompoundParameters {
    /// Compound name, joined against [`DoseRow::compound`].
    pub compound: String,
    /// Plate holding the compound's dilution series.
    pub source_plate: PlateId,
    /// Well of the level-1 dilution.
    pub starting_well: WellAddress,
    /// Pipette used to move this compound.
    pub pipette: PipetteModel,
    /// Position of this compound in the addition sequence.
    pub order_of_addition: u32,
    /// True for reaction-start components that are held back until the plate
    /// has been heated.
    pub start_component: bool,
}

impl CompoundParameters {
    pub fn new(
        compound: impl Into<String>,
        source_plate: PlateId,
        starting_well: WellAddress,
        pipette: PipetteModel,
    ) -> Self {
        CompoundParameters {
            compound: compound.into(),
            source_plate,
            starting_well,
            pipette,
            order_of_addition: 0,
            start_component: false,
        }
    }

    pub fn with_order_of_addition(mut self, order: u32) -> Self {
        self.order_of_addition = order;
        self
    }

    pub fn with_start_component(mut self, start_component: bool) -> Self {
        self.start_component = start_component;
        self
    }
}

/// A standard-curve request: which compound is being titrated, where its stock
/// and the dilution buffer live, and the row-A wells heading the curve columns
/// on the assay plate.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardCurveSpec {
    /// Compound the curve is built for, used in logs.
    pub compound: String,
    /// Stock solution of the titrated compound.
    pub component_source: WellRef,
    /// Dilution buffer.
    pub buffer_source: WellRef,
    /// Top wells of the curve columns. Each must sit in row A.
    pub start_wells: Vec<WellAddress>,
    /// Number of two-fold dilution points below the undiluted well.
    pub dilutions: u32,
    /// Buffer-only blank wells at the bottom of each column.
    pub blanks: u32,
}

impl StandardCurveSpec {
    pub fn new(
        compound: impl Into<String>,
        component_source: WellRef,
        buffer_source: WellRef,
        start_wells: Vec<WellAddress>,
    ) -> Self {
        StandardCurveSpec {
            compound: compound.into(),
            component_source,
            buffer_source,
            start_wells,
            dilutions: 14,
            blanks: 2,
        }
    }

    pub fn with_dilutions(mut self, dilutions: u32) -> Self {
        self.dilutions = dilutions;
        self
    }

    pub fn with_blanks(mut self, blanks: u32) -> Self {
        self.blanks = blanks;
        self
    }
}

/// A dose row joined with its compound's parameters: the destination plus the
/// concrete source well and pipette that will deliver it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDose {
    /// Destination well on the assay plate.
    pub destination: WellAddress,
    /// Compound being added.
    pub compound: String,
    /// Dilution level the volume is drawn from.
    pub level: u32,
    /// Volume to add, in uL.
    pub volume_ul: f64,
    /// Source well holding the requested dilution level.
    pub source: WellRef,
    /// Pipette that performs the addition.
    pub pipette: PipetteModel,
}

/// The full experiment design: dose table, parameter table, and any standard
/// curves to prepare alongside the assay wells.
#[derive(Debug, Clone, Default)]
pub struct ExperimentDesign {
    /// Planned additions, one row per well per compound.
    pub doses: Vec<DoseRow>,
    /// Per-compound handling parameters.
    pub parameters: Vec<CompoundParameters>,
    /// Standard curves to build before reagent addition starts.
    pub standard_curves: Vec<StandardCurveSpec>,
}

impl ExperimentDesign {
    pub fn new(doses: Vec<DoseRow>, parameters: Vec<CompoundParameters>) -> Self {
        ExperimentDesign {
            doses,
            parameters,
            standard_curves: Vec::new(),
        }
    }

    pub fn with_standard_curves(mut self, standard_curves: Vec<StandardCurveSpec>) -> Self {
        self.standard_curves = standard_curves;
        self
    }

    /// Looks up the parameter row for a compound.
    pub fn parameters_for(&self, compound: &str) -> ProtocolResult<&CompoundParameters> {
        self.parameters
            .iter()
            .find(|p| p.compound == compound)
            .ok_or_else(|| {
                ProtocolError::Configuration(format!(
                    "compound '{compound}' has no row in the parameter table"
                ))
            })
    }

    /// Joins every dose row with its compound's parameters.
    ///
    /// The source well for a dose is the compound's starting well shifted
    /// right by `level - 1` columns, so a series laid out across one plate row
    /// is addressed purely by level number. Fails if a compound has no
    /// parameter row or a level falls outside the addressable column range.
    pub fn resolve_doses(&self) -> ProtocolResult<Vec<ResolvedDose>> {
        self.doses
            .iter()
            .map(|dose| {
                let params = self.parameters_for(&dose.compound)?;
                if !(1..=256).contains(&dose.level) {
                    return Err(ProtocolError::Configuration(format!(
                        "dose into {} names level {} for '{}'; levels are numbered 1 upward",
                        dose.destination, dose.level, dose.compound
                    )));
                }
                let source_well = params.starting_well.offset_by(dose.level as i32 - 1, 0)?;
                Ok(ResolvedDose {
                    destination: dose.destination,
                    compound: dose.compound.clone(),
                    level: dose.level,
                    volume_ul: dose.volume_ul,
                    source: WellRef::new(params.source_plate.clone(), source_well),
                    pipette: params.pipette,
                })
            })
            .collect()
    }

    /// The compounds handled by one pipette, in order of addition.
    ///
    /// `start_components` selects between the reaction-start compounds and
    /// everything else.
    pub fn components_for(
        &self,
        pipette: PipetteModel,
        start_components: bool,
    ) -> Vec<&CompoundParameters> {
        let mut components: Vec<&CompoundParameters> = self
            .parameters
            .iter()
            .filter(|p| p.pipette == pipette && p.start_component == start_components)
            .collect();
        components.sort_by_key(|p| p.order_of_addition);
        components
    }
}

/// Destinations that receive the same volume within one level batch.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeGroup {
    /// Volume each destination receives, in uL.
    pub volume_ul: f64,
    /// Destination wells, ordered by column.
    pub destinations: Vec<WellAddress>,
}

/// All the multichannel work for one dilution level of one compound: a single
/// source well and the volume groups drawn from it.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelBatch {
    /// Dilution level this batch draws from.
    pub level: u32,
    /// The level's source well, shared by every group.
    pub source: WellRef,
    /// Volume groups, largest volume first.
    pub volume_groups: Vec<VolumeGroup>,
}

/// Groups one compound's resolved doses into per-level multichannel batches.
///
/// Levels are walked high to low so the most dilute additions land first, and
/// within a level the distinct volumes are walked high to low. Only rows A and
/// B seed the batches: on a 384-well plate the 8-channel pipette reaches every
/// other row, so those two rows cover the full plate. Each level must resolve
/// to a single source well; rows that disagree indicate a corrupted design and
/// fail with [`ProtocolError::AmbiguousSource`].
pub fn level_batches(doses: &[ResolvedDose], compound: &str) -> ProtocolResult<Vec<LevelBatch>> {
    let rows: Vec<&ResolvedDose> = doses.iter().filter(|d| d.compound == compound).collect();

    let mut levels: Vec<u32> = rows.iter().map(|d| d.level).collect();
    levels.sort_unstable_by(|a, b| b.cmp(a));
    levels.dedup();

    let mut batches = Vec::new();
    for level in levels {
        let mut level_rows: Vec<&ResolvedDose> = rows
            .iter()
            .copied()
            .filter(|d| d.level == level && d.destination.row < 2)
            .collect();
        if level_rows.is_empty() {
            debug!(compound, level, "level has no multichannel seed rows");
            continue;
        }
        level_rows.sort_by_key(|d| d.destination.col);

        let mut sources: Vec<&WellRef> = Vec::new();
        for dose in &level_rows {
            if !sources.contains(&&dose.source) {
                sources.push(&dose.source);
            }
        }
        if sources.len() > 1 {
            return Err(ProtocolError::AmbiguousSource {
                compound: compound.to_string(),
                level,
                sources: sources.iter().map(|s| s.to_string()).collect(),
            });
        }
        let source = level_rows[0].source.clone();

        let mut volumes: Vec<f64> = level_rows.iter().map(|d| d.volume_ul).collect();
        volumes.sort_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        volumes.dedup();

        let volume_groups = volumes
            .into_iter()
            .map(|volume_ul| VolumeGroup {
                volume_ul,
                destinations: level_rows
                    .iter()
                    .filter(|d| d.volume_ul == volume_ul)
                    .map(|d| d.destination)
                    .collect(),
            })
            .collect();

        batches.push(LevelBatch {
            level,
            source,
            volume_groups,
        });
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dose(well: &str, compound: &str, level: u32, volume_ul: f64) -> DoseRow {
        DoseRow::new(WellAddress::parse(well).unwrap(), compound, level, volume_ul)
    }

    fn params(compound: &str, starting_well: &str, order: u32) -> CompoundParameters {
        CompoundParameters::new(
            compound,
            PlateId::new("deepwell"),
            WellAddress::parse(starting_well).unwrap(),
            PipetteModel::P300MultiGen2,
        )
        .with_order_of_addition(order)
    }

    #[test]
    fn test_resolve_offsets_source_column_by_level() {
        let design = ExperimentDesign::new(
            vec![dose("A1", "NADH", 1, 10.0), dose("B3", "NADH", 3, 5.0)],
            vec![params("NADH", "A4", 0)],
        );

        let resolved = design.resolve_doses().unwrap();
        assert_eq!(resolved[0].source.well, WellAddress::parse("A4").unwrap());
        assert_eq!(resolved[1].source.well, WellAddress::parse("A6").unwrap());
        assert_eq!(resolved[1].pipette, PipetteModel::P300MultiGen2);
    }

    #[test]
    fn test_resolve_requires_parameter_row() {
        let design = ExperimentDesign::new(vec![dose("A1", "ATP", 1, 10.0)], Vec::new());
        let err = design.resolve_doses().unwrap_err();
        assert!(err.to_string().contains("parameter table"), "{err}");
    }

    #[test]
    fn test_resolve_rejects_level_zero() {
        let design = ExperimentDesign::new(
            vec![dose("A1", "ATP", 0, 10.0)],
            vec![params("ATP", "A1", 0)],
        );
        let err = design.resolve_doses().unwrap_err();
        assert!(err.to_string().contains("numbered 1 upward"), "{err}");
    }

    #[test]
    fn test_level_batches_order_and_grouping() {
        // Levels walk high to low, volumes within a level high to low, and
        // destinations within a volume group sort by column. Row C is out of
        // reach of the every-other-row comb and is dropped.
        let design = ExperimentDesign::new(
            vec![
                dose("A5", "ATP", 1, 10.0),
                dose("B1", "ATP", 2, 20.0),
                dose("A3", "ATP", 2, 20.0),
                dose("A7", "ATP", 2, 10.0),
                dose("C1", "ATP", 2, 50.0),
            ],
            vec![params("ATP", "A1", 0)],
        );
        let resolved = design.resolve_doses().unwrap();

        let batches = level_batches(&resolved, "ATP").unwrap();
        assert_eq!(batches.len(), 2);

        assert_eq!(batches[0].level, 2);
        assert_eq!(batches[0].source.well, WellAddress::parse("A2").unwrap());
        assert_eq!(batches[0].volume_groups.len(), 2);
        assert_eq!(batches[0].volume_groups[0].volume_ul, 20.0);
        assert_eq!(
            batches[0].volume_groups[0].destinations,
            vec![
                WellAddress::parse("B1").unwrap(),
                WellAddress::parse("A3").unwrap(),
            ]
        );
        assert_eq!(
            batches[0].volume_groups[1].destinations,
            vec![WellAddress::parse("A7").unwrap()]
        );

        assert_eq!(batches[1].level, 1);
        assert_eq!(batches[1].volume_groups[0].volume_ul, 10.0);
    }

    #[test]
    fn test_level_batches_skips_levels_without_seed_rows() {
        let design = ExperimentDesign::new(
            vec![dose("E1", "ATP", 2, 20.0), dose("A1", "ATP", 1, 10.0)],
            vec![params("ATP", "A1", 0)],
        );
        let resolved = design.resolve_doses().unwrap();

        let batches = level_batches(&resolved, "ATP").unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].level, 1);
    }

    #[test]
    fn test_level_batches_rejects_mixed_sources() {
        let deepwell = PlateId::new("deepwell");
        let mk = |well: &str, source: &str| ResolvedDose {
            destination: WellAddress::parse(well).unwrap(),
            compound: "ATP".to_string(),
            level: 2,
            volume_ul: 10.0,
            source: WellRef::new(deepwell.clone(), WellAddress::parse(source).unwrap()),
            pipette: PipetteModel::P300MultiGen2,
        };

        let err = level_batches(&[mk("A1", "A2"), mk("B1", "A3")], "ATP").unwrap_err();
        match err {
            ProtocolError::AmbiguousSource {
                compound,
                level,
                sources,
            } => {
                assert_eq!(compound, "ATP");
                assert_eq!(level, 2);
                assert_eq!(sources, vec!["deepwell/A2", "deepwell/A3"]);
            }
            other => panic!("expected AmbiguousSource, got {other}"),
        }
    }

    #[test]
    fn test_components_follow_order_of_addition() {
        let design = ExperimentDesign::new(
            Vec::new(),
            vec![
                params("NADH", "A1", 3),
                params("ATP", "A2", 1).with_start_component(true),
                params("CoA", "A3", 2),
                CompoundParameters::new(
                    "Aldehyde",
                    PlateId::new("deepwell"),
                    WellAddress::parse("A4").unwrap(),
                    PipetteModel::P20SingleGen2,
                ),
            ],
        );

        let names: Vec<&str> = design
            .components_for(PipetteModel::P300MultiGen2, false)
            .iter()
            .map(|p| p.compound.as_str())
            .collect();
        assert_eq!(names, vec!["CoA", "NADH"]);

        let starts: Vec<&str> = design
            .components_for(PipetteModel::P300MultiGen2, true)
            .iter()
            .map(|p| p.compound.as_str())
            .collect();
        assert_eq!(starts, vec!["ATP"]);
    }
}
