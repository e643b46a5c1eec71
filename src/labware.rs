//! Labware geometry and well addressing.
//!
//! Deck positions are modeled as [`Labware`] records (row/column counts plus
//! the well dimensions the motion planner needs), wells as plate-relative
//! [`WellAddress`]es, and physical targets as [`Location`]s anchored to a
//! well's bottom or top. The catalog constructors cover the plates the
//! standard assay deck loads; anything with rows, columns, and well
//! dimensions can be described directly.
//!
//! Well names follow plate convention: a row letter ('A' upward) followed by
//! a 1-based column number, so "B15" is row index 1, column index 14.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

// ============================================================================
// Well addressing
// ============================================================================

/// A plate-relative well address with 0-based row and column indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WellAddress {
    /// 0-based row index ('A' = 0).
    pub row: u8,
    /// 0-based column index (column "1" = 0).
    pub col: u8,
}

impl WellAddress {
    /// Creates an address from 0-based row and column indices.
    pub fn new(row: u8, col: u8) -> Self {
        WellAddress { row, col }
    }

    /// Parses an alphanumeric well name such as "A1" or "b15".
    ///
    /// The first character must be a letter (case-insensitive row, 'A' = 0);
    /// the remaining characters must be a 1-based column number.
    pub fn parse(name: &str) -> ProtocolResult<Self> {
        let invalid = |reason: &str| ProtocolError::InvalidWellName {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = name.chars();
        let row_char = chars
            .next()
            .ok_or_else(|| invalid("name is empty"))?;
        if !row_char.is_ascii_alphabetic() {
            return Err(invalid("expected a row letter followed by a column number"));
        }
        let col: u8 = chars
            .as_str()
            .parse()
            .map_err(|_| invalid("expected a row letter followed by a column number"))?;
        if col == 0 {
            return Err(invalid("column numbers start at 1"));
        }
        let row = row_char.to_ascii_uppercase() as u8 - b'A';
        Ok(WellAddress { row, col: col - 1 })
    }

    /// The row rendered as its plate letter ('A' = row 0).
    pub fn row_letter(&self) -> char {
        (b'A' + self.row) as char
    }

    /// Returns the address shifted by the given column and row deltas.
    ///
    /// Fails if the result leaves the addressable range (rows 'A'..'Z',
    /// columns 1 upward); callers working against a concrete plate should
    /// also bounds-check with [`Labware::contains`].
    pub fn offset_by(&self, col_delta: i32, row_delta: i32) -> ProtocolResult<Self> {
        let row = i32::from(self.row) + row_delta;
        let col = i32::from(self.col) + col_delta;
        if !(0..26).contains(&row) || !(0..=i32::from(u8::MAX)).contains(&col) {
            return Err(ProtocolError::InvalidWellName {
                name: format!("{self} offset by {col_delta} columns, {row_delta} rows"),
                reason: "offset leaves the addressable well range".to_string(),
            });
        }
        Ok(WellAddress {
            row: row as u8,
            col: col as u8,
        })
    }

    /// Column-major well index: `col * rows_in_plate + row`.
    ///
    /// Matches the numbering plate readers use for a plate scanned down each
    /// column in turn (B15 on a 16-row plate is well 225).
    pub fn linear_index(&self, rows_in_plate: u8) -> u32 {
        u32::from(self.col) * u32::from(rows_in_plate) + u32::from(self.row)
    }
}

impl fmt::Display for WellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.col + 1)
    }
}

impl std::str::FromStr for WellAddress {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        WellAddress::parse(s)
    }
}

// ============================================================================
// Plates
// ============================================================================

/// Identifier of one labware item on the deck (e.g. "assay-plate").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlateId(String);

impl PlateId {
    /// Creates a plate identifier.
    pub fn new(id: impl Into<String>) -> Self {
        PlateId(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PlateId {
    fn from(id: &str) -> Self {
        PlateId::new(id)
    }
}

/// One labware item: its grid shape, well dimensions, and deck slot.
///
/// Dimensions come from the labware vendor definitions; they drive edge-offset
/// and liquid-height calculations in [`crate::geometry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Labware {
    /// Deck-unique identifier used in logs, errors, and the volume ledger.
    pub id: PlateId,
    /// Vendor display name.
    pub display_name: String,
    /// Number of rows (1 for troughs and the trash).
    pub rows: u8,
    /// Number of columns.
    pub cols: u8,
    /// Well depth in mm.
    pub well_depth_mm: f64,
    /// Well width (diameter for round wells) in mm.
    pub well_width_mm: f64,
    /// Working capacity of one well, in uL.
    pub well_capacity_ul: f64,
    /// Deck slot the labware sits in.
    pub deck_slot: u8,
    /// True for the fixed trash: volumes dispensed here are not tracked.
    pub is_trash: bool,
}

impl Labware {
    /// Corning 384-well flat assay plate (16 x 24, 112 uL wells), mounted on
    /// the temperature module in slot 8.
    pub fn corning_384_wellplate_112ul_flat(id: impl Into<String>) -> Self {
        Labware {
            id: PlateId::new(id),
            display_name: "Corning 384 Well Plate 112 uL Flat".to_string(),
            rows: 16,
            cols: 24,
            well_depth_mm: 11.43,
            well_width_mm: 3.63,
            well_capacity_ul: 112.0,
            deck_slot: 8,
            is_trash: false,
        }
    }

    /// USA Scientific 96-well deep-well plate (8 x 12, 2.4 mL wells) in
    /// slot 5.
    pub fn usascientific_96_wellplate_2400ul_deep(id: impl Into<String>) -> Self {
        Labware {
            id: PlateId::new(id),
            display_name: "USA Scientific 96 Deep Well Plate 2.4 mL".to_string(),
            rows: 8,
            cols: 12,
            well_depth_mm: 41.3,
            well_width_mm: 8.2,
            well_capacity_ul: 2400.0,
            deck_slot: 5,
            is_trash: false,
        }
    }

    /// NEST 12-channel reservoir (1 x 12, 15 mL troughs) in slot 2.
    pub fn nest_12_reservoir_15ml(id: impl Into<String>) -> Self {
        Labware {
            id: PlateId::new(id),
            display_name: "NEST 12 Well Reservoir 15 mL".to_string(),
            rows: 1,
            cols: 12,
            well_depth_mm: 26.85,
            well_width_mm: 8.2,
            well_capacity_ul: 15_000.0,
            deck_slot: 2,
            is_trash: false,
        }
    }

    /// The fixed trash container in slot 12, addressed as a single void well.
    pub fn fixed_trash() -> Self {
        Labware {
            id: PlateId::new("fixed-trash"),
            display_name: "Fixed Trash".to_string(),
            rows: 1,
            cols: 1,
            well_depth_mm: 0.0,
            well_width_mm: 0.0,
            well_capacity_ul: 0.0,
            deck_slot: 12,
            is_trash: true,
        }
    }

    /// Total number of wells.
    pub fn well_count(&self) -> u16 {
        u16::from(self.rows) * u16::from(self.cols)
    }

    /// Whether an address lies within this plate's grid.
    pub fn contains(&self, well: WellAddress) -> bool {
        well.row < self.rows && well.col < self.cols
    }

    /// All wells in column-major order (A1, B1, ... then A2, B2, ...).
    pub fn wells(&self) -> impl Iterator<Item = WellAddress> + '_ {
        (0..self.cols)
            .flat_map(move |col| (0..self.rows).map(move |row| WellAddress::new(row, col)))
    }

    /// The wells of one row, left to right.
    pub fn row_wells(&self, row: u8) -> Vec<WellAddress> {
        (0..self.cols).map(|col| WellAddress::new(row, col)).collect()
    }

    /// The wells of one column, top to bottom.
    pub fn column_wells(&self, col: u8) -> Vec<WellAddress> {
        (0..self.rows).map(|row| WellAddress::new(row, col)).collect()
    }

    /// Resolves a well name against this plate, bounds-checked.
    pub fn well(&self, name: &str) -> ProtocolResult<WellRef> {
        let address = WellAddress::parse(name)?;
        self.well_at(address)
    }

    /// Builds a bounds-checked reference to a well of this plate.
    pub fn well_at(&self, address: WellAddress) -> ProtocolResult<WellRef> {
        if !self.contains(address) {
            return Err(ProtocolError::InvalidWellName {
                name: format!("{}/{}", self.id, address),
                reason: format!(
                    "plate '{}' has {} rows and {} columns",
                    self.id, self.rows, self.cols
                ),
            });
        }
        Ok(WellRef {
            plate: self.id.clone(),
            well: address,
        })
    }
}

// ============================================================================
// Locations
// ============================================================================

/// A fully-qualified well: which plate, which well.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WellRef {
    /// The plate the well belongs to.
    pub plate: PlateId,
    /// The well within the plate.
    pub well: WellAddress,
}

impl WellRef {
    /// Creates a well reference.
    pub fn new(plate: PlateId, well: WellAddress) -> Self {
        WellRef { plate, well }
    }

    /// A location `z_mm` above the center of the well bottom.
    pub fn bottom(&self, z_mm: f64) -> Location {
        Location {
            well: self.clone(),
            anchor: WellAnchor::Bottom,
            offset: Point::new(0.0, 0.0, z_mm),
        }
    }

    /// A location `z_mm` above the center of the well top.
    pub fn top(&self, z_mm: f64) -> Location {
        Location {
            well: self.clone(),
            anchor: WellAnchor::Top,
            offset: Point::new(0.0, 0.0, z_mm),
        }
    }
}

impl fmt::Display for WellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.plate, self.well)
    }
}

/// A displacement in mm, gantry frame (x across, y along, z up).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    /// Lateral displacement across the deck, in mm.
    pub x: f64,
    /// Lateral displacement along the deck, in mm.
    pub y: f64,
    /// Vertical displacement, in mm.
    pub z: f64,
}

impl Point {
    /// Creates a displacement vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Point { x, y, z }
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Which reference plane of the well a location is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellAnchor {
    /// The center of the well floor.
    Bottom,
    /// The center of the well opening.
    Top,
}

/// A physical pipetting target: a well plus a displacement from one of its
/// anchor planes.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    /// The well the location is anchored to.
    pub well: WellRef,
    /// Which plane of the well the offset is measured from.
    pub anchor: WellAnchor,
    /// Displacement from the anchor plane center.
    pub offset: Point,
}

impl Location {
    /// Returns this location displaced by `delta`.
    pub fn translated(&self, delta: Point) -> Location {
        Location {
            well: self.well.clone(),
            anchor: self.anchor,
            offset: self.offset + delta,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let anchor = match self.anchor {
            WellAnchor::Bottom => "bottom",
            WellAnchor::Top => "top",
        };
        if self.offset.x == 0.0 && self.offset.y == 0.0 {
            write!(f, "{}.{}({:.1})", self.well, anchor, self.offset.z)
        } else {
            write!(
                f,
                "{}.{}({:.1})+({:.2}, {:.2})",
                self.well, anchor, self.offset.z, self.offset.x, self.offset.y
            )
        }
    }
}
