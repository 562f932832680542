use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const PLATE_ROWS: u8 = 8;
pub const PLATE_COLUMNS: u8 = 12;
pub const PLATE_SIZE: usize = (PLATE_ROWS as usize) * (PLATE_COLUMNS as usize);

const ROW_LETTERS: [char; PLATE_ROWS as usize] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid well identifier '{0}': expected a row letter A-H followed by a column 1-12")]
pub struct InvalidWellId(pub String);

/// A position on a 96-well plate.
///
/// Ordering is row-major (`A1 < A2 < ... < A12 < B1`), which is the canonical
/// order of every per-well table produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WellId {
    row: u8,
    column: u8,
}

impl WellId {
    pub fn new(row: u8, column: u8) -> Result<Self, InvalidWellId> {
        if row >= PLATE_ROWS || column == 0 || column > PLATE_COLUMNS {
            return Err(InvalidWellId(format!("row {} column {}", row, column)));
        }
        Ok(Self { row, column })
    }

    #[inline]
    pub fn row(&self) -> u8 {
        self.row
    }

    #[inline]
    pub fn column(&self) -> u8 {
        self.column
    }

    #[inline]
    pub fn row_letter(&self) -> char {
        ROW_LETTERS[self.row as usize]
    }

    /// Zero-based position of the well in row-major order.
    #[inline]
    pub fn index(&self) -> usize {
        self.row as usize * PLATE_COLUMNS as usize + (self.column as usize - 1)
    }

    /// Iterates over all 96 positions in canonical order.
    pub fn all() -> impl Iterator<Item = WellId> {
        (0..PLATE_ROWS).flat_map(|row| (1..=PLATE_COLUMNS).map(move |column| WellId { row, column }))
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row_letter(), self.column)
    }
}

impl FromStr for WellId {
    type Err = InvalidWellId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let mut chars = trimmed.chars();
        let letter = chars
            .next()
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| InvalidWellId(s.to_string()))?;
        let row = ROW_LETTERS
            .iter()
            .position(|&l| l == letter)
            .ok_or_else(|| InvalidWellId(s.to_string()))?;
        let column: u8 = chars
            .as_str()
            .parse()
            .map_err(|_| InvalidWellId(s.to_string()))?;
        WellId::new(row as u8, column).map_err(|_| InvalidWellId(s.to_string()))
    }
}

impl TryFrom<String> for WellId {
    type Error = InvalidWellId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WellId> for String {
    fn from(id: WellId) -> Self {
        id.to_string()
    }
}

/// A read-only view of one well of one dataset, combining the plate layout
/// with the dataset's exclusion and blank designations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Well {
    pub id: WellId,
    pub condition: Option<String>,
    pub exclude: bool,
    pub blank: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_round_trip() {
        let id: WellId = "H12".parse().unwrap();
        assert_eq!(id.row(), 7);
        assert_eq!(id.column(), 12);
        assert_eq!(id.to_string(), "H12");
    }

    #[test]
    fn parsing_is_case_insensitive_and_trims_whitespace() {
        let id: WellId = " b7 ".parse().unwrap();
        assert_eq!(id.to_string(), "B7");
    }

    #[test]
    fn rejects_out_of_plate_positions() {
        assert!("I1".parse::<WellId>().is_err());
        assert!("A0".parse::<WellId>().is_err());
        assert!("A13".parse::<WellId>().is_err());
        assert!("".parse::<WellId>().is_err());
        assert!("AA".parse::<WellId>().is_err());
    }

    #[test]
    fn ordering_is_row_major() {
        let a12: WellId = "A12".parse().unwrap();
        let b1: WellId = "B1".parse().unwrap();
        let a2: WellId = "A2".parse().unwrap();
        assert!(a2 < a12);
        assert!(a12 < b1);
    }

    #[test]
    fn all_yields_ninety_six_wells_in_index_order() {
        let wells: Vec<WellId> = WellId::all().collect();
        assert_eq!(wells.len(), PLATE_SIZE);
        for (i, well) in wells.iter().enumerate() {
            assert_eq!(well.index(), i);
        }
        assert_eq!(wells[0].to_string(), "A1");
        assert_eq!(wells[95].to_string(), "H12");
    }

    #[test]
    fn serializes_as_plain_string() {
        let id: WellId = "C3".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"C3\"");
        let back: WellId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
