//! Cell coordinate parsing shared by the patcher and the inspector

use crate::error::{PatchError, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;

/// Last column a worksheet can hold (XFD)
pub const MAX_COLUMN: u32 = 16_384;
/// Last row a worksheet can hold
pub const MAX_ROW: u32 = 1_048_576;

/// A parsed A1-style coordinate such as `B12`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRef {
    /// 1-based column index (A = 1)
    pub col: u32,
    /// 1-based row number
    pub row: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { col, row }
    }

    /// Parse an uppercase `LETTERS DIGITS` coordinate.
    ///
    /// Anything else (`3B`, `b3`, `B`, `B0`, `$B$3`) is rejected with
    /// [`PatchError::CellReferenceInvalid`] carrying the original text.
    pub fn parse(coord: &str) -> Result<Self> {
        static CELL_REF: OnceLock<Regex> = OnceLock::new();
        let re = CELL_REF.get_or_init(|| Regex::new(r"^([A-Z]{1,3})([0-9]{1,7})$").unwrap());

        let invalid = || PatchError::CellReferenceInvalid(coord.to_string());
        let caps = re.captures(coord).ok_or_else(invalid)?;

        let col = letters_to_col(&caps[1]).ok_or_else(invalid)?;
        let row: u32 = caps[2].parse().map_err(|_| invalid())?;
        if row == 0 || row > MAX_ROW {
            return Err(invalid());
        }

        Ok(Self { col, row })
    }

    /// Column letters of this coordinate (`B` for `B12`)
    pub fn column_letters(&self) -> String {
        col_to_letters(self.col)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", col_to_letters(self.col), self.row)
    }
}

impl PartialOrd for CellRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Column first, then row; the order cells take inside one row.
impl Ord for CellRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.col.cmp(&other.col).then(self.row.cmp(&other.row))
    }
}

/// Convert column letters (`A`, `AA`) to a 1-based column index.
/// Returns `None` for empty input, non-letters, or columns past XFD.
pub fn letters_to_col(letters: &str) -> Option<u32> {
    if letters.is_empty() {
        return None;
    }
    let mut col = 0u32;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    (col <= MAX_COLUMN).then_some(col)
}

/// Convert a 1-based column index to letters (1 -> `A`, 27 -> `AA`)
pub fn col_to_letters(mut col: u32) -> String {
    let mut letters = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        letters.push(b'A' + rem as u8);
        col = (col - 1) / 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Lenient split of a stored `r` attribute into (col, row).
///
/// Worksheet XML written by other tools may use lowercase letters; this is
/// only used for reading what is already in the template.
pub(crate) fn split_stored_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let digits_at = cell_ref.find(|c: char| c.is_ascii_digit())?;
    let col = letters_to_col(&cell_ref[..digits_at])?;
    let row = cell_ref[digits_at..].parse::<u32>().ok()?;
    Some((col, row))
}
