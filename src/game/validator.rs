//! Win Validation
//!
//! A claim is checked in two steps:
//!
//! 1. **Integrity** - every marked value other than the free marker must
//!    already have been called.
//! 2. **Pattern** - the marks plus the free cell must cover a full row,
//!    column or diagonal of the claimant's card.
//!
//! Lines are examined rows first, then columns, then both diagonals. Every
//! line is always evaluated; the first satisfied one is reported.

use std::collections::BTreeSet;
use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::card::{BingoCard, CARD_SIZE, FREE_CELL};

/// Shape of a winning line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Five cells sharing a row index.
    Row,
    /// Five cells sharing a column index.
    Column,
    /// Top-left to bottom-right (index 0) or top-right to bottom-left (index 1).
    Diagonal,
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PatternKind::Row => "row",
            PatternKind::Column => "column",
            PatternKind::Diagonal => "diagonal",
        })
    }
}

/// A specific line on the card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinLine {
    /// Line shape.
    pub kind: PatternKind,
    /// Row, column, or diagonal index.
    pub index: u8,
}

/// Successful validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinResult {
    /// First satisfied line.
    pub line: WinLine,
    /// Card values on that line (free marker included).
    pub cells: [u8; CARD_SIZE],
}

impl WinResult {
    /// Shape of the winning line.
    pub fn kind(&self) -> PatternKind {
        self.line.kind
    }
}

/// Why a claim was invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClaimError {
    /// A marked value has not been called in this session.
    #[error("number {0} has not been called")]
    UncalledNumber(u8),

    /// Marks are legitimate but complete no line.
    #[error("marks do not complete a row, column or diagonal")]
    NoPattern,
}

/// The twelve lines in evaluation order.
fn all_lines() -> impl Iterator<Item = WinLine> {
    let rows = (0..CARD_SIZE as u8).map(|index| WinLine { kind: PatternKind::Row, index });
    let cols = (0..CARD_SIZE as u8).map(|index| WinLine { kind: PatternKind::Column, index });
    let diags = (0..2u8).map(|index| WinLine { kind: PatternKind::Diagonal, index });
    rows.chain(cols).chain(diags)
}

/// Card values along a line.
pub fn line_cells(card: &BingoCard, line: WinLine) -> [u8; CARD_SIZE] {
    let i = line.index as usize;
    match line.kind {
        PatternKind::Row => card.row(i),
        PatternKind::Column => card.column(i),
        PatternKind::Diagonal if i == 0 => std::array::from_fn(|k| card.cell(k, k)),
        PatternKind::Diagonal => std::array::from_fn(|k| card.cell(CARD_SIZE - 1 - k, k)),
    }
}

/// Every line covered by `marked` (plus the free cell), in evaluation order.
pub fn covered_lines(card: &BingoCard, marked: &BTreeSet<u8>) -> Vec<WinLine> {
    all_lines()
        .filter(|line| {
            line_cells(card, *line)
                .iter()
                .all(|v| *v == FREE_CELL || marked.contains(v))
        })
        .collect()
}

/// Validate a claim against the card and call history.
pub fn validate(
    card: &BingoCard,
    marked: &[u8],
    call_history: &[u8],
) -> Result<WinResult, ClaimError> {
    let called: BTreeSet<u8> = call_history.iter().copied().collect();

    let mut marks = BTreeSet::new();
    for &value in marked {
        if value == FREE_CELL {
            continue;
        }
        if !called.contains(&value) {
            return Err(ClaimError::UncalledNumber(value));
        }
        marks.insert(value);
    }

    let lines = covered_lines(card, &marks);
    let line = *lines.first().ok_or(ClaimError::NoPattern)?;

    Ok(WinResult {
        line,
        cells: line_cells(card, line),
    })
}
