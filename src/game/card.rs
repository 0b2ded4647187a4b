//! Bingo Card Generation
//!
//! A card is 5 columns × 5 rows. Column `c` draws its values from
//! `15c+1 ..= 15c+15`; the centre cell is the permanent free marker.

use serde::{Serialize, Deserialize};

use crate::core::rng::DeterministicRng;

/// Cells per row/column.
pub const CARD_SIZE: usize = 5;

/// Numbers available to each column.
pub const COLUMN_SPAN: u8 = 15;

/// Marker value stored in the centre cell. Never a callable number.
pub const FREE_CELL: u8 = 0;

/// Index (row and column) of the centre cell.
pub const CENTER: usize = 2;

/// One player's card.
///
/// Stored column-major: `columns[c][r]` is the value at column `c`, row `r`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BingoCard {
    columns: [[u8; CARD_SIZE]; CARD_SIZE],
}

impl BingoCard {
    /// Build a card from explicit column values.
    ///
    /// The centre cell is forced to [`FREE_CELL`] whatever was passed in.
    pub fn from_columns(mut columns: [[u8; CARD_SIZE]; CARD_SIZE]) -> Self {
        columns[CENTER][CENTER] = FREE_CELL;
        Self { columns }
    }

    /// Value at (column, row).
    #[inline]
    pub fn cell(&self, column: usize, row: usize) -> u8 {
        self.columns[column][row]
    }

    /// All five values of a column, top to bottom.
    pub fn column(&self, column: usize) -> [u8; CARD_SIZE] {
        self.columns[column]
    }

    /// All five values of a row, left to right.
    pub fn row(&self, row: usize) -> [u8; CARD_SIZE] {
        std::array::from_fn(|c| self.columns[c][row])
    }

    /// Whether `value` is printed on this card (the free marker counts).
    pub fn contains(&self, value: u8) -> bool {
        self.columns.iter().any(|col| col.contains(&value))
    }

    /// Column-major view of every cell.
    pub fn columns(&self) -> &[[u8; CARD_SIZE]; CARD_SIZE] {
        &self.columns
    }

    /// Every non-free value on the card.
    pub fn numbers(&self) -> impl Iterator<Item = u8> + '_ {
        self.columns
            .iter()
            .flat_map(|col| col.iter().copied())
            .filter(|&v| v != FREE_CELL)
    }
}

/// Inclusive value range for a column.
#[inline]
pub fn column_range(column: usize) -> std::ops::RangeInclusive<u8> {
    let low = column as u8 * COLUMN_SPAN + 1;
    low..=low + COLUMN_SPAN - 1
}

/// Generate an independent card.
///
/// Each column shuffles its 15-value range once and takes the first five,
/// so draws are without replacement and cost is fixed.
pub fn generate_card(rng: &mut DeterministicRng) -> BingoCard {
    let mut columns = [[FREE_CELL; CARD_SIZE]; CARD_SIZE];

    for (c, column) in columns.iter_mut().enumerate() {
        let mut pool: [u8; COLUMN_SPAN as usize] =
            std::array::from_fn(|i| *column_range(c).start() + i as u8);
        rng.shuffle(&mut pool);
        column.copy_from_slice(&pool[..CARD_SIZE]);
    }

    BingoCard::from_columns(columns)
}
