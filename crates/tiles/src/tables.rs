//! Fixed placement tables of the tiled framebuffer format.
//!
//! Two lookups place a utile inside its macro-tile. The primary table maps a
//! utile's storage index to a coarse `(row, col)` cell; the secondary table then
//! reorders rows depending on the macro-tile's column class (`macro_col mod 4`).
//! Both come in an even and an odd variant, selected by macro-tile row parity.
//!
//! The raw tables are stored in "value at cell" form. Decoding needs the opposite
//! direction, so [`PlacementTables`] validates every table as a bijection once and
//! keeps only the inverted, fully resolved placements.

use std::fmt;
use std::sync::OnceLock;

use bitvec::prelude::{BitVec, Lsb0};
use frame_model::{
    COLUMN_CLASSES, MTILE_UTILE_COLUMNS, MTILE_UTILE_ROWS, UTILE_EDGE, UTILE_WORDS,
    UTILES_PER_MTILE,
};
use static_assertions::const_assert_eq;
use thiserror::Error;

pub type UtileOrderTable = [[u8; UTILE_EDGE]; UTILE_EDGE];
pub type PrimaryTable = [[u8; MTILE_UTILE_COLUMNS]; MTILE_UTILE_ROWS];
pub type SecondaryTable = [[u8; MTILE_UTILE_ROWS]; COLUMN_CLASSES];

/// Storage index of each raster position inside a utile.
pub const UTILE_ORDER: UtileOrderTable = [
    [0, 1, 2, 3, 8, 9, 10, 11],
    [4, 5, 6, 7, 12, 13, 14, 15],
    [16, 17, 18, 19, 24, 25, 26, 27],
    [20, 21, 22, 23, 28, 29, 30, 31],
    [32, 33, 34, 35, 40, 41, 42, 43],
    [36, 37, 38, 39, 44, 45, 46, 47],
    [48, 49, 50, 51, 56, 57, 58, 59],
    [52, 53, 54, 55, 60, 61, 62, 63],
];

/// Utile storage index held by each coarse cell, indexed by row parity.
pub const PRIMARY: [PrimaryTable; 2] = [
    [
        [0, 1, 2, 3],
        [4, 5, 6, 7],
        [8, 9, 10, 11],
        [12, 13, 14, 15],
        [17, 16, 19, 18],
        [21, 20, 23, 22],
        [25, 24, 27, 26],
        [29, 28, 31, 30],
    ],
    // Odd rows swap the column pairs of the even table.
    [
        [2, 3, 0, 1],
        [6, 7, 4, 5],
        [10, 11, 8, 9],
        [14, 15, 12, 13],
        [19, 18, 17, 16],
        [23, 22, 21, 20],
        [27, 26, 25, 24],
        [31, 30, 29, 28],
    ],
];

/// Coarse row found at each final row, indexed by row parity then column class.
pub const SECONDARY: [SecondaryTable; 2] = [
    [
        [0, 4, 2, 6, 1, 5, 3, 7],
        [1, 5, 3, 7, 0, 4, 2, 6],
        [2, 6, 0, 4, 3, 7, 1, 5],
        [3, 7, 1, 5, 2, 6, 0, 4],
    ],
    [
        [1, 5, 3, 7, 0, 4, 2, 6],
        [0, 4, 2, 6, 1, 5, 3, 7],
        [3, 7, 1, 5, 2, 6, 0, 4],
        [2, 6, 0, 4, 3, 7, 1, 5],
    ],
];

const_assert_eq!(UTILE_EDGE * UTILE_EDGE, UTILE_WORDS);
const_assert_eq!(MTILE_UTILE_ROWS * MTILE_UTILE_COLUMNS, UTILES_PER_MTILE);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableId {
    UtileOrder,
    Primary { parity: usize },
    Secondary { parity: usize, column_class: usize },
}

impl fmt::Display for TableId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableId::UtileOrder => write!(formatter, "utile order table"),
            TableId::Primary { parity } => write!(formatter, "primary table (parity {parity})"),
            TableId::Secondary {
                parity,
                column_class,
            } => write!(
                formatter,
                "secondary table (parity {parity}, column class {column_class})"
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TableIntegrityError {
    #[error("{table} holds {value}, outside 0..{len}")]
    ValueOutOfRange { table: TableId, value: u8, len: usize },
    #[error("{table} holds {value} more than once")]
    DuplicateValue { table: TableId, value: u8 },
    #[error("{table} never holds {value}")]
    MissingValue { table: TableId, value: usize },
}

/// Final position of a utile inside its macro-tile, in utile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UtileCell {
    pub row: u8,
    pub col: u8,
}

impl UtileCell {
    /// Word offset of the cell's top-left pixel from the macro-tile's top-left pixel.
    #[inline]
    pub const fn word_offset(self, frame_width: usize) -> usize {
        self.row as usize * UTILE_EDGE * frame_width + self.col as usize * UTILE_EDGE
    }
}

type PlacementPlan = [UtileCell; UTILES_PER_MTILE];

/// Validated, inverted placement tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementTables {
    // [parity][column_class][storage_index]
    plans: [[PlacementPlan; COLUMN_CLASSES]; 2],
}

impl PlacementTables {
    /// Validates the built-in tables and resolves every placement.
    pub fn build() -> Result<Self, TableIntegrityError> {
        Self::from_raw(&UTILE_ORDER, &PRIMARY, &SECONDARY)
    }

    pub fn from_raw(
        utile_order: &UtileOrderTable,
        primary: &[PrimaryTable; 2],
        secondary: &[SecondaryTable; 2],
    ) -> Result<Self, TableIntegrityError> {
        invert::<UTILE_WORDS>(TableId::UtileOrder, utile_order.iter().flatten().copied())?;

        let mut plans = [[[UtileCell::default(); UTILES_PER_MTILE]; COLUMN_CLASSES]; 2];
        for (parity, class_plans) in plans.iter_mut().enumerate() {
            // inverse[storage_index] = coarse cell, flattened row-major
            let coarse = invert::<UTILES_PER_MTILE>(
                TableId::Primary { parity },
                primary[parity].iter().flatten().copied(),
            )?;
            for (column_class, plan) in class_plans.iter_mut().enumerate() {
                // inverse[coarse_row] = final_row
                let refine = invert::<MTILE_UTILE_ROWS>(
                    TableId::Secondary {
                        parity,
                        column_class,
                    },
                    secondary[parity][column_class].iter().copied(),
                )?;
                for (cell, &flat) in plan.iter_mut().zip(coarse.iter()) {
                    let coarse_row = flat as usize / MTILE_UTILE_COLUMNS;
                    let coarse_col = flat as usize % MTILE_UTILE_COLUMNS;
                    *cell = UtileCell {
                        row: refine[coarse_row],
                        col: coarse_col as u8,
                    };
                }
            }
        }
        Ok(Self { plans })
    }

    /// Destination cell of the utile stored at `storage_index`.
    #[inline]
    pub fn placement(&self, parity: usize, column_class: usize, storage_index: usize) -> UtileCell {
        self.plans[parity][column_class][storage_index]
    }

    #[inline]
    pub(crate) fn plan(&self, parity: usize, column_class: usize) -> &PlacementPlan {
        &self.plans[parity][column_class]
    }
}

/// Returns the process-wide tables, validating them on first use.
pub fn placement_tables() -> Result<&'static PlacementTables, TableIntegrityError> {
    static TABLES: OnceLock<Result<PlacementTables, TableIntegrityError>> = OnceLock::new();
    TABLES
        .get_or_init(|| {
            let tables = PlacementTables::build();
            if let Err(error) = &tables {
                tracing::error!(%error, "placement table validation failed");
            }
            tables
        })
        .as_ref()
        .map_err(|error| *error)
}

/// Checks that `values` is a permutation of `0..N` and returns `inverse[value] = index`.
fn invert<const N: usize>(
    table: TableId,
    values: impl Iterator<Item = u8>,
) -> Result<[u8; N], TableIntegrityError> {
    let mut inverse = [0u8; N];
    let mut seen: BitVec<usize, Lsb0> = BitVec::repeat(false, N);
    for (index, value) in values.enumerate() {
        let slot = value as usize;
        if slot >= N {
            return Err(TableIntegrityError::ValueOutOfRange {
                table,
                value,
                len: N,
            });
        }
        if seen.replace(slot, true) {
            return Err(TableIntegrityError::DuplicateValue { table, value });
        }
        inverse[slot] = index as u8;
    }
    if let Some(value) = seen.first_zero() {
        return Err(TableIntegrityError::MissingValue { table, value });
    }
    Ok(inverse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_reports_duplicates_and_gaps() {
        let table = TableId::UtileOrder;
        assert_eq!(
            invert::<4>(table, [0u8, 2, 2, 3].into_iter()),
            Err(TableIntegrityError::DuplicateValue { table, value: 2 })
        );
        assert_eq!(
            invert::<4>(table, [0u8, 1, 2].into_iter()),
            Err(TableIntegrityError::MissingValue { table, value: 3 })
        );
        assert_eq!(
            invert::<4>(table, [0u8, 1, 4, 3].into_iter()),
            Err(TableIntegrityError::ValueOutOfRange {
                table,
                value: 4,
                len: 4
            })
        );
        assert_eq!(invert::<4>(table, [2u8, 0, 3, 1].into_iter()), Ok([1, 3, 0, 2]));
    }

    #[test]
    fn corrupted_secondary_table_is_a_structural_fault() {
        let mut secondary = SECONDARY;
        secondary[1][2][0] = 2;
        assert_eq!(
            PlacementTables::from_raw(&UTILE_ORDER, &PRIMARY, &secondary),
            Err(TableIntegrityError::DuplicateValue {
                table: TableId::Secondary {
                    parity: 1,
                    column_class: 2
                },
                value: 2
            })
        );
    }

    #[test]
    fn corrupted_primary_table_is_a_structural_fault() {
        let mut primary = PRIMARY;
        primary[0][7][3] = 32;
        assert_eq!(
            PlacementTables::from_raw(&UTILE_ORDER, &primary, &SECONDARY),
            Err(TableIntegrityError::ValueOutOfRange {
                table: TableId::Primary { parity: 0 },
                value: 32,
                len: UTILES_PER_MTILE
            })
        );
    }

    #[test]
    fn placement_tables_are_shared() {
        let first = placement_tables().unwrap();
        let second = placement_tables().unwrap();
        assert!(std::ptr::eq(first, second));
    }
}
