use std::ops::Range;

use static_assertions::const_assert_eq;
use thiserror::Error;

pub const UTILE_EDGE: usize = 8;
pub const UTILE_WORDS: usize = UTILE_EDGE * UTILE_EDGE;

// Utile grid inside a macro-tile: 8 rows by 4 columns.
pub const MTILE_UTILE_ROWS: usize = 8;
pub const MTILE_UTILE_COLUMNS: usize = 4;
pub const UTILES_PER_MTILE: usize = MTILE_UTILE_ROWS * MTILE_UTILE_COLUMNS;

pub const MTILE_WIDTH: usize = MTILE_UTILE_COLUMNS * UTILE_EDGE;
pub const MTILE_HEIGHT: usize = MTILE_UTILE_ROWS * UTILE_EDGE;
pub const MTILE_WORDS: usize = UTILES_PER_MTILE * UTILE_WORDS;

pub const BYTES_PER_WORD: usize = 4;

/// Number of column classes the row refinement distinguishes (`macro_col mod 4`).
pub const COLUMN_CLASSES: usize = 4;

pub const REFERENCE_WIDTH: usize = 1280;
pub const REFERENCE_HEIGHT: usize = 768;

const_assert_eq!(MTILE_WIDTH, 32);
const_assert_eq!(MTILE_HEIGHT, 64);
const_assert_eq!(MTILE_WORDS, MTILE_WIDTH * MTILE_HEIGHT);
const_assert_eq!(REFERENCE_WIDTH % MTILE_WIDTH, 0);
const_assert_eq!(REFERENCE_HEIGHT % MTILE_HEIGHT, 0);

/// Macro-tile coordinate in the frame grid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MtilePos {
    pub row: usize,
    pub col: usize,
}

impl MtilePos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// 0 for even macro rows, 1 for odd ones.
    #[inline]
    pub const fn parity(self) -> usize {
        self.row % 2
    }

    #[inline]
    pub const fn column_class(self) -> usize {
        self.col % COLUMN_CLASSES
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameLayoutError {
    #[error("frame {width}x{height} is not aligned to the 32x64 macro-tile grid")]
    UnalignedGeometry { width: usize, height: usize },
    #[error("frame {width}x{height} does not fit in addressable memory")]
    GeometryOverflow { width: usize, height: usize },
    #[error("macro-tile index is out of bounds for this frame")]
    MtileIndexOutOfBounds,
}

/// Geometry of one framebuffer, in pixels (one pixel is one 32-bit word).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    width: usize,
    height: usize,
    mtiles_per_row: usize,
    mtiles_per_column: usize,
}

impl FrameLayout {
    pub fn new(width: usize, height: usize) -> Result<Self, FrameLayoutError> {
        if width == 0 || height == 0 || width % MTILE_WIDTH != 0 || height % MTILE_HEIGHT != 0 {
            return Err(FrameLayoutError::UnalignedGeometry { width, height });
        }
        // Every later offset computation stays below the byte count.
        width
            .checked_mul(height)
            .and_then(|words| words.checked_mul(BYTES_PER_WORD))
            .ok_or(FrameLayoutError::GeometryOverflow { width, height })?;
        Ok(Self {
            width,
            height,
            mtiles_per_row: width / MTILE_WIDTH,
            mtiles_per_column: height / MTILE_HEIGHT,
        })
    }

    pub const fn reference() -> Self {
        Self {
            width: REFERENCE_WIDTH,
            height: REFERENCE_HEIGHT,
            mtiles_per_row: REFERENCE_WIDTH / MTILE_WIDTH,
            mtiles_per_column: REFERENCE_HEIGHT / MTILE_HEIGHT,
        }
    }

    /// The placement tables have only been confirmed against this geometry.
    pub const fn is_reference(&self) -> bool {
        self.width == REFERENCE_WIDTH && self.height == REFERENCE_HEIGHT
    }

    pub const fn width(&self) -> usize {
        self.width
    }

    pub const fn height(&self) -> usize {
        self.height
    }

    pub const fn mtiles_per_row(&self) -> usize {
        self.mtiles_per_row
    }

    pub const fn mtiles_per_column(&self) -> usize {
        self.mtiles_per_column
    }

    pub const fn max_mtiles(&self) -> usize {
        self.mtiles_per_row * self.mtiles_per_column
    }

    pub const fn frame_words(&self) -> usize {
        self.width * self.height
    }

    pub const fn frame_bytes(&self) -> usize {
        self.frame_words() * BYTES_PER_WORD
    }

    /// Words covered by one row of macro-tiles, in both the tiled and the raster layout.
    pub const fn band_words(&self) -> usize {
        self.width * MTILE_HEIGHT
    }

    pub fn mtile_index(&self, pos: MtilePos) -> Result<usize, FrameLayoutError> {
        if pos.col >= self.mtiles_per_row || pos.row >= self.mtiles_per_column {
            Err(FrameLayoutError::MtileIndexOutOfBounds)
        } else {
            Ok(pos.row * self.mtiles_per_row + pos.col)
        }
    }

    pub fn mtile_pos(&self, index: usize) -> Result<MtilePos, FrameLayoutError> {
        if index >= self.max_mtiles() {
            Err(FrameLayoutError::MtileIndexOutOfBounds)
        } else {
            Ok(MtilePos {
                row: index / self.mtiles_per_row,
                col: index % self.mtiles_per_row,
            })
        }
    }

    /// Word offset of the macro-tile's top-left pixel in the raster frame.
    pub fn mtile_origin(&self, pos: MtilePos) -> Result<usize, FrameLayoutError> {
        self.mtile_index(pos)?;
        Ok(pos.row * MTILE_HEIGHT * self.width + pos.col * MTILE_WIDTH)
    }

    /// Word range holding the macro-tile in the tiled input.
    pub fn mtile_input_range(&self, index: usize) -> Result<Range<usize>, FrameLayoutError> {
        if index >= self.max_mtiles() {
            return Err(FrameLayoutError::MtileIndexOutOfBounds);
        }
        let start = index * MTILE_WORDS;
        Ok(start..start + MTILE_WORDS)
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self::reference()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_layout_is_forty_by_twelve_mtiles() {
        let layout = FrameLayout::reference();
        assert_eq!(layout.mtiles_per_row(), 40);
        assert_eq!(layout.mtiles_per_column(), 12);
        assert_eq!(layout.max_mtiles(), 480);
        assert_eq!(layout.frame_bytes(), 1280 * 768 * 4);
        assert_eq!(FrameLayout::new(1280, 768), Ok(layout));
        assert!(layout.is_reference());
    }

    #[test]
    fn unaligned_or_empty_geometry_is_rejected() {
        for (width, height) in [(0, 64), (32, 0), (33, 64), (32, 65), (64, 32)] {
            assert_eq!(
                FrameLayout::new(width, height),
                Err(FrameLayoutError::UnalignedGeometry { width, height })
            );
        }
    }

    #[test]
    fn overflowing_geometry_is_rejected() {
        let width = (usize::MAX / 2) & !(MTILE_WIDTH - 1);
        assert_eq!(
            FrameLayout::new(width, MTILE_HEIGHT),
            Err(FrameLayoutError::GeometryOverflow {
                width,
                height: MTILE_HEIGHT
            })
        );
    }

    #[test]
    fn mtile_index_and_pos_are_inverse() {
        let layout = FrameLayout::new(128, 192).unwrap();
        for index in 0..layout.max_mtiles() {
            let pos = layout.mtile_pos(index).unwrap();
            assert_eq!(layout.mtile_index(pos), Ok(index));
        }
        assert_eq!(
            layout.mtile_pos(layout.max_mtiles()),
            Err(FrameLayoutError::MtileIndexOutOfBounds)
        );
        assert_eq!(
            layout.mtile_index(MtilePos::new(0, 4)),
            Err(FrameLayoutError::MtileIndexOutOfBounds)
        );
    }

    #[test]
    fn mtile_origin_and_input_range_follow_grid() {
        let layout = FrameLayout::reference();
        assert_eq!(layout.mtile_origin(MtilePos::new(0, 0)), Ok(0));
        assert_eq!(layout.mtile_origin(MtilePos::new(0, 1)), Ok(32));
        assert_eq!(layout.mtile_origin(MtilePos::new(1, 0)), Ok(64 * 1280));
        assert_eq!(layout.mtile_origin(MtilePos::new(11, 39)), Ok(902_368));
        assert_eq!(layout.mtile_input_range(41), Ok(83_968..86_016));
        assert!(layout.mtile_input_range(480).is_err());
    }

    #[test]
    fn parity_and_column_class() {
        let pos = MtilePos::new(3, 6);
        assert_eq!(pos.parity(), 1);
        assert_eq!(pos.column_class(), 2);
        assert_eq!(MtilePos::new(10, 39).parity(), 0);
        assert_eq!(MtilePos::new(10, 39).column_class(), 3);
    }
}
