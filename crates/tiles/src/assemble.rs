//! Frame-level drivers that walk the macro-tile grid.
//!
//! A row of macro-tiles ("band") covers the same number of words in the tiled
//! layout and in the raster layout, and bands never share words. Bands are
//! therefore processed independently, in order or on the rayon pool.

use frame_model::{FrameLayout, FrameLayoutError, MtilePos};
use rayon::prelude::*;

use crate::Execution;
use crate::mtile::{decode_mtile, encode_mtile};
use crate::tables::PlacementTables;

/// Writes the raster frame for `tiled` into `raster`. Both slices hold exactly
/// `layout.frame_words()` words.
pub(crate) fn detile_frame(
    tables: &PlacementTables,
    layout: FrameLayout,
    tiled: &[u32],
    raster: &mut [u32],
    execution: Execution,
) -> Result<(), FrameLayoutError> {
    let band_words = layout.band_words();
    match execution {
        Execution::Sequential => tiled
            .chunks_exact(band_words)
            .zip(raster.chunks_exact_mut(band_words))
            .enumerate()
            .try_for_each(|(band_row, (tiled_band, raster_band))| {
                detile_band(tables, layout, band_row, tiled_band, raster_band)
            }),
        Execution::Parallel => tiled
            .par_chunks_exact(band_words)
            .zip(raster.par_chunks_exact_mut(band_words))
            .enumerate()
            .try_for_each(|(band_row, (tiled_band, raster_band))| {
                detile_band(tables, layout, band_row, tiled_band, raster_band)
            }),
    }
}

/// Writes the tiled frame for `raster` into `tiled`.
pub(crate) fn retile_frame(
    tables: &PlacementTables,
    layout: FrameLayout,
    raster: &[u32],
    tiled: &mut [u32],
    execution: Execution,
) -> Result<(), FrameLayoutError> {
    let band_words = layout.band_words();
    match execution {
        Execution::Sequential => raster
            .chunks_exact(band_words)
            .zip(tiled.chunks_exact_mut(band_words))
            .enumerate()
            .try_for_each(|(band_row, (raster_band, tiled_band))| {
                retile_band(tables, layout, band_row, raster_band, tiled_band)
            }),
        Execution::Parallel => raster
            .par_chunks_exact(band_words)
            .zip(tiled.par_chunks_exact_mut(band_words))
            .enumerate()
            .try_for_each(|(band_row, (raster_band, tiled_band))| {
                retile_band(tables, layout, band_row, raster_band, tiled_band)
            }),
    }
}

/// Frame-relative offsets of a band's first word in the tiled and the raster layout.
fn band_start(layout: FrameLayout, band_row: usize) -> Result<(usize, usize), FrameLayoutError> {
    let first = MtilePos::new(band_row, 0);
    let tiled = layout.mtile_input_range(layout.mtile_index(first)?)?.start;
    Ok((tiled, layout.mtile_origin(first)?))
}

fn detile_band(
    tables: &PlacementTables,
    layout: FrameLayout,
    band_row: usize,
    tiled_band: &[u32],
    raster_band: &mut [u32],
) -> Result<(), FrameLayoutError> {
    let (tiled_start, raster_start) = band_start(layout, band_row)?;
    for col in 0..layout.mtiles_per_row() {
        let pos = MtilePos::new(band_row, col);
        let stored = layout.mtile_input_range(layout.mtile_index(pos)?)?;
        let origin = layout.mtile_origin(pos)? - raster_start;
        decode_mtile(
            tables,
            &tiled_band[stored.start - tiled_start..stored.end - tiled_start],
            pos,
            &mut raster_band[origin..],
            layout.width(),
        );
    }
    Ok(())
}

fn retile_band(
    tables: &PlacementTables,
    layout: FrameLayout,
    band_row: usize,
    raster_band: &[u32],
    tiled_band: &mut [u32],
) -> Result<(), FrameLayoutError> {
    let (tiled_start, raster_start) = band_start(layout, band_row)?;
    for col in 0..layout.mtiles_per_row() {
        let pos = MtilePos::new(band_row, col);
        let stored = layout.mtile_input_range(layout.mtile_index(pos)?)?;
        let origin = layout.mtile_origin(pos)? - raster_start;
        encode_mtile(
            tables,
            &raster_band[origin..],
            pos,
            &mut tiled_band[stored.start - tiled_start..stored.end - tiled_start],
            layout.width(),
        );
    }
    Ok(())
}
