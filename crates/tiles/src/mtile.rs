use frame_model::{MTILE_WORDS, MtilePos, UTILE_EDGE, UTILE_WORDS};

use crate::tables::PlacementTables;
use crate::utile::{decode_utile, encode_utile};

/// Decodes one macro-tile into the raster frame.
///
/// `stored` holds the macro-tile's 32 utiles in storage order. `dest` starts at the
/// macro-tile's top-left pixel and runs at least to the end of its last pixel row;
/// consecutive pixel rows are `frame_width` words apart.
pub fn decode_mtile(
    tables: &PlacementTables,
    stored: &[u32],
    pos: MtilePos,
    dest: &mut [u32],
    frame_width: usize,
) {
    debug_assert_eq!(stored.len(), MTILE_WORDS);
    let plan = tables.plan(pos.parity(), pos.column_class());
    let mut raster = [0u32; UTILE_WORDS];

    for (utile, cell) in stored.chunks_exact(UTILE_WORDS).zip(plan.iter()) {
        decode_utile(utile, &mut raster);
        let mut offset = cell.word_offset(frame_width);
        for row in raster.chunks_exact(UTILE_EDGE) {
            dest[offset..offset + UTILE_EDGE].copy_from_slice(row);
            offset += frame_width;
        }
    }
}

/// Inverse of [`decode_mtile`]: gathers the macro-tile from the raster frame and
/// writes its 32 utiles in storage order.
pub fn encode_mtile(
    tables: &PlacementTables,
    src: &[u32],
    pos: MtilePos,
    stored: &mut [u32],
    frame_width: usize,
) {
    debug_assert_eq!(stored.len(), MTILE_WORDS);
    let plan = tables.plan(pos.parity(), pos.column_class());
    let mut raster = [0u32; UTILE_WORDS];

    for (utile, cell) in stored.chunks_exact_mut(UTILE_WORDS).zip(plan.iter()) {
        let mut offset = cell.word_offset(frame_width);
        for row in raster.chunks_exact_mut(UTILE_EDGE) {
            row.copy_from_slice(&src[offset..offset + UTILE_EDGE]);
            offset += frame_width;
        }
        encode_utile(&raster, utile);
    }
}
