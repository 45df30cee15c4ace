use frame_model::UTILE_WORDS;

use crate::tables::UTILE_ORDER;

/// Deinterleaves one utile from storage order into raster order.
///
/// `stored` must hold exactly one utile.
#[inline]
pub fn decode_utile(stored: &[u32], raster: &mut [u32; UTILE_WORDS]) {
    debug_assert_eq!(stored.len(), UTILE_WORDS);
    for (word, &source) in raster.iter_mut().zip(UTILE_ORDER.iter().flatten()) {
        *word = stored[source as usize];
    }
}

/// Interleaves one raster-order utile back into storage order.
#[inline]
pub fn encode_utile(raster: &[u32; UTILE_WORDS], stored: &mut [u32]) {
    debug_assert_eq!(stored.len(), UTILE_WORDS);
    for (&word, &target) in raster.iter().zip(UTILE_ORDER.iter().flatten()) {
        stored[target as usize] = word;
    }
}
