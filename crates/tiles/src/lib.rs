//! Detiling of GPU tiled framebuffer dumps.
//!
//! A tiled frame is a sequence of macro-tiles (32 pixels wide, 64 pixels tall) in
//! row-major grid order. Each macro-tile stores 32 utiles of 8x8 pixels, each utile
//! in its own interleaved word order. [`Detiler`] turns such a frame into a plain
//! row-major raster and back. Pixels are opaque 32-bit words; they are moved, never
//! inspected.

use std::borrow::Cow;

use frame_model::{BYTES_PER_WORD, FrameLayout, FrameLayoutError};
use thiserror::Error;
use tracing::{debug, warn};

mod assemble;
pub mod mtile;
pub mod tables;
pub mod utile;

pub use frame_model;
pub use tables::{PlacementTables, TableId, TableIntegrityError, UtileCell, placement_tables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DetileError {
    #[error(transparent)]
    Layout(#[from] FrameLayoutError),
    #[error("input holds {actual} bytes, the frame needs {expected}")]
    InvalidInputSize { expected: usize, actual: usize },
    #[error("output buffer holds {actual} words, the frame needs {expected}")]
    OutputSizeMismatch { expected: usize, actual: usize },
    #[error("placement tables are corrupt: {0}")]
    StructuralFault(#[from] TableIntegrityError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Execution {
    #[default]
    Sequential,
    /// Macro-tile rows are spread over the current rayon pool.
    Parallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DetileOptions {
    pub execution: Execution,
}

/// Converts frames between the tiled and the raster layout.
#[derive(Debug, Clone, Copy)]
pub struct Detiler {
    tables: &'static PlacementTables,
    options: DetileOptions,
}

impl Detiler {
    /// Fails only if the built-in placement tables are not bijections.
    pub fn new(options: DetileOptions) -> Result<Self, DetileError> {
        Ok(Self {
            tables: placement_tables()?,
            options,
        })
    }

    pub fn detile(&self, tiled: &[u8], layout: FrameLayout) -> Result<Vec<u8>, DetileError> {
        convert_bytes(tiled, layout, |tiled, raster| {
            self.detile_into(tiled, raster, layout)
        })
    }

    pub fn retile(&self, raster: &[u8], layout: FrameLayout) -> Result<Vec<u8>, DetileError> {
        convert_bytes(raster, layout, |raster, tiled| {
            self.retile_into(raster, tiled, layout)
        })
    }

    pub fn detile_words(
        &self,
        tiled: &[u32],
        layout: FrameLayout,
    ) -> Result<Vec<u32>, DetileError> {
        check_input(layout, tiled.len())?;
        let mut raster = vec![0u32; layout.frame_words()];
        self.detile_into(tiled, &mut raster, layout)?;
        Ok(raster)
    }

    pub fn retile_words(
        &self,
        raster: &[u32],
        layout: FrameLayout,
    ) -> Result<Vec<u32>, DetileError> {
        check_input(layout, raster.len())?;
        let mut tiled = vec![0u32; layout.frame_words()];
        self.retile_into(raster, &mut tiled, layout)?;
        Ok(tiled)
    }

    /// Decodes into a caller-owned raster buffer. On error `raster` is untouched.
    pub fn detile_into(
        &self,
        tiled: &[u32],
        raster: &mut [u32],
        layout: FrameLayout,
    ) -> Result<(), DetileError> {
        check_frame(layout, tiled.len(), raster.len())?;
        debug!(
            width = layout.width(),
            height = layout.height(),
            mtiles = layout.max_mtiles(),
            execution = ?self.options.execution,
            "detile frame"
        );
        assemble::detile_frame(self.tables, layout, tiled, raster, self.options.execution)?;
        Ok(())
    }

    /// Encodes into a caller-owned tiled buffer. On error `tiled` is untouched.
    pub fn retile_into(
        &self,
        raster: &[u32],
        tiled: &mut [u32],
        layout: FrameLayout,
    ) -> Result<(), DetileError> {
        check_frame(layout, raster.len(), tiled.len())?;
        debug!(
            width = layout.width(),
            height = layout.height(),
            mtiles = layout.max_mtiles(),
            execution = ?self.options.execution,
            "retile frame"
        );
        assemble::retile_frame(self.tables, layout, raster, tiled, self.options.execution)?;
        Ok(())
    }
}

/// Detiles a `width` x `height` frame sequentially.
pub fn detile(tiled: &[u8], width: usize, height: usize) -> Result<Vec<u8>, DetileError> {
    let layout = FrameLayout::new(width, height)?;
    Detiler::new(DetileOptions::default())?.detile(tiled, layout)
}

/// Retiles a `width` x `height` raster frame sequentially.
pub fn retile(raster: &[u8], width: usize, height: usize) -> Result<Vec<u8>, DetileError> {
    let layout = FrameLayout::new(width, height)?;
    Detiler::new(DetileOptions::default())?.retile(raster, layout)
}

/// Runs `convert` over a byte frame. Word-aligned input is borrowed and the output
/// is written straight into the returned bytes when the allocation is word-aligned;
/// otherwise the words are copied.
fn convert_bytes(
    input: &[u8],
    layout: FrameLayout,
    convert: impl FnOnce(&[u32], &mut [u32]) -> Result<(), DetileError>,
) -> Result<Vec<u8>, DetileError> {
    let input = words_from_bytes(input, layout)?;
    let mut output = vec![0u8; layout.frame_bytes()];
    match bytemuck::try_cast_slice_mut::<u8, u32>(&mut output[..]) {
        Ok(words) => convert(&input[..], words)?,
        Err(_) => {
            let mut words = vec![0u32; layout.frame_words()];
            convert(&input[..], &mut words)?;
            output.copy_from_slice(bytemuck::cast_slice(&words));
        }
    }
    Ok(output)
}

fn words_from_bytes(bytes: &[u8], layout: FrameLayout) -> Result<Cow<'_, [u32]>, DetileError> {
    if bytes.len() != layout.frame_bytes() {
        return Err(DetileError::InvalidInputSize {
            expected: layout.frame_bytes(),
            actual: bytes.len(),
        });
    }
    Ok(match bytemuck::try_cast_slice::<u8, u32>(bytes) {
        Ok(words) => Cow::Borrowed(words),
        Err(_) => Cow::Owned(bytemuck::pod_collect_to_vec(bytes)),
    })
}

fn check_input(layout: FrameLayout, input_words: usize) -> Result<(), DetileError> {
    if input_words != layout.frame_words() {
        return Err(DetileError::InvalidInputSize {
            expected: layout.frame_bytes(),
            actual: input_words * BYTES_PER_WORD,
        });
    }
    Ok(())
}

fn check_frame(
    layout: FrameLayout,
    input_words: usize,
    output_words: usize,
) -> Result<(), DetileError> {
    check_input(layout, input_words)?;
    if output_words != layout.frame_words() {
        return Err(DetileError::OutputSizeMismatch {
            expected: layout.frame_words(),
            actual: output_words,
        });
    }
    if !layout.is_reference() {
        warn!(
            width = layout.width(),
            height = layout.height(),
            "placement tables are only confirmed for 1280x768 frames"
        );
    }
    Ok(())
}
