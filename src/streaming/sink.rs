//! Consumers of streamed pieces.

use crate::core::descriptor::ImageDescriptor;
use crate::core::error::{PipelineError, PipelineResult};
use crate::core::raster::Raster;

/// Receives the pieces of a streamed update, in division order.
pub trait RasterSink<const D: usize> {
    /// Called once before the first piece. The descriptor's requested region
    /// is the whole area being streamed.
    fn begin(&mut self, descriptor: &ImageDescriptor<D>) -> PipelineResult<()>;

    /// Called once per division with the pixels of that division.
    fn write(&mut self, piece: &Raster<D>) -> PipelineResult<()>;

    /// Called once after the last piece.
    fn finish(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

/// Stitches streamed pieces into one in-memory raster.
#[derive(Debug, Default)]
pub struct MemorySink<const D: usize> {
    raster: Option<Raster<D>>,
    pieces: usize,
    pixels_written: u64,
}

impl<const D: usize> MemorySink<D> {
    pub fn new() -> Self {
        Self {
            raster: None,
            pieces: 0,
            pixels_written: 0,
        }
    }

    /// Number of pieces received so far.
    pub fn pieces(&self) -> usize {
        self.pieces
    }

    pub fn pixels_written(&self) -> u64 {
        self.pixels_written
    }

    pub fn raster(&self) -> Option<&Raster<D>> {
        self.raster.as_ref()
    }

    /// The stitched raster, if streaming began.
    pub fn into_raster(self) -> Option<Raster<D>> {
        self.raster
    }
}

impl<const D: usize> RasterSink<D> for MemorySink<D> {
    fn begin(&mut self, descriptor: &ImageDescriptor<D>) -> PipelineResult<()> {
        self.raster = Some(Raster::new(
            descriptor.requested_region(),
            descriptor.number_of_components(),
            descriptor.sample_type(),
        ));
        self.pieces = 0;
        self.pixels_written = 0;
        Ok(())
    }

    fn write(&mut self, piece: &Raster<D>) -> PipelineResult<()> {
        let raster = self
            .raster
            .as_mut()
            .ok_or_else(|| PipelineError::Other("memory sink written before begin".to_string()))?;
        self.pixels_written += raster.copy_from(piece);
        self.pieces += 1;
        Ok(())
    }
}
