//! Pixel buffers.
//!
//! A [`Raster`] owns the pixels of one buffered region. Every component of
//! every pixel is stored as `f64`, interleaved per pixel, with axis 0 varying
//! fastest. The declared [`SampleType`] decides how values are quantized when
//! they are written, so an 8-bit raster only ever holds integers in `0..=255`.
//!
//! During threaded execution an output raster is split into disjoint
//! [`RasterSlabMut`] views, one per worker.

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declared storage type of a raster's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    U8,
    U16,
    I16,
    I32,
    F32,
    #[default]
    F64,
}

impl SampleType {
    /// Size of one sample in the declared type.
    pub fn size_in_bytes(&self) -> usize {
        match self {
            SampleType::U8 => 1,
            SampleType::U16 | SampleType::I16 => 2,
            SampleType::I32 | SampleType::F32 => 4,
            SampleType::F64 => 8,
        }
    }

    /// Whether values are rounded on write.
    pub fn is_integer(&self) -> bool {
        !matches!(self, SampleType::F32 | SampleType::F64)
    }

    /// Representable range.
    pub fn range(&self) -> (f64, f64) {
        match self {
            SampleType::U8 => (0.0, u8::MAX as f64),
            SampleType::U16 => (0.0, u16::MAX as f64),
            SampleType::I16 => (i16::MIN as f64, i16::MAX as f64),
            SampleType::I32 => (i32::MIN as f64, i32::MAX as f64),
            SampleType::F32 => (f32::MIN as f64, f32::MAX as f64),
            SampleType::F64 => (f64::MIN, f64::MAX),
        }
    }

    /// Convert a computed value into this type.
    ///
    /// Integer types round half away from zero and saturate; NaN becomes 0.
    pub fn quantize(&self, value: f64) -> f64 {
        match self {
            SampleType::F64 => value,
            SampleType::F32 => value as f32 as f64,
            _ => {
                if value.is_nan() {
                    return 0.0;
                }
                let (lo, hi) = self.range();
                value.round().clamp(lo, hi)
            }
        }
    }

    /// Lowercase name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            SampleType::U8 => "u8",
            SampleType::U16 => "u16",
            SampleType::I16 => "i16",
            SampleType::I32 => "i32",
            SampleType::F32 => "f32",
            SampleType::F64 => "f64",
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(SampleType::U8),
            "u16" | "uint16" => Ok(SampleType::U16),
            "i16" | "int16" => Ok(SampleType::I16),
            "i32" | "int32" => Ok(SampleType::I32),
            "f32" | "float" => Ok(SampleType::F32),
            "f64" | "double" => Ok(SampleType::F64),
            other => Err(PipelineError::configuration(
                "sample_type",
                format!("unknown sample type '{}'", other),
            )),
        }
    }
}

/// Pixel buffer covering one region.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<const D: usize> {
    region: Region<D>,
    components: usize,
    sample_type: SampleType,
    data: Vec<f64>,
}

impl<const D: usize> Raster<D> {
    /// Allocate a zero-filled raster.
    pub fn new(region: Region<D>, components: usize, sample_type: SampleType) -> Self {
        Self::filled(region, components, sample_type, 0.0)
    }

    /// Allocate a raster with every sample set to `value`.
    pub fn filled(region: Region<D>, components: usize, sample_type: SampleType, value: f64) -> Self {
        let len = region.number_of_pixels() as usize * components;
        Self {
            region,
            components,
            sample_type,
            data: vec![sample_type.quantize(value); len],
        }
    }

    /// Wrap existing interleaved samples.
    pub fn from_data(
        region: Region<D>,
        components: usize,
        sample_type: SampleType,
        data: Vec<f64>,
    ) -> PipelineResult<Self> {
        let expected = region.number_of_pixels() as usize * components;
        if data.len() != expected {
            return Err(PipelineError::Other(format!(
                "raster over {} with {} components needs {} samples, got {}",
                region,
                components,
                expected,
                data.len()
            )));
        }
        let data = data.into_iter().map(|v| sample_type.quantize(v)).collect();
        Ok(Self {
            region,
            components,
            sample_type,
            data,
        })
    }

    /// The buffered region.
    pub fn region(&self) -> Region<D> {
        self.region
    }

    /// Components per pixel.
    pub fn components(&self) -> usize {
        self.components
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Raw interleaved samples.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Bytes held by this buffer.
    pub fn memory_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }

    /// The components of the pixel at `index`, if buffered.
    pub fn get(&self, index: &[i64; D]) -> Option<&[f64]> {
        if !self.region.contains_index(index) {
            return None;
        }
        let start = self.region.linear_offset(index) * self.components;
        Some(&self.data[start..start + self.components])
    }

    /// One component of the pixel at `index`, if buffered.
    pub fn get_component(&self, index: &[i64; D], component: usize) -> Option<f64> {
        self.get(index).and_then(|pixel| pixel.get(component).copied())
    }

    /// Overwrite the pixel at `index`.
    pub fn set(&mut self, index: &[i64; D], values: &[f64]) -> PipelineResult<()> {
        if !self.region.contains_index(index) || values.len() != self.components {
            return Err(PipelineError::Other(format!(
                "cannot write {} values at {:?} into raster over {}",
                values.len(),
                index,
                self.region
            )));
        }
        let start = self.region.linear_offset(index) * self.components;
        for (dst, &v) in self.data[start..start + self.components].iter_mut().zip(values) {
            *dst = self.sample_type.quantize(v);
        }
        Ok(())
    }

    /// Copy of a sub-region. Fails when `region` is not fully buffered.
    pub fn extract(&self, region: &Region<D>) -> PipelineResult<Raster<D>> {
        if !self.region.contains(region) {
            return Err(PipelineError::Other(format!(
                "region {} is not inside buffered region {}",
                region, self.region
            )));
        }
        let mut out = Raster::new(*region, self.components, self.sample_type);
        out.copy_from(self);
        Ok(out)
    }

    /// Paste the overlapping part of `source` into this raster.
    ///
    /// Returns the number of pixels copied.
    pub fn copy_from(&mut self, source: &Raster<D>) -> u64 {
        let overlap = self.region.intersect(&source.region);
        if overlap.is_empty() {
            return 0;
        }
        let components = self.components.min(source.components);
        for index in overlap.iter() {
            let dst = self.region.linear_offset(&index) * self.components;
            let src = source.region.linear_offset(&index) * source.components;
            for c in 0..components {
                self.data[dst + c] = self.sample_type.quantize(source.data[src + c]);
            }
        }
        overlap.number_of_pixels()
    }

    /// Split the buffer into disjoint writable slabs.
    ///
    /// `slabs` must tile the buffered region in memory order, as produced by
    /// [`Region::split_slowest`] on this raster's region.
    pub fn slabs_mut(&mut self, slabs: &[Region<D>]) -> PipelineResult<Vec<RasterSlabMut<'_, D>>> {
        let mut out = Vec::with_capacity(slabs.len());
        let mut rest: &mut [f64] = &mut self.data;
        let mut consumed = 0usize;

        for slab in slabs {
            if slab.is_empty() {
                continue;
            }
            if !self.region.contains(slab) {
                return Err(PipelineError::Other(format!(
                    "slab {} outside buffered region {}",
                    slab, self.region
                )));
            }
            let start = self.region.linear_offset(&slab.index()) * self.components;
            let len = slab.number_of_pixels() as usize * self.components;
            if start != consumed || len > rest.len() {
                return Err(PipelineError::Other(format!(
                    "slab {} is not contiguous in buffered region {}",
                    slab, self.region
                )));
            }
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(len);
            out.push(RasterSlabMut {
                region: *slab,
                components: self.components,
                sample_type: self.sample_type,
                data: head,
            });
            rest = tail;
            consumed += len;
        }
        Ok(out)
    }
}

/// Writable view of one disjoint slab of an output raster.
pub struct RasterSlabMut<'a, const D: usize> {
    region: Region<D>,
    components: usize,
    sample_type: SampleType,
    data: &'a mut [f64],
}

impl<'a, const D: usize> RasterSlabMut<'a, D> {
    /// Region this slab may write.
    pub fn region(&self) -> Region<D> {
        self.region
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Write all components of the pixel at `index`.
    ///
    /// Indices outside the slab are ignored and reported as `false`.
    pub fn set(&mut self, index: &[i64; D], values: &[f64]) -> bool {
        if !self.region.contains_index(index) {
            return false;
        }
        let start = self.region.linear_offset(index) * self.components;
        for (dst, &v) in self.data[start..start + self.components].iter_mut().zip(values) {
            *dst = self.sample_type.quantize(v);
        }
        true
    }

    /// Write a single component.
    pub fn set_component(&mut self, index: &[i64; D], component: usize, value: f64) -> bool {
        if !self.region.contains_index(index) || component >= self.components {
            return false;
        }
        let offset = self.region.linear_offset(index) * self.components + component;
        self.data[offset] = self.sample_type.quantize(value);
        true
    }

    /// Copy the overlapping pixels of `source`, component by component.
    pub fn copy_from(&mut self, source: &Raster<D>) {
        let overlap = self.region.intersect(&source.region());
        let components = self.components.min(source.components());
        for index in overlap.iter() {
            if let Some(pixel) = source.get(&index) {
                let start = self.region.linear_offset(&index) * self.components;
                for c in 0..components {
                    self.data[start + c] = self.sample_type.quantize(pixel[c]);
                }
            }
        }
    }

    /// Read back what has been written so far.
    pub fn get(&self, index: &[i64; D]) -> Option<&[f64]> {
        if !self.region.contains_index(index) {
            return None;
        }
        let start = self.region.linear_offset(index) * self.components;
        Some(&self.data[start..start + self.components])
    }
}
