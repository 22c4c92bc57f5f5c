//! Image metadata carried by every node output.

use crate::core::error::{NodeId, PipelineError, PipelineResult};
use crate::core::raster::SampleType;
use crate::core::region::Region;

/// Physical placement of the pixel grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry<const D: usize> {
    /// Physical position of index zero.
    pub origin: [f64; D],
    /// Physical size of one pixel along each axis.
    pub spacing: [f64; D],
    /// Direction cosines, row-major: `direction[row][col]`.
    pub direction: [[f64; D]; D],
}

impl<const D: usize> Geometry<D> {
    /// Unit spacing, zero origin, identity direction.
    pub fn identity() -> Self {
        let mut direction = [[0.0; D]; D];
        for (axis, row) in direction.iter_mut().enumerate() {
            row[axis] = 1.0;
        }
        Self {
            origin: [0.0; D],
            spacing: [1.0; D],
            direction,
        }
    }

    pub fn with_origin(mut self, origin: [f64; D]) -> Self {
        self.origin = origin;
        self
    }

    /// Set the spacing. Zero or negative spacing is rejected.
    pub fn with_spacing(mut self, spacing: [f64; D]) -> PipelineResult<Self> {
        if spacing.iter().any(|&s| !(s > 0.0)) {
            return Err(PipelineError::configuration(
                "spacing",
                format!("spacing must be strictly positive, got {:?}", spacing),
            ));
        }
        self.spacing = spacing;
        Ok(self)
    }

    pub fn with_direction(mut self, direction: [[f64; D]; D]) -> Self {
        self.direction = direction;
        self
    }

    /// Physical coordinates of a pixel centre.
    pub fn index_to_physical_point(&self, index: &[i64; D]) -> [f64; D] {
        let mut point = self.origin;
        for (row, value) in point.iter_mut().enumerate() {
            for col in 0..D {
                *value += self.direction[row][col] * index[col] as f64 * self.spacing[col];
            }
        }
        point
    }
}

impl<const D: usize> Default for Geometry<D> {
    fn default() -> Self {
        Self::identity()
    }
}

/// Metadata of one node output.
///
/// The largest possible region and the component count are fixed by the
/// information pass. The requested region is set while regions propagate
/// upstream, the buffered region at allocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageDescriptor<const D: usize> {
    pub geometry: Geometry<D>,
    largest_possible_region: Region<D>,
    requested_region: Region<D>,
    buffered_region: Region<D>,
    components: usize,
    sample_type: SampleType,
}

impl<const D: usize> ImageDescriptor<D> {
    /// Describe an output covering `largest` with `components` per pixel.
    pub fn new(largest: Region<D>, components: usize, sample_type: SampleType) -> Self {
        Self {
            geometry: Geometry::identity(),
            largest_possible_region: largest,
            requested_region: Region::empty(),
            buffered_region: Region::empty(),
            components,
            sample_type,
        }
    }

    /// Same metadata with a different extent, component count or type.
    pub fn derive(&self, largest: Region<D>, components: usize, sample_type: SampleType) -> Self {
        Self::new(largest, components, sample_type).with_geometry(self.geometry)
    }

    pub fn with_geometry(mut self, geometry: Geometry<D>) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn largest_possible_region(&self) -> Region<D> {
        self.largest_possible_region
    }

    pub fn requested_region(&self) -> Region<D> {
        self.requested_region
    }

    pub fn buffered_region(&self) -> Region<D> {
        self.buffered_region
    }

    /// Components per pixel.
    pub fn number_of_components(&self) -> usize {
        self.components
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Bytes per pixel in the declared type.
    pub fn pixel_size_in_bytes(&self) -> usize {
        self.components * self.sample_type.size_in_bytes()
    }

    /// Set the requested region, cropping it to the largest possible region.
    ///
    /// A request that only partly overlaps the available data is cropped.
    /// A non-empty request with no overlap at all fails.
    pub fn set_requested_region(&mut self, node_id: NodeId, requested: Region<D>) -> PipelineResult<Region<D>> {
        let cropped = requested.crop(&self.largest_possible_region);
        if cropped.is_empty() && !requested.is_empty() {
            return Err(PipelineError::OutOfBoundsRequest {
                node_id,
                requested: requested.to_string(),
                largest: self.largest_possible_region.to_string(),
            });
        }
        self.requested_region = cropped;
        Ok(cropped)
    }

    /// Record the region materialized for this output.
    pub fn set_buffered_region(&mut self, node_id: NodeId, buffered: Region<D>) -> PipelineResult<()> {
        if !buffered.contains(&self.requested_region) {
            return Err(PipelineError::inconsistent(
                node_id,
                format!(
                    "buffered region {} does not cover requested region {}",
                    buffered, self.requested_region
                ),
            ));
        }
        self.buffered_region = buffered;
        Ok(())
    }
}
