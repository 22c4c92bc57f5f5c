//! N-dimensional integer regions.
//!
//! A [`Region`] is an axis-aligned box described by its lower corner and its
//! size along every axis. Axis 0 varies fastest in memory, the last axis
//! slowest. Regions are small `Copy` values and are passed around freely.

use std::fmt;

/// Per-axis halo radius used to pad regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Radius<const D: usize>(pub [u64; D]);

impl<const D: usize> Radius<D> {
    /// Create a radius from per-axis values.
    pub fn new(radius: [u64; D]) -> Self {
        Self(radius)
    }

    /// Same radius on every axis.
    pub fn uniform(radius: u64) -> Self {
        Self([radius; D])
    }

    /// Zero radius (per-pixel operations).
    pub fn zero() -> Self {
        Self([0; D])
    }

    /// Whether this radius requires any halo at all.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&r| r == 0)
    }

    /// Radius along one axis.
    pub fn get(&self, axis: usize) -> u64 {
        self.0[axis]
    }

    /// Sum of two radii, axis by axis.
    pub fn add(&self, other: &Radius<D>) -> Radius<D> {
        let mut out = [0; D];
        for (axis, value) in out.iter_mut().enumerate() {
            *value = self.0[axis] + other.0[axis];
        }
        Radius(out)
    }

    /// Per-axis maximum of two radii.
    pub fn combine(&self, other: &Radius<D>) -> Radius<D> {
        let mut out = [0; D];
        for (axis, value) in out.iter_mut().enumerate() {
            *value = self.0[axis].max(other.0[axis]);
        }
        Radius(out)
    }

    /// The neighborhood box around the origin, `[-r, r]` on every axis.
    pub fn window(&self) -> Region<D> {
        let mut index = [0i64; D];
        let mut size = [0u64; D];
        for axis in 0..D {
            index[axis] = -(self.0[axis] as i64);
            size[axis] = 2 * self.0[axis] + 1;
        }
        Region::new(index, size)
    }
}

impl<const D: usize> Default for Radius<D> {
    fn default() -> Self {
        Self::zero()
    }
}

/// An axis-aligned box over an N-dimensional raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region<const D: usize> {
    index: [i64; D],
    size: [u64; D],
}

impl<const D: usize> Region<D> {
    /// Create a region from its lower corner and size.
    pub fn new(index: [i64; D], size: [u64; D]) -> Self {
        Self { index, size }
    }

    /// Region starting at the origin.
    pub fn from_size(size: [u64; D]) -> Self {
        Self { index: [0; D], size }
    }

    /// The canonical empty region.
    pub fn empty() -> Self {
        Self {
            index: [0; D],
            size: [0; D],
        }
    }

    /// Lower corner.
    pub fn index(&self) -> [i64; D] {
        self.index
    }

    /// Extent along every axis.
    pub fn size(&self) -> [u64; D] {
        self.size
    }

    /// Exclusive upper bound along one axis.
    pub fn end(&self, axis: usize) -> i64 {
        self.index[axis] + self.size[axis] as i64
    }

    /// True when any axis has zero extent.
    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    /// Number of pixels covered.
    pub fn number_of_pixels(&self) -> u64 {
        self.size.iter().product()
    }

    /// Largest region contained in both `self` and `other`.
    ///
    /// Disjoint regions intersect to a region of size zero on the axes where
    /// they do not overlap.
    pub fn intersect(&self, other: &Region<D>) -> Region<D> {
        let mut index = [0i64; D];
        let mut size = [0u64; D];
        for axis in 0..D {
            let lower = self.index[axis].max(other.index[axis]);
            let upper = self.end(axis).min(other.end(axis));
            index[axis] = lower;
            size[axis] = (upper - lower).max(0) as u64;
        }
        Region { index, size }
    }

    /// Clip this region to `bounds`. Same as [`Region::intersect`], never grows.
    pub fn crop(&self, bounds: &Region<D>) -> Region<D> {
        self.intersect(bounds)
    }

    /// Grow by `radius` on both sides of every axis.
    pub fn pad(&self, radius: &Radius<D>) -> Region<D> {
        let mut index = self.index;
        let mut size = self.size;
        for axis in 0..D {
            index[axis] -= radius.0[axis] as i64;
            size[axis] += 2 * radius.0[axis];
        }
        Region { index, size }
    }

    /// Translate by `offset`.
    pub fn shifted(&self, offset: &[i64; D]) -> Region<D> {
        let mut index = self.index;
        for axis in 0..D {
            index[axis] += offset[axis];
        }
        Region {
            index,
            size: self.size,
        }
    }

    /// Whether `point` lies inside this region.
    pub fn contains_index(&self, point: &[i64; D]) -> bool {
        (0..D).all(|axis| point[axis] >= self.index[axis] && point[axis] < self.end(axis))
    }

    /// Whether `other` lies completely inside this region.
    ///
    /// An empty region is contained in every region.
    pub fn contains(&self, other: &Region<D>) -> bool {
        if other.is_empty() {
            return true;
        }
        (0..D).all(|axis| other.index[axis] >= self.index[axis] && other.end(axis) <= self.end(axis))
    }

    /// Smallest region containing both regions. Empty operands are ignored.
    pub fn union_bounds(&self, other: &Region<D>) -> Region<D> {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let mut index = [0i64; D];
        let mut size = [0u64; D];
        for axis in 0..D {
            let lower = self.index[axis].min(other.index[axis]);
            let upper = self.end(axis).max(other.end(axis));
            index[axis] = lower;
            size[axis] = (upper - lower) as u64;
        }
        Region { index, size }
    }

    /// Linear offset of `point` inside a buffer laid out over this region.
    ///
    /// The caller guarantees `point` is contained.
    pub fn linear_offset(&self, point: &[i64; D]) -> usize {
        let mut offset = 0usize;
        let mut stride = 1usize;
        for axis in 0..D {
            offset += (point[axis] - self.index[axis]) as usize * stride;
            stride *= self.size[axis] as usize;
        }
        offset
    }

    /// Iterate over all indices, axis 0 fastest.
    pub fn iter(&self) -> RegionIter<D> {
        RegionIter::new(*self)
    }

    /// The slowest-varying axis with more than one pixel, if any.
    pub fn slowest_splittable_axis(&self) -> Option<usize> {
        (0..D).rev().find(|&axis| self.size[axis] > 1)
    }

    /// Split into at most `pieces` near-equal slabs along the slowest axis
    /// with an extent greater than one.
    ///
    /// Slabs are returned in memory order and are contiguous in a buffer laid
    /// out over `self`. Fewer slabs are produced when the region is too thin.
    pub fn split_slowest(&self, pieces: usize) -> Vec<Region<D>> {
        if self.is_empty() {
            return Vec::new();
        }
        let axis = match self.slowest_splittable_axis() {
            Some(axis) if pieces > 1 => axis,
            _ => return vec![*self],
        };

        let extent = self.size[axis];
        let count = (pieces as u64).min(extent);
        let base = extent / count;
        let remainder = extent % count;

        let mut slabs = Vec::with_capacity(count as usize);
        let mut start = self.index[axis];
        for piece in 0..count {
            let length = base + u64::from(piece < remainder);
            let mut index = self.index;
            let mut size = self.size;
            index[axis] = start;
            size[axis] = length;
            slabs.push(Region { index, size });
            start += length as i64;
        }
        slabs
    }

    /// Cover this region with a grid of tiles of at most `tile` pixels per axis.
    ///
    /// A zero tile extent means "whole axis". Tiles are ordered with axis 0
    /// varying fastest.
    pub fn tiles(&self, tile: &[u64; D]) -> Vec<Region<D>> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut step = [0u64; D];
        let mut counts = [0u64; D];
        for axis in 0..D {
            step[axis] = if tile[axis] == 0 {
                self.size[axis]
            } else {
                tile[axis].min(self.size[axis])
            };
            counts[axis] = self.size[axis].div_ceil(step[axis]);
        }

        let grid = Region::from_size(counts);
        grid.iter()
            .map(|cell| {
                let mut index = [0i64; D];
                let mut size = [0u64; D];
                for axis in 0..D {
                    let offset = cell[axis] as u64 * step[axis];
                    index[axis] = self.index[axis] + offset as i64;
                    size[axis] = step[axis].min(self.size[axis] - offset);
                }
                Region { index, size }
            })
            .collect()
    }
}

impl<const D: usize> Default for Region<D> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const D: usize> fmt::Display for Region<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for axis in 0..D {
            if axis > 0 {
                write!(f, " x ")?;
            }
            write!(f, "{}..{}", self.index[axis], self.end(axis))?;
        }
        write!(f, "]")
    }
}

/// Iterator over the indices of a region, axis 0 fastest.
pub struct RegionIter<const D: usize> {
    region: Region<D>,
    current: [i64; D],
    remaining: u64,
}

impl<const D: usize> RegionIter<D> {
    fn new(region: Region<D>) -> Self {
        Self {
            region,
            current: region.index,
            remaining: region.number_of_pixels(),
        }
    }
}

impl<const D: usize> Iterator for RegionIter<D> {
    type Item = [i64; D];

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.current;
        self.remaining -= 1;

        for axis in 0..D {
            self.current[axis] += 1;
            if self.current[axis] < self.region.end(axis) {
                break;
            }
            self.current[axis] = self.region.index[axis];
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.remaining as usize;
        (remaining, Some(remaining))
    }
}

impl<const D: usize> ExactSizeIterator for RegionIter<D> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_intersect_disjoint_is_empty() {
        let a = Region::new([0, 0], [5, 5]);
        let b = Region::new([10, 0], [5, 5]);
        let c = a.intersect(&b);
        assert!(c.is_empty());
        assert_eq!(c.size(), [0, 5]);
    }

    #[test]
    fn test_pad_and_crop_at_border() {
        let largest = Region::from_size([10, 10]);
        let request = Region::new([0, 5], [5, 5]);
        let padded = request.pad(&Radius::uniform(1));
        assert_eq!(padded, Region::new([-1, 4], [7, 7]));
        let cropped = padded.crop(&largest);
        assert_eq!(cropped, Region::new([0, 4], [6, 6]));
        assert!(largest.contains(&cropped));
    }

    #[test]
    fn test_contains_index() {
        let r = Region::new([2, 3], [2, 2]);
        assert!(r.contains_index(&[2, 3]));
        assert!(r.contains_index(&[3, 4]));
        assert!(!r.contains_index(&[4, 4]));
        assert!(!r.contains_index(&[1, 3]));
    }

    #[test]
    fn test_iteration_order() {
        let r = Region::new([1, 1], [2, 2]);
        let indices: Vec<_> = r.iter().collect();
        assert_eq!(indices, vec![[1, 1], [2, 1], [1, 2], [2, 2]]);
        assert_eq!(r.linear_offset(&[2, 2]), 3);
    }

    #[test]
    fn test_split_slowest_uneven() {
        let r = Region::from_size([4, 10]);
        let slabs = r.split_slowest(3);
        let heights: Vec<_> = slabs.iter().map(|s| s.size()[1]).collect();
        assert_eq!(heights, vec![4, 3, 3]);
        assert_eq!(slabs[1].index(), [0, 4]);

        // More pieces than rows degrades to one row per slab.
        assert_eq!(r.split_slowest(37).len(), 10);
    }

    #[test]
    fn test_split_skips_unit_axes() {
        let r = Region::<3>::new([0, 0, 7], [6, 4, 1]);
        let slabs = r.split_slowest(2);
        assert_eq!(slabs.len(), 2);
        assert_eq!(slabs[0].size(), [6, 2, 1]);

        let single = Region::<2>::from_size([1, 1]);
        assert_eq!(single.split_slowest(8), vec![single]);
    }

    #[test]
    fn test_tiles_cover_region() {
        let r = Region::new([3, -2], [10, 10]);
        let tiles = r.tiles(&[7, 13]);
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0], Region::new([3, -2], [7, 10]));
        assert_eq!(tiles[1], Region::new([10, -2], [3, 10]));
        let total: u64 = tiles.iter().map(|t| t.number_of_pixels()).sum();
        assert_eq!(total, r.number_of_pixels());
    }

    #[test]
    fn test_window() {
        let w = Radius::<2>::new([1, 2]).window();
        assert_eq!(w, Region::new([-1, -2], [3, 5]));
    }

    fn region_strategy() -> impl Strategy<Value = Region<2>> {
        (
            prop::array::uniform2(-20i64..20),
            prop::array::uniform2(0u64..15),
        )
            .prop_map(|(index, size)| Region::new(index, size))
    }

    fn normalized(r: Region<2>) -> Option<Region<2>> {
        if r.is_empty() {
            None
        } else {
            Some(r)
        }
    }

    proptest! {
        #[test]
        fn prop_intersect_commutes(a in region_strategy(), b in region_strategy()) {
            prop_assert_eq!(a.intersect(&b), b.intersect(&a));
        }

        #[test]
        fn prop_intersect_associates(a in region_strategy(), b in region_strategy(), c in region_strategy()) {
            let left = a.intersect(&b.intersect(&c));
            let right = a.intersect(&b).intersect(&c);
            prop_assert_eq!(normalized(left), normalized(right));
        }

        #[test]
        fn prop_pad_composes(r in region_strategy(), k1 in 0u64..5, k2 in 0u64..5) {
            let twice = r.pad(&Radius::uniform(k1)).pad(&Radius::uniform(k2));
            prop_assert_eq!(twice, r.pad(&Radius::uniform(k1 + k2)));
            prop_assert!(r.pad(&Radius::uniform(k1)).contains(&r));
        }

        #[test]
        fn prop_crop_never_grows(r in region_strategy(), bounds in region_strategy()) {
            let cropped = r.crop(&bounds);
            prop_assert!(cropped.number_of_pixels() <= r.number_of_pixels());
            prop_assert!(r.contains(&cropped));
            prop_assert!(bounds.contains(&cropped));
        }

        #[test]
        fn prop_disjoint_is_empty(r in region_strategy(), gap in 0i64..5) {
            let shifted = Region::new([r.end(0) + gap, r.index()[1]], r.size());
            prop_assert!(r.intersect(&shifted).is_empty());
        }

        #[test]
        fn prop_slabs_partition(r in region_strategy(), pieces in 1usize..40) {
            let slabs = r.split_slowest(pieces);
            let total: u64 = slabs.iter().map(|s| s.number_of_pixels()).sum();
            prop_assert_eq!(total, r.number_of_pixels());
            prop_assert!(slabs.len() <= pieces.max(1));
            for pair in slabs.windows(2) {
                prop_assert!(pair[0].intersect(&pair[1]).is_empty());
            }
        }
    }
}
