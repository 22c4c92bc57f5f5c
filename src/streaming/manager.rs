//! Division of a region into streamed pieces.
//!
//! A streaming manager decides how many independent updates are needed to
//! produce a region, and which sub-region each one requests.

use crate::core::error::{PipelineError, PipelineResult};
use crate::core::region::Region;
use log::info;
use serde::{Deserialize, Serialize};

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// How a region is divided into streamed pieces.
///
/// In TOML the strategy is written as a tag plus a value:
///
/// ```toml
/// [streaming]
/// strategy = "number_of_lines_stripped"
/// value = 64
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "value", rename_all = "snake_case")]
pub enum StreamingStrategy {
    /// `n` near-equal strips along the slowest axis.
    NumberOfDivisionsStripped(usize),
    /// At most `n` tiles, splitting the longest axes first.
    NumberOfDivisionsTiled(usize),
    /// Strips of `lines` extent along the slowest axis.
    NumberOfLinesStripped(u64),
    /// Tiles of `dim` pixels along every axis.
    TileDimensionTiled(u64),
    /// Tiles of the given extent per axis (0 = whole axis).
    TileSize(Vec<u64>),
    /// Strips sized so one piece of the whole sub-pipeline fits in
    /// `available_ram_mb`, after multiplying the estimate by `bias`.
    RamDriven { available_ram_mb: u64, bias: f64 },
}

impl Default for StreamingStrategy {
    fn default() -> Self {
        StreamingStrategy::NumberOfDivisionsStripped(1)
    }
}

impl StreamingStrategy {
    /// Check the strategy's own parameters.
    pub fn validate(&self) -> PipelineResult<()> {
        match self {
            StreamingStrategy::NumberOfDivisionsStripped(0)
            | StreamingStrategy::NumberOfDivisionsTiled(0) => Err(PipelineError::configuration(
                "streaming",
                "number of divisions must be at least 1",
            )),
            StreamingStrategy::NumberOfLinesStripped(0) => Err(PipelineError::configuration(
                "streaming",
                "number of lines must be at least 1",
            )),
            StreamingStrategy::TileDimensionTiled(0) => Err(PipelineError::configuration(
                "streaming",
                "tile dimension must be at least 1",
            )),
            StreamingStrategy::RamDriven {
                available_ram_mb,
                bias,
            } => {
                if *available_ram_mb == 0 {
                    Err(PipelineError::configuration(
                        "streaming",
                        "available RAM must be at least 1 MB",
                    ))
                } else if !(bias.is_finite() && *bias > 0.0) {
                    Err(PipelineError::configuration(
                        "streaming",
                        format!("bias must be positive, got {}", bias),
                    ))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// Plans the pieces of a streamed update.
#[derive(Debug, Clone, Default)]
pub struct StreamingManager {
    strategy: StreamingStrategy,
}

impl StreamingManager {
    pub fn new(strategy: StreamingStrategy) -> PipelineResult<Self> {
        strategy.validate()?;
        Ok(Self { strategy })
    }

    pub fn strategy(&self) -> &StreamingStrategy {
        &self.strategy
    }

    /// Divide `region` into disjoint pieces covering it exactly.
    ///
    /// `bytes_per_pixel` is the memory one output pixel costs across the
    /// whole sub-pipeline; only the RAM-driven strategy uses it. The number
    /// of pieces may be lower than asked for when the region is small.
    pub fn divide<const D: usize>(
        &self,
        region: &Region<D>,
        bytes_per_pixel: usize,
    ) -> PipelineResult<Vec<Region<D>>> {
        if region.is_empty() {
            return Ok(Vec::new());
        }

        let pieces = match &self.strategy {
            StreamingStrategy::NumberOfDivisionsStripped(n) => region.split_slowest(*n),
            StreamingStrategy::NumberOfDivisionsTiled(n) => region.tiles(&tiled_extent(region, *n)),
            StreamingStrategy::NumberOfLinesStripped(lines) => {
                let mut tile = [0u64; D];
                if let Some(last) = tile.last_mut() {
                    *last = *lines;
                }
                region.tiles(&tile)
            }
            StreamingStrategy::TileDimensionTiled(dim) => region.tiles(&[*dim; D]),
            StreamingStrategy::TileSize(extent) => {
                let tile: [u64; D] = extent.as_slice().try_into().map_err(|_| {
                    PipelineError::configuration(
                        "streaming",
                        format!("tile size has {} axes, image has {}", extent.len(), D),
                    )
                })?;
                region.tiles(&tile)
            }
            StreamingStrategy::RamDriven {
                available_ram_mb,
                bias,
            } => {
                let footprint = region.number_of_pixels() as f64 * bytes_per_pixel as f64 * bias;
                let divisions = (footprint / (*available_ram_mb as f64 * MEGABYTE)).ceil().max(1.0);
                info!(
                    "Estimated pipeline footprint {:.1} MB for {}, {} MB available",
                    footprint / MEGABYTE,
                    region,
                    available_ram_mb
                );
                region.split_slowest(divisions as usize)
            }
        };

        info!(
            "Streaming {} in {} divisions ({:?})",
            region,
            pieces.len(),
            self.strategy
        );
        Ok(pieces)
    }
}

/// Tile extent giving at most `divisions` tiles, splitting whichever axis has
/// the longest pieces first.
fn tiled_extent<const D: usize>(region: &Region<D>, divisions: usize) -> [u64; D] {
    let size = region.size();
    let mut splits = [1u64; D];
    let mut total = 1u64;

    loop {
        let candidate = (0..D)
            .filter(|&axis| splits[axis] < size[axis])
            .max_by(|&a, &b| {
                let la = size[a] as f64 / splits[a] as f64;
                let lb = size[b] as f64 / splits[b] as f64;
                la.total_cmp(&lb).then(b.cmp(&a))
            });
        let Some(axis) = candidate else { break };
        let next = total / splits[axis] * (splits[axis] + 1);
        if next > divisions as u64 {
            break;
        }
        total = next;
        splits[axis] += 1;
    }

    let mut extent = [0u64; D];
    for axis in 0..D {
        extent[axis] = size[axis].div_ceil(splits[axis]);
    }
    extent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_exactly(region: &Region<2>, pieces: &[Region<2>]) -> bool {
        let total: u64 = pieces.iter().map(|p| p.number_of_pixels()).sum();
        total == region.number_of_pixels() && pieces.iter().all(|p| region.contains(p))
    }

    #[test]
    fn test_stripped_divisions() {
        let region = Region::new([2, 3], [10, 7]);
        let manager = StreamingManager::new(StreamingStrategy::NumberOfDivisionsStripped(3)).unwrap();
        let pieces = manager.divide(&region, 8).unwrap();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0], Region::new([2, 3], [10, 3]));
        assert!(covered_exactly(&region, &pieces));
    }

    #[test]
    fn test_lines_stripped() {
        let region = Region::from_size([5, 10]);
        let manager = StreamingManager::new(StreamingStrategy::NumberOfLinesStripped(4)).unwrap();
        let pieces = manager.divide(&region, 8).unwrap();
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[2], Region::new([0, 8], [5, 2]));
    }

    #[test]
    fn test_tiled_divisions_split_longest_axis() {
        let region = Region::from_size([100, 20]);
        let manager = StreamingManager::new(StreamingStrategy::NumberOfDivisionsTiled(4)).unwrap();
        let pieces = manager.divide(&region, 8).unwrap();
        assert_eq!(pieces.len(), 4);
        assert!(pieces.iter().all(|p| p.size() == [25, 20]));

        let manager = StreamingManager::new(StreamingStrategy::NumberOfDivisionsTiled(6)).unwrap();
        let pieces = manager.divide(&Region::from_size([30, 30]), 8).unwrap();
        assert!(pieces.len() <= 6);
        assert!(covered_exactly(&Region::from_size([30, 30]), &pieces));
    }

    #[test]
    fn test_tile_size_axes_must_match() {
        let manager = StreamingManager::new(StreamingStrategy::TileSize(vec![7, 13])).unwrap();
        let region = Region::from_size([20, 20]);
        let pieces = manager.divide(&region, 8).unwrap();
        assert_eq!(pieces.len(), 3 * 2);
        assert!(covered_exactly(&region, &pieces));

        let bad = StreamingManager::new(StreamingStrategy::TileSize(vec![7])).unwrap();
        assert!(matches!(
            bad.divide(&region, 8),
            Err(PipelineError::Configuration { .. })
        ));
    }

    #[test]
    fn test_ram_driven_divisions() {
        // 1024 x 1024 pixels x 8 bytes = 8 MB, 3 MB available -> 3 strips.
        let manager = StreamingManager::new(StreamingStrategy::RamDriven {
            available_ram_mb: 3,
            bias: 1.0,
        })
        .unwrap();
        let pieces = manager.divide(&Region::from_size([1024, 1024]), 8).unwrap();
        assert_eq!(pieces.len(), 3);

        let plenty = StreamingManager::new(StreamingStrategy::RamDriven {
            available_ram_mb: 64,
            bias: 2.0,
        })
        .unwrap();
        assert_eq!(plenty.divide(&Region::from_size([1024, 1024]), 8).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_strategies() {
        assert!(StreamingManager::new(StreamingStrategy::NumberOfDivisionsStripped(0)).is_err());
        assert!(StreamingManager::new(StreamingStrategy::TileDimensionTiled(0)).is_err());
        assert!(StreamingManager::new(StreamingStrategy::RamDriven {
            available_ram_mb: 1,
            bias: -1.0
        })
        .is_err());
    }

    #[test]
    fn test_strategy_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            streaming: StreamingStrategy,
        }
        let parsed: Wrapper = toml::from_str(
            "[streaming]\nstrategy = \"ram_driven\"\nvalue = { available_ram_mb = 128, bias = 1.5 }\n",
        )
        .unwrap();
        assert_eq!(
            parsed.streaming,
            StreamingStrategy::RamDriven {
                available_ram_mb: 128,
                bias: 1.5
            }
        );
    }
}
