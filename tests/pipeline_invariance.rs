//! Pixel results must not depend on how a request is tiled or threaded.

use proptest::prelude::*;
use rasterflow::prelude::*;
use std::sync::atomic::Ordering;

fn ramp(width: u64, height: u64) -> RasterSource<2> {
    let region = Region::from_size([width, height]);
    let data = region
        .iter()
        .map(|[x, y]| ((x * 7 + y * 13) % 251) as f64)
        .collect();
    RasterSource::new(Raster::from_data(region, 1, SampleType::U8, data).unwrap())
}

/// Source -> mean(radius) -> shift_scale, returning the graph and target.
fn mean_chain(width: u64, height: u64, radius: u64, boundary: BoundaryPolicy) -> (ProcessingGraph<2>, NodeId) {
    let mut graph = ProcessingGraph::<2>::new();
    let source = graph.add_filter(ramp(width, height));
    let mean = graph.add_filter(MeanFilter::new(MeanFunctor::new(radius)).with_boundary(boundary));
    let scale = graph.add_filter(ShiftScaleFilter::new(ShiftScaleFunctor::new(1.0, 0.5)));
    graph.connect(source, 0, mean, 0).unwrap();
    graph.connect(mean, 0, scale, 0).unwrap();
    (graph, scale)
}

fn engine(threads: usize) -> ExecutionEngine<2> {
    ExecutionEngine::with_options(ExecutionOptions::new().with_threads(threads).with_cache(false))
}

fn streamed(graph: &ProcessingGraph<2>, target: NodeId, strategy: StreamingStrategy, threads: usize) -> Raster<2> {
    let engine = engine(threads);
    let manager = StreamingManager::new(strategy).unwrap();
    StreamingDriver::new(&engine, manager)
        .stream_to_raster(graph, target, 0, None)
        .unwrap()
}

#[test]
fn tiling_does_not_change_pixels() {
    for boundary in [BoundaryPolicy::Clip, BoundaryPolicy::Mirror, BoundaryPolicy::Constant(3.0)] {
        let (graph, target) = mean_chain(23, 29, 2, boundary);
        let whole = engine(1).update(&graph, target).unwrap();

        for tile in [vec![1, 1], vec![7, 13], vec![23, 29]] {
            let tiled = streamed(&graph, target, StreamingStrategy::TileSize(tile.clone()), 1);
            assert_eq!(&tiled, whole.as_ref(), "tile {:?} with {:?}", tile, boundary);
        }
    }
}

#[test]
fn thread_count_does_not_change_pixels() {
    let (graph, target) = mean_chain(40, 17, 1, BoundaryPolicy::Clip);
    let reference = engine(1).update(&graph, target).unwrap();
    for threads in [2, 8, 37] {
        let out = engine(threads).update(&graph, target).unwrap();
        assert_eq!(out.data(), reference.data(), "{} threads", threads);
    }
}

#[test]
fn edge_and_corner_requests_match_whole_image() {
    let (graph, target) = mean_chain(16, 12, 2, BoundaryPolicy::Clip);
    let whole = engine(4).update(&graph, target).unwrap();

    for request in [
        Region::new([0, 0], [1, 1]),
        Region::new([15, 11], [1, 1]),
        Region::new([0, 5], [16, 1]),
        Region::new([14, 0], [2, 12]),
    ] {
        let part = engine(3).update_region(&graph, target, request).unwrap();
        assert_eq!(part.region(), request);
        assert_eq!(*part, whole.extract(&request).unwrap());
    }
}

#[test]
fn request_outside_fails_without_touching_sources() {
    let mut graph = ProcessingGraph::<2>::new();
    let source = ramp(8, 8);
    let reads = source.read_counter();
    let source = graph.add_filter(source);
    let mean = graph.add_filter(MeanFilter::new(MeanFunctor::new(1)));
    graph.connect(source, 0, mean, 0).unwrap();

    let err = engine(2)
        .update_region(&graph, mean, Region::new([20, 20], [4, 4]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::OutOfBoundsRequest { .. }));
    assert_eq!(reads.load(Ordering::SeqCst), 0);
}

#[test]
fn repeated_updates_are_identical() {
    let (graph, target) = mean_chain(19, 11, 1, BoundaryPolicy::Mirror);
    let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_threads(4));
    let request = Region::new([3, 2], [9, 7]);
    let first = engine.update_region(&graph, target, request).unwrap();
    let second = engine.update_region(&graph, target, request).unwrap();
    assert_eq!(first.data(), second.data());
}

#[test]
fn mean_of_quadrants_matches_whole() {
    let region = Region::from_size([10, 10]);
    let data: Vec<f64> = region.iter().map(|[x, y]| (x + 10 * y) as f64).collect();
    let mut graph = ProcessingGraph::<2>::new();
    let source = graph.add_filter(RasterSource::new(
        Raster::from_data(region, 1, SampleType::U8, data).unwrap(),
    ));
    let mean = graph.add_filter(MeanFilter::new(MeanFunctor::new(1)));
    graph.connect(source, 0, mean, 0).unwrap();

    let whole = engine(1).update(&graph, mean).unwrap();
    let quadrants = streamed(&graph, mean, StreamingStrategy::TileSize(vec![5, 5]), 2);
    assert_eq!(&quadrants, whole.as_ref());

    // Interior pixel: the 3x3 mean of a linear ramp is the center value.
    assert_eq!(whole.get_component(&[5, 5], 0), Some(55.0));
    // Corner: mean of 0, 1, 10 and 11.
    assert_eq!(whole.get_component(&[0, 0], 0), Some(5.5));
}

#[test]
fn alpha_blend_of_constants() {
    let region = Region::from_size([9, 6]);
    let mut graph = ProcessingGraph::<2>::new();
    let a = graph.add_filter(ConstantSource::new(region, vec![100.0], SampleType::U8));
    let b = graph.add_filter(ConstantSource::new(region, vec![200.0], SampleType::U8));
    let blend = graph.add_filter(AlphaBlendFilter::new(AlphaBlendFunctor::new(0.25)));
    graph.connect(a, 0, blend, 0).unwrap();
    graph.connect(b, 0, blend, 1).unwrap();

    for threads in [1, 4] {
        let out = engine(threads).update(&graph, blend).unwrap();
        assert_eq!(out.sample_type(), SampleType::U8);
        assert!(out.data().iter().all(|&v| v == 125.0));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn any_tile_and_thread_count_matches(
        width in 1u64..24,
        height in 1u64..24,
        radius in 0u64..3,
        tile_w in 1u64..9,
        tile_h in 1u64..9,
        threads in 1usize..9,
    ) {
        let (graph, target) = mean_chain(width, height, radius, BoundaryPolicy::Clip);
        let whole = engine(1).update(&graph, target).unwrap();
        let tiled = streamed(&graph, target, StreamingStrategy::TileSize(vec![tile_w, tile_h]), threads);
        prop_assert_eq!(&tiled, whole.as_ref());
    }

    #[test]
    fn any_subregion_matches_whole(
        x in 0i64..20,
        y in 0i64..15,
        w in 1u64..8,
        h in 1u64..8,
    ) {
        let (graph, target) = mean_chain(20, 15, 1, BoundaryPolicy::Mirror);
        let whole = engine(2).update(&graph, target).unwrap();
        let request = Region::new([x, y], [w, h]).crop(&Region::from_size([20, 15]));
        let part = engine(5).update_region(&graph, target, request).unwrap();
        prop_assert_eq!(&*part, &whole.extract(&request).unwrap());
    }
}
