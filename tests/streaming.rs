use rasterflow::prelude::*;
use std::collections::HashSet;

/// Records every piece region handed to the sink.
#[derive(Default)]
struct PieceLog {
    begun: Option<Region<2>>,
    pieces: Vec<Region<2>>,
    finished: bool,
}

impl RasterSink<2> for PieceLog {
    fn begin(&mut self, descriptor: &ImageDescriptor<2>) -> PipelineResult<()> {
        self.begun = Some(descriptor.requested_region());
        Ok(())
    }

    fn write(&mut self, piece: &Raster<2>) -> PipelineResult<()> {
        self.pieces.push(piece.region());
        Ok(())
    }

    fn finish(&mut self) -> PipelineResult<()> {
        self.finished = true;
        Ok(())
    }
}

fn gradient(width: u64, height: u64) -> (ProcessingGraph<2>, NodeId) {
    let mut graph = ProcessingGraph::new();
    let source = graph.add_filter(GeneratorSource::new(
        Region::from_size([width, height]),
        2,
        SampleType::F32,
        |&[x, y]| vec![x as f64, (x * y) as f64 * 0.5],
    ));
    let mean = graph.add_filter(MeanFilter::new(MeanFunctor::new(1)));
    graph.connect(source, 0, mean, 0).unwrap();
    (graph, mean)
}

fn covered(pieces: &[Region<2>]) -> (usize, HashSet<[i64; 2]>) {
    let mut seen = HashSet::new();
    let mut total = 0;
    for piece in pieces {
        for index in piece.iter() {
            seen.insert(index);
            total += 1;
        }
    }
    (total, seen)
}

#[test]
fn pieces_partition_the_requested_area() {
    let (graph, target) = gradient(33, 21);
    let engine = ExecutionEngine::new();
    let area = Region::new([4, 3], [25, 16]);

    for strategy in [
        StreamingStrategy::NumberOfDivisionsStripped(4),
        StreamingStrategy::NumberOfDivisionsTiled(6),
        StreamingStrategy::NumberOfLinesStripped(5),
        StreamingStrategy::TileDimensionTiled(7),
        StreamingStrategy::TileSize(vec![0, 3]),
    ] {
        let manager = StreamingManager::new(strategy.clone()).unwrap();
        let mut log = PieceLog::default();
        StreamingDriver::new(&engine, manager)
            .stream(&graph, target, 0, &mut log, Some(area))
            .unwrap();

        assert_eq!(log.begun, Some(area));
        assert!(log.finished);
        let (total, seen) = covered(&log.pieces);
        assert_eq!(total as u64, area.number_of_pixels(), "{:?} overlaps", strategy);
        assert_eq!(seen.len() as u64, area.number_of_pixels(), "{:?} misses pixels", strategy);
        assert!(log.pieces.iter().all(|piece| area.contains(piece)));
    }
}

#[test]
fn ram_driven_pieces_fit_the_budget() {
    let (graph, target) = gradient(512, 512);
    let engine = ExecutionEngine::new();
    let manager = StreamingManager::new(StreamingStrategy::RamDriven {
        available_ram_mb: 1,
        bias: 1.0,
    })
    .unwrap();
    let driver = StreamingDriver::new(&engine, manager);

    let divisions = driver.plan(&graph, target, 0, None).unwrap();
    assert!(divisions.len() > 1);
    // Two nodes, each holding two f64 samples per pixel.
    assert!(divisions
        .iter()
        .all(|piece| piece.number_of_pixels() * 32 <= 1024 * 1024));
}

#[test]
fn streamed_statistics_match_single_update() {
    let (mut graph, _) = gradient(30, 20);
    let source = graph.get_source_nodes()[0];
    let filter = StatisticsFilter::new();
    let handle = filter.handle();
    let stats = graph.add_filter(filter);
    graph.connect(source, 0, stats, 0).unwrap();

    let engine = ExecutionEngine::with_options(ExecutionOptions::new().with_threads(3));
    engine.update(&graph, stats).unwrap();
    let whole = handle.statistics();
    handle.reset();

    let manager = StreamingManager::new(StreamingStrategy::TileDimensionTiled(8)).unwrap();
    StreamingDriver::new(&engine, manager)
        .stream(&graph, stats, 0, &mut PieceLog::default(), None)
        .unwrap();
    let streamed = handle.statistics();

    assert_eq!(whole.len(), 2);
    for (a, b) in whole.iter().zip(&streamed) {
        assert_eq!(a.count, b.count);
        assert_eq!(a.min, b.min);
        assert_eq!(a.max, b.max);
        assert!((a.sum - b.sum).abs() < 1e-9);
    }
}

#[test]
fn area_outside_is_rejected() {
    let (graph, target) = gradient(8, 8);
    let engine = ExecutionEngine::new();
    let manager = StreamingManager::new(StreamingStrategy::default()).unwrap();
    let result = StreamingDriver::new(&engine, manager).stream_to_raster(
        &graph,
        target,
        0,
        Some(Region::new([30, 30], [2, 2])),
    );
    assert!(matches!(result, Err(PipelineError::OutOfBoundsRequest { .. })));
}
