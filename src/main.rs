//! Rasterflow CLI - streamed raster processing from the command line.
//!
//! Verbosity follows `RUST_LOG`, e.g. `RUST_LOG=rasterflow=debug`.

use anyhow::{anyhow, bail, Context, Result};
use rasterflow::prelude::*;
use std::path::{Path, PathBuf};

/// Options shared by every command.
#[derive(Debug, Default)]
struct CommonOptions {
    threads: Option<usize>,
    tile: Option<[u64; 2]>,
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().map(String::as_str).unwrap_or("rasterflow");
    if args.len() < 2 {
        print_usage(program);
        return Ok(());
    }

    let (positional, options) = split_options(&args[2..])?;
    match args[1].as_str() {
        "list" => list_filters(),
        "info" => image_info(positional.first().ok_or_else(|| anyhow!("info needs <path>"))?),
        "mean" => {
            let [input, output] = take::<2>(&positional, "mean <in> <out>")?;
            let radius = flag_value(&args, "--radius")?.unwrap_or(1);
            run_mean(&options, input, output, radius)
        }
        "blend" => {
            let [first, second, output] = take::<3>(&positional, "blend <a> <b> <out>")?;
            let alpha = flag_value(&args, "--alpha")?.unwrap_or(0.5);
            run_blend(&options, first, second, output, alpha)
        }
        "stats" => {
            let [input] = take::<1>(&positional, "stats <in>")?;
            run_stats(&options, input)
        }
        "help" | "--help" | "-h" => {
            print_usage(program);
            Ok(())
        }
        other => {
            print_usage(program);
            bail!("unknown command '{}'", other)
        }
    }
}

fn print_usage(program: &str) {
    println!("Rasterflow v{}", rasterflow::VERSION);
    println!();
    println!("Usage: {} <command> [options]", program);
    println!();
    println!("Commands:");
    println!("  list                     List the built-in filters");
    println!("  info <path>              Show the header of an image file");
    println!("  mean <in> <out>          Neighborhood mean (--radius <r>, default 1)");
    println!("  blend <a> <b> <out>      Alpha blend of two images (--alpha <a>, default 0.5)");
    println!("  stats <in>               Per-band statistics as JSON");
    println!();
    println!("Options:");
    println!("  --threads <n>            Slabs per node (0 = all hardware threads)");
    println!("  --tile <WxH>             Stream in tiles of W by H pixels");
    println!("  --config <path>          TOML configuration file");
}

/// Separate positional arguments from the shared options.
///
/// Command-specific flags (`--radius`, `--alpha`) are skipped here with
/// their value and read by [`flag_value`].
fn split_options(args: &[String]) -> Result<(Vec<String>, CommonOptions)> {
    let mut positional = Vec::new();
    let mut options = CommonOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if !arg.starts_with("--") {
            positional.push(arg.clone());
            continue;
        }
        let value = iter
            .next()
            .ok_or_else(|| anyhow!("{} needs a value", arg))?;
        match arg.as_str() {
            "--threads" => options.threads = Some(value.parse().context("--threads")?),
            "--tile" => options.tile = Some(parse_dimensions(value)?),
            "--config" => options.config = Some(PathBuf::from(value)),
            "--radius" | "--alpha" => {}
            other => bail!("unknown option '{}'", other),
        }
    }
    Ok((positional, options))
}

fn flag_value<T: std::str::FromStr>(args: &[String], flag: &str) -> Result<Option<T>> {
    match args.iter().position(|a| a == flag) {
        Some(at) => {
            let raw = args.get(at + 1).ok_or_else(|| anyhow!("{} needs a value", flag))?;
            let value = raw
                .parse()
                .map_err(|_| anyhow!("invalid value '{}' for {}", raw, flag))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn take<'a, const N: usize>(positional: &'a [String], usage: &str) -> Result<[&'a Path; N]> {
    if positional.len() != N {
        bail!("usage: {}", usage);
    }
    let mut paths = [Path::new(""); N];
    for (slot, arg) in paths.iter_mut().zip(positional) {
        *slot = Path::new(arg);
    }
    Ok(paths)
}

fn parse_dimensions(text: &str) -> Result<[u64; 2]> {
    let (width, height) = text
        .split_once('x')
        .ok_or_else(|| anyhow!("expected WxH, got '{}'", text))?;
    Ok([width.parse()?, height.parse()?])
}

fn list_filters() -> Result<()> {
    let registry = FilterRegistry::<2>::with_builtins();
    println!("Available filters ({} total):", registry.len());
    for category in registry.categories() {
        println!();
        println!("  {}", category.display_name());
        for id in registry.filters_by_category(category) {
            if let Some(metadata) = registry.get_metadata(id) {
                println!("    {:<16} {}", metadata.id, metadata.description);
            }
        }
    }
    Ok(())
}

fn image_info(path: &str) -> Result<()> {
    let reader = ImageFileReader::open(path).with_context(|| format!("reading {}", path))?;
    println!("File: {}", reader.path().display());
    println!("Region: {}", reader.region());
    println!("Components: {}", reader.components());
    println!("Sample type: {}", reader.sample_type());
    Ok(())
}

/// Engine and streaming manager from the configuration and the options.
fn setup(options: &CommonOptions) -> Result<(ExecutionEngine<2>, StreamingManager)> {
    let mut config = PipelineConfig::resolve(options.config.as_deref())?;
    if let Some(threads) = options.threads {
        config.number_of_threads = threads;
    }
    if let Some(tile) = options.tile {
        config.streaming = Some(StreamingStrategy::TileSize(tile.to_vec()));
    }
    config.validate()?;

    let engine_options = ExecutionOptions::from_config(&config).with_progress(|update| {
        if let ProgressUpdate::StreamDivision { index, total, region } = update {
            log::info!("division {}/{}: {}", index + 1, total, region);
        }
    });
    let manager = StreamingManager::new(config.streaming_strategy())?;
    Ok((ExecutionEngine::with_options(engine_options), manager))
}

fn check(graph: &ProcessingGraph<2>) -> Result<()> {
    let report = ValidationPipeline::default().validate(graph);
    for warning in &report.warnings {
        log::warn!("{}", warning.message);
    }
    if let Some(error) = report.errors.into_iter().next() {
        return Err(error.into());
    }
    Ok(())
}

fn stream_to_file(
    options: &CommonOptions,
    graph: &ProcessingGraph<2>,
    target: NodeId,
    output: &Path,
) -> Result<()> {
    check(graph)?;
    let (engine, manager) = setup(options)?;
    let mut writer = ImageFileWriter::new(output);
    let stats = StreamingDriver::new(&engine, manager).stream(graph, target, 0, &mut writer, None)?;
    println!(
        "Wrote {} in {} divisions ({} pixels, {:?})",
        output.display(),
        stats.divisions,
        stats.pixels_processed,
        stats.total_duration
    );
    Ok(())
}

fn run_mean(options: &CommonOptions, input: &Path, output: &Path, radius: i64) -> Result<()> {
    let registry = FilterRegistry::<2>::with_builtins();
    let mut graph = ProcessingGraph::<2>::new();
    let reader = graph.add_filter(ImageFileReader::open(input)?);
    let mean = graph.add_boxed(registry.create_with("mean", &[("radius", Value::Integer(radius))])?);
    graph.connect(reader, 0, mean, 0)?;
    stream_to_file(options, &graph, mean, output)
}

fn run_blend(options: &CommonOptions, first: &Path, second: &Path, output: &Path, alpha: f64) -> Result<()> {
    let mut graph = ProcessingGraph::<2>::new();
    let a = graph.add_filter(ImageFileReader::open(first)?);
    let b = graph.add_filter(ImageFileReader::open(second)?);
    let blend = graph.add_filter(AlphaBlendFilter::new(AlphaBlendFunctor::new(alpha)));
    graph.connect(a, 0, blend, 0)?;
    graph.connect(b, 0, blend, 1)?;
    stream_to_file(options, &graph, blend, output)
}

/// Sink that drops every piece.
struct Discard;

impl RasterSink<2> for Discard {
    fn begin(&mut self, _descriptor: &ImageDescriptor<2>) -> PipelineResult<()> {
        Ok(())
    }

    fn write(&mut self, _piece: &Raster<2>) -> PipelineResult<()> {
        Ok(())
    }
}

fn run_stats(options: &CommonOptions, input: &Path) -> Result<()> {
    let mut graph = ProcessingGraph::<2>::new();
    let reader = graph.add_filter(ImageFileReader::open(input)?);
    let filter = StatisticsFilter::new();
    let handle = filter.handle();
    let stats = graph.add_filter(filter);
    graph.connect(reader, 0, stats, 0)?;
    check(&graph)?;

    let (engine, manager) = setup(options)?;
    StreamingDriver::new(&engine, manager).stream(&graph, stats, 0, &mut Discard, None)?;
    println!("{}", serde_json::to_string_pretty(&handle.statistics())?);
    Ok(())
}
