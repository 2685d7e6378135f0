use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scanflow", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render the output node of a graph as a PNG.
    Render(RenderArgs),
    /// Render a graph twice and print row cache statistics.
    Stats(StatsArgs),
}

#[derive(Parser, Debug)]
struct GraphArgs {
    /// Input graph JSON.
    #[arg(long)]
    graph: PathBuf,

    /// Viewport width in pixels.
    #[arg(long)]
    width: u32,

    /// Viewport height in pixels.
    #[arg(long)]
    height: u32,

    /// Frame time.
    #[arg(long, default_value_t = 0)]
    time: i64,

    /// Engine config JSON (cache budget, worker threads).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    #[command(flatten)]
    graph: GraphArgs,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct StatsArgs {
    #[command(flatten)]
    graph: GraphArgs,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Stats(args) => cmd_stats(args),
    }
}

fn load_engine(args: &GraphArgs) -> anyhow::Result<scanflow::Engine> {
    let config = match &args.config {
        Some(path) => scanflow::EngineConfig::load(path)
            .with_context(|| format!("load config '{}'", path.display()))?,
        None => scanflow::EngineConfig::default(),
    };
    let doc = scanflow::GraphDocument::load(&args.graph)
        .with_context(|| format!("load graph '{}'", args.graph.display()))?;

    let mut engine = scanflow::Engine::new(config)?;
    let built = doc.build(engine.dag_mut()).context("build graph")?;
    engine.set_output(built.output)?;
    Ok(engine)
}

fn viewport(args: &GraphArgs) -> anyhow::Result<scanflow::Region> {
    if args.width == 0 || args.height == 0 {
        anyhow::bail!("--width and --height must be > 0");
    }
    Ok(scanflow::Region::with_size(args.width, args.height))
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut engine = load_engine(&args.graph)?;
    let region = viewport(&args.graph)?;
    let out = engine.render(
        scanflow::FrameTime(args.graph.time),
        region,
        scanflow::ChannelSet::RGBA,
    )?;

    for failure in out.failures() {
        eprintln!("warning: {failure}");
    }
    write_png(&args.out, &out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_stats(args: StatsArgs) -> anyhow::Result<()> {
    let mut engine = load_engine(&args.graph)?;
    let region = viewport(&args.graph)?;
    let time = scanflow::FrameTime(args.graph.time);

    for pass in 1..=2 {
        let out = engine.render(time, region, scanflow::ChannelSet::RGBA)?;
        let s = out.stats;
        println!(
            "pass {pass}: nodes={} rows={} hits={} tasks={} failed={}",
            s.nodes_visited, s.rows_requested, s.rows_hit, s.tasks_scheduled, s.rows_failed
        );
    }

    let c = engine.cache().stats();
    println!(
        "cache: entries={} pinned={} bytes={} budget={}",
        c.entries,
        c.pinned_entries,
        c.bytes,
        engine.cache().budget()
    );
    println!(
        "cache: hits={} misses={} waits={} takeovers={} computations={} failures={} evictions={} over_budget={}",
        c.hits,
        c.misses,
        c.waits,
        c.takeovers,
        c.computations,
        c.failures,
        c.evictions,
        c.over_budget_events
    );
    Ok(())
}

fn write_png(path: &Path, out: &scanflow::RenderOutput) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    image::save_buffer_with_format(
        path,
        &out.to_rgba8(),
        out.width() as u32,
        out.height() as u32,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", path.display()))?;
    Ok(())
}
