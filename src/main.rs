use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use badmap::{
    BadRange, ConsoleReporter, DamageMap, FsLayout, InspectorSession, JsonReporter, WalkStats,
    Walker,
};

#[derive(Parser)]
#[command(name = "badmap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Locates files overlapping damaged byte ranges on ext2/3/4 devices")]
struct Cli {
    /// Block device or filesystem image to inspect
    device: PathBuf,

    /// GNU ddrescue mapfile to load damaged ranges from
    #[arg(short, long)]
    map: Option<PathBuf>,

    /// Extra damaged range, device-relative; repeatable
    #[arg(short, long = "bad", value_name = "START:LENGTH")]
    bad: Vec<String>,

    /// Emit findings as JSON lines instead of `BAD <path>` lines
    #[arg(long)]
    json: bool,

    /// Filesystem inspector binary to drive
    #[arg(long, default_value = "debugfs")]
    debugfs: String,

    /// Increase log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut damage = match &cli.map {
        Some(path) => DamageMap::from_mapfile(path)
            .with_context(|| format!("Failed to load mapfile {path:?}"))?,
        None => DamageMap::default(),
    };
    let literals = cli
        .bad
        .iter()
        .map(|s| BadRange::parse(s))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to parse --bad range")?;
    damage.extend(literals);

    if damage.is_empty() {
        bail!("No damaged ranges configured; pass --map and/or --bad");
    }
    info!(ranges = damage.len(), "damage map loaded");

    let session = InspectorSession::spawn(&cli.debugfs, &cli.device)
        .await
        .with_context(|| format!("Failed to start inspector {:?}", cli.debugfs))?;

    let layout = FsLayout::load(&session)
        .await
        .context("Failed to read the filesystem layout")?;
    info!(groups = layout.group_count(), "inode table layout parsed");

    let stats: WalkStats = if cli.json {
        let mut sink = JsonReporter;
        Walker::new(&session, &layout, &damage, &mut sink)
            .run()
            .await?
    } else {
        let mut sink = ConsoleReporter;
        Walker::new(&session, &layout, &damage, &mut sink)
            .run()
            .await?
    };

    session.close().await.context("Inspector shutdown failed")?;

    info!(
        directories = stats.directories,
        files = stats.files,
        findings = stats.findings,
        "walk complete"
    );
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    // Findings go to stdout; keep every log line on stderr.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
