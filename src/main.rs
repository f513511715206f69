//! CLI entry point for `eaxstag`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use eaxstag::eaxs::{tag_archive, PipelineDeps};
use eaxstag::html::DefaultHtmlConverter;
use eaxstag::nlp::{Annotator, CoreNlpClient};

#[derive(Parser)]
#[command(
    name = "eaxstag",
    version,
    about = "Tags an EAXS email archive with named entities from an NLP service"
)]
struct Cli {
    /// Source EAXS file
    #[arg(value_name = "EAXS")]
    eaxs: PathBuf,

    /// Destination file (defaults to <EAXS>__tagged.xml; must not exist)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Annotation service URL (overrides config)
    #[arg(long, value_name = "URL")]
    service_url: Option<String>,

    /// Maximum characters per annotation request (overrides config)
    #[arg(long, value_name = "CHARS")]
    chunk_size: Option<usize>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration and apply CLI overrides
    let mut config = eaxstag::config::load_config();
    if let Some(url) = cli.service_url {
        config.service.url = url;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.service.chunk_size = chunk_size;
    }

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let output = cli
        .output
        .unwrap_or_else(|| default_output_path(&cli.eaxs));

    let client = CoreNlpClient::new(&config.service)?;
    let annotator = Annotator::new(client, &config.service);
    let deps = PipelineDeps {
        annotator: &annotator,
        html: &DefaultHtmlConverter,
        charset: &config.output.charset,
    };

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Tagging [{bar:40.cyan/blue}] {pos}/{len} messages ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let stats = tag_archive(&cli.eaxs, &output, &deps, |done, total| {
        pb.set_length(total);
        pb.set_position(done);
    })?;
    pb.finish_and_clear();

    print_summary(&cli.eaxs, &output, &stats, start.elapsed());
    Ok(())
}

/// Derive the destination path: the source path with a `__tagged.xml` suffix
/// in place of its extension.
fn default_output_path(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "eaxs".to_string());
    source.with_file_name(format!("{stem}__tagged.xml"))
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &eaxstag::config::Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = eaxstag::config::log_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, "eaxstag.log");
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Print run statistics in a human-readable table.
fn print_summary(
    source: &Path,
    output: &Path,
    stats: &eaxstag::eaxs::TagRunStats,
    elapsed: std::time::Duration,
) {
    println!();
    println!("  {:<20} {}", "Source", source.display());
    println!("  {:<20} {}", "Messages", stats.total_messages);
    println!("  {:<20} {}", "Tagged", stats.tagged);
    println!("  {:<20} {}", "Restricted", stats.restricted);
    println!("  {:<20} {}", "Skipped (no text)", stats.skipped);
    println!("  {:<20} {}", "Failed", stats.failed.len());
    println!("  {:<20} {:.2?}", "Time", elapsed);
    println!("  {:<20} {}", "Output", output.display());

    if !stats.failed.is_empty() {
        println!();
        println!("  Messages left out of the tagged archive:");
        for id in &stats.failed {
            println!("    {id}");
        }
    }
    println!();
}
