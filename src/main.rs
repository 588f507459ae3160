use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use imgrab::acquisition::{AcquisitionOrchestrator, BrowserKind, ChromiumSession, HttpFetcher, LaunchOptions};
use imgrab::config::{
    self, AcquisitionConfig, AllowedFormats, DEFAULT_MAX_LIMIT, DEFAULT_OUTPUT_DIR, KeywordTarget,
    PageLayout, ScrollConfig,
};
use imgrab::core::image::ImageStats;
use imgrab::core::postprocess::{BatchReport, DedupReport};
use imgrab::core::{PostProcessOptions, PostProcessor};
use imgrab::logging::{DEFAULT_LOG_FILE, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "imgrab", version, about = "Bulk image downloader for search-result pages")]
struct Cli {
    /// Increase console verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// File every run is appended to
    #[arg(long, value_name = "FILE", default_value = DEFAULT_LOG_FILE, global = true)]
    log_file: PathBuf,

    /// Hide progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download images for one or more keywords
    Download(DownloadArgs),

    /// Remove undecodable files and duplicate images
    Dedup {
        /// Directory to clean
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// Only list what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Resize every image in place
    Resize {
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        #[arg(long, default_value_t = 200)]
        width: u32,
        #[arg(long, default_value_t = 200)]
        height: u32,
    },

    /// Convert every image to grayscale in place
    Grayscale {
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Print image count and mean dimensions
    Stats {
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Run several steps in order: dedup, resize, grayscale, stats
    Process {
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        #[arg(long)]
        dedup: bool,
        /// Target size as WIDTHxHEIGHT
        #[arg(long, value_name = "WxH", value_parser = parse_size)]
        resize: Option<(u32, u32)>,
        #[arg(long)]
        grayscale: bool,
        #[arg(long)]
        stats: bool,
    },
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Comma-separated keywords, e.g. "cat, red fox"
    #[arg(short, long, required_unless_present = "keyword_map")]
    keywords: Option<String>,

    /// JSON object of keyword -> number of images
    #[arg(long, value_name = "FILE", conflicts_with_all = ["keywords", "max_limit"])]
    keyword_map: Option<PathBuf>,

    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Images per keyword
    #[arg(short, long)]
    max_limit: Option<usize>,

    /// Allowed formats, comma-separated
    #[arg(long, value_delimiter = ',', default_values_t = config::DEFAULT_FORMATS.map(String::from))]
    formats: Vec<String>,

    /// Drop visually identical images while downloading
    #[arg(long)]
    remove_duplicates: bool,

    #[arg(long, value_enum, default_value = "chrome")]
    browser: BrowserKind,

    /// Browser executable, skipping discovery
    #[arg(long, value_name = "FILE")]
    browser_path: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    headed: bool,

    /// Seconds to wait for a page to settle
    #[arg(long, value_name = "SECS", default_value = "2.0", value_parser = parse_secs)]
    loading_timeout: Duration,

    /// Seconds allowed per image download
    #[arg(long, value_name = "SECS", default_value = "1.0", value_parser = parse_secs)]
    fetch_timeout: Duration,

    #[arg(long)]
    max_scrolls: Option<usize>,

    #[arg(long)]
    images_per_scroll: Option<usize>,

    #[arg(long)]
    scroll_similarity: Option<usize>,

    /// Quota above which "load more" is clicked
    #[arg(long)]
    load_more_threshold: Option<usize>,

    /// JSON page layout overriding the built-in one
    #[arg(long, value_name = "FILE")]
    layout: Option<PathBuf>,

    /// Also write the summary as JSON
    #[arg(long, value_name = "FILE")]
    summary_json: Option<PathBuf>,
}

impl DownloadArgs {
    fn targets(&self) -> Result<Vec<KeywordTarget>> {
        match (&self.keyword_map, &self.keywords) {
            (Some(path), _) => config::load_keyword_map(path)
                .with_context(|| format!("Failed to load keyword map {}", path.display())),
            (None, Some(keywords)) => Ok(config::parse_keywords(
                keywords,
                self.max_limit.unwrap_or(DEFAULT_MAX_LIMIT),
            )?),
            (None, None) => Err(config::ConfigError::NoKeywords.into()),
        }
    }

    fn acquisition_config(&self, show_progress: bool) -> Result<AcquisitionConfig> {
        let defaults = ScrollConfig::default();
        let scroll = ScrollConfig {
            max_iterations: self.max_scrolls.unwrap_or(defaults.max_iterations),
            per_scroll_yield: self.images_per_scroll.unwrap_or(defaults.per_scroll_yield),
            similarity_factor: self.scroll_similarity.unwrap_or(defaults.similarity_factor),
            large_result_threshold: self
                .load_more_threshold
                .unwrap_or(defaults.large_result_threshold),
            page_load_timeout: self.loading_timeout,
            ..defaults
        };
        let layout = match &self.layout {
            Some(path) => PageLayout::load(path)
                .with_context(|| format!("Failed to load layout {}", path.display()))?,
            None => PageLayout::default(),
        };

        Ok(AcquisitionConfig {
            output_dir: self.output_dir.clone(),
            allowed_formats: AllowedFormats::new(&self.formats),
            remove_duplicates: self.remove_duplicates,
            fetch_timeout: self.fetch_timeout,
            show_progress,
            scroll,
            layout,
        })
    }
}

fn parse_secs(raw: &str) -> Result<Duration, String> {
    let secs: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{e}"))
}

fn parse_size(raw: &str) -> Result<(u32, u32), String> {
    let (w, h) = raw
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{raw}'"))?;
    let width = w.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    Ok((width, height))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = LoggingConfig::new()
        .with_verbosity(cli.verbose)
        .with_log_file(Some(cli.log_file.clone()))
        .init()?;
    let show_progress = !cli.no_progress;

    match cli.command {
        Commands::Download(args) => download(&args, show_progress).await?,

        Commands::Dedup { path, dry_run } => {
            println!("▶ Removing duplicates in: {}", path.display());
            let processor = PostProcessor::new().with_progress(show_progress);
            let report = benchmark("duplicate removal", || processor.remove_duplicates(&path, dry_run))?;
            print_dedup(&report);
        }

        Commands::Resize { path, width, height } => {
            println!("▶ Resizing images in: {}", path.display());
            let processor = PostProcessor::new().with_progress(show_progress);
            let report = benchmark("resizing", || processor.resize(&path, width, height))?;
            print_batch("Resized", &report);
        }

        Commands::Grayscale { path } => {
            println!("▶ Grayscaling images in: {}", path.display());
            let processor = PostProcessor::new().with_progress(show_progress);
            let report = benchmark("grayscaling", || processor.grayscale(&path))?;
            print_batch("Converted", &report);
        }

        Commands::Stats { path } => {
            let processor = PostProcessor::new().with_progress(show_progress);
            let stats = processor.average_dimensions(&path)?;
            print_stats(&path, &stats);
        }

        Commands::Process {
            path,
            dedup,
            resize,
            grayscale,
            stats,
        } => {
            let options = PostProcessOptions {
                remove_duplicates: dedup,
                resize,
                grayscale,
                stats,
            };
            println!("▶ Processing images in: {}", path.display());
            let processor = PostProcessor::new().with_progress(show_progress);
            let report = benchmark("processing", || processor.compose(&path, &options))?;
            if let Some(dedup) = &report.dedup {
                print_dedup(dedup);
            }
            if let Some(resized) = &report.resize {
                print_batch("Resized", resized);
            }
            if let Some(gray) = &report.grayscale {
                print_batch("Converted", gray);
            }
            if let Some(stats) = &report.stats {
                print_stats(&path, stats);
            }
        }
    }

    Ok(())
}

async fn download(args: &DownloadArgs, show_progress: bool) -> Result<()> {
    let targets = args.targets()?;
    let config = args.acquisition_config(show_progress)?;

    let launch = LaunchOptions {
        kind: args.browser,
        executable: args.browser_path.clone(),
        headed: args.headed,
        ..LaunchOptions::default()
    };
    let session = ChromiumSession::launch(&launch)
        .await
        .context("Failed to start the browser")?;

    let fetcher = HttpFetcher::new()?;
    let orchestrator = AcquisitionOrchestrator::new(session, fetcher, config)?;
    let summary = orchestrator.run(&targets).await?;

    println!("{summary}");
    if let Some(path) = &args.summary_json {
        summary
            .write_json(path)
            .with_context(|| format!("Failed to write summary {}", path.display()))?;
        println!("✅ Summary written to {}", path.display());
    }
    Ok(())
}

fn print_dedup(report: &DedupReport) {
    let verb = if report.dry_run { "[dry-run] would remove" } else { "Removed" };
    for path in &report.removed_undecodable {
        println!("   🗑️  {} unreadable {}", verb, path.display());
    }
    for (i, group) in report.groups.iter().enumerate() {
        println!("\n✨ Group {} ({}):", i + 1, group.fingerprint);
        println!("   🏆 Keeping → {}", group.keep().display());
        for extra in group.extras() {
            println!("   🗑️  {} {}", verb, extra.display());
        }
    }
    println!(
        "\n✅ Scanned {} file(s), {} duplicate group(s), {} duplicate(s) and {} unreadable file(s) {}",
        report.scanned,
        report.groups.len(),
        report.removed_duplicates.len(),
        report.removed_undecodable.len(),
        if report.dry_run { "found" } else { "removed" }
    );
    if report.dry_run {
        println!("⚠️  Dry-run only; no files were changed.");
    }
}

fn print_batch(verb: &str, report: &BatchReport) {
    println!("✅ {} {} image(s)", verb, report.processed);
    for path in &report.skipped {
        println!("   ⚠️  Skipped {}", path.display());
    }
}

fn print_stats(dir: &Path, stats: &ImageStats) {
    println!("📊 {}", dir.display());
    println!("   Images: {}", stats.count);
    match (stats.mean_height, stats.mean_width) {
        (Some(height), Some(width)) => {
            println!("   Average height: {:.2}", height);
            println!("   Average width: {:.2}", width);
        }
        _ => println!("   No readable images."),
    }
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
