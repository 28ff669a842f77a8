use clap::{ArgAction, Parser};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use harvest_rs::core::config::{CrawlSettings, ExtractorSelection};
use harvest_rs::core::request::FetchMode;
use harvest_rs::crawler::{CrawlState, Crawler};
use harvest_rs::extractors::ExtractorRegistry;
use harvest_rs::fetcher::Fetcher;
use harvest_rs::frontier::MemoryFrontier;
use harvest_rs::output::{OutputFormat, OutputWriter};
use harvest_rs::settings::Settings;
use log::{error, info, warn};
use tokio::runtime::Runtime;

const EXIT_ABORTED: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_OUTPUT: i32 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "scraper",
    about = "A polite, depth-bounded web crawler with pluggable content extractors",
    version,
    long_about = None
)]
struct Cli {
    /// URL to start crawling from
    url: Option<String>,

    /// File with one URL per line; blank lines and `#` comments are skipped
    #[arg(long)]
    url_file: Option<PathBuf>,

    /// Maximum link depth to follow (0 fetches only the given URLs)
    #[arg(short, long)]
    depth: Option<usize>,

    /// Seconds between requests to the same host
    #[arg(long)]
    delay: Option<f64>,

    /// Extractor to use
    #[arg(long, value_parser = ["auto", "ecommerce", "news", "social"])]
    extractor: Option<String>,

    /// Run every extractor that matches a page
    #[arg(long, conflicts_with = "extractor")]
    extract_all: bool,

    /// Fetch pages with a headless browser
    #[arg(long)]
    browser: bool,

    /// Proxy URL; repeat to build a rotation pool
    #[arg(long = "proxy", action = ArgAction::Append)]
    proxies: Vec<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<f64>,

    /// Cache responses
    #[arg(long, overrides_with = "no_cache")]
    cache: bool,

    /// Do not cache responses
    #[arg(long, overrides_with = "cache")]
    no_cache: bool,

    /// Cache entry lifetime in seconds
    #[arg(long)]
    cache_ttl: Option<u64>,

    /// Output directory
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// Output format
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    /// User agent string
    #[arg(long)]
    user_agent: Option<String>,

    /// Extra request headers as a JSON object
    #[arg(long)]
    headers: Option<String>,

    /// Number of concurrent workers
    #[arg(long)]
    concurrency: Option<usize>,

    /// Stop after this many pages
    #[arg(long)]
    max_pages: Option<usize>,

    /// Fetch attempts per URL, the first included
    #[arg(long)]
    retries: Option<u32>,

    /// Only crawl these domains and their subdomains; repeatable
    #[arg(long = "allow-domain", action = ArgAction::Append)]
    allowed_domains: Vec<String>,

    /// Settings file (TOML, JSON or YAML); flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    process::exit(run(cli));
}

fn run(cli: Cli) -> i32 {
    let urls = match collect_urls(&cli) {
        Ok(urls) => urls,
        Err(message) => {
            eprintln!("Error: {}", message);
            return EXIT_USAGE;
        }
    };

    let settings = match build_settings(&cli) {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("Error: {}", message);
            return EXIT_USAGE;
        }
    };

    // Create a runtime for async operations
    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error creating runtime: {}", e);
            return EXIT_ABORTED;
        }
    };

    runtime.block_on(crawl(settings, urls, &cli.output, cli.format))
}

async fn crawl(settings: CrawlSettings, urls: Vec<String>, output: &Path, format: OutputFormat) -> i32 {
    let crawler = match build_crawler(settings).await {
        Ok(crawler) => crawler,
        Err(message) => {
            eprintln!("Error: {}", message);
            return EXIT_USAGE;
        }
    };

    let stop = crawler.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing pages in flight");
            stop.stop();
        }
    });

    let report = match crawler.run(urls).await {
        Ok(report) => report,
        Err(e) => {
            error!("Crawl failed: {}", e);
            return EXIT_ABORTED;
        }
    };

    info!("Crawl {}: {}", report.state, report.stats);

    let writer = OutputWriter::new(output, format);
    match writer.write(&report.records, &report.failures) {
        Ok(files) => {
            println!(
                "Saved {} records to {}",
                report.records.len(),
                files.records.display()
            );
            if let Some(failures) = files.failures {
                println!(
                    "Saved {} failed URLs to {}",
                    report.failures.len(),
                    failures.display()
                );
            }
        }
        Err(e) => {
            eprintln!("Error writing output: {}", e);
            return EXIT_OUTPUT;
        }
    }

    match report.state {
        CrawlState::Completed => 0,
        _ => {
            if let Some(reason) = &report.abort_reason {
                eprintln!("Crawl aborted: {}", reason);
            }
            EXIT_ABORTED
        }
    }
}

/// Seeds from the positional URL and the URL file, in that order
fn collect_urls(cli: &Cli) -> Result<Vec<String>, String> {
    let mut urls: Vec<String> = cli.url.iter().cloned().collect();

    if let Some(path) = &cli.url_file {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("cannot read URL file {}: {}", path.display(), e))?;
        urls.extend(parse_url_file(&contents));
    }

    if urls.is_empty() {
        return Err("no URLs given; pass a URL or --url-file".to_string());
    }
    Ok(urls)
}

fn parse_url_file(contents: &str) -> impl Iterator<Item = String> + '_ {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

/// Settings from the config file, if any, with the flags laid over them
fn build_settings(cli: &Cli) -> Result<CrawlSettings, String> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)
            .map_err(|e| format!("cannot load {}: {}", path.display(), e))?
            .into_crawl_settings(),
        None => CrawlSettings::default(),
    };

    if let Some(depth) = cli.depth {
        settings = settings.with_max_depth(depth);
    }
    if let Some(delay) = cli.delay {
        settings = settings.with_delay(seconds(delay, "--delay")?);
    }
    if let Some(timeout) = cli.timeout {
        settings = settings.with_timeout(seconds(timeout, "--timeout")?);
    }
    if cli.extract_all {
        settings = settings.with_extractor(ExtractorSelection::All);
    } else if let Some(name) = &cli.extractor {
        let selection = match name.as_str() {
            "auto" => ExtractorSelection::Auto,
            other => ExtractorSelection::Named(other.to_string()),
        };
        settings = settings.with_extractor(selection);
    }
    if cli.browser {
        settings.fetch_mode = FetchMode::Browser;
    }
    if !cli.proxies.is_empty() {
        settings.proxies = cli.proxies.clone();
    }
    if cli.cache {
        settings = settings.with_cache(true);
    }
    if cli.no_cache {
        settings = settings.with_cache(false);
    }
    if let Some(ttl) = cli.cache_ttl {
        settings.cache_ttl_secs = Some(ttl);
    }
    if settings.cache_enabled && settings.cache_dir.is_none() {
        settings.cache_dir = Some(cli.output.join(".cache"));
    }
    if let Some(user_agent) = &cli.user_agent {
        settings.user_agent = user_agent.clone();
    }
    if let Some(headers) = &cli.headers {
        let extra: HashMap<String, String> = serde_json::from_str(headers)
            .map_err(|e| format!("--headers must be a JSON object of strings: {}", e))?;
        settings.headers.extend(extra);
    }
    if let Some(concurrency) = cli.concurrency {
        settings = settings.with_concurrency(concurrency);
    }
    if let Some(max_pages) = cli.max_pages {
        settings.max_pages = Some(max_pages);
    }
    if let Some(retries) = cli.retries {
        settings.retry_budget = retries;
    }
    if !cli.allowed_domains.is_empty() {
        settings.allowed_domains = cli.allowed_domains.clone();
    }

    settings.validate().map_err(|e| e.to_string())?;
    Ok(settings)
}

fn seconds(value: f64, flag: &str) -> Result<Duration, String> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| format!("{} must be a non-negative number of seconds", flag))
}

async fn build_crawler(settings: CrawlSettings) -> Result<Crawler, String> {
    if settings.fetch_mode == FetchMode::Http {
        return Crawler::from_settings(settings).map_err(|e| e.to_string());
    }

    let registry = ExtractorRegistry::with_builtin();
    registry.validate(&settings.extractor).map_err(|e| e.to_string())?;
    let frontier = MemoryFrontier::from_settings(&settings).map_err(|e| e.to_string())?;
    let fetcher = Fetcher::from_settings(&settings).map_err(|e| e.to_string())?;
    let fetcher = with_browser(fetcher).await?;

    Ok(Crawler::new(
        Arc::new(settings),
        Arc::new(frontier),
        Arc::new(fetcher),
        Arc::new(registry),
    ))
}

#[cfg(feature = "browser")]
async fn with_browser(fetcher: Fetcher) -> Result<Fetcher, String> {
    let browser = harvest_rs::fetcher::BrowserTransport::launch()
        .await
        .map_err(|e| format!("cannot launch browser: {}", e))?;
    Ok(fetcher.with_browser(Arc::new(browser)))
}

#[cfg(not(feature = "browser"))]
async fn with_browser(_fetcher: Fetcher) -> Result<Fetcher, String> {
    Err("--browser needs a build with the `browser` feature".to_string())
}
