use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use connpass_harvest::fetch::DEFAULT_USER_AGENT;
use connpass_harvest::runtime::{self, RunParams};

#[derive(Debug, Parser, Clone)]
#[command(
    name = "connpass-harvest",
    version,
    about = "Incrementally harvest connpass events into a markdown table"
)]
struct Cli {
    /// Event listing base URL of the connpass group
    #[arg(
        long,
        value_name = "URL",
        default_value = "https://iotlt.connpass.com/event/"
    )]
    listing_base: String,

    /// Oldest list page to start from (0 = auto-detect)
    #[arg(long, value_name = "N", default_value_t = 0)]
    start_page: u32,

    /// End page, inclusive. Defaults to the start page (or page 1 with --rebuild)
    #[arg(long, value_name = "N")]
    end_page: Option<u32>,

    /// Number of NEW events to append in incremental mode
    #[arg(long, value_name = "N", default_value_t = 5)]
    limit: usize,

    /// Output markdown table
    #[arg(short, long, value_name = "FILE", default_value = "data/events.md")]
    out: PathBuf,

    /// JSON cache for slide URL validation verdicts
    #[arg(
        long,
        value_name = "FILE",
        default_value = "data/slide_url_cache.json"
    )]
    slide_cache: PathBuf,

    /// Validate slide URLs by HTTP access (slow)
    #[arg(long, default_value_t = false)]
    validate_slides: bool,

    /// Offline mode: directory containing event_urls.txt and events/*.html
    #[arg(long, value_name = "DIR")]
    raw_dir: Option<PathBuf>,

    /// Politeness delay between requests
    #[arg(long, value_name = "MS", default_value_t = 0)]
    delay_ms: u64,

    /// Transport-level retries per request
    #[arg(long, value_name = "N", default_value_t = 3)]
    retries: usize,

    #[arg(long, value_name = "UA")]
    user_agent: Option<String>,

    /// Rebuild the table from scratch (overwrites --out)
    #[arg(long, default_value_t = false)]
    rebuild: bool,
}

impl Cli {
    fn into_params(self) -> RunParams {
        RunParams {
            listing_base: self.listing_base,
            start_page: self.start_page,
            end_page: self.end_page,
            limit: self.limit,
            out_path: self.out,
            cache_path: self.slide_cache,
            validate_slides: self.validate_slides,
            raw_dir: self.raw_dir,
            delay: Duration::from_millis(self.delay_ms),
            retries: self.retries,
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            rebuild: self.rebuild,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = runtime::run(cli.into_params()).await {
        error!("{err}");
        std::process::exit(1);
    }
}
