use crate::dedup::DedupPolicy;
use crate::encuestas::{CrawlSettings, Site, LISTING_PATH, LIST_NAME, URL_BASE};
use crate::politeness::{DelayPolicy, DelayRange};
use crate::CrawlerError;
use clap::{Parser, ValueEnum};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

/// Requests per minute applied when several workers share the remote site.
const DEFAULT_SHARED_RATE: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    Csv,
    Sqlite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NavigatorKind {
    Http,
    Webdriver,
}

/// Crawls the course survey site and appends its comments to a record store.
#[derive(Debug, Clone, Parser)]
#[command(version, about)]
pub struct Config {
    #[arg(long, env = "ENCUESTAS_BASE_URL", default_value = URL_BASE)]
    pub base_url: String,

    #[arg(long, env = "ENCUESTAS_LISTING_PATH", default_value = LISTING_PATH)]
    pub listing_path: String,

    /// Name used by the listing's page controls and fragments (`#l_<name>_<n>`).
    #[arg(long, env = "ENCUESTAS_LIST_NAME", default_value = LIST_NAME)]
    pub list_name: String,

    #[arg(long, env = "ENCUESTAS_OUTPUT", default_value = "resultados_encuestas.csv")]
    pub output: PathBuf,

    #[arg(long, env = "ENCUESTAS_STORE", value_enum, default_value_t = StoreKind::Csv)]
    pub store: StoreKind,

    #[arg(long, env = "ENCUESTAS_DEDUP", value_enum, default_value_t = DedupPolicy::AppendAlways)]
    pub dedup: DedupPolicy,

    #[arg(long, env = "ENCUESTAS_WORKERS", default_value_t = 1)]
    pub workers: usize,

    /// Pages explored when the page count cannot be read from the listing.
    #[arg(long, env = "ENCUESTAS_PAGE_CAP", default_value_t = 1000)]
    pub page_cap: usize,

    #[arg(long, env = "ENCUESTAS_REVEAL_TIMEOUT_SECS", default_value_t = 10)]
    pub reveal_timeout_secs: u64,

    #[arg(long, env = "ENCUESTAS_LISTING_TIMEOUT_SECS", default_value_t = 10)]
    pub listing_timeout_secs: u64,

    #[arg(long, env = "ENCUESTAS_PAGE_LOAD_TIMEOUT_SECS", default_value_t = 30)]
    pub page_load_timeout_secs: u64,

    /// Pause after loading a listing page, `MIN..MAX` milliseconds.
    #[arg(long, env = "ENCUESTAS_LISTING_DELAY", default_value = "2000..4000")]
    pub listing_delay: DelayRange,

    /// Pause after each subject, `MIN..MAX` milliseconds.
    #[arg(long, env = "ENCUESTAS_SUBJECT_DELAY", default_value = "2000..5000")]
    pub subject_delay: DelayRange,

    /// Pause after each row's comment cycle, `MIN..MAX` milliseconds.
    #[arg(long, env = "ENCUESTAS_ROW_DELAY", default_value = "1000..3000")]
    pub row_delay: DelayRange,

    /// Pause after a disclosure click and after its content appears.
    #[arg(long, env = "ENCUESTAS_SETTLE_DELAY", default_value = "1000..1000")]
    pub settle_delay: DelayRange,

    /// Cap on requests shared by all workers.
    #[arg(long, env = "ENCUESTAS_MAX_REQUESTS_PER_MINUTE")]
    pub max_requests_per_minute: Option<NonZeroU32>,

    #[arg(long, env = "ENCUESTAS_NAVIGATOR", value_enum, default_value_t = NavigatorKind::Webdriver)]
    pub navigator: NavigatorKind,

    #[arg(long, env = "ENCUESTAS_WEBDRIVER_URL", default_value = "http://localhost:9515")]
    pub webdriver_url: String,

    #[arg(long, env = "ENCUESTAS_HEADLESS", default_value_t = true, action = clap::ArgAction::Set)]
    pub headless: bool,
}

impl Config {
    pub fn site(&self) -> Result<Site, CrawlerError> {
        Site::new(&self.base_url, &self.listing_path, &self.list_name)
    }

    pub fn crawl_settings(&self) -> Result<CrawlSettings, CrawlerError> {
        Ok(CrawlSettings {
            site: self.site()?,
            workers: self.workers.max(1),
            page_cap: self.page_cap,
            listing_timeout: Duration::from_secs(self.listing_timeout_secs),
            reveal_timeout: Duration::from_secs(self.reveal_timeout_secs),
        })
    }

    pub fn delays(&self) -> DelayPolicy {
        DelayPolicy {
            listing: self.listing_delay,
            subject: self.subject_delay,
            row: self.row_delay,
            settle: self.settle_delay,
        }
    }

    /// The configured cap, or the default one when more than one worker runs.
    pub fn request_cap(&self) -> Option<NonZeroU32> {
        match self.max_requests_per_minute {
            Some(cap) => Some(cap),
            None if self.workers > 1 => NonZeroU32::new(DEFAULT_SHARED_RATE),
            None => None,
        }
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_the_fixed_entry_point() {
        let config = Config::try_parse_from(["encuestas-crawler"]).unwrap();
        assert_eq!(config.store, StoreKind::Csv);
        assert_eq!(config.dedup, DedupPolicy::AppendAlways);
        assert_eq!(config.output, PathBuf::from("resultados_encuestas.csv"));
        assert_eq!(config.delays().subject, DelayRange::new(2000, 5000));
        assert_eq!(config.delays().settle, DelayRange::fixed(1000));
        assert_eq!(config.request_cap(), None);
        assert_eq!(config.navigator, NavigatorKind::Webdriver);
        assert!(config.headless);

        let settings = config.crawl_settings().unwrap();
        assert_eq!(settings.page_cap, 1000);
        assert_eq!(settings.reveal_timeout, Duration::from_secs(10));
        assert_eq!(
            settings.site.page_url(1),
            "https://encuestas-finales.exactas.uba.ar/mates.html#l_mats_1"
        );
    }

    #[test]
    fn parallel_runs_get_a_shared_cap() {
        let config = Config::try_parse_from([
            "encuestas-crawler",
            "--workers",
            "4",
            "--store",
            "sqlite",
            "--dedup",
            "load-existing",
            "--row-delay",
            "0..0",
        ])
        .unwrap();
        assert_eq!(config.request_cap(), NonZeroU32::new(30));
        assert_eq!(config.store, StoreKind::Sqlite);
        assert_eq!(config.dedup, DedupPolicy::LoadExisting);
        assert_eq!(config.row_delay, DelayRange::ZERO);
    }

    #[test]
    fn http_navigation_is_opt_in() {
        let config =
            Config::try_parse_from(["encuestas-crawler", "--navigator", "http", "--headless", "false"])
                .unwrap();
        assert_eq!(config.navigator, NavigatorKind::Http);
        assert!(!config.headless);
    }
}
