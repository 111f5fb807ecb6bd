use clap::Parser;
use encuestas_crawler::config::{Config, NavigatorKind, StoreKind};
use encuestas_crawler::dedup::Deduplicator;
use encuestas_crawler::encuestas::{CrawlReport, CrawlSummary, Crawler, SqliteSink};
use encuestas_crawler::fmt_duration;
use encuestas_crawler::navigator::HttpFactory;
use encuestas_crawler::politeness::Politeness;
use encuestas_crawler::sink::CsvSink;
use encuestas_crawler::{CrawlerError, NavigatorFactory, RecordSink};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

async fn crawl<F, S>(
    config: &Config,
    factory: F,
    sink: S,
    shutdown: CancellationToken,
) -> Result<CrawlReport, CrawlerError>
where
    F: NavigatorFactory + 'static,
    S: RecordSink + 'static,
{
    let dedup = Arc::new(Deduplicator::with_policy(sink, config.dedup).await?);
    let politeness = Arc::new(Politeness::new(config.delays(), config.request_cap()));
    let crawler = Crawler::new(
        config.crawl_settings()?,
        factory,
        dedup,
        politeness,
        shutdown,
    );
    Ok(crawler.run().await)
}

async fn with_sink<F>(
    config: &Config,
    factory: F,
    shutdown: CancellationToken,
) -> Result<CrawlReport, CrawlerError>
where
    F: NavigatorFactory + 'static,
{
    match config.store {
        StoreKind::Csv => {
            let sink = CsvSink::open(&config.output)?;
            crawl(config, factory, sink, shutdown).await
        }
        StoreKind::Sqlite => {
            let sink = SqliteSink::new(&config.output).await?;
            crawl(config, factory, sink, shutdown).await
        }
    }
}

#[cfg(feature = "webdriver")]
async fn with_webdriver(
    config: &Config,
    shutdown: CancellationToken,
) -> Result<CrawlReport, Box<dyn std::error::Error>> {
    use encuestas_crawler::navigator::WebDriverFactory;

    let factory = WebDriverFactory {
        server_url: config.webdriver_url.clone(),
        headless: config.headless,
        page_load_timeout: config.page_load_timeout(),
    };
    Ok(with_sink(config, factory, shutdown).await?)
}

#[cfg(not(feature = "webdriver"))]
async fn with_webdriver(
    _config: &Config,
    _shutdown: CancellationToken,
) -> Result<CrawlReport, Box<dyn std::error::Error>> {
    Err("built without the `webdriver` feature; rebuild with --features webdriver".into())
}

fn log_summary(config: &Config, summary: &CrawlSummary) {
    if summary.cancelled {
        warn!("Crawl interrupted, partial results kept");
    }
    match summary.page_count {
        Some(n) => info!("Pages: {} visited of {}", summary.pages_visited, n),
        None => info!("Pages: {} visited, count unknown", summary.pages_visited),
    }
    info!(
        "Subjects: {} found, {} processed, {} failed",
        summary.subjects_found, summary.subjects_processed, summary.subject_faults
    );
    info!(
        "Terms: {} processed, {} abandoned",
        summary.rows_processed, summary.row_faults
    );
    info!(
        "Records: {} written, {} duplicates skipped, stored in {}",
        summary.records_written,
        summary.duplicates,
        config.output.display()
    );
    info!("Total politeness delay: {}", fmt_duration(summary.politeness));
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,encuestas_crawler=debug,html5ever=error,selectors=error,hyper=warn,reqwest=info,sqlx=warn".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let config = Config::parse();
    info!("Starting crawl of {}", config.base_url);

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current work");
            token.cancel();
        }
    });

    let report = match config.navigator {
        NavigatorKind::Http => {
            warn!("Plain HTTP navigation cannot reveal comments or follow listing fragments");
            let factory = HttpFactory {
                page_load_timeout: config.page_load_timeout(),
            };
            with_sink(&config, factory, shutdown).await?
        }
        NavigatorKind::Webdriver => with_webdriver(&config, shutdown).await?,
    };

    log_summary(&config, &report.summary);
    report.into_result()?;
    Ok(())
}
