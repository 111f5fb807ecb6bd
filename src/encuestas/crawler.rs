use super::comments::{emit_placeholder, CommentRevealer, RowContext, RowOutcome};
use super::extract::{
    discover_page_count, extract_subject_detail, extract_subjects, has_listing, PageCount,
};
use super::{Site, Subject};
use crate::dedup::Deduplicator;
use crate::navigator::NavigatorPool;
use crate::politeness::{Pause, Politeness};
use crate::{CrawlerError, Fault, Navigator, NavigatorFactory, RecordSink};
use scraper::Html;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub site: Site,
    pub workers: usize,
    /// Pages visited when the listing does not reveal its page count.
    pub page_cap: usize,
    pub listing_timeout: Duration,
    pub reveal_timeout: Duration,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        CrawlSettings {
            site: Site::default(),
            workers: 1,
            page_cap: 1000,
            listing_timeout: Duration::from_secs(10),
            reveal_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default)]
struct Stats {
    pages_visited: AtomicUsize,
    page_faults: AtomicUsize,
    subjects_found: AtomicUsize,
    subjects_processed: AtomicUsize,
    subject_faults: AtomicUsize,
    rows_processed: AtomicUsize,
    row_faults: AtomicUsize,
    records_written: AtomicUsize,
    duplicates: AtomicUsize,
}

impl Stats {
    fn add(counter: &AtomicUsize, n: usize) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub page_count: Option<usize>,
    pub pages_visited: usize,
    pub page_faults: usize,
    pub subjects_found: usize,
    pub subjects_processed: usize,
    pub subject_faults: usize,
    pub rows_processed: usize,
    pub row_faults: usize,
    pub records_written: usize,
    pub duplicates: usize,
    pub politeness: Duration,
    pub cancelled: bool,
}

/// Outcome of a run. `summary` is filled in even when a fatal error stopped it.
#[derive(Debug)]
pub struct CrawlReport {
    pub summary: CrawlSummary,
    pub fatal: Option<CrawlerError>,
}

impl CrawlReport {
    pub fn into_result(self) -> Result<CrawlSummary, CrawlerError> {
        match self.fatal {
            Some(e) => Err(e),
            None => Ok(self.summary),
        }
    }
}

struct Shared<F: NavigatorFactory, S> {
    settings: CrawlSettings,
    pool: NavigatorPool<F>,
    dedup: Arc<Deduplicator<S>>,
    politeness: Arc<Politeness>,
    stats: Stats,
    cancel: CancellationToken,
}

/// Walks listing pages, dispatches subjects to a bounded set of workers and
/// persists every term row of each subject in document order.
pub struct Crawler<F: NavigatorFactory, S> {
    shared: Arc<Shared<F, S>>,
    shutdown: CancellationToken,
}

impl<F, S> Crawler<F, S>
where
    F: NavigatorFactory + 'static,
    S: RecordSink + 'static,
{
    pub fn new(
        settings: CrawlSettings,
        factory: F,
        dedup: Arc<Deduplicator<S>>,
        politeness: Arc<Politeness>,
        shutdown: CancellationToken,
    ) -> Self {
        let cancel = shutdown.child_token();
        Crawler {
            shared: Arc::new(Shared {
                settings,
                pool: NavigatorPool::new(factory),
                dedup,
                politeness,
                stats: Stats::default(),
                cancel,
            }),
            shutdown,
        }
    }

    pub async fn run(self) -> CrawlReport {
        let shared = self.shared;
        let workers = shared.settings.workers.max(1);

        // Without a first session nothing can be crawled.
        let mut listing_nav = match shared.pool.checkout().await {
            Ok(nav) => nav,
            Err(e) => {
                error!("Could not open a navigator session: {}", e);
                return CrawlReport {
                    summary: summarize(&*shared, None, self.shutdown.is_cancelled()),
                    fatal: Some(e.into()),
                };
            }
        };

        let (tx, rx) = mpsc::channel::<Subject>(workers);
        let rx = Arc::new(Mutex::new(rx));
        let mut tasks = JoinSet::new();
        for id in 0..workers {
            let shared = Arc::clone(&shared);
            let rx = Arc::clone(&rx);
            tasks.spawn(
                worker(shared, rx).instrument(tracing::info_span!("worker", worker = id)),
            );
        }
        drop(rx);

        let page_count = walk_listing(&*shared, &mut listing_nav, tx).await;
        if let Err(e) = listing_nav.close().await {
            warn!("Failed to close listing navigator: {}", e);
        }

        let mut fatal = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Worker stopped: {}", e);
                    fatal.get_or_insert(e);
                }
                Err(e) => error!("Worker panicked: {}", e),
            }
        }
        shared.pool.close_all().await;

        CrawlReport {
            summary: summarize(&*shared, page_count, self.shutdown.is_cancelled()),
            fatal,
        }
    }
}

fn summarize<F: NavigatorFactory, S>(
    shared: &Shared<F, S>,
    page_count: Option<usize>,
    cancelled: bool,
) -> CrawlSummary {
    let stats = &shared.stats;
    let load = |counter: &AtomicUsize| counter.load(Ordering::Relaxed);
    CrawlSummary {
        page_count,
        pages_visited: load(&stats.pages_visited),
        page_faults: load(&stats.page_faults),
        subjects_found: load(&stats.subjects_found),
        subjects_processed: load(&stats.subjects_processed),
        subject_faults: load(&stats.subject_faults),
        rows_processed: load(&stats.rows_processed),
        row_faults: load(&stats.row_faults),
        records_written: load(&stats.records_written),
        duplicates: load(&stats.duplicates),
        politeness: shared.politeness.total(),
        cancelled,
    }
}

/// Feeds subjects of every listing page to the workers. Returns the
/// discovered page count, if any.
async fn walk_listing<F, S>(
    shared: &Shared<F, S>,
    nav: &mut F::Navigator,
    tx: mpsc::Sender<Subject>,
) -> Option<usize>
where
    F: NavigatorFactory,
    S: RecordSink,
{
    let settings = &shared.settings;
    let site = &settings.site;

    let page_count = discover(shared, nav).await;
    let total = page_count.limit(settings.page_cap);
    match page_count {
        PageCount::Known(n) => info!("Listing has {} pages", n),
        PageCount::Unknown => warn!(
            "Could not determine the number of pages, exploring up to {}",
            total
        ),
    }

    for page in 0..total {
        if shared.cancel.is_cancelled() {
            info!("Stopping listing walk at page {}", page);
            break;
        }
        let url = site.page_url(page);
        info!(page, "Processing listing page {} of {}: {}", page + 1, total, url);
        Stats::add(&shared.stats.pages_visited, 1);

        let subjects = match read_listing(shared, nav, &url).await {
            Ok(subjects) => subjects,
            Err(fault) => {
                Stats::add(&shared.stats.page_faults, 1);
                warn!(page, kind = fault.kind(), "Skipping listing page: {}", fault);
                continue;
            }
        };
        info!(page, "Found {} subjects", subjects.len());
        Stats::add(&shared.stats.subjects_found, subjects.len());

        for subject in subjects {
            tokio::select! {
                _ = shared.cancel.cancelled() => break,
                sent = tx.send(subject) => {
                    if sent.is_err() {
                        warn!("All workers stopped, ending listing walk");
                        return page_count.known();
                    }
                }
            }
        }
    }
    info!("All listing pages processed");
    page_count.known()
}

/// Page count from the unaddressed listing; lookup failures degrade to unknown.
async fn discover<F, S>(shared: &Shared<F, S>, nav: &mut F::Navigator) -> PageCount
where
    F: NavigatorFactory,
    S: RecordSink,
{
    let settings = &shared.settings;
    shared.politeness.throttle().await;
    let html = match nav.load(settings.site.listing_url().as_str()).await {
        Ok(()) => {
            if let Err(e) = nav.wait_until(has_listing, settings.listing_timeout).await {
                debug!("Subject list did not appear before page count lookup: {}", e);
            }
            nav.snapshot().await
        }
        Err(e) => Err(e),
    };
    match html {
        Ok(html) => {
            let doc = Html::parse_document(&html);
            discover_page_count(&doc, settings.site.list_name())
        }
        Err(e) => {
            warn!("Page count lookup failed: {}", e);
            PageCount::Unknown
        }
    }
}

async fn read_listing<F, S>(
    shared: &Shared<F, S>,
    nav: &mut F::Navigator,
    url: &str,
) -> Result<Vec<Subject>, Fault>
where
    F: NavigatorFactory,
    S: RecordSink,
{
    let settings = &shared.settings;
    shared.politeness.throttle().await;
    nav.load(url).await?;
    shared.politeness.pause(Pause::Listing).await;
    if let Err(e) = nav.wait_until(has_listing, settings.listing_timeout).await {
        warn!("Subject list did not appear: {}", e);
    }
    let html = nav.snapshot().await?;
    let doc = Html::parse_document(&html);
    extract_subjects(&doc, &settings.site)
}

async fn worker<F, S>(
    shared: Arc<Shared<F, S>>,
    rx: Arc<Mutex<mpsc::Receiver<Subject>>>,
) -> Result<(), CrawlerError>
where
    F: NavigatorFactory,
    S: RecordSink,
{
    loop {
        let next = { rx.lock().await.recv().await };
        let Some(subject) = next else {
            break;
        };
        if shared.cancel.is_cancelled() {
            debug!("Shutdown requested, not dispatching {}", subject);
            continue;
        }

        let mut nav = match shared.pool.checkout().await {
            Ok(nav) => nav,
            Err(e) => {
                shared.cancel.cancel();
                return Err(e.into());
            }
        };
        let result = process_subject(&*shared, &mut nav, &subject).await;
        let healthy = !matches!(result, Err(Fault::Unexpected(_)));
        shared.pool.checkin(nav, healthy).await;

        match result {
            Ok(()) => Stats::add(&shared.stats.subjects_processed, 1),
            Err(fault) => {
                Stats::add(&shared.stats.subject_faults, 1);
                warn!(
                    subject = %subject.url,
                    kind = fault.kind(),
                    "Failed to process subject {:?}: {}",
                    subject.name,
                    fault
                );
            }
        }
        shared.politeness.pause(Pause::Subject).await;
    }
    Ok(())
}

async fn process_subject<F, S>(
    shared: &Shared<F, S>,
    nav: &mut F::Navigator,
    subject: &Subject,
) -> Result<(), Fault>
where
    F: NavigatorFactory,
    S: RecordSink,
{
    info!(subject = %subject.url, "Processing subject {:?}", subject.name);
    shared.politeness.throttle().await;
    nav.load(subject.url.as_str()).await?;
    let html = nav.snapshot().await?;
    let detail = {
        let doc = Html::parse_document(&html);
        extract_subject_detail(&doc, &shared.settings.site)
    };
    info!(
        subject = %subject.url,
        "Department {:?}, {} terms",
        detail.department.name,
        detail.rows.len()
    );

    let subject_id = subject.numeric_id();
    if subject_id.is_none() {
        warn!(subject = %subject.url, "Could not read subject id");
    }

    for row in &detail.rows {
        if shared.cancel.is_cancelled() {
            info!(subject = %subject.url, "Shutdown requested, leaving remaining terms");
            break;
        }
        let ctx = RowContext {
            subject,
            subject_id: subject_id.as_deref(),
            department: &detail.department,
            row,
        };
        debug!(
            row_id = row.row_id_or_empty(),
            "Term {:?}, {} comments reported",
            row.term_label,
            row.reported_comments
        );
        Stats::add(&shared.stats.rows_processed, 1);
        match process_row(shared, nav, ctx).await {
            Ok(outcome) => {
                Stats::add(&shared.stats.records_written, outcome.written);
                Stats::add(&shared.stats.duplicates, outcome.duplicates);
                info!(
                    row_id = row.row_id_or_empty(),
                    "{} records written, {} duplicates",
                    outcome.written,
                    outcome.duplicates
                );
            }
            Err(fault) => {
                Stats::add(&shared.stats.row_faults, 1);
                match &fault {
                    Fault::Consistency { reported, actual } => warn!(
                        row_id = row.row_id_or_empty(),
                        reported, actual, "Comment count mismatch, row abandoned"
                    ),
                    other => warn!(
                        row_id = row.row_id_or_empty(),
                        kind = other.kind(),
                        "Row abandoned: {}",
                        other
                    ),
                }
            }
        }
    }
    Ok(())
}

async fn process_row<F, S>(
    shared: &Shared<F, S>,
    nav: &mut F::Navigator,
    ctx: RowContext<'_>,
) -> Result<RowOutcome, Fault>
where
    F: NavigatorFactory,
    S: RecordSink,
{
    if ctx.row.reported_comments == 0 {
        return emit_placeholder(&*shared.dedup, ctx).await;
    }
    let mut revealer = CommentRevealer {
        nav,
        dedup: &*shared.dedup,
        politeness: &*shared.politeness,
        timeout: shared.settings.reveal_timeout,
    };
    let result = revealer.reveal(ctx).await;
    shared.politeness.pause(Pause::Row).await;
    result
}
