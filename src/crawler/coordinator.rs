//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives every source of a run through its state machine:
//! - Fetching pages through the [`FetchRender`] capability
//! - Choosing a pattern (cached, predicted, or freshly detected)
//! - Extracting, filtering, deduplicating and storing listings
//! - Following pagination until a stopping rule fires
//! - Classifying and logging sources that could not be read
//! - Teaching the knowledge base which patterns worked

use crate::config::{Config, Source};
use crate::crawler::fetcher::{FetchError, FetchRender, HttpFetcher};
use crate::crawler::pagination::next_page_url;
use crate::crawler::scheduler::{DelayRange, Lanes};
use crate::extract::{self, tabular, ExtractedListing, NormalizedListing};
use crate::knowledge::{KnowledgeBase, SharedPatternStore};
use crate::output::{RunSummary, SourceOutcome, SourceReport, StopReason};
use crate::state::{
    classify, FailureRecord, FailureType, SourceState, RENDER_INSUFFICIENT_BYTES,
};
use crate::storage::{FailureLog, ListingSink, RunLog, RunStatus, SqliteStorage, StorageError};
use crate::url::domain_key;
use crate::{Result, SieveError};
use chrono::Utc;
use dashmap::DashSet;
use futures::stream::{self, StreamExt};
use scraper::Html;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Where the pattern used on a page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternOrigin {
    /// The domain's own record in the knowledge base
    Cached,
    /// Predicted from similar domains and confirmed on the page
    Predicted,
    /// Found by the detector
    Detected,
    /// The winning pattern of an earlier page of this source
    Reused,
}

impl PatternOrigin {
    fn is_fresh(self) -> bool {
        matches!(self, Self::Predicted | Self::Detected)
    }
}

/// Listings pulled from a page and the pattern that produced them
struct PageExtraction {
    signature: String,
    origin: PatternOrigin,
    listings: Vec<ExtractedListing>,
}

/// Everything the coordinator needs from one parsed page
///
/// Owned data only: the parsed document never outlives [`Coordinator::analyze_page`].
struct PageAnalysis {
    extraction: Option<PageExtraction>,
    next_page: Option<Url>,
    download: Option<Url>,
    prediction_used: bool,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Config,
    config_hash: String,
    storage: Arc<Mutex<SqliteStorage>>,
    knowledge: KnowledgeBase,
    fetcher: Arc<dyn FetchRender>,
    renderer: Arc<dyn FetchRender>,
    cancel: CancellationToken,
}

impl Coordinator {
    /// Creates a coordinator that stores results in the configured database
    ///
    /// # Arguments
    ///
    /// * `config` - The validated configuration
    /// * `config_hash` - Hash of the config file, stored on the run record
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Storage opened and HTTP client built
    /// * `Err(SieveError)` - Failed to initialize
    pub fn new(config: Config, config_hash: impl Into<String>) -> Result<Self> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        let fetcher: Arc<dyn FetchRender> = Arc::new(HttpFetcher::new(&config.http)?);
        Ok(Self::with_parts(config, config_hash, storage, fetcher))
    }

    /// Creates a coordinator from an already opened store and fetcher
    ///
    /// The fetcher also serves render-requiring sources until
    /// [`Coordinator::with_renderer`] installs a dedicated renderer.
    pub fn with_parts(
        config: Config,
        config_hash: impl Into<String>,
        storage: SqliteStorage,
        fetcher: Arc<dyn FetchRender>,
    ) -> Self {
        let storage = Arc::new(Mutex::new(storage));
        let store: SharedPatternStore = storage.clone();

        let knowledge = match KnowledgeBase::load(store.clone(), config.knowledge.clone()) {
            Ok(knowledge) => knowledge,
            Err(e) => {
                tracing::warn!("Could not load learned patterns, starting empty: {}", e);
                KnowledgeBase::new(store, config.knowledge.clone())
            }
        };

        Self {
            config,
            config_hash: config_hash.into(),
            storage,
            knowledge,
            renderer: fetcher.clone(),
            fetcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `renderer` for sources marked `render = true`
    pub fn with_renderer(mut self, renderer: Arc<dyn FetchRender>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Token that cancels the run when triggered
    ///
    /// Cancellation is observed between sources and between pages; in-flight
    /// fetches are abandoned.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    fn lock_storage(&self) -> Result<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|_| SieveError::StorageError(StorageError::LockPoisoned))
    }

    /// Crawls every configured source
    pub async fn run(&self) -> Result<RunSummary> {
        self.run_sources(&self.config.sources).await
    }

    /// Crawls `sources` as one run
    ///
    /// Plain sources go through a pool of `workers` concurrent crawls; render
    /// sources are crawled one at a time with a politeness delay between
    /// them. Both lanes run side by side. A failing source never aborts the
    /// run; only storage errors on the run record itself are returned.
    pub async fn run_sources(&self, sources: &[Source]) -> Result<RunSummary> {
        let started_at = Utc::now();
        let vertical = self.config.vertical.slug.clone();
        let run_id = self
            .lock_storage()?
            .create_run(&self.config_hash, &vertical)?;

        tracing::info!(
            "Starting run {} over {} source(s) for vertical '{}'",
            run_id,
            sources.len(),
            self.config.vertical.label()
        );

        let lanes = Lanes::split(sources);
        let seen: DashSet<String> = DashSet::new();
        let workers = self.config.crawler.workers.max(1) as usize;

        let simple_lane = stream::iter(lanes.simple.iter())
            .map(|source| self.crawl_source(source, run_id, self.fetcher.as_ref(), &seen))
            .buffer_unordered(workers)
            .collect::<Vec<_>>();

        let render_lane = async {
            let politeness = DelayRange::politeness(&self.config.crawler);
            let mut reports = Vec::with_capacity(lanes.rendered.len());
            for (index, source) in lanes.rendered.iter().enumerate() {
                if index > 0 {
                    politeness.pause(&self.cancel).await;
                }
                reports.push(
                    self.crawl_source(source, run_id, self.renderer.as_ref(), &seen)
                        .await,
                );
            }
            reports
        };

        let (simple_reports, render_reports) = tokio::join!(simple_lane, render_lane);

        let mut reports: Vec<SourceReport> =
            simple_reports.into_iter().chain(render_reports).collect();
        reports.sort_by_key(|r| {
            sources
                .iter()
                .position(|s| s.id == r.source_id)
                .unwrap_or(usize::MAX)
        });

        let status = if self.cancel.is_cancelled() {
            tracing::warn!("Run {} interrupted", run_id);
            RunStatus::Interrupted
        } else {
            RunStatus::Completed
        };
        self.lock_storage()?.finish_run(run_id, status)?;

        let summary = RunSummary::from_reports(run_id, &vertical, status, started_at, reports);
        tracing::info!(
            "Run {} finished: {} listing(s) from {}/{} source(s), {} failed",
            run_id,
            summary.listings,
            summary.sources_succeeded,
            summary.sources_attempted,
            summary.sources_failed
        );

        Ok(summary)
    }

    /// Crawls one source, turning unexpected errors into a failed report
    async fn crawl_source(
        &self,
        source: &Source,
        run_id: i64,
        fetcher: &dyn FetchRender,
        seen: &DashSet<String>,
    ) -> SourceReport {
        if self.cancel.is_cancelled() {
            tracing::debug!("Skipping {}: run cancelled", source.name);
            return SourceReport::new(&source.id, &source.name, &source.url);
        }

        tracing::info!("Crawling {} ({})", source.name, source.url);

        match self.crawl_pages(source, run_id, fetcher, seen).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Crawl of {} aborted: {}", source.name, e);
                let (kind, detail) = classify(&e.to_string(), None, None);
                self.record_failure(run_id, source, &source.url, kind, &detail, None);
                let mut report = SourceReport::new(&source.id, &source.name, &source.url);
                report.outcome = SourceOutcome::Failed(kind);
                report
            }
        }
    }

    /// Runs the per-source state machine
    ///
    /// `Init → Fetching → Extracting → (NextPage → Fetching …) | Stopped → Done`,
    /// or `Failed` when the first page cannot be read.
    async fn crawl_pages(
        &self,
        source: &Source,
        run_id: i64,
        fetcher: &dyn FetchRender,
        seen: &DashSet<String>,
    ) -> Result<SourceReport> {
        let crawler = &self.config.crawler;
        let page_delay = DelayRange::between_pages(crawler);
        let domain = domain_key(&source.url);

        let mut report = SourceReport::new(&source.id, &source.name, &source.url);
        let mut state = SourceState::Init;
        let mut current = Url::parse(&source.url)?;
        let mut visited: HashSet<String> = HashSet::new();
        let mut winning: Option<(String, PatternOrigin)> = None;
        let mut consecutive_empty = 0u32;

        loop {
            state = state.transition(SourceState::Fetching)?;
            report.pages += 1;
            let first_page = report.pages == 1;
            visited.insert(current.to_string());

            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => Err(FetchError::Cancelled),
                result = fetcher.fetch_render(&current) => result,
            };

            let snapshot = match fetched {
                Ok(snapshot) => snapshot,
                Err(FetchError::Cancelled) => {
                    state = state.transition(SourceState::Stopped)?;
                    report.stop_reason = Some(StopReason::Cancelled);
                    break;
                }
                Err(e) if first_page => {
                    state.transition(SourceState::Failed)?;
                    let status = e.http_status();
                    let (kind, detail) = classify(&e.to_string(), status, None);
                    self.record_failure(run_id, source, current.as_str(), kind, &detail, status);
                    report.outcome = SourceOutcome::Failed(kind);
                    return Ok(report);
                }
                Err(e) => {
                    tracing::warn!(
                        "Stopping {} at page {}: {}",
                        source.name,
                        report.pages,
                        e
                    );
                    state = state.transition(SourceState::Stopped)?;
                    report.stop_reason = Some(StopReason::FetchFailed);
                    break;
                }
            };

            state = state.transition(SourceState::Extracting)?;
            visited.insert(snapshot.final_url.to_string());

            let analysis = self.analyze_page(
                &snapshot.html,
                &snapshot.final_url,
                domain.as_deref(),
                first_page,
                winning.as_ref().map(|(signature, _)| signature.as_str()),
            );
            report.prediction_used |= analysis.prediction_used;

            if let Some(file_url) = &analysis.download {
                if let Some(listings) = self.download_listings(fetcher, file_url).await {
                    self.emit(source, run_id, listings, seen, &mut report);
                    state = state.transition(SourceState::Stopped)?;
                    report.stop_reason = Some(StopReason::TabularFile);
                    break;
                }
            }

            let Some(extraction) = analysis.extraction else {
                if first_page {
                    state.transition(SourceState::Failed)?;
                    // A near-empty body is a rendering problem, not a missing pattern
                    let error_text = if snapshot.html.len() < RENDER_INSUFFICIENT_BYTES {
                        "listings page returned almost no content"
                    } else {
                        "no pattern found on listings page"
                    };
                    let (kind, detail) =
                        classify(error_text, Some(snapshot.status), Some(&snapshot.html));
                    self.record_failure(
                        run_id,
                        source,
                        snapshot.final_url.as_str(),
                        kind,
                        &detail,
                        Some(snapshot.status),
                    );
                    report.outcome = SourceOutcome::Failed(kind);
                    return Ok(report);
                }

                tracing::info!("No pattern on page {} of {}", report.pages, source.name);
                state = state.transition(SourceState::Stopped)?;
                report.stop_reason = Some(StopReason::NoPattern);
                break;
            };

            if winning.is_none() {
                tracing::info!(
                    "{} pattern for {}: {}",
                    match extraction.origin {
                        PatternOrigin::Cached => "Cached",
                        PatternOrigin::Predicted => "Predicted",
                        PatternOrigin::Detected | PatternOrigin::Reused => "Detected",
                    },
                    source.name,
                    extraction.signature
                );
                report.pattern = Some(extraction.signature.clone());
                winning = Some((extraction.signature, extraction.origin));
            }

            let fresh = self.emit(source, run_id, extraction.listings, seen, &mut report);
            if fresh == 0 {
                consecutive_empty += 1;
            } else {
                consecutive_empty = 0;
            }
            tracing::debug!(
                "{} page {}: {} new listing(s)",
                source.name,
                report.pages,
                fresh
            );

            // First rule to fire wins
            let stop = if report.pages >= crawler.max_pages {
                Some(StopReason::PageCap)
            } else {
                match &analysis.next_page {
                    None => Some(StopReason::NoNextPage),
                    Some(next) if visited.contains(next.as_str()) => {
                        Some(StopReason::AlreadyVisited)
                    }
                    Some(_) if consecutive_empty >= crawler.consecutive_empty_limit => {
                        Some(StopReason::ConsecutiveEmpty)
                    }
                    Some(_) => None,
                }
            };

            if let Some(reason) = stop {
                state = state.transition(SourceState::Stopped)?;
                report.stop_reason = Some(reason);
                break;
            }

            state = state.transition(SourceState::NextPage)?;
            if !page_delay.pause(&self.cancel).await {
                state = state.transition(SourceState::Stopped)?;
                report.stop_reason = Some(StopReason::Cancelled);
                break;
            }

            if let Some(next) = analysis.next_page {
                current = next;
            }
        }

        state.transition(SourceState::Done)?;

        if let Some((signature, origin)) = &winning {
            if origin.is_fresh() && report.listings > 0 {
                report.pattern_learned = true;
                let listings = u32::try_from(report.listings).unwrap_or(u32::MAX);
                if let Err(e) = self
                    .knowledge
                    .record_success(&source.url, signature, listings)
                {
                    tracing::warn!("Failed to persist pattern for {}: {}", source.name, e);
                }
            }
        }

        report.outcome = if report.listings > 0 {
            SourceOutcome::Succeeded
        } else if report.stop_reason == Some(StopReason::Cancelled) && report.pages <= 1 {
            SourceOutcome::Skipped
        } else {
            SourceOutcome::Empty
        };

        tracing::info!(
            "{}: {} listing(s) over {} page(s), stopped: {}",
            source.name,
            report.listings,
            report.pages,
            report
                .stop_reason
                .map(|r| r.as_str())
                .unwrap_or("unknown")
        );

        Ok(report)
    }

    /// Parses a page and picks the pattern that yields listings
    ///
    /// A pattern reused from an earlier page is taken as is, even when it
    /// yields nothing new. On the first page the domain's cached pattern is
    /// tried first; if it matches nothing, detection runs and a predicted
    /// signature is promoted to the front of the candidates. The first of the
    /// top `candidate_patterns` candidates producing a listing wins.
    fn analyze_page(
        &self,
        html: &str,
        page_url: &Url,
        domain: Option<&str>,
        first_page: bool,
        reuse: Option<&str>,
    ) -> PageAnalysis {
        let document = Html::parse_document(html);
        let detector = &self.config.detector;

        let mut analysis = PageAnalysis {
            extraction: None,
            next_page: next_page_url(&document, page_url),
            download: if first_page {
                tabular::find_download_link(&document, page_url)
            } else {
                None
            },
            prediction_used: false,
        };

        let known = match reuse {
            Some(signature) => Some((signature.to_string(), PatternOrigin::Reused)),
            None if first_page => domain
                .and_then(|d| self.knowledge.get_pattern(d))
                .map(|record| (record.pattern_signature, PatternOrigin::Cached)),
            None => None,
        };

        if let Some((signature, origin)) = known {
            if let Some(pattern) = extract::select_by_signature(&document, &signature, detector) {
                let listings = extract::extract_all(pattern.elements, page_url);
                if origin == PatternOrigin::Reused || !listings.is_empty() {
                    analysis.extraction = Some(PageExtraction {
                        signature,
                        origin,
                        listings,
                    });
                    return analysis;
                }
            }
            tracing::debug!("Known pattern matched nothing on {}, detecting", page_url);
        }

        let detection = extract::find_patterns(&document, detector);
        let mut patterns = detection.patterns().to_vec();
        if patterns.is_empty() {
            return analysis;
        }

        let mut predicted = None;
        if first_page {
            if let Some(domain) = domain {
                predicted = self
                    .knowledge
                    .predict_pattern(domain, &detection.signatures());
            }
        }

        if let Some(signature) = &predicted {
            if let Some(position) = patterns.iter().position(|p| &p.signature == signature) {
                let pattern = patterns.remove(position);
                patterns.insert(0, pattern);
            }
            analysis.prediction_used = true;
            tracing::debug!("Promoted predicted pattern {} on {}", signature, page_url);
        }

        for pattern in patterns
            .into_iter()
            .take(self.config.crawler.candidate_patterns)
        {
            let listings = extract::extract_all(pattern.elements, page_url);
            if listings.is_empty() {
                continue;
            }

            let origin = if predicted.as_deref() == Some(pattern.signature.as_str()) {
                PatternOrigin::Predicted
            } else {
                PatternOrigin::Detected
            };
            analysis.extraction = Some(PageExtraction {
                signature: pattern.signature,
                origin,
                listings,
            });
            break;
        }

        analysis
    }

    /// Downloads and parses a linked CSV or spreadsheet file
    ///
    /// Returns `None` when the file cannot be fetched or parsed, or holds no
    /// business rows, so the caller falls back to the page itself.
    async fn download_listings(
        &self,
        fetcher: &dyn FetchRender,
        file_url: &Url,
    ) -> Option<Vec<ExtractedListing>> {
        tracing::info!("Downloading listing file {}", file_url);

        let downloaded = tokio::select! {
            _ = self.cancel.cancelled() => return None,
            result = fetcher.download_file(file_url) => result,
        };

        let bytes = match downloaded {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("Could not download {}: {}", file_url, e);
                return None;
            }
        };

        let Some(format) = tabular::FileFormat::from_url(file_url) else {
            return None;
        };
        let rows = match tabular::parse_file(format, &bytes) {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!("Could not parse {}: {}", file_url, e);
                return None;
            }
        };

        let listings = tabular::rows_to_listings(&rows, file_url);
        tracing::info!(
            "Parsed {} row(s) from {}, {} look like businesses",
            rows.len(),
            file_url,
            listings.len()
        );

        (!listings.is_empty()).then_some(listings)
    }

    /// Filters, deduplicates and stores listings
    ///
    /// An identifier is marked seen before the listing is written or counted,
    /// so concurrent sources never emit the same listing twice.
    ///
    /// # Returns
    ///
    /// Number of listings that were new to this run
    fn emit(
        &self,
        source: &Source,
        run_id: i64,
        listings: Vec<ExtractedListing>,
        seen: &DashSet<String>,
        report: &mut SourceReport,
    ) -> u64 {
        let vertical = &self.config.vertical;
        let mut fresh = 0;

        for listing in listings {
            if !vertical.matches(&listing) {
                report.filtered_out += 1;
                continue;
            }

            let normalized = NormalizedListing::new(listing, source, &vertical.slug, run_id);
            if !seen.insert(normalized.id.clone()) {
                continue;
            }

            let stored = self.lock_storage().and_then(|mut storage| {
                storage
                    .upsert_listing(&normalized)
                    .map_err(SieveError::from)
            });
            if let Err(e) = stored {
                tracing::warn!("Failed to store listing {}: {}", normalized.id, e);
            }

            fresh += 1;
            report.with_price += u64::from(normalized.listing.price.is_some());
            report.with_revenue += u64::from(normalized.listing.revenue.is_some());
            report.with_cash_flow += u64::from(normalized.listing.cash_flow.is_some());
        }

        report.listings += fresh;
        fresh
    }

    /// Logs a classified failure; a storage error is logged and dropped
    fn record_failure(
        &self,
        run_id: i64,
        source: &Source,
        url: &str,
        kind: FailureType,
        detail: &str,
        http_status: Option<u16>,
    ) {
        tracing::warn!("{} failed: {} ({})", source.name, kind, detail);

        let record = FailureRecord::new(&source.id, &source.name, url, kind, detail, http_status);
        let logged = self.lock_storage().and_then(|mut storage| {
            storage
                .record_failure(run_id, &record)
                .map_err(SieveError::from)
        });
        if let Err(e) = logged {
            tracing::warn!("Failed to log failure for {}: {}", source.name, e);
        }
    }
}
