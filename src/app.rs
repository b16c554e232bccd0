use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ResolvedConfig;
use crate::corpus::{CorpusClient, SearchQuery};
use crate::domain::{DownloadTask, ResourceKind, ResourcePair};
use crate::error::PreseeaError;
use crate::extract;
use crate::integrity::{self, Integrity};
use crate::manifest;
use crate::pool::WorkerPool;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOptions {
    pub skip_manifest: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlSummary {
    pub country: String,
    pub workers: usize,
    pub pages: u32,
    pub rows: usize,
    pub skipped_rows: usize,
    pub pairs: usize,
    pub already_present: usize,
    pub corrupted: usize,
    pub crawl: BatchStats,
    pub reconciliation: BatchStats,
    pub manifest_rows: usize,
    pub flat_copies: usize,
    pub incomplete_pairs: usize,
    pub manifest_path: Option<String>,
    pub started_at: String,
    pub finished_at: String,
}

impl CrawlSummary {
    pub fn total_downloaded(&self) -> usize {
        self.crawl.downloaded + self.reconciliation.downloaded
    }

    pub fn total_failed(&self) -> usize {
        self.crawl.failed + self.reconciliation.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub queued: usize,
    pub downloaded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

/// Every pair seen during a run, in first-seen order. A later row with the
/// same local audio path replaces the earlier pair in place.
#[derive(Debug, Default)]
pub struct PairLedger {
    pairs: Vec<ResourcePair>,
    index: HashMap<Utf8PathBuf, usize>,
}

impl PairLedger {
    pub fn record(&mut self, pair: ResourcePair) {
        match self.index.get(&pair.audio_path) {
            Some(&slot) => {
                debug!(path = %pair.audio_path, "identifier seen again, keeping latest row");
                self.pairs[slot] = pair;
            }
            None => {
                self.index.insert(pair.audio_path.clone(), self.pairs.len());
                self.pairs.push(pair);
            }
        }
    }

    pub fn pairs(&self) -> &[ResourcePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Crawl,
    Reconciliation,
}

pub struct App<C: CorpusClient> {
    store: Store,
    client: C,
    pool: WorkerPool,
    query: SearchQuery,
    max_pages: Option<u32>,
}

impl<C: CorpusClient> App<C> {
    pub fn new(store: Store, client: C, config: &ResolvedConfig) -> Self {
        Self {
            store,
            client,
            pool: WorkerPool::new(config.concurrent),
            query: SearchQuery::new(config.country.clone()),
            max_pages: config.max_pages,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Runs the full pipeline: page traversal with per-page downloads, one
    /// reconciliation pass, then the manifest. Only page fetch failures and
    /// manifest I/O errors abort the run.
    pub fn crawl(
        &self,
        options: CrawlOptions,
        sink: &dyn ProgressSink,
    ) -> Result<CrawlSummary, PreseeaError> {
        let started = Instant::now();
        let mut summary = CrawlSummary {
            country: self.query.country().to_string(),
            workers: self.pool.size(),
            started_at: chrono::Utc::now().to_rfc3339(),
            ..CrawlSummary::default()
        };
        info!(
            country = %self.query.country(),
            workers = self.pool.size(),
            root = %self.store.root(),
            "starting crawl"
        );

        let mut ledger = PairLedger::default();
        self.traverse(&mut ledger, &mut summary, sink)?;
        summary.pairs = ledger.len();

        self.reconcile(&ledger, &mut summary, sink);

        if options.skip_manifest {
            emit(sink, "Skipping manifest".to_string());
        } else {
            let (_, report) = manifest::build(&self.store, ledger.pairs())?;
            summary.manifest_rows = report.rows;
            summary.flat_copies = report.copied;
            summary.incomplete_pairs = report.incomplete;
            summary.manifest_path = Some(self.store.manifest_path().to_string());
            sink.event(ProgressEvent {
                message: format!(
                    "Manifest written to {} ({} rows, {} incomplete pairs)",
                    self.store.manifest_path(),
                    report.rows,
                    report.incomplete
                ),
                elapsed: Some(started.elapsed()),
            });
        }

        summary.finished_at = chrono::Utc::now().to_rfc3339();
        Ok(summary)
    }

    fn traverse(
        &self,
        ledger: &mut PairLedger,
        summary: &mut CrawlSummary,
        sink: &dyn ProgressSink,
    ) -> Result<(), PreseeaError> {
        let mut page = 0u32;
        loop {
            let html = self.client.fetch_page(&self.query, page)?;
            summary.pages += 1;

            let scan = extract::scan_page(&html);
            summary.rows += scan.rows.len();
            summary.skipped_rows += scan.skipped;
            debug!(page, rows = scan.rows.len(), "scanned results page");

            let mut tasks = Vec::new();
            let mut seen = HashSet::new();
            for row in scan.rows {
                let pair = self.store.pair_for(row);
                if seen.insert(pair.audio_path.clone()) {
                    for kind in [ResourceKind::Audio, ResourceKind::Transcript] {
                        tasks.extend(self.plan(&pair, kind, summary, sink));
                    }
                }
                ledger.record(pair);
            }
            summary.crawl.merge(self.download_batch(tasks, Pass::Crawl, sink));

            if !scan.has_next {
                break;
            }
            if self.max_pages.is_some_and(|max| summary.pages >= max) {
                emit(sink, format!("Page limit reached after {} pages", summary.pages));
                break;
            }
            page += 1;
            emit(sink, format!("Moving to page {page}..."));
        }
        Ok(())
    }

    /// Decides whether a resource needs fetching. Audio must also pass the
    /// integrity probe; transcripts are trusted once present.
    fn plan(
        &self,
        pair: &ResourcePair,
        kind: ResourceKind,
        summary: &mut CrawlSummary,
        sink: &dyn ProgressSink,
    ) -> Option<DownloadTask> {
        let path = pair.local_path(kind);
        match integrity::check(path) {
            Integrity::Valid => {
                summary.already_present += 1;
                emit(sink, format!("Already exists, skipping: {path}"));
                return None;
            }
            Integrity::Corrupted => {
                summary.corrupted += 1;
                emit(sink, format!("Corrupted {kind}, re-downloading: {path}"));
            }
            Integrity::Missing => {}
        }
        let task = pair.task(kind);
        emit(sink, format!("Queueing: {} -> {}", task.remote, task.save_dir));
        Some(task)
    }

    /// One bounded retry for anything still absent or corrupted after the
    /// traversal.
    fn reconcile(&self, ledger: &PairLedger, summary: &mut CrawlSummary, sink: &dyn ProgressSink) {
        let tasks: Vec<DownloadTask> = ledger
            .pairs()
            .iter()
            .flat_map(|pair| {
                [ResourceKind::Audio, ResourceKind::Transcript]
                    .into_iter()
                    .filter(move |kind| !pair.is_usable(*kind))
                    .map(move |kind| pair.task(kind))
            })
            .collect();

        if tasks.is_empty() {
            emit(sink, "Reconciliation: all pairs complete".to_string());
            return;
        }
        emit(
            sink,
            format!("Reconciliation: retrying {} missing files", tasks.len()),
        );
        for task in &tasks {
            emit(sink, format!("Re-queueing: {} -> {}", task.remote, task.save_dir));
        }
        summary.reconciliation = self.download_batch(tasks, Pass::Reconciliation, sink);
        emit(
            sink,
            format!(
                "Reconciliation finished: {} recovered, {} still missing",
                summary.reconciliation.downloaded, summary.reconciliation.failed
            ),
        );
    }

    fn download_batch(
        &self,
        tasks: Vec<DownloadTask>,
        pass: Pass,
        sink: &dyn ProgressSink,
    ) -> BatchStats {
        let mut stats = BatchStats {
            queued: tasks.len(),
            ..BatchStats::default()
        };
        let client = &self.client;
        self.pool.run_batch(
            tasks,
            |task| client.download(&task.remote, &task.destination),
            |task, outcome| match outcome {
                Ok(bytes) => {
                    stats.downloaded += 1;
                    debug!(?pass, remote = %task.remote, bytes, "download finished");
                    emit(sink, format!("Saved as: {}", task.destination));
                }
                Err(err) => {
                    stats.failed += 1;
                    warn!(?pass, remote = %task.remote, %err, "download failed");
                    emit(sink, format!("Failed to download {}: {err}", task.remote));
                }
            },
        );
        stats
    }
}

impl BatchStats {
    fn merge(&mut self, other: BatchStats) {
        self.queued += other.queued;
        self.downloaded += other.downloaded;
        self.failed += other.failed;
    }
}
