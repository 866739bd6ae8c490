//! Core extraction driver
//!
//! [`TablePuller`] owns one run: it walks the upstream cursor page by page,
//! normalizes and accumulates records, and persists the result as chunked
//! CSV on every exit path — normal termination, fatal error, and external
//! interruption all flow through the writer before the report is returned.
//!
//! Execution is strictly sequential: fetch, normalize, accumulate, and the
//! inter-page wait happen one step at a time with no overlapping in-flight
//! requests, so pages enter the dataset in increasing offset order by
//! construction.

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, TimeoutPolicy};
use crate::dataset::Dataset;
use crate::error::{FetchError, Result};
use crate::fetch::{DiagnosticSink, PageData, PageFetcher};
use crate::flatten::flatten_page;
use crate::normalize::normalize_page;
use crate::pacer::Pacer;
use crate::types::{Cursor, Event, RunReport, TerminationReason};
use crate::writer::ChunkWriter;

/// Decide whether another page should be requested.
///
/// Continues while the page carried at least `page_size` records: a page
/// *larger* than requested still means more data upstream, so the
/// comparison is `>=` rather than `==` — exact-equality termination would
/// silently stop early if the upstream ever returned more records than
/// asked for. A short page signals the upstream cursor is exhausted.
#[must_use]
pub fn should_continue(records_returned: u64, page_size: u64) -> bool {
    records_returned >= page_size
}

/// Drives one complete extraction run.
///
/// Cloneable: all shared state is reference-counted, so a clone can be
/// moved into a task while the original keeps the cancellation handle.
#[derive(Clone)]
pub struct TablePuller {
    config: Arc<Config>,
    fetcher: PageFetcher,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl TablePuller {
    /// Create a puller from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when the configuration cannot
    /// produce a usable run.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let fetcher = PageFetcher::new(&config.api);
        // Broadcast buffer sized for a long run; slow subscribers lag
        // rather than block the loop
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);
        Ok(Self {
            config: Arc::new(config),
            fetcher,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    /// Install a diagnostic sink that receives every raw response body.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.fetcher = self.fetcher.with_diagnostics(sink);
        self
    }

    /// Subscribe to lifecycle events.
    ///
    /// Multiple subscribers are supported; each receives every event
    /// independently. A subscriber that falls behind the channel buffer
    /// misses the oldest events rather than stalling the run.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Handle used to interrupt the run from another task.
    ///
    /// Cancellation is honored at the top of the loop and during the
    /// inter-page wait; whatever has been accumulated is still persisted.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the extraction to completion and persist whatever was
    /// accumulated.
    ///
    /// Returns the completion report on every termination path except a
    /// persistence failure, which is surfaced directly.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Persistence`] when the output files cannot
    /// be written. Fetch-level failures do not surface here — they halt the
    /// loop and are recorded as the report's termination reason instead.
    pub async fn run(&self) -> Result<RunReport> {
        let started = Instant::now();
        let captured_at = Utc::now();
        let mut dataset = Dataset::new();

        let reason = self.fetch_loop(&mut dataset).await;

        tracing::info!(
            records = dataset.len(),
            pages = dataset.pages(),
            ?reason,
            "fetch loop finished"
        );

        let writer = ChunkWriter::new(self.config.output.clone());
        let files = writer.write(&dataset, captured_at)?;
        if files.is_empty() {
            self.emit(Event::NothingToPersist);
        } else {
            for file in &files {
                self.emit(Event::ChunkWritten {
                    path: file.path.clone(),
                    rows: file.rows,
                    bytes: file.bytes,
                });
            }
        }

        let report = RunReport {
            records: dataset.len() as u64,
            pages: dataset.pages(),
            files,
            elapsed: started.elapsed(),
            reason,
        };
        self.emit(Event::RunCompleted {
            records: report.records,
            pages: report.pages,
            files: report.files.len(),
            reason: report.reason.clone(),
        });
        Ok(report)
    }

    /// Walk the cursor until a termination condition is reached.
    ///
    /// The cursor is monotonic: it starts at offset 0 and advances by
    /// exactly one page size per iteration, never rewinding or skipping.
    async fn fetch_loop(&self, dataset: &mut Dataset) -> TerminationReason {
        let mut cursor = Cursor::start(self.config.api.page_size);
        let pacer = Pacer::new(self.config.api.request_delay);

        loop {
            if self.cancel.is_cancelled() {
                return TerminationReason::Cancelled;
            }

            let page_index = cursor.page_index();

            match self.fetcher.fetch(cursor).await {
                Ok(PageData::Records(mut page)) => {
                    let more = should_continue(page.len() as u64, cursor.page_size);
                    self.emit(Event::PageFetched {
                        page: page.index,
                        records: page.len(),
                    });
                    tracing::info!(page = page.index, records = page.len(), "page fetched");

                    if self.config.normalize.flatten_nested {
                        flatten_page(&mut page);
                    }
                    if self.config.normalize.enabled {
                        let repaired = normalize_page(&mut page);
                        if repaired > 0 {
                            tracing::debug!(
                                page = page.index,
                                repaired,
                                "repaired mis-decoded text fields"
                            );
                        }
                        self.emit(Event::PageNormalized {
                            page: page.index,
                            repaired_fields: repaired,
                        });
                    }

                    dataset.append(page);

                    if !more {
                        return TerminationReason::Exhausted;
                    }
                }
                Ok(PageData::Empty) => {
                    self.emit(Event::PageEmpty { page: page_index });
                    // An empty page after data means the upstream ran out
                    // exactly on a page boundary
                    return if dataset.is_empty() {
                        TerminationReason::NoData
                    } else {
                        TerminationReason::Exhausted
                    };
                }
                Err(FetchError::Timeout { page }) => {
                    tracing::warn!(page, "page request timed out");
                    self.emit(Event::PageTimeout { page });
                    if self.config.api.on_timeout == TimeoutPolicy::Stop {
                        return TerminationReason::TimeoutStop;
                    }
                    // Optimistic continuation: skip to the next offset
                }
                Err(err) => {
                    tracing::error!(error = %err, "fatal fetch error, halting run");
                    return match err {
                        FetchError::MalformedResponse { .. } => {
                            TerminationReason::MalformedResponse {
                                detail: err.to_string(),
                            }
                        }
                        _ => TerminationReason::TransportError {
                            detail: err.to_string(),
                        },
                    };
                }
            }

            // Another page is expected past this point
            if let Some(cap) = self.config.api.max_pages {
                if page_index >= cap {
                    tracing::warn!(cap, "page ceiling reached, stopping");
                    return TerminationReason::PageCeiling;
                }
            }

            if !pacer.wait(&self.cancel).await {
                return TerminationReason::Cancelled;
            }
            cursor.advance();
        }
    }

    /// Emit an event to all subscribers.
    ///
    /// With no active subscriber the event is silently dropped.
    fn emit(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
