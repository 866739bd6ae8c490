//! # tablepull
//!
//! Library for one-shot bulk extraction of a large remote tabular dataset
//! from a paginated JSON-over-HTTP API into size-bounded UTF-8 CSV files.
//!
//! ## Design Philosophy
//!
//! tablepull is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Sequential by contract** - One in-flight request, fixed inter-page
//!   pacing, pages accumulated in strict offset order
//! - **Persist on every exit** - Normal termination, fatal errors, and
//!   interruption all flush whatever was accumulated
//! - **Event-driven** - Consumers subscribe to lifecycle events, the core
//!   never prints to the console
//!
//! ## Quick Start
//!
//! ```no_run
//! use tablepull::{ApiConfig, Config, TablePuller};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         api: ApiConfig {
//!             base_url: "https://api.example.com/".to_string(),
//!             token: "bearer-token".to_string(),
//!             endpoint: "System.InventoryHistory.List".to_string(),
//!             order_by: "snapshot_date desc".to_string(),
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let puller = TablePuller::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = puller.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = puller.run().await?;
//!     println!("{} records in {} files", report.records, report.files.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Append-only dataset accumulation
pub mod dataset;
/// Error types
pub mod error;
/// Single-page fetching and response-shape extraction
pub mod fetch;
/// Optional flattening of nested objects into dotted field names
pub mod flatten;
/// Mojibake repair for text fields
pub mod normalize;
/// Fixed inter-page pacing
pub mod pacer;
/// Core extraction driver
pub mod puller;
/// Request URL construction
pub mod request;
/// Core types and events
pub mod types;
/// Chunked CSV persistence
pub mod writer;

// Re-export commonly used types
pub use config::{ApiConfig, Config, HeaderMode, NormalizeConfig, OutputConfig, TimeoutPolicy};
pub use dataset::Dataset;
pub use error::{Error, FetchError, Result};
pub use fetch::{DiagnosticSink, NoOpDiagnosticSink, PageData, PageFetcher};
pub use pacer::Pacer;
pub use puller::{TablePuller, should_continue};
pub use request::build_page_url;
pub use types::{Cursor, Event, OutputFile, Page, Record, RunReport, TerminationReason};
pub use writer::ChunkWriter;

/// Helper function to run the puller with graceful signal handling.
///
/// Runs the extraction while listening for a termination signal; on signal
/// the run is cancelled and unwinds to persistence, so whatever was
/// accumulated is still written out before the report is returned.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Errors
///
/// Propagates [`Error::Persistence`] from the final write, like
/// [`TablePuller::run`].
///
/// # Example
///
/// ```no_run
/// use tablepull::{Config, TablePuller, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let puller = TablePuller::new(config)?;
///
///     // Run with automatic signal handling
///     let report = run_with_shutdown(puller).await?;
///     println!("stopped: {:?}", report.reason);
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(puller: TablePuller) -> Result<RunReport> {
    let cancel = puller.cancel_token();
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel.cancel();
    });
    puller.run().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
