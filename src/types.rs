//! Core types and events for tablepull

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;
use std::time::Duration;

/// A single row as received from the API: an ordered mapping from field name
/// to value.
///
/// The map preserves upstream insertion order (`serde_json` with
/// `preserve_order`), so the first page's column order survives into the CSV
/// header. Field sets may vary between records; missing fields are simply
/// absent.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// One batch of records returned by a single paginated request.
#[derive(Clone, Debug)]
pub struct Page {
    /// 1-based page index within the run
    pub index: u32,
    /// When the page was fetched
    pub fetched_at: DateTime<Utc>,
    /// Records in upstream order
    pub records: Vec<Record>,
}

impl Page {
    /// Number of records in the page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the page holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Pagination state identifying the next fetch.
///
/// Created at offset 0 and advanced by exactly `page_size` per successful
/// iteration; never rewound, never skipped. The page size is fixed for the
/// lifetime of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// Number of records the upstream should skip
    pub offset: u64,
    /// Number of records to request
    pub page_size: u64,
}

impl Cursor {
    /// Cursor for the first page of a run.
    #[must_use]
    pub fn start(page_size: u64) -> Self {
        Self { offset: 0, page_size }
    }

    /// 1-based index of the page this cursor addresses.
    #[must_use]
    pub fn page_index(&self) -> u32 {
        (self.offset / self.page_size) as u32 + 1
    }

    /// Advance to the next page.
    pub fn advance(&mut self) {
        self.offset += self.page_size;
    }
}

/// Descriptor of one persisted chunk file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    /// Where the file was written
    pub path: PathBuf,
    /// Data rows in the file (header excluded)
    pub rows: u64,
    /// File size in bytes
    pub bytes: u64,
}

/// Why a run stopped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationReason {
    /// The final page returned fewer records than requested — the upstream
    /// cursor is exhausted
    Exhausted,
    /// The run's first page returned no records — there was nothing to
    /// extract
    NoData,
    /// The configured hard page ceiling was reached
    PageCeiling,
    /// The run was interrupted externally
    Cancelled,
    /// A page request timed out and the timeout policy is `stop`
    TimeoutStop,
    /// A fatal transport failure halted the run
    TransportError {
        /// Description of the transport failure
        detail: String,
    },
    /// An unusable response body halted the run
    MalformedResponse {
        /// What made the response unusable
        detail: String,
    },
}

/// Final accounting of one extraction run.
///
/// Produced on every exit path — normal termination, fatal error, and
/// cancellation all flow through persistence and end here.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    /// Total records fetched and persisted
    pub records: u64,
    /// Total pages incorporated into the dataset
    pub pages: u32,
    /// Output files written, in chunk order
    pub files: Vec<OutputFile>,
    /// Wall-clock duration of the run
    #[serde(serialize_with = "serialize_duration_secs")]
    pub elapsed: Duration,
    /// Why the run stopped
    pub reason: TerminationReason,
}

fn serialize_duration_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Event emitted during the extraction lifecycle.
///
/// The core never prints to the console; consumers (progress reporting,
/// logging) subscribe via [`crate::TablePuller::subscribe`] and receive every
/// event independently.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A page of records was fetched and accepted
    PageFetched {
        /// 1-based page index
        page: u32,
        /// Records the page carried
        records: usize,
    },

    /// A page came back with no records
    PageEmpty {
        /// 1-based page index
        page: u32,
    },

    /// A page request timed out
    PageTimeout {
        /// 1-based page index
        page: u32,
    },

    /// Encoding repair finished for a page
    PageNormalized {
        /// 1-based page index
        page: u32,
        /// Number of text fields that were rewritten
        repaired_fields: usize,
    },

    /// One chunk file was persisted
    ChunkWritten {
        /// Where the file was written
        path: PathBuf,
        /// Data rows in the file
        rows: u64,
        /// File size in bytes
        bytes: u64,
    },

    /// The dataset was empty; no file was written
    NothingToPersist,

    /// The run finished and the report is available
    RunCompleted {
        /// Total records persisted
        records: u64,
        /// Total pages fetched
        pages: u32,
        /// Number of output files written
        files: usize,
        /// Why the run stopped
        reason: TerminationReason,
    },
}
