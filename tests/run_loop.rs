//! End-to-end runs against a mock HTTP server.
//!
//! These tests exercise the whole pipeline — pagination, termination,
//! normalization, accumulation, and chunked persistence — including the
//! halt-and-persist guarantees on fatal errors and cancellation.

use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tablepull::{
    ApiConfig, Config, Event, OutputConfig, TablePuller, TerminationReason, TimeoutPolicy,
};

const ENDPOINT: &str = "History.List";

/// Config pointed at the mock server: tiny pages, no inter-page delay.
fn test_config(server: &MockServer, output_dir: &Path) -> Config {
    Config {
        api: ApiConfig {
            base_url: format!("{}/", server.uri()),
            token: "secret-token".into(),
            endpoint: ENDPOINT.into(),
            order_by: "snapshot_date desc".into(),
            page_size: 2,
            request_timeout: Duration::from_millis(500),
            request_delay: Duration::ZERO,
            ..ApiConfig::default()
        },
        output: OutputConfig {
            output_dir: output_dir.to_path_buf(),
            ..OutputConfig::default()
        },
        ..Config::default()
    }
}

/// Mount a page response for a given skip offset.
async fn mount_page(server: &MockServer, skip: u64, records: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .and(query_param("skip", skip.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": records })))
        .mount(server)
        .await;
}

fn read_rows(file: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(file).expect("failed to open output file");
    reader
        .records()
        .map(|r| {
            r.expect("failed to read record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn short_final_page_terminates_after_exactly_ceil_total_over_size_fetches() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    // 5 records at page size 2: full, full, short => ceil(5/2) = 3 fetches
    mount_page(&server, 0, json!([{"id": 1}, {"id": 2}])).await;
    mount_page(&server, 2, json!([{"id": 3}, {"id": 4}])).await;
    mount_page(&server, 4, json!([{"id": 5}])).await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let report = puller.run().await.unwrap();

    assert_eq!(report.reason, TerminationReason::Exhausted);
    assert_eq!(report.records, 5);
    assert_eq!(report.pages, 3);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);

    assert_eq!(report.files.len(), 1);
    let rows = read_rows(&report.files[0].path);
    let ids: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn empty_first_page_reports_no_data_and_persists_nothing() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    mount_page(&server, 0, json!([])).await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let mut events = puller.subscribe();
    let report = puller.run().await.unwrap();

    assert_eq!(report.reason, TerminationReason::NoData);
    assert_eq!(report.records, 0);
    assert!(report.files.is_empty());
    assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);

    let mut saw_nothing_to_persist = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, Event::NothingToPersist) {
            saw_nothing_to_persist = true;
        }
    }
    assert!(saw_nothing_to_persist);
}

#[tokio::test]
async fn empty_page_on_an_exact_boundary_reads_as_exhaustion() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    // 4 records at page size 2: the upstream runs out exactly on a page
    // boundary, so page 3 comes back empty
    mount_page(&server, 0, json!([{"id": 1}, {"id": 2}])).await;
    mount_page(&server, 2, json!([{"id": 3}, {"id": 4}])).await;
    mount_page(&server, 4, json!([])).await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let report = puller.run().await.unwrap();

    assert_eq!(report.reason, TerminationReason::Exhausted);
    assert_eq!(report.records, 4);
    assert_eq!(report.pages, 2);
}

#[tokio::test]
async fn fatal_transport_error_on_page_three_persists_the_first_two_pages() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_page(&server, 0, json!([{"id": 1}, {"id": 2}])).await;
    mount_page(&server, 2, json!([{"id": 3}, {"id": 4}])).await;
    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .and(query_param("skip", "4"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let report = puller.run().await.unwrap();

    assert!(matches!(report.reason, TerminationReason::TransportError { .. }));
    assert_eq!(report.records, 4);
    assert_eq!(report.pages, 2);

    // The accumulated dataset is still flushed: exactly pages 1-2
    assert_eq!(report.files.len(), 1);
    let rows = read_rows(&report.files[0].path);
    let ids: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn malformed_body_halts_and_persists_prior_pages() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_page(&server, 0, json!([{"id": 1}, {"id": 2}])).await;
    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .and(query_param("skip", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let report = puller.run().await.unwrap();

    assert!(matches!(report.reason, TerminationReason::MalformedResponse { .. }));
    assert_eq!(report.records, 2);
    assert_eq!(report.files.len(), 1);
}

#[tokio::test]
async fn cancellation_during_the_inter_page_wait_persists_accumulated_pages() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    // Every page is full, so the run would go on forever without the interrupt
    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": [{"id": 1}, {"id": 2}] })),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server, out.path());
    config.api.request_delay = Duration::from_secs(60);

    let puller = TablePuller::new(config).unwrap();
    let mut events = puller.subscribe();
    let cancel = puller.cancel_token();

    let runner = puller.clone();
    let handle = tokio::spawn(async move { runner.run().await });

    // Wait until two pages are in, then interrupt during the wait
    let mut pages_fetched = 0;
    while pages_fetched < 2 {
        match events.recv().await.expect("event stream closed early") {
            Event::PageFetched { .. } => pages_fetched += 1,
            _ => {}
        }
    }
    cancel.cancel();

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.reason, TerminationReason::Cancelled);
    assert_eq!(report.records, 4);
    assert_eq!(report.pages, 2);

    // Exactly pages 1-2, not zero records and not pages beyond
    let rows = read_rows(&report.files[0].path);
    assert_eq!(rows.len(), 4);
}

#[tokio::test]
async fn timeout_with_stop_policy_terminates_the_run() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message": [{"id": 1}] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server, out.path());
    config.api.request_timeout = Duration::from_millis(50);
    config.api.on_timeout = TimeoutPolicy::Stop;

    let puller = TablePuller::new(config).unwrap();
    let report = puller.run().await.unwrap();

    assert_eq!(report.reason, TerminationReason::TimeoutStop);
    assert_eq!(report.records, 0);
    assert!(report.files.is_empty());
}

#[tokio::test]
async fn timeout_with_continue_policy_skips_to_the_next_offset() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    // Page 1 times out; page 2 answers with a short page
    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .and(query_param("skip", "0"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "message": [{"id": 1}, {"id": 2}] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    mount_page(&server, 2, json!([{"id": 3}])).await;

    let mut config = test_config(&server, out.path());
    config.api.request_timeout = Duration::from_millis(50);

    let puller = TablePuller::new(config).unwrap();
    let report = puller.run().await.unwrap();

    // The timed-out page yields no data, but the run continued past it
    assert_eq!(report.reason, TerminationReason::Exhausted);
    assert_eq!(report.records, 1);
    let rows = read_rows(&report.files[0].path);
    assert_eq!(rows[0][0], "3");
}

#[tokio::test]
async fn page_ceiling_caps_a_run_against_an_endless_upstream() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "message": [{"id": 1}, {"id": 2}] })),
        )
        .mount(&server)
        .await;

    let mut config = test_config(&server, out.path());
    config.api.max_pages = Some(2);

    let puller = TablePuller::new(config).unwrap();
    let report = puller.run().await.unwrap();

    assert_eq!(report.reason, TerminationReason::PageCeiling);
    assert_eq!(report.pages, 2);
    assert_eq!(report.records, 4);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn mojibake_in_upstream_text_is_repaired_in_the_output() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_page(
        &server,
        0,
        json!([{"name": "JosÃ©", "city": "MÃ¡laga"}]),
    )
    .await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let report = puller.run().await.unwrap();

    let rows = read_rows(&report.files[0].path);
    assert_eq!(rows[0], vec!["José", "Málaga"]);
}

#[tokio::test]
async fn token_header_accompanies_every_page_request() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path(format!("/{ENDPOINT}")))
        .and(header("token", "secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": [{"id": 1}] })))
        .expect(1)
        .mount(&server)
        .await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let report = puller.run().await.unwrap();

    assert_eq!(report.records, 1);
}

#[tokio::test]
async fn dataset_spanning_chunks_partitions_exactly() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_page(&server, 0, json!([{"id": 1}, {"id": 2}])).await;
    mount_page(&server, 2, json!([{"id": 3}, {"id": 4}])).await;
    mount_page(&server, 4, json!([{"id": 5}])).await;

    let mut config = test_config(&server, out.path());
    config.output.max_rows_per_chunk = 3;

    let puller = TablePuller::new(config).unwrap();
    let report = puller.run().await.unwrap();

    // Chunk boundaries are independent of page boundaries: 5 rows at 3 per
    // chunk => [3, 2]
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.files[0].rows, 3);
    assert_eq!(report.files[1].rows, 2);

    let mut ids = Vec::new();
    for file in &report.files {
        ids.extend(read_rows(&file.path).into_iter().map(|r| r[0].clone()));
    }
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn lifecycle_events_arrive_in_pipeline_order() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_page(&server, 0, json!([{"id": 1}])).await;

    let puller = TablePuller::new(test_config(&server, out.path())).unwrap();
    let mut events = puller.subscribe();
    puller.run().await.unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            Event::PageFetched { .. } => "page_fetched",
            Event::PageNormalized { .. } => "page_normalized",
            Event::ChunkWritten { .. } => "chunk_written",
            Event::RunCompleted { .. } => "run_completed",
            Event::PageEmpty { .. } => "page_empty",
            Event::PageTimeout { .. } => "page_timeout",
            Event::NothingToPersist => "nothing_to_persist",
        });
    }
    assert_eq!(
        kinds,
        vec!["page_fetched", "page_normalized", "chunk_written", "run_completed"]
    );
}
