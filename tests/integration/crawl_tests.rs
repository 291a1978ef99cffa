//! Integration tests for the harvester
//!
//! These tests use wiremock to serve a listing and its reports, and run
//! the full pipeline end-to-end into a file-backed database.

use spimex_harvest::config::{parse_config, Config};
use spimex_harvest::crawler::{Coordinator, FetchClient, HttpFetcher};
use spimex_harvest::extract::{Cell, ExtractError, RecordExtractor, TabularDecoder, METRIC_TON_UNIT};
use spimex_harvest::storage::{RunStatus, SqliteStorage, Storage};
use chrono::NaiveDate;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const LINK_CLASS: &str = "accordeon-inner__item-title link xls";

/// Decodes a plain-text stand-in for a workbook
///
/// Each body line is `code;name;basis;volume;total;count` and becomes a
/// data row under the metric-ton section header.
struct TextSheetDecoder;

impl TabularDecoder for TextSheetDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Vec<Vec<Cell>>, ExtractError> {
        let text = std::str::from_utf8(bytes).map_err(|e| ExtractError::Decode(e.to_string()))?;
        let label = |s: &str| Cell::Text(s.to_string());

        let mut rows = vec![
            vec![Cell::Empty, label(METRIC_TON_UNIT)],
            vec![
                Cell::Empty,
                label("Код\nИнструмента"),
                label("Наименование\nИнструмента"),
                label("Базис\nпоставки"),
                label("Объем\nДоговоров\nв единицах\nизмерения"),
                label("Обьем\nДоговоров,\nруб."),
                label("Количество\nДоговоров,\nшт."),
            ],
            vec![],
        ];

        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let fields: Vec<&str> = line.split(';').collect();
            let number = |i: usize| {
                fields
                    .get(i)
                    .and_then(|f| f.parse::<f64>().ok())
                    .map(Cell::Number)
                    .unwrap_or(Cell::Empty)
            };
            rows.push(vec![
                Cell::Empty,
                label(fields.first().copied().unwrap_or_default()),
                label(fields.get(1).copied().unwrap_or_default()),
                label(fields.get(2).copied().unwrap_or_default()),
                number(3),
                number(4),
                number(5),
            ]);
        }

        rows.push(vec![Cell::Empty, label("Итого:")]);
        Ok(rows)
    }
}

/// Creates a test configuration pointing at the mock listing
fn create_test_config(base_url: &str, db_path: &str) -> Config {
    parse_config(&format!(
        r#"
[crawler]
base-url = "{}"
cutoff-date = "2025-01-01"
workers = 2
consumer-timeout = 100
request-delay = 0
request-timeout = 5

[user-agent]
crawler-name = "TestHarvest"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[storage]
database-path = "{}"
"#,
        base_url, db_path
    ))
    .expect("test config should parse")
}

fn report_link(stamp: &str) -> String {
    format!(
        r#"<a class="{}" href="/upload/reports/oil_xls/oil_xls_{}162000.xls?r=5">Бюллетень по итогам торгов</a>"#,
        LINK_CLASS, stamp
    )
}

fn listing(links: &[&str]) -> String {
    let items: Vec<String> = links.iter().map(|s| report_link(s)).collect();
    format!(
        "<html><body><div class=\"accordeon-inner\">{}</div></body></html>",
        items.join("\n")
    )
}

async fn mount_listing(server: &MockServer, page: u32, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/results/"))
        .and(query_param("page", format!("page-{}", page)))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(links)))
        .mount(server)
        .await;
}

async fn mount_report(server: &MockServer, stamp: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/upload/reports/oil_xls/oil_xls_{}162000.xls", stamp)))
        .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

/// Serves two listing pages: two reports in the window, then one past the cutoff
async fn start_exchange() -> MockServer {
    let server = MockServer::start().await;

    mount_listing(&server, 1, &["20250105", "20250104"]).await;
    mount_listing(&server, 2, &["20241230"]).await;

    mount_report(
        &server,
        "20250105",
        "A592BO02A;Бензин (АИ-92-К5);Борзя;60;3600000;1\n\
         DT5KNPF065F;ДТ ЕВРО сорта F;ст. Комбинатская;120;7800000;2\n\
         A100NVY060F;Бензин (АИ-100);Новоярославская;0;0;0\n",
    )
    .await;
    // The exchange occasionally serves an error page in place of a workbook
    mount_report(
        &server,
        "20250104",
        "<!DOCTYPE html><html><body>Временно недоступно</body></html>",
    )
    .await;
    mount_report(&server, "20241230", "A592BO02A;Бензин;Борзя;1;1;1\n").await;

    server
}

fn coordinator(config: Config, db_path: &std::path::Path) -> Coordinator {
    let fetcher = HttpFetcher::from_config(&config.user_agent, config.crawler.request_timeout())
        .expect("client should build");
    let fetcher: Arc<dyn FetchClient> = Arc::new(fetcher);

    Coordinator::with_components(
        config,
        "test-hash",
        SqliteStorage::new(db_path).expect("database should open"),
        fetcher,
        RecordExtractor::new(TextSheetDecoder),
    )
}

#[tokio::test]
async fn test_full_harvest_stops_at_cutoff() {
    let server = start_exchange().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bulletins.db");

    let config = create_test_config(
        &format!("{}/results/", server.uri()),
        &db_path.to_string_lossy(),
    );
    let summary = coordinator(config, &db_path).run().await.unwrap();

    assert_eq!(summary.pages_visited, 2);
    assert_eq!(summary.links_queued, 2);
    assert_eq!(summary.stop_reason, "date_boundary");
    assert_eq!(summary.links_processed, 2);
    assert_eq!(summary.links_failed, 0);
    assert_eq!(summary.records_ingested, 2);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_bulletins().unwrap(), 2);
    assert_eq!(storage.count_trading_days().unwrap(), 1);
    assert_eq!(
        storage.max_known_date().unwrap(),
        NaiveDate::from_ymd_opt(2025, 1, 5)
    );

    let rows = storage
        .query_bulletins(&Default::default(), 10)
        .unwrap();
    let diesel = rows
        .iter()
        .find(|r| r.product_id == "DT5KNPF065F")
        .expect("diesel row stored");
    assert_eq!(diesel.oil_category, "DT5K");
    assert_eq!(diesel.delivery_basis_id, "NPF");
    assert_eq!(diesel.delivery_type_id, "F");
    assert_eq!(diesel.volume, 120);
    assert_eq!(diesel.total, 7_800_000);
    assert_eq!(diesel.count, 2);
    assert!(rows.iter().all(|r| r.product_id != "A100NVY060F"));

    let run = storage.get_latest_run().unwrap().expect("run recorded");
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "test-hash");
    assert_eq!(run.links_found, 2);
    assert_eq!(run.records_ingested, 2);
    assert!(run.finished_at.is_some());
}

#[tokio::test]
async fn test_second_harvest_resumes_from_stored_dates() {
    let server = start_exchange().await;
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bulletins.db");
    let base_url = format!("{}/results/", server.uri());

    let first = coordinator(create_test_config(&base_url, &db_path.to_string_lossy()), &db_path)
        .run()
        .await
        .unwrap();
    assert_eq!(first.records_ingested, 2);

    // The newest stored date now bounds the window; nothing on page 1 is newer
    let second = coordinator(create_test_config(&base_url, &db_path.to_string_lossy()), &db_path)
        .run()
        .await
        .unwrap();
    assert_eq!(second.pages_visited, 1);
    assert_eq!(second.links_queued, 0);
    assert_eq!(second.stop_reason, "date_boundary");
    assert_ne!(first.run_id, second.run_id);

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(storage.count_bulletins().unwrap(), 2);
}

#[tokio::test]
async fn test_missing_listing_page_ends_discovery() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, &["20250105"]).await;
    mount_report(&server, "20250105", "A592BO02A;Бензин;Борзя;60;3600000;1\n").await;
    Mock::given(method("GET"))
        .and(path("/results/"))
        .and(query_param("page", "page-2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bulletins.db");
    let config = create_test_config(
        &format!("{}/results/", server.uri()),
        &db_path.to_string_lossy(),
    );

    let summary = coordinator(config, &db_path).run().await.unwrap();
    assert_eq!(summary.pages_visited, 1);
    assert_eq!(summary.links_queued, 1);
    assert_eq!(summary.stop_reason, "not_found");
    assert_eq!(summary.records_ingested, 1);
}

#[tokio::test]
async fn test_missing_report_is_counted_not_fatal() {
    let server = MockServer::start().await;
    mount_listing(&server, 1, &["20250105", "20250103"]).await;
    mount_listing(&server, 2, &[]).await;
    mount_report(&server, "20250105", "A592BO02A;Бензин;Борзя;60;3600000;1\n").await;
    // 20250103 is not mounted: wiremock answers 404

    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("bulletins.db");
    let config = create_test_config(
        &format!("{}/results/", server.uri()),
        &db_path.to_string_lossy(),
    );

    let summary = coordinator(config, &db_path).run().await.unwrap();
    assert_eq!(summary.links_queued, 2);
    assert_eq!(summary.links_processed, 1);
    assert_eq!(summary.links_not_found, 1);
    assert_eq!(summary.stop_reason, "empty_page");

    let storage = SqliteStorage::new(&db_path).unwrap();
    assert_eq!(
        storage.get_latest_run().unwrap().unwrap().status,
        RunStatus::Completed
    );
}
