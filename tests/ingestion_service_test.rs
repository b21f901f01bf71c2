// End-to-end ingestion tests against mocked upstream pages
// Uses mockito for the listing page and station files, in-memory SQLite for storage

mod common;

use std::time::Duration;

use historic_station_data::db::{ObservationRepository, StationRepository};
use historic_station_data::fetcher::DocumentFetcher;
use historic_station_data::services::ingestion_service::{IngestError, StationStage};
use historic_station_data::services::{IngestionOptions, IngestionService};
use historic_station_data::station_directory::DirectoryMode;
use mockito::{Server, ServerGuard};
use sqlx::SqlitePool;
use tokio::net::TcpListener;

const OXFORD_ROW: &str = "   1990   1   10.2     3.1       2    55.0    40.0";
const ARMAGH_ROW: &str = "   1990   1    8.0     1.5       6    80.2    35.1";

fn create_service(pool: &SqlitePool, server: &ServerGuard, mode: DirectoryMode) -> IngestionService {
    create_service_with_timeout(pool, server, mode, Duration::from_secs(5))
}

fn create_service_with_timeout(
    pool: &SqlitePool,
    server: &ServerGuard,
    mode: DirectoryMode,
    timeout: Duration,
) -> IngestionService {
    let fetcher = DocumentFetcher::new(timeout, 0).expect("Failed to build fetcher");
    let options = IngestionOptions {
        directory_url: format!("{}/stations", server.url()),
        directory_mode: mode,
    };
    IngestionService::new(pool.clone(), fetcher, options)
}

async fn mock_listing(server: &mut ServerGuard, rows: &[(&str, &str, &str, &str)]) -> mockito::Mock {
    server
        .mock("GET", "/stations")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(common::listing_html(rows))
        .create_async()
        .await
}

async fn mock_document(server: &mut ServerGuard, path: &str, body: String) -> mockito::Mock {
    server
        .mock("GET", path)
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body(body)
        .create_async()
        .await
}

#[tokio::test]
async fn test_two_station_run() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());
    let armagh_url = format!("{}/data/armagh.txt", server.url());

    let _listing = mock_listing(
        &mut server,
        &[
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
            ("Armagh", "-6.65, 54.35", "1853", &armagh_url),
        ],
    )
    .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;
    let _armagh = mock_document(&mut server, "/data/armagh.txt", common::station_document("Armagh", &[ARMAGH_ROW])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.expect("Run should succeed");

    assert_eq!(summary.stations_processed, 2);
    assert_eq!(summary.observations_written, 2);
    assert_eq!(summary.stations_failed, 0);
    assert!(summary.failures.is_empty());

    let station_repo = StationRepository::new(pool.clone());
    let observation_repo = ObservationRepository::new(pool.clone());
    assert_eq!(observation_repo.count().await.unwrap(), 2);

    let oxford = station_repo.find_by_name("Oxford").await.unwrap().expect("Oxford stored");
    assert_eq!(oxford.lon, Some(-1.26));
    assert_eq!(oxford.lat, Some(51.76));
    assert_eq!(oxford.opened.as_deref(), Some("1827"));
    assert_eq!(oxford.data_url.as_deref(), Some(oxford_url.as_str()));

    let oxford_obs = observation_repo.find_by_station(oxford.id).await.unwrap();
    assert_eq!(oxford_obs.len(), 1);
    assert_eq!(oxford_obs[0].year, 1990);
    assert_eq!(oxford_obs[0].month, 1);
    assert_eq!(oxford_obs[0].tmax, Some(10.2));
    assert_eq!(oxford_obs[0].af, Some(2));

    let armagh = station_repo.find_by_name("Armagh").await.unwrap().expect("Armagh stored");
    let armagh_obs = observation_repo.find_by_station(armagh.id).await.unwrap();
    assert_eq!(armagh_obs.len(), 1);
    assert_eq!(armagh_obs[0].station_id, armagh.id);
    assert_eq!(armagh_obs[0].rain, Some(80.2));
}

#[tokio::test]
async fn test_transport_failure_is_isolated() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let broken_url = format!("{}/data/broken.txt", server.url());
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(
        &mut server,
        &[
            ("Broken", "-2.0, 53.0", "1900", &broken_url),
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
        ],
    )
    .await;
    let _broken = server
        .mock("GET", "/data/broken.txt")
        .with_status(500)
        .create_async()
        .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.stations_failed, 1);
    assert_eq!(summary.observations_written, 1);
    assert_eq!(summary.failures[0].name, "Broken");
    assert_eq!(summary.failures[0].stage, StationStage::Fetching);
    assert!(summary.failures[0].reason.contains("500"));

    let station_repo = StationRepository::new(pool.clone());
    assert!(station_repo.find_by_name("Broken").await.unwrap().is_none());
    assert!(station_repo.find_by_name("Oxford").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_station_host() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(
        &mut server,
        &[
            ("Offline", "-2.0, 53.0", "1900", "http://127.0.0.1:1/offline.txt"),
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
        ],
    )
    .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.stations_failed, 1);
    assert_eq!(summary.failures[0].name, "Offline");
    assert_eq!(summary.failures[0].stage, StationStage::Fetching);
}

/// Accepts connections and never answers them
async fn spawn_silent_listener() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Listener has no address");

    tokio::spawn(async move {
        let mut open = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            open.push(socket);
        }
    });

    format!("http://{addr}")
}

#[tokio::test]
async fn test_fetch_timeout_is_isolated() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let silent_url = format!("{}/data/hang.txt", spawn_silent_listener().await);
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(
        &mut server,
        &[
            ("Hang", "-3.0, 55.0", "1900", &silent_url),
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
        ],
    )
    .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let service =
        create_service_with_timeout(&pool, &server, DirectoryMode::Strict, Duration::from_secs(1));
    let summary = tokio::time::timeout(Duration::from_secs(20), service.run_ingestion())
        .await
        .expect("Run should not hang on a silent host")
        .unwrap();

    assert_eq!(summary.stations_failed, 1);
    assert_eq!(summary.failures[0].name, "Hang");
    assert_eq!(summary.failures[0].stage, StationStage::Fetching);
    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.observations_written, 1);
    assert!(StationRepository::new(pool.clone())
        .find_by_name("Hang")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_storage_failure_rolls_back_station() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let bad_url = format!("{}/data/bad.txt", server.url());
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    // Reject the second month of the first station after its first month is written
    sqlx::query(
        r#"
        CREATE TRIGGER reject_1999 BEFORE INSERT ON observations
        WHEN NEW.year = 1999
        BEGIN
            SELECT RAISE(ABORT, 'observation rejected');
        END
        "#,
    )
    .execute(&pool)
    .await
    .expect("Failed to create trigger");

    let _listing = mock_listing(
        &mut server,
        &[
            ("Bad", "-2.0, 53.0", "1900", &bad_url),
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
        ],
    )
    .await;
    let _bad = mock_document(
        &mut server,
        "/data/bad.txt",
        common::station_document(
            "Bad",
            &[
                "   1998  12    7.0     1.0       9    60.0    30.0",
                "   1999   1    6.0     0.5      12    70.0    25.0",
            ],
        ),
    )
    .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_failed, 1);
    assert_eq!(summary.failures[0].name, "Bad");
    assert_eq!(summary.failures[0].stage, StationStage::Persisting);
    assert!(summary.failures[0].reason.contains("observation rejected"));
    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.observations_written, 1);

    let station_repo = StationRepository::new(pool.clone());
    assert!(station_repo.find_by_name("Bad").await.unwrap().is_none());
    assert!(station_repo.find_by_name("Oxford").await.unwrap().is_some());
    assert_eq!(ObservationRepository::new(pool.clone()).count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_parse_failure_is_isolated() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let garbled_url = format!("{}/data/garbled.txt", server.url());
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(
        &mut server,
        &[
            ("Garbled", "-2.0, 53.0", "1900", &garbled_url),
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
        ],
    )
    .await;
    let _garbled = mock_document(
        &mut server,
        "/data/garbled.txt",
        "Garbled\nThis station file has no table\n".to_string(),
    )
    .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.stations_failed, 1);
    assert_eq!(summary.failures[0].name, "Garbled");
    assert_eq!(summary.failures[0].stage, StationStage::Parsing);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(&mut server, &[("Oxford", "-1.26, 51.76", "1827", &oxford_url)]).await;
    let _oxford = mock_document(
        &mut server,
        "/data/oxford.txt",
        common::station_document(
            "Oxford",
            &[
                OXFORD_ROW,
                "   1990   2    9.8     2.0       4    40.1    60.3",
                "   1990   3   12.5     4.4       1    35.0   110.9",
            ],
        ),
    )
    .await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let first = service.run_ingestion().await.unwrap();
    let station_repo = StationRepository::new(pool.clone());
    let observation_repo = ObservationRepository::new(pool.clone());
    let first_id = station_repo.find_by_name("Oxford").await.unwrap().unwrap().id;
    let first_obs = observation_repo.find_by_station(first_id).await.unwrap();

    let second = service.run_ingestion().await.unwrap();
    let second_id = station_repo.find_by_name("Oxford").await.unwrap().unwrap().id;
    let second_obs = observation_repo.find_by_station(second_id).await.unwrap();

    assert_eq!(first.observations_written, 3);
    assert_eq!(second.observations_written, 3);
    assert_eq!(first_id, second_id);
    assert_eq!(station_repo.count().await.unwrap(), 1);
    assert_eq!(observation_repo.count().await.unwrap(), 3);
    assert_eq!(first_obs, second_obs);
}

#[tokio::test]
async fn test_rerun_overwrites_changed_values() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(&mut server, &[("Oxford", "-1.26, 51.76", "1827", &oxford_url)]).await;
    let provisional = mock_document(
        &mut server,
        "/data/oxford.txt",
        common::station_document("Oxford", &["   2024   1    8.0     2.0       5    70.0     ---"]),
    )
    .await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    service.run_ingestion().await.unwrap();
    provisional.remove_async().await;

    let _final = mock_document(
        &mut server,
        "/data/oxford.txt",
        common::station_document("Oxford", &["   2024   1    8.1     2.0       5    72.4    50.2"]),
    )
    .await;
    service.run_ingestion().await.unwrap();

    let observation_repo = ObservationRepository::new(pool.clone());
    let station_id = StationRepository::new(pool.clone())
        .find_by_name("Oxford")
        .await
        .unwrap()
        .unwrap()
        .id;
    let observations = observation_repo.find_by_station(station_id).await.unwrap();

    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].tmax, Some(8.1));
    assert_eq!(observations[0].rain, Some(72.4));
    assert_eq!(observations[0].sun, Some(50.2));
}

#[tokio::test]
async fn test_annotations_and_missing_values() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(&mut server, &[("Oxford", "-1.26, 51.76", "1827", &oxford_url)]).await;
    let _oxford = mock_document(
        &mut server,
        "/data/oxford.txt",
        common::station_document(
            "Oxford",
            &[
                "   1853   1    8.4     2.7*      4    62.8     ---",
                "   2020   3   11.4     3.2       3    38.0   158.0#  Provisional",
                "Site closed",
            ],
        ),
    )
    .await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();
    assert_eq!(summary.observations_written, 2);

    let station_id = StationRepository::new(pool.clone())
        .find_by_name("Oxford")
        .await
        .unwrap()
        .unwrap()
        .id;
    let observations = ObservationRepository::new(pool.clone())
        .find_by_station(station_id)
        .await
        .unwrap();

    assert_eq!(observations[0].tmin, Some(2.7));
    assert_eq!(observations[0].sun, None);
    assert_eq!(observations[1].sun, Some(158.0));
    assert_eq!(observations[1].year, 2020);
}

#[tokio::test]
async fn test_rows_without_month_are_skipped() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(&mut server, &[("Oxford", "-1.26, 51.76", "1827", &oxford_url)]).await;
    let _oxford = mock_document(
        &mut server,
        "/data/oxford.txt",
        common::station_document(
            "Oxford",
            &[OXFORD_ROW, "   1990  --    9.8     2.0       4    40.1    60.3"],
        ),
    )
    .await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.observations_written, 1);
    assert_eq!(summary.rows_skipped, 1);
}

#[tokio::test]
async fn test_station_without_rows_is_processed() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let empty_url = format!("{}/data/empty.txt", server.url());

    let _listing = mock_listing(&mut server, &[("Empty", "-1.0, 50.0", "2024", &empty_url)]).await;
    let _empty = mock_document(&mut server, "/data/empty.txt", common::station_document("Empty", &[])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.observations_written, 0);
    assert_eq!(summary.stations_failed, 0);
    assert!(StationRepository::new(pool.clone())
        .find_by_name("Empty")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_relative_links_are_resolved() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;

    let _listing = mock_listing(&mut server, &[("Oxford", "-1.26, 51.76", "1827", "/data/oxford.txt")]).await;
    let oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_processed, 1);
    oxford.assert_async().await;

    let station = StationRepository::new(pool.clone())
        .find_by_name("Oxford")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        station.data_url,
        Some(format!("{}/data/oxford.txt", server.url()))
    );
}

#[tokio::test]
async fn test_directory_fetch_failure_aborts_run() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let _listing = server
        .mock("GET", "/stations")
        .with_status(404)
        .create_async()
        .await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let result = service.run_ingestion().await;

    assert!(matches!(result, Err(IngestError::Transport(_))));
    assert_eq!(StationRepository::new(pool.clone()).count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_directory_without_table_aborts_run() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let _listing = server
        .mock("GET", "/stations")
        .with_status(200)
        .with_body("<html><body><p>Maintenance</p></body></html>")
        .create_async()
        .await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let result = service.run_ingestion().await;

    assert!(matches!(result, Err(IngestError::StructuralParse(_))));
}

#[tokio::test]
async fn test_malformed_listing_row_strict_vs_best_effort() {
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(
        &mut server,
        &[
            ("Nowhere", "unknown", "1900", "/data/nowhere.txt"),
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
        ],
    )
    .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let strict_pool = common::test_pool().await;
    let strict = create_service(&strict_pool, &server, DirectoryMode::Strict);
    assert!(matches!(
        strict.run_ingestion().await,
        Err(IngestError::StructuralParse(_))
    ));
    assert_eq!(StationRepository::new(strict_pool.clone()).count().await.unwrap(), 0);

    let lenient_pool = common::test_pool().await;
    let lenient = create_service(&lenient_pool, &server, DirectoryMode::BestEffort);
    let summary = lenient.run_ingestion().await.unwrap();
    assert_eq!(summary.stations_processed, 1);
    assert_eq!(summary.stations_failed, 0);
}

#[tokio::test]
async fn test_duplicate_listing_rows_share_station() {
    let pool = common::test_pool().await;
    let mut server = Server::new_async().await;
    let oxford_url = format!("{}/data/oxford.txt", server.url());

    let _listing = mock_listing(
        &mut server,
        &[
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
            ("Oxford", "-1.26, 51.76", "1827", &oxford_url),
        ],
    )
    .await;
    let _oxford = mock_document(&mut server, "/data/oxford.txt", common::station_document("Oxford", &[OXFORD_ROW])).await;

    let service = create_service(&pool, &server, DirectoryMode::Strict);
    let summary = service.run_ingestion().await.unwrap();

    assert_eq!(summary.stations_processed, 2);
    assert_eq!(StationRepository::new(pool.clone()).count().await.unwrap(), 1);
    assert_eq!(ObservationRepository::new(pool.clone()).count().await.unwrap(), 1);
}
