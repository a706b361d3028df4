use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;

use hubsync_api::app::{AppServices, build_app, build_services, spawn_workers};
use hubsync_api::config::SyncConfig;
use hubsync_core::{ChangeAction, ObjectId};
use hubsync_entities::{Driver, NewStationCredential, WorkStation};
use hubsync_jobs::JobExecutorHandle;
use hubsync_pipelines::WriteOrigin;

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    workers: Vec<JobExecutorHandle>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    /// Build the prod router over in-memory services, seed three stations
    /// (A/B/C with api keys key-a/key-b/key-c), and bind an ephemeral port.
    async fn spawn() -> Self {
        let config = SyncConfig::default();
        let services = Arc::new(build_services(config).expect("service wiring"));

        for (id, name, key) in [(1, "A", "key-a"), (2, "B", "key-b"), (3, "C", "key-c")] {
            services.domain.stations.insert(WorkStation::new(id, name));
            services
                .domain
                .credentials
                .create(NewStationCredential {
                    station_id: hubsync_core::StationId::new(id),
                    base_url: format!("http://station-{name}.example"),
                    api_key: key.to_string(),
                })
                .expect("seed credential");
        }

        let workers = spawn_workers(&services);
        let app = build_app(services.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            workers,
            handle,
        }
    }

    async fn shutdown(mut self) {
        for worker in self.workers.drain(..) {
            worker.shutdown().await;
        }
        self.handle.abort();
    }
}

async fn pull(client: &reqwest::Client, base_url: &str, api_key: &str) -> serde_json::Value {
    let res = client
        .get(format!("{base_url}/get-pending"))
        .header("Authorization", format!("Api-Key {api_key}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

/// Ingestion and capture are asynchronous; poll until the station sees the
/// expected number of pending changes.
async fn pull_eventually(
    client: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    expected: usize,
) -> serde_json::Value {
    for _ in 0..100 {
        let body = pull(client, base_url, api_key).await;
        if body["pending_changes"].as_array().unwrap().len() == expected {
            return body;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    panic!("station {api_key} did not reach {expected} pending changes in time");
}

#[tokio::test]
async fn peer_endpoints_require_an_api_key() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let missing = client
        .get(format!("{}/get-pending", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let unknown = client
        .get(format!("{}/get-pending", srv.base_url))
        .header("Authorization", "Api-Key nope")
        .send()
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);

    let wrong_scheme = client
        .get(format!("{}/get-pending", srv.base_url))
        .header("Authorization", "Bearer key-a")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_scheme.status(), StatusCode::UNAUTHORIZED);

    let health = client
        .get(format!("{}/health", srv.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), StatusCode::OK);

    srv.shutdown().await;
}

#[tokio::test]
async fn pull_with_no_pending_rows_returns_empty_sets() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let body = pull(&client, &srv.base_url, "key-a").await;
    assert_eq!(body["pending_changes"], json!([]));
    assert_eq!(body["acknowledged_events"], json!([]));

    srv.shutdown().await;
}

#[tokio::test]
async fn local_capture_fans_out_to_every_station() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // A local mutation on the hub, not via push.
    let mut driver = Driver::new(7);
    driver.first_name = "Worku".into();
    driver.licence_number = "DL-7".into();
    srv.services.domain.drivers.insert(driver);

    let mut session = srv.services.capture.session();
    session
        .record_saved(
            WriteOrigin::Local,
            &"drivers.Driver".parse().unwrap(),
            &ObjectId::from(7i64),
            ChangeAction::Created,
        )
        .unwrap();
    session.commit().unwrap();

    // All three stations receive the event.
    let body_a = pull_eventually(&client, &srv.base_url, "key-a", 1).await;
    let body_b = pull_eventually(&client, &srv.base_url, "key-b", 1).await;
    let body_c = pull_eventually(&client, &srv.base_url, "key-c", 1).await;

    for body in [&body_a, &body_b, &body_c] {
        let change = &body["pending_changes"][0];
        assert_eq!(change["model"], "drivers.Driver");
        assert_eq!(change["action"], "C");
        assert_eq!(change["object_id"], "7");
        assert_eq!(change["data_payload"]["first_name"], "Worku");
    }

    srv.shutdown().await;
}

#[tokio::test]
async fn push_propagates_to_all_but_the_source() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/push", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .json(&json!([{
            "event_uuid": uuid::Uuid::new_v4(),
            "model": "drivers.Driver",
            "action": "C",
            "object_id": "7",
            "data_payload": {"first_name": "X", "last_name": "Y", "licence_number": "DL-7"}
        }]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "accepted");
    assert!(body["task_id"].is_string());

    // B and C receive the event; the source does not.
    let body_b = pull_eventually(&client, &srv.base_url, "key-b", 1).await;
    pull_eventually(&client, &srv.base_url, "key-c", 1).await;
    let body_a = pull(&client, &srv.base_url, "key-a").await;
    assert_eq!(body_a["pending_changes"], json!([]));

    let change = &body_b["pending_changes"][0];
    assert_eq!(change["data_payload"]["first_name"], "X");
    assert_eq!(change["data_payload"]["last_name"], "Y");

    // The change was applied to hub state.
    let driver = srv.services.domain.drivers.get(7).unwrap();
    assert_eq!(driver.first_name, "X");

    srv.shutdown().await;
}

#[tokio::test]
async fn acknowledgements_collapse_the_pending_set() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/push", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .json(&json!([{
            "event_uuid": uuid::Uuid::new_v4(),
            "model": "drivers.Driver",
            "action": "C",
            "object_id": "7",
            "data_payload": {"licence_number": "DL-7"}
        }]))
        .send()
        .await
        .unwrap();

    let body_b = pull_eventually(&client, &srv.base_url, "key-b", 1).await;
    let event_id = body_b["pending_changes"][0]["id"].as_str().unwrap().to_string();

    // B confirms receipt.
    let res = client
        .post(format!("{}/acknowledge", srv.base_url))
        .header("Authorization", "Api-Key key-b")
        .json(&json!({"acknowledged_events": [event_id]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ack_body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(ack_body["message"], "1 events acknowledged.");

    // C still sees the event; A does not learn "distributed" yet.
    let body_c = pull(&client, &srv.base_url, "key-c").await;
    assert_eq!(body_c["pending_changes"].as_array().unwrap().len(), 1);
    let body_a = pull(&client, &srv.base_url, "key-a").await;
    assert_eq!(body_a["acknowledged_events"], json!([]));

    // After C also acknowledges, A sees the event as distributed.
    client
        .post(format!("{}/acknowledge", srv.base_url))
        .header("Authorization", "Api-Key key-c")
        .json(&json!({"acknowledged_events": [event_id]}))
        .send()
        .await
        .unwrap();

    let body_a = pull(&client, &srv.base_url, "key-a").await;
    assert_eq!(body_a["acknowledged_events"], json!([event_id]));

    srv.shutdown().await;
}

#[tokio::test]
async fn acknowledge_is_idempotent_and_tolerates_unknown_ids() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    // Unknown event id: zero rows affected, still a 200.
    let res = client
        .post(format!("{}/acknowledge", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .json(&json!({"acknowledged_events": [uuid::Uuid::new_v4()]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "0 events acknowledged.");

    // An empty list is a validation error.
    let res = client
        .post(format!("{}/acknowledge", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .json(&json!({"acknowledged_events": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    srv.shutdown().await;
}

#[tokio::test]
async fn empty_push_is_a_no_op() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/push", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .json(&json!([]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["message"], "No changes processed.");

    srv.shutdown().await;
}

#[tokio::test]
async fn invalid_push_items_return_per_change_errors() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/push", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .json(&json!([
            {
                "event_uuid": uuid::Uuid::new_v4(),
                "model": "ghosts.Ghost",
                "action": "C",
                "object_id": "1",
                "data_payload": {}
            },
            {
                "event_uuid": uuid::Uuid::new_v4(),
                "model": "drivers.Driver",
                "action": "C",
                "object_id": "1",
                "data_payload": {}
            }
        ]))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["errors"]["0"][0]
        .as_str()
        .unwrap()
        .contains("not allowed to be synchronized"));
    assert!(body["errors"].get("1").is_none());

    // Nothing was applied.
    assert!(srv.services.domain.drivers.is_empty());

    srv.shutdown().await;
}

#[tokio::test]
async fn pulled_file_fields_resolve_to_media_urls() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    use base64::Engine as _;
    let content = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);

    client
        .post(format!("{}/push", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .json(&json!([{
            "event_uuid": uuid::Uuid::new_v4(),
            "model": "drivers.Driver",
            "action": "C",
            "object_id": "3",
            "data_payload": {
                "licence_number": "DL-3",
                "photo": {"filename": "face.jpg", "content": content}
            }
        }]))
        .send()
        .await
        .unwrap();

    let body_b = pull_eventually(&client, &srv.base_url, "key-b", 1).await;
    let photo = body_b["pending_changes"][0]["data_payload"]["photo"]
        .as_str()
        .unwrap();
    assert!(photo.starts_with("http://"));
    assert!(photo.ends_with("/drivers.Driver/3/photo/face.jpg"));

    srv.shutdown().await;
}

#[tokio::test]
async fn pull_touches_last_seen() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    pull(&client, &srv.base_url, "key-a").await;

    use hubsync_entities::StationDirectory as _;
    let station = srv
        .services
        .domain
        .stations
        .get(hubsync_core::StationId::new(1))
        .unwrap();
    assert!(station.last_seen.is_some());

    srv.shutdown().await;
}

#[tokio::test]
async fn operator_surface_manages_credentials_and_lists_stations() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let token = srv.services.config.operator_token.clone();

    // Peer keys do not open the operator surface.
    let res = client
        .get(format!("{}/workstation-list", srv.base_url))
        .header("Authorization", "Api-Key key-a")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(format!("{}/workstation-list", srv.base_url))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let stations: serde_json::Value = res.json().await.unwrap();
    assert_eq!(stations.as_array().unwrap().len(), 3);

    // Credential CRUD round: a fourth station gets provisioned.
    srv.services
        .domain
        .stations
        .insert(WorkStation::new(4, "D"));

    let created: serde_json::Value = client
        .post(format!("{}/sync-configs", srv.base_url))
        .header("Authorization", format!("Bearer {token}"))
        .json(&json!({
            "station_id": 4,
            "base_url": "http://station-d.example",
            "api_key": "key-d"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let credential_id = created["id"].as_i64().unwrap();

    // The fresh key authenticates immediately.
    let body = pull(&client, &srv.base_url, "key-d").await;
    assert_eq!(body["pending_changes"], json!([]));

    let res = client
        .delete(format!("{}/sync-configs/{credential_id}", srv.base_url))
        .header("Authorization", format!("Bearer {token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // And a deleted key stops authenticating.
    let res = client
        .get(format!("{}/get-pending", srv.base_url))
        .header("Authorization", "Api-Key key-d")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    srv.shutdown().await;
}
