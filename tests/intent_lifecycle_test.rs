use serial_test::serial;
use tokio::net::TcpListener;

use memoria_api::config::AppConfig;
use memoria_api::server::create_app;

struct TestServer {
    port: u16,
    handle: tokio::task::JoinHandle<()>,
    _temp_dir: tempfile::TempDir,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn spawn_server() -> TestServer {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("memoria.db");

    let mut config = AppConfig::default();
    config.database.path = Some(db_path.to_str().unwrap().to_string());

    let app = create_app(config).await.expect("Failed to create app");

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let port = listener.local_addr().unwrap().port();

    let server = axum::serve(listener, app);
    let handle = tokio::spawn(async move {
        server.await.expect("Server error");
    });

    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

    TestServer {
        port,
        handle,
        _temp_dir: temp_dir,
    }
}

fn interval_intent(user_id: &str, minutes: i64) -> serde_json::Value {
    serde_json::json!({
        "user_id": user_id,
        "intent_name": "check in",
        "trigger_type": "interval",
        "trigger_schedule": {"interval_minutes": minutes},
        "action_type": "notify"
    })
}

#[tokio::test]
#[serial]
async fn test_health_and_readiness() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(server.url("/health"))
        .send()
        .await
        .expect("Failed to request health");
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let resp = client.get(server.url("/ready")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["database"], "sqlite");
}

#[tokio::test]
#[serial]
async fn test_create_cron_intent_schedules_next_check() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/v1/intents"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "intent_name": "morning digest",
            "trigger_type": "cron",
            "trigger_schedule": {"cron": "0 9 * * *"},
            "action_type": "notify"
        }))
        .send()
        .await
        .expect("Failed to create intent");

    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["next_check"].is_string());
    assert_eq!(body["enabled"], true);
    assert_eq!(body["execution_count"], 0);

    // Round-trip through GET
    let id = body["id"].as_str().unwrap();
    let fetched: serde_json::Value = client
        .get(server.url(&format!("/v1/intents/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched["id"], body["id"]);
    assert_eq!(fetched["trigger_type"], "cron");
}

#[tokio::test]
#[serial]
async fn test_invalid_intent_returns_all_errors() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // Interval too short and the schedule field for cron both wrong at once.
    let resp = client
        .post(server.url("/v1/intents"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "trigger_type": "interval",
            "trigger_schedule": {"interval_minutes": 2},
            "action_type": "notify"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["errors"][0], "Interval too short: 2m. Minimum: 5m");

    let resp = client
        .post(server.url("/v1/intents"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "trigger_type": "cron",
            "trigger_schedule": {"cron": "* * * * *"},
            "action_type": "notify"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    let errors: Vec<String> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e.as_str().unwrap().to_string())
        .collect();
    assert!(errors.iter().any(|e| e.contains("Cron would fire")));
}

#[tokio::test]
#[serial]
async fn test_fire_lifecycle_records_history() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(server.url("/v1/intents"))
        .json(&interval_intent("u1", 30))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    // Successful fire increments the counter and reschedules.
    let result: serde_json::Value = client
        .post(server.url(&format!("/v1/intents/{id}/fire")))
        .json(&serde_json::json!({
            "status": "success",
            "message_id": "msg-1",
            "message_preview": "hello"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["execution_count"], 1);
    assert_eq!(result["enabled"], true);
    assert!(result["next_check"].is_string());

    // Failed fire records history but does not count as an execution.
    let result: serde_json::Value = client
        .post(server.url(&format!("/v1/intents/{id}/fire")))
        .json(&serde_json::json!({
            "status": "failed",
            "error_message": "delivery timeout"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["execution_count"], 1);

    let history: serde_json::Value = client
        .get(server.url(&format!("/v1/intents/{id}/history")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let executions = history["executions"].as_array().unwrap();
    assert_eq!(executions.len(), 2);
    // Newest first
    assert_eq!(executions[0]["status"], "failed");
    assert_eq!(executions[1]["status"], "success");
    assert_eq!(executions[1]["message_id"], "msg-1");
}

#[tokio::test]
#[serial]
async fn test_once_intent_disables_after_success() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let trigger_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();
    let created: serde_json::Value = client
        .post(server.url("/v1/intents"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "trigger_type": "once",
            "trigger_schedule": {"trigger_at": trigger_at},
            "action_type": "notify"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let result: serde_json::Value = client
        .post(server.url(&format!("/v1/intents/{id}/fire")))
        .json(&serde_json::json!({"status": "success"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["enabled"], false);
    assert!(result["next_check"].is_null());
    assert_eq!(result["was_disabled_reason"], "one-time trigger executed");
}

#[tokio::test]
#[serial]
async fn test_pending_queue_includes_due_condition_intents() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // Condition triggers are due immediately; unknown types are never polled.
    let resp = client
        .post(server.url("/v1/intents"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "trigger_type": "price",
            "trigger_condition": {"ticker": "AAPL", "operator": "gt", "value": 150.0},
            "action_type": "notify"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let resp = client
        .post(server.url("/v1/intents"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "trigger_type": "weather",
            "action_type": "notify"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let pending: serde_json::Value = client
        .get(server.url("/v1/intents/pending?user_id=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let due = pending.as_array().unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0]["trigger_type"], "price");
}

#[tokio::test]
#[serial]
async fn test_update_reschedules_and_delete_removes() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(server.url("/v1/intents"))
        .json(&interval_intent("u1", 30))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let updated: serde_json::Value = client
        .put(server.url(&format!("/v1/intents/{id}")))
        .json(&serde_json::json!({
            "trigger_schedule": {"interval_minutes": 120}
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_ne!(updated["next_check"], created["next_check"]);

    let resp = client
        .delete(server.url(&format!("/v1/intents/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NO_CONTENT);

    let resp = client
        .get(server.url(&format!("/v1/intents/{id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["detail"], "Intent not found");
}

#[tokio::test]
#[serial]
async fn test_list_filters_by_trigger_type() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    for body in [
        interval_intent("u1", 30),
        serde_json::json!({
            "user_id": "u1",
            "trigger_type": "cron",
            "trigger_schedule": {"cron": "0 9 * * *"},
            "action_type": "notify"
        }),
        interval_intent("u2", 45),
    ] {
        let resp = client
            .post(server.url("/v1/intents"))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    }

    let listed: serde_json::Value = client
        .get(server.url("/v1/intents?user_id=u1&trigger_type=interval"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let intents = listed["intents"].as_array().unwrap();
    assert_eq!(intents.len(), 1);
    assert_eq!(intents[0]["user_id"], "u1");
    assert_eq!(intents[0]["trigger_type"], "interval");
}

#[tokio::test]
#[serial]
async fn test_store_and_retrieve_memories() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // Extraction is disabled in the default wiring, so nothing is stored.
    let stored: serde_json::Value = client
        .post(server.url("/v1/store"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "messages": [
                {"role": "user", "content": "I moved to Lisbon last month"}
            ]
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored["stored"], 0);

    let page: serde_json::Value = client
        .get(server.url("/v1/retrieve?user_id=u1&query=where+do+I+live"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 0);
    assert_eq!(page["limit"], 10);
    assert_eq!(page["memories"].as_array().unwrap().len(), 0);
}

#[tokio::test]
#[serial]
async fn test_portfolio_upsert_and_listing() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    // First upsert creates; ticker is normalized to uppercase.
    let resp = client
        .post(server.url("/v1/portfolio/holding"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "ticker": "aapl",
            "shares": 100.0,
            "avg_price": 150.0
        }))
        .send()
        .await
        .expect("Failed to upsert holding");
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["created"], true);
    assert_eq!(body["ticker"], "AAPL");
    assert_eq!(body["intent"], "hold");

    // Same ticker again merges: 200, created false, avg_price preserved.
    let resp = client
        .post(server.url("/v1/portfolio/holding"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "ticker": "AAPL",
            "shares": 120.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["created"], false);
    assert_eq!(body["shares"], 120.0);
    assert_eq!(body["avg_price"], 150.0);

    let resp = client
        .post(server.url("/v1/portfolio/holding"))
        .json(&serde_json::json!({
            "user_id": "u1",
            "ticker": "NVDA",
            "intent": "watch"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let view: serde_json::Value = client
        .get(server.url("/v1/portfolio?user_id=u1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["user_id"], "u1");
    assert_eq!(view["total_holdings"], 2);
    assert!(view["last_updated"].is_string());
    // Most recently updated first.
    assert_eq!(view["holdings"][0]["ticker"], "NVDA");

    // Intent filter narrows to owned assets.
    let held: serde_json::Value = client
        .get(server.url("/v1/portfolio?user_id=u1&intent=hold"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(held["total_holdings"], 1);
    assert_eq!(held["holdings"][0]["ticker"], "AAPL");

    // Unknown user gets an empty portfolio, not an error.
    let empty: serde_json::Value = client
        .get(server.url("/v1/portfolio?user_id=nobody"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(empty["total_holdings"], 0);
    assert!(empty["last_updated"].is_null());
}

#[tokio::test]
#[serial]
async fn test_portfolio_rejects_bad_ticker_and_intent() {
    let server = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(server.url("/v1/portfolio/holding"))
        .json(&serde_json::json!({"user_id": "u1", "ticker": "BAD TICKER!"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["errors"][0]
        .as_str()
        .unwrap()
        .contains("Invalid ticker format"));

    let resp = client
        .post(server.url("/v1/portfolio/holding"))
        .json(&serde_json::json!({"user_id": "u1", "ticker": "AAPL", "intent": "sell"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: serde_json::Value = resp.json().await.unwrap();
    let message = body["errors"][0].as_str().unwrap();
    assert!(message.contains("Invalid intent"));
    assert!(message.contains("wants-to-sell"));
}
