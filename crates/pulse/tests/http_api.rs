//! HTTP API against a live listener with scripted providers.

use std::sync::Arc;
use std::time::Duration;

use pulse::server::{serve_on, CurrentRun, HealthResponse, RunStarted};
use pulse_models::config::PulseConfig;
use pulse_models::progress::{ProgressEvent, RunState};
use pulse_models::report::RunResult;
use pulse_pipeline::test_support::{
    news_item, ScriptedModel, ScriptedNews, ScriptedQuotes, ScriptedReply,
};
use pulse_pipeline::BriefService;
use pulse_store::Persistence;
use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const REPLY: &str = "## Daily Brief\nAAPL demand held up [1].\n-->Json:\n\
{\"signals\": [{\"ticker\": \"AAPL\", \"action\": \"buy\", \"reason\": \"Demand [1]\"}]}";

struct TestServer {
    base: String,
    client: reqwest::Client,
    model: Arc<ScriptedModel>,
    cancel: CancellationToken,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn start(model: ScriptedModel) -> TestServer {
    let mut config = PulseConfig::default();
    config.model.initial_backoff_ms = 1;
    config.model.credential_env = "PULSE_TEST_CREDENTIAL_UNSET".to_string();

    let news = ScriptedNews::new().with_trending(&["AAPL"]).with_feed(
        "AAPL",
        vec![news_item("AAPL", "Apple demand", "https://example.com/a")],
    );
    let model = Arc::new(model);
    let service = BriefService::new(
        config,
        Arc::new(Persistence::open_in_memory().unwrap()),
        Arc::new(news),
        Arc::new(ScriptedQuotes::new()),
        model.clone(),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let cancel = CancellationToken::new();
    tokio::spawn(serve_on(listener, service, cancel.clone()));

    TestServer {
        base,
        client: reqwest::Client::new(),
        model,
        cancel,
    }
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    async fn store_key(&self, key: &str) -> StatusCode {
        self.client
            .post(self.url("/credential"))
            .json(&serde_json::json!({ "secret": key }))
            .send()
            .await
            .unwrap()
            .status()
    }

    /// Read an SSE stream to its end and decode the `data:` payloads.
    async fn events(&self, path: &str, last_event_id: Option<u64>) -> Vec<ProgressEvent> {
        let mut request = self.client.get(self.url(path));
        if let Some(id) = last_event_id {
            request = request.header("Last-Event-ID", id.to_string());
        }
        let response = request.send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = tokio::time::timeout(Duration::from_secs(5), response.text())
            .await
            .expect("event stream did not end")
            .unwrap();
        body.lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim()).unwrap())
            .collect()
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let server = start(ScriptedModel::new(vec![])).await;
    let health: HealthResponse = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
}

#[tokio::test]
async fn run_lifecycle_over_http() {
    let server = start(ScriptedModel::new(vec![ScriptedReply::Text(REPLY.to_string())])).await;

    let missing = server.client.get(server.url("/result")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let unauthorized = server.client.post(server.url("/runs")).send().await.unwrap();
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(server.store_key("bogus").await, StatusCode::BAD_REQUEST);
    assert_eq!(server.store_key("sk-test").await, StatusCode::NO_CONTENT);

    let started = server.client.post(server.url("/runs")).send().await.unwrap();
    assert_eq!(started.status(), StatusCode::ACCEPTED);
    let RunStarted { run_id } = started.json().await.unwrap();

    let events = server.events(&format!("/runs/{run_id}/events"), None).await;
    assert!(!events.is_empty());
    assert!(events.last().unwrap().is_terminal());
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (1..=events.len() as u64).collect::<Vec<_>>());

    let resumed = server
        .events(&format!("/runs/{run_id}/events"), Some(events.len() as u64 - 1))
        .await;
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0], *events.last().unwrap());

    let from_query = server
        .events(&format!("/runs/{run_id}/events?from=2"), Some(1))
        .await;
    assert_eq!(from_query.first().unwrap().seq, 2);

    let current: CurrentRun = server
        .client
        .get(server.url("/runs/current"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(current.state, RunState::Completed);
    assert_eq!(current.run_id, Some(run_id));

    let result: RunResult = server
        .client
        .get(server.url("/result"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result.run_id, run_id);
    assert!(result.markdown.contains("1. Apple demand (Yahoo Finance RSS): https://example.com/a"));
}

#[tokio::test]
async fn concurrent_start_conflicts() {
    let server = start(ScriptedModel::new(vec![ScriptedReply::Text(REPLY.to_string())]).gated()).await;
    assert_eq!(server.store_key("sk-test").await, StatusCode::NO_CONTENT);

    let first = server.client.post(server.url("/runs")).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let RunStarted { run_id } = first.json().await.unwrap();

    let second = server.client.post(server.url("/runs")).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["error"], "conflict");

    server.model.release();
    let events = server.events(&format!("/runs/{run_id}/events"), None).await;
    assert!(events.iter().all(|e| e.run_id == run_id));
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let server = start(ScriptedModel::new(vec![])).await;
    let response = server
        .client
        .get(server.url(&format!("/runs/{}/events", uuid::Uuid::new_v4())))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
