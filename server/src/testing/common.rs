use std::sync::Mutex;
use std::time::Duration;

use axum::{routing::post, Json, Router};
use serde_json::json;
use tokio::net::TcpListener;

use crate::model::{Record, RecordInput};
use crate::prompt::{CategorizeError, Categorizer, SingleCategory, TitleCategory};
use crate::rate_limiters::RateLimiters;
use crate::server_config::ServerConfig;
use crate::{HttpClient, ServerState};

type BatchScript =
    Box<dyn Fn(usize, &[String]) -> Result<Vec<TitleCategory>, CategorizeError> + Send + Sync>;
type SingleScript = Box<dyn Fn(&str) -> Result<SingleCategory, CategorizeError> + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub titles: Vec<String>,
    pub key: String,
}

/// In-memory categorizer whose answers are scripted per call.
///
/// The batch script receives the 0-based call index and the requested titles.
pub struct ScriptedCategorizer {
    batch_script: BatchScript,
    single_script: SingleScript,
    delay: Option<Duration>,
    batch_calls: Mutex<Vec<RecordedCall>>,
    single_calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedCategorizer {
    pub fn with_batch<F>(script: F) -> Self
    where
        F: Fn(usize, &[String]) -> Result<Vec<TitleCategory>, CategorizeError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            batch_script: Box::new(script),
            single_script: Box::new(|_| Err(CategorizeError::Other("not scripted".to_string()))),
            delay: None,
            batch_calls: Mutex::new(Vec::new()),
            single_calls: Mutex::new(Vec::new()),
        }
    }

    /// Categorizes every requested title with `category`.
    pub fn echo(category: &str) -> Self {
        let category = category.to_string();
        Self::with_batch(move |_, titles| Ok(categorize_all(titles, &category)))
    }

    pub fn with_single<F>(mut self, script: F) -> Self
    where
        F: Fn(&str) -> Result<SingleCategory, CategorizeError> + Send + Sync + 'static,
    {
        self.single_script = Box::new(script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn batch_calls(&self) -> Vec<RecordedCall> {
        self.batch_calls.lock().unwrap().clone()
    }

    pub fn single_calls(&self) -> Vec<RecordedCall> {
        self.single_calls.lock().unwrap().clone()
    }
}

impl Categorizer for ScriptedCategorizer {
    async fn categorize_batch(
        &self,
        titles: &[String],
        key: &str,
    ) -> Result<Vec<TitleCategory>, CategorizeError> {
        let call_index = {
            let mut calls = self.batch_calls.lock().unwrap();
            calls.push(RecordedCall {
                titles: titles.to_vec(),
                key: key.to_string(),
            });
            calls.len() - 1
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.batch_script)(call_index, titles)
    }

    async fn categorize_single(
        &self,
        title: &str,
        key: &str,
    ) -> Result<SingleCategory, CategorizeError> {
        self.single_calls.lock().unwrap().push(RecordedCall {
            titles: vec![title.to_string()],
            key: key.to_string(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.single_script)(title)
    }
}

pub fn categorize_all(titles: &[String], category: &str) -> Vec<TitleCategory> {
    titles
        .iter()
        .map(|title| TitleCategory {
            title: title.clone(),
            category: category.to_string(),
            confidence: 0.9,
        })
        .collect()
}

pub fn record(title: &str, position: usize) -> Record {
    Record::from_input(
        RecordInput {
            title: Some(title.to_string()),
            year: Some("2024".to_string()),
            ..Default::default()
        },
        position,
    )
}

/// `n` records titled "Paper 1" .. "Paper n".
pub fn make_records(n: usize) -> Vec<Record> {
    (0..n).map(|i| record(&format!("Paper {}", i + 1), i)).collect()
}

pub fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Server state backed by the bundled config, with `pool_keys` as the only
/// credentials. The endpoint is never reachable.
pub fn test_server_state(pool_keys: &[&str]) -> ServerState {
    test_server_state_with_endpoint(pool_keys, "http://127.0.0.1:9/v1/chat/completions")
}

pub fn test_server_state_with_endpoint(pool_keys: &[&str], endpoint: &str) -> ServerState {
    let path = ServerConfig::config_dir().join("config.toml");
    let contents = std::fs::read_to_string(path).unwrap();
    let mut cfg = ServerConfig::from_toml_str(&contents).unwrap();
    cfg.api.endpoint = endpoint.to_string();
    cfg.api.keys = keys(pool_keys);

    let mut state = ServerState::new(&cfg, HttpClient::new());
    state.rate_limiters = RateLimiters::unthrottled();
    state
}

/// Serve a chat-completions endpoint on a local port that waits `delay` and
/// then answers every request with `content`. Returns the endpoint URL.
pub async fn spawn_chat_stub(delay: Duration, content: &'static str) -> String {
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || async move {
            tokio::time::sleep(delay).await;
            Json(json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": content},
                    "finish_reason": "stop"
                }]
            }))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    format!("http://{addr}/v1/chat/completions")
}
