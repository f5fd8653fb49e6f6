use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, REFERER};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::{RemoteError, classify_reqwest};
use crate::config::LlmConfig;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);

const SYSTEM_PROMPT: &str = "You are a concise writing assistant. Improve grammar, clarity, and tone without changing meaning. Preserve formatting and line breaks. Return only the improved text.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub struct RefineClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    max_attempts: u32,
    retry_backoff: Duration,
}

impl RefineClient {
    pub fn new(config: &LlmConfig) -> Result<Self, RemoteError> {
        if !config.enabled {
            return Err(RemoteError::configuration("text refinement is disabled"));
        }
        if config.base_url.trim().is_empty() {
            return Err(RemoteError::configuration("refinement base url is empty"));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(default_headers(config)?)
            .build()
            .map_err(|err| RemoteError::configuration(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            endpoint: chat_completions_url(&config.base_url),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        })
    }

    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_backoff = backoff;
        self
    }

    pub async fn refine(&self, text: &str) -> Result<String, RemoteError> {
        let request = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: text,
                },
            ],
        };
        info!(
            endpoint = self.endpoint.as_str(),
            model = self.model.as_str(),
            temperature = self.temperature,
            "calling refinement endpoint"
        );

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            let has_next = attempt < self.max_attempts;
            match self.http.post(&self.endpoint).json(&request).send().await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt, status = status.as_u16(), "refinement response");

                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return parse_chat_completion(&body),
                            Err(err) => {
                                warn!(attempt, "failed to read refinement body: {err}");
                                last_error = Some(classify_reqwest(&err));
                            }
                        }
                    } else if is_retryable_status(status) {
                        let body = response.text().await.unwrap_or_default();
                        warn!(attempt, status = status.as_u16(), "retryable refinement status");
                        last_error = Some(RemoteError::http(status.as_u16(), &body));
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        return Err(RemoteError::http(status.as_u16(), &body));
                    }
                }
                Err(err) => {
                    warn!(attempt, "refinement request failed: {err}");
                    last_error = Some(classify_reqwest(&err));
                }
            }

            if has_next {
                sleep(self.retry_backoff).await;
            }
        }

        Err(max_retries_exceeded(last_error))
    }
}

fn max_retries_exceeded(last_error: Option<RemoteError>) -> RemoteError {
    match last_error {
        Some(last) => RemoteError {
            message: format!("max retries exceeded for refinement request ({})", last.message),
            ..last
        },
        None => RemoteError::new(
            super::RemoteErrorKind::Unknown,
            "max retries exceeded for refinement request",
        ),
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn default_headers(config: &LlmConfig) -> Result<HeaderMap, RemoteError> {
    let mut headers = HeaderMap::new();
    let api_key = config.api_key.trim();
    if !api_key.is_empty() {
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {api_key}"))?);
    }
    if let Some(referer) = config.http_referer.as_deref().filter(|v| !v.trim().is_empty()) {
        headers.insert(REFERER, header_value(referer.trim())?);
    }
    if let Some(title) = config.x_title.as_deref().filter(|v| !v.trim().is_empty()) {
        headers.insert("x-title", header_value(title.trim())?);
    }
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue, RemoteError> {
    HeaderValue::from_str(value)
        .map_err(|err| RemoteError::format(format!("invalid header value: {err}")))
}

pub fn chat_completions_url(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim().trim_end_matches('/'))
}

pub fn parse_chat_completion(body: &str) -> Result<String, RemoteError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|err| {
        RemoteError::parse(format!("invalid response JSON: {err}"), None).with_body(body)
    })?;

    let first = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::parse("no choices in response", None).with_body(body))?;
    let content = first
        .message
        .and_then(|message| message.content)
        .ok_or_else(|| RemoteError::parse("choice has no message content", None).with_body(body))?;

    Ok(content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use axum::Router;
    use axum::http::{HeaderMap as AxumHeaders, StatusCode as AxumStatus};
    use axum::routing::post;
    use serde_json::Value;

    use super::*;
    use crate::network::RemoteErrorKind;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/v1")
    }

    fn config_for(base_url: String) -> LlmConfig {
        LlmConfig {
            base_url,
            model: "test-model".to_string(),
            api_key: "secret".to_string(),
            ..LlmConfig::default()
        }
    }

    #[test]
    fn endpoint_joins_base_url_once() {
        assert_eq!(
            chat_completions_url("http://host/v1/"),
            "http://host/v1/chat/completions"
        );
        assert_eq!(
            chat_completions_url("http://host/v1"),
            "http://host/v1/chat/completions"
        );
    }

    #[test]
    fn parse_trims_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Hello, world.\n"}}]}"#;
        assert_eq!(parse_chat_completion(body).as_deref(), Ok("Hello, world."));
    }

    #[test]
    fn parse_rejects_missing_choices_and_content() {
        for body in [
            r#"{"choices":[]}"#,
            r#"{"id":"x"}"#,
            r#"{"choices":[{"message":null}]}"#,
            r#"{"choices":[{"message":{"role":"assistant"}}]}"#,
            "not json",
        ] {
            let err = parse_chat_completion(body).expect_err("should fail");
            assert_eq!(err.kind, RemoteErrorKind::ParseError, "body: {body}");
        }
    }

    #[test]
    fn disabled_service_fails_fast() {
        let config = LlmConfig {
            enabled: false,
            ..LlmConfig::default()
        };
        let err = RefineClient::new(&config).err().expect("disabled should fail");
        assert_eq!(err.kind, RemoteErrorKind::Configuration);
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn sends_chat_request_with_system_and_user_turns() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|headers: AxumHeaders, body: axum::Json<Value>| async move {
                let auth = headers
                    .get("authorization")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let messages = body["messages"].as_array().cloned().unwrap_or_default();
                let ok = auth == "Bearer secret"
                    && body["model"] == "test-model"
                    && body.get("max_tokens").is_none()
                    && messages.len() == 2
                    && messages[0]["role"] == "system"
                    && messages[1]["role"] == "user"
                    && messages[1]["content"] == "helo wrold";
                let content = if ok { "Hello, world." } else { "bad request shape" };
                axum::Json(serde_json::json!({
                    "choices": [{"message": {"content": content}}]
                }))
            }),
        );
        let base_url = serve(router).await;

        let client = RefineClient::new(&config_for(base_url)).expect("client");
        let refined = client.refine("helo wrold").await.expect("refine");
        assert_eq!(refined, "Hello, world.");
    }

    #[tokio::test]
    async fn service_unavailable_is_retried_exactly_twice() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::SERVICE_UNAVAILABLE, "overloaded")
                }
            }),
        );
        let base_url = serve(router).await;

        let client = RefineClient::new(&config_for(base_url)).expect("client");
        let started = Instant::now();
        let err = client.refine("text").await.expect_err("should exhaust retries");

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(950));
        assert!(err.message.contains("max retries exceeded"));
        assert_eq!(err.status, Some(503));
    }

    #[tokio::test]
    async fn client_errors_are_fatal_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (AxumStatus::UNAUTHORIZED, "bad key")
                }
            }),
        );
        let base_url = serve(router).await;

        let client = RefineClient::new(&config_for(base_url))
            .expect("client")
            .with_retry(3, Duration::ZERO);
        let err = client.refine("text").await.expect_err("401 is fatal");

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind, RemoteErrorKind::HttpError);
        assert_eq!(err.status, Some(401));
        assert_eq!(err.body.as_deref(), Some("bad key"));
    }

    #[tokio::test]
    async fn rate_limit_then_success_recovers() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new().route(
            "/v1/chat/completions",
            post(move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        (AxumStatus::TOO_MANY_REQUESTS, String::from("slow down"))
                    } else {
                        (
                            AxumStatus::OK,
                            String::from(r#"{"choices":[{"message":{"content":"fine"}}]}"#),
                        )
                    }
                }
            }),
        );
        let base_url = serve(router).await;

        let client = RefineClient::new(&config_for(base_url))
            .expect("client")
            .with_retry(2, Duration::from_millis(10));
        assert_eq!(client.refine("text").await.as_deref(), Ok("fine"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unreachable_endpoint_reports_connection_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let client = RefineClient::new(&config_for(format!("http://{addr}/v1")))
            .expect("client")
            .with_retry(2, Duration::from_millis(10));
        let err = client.refine("text").await.expect_err("nothing listens");

        assert_eq!(err.kind, RemoteErrorKind::ConnectionFailed);
        assert!(err.is_retryable());
        assert!(err.message.contains("max retries exceeded"));
    }
}
