use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;
use uuid::Uuid;

use super::types::{Question, SubmissionResult, SubmitOutcome, SubmitRequest};
use super::QuizService;
use crate::config::ServiceConfig;

/// Wait applied when a 429 arrives without any retry hint
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

const QUESTIONS_PATH: &str = "quiz/questions/";
const SUBMIT_PATH: &str = "quiz/submit/";

/// HTTP client for the quiz backend
pub struct HttpQuizService {
    client: Client,
    base_url: Url,
}

impl HttpQuizService {
    /// Create a new client
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let base_url = parse_base_url(&config.base_url)?;

        let client = Client::builder()
            .user_agent(format!("riddle-lock/{}", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid endpoint path: {}", path))
    }
}

#[async_trait]
impl QuizService for HttpQuizService {
    async fn fetch_question(&self) -> Result<Question> {
        let url = self.endpoint(QUESTIONS_PATH)?;
        tracing::debug!("Fetching question from: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .context("Failed to connect to quiz service")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Quiz service returned {} for {}", status, url);
        }

        response
            .json::<Question>()
            .await
            .context("Failed to parse question response")
    }

    async fn submit_answer(&self, riddle_id: u32, answer: &str) -> Result<SubmitOutcome> {
        let url = self.endpoint(SUBMIT_PATH)?;
        let request_id = Uuid::new_v4();

        tracing::debug!(%request_id, "Submitting answer for riddle {} to {}", riddle_id, url);

        let body = SubmitRequest {
            riddle: riddle_id,
            user_answer: answer.to_string(),
        };

        let response = self
            .client
            .post(url)
            .header("X-Request-Id", request_id.to_string())
            .json(&body)
            .send()
            .await
            .context("Failed to connect to quiz service")?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let text = response
            .text()
            .await
            .context("Failed to read response body")?;

        tracing::debug!(%request_id, "Quiz service answered {}", status);

        interpret_submit_response(status, retry_after.as_deref(), &text)
    }
}

/// Validate the configured base URL and normalize it for joining
///
/// Plain HTTP is only accepted for loopback hosts.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).context("Invalid service URL")?;

    match url.scheme() {
        "https" => {}
        "http" if is_loopback(&url) => {
            tracing::debug!("Using plain HTTP for local service {}", url);
        }
        scheme => anyhow::bail!(
            "Service URL must use HTTPS (got: {}); plain HTTP is only allowed for localhost",
            scheme
        ),
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => domain == "localhost",
        Some(url::Host::Ipv4(ip)) => ip.is_loopback(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

/// Turn a submit response into an outcome
fn interpret_submit_response(
    status: StatusCode,
    retry_after: Option<&str>,
    body: &str,
) -> Result<SubmitOutcome> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = parse_retry_after(retry_after, body).unwrap_or_else(|| {
            tracing::warn!(
                "Rate limited without a retry hint, waiting {}s",
                DEFAULT_RETRY_AFTER.as_secs()
            );
            DEFAULT_RETRY_AFTER
        });
        return Ok(SubmitOutcome::RateLimited { retry_after });
    }

    if !status.is_success() {
        anyhow::bail!("Quiz service returned unexpected status: {}", status);
    }

    let result: SubmissionResult =
        serde_json::from_str(body).context("Failed to parse submission response")?;

    Ok(SubmitOutcome::Judged(result))
}

/// Retry hint in seconds, from the header or a `retry_after` body field
fn parse_retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(secs) = header.and_then(|h| h.trim().parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after")
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ServiceConfig {
        ServiceConfig {
            base_url: url.to_string(),
            timeout_secs: 5,
        }
    }

    #[test]
    fn accepts_https_url() {
        assert!(HttpQuizService::new(&config("https://quiz.example.com/api")).is_ok());
    }

    #[test]
    fn rejects_plain_http_for_remote_hosts() {
        assert!(HttpQuizService::new(&config("http://quiz.example.com")).is_err());
    }

    #[test]
    fn allows_plain_http_for_localhost() {
        assert!(HttpQuizService::new(&config("http://localhost:8000")).is_ok());
        assert!(HttpQuizService::new(&config("http://127.0.0.1:8000/api/")).is_ok());
    }

    #[test]
    fn rejects_invalid_url() {
        assert!(HttpQuizService::new(&config("not-a-url")).is_err());
    }

    #[test]
    fn endpoints_are_joined_below_base_path() {
        let service = HttpQuizService::new(&config("https://quiz.example.com/api")).unwrap();
        assert_eq!(
            service.endpoint(SUBMIT_PATH).unwrap().as_str(),
            "https://quiz.example.com/api/quiz/submit/"
        );
        assert_eq!(
            service.endpoint(QUESTIONS_PATH).unwrap().as_str(),
            "https://quiz.example.com/api/quiz/questions/"
        );
    }

    #[test]
    fn ok_response_is_judged() {
        let outcome = interpret_submit_response(
            StatusCode::OK,
            None,
            r#"{"allowed": true, "is_correct": true, "message": "Correct!"}"#,
        )
        .unwrap();

        match outcome {
            SubmitOutcome::Judged(result) => {
                assert!(result.is_correct);
                assert_eq!(result.message.as_deref(), Some("Correct!"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn too_many_requests_uses_retry_after_header() {
        let outcome =
            interpret_submit_response(StatusCode::TOO_MANY_REQUESTS, Some("45"), "").unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::RateLimited {
                retry_after: Duration::from_secs(45)
            }
        );
    }

    #[test]
    fn too_many_requests_falls_back_to_body_hint() {
        let outcome = interpret_submit_response(
            StatusCode::TOO_MANY_REQUESTS,
            None,
            r#"{"retry_after": 20}"#,
        )
        .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::RateLimited {
                retry_after: Duration::from_secs(20)
            }
        );
    }

    #[test]
    fn too_many_requests_without_hint_uses_default() {
        let outcome =
            interpret_submit_response(StatusCode::TOO_MANY_REQUESTS, Some("soon"), "busy")
                .unwrap();
        assert_eq!(
            outcome,
            SubmitOutcome::RateLimited {
                retry_after: DEFAULT_RETRY_AFTER
            }
        );
    }

    #[test]
    fn server_error_is_an_error() {
        assert!(interpret_submit_response(StatusCode::INTERNAL_SERVER_ERROR, None, "").is_err());
        assert!(interpret_submit_response(StatusCode::BAD_REQUEST, None, "{}").is_err());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(interpret_submit_response(StatusCode::OK, None, "<html>").is_err());
    }
}
