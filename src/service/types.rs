use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Riddle text returned by the question endpoint
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Question {
    pub riddle: String,
}

/// Body sent to the submit endpoint
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubmitRequest {
    pub riddle: u32,
    pub user_answer: String,
}

/// Verdict on a submitted answer
///
/// Older client builds used camelCase names for these fields; they are still
/// accepted when reading.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SubmissionResult {
    /// False when the backend refused to judge the attempt at all
    #[serde(default = "default_allowed")]
    pub allowed: bool,

    #[serde(alias = "isCorrect")]
    pub is_correct: bool,

    #[serde(default, alias = "lockDurationMs", skip_serializing_if = "Option::is_none")]
    pub lock_duration_ms: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

fn default_allowed() -> bool {
    true
}

impl SubmissionResult {
    pub fn correct() -> Self {
        Self {
            allowed: true,
            is_correct: true,
            lock_duration_ms: None,
            message: None,
            reason: None,
        }
    }

    pub fn wrong(lock_duration_ms: Option<i64>) -> Self {
        Self {
            allowed: true,
            is_correct: false,
            lock_duration_ms,
            message: None,
            reason: None,
        }
    }

    /// Server lock duration, ignoring missing or non-positive values
    pub fn lock_duration(&self) -> Option<Duration> {
        self.lock_duration_ms
            .filter(|ms| *ms > 0)
            .map(|ms| Duration::from_millis(ms as u64))
    }
}

/// What the quiz service made of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The answer was judged (or refused) normally
    Judged(SubmissionResult),
    /// Too many attempts; the server asks to wait before the next one
    RateLimited { retry_after: Duration },
}
