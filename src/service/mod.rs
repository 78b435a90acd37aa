//! Remote quiz backend
//!
//! The backend serves the riddle text and judges answers. A wrong answer comes
//! back with the lock duration the client should enforce.

mod client;
mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use client::{HttpQuizService, parse_base_url};
pub use types::{Question, SubmissionResult, SubmitOutcome, SubmitRequest};

/// Backend that serves riddles and judges answers
#[async_trait]
pub trait QuizService: Send + Sync {
    /// Fetch the riddle text for the current user
    async fn fetch_question(&self) -> Result<Question>;

    /// Submit an answer for judging
    async fn submit_answer(&self, riddle_id: u32, answer: &str) -> Result<SubmitOutcome>;
}
