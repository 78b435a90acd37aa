use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::utils::{controller_for, open_store};
use crate::config::Config;
use crate::lockout::{Feedback, LockStatus, TickOutcome, TokioScheduler};
use crate::service::{HttpQuizService, QuizService};
use crate::session::{QuizSession, TickObserver};

/// Print the current riddle
pub async fn question(config: &Config) -> Result<()> {
    let service = HttpQuizService::new(&config.service)?;
    let question = service
        .fetch_question()
        .await
        .context("Failed to fetch the riddle")?;

    println!("{}", question.riddle);
    Ok(())
}

/// Submit one answer and report the verdict
pub async fn submit(config: &Config, riddle_id: u32, answer: &str) -> Result<()> {
    let mut session = open_session(config, riddle_id)?;

    let feedback = session.submit(answer).await?;
    println!("{}", feedback);

    Ok(())
}

/// Interactive loop: show the riddle, read answers, count down locks
pub async fn play(config: &Config, riddle_id: u32) -> Result<()> {
    let observer: TickObserver = Arc::new(print_countdown);
    let mut session = open_session(config, riddle_id)?.with_observer(observer);

    println!("=== {} ===\n", config.riddle_name(riddle_id));

    let status = session.mount().await?;
    match session.question() {
        Some(question) => println!("{}\n", question),
        None => println!("(Could not load the riddle text)\n"),
    }

    if status.locked {
        println!("⏳ Locked! Try again in {}", status.remaining_display());
    }

    println!("Type your answer and press Enter (empty line or Ctrl+D to quit).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("Failed to read answer")? else {
            break;
        };

        if line.trim().is_empty() {
            break;
        }

        let feedback = session.submit(&line).await?;
        println!("{}", feedback);

        if matches!(feedback, Feedback::Correct { .. }) {
            break;
        }
    }

    session.unmount();
    Ok(())
}

fn open_session(config: &Config, riddle_id: u32) -> Result<QuizSession<HttpQuizService>> {
    let service = HttpQuizService::new(&config.service)?;
    let store = open_store(config)?;
    let controller = controller_for(config, riddle_id, Box::new(store));
    let scheduler = Arc::new(TokioScheduler::current()?);

    Ok(QuizSession::new(service, controller, scheduler))
}

fn print_countdown(status: &LockStatus, outcome: TickOutcome) {
    match outcome {
        TickOutcome::Locked { .. } => {
            print!("\r⏳ Locked! Try again in {}   ", status.remaining_display());
        }
        TickOutcome::Expired => {
            print!("\r🔓 Lock over, you can answer again.\n> ");
        }
        TickOutcome::Unlocked => {}
    }
    std::io::stdout().flush().ok();
}
