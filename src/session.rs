use anyhow::Result;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::lockout::{
    Feedback, LockStatus, LockoutController, Scheduler, TickHandle, TickOutcome,
};
use crate::service::QuizService;

/// Called after every countdown tick
pub type TickObserver = Arc<dyn Fn(&LockStatus, TickOutcome) + Send + Sync>;

/// One riddle on screen: question, answer box and lockout countdown
///
/// The countdown runs on the scheduler only while the riddle is locked and is
/// cancelled on `unmount` (or drop).
pub struct QuizSession<Q: QuizService> {
    service: Q,
    controller: Arc<Mutex<LockoutController>>,
    scheduler: Arc<dyn Scheduler>,
    observer: Option<TickObserver>,
    ticker: Option<TickHandle>,
    question: Option<String>,
}

impl<Q: QuizService> QuizSession<Q> {
    pub fn new(service: Q, controller: LockoutController, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            service,
            controller: Arc::new(Mutex::new(controller)),
            scheduler,
            observer: None,
            ticker: None,
            question: None,
        }
    }

    /// Get notified of every countdown tick
    pub fn with_observer(mut self, observer: TickObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Riddle text, once fetched
    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Fetch the question and pick up any lock left from an earlier run
    pub async fn mount(&mut self) -> Result<LockStatus> {
        match self.service.fetch_question().await {
            Ok(question) => self.question = Some(question.riddle),
            Err(e) => tracing::error!("Error fetching question: {:#}", e),
        }

        let status = {
            let mut controller = self.lock_controller()?;
            controller.check_lock()?;
            controller.status()
        };

        if status.locked {
            tracing::info!(
                "Riddle {} is locked for another {}",
                status.riddle_id,
                status.remaining_display()
            );
            self.start_ticking();
        }

        Ok(status)
    }

    /// Submit an answer unless it is empty or the riddle is locked
    pub async fn submit(&mut self, answer: &str) -> Result<Feedback> {
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(Feedback::EmptyAnswer);
        }

        let riddle_id = {
            let mut controller = self.lock_controller()?;
            if controller.check_lock()? {
                tracing::debug!("Rejected submission while locked");
                return Ok(Feedback::Locked {
                    remaining_ms: controller.remaining_ms(),
                });
            }
            controller.riddle_id()
        };

        let outcome = match self.service.submit_answer(riddle_id, answer).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("Submission for riddle {} failed: {:#}", riddle_id, e);
                return Ok(Feedback::Failed);
            }
        };

        let feedback = self.lock_controller()?.apply_outcome(outcome)?;

        if feedback.started_lock() {
            self.start_ticking();
        }

        Ok(feedback)
    }

    /// Current lock state, re-read from storage
    pub fn status(&self) -> Result<LockStatus> {
        let mut controller = self.lock_controller()?;
        controller.check_lock()?;
        Ok(controller.status())
    }

    /// Stop the countdown
    pub fn unmount(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.cancel();
            tracing::debug!("Countdown cancelled");
        }
    }

    fn start_ticking(&mut self) {
        if self.is_ticking() {
            return;
        }

        let (interval, riddle_id) = {
            let Ok(controller) = self.controller.lock() else {
                tracing::error!("Lockout state poisoned, countdown not started");
                return;
            };
            (controller.settings().tick_interval, controller.riddle_id())
        };

        let controller = self.controller.clone();
        let observer = self.observer.clone();

        let task = Box::new(move || {
            let (outcome, status) = {
                let Ok(mut controller) = controller.lock() else {
                    tracing::error!("Lockout state poisoned, stopping countdown");
                    return ControlFlow::Break(());
                };

                match controller.tick() {
                    Ok(outcome) => (outcome, controller.status()),
                    Err(e) => {
                        tracing::error!("Lock check for riddle {} failed: {:#}", riddle_id, e);
                        return ControlFlow::Continue(());
                    }
                }
            };

            if let Some(observer) = &observer {
                observer(&status, outcome);
            }

            if outcome.is_locked() {
                ControlFlow::Continue(())
            } else {
                tracing::debug!("Countdown for riddle {} finished ({:?})", riddle_id, outcome);
                ControlFlow::Break(())
            }
        });

        self.ticker = Some(self.scheduler.schedule_every(interval, task));
    }

    fn lock_controller(&self) -> Result<MutexGuard<'_, LockoutController>> {
        self.controller
            .lock()
            .map_err(|_| anyhow::anyhow!("Lockout state poisoned"))
    }
}

impl<Q: QuizService> Drop for QuizSession<Q> {
    fn drop(&mut self) {
        self.unmount();
    }
}
