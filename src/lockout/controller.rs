use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::clock::Clock;
use super::format::format_time;
use super::store::{self, KeyValueStore};
use crate::service::{SubmissionResult, SubmitOutcome};

/// Longest lock ever written; longer server durations are shortened to this
pub const MAX_LOCK: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lock tuning for one riddle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutSettings {
    /// Lock applied after a wrong answer when the server sends no duration
    pub fallback_lock: Duration,
    /// How often the countdown is refreshed
    pub tick_interval: Duration,
}

/// Snapshot of a riddle's lock for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub riddle_id: u32,
    pub locked: bool,
    pub unlock_at: Option<DateTime<Utc>>,
    pub remaining_ms: i64,
    pub time_over: bool,
}

impl LockStatus {
    pub fn remaining_display(&self) -> String {
        format_time(self.remaining_ms)
    }
}

/// Result of one countdown step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Still locked
    Locked { remaining_ms: i64 },
    /// The lock ran out during this tick
    Expired,
    /// Nothing to count down, or the lock was cleared elsewhere
    Unlocked,
}

impl TickOutcome {
    pub fn is_locked(&self) -> bool {
        matches!(self, TickOutcome::Locked { .. })
    }
}

/// User-facing result of a submission attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feedback {
    EmptyAnswer,
    Locked { remaining_ms: i64 },
    Correct { message: Option<String> },
    Wrong { message: Option<String>, lock_ms: i64 },
    Refused { reason: Option<String> },
    RateLimited { retry_after_ms: i64 },
    Failed,
}

impl Feedback {
    /// Whether this feedback left the riddle locked
    pub fn started_lock(&self) -> bool {
        matches!(self, Feedback::Wrong { .. } | Feedback::RateLimited { .. })
    }
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feedback::EmptyAnswer => write!(f, "Please enter an answer."),
            Feedback::Locked { remaining_ms } => write!(
                f,
                "⏳ Please wait until the lock period is over ({} left).",
                format_time(*remaining_ms)
            ),
            Feedback::Correct { message } => {
                write!(f, "✅ {}", message.as_deref().unwrap_or("Correct!"))
            }
            Feedback::Wrong { message, lock_ms } => write!(
                f,
                "❌ {} Locked! Try again in {}",
                message.as_deref().unwrap_or("Wrong answer."),
                format_time(*lock_ms)
            ),
            Feedback::Refused { reason } => write!(
                f,
                "🚫 {}",
                reason.as_deref().unwrap_or("This riddle cannot be attempted yet.")
            ),
            Feedback::RateLimited { retry_after_ms } => write!(
                f,
                "⏳ Too many attempts. Try again in {}",
                format_time(*retry_after_ms)
            ),
            Feedback::Failed => write!(f, "Submission failed!"),
        }
    }
}

/// Tracks the answer lockout of a single riddle
///
/// The persisted unlock time is the only source of truth; the fields here are
/// a cache refreshed by `check_lock`, so the countdown and a submission in
/// flight can interleave freely.
pub struct LockoutController {
    riddle_id: u32,
    store: Box<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: LockoutSettings,
    unlock_at: Option<DateTime<Utc>>,
    remaining_ms: i64,
    locked: bool,
    time_over: bool,
}

impl LockoutController {
    pub fn new(
        riddle_id: u32,
        store: Box<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: LockoutSettings,
    ) -> Self {
        Self {
            riddle_id,
            store,
            clock,
            settings,
            unlock_at: None,
            remaining_ms: 0,
            locked: false,
            time_over: false,
        }
    }

    pub fn riddle_id(&self) -> u32 {
        self.riddle_id
    }

    pub fn settings(&self) -> &LockoutSettings {
        &self.settings
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn remaining_ms(&self) -> i64 {
        self.remaining_ms
    }

    pub fn unlock_at(&self) -> Option<DateTime<Utc>> {
        self.unlock_at
    }

    pub fn status(&self) -> LockStatus {
        LockStatus {
            riddle_id: self.riddle_id,
            locked: self.locked,
            unlock_at: self.unlock_at,
            remaining_ms: self.remaining_ms,
            time_over: self.time_over,
        }
    }

    /// Whether the last judged answer for this riddle was correct
    pub fn was_correct(&self) -> Result<Option<bool>> {
        store::read_flag(&*self.store, &store::is_correct_key(self.riddle_id))
    }

    /// Re-read the persisted unlock time and refresh the lock state
    ///
    /// An expired record is deleted and the riddle's time-over flag set; no
    /// other path here writes to storage.
    pub fn check_lock(&mut self) -> Result<bool> {
        Ok(self.refresh()? == Refresh::Active)
    }

    fn refresh(&mut self) -> Result<Refresh> {
        let key = store::timer_key(self.riddle_id);

        let unlock_at = match self.store.get(&key)? {
            None => None,
            Some(raw) => match parse_unlock_at(&raw) {
                Some(at) => Some(at),
                None => {
                    tracing::warn!("Discarding unreadable unlock time '{}' under {}", raw, key);
                    self.store.delete(&key)?;
                    None
                }
            },
        };

        let Some(unlock_at) = unlock_at else {
            self.set_unlocked();
            let time_over_key = store::time_over_key(self.riddle_id);
            self.time_over = store::read_flag(&*self.store, &time_over_key)?.unwrap_or(false);
            return Ok(Refresh::Absent);
        };

        let diff = (unlock_at - self.clock.now()).num_milliseconds();

        if diff <= 0 {
            tracing::info!("Lock on riddle {} expired", self.riddle_id);
            store::write_flag(&mut *self.store, &store::time_over_key(self.riddle_id), true)?;
            self.store.delete(&key)?;
            self.set_unlocked();
            self.time_over = true;
            return Ok(Refresh::Expired);
        }

        self.unlock_at = Some(unlock_at);
        self.remaining_ms = diff;
        self.locked = true;
        Ok(Refresh::Active)
    }

    /// Lock the riddle for `duration` starting now
    ///
    /// Durations longer than [`MAX_LOCK`] are shortened to it.
    pub fn start_lock(&mut self, duration: Duration) -> Result<()> {
        let duration = if duration > MAX_LOCK {
            tracing::warn!(
                "Lock of {}s on riddle {} exceeds the maximum, using {}s",
                duration.as_secs(),
                self.riddle_id,
                MAX_LOCK.as_secs()
            );
            MAX_LOCK
        } else {
            duration
        };

        let lock_ms = duration_ms(duration);
        let unlock_at = self
            .clock
            .now()
            .checked_add_signed(chrono::Duration::milliseconds(lock_ms))
            .context("Lock duration out of range")?;

        self.store.set(
            &store::timer_key(self.riddle_id),
            &unlock_at.timestamp_millis().to_string(),
        )?;
        store::write_flag(&mut *self.store, &store::time_over_key(self.riddle_id), false)?;

        tracing::info!(
            "Riddle {} locked for {} (until {})",
            self.riddle_id,
            format_time(lock_ms),
            unlock_at.format("%H:%M:%S")
        );

        self.unlock_at = Some(unlock_at);
        self.remaining_ms = lock_ms;
        self.locked = true;
        self.time_over = false;
        Ok(())
    }

    /// Drop any lock on the riddle
    pub fn clear_lock(&mut self) -> Result<()> {
        let key = store::timer_key(self.riddle_id);
        if self.store.get(&key)?.is_some() {
            self.store.delete(&key)?;
            tracing::debug!("Cleared lock on riddle {}", self.riddle_id);
        }
        self.set_unlocked();
        Ok(())
    }

    /// Apply what the quiz service said about a submission
    pub fn apply_outcome(&mut self, outcome: SubmitOutcome) -> Result<Feedback> {
        match outcome {
            SubmitOutcome::RateLimited { retry_after } => {
                tracing::warn!(
                    "Riddle {} rate limited for {}s",
                    self.riddle_id,
                    retry_after.as_secs()
                );
                self.start_lock(retry_after)?;
                Ok(Feedback::RateLimited {
                    retry_after_ms: self.remaining_ms,
                })
            }
            SubmitOutcome::Judged(result) => self.apply_result(result),
        }
    }

    fn apply_result(&mut self, result: SubmissionResult) -> Result<Feedback> {
        if result.is_correct {
            self.clear_lock()?;
            store::write_flag(&mut *self.store, &store::is_correct_key(self.riddle_id), true)?;
            tracing::info!("Riddle {} answered correctly", self.riddle_id);
            return Ok(Feedback::Correct {
                message: result.message,
            });
        }

        if !result.allowed {
            tracing::info!(
                "Riddle {} attempt refused: {}",
                self.riddle_id,
                result.reason.as_deref().unwrap_or("no reason given")
            );
            return Ok(Feedback::Refused {
                reason: result.reason,
            });
        }

        let lock = match result.lock_duration() {
            Some(lock) => lock,
            None => {
                tracing::debug!(
                    "No lock duration from server, using fallback of {}ms",
                    self.settings.fallback_lock.as_millis()
                );
                self.settings.fallback_lock
            }
        };

        self.start_lock(lock)?;
        store::write_flag(&mut *self.store, &store::is_correct_key(self.riddle_id), false)?;

        Ok(Feedback::Wrong {
            message: result.message,
            lock_ms: self.remaining_ms,
        })
    }

    /// One countdown step
    pub fn tick(&mut self) -> Result<TickOutcome> {
        Ok(match self.refresh()? {
            Refresh::Active => TickOutcome::Locked {
                remaining_ms: self.remaining_ms,
            },
            Refresh::Expired => TickOutcome::Expired,
            Refresh::Absent => TickOutcome::Unlocked,
        })
    }

    fn set_unlocked(&mut self) {
        self.unlock_at = None;
        self.remaining_ms = 0;
        self.locked = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    Absent,
    Expired,
    Active,
}

fn parse_unlock_at(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockout::clock::ManualClock;
    use crate::lockout::store::MemoryStore;
    use std::sync::Mutex;

    const T0: i64 = 1_700_000_000_000;

    /// Memory store that counts writes and deletes per key
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        sets: Vec<String>,
        deletes: Vec<String>,
    }

    impl CountingStore {
        fn sets_of(&self, key: &str) -> usize {
            self.sets.iter().filter(|k| *k == key).count()
        }

        fn deletes_of(&self, key: &str) -> usize {
            self.deletes.iter().filter(|k| *k == key).count()
        }
    }

    impl KeyValueStore for CountingStore {
        fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<()> {
            self.sets.push(key.to_string());
            self.inner.set(key, value)
        }

        fn delete(&mut self, key: &str) -> Result<()> {
            self.deletes.push(key.to_string());
            self.inner.delete(key)
        }
    }

    fn settings(fallback_ms: u64) -> LockoutSettings {
        LockoutSettings {
            fallback_lock: Duration::from_millis(fallback_ms),
            tick_interval: Duration::from_secs(1),
        }
    }

    fn controller(
        fallback_ms: u64,
    ) -> (LockoutController, Arc<Mutex<CountingStore>>, Arc<ManualClock>) {
        let store = Arc::new(Mutex::new(CountingStore::default()));
        let clock = Arc::new(ManualClock::at_millis(T0));
        let controller = LockoutController::new(
            1,
            Box::new(store.clone()),
            clock.clone(),
            settings(fallback_ms),
        );
        (controller, store, clock)
    }

    #[test]
    fn no_record_means_unlocked() {
        let (mut ctl, _, _) = controller(30_000);
        assert!(!ctl.check_lock().unwrap());
        assert_eq!(ctl.remaining_ms(), 0);
        assert!(ctl.unlock_at().is_none());
    }

    #[test]
    fn lock_reports_full_duration_immediately() {
        let (mut ctl, _, _) = controller(30_000);
        ctl.start_lock(Duration::from_millis(45_000)).unwrap();

        assert!(ctl.check_lock().unwrap());
        assert!(ctl.remaining_ms() <= 45_000);
        assert!(ctl.remaining_ms() >= 45_000 - 5);
    }

    #[test]
    fn lock_expires_after_duration_and_record_is_removed() {
        let (mut ctl, store, clock) = controller(30_000);
        ctl.start_lock(Duration::from_millis(180_000)).unwrap();

        clock.advance(chrono::Duration::milliseconds(179_999));
        assert!(ctl.check_lock().unwrap());
        assert_eq!(ctl.remaining_ms(), 1);

        clock.advance(chrono::Duration::milliseconds(2));
        assert!(!ctl.check_lock().unwrap());
        assert_eq!(ctl.remaining_ms(), 0);

        let store = store.lock().unwrap();
        assert!(store.get("timer_riddle1").unwrap().is_none());
        assert_eq!(store.deletes_of("timer_riddle1"), 1);
        assert_eq!(store.get("timeOver_riddle1").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn lock_is_expired_exactly_at_unlock_time() {
        let (mut ctl, _, clock) = controller(30_000);
        ctl.start_lock(Duration::from_millis(1_000)).unwrap();

        clock.advance(chrono::Duration::milliseconds(1_000));
        assert!(!ctl.check_lock().unwrap());
        assert!(ctl.status().time_over);
    }

    #[test]
    fn lock_survives_a_new_controller() {
        let store = Arc::new(Mutex::new(MemoryStore::new()));
        let clock = Arc::new(ManualClock::at_millis(T0));

        let mut first =
            LockoutController::new(3, Box::new(store.clone()), clock.clone(), settings(1_000));
        first.start_lock(Duration::from_secs(60)).unwrap();
        drop(first);

        clock.advance(chrono::Duration::seconds(20));
        let mut second =
            LockoutController::new(3, Box::new(store.clone()), clock.clone(), settings(1_000));
        assert!(second.check_lock().unwrap());
        assert_eq!(second.remaining_ms(), 40_000);
    }

    #[test]
    fn unreadable_record_is_discarded() {
        let (mut ctl, store, _) = controller(30_000);
        store.lock().unwrap().set("timer_riddle1", "soon").unwrap();

        assert!(!ctl.check_lock().unwrap());
        assert!(store.lock().unwrap().get("timer_riddle1").unwrap().is_none());
    }

    #[test]
    fn wrong_answer_without_duration_uses_fallback() {
        let (mut ctl, store, _) = controller(30_000);

        let feedback = ctl
            .apply_outcome(SubmitOutcome::Judged(SubmissionResult::wrong(None)))
            .unwrap();

        assert_eq!(
            feedback,
            Feedback::Wrong {
                message: None,
                lock_ms: 30_000
            }
        );
        assert!(ctl.is_locked());
        assert_eq!(ctl.remaining_ms(), 30_000);

        let store = store.lock().unwrap();
        assert_eq!(
            store.get("timer_riddle1").unwrap(),
            Some((T0 + 30_000).to_string())
        );
        assert_eq!(store.get("isCorrect_riddle1").unwrap().as_deref(), Some("false"));
    }

    #[test]
    fn wrong_answer_prefers_server_duration() {
        let (mut ctl, _, _) = controller(30_000);

        ctl.apply_outcome(SubmitOutcome::Judged(SubmissionResult::wrong(Some(90_000))))
            .unwrap();

        assert_eq!(ctl.remaining_ms(), 90_000);
    }

    #[test]
    fn lock_start_writes_unlock_record_once() {
        let (mut ctl, store, _) = controller(30_000);

        ctl.apply_outcome(SubmitOutcome::Judged(SubmissionResult::wrong(Some(5_000))))
            .unwrap();

        let store = store.lock().unwrap();
        assert_eq!(store.sets_of("timer_riddle1"), 1);
        assert_eq!(store.deletes_of("timer_riddle1"), 0);
    }

    #[test]
    fn correct_answer_clears_existing_lock() {
        let (mut ctl, store, _) = controller(30_000);
        ctl.start_lock(Duration::from_secs(120)).unwrap();
        assert!(ctl.is_locked());

        let feedback = ctl
            .apply_outcome(SubmitOutcome::Judged(SubmissionResult::correct()))
            .unwrap();

        assert_eq!(feedback, Feedback::Correct { message: None });
        assert!(!ctl.is_locked());
        assert!(!ctl.check_lock().unwrap());

        let store = store.lock().unwrap();
        assert!(store.get("timer_riddle1").unwrap().is_none());
        assert_eq!(store.deletes_of("timer_riddle1"), 1);
        assert_eq!(store.get("isCorrect_riddle1").unwrap().as_deref(), Some("true"));
    }

    #[test]
    fn correct_answer_without_lock_deletes_nothing() {
        let (mut ctl, store, _) = controller(30_000);

        ctl.apply_outcome(SubmitOutcome::Judged(SubmissionResult::correct()))
            .unwrap();

        assert_eq!(store.lock().unwrap().deletes_of("timer_riddle1"), 0);
        assert_eq!(ctl.was_correct().unwrap(), Some(true));
    }

    #[test]
    fn refused_attempt_leaves_lock_untouched() {
        let (mut ctl, store, _) = controller(30_000);
        let result = SubmissionResult {
            allowed: false,
            is_correct: false,
            lock_duration_ms: None,
            message: None,
            reason: Some("Riddle 1 not solved yet.".to_string()),
        };

        let feedback = ctl.apply_outcome(SubmitOutcome::Judged(result)).unwrap();

        assert_eq!(
            feedback,
            Feedback::Refused {
                reason: Some("Riddle 1 not solved yet.".to_string())
            }
        );
        assert!(!ctl.is_locked());
        assert_eq!(store.lock().unwrap().sets_of("timer_riddle1"), 0);
    }

    #[test]
    fn rate_limit_locks_for_retry_after() {
        let (mut ctl, _, _) = controller(30_000);

        let feedback = ctl
            .apply_outcome(SubmitOutcome::RateLimited {
                retry_after: Duration::from_secs(12),
            })
            .unwrap();

        assert_eq!(feedback, Feedback::RateLimited { retry_after_ms: 12_000 });
        assert!(feedback.started_lock());
        assert!(ctl.check_lock().unwrap());
        assert_eq!(ctl.remaining_ms(), 12_000);
    }

    #[test]
    fn huge_server_duration_is_capped() {
        let (mut ctl, store, clock) = controller(30_000);
        let max_ms = MAX_LOCK.as_millis() as i64;

        let feedback = ctl
            .apply_outcome(SubmitOutcome::Judged(SubmissionResult::wrong(Some(
                i64::MAX / 2,
            ))))
            .unwrap();

        assert_eq!(
            feedback,
            Feedback::Wrong {
                message: None,
                lock_ms: max_ms
            }
        );
        assert!(ctl.check_lock().unwrap());
        assert_eq!(
            store.lock().unwrap().get("timer_riddle1").unwrap().as_deref(),
            Some((T0 + max_ms).to_string().as_str())
        );

        clock.advance(chrono::Duration::milliseconds(max_ms + 1));
        assert!(!ctl.check_lock().unwrap());
    }

    #[test]
    fn huge_retry_after_is_capped() {
        let (mut ctl, _, _) = controller(30_000);

        let feedback = ctl
            .apply_outcome(SubmitOutcome::RateLimited {
                retry_after: Duration::from_secs(u64::MAX / 4),
            })
            .unwrap();

        assert_eq!(
            feedback,
            Feedback::RateLimited {
                retry_after_ms: MAX_LOCK.as_millis() as i64
            }
        );
        assert!(ctl.is_locked());
    }

    #[test]
    fn tick_counts_down_then_expires() {
        let (mut ctl, _, clock) = controller(30_000);
        ctl.start_lock(Duration::from_millis(2_500)).unwrap();

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(ctl.tick().unwrap(), TickOutcome::Locked { remaining_ms: 1_500 });

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(ctl.tick().unwrap(), TickOutcome::Locked { remaining_ms: 500 });

        clock.advance(chrono::Duration::seconds(1));
        assert_eq!(ctl.tick().unwrap(), TickOutcome::Expired);
        assert!(ctl.status().time_over);
    }

    #[test]
    fn tick_without_lock_is_unlocked() {
        let (mut ctl, _, _) = controller(30_000);
        assert_eq!(ctl.tick().unwrap(), TickOutcome::Unlocked);
    }

    #[test]
    fn new_lock_resets_time_over_flag() {
        let (mut ctl, store, clock) = controller(30_000);
        ctl.start_lock(Duration::from_millis(10)).unwrap();
        clock.advance(chrono::Duration::milliseconds(20));
        ctl.check_lock().unwrap();
        assert!(ctl.status().time_over);

        ctl.start_lock(Duration::from_millis(10)).unwrap();
        assert!(!ctl.status().time_over);
        assert_eq!(
            store.lock().unwrap().get("timeOver_riddle1").unwrap().as_deref(),
            Some("false")
        );
    }

    #[test]
    fn feedback_messages_render_remaining_time() {
        assert_eq!(Feedback::Failed.to_string(), "Submission failed!");
        assert_eq!(
            Feedback::Locked { remaining_ms: 61_000 }.to_string(),
            "⏳ Please wait until the lock period is over (01:01 left)."
        );
        assert_eq!(
            Feedback::Wrong {
                message: Some("Wrong answer for riddle 1.".to_string()),
                lock_ms: 180_000
            }
            .to_string(),
            "❌ Wrong answer for riddle 1. Locked! Try again in 03:00"
        );
    }
}
