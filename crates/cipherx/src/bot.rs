//! Posting scheduler: cooldown, single-flight generation and the recurring timer.
//!
//! At most one generate-and-post cycle runs at a time. A cycle requested while
//! another is in flight fails with [`BotError::GenerationInProgress`]; a timer
//! tick that lands during one is dropped. A post is stamped with the time its
//! cycle started, so consecutive ticks one interval apart both post. `stop()`
//! only prevents future ticks, a cycle already talking to the network runs to
//! completion.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{validate_tweet, BotError};
use crate::generator::TweetSource;
use crate::twitter::{AccessToken, CredentialStore, PostedTweet, TweetPublisher};

/// Default minimum time between posts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(4 * 60 * 60);

/// Cooldown a timer tick tolerates, absorbing jitter between the tick and the wall clock.
pub const TICK_SLACK: Duration = Duration::from_secs(1);

/// Snapshot of scheduler state for the status route.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BotStatus {
    pub running: bool,
    pub is_generating: bool,
    pub last_post_time: Option<DateTime<Utc>>,
    pub next_post_at: Option<DateTime<Utc>>,
    pub interval_minutes: u64,
}

/// Clears the in-flight flag when a cycle ends, whichever way it ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct Timer {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The posting scheduler.
pub struct TweetBot {
    source: Arc<dyn TweetSource>,
    publisher: Arc<dyn TweetPublisher>,
    store: Arc<CredentialStore>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    generating: AtomicBool,
    last_post: Mutex<Option<DateTime<Utc>>>,
    timer: Mutex<Option<Timer>>,
}

impl TweetBot {
    #[must_use]
    pub fn new(
        source: Arc<dyn TweetSource>,
        publisher: Arc<dyn TweetPublisher>,
        store: Arc<CredentialStore>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            publisher,
            store,
            clock,
            interval,
            generating: AtomicBool::new(false),
            last_post: Mutex::new(None),
            timer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left before the next post is allowed, if any.
    #[must_use]
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let last = (*lock(&self.last_post))?;
        // A clock that moved backwards counts as no time elapsed.
        let elapsed = (self.clock.now() - last).to_std().unwrap_or(Duration::ZERO);
        self.interval.checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// True when nothing was posted yet or the interval has fully elapsed.
    #[must_use]
    pub fn is_time_to_tweet(&self) -> bool {
        self.cooldown_remaining().is_none()
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.generating.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        lock(&self.timer).is_some()
    }

    #[must_use]
    pub fn last_post_time(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_post)
    }

    /// Mark a successful post at the current time.
    pub fn record_post(&self) {
        self.record_post_at(self.clock.now());
    }

    /// Cycles are stamped with their start time; a later stamp is never replaced by an earlier one.
    fn record_post_at(&self, at: DateTime<Utc>) {
        let mut last = lock(&self.last_post);
        *last = Some(last.map_or(at, |prev| prev.max(at)));
    }

    #[must_use]
    pub fn status(&self) -> BotStatus {
        let last_post_time = self.last_post_time();
        let next_post_at = last_post_time.and_then(|last| {
            chrono::Duration::from_std(self.interval)
                .ok()
                .and_then(|interval| last.checked_add_signed(interval))
        });
        BotStatus {
            running: self.is_running(),
            is_generating: self.is_generating(),
            last_post_time,
            next_post_at,
            interval_minutes: self.interval.as_secs() / 60,
        }
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(&self.generating))
    }

    /// Take the in-flight guard, then confirm the cooldown allows a post.
    ///
    /// The cooldown is read while holding the guard. Cooldowns of at most
    /// `slack` are ignored.
    fn begin_cycle(&self, slack: Duration) -> Result<InFlight<'_>, BotError> {
        let guard = self.try_begin().ok_or(BotError::GenerationInProgress)?;
        match self.cooldown_remaining() {
            Some(remaining) if remaining > slack => Err(BotError::CooldownActive { remaining }),
            _ => Ok(guard),
        }
    }

    /// Validate and publish `text`.
    ///
    /// Uses `token` when given, otherwise the stored credential. An upstream
    /// 401 clears the stored credential only when it was the one rejected.
    pub async fn post_tweet(
        &self,
        text: &str,
        token: Option<&AccessToken>,
    ) -> Result<PostedTweet, BotError> {
        let started = self.clock.now();
        self.publish(text, token, started).await
    }

    async fn publish(
        &self,
        text: &str,
        token: Option<&AccessToken>,
        started: DateTime<Utc>,
    ) -> Result<PostedTweet, BotError> {
        validate_tweet(text)?;

        let stored = self.store.current();
        let token = token
            .or(stored.as_ref())
            .ok_or(BotError::NotAuthenticated)?;

        match self.publisher.publish(text, token).await {
            Ok(posted) => {
                self.record_post_at(started);
                Ok(posted)
            }
            Err(BotError::AuthFailed) => {
                if stored.as_ref() == Some(token) {
                    warn!("Twitter rejected stored credentials, clearing stored token");
                    self.store.clear();
                } else {
                    warn!("Twitter rejected request credentials");
                }
                Err(BotError::AuthFailed)
            }
            Err(e) => Err(e),
        }
    }

    /// Post `text`, or a freshly generated update when `text` is `None`.
    ///
    /// Refuses with [`BotError::CooldownActive`] inside the interval and with
    /// [`BotError::GenerationInProgress`] while another cycle runs.
    pub async fn manual_tweet(
        &self,
        text: Option<String>,
        token: Option<AccessToken>,
    ) -> Result<PostedTweet, BotError> {
        if let Some(text) = &text {
            validate_tweet(text)?;
        }
        if let Some(remaining) = self.cooldown_remaining() {
            return Err(BotError::CooldownActive { remaining });
        }
        let _guard = self.begin_cycle(Duration::ZERO)?;
        let started = self.clock.now();

        let generated = text.is_none();
        let text = match text {
            Some(text) => text,
            None => self.source.generate_update().await?,
        };
        info!(
            length = text.chars().count(),
            generated,
            "Manual tweet request"
        );

        let result = self.publish(&text, token.as_ref(), started).await;
        match &result {
            Ok(_) => info!("Manual tweet successful"),
            Err(e) => error!(error = %e, "Manual tweet failed"),
        }
        result
    }

    /// One timer tick: generate and post unless a cycle is running or the
    /// cooldown has more than [`TICK_SLACK`] left.
    pub async fn run_cycle(&self) {
        let _guard = match self.begin_cycle(TICK_SLACK) {
            Ok(guard) => guard,
            Err(e) => {
                debug!(reason = %e, "Skipping cycle");
                return;
            }
        };
        let started = self.clock.now();

        let result = async {
            let text = self.source.generate_update().await?;
            self.publish(&text, None, started).await
        }
        .await;

        match result {
            Ok(posted) => info!(
                tweet_id = posted.id.as_deref().unwrap_or("unknown"),
                "Generated and posted tweet"
            ),
            Err(e) => error!(error = %e, "Failed to generate and post tweet"),
        }
    }

    /// Begin automatic posting: one cycle now, then one per interval.
    ///
    /// Returns `false` when already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut timer = lock(&self.timer);
        if timer.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let bot = Arc::clone(self);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    () = child.cancelled() => break,
                    _ = ticker.tick() => {
                        let bot = Arc::clone(&bot);
                        tokio::spawn(async move { bot.run_cycle().await });
                    }
                }
            }
            debug!("Scheduler timer exited");
        });

        *timer = Some(Timer { cancel, handle });
        info!(
            interval_minutes = period.as_secs() / 60,
            "Starting automatic tweet generation"
        );
        true
    }

    /// Stop automatic posting. Returns `false` when not running.
    pub fn stop(&self) -> bool {
        let Some(timer) = lock(&self.timer).take() else {
            return false;
        };
        timer.cancel.cancel();
        drop(timer.handle);
        info!("Stopped automatic tweet generation");
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
