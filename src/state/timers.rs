use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, sleep_until};

/// Shortest vote countdown the engine will schedule.
pub const MIN_VOTE_DURATION: Duration = Duration::from_secs(5);
/// Shortest auto-repeat cooldown the engine will schedule.
pub const MIN_AUTO_REPEAT_DURATION: Duration = Duration::from_secs(20);

/// Which deadline a timer tick belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// The vote-phase countdown.
    Vote,
    /// The cooldown before the next automatic cycle.
    AutoRepeat,
}

/// Observable state of the timer subsystem, for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerStatus {
    /// Which deadline is armed or paused.
    pub kind: TimerKind,
    /// Time left until the deadline fires (frozen while paused).
    pub remaining: Duration,
    /// Whether the deadline is currently paused.
    pub paused: bool,
}

struct ScheduledTimer {
    deadline: Instant,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct Slots {
    vote: Option<ScheduledTimer>,
    auto_repeat: Option<ScheduledTimer>,
    paused: Option<(TimerKind, Duration)>,
}

impl Slots {
    fn slot_mut(&mut self, kind: TimerKind) -> &mut Option<ScheduledTimer> {
        match kind {
            TimerKind::Vote => &mut self.vote,
            TimerKind::AutoRepeat => &mut self.auto_repeat,
        }
    }
}

/// Manages the vote countdown and the auto-repeat cooldown.
///
/// At most one deadline of each kind exists at any instant. Ticks are pushed
/// onto a channel drained by the session worker, so firing never interleaves
/// with other mutations; a tick that raced a cancel is neutralized by the
/// worker's phase guards.
pub struct CycleTimers {
    tx: mpsc::UnboundedSender<TimerKind>,
    slots: Arc<Mutex<Slots>>,
}

impl CycleTimers {
    /// Create the timer subsystem plus the receiving end of its tick channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKind>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                slots: Arc::new(Mutex::new(Slots::default())),
            },
            rx,
        )
    }

    /// Arm the vote countdown, replacing any previous one. The duration is
    /// clamped to [`MIN_VOTE_DURATION`].
    pub fn start_vote(&self, duration: Duration) {
        self.schedule(TimerKind::Vote, duration.max(MIN_VOTE_DURATION));
    }

    /// Arm the auto-repeat cooldown, replacing any previous one. The delay is
    /// clamped to [`MIN_AUTO_REPEAT_DURATION`].
    pub fn start_auto_repeat(&self, delay: Duration) {
        self.schedule(TimerKind::AutoRepeat, delay.max(MIN_AUTO_REPEAT_DURATION));
    }

    /// Freeze whichever deadline is currently armed, remembering exactly how
    /// much time it had left. Returns whether anything was paused.
    pub fn pause(&self) -> bool {
        let mut slots = self.lock();
        if slots.paused.is_some() {
            return false;
        }

        let (kind, timer) = if let Some(timer) = slots.vote.take() {
            (TimerKind::Vote, timer)
        } else if let Some(timer) = slots.auto_repeat.take() {
            (TimerKind::AutoRepeat, timer)
        } else {
            return false;
        };

        timer.task.abort();
        let remaining = timer.deadline.saturating_duration_since(Instant::now());
        slots.paused = Some((kind, remaining));
        true
    }

    /// Re-arm a paused deadline for exactly the remaining time captured at
    /// pause, however long the pause lasted. With nothing stored, fall back
    /// to a fresh auto-repeat cycle when one is configured. Returns the kind
    /// that was armed, if any.
    pub fn resume(&self, auto_repeat: Option<Duration>) -> Option<TimerKind> {
        let stored = self.lock().paused.take();
        match stored {
            Some((kind, remaining)) => {
                // No minimum clamp here: pause/resume must not drift.
                self.schedule(kind, remaining);
                Some(kind)
            }
            None => auto_repeat.map(|delay| {
                self.start_auto_repeat(delay);
                TimerKind::AutoRepeat
            }),
        }
    }

    /// Drop the vote deadline and any paused vote bookkeeping.
    pub fn cancel_vote(&self) {
        let mut slots = self.lock();
        if let Some(timer) = slots.vote.take() {
            timer.task.abort();
        }
        if matches!(slots.paused, Some((TimerKind::Vote, _))) {
            slots.paused = None;
        }
    }

    /// Drop both deadlines and any paused bookkeeping.
    pub fn cancel_all(&self) {
        let mut slots = self.lock();
        for timer in [slots.vote.take(), slots.auto_repeat.take()]
            .into_iter()
            .flatten()
        {
            timer.task.abort();
        }
        slots.paused = None;
    }

    /// Whether a deadline is currently frozen.
    pub fn is_paused(&self) -> bool {
        self.lock().paused.is_some()
    }

    /// Current timer state for display, preferring the armed deadline and
    /// falling back to the paused one.
    pub fn status(&self) -> Option<TimerStatus> {
        let slots = self.lock();
        let now = Instant::now();
        let active = |kind, timer: &ScheduledTimer| TimerStatus {
            kind,
            remaining: timer.deadline.saturating_duration_since(now),
            paused: false,
        };

        if let Some(timer) = slots.vote.as_ref() {
            return Some(active(TimerKind::Vote, timer));
        }
        if let Some(timer) = slots.auto_repeat.as_ref() {
            return Some(active(TimerKind::AutoRepeat, timer));
        }
        slots.paused.map(|(kind, remaining)| TimerStatus {
            kind,
            remaining,
            paused: true,
        })
    }

    fn schedule(&self, kind: TimerKind, duration: Duration) {
        let deadline = Instant::now() + duration;
        let slots = Arc::clone(&self.slots);
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            sleep_until(deadline).await;
            let mut guard = match slots.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Only clear our own slot; a replacement deadline may already
            // have been armed by the time a late fire gets here.
            let slot = guard.slot_mut(kind);
            if slot.as_ref().is_some_and(|timer| timer.deadline == deadline) {
                *slot = None;
            }
            drop(guard);
            let _ = tx.send(kind);
        });

        if let Some(previous) = self
            .lock()
            .slot_mut(kind)
            .replace(ScheduledTimer { deadline, task })
        {
            previous.task.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::task::yield_now;

    async fn settle() {
        // Give spawned timer tasks a chance to observe advanced time.
        for _ in 0..8 {
            yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn vote_timer_fires_once_after_its_duration() {
        let (timers, mut rx) = CycleTimers::new();
        timers.start_vote(Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(29)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::Vote));
        assert!(timers.status().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn durations_are_clamped_to_minimums() {
        let (timers, mut rx) = CycleTimers::new();
        timers.start_vote(Duration::from_secs(1));

        tokio::time::advance(Duration::from_secs(4)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::Vote));

        timers.start_auto_repeat(Duration::from_secs(10));
        let status = timers.status().unwrap();
        assert_eq!(status.kind, TimerKind::AutoRepeat);
        assert_eq!(status.remaining, MIN_AUTO_REPEAT_DURATION);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_previous_deadline() {
        let (timers, mut rx) = CycleTimers::new();
        timers.start_vote(Duration::from_secs(10));
        timers.start_vote(Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::Vote));
        settle().await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_preserves_exact_remaining_time() {
        let (timers, mut rx) = CycleTimers::new();
        timers.start_vote(Duration::from_secs(30));

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(timers.pause());

        let status = timers.status().unwrap();
        assert!(status.paused);
        assert_eq!(status.remaining, Duration::from_secs(10));

        // An arbitrarily long pause must not eat into the remaining time.
        tokio::time::advance(Duration::from_secs(3600)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        assert_eq!(timers.resume(None), Some(TimerKind::Vote));
        tokio::time::advance(Duration::from_secs(9)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::Vote));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_with_nothing_armed_is_a_no_op() {
        let (timers, _rx) = CycleTimers::new();
        assert!(!timers.pause());
        assert!(!timers.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn resume_without_pause_starts_fresh_auto_repeat() {
        let (timers, mut rx) = CycleTimers::new();
        assert_eq!(timers.resume(None), None);
        assert_eq!(
            timers.resume(Some(Duration::from_secs(25))),
            Some(TimerKind::AutoRepeat)
        );

        tokio::time::advance(Duration::from_secs(25)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::AutoRepeat));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_clears_deadlines_and_paused_state() {
        let (timers, mut rx) = CycleTimers::new();
        timers.start_vote(Duration::from_secs(10));
        timers.pause();
        timers.cancel_all();

        assert!(timers.status().is_none());
        assert!(!timers.is_paused());

        tokio::time::advance(Duration::from_secs(120)).await;
        settle().await;
        assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_vote_leaves_auto_repeat_alone() {
        let (timers, mut rx) = CycleTimers::new();
        timers.start_auto_repeat(Duration::from_secs(20));
        timers.cancel_vote();

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(rx.recv().await, Some(TimerKind::AutoRepeat));
    }
}
