//! Daily reminder scheduling.
//!
//! `arm` computes the next wall-clock fire instant for a target
//! hour:minute, spawns a single task that sleeps until then, notifies,
//! and re-arms itself for the following day. Re-arming replaces any
//! pending fire; there is never more than one pending fire per
//! scheduler.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::location::{Capability, PermissionGate};

pub const REMINDER_TITLE: &str = "Daily Diary";
pub const REMINDER_MESSAGE: &str = "Add today's diary entry!";
pub const REMINDER_DEEP_LINK: &str = "photodiary://add";

/// Fire-and-forget notification sink; the scheduler never consumes a
/// result from it.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str, deep_link: &str);
}

/// Writes reminders to the log; the binary's stand-in for an OS
/// notification surface.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str, deep_link: &str) {
        info!("notification: {title} - {message} ({deep_link})");
    }
}

struct Pending {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    fire_at: DateTime<Local>,
}

struct SchedulerInner {
    notifier: Arc<dyn Notifier>,
    gate: Arc<dyn PermissionGate>,
    pending: Mutex<Option<Pending>>,
}

#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReminderScheduler {
    pub fn new(notifier: Arc<dyn Notifier>, gate: Arc<dyn PermissionGate>) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                notifier,
                gate,
                pending: Mutex::new(None),
            }),
        }
    }

    /// Arms (or re-arms) the daily reminder for the given time of day
    /// and returns the computed fire instant. A pending fire is
    /// replaced, never stacked.
    pub async fn arm(&self, hour: u32, minute: u32) -> DateTime<Local> {
        let fire_at = next_fire_after(Local::now(), hour, minute);

        let mut pending = self.inner.pending.lock().await;
        if let Some(previous) = pending.take() {
            previous.cancel.cancel();
            previous.task.abort();
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(reminder_loop(
            Arc::clone(&self.inner),
            hour,
            minute,
            fire_at,
            cancel.clone(),
        ));
        *pending = Some(Pending {
            task,
            cancel,
            fire_at,
        });

        info!("daily reminder armed for {fire_at}");
        fire_at
    }

    /// Cancels the pending fire, if any. Idempotent.
    pub async fn disarm(&self) {
        if let Some(pending) = self.inner.pending.lock().await.take() {
            pending.cancel.cancel();
            pending.task.abort();
            info!("daily reminder disarmed");
        }
    }

    /// The next fire instant, or `None` when unarmed.
    pub async fn pending_fire_at(&self) -> Option<DateTime<Local>> {
        self.inner
            .pending
            .lock()
            .await
            .as_ref()
            .map(|pending| pending.fire_at)
    }
}

async fn reminder_loop(
    inner: Arc<SchedulerInner>,
    hour: u32,
    minute: u32,
    first_fire: DateTime<Local>,
    cancel: CancellationToken,
) {
    let mut fire_at = first_fire;
    loop {
        let delay = (fire_at - Local::now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                if inner.gate.is_granted(Capability::Notifications) {
                    inner
                        .notifier
                        .notify(REMINDER_TITLE, REMINDER_MESSAGE, REMINDER_DEEP_LINK);
                } else {
                    warn!("notification permission not granted; skipping reminder");
                }

                fire_at = next_fire_after(Local::now(), hour, minute);
                if let Some(pending) = inner.pending.lock().await.as_mut() {
                    pending.fire_at = fire_at;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// Next `hour:minute` instant strictly after `now`, at minute
/// granularity: a target equal to the current minute rolls to
/// tomorrow rather than firing immediately.
pub fn next_fire_after(now: DateTime<Local>, hour: u32, minute: u32) -> DateTime<Local> {
    let target_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    let candidate = now.date_naive().and_time(target_time);

    let truncated_now = now
        .naive_local()
        .with_second(0)
        .and_then(|n| n.with_nanosecond(0))
        .unwrap_or_else(|| now.naive_local());

    let candidate = if candidate > truncated_now {
        candidate
    } else {
        candidate + ChronoDuration::days(1)
    };

    resolve_local(candidate)
}

fn resolve_local(naive: NaiveDateTime) -> DateTime<Local> {
    match Local.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        // DST gap: the target never exists locally, take the first
        // valid instant after it.
        LocalResult::None => resolve_local(naive + ChronoDuration::hours(1)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;

    use super::*;
    use crate::location::{AlwaysDenied, AlwaysGranted};

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Local> {
        resolve_local(
            NaiveDate::from_ymd_opt(y, mo, d)
                .unwrap()
                .and_hms_opt(h, mi, s)
                .unwrap(),
        )
    }

    #[test]
    fn future_target_fires_same_day() {
        let now = local(2024, 3, 11, 19, 0, 0);
        let fire = next_fire_after(now, 20, 0);
        assert_eq!(fire, local(2024, 3, 11, 20, 0, 0));
    }

    #[test]
    fn past_target_rolls_to_tomorrow() {
        let now = local(2024, 3, 11, 20, 30, 0);
        let fire = next_fire_after(now, 20, 0);
        assert_eq!(fire, local(2024, 3, 12, 20, 0, 0));
    }

    #[test]
    fn exact_current_minute_rolls_to_tomorrow() {
        // 20:00:00 and 20:00:59 are both "now" at minute granularity.
        for second in [0, 59] {
            let now = local(2024, 3, 11, 20, 0, second);
            let fire = next_fire_after(now, 20, 0);
            assert_eq!(fire, local(2024, 3, 12, 20, 0, 0));
        }
    }

    struct CountingNotifier {
        fires: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn notify(&self, _title: &str, _message: &str, _deep_link: &str) {
            self.fires.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_then_rearms_for_the_next_day() {
        let notifier = Arc::new(CountingNotifier {
            fires: AtomicUsize::new(0),
        });
        let scheduler = ReminderScheduler::new(notifier.clone(), Arc::new(AlwaysGranted));

        let fire_at = scheduler.arm(8, 0).await;
        let delay = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::task::yield_now().await;

        tokio::time::advance(delay + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(notifier.fires.load(Ordering::SeqCst), 1);
        // The loop re-armed itself for the following day.
        assert!(scheduler.pending_fire_at().await.is_some());

        scheduler.disarm().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_rather_than_stacks() {
        let notifier = Arc::new(CountingNotifier {
            fires: AtomicUsize::new(0),
        });
        let scheduler = ReminderScheduler::new(notifier.clone(), Arc::new(AlwaysGranted));

        scheduler.arm(8, 0).await;
        let fire_at = scheduler.arm(8, 0).await;
        let delay = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::task::yield_now().await;

        tokio::time::advance(delay + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        // A stacked pending fire would have notified twice.
        assert_eq!(notifier.fires.load(Ordering::SeqCst), 1);

        scheduler.disarm().await;
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_stops_future_fires() {
        let notifier = Arc::new(CountingNotifier {
            fires: AtomicUsize::new(0),
        });
        let scheduler = ReminderScheduler::new(notifier.clone(), Arc::new(AlwaysGranted));

        let fire_at = scheduler.arm(8, 0).await;
        scheduler.disarm().await;
        assert!(scheduler.pending_fire_at().await.is_none());

        let delay = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::time::advance(delay + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert_eq!(notifier.fires.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_notification_permission_is_swallowed_and_still_rearms() {
        let notifier = Arc::new(CountingNotifier {
            fires: AtomicUsize::new(0),
        });
        let scheduler = ReminderScheduler::new(notifier.clone(), Arc::new(AlwaysDenied));

        let fire_at = scheduler.arm(8, 0).await;
        let delay = (fire_at - Local::now()).to_std().unwrap_or(Duration::ZERO);
        tokio::task::yield_now().await;

        tokio::time::advance(delay + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(notifier.fires.load(Ordering::SeqCst), 0);
        // The alarm survives the skipped delivery.
        assert!(scheduler.pending_fire_at().await.is_some());

        scheduler.disarm().await;
    }
}
