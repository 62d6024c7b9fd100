//! Daily trigger for the archiving job.

use chrono::{DateTime, Days, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::time::Duration;

/// A single trigger that fires once per day at a fixed wall-clock time.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    at: NaiveTime,
    tz: Tz,
    next_due: DateTime<Utc>,
}

impl DailySchedule {
    /// Register the trigger. The first run is today at `at` if that time is
    /// still ahead of `now`, otherwise tomorrow.
    pub fn new(at: NaiveTime, tz: Tz, now: DateTime<Utc>) -> Self {
        let next_due = next_occurrence(at, tz, now);
        Self { at, tz, next_due }
    }

    pub fn next_due(&self) -> DateTime<Utc> {
        self.next_due
    }

    /// Returns true when the trigger is due at `now` and advances it to the
    /// next occurrence after `now`. Missed days collapse into one firing.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.next_due {
            return false;
        }
        self.next_due = next_occurrence(self.at, self.tz, now);
        true
    }
}

/// First instant strictly after `now` whose local time in `tz` is `at`.
pub fn next_occurrence(at: NaiveTime, tz: Tz, now: DateTime<Utc>) -> DateTime<Utc> {
    let local_today = now.with_timezone(&tz).date_naive();

    // Two days covers every case; a third handles a day where `at` falls
    // into a DST gap.
    for offset in 0..=3 {
        let Some(date) = local_today.checked_add_days(Days::new(offset)) else {
            break;
        };
        let candidate = match tz.from_local_datetime(&date.and_time(at)) {
            chrono::LocalResult::Single(dt) => dt,
            chrono::LocalResult::Ambiguous(earliest, _) => earliest,
            chrono::LocalResult::None => continue,
        };
        let candidate = candidate.with_timezone(&Utc);
        if candidate > now {
            return candidate;
        }
    }

    now + chrono::Duration::days(1)
}

/// Run `job` every time `schedule` is due, checking every `poll_interval`.
///
/// Never returns. Each job invocation completes before the next poll, so
/// runs never overlap.
pub async fn run_daily<F, Fut>(mut schedule: DailySchedule, poll_interval: Duration, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::info!(
        "Scheduler started (next run: {}, poll interval: {:?})",
        schedule.next_due().with_timezone(&schedule.tz),
        poll_interval
    );

    loop {
        if schedule.poll(Utc::now()) {
            job().await;
            tracing::info!(
                "Next run scheduled for {}",
                schedule.next_due().with_timezone(&schedule.tz)
            );
        }

        tokio::time::sleep(poll_interval).await;
    }
}
