//! Pure cron due-evaluation.

use std::str::FromStr;

use chrono::{DateTime, Duration, Local, Utc};
use cron::Schedule;

use crate::error::{ScheduleError, ScheduleResult};

/// Decide whether a task with the given cron expression and last firing
/// instant is due at `now`.
///
/// The next occurrence is computed strictly after
/// `max(last_run, now − 1 min)` in local time and the task is due iff
/// that occurrence is not in the future. The look-back never reaches
/// more than one minute behind `now`, so occurrences missed earlier
/// than that are skipped rather than replayed; a task that has never
/// run can still fire on its first tick.
pub fn is_due(
    cron: &str,
    last_run: Option<DateTime<Utc>>,
    now: DateTime<Local>,
) -> ScheduleResult<bool> {
    let schedule = Schedule::from_str(cron).map_err(|err| ScheduleError::Cron(err.to_string()))?;
    let cutoff = now - Duration::minutes(1);
    let from = match last_run {
        Some(last) => last.with_timezone(&Local).max(cutoff),
        None => cutoff,
    };
    Ok(schedule
        .after(&from)
        .next()
        .is_some_and(|next| next <= now))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn local(h: u32, m: u32, s: u32) -> DateTime<Local> {
        // May 1st sits well clear of DST transitions in every zone.
        Local.with_ymd_and_hms(2024, 5, 1, h, m, s).single().unwrap()
    }

    #[test]
    fn never_run_every_second_task_fires() {
        assert!(is_due("* * * * * *", None, local(12, 0, 0)).unwrap());
    }

    #[test]
    fn just_fired_task_is_not_due() {
        let now = local(12, 0, 0);
        let due = is_due("* * * * * *", Some(now.with_timezone(&Utc)), now).unwrap();
        assert!(!due);
    }

    #[test]
    fn daily_task_fires_at_its_second() {
        let yesterday = Local
            .with_ymd_and_hms(2024, 4, 30, 4, 0, 0)
            .single()
            .unwrap();
        let due = is_due(
            "0 0 4 * * *",
            Some(yesterday.with_timezone(&Utc)),
            local(4, 0, 0),
        )
        .unwrap();
        assert!(due);
    }

    #[test]
    fn daily_task_is_not_due_early() {
        let yesterday = Local
            .with_ymd_and_hms(2024, 4, 30, 4, 0, 0)
            .single()
            .unwrap();
        let due = is_due(
            "0 0 4 * * *",
            Some(yesterday.with_timezone(&Utc)),
            local(3, 59, 30),
        )
        .unwrap();
        assert!(!due);
    }

    #[test]
    fn occurrences_missed_beyond_the_window_are_skipped() {
        // Last ran days ago, and the 04:00 slot is long past: the
        // one-minute look-back means no catch-up firing at noon.
        let days_ago = Local
            .with_ymd_and_hms(2024, 4, 28, 4, 0, 0)
            .single()
            .unwrap();
        let due = is_due(
            "0 0 4 * * *",
            Some(days_ago.with_timezone(&Utc)),
            local(12, 0, 0),
        )
        .unwrap();
        assert!(!due);
    }

    #[test]
    fn stale_task_still_fires_on_the_next_occurrence() {
        let days_ago = Local
            .with_ymd_and_hms(2024, 4, 28, 4, 0, 0)
            .single()
            .unwrap();
        let due = is_due(
            "0 0 4 * * *",
            Some(days_ago.with_timezone(&Utc)),
            local(4, 0, 0),
        )
        .unwrap();
        assert!(due);
    }

    #[test]
    fn invalid_expression_is_an_error() {
        let err = is_due("every tuesday", None, local(12, 0, 0)).unwrap_err();
        assert!(matches!(err, ScheduleError::Cron(_)));
    }
}
