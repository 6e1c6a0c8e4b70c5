//! Schedule arithmetic. Pure functions of a script and an instant.

use chrono::{DateTime, Duration, Months, Utc};

use crate::models::script::{PlaylistScript, Schedule};

/// Next instant the script becomes due. `None` for manual scripts, which are
/// never picked up by the scheduler. A script that never ran is due at once.
pub fn next_due(schedule: Schedule, last_run_at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    if schedule == Schedule::Manual {
        return None;
    }
    let Some(last) = last_run_at else {
        return Some(DateTime::<Utc>::MIN_UTC);
    };

    match schedule {
        Schedule::Manual => None,
        Schedule::Hourly => Some(last + Duration::hours(1)),
        Schedule::Daily => Some(last + Duration::hours(24)),
        Schedule::Weekly => Some(last + Duration::days(7)),
        // chrono clamps to the last day of a shorter month (Jan 31 -> Feb 28).
        Schedule::Monthly => last.checked_add_months(Months::new(1)),
    }
}

pub fn is_due(script: &PlaylistScript, now: DateTime<Utc>) -> bool {
    script.is_active
        && next_due(script.schedule, script.last_run_at).is_some_and(|due| due <= now)
}

/// Active, non-manual scripts whose due time has passed.
pub fn due_scripts(scripts: &[PlaylistScript], now: DateTime<Utc>) -> Vec<&PlaylistScript> {
    scripts.iter().filter(|s| is_due(s, now)).collect()
}
