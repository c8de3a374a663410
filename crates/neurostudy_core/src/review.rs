//! crates/neurostudy_core/src/review.rs
//!
//! Spaced-repetition scheduling for whole study sessions.

use chrono::{DateTime, Duration, Utc};

use crate::domain::StudySession;

/// Review intervals in days, indexed by review step.
pub const REVIEW_INTERVALS_DAYS: [i64; 6] = [1, 3, 7, 14, 30, 60];

/// The interval that follows a review recorded at `step`.
pub fn interval_for_step(step: u32) -> Duration {
    let last = REVIEW_INTERVALS_DAYS.len() - 1;
    let index = (step as usize).min(last);
    Duration::days(REVIEW_INTERVALS_DAYS[index])
}

/// Records a completed review and schedules the next one.
///
/// The first review lands on step 0; each later review climbs one rung,
/// staying on the last rung once reached.
pub fn record_review(study: &mut StudySession, now: DateTime<Utc>) {
    let last = (REVIEW_INTERVALS_DAYS.len() - 1) as u32;
    let step = match study.review_step {
        None => 0,
        Some(step) => (step + 1).min(last),
    };
    study.review_step = Some(step);
    study.next_review_date = Some(now + interval_for_step(step));
}

/// A study is due once its next review date has passed. Never-reviewed studies are not due.
pub fn is_due(study: &StudySession, now: DateTime<Utc>) -> bool {
    study.next_review_date.is_some_and(|due| due <= now)
}
