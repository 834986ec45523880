use chrono::{Days, NaiveDate};

use crate::gamify::{GamifyError, GamifyResult};
use crate::models::{StreakRecord, UserId};

/// Number of read-compute-write rounds before giving up on a contended record.
const MAX_WRITE_ATTEMPTS: usize = 8;

/// Storage for streak records, keyed uniquely by user.
pub trait StreakStore {
    fn get(&self, user_id: &UserId) -> GamifyResult<Option<StreakRecord>>;

    /// Inserts `record` unless a row for the same user already exists.
    ///
    /// Returns `true` if it was newly added, false otherwise.
    fn create(&self, record: &StreakRecord) -> GamifyResult<bool>;

    /// Writes `record`, replacing any existing row for the same user.
    ///
    /// The streak engine never calls this. It is for seeding stores and
    /// administrative corrections, bypassing `compare_and_swap`.
    fn upsert(&self, record: &StreakRecord) -> GamifyResult<StreakRecord>;

    /// Writes `record` only if the stored `last_date` still equals `expected_last_date`.
    ///
    /// Returns `true` if the write happened.
    fn compare_and_swap(
        &self,
        expected_last_date: Option<NaiveDate>,
        record: &StreakRecord,
    ) -> GamifyResult<bool>;

    /// Every stored record, highest current streak first. Ties keep store order.
    fn snapshot(&self) -> GamifyResult<Vec<StreakRecord>>;
}

/// Returns `user_id`'s streak, creating the zero-state record if there is none yet.
pub fn current_streak(store: &impl StreakStore, user_id: &UserId) -> GamifyResult<StreakRecord> {
    if let Some(record) = store.get(user_id)? {
        return Ok(record);
    }

    log::trace!("[current_streak] No streak for {user_id}, creating one.");
    store.create(&StreakRecord::zero(user_id.clone()))?;

    // Re-read: a concurrent caller may have created (or already advanced) it.
    store
        .get(user_id)?
        .ok_or_else(|| GamifyError::StorageFailure(format!("streak for {user_id} vanished after creation")))
}

/// Computes the state that follows `record` when an activity happens on `today`.
///
/// Returns None when `today` has already been counted.
pub fn advance(record: &StreakRecord, today: NaiveDate) -> Option<StreakRecord> {
    if record.last_date == Some(today) {
        return None;
    }

    let yesterday = today.checked_sub_days(Days::new(1));
    let current_streak = match record.last_date {
        Some(last) if Some(last) == yesterday => record.current_streak.saturating_add(1),
        _ => 1,
    };

    Some(StreakRecord {
        user_id: record.user_id.clone(),
        current_streak,
        longest_streak: record.longest_streak.max(current_streak),
        last_date: Some(today),
    })
}

/// Records that `user_id` was active on `today` and returns the resulting streak.
///
/// At most one activity per calendar day counts; later calls on the same day
/// return the stored record untouched. The write is conditional on the
/// `last_date` that was read, so two racing calls can never both count.
pub fn record_activity(
    store: &impl StreakStore,
    user_id: &UserId,
    today: NaiveDate,
) -> GamifyResult<StreakRecord> {
    log::trace!("[record_activity] Recording activity for {user_id} on {today}.");

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let previous = current_streak(store, user_id)?;

        let Some(next) = advance(&previous, today) else {
            log::trace!("[record_activity] {user_id} already active on {today}.");
            return Ok(previous);
        };

        if store.compare_and_swap(previous.last_date, &next)? {
            log::info!(
                "[record_activity] {user_id}'s streak is now {} (longest {})",
                next.current_streak,
                next.longest_streak
            );
            return Ok(next);
        }

        log::debug!("[record_activity] Lost write race for {user_id} (attempt {attempt}), retrying.");
    }

    Err(GamifyError::StorageFailure(format!(
        "streak for {user_id} kept changing underneath {MAX_WRITE_ATTEMPTS} write attempts"
    )))
}
