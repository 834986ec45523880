use chrono::NaiveDate;
use rusqlite::OptionalExtension;

use crate::{
    ecodb::{conversion_error, Database},
    gamify::{GamifyResult, StreakStore},
    models::{self, UserId},
};

/////*============== STREAK QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::StreakRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let user_id = UserId::parse(&row.get::<_, String>("user_id")?)
            .map_err(|err| conversion_error(0, err))?;

        Ok(Self {
            user_id,
            current_streak: row.get("current_streak")?,
            longest_streak: row.get("longest_streak")?,
            last_date: row.get("last_date")?,
        })
    }
}

impl StreakStore for Database {
    fn get(&self, user_id: &UserId) -> GamifyResult<Option<models::StreakRecord>> {
        log::trace!("[streaks::get] Querying streak for {user_id}...");
        let connection = self.connect()?;

        let record = connection
            .prepare("SELECT * FROM Streaks WHERE user_id = :user_id")?
            .query_row(rusqlite::named_params! { ":user_id": user_id.as_str() }, |row| {
                models::StreakRecord::try_from(row)
            })
            .optional()
            .inspect_err(|err| log::error!("[streaks::get] Could not read streak for {user_id}: {err}"))?;

        Ok(record)
    }

    fn create(&self, record: &models::StreakRecord) -> GamifyResult<bool> {
        log::trace!("[streaks::create] Inserting streak for {}...", record.user_id);
        let connection = self.connect()?;

        let query_params = rusqlite::named_params! {
                ":user_id":        record.user_id.as_str(),
                ":current_streak": record.current_streak,
                ":longest_streak": record.longest_streak,
                ":last_date":      record.last_date,
        };

        let created = connection
            .prepare(
                "INSERT INTO Streaks ( user_id,  current_streak,  longest_streak,  last_date)
                 VALUES              (:user_id, :current_streak, :longest_streak, :last_date)",
            )?
            .execute(query_params)
            .map_or_else(crate::ecodb::swallow_constraint_violation, |_| Ok(true))?;

        Ok(created)
    }

    fn upsert(&self, record: &models::StreakRecord) -> GamifyResult<models::StreakRecord> {
        log::trace!("[streaks::upsert] Writing streak for {}...", record.user_id);
        let connection = self.connect()?;

        let query_params = rusqlite::named_params! {
                ":user_id":        record.user_id.as_str(),
                ":current_streak": record.current_streak,
                ":longest_streak": record.longest_streak,
                ":last_date":      record.last_date,
        };

        connection
            .prepare(
                "INSERT INTO Streaks ( user_id,  current_streak,  longest_streak,  last_date)
                 VALUES              (:user_id, :current_streak, :longest_streak, :last_date)
                 ON CONFLICT (user_id) DO UPDATE SET
                    current_streak = excluded.current_streak,
                    longest_streak = excluded.longest_streak,
                    last_date      = excluded.last_date",
            )?
            .execute(query_params)
            .inspect_err(|err| log::error!("[streaks::upsert] Could not write streak: {err}"))?;

        Ok(record.clone())
    }

    fn compare_and_swap(
        &self,
        expected_last_date: Option<NaiveDate>,
        record: &models::StreakRecord,
    ) -> GamifyResult<bool> {
        let connection = self.connect()?;

        // `IS` rather than `=` so that a NULL last_date matches a NULL expectation.
        let query_params = rusqlite::named_params! {
                ":user_id":        record.user_id.as_str(),
                ":current_streak": record.current_streak,
                ":longest_streak": record.longest_streak,
                ":last_date":      record.last_date,
                ":expected":       expected_last_date,
        };

        let changed = connection
            .prepare(
                "UPDATE Streaks SET
                    current_streak = :current_streak,
                    longest_streak = :longest_streak,
                    last_date      = :last_date
                 WHERE user_id = :user_id
                   AND last_date IS :expected",
            )?
            .execute(query_params)
            .inspect_err(|err| log::error!("[streaks::compare_and_swap] Could not update streak: {err}"))?;

        Ok(changed == 1)
    }

    fn snapshot(&self) -> GamifyResult<Vec<models::StreakRecord>> {
        log::trace!("[streaks::snapshot] Querying all streaks.");
        let connection = self.connect()?;

        let mut stmt = connection.prepare(
            "SELECT * FROM Streaks ORDER BY current_streak DESC, rowid ASC",
        )?;

        let records = stmt
            .query_map([], |row| models::StreakRecord::try_from(row))?
            .collect::<Result<Vec<models::StreakRecord>, _>>()?;

        Ok(records)
    }
}
