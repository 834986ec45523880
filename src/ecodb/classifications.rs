use chrono::Utc;

use crate::{
    ecodb::{conversion_error, DBResult, Database},
    gamify::GamifyError,
    models::{self, UserId, WasteCategory},
};

/// Category stored for labels outside the known set.
const FALLBACK_CATEGORY: WasteCategory = WasteCategory::Plastic;

/////*============== CLASSIFICATION QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::ClassificationRecord {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let user_id = UserId::parse(&row.get::<_, String>("user_id")?)
            .map_err(|err| conversion_error(0, err))?;

        let label: String = row.get("category")?;
        let category = WasteCategory::from_label(&label).ok_or_else(|| {
            conversion_error(0, GamifyError::InvalidInput(format!("unknown stored category '{label}'")))
        })?;

        Ok(Self {
            user_id,
            category,
            confidence: row.get("confidence")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
        })
    }
}

impl Database {
    /// Appends `classification` to `user_id`'s history and returns the stored row.
    ///
    /// Labels outside the known categories are stored as plastic.
    pub fn insert_classification(
        &self,
        user_id: &UserId,
        classification: &models::Classification,
    ) -> DBResult<models::ClassificationRecord> {
        let category = classification.category.unwrap_or_else(|| {
            log::warn!(
                "[insert_classification] Unknown category '{}', defaulting to {FALLBACK_CATEGORY}.",
                classification.label
            );
            FALLBACK_CATEGORY
        });

        let record = models::ClassificationRecord {
            user_id: user_id.clone(),
            category,
            confidence: classification.confidence,
            description: classification.description.clone(),
            created_at: Utc::now(),
        };

        log::trace!("[insert_classification] Saving {category} for {user_id}...");
        let connection = self.connect()?;
        let query_params = rusqlite::named_params! {
                ":user_id":     record.user_id.as_str(),
                ":category":    record.category.as_str(),
                ":confidence":  record.confidence,
                ":description": record.description,
                ":created_at":  record.created_at,
        };

        connection
            .prepare(
                "INSERT INTO Classifications ( user_id,  category,  confidence,  description,  created_at)
                 VALUES                      (:user_id, :category, :confidence, :description, :created_at)",
            )?
            .execute(query_params)
            .inspect_err(|err| log::error!("[insert_classification] Could not save classification: {err}"))?;

        Ok(record)
    }

    /// Most recent classifications for `user_id`, newest first.
    pub fn query_classifications(
        &self,
        user_id: &UserId,
        limit: usize,
    ) -> DBResult<Vec<models::ClassificationRecord>> {
        log::trace!("[query_classifications] Querying history for {user_id}...");
        let connection = self.connect()?;

        let mut stmt = connection.prepare(
            "SELECT * FROM Classifications
             WHERE user_id = :user_id
             ORDER BY created_at DESC, id DESC
             LIMIT :limit",
        )?;

        let records = stmt
            .query_map(
                rusqlite::named_params! { ":user_id": user_id.as_str(), ":limit": limit },
                |row| models::ClassificationRecord::try_from(row),
            )?
            .collect::<DBResult<Vec<_>>>()?;

        Ok(records)
    }

    /// How many items of each category `user_id` has classified, most common first.
    pub fn query_category_counts(&self, user_id: &UserId) -> DBResult<Vec<(WasteCategory, usize)>> {
        let connection = self.connect()?;

        let mut stmt = connection.prepare(
            "SELECT category, COUNT(*) AS total FROM Classifications
             WHERE user_id = :user_id
             GROUP BY category
             ORDER BY total DESC, category ASC",
        )?;

        let counts = stmt
            .query_map(rusqlite::named_params! { ":user_id": user_id.as_str() }, |row| {
                let label: String = row.get("category")?;
                let category = WasteCategory::from_label(&label).ok_or_else(|| {
                    conversion_error(0, GamifyError::InvalidInput(format!("unknown stored category '{label}'")))
                })?;
                Ok((category, row.get("total")?))
            })?
            .collect::<DBResult<Vec<_>>>()?;

        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecodb::testing::temp_database;
    use crate::models::Classification;

    fn classification(label: &str, confidence: u8) -> Classification {
        Classification {
            label: String::from(label),
            category: WasteCategory::from_label(label),
            confidence,
            description: format!("looks like {label}"),
            disposal_method: String::new(),
        }
    }

    #[test]
    fn unknown_labels_are_stored_as_plastic() {
        let (database, _dir) = temp_database();
        let user = UserId::parse("u").unwrap();

        let stored = database.insert_classification(&user, &classification("Styrofoam", 70)).unwrap();
        assert_eq!(stored.category, WasteCategory::Plastic);

        let history = database.query_classifications(&user, 10).unwrap();
        assert_eq!(history, vec![stored]);
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let (database, _dir) = temp_database();
        let user = UserId::parse("u").unwrap();
        let other = UserId::parse("someone-else").unwrap();

        database.insert_classification(&user, &classification("paper", 50)).unwrap();
        database.insert_classification(&user, &classification("glass", 60)).unwrap();
        database.insert_classification(&user, &classification("metal", 90)).unwrap();
        database.insert_classification(&other, &classification("organic", 99)).unwrap();

        let history = database.query_classifications(&user, 2).unwrap();
        let categories = history.iter().map(|r| r.category).collect::<Vec<_>>();
        assert_eq!(categories, vec![WasteCategory::Metal, WasteCategory::Glass]);
    }

    #[test]
    fn counts_group_by_category() {
        let (database, _dir) = temp_database();
        let user = UserId::parse("u").unwrap();

        for label in ["glass", "paper", "glass", "e-waste", "glass", "paper"] {
            database.insert_classification(&user, &classification(label, 80)).unwrap();
        }

        assert_eq!(database.query_category_counts(&user).unwrap(), vec![
            (WasteCategory::Glass, 3),
            (WasteCategory::Paper, 2),
            (WasteCategory::EWaste, 1),
        ]);
    }
}
