use chrono::Utc;

use crate::{
    ecodb::{conversion_error, DBResult, Database},
    gamify::{GamifyError, GamifyResult},
    models::UserId,
};

/////*============== FOLLOW QUERIES ==============*/
impl Database {
    /// Makes `follower` follow `following`.
    ///
    /// Returns `true` if the follow is new, false if it already existed.
    pub fn follow(&self, follower: &UserId, following: &UserId) -> GamifyResult<bool> {
        if follower == following {
            return Err(GamifyError::InvalidInput(String::from("users cannot follow themselves")));
        }

        log::trace!("[follow] {follower} -> {following}");
        let connection = self.connect()?;
        let query_params = rusqlite::named_params! {
                ":follower_id":  follower.as_str(),
                ":following_id": following.as_str(),
                ":created_at":   Utc::now(),
        };

        let created = connection
            .prepare(
                "INSERT INTO Follows ( follower_id,  following_id,  created_at)
                 VALUES              (:follower_id, :following_id, :created_at)",
            )?
            .execute(query_params)
            .map_or_else(crate::ecodb::swallow_constraint_violation, |_| Ok(true))?;

        if created {
            log::info!("{follower} is now following {following}.");
        }
        Ok(created)
    }

    /// Returns `true` if a follow was removed.
    pub fn unfollow(&self, follower: &UserId, following: &UserId) -> DBResult<bool> {
        let connection = self.connect()?;
        let removed = connection
            .prepare("DELETE FROM Follows WHERE follower_id = :follower_id AND following_id = :following_id")?
            .execute(rusqlite::named_params! {
                ":follower_id":  follower.as_str(),
                ":following_id": following.as_str(),
            })?;

        Ok(removed > 0)
    }

    pub fn is_following(&self, follower: &UserId, following: &UserId) -> DBResult<bool> {
        let connection = self.connect()?;
        connection
            .prepare("SELECT 1 FROM Follows WHERE follower_id = :follower_id AND following_id = :following_id")?
            .exists(rusqlite::named_params! {
                ":follower_id":  follower.as_str(),
                ":following_id": following.as_str(),
            })
    }

    /// Users following `user_id`, oldest follow first.
    pub fn query_followers(&self, user_id: &UserId) -> DBResult<Vec<UserId>> {
        self.query_edges(
            "SELECT follower_id AS other FROM Follows WHERE following_id = :user_id ORDER BY rowid",
            user_id,
        )
    }

    /// Users `user_id` follows, oldest follow first.
    pub fn query_following(&self, user_id: &UserId) -> DBResult<Vec<UserId>> {
        self.query_edges(
            "SELECT following_id AS other FROM Follows WHERE follower_id = :user_id ORDER BY rowid",
            user_id,
        )
    }

    fn query_edges(&self, sql: &str, user_id: &UserId) -> DBResult<Vec<UserId>> {
        let connection = self.connect()?;
        let mut stmt = connection.prepare(sql)?;

        let others = stmt
            .query_map(rusqlite::named_params! { ":user_id": user_id.as_str() }, |row| {
                UserId::parse(&row.get::<_, String>("other")?).map_err(|err| conversion_error(0, err))
            })?
            .collect::<DBResult<Vec<_>>>()?;

        Ok(others)
    }
}
