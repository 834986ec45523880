use rusqlite::Connection;

use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod classifications;
pub mod follows;
pub mod posts;
pub mod profiles;
pub mod schema;
pub mod streaks;

pub type DBResult<T> = Result<T, rusqlite::Error>;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the EcoSort SQLite database.
///
/// Only the path is held; each query opens its own connection.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Opens (creating if needed) the database at `path` and makes sure every table exists.
    pub fn open(path: impl Into<PathBuf>) -> DBResult<Self> {
        let database = Self { path: path.into() };
        database.initialize()?;

        Ok(database)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn connect(&self) -> DBResult<Connection> {
        let connection = Connection::open(&self.path)?;
        connection.busy_timeout(BUSY_TIMEOUT)?;
        connection.pragma_update(None, "foreign_keys", true)?;

        Ok(connection)
    }

    fn initialize(&self) -> DBResult<()> {
        let connection = self.connect()?;

        log::debug!("[initialize] creating Streaks table...");
        connection.execute(schema::STREAKS_SCHEMA, [])?;

        log::debug!("[initialize] creating Profiles table...");
        connection.execute(schema::PROFILES_SCHEMA, [])?;

        log::debug!("[initialize] creating Classifications table...");
        connection.execute(schema::CLASSIFICATIONS_SCHEMA, [])?;

        log::debug!("[initialize] creating Follows table...");
        connection.execute(schema::FOLLOWS_SCHEMA, [])?;

        log::debug!("[initialize] creating Posts table...");
        connection.execute(schema::POSTS_SCHEMA, [])?;

        log::debug!("[initialize] creating Likes table...");
        connection.execute(schema::LIKES_SCHEMA, [])?;

        log::debug!("[initialize] creating Comments table...");
        connection.execute(schema::COMMENTS_SCHEMA, [])?;

        log::info!("Database ready at {}", self.path.display());
        Ok(())
    }
}

/// Turns a constraint violation into `Ok(false)`, passing any other error through.
///
/// Used after inserts where "already there" is an expected outcome.
pub(crate) fn swallow_constraint_violation(err: rusqlite::Error) -> DBResult<bool> {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            log::trace!("[swallow_constraint_violation] Ignoring: {err}");
            Ok(false)
        }
        err => Err(err),
    }
}

/// Maps a bad stored value into the error `rusqlite` uses for failed conversions.
pub(crate) fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Database;
    use tempfile::TempDir;

    /// A fresh database in its own temporary directory. Keep the `TempDir` alive.
    pub fn temp_database() -> (Database, TempDir) {
        let dir = TempDir::new().unwrap();
        let database = Database::open(dir.path().join("ecosort.db")).unwrap();
        (database, dir)
    }
}
