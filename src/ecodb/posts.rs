use chrono::Utc;
use itertools::Itertools;
use rusqlite::OptionalExtension;

use crate::{
    ecodb::{conversion_error, DBResult, Database},
    gamify::{GamifyError, GamifyResult},
    models::{self, UserId},
};

pub const MAX_POST_LENGTH: usize = 500;
pub const MAX_COMMENT_LENGTH: usize = 300;
pub const MAX_TAGS: usize = 10;

/// Post columns plus author name and like/comment totals.
const POST_SELECT: &str =
    "SELECT p.*,
        pr.username AS author,
        (SELECT COUNT(*) FROM Likes    WHERE post_id = p.id) AS likes_count,
        (SELECT COUNT(*) FROM Comments WHERE post_id = p.id) AS comments_count
     FROM Posts p
     LEFT JOIN Profiles pr ON pr.user_id = p.user_id";

const COMMENT_SELECT: &str =
    "SELECT c.*, pr.username AS author
     FROM Comments c
     LEFT JOIN Profiles pr ON pr.user_id = c.user_id";

/////*============== POST QUERIES ==============*/
impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::Post {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let user_id = UserId::parse(&row.get::<_, String>("user_id")?)
            .map_err(|err| conversion_error(0, err))?;

        let tags: String = row.get("tags")?;

        Ok(Self {
            id: row.get("id")?,
            user_id,
            author: row.get("author")?,
            content: row.get("content")?,
            image_url: row.get("image_url")?,
            tags: tags.split(',').filter(|t| !t.is_empty()).map(String::from).collect(),
            is_public: row.get("is_public")?,
            created_at: row.get("created_at")?,
            likes_count: row.get("likes_count")?,
            comments_count: row.get("comments_count")?,
        })
    }
}

impl Database {
    /// Publishes `post` for `user_id` and returns it as stored.
    pub fn create_post(&self, user_id: &UserId, post: &models::NewPost) -> GamifyResult<models::Post> {
        let content = validate_text("post", &post.content, MAX_POST_LENGTH)?;
        let tags = normalize_tags(&post.tags)?.join(",");

        log::trace!("[create_post] Saving post for {user_id}...");
        let connection = self.connect()?;
        let query_params = rusqlite::named_params! {
                ":user_id":    user_id.as_str(),
                ":content":    content,
                ":image_url":  post.image_url,
                ":tags":       tags,
                ":is_public":  post.is_public,
                ":created_at": Utc::now(),
        };

        connection
            .prepare(
                "INSERT INTO Posts ( user_id,  content,  image_url,  tags,  is_public,  created_at)
                 VALUES            (:user_id, :content, :image_url, :tags, :is_public, :created_at)",
            )?
            .execute(query_params)
            .inspect_err(|err| log::error!("[create_post] Could not save post: {err}"))?;

        let id = connection.last_insert_rowid();
        log::info!("{user_id} created post #{id}.");

        self.query_post(id)?
            .ok_or_else(|| GamifyError::StorageFailure(format!("post #{id} vanished after creation")))
    }

    pub fn query_post(&self, post_id: i64) -> DBResult<Option<models::Post>> {
        let connection = self.connect()?;
        connection
            .prepare(&format!("{POST_SELECT} WHERE p.id = :post_id"))?
            .query_row(rusqlite::named_params! { ":post_id": post_id }, |row| models::Post::try_from(row))
            .optional()
    }

    /// Public posts from everyone, newest first.
    pub fn query_feed(&self, limit: usize, offset: usize) -> DBResult<Vec<models::Post>> {
        log::trace!("[query_feed] Querying {limit} posts from {offset}...");
        let connection = self.connect()?;

        let mut stmt = connection.prepare(&format!(
            "{POST_SELECT}
             WHERE p.is_public = 1
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT :limit OFFSET :offset"
        ))?;

        let posts = stmt
            .query_map(rusqlite::named_params! { ":limit": limit, ":offset": offset }, |row| {
                models::Post::try_from(row)
            })?
            .collect::<DBResult<Vec<_>>>()?;

        Ok(posts)
    }

    /// Every post by `user_id`, newest first.
    pub fn query_user_posts(&self, user_id: &UserId, limit: usize) -> DBResult<Vec<models::Post>> {
        let connection = self.connect()?;

        let mut stmt = connection.prepare(&format!(
            "{POST_SELECT}
             WHERE p.user_id = :user_id
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT :limit"
        ))?;

        let posts = stmt
            .query_map(rusqlite::named_params! { ":user_id": user_id.as_str(), ":limit": limit }, |row| {
                models::Post::try_from(row)
            })?
            .collect::<DBResult<Vec<_>>>()?;

        Ok(posts)
    }

    /// Deletes `post_id` if `user_id` wrote it, along with its likes and comments.
    ///
    /// Returns `true` if a post was removed.
    pub fn delete_post(&self, post_id: i64, user_id: &UserId) -> DBResult<bool> {
        let connection = self.connect()?;
        let removed = connection
            .prepare("DELETE FROM Posts WHERE id = :post_id AND user_id = :user_id")?
            .execute(rusqlite::named_params! { ":post_id": post_id, ":user_id": user_id.as_str() })?;

        if removed > 0 {
            log::info!("{user_id} deleted post #{post_id}.");
        }
        Ok(removed > 0)
    }

    /////*============== LIKE QUERIES ==============*/

    /// Returns `true` if the like is new, false if `user_id` already liked the post.
    pub fn like_post(&self, post_id: i64, user_id: &UserId) -> GamifyResult<bool> {
        self.require_post(post_id)?;

        let connection = self.connect()?;
        let query_params = rusqlite::named_params! {
                ":post_id":    post_id,
                ":user_id":    user_id.as_str(),
                ":created_at": Utc::now(),
        };

        let created = connection
            .prepare(
                "INSERT INTO Likes ( post_id,  user_id,  created_at)
                 VALUES            (:post_id, :user_id, :created_at)",
            )?
            .execute(query_params)
            .map_or_else(crate::ecodb::swallow_constraint_violation, |_| Ok(true))?;

        Ok(created)
    }

    /// Returns `true` if a like was removed.
    pub fn unlike_post(&self, post_id: i64, user_id: &UserId) -> DBResult<bool> {
        let connection = self.connect()?;
        let removed = connection
            .prepare("DELETE FROM Likes WHERE post_id = :post_id AND user_id = :user_id")?
            .execute(rusqlite::named_params! { ":post_id": post_id, ":user_id": user_id.as_str() })?;

        Ok(removed > 0)
    }

    pub fn is_liked(&self, post_id: i64, user_id: &UserId) -> DBResult<bool> {
        let connection = self.connect()?;
        connection
            .prepare("SELECT 1 FROM Likes WHERE post_id = :post_id AND user_id = :user_id")?
            .exists(rusqlite::named_params! { ":post_id": post_id, ":user_id": user_id.as_str() })
    }

    /////*============== COMMENT QUERIES ==============*/

    pub fn add_comment(&self, post_id: i64, user_id: &UserId, content: &str) -> GamifyResult<models::Comment> {
        let content = validate_text("comment", content, MAX_COMMENT_LENGTH)?;
        self.require_post(post_id)?;

        let connection = self.connect()?;
        let query_params = rusqlite::named_params! {
                ":post_id":    post_id,
                ":user_id":    user_id.as_str(),
                ":content":    content,
                ":created_at": Utc::now(),
        };

        connection
            .prepare(
                "INSERT INTO Comments ( post_id,  user_id,  content,  created_at)
                 VALUES               (:post_id, :user_id, :content, :created_at)",
            )?
            .execute(query_params)
            .inspect_err(|err| log::error!("[add_comment] Could not save comment: {err}"))?;

        let id = connection.last_insert_rowid();
        let comment = connection
            .prepare(&format!("{COMMENT_SELECT} WHERE c.id = :id"))?
            .query_row(rusqlite::named_params! { ":id": id }, |row| models::Comment::try_from(row))?;

        Ok(comment)
    }

    /// Comments on `post_id`, newest first.
    pub fn query_comments(&self, post_id: i64, limit: usize) -> DBResult<Vec<models::Comment>> {
        let connection = self.connect()?;

        let mut stmt = connection.prepare(&format!(
            "{COMMENT_SELECT}
             WHERE c.post_id = :post_id
             ORDER BY c.created_at DESC, c.id DESC
             LIMIT :limit"
        ))?;

        let comments = stmt
            .query_map(rusqlite::named_params! { ":post_id": post_id, ":limit": limit }, |row| {
                models::Comment::try_from(row)
            })?
            .collect::<DBResult<Vec<_>>>()?;

        Ok(comments)
    }

    /// Deletes `comment_id` if `user_id` wrote it. Returns `true` if it was removed.
    pub fn delete_comment(&self, comment_id: i64, user_id: &UserId) -> DBResult<bool> {
        let connection = self.connect()?;
        let removed = connection
            .prepare("DELETE FROM Comments WHERE id = :comment_id AND user_id = :user_id")?
            .execute(rusqlite::named_params! { ":comment_id": comment_id, ":user_id": user_id.as_str() })?;

        Ok(removed > 0)
    }

    fn require_post(&self, post_id: i64) -> GamifyResult<()> {
        let connection = self.connect()?;
        let exists = connection
            .prepare("SELECT 1 FROM Posts WHERE id = :post_id")?
            .exists(rusqlite::named_params! { ":post_id": post_id })?;

        if !exists {
            return Err(GamifyError::InvalidInput(format!("no post #{post_id}")));
        }
        Ok(())
    }
}

impl<'a> TryFrom<&'a rusqlite::Row<'a>> for models::Comment {
    type Error = rusqlite::Error;

    fn try_from(row: &rusqlite::Row) -> Result<Self, rusqlite::Error> {
        let user_id = UserId::parse(&row.get::<_, String>("user_id")?)
            .map_err(|err| conversion_error(0, err))?;

        Ok(Self {
            id: row.get("id")?,
            post_id: row.get("post_id")?,
            user_id,
            author: row.get("author")?,
            content: row.get("content")?,
            created_at: row.get("created_at")?,
        })
    }
}

fn validate_text<'a>(what: &str, text: &'a str, max_length: usize) -> GamifyResult<&'a str> {
    let text = text.trim();
    if text.is_empty() {
        return Err(GamifyError::InvalidInput(format!("{what} must not be empty")));
    }
    if text.chars().count() > max_length {
        return Err(GamifyError::InvalidInput(format!("{what} must be at most {max_length} characters")));
    }

    Ok(text)
}

/// Lowercases tags, strips a leading `#`, and drops blanks and duplicates.
fn normalize_tags(tags: &[String]) -> GamifyResult<Vec<String>> {
    let tags = tags
        .iter()
        .map(|t| t.trim().trim_start_matches('#').to_lowercase())
        .filter(|t| !t.is_empty())
        .unique()
        .collect::<Vec<_>>();

    if tags.len() > MAX_TAGS {
        return Err(GamifyError::InvalidInput(format!("at most {MAX_TAGS} tags per post")));
    }
    if let Some(bad) = tags.iter().find(|t| t.contains(',')) {
        return Err(GamifyError::InvalidInput(format!("tag '{bad}' must not contain commas")));
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecodb::testing::temp_database;

    fn user(id: &str) -> UserId {
        UserId::parse(id).unwrap()
    }

    fn new_post(content: &str) -> models::NewPost {
        models::NewPost {
            content: String::from(content),
            image_url: None,
            tags: Vec::new(),
            is_public: true,
        }
    }

    #[test]
    fn created_posts_carry_author_and_tags() {
        let (database, _dir) = temp_database();
        database.upsert_profile(&user("a"), &models::Profile {
            username: String::from("alice"),
            ..Default::default()
        }).unwrap();

        let post = database.create_post(&user("a"), &models::NewPost {
            tags: vec![String::from("#Compost"), String::from("compost"), String::from(" zero-waste ")],
            image_url: Some(String::from("https://cdn.example/bin.png")),
            ..new_post("  Sorted the whole kitchen today  ")
        }).unwrap();

        assert_eq!(post.author.as_deref(), Some("alice"));
        assert_eq!(post.content, "Sorted the whole kitchen today");
        assert_eq!(post.tags, vec!["compost", "zero-waste"]);
        assert_eq!((post.likes_count, post.comments_count), (0, 0));
        assert_eq!(database.query_post(post.id).unwrap(), Some(post));
    }

    #[test]
    fn invalid_posts_are_rejected() {
        let (database, _dir) = temp_database();

        assert!(matches!(database.create_post(&user("a"), &new_post("   ")), Err(GamifyError::InvalidInput(_))));
        assert!(matches!(
            database.create_post(&user("a"), &new_post(&"x".repeat(MAX_POST_LENGTH + 1))),
            Err(GamifyError::InvalidInput(_))
        ));
        assert!(database.query_feed(10, 0).unwrap().is_empty());
    }

    #[test]
    fn feed_is_public_newest_first_and_paged() {
        let (database, _dir) = temp_database();
        for content in ["first", "second", "third"] {
            database.create_post(&user("a"), &new_post(content)).unwrap();
        }
        database.create_post(&user("b"), &models::NewPost { is_public: false, ..new_post("hidden") }).unwrap();

        let contents = |posts: Vec<models::Post>| posts.into_iter().map(|p| p.content).collect::<Vec<_>>();
        assert_eq!(contents(database.query_feed(2, 0).unwrap()), vec!["third", "second"]);
        assert_eq!(contents(database.query_feed(2, 2).unwrap()), vec!["first"]);

        // Private posts still show up for their author.
        assert_eq!(contents(database.query_user_posts(&user("b"), 10).unwrap()), vec!["hidden"]);
    }

    #[test]
    fn likes_are_idempotent_and_counted() {
        let (database, _dir) = temp_database();
        let post = database.create_post(&user("a"), &new_post("look at this bin")).unwrap();

        assert!(database.like_post(post.id, &user("b")).unwrap());
        assert!(!database.like_post(post.id, &user("b")).unwrap());
        assert!(database.like_post(post.id, &user("c")).unwrap());
        assert!(database.is_liked(post.id, &user("b")).unwrap());
        assert_eq!(database.query_post(post.id).unwrap().unwrap().likes_count, 2);

        assert!(database.unlike_post(post.id, &user("b")).unwrap());
        assert!(!database.unlike_post(post.id, &user("b")).unwrap());
        assert!(!database.is_liked(post.id, &user("b")).unwrap());

        assert!(matches!(database.like_post(999, &user("b")), Err(GamifyError::InvalidInput(_))));
    }

    #[test]
    fn comments_are_newest_first() {
        let (database, _dir) = temp_database();
        let post = database.create_post(&user("a"), &new_post("thoughts?")).unwrap();

        let first = database.add_comment(post.id, &user("b"), "nice").unwrap();
        let second = database.add_comment(post.id, &user("c"), "agreed").unwrap();

        assert_eq!(first.author, None);
        assert_eq!(database.query_comments(post.id, 10).unwrap(), vec![second.clone(), first]);
        assert_eq!(database.query_post(post.id).unwrap().unwrap().comments_count, 2);

        assert!(!database.delete_comment(second.id, &user("b")).unwrap());
        assert!(database.delete_comment(second.id, &user("c")).unwrap());
        assert_eq!(database.query_comments(post.id, 10).unwrap().len(), 1);

        assert!(matches!(database.add_comment(999, &user("b"), "hello?"), Err(GamifyError::InvalidInput(_))));
        assert!(matches!(database.add_comment(post.id, &user("b"), " "), Err(GamifyError::InvalidInput(_))));
    }

    #[test]
    fn only_the_author_can_delete_and_children_go_too() {
        let (database, _dir) = temp_database();
        let post = database.create_post(&user("a"), &new_post("temporary")).unwrap();
        database.like_post(post.id, &user("b")).unwrap();
        database.add_comment(post.id, &user("b"), "bye").unwrap();

        assert!(!database.delete_post(post.id, &user("b")).unwrap());
        assert!(database.delete_post(post.id, &user("a")).unwrap());

        assert_eq!(database.query_post(post.id).unwrap(), None);
        assert!(!database.is_liked(post.id, &user("b")).unwrap());
        assert!(database.query_comments(post.id, 10).unwrap().is_empty());
    }
}
