pub const STREAKS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Streaks (
        user_id         TEXT        PRIMARY KEY,

        current_streak  INTEGER     NOT NULL    DEFAULT 0,
        longest_streak  INTEGER     NOT NULL    DEFAULT 0,
        last_date       TEXT,

        CHECK (longest_streak >= current_streak)
    )";

pub const PROFILES_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Profiles (
        user_id        TEXT        PRIMARY KEY,
        username       TEXT        NOT NULL,

        bio            TEXT        NOT NULL    DEFAULT '',
        location       TEXT        NOT NULL    DEFAULT '',
        avatar_url     TEXT,
        latitude       REAL,
        longitude      REAL
    )";

pub const CLASSIFICATIONS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Classifications (
        id             INTEGER     PRIMARY KEY,

        user_id        TEXT        NOT NULL,
        category       TEXT        NOT NULL,
        confidence     INTEGER     NOT NULL,
        description    TEXT        NOT NULL,
        created_at     TIMESTAMP   NOT NULL
    )";

pub const FOLLOWS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Follows (
        follower_id    TEXT        NOT NULL,
        following_id   TEXT        NOT NULL,
        created_at     TIMESTAMP   NOT NULL,

        UNIQUE (follower_id, following_id),
        CHECK (follower_id <> following_id)
    )";

pub const POSTS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Posts (
        id             INTEGER     PRIMARY KEY,

        user_id        TEXT        NOT NULL,
        content        TEXT        NOT NULL,
        image_url      TEXT,
        tags           TEXT        NOT NULL    DEFAULT '',
        is_public      INTEGER     NOT NULL    DEFAULT 1,
        created_at     TIMESTAMP   NOT NULL
    )";

pub const LIKES_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Likes (
        post_id        INTEGER     NOT NULL    REFERENCES Posts (id) ON DELETE CASCADE,
        user_id        TEXT        NOT NULL,
        created_at     TIMESTAMP   NOT NULL,

        UNIQUE (post_id, user_id)
    )";

pub const COMMENTS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS Comments (
        id             INTEGER     PRIMARY KEY,

        post_id        INTEGER     NOT NULL    REFERENCES Posts (id) ON DELETE CASCADE,
        user_id        TEXT        NOT NULL,
        content        TEXT        NOT NULL,
        created_at     TIMESTAMP   NOT NULL
    )";
