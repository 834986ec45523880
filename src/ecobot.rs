use serenity::async_trait;
use serenity::constants::MESSAGE_CODE_LIMIT;
use serenity::model::channel::{Attachment, Message};
use serenity::model::gateway::Ready;
use serenity::prelude::*;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use std::sync::Arc;

use crate::config::Config;
use crate::ecoapi::EcoApi;
use crate::ecodb::profiles::MAX_USERNAME_LENGTH;
use crate::ecodb::Database;
use crate::gamify::{self, StreakStore};
use crate::models::{self, Classification, LeaderboardEntry, StreakRecord};

pub mod commands;

use commands::Commands;

/// File extensions treated as images when Discord doesn't send a content type.
const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];

const TRUNCATION_MARKER: &str = "\n…";

/// Everything a command needs, shared across the handler's tasks.
pub struct EcoState {
    pub config: Config,
    pub database: Database,
    pub api: EcoApi,
}

impl EcoState {
    pub fn new(config: Config) -> Result<Self> {
        let database = Database::open(&config.db_path)
            .with_context(|| format!("Could not open database at {}", config.db_path))?;
        let api = EcoApi::new(config.classify_webhook.clone(), config.guide_webhook.clone());

        Ok(Self { config, database, api })
    }

    /// Runs `query` on tokio's blocking pool.
    pub async fn db<T, F>(&self, query: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let database = self.database.clone();
        tokio::task::spawn_blocking(move || query(&database))
            .await
            .context("Database task failed.")?
    }
}

/// Gives `user_id` a profile named `fallback_name` if they don't have one yet.
pub fn ensure_profile(database: &Database, user_id: &models::UserId, fallback_name: &str) -> Result<()> {
    if database.query_profile(user_id)?.is_none() {
        let profile = models::Profile {
            username: fallback_name.chars().take(MAX_USERNAME_LENGTH).collect(),
            ..Default::default()
        };
        database.upsert_profile(user_id, &profile)?;
    }

    Ok(())
}

/// Stores a classification and counts it towards `user_id`'s streak for `today`.
pub fn record_classification(
    database: &Database,
    user_id: &models::UserId,
    classification: &Classification,
    today: NaiveDate,
) -> Result<StreakRecord> {
    database
        .insert_classification(user_id, classification)
        .context("Could not save classification.")?;

    let streak = gamify::record_activity(database, user_id, today)
        .context("Could not update streak.")?;

    Ok(streak)
}

/// Top `limit` users by current streak.
pub fn leaderboard(database: &Database, limit: usize) -> Result<Vec<LeaderboardEntry>> {
    let records = database.snapshot()?;

    Ok(gamify::derive_leaderboard(
        &records,
        |user_id| database.resolve_name(user_id),
        limit,
    ))
}

/// Cuts `message` down to what Discord accepts in a single message.
pub fn fit_message(message: String) -> String {
    if message.chars().count() <= MESSAGE_CODE_LIMIT {
        return message;
    }

    let keep = MESSAGE_CODE_LIMIT - TRUNCATION_MARKER.chars().count();
    let mut fitted = message.chars().take(keep).collect::<String>();
    fitted.push_str(TRUNCATION_MARKER);
    fitted
}

pub async fn run_ecobot(state: EcoState) -> Result<()> {
    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let token = state.config.discord_token.clone();
    let handler = EcoHandler { state: Arc::new(state) };

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .await
        .context("Error creating client.")?;

    client.start().await?;

    Ok(())
}

/// Whether an attachment looks like something the classifier can take.
pub fn is_image(attachment: &Attachment) -> bool {
    is_image_file(attachment.content_type.as_deref(), &attachment.filename)
}

fn is_image_file(content_type: Option<&str>, filename: &str) -> bool {
    if let Some(content_type) = content_type {
        return content_type.starts_with("image/");
    }

    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

struct EcoHandler {
    state: Arc<EcoState>,
}

#[async_trait]
impl EventHandler for EcoHandler {
    async fn ready(&self, _ctx: serenity::client::Context, ready: Ready) {
        log::info!("Bot is connected and ready as {}!", ready.user.name);
    }

    async fn message(&self, ctx: serenity::client::Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let call_token = self.state.config.call_token;
        let is_command = msg.content.starts_with(call_token)
            && msg.content.len() > call_token.len_utf8();

        let response = if is_command {
            Commands::run_command(&ctx, &msg, &self.state).await
        } else if msg.attachments.iter().any(is_image) {
            // Dropping a photo in the channel is the same as `classify`.
            Commands::classify(&ctx, &msg, &self.state).await
        } else {
            return;
        };

        let response = match response {
            Ok(message) => message,
            Err(err) => {
                log::info!("Command from {} failed: {err:#}", msg.author.name);
                format!("Error: {err}")
            }
        };

        // Discord doesn't like sending empty messages.
        if response.is_empty() {
            return;
        }

        if let Err(why) = msg.channel_id.say(&ctx.http, fit_message(response)).await {
            let _ = msg.channel_id.say(&ctx.http, "Oops, internal error.").await;
            log::error!("Error sending message: {why:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DayBoundary;
    use crate::ecodb::testing::temp_database;
    use crate::models::{UserId, WasteCategory};

    fn state() -> (EcoState, tempfile::TempDir) {
        let (database, dir) = temp_database();
        let config = Config {
            discord_token: String::from("token"),
            call_token: '$',
            db_path: database.path().display().to_string(),
            classify_webhook: String::from("http://localhost:0/classify"),
            guide_webhook: None,
            day_boundary: DayBoundary::Utc,
            leaderboard_limit: 10,
            nearby_radius_km: 50.0,
        };

        (EcoState::new(config).unwrap(), dir)
    }

    fn glass() -> Classification {
        Classification {
            label: String::from("glass"),
            category: Some(WasteCategory::Glass),
            confidence: 88,
            description: String::new(),
            disposal_method: String::new(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn image_detection_prefers_content_type() {
        assert!(is_image_file(Some("image/png"), "photo.bin"));
        assert!(!is_image_file(Some("application/pdf"), "photo.png"));
        assert!(is_image_file(None, "bottle.JPG"));
        assert!(!is_image_file(None, "notes.txt"));
        assert!(!is_image_file(None, "no_extension"));
    }

    #[test]
    fn classification_builds_streak_and_history() {
        let (state, _dir) = state();
        let user = UserId::parse("123").unwrap();

        record_classification(&state.database, &user, &glass(), date("2024-04-01")).unwrap();
        record_classification(&state.database, &user, &glass(), date("2024-04-01")).unwrap();
        let streak = record_classification(&state.database, &user, &glass(), date("2024-04-02")).unwrap();

        assert_eq!(streak.current_streak, 2);
        assert_eq!(state.database.query_classifications(&user, 10).unwrap().len(), 3);
    }

    #[test]
    fn leaderboard_uses_profiles_and_placeholders() {
        let (state, _dir) = state();
        let database = &state.database;
        let named = UserId::parse("1").unwrap();
        let anonymous = UserId::parse("2").unwrap();

        ensure_profile(database, &named, "recycler").unwrap();
        ensure_profile(database, &named, "ignored-second-time").unwrap();

        record_classification(database, &anonymous, &glass(), date("2024-04-01")).unwrap();
        record_classification(database, &named, &glass(), date("2024-04-01")).unwrap();
        record_classification(database, &named, &glass(), date("2024-04-02")).unwrap();

        let board = leaderboard(database, 10).unwrap();
        let rows = board
            .iter()
            .map(|e| (e.rank, e.display_name.as_str(), e.streak_value))
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![(1, "recycler", 2), (2, gamify::PLACEHOLDER_NAME, 1)]);
    }

    #[test]
    fn long_chat_names_are_cut_to_fit_profiles() {
        let (state, _dir) = state();
        let user = UserId::parse("9").unwrap();

        ensure_profile(&state.database, &user, &"w".repeat(100)).unwrap();
        assert_eq!(state.database.resolve_name(&user).unwrap().len(), MAX_USERNAME_LENGTH);
    }

    #[test]
    fn long_replies_are_truncated() {
        let short = String::from("all good");
        assert_eq!(fit_message(short.clone()), short);

        let long = "🌱".repeat(MESSAGE_CODE_LIMIT + 500);
        let fitted = fit_message(long);
        assert_eq!(fitted.chars().count(), MESSAGE_CODE_LIMIT);
        assert!(fitted.ends_with(TRUNCATION_MARKER));
    }

    #[tokio::test]
    async fn database_work_runs_off_the_async_thread() {
        let (state, _dir) = state();
        let user = UserId::parse("42").unwrap();

        let streak = state
            .db(move |db| record_classification(db, &user, &glass(), date("2024-04-01")))
            .await
            .unwrap();
        assert_eq!(streak.current_streak, 1);

        let failed = state.db(|_| -> Result<()> { Err(anyhow::anyhow!("nope")) }).await;
        assert!(failed.is_err());
    }
}
