use anyhow::{anyhow, Context, Result};
use chrono::{Local, NaiveDate, Utc};

use std::{env, fmt::Display, str::FromStr};

const DEFAULT_DB_PATH: &str = "ecosort.db";
const DEFAULT_LEADERBOARD_LIMIT: usize = 10;
const DEFAULT_NEARBY_RADIUS_KM: f64 = 50.0;

/// Which calendar decides when "today" rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DayBoundary {
    #[default]
    Utc,
    Local,
}

impl DayBoundary {
    pub fn today(&self) -> NaiveDate {
        match self {
            DayBoundary::Utc => Utc::now().date_naive(),
            DayBoundary::Local => Local::now().date_naive(),
        }
    }
}

impl FromStr for DayBoundary {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "utc" => Ok(DayBoundary::Utc),
            "local" => Ok(DayBoundary::Local),
            other => Err(anyhow!("Unknown day boundary '{other}', expected 'utc' or 'local'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub call_token: char,

    pub db_path: String,

    pub classify_webhook: String,
    pub guide_webhook: Option<String>,

    pub day_boundary: DayBoundary,
    pub leaderboard_limit: usize,
    pub nearby_radius_km: f64,
}

impl Config {
    /// Loads `.env` (if present) and reads the configuration from the environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let require = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Expected '{key}=<value>' in .env in project root."))
        };

        Ok(Self {
            discord_token: require("DISCORD_TOKEN")?,
            call_token: parse_call_token(&require("BOT_CALL_TOKEN")?)?,
            db_path: lookup("ECOSORT_DB_PATH").unwrap_or_else(|| String::from(DEFAULT_DB_PATH)),
            classify_webhook: require("N8N_CLASSIFY_WEBHOOK")?,
            guide_webhook: lookup("N8N_GUIDE_WEBHOOK").filter(|v| !v.trim().is_empty()),
            day_boundary: parse_or_default(&lookup, "ECOSORT_DAY_BOUNDARY", DayBoundary::default())?,
            leaderboard_limit: parse_or_default(&lookup, "LEADERBOARD_LIMIT", DEFAULT_LEADERBOARD_LIMIT)?,
            nearby_radius_km: parse_or_default(&lookup, "NEARBY_RADIUS_KM", DEFAULT_NEARBY_RADIUS_KM)?,
        })
    }
}

fn parse_or_default<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match lookup(key) {
        None => {
            log::info!("{key} not set, using default: {default}");
            Ok(default)
        }
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e| anyhow!("Invalid {key} value '{value}': {e}")),
    }
}

/// The call token is a single character (i.e., `$` or `!`). Longer values are truncated.
fn parse_call_token(raw: &str) -> Result<char> {
    let token = raw.trim().chars().next().context("BOT_CALL_TOKEN is empty.")?;
    if raw.trim().chars().count() > 1 {
        log::warn!("$BOT_CALL_TOKEN not a single character. Truncating to {token}");
    }

    Ok(token)
}

impl Display for DayBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayBoundary::Utc => write!(f, "utc"),
            DayBoundary::Local => write!(f, "local"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DISCORD_TOKEN", "token"),
        ("BOT_CALL_TOKEN", "$"),
        ("N8N_CLASSIFY_WEBHOOK", "http://hooks/classify"),
    ];

    #[test]
    fn defaults_fill_in_optional_values() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.call_token, '$');
        assert_eq!(config.db_path, DEFAULT_DB_PATH);
        assert_eq!(config.guide_webhook, None);
        assert_eq!(config.day_boundary, DayBoundary::Utc);
        assert_eq!(config.leaderboard_limit, 10);
        assert_eq!(config.nearby_radius_km, 50.0);
    }

    #[test]
    fn missing_required_values_are_errors() {
        let err = Config::from_lookup(lookup(&REQUIRED[..2])).unwrap_err();
        assert!(err.to_string().contains("N8N_CLASSIFY_WEBHOOK"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("BOT_CALL_TOKEN", "!!"),
            ("ECOSORT_DAY_BOUNDARY", "Local"),
            ("LEADERBOARD_LIMIT", "25"),
            ("N8N_GUIDE_WEBHOOK", "http://hooks/guide"),
        ]);
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.call_token, '!');
        assert_eq!(config.day_boundary, DayBoundary::Local);
        assert_eq!(config.leaderboard_limit, 25);
        assert_eq!(config.guide_webhook.as_deref(), Some("http://hooks/guide"));
    }

    #[test]
    fn garbage_numbers_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("LEADERBOARD_LIMIT", "lots"));

        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }
}
