use chrono::{DateTime, NaiveDate, Utc};
use itertools::Itertools;
use serde::Deserialize;
use serde_json::Value;

use crate::gamify::{GamifyError, PLACEHOLDER_NAME};

/// Opaque identifier for a user. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Validates `raw` into a `UserId`, rejecting empty or whitespace-only input.
    pub fn parse(raw: &str) -> Result<Self, GamifyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(GamifyError::InvalidInput(String::from("user id must not be empty")));
        }

        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreakRecord {
    pub user_id: UserId,

    pub current_streak: u32,
    pub longest_streak: u32,

    pub last_date: Option<NaiveDate>,
}

impl StreakRecord {
    /// The record a user starts with before any activity has been recorded.
    pub fn zero(user_id: UserId) -> Self {
        Self {
            user_id,
            current_streak: 0,
            longest_streak: 0,
            last_date: None,
        }
    }
}

impl std::fmt::Display for StreakRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "**Streak:**\n\
             \tCurrent: {} day(s)\n\
             \tLongest: {} day(s)\n\
             \tLast active: {}",
            self.current_streak,
            self.longest_streak,
            self.last_date.map_or_else(|| String::from("never"), |d| d.format("%Y-%m-%d").to_string())
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub display_name: String,
    pub badge_name: String,
    pub streak_value: u32,
}

impl std::fmt::Display for LeaderboardEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "`#{}` **{}** | {} | {} day(s)",
            self.rank, self.display_name, self.badge_name, self.streak_value
        )
    }
}

/// Coarse bin a waste category ends up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposalStream {
    Recyclable,
    Wet,
    Dry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WasteCategory {
    Plastic,
    Paper,
    Metal,
    Glass,
    Organic,
    EWaste,
    Hazardous,
}

impl WasteCategory {
    pub const ALL: [WasteCategory; 7] = [
        WasteCategory::Plastic,
        WasteCategory::Paper,
        WasteCategory::Metal,
        WasteCategory::Glass,
        WasteCategory::Organic,
        WasteCategory::EWaste,
        WasteCategory::Hazardous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WasteCategory::Plastic => "plastic",
            WasteCategory::Paper => "paper",
            WasteCategory::Metal => "metal",
            WasteCategory::Glass => "glass",
            WasteCategory::Organic => "organic",
            WasteCategory::EWaste => "e-waste",
            WasteCategory::Hazardous => "hazardous",
        }
    }

    /// Case-insensitive lookup of a category label. Returns None for anything
    /// outside the closed set.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.as_str() == normalized)
    }

    pub fn stream(&self) -> DisposalStream {
        match self {
            WasteCategory::Plastic
            | WasteCategory::Paper
            | WasteCategory::Metal
            | WasteCategory::Glass => DisposalStream::Recyclable,
            WasteCategory::Organic => DisposalStream::Wet,
            WasteCategory::EWaste | WasteCategory::Hazardous => DisposalStream::Dry,
        }
    }
}

impl std::fmt::Display for WasteCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Raw webhook payload. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
pub struct RawClassification {
    pub category: Option<String>,
    pub confidence: Option<Value>,
    pub description: Option<String>,
    pub disposal_method: Option<String>,
}

/// A classification result that has been validated at the webhook boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Category text as the webhook sent it, or "Unknown".
    pub label: String,
    pub category: Option<WasteCategory>,
    /// Integer percentage, 0..=100.
    pub confidence: u8,
    pub description: String,
    pub disposal_method: String,
}

impl From<RawClassification> for Classification {
    fn from(raw: RawClassification) -> Self {
        let label = raw
            .category
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| String::from("Unknown"));

        Self {
            category: WasteCategory::from_label(&label),
            label,
            confidence: normalize_confidence(raw.confidence.as_ref()),
            description: raw.description.unwrap_or_default(),
            disposal_method: raw.disposal_method.unwrap_or_default(),
        }
    }
}

/// Webhooks report confidence either as a fraction (0..=1) or a percentage.
/// Values above 1 are taken as percentages, anything else is scaled by 100.
pub fn normalize_confidence(value: Option<&Value>) -> u8 {
    let raw = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };

    let Some(raw) = raw.filter(|v| v.is_finite()) else { return 0 };
    let percent = if raw > 1.0 { raw } else { raw * 100.0 };

    percent.round().clamp(0.0, 100.0) as u8
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "**Classification:** {}\n\
             \tConfidence: {}%",
            self.label, self.confidence
        )?;

        if !self.description.is_empty() {
            write!(f, "\n\t{}", self.description)?;
        }
        if !self.disposal_method.is_empty() {
            write!(f, "\n\tDisposal: {}", self.disposal_method)?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationRecord {
    pub user_id: UserId,
    pub category: WasteCategory,
    pub confidence: u8,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for ClassificationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "`{}` {} ({}%)",
            self.created_at.format("%Y-%m-%d %H:%M"),
            self.category,
            self.confidence
        )
    }
}

/// Derived totals shown alongside a profile. Never written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProfileCounts {
    pub posts: usize,
    pub followers: usize,
    pub following: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Profile {
    pub username: String,
    pub bio: String,
    pub location: String,
    pub avatar_url: Option<String>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub counts: ProfileCounts,
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "**{}**\n\
             \tBio: {}\n\
             \tLocation: {}\n\
             \t{} post(s) | {} follower(s) | {} following",
            self.username,
            if self.bio.is_empty() { "-" } else { self.bio.as_str() },
            if self.location.is_empty() { "-" } else { self.location.as_str() },
            self.counts.posts,
            self.counts.followers,
            self.counts.following,
        )?;

        if let Some(avatar_url) = &self.avatar_url {
            write!(f, "\n\tAvatar: <{avatar_url}>")?;
        }

        Ok(())
    }
}

/// What a user submits when posting to the feed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub content: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub user_id: UserId,
    /// Author's username at read time, or None if they have no profile.
    pub author: Option<String>,

    pub content: String,
    pub image_url: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,

    pub likes_count: usize,
    pub comments_count: usize,
}

impl std::fmt::Display for Post {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "`#{}` **{}** | {}\n\t{}",
            self.id,
            self.author.as_deref().unwrap_or(PLACEHOLDER_NAME),
            self.created_at.format("%Y-%m-%d %H:%M"),
            self.content,
        )?;

        if !self.tags.is_empty() {
            write!(f, "\n\t{}", self.tags.iter().map(|t| format!("#{t}")).join(" "))?;
        }
        if let Some(image_url) = &self.image_url {
            write!(f, "\n\t<{image_url}>")?;
        }

        write!(f, "\n\t❤️ {} | 💬 {}", self.likes_count, self.comments_count)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: UserId,
    pub author: Option<String>,

    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Display for Comment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "`#{}` **{}**: {}",
            self.id,
            self.author.as_deref().unwrap_or(PLACEHOLDER_NAME),
            self.content
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearbyUser {
    pub user_id: UserId,
    pub username: String,
    pub distance_km: f64,
}

impl std::fmt::Display for NearbyUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "**{}** | {} km away", self.username, self.distance_km)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisposalGuide {
    pub category: String,

    #[serde(default)]
    pub tips: Vec<String>,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default)]
    pub environmental_impact: String,
}

impl std::fmt::Display for DisposalGuide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "**Disposal guide: {}**", self.category)?;
        for tip in &self.tips {
            write!(f, "\n\t- {tip}")?;
        }
        if !self.examples.is_empty() {
            write!(f, "\nExamples: {}", self.examples.join(", "))?;
        }
        if !self.environmental_impact.is_empty() {
            write!(f, "\n*{}*", self.environmental_impact)?;
        }

        Ok(())
    }
}
