use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

/// Ledger and lab actions that earn points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScoredAction {
    Register,
    Consume,
    Transfer,
    Dispose,
    Adjust,
    QualityControl,
}

impl ScoredAction {
    pub fn base_points(&self) -> i64 {
        match self {
            ScoredAction::Register => 15,
            ScoredAction::Consume => 5,
            ScoredAction::Transfer => 8,
            ScoredAction::Dispose => 10,
            ScoredAction::Adjust => 0,
            ScoredAction::QualityControl => 20,
        }
    }
}

/// Extra facts about the action that some achievements look at.
#[derive(Debug, Clone, Copy, Default)]
pub struct AwardContext {
    pub critical: bool,
    /// The lot was used while inside the expiry warning window.
    pub near_expiry: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionCounters {
    #[serde(default)]
    pub registrations: u32,
    #[serde(default)]
    pub consumptions: u32,
    #[serde(default)]
    pub near_expiry_consumptions: u32,
    #[serde(default)]
    pub quality_controls: u32,
}

/// Stored in `user_gamification.streaks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreakState {
    #[serde(default)]
    pub current: u32,
    #[serde(default)]
    pub longest: u32,
    pub last_active_date: Option<NaiveDate>,
    #[serde(default)]
    pub actions_today: u32,
    #[serde(default)]
    pub counters: ActionCounters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlockedAchievement {
    pub id: String,
    pub unlocked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGamification {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub total_points: i64,
    pub level_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub achievements: Vec<UnlockedAchievement>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub streaks: StreakState,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub points: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementStatus {
    #[serde(flatten)]
    pub achievement: Achievement,
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelProgress {
    pub level_name: &'static str,
    pub next_level: Option<&'static str>,
    pub points_to_next: Option<i64>,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    pub points_awarded: i64,
    pub streak_bonus: i64,
    pub unlocked: Vec<&'static str>,
    pub total_points: i64,
    pub level_name: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardEntry {
    pub position: usize,
    pub user_id: String,
    pub user_name: Option<String>,
    pub total_points: i64,
    pub level_name: String,
    pub achievements_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum GamificationError {
    #[error("Gamification record not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<anyhow::Error> for GamificationError {
    fn from(err: anyhow::Error) -> Self {
        GamificationError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for GamificationError {
    fn from(err: serde_json::Error) -> Self {
        GamificationError::DatabaseError(err.to_string())
    }
}
