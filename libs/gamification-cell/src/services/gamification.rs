use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use shared_config::AppConfig;
use shared_database::SupabaseClient;

use crate::models::{
    AchievementStatus, AwardContext, AwardOutcome, GamificationError, LeaderboardEntry,
    ScoredAction, UserGamification,
};
use crate::services::engine::{apply_action, level_for, ACHIEVEMENTS};

const DEFAULT_LEADERBOARD_SIZE: u32 = 10;
const MAX_LEADERBOARD_SIZE: u32 = 100;

pub struct GamificationService {
    supabase: SupabaseClient,
}

impl GamificationService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    async fn find_record(&self, user_id: &str, auth_token: &str) -> Result<Option<UserGamification>, GamificationError> {
        let path = format!("/rest/v1/user_gamification?user_id=eq.{}", user_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// Returns the caller's record, creating a zeroed one on first access.
    pub async fn get_or_create(&self, user_id: &str, auth_token: &str) -> Result<UserGamification, GamificationError> {
        if let Some(record) = self.find_record(user_id, auth_token).await? {
            return Ok(record);
        }

        debug!("Creating gamification record for {}", user_id);
        let body = json!({
            "user_id": user_id,
            "total_points": 0,
            "level_name": level_for(0).level_name,
            "achievements": [],
            "streaks": {},
        });
        let rows = self.supabase.insert_returning("/rest/v1/user_gamification", auth_token, body).await?;
        let row = rows.into_iter().next().ok_or(GamificationError::NotFound)?;
        Ok(serde_json::from_value(row)?)
    }

    /// Folds one action into the user's points, streak and achievements.
    pub async fn award(
        &self,
        user_id: &str,
        action: ScoredAction,
        context: AwardContext,
        auth_token: &str,
    ) -> Result<AwardOutcome, GamificationError> {
        let record = self.get_or_create(user_id, auth_token).await?;
        let applied = apply_action(&record.streaks, &record.achievements, action, context, Utc::now());

        let total_points = record.total_points + applied.total();
        let level = level_for(total_points);

        let path = format!("/rest/v1/user_gamification?id=eq.{}", record.id);
        let body = json!({
            "total_points": total_points,
            "level_name": level.level_name,
            "achievements": applied.achievements,
            "streaks": applied.streaks,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.supabase.patch_returning(&path, auth_token, body).await?;

        if !applied.unlocked.is_empty() {
            info!("User {} unlocked {:?}", user_id, applied.unlocked);
        }
        debug!("Awarded {} points to {} for {:?}", applied.total(), user_id, action);

        Ok(AwardOutcome {
            points_awarded: applied.action_points + applied.achievement_points,
            streak_bonus: applied.streak_bonus,
            unlocked: applied.unlocked,
            total_points,
            level_name: level.level_name,
        })
    }

    /// Fire-and-forget variant for ledger callers: points never block stock movements.
    pub async fn award_best_effort(
        &self,
        user_id: &str,
        action: ScoredAction,
        context: AwardContext,
        auth_token: &str,
    ) -> Option<AwardOutcome> {
        match self.award(user_id, action, context, auth_token).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Could not award points to {} for {:?}: {}", user_id, action, e);
                None
            }
        }
    }

    pub async fn leaderboard(&self, limit: Option<u32>, auth_token: &str) -> Result<Vec<LeaderboardEntry>, GamificationError> {
        let limit = limit.unwrap_or(DEFAULT_LEADERBOARD_SIZE).clamp(1, MAX_LEADERBOARD_SIZE);
        let path = format!(
            "/rest/v1/user_gamification?select=*,profiles(full_name)&order=total_points.desc&limit={}",
            limit
        );
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        let entries = rows.into_iter()
            .enumerate()
            .map(|(index, row)| {
                let total_points = row["total_points"].as_i64().unwrap_or(0);
                LeaderboardEntry {
                    position: index + 1,
                    user_id: row["user_id"].as_str().unwrap_or_default().to_string(),
                    user_name: row["profiles"]["full_name"].as_str().map(str::to_string),
                    total_points,
                    level_name: row["level_name"].as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| level_for(total_points).level_name.to_string()),
                    achievements_count: row["achievements"].as_array().map(Vec::len).unwrap_or(0),
                }
            })
            .collect();

        Ok(entries)
    }

    pub fn achievement_statuses(record: &UserGamification) -> Vec<AchievementStatus> {
        ACHIEVEMENTS.iter()
            .map(|achievement| {
                let unlocked = record.achievements.iter().find(|a| a.id == achievement.id);
                AchievementStatus {
                    achievement: *achievement,
                    unlocked: unlocked.is_some(),
                    unlocked_at: unlocked.map(|a| a.unlocked_at),
                }
            })
            .collect()
    }
}
