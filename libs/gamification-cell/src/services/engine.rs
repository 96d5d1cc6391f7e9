use chrono::{DateTime, NaiveDate, Utc};

use crate::models::{
    Achievement, AwardContext, LevelProgress, ScoredAction, StreakState, UnlockedAchievement,
};

pub const CRITICAL_BONUS: i64 = 4;
pub const STREAK_BONUS: i64 = 5;

pub const LEVELS: [(&str, i64); 7] = [
    ("Beginner", 0),
    ("Apprentice", 100),
    ("Competent", 300),
    ("Proficient", 600),
    ("Specialist", 1000),
    ("Master", 2000),
    ("Legend", 5000),
];

pub const ACHIEVEMENTS: [Achievement; 6] = [
    Achievement {
        id: "first_registration",
        name: "First Registration",
        description: "Registered a first reagent lot",
        points: 50,
    },
    Achievement {
        id: "accuracy_master",
        name: "Accuracy Master",
        description: "Logged 10 consumptions",
        points: 100,
    },
    Achievement {
        id: "sustainability_hero",
        name: "Sustainability Hero",
        description: "Used 5 lots close to expiry instead of discarding them",
        points: 150,
    },
    Achievement {
        id: "speed_demon",
        name: "Speed Demon",
        description: "Processed 20 actions in one day",
        points: 200,
    },
    Achievement {
        id: "quality_guardian",
        name: "Quality Guardian",
        description: "Recorded 25 quality controls",
        points: 250,
    },
    Achievement {
        id: "streak_champion",
        name: "Streak Champion",
        description: "Stayed active 30 days in a row",
        points: 300,
    },
];

/// Points for one action before streak and achievement bonuses.
pub fn points_for(action: ScoredAction, critical: bool) -> i64 {
    let base = action.base_points();
    if critical && base > 0 {
        base + CRITICAL_BONUS
    } else {
        base
    }
}

pub fn level_for(total_points: i64) -> LevelProgress {
    let index = LEVELS.iter()
        .rposition(|(_, min)| total_points >= *min)
        .unwrap_or(0);
    let (name, min) = LEVELS[index];

    match LEVELS.get(index + 1) {
        Some((next_name, next_min)) => {
            let span = (next_min - min) as f64;
            let progress = ((total_points - min) as f64 / span * 100.0).clamp(0.0, 100.0);
            LevelProgress {
                level_name: name,
                next_level: Some(next_name),
                points_to_next: Some(next_min - total_points),
                progress_percent: (progress * 10.0).round() / 10.0,
            }
        }
        None => LevelProgress {
            level_name: name,
            next_level: None,
            points_to_next: None,
            progress_percent: 100.0,
        },
    }
}

fn achievement_met(id: &str, streaks: &StreakState) -> bool {
    let counters = &streaks.counters;
    match id {
        "first_registration" => counters.registrations >= 1,
        "accuracy_master" => counters.consumptions >= 10,
        "sustainability_hero" => counters.near_expiry_consumptions >= 5,
        "speed_demon" => streaks.actions_today >= 20,
        "quality_guardian" => counters.quality_controls >= 25,
        "streak_champion" => streaks.current >= 30,
        _ => false,
    }
}

/// Result of folding one action into a user's state.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub action_points: i64,
    pub streak_bonus: i64,
    pub achievement_points: i64,
    pub unlocked: Vec<&'static str>,
    pub streaks: StreakState,
    pub achievements: Vec<UnlockedAchievement>,
}

impl Applied {
    pub fn total(&self) -> i64 {
        self.action_points + self.streak_bonus + self.achievement_points
    }
}

/// Updates streaks, counters and achievements for one action on `now`'s day.
pub fn apply_action(
    streaks: &StreakState,
    achievements: &[UnlockedAchievement],
    action: ScoredAction,
    context: AwardContext,
    now: DateTime<Utc>,
) -> Applied {
    let today: NaiveDate = now.date_naive();
    let mut next = streaks.clone();
    let mut streak_bonus = 0;

    match streaks.last_active_date {
        Some(last) if last == today => {
            next.actions_today += 1;
        }
        Some(last) if last.succ_opt() == Some(today) => {
            next.current += 1;
            next.actions_today = 1;
            streak_bonus = STREAK_BONUS;
        }
        _ => {
            next.current = 1;
            next.actions_today = 1;
        }
    }
    next.last_active_date = Some(today);
    next.longest = next.longest.max(next.current);

    match action {
        ScoredAction::Register => next.counters.registrations += 1,
        ScoredAction::Consume => {
            next.counters.consumptions += 1;
            if context.near_expiry {
                next.counters.near_expiry_consumptions += 1;
            }
        }
        ScoredAction::QualityControl => next.counters.quality_controls += 1,
        ScoredAction::Transfer | ScoredAction::Dispose | ScoredAction::Adjust => {}
    }

    let mut unlocked_list = achievements.to_vec();
    let mut unlocked = Vec::new();
    let mut achievement_points = 0;
    for achievement in ACHIEVEMENTS.iter() {
        let already = unlocked_list.iter().any(|a| a.id == achievement.id);
        if !already && achievement_met(achievement.id, &next) {
            unlocked_list.push(UnlockedAchievement {
                id: achievement.id.to_string(),
                unlocked_at: now,
            });
            unlocked.push(achievement.id);
            achievement_points += achievement.points;
        }
    }

    Applied {
        action_points: points_for(action, context.critical),
        streak_bonus,
        achievement_points,
        unlocked,
        streaks: next,
        achievements: unlocked_list,
    }
}
