pub mod engine;
pub mod gamification;

pub use engine::{level_for, points_for, ACHIEVEMENTS};
pub use gamification::GamificationService;
