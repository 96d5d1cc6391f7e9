pub mod users;

pub use users::{check_self_update, user_stats, UserService};
