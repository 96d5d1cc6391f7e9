pub mod auth;
pub mod error;

pub use auth::{StaffRole, User};
pub use error::AppError;
