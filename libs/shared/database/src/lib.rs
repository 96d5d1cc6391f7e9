pub mod roles;
pub mod supabase;

pub use roles::{current_user_role, require_role};
pub use supabase::{is_conflict, SupabaseClient, SupabaseError};
