pub mod csv;
pub mod logs;

pub use logs::LogService;
