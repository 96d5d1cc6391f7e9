pub mod catalog;
pub mod validation;

pub use catalog::CatalogService;
