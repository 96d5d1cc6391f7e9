pub mod handlers;
pub mod router;
pub mod models;
pub mod services;

pub use models::*;
pub use router::inventory_routes;
pub use services::{AuditChainService, LedgerService, LotQueryService, QrSigner, QualityControlService};
