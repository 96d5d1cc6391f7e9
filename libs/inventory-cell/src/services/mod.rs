pub mod audit_chain;
pub mod ledger;
pub mod lots;
pub mod qr;
pub mod quality;
pub mod rules;

pub use audit_chain::AuditChainService;
pub use ledger::LedgerService;
pub use lots::LotQueryService;
pub use qr::QrSigner;
pub use quality::QualityControlService;
