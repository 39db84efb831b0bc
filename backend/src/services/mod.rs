//! Business logic services for the publishing ledger

pub mod correction;
pub mod ledger;
pub mod notification;
pub mod order;
pub mod scheduler;

pub use correction::{CorrectionKind, CorrectionOutcome, CorrectionRequest, StockCorrectionService};
pub use ledger::{MovementContext, StockLedger};
pub use notification::NotificationChainService;
pub use order::{OrderService, OrderStateMachine, OrderView};
pub use scheduler::NotificationChainScheduler;
