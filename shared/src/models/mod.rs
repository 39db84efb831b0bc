//! Domain models for the publishing back office

mod audit;
mod movement;
mod notification;
mod order;
mod partner_stock;
mod user;
mod work;

pub use audit::*;
pub use movement::*;
pub use notification::*;
pub use order::*;
pub use partner_stock::*;
pub use user::*;
pub use work::*;
