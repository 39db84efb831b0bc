//! HTTP handlers

pub mod corrections;
pub mod health;
pub mod notification;
pub mod orders;
pub mod partner;
pub mod stock;

pub use corrections::*;
pub use health::*;
pub use notification::*;
pub use orders::*;
pub use partner::*;
pub use stock::*;
