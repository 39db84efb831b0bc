//! Outbound notification channels

pub mod email;
pub mod sms;

pub use email::{EmailMessage, EmailOutcome, EmailTransport, HttpEmailClient};
pub use sms::{FasterMessageClient, SmsMessage, SmsResponse, SmsStatus, SmsTransport};
