//! Delivery of due payment notification chains
//!
//! One run selects the due set, tries every requested channel of every
//! chain, and marks a chain sent only when all of its channels succeeded.
//! Anything else is written to `failure_reason` and retried on the next run.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{anonymize_phone, ChainFailure, DispatchSummary, DueChain};

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::external::{
    sms::chain_sms_text, EmailMessage, EmailTransport, SmsMessage, SmsTransport,
};
use crate::store::NotificationStore;

const SMS: &str = "SMS";
const EMAIL: &str = "Email";

#[derive(Clone)]
pub struct NotificationChainScheduler {
    store: Arc<dyn NotificationStore>,
    sms: Arc<dyn SmsTransport>,
    email: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    channel_timeout: Duration,
}

impl NotificationChainScheduler {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        sms: Arc<dyn SmsTransport>,
        email: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
        channel_timeout: Duration,
    ) -> Self {
        Self {
            store,
            sms,
            email,
            clock,
            channel_timeout,
        }
    }

    /// Process every due chain once. Only a failing due-set query fails the run.
    pub async fn run(&self) -> AppResult<DispatchSummary> {
        let now = self.clock.now();
        let due = self.store.due_chains(now).await?;
        tracing::info!(count = due.len(), at = %now, "Processing due notification chains");

        let mut summary = DispatchSummary {
            total: due.len(),
            ..Default::default()
        };

        for chain in &due {
            let chain_id = chain.chain.id;
            let failure = match self.deliver(chain).await {
                Ok(failures) if failures.is_empty() => {
                    match self.store.mark_chain_sent(chain_id, self.clock.now()).await {
                        Ok(()) => {
                            summary.sent += 1;
                            tracing::info!(chain_id = %chain_id, "Notification chain sent");
                            continue;
                        }
                        Err(e) => e.to_string(),
                    }
                }
                Ok(failures) => failures.join(" | "),
                Err(e) => e.to_string(),
            };

            if let Err(e) = self.store.record_chain_failure(chain_id, &failure).await {
                tracing::error!(chain_id = %chain_id, error = %e, "Could not record chain failure");
            }
            tracing::warn!(chain_id = %chain_id, reason = %failure, "Notification chain not delivered");
            summary.failed += 1;
            summary.errors.push(ChainFailure {
                chain_id,
                error: failure,
            });
        }

        tracing::info!(
            total = summary.total,
            sent = summary.sent,
            failed = summary.failed,
            "Notification run finished"
        );
        Ok(summary)
    }

    /// Per-channel failure texts; `Err` means the chain itself could not be processed
    async fn deliver(&self, due: &DueChain) -> AppResult<Vec<String>> {
        let mut failures = Vec::new();

        if due.chain.send_sms {
            if let Err(e) = self.send_sms(due).await {
                failures.push(channel_failure(e)?);
            }
        }
        if due.chain.send_email {
            if let Err(e) = self.send_email(due).await {
                failures.push(channel_failure(e)?);
            }
        }

        Ok(failures)
    }

    async fn send_sms(&self, due: &DueChain) -> AppResult<()> {
        let (client, phone) = match &due.client {
            Some(client) => match client.phone.as_deref().filter(|p| !p.trim().is_empty()) {
                Some(phone) => (client, phone),
                None => return Err(missing(SMS, "Client sans numéro")),
            },
            None => return Err(missing(SMS, "Client sans numéro")),
        };

        let (amount, reference, due_date) = order_figures(due);
        let message = SmsMessage {
            to: phone.to_string(),
            text: chain_sms_text(
                due.chain.notification_type,
                &client.name,
                amount,
                &reference,
                due_date,
            ),
        };

        tracing::debug!(
            chain_id = %due.chain.id,
            phone = %anonymize_phone(phone),
            kind = due.chain.notification_type.as_str(),
            "Sending chain SMS"
        );

        let response = tokio::time::timeout(self.channel_timeout, self.sms.send(&message))
            .await
            .map_err(|_| timed_out(SMS, self.channel_timeout))??;

        if response.is_success() {
            Ok(())
        } else {
            Err(AppError::TransportFailure {
                channel: SMS,
                message: response.failure_message(),
            })
        }
    }

    async fn send_email(&self, due: &DueChain) -> AppResult<()> {
        let address = due
            .client
            .as_ref()
            .and_then(|c| c.email.as_deref())
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| missing(EMAIL, "Client sans adresse email"))?;

        let email = EmailMessage::from_text(address, &due.chain.title, &due.chain.message);
        let outcome = tokio::time::timeout(self.channel_timeout, self.email.send(&email))
            .await
            .map_err(|_| timed_out(EMAIL, self.channel_timeout))??;

        if outcome.success {
            Ok(())
        } else {
            Err(AppError::TransportFailure {
                channel: EMAIL,
                message: outcome.failure_message(),
            })
        }
    }
}

/// Amount, order reference and due date quoted in the SMS text
fn order_figures(due: &DueChain) -> (Decimal, String, DateTime<Utc>) {
    match &due.order {
        Some(order) => (
            order.total,
            order.reference.clone(),
            order.payment_due_date.unwrap_or(due.chain.scheduled_date),
        ),
        None => (
            Decimal::ZERO,
            due.chain
                .order_id
                .map(shared::order_reference)
                .unwrap_or_else(|| "N/A".to_string()),
            due.chain.scheduled_date,
        ),
    }
}

fn missing(channel: &'static str, reason: &'static str) -> AppError {
    AppError::MissingContactChannel { channel, reason }
}

fn timed_out(channel: &'static str, after: Duration) -> AppError {
    AppError::TransportFailure {
        channel,
        message: format!("délai dépassé ({}s)", after.as_secs()),
    }
}

/// Channel failures become text; any other error poisons the chain
fn channel_failure(error: AppError) -> AppResult<String> {
    match error {
        AppError::MissingContactChannel { .. } | AppError::TransportFailure { .. } => {
            Ok(error.to_string())
        }
        other => Err(other),
    }
}
