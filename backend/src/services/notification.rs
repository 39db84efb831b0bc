//! Payment notification chains: scheduling and manual management

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use shared::{
    Actor, ChainStatus, NotificationChain, NotificationType, Order, PaymentMethod,
};
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::external::sms::{format_amount_fr, format_date_fr};
use crate::store::NotificationStore;

/// Input for a manually scheduled chain
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateChainInput {
    pub order_id: Option<Uuid>,
    pub client_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(length(min = 1))]
    pub message: String,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub send_sms: bool,
    #[serde(default)]
    pub send_email: bool,
    pub notification_type: NotificationType,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainStatusInput {
    pub status: ChainStatus,
}

#[derive(Clone)]
pub struct NotificationChainService {
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    reminder_days_before: i64,
}

impl NotificationChainService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        clock: Arc<dyn Clock>,
        reminder_days_before: i64,
    ) -> Self {
        Self {
            store,
            clock,
            reminder_days_before,
        }
    }

    pub async fn create(&self, actor: &Actor, input: CreateChainInput) -> AppResult<NotificationChain> {
        input.validate()?;
        if input.title.trim().is_empty() || input.message.trim().is_empty() {
            return Err(AppError::validation(
                "message",
                "Title and message are required",
                "Le titre et le message sont obligatoires",
            ));
        }
        if !input.send_sms && !input.send_email {
            return Err(AppError::validation(
                "send_sms",
                "At least one channel must be requested",
                "Au moins un canal doit être choisi",
            ));
        }

        let chain = NotificationChain {
            id: Uuid::new_v4(),
            order_id: input.order_id,
            client_id: Some(input.client_id),
            title: input.title.trim().to_string(),
            message: input.message,
            scheduled_date: input.scheduled_date,
            send_sms: input.send_sms,
            send_email: input.send_email,
            notification_type: input.notification_type,
            is_sent: false,
            sent_at: None,
            failure_reason: None,
            status: ChainStatus::Active,
            created_by: actor.id,
            created_at: self.clock.now(),
        };
        self.store.insert_chain(&chain).await?;
        tracing::info!(chain_id = %chain.id, order_id = ?chain.order_id, "Notification chain created");
        Ok(chain)
    }

    /// A confirmation now and a reminder ahead of the due date.
    ///
    /// Nothing is stored: the chains are written together with the order.
    pub fn plan_for_deposit_order(&self, order: &Order, actor: &Actor) -> Vec<NotificationChain> {
        let Some(due) = order.payment_due_date else {
            return Vec::new();
        };
        if order.payment_method != PaymentMethod::Depot {
            return Vec::new();
        }

        let now = self.clock.now();
        let reminder_at = (due - Duration::days(self.reminder_days_before)).max(now);
        let reference = order.reference();
        let amount = format_amount_fr(order.total());
        let due_text = format_date_fr(due);

        let plans = [
            (
                NotificationType::Confirmation,
                now,
                format!("Confirmation de la commande {}", reference),
                format!(
                    "Votre commande {} d'un montant de {} F CFA est validée.\nÉchéance de paiement : {}.",
                    reference, amount, due_text
                ),
            ),
            (
                NotificationType::Reminder,
                reminder_at,
                format!("Rappel d'échéance : commande {}", reference),
                format!(
                    "Le paiement des {} F CFA pour la commande {} arrive à échéance le {}.\nMerci de bien vouloir régulariser dans les délais.",
                    amount, reference, due_text
                ),
            ),
        ];

        plans
            .into_iter()
            .map(|(notification_type, scheduled_date, title, message)| NotificationChain {
                id: Uuid::new_v4(),
                order_id: Some(order.id),
                client_id: Some(order.buyer_id),
                title,
                message,
                scheduled_date,
                send_sms: true,
                send_email: true,
                notification_type,
                is_sent: false,
                sent_at: None,
                failure_reason: None,
                status: ChainStatus::Active,
                created_by: actor.id,
                created_at: now,
            })
            .collect()
    }

    pub async fn set_status(&self, chain_id: Uuid, status: ChainStatus) -> AppResult<NotificationChain> {
        let chain = self
            .store
            .chain(chain_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification chain".to_string()))?;
        if chain.is_sent {
            return Err(AppError::Conflict {
                resource: "notification_chain".to_string(),
                message: "A sent chain cannot change status".to_string(),
                message_fr: "Une notification envoyée ne peut plus être modifiée".to_string(),
            });
        }
        let chain = self.store.set_chain_status(chain_id, status).await?;
        tracing::info!(chain_id = %chain_id, status = status.as_str(), "Notification chain status changed");
        Ok(chain)
    }

    pub async fn for_order(&self, order_id: Uuid) -> AppResult<Vec<NotificationChain>> {
        self.store.chains_for_order(order_id).await
    }

    pub async fn deactivate_for_order(&self, order_id: Uuid) -> AppResult<u64> {
        self.store.deactivate_unsent_chains(order_id).await
    }
}
