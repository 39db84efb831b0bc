//! Test harness shared by the integration suites
//!
//! Everything runs against the in-memory store, a manually driven clock and
//! scripted notification transports.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ledger_backend::clock::{Clock, FixedClock};
use ledger_backend::error::{AppError, AppResult};
use ledger_backend::external::{
    EmailMessage, EmailOutcome, EmailTransport, SmsMessage, SmsResponse, SmsStatus, SmsTransport,
};
use ledger_backend::services::ledger::CreateWorkInput;
use ledger_backend::services::order::{CreateOrderInput, OrderItemInput};
use ledger_backend::services::{
    NotificationChainScheduler, NotificationChainService, OrderService, OrderStateMachine,
    StockCorrectionService, StockLedger,
};
use ledger_backend::store::{InventoryStore, MemoryStore};
use rust_decimal::Decimal;
use shared::{
    Actor, Order, OrderChannel, OrderItem, OrderStatus, PaymentMethod, PaymentStatus, Role, Work,
};
use uuid::Uuid;

pub const ISBN: &str = "978-2-000-00000-1";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
    pub publisher: Actor,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            clock: Arc::new(FixedClock::new(start_time())),
            publisher: Actor::new(Uuid::new_v4(), Role::Pdg),
        }
    }

    pub fn ledger(&self) -> StockLedger {
        StockLedger::new(self.store.clone(), self.clock.clone())
    }

    pub fn state_machine(&self) -> OrderStateMachine {
        OrderStateMachine::new(self.store.clone(), self.clock.clone())
    }

    pub fn chains(&self) -> NotificationChainService {
        NotificationChainService::new(self.store.clone(), self.clock.clone(), 1)
    }

    pub fn orders(&self) -> OrderService {
        OrderService::new(self.store.clone(), self.chains(), self.clock.clone())
    }

    pub fn corrections(&self) -> StockCorrectionService {
        StockCorrectionService::new(self.store.clone(), self.clock.clone())
    }

    pub fn scheduler(
        &self,
        sms: Arc<ScriptedSms>,
        email: Arc<ScriptedEmail>,
        timeout: Duration,
    ) -> NotificationChainScheduler {
        NotificationChainScheduler::new(self.store.clone(), sms, email, self.clock.clone(), timeout)
    }

    /// A published work priced 1000 with `stock` copies booked through the ledger
    pub async fn seed_work(&self, stock: i64) -> Work {
        self.ledger()
            .create_work(
                self.publisher.id,
                CreateWorkInput {
                    title: "Contes du Woleu-Ntem".to_string(),
                    isbn: ISBN.to_string(),
                    price: Decimal::from(1000),
                    initial_stock: stock,
                    min_stock: 0,
                    max_stock: None,
                    status: None,
                },
            )
            .await
            .expect("seed work")
            .work
    }

    pub async fn work(&self, work_id: Uuid) -> Work {
        self.store
            .work(work_id)
            .await
            .expect("read work")
            .expect("work exists")
    }

    /// A pending immediate-payment order created through the order service
    pub async fn pending_order(&self, channel: OrderChannel, lines: &[(Uuid, i64)]) -> Order {
        self.orders()
            .create(
                &self.publisher,
                CreateOrderInput {
                    buyer_id: Some(Uuid::new_v4()),
                    channel,
                    items: lines
                        .iter()
                        .map(|(work_id, quantity)| OrderItemInput {
                            work_id: *work_id,
                            quantity: *quantity,
                        })
                        .collect(),
                    payment_method: PaymentMethod::Immediate,
                    payment_due_date: None,
                },
            )
            .await
            .expect("create order")
            .order
    }

    /// Insert an order directly in `status`, bypassing the lifecycle
    pub async fn order_in_status(
        &self,
        channel: OrderChannel,
        status: OrderStatus,
        work_id: Uuid,
        quantity: i64,
    ) -> Order {
        let now = self.clock.now();
        let order = Order {
            id: Uuid::new_v4(),
            buyer_id: Uuid::new_v4(),
            created_by: self.publisher.id,
            channel,
            items: vec![OrderItem {
                id: Uuid::new_v4(),
                work_id,
                quantity,
                unit_price: Decimal::from(1000),
            }],
            status,
            payment_method: PaymentMethod::Immediate,
            payment_status: PaymentStatus::Unpaid,
            payment_due_date: None,
            remaining_amount: Decimal::from(1000 * quantity),
            created_at: now,
            updated_at: now,
        };
        self.store
            .insert_order(&order, &[])
            .await
            .expect("insert order");
        order
    }

    pub async fn order(&self, order_id: Uuid) -> Order {
        self.store
            .order(order_id)
            .await
            .expect("read order")
            .expect("order exists")
    }

    pub async fn ledger_sum(&self, work_id: Uuid) -> i64 {
        self.store
            .all_movements()
            .await
            .iter()
            .filter(|m| m.work_id == work_id)
            .map(|m| m.quantity)
            .sum()
    }
}

// ============================================================================
// Scripted transports
// ============================================================================

/// How a scripted transport answers one call
#[derive(Debug, Clone)]
pub enum Reply {
    Success,
    Failure(String),
    /// Never answers within any reasonable timeout
    Hang,
    /// Fails with an error that is not a channel failure
    Broken(String),
}

/// Replies are consumed in order; once exhausted the last one repeats
#[derive(Debug)]
pub struct Script {
    replies: Mutex<VecDeque<Reply>>,
    last: Mutex<Reply>,
}

impl Script {
    fn new(replies: Vec<Reply>) -> Self {
        let last = replies.last().cloned().unwrap_or(Reply::Success);
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
        }
    }

    fn next(&self) -> Reply {
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => {
                *self.last.lock().unwrap() = reply.clone();
                reply
            }
            None => self.last.lock().unwrap().clone(),
        }
    }
}

#[derive(Debug)]
pub struct ScriptedSms {
    script: Script,
    pub sent: Mutex<Vec<SmsMessage>>,
}

impl ScriptedSms {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(replies),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<SmsMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SmsTransport for ScriptedSms {
    async fn send(&self, message: &SmsMessage) -> AppResult<SmsResponse> {
        self.sent.lock().unwrap().push(message.clone());
        match self.script.next() {
            Reply::Success => Ok(SmsResponse {
                status: Some(SmsStatus::Text("success".to_string())),
                ..Default::default()
            }),
            Reply::Failure(message) => Ok(SmsResponse {
                status: Some(SmsStatus::Text("error".to_string())),
                message: Some(message),
                ..Default::default()
            }),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(SmsResponse::submitted("late"))
            }
            Reply::Broken(message) => Err(AppError::Internal(message)),
        }
    }
}

#[derive(Debug)]
pub struct ScriptedEmail {
    script: Script,
    pub sent: Mutex<Vec<EmailMessage>>,
}

impl ScriptedEmail {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            script: Script::new(replies),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailTransport for ScriptedEmail {
    async fn send(&self, email: &EmailMessage) -> AppResult<EmailOutcome> {
        self.sent.lock().unwrap().push(email.clone());
        match self.script.next() {
            Reply::Success => Ok(EmailOutcome::sent()),
            Reply::Failure(message) => Ok(EmailOutcome::failed(message)),
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(EmailOutcome::sent())
            }
            Reply::Broken(message) => Err(AppError::Internal(message)),
        }
    }
}
