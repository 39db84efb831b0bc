//! PostgreSQL store
//!
//! A ledger unit runs in one transaction. Rows are locked in a fixed order
//! (order, then works by id, then consignments by key) before any guard is
//! evaluated, so concurrent units serialize on the counters they share.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use shared::{
    AuditAction, AuditLog, ChainOrderSummary, ChainStatus, ClientContact, ConsignmentCounts,
    DueChain, MovementFilter, MovementType, NotificationChain, NotificationType, Order,
    OrderChannel, OrderItem, OrderStatus, Pagination, PartnerCounter, PartnerStock,
    PaymentMethod, PaymentStatus, StockMovement, Work, WorkStatus, order_reference,
};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    apply_consignment, apply_stock, check_order_change, CommitReceipt, InventoryStore,
    LedgerUnit, NotificationStore,
};
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn parse<T: FromStr<Err = String>>(value: &str) -> AppResult<T> {
    value.parse::<T>().map_err(AppError::Internal)
}

// ============================================================================
// Rows
// ============================================================================

const WORK_COLUMNS: &str = "id, title, isbn, price, stock, physical_stock, min_stock, max_stock, \
                            status, created_at, updated_at";

#[derive(Debug, FromRow)]
struct WorkRow {
    id: Uuid,
    title: String,
    isbn: String,
    price: Decimal,
    stock: i64,
    physical_stock: i64,
    min_stock: i64,
    max_stock: Option<i64>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WorkRow> for Work {
    type Error = AppError;

    fn try_from(row: WorkRow) -> AppResult<Self> {
        Ok(Work {
            id: row.id,
            title: row.title,
            isbn: row.isbn,
            price: row.price,
            stock: row.stock,
            physical_stock: row.physical_stock,
            min_stock: row.min_stock,
            max_stock: row.max_stock,
            status: parse::<WorkStatus>(&row.status)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const PARTNER_STOCK_COLUMNS: &str = "id, partner_id, work_id, allocated_quantity, sold_quantity, \
                                     returned_quantity, created_at, updated_at";

#[derive(Debug, FromRow)]
struct PartnerStockRow {
    id: Uuid,
    partner_id: Uuid,
    work_id: Uuid,
    allocated_quantity: i64,
    sold_quantity: i64,
    returned_quantity: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PartnerStockRow> for PartnerStock {
    fn from(row: PartnerStockRow) -> Self {
        PartnerStock {
            id: row.id,
            partner_id: row.partner_id,
            work_id: row.work_id,
            allocated_quantity: row.allocated_quantity,
            sold_quantity: row.sold_quantity,
            returned_quantity: row.returned_quantity,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const MOVEMENT_COLUMNS: &str = "id, work_id, partner_id, movement_type, quantity, partner_counter, \
                                partner_quantity, unit_price, total_amount, reason, reference, \
                                performed_by, order_id, is_correction, correction_reason, \
                                corrected_movement_id, resulting_stock, created_at";

#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    work_id: Uuid,
    partner_id: Option<Uuid>,
    movement_type: String,
    quantity: i64,
    partner_counter: Option<String>,
    partner_quantity: i64,
    unit_price: Option<Decimal>,
    total_amount: Option<Decimal>,
    reason: String,
    reference: String,
    performed_by: Uuid,
    order_id: Option<Uuid>,
    is_correction: bool,
    correction_reason: Option<String>,
    corrected_movement_id: Option<Uuid>,
    resulting_stock: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> AppResult<Self> {
        Ok(StockMovement {
            id: row.id,
            work_id: row.work_id,
            partner_id: row.partner_id,
            movement_type: parse::<MovementType>(&row.movement_type)?,
            quantity: row.quantity,
            partner_counter: row
                .partner_counter
                .as_deref()
                .map(parse::<PartnerCounter>)
                .transpose()?,
            partner_quantity: row.partner_quantity,
            unit_price: row.unit_price,
            total_amount: row.total_amount,
            reason: row.reason,
            reference: row.reference,
            performed_by: row.performed_by,
            order_id: row.order_id,
            is_correction: row.is_correction,
            correction_reason: row.correction_reason,
            corrected_movement_id: row.corrected_movement_id,
            resulting_stock: row.resulting_stock,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    id: Uuid,
    buyer_id: Uuid,
    created_by: Uuid,
    channel: String,
    partner_id: Option<Uuid>,
    status: String,
    payment_method: String,
    payment_status: String,
    payment_due_date: Option<DateTime<Utc>>,
    remaining_amount: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct OrderItemRow {
    id: Uuid,
    work_id: Uuid,
    quantity: i64,
    unit_price: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItemRow>) -> AppResult<Order> {
        Ok(Order {
            id: self.id,
            buyer_id: self.buyer_id,
            created_by: self.created_by,
            channel: OrderChannel::from_parts(&self.channel, self.partner_id)
                .map_err(AppError::Internal)?,
            items: items
                .into_iter()
                .map(|item| OrderItem {
                    id: item.id,
                    work_id: item.work_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                })
                .collect(),
            status: parse::<OrderStatus>(&self.status)?,
            payment_method: parse::<PaymentMethod>(&self.payment_method)?,
            payment_status: parse::<PaymentStatus>(&self.payment_status)?,
            payment_due_date: self.payment_due_date,
            remaining_amount: self.remaining_amount,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Uuid,
    action: String,
    details: serde_json::Value,
    ip_address: Option<String>,
    user_agent: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLog {
    type Error = AppError;

    fn try_from(row: AuditRow) -> AppResult<Self> {
        Ok(AuditLog {
            id: row.id,
            user_id: row.user_id,
            action: parse::<AuditAction>(&row.action)?,
            details: row.details,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            created_at: row.created_at,
        })
    }
}

const CHAIN_COLUMNS: &str = "id, order_id, client_id, title, message, scheduled_date, send_sms, \
                             send_email, notification_type, is_sent, sent_at, failure_reason, \
                             status, created_by, created_at";

#[derive(Debug, FromRow)]
struct ChainRow {
    id: Uuid,
    order_id: Option<Uuid>,
    client_id: Option<Uuid>,
    title: String,
    message: String,
    scheduled_date: DateTime<Utc>,
    send_sms: bool,
    send_email: bool,
    notification_type: String,
    is_sent: bool,
    sent_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    status: String,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl TryFrom<ChainRow> for NotificationChain {
    type Error = AppError;

    fn try_from(row: ChainRow) -> AppResult<Self> {
        Ok(NotificationChain {
            id: row.id,
            order_id: row.order_id,
            client_id: row.client_id,
            title: row.title,
            message: row.message,
            scheduled_date: row.scheduled_date,
            send_sms: row.send_sms,
            send_email: row.send_email,
            notification_type: parse::<NotificationType>(&row.notification_type)?,
            is_sent: row.is_sent,
            sent_at: row.sent_at,
            failure_reason: row.failure_reason,
            status: parse::<ChainStatus>(&row.status)?,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

/// Due chain joined with its client and order
#[derive(Debug, FromRow)]
struct DueChainRow {
    #[sqlx(flatten)]
    chain: ChainRow,
    client_name: Option<String>,
    client_phone: Option<String>,
    client_email: Option<String>,
    order_total: Option<Decimal>,
    order_due_date: Option<DateTime<Utc>>,
}

// ============================================================================
// Helpers
// ============================================================================

impl PgStore {
    async fn load_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItemRow>> {
        let items = sqlx::query_as::<_, OrderItemRow>(
            "SELECT id, work_id, quantity, unit_price FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;
        Ok(items)
    }

    async fn insert_movement(
        tx: &mut Transaction<'_, Postgres>,
        movement: &StockMovement,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, work_id, partner_id, movement_type, quantity, partner_counter,
                partner_quantity, unit_price, total_amount, reason, reference, performed_by,
                order_id, is_correction, correction_reason, corrected_movement_id,
                resulting_stock, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(movement.id)
        .bind(movement.work_id)
        .bind(movement.partner_id)
        .bind(movement.movement_type.as_str())
        .bind(movement.quantity)
        .bind(movement.partner_counter.map(|c| c.as_str()))
        .bind(movement.partner_quantity)
        .bind(movement.unit_price)
        .bind(movement.total_amount)
        .bind(&movement.reason)
        .bind(&movement.reference)
        .bind(movement.performed_by)
        .bind(movement.order_id)
        .bind(movement.is_correction)
        .bind(&movement.correction_reason)
        .bind(movement.corrected_movement_id)
        .bind(movement.resulting_stock)
        .bind(movement.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_audit(tx: &mut Transaction<'_, Postgres>, audit: &AuditLog) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, user_id, action, details, ip_address, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(audit.id)
        .bind(audit.user_id)
        .bind(audit.action.as_str())
        .bind(&audit.details)
        .bind(&audit.ip_address)
        .bind(&audit.user_agent)
        .bind(audit.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
    async fn insert_chain_row(
        tx: &mut Transaction<'_, Postgres>,
        chain: &NotificationChain,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_chains (
                id, order_id, client_id, title, message, scheduled_date, send_sms, send_email,
                notification_type, is_sent, sent_at, failure_reason, status, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(chain.id)
        .bind(chain.order_id)
        .bind(chain.client_id)
        .bind(&chain.title)
        .bind(&chain.message)
        .bind(chain.scheduled_date)
        .bind(chain.send_sms)
        .bind(chain.send_email)
        .bind(chain.notification_type.as_str())
        .bind(chain.is_sent)
        .bind(chain.sent_at)
        .bind(&chain.failure_reason)
        .bind(chain.status.as_str())
        .bind(chain.created_by)
        .bind(chain.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

// ============================================================================
// Inventory
// ============================================================================

#[async_trait]
impl InventoryStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn insert_work(&self, work: &Work) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO works (id, title, isbn, price, stock, physical_stock, min_stock, max_stock,
                               status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(work.id)
        .bind(&work.title)
        .bind(&work.isbn)
        .bind(work.price)
        .bind(work.stock)
        .bind(work.physical_stock)
        .bind(work.min_stock)
        .bind(work.max_stock)
        .bind(work.status.as_str())
        .bind(work.created_at)
        .bind(work.updated_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn work(&self, id: Uuid) -> AppResult<Option<Work>> {
        let row = sqlx::query_as::<_, WorkRow>(&format!(
            "SELECT {} FROM works WHERE id = $1",
            WORK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(Work::try_from).transpose()
    }

    async fn partner_stock(
        &self,
        partner_id: Uuid,
        work_id: Uuid,
    ) -> AppResult<Option<PartnerStock>> {
        let row = sqlx::query_as::<_, PartnerStockRow>(&format!(
            "SELECT {} FROM partner_stocks WHERE partner_id = $1 AND work_id = $2",
            PARTNER_STOCK_COLUMNS
        ))
        .bind(partner_id)
        .bind(work_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row.map(PartnerStock::from))
    }

    async fn partner_stocks(&self, partner_id: Uuid) -> AppResult<Vec<PartnerStock>> {
        let rows = sqlx::query_as::<_, PartnerStockRow>(&format!(
            "SELECT {} FROM partner_stocks WHERE partner_id = $1 ORDER BY created_at",
            PARTNER_STOCK_COLUMNS
        ))
        .bind(partner_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(PartnerStock::from).collect())
    }

    async fn movement(&self, id: Uuid) -> AppResult<Option<StockMovement>> {
        let row = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM stock_movements WHERE id = $1",
            MOVEMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(StockMovement::try_from).transpose()
    }

    async fn movements(
        &self,
        filter: &MovementFilter,
        page: &Pagination,
    ) -> AppResult<(Vec<StockMovement>, u64)> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR work_id = $1)
              AND ($2::uuid IS NULL OR partner_id = $2)
              AND ($3::text IS NULL OR movement_type = $3)
              AND (NOT $4 OR is_correction)
        "#;
        let corrections_only = filter.corrections_only.unwrap_or(false);
        let movement_type = filter.movement_type.map(|t| t.as_str());

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM stock_movements {}",
            WHERE
        ))
        .bind(filter.work_id)
        .bind(filter.partner_id)
        .bind(movement_type)
        .bind(corrections_only)
        .fetch_one(&self.db)
        .await?;

        let rows = sqlx::query_as::<_, MovementRow>(&format!(
            "SELECT {} FROM stock_movements {} ORDER BY created_at DESC, id DESC LIMIT $5 OFFSET $6",
            MOVEMENT_COLUMNS, WHERE
        ))
        .bind(filter.work_id)
        .bind(filter.partner_id)
        .bind(movement_type)
        .bind(corrections_only)
        .bind(i64::from(page.limit()))
        .bind(i64::from(page.offset()))
        .fetch_all(&self.db)
        .await?;

        let movements = rows
            .into_iter()
            .map(StockMovement::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((movements, total.max(0) as u64))
    }

    async fn insert_order(&self, order: &Order, chains: &[NotificationChain]) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, buyer_id, created_by, channel, partner_id, status,
                                payment_method, payment_status, payment_due_date,
                                remaining_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(order.id)
        .bind(order.buyer_id)
        .bind(order.created_by)
        .bind(order.channel.as_str())
        .bind(order.channel.partner_id())
        .bind(order.status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_due_date)
        .bind(order.remaining_amount)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, work_id, quantity, unit_price) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.work_id)
            .bind(item.quantity)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        for chain in chains {
            Self::insert_chain_row(&mut tx, chain).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn order(&self, id: Uuid) -> AppResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            SELECT id, buyer_id, created_by, channel, partner_id, status, payment_method,
                   payment_status, payment_due_date, remaining_amount, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => {
                let items = self.load_items(row.id).await?;
                Ok(Some(row.into_order(items)?))
            }
            None => Ok(None),
        }
    }

    async fn update_order_payment(
        &self,
        order_id: Uuid,
        expected_remaining: Decimal,
        remaining: Decimal,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> AppResult<Order> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET remaining_amount = $1, payment_status = $2, updated_at = $3
            WHERE id = $4 AND remaining_amount = $5
            "#,
        )
        .bind(remaining)
        .bind(status.as_str())
        .bind(at)
        .bind(order_id)
        .bind(expected_remaining)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return match self.order(order_id).await? {
                Some(_) => Err(AppError::Conflict {
                    resource: "payment".to_string(),
                    message: "Remaining amount changed concurrently".to_string(),
                    message_fr: "Le montant restant a changé entre-temps".to_string(),
                }),
                None => Err(AppError::NotFound("Order".to_string())),
            };
        }

        self.order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))
    }

    async fn audit_logs(&self, page: &Pagination) -> AppResult<(Vec<AuditLog>, u64)> {
        let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.db)
            .await?;

        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, user_id, action, details, ip_address, user_agent, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::from(page.limit()))
        .bind(i64::from(page.offset()))
        .fetch_all(&self.db)
        .await?;

        let logs = rows
            .into_iter()
            .map(AuditLog::try_from)
            .collect::<AppResult<Vec<_>>>()?;
        Ok((logs, total.max(0) as u64))
    }

    async fn commit(&self, unit: LedgerUnit) -> AppResult<CommitReceipt> {
        let net = unit.net_effects()?;
        let mut tx = self.db.begin().await?;
        let mut receipt = CommitReceipt::default();

        // Order status compare-and-set
        if let Some(change) = &unit.order_change {
            let current = sqlx::query_scalar::<_, String>(
                "SELECT status FROM orders WHERE id = $1 FOR UPDATE",
            )
            .bind(change.order_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Order".to_string()))?;
            check_order_change(parse::<OrderStatus>(&current)?, change)?;

            sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(change.to.as_str())
                .bind(change.at)
                .bind(change.order_id)
                .execute(&mut *tx)
                .await?;
        }

        // Publisher stock
        let mut touched_works: Vec<Uuid> = Vec::new();
        for (work_id, delta) in &net.stock {
            let current = sqlx::query_scalar::<_, i64>(
                "SELECT stock FROM works WHERE id = $1 FOR UPDATE",
            )
            .bind(work_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Work".to_string()))?;

            let next = apply_stock(*work_id, current, unit.expected_stock_for(*work_id), delta)?;

            let result = sqlx::query(
                r#"
                UPDATE works
                SET stock = stock + $1, physical_stock = physical_stock + $1, updated_at = $2
                WHERE id = $3 AND stock + $1 >= 0
                "#,
            )
            .bind(delta.delta)
            .bind(unit.at)
            .bind(work_id)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::IntegrityViolation(format!(
                    "stock of work {} would become {}",
                    work_id, next
                )));
            }
            touched_works.push(*work_id);
        }

        // Consignments
        for ((partner_id, work_id), delta) in &net.partner {
            if delta.delta.allocated > 0 {
                sqlx::query(
                    r#"
                    INSERT INTO partner_stocks (id, partner_id, work_id, allocated_quantity,
                                                sold_quantity, returned_quantity, created_at, updated_at)
                    VALUES ($1, $2, $3, 0, 0, 0, $4, $4)
                    ON CONFLICT (partner_id, work_id) DO NOTHING
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(partner_id)
                .bind(work_id)
                .bind(unit.at)
                .execute(&mut *tx)
                .await?;
            }

            let current = sqlx::query_as::<_, PartnerStockRow>(&format!(
                "SELECT {} FROM partner_stocks WHERE partner_id = $1 AND work_id = $2 FOR UPDATE",
                PARTNER_STOCK_COLUMNS
            ))
            .bind(partner_id)
            .bind(work_id)
            .fetch_optional(&mut *tx)
            .await?
            .map(PartnerStock::from);

            let counts: ConsignmentCounts =
                apply_consignment(*work_id, current.as_ref().map(PartnerStock::counts), delta)?;

            let row = sqlx::query_as::<_, PartnerStockRow>(&format!(
                r#"
                UPDATE partner_stocks
                SET allocated_quantity = $1, sold_quantity = $2, returned_quantity = $3, updated_at = $4
                WHERE partner_id = $5 AND work_id = $6
                RETURNING {}
                "#,
                PARTNER_STOCK_COLUMNS
            ))
            .bind(counts.allocated)
            .bind(counts.sold)
            .bind(counts.returned)
            .bind(unit.at)
            .bind(partner_id)
            .bind(work_id)
            .fetch_one(&mut *tx)
            .await?;
            receipt.partner_stocks.push(row.into());
        }

        for (work_id, price) in &unit.price_updates {
            let result = sqlx::query("UPDATE works SET price = $1, updated_at = $2 WHERE id = $3")
                .bind(price)
                .bind(unit.at)
                .bind(work_id)
                .execute(&mut *tx)
                .await?;
            if result.rows_affected() == 0 {
                return Err(AppError::NotFound("Work".to_string()));
            }
            if !touched_works.contains(work_id) {
                touched_works.push(*work_id);
            }
        }

        for movement in &unit.movements {
            Self::insert_movement(&mut tx, movement).await?;
        }

        if let Some(audit) = &unit.audit {
            Self::insert_audit(&mut tx, audit).await?;
        }

        for work_id in &touched_works {
            let row = sqlx::query_as::<_, WorkRow>(&format!(
                "SELECT {} FROM works WHERE id = $1",
                WORK_COLUMNS
            ))
            .bind(work_id)
            .fetch_one(&mut *tx)
            .await?;
            receipt.works.push(row.try_into()?);
        }

        tx.commit().await?;

        if let Some(change) = &unit.order_change {
            receipt.order = self.order(change.order_id).await?;
        }
        receipt.movements = unit.movements;

        Ok(receipt)
    }
}

// ============================================================================
// Notification chains
// ============================================================================

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_chain(&self, chain: &NotificationChain) -> AppResult<()> {
        let mut tx = self.db.begin().await?;
        Self::insert_chain_row(&mut tx, chain).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn chain(&self, id: Uuid) -> AppResult<Option<NotificationChain>> {
        let row = sqlx::query_as::<_, ChainRow>(&format!(
            "SELECT {} FROM notification_chains WHERE id = $1",
            CHAIN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(NotificationChain::try_from).transpose()
    }

    async fn chains_for_order(&self, order_id: Uuid) -> AppResult<Vec<NotificationChain>> {
        let rows = sqlx::query_as::<_, ChainRow>(&format!(
            "SELECT {} FROM notification_chains WHERE order_id = $1 ORDER BY scheduled_date",
            CHAIN_COLUMNS
        ))
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;
        rows.into_iter().map(NotificationChain::try_from).collect()
    }

    async fn set_chain_status(
        &self,
        id: Uuid,
        status: ChainStatus,
    ) -> AppResult<NotificationChain> {
        let row = sqlx::query_as::<_, ChainRow>(&format!(
            "UPDATE notification_chains SET status = $1 WHERE id = $2 RETURNING {}",
            CHAIN_COLUMNS
        ))
        .bind(status.as_str())
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Notification chain".to_string()))?;
        row.try_into()
    }

    async fn deactivate_unsent_chains(&self, order_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE notification_chains
            SET status = $1
            WHERE order_id = $2 AND is_sent = false AND status = $3
            "#,
        )
        .bind(ChainStatus::Inactive.as_str())
        .bind(order_id)
        .bind(ChainStatus::Active.as_str())
        .execute(&self.db)
        .await?;
        Ok(result.rows_affected())
    }

    async fn due_chains(&self, now: DateTime<Utc>) -> AppResult<Vec<DueChain>> {
        let rows = sqlx::query_as::<_, DueChainRow>(
            r#"
            SELECT c.id, c.order_id, c.client_id, c.title, c.message, c.scheduled_date,
                   c.send_sms, c.send_email, c.notification_type, c.is_sent, c.sent_at,
                   c.failure_reason, c.status, c.created_by, c.created_at,
                   u.name AS client_name, u.phone AS client_phone, u.email AS client_email,
                   (SELECT SUM(i.quantity * i.unit_price) FROM order_items i WHERE i.order_id = o.id)
                       AS order_total,
                   o.payment_due_date AS order_due_date
            FROM notification_chains c
            LEFT JOIN users u ON u.id = c.client_id
            LEFT JOIN orders o ON o.id = c.order_id
            WHERE c.is_sent = false
              AND c.status = $1
              AND c.scheduled_date <= $2
              AND (c.send_sms OR c.send_email)
            ORDER BY c.scheduled_date
            "#,
        )
        .bind(ChainStatus::Active.as_str())
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter()
            .map(|row| {
                let client = match (row.chain.client_id, row.client_name) {
                    (Some(id), Some(name)) => Some(ClientContact {
                        id,
                        name,
                        phone: row.client_phone,
                        email: row.client_email,
                    }),
                    _ => None,
                };
                let order = row.chain.order_id.map(|id| ChainOrderSummary {
                    id,
                    reference: order_reference(id),
                    total: row.order_total.unwrap_or_default(),
                    payment_due_date: row.order_due_date,
                });
                Ok(DueChain {
                    chain: row.chain.try_into()?,
                    client,
                    order,
                })
            })
            .collect()
    }

    async fn mark_chain_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_chains
            SET is_sent = true, sent_at = $1, failure_reason = NULL
            WHERE id = $2
            "#,
        )
        .bind(sent_at)
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn record_chain_failure(&self, id: Uuid, reason: &str) -> AppResult<()> {
        sqlx::query("UPDATE notification_chains SET failure_reason = $1 WHERE id = $2")
            .bind(reason)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}
