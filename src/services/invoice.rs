//! Invoice generation, numbering and lifecycle

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::audit::{actions, AuditLog, ClientMeta};
use crate::clock::Clock;
use crate::domain::aggregates::{Invoice, InvoiceDraft, InvoiceError, InvoiceStatus, InvoiceType, Order, OrderStatus};
use crate::domain::events::{DomainEvent, InvoiceEvent};
use crate::domain::value_objects::InvoiceNumber;
use crate::error::{ApiError, Result};
use crate::events::EventPublisher;
use crate::rbac::{permissions, Principal};
use crate::settings::StoreSettings;
use crate::store::{collections, encode, Direction, DocumentStore, FieldUpdate, Query, StoreError, WriteBatch};
use crate::{PageParams, PaginatedResponse};

pub const MAX_NUMBER_ATTEMPTS: usize = 128;

/// Times a request that lost the claim on an order polls for the winner's
/// invoice before answering `conflict`.
pub const MAX_CLAIM_WAITS: usize = 64;

/// Store operations per backfilled invoice: the invoice and the order link.
const OPS_PER_INVOICE: usize = 2;

#[derive(Debug, Deserialize, Validate)]
pub struct GenerateInvoiceRequest {
    #[validate(length(min = 1))]
    pub order_id: String,
    pub due_days: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStatusRequest {
    pub status: InvoiceStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListInvoicesParams {
    pub user_id: Option<String>,
    pub status: Option<InvoiceStatus>,
    #[serde(rename = "type")]
    pub invoice_type: Option<InvoiceType>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct BulkGenerateResult {
    pub generated: usize,
    pub total_orders: usize,
    pub existing_invoices: usize,
}

#[derive(Debug, Default, Serialize)]
pub struct InvoiceStats {
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub by_type: BTreeMap<&'static str, usize>,
    pub total_amount: Decimal,
    pub pending_amount: Decimal,
}

/// Claim on one invoice number, keyed by the number itself.
#[derive(Debug, Serialize, Deserialize)]
struct NumberReservation {
    number: String,
    prefix: String,
    sequence: u32,
    invoice_id: String,
    reserved_at: DateTime<Utc>,
}

/// Claim on an order, keyed by the order id. At most one regular invoice is
/// issued per claim.
#[derive(Debug, Serialize, Deserialize)]
struct OrderClaim {
    order_id: String,
    invoice_id: String,
    claimed_at: DateTime<Utc>,
}

pub struct InvoiceService {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    audit: AuditLog,
    events: EventPublisher,
    brand: String,
    batch_limit: usize,
}

fn invoice_not_found() -> ApiError { ApiError::NotFound("Invoice not found".into()) }

impl InvoiceService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        audit: AuditLog,
        events: EventPublisher,
        brand: impl Into<String>,
        batch_limit: usize,
    ) -> Self {
        Self { store, clock, audit, events, brand: brand.into(), batch_limit: batch_limit.max(OPS_PER_INVOICE) }
    }

    /// Reserves the next number of the month for `invoice_id`.
    ///
    /// The reservation is a create-if-absent on `invoice_numbers/{number}`;
    /// losing a race means re-reading the high-water mark and trying again.
    pub async fn allocate_number(&self, at: DateTime<Utc>, invoice_id: &str) -> Result<String> {
        let prefix = InvoiceNumber::month_prefix(&self.brand, at);
        for attempt in 1..=MAX_NUMBER_ATTEMPTS {
            let last = self
                .store
                .find_one(
                    collections::INVOICE_NUMBERS,
                    Query::new().eq("prefix", json!(prefix)).order_by("sequence", Direction::Desc),
                )
                .await?
                .map(|doc| doc.decode::<NumberReservation>(collections::INVOICE_NUMBERS))
                .transpose()?;
            let next = InvoiceNumber::following(&prefix, last.as_ref().map(|r| r.number.as_str()));
            let sequence = InvoiceNumber::sequence_of(&prefix, next.as_str()).unwrap_or(1);

            let reservation = NumberReservation {
                number: next.to_string(),
                prefix: prefix.clone(),
                sequence,
                invoice_id: invoice_id.to_string(),
                reserved_at: self.clock.now(),
            };
            match self.store.create(collections::INVOICE_NUMBERS, next.as_str(), encode(&reservation)?).await {
                Ok(()) => return Ok(next.into_string()),
                Err(StoreError::AlreadyExists { .. }) => {
                    debug!(number = %next, attempt, "invoice number taken, retrying");
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        warn!(%prefix, "gave up allocating an invoice number");
        Err(ApiError::Conflict("Could not allocate an invoice number, please retry".into()))
    }

    async fn load_order(&self, order_id: &str) -> Result<Order> {
        let doc = self
            .store
            .get(collections::ORDERS, order_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Order not found".into()))?;
        Ok(doc.decode_with_id(collections::ORDERS)?)
    }

    async fn invoice_for_order(&self, order_id: &str) -> Result<Option<Invoice>> {
        let doc = self
            .store
            .find_one(
                collections::INVOICES,
                Query::new().eq("order_id", json!(order_id)).eq("type", json!(InvoiceType::Regular.as_str())),
            )
            .await?;
        Ok(doc.map(|d| d.decode(collections::INVOICES)).transpose()?)
    }

    /// Returns false when another request already holds the order.
    async fn claim_order(&self, order_id: &str, invoice_id: &str, at: DateTime<Utc>) -> Result<bool> {
        let claim = OrderClaim { order_id: order_id.to_string(), invoice_id: invoice_id.to_string(), claimed_at: at };
        match self.store.create(collections::INVOICE_ORDERS, order_id, encode(&claim)?).await {
            Ok(()) => Ok(true),
            Err(StoreError::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn release_claims(&self, order_ids: &[String]) {
        for order_id in order_ids {
            if let Err(e) = self.store.delete(collections::INVOICE_ORDERS, order_id).await {
                warn!(%order_id, error = %e, "failed to release order claim");
            }
        }
    }

    /// The invoice issued under someone else's claim, once it is committed.
    async fn claimed_invoice(&self, order_id: &str) -> Result<Invoice> {
        for _ in 0..MAX_CLAIM_WAITS {
            let Some(doc) = self.store.get(collections::INVOICE_ORDERS, order_id).await? else {
                return Err(ApiError::Conflict("Invoice generation for this order failed, please retry".into()));
            };
            let claim: OrderClaim = doc.decode(collections::INVOICE_ORDERS)?;
            if let Some(doc) = self.store.get(collections::INVOICES, &claim.invoice_id).await? {
                return Ok(doc.decode(collections::INVOICES)?);
            }
            tokio::task::yield_now().await;
        }
        Err(ApiError::Conflict("Invoice for this order is still being generated, please retry".into()))
    }

    /// Numbers the draft and stages the invoice with its order link.
    async fn stage(&self, batch: &mut WriteBatch, draft: InvoiceDraft, order: &Order, id: String, actor: &Principal, now: DateTime<Utc>) -> Result<Invoice> {
        let number = self.allocate_number(now, &id).await?;
        let invoice = draft.issue(id, number, actor.id.clone());
        batch.create(collections::INVOICES, &invoice.id, encode(&invoice)?);
        batch.update(collections::ORDERS, &order.id, vec![
            FieldUpdate::set("invoice_id", json!(invoice.id)),
            FieldUpdate::set("updated_at", encode(&now)?),
        ]);
        Ok(invoice)
    }

    /// Issues the regular invoice for an order. An order that already has one
    /// gets the existing invoice back with `false`.
    ///
    /// The order is claimed before a number is allocated, so concurrent
    /// requests for one order neither duplicate the invoice nor burn numbers.
    pub async fn generate(&self, actor: &Principal, req: GenerateInvoiceRequest, meta: &ClientMeta) -> Result<(Invoice, bool)> {
        req.validate()?;
        let order = self.load_order(&req.order_id).await?;
        if let Some(existing) = self.invoice_for_order(&order.id).await? {
            debug!(order_id = %order.id, invoice_id = %existing.id, "order already invoiced");
            return Ok((existing, false));
        }

        let terms = StoreSettings::load(self.store.as_ref()).await?.invoice_terms(req.due_days)?;
        let now = self.clock.now();
        let draft = InvoiceDraft::from_order(&order, &terms, now)?;

        let id = Uuid::now_v7().to_string();
        if !self.claim_order(&order.id, &id, now).await? {
            let existing = self.claimed_invoice(&order.id).await?;
            debug!(order_id = %order.id, invoice_id = %existing.id, "order invoiced by a concurrent request");
            return Ok((existing, false));
        }

        let mut batch = WriteBatch::new();
        let staged = match self.stage(&mut batch, draft, &order, id, actor, now).await {
            Ok(invoice) => self.store.commit(batch).await.map(|()| invoice).map_err(ApiError::from),
            Err(e) => Err(e),
        };
        let invoice = match staged {
            Ok(invoice) => invoice,
            Err(e) => {
                self.release_claims(std::slice::from_ref(&order.id)).await;
                return Err(e);
            }
        };

        info!(invoice_id = %invoice.id, number = %invoice.invoice_number, order_id = %order.id, "invoice issued");
        self.audit.record(
            self.audit
                .entry(actions::INVOICE_CREATE, "invoices")
                .by(actor)
                .target(&invoice.id)
                .detail("order_id", order.id.clone())
                .detail("invoice_number", invoice.invoice_number.clone())
                .from_client(meta),
        );
        self.events.emit(DomainEvent::Invoice(InvoiceEvent::Issued {
            invoice_id: invoice.id.clone(),
            invoice_number: invoice.invoice_number.clone(),
            order_id: order.id.clone(),
            final_amount: invoice.tax_summary.final_amount,
        }));
        Ok((invoice, true))
    }

    /// Looks up by invoice id, then by order id.
    pub async fn get(&self, principal: &Principal, id: &str) -> Result<Invoice> {
        let invoice = match self.store.get(collections::INVOICES, id).await? {
            Some(doc) => doc.decode::<Invoice>(collections::INVOICES)?,
            None => self.invoice_for_order(id).await?.ok_or_else(invoice_not_found)?,
        };
        if invoice.user_id != principal.id && !principal.has_permission(permissions::ORDERS_VIEW) {
            return Err(ApiError::forbidden());
        }
        Ok(invoice)
    }

    /// Callers without `orders.view` only ever see their own invoices.
    pub async fn list(&self, principal: &Principal, params: ListInvoicesParams) -> Result<PaginatedResponse<Invoice>> {
        let user_id = if principal.has_permission(permissions::ORDERS_VIEW) { params.user_id } else { Some(principal.id.clone()) };

        let mut query = Query::new().order_by("invoice_number", Direction::Desc);
        if let Some(user_id) = user_id {
            query = query.eq("user_id", json!(user_id));
        }
        if let Some(status) = params.status {
            query = query.eq("status", json!(status.as_str()));
        }
        if let Some(kind) = params.invoice_type {
            query = query.eq("type", json!(kind.as_str()));
        }
        let invoices = self
            .store
            .query(collections::INVOICES, &query)
            .await?
            .iter()
            .map(|d| d.decode::<Invoice>(collections::INVOICES))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(PaginatedResponse::from_all(invoices, PageParams { page: params.page, per_page: params.per_page }))
    }

    pub async fn update_status(&self, actor: &Principal, id: &str, next: InvoiceStatus, meta: &ClientMeta) -> Result<Invoice> {
        let doc = self.store.get(collections::INVOICES, id).await?.ok_or_else(invoice_not_found)?;
        let current: Invoice = doc.decode(collections::INVOICES)?;
        if !current.status.can_transition_to(next) {
            return Err(InvoiceError::InvalidTransition { from: current.status.as_str(), to: next.as_str() }.into());
        }

        let doc = self
            .store
            .update(collections::INVOICES, id, &[
                FieldUpdate::set("status", json!(next.as_str())),
                FieldUpdate::set("updated_at", encode(&self.clock.now())?),
            ])
            .await?;
        let invoice: Invoice = doc.decode(collections::INVOICES)?;

        self.audit.record(
            self.audit
                .entry(actions::INVOICE_STATUS_CHANGE, "invoices")
                .by(actor)
                .target(id)
                .detail("from", current.status.as_str())
                .detail("to", next.as_str())
                .from_client(meta),
        );
        self.events.emit(DomainEvent::Invoice(InvoiceEvent::StatusChanged { invoice_id: id.to_string(), from: current.status, to: next }));
        Ok(invoice)
    }

    /// Invoices every completed order that has none, committing in batches
    /// no larger than the store's limit.
    pub async fn bulk_generate(&self, actor: &Principal, meta: &ClientMeta) -> Result<BulkGenerateResult> {
        let statuses = OrderStatus::COMPLETED_TAGS.iter().map(|s| json!(s)).collect();
        let orders = self.store.query(collections::ORDERS, &Query::new().any_of("status", statuses)).await?;
        let invoiced: HashSet<String> = self
            .store
            .query(collections::INVOICES, &Query::new().eq("type", json!(InvoiceType::Regular.as_str())))
            .await?
            .iter()
            .filter_map(|d| d.data.get("order_id").and_then(|v| v.as_str()).map(str::to_string))
            .collect();

        let pending: Vec<_> = orders.iter().filter(|d| !invoiced.contains(&d.id)).collect();
        let mut result = BulkGenerateResult { generated: 0, total_orders: orders.len(), existing_invoices: invoiced.len() };
        if pending.is_empty() {
            return Ok(result);
        }

        let terms = StoreSettings::load(self.store.as_ref()).await?.invoice_terms(None)?;
        let now = self.clock.now();
        let mut batch = WriteBatch::new();
        let mut claimed: Vec<String> = Vec::new();

        for doc in pending {
            let order: Order = match doc.decode_with_id(collections::ORDERS) {
                Ok(order) => order,
                Err(e) => {
                    warn!(order_id = %doc.id, error = %e, "skipping unreadable order");
                    continue;
                }
            };
            let draft = match InvoiceDraft::from_order(&order, &terms, now) {
                Ok(draft) => draft,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "skipping order that cannot be invoiced");
                    continue;
                }
            };

            if batch.len() + OPS_PER_INVOICE > self.batch_limit {
                self.flush(std::mem::take(&mut batch), &claimed).await?;
                result.generated += claimed.len();
                claimed.clear();
            }
            let id = Uuid::now_v7().to_string();
            if !self.claim_order(&order.id, &id, now).await? {
                debug!(order_id = %order.id, "order claimed by a concurrent request, skipping");
                continue;
            }
            claimed.push(order.id.clone());
            if let Err(e) = self.stage(&mut batch, draft, &order, id, actor, now).await {
                self.release_claims(&claimed).await;
                return Err(e);
            }
        }
        if !batch.is_empty() {
            self.flush(batch, &claimed).await?;
            result.generated += claimed.len();
        }

        info!(generated = result.generated, total_orders = result.total_orders, "bulk invoice generation finished");
        self.audit.record(
            self.audit
                .entry(actions::INVOICE_BULK_GENERATE, "invoices")
                .by(actor)
                .detail("generated", result.generated)
                .detail("total_orders", result.total_orders)
                .from_client(meta),
        );
        Ok(result)
    }

    /// Commits one backfill batch; its claims are released if it fails.
    async fn flush(&self, batch: WriteBatch, claimed: &[String]) -> Result<()> {
        if let Err(e) = self.store.commit(batch).await {
            self.release_claims(claimed).await;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn stats(&self) -> Result<InvoiceStats> {
        let docs = self.store.query(collections::INVOICES, &Query::new()).await?;
        let mut stats = InvoiceStats::default();
        for doc in &docs {
            let invoice: Invoice = doc.decode(collections::INVOICES)?;
            stats.total += 1;
            *stats.by_status.entry(invoice.status.as_str()).or_default() += 1;
            *stats.by_type.entry(invoice.invoice_type.as_str()).or_default() += 1;
            stats.total_amount += invoice.tax_summary.final_amount;
            if invoice.status.is_outstanding() {
                stats.pending_amount += invoice.tax_summary.final_amount;
            }
        }
        Ok(stats)
    }
}
