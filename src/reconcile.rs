//! Invoice and payment reconciliation
//!
//! Cross-references a batch of invoices with the payments that settle
//! them and reports the paid total, the outstanding balance and whether
//! each invoice can be considered reconciled. Every invoice in the batch
//! costs an extra payment lookup, so the batch is capped. A failure on
//! any invoice aborts the whole run; partial reports are never returned.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::client::ErpClient;
use crate::domain::{CompareOp, Domain};
use crate::error::Result;
use crate::queries::{date_bounds, decode_rows, PAYMENT_FIELDS};
use crate::records::{EntryKind, InvoiceSummary, PaymentRecord, ENTRY_MODEL, PAYMENT_MODEL};

/// Residuals below one cent count as settled.
pub const RECONCILE_EPSILON: f64 = 0.01;

pub const DEFAULT_BATCH_CAP: usize = 5;

fn default_batch_cap() -> usize {
    DEFAULT_BATCH_CAP
}

const RECONCILE_INVOICE_FIELDS: &[&str] = &[
    "id",
    "name",
    "amount_total",
    "amount_residual",
    "invoice_date",
    "state",
    "payment_state",
    "partner_id",
    "currency_id",
    "move_type",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileParams {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Invoices examined per run.
    #[serde(default = "default_batch_cap")]
    pub batch_cap: usize,
}

impl Default for ReconcileParams {
    fn default() -> Self {
        Self {
            date_from: None,
            date_to: None,
            batch_cap: DEFAULT_BATCH_CAP,
        }
    }
}

/// One invoice with its linked payments and settlement verdict.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationRecord {
    #[serde(flatten)]
    pub invoice: InvoiceSummary,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub payments: Vec<PaymentRecord>,
    pub total_paid: f64,
    pub outstanding: f64,
    pub is_reconciled: bool,
}

pub struct Reconciler {
    client: Arc<ErpClient>,
}

impl Reconciler {
    pub fn new(client: Arc<ErpClient>) -> Self {
        Self { client }
    }

    /// Reconcile a batch of vendor bills and customer invoices against
    /// their payments. An invoice counts as reconciled when the backend
    /// already marks it paid or the outstanding balance is below
    /// [`RECONCILE_EPSILON`].
    pub async fn run(&self, params: &ReconcileParams) -> Result<Vec<ReconciliationRecord>> {
        let domain = date_bounds(
            Domain::new().filter(
                "move_type",
                CompareOp::In,
                vec!["in_invoice", "out_invoice"],
            ),
            "invoice_date",
            params.date_from,
            params.date_to,
        );

        let rows = self
            .client
            .search_read(
                ENTRY_MODEL,
                &domain,
                RECONCILE_INVOICE_FIELDS,
                Some(params.batch_cap as i64),
                None,
                None,
            )
            .await?;
        info!(invoices = rows.len(), "reconciling invoice batch");

        let mut report = Vec::with_capacity(rows.len());
        for row in rows {
            let move_type = row
                .get("move_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let kind = if move_type == "in_invoice" {
                EntryKind::VendorBill
            } else {
                EntryKind::CustomerInvoice
            };
            let invoice = InvoiceSummary::from_record(row)?;
            debug!(invoice = %invoice.name, "fetching linked payments");

            let payment_domain =
                Domain::new().filter("reconciled_invoice_ids", CompareOp::In, vec![invoice.id]);
            let payments: Vec<PaymentRecord> = decode_rows(
                self.client
                    .search_read(PAYMENT_MODEL, &payment_domain, PAYMENT_FIELDS, None, None, None)
                    .await?,
            )?;

            let total_paid: f64 = payments.iter().map(|p| p.amount).sum();
            let outstanding = invoice.amount_total - total_paid;
            let is_reconciled =
                invoice.payment_state == "paid" || outstanding.abs() < RECONCILE_EPSILON;

            report.push(ReconciliationRecord {
                invoice,
                kind,
                payments,
                total_paid,
                outstanding,
                is_reconciled,
            });
        }
        Ok(report)
    }
}
