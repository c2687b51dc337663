//! Read-side accounting queries
//!
//! Thin typed operations over the session client: each one builds a search
//! domain, picks a field projection and decodes the rows into the records
//! module's types. The criterion order inside each domain is kept stable
//! because the backend echoes it in logs and error messages.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::client::ErpClient;
use crate::domain::{CompareOp, Domain};
use crate::error::{GatewayError, Result};
use crate::records::{
    total_credit, total_debit, AccountEntry, EntryHeader, EntryKind, EntryLine, InvoiceDetail,
    InvoiceSummary, JournalEntry, PartnerRecord, PaymentRecord, ACCOUNT_MODEL, ENTRY_LINE_MODEL,
    ENTRY_MODEL, PARTNER_MODEL, PAYMENT_MODEL,
};

pub const DEFAULT_LIST_LIMIT: i64 = 100;

pub(crate) const INVOICE_FIELDS: &[&str] = &[
    "id",
    "name",
    "amount_total",
    "amount_residual",
    "invoice_date",
    "invoice_date_due",
    "state",
    "payment_state",
    "partner_id",
    "currency_id",
];

const INVOICE_DETAIL_FIELDS: &[&str] = &[
    "id",
    "name",
    "amount_total",
    "amount_residual",
    "invoice_date",
    "invoice_date_due",
    "state",
    "payment_state",
    "partner_id",
    "currency_id",
    "ref",
    "narration",
    "invoice_origin",
    "journal_id",
    "move_type",
];

const INVOICE_LINE_FIELDS: &[&str] = &[
    "name",
    "quantity",
    "price_unit",
    "price_subtotal",
    "price_total",
    "product_id",
    "account_id",
    "tax_ids",
];

pub(crate) const PAYMENT_FIELDS: &[&str] = &[
    "id",
    "name",
    "amount",
    "date",
    "state",
    "payment_type",
    "partner_id",
    "journal_id",
    "currency_id",
    "reconciled_invoice_ids",
    "payment_method_id",
];

const ENTRY_HEADER_FIELDS: &[&str] = &["id", "name", "date", "ref", "journal_id", "state"];

pub(crate) const ENTRY_LINE_FIELDS: &[&str] = &[
    "name",
    "account_id",
    "partner_id",
    "debit",
    "credit",
    "balance",
    "matching_number",
];

const MOVE_HEADER_FIELDS: &[&str] = &[
    "id",
    "name",
    "date",
    "ref",
    "journal_id",
    "state",
    "partner_id",
    "amount_total",
];

const SUPPLIER_FIELDS: &[&str] = &[
    "id",
    "name",
    "vat",
    "email",
    "phone",
    "supplier_rank",
    "street",
    "city",
    "zip",
    "country_id",
    "category_id",
];

const CUSTOMER_FIELDS: &[&str] = &[
    "id",
    "name",
    "vat",
    "email",
    "phone",
    "customer_rank",
    "street",
    "city",
    "zip",
    "country_id",
    "category_id",
];

//
// ================= Filters =================
//

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceFilter {
    pub partner_id: Option<i64>,
    /// Restrict to invoices not yet fully paid.
    pub pending: Option<bool>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub partner_id: Option<i64>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
    /// Keep only payments settling this invoice. The link lives on the
    /// payment side, so it is applied after the search.
    pub invoice_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartnerFilter {
    /// Case-insensitive partial name match.
    pub name: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryFilter {
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntriesParams {
    /// Account code prefix, e.g. "570" or "400".
    pub account_number: String,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

//
// ================= Shared helpers =================
//

pub(crate) fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(GatewayError::from))
        .collect()
}

/// Deduplicate ids, keeping the first occurrence of each so the output
/// order follows the backend's row order.
pub(crate) fn dedup_first_seen(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Resolve an account code prefix to concrete account ids.
pub(crate) async fn resolve_account_ids(client: &ErpClient, code: &str) -> Result<Vec<i64>> {
    let domain = Domain::new().filter("code", CompareOp::Like, code);
    let ids = client.search(ACCOUNT_MODEL, &domain, None).await?;
    if ids.is_empty() {
        return Err(GatewayError::NotFound(format!(
            "no accounts match code {code}"
        )));
    }
    Ok(ids)
}

pub(crate) fn date_bounds(
    domain: Domain,
    field: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Domain {
    let mut domain = domain;
    if let Some(from) = from {
        domain = domain.filter(field, CompareOp::Gte, from.to_string());
    }
    if let Some(to) = to {
        domain = domain.filter(field, CompareOp::Lte, to.to_string());
    }
    domain
}

//
// ================= Invoices & payments =================
//

pub async fn vendor_bills(client: &ErpClient, filter: &InvoiceFilter) -> Result<Vec<InvoiceSummary>> {
    invoices_of_kind(client, EntryKind::VendorBill, filter).await
}

pub async fn customer_invoices(
    client: &ErpClient,
    filter: &InvoiceFilter,
) -> Result<Vec<InvoiceSummary>> {
    invoices_of_kind(client, EntryKind::CustomerInvoice, filter).await
}

async fn invoices_of_kind(
    client: &ErpClient,
    kind: EntryKind,
    filter: &InvoiceFilter,
) -> Result<Vec<InvoiceSummary>> {
    let mut domain = Domain::new().filter("move_type", CompareOp::Eq, kind.move_type());
    if let Some(partner_id) = filter.partner_id {
        domain = domain.filter("partner_id", CompareOp::Eq, partner_id);
    }
    if filter.pending.unwrap_or(false) {
        domain = domain.filter("payment_state", CompareOp::NotEq, "paid");
    }
    let domain = date_bounds(domain, "invoice_date", filter.date_from, filter.date_to);

    let rows = client
        .search_read(
            ENTRY_MODEL,
            &domain,
            INVOICE_FIELDS,
            Some(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
            None,
            None,
        )
        .await?;
    rows.into_iter().map(InvoiceSummary::from_record).collect()
}

pub async fn payments(client: &ErpClient, filter: &PaymentFilter) -> Result<Vec<PaymentRecord>> {
    let mut domain = Domain::new();
    if let Some(partner_id) = filter.partner_id {
        domain = domain.filter("partner_id", CompareOp::Eq, partner_id);
    }
    let domain = date_bounds(domain, "date", filter.date_from, filter.date_to);

    let rows = client
        .search_read(
            PAYMENT_MODEL,
            &domain,
            PAYMENT_FIELDS,
            Some(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
            None,
            None,
        )
        .await?;
    let mut payments: Vec<PaymentRecord> = decode_rows(rows)?;
    if let Some(invoice_id) = filter.invoice_id {
        payments.retain(|p| p.reconciled_invoice_ids.contains(&invoice_id));
    }
    Ok(payments)
}

/// Full invoice view: header, bookkeeping extras and the invoice-tab lines.
/// Internal balancing lines are excluded from the tab.
pub async fn invoice_details(client: &ErpClient, invoice_id: i64) -> Result<InvoiceDetail> {
    let mut rows = client
        .read(ENTRY_MODEL, &[invoice_id], INVOICE_DETAIL_FIELDS)
        .await?;
    if rows.is_empty() {
        return Err(GatewayError::NotFound(format!(
            "invoice {invoice_id} not found"
        )));
    }
    let raw = rows.remove(0);

    let line_domain = Domain::new()
        .filter("move_id", CompareOp::Eq, invoice_id)
        .filter("exclude_from_invoice_tab", CompareOp::Eq, false);
    let line_ids = client.search(ENTRY_LINE_MODEL, &line_domain, None).await?;

    let lines = if line_ids.is_empty() {
        Vec::new()
    } else {
        decode_rows(client.read(ENTRY_LINE_MODEL, &line_ids, INVOICE_LINE_FIELDS).await?)?
    };

    InvoiceDetail::from_record(raw, lines)
}

//
// ================= Partners =================
//

pub async fn suppliers(client: &ErpClient, filter: &PartnerFilter) -> Result<Vec<PartnerRecord>> {
    partners_by_rank(client, "supplier_rank", SUPPLIER_FIELDS, filter).await
}

pub async fn customers(client: &ErpClient, filter: &PartnerFilter) -> Result<Vec<PartnerRecord>> {
    partners_by_rank(client, "customer_rank", CUSTOMER_FIELDS, filter).await
}

async fn partners_by_rank(
    client: &ErpClient,
    rank_field: &str,
    fields: &[&str],
    filter: &PartnerFilter,
) -> Result<Vec<PartnerRecord>> {
    let mut domain = Domain::new().filter(rank_field, CompareOp::Gt, 0);
    if let Some(name) = &filter.name {
        domain = domain.filter("name", CompareOp::ILike, name.as_str());
    }

    let rows = client
        .search_read(
            PARTNER_MODEL,
            &domain,
            fields,
            Some(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
            None,
            None,
        )
        .await?;
    rows.into_iter().map(PartnerRecord::from_record).collect()
}

//
// ================= Journal entries =================
//

/// Pure journal entries (no invoices or bills), each with its full line
/// set and debit/credit totals.
pub async fn journal_entries(client: &ErpClient, filter: &EntryFilter) -> Result<Vec<JournalEntry>> {
    let domain = date_bounds(
        Domain::new().filter("move_type", CompareOp::Eq, EntryKind::JournalEntry.move_type()),
        "date",
        filter.date_from,
        filter.date_to,
    );

    let rows = client
        .search_read(
            ENTRY_MODEL,
            &domain,
            ENTRY_HEADER_FIELDS,
            Some(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
            None,
            None,
        )
        .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let header: EntryHeader = serde_json::from_value(row)?;
        let lines: Vec<EntryLine> = decode_rows(
            client
                .search_read(
                    ENTRY_LINE_MODEL,
                    &Domain::new().filter("move_id", CompareOp::Eq, header.id),
                    ENTRY_LINE_FIELDS,
                    None,
                    None,
                    None,
                )
                .await?,
        )?;
        let total_debit = total_debit(&lines);
        let total_credit = total_credit(&lines);
        entries.push(JournalEntry {
            entry: header,
            lines,
            total_debit,
            total_credit,
        });
    }
    Ok(entries)
}

/// Entries touching any account whose code matches the given prefix. Each
/// match is returned with all of its lines, not only the matching ones,
/// so both legs of every movement stay visible.
pub async fn entries_by_account(
    client: &ErpClient,
    params: &AccountEntriesParams,
) -> Result<Vec<AccountEntry>> {
    let account_ids = resolve_account_ids(client, &params.account_number).await?;

    let line_domain = date_bounds(
        Domain::new().filter("account_id", CompareOp::In, account_ids),
        "date",
        params.date_from,
        params.date_to,
    );
    let line_ids = client
        .search(
            ENTRY_LINE_MODEL,
            &line_domain,
            Some(params.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
        )
        .await?;
    if line_ids.is_empty() {
        return Err(GatewayError::NotFound(format!(
            "no journal items touch account {}",
            params.account_number
        )));
    }

    let touched: Vec<EntryLine> = decode_rows(client.read(ENTRY_LINE_MODEL, &line_ids, &["move_id"]).await?)?;
    let move_ids = dedup_first_seen(touched.iter().filter_map(|l| l.entry.as_ref().map(|r| r.id)));

    let move_rows = client.read(ENTRY_MODEL, &move_ids, MOVE_HEADER_FIELDS).await?;
    let mut result = Vec::with_capacity(move_rows.len());
    for row in move_rows {
        let header: EntryHeader = serde_json::from_value(row)?;
        let lines: Vec<EntryLine> = decode_rows(
            client
                .search_read(
                    ENTRY_LINE_MODEL,
                    &Domain::new().filter("move_id", CompareOp::Eq, header.id),
                    ENTRY_LINE_FIELDS,
                    None,
                    None,
                    None,
                )
                .await?,
        )?;
        let total_debit = total_debit(&lines);
        let total_credit = total_credit(&lines);
        result.push(AccountEntry {
            entry: header,
            matched_code: params.account_number.clone(),
            lines,
            total_debit,
            total_credit,
        });
    }
    Ok(result)
}
