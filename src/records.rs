//! Normalized read projections of backend records
//!
//! The backend encodes absent values as boolean `false` and many-to-one
//! references as `[id, label]` pairs. Everything crossing into the gateway
//! is decoded here, once, into plain structs; the engines and tools never
//! touch raw wire values. All records are ephemeral per-request snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

//
// ================= Backend entity names =================
//

pub const ENTRY_MODEL: &str = "account.move";
pub const ENTRY_LINE_MODEL: &str = "account.move.line";
pub const PAYMENT_MODEL: &str = "account.payment";
pub const ACCOUNT_MODEL: &str = "account.account";
pub const PARTNER_MODEL: &str = "res.partner";

//
// ================= Enums =================
//

/// Ledger entry classification, derived from the backend's directional
/// `move_type` field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    VendorBill,
    CustomerInvoice,
    JournalEntry,
}

impl EntryKind {
    /// Wire value of the backend's `move_type` field.
    pub fn move_type(&self) -> &'static str {
        match self {
            EntryKind::VendorBill => "in_invoice",
            EntryKind::CustomerInvoice => "out_invoice",
            EntryKind::JournalEntry => "entry",
        }
    }

    pub fn from_move_type(raw: &str) -> Option<Self> {
        match raw {
            "in_invoice" => Some(EntryKind::VendorBill),
            "out_invoice" => Some(EntryKind::CustomerInvoice),
            "entry" => Some(EntryKind::JournalEntry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentDirection {
    Inbound,
    Outbound,
}

/// Human-readable label for the backend's `payment_state` codes. Unknown
/// codes pass through unchanged.
pub fn payment_state_display(state: &str) -> &str {
    match state {
        "not_paid" => "Not Paid",
        "in_payment" => "In Payment",
        "paid" => "Paid",
        "partial" => "Partially Paid",
        "reversed" => "Reversed",
        "invoicing_legacy" => "Legacy",
        other => other,
    }
}

//
// ================= Reference =================
//

/// A many-to-one reference as the backend reports it: id plus display
/// label. Records missing the reference decode to `None`; a bare id decodes
/// with an empty label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reference {
    pub id: i64,
    pub name: String,
}

fn de_reference<'de, D>(deserializer: D) -> Result<Option<Reference>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => {
            let id = items.first().and_then(Value::as_i64);
            let name = items.get(1).and_then(Value::as_str).unwrap_or_default();
            id.map(|id| Reference {
                id,
                name: name.to_string(),
            })
        }
        Value::Number(n) => n.as_i64().map(|id| Reference {
            id,
            name: String::new(),
        }),
        _ => None,
    })
}

/// Keep only the display label of a reference (empty when absent).
fn de_reference_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(de_reference(deserializer)?
        .map(|r| r.name)
        .unwrap_or_default())
}

/// `false` and non-string values decode to an empty string.
fn de_string_or_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().unwrap_or_default().to_string())
}

/// `false` decodes to `None`, ISO dates to `Some`.
fn de_falsy_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(|s| s.parse().ok()))
}

/// Numeric columns that the backend nulls out as `false`.
fn de_falsy_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_f64())
}

fn de_direction<'de, D>(deserializer: D) -> Result<Option<PaymentDirection>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Many-to-many columns: a list of ids, with `false` tolerated as empty.
fn de_id_list<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

//
// ================= Invoice =================
//

/// Normalized invoice/bill header as returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceSummary {
    pub id: i64,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub name: String,
    #[serde(default)]
    pub amount_total: f64,
    #[serde(default)]
    pub amount_residual: f64,
    #[serde(rename(deserialize = "invoice_date"), deserialize_with = "de_falsy_date", default)]
    pub date: Option<NaiveDate>,
    #[serde(
        rename(deserialize = "invoice_date_due"),
        deserialize_with = "de_falsy_date",
        default
    )]
    pub due_date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub state: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub payment_state: String,
    #[serde(skip_deserializing, default)]
    pub payment_state_display: String,
    #[serde(rename(deserialize = "partner_id"), deserialize_with = "de_reference", default)]
    pub partner: Option<Reference>,
    #[serde(
        rename(deserialize = "currency_id"),
        deserialize_with = "de_reference_label",
        default
    )]
    pub currency: String,
}

impl InvoiceSummary {
    /// Decode a raw backend record and fill the derived display field.
    pub fn from_record(value: Value) -> crate::Result<Self> {
        let mut summary: InvoiceSummary = serde_json::from_value(value)?;
        summary.payment_state_display = payment_state_display(&summary.payment_state).to_string();
        Ok(summary)
    }
}

/// One invoice-tab line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub id: i64,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub name: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub price_unit: f64,
    #[serde(default)]
    pub price_subtotal: f64,
    #[serde(default)]
    pub price_total: f64,
    #[serde(rename(deserialize = "product_id"), deserialize_with = "de_reference", default)]
    pub product: Option<Reference>,
    #[serde(rename(deserialize = "account_id"), deserialize_with = "de_reference", default)]
    pub account: Option<Reference>,
    #[serde(deserialize_with = "de_id_list", default)]
    pub tax_ids: Vec<i64>,
}

/// Invoice header plus its line items and bookkeeping extras.
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: InvoiceSummary,
    pub kind: Option<EntryKind>,
    pub reference: String,
    pub narration: String,
    pub origin: String,
    pub journal: String,
    pub lines: Vec<InvoiceLine>,
}

#[derive(Debug, Deserialize)]
struct DetailExtras {
    #[serde(rename = "ref", deserialize_with = "de_string_or_empty", default)]
    reference: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    narration: String,
    #[serde(rename = "invoice_origin", deserialize_with = "de_string_or_empty", default)]
    origin: String,
    #[serde(rename = "journal_id", deserialize_with = "de_reference_label", default)]
    journal: String,
    #[serde(rename = "move_type", deserialize_with = "de_string_or_empty", default)]
    move_type: String,
}

impl InvoiceDetail {
    pub fn from_record(value: Value, lines: Vec<InvoiceLine>) -> crate::Result<Self> {
        let extras: DetailExtras = serde_json::from_value(value.clone())?;
        let invoice = InvoiceSummary::from_record(value)?;
        Ok(Self {
            invoice,
            kind: EntryKind::from_move_type(&extras.move_type),
            reference: extras.reference,
            narration: extras.narration,
            origin: extras.origin,
            journal: extras.journal,
            lines,
        })
    }
}

//
// ================= Payment =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub name: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(deserialize_with = "de_falsy_date", default)]
    pub date: Option<NaiveDate>,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub state: String,
    #[serde(rename(deserialize = "payment_type"), deserialize_with = "de_direction", default)]
    pub direction: Option<PaymentDirection>,
    #[serde(rename(deserialize = "partner_id"), deserialize_with = "de_reference", default)]
    pub partner: Option<Reference>,
    #[serde(
        rename(deserialize = "journal_id"),
        deserialize_with = "de_reference_label",
        default
    )]
    pub journal: String,
    #[serde(
        rename(deserialize = "currency_id"),
        deserialize_with = "de_reference_label",
        default
    )]
    pub currency: String,
    /// Invoices this payment settles (many-to-many link).
    #[serde(deserialize_with = "de_id_list", default)]
    pub reconciled_invoice_ids: Vec<i64>,
    #[serde(
        rename(deserialize = "payment_method_id"),
        deserialize_with = "de_reference_label",
        default
    )]
    pub payment_method: String,
}

//
// ================= Ledger entries & lines =================
//

/// Normalized entry (move) header shared by journal listings, account
/// searches and the flow tracer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryHeader {
    pub id: i64,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub name: String,
    #[serde(deserialize_with = "de_falsy_date", default)]
    pub date: Option<NaiveDate>,
    #[serde(rename(deserialize = "ref"), deserialize_with = "de_string_or_empty", default)]
    pub reference: String,
    #[serde(
        rename(deserialize = "journal_id"),
        deserialize_with = "de_reference_label",
        default
    )]
    pub journal: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub state: String,
    #[serde(
        rename(deserialize = "partner_id"),
        deserialize_with = "de_reference",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub partner: Option<Reference>,
    #[serde(deserialize_with = "de_falsy_f64", default, skip_serializing_if = "Option::is_none")]
    pub amount_total: Option<f64>,
}

/// One debit/credit component of an entry. Field presence follows the
/// projection it was read with; unread columns stay at their defaults and
/// optional ones drop out of the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryLine {
    pub id: i64,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    pub name: String,
    #[serde(
        rename(deserialize = "move_id"),
        deserialize_with = "de_reference",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub entry: Option<Reference>,
    #[serde(rename(deserialize = "account_id"), deserialize_with = "de_reference", default)]
    pub account: Option<Reference>,
    #[serde(
        rename(deserialize = "partner_id"),
        deserialize_with = "de_reference",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub partner: Option<Reference>,
    #[serde(default)]
    pub debit: f64,
    #[serde(default)]
    pub credit: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(deserialize_with = "de_string_or_empty", default, skip_serializing_if = "String::is_empty")]
    pub matching_number: String,
    #[serde(deserialize_with = "de_falsy_date", default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
}

/// Journal entry with its full line set and debit/credit totals.
#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    #[serde(flatten)]
    pub entry: EntryHeader,
    pub lines: Vec<EntryLine>,
    pub total_debit: f64,
    pub total_credit: f64,
}

/// Entry matched through an account-code search, carrying its complete
/// line set (not only the lines on the matched account).
#[derive(Debug, Clone, Serialize)]
pub struct AccountEntry {
    #[serde(flatten)]
    pub entry: EntryHeader,
    pub matched_code: String,
    pub lines: Vec<EntryLine>,
    pub total_debit: f64,
    pub total_credit: f64,
}

pub fn total_debit(lines: &[EntryLine]) -> f64 {
    lines.iter().map(|l| l.debit).sum()
}

pub fn total_credit(lines: &[EntryLine]) -> f64 {
    lines.iter().map(|l| l.credit).sum()
}

//
// ================= Partners =================
//

#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerRecord {
    pub id: i64,
    pub name: String,
    pub vat: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_rank: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_rank: Option<i64>,
    pub address: Address,
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct RawPartner {
    id: i64,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    name: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    vat: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    email: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    phone: String,
    #[serde(default)]
    supplier_rank: Option<i64>,
    #[serde(default)]
    customer_rank: Option<i64>,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    street: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    city: String,
    #[serde(deserialize_with = "de_string_or_empty", default)]
    zip: String,
    #[serde(deserialize_with = "de_reference", default)]
    country_id: Option<Reference>,
    #[serde(deserialize_with = "de_id_list", default)]
    category_id: Vec<i64>,
}

impl PartnerRecord {
    pub fn from_record(value: Value) -> crate::Result<Self> {
        let raw: RawPartner = serde_json::from_value(value)?;
        Ok(Self {
            id: raw.id,
            name: raw.name,
            vat: raw.vat,
            email: raw.email,
            phone: raw.phone,
            supplier_rank: raw.supplier_rank,
            customer_rank: raw.customer_rank,
            address: Address {
                street: raw.street,
                city: raw.city,
                zip: raw.zip,
                country: raw.country_id.map(|c| c.name).unwrap_or_default(),
            },
            category_ids: raw.category_id,
        })
    }
}
