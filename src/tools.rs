//! Tool registry and dispatch
//!
//! Every gateway capability is exposed as a named tool with JSON
//! parameters. The registry owns the tool set, resolves names and logs one
//! invocation record per dispatch. Parameter decoding failures surface as
//! invalid-input errors before any backend call is made.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::client::ErpClient;
use crate::error::{GatewayError, Result};
use crate::flow::{FlowParams, FlowTracer};
use crate::queries::{
    self, AccountEntriesParams, EntryFilter, InvoiceFilter, PartnerFilter, PaymentFilter,
};
use crate::reconcile::{ReconcileParams, Reconciler};

//
// ================= Tool plumbing =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn run(&self, params: Value) -> Result<Value>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Stable name-sorted listing of the registered tools.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut list: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
            })
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        list
    }

    /// Resolve and run one tool invocation.
    pub async fn dispatch(&self, input: ToolInput) -> Result<Value> {
        let tool = self
            .get(&input.tool_name)
            .ok_or_else(|| GatewayError::ToolNotFound(input.tool_name.clone()))?;

        let invocation = Uuid::new_v4();
        info!(tool = %input.tool_name, %invocation, "dispatching tool");
        let started = Instant::now();

        let result = tool.run(input.parameters).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => info!(tool = %input.tool_name, %invocation, elapsed_ms, "tool completed"),
            Err(err) => {
                warn!(tool = %input.tool_name, %invocation, elapsed_ms, error = %err, "tool failed")
            }
        }
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode parameters for tools whose inputs are all optional; `null` means
/// "no filters".
fn optional_params<T: DeserializeOwned + Default>(params: Value) -> Result<T> {
    if params.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(params).map_err(|err| GatewayError::InvalidInput(err.to_string()))
}

fn required_params<T: DeserializeOwned>(params: Value) -> Result<T> {
    serde_json::from_value(params).map_err(|err| GatewayError::InvalidInput(err.to_string()))
}

//
// ================= Invoice & payment tools =================
//

struct VendorBillsTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for VendorBillsTool {
    fn name(&self) -> &'static str {
        "list_vendor_bills"
    }

    fn description(&self) -> &'static str {
        "List vendor bills with optional partner, pending-only and date filters"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let filter: InvoiceFilter = optional_params(params)?;
        let bills = queries::vendor_bills(&self.client, &filter).await?;
        Ok(serde_json::to_value(bills)?)
    }
}

struct CustomerInvoicesTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for CustomerInvoicesTool {
    fn name(&self) -> &'static str {
        "list_customer_invoices"
    }

    fn description(&self) -> &'static str {
        "List customer invoices with optional partner, pending-only and date filters"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let filter: InvoiceFilter = optional_params(params)?;
        let invoices = queries::customer_invoices(&self.client, &filter).await?;
        Ok(serde_json::to_value(invoices)?)
    }
}

struct PaymentsTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for PaymentsTool {
    fn name(&self) -> &'static str {
        "list_payments"
    }

    fn description(&self) -> &'static str {
        "List payments, optionally narrowed to a partner, date range or settled invoice"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let filter: PaymentFilter = optional_params(params)?;
        let payments = queries::payments(&self.client, &filter).await?;
        Ok(serde_json::to_value(payments)?)
    }
}

#[derive(Debug, Deserialize)]
struct InvoiceIdParams {
    invoice_id: i64,
}

struct InvoiceDetailsTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for InvoiceDetailsTool {
    fn name(&self) -> &'static str {
        "get_invoice_details"
    }

    fn description(&self) -> &'static str {
        "Fetch one invoice with its line items and bookkeeping references"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let params: InvoiceIdParams = required_params(params)?;
        let detail = queries::invoice_details(&self.client, params.invoice_id).await?;
        Ok(serde_json::to_value(detail)?)
    }
}

//
// ================= Partner tools =================
//

struct SuppliersTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for SuppliersTool {
    fn name(&self) -> &'static str {
        "list_suppliers"
    }

    fn description(&self) -> &'static str {
        "List supplier partners, optionally filtered by name"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let filter: PartnerFilter = optional_params(params)?;
        let partners = queries::suppliers(&self.client, &filter).await?;
        Ok(serde_json::to_value(partners)?)
    }
}

struct CustomersTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for CustomersTool {
    fn name(&self) -> &'static str {
        "list_customers"
    }

    fn description(&self) -> &'static str {
        "List customer partners, optionally filtered by name"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let filter: PartnerFilter = optional_params(params)?;
        let partners = queries::customers(&self.client, &filter).await?;
        Ok(serde_json::to_value(partners)?)
    }
}

//
// ================= Ledger tools =================
//

struct AccountingEntriesTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for AccountingEntriesTool {
    fn name(&self) -> &'static str {
        "list_accounting_entries"
    }

    fn description(&self) -> &'static str {
        "List journal entries with their lines and debit/credit totals"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let filter: EntryFilter = optional_params(params)?;
        let entries = queries::journal_entries(&self.client, &filter).await?;
        Ok(serde_json::to_value(entries)?)
    }
}

struct EntriesByAccountTool {
    client: Arc<ErpClient>,
}

#[async_trait]
impl Tool for EntriesByAccountTool {
    fn name(&self) -> &'static str {
        "find_entries_by_account"
    }

    fn description(&self) -> &'static str {
        "Find journal entries touching accounts matching a code prefix"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let params: AccountEntriesParams = required_params(params)?;
        let entries = queries::entries_by_account(&self.client, &params).await?;
        Ok(serde_json::to_value(entries)?)
    }
}

//
// ================= Analysis tools =================
//

struct ReconcileTool {
    engine: Reconciler,
}

#[async_trait]
impl Tool for ReconcileTool {
    fn name(&self) -> &'static str {
        "reconcile_invoices_and_payments"
    }

    fn description(&self) -> &'static str {
        "Match a batch of invoices against their payments and report settlement status"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let params: ReconcileParams = optional_params(params)?;
        let report = self.engine.run(&params).await?;
        Ok(serde_json::to_value(report)?)
    }
}

struct AccountFlowTool {
    tracer: FlowTracer,
}

#[async_trait]
impl Tool for AccountFlowTool {
    fn name(&self) -> &'static str {
        "trace_account_flow"
    }

    fn description(&self) -> &'static str {
        "Trace value movement between two account code prefixes"
    }

    async fn run(&self, params: Value) -> Result<Value> {
        let params: FlowParams = required_params(params)?;
        let report = self.tracer.run(&params).await?;
        Ok(serde_json::to_value(report)?)
    }
}

//
// ================= Diagnostics =================
//

struct ServerVersionTool {
    client: Arc<ErpClient>,
    timeout: Duration,
}

#[async_trait]
impl Tool for ServerVersionTool {
    fn name(&self) -> &'static str {
        "server_version"
    }

    fn description(&self) -> &'static str {
        "Report backend version information"
    }

    async fn run(&self, _params: Value) -> Result<Value> {
        match timeout(self.timeout, self.client.server_version()).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(format!(
                "server version request exceeded {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Build the registry with the full gateway tool set.
pub fn create_default_registry(client: Arc<ErpClient>, request_timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(VendorBillsTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(CustomerInvoicesTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(PaymentsTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(InvoiceDetailsTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(SuppliersTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(CustomersTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(AccountingEntriesTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(EntriesByAccountTool {
        client: client.clone(),
    }));
    registry.register(Arc::new(ReconcileTool {
        engine: Reconciler::new(client.clone()),
    }));
    registry.register(Arc::new(AccountFlowTool {
        tracer: FlowTracer::new(client.clone()),
    }));
    registry.register(Arc::new(ServerVersionTool {
        client,
        timeout: request_timeout,
    }));
    registry
}
