//! Command-line demo: connect, show the backend version and run a couple
//! of accounting tools against the configured instance.

use std::sync::Arc;

use dotenv::dotenv;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use ledger_gateway::tools::{create_default_registry, ToolInput};
use ledger_gateway::{BackendSettings, ErpClient, Result, ServerSettings};

fn call(tool_name: &str, parameters: Value) -> ToolInput {
    ToolInput {
        tool_name: tool_name.to_string(),
        parameters,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let backend = BackendSettings::from_env();
    if let Err(message) = backend.validate() {
        eprintln!("{message}");
        std::process::exit(1);
    }
    let server = ServerSettings::from_env();

    let client = Arc::new(ErpClient::new(backend));
    let uid = client.connect().await?;
    println!("Connected to {} as uid {uid}", client.settings().url);

    let registry = create_default_registry(client.clone(), server.request_timeout);

    println!("\n=== Backend version ===");
    let version = registry.dispatch(call("server_version", Value::Null)).await?;
    println!("{}", serde_json::to_string_pretty(&version)?);

    println!("\n=== Pending vendor bills ===");
    let bills = registry
        .dispatch(call("list_vendor_bills", json!({"pending": true, "limit": 5})))
        .await?;
    println!("{}", serde_json::to_string_pretty(&bills)?);

    println!("\n=== Reconciliation batch ===");
    let report = registry
        .dispatch(call("reconcile_invoices_and_payments", Value::Null))
        .await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    // Banks to suppliers; depends on the instance's chart of accounts.
    println!("\n=== Account flow 572 -> 400 ===");
    let trace = registry
        .dispatch(call(
            "trace_account_flow",
            json!({"from_account": "572", "to_account": "400"}),
        ))
        .await;
    match trace {
        Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        Err(err) => println!("trace unavailable: {err}"),
    }

    client.disconnect().await;
    Ok(())
}
