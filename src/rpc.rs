//! JSON-RPC transport to the ERP backend
//!
//! The backend exposes a single procedure-call endpoint; everything the
//! gateway does goes through `call(service, method, args)`. The transport is
//! a trait so the session client and the engines can be driven by a mock in
//! tests. Uses a long-lived reqwest::Client for connection pooling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Service name for unauthenticated calls (login, version).
pub const SERVICE_COMMON: &str = "common";
/// Service name for authenticated entity calls.
pub const SERVICE_OBJECT: &str = "object";

/// A fault reported by the backend: the call reached the server and was
/// executed (or rejected) there, as opposed to a transport failure.
#[derive(Error, Debug, Clone)]
#[error("backend fault: {message}")]
pub struct RpcFault {
    pub code: Option<i64>,
    /// Human-readable fault text, including the nested server message when
    /// the backend supplies one. Session-expiry detection matches on this.
    pub message: String,
}

#[derive(Error, Debug, Clone)]
pub enum RpcError {
    /// The endpoint was unreachable or answered with something that is not
    /// a JSON-RPC envelope.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The backend executed the call and reported a fault.
    #[error("{0}")]
    Fault(RpcFault),
}

/// Procedure-call transport to the backend.
///
/// `execute(entityType, method, positionalArgs, namedArgs)` at the session
/// level maps onto one `call` here; the wire mechanism behind it is an
/// implementation detail of this trait.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, RpcError>;
}

//
// ================= Wire envelopes =================
//

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: RpcParams<'a>,
    id: u64,
}

#[derive(Debug, Serialize)]
struct RpcParams<'a> {
    service: &'a str,
    method: &'a str,
    args: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: Option<i64>,
    message: Option<String>,
    data: Option<RpcErrorData>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorData {
    message: Option<String>,
    debug: Option<String>,
}

impl From<RpcErrorBody> for RpcFault {
    fn from(body: RpcErrorBody) -> Self {
        let top = body.message.unwrap_or_else(|| "unknown fault".to_string());

        // The useful text ("Session expired", access errors, ...) usually
        // lives in the nested data payload; keep both searchable.
        let nested = body
            .data
            .as_ref()
            .and_then(|d| d.message.clone().or_else(|| d.debug.clone()))
            .filter(|m| !m.is_empty() && *m != top);

        let message = match nested {
            Some(detail) => format!("{}: {}", top, detail),
            None => top,
        };

        RpcFault {
            code: body.code,
            message,
        }
    }
}

//
// ================= HTTP implementation =================
//

/// JSON-RPC 2.0 over HTTP (connection-pooled).
pub struct JsonRpcTransport {
    client: Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            endpoint: format!("{}/jsonrpc", base_url.trim_end_matches('/')),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl RpcTransport for JsonRpcTransport {
    async fn call(
        &self,
        service: &str,
        method: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, RpcError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service,
                method,
                args,
            },
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(format!("POST {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RpcError::Transport(format!(
                "endpoint returned {}: {}",
                status, body
            )));
        }

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Transport(format!("invalid JSON-RPC response: {}", e)))?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Fault(error.into()));
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

//
// ================= Test transport =================
//

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct RecordedCall {
        pub service: String,
        pub method: String,
        pub args: Vec<Value>,
    }

    type Handler =
        dyn Fn(&RecordedCall) -> std::result::Result<Value, RpcError> + Send + Sync + 'static;

    /// Scriptable transport for tests. Records every call and answers via a
    /// handler closure; `scripted` answers from a fixed reply queue instead.
    pub struct MockTransport {
        handler: Box<Handler>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl MockTransport {
        pub fn new(
            handler: impl Fn(&RecordedCall) -> std::result::Result<Value, RpcError>
                + Send
                + Sync
                + 'static,
        ) -> Self {
            Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Answer calls in order from a fixed list. Panics if the script
        /// runs out, which in a test means the code under test issued more
        /// remote calls than the scenario allows.
        pub fn scripted(replies: Vec<std::result::Result<Value, RpcError>>) -> Self {
            let queue = Mutex::new(VecDeque::from(replies));
            Self::new(move |call| {
                queue
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| panic!("mock transport script exhausted at {} call", call.method))
            })
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        /// Number of recorded calls matching a service/method pair.
        pub fn call_count(&self, service: &str, method: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.service == service && c.method == method)
                .count()
        }
    }

    #[async_trait]
    impl RpcTransport for MockTransport {
        async fn call(
            &self,
            service: &str,
            method: &str,
            args: Vec<Value>,
        ) -> std::result::Result<Value, RpcError> {
            let recorded = RecordedCall {
                service: service.to_string(),
                method: method.to_string(),
                args,
            };
            self.calls.lock().unwrap().push(recorded.clone());
            (self.handler)(&recorded)
        }
    }

    /// Shorthand for a fault reply with the given message.
    pub fn fault(message: &str) -> RpcError {
        RpcError::Fault(RpcFault {
            code: Some(200),
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_envelope_serialization() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method: "call",
            params: RpcParams {
                service: SERVICE_COMMON,
                method: "version",
                args: vec![],
            },
            id: 7,
        };

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["jsonrpc"], "2.0");
        assert_eq!(encoded["params"]["service"], "common");
        assert_eq!(encoded["params"]["method"], "version");
        assert_eq!(encoded["id"], 7);
    }

    #[test]
    fn fault_keeps_nested_server_message() {
        let body: RpcResponse = serde_json::from_value(json!({
            "result": null,
            "error": {
                "code": 100,
                "message": "Odoo Server Error",
                "data": {
                    "message": "Session expired",
                    "debug": "Traceback ..."
                }
            }
        }))
        .unwrap();

        let fault: RpcFault = body.error.unwrap().into();
        assert_eq!(fault.code, Some(100));
        assert!(fault.message.contains("Odoo Server Error"));
        assert!(fault.message.contains("Session expired"));
    }

    #[test]
    fn fault_without_data_uses_top_level_message() {
        let body: RpcErrorBody = serde_json::from_value(json!({
            "code": 200,
            "message": "Access Denied"
        }))
        .unwrap();

        let fault: RpcFault = body.into();
        assert_eq!(fault.message, "Access Denied");
    }

    #[test]
    fn transport_endpoint_is_normalized() {
        let transport = JsonRpcTransport::new("https://erp.example.com/");
        assert_eq!(transport.endpoint(), "https://erp.example.com/jsonrpc");
    }
}
