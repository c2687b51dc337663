//! Session-aware backend client
//!
//! `ErpClient` wraps the JSON-RPC transport with credential handling and
//! transparent session renewal. Sessions on the backend can lapse at any
//! time; when a call fails with a renewal-worthy fault the client
//! re-authenticates once and replays the call, so callers only ever see
//! errors that survived the retry.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::BackendSettings;
use crate::domain::Domain;
use crate::error::{GatewayError, Result};
use crate::rpc::{JsonRpcTransport, RpcError, RpcTransport, SERVICE_COMMON, SERVICE_OBJECT};

/// Fault phrases the backend emits when a call needs a fresh login.
/// Matching is case-insensitive on substrings; both phrases are load-bearing.
fn is_session_expiry(message: &str) -> bool {
    let lowered = message.to_lowercase();
    lowered.contains("session expired") || lowered.contains("not logged")
}

#[derive(Debug, Clone, Copy, Default)]
struct SessionState {
    uid: Option<i64>,
    /// Bumped on every successful authentication. The backend reuses user
    /// ids across logins, so the uid alone cannot tell a stale session from
    /// a renewed one.
    epoch: u64,
}

pub struct ErpClient {
    transport: Arc<dyn RpcTransport>,
    settings: BackendSettings,
    state: RwLock<SessionState>,
    /// Serializes authentication so a burst of expired calls produces a
    /// single renewal.
    auth_lock: Mutex<()>,
}

impl ErpClient {
    pub fn new(settings: BackendSettings) -> Self {
        let transport = Arc::new(JsonRpcTransport::new(&settings.url));
        Self::with_transport(settings, transport)
    }

    /// Build a client over a caller-supplied transport.
    pub fn with_transport(settings: BackendSettings, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            settings,
            state: RwLock::new(SessionState::default()),
            auth_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.uid.is_some()
    }

    /// Authenticate against the backend, replacing any existing session.
    pub async fn connect(&self) -> Result<i64> {
        let _guard = self.auth_lock.lock().await;
        let (uid, _) = self.connect_locked().await?;
        Ok(uid)
    }

    /// Drop the local session. The next call re-authenticates. Safe to call
    /// repeatedly.
    pub async fn disconnect(&self) {
        let mut state = self.state.write().await;
        if state.uid.take().is_some() {
            debug!("session discarded");
        }
    }

    // Caller must hold `auth_lock`.
    async fn connect_locked(&self) -> Result<(i64, u64)> {
        debug!(
            database = %self.settings.database,
            username = %self.settings.username,
            "authenticating against backend"
        );
        let args = vec![
            json!(self.settings.database),
            json!(self.settings.username),
            json!(self.settings.password),
            json!({}),
        ];
        let outcome = self
            .transport
            .call(SERVICE_COMMON, "authenticate", args)
            .await
            .map_err(|err| match err {
                RpcError::Transport(msg) => GatewayError::Connection(msg),
                RpcError::Fault(fault) => {
                    GatewayError::Connection(format!("authentication call failed: {}", fault.message))
                }
            })
            .and_then(|value| {
                // A rejected login comes back as boolean `false`, not as a fault.
                match value.as_i64() {
                    Some(uid) if uid > 0 => Ok(uid),
                    _ => Err(GatewayError::Authentication(
                        "invalid username or password".to_string(),
                    )),
                }
            });

        let mut state = self.state.write().await;
        match outcome {
            Ok(uid) => {
                state.uid = Some(uid);
                state.epoch += 1;
                info!(uid, "session established");
                Ok((uid, state.epoch))
            }
            Err(err) => {
                // Whatever session existed before this attempt is dead; the
                // client is disconnected until a later login succeeds.
                state.uid = None;
                Err(err)
            }
        }
    }

    async fn ensure_connected(&self) -> Result<(i64, u64)> {
        {
            let state = self.state.read().await;
            if let Some(uid) = state.uid {
                return Ok((uid, state.epoch));
            }
        }
        let _guard = self.auth_lock.lock().await;
        {
            let state = self.state.read().await;
            if let Some(uid) = state.uid {
                return Ok((uid, state.epoch));
            }
        }
        self.connect_locked().await
    }

    /// Renew the session unless another task already did so since `seen_epoch`.
    async fn reauthenticate(&self, seen_epoch: u64) -> Result<i64> {
        let _guard = self.auth_lock.lock().await;
        {
            let state = self.state.read().await;
            if state.epoch != seen_epoch {
                if let Some(uid) = state.uid {
                    return Ok(uid);
                }
            }
        }
        let (uid, _) = self.connect_locked().await?;
        Ok(uid)
    }

    async fn execute_with_uid(
        &self,
        uid: i64,
        model: &str,
        method: &str,
        args: &[Value],
        kwargs: &Value,
    ) -> std::result::Result<Value, RpcError> {
        let call_args = vec![
            json!(self.settings.database),
            json!(uid),
            json!(self.settings.password),
            json!(model),
            json!(method),
            Value::Array(args.to_vec()),
            kwargs.clone(),
        ];
        self.transport
            .call(SERVICE_OBJECT, "execute_kw", call_args)
            .await
    }

    /// Invoke `method` on `model`. Connects on first use and retries exactly
    /// once after a session-expiry fault; any failure of the replay is
    /// reported as a request error rather than retried again.
    pub async fn execute(
        &self,
        model: &str,
        method: &str,
        args: Vec<Value>,
        kwargs: Value,
    ) -> Result<Value> {
        let (uid, epoch) = self.ensure_connected().await?;
        debug!(model, method, uid, "executing backend call");

        match self.execute_with_uid(uid, model, method, &args, &kwargs).await {
            Ok(value) => Ok(value),
            Err(RpcError::Fault(fault)) if is_session_expiry(&fault.message) => {
                warn!(model, method, "session expired, renewing and replaying");
                let uid = self.reauthenticate(epoch).await?;
                self.execute_with_uid(uid, model, method, &args, &kwargs)
                    .await
                    .map_err(|err| match err {
                        RpcError::Transport(msg) => GatewayError::Connection(msg),
                        RpcError::Fault(fault) => GatewayError::Request(format!(
                            "{model}.{method} failed after session renewal: {}",
                            fault.message
                        )),
                    })
            }
            Err(RpcError::Fault(fault)) => Err(GatewayError::Request(format!(
                "{model}.{method} failed: {}",
                fault.message
            ))),
            Err(RpcError::Transport(msg)) => Err(GatewayError::Connection(msg)),
        }
    }

    /// Search for records and read the given fields in one round trip.
    pub async fn search_read(
        &self,
        model: &str,
        domain: &Domain,
        fields: &[&str],
        limit: Option<i64>,
        offset: Option<i64>,
        order: Option<&str>,
    ) -> Result<Vec<Value>> {
        let mut kwargs = Map::new();
        if !fields.is_empty() {
            kwargs.insert("fields".to_string(), json!(fields));
        }
        if let Some(limit) = limit {
            kwargs.insert("limit".to_string(), json!(limit));
        }
        if let Some(offset) = offset {
            kwargs.insert("offset".to_string(), json!(offset));
        }
        if let Some(order) = order {
            kwargs.insert("order".to_string(), json!(order));
        }

        let value = self
            .execute(model, "search_read", vec![domain.to_wire()], Value::Object(kwargs))
            .await?;
        match value {
            Value::Array(rows) => Ok(rows),
            other => Err(GatewayError::Request(format!(
                "{model}.search_read returned a non-list payload: {other}"
            ))),
        }
    }

    /// Search for matching record ids only.
    pub async fn search(&self, model: &str, domain: &Domain, limit: Option<i64>) -> Result<Vec<i64>> {
        let mut kwargs = Map::new();
        if let Some(limit) = limit {
            kwargs.insert("limit".to_string(), json!(limit));
        }
        let value = self
            .execute(model, "search", vec![domain.to_wire()], Value::Object(kwargs))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Read the given fields of specific records by id.
    pub async fn read(&self, model: &str, ids: &[i64], fields: &[&str]) -> Result<Vec<Value>> {
        let value = self
            .execute(model, "read", vec![json!(ids)], json!({ "fields": fields }))
            .await?;
        match value {
            Value::Array(rows) => Ok(rows),
            other => Err(GatewayError::Request(format!(
                "{model}.read returned a non-list payload: {other}"
            ))),
        }
    }

    /// Backend version info. Needs no session.
    pub async fn server_version(&self) -> Result<Value> {
        self.transport
            .call(SERVICE_COMMON, "version", vec![])
            .await
            .map_err(|err| match err {
                RpcError::Transport(msg) => GatewayError::Connection(msg),
                RpcError::Fault(fault) => GatewayError::Request(fault.message),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::{fault, MockTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn settings() -> BackendSettings {
        BackendSettings::new("https://erp.example.com", "acme", "books@acme.com", "s3cret")
    }

    fn client_with(transport: MockTransport) -> (ErpClient, Arc<MockTransport>) {
        let transport = Arc::new(transport);
        let client = ErpClient::with_transport(settings(), transport.clone());
        (client, transport)
    }

    #[tokio::test]
    async fn first_execute_authenticates_and_builds_call_args() {
        let (client, transport) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Ok(json!([{"id": 1}])),
        ]));

        let result = client
            .execute("account.move", "search_read", vec![json!([])], json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!([{"id": 1}]));

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].service, "common");
        assert_eq!(calls[0].method, "authenticate");
        assert_eq!(calls[0].args[0], json!("acme"));
        assert_eq!(calls[0].args[1], json!("books@acme.com"));

        assert_eq!(calls[1].service, "object");
        assert_eq!(calls[1].method, "execute_kw");
        assert_eq!(calls[1].args[0], json!("acme"));
        assert_eq!(calls[1].args[1], json!(7));
        assert_eq!(calls[1].args[3], json!("account.move"));
        assert_eq!(calls[1].args[4], json!("search_read"));
        assert_eq!(calls[1].args[5], json!([[]]));
        assert_eq!(calls[1].args[6], json!({}));
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_authentication_error() {
        let (client, _) = client_with(MockTransport::scripted(vec![Ok(json!(false))]));

        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(_)));
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn unreachable_backend_surfaces_as_connection_error() {
        let (client, _) = client_with(MockTransport::scripted(vec![Err(RpcError::Transport(
            "connection refused".to_string(),
        ))]));

        let err = client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
    }

    #[tokio::test]
    async fn ordinary_fault_is_a_request_error_without_renewal() {
        let (client, transport) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Err(fault("Invalid field 'bogus' on model 'account.move'")),
        ]));

        let err = client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Request(_)));
        assert_eq!(transport.call_count("common", "authenticate"), 1);
        assert!(client.is_connected().await);
    }

    #[tokio::test]
    async fn expired_session_renews_and_replays_exactly_once() {
        let (client, transport) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Err(fault("Odoo Server Error: Session Expired")),
            Ok(json!(8)),
            Ok(json!(42)),
        ]));

        let result = client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap();
        assert_eq!(result, json!(42));
        assert_eq!(transport.call_count("common", "authenticate"), 2);
        assert_eq!(transport.call_count("object", "execute_kw"), 2);

        // The replay runs under the renewed session.
        let calls = transport.calls();
        assert_eq!(calls[3].args[1], json!(8));
    }

    #[tokio::test]
    async fn second_expiry_after_replay_is_a_request_error() {
        let (client, transport) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Err(fault("session expired")),
            Ok(json!(7)),
            Err(fault("User not logged in")),
        ]));

        let err = client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Request(_)));
        assert_eq!(transport.call_count("object", "execute_kw"), 2);
    }

    #[tokio::test]
    async fn failed_renewal_drops_the_stale_session() {
        let (client, transport) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Err(fault("Odoo Server Error: Session Expired")),
            Ok(json!(false)),
            Ok(json!(9)),
            Ok(json!([])),
        ]));

        let err = client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Authentication(_)));
        assert!(!client.is_connected().await);

        // The next call starts a fresh login instead of replaying uid 7.
        client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap();
        let calls = transport.calls();
        assert_eq!(transport.call_count("common", "authenticate"), 3);
        assert_eq!(calls[4].args[1], json!(9));
    }

    #[tokio::test]
    async fn renewal_cut_short_by_transport_failure_disconnects() {
        let (client, _) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Err(fault("session expired")),
            Err(RpcError::Transport("connection reset".to_string())),
        ]));

        let err = client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
        assert!(!client.is_connected().await);
    }

    #[tokio::test]
    async fn concurrent_expiries_share_a_single_renewal() {
        let auths = Arc::new(AtomicUsize::new(0));
        let handler_auths = auths.clone();
        let transport = MockTransport::new(move |call| {
            if call.service == "common" && call.method == "authenticate" {
                handler_auths.fetch_add(1, Ordering::SeqCst);
                return Ok(json!(7));
            }
            // Every call under the first session fails as expired; the
            // renewed session succeeds.
            if handler_auths.load(Ordering::SeqCst) < 2 {
                Err(fault("session expired"))
            } else {
                Ok(json!(1))
            }
        });
        let (client, transport) = client_with(transport);
        let client = Arc::new(client);

        let run = |client: Arc<ErpClient>| async move {
            client
                .execute("account.move", "search_read", vec![], json!({}))
                .await
        };
        let (a, b, c, d) = tokio::join!(
            run(client.clone()),
            run(client.clone()),
            run(client.clone()),
            run(client.clone())
        );

        for result in [a, b, c, d] {
            assert_eq!(result.unwrap(), json!(1));
        }
        assert_eq!(auths.load(Ordering::SeqCst), 2);
        assert!(transport.call_count("object", "execute_kw") >= 4);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_forces_reauthentication() {
        let (client, transport) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Ok(json!([])),
            Ok(json!(7)),
            Ok(json!([])),
        ]));

        client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap();
        client.disconnect().await;
        client.disconnect().await;
        assert!(!client.is_connected().await);

        client
            .execute("account.move", "search_read", vec![], json!({}))
            .await
            .unwrap();
        assert_eq!(transport.call_count("common", "authenticate"), 2);
    }

    #[tokio::test]
    async fn search_read_packs_options_into_kwargs() {
        let (client, transport) = client_with(MockTransport::scripted(vec![
            Ok(json!(7)),
            Ok(json!([])),
        ]));

        let domain = Domain::new().filter("move_type", crate::domain::CompareOp::Eq, "in_invoice");
        client
            .search_read(
                "account.move",
                &domain,
                &["name", "amount_total"],
                Some(10),
                None,
                Some("invoice_date desc"),
            )
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls[1].args[5], json!([[["move_type", "=", "in_invoice"]]]));
        assert_eq!(
            calls[1].args[6],
            json!({"fields": ["name", "amount_total"], "limit": 10, "order": "invoice_date desc"})
        );
    }

    #[test]
    fn expiry_detection_is_case_insensitive_substring_match() {
        assert!(is_session_expiry("Odoo Server Error: Session Expired"));
        assert!(is_session_expiry("user NOT LOGGED in"));
        assert!(is_session_expiry("the session expired, please log in again"));
        assert!(!is_session_expiry("Access Denied"));
        assert!(!is_session_expiry("Invalid field on model"));
    }
}
