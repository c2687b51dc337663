//! Resilient gateway to a remote accounting backend.
//!
//! Layered bottom-up: the [`rpc`] transport speaks JSON-RPC, the
//! session-aware [`client`] keeps calls authenticated across session
//! expiry, [`queries`] plus the [`reconcile`] and [`flow`] engines give
//! the accounting operations typed shapes, and [`tools`] with [`api`]
//! expose the whole set over HTTP.

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod flow;
pub mod queries;
pub mod reconcile;
pub mod records;
pub mod rpc;
pub mod tools;

pub use client::ErpClient;
pub use config::{BackendSettings, ServerSettings};
pub use error::{GatewayError, Result};
