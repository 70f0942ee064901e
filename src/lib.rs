//! Cortex Provider
//!
//! An infrastructure provider that manages [Cortex](https://cortexmetrics.io)
//! and Loki ruler rule groups and per-tenant alertmanager configurations.
//! The host talks to it over the provider gRPC protocol.
//!
//! # Overview
//!
//! - **Provider configuration**: `address`, `api_key`, `user`, `tenant_id`
//!   and `backend`, with `CORTEX_*` environment defaults ([`config`])
//! - **Client factory**: one Cortex HTTP client per tenant, with request
//!   logging ([`factory`], [`client`])
//! - **Resources**: `cortex_rules` and `cortex_alertmanager` ([`resources`])
//! - **Server**: the gRPC service and handshake ([`server`])
//!
//! # Running
//!
//! ```ignore
//! use cortex_provider::{init_logging, serve, CortexProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), cortex_provider::ServeError> {
//!     init_logging();
//!     serve(CortexProvider::new()).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! On start the provider prints one line to stdout:
//!
//! ```text
//! HEMMER_PROVIDER|1|127.0.0.1:50051
//! ```
//!
//! Format: `HEMMER_PROVIDER|<protocol_version>|<address>`. Logs go to stderr.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod factory;
pub mod logging;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

#[allow(missing_docs)]
#[allow(clippy::all)]
pub mod generated;

pub use client::{ClientConfig, ClientError, CortexClient};
pub use config::{Backend, ProviderConfig};
pub use error::ProviderError;
pub use factory::ClientFactory;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::CortexProvider;
pub use resources::{AlertmanagerResource, Resource, ResourceRegistry, RulesResource};
pub use schema::ProviderSchema;
pub use server::{
    serve, serve_on, serve_with_options, serve_with_shutdown, ProviderService, ServeError,
    ServeOptions,
};
pub use types::{
    AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities,
    HANDSHAKE_PREFIX, PROTOCOL_VERSION,
};
pub use validation::{is_valid, validate, validate_result};
