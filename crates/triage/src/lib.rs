//! Mutation orchestration core for the maintenance ticket backend.
//!
//! This crate implements the four layers that sit between a presentation
//! surface (dashboards, dialogs, the bundled CLI) and the ticket API:
//!
//! - [`auth`] — token lifecycle: silent acquisition with interactive-redirect
//!   fallback and expiry-aware reuse.
//! - [`client`] — authenticated HTTP with a single refresh-and-retry on 401.
//! - [`cache`] — session-scoped reference data (people, categories,
//!   locations) keyed by `(api_base, token)`.
//! - [`tickets`] — the business-rule layer: status state machine, assignment
//!   eligibility, category/subcategory coupling, cancellation gating.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use triage::{ApiClient, ReferenceDataCache, StaticTokenProvider, TicketWorkflow};
//!
//! # async fn run() -> Result<(), triage::Error> {
//! let tokens = Arc::new(StaticTokenProvider::new(Some("token".into())));
//! let client = ApiClient::new("https://api.example.com", tokens)?;
//! let cache = Arc::new(ReferenceDataCache::new());
//! cache.load(&client).await?;
//!
//! let mut workflow = TicketWorkflow::open(client, cache, "ticket-1").await?;
//! let plan = workflow.plan_assignment(&["Jane Doe".to_string()]).await?;
//! // ... surface plan.kind for confirmation, then:
//! workflow.apply_assignment(&plan).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod tickets;

pub use auth::{IdentityBroker, StaticTokenProvider, TokenManager, TokenProvider, TokenScope};
pub use cache::{ReferenceDataCache, FALLBACK_ASSIGNEES};
pub use client::ApiClient;
pub use config::Config;
pub use error::Error;
pub use models::*;
pub use tickets::{
    fetch_ticket, list_tickets, search_persons, AssignmentKind, AssignmentPlan, BusyKind, Outcome,
    TicketWorkflow,
};
