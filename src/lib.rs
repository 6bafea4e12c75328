//! # Lead Lens
//!
//! A thin orchestration layer that keeps a tenant's CRM leads searchable:
//! it fetches raw lead records from a per-tenant document store, flattens
//! each record into one natural-language paragraph, and pushes the text to
//! an external embedding + vector-store service so a hosted LLM can answer
//! questions about the leads later.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌─────────────┐
//! │ Document     │──▶│ Flatten + Change  │──▶│ Embed +     │
//! │ Store (per   │   │ Detection         │   │ Vector      │
//! │ tenant)      │   │ (this crate)      │   │ Store (ext) │
//! └──────────────┘   └───────────────────┘   └──────┬──────┘
//!                                                   │
//!                              ┌────────────────────┤
//!                              ▼                    ▼
//!                        ┌──────────┐         ┌──────────┐
//!                        │   CLI    │         │   HTTP   │
//!                        │(leadlens)│         │  (axum)  │
//!                        └──────────┘         └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! leadlens init                     # create the sync-state database
//! leadlens tenants                  # list registered tenants
//! leadlens sync Kalco               # incremental sync for one tenant
//! leadlens sync Kalco --force       # re-embed everything
//! leadlens ask Kalco "leads in Mumbai this month?"
//! leadlens serve http               # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`record`] | Loosely typed lead record access |
//! | [`flatten`] | Lead-to-text flattening |
//! | [`process`] | Document assembly, grouping, summaries |
//! | [`changes`] | Change detection and the sync-state ledger |
//! | [`docstore`] | Per-tenant document store clients |
//! | [`embedding`] | Embedding service client |
//! | [`vectorstore`] | Vector store client |
//! | [`llm`] | Chat-completion client for answers |
//! | [`sync`] | Sync orchestration |
//! | [`ask`] | Question answering over synced leads |
//! | [`server`] | HTTP API |

pub mod ask;
pub mod changes;
pub mod config;
pub mod db;
pub mod docstore;
pub mod embedding;
pub mod flatten;
pub mod llm;
pub mod process;
pub mod record;
pub mod server;
pub mod sync;
pub mod vectorstore;
