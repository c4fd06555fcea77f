//! # apiary
//!
//! A local-first store for HTTP calls, SQL queries, gRPC invocations, Redis
//! commands, JQ transforms, and Markdown notes, with the history of their
//! executions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │   CLI    │──▶│ Orchestrator │──▶│ RequestStore │──▶│ apiary.json   │
//! │ (apiary) │   │ perform /    │   │ RwLock + map │   │ versioned,    │
//! └──────────┘   │ explore      │   └──────┬───────┘   │ side-tables   │
//!                └──────┬───────┘          │           └───────────────┘
//!                       ▼                  ▼
//!                ┌──────────────┐   ┌────────────────┐
//!                │  Executors   │   │ PluginRegistry │
//!                │ (http, ...)  │   │  + codec       │
//!                └──────────────┘   └────────────────┘
//! ```
//!
//! The request model, plugin registry, and codec live in the I/O-free
//! [`apiary_core`] crate and are re-exported here.
//!
//! ## Quick Start
//!
//! ```bash
//! apiary create api/users --kind http --data '{"url": "https://example.com/users"}'
//! apiary list --tree
//! apiary perform <id>
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`store`] | File-backed request store |
//! | [`orchestrator`] | Recorded and exploratory execution, described endpoints |
//! | [`executor_http`] | Built-in HTTP executor |
//! | [`commands`] | CLI command implementations |
//! | [`logging`] | Tracing subscriber setup |

pub mod commands;
pub mod config;
pub mod executor_http;
pub mod logging;
pub mod orchestrator;
pub mod store;

pub use apiary_core::{
    Executor, Kind, Plugin, PluginRegistry, Request, RequestData, RequestId, Response,
    ResponseData, StandardPlugin, StoreError, StoreResult,
};
pub use orchestrator::{Endpoint, Explored, Orchestrator, Performed};
pub use store::{KindInfo, RequestStore};
