//! # apiary core
//!
//! Shared, I/O-free logic for apiary: the request/response model, the
//! per-kind plugin registry, the versioned codec that maps a whole
//! request collection to and from a single JSON document, and the endpoint
//! catalogue read from an HTTP source's API description.
//!
//! This crate contains no tokio, filesystem, or network code. Persistence
//! and execution live in the `apiary` crate, which drives these types.

pub mod codec;
pub mod error;
pub mod models;
pub mod openapi;
pub mod plugin;
pub mod tree;

pub use codec::VersionedCodec;
pub use error::{StoreError, StoreResult};
pub use models::{
    EntryData, Kind, Request, RequestData, RequestId, RequestMap, Response, ResponseData,
};
pub use openapi::{parse_spec, EndpointInfo, SpecError};
pub use plugin::{Executor, Plugin, PluginRegistry, StandardPlugin};
pub use tree::{build_listing, Listing, RequestPreview, RequestTree};
