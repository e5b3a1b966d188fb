//! sfmock: an in-memory Salesforce API emulator.
//!
//! One [`MockOrg`] owns the schema catalog, the record store, bulk jobs, the
//! platform event bus and the analytics datasets. The [`api`] handlers are
//! transport agnostic; the [`web`] module mounts them on an axum router under
//! the platform's URLs.

pub mod analytics;
pub mod api;
pub mod bulk;
pub mod config;
pub mod core;
pub mod facade;
pub mod query;
pub mod storage;
pub mod streaming;
pub mod validation;
pub mod web;

pub use crate::core::{ErrorCode, FieldDef, FieldType, MockError, Record, Result, Schema, Value};
pub use config::MockConfig;
pub use facade::{MockOrg, OrgSettings};
pub use storage::Catalog;
pub use web::build_router;
