//! Starts a server that fabricates GraphQL responses for any schema.
//!
//! Point it at a schema document and every query gets a plausible fake
//! answer: registered factories fabricate composite types, entity types
//! resolve through a batched per-request loader, and everything else falls
//! back to structural defaults derived from the declared types. No real
//! backend is involved anywhere.

#![warn(unreachable_pub)]

mod binder;
pub mod builtin;
pub mod error;
mod executable;
pub mod factory;
pub mod loader;
pub mod overrides;
pub mod provider;
mod server;

pub use binder::DEFAULT_SCHEMA;
pub use binder::MockSchema;
pub use binder::MockSchemaBuilder;
pub use error::MockError;
pub use error::SchemaBuildError;
pub use executable::main;
pub use server::MockServer;
