//! Schema-driven REST API framework.
//!
//! Resources are described by [`Schema`]s registered in a [`Schemas`]
//! registry. Each schema names its fields, verbs, actions and filters, and
//! carries a [`Store`] that holds the data. Mapper chains translate between
//! the wire shape and the backend shape, so one backend object model can be
//! served under a different public one.
//!
//! ```no_run
//! use schemapi::{ApiServer, Field, Schema, Schemas};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut schemas = Schemas::new();
//! schemas.add_schema(Schema::new("note").with_field("text", Field::new("string").writable()));
//! let router = ApiServer::builder(schemas).build()?.router();
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

pub mod access;
pub mod builder;
pub mod builtin;
pub mod config;
pub mod data;
pub mod error;
pub mod handler;
pub mod mapper;
pub mod parse;
pub mod server;
pub mod store;
pub mod subscribe;
pub mod types;
pub mod urlbuilder;
pub mod writer;

pub use access::{AccessControl, AllAccess};
pub use config::ServerConfig;
pub use data::Object;
pub use error::{ApiError, ErrorCode, Result};
pub use mapper::{Mapper, Mappers};
pub use server::{ApiServer, Authenticator, ServerBuilder};
pub use store::{MemoryClient, ProxyStore, ResourceClient, Store};
pub use types::{
    Action, ApiRequest, ApiVersion, Field, Filter, HandlerOutput, RawResource, Schema, Schemas,
    Scope, UserInfo,
};
