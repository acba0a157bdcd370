//! Declarative resource model and per-request context.

pub mod definition;
pub mod hooks;
pub mod query;
pub mod request;
pub mod resource;
pub mod schema;
pub mod schemas;

pub use hooks::{
    ActionHandler, CollectionFormatter, Formatter, HandlerOutput, InputFormatter, RequestHandler,
    Validator,
};
pub use query::{ModifierType, Pagination, QueryCondition, QueryOptions, Sort, SortOrder};
pub use request::{
    ApiRequest, ApiVersion, PageLimits, QueryParams, ReferenceValidator, ResponseFormat, UserInfo,
};
pub use resource::RawResource;
pub use schema::{Action, Field, Filter, Schema, Scope};
pub use schemas::{SchemaErrors, Schemas};
