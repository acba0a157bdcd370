use crate::data::Object;
use crate::error::Result;
use crate::mapper::Mapper;
use crate::store::Store;
use crate::types::hooks::{
    ActionHandler, CollectionFormatter, Formatter, InputFormatter, RequestHandler, Validator,
};
use crate::types::query::ModifierType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub const METHOD_GET: &str = "GET";
pub const METHOD_POST: &str = "POST";
pub const METHOD_PUT: &str = "PUT";
pub const METHOD_PATCH: &str = "PATCH";
pub const METHOD_DELETE: &str = "DELETE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    Cluster,
    Namespace,
}

/// One attribute of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub nullable: bool,
    pub create: bool,
    pub update: bool,
    pub required: bool,
    /// Accepted on input but never rendered.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub write_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub valid_chars: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub invalid_chars: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip)]
    pub code_name: String,
}

impl Field {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            ..Default::default()
        }
    }

    pub fn creatable(mut self) -> Self {
        self.create = true;
        self
    }

    pub fn updatable(mut self) -> Self {
        self.update = true;
        self
    }

    /// Shorthand for a field settable on both create and update.
    pub fn writable(self) -> Self {
        self.creatable().updatable()
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_length(mut self, min_length: Option<i64>, max_length: Option<i64>) -> Self {
        self.min_length = min_length;
        self.max_length = max_length;
        self
    }

    pub fn with_valid_chars(mut self, chars: impl Into<String>) -> Self {
        self.valid_chars = chars.into();
        self
    }

    pub fn with_invalid_chars(mut self, chars: impl Into<String>) -> Self {
        self.invalid_chars = chars.into();
        self
    }

    pub fn has_default(&self) -> bool {
        self.default.as_ref().is_some_and(|v| !v.is_null())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl Action {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// A collection filter and the modifiers clients may combine with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub modifiers: Vec<ModifierType>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            modifiers: vec![ModifierType::Eq],
        }
    }
}

impl Filter {
    pub fn with_modifiers(modifiers: impl IntoIterator<Item = ModifierType>) -> Self {
        Self {
            modifiers: modifiers.into_iter().collect(),
        }
    }

    pub fn all() -> Self {
        Self::with_modifiers(ModifierType::ALL.iter().copied())
    }
}

/// Declarative description of one resource type.
#[derive(Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub id: String,
    pub code_name: String,
    pub plural_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub scope: Scope,
    pub resource_methods: Vec<String>,
    pub resource_fields: BTreeMap<String, Field>,
    pub resource_actions: BTreeMap<String, Action>,
    pub collection_methods: Vec<String>,
    pub collection_actions: BTreeMap<String, Action>,
    pub collection_filters: BTreeMap<String, Filter>,

    /// Snapshot taken before the mapper chain rewrote the fields.
    #[serde(skip)]
    pub internal_schema: Option<Arc<Schema>>,
    #[serde(skip)]
    pub store: Option<Arc<dyn Store>>,
    #[serde(skip)]
    pub mapper: Option<Arc<dyn Mapper>>,
    #[serde(skip)]
    pub formatter: Option<Formatter>,
    #[serde(skip)]
    pub collection_formatter: Option<CollectionFormatter>,
    #[serde(skip)]
    pub validator: Option<Validator>,
    #[serde(skip)]
    pub input_formatter: Option<InputFormatter>,
    #[serde(skip)]
    pub action_handler: Option<Arc<dyn ActionHandler>>,
    #[serde(skip)]
    pub link_handler: Option<Arc<dyn RequestHandler>>,
    #[serde(skip)]
    pub list_handler: Option<Arc<dyn RequestHandler>>,
    #[serde(skip)]
    pub create_handler: Option<Arc<dyn RequestHandler>>,
    #[serde(skip)]
    pub update_handler: Option<Arc<dyn RequestHandler>>,
    #[serde(skip)]
    pub delete_handler: Option<Arc<dyn RequestHandler>>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &self.id)
            .field("plural_name", &self.plural_name)
            .field("scope", &self.scope)
            .field("resource_fields", &self.resource_fields.keys().collect::<Vec<_>>())
            .field("has_store", &self.store.is_some())
            .field("has_mapper", &self.mapper.is_some())
            .finish()
    }
}

impl Schema {
    /// A schema with full CRUD methods and no fields.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_methods: vec![
                METHOD_GET.into(),
                METHOD_PUT.into(),
                METHOD_DELETE.into(),
            ],
            collection_methods: vec![METHOD_GET.into(), METHOD_POST.into()],
            ..Default::default()
        }
    }

    pub fn with_plural_name(mut self, plural_name: impl Into<String>) -> Self {
        self.plural_name = plural_name.into();
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.resource_fields.insert(name.into(), field);
        self
    }

    pub fn with_filter(mut self, name: impl Into<String>, filter: Filter) -> Self {
        self.collection_filters.insert(name.into(), filter);
        self
    }

    pub fn with_resource_methods(mut self, methods: &[&str]) -> Self {
        self.resource_methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_collection_methods(mut self, methods: &[&str]) -> Self {
        self.collection_methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_resource_action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.resource_actions.insert(name.into(), action);
        self
    }

    pub fn with_collection_action(mut self, name: impl Into<String>, action: Action) -> Self {
        self.collection_actions.insert(name.into(), action);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_mapper(mut self, mapper: Arc<dyn Mapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    pub fn with_formatter(mut self, formatter: Formatter) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn with_collection_formatter(mut self, formatter: CollectionFormatter) -> Self {
        self.collection_formatter = Some(formatter);
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_action_handler(mut self, handler: Arc<dyn ActionHandler>) -> Self {
        self.action_handler = Some(handler);
        self
    }

    pub fn with_link_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.link_handler = Some(handler);
        self
    }

    pub fn with_list_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.list_handler = Some(handler);
        self
    }

    pub fn allows_collection_method(&self, method: &str) -> bool {
        contains_method(&self.collection_methods, method)
    }

    pub fn allows_resource_method(&self, method: &str) -> bool {
        contains_method(&self.resource_methods, method)
    }

    /// Copies the schema's declarative parts for rendering, dropping every hook.
    pub fn to_object(&self) -> Result<Object> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Ok(Object::new()),
            Err(err) => Err(crate::error::ApiError::wrap(
                crate::error::ErrorCode::ServerError,
                format!("failed to encode schema {}", self.id),
                err,
            )),
        }
    }
}

/// PATCH is accepted wherever PUT is declared.
fn contains_method(methods: &[String], method: &str) -> bool {
    let method = if method.eq_ignore_ascii_case(METHOD_PATCH) {
        METHOD_PUT
    } else {
        method
    };
    methods.iter().any(|m| m.eq_ignore_ascii_case(method))
}
