use crate::access::{AccessControl, AllAccess};
use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use crate::types::schema::Schema;
use crate::types::schemas::Schemas;
use crate::urlbuilder::UrlBuilder;
use axum::extract::ws::WebSocketUpgrade;
use http::{HeaderMap, Method};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::Arc;

pub const DEFAULT_LIMIT: i64 = 100;
pub const MAX_LIMIT: i64 = 3000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseFormat {
    #[default]
    Json,
    Yaml,
    Html,
}

impl ResponseFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseFormat::Json => "json",
            ResponseFormat::Yaml => "yaml",
            ResponseFormat::Html => "html",
        }
    }
}

impl FromStr for ResponseFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(ResponseFormat::Json),
            "yaml" => Ok(ResponseFormat::Yaml),
            "html" => Ok(ResponseFormat::Html),
            _ => Err(()),
        }
    }
}

/// Multi-valued query string, keys kept in arrival order per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl QueryParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut params = BTreeMap::<String, Vec<String>>::new();
        for (key, value) in pairs {
            params.entry(key.into()).or_default().push(value.into());
        }
        Self(params)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// Replaces every value for `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), vec![value.into()]);
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `application/x-www-form-urlencoded` rendering, keys sorted.
    pub fn encode(&self) -> String {
        let mut pairs = Vec::new();
        for (key, values) in &self.0 {
            for value in values {
                pairs.push(format!("{}={}", query_escape(key), query_escape(value)));
            }
        }
        pairs.join("&")
    }
}

/// Percent-encodes everything outside the unreserved set; spaces become `+`.
pub fn query_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

/// A versioned API prefix and the resource types allowed as path sub-contexts.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiVersion {
    pub path: String,
    pub sub_contexts: BTreeSet<String>,
}

impl ApiVersion {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sub_contexts: BTreeSet::new(),
        }
    }

    pub fn with_sub_context(mut self, type_name: impl Into<String>) -> Self {
        self.sub_contexts.insert(type_name.into());
        self
    }

    pub fn is_sub_context(&self, type_name: &str) -> bool {
        self.sub_contexts.contains(type_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub name: String,
    pub groups: Vec<String>,
}

/// Resolves `reference[T]` values and path sub-contexts against live data.
pub trait ReferenceValidator: Send + Sync {
    fn validate(&self, resource_type: &str, id: &str) -> bool;

    /// The rendered resource, used to check which actions it currently exposes.
    fn lookup(&self, resource_type: &str, id: &str) -> Option<Object>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: i64,
    pub max_limit: i64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Per-request operation context threaded through the whole pipeline.
pub struct ApiRequest {
    pub method: Method,
    pub type_name: String,
    pub name: String,
    pub link: String,
    pub action: String,
    pub namespaces: Vec<String>,
    pub sub_context: BTreeMap<String, String>,
    pub query: QueryParams,
    pub headers: HeaderMap,
    pub response_format: ResponseFormat,
    pub schema: Option<Arc<Schema>>,
    pub schemas: Arc<Schemas>,
    pub version: Option<ApiVersion>,
    pub body: Option<Object>,
    pub user: Option<UserInfo>,
    pub access_control: Arc<dyn AccessControl>,
    pub reference_validator: Option<Arc<dyn ReferenceValidator>>,
    pub url_builder: UrlBuilder,
    pub limits: PageLimits,
    /// `Set-Cookie` values to attach to the response.
    pub response_cookies: Vec<String>,
    pub upgrade: Option<WebSocketUpgrade>,
}

impl std::fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("link", &self.link)
            .field("action", &self.action)
            .field("namespaces", &self.namespaces)
            .field("sub_context", &self.sub_context)
            .field("query", &self.query)
            .field("response_format", &self.response_format)
            .field("version", &self.version)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl ApiRequest {
    pub fn new(schemas: Arc<Schemas>) -> Self {
        Self {
            method: Method::GET,
            type_name: String::new(),
            name: String::new(),
            link: String::new(),
            action: String::new(),
            namespaces: Vec::new(),
            sub_context: BTreeMap::new(),
            query: QueryParams::default(),
            headers: HeaderMap::new(),
            response_format: ResponseFormat::Json,
            schema: None,
            schemas,
            version: None,
            body: None,
            user: None,
            access_control: Arc::new(AllAccess),
            reference_validator: None,
            url_builder: UrlBuilder::default(),
            limits: PageLimits::default(),
            response_cookies: Vec::new(),
            upgrade: None,
        }
    }

    pub fn with_schema(mut self, schema: Arc<Schema>) -> Self {
        self.type_name = schema.id.clone();
        self.schema = Some(schema);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_query(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    pub fn with_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn with_body(mut self, body: Object) -> Self {
        self.body = Some(body);
        self
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.query.get(key)
    }

    pub fn user_name(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.name.as_str())
    }

    pub fn schema_or_not_found(&self) -> Result<Arc<Schema>> {
        self.schema
            .clone()
            .ok_or_else(|| ApiError::new(ErrorCode::NotFound, format!("no schema for {}", self.type_name)))
    }

    /// A detached copy for work that outlives the handler, such as a websocket
    /// session. The upgrade handle and body are not carried over.
    pub fn fork(&self) -> ApiRequest {
        ApiRequest {
            method: self.method.clone(),
            type_name: self.type_name.clone(),
            name: self.name.clone(),
            link: self.link.clone(),
            action: self.action.clone(),
            namespaces: self.namespaces.clone(),
            sub_context: self.sub_context.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            response_format: self.response_format,
            schema: self.schema.clone(),
            schemas: self.schemas.clone(),
            version: self.version.clone(),
            body: None,
            user: self.user.clone(),
            access_control: self.access_control.clone(),
            reference_validator: self.reference_validator.clone(),
            url_builder: self.url_builder.clone(),
            limits: self.limits,
            response_cookies: Vec::new(),
            upgrade: None,
        }
    }
}
