//! The request pipeline: parse, authenticate, CSRF, body, action validation,
//! verb dispatch and response writing, mounted on an axum router.

use crate::access::{AccessControl, AllAccess};
use crate::builtin;
use crate::error::{ApiError, ErrorCode, Result};
use crate::handler::{CreateHandler, DeleteHandler, ListHandler, UpdateHandler, handle_action};
use crate::parse::{
    BODY_METHODS, NAMESPACES_CONTEXT, ParserConfig, is_browser, parse_query, parse_request,
    parse_response_format, read_body,
};
use crate::store::{ListTransformer, ObjectTransformer, wrap_store};
use crate::types::{
    ApiRequest, ApiVersion, HandlerOutput, PageLimits, ReferenceValidator, RequestHandler,
    SchemaErrors, Schemas, UserInfo,
};
use crate::urlbuilder::UrlBuilder;
use crate::writer::{ResponseWriter, UiSettings};
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::{FromRequestParts, State, WebSocketUpgrade};
use axum::response::Response;
use http::request::Parts;
use http::{HeaderMap, HeaderName, Method, Request, StatusCode, header};
use rand::RngCore;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Instrument;

pub const CSRF_COOKIE: &str = "CSRF";
pub const CSRF_HEADER: &str = "x-api-csrf";
pub const DEFAULT_VERSION_PATH: &str = "/v1";
pub const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Resolves the caller of a request. A rejection is answered with 401.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, parts: &Parts) -> Result<UserInfo>;
}

type Transformers = (Option<ObjectTransformer>, Option<ListTransformer>);

/// Collects schemas and server options before the registry is frozen.
pub struct ServerBuilder {
    schemas: Schemas,
    versions: Vec<ApiVersion>,
    default_namespace: String,
    limits: PageLimits,
    reference_validator: Option<Arc<dyn ReferenceValidator>>,
    ui: UiSettings,
    max_body_bytes: usize,
    authenticator: Option<Arc<dyn Authenticator>>,
    access_control: Arc<dyn AccessControl>,
    transformers: HashMap<String, Transformers>,
    cors_origins: Vec<String>,
}

impl ServerBuilder {
    pub fn new(schemas: Schemas) -> Self {
        Self {
            schemas,
            versions: vec![ApiVersion::new(DEFAULT_VERSION_PATH).with_sub_context(NAMESPACES_CONTEXT)],
            default_namespace: "default".to_string(),
            limits: PageLimits::default(),
            reference_validator: None,
            ui: UiSettings::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            authenticator: None,
            access_control: Arc::new(AllAccess),
            transformers: HashMap::new(),
            cors_origins: Vec::new(),
        }
    }

    pub fn versions(mut self, versions: Vec<ApiVersion>) -> Self {
        self.versions = versions;
        self
    }

    /// Namespace applied to namespaced writes and reads by id when the request
    /// names none. Empty disables the default.
    pub fn default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    pub fn limits(mut self, limits: PageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn reference_validator(mut self, validator: Arc<dyn ReferenceValidator>) -> Self {
        self.reference_validator = Some(validator);
        self
    }

    pub fn ui(mut self, ui: UiSettings) -> Self {
        self.ui = ui;
        self
    }

    pub fn max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn access_control(mut self, access_control: Arc<dyn AccessControl>) -> Self {
        self.access_control = access_control;
        self
    }

    /// Post-processes what the schema's store returns, before access paging.
    pub fn transformer(
        mut self,
        schema_id: impl Into<String>,
        object: Option<ObjectTransformer>,
        list: Option<ListTransformer>,
    ) -> Self {
        self.transformers.insert(schema_id.into(), (object, list));
        self
    }

    /// Origins allowed to call the API from a browser; `*` allows any.
    pub fn cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Registers the built-in schemas, checks the registry, and wraps every
    /// store in the served decorator stack.
    pub fn build(self) -> std::result::Result<ApiServer, SchemaErrors> {
        let mut schemas = self.schemas;
        builtin::register(&mut schemas, &self.versions);
        schemas.err()?;

        let transformers = self.transformers;
        schemas.map_stores(|schema, store| wrap_store(store, transformers.get(&schema.id).cloned()));

        Ok(ApiServer {
            schemas: Arc::new(schemas),
            parser: ParserConfig {
                versions: self.versions,
                default_namespace: self.default_namespace,
                limits: self.limits,
                reference_validator: self.reference_validator,
            },
            writer: ResponseWriter::new(self.ui),
            max_body_bytes: self.max_body_bytes,
            authenticator: self.authenticator,
            access_control: self.access_control,
            cors_origins: self.cors_origins,
        })
    }
}

pub struct ApiServer {
    schemas: Arc<Schemas>,
    parser: ParserConfig,
    writer: ResponseWriter,
    max_body_bytes: usize,
    authenticator: Option<Arc<dyn Authenticator>>,
    access_control: Arc<dyn AccessControl>,
    cors_origins: Vec<String>,
}

impl std::fmt::Debug for ApiServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiServer")
            .field("schemas", &self.schemas.schemas().len())
            .field("versions", &self.parser.versions)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("has_authenticator", &self.authenticator.is_some())
            .finish()
    }
}

impl ApiServer {
    pub fn builder(schemas: Schemas) -> ServerBuilder {
        ServerBuilder::new(schemas)
    }

    pub fn schemas(&self) -> &Arc<Schemas> {
        &self.schemas
    }

    /// Serves every path; routing happens inside the pipeline.
    pub fn router(self) -> Router {
        let cors = self.cors_layer();
        let router = Router::new()
            .fallback(serve)
            .with_state(Arc::new(self))
            .layer(TraceLayer::new_for_http());
        match cors {
            Some(cors) => router.layer(cors),
            None => router,
        }
    }

    fn cors_layer(&self) -> Option<CorsLayer> {
        if self.cors_origins.is_empty() {
            return None;
        }
        let origins = if self.cors_origins.iter().any(|o| o == "*") {
            AllowOrigin::from(Any)
        } else {
            AllowOrigin::list(self.cors_origins.iter().filter_map(|o| o.parse().ok()))
        };
        Some(
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::AUTHORIZATION,
                    HeaderName::from_static(CSRF_HEADER),
                ])
                .expose_headers([HeaderName::from_static(crate::writer::SCHEMAS_HEADER)]),
        )
    }

    /// Runs one HTTP request through the pipeline. Failures are written as
    /// error resources in the request's format.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let (mut parts, body) = request.into_parts();
        let upgrade = if wants_websocket(&parts.headers) {
            WebSocketUpgrade::from_request_parts(&mut parts, &()).await.ok()
        } else {
            None
        };

        let mut api = match parse_request(&parts, self.schemas.clone(), &self.parser) {
            Ok(api) => api,
            Err(err) => return self.writer.write_error(&self.bare_request(&parts), &err),
        };
        api.access_control = self.access_control.clone();
        api.upgrade = upgrade;

        let span = tracing::info_span!(
            "api_request",
            method = %api.method,
            type_name = %api.type_name,
            name = %api.name,
        );
        async {
            match self.process(&mut api, &parts, body).await {
                Ok((status, output)) => {
                    tracing::debug!(status = status.as_u16(), "request handled");
                    self.writer.write(&api, status, output)
                }
                Err(err) => {
                    tracing::debug!(code = err.code.as_str(), "request failed");
                    self.writer.write_error(&api, &err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn process(
        &self,
        request: &mut ApiRequest,
        parts: &Parts,
        body: Body,
    ) -> Result<(StatusCode, HandlerOutput)> {
        if let Some(authenticator) = &self.authenticator {
            request.user = Some(authenticator.authenticate(parts).await?);
        }
        check_csrf(request)?;
        if BODY_METHODS.contains(&parts.method) {
            request.body = read_body(&parts.method, &parts.headers, body, self.max_body_bytes).await?;
        }
        validate_action(request)?;
        dispatch(request).await
    }

    /// A request context good enough to render a parse failure.
    fn bare_request(&self, parts: &Parts) -> ApiRequest {
        let query = parse_query(&parts.uri);
        let mut request = ApiRequest::new(self.schemas.clone());
        request.method = parts.method.clone();
        request.headers = parts.headers.clone();
        request.response_format = parse_response_format(&query, &parts.headers);
        request.url_builder = UrlBuilder::new(&parts.headers, &parts.uri, None, query.clone());
        request.query = query;
        request
    }
}

async fn serve(State(server): State<Arc<ApiServer>>, request: Request<Body>) -> Response {
    server.handle(request).await
}

fn wants_websocket(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn new_csrf_token() -> String {
    let mut bytes = [0u8; 5];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Browser sessions get a CSRF cookie on first contact; later mutating
/// requests must echo it in the header or the query.
fn check_csrf(request: &mut ApiRequest) -> Result<()> {
    if !is_browser(&request.headers, false) {
        return Ok(());
    }
    let Some(expected) = cookie(&request.headers, CSRF_COOKIE) else {
        request
            .response_cookies
            .push(format!("{}={}; Path=/", CSRF_COOKIE, new_csrf_token()));
        return Ok(());
    };
    if request.method == Method::GET {
        return Ok(());
    }
    let from_header = request
        .headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok());
    let from_query = request.query.get(CSRF_COOKIE);
    if from_header == Some(expected.as_str()) || from_query == Some(expected.as_str()) {
        Ok(())
    } else {
        Err(ApiError::new(ErrorCode::InvalidCsrfToken, "Invalid CSRF token"))
    }
}

fn invalid_action(action: &str) -> ApiError {
    ApiError::new(ErrorCode::InvalidAction, format!("Invalid action: {}", action))
}

/// An action must be declared for its target, and a resource must currently
/// expose it.
fn validate_action(request: &ApiRequest) -> Result<()> {
    if request.action.is_empty() || request.method != Method::POST || !request.link.is_empty() {
        return Ok(());
    }
    let schema = request.schema_or_not_found()?;
    let declared = if request.name.is_empty() {
        &schema.collection_actions
    } else {
        &schema.resource_actions
    };
    if !declared.contains_key(&request.action) {
        return Err(invalid_action(&request.action));
    }
    if request.name.is_empty() {
        return Ok(());
    }
    let Some(validator) = &request.reference_validator else {
        return Ok(());
    };
    let resource = validator
        .lookup(&request.type_name, &request.name)
        .ok_or_else(|| ApiError::not_found(format!("failed to find {}", request.name)))?;
    let exposed = resource
        .get("actions")
        .and_then(|actions| actions.as_object())
        .is_some_and(|actions| actions.contains_key(&request.action));
    if exposed {
        Ok(())
    } else {
        Err(invalid_action(&request.action))
    }
}

async fn dispatch(request: &mut ApiRequest) -> Result<(StatusCode, HandlerOutput)> {
    if !request.action.is_empty() {
        let output = handle_action(request).await?;
        return Ok((empty_or(&output, StatusCode::OK), output));
    }

    let schema = request.schema_or_not_found()?;
    let (handler, status): (Arc<dyn RequestHandler>, StatusCode) = match request.method {
        Method::GET => (
            schema.list_handler.clone().unwrap_or_else(|| Arc::new(ListHandler)),
            StatusCode::OK,
        ),
        Method::POST => (
            schema.create_handler.clone().unwrap_or_else(|| Arc::new(CreateHandler)),
            StatusCode::CREATED,
        ),
        Method::PUT | Method::PATCH => (
            schema.update_handler.clone().unwrap_or_else(|| Arc::new(UpdateHandler)),
            StatusCode::OK,
        ),
        Method::DELETE => (
            schema.delete_handler.clone().unwrap_or_else(|| Arc::new(DeleteHandler)),
            StatusCode::OK,
        ),
        ref other => {
            return Err(ApiError::new(
                ErrorCode::MethodNotAllowed,
                format!("Method {} not supported", other),
            ));
        }
    };

    let output = handler.handle(request).await?;
    let status = if request.method == Method::DELETE {
        empty_or(&output, status)
    } else {
        status
    };
    Ok((status, output))
}

fn empty_or(output: &HandlerOutput, status: StatusCode) -> StatusCode {
    if matches!(output, HandlerOutput::Empty) {
        StatusCode::NO_CONTENT
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Object;
    use crate::types::{Action, QueryParams, Schema};

    const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/120.0";

    fn browser_request(method: Method, headers: &[(&str, &str)]) -> ApiRequest {
        let mut request = ApiRequest::new(Arc::new(Schemas::new())).with_method(method);
        request.headers.insert(header::USER_AGENT, FIREFOX.parse().unwrap());
        for (name, value) in headers {
            request
                .headers
                .append(HeaderName::from_bytes(name.as_bytes()).unwrap(), value.parse().unwrap());
        }
        request
    }

    #[test]
    fn first_browser_visit_issues_a_cookie() {
        let mut request = browser_request(Method::POST, &[]);
        check_csrf(&mut request).unwrap();
        assert_eq!(request.response_cookies.len(), 1);
        let cookie = &request.response_cookies[0];
        assert!(cookie.starts_with("CSRF="));
        assert!(cookie.ends_with("; Path=/"));
        assert_eq!(cookie.len(), "CSRF=; Path=/".len() + 10);
    }

    #[test]
    fn mutating_browser_requests_must_echo_the_cookie() {
        let mut request = browser_request(Method::PUT, &[("cookie", "theme=dark; CSRF=abc")]);
        let err = check_csrf(&mut request).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidCsrfToken);

        let mut request = browser_request(Method::PUT, &[("cookie", "CSRF=abc"), ("x-api-csrf", "abc")]);
        assert!(check_csrf(&mut request).is_ok());

        let mut request = browser_request(Method::DELETE, &[("cookie", "CSRF=abc")])
            .with_query(QueryParams::from_pairs([("CSRF", "abc")]));
        assert!(check_csrf(&mut request).is_ok());

        let mut request = browser_request(Method::GET, &[("cookie", "CSRF=abc")]);
        assert!(check_csrf(&mut request).is_ok());
        assert!(request.response_cookies.is_empty());
    }

    #[test]
    fn non_browser_clients_skip_csrf() {
        let mut request = ApiRequest::new(Arc::new(Schemas::new())).with_method(Method::POST);
        request.headers.insert(header::COOKIE, "CSRF=abc".parse().unwrap());
        assert!(check_csrf(&mut request).is_ok());
        assert!(request.response_cookies.is_empty());
    }

    struct Lookup(Option<Object>);

    impl ReferenceValidator for Lookup {
        fn validate(&self, _: &str, _: &str) -> bool {
            true
        }

        fn lookup(&self, _: &str, _: &str) -> Option<Object> {
            self.0.clone()
        }
    }

    fn action_request(name: &str, action: &str, lookup: Option<Object>) -> ApiRequest {
        let mut schemas = Schemas::new();
        schemas.add_schema(
            Schema::new("widget")
                .with_resource_action("restart", Action::new())
                .with_collection_action("purge", Action::new()),
        );
        let schemas = Arc::new(schemas);
        let mut request = ApiRequest::new(schemas.clone())
            .with_schema(schemas.schema("widget").unwrap())
            .with_method(Method::POST)
            .with_name(name);
        request.action = action.to_string();
        request.reference_validator = lookup.map(|o| Arc::new(Lookup(Some(o))) as Arc<dyn ReferenceValidator>);
        request
    }

    #[test]
    fn actions_must_be_declared_for_their_target() {
        assert!(validate_action(&action_request("", "purge", None)).is_ok());
        assert!(validate_action(&action_request("w1", "restart", None)).is_ok());

        let err = validate_action(&action_request("w1", "purge", None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAction);
        assert_eq!(err.message, "Invalid action: purge");
        let err = validate_action(&action_request("", "restart", None)).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAction);
    }

    #[test]
    fn resource_actions_must_be_exposed() {
        let exposed = serde_json::json!({"actions": {"restart": "http://x"}});
        let request = action_request("w1", "restart", exposed.as_object().cloned());
        assert!(validate_action(&request).is_ok());

        let hidden = serde_json::json!({"actions": {}});
        let request = action_request("w1", "restart", hidden.as_object().cloned());
        assert_eq!(validate_action(&request).unwrap_err().code, ErrorCode::InvalidAction);
    }
}
