//! Turns an inbound HTTP request into an [`ApiRequest`].

mod body;
mod query;
mod validate;

pub use body::{BODY_METHODS, read_body};
pub use query::query_options;
pub use validate::validate_method;

use crate::builtin::API_ROOT;
use crate::error::{ApiError, Result};
use crate::types::schema::Scope;
use crate::types::{
    ApiRequest, ApiVersion, PageLimits, QueryParams, ReferenceValidator, ResponseFormat, Schemas,
};
use crate::urlbuilder::UrlBuilder;
use axum::extract::Query;
use http::request::Parts;
use http::{HeaderMap, Method, Uri, header};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

lazy_static! {
    static ref MULTI_SLASH: Regex = Regex::new("//+").unwrap();
}

/// Sub-context key that scopes a request to one namespace.
pub const NAMESPACES_CONTEXT: &str = "namespaces";

/// Deepest path accepted after the version prefix: `/{type}/{id}/{link}`.
const MAX_PATH_PARTS: usize = 4;

/// Server-wide inputs to request parsing.
#[derive(Clone, Default)]
pub struct ParserConfig {
    pub versions: Vec<ApiVersion>,
    pub default_namespace: String,
    pub limits: PageLimits,
    pub reference_validator: Option<Arc<dyn ReferenceValidator>>,
}

/// Decodes the query string, keeping repeated keys.
pub fn parse_query(uri: &Uri) -> QueryParams {
    match Query::<Vec<(String, String)>>::try_from_uri(uri) {
        Ok(Query(pairs)) => QueryParams::from_pairs(pairs),
        Err(err) => {
            log::debug!("ignoring undecodable query {:?}: {}", uri.query(), err);
            QueryParams::default()
        }
    }
}

/// True for a browser user agent. With `check_accepts` the client must also
/// accept `*/*` or `text/html`.
pub fn is_browser(headers: &HeaderMap, check_accepts: bool) -> bool {
    let value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_lowercase()
    };
    let user_agent = value(header::USER_AGENT);
    let mut accepts = value(header::ACCEPT);
    if accepts.is_empty() || !check_accepts {
        accepts = "*/*".to_string();
    }
    user_agent.contains("mozilla") && (accepts.contains("*/*") || accepts.contains("text/html"))
}

pub fn parse_response_format(query: &QueryParams, headers: &HeaderMap) -> ResponseFormat {
    if let Some(format) = query
        .get("_format")
        .and_then(|f| ResponseFormat::from_str(&f.trim().to_lowercase()).ok())
    {
        return format;
    }
    if is_browser(headers, true) {
        return ResponseFormat::Html;
    }
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if accept.contains("application/yaml") {
        ResponseFormat::Yaml
    } else {
        ResponseFormat::Json
    }
}

fn parse_method(method: &Method, query: &QueryParams) -> Method {
    query
        .get("_method")
        .and_then(|m| Method::from_bytes(m.to_uppercase().as_bytes()).ok())
        .unwrap_or_else(|| method.clone())
}

/// Actions ride on POST; `action=remove` is an alias for DELETE.
fn parse_action(http_method: &Method, method: Method, query: &QueryParams) -> (String, Method) {
    if http_method != Method::POST {
        return (String::new(), method);
    }
    match query.get("action") {
        Some("remove") => (String::new(), Method::DELETE),
        Some(action) => (action.to_string(), method),
        None => (String::new(), method),
    }
}

fn parse_version<'a>(versions: &'a [ApiVersion], path: &str) -> Option<&'a ApiVersion> {
    versions
        .iter()
        .filter(|v| !v.path.is_empty())
        .find(|v| path == v.path || path.starts_with(&format!("{}/", v.path.trim_end_matches('/'))))
}

fn parse_namespaces(query: &QueryParams) -> Vec<String> {
    query
        .get_all("namespaces")
        .iter()
        .chain(query.get_all("namespace"))
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|ns| !ns.is_empty())
        .map(str::to_string)
        .collect()
}

/// Consumes leading `/{parentType}/{parentId}` pairs the version allows as
/// sub-contexts. Stops early when a parent id does not resolve.
fn parse_sub_context(
    mut parts: Vec<String>,
    version: &ApiVersion,
    validator: Option<&Arc<dyn ReferenceValidator>>,
    sub_context: &mut BTreeMap<String, String>,
) -> (Vec<String>, String) {
    let mut prefix = String::new();
    while parts.len() > 3 && !parts[3].is_empty() {
        let resource_type = parts[1].clone();
        let resource_id = parts[2].clone();
        if !version.is_sub_context(&resource_type) {
            break;
        }
        if let Some(validator) = validator {
            if !validator.validate(&resource_type, &resource_id) {
                break;
            }
        }
        prefix.push_str(&format!("/{}/{}", resource_type, resource_id));
        sub_context.insert(resource_type, resource_id);
        parts.drain(1..3);
    }
    (parts, prefix)
}

/// Parses method, format, path and schema. The body is read separately by
/// [`read_body`] so parsing never consumes the request stream.
pub fn parse_request(parts: &Parts, schemas: Arc<Schemas>, config: &ParserConfig) -> Result<ApiRequest> {
    let query = parse_query(&parts.uri);
    let mut request = ApiRequest::new(schemas.clone());
    request.headers = parts.headers.clone();
    request.response_format = parse_response_format(&query, &parts.headers);
    request.limits = config.limits;
    request.reference_validator = config.reference_validator.clone();

    let path = MULTI_SLASH.replace_all(parts.uri.path(), "/").to_string();
    let Some(version) = parse_version(&config.versions, &path).cloned() else {
        request.url_builder = UrlBuilder::new(&parts.headers, &parts.uri, None, query.clone());
        request.query = query;
        request.schema = schemas.schema(API_ROOT);
        request.type_name = API_ROOT.to_string();
        return Ok(request);
    };

    let method = parse_method(&parts.method, &query);
    let (action, method) = parse_action(&parts.method, method, &query);
    request.method = method;
    request.action = action;
    request.url_builder = UrlBuilder::new(&parts.headers, &parts.uri, Some(&version), query.clone());

    let segments: Vec<String> = path[version.path.trim_end_matches('/').len()..]
        .split('/')
        .map(str::to_string)
        .collect();
    let (segments, prefix) = parse_sub_context(
        segments,
        &version,
        config.reference_validator.as_ref(),
        &mut request.sub_context,
    );
    if !prefix.is_empty() {
        request.url_builder.set_sub_context(prefix);
    }
    if segments.len() > MAX_PATH_PARTS {
        request.query = query;
        request.version = Some(version);
        return Err(ApiError::not_found("No handler for path"));
    }

    let segment = |index: usize| segments.get(index).cloned().unwrap_or_default();
    let type_name = segment(1);
    let schema = if type_name.is_empty() { None } else { schemas.schema(&type_name) };

    match schema {
        Some(schema) => {
            request.type_name = schema.id.clone();
            let name = segment(2);
            if !name.is_empty() {
                request.name = name;
                request.link = segment(3);
            }
            request.namespaces = resolve_namespaces(&request, &query, schema.scope, config);
            request.schema = Some(schema);
        }
        None => {
            request.method = Method::GET;
            request.action.clear();
            request.type_name = API_ROOT.to_string();
            request.name = version.path.clone();
            request.schema = schemas.schema(API_ROOT);
        }
    }

    request.query = query;
    request.version = Some(version);
    validate_method(&request)?;
    Ok(request)
}

/// Explicit query namespaces win, then a `namespaces/<ns>` sub-context, then
/// the default namespace for anything but a collection read.
fn resolve_namespaces(
    request: &ApiRequest,
    query: &QueryParams,
    scope: Scope,
    config: &ParserConfig,
) -> Vec<String> {
    if scope != Scope::Namespace {
        return Vec::new();
    }
    let explicit = parse_namespaces(query);
    if !explicit.is_empty() {
        return explicit;
    }
    if let Some(ns) = request.sub_context.get(NAMESPACES_CONTEXT) {
        return vec![ns.clone()];
    }
    let collection_read = request.name.is_empty() && request.method == Method::GET;
    if collection_read || config.default_namespace.is_empty() {
        Vec::new()
    } else {
        vec![config.default_namespace.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::types::{Action, Schema};
    use http::Request;

    fn parts(method: &str, uri: &str, headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).expect("request").into_parts().0
    }

    fn registry() -> Arc<Schemas> {
        let mut schemas = Schemas::new();
        schemas
            .add_schema(Schema::new(API_ROOT).with_resource_methods(&["GET"]))
            .add_schema(
                Schema::new("widget")
                    .with_scope(Scope::Namespace)
                    .with_resource_action("restart", Action::new()),
            )
            .add_schema(Schema::new("node").with_resource_methods(&["GET"]));
        Arc::new(schemas)
    }

    fn config() -> ParserConfig {
        ParserConfig {
            versions: vec![ApiVersion::new("/v1").with_sub_context(NAMESPACES_CONTEXT)],
            default_namespace: "default".into(),
            ..Default::default()
        }
    }

    #[test]
    fn browser_gets_html_unless_it_asks_for_json() {
        let browser = parts("GET", "/v1/widgets", &[("user-agent", "Mozilla/5.0"), ("accept", "*/*")]);
        assert_eq!(
            parse_response_format(&parse_query(&browser.uri), &browser.headers),
            ResponseFormat::Html
        );

        let json = parts("GET", "/v1/widgets", &[("user-agent", "Mozilla/5.0"), ("accept", "application/json")]);
        assert_eq!(
            parse_response_format(&parse_query(&json.uri), &json.headers),
            ResponseFormat::Json
        );

        let yaml = parts("GET", "/v1/widgets", &[("accept", "application/yaml")]);
        assert_eq!(
            parse_response_format(&parse_query(&yaml.uri), &yaml.headers),
            ResponseFormat::Yaml
        );

        let forced = parts("GET", "/v1/widgets?_format=YAML", &[("user-agent", "Mozilla/5.0")]);
        assert_eq!(
            parse_response_format(&parse_query(&forced.uri), &forced.headers),
            ResponseFormat::Yaml
        );
    }

    #[test]
    fn parses_type_name_and_link() {
        let request = parse_request(&parts("GET", "/v1//widgets/ns1:w1/logs", &[]), registry(), &config()).unwrap();
        assert_eq!(request.type_name, "widget");
        assert_eq!(request.name, "ns1:w1");
        assert_eq!(request.link, "logs");
        assert_eq!(request.version.as_ref().map(|v| v.path.as_str()), Some("/v1"));
    }

    #[test]
    fn namespace_sub_context_scopes_the_request() {
        let request = parse_request(&parts("GET", "/v1/namespaces/prod/widgets", &[]), registry(), &config()).unwrap();
        assert_eq!(request.type_name, "widget");
        assert_eq!(request.sub_context.get("namespaces").map(String::as_str), Some("prod"));
        assert_eq!(request.namespaces, vec!["prod".to_string()]);
        assert!(request.url_builder.collection(request.schema.as_deref().unwrap()).ends_with("/v1/namespaces/prod/widgets"));
    }

    #[test]
    fn namespaces_query_and_default() {
        let request = parse_request(&parts("GET", "/v1/widgets?namespaces=a,b&namespace=c", &[]), registry(), &config()).unwrap();
        assert_eq!(request.namespaces, vec!["a", "b", "c"]);

        let list = parse_request(&parts("GET", "/v1/widgets", &[]), registry(), &config()).unwrap();
        assert!(list.namespaces.is_empty());

        let create = parse_request(&parts("POST", "/v1/widgets", &[]), registry(), &config()).unwrap();
        assert_eq!(create.namespaces, vec!["default"]);

        let node = parse_request(&parts("GET", "/v1/nodes/n1", &[]), registry(), &config()).unwrap();
        assert!(node.namespaces.is_empty());
    }

    #[test]
    fn unknown_type_and_unversioned_paths_fall_back_to_api_root() {
        let request = parse_request(&parts("DELETE", "/v1/nothing", &[]), registry(), &config()).unwrap();
        assert_eq!(request.type_name, API_ROOT);
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.name, "/v1");

        let root = parse_request(&parts("GET", "/", &[]), registry(), &config()).unwrap();
        assert_eq!(root.type_name, API_ROOT);
        assert!(root.name.is_empty());
    }

    #[test]
    fn method_override_and_actions() {
        let request = parse_request(&parts("POST", "/v1/widgets/w1?_method=put", &[]), registry(), &config()).unwrap();
        assert_eq!(request.method, Method::PUT);

        let request = parse_request(&parts("POST", "/v1/widgets/w1?action=restart", &[]), registry(), &config()).unwrap();
        assert_eq!(request.action, "restart");
        assert_eq!(request.method, Method::POST);

        let request = parse_request(&parts("POST", "/v1/widgets/w1?action=remove", &[]), registry(), &config()).unwrap();
        assert!(request.action.is_empty());
        assert_eq!(request.method, Method::DELETE);
    }

    #[test]
    fn disallowed_method_and_deep_paths_fail() {
        let err = parse_request(&parts("PUT", "/v1/nodes/n1", &[]), registry(), &config()).expect_err("read-only");
        assert_eq!(err.code, ErrorCode::MethodNotAllowed);

        let err = parse_request(&parts("GET", "/v1/widgets/w1/logs/extra", &[]), registry(), &config()).expect_err("too deep");
        assert_eq!(err.code, ErrorCode::NotFound);
    }
}
