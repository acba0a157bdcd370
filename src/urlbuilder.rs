//! Absolute links for responses, rebuilt from proxy headers when present.

use crate::types::definition::guess_plural_name;
use crate::types::request::query_escape;
use crate::types::{ApiVersion, QueryParams, Schema, SortOrder};
use http::{HeaderMap, Uri};

pub const REQUEST_URL_HEADER: &str = "x-api-request-url";
pub const URL_PREFIX_HEADER: &str = "x-api-url-prefix";
pub const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";
pub const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";
pub const FORWARDED_PORT_HEADER: &str = "x-forwarded-port";

#[derive(Debug, Clone)]
pub struct UrlBuilder {
    current_url: String,
    response_url_base: String,
    version_path: String,
    sub_context: String,
    query: QueryParams,
}

impl Default for UrlBuilder {
    fn default() -> Self {
        Self {
            current_url: "http://localhost/".to_string(),
            response_url_base: "http://localhost".to_string(),
            version_path: String::new(),
            sub_context: String::new(),
            query: QueryParams::default(),
        }
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    // Forwarded headers may carry a comma separated chain; the first hop wins.
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn strip_port(host: &str) -> &str {
    let has_port = if host.starts_with('[') {
        host.contains("]:")
    } else {
        host.contains(':')
    };
    match host.rfind(':') {
        Some(index) if has_port => &host[..index],
        _ => host,
    }
}

impl UrlBuilder {
    pub fn new(headers: &HeaderMap, uri: &Uri, version: Option<&ApiVersion>, query: QueryParams) -> Self {
        let prefix = header(headers, URL_PREFIX_HEADER)
            .map(|p| p.trim_end_matches('/').to_string())
            .unwrap_or_default();
        let path = format!("{}{}", prefix, uri.path());

        let current_url = if let Some(url) = header(headers, REQUEST_URL_HEADER) {
            url.split('?').next().unwrap_or(url).to_string()
        } else {
            let host = header(headers, FORWARDED_HOST_HEADER)
                .or_else(|| header(headers, http::header::HOST.as_str()))
                .or_else(|| uri.authority().map(|a| a.as_str()))
                .unwrap_or("localhost");
            let scheme = header(headers, FORWARDED_PROTO_HEADER)
                .or_else(|| uri.scheme_str())
                .unwrap_or("http");
            match header(headers, FORWARDED_PORT_HEADER) {
                Some("80") | Some("443") => format!("{}://{}{}", scheme, strip_port(host), path),
                Some(port) => format!("{}://{}:{}{}", scheme, strip_port(host), port, path),
                None => format!("{}://{}{}", scheme, host, path),
            }
        };

        let response_url_base = match current_url.rfind(uri.path()) {
            Some(index) if uri.path() != "/" => current_url[..index].to_string(),
            _ => current_url.trim_end_matches('/').to_string(),
        };

        Self {
            current_url,
            response_url_base,
            version_path: version.map(|v| v.path.clone()).unwrap_or_default(),
            sub_context: String::new(),
            query,
        }
    }

    /// Path segments such as `/namespaces/ns1` inserted before collection names.
    pub fn set_sub_context(&mut self, sub_context: impl Into<String>) {
        self.sub_context = sub_context.into();
    }

    pub fn current(&self) -> &str {
        &self.current_url
    }

    pub fn relative_to_root(&self, path: &str) -> String {
        if !path.is_empty() && !path.starts_with('/') {
            format!("{}/{}", self.response_url_base, path)
        } else {
            format!("{}{}", self.response_url_base, path)
        }
    }

    pub fn schemas(&self) -> String {
        self.basic_url(&["schemas"])
    }

    pub fn collection(&self, schema: &Schema) -> String {
        self.basic_url(&[&plural(schema)])
    }

    /// Empty when `id` is empty.
    pub fn resource_link(&self, schema: &Schema, id: &str) -> String {
        self.basic_url(&[&plural(schema), id])
    }

    pub fn link(&self, schema: &Schema, id: &str, link: &str) -> String {
        self.basic_url(&[&plural(schema), id, link])
    }

    pub fn action(&self, schema: &Schema, id: &str, action: &str) -> String {
        format!("{}?action={}", self.resource_link(schema, id), query_escape(action))
    }

    pub fn collection_action(&self, schema: &Schema, action: &str) -> String {
        format!("{}?action={}", self.collection(schema), query_escape(action))
    }

    pub fn filter_link(&self, schema: &Schema, field: &str, value: &str) -> String {
        format!(
            "{}?{}={}",
            self.collection(schema),
            query_escape(field),
            query_escape(value)
        )
    }

    pub fn marker(&self, marker: &str) -> String {
        let mut query = self.query.clone();
        query.set("marker", marker);
        self.with_query(&query)
    }

    pub fn sort(&self, field: &str) -> String {
        let mut query = self.query.clone();
        query.remove("order");
        query.remove("marker");
        query.set("sort", field);
        self.with_query(&query)
    }

    pub fn reverse_sort(&self, order: SortOrder) -> String {
        let mut query = self.query.clone();
        query.remove("order");
        query.remove("marker");
        query.set("order", order.reverse().as_str());
        self.with_query(&query)
    }

    fn with_query(&self, query: &QueryParams) -> String {
        format!("{}?{}", self.current_url, query.encode())
    }

    fn basic_url(&self, parts: &[&str]) -> String {
        let mut url = format!("{}{}{}", self.response_url_base, self.version_path, self.sub_context);
        for part in parts {
            if part.is_empty() {
                return String::new();
            }
            url.push('/');
            url.push_str(part);
        }
        url
    }
}

fn plural(schema: &Schema) -> String {
    if schema.plural_name.is_empty() {
        guess_plural_name(&schema.id).to_lowercase()
    } else {
        schema.plural_name.to_lowercase()
    }
}
