//! Response encoding. Every format carries the same logical envelope.

mod collection;
mod html;
mod resource;

pub use collection::collection;
pub use html::{DEFAULT_UI_VERSION, UiSettings};
pub use resource::{ACTION_LINKS_HEADER, convert, to_resource};

use crate::builtin::SCHEMA;
use crate::error::ApiError;
use crate::types::{ApiRequest, HandlerOutput, ResponseFormat};
use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde_json::Value;

pub const SCHEMAS_HEADER: &str = "x-api-schemas";
pub const EXPIRES_VALUE: &str = "Wed 24 Feb 1982 18:42:00 GMT";

#[derive(Debug, Clone, Default)]
pub struct ResponseWriter {
    pub ui: UiSettings,
}

impl ResponseWriter {
    pub fn new(ui: UiSettings) -> Self {
        Self { ui }
    }

    /// Renders a handler result. Objects and lists go through resource
    /// conversion; values are written as given.
    pub fn write(&self, request: &ApiRequest, status: StatusCode, output: HandlerOutput) -> Response {
        let body = match output {
            HandlerOutput::Response(response) => return response,
            HandlerOutput::Empty => None,
            HandlerOutput::Value(value) => Some(value),
            HandlerOutput::Object(object) => match convert(request, &object) {
                Some(data) => Some(Value::Object(data)),
                None => {
                    let err = ApiError::server(format!("failed to render {} output", request.type_name));
                    return self.write_error(request, &err);
                }
            },
            HandlerOutput::List(list) => match request.schema.as_deref() {
                Some(schema) => Some(Value::Object(collection(request, schema, &list))),
                None => Some(Value::Array(
                    list.objects.into_iter().map(Value::Object).collect(),
                )),
            },
        };
        self.encode(request, status, body)
    }

    /// Errors keep the request's format; their envelope is never converted.
    pub fn write_error(&self, request: &ApiRequest, err: &ApiError) -> Response {
        if err.status().is_server_error() {
            log::error!("{} {} failed: {}", request.method, request.type_name, err);
        } else {
            log::debug!("{} {} rejected: {}", request.method, request.type_name, err);
        }
        self.encode(request, err.status(), Some(Value::Object(err.to_object())))
    }

    fn encode(&self, request: &ApiRequest, status: StatusCode, body: Option<Value>) -> Response {
        let schemas_url = request
            .schemas
            .schema(SCHEMA)
            .map(|schema| request.url_builder.collection(&schema))
            .unwrap_or_default();

        let mut response = match body {
            None => status.into_response(),
            Some(value) => {
                let (content_type, bytes) = match request.response_format {
                    ResponseFormat::Json => ("application/json", value.to_string()),
                    ResponseFormat::Yaml => match serde_yaml::to_string(&value) {
                        Ok(text) => ("application/yaml", text),
                        Err(err) => {
                            log::error!("failed to encode yaml response: {}", err);
                            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                        }
                    },
                    ResponseFormat::Html => ("text/html", html::render(&self.ui, &schemas_url, &value)),
                };
                let mut response = (status, Body::from(bytes)).into_response();
                response
                    .headers_mut()
                    .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                response
            }
        };

        let headers = response.headers_mut();
        headers.insert(header::EXPIRES, HeaderValue::from_static(EXPIRES_VALUE));
        if let Ok(value) = HeaderValue::from_str(&schemas_url) {
            if !schemas_url.is_empty() {
                headers.insert(SCHEMAS_HEADER, value);
            }
        }
        for cookie in &request.response_cookies {
            if let Ok(value) = HeaderValue::from_str(cookie) {
                headers.append(header::SET_COOKIE, value);
            }
        }
        response
    }
}
