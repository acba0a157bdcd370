use crate::data::Object;
use crate::error::{ApiError, ErrorCode, Result};
use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart};
use axum::{Form, http::Request};
use http::{HeaderMap, Method, header};
use serde_json::Value;
use std::convert::Infallible;
use tower::{Layer, ServiceExt, service_fn};

/// Verbs whose request body is decoded.
pub const BODY_METHODS: [Method; 3] = [Method::POST, Method::PUT, Method::PATCH];

fn invalid_body(err: impl std::fmt::Display) -> ApiError {
    ApiError::new(
        ErrorCode::InvalidBodyContent,
        format!("Failed to parse body: {}", err),
    )
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_lowercase())
        .unwrap_or_default()
}

/// Groups form pairs into string lists, one per key.
fn values_to_body(pairs: impl IntoIterator<Item = (String, String)>) -> Object {
    let mut data = Object::new();
    for (key, value) in pairs {
        let entry = data.entry(key).or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(values) = entry {
            values.push(Value::from(value));
        }
    }
    data
}

/// Runs a form extractor over already bounded bytes, with axum's own body
/// limit raised to the same bound.
async fn extract_form<T>(headers: &HeaderMap, bytes: Bytes, max_bytes: usize) -> Result<T>
where
    T: FromRequest<()> + Send + 'static,
    T::Rejection: std::fmt::Display + Send + 'static,
{
    let mut builder = Request::builder().method(Method::POST);
    if let Some(value) = headers.get(header::CONTENT_TYPE) {
        builder = builder.header(header::CONTENT_TYPE, value.clone());
    }
    let request = builder.body(Body::from(bytes)).map_err(invalid_body)?;
    let extractor = DefaultBodyLimit::max(max_bytes).layer(service_fn(|request: Request<Body>| async move {
        Ok::<_, Infallible>(T::from_request(request, &()).await)
    }));
    match extractor.oneshot(request).await {
        Ok(extracted) => extracted.map_err(invalid_body),
        Err(never) => match never {},
    }
}

/// Decodes the request body for POST, PUT and PATCH.
///
/// JSON is the default; `application/yaml` decodes as YAML. Url-encoded and
/// multipart forms become a map of string lists. At most `max_bytes` are read,
/// whatever the content type.
pub async fn read_body(
    method: &Method,
    headers: &HeaderMap,
    body: Body,
    max_bytes: usize,
) -> Result<Option<Object>> {
    if !BODY_METHODS.contains(method) {
        return Ok(None);
    }

    let bytes = axum::body::to_bytes(body, max_bytes)
        .await
        .map_err(invalid_body)?;

    match content_type(headers).as_str() {
        "multipart/form-data" => {
            let mut multipart: Multipart = extract_form(headers, bytes, max_bytes).await?;
            let mut pairs = Vec::new();
            while let Some(field) = multipart.next_field().await.map_err(invalid_body)? {
                let name = field.name().unwrap_or_default().to_string();
                let value = field.text().await.map_err(invalid_body)?;
                pairs.push((name, value));
            }
            Ok(Some(values_to_body(pairs)))
        }
        "application/x-www-form-urlencoded" => {
            let Form(pairs): Form<Vec<(String, String)>> = extract_form(headers, bytes, max_bytes).await?;
            Ok(Some(values_to_body(pairs)))
        }
        kind => {
            if bytes.iter().all(u8::is_ascii_whitespace) {
                return Ok(Some(Object::new()));
            }
            let value: Value = if kind == "application/yaml" {
                serde_yaml::from_slice(&bytes).map_err(invalid_body)?
            } else {
                serde_json::from_slice(&bytes).map_err(invalid_body)?
            };
            match value {
                Value::Object(data) => Ok(Some(data)),
                other => Err(invalid_body(format!("expected an object, got {}", other))),
            }
        }
    }
}
