use crate::error::{ApiError, ErrorCode, Result};
use crate::types::ApiRequest;
use http::Method;

const SUPPORTED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
];

/// Checks the verb against what the schema declares for the target. A POST
/// carrying an action always passes; links are checked by their handler.
pub fn validate_method(request: &ApiRequest) -> Result<()> {
    if !request.action.is_empty() && request.method == Method::POST {
        return Ok(());
    }

    if !SUPPORTED_METHODS.contains(&request.method) {
        return Err(ApiError::new(
            ErrorCode::MethodNotAllowed,
            format!("Invalid method {} not supported", request.method),
        ));
    }

    let Some(schema) = request.schema.as_deref() else {
        return Ok(());
    };
    if request.type_name.is_empty() || !request.link.is_empty() {
        return Ok(());
    }

    let allowed = if request.name.is_empty() {
        schema.allows_collection_method(request.method.as_str())
    } else {
        schema.allows_resource_method(request.method.as_str())
    };
    if allowed {
        Ok(())
    } else {
        Err(ApiError::new(
            ErrorCode::MethodNotAllowed,
            format!("Method {} not supported", request.method),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Schema, Schemas};
    use std::sync::Arc;

    fn request(method: Method, name: &str) -> ApiRequest {
        let schema = Arc::new(Schema::new("widget").with_resource_methods(&["GET", "PUT"]));
        ApiRequest::new(Arc::new(Schemas::new()))
            .with_schema(schema)
            .with_method(method)
            .with_name(name)
    }

    #[test]
    fn collection_and_resource_methods() {
        assert!(validate_method(&request(Method::POST, "")).is_ok());
        assert!(validate_method(&request(Method::PATCH, "w1")).is_ok());
        let err = validate_method(&request(Method::DELETE, "w1")).expect_err("not declared");
        assert_eq!(err.code, ErrorCode::MethodNotAllowed);
        assert!(validate_method(&request(Method::PUT, "")).is_err());
    }

    #[test]
    fn actions_and_links_bypass_declared_methods() {
        let mut req = request(Method::POST, "w1");
        req.action = "restart".into();
        assert!(validate_method(&req).is_ok());

        let mut req = request(Method::DELETE, "w1");
        req.link = "logs".into();
        assert!(validate_method(&req).is_ok());
    }

    #[test]
    fn unknown_verbs_are_rejected() {
        let req = request(Method::OPTIONS, "");
        let err = validate_method(&req).expect_err("options");
        assert!(err.message.contains("Invalid method OPTIONS"));
    }
}
