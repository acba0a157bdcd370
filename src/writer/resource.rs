use crate::builder::{Builder, Operation};
use crate::data::{Object, to_string};
use crate::types::{ApiRequest, RawResource};

/// Request header asking for `actionLinks` instead of `actions`.
pub const ACTION_LINKS_HEADER: &str = "x-api-action-links";

/// Renders one stored object as a wire resource, or `None` when it has no
/// schema or cannot be constructed for output.
///
/// Declared resource actions are attached before the schema formatter runs so
/// the formatter can withdraw the ones that do not apply; `self`, `update` and
/// `remove` links are filled in afterwards unless the formatter set them.
pub fn to_resource(request: &ApiRequest, input: &Object) -> Option<RawResource> {
    let schema = input
        .get("type")
        .and_then(|t| t.as_str())
        .and_then(|t| request.schemas.schema(t))
        .or_else(|| request.schema.clone())?;

    let values = match Builder::new(&request.schemas).construct(&schema, input, Operation::List) {
        Ok(values) => values,
        Err(err) => {
            log::error!("failed to construct {} for output: {}", schema.id, err);
            return None;
        }
    };

    let id = input.get("id").map(to_string).unwrap_or_default();
    let mut resource = RawResource::new(schema.clone(), id, values);
    resource.action_links = request.headers.contains_key(ACTION_LINKS_HEADER);

    if !resource.id.is_empty() {
        for name in schema.resource_actions.keys() {
            let link = request.url_builder.action(&schema, &resource.id, name);
            resource.actions.insert(name.clone(), link);
        }
    }

    if let Some(formatter) = &schema.formatter {
        formatter(request, &mut resource);
    }

    add_links(request, input, &mut resource);
    Some(resource)
}

fn add_links(request: &ApiRequest, input: &Object, resource: &mut RawResource) {
    if resource.id.is_empty() {
        return;
    }
    let schema = resource.schema.clone();
    let access = &request.access_control;
    let self_link = request.url_builder.resource_link(&schema, &resource.id);

    resource
        .links
        .entry("self".into())
        .or_insert_with(|| self_link.clone());
    if !resource.links.contains_key("update") && access.can_update(request, Some(input), &schema).is_ok() {
        resource.links.insert("update".into(), self_link.clone());
    }
    if !resource.links.contains_key("remove") && access.can_delete(request, Some(input), &schema).is_ok() {
        resource.links.insert("remove".into(), self_link);
    }
}

/// [`to_resource`] flattened to its wire map.
pub fn convert(request: &ApiRequest, input: &Object) -> Option<Object> {
    to_resource(request, input).map(|resource| resource.to_object())
}
