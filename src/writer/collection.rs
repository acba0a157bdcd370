use super::resource::convert;
use crate::data::Object;
use crate::parse::query_options;
use crate::store::ObjectList;
use crate::types::{ApiRequest, Pagination, Schema};
use http::Method;
use serde_json::{Value, json};

fn string_map<'a>(entries: impl IntoIterator<Item = (&'a str, String)>) -> Value {
    Value::Object(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), Value::from(v)))
            .collect(),
    )
}

fn render_pagination(request: &ApiRequest, pagination: &Pagination) -> Value {
    let mut data = Object::new();
    if let Some(limit) = pagination.limit {
        data.insert("limit".into(), Value::from(limit));
    }
    if let Some(total) = pagination.total {
        data.insert("total".into(), Value::from(total));
    }
    if !pagination.marker.is_empty() {
        data.insert("marker".into(), Value::from(pagination.marker.as_str()));
    }
    data.insert("partial".into(), Value::from(pagination.partial));
    let cursors = [
        ("first", &pagination.first),
        ("previous", &pagination.previous),
        ("next", &pagination.next),
        ("last", &pagination.last),
    ];
    for (name, cursor) in cursors {
        if let Some(marker) = cursor.as_deref().filter(|m| !m.is_empty()) {
            data.insert(name.into(), Value::from(request.url_builder.marker(marker)));
        }
    }
    Value::Object(data)
}

fn render_sort(request: &ApiRequest, schema: &Schema) -> Value {
    let opts = query_options(request, schema);
    let links = schema
        .collection_filters
        .keys()
        .filter(|name| {
            schema
                .resource_fields
                .get(name.as_str())
                .is_some_and(|f| f.field_type == "string" || f.field_type == "enum")
        })
        .map(|name| (name.as_str(), request.url_builder.sort(name)));
    let mut sort = json!({
        "order": opts.sort.order.as_str(),
        "reverse": request.url_builder.reverse_sort(opts.sort.order),
        "links": string_map(links),
    });
    if !opts.sort.name.is_empty() {
        sort["name"] = Value::from(opts.sort.name.as_str());
    }
    sort
}

fn render_filters(request: &ApiRequest, schema: &Schema) -> Value {
    let opts = query_options(request, schema);
    let mut filters = Object::new();
    for condition in &opts.conditions {
        let entry = filters
            .entry(condition.field.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(condition.to_value());
        }
    }
    for name in schema.collection_filters.keys() {
        filters.entry(name.clone()).or_insert(Value::Null);
    }
    Value::Object(filters)
}

/// The `collection` envelope around a list read. The schema's collection
/// formatter runs last.
pub fn collection(request: &ApiRequest, schema: &Schema, list: &ObjectList) -> Object {
    let data: Vec<Value> = list
        .objects
        .iter()
        .filter_map(|object| convert(request, object))
        .map(Value::Object)
        .collect();

    let mut create_types = Object::new();
    if request.method == Method::GET && request.access_control.can_create(request, schema).is_ok() {
        create_types.insert(schema.id.clone(), Value::from(request.url_builder.collection(schema)));
    }
    let actions = schema
        .collection_actions
        .keys()
        .map(|name| (name.as_str(), request.url_builder.collection_action(schema, name)));

    let mut result = Object::new();
    result.insert("type".into(), Value::from("collection"));
    result.insert("resourceType".into(), Value::from(schema.id.as_str()));
    result.insert("links".into(), json!({ "self": request.url_builder.current() }));
    result.insert("actions".into(), string_map(actions));
    result.insert("createTypes".into(), Value::Object(create_types));
    result.insert("sort".into(), render_sort(request, schema));
    result.insert("filters".into(), render_filters(request, schema));
    if let Some(pagination) = &list.pagination {
        result.insert("pagination".into(), render_pagination(request, pagination));
    }
    if !list.revision.is_empty() {
        result.insert("revision".into(), Value::from(list.revision.as_str()));
    }
    result.insert("data".into(), Value::Array(data));

    if let Some(formatter) = &schema.collection_formatter {
        formatter(request, &mut result);
    }
    result
}
