use crate::types::{
    ApiRequest, ModifierType, Pagination, QueryCondition, QueryOptions, Schema, Sort, SortOrder,
};
use http::Method;
use std::str::FromStr;

/// Sort, paging and filter directives for a read. Anything but GET gets
/// empty options.
pub fn query_options(request: &ApiRequest, schema: &Schema) -> QueryOptions {
    if request.method != Method::GET {
        return QueryOptions::default();
    }

    let options = request
        .query
        .iter()
        .filter(|(key, _)| key.starts_with('_'))
        .filter_map(|(key, values)| Some((key.clone(), values.first()?.clone())))
        .collect();

    QueryOptions {
        sort: parse_sort(request, schema),
        pagination: parse_pagination(request),
        conditions: parse_filters(request, schema),
        options,
    }
}

fn parse_sort(request: &ApiRequest, schema: &Schema) -> Sort {
    let name = request
        .option("sort")
        .filter(|field| schema.collection_filters.contains_key(*field))
        .unwrap_or_default()
        .to_string();
    let order = if request.option("order") == Some("desc") {
        SortOrder::Desc
    } else {
        SortOrder::Asc
    };
    Sort { name, order }
}

fn parse_pagination(request: &ApiRequest) -> Pagination {
    let limits = request.limits;
    let limit = match request.option("limit").map(|l| l.trim().parse::<i64>()) {
        Some(Ok(limit)) if limit >= 0 => limit.min(limits.max_limit),
        _ => limits.default_limit,
    };
    Pagination {
        limit: Some(limit),
        marker: request.option("marker").unwrap_or_default().to_string(),
        ..Default::default()
    }
}

/// Splits `field_op` at the last underscore. A key that is itself a declared
/// filter is taken whole with `eq`.
fn parse_name_and_op<'a>(schema: &Schema, key: &'a str) -> (&'a str, &'a str) {
    if schema.collection_filters.contains_key(key) {
        return (key, ModifierType::Eq.as_str());
    }
    match key.rfind('_') {
        Some(index) if index > 0 => (&key[..index], &key[index + 1..]),
        _ => (key, ModifierType::Eq.as_str()),
    }
}

fn parse_filters(request: &ApiRequest, schema: &Schema) -> Vec<QueryCondition> {
    let mut conditions = Vec::new();
    for (key, values) in request.query.iter() {
        if key == "namespace" || key == "namespaces" {
            continue;
        }
        let (name, op) = parse_name_and_op(schema, key);
        let Some(filter) = schema.collection_filters.get(name) else {
            continue;
        };
        let Ok(modifier) = ModifierType::from_str(op) else {
            continue;
        };
        if filter.modifiers.contains(&modifier) {
            conditions.push(QueryCondition::new(name, modifier, values.clone()));
        }
    }
    conditions
}
