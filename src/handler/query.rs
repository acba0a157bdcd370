use crate::data::{Object, to_string};
use crate::types::{Pagination, QueryCondition, QueryOptions, Sort, SortOrder};

/// Conditions, then sort, then paging. The returned pagination is `None`
/// when no limit was requested.
pub fn apply_query(objects: Vec<Object>, opts: &QueryOptions) -> (Vec<Object>, Option<Pagination>) {
    let mut objects = apply_conditions(objects, &opts.conditions);
    apply_sort(&mut objects, &opts.sort);
    apply_pagination(objects, &opts.pagination)
}

pub fn apply_conditions(objects: Vec<Object>, conditions: &[QueryCondition]) -> Vec<Object> {
    objects
        .into_iter()
        .filter(|object| conditions.iter().all(|c| c.matches(object)))
        .collect()
}

/// Stable string ordering on the sort field, `id` when unset.
pub fn apply_sort(objects: &mut [Object], sort: &Sort) {
    let name = if sort.name.is_empty() { "id" } else { sort.name.as_str() };
    let key = |object: &Object| object.get(name).map(to_string).unwrap_or_default();
    objects.sort_by(|left, right| {
        let ordering = key(left).cmp(&key(right));
        match sort.order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

fn id_at(objects: &[Object], index: usize) -> Option<String> {
    objects
        .get(index)
        .and_then(|o| o.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

pub fn apply_pagination(objects: Vec<Object>, request: &Pagination) -> (Vec<Object>, Option<Pagination>) {
    let Some(limit) = request.limit else {
        return (objects, None);
    };
    let limit = limit.max(0) as usize;
    let total = objects.len();
    let mut pagination = Pagination {
        limit: Some(limit as i64),
        marker: request.marker.clone(),
        total: Some(total as i64),
        ..Default::default()
    };
    if objects.is_empty() {
        return (objects, Some(pagination));
    }

    let start = if request.marker.is_empty() {
        0
    } else {
        objects
            .iter()
            .position(|o| o.get("id").and_then(|v| v.as_str()) == Some(request.marker.as_str()))
            .unwrap_or(0)
    };
    let previous = start.saturating_sub(limit);
    let next = start.saturating_add(limit).min(total);

    if previous < start {
        pagination.previous = id_at(&objects, previous);
    }
    if next > start && next < total {
        pagination.next = id_at(&objects, next);
    }
    pagination.partial = start > 0 || next < total;
    if pagination.partial {
        pagination.first = id_at(&objects, 0);
        match total.checked_sub(limit) {
            Some(last) if last > 0 => pagination.last = id_at(&objects, last),
            _ => {}
        }
    }

    let page = objects.into_iter().skip(start).take(next - start).collect();
    (page, Some(pagination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ModifierType;
    use serde_json::{Value, json};

    fn items(n: usize) -> Vec<Object> {
        (0..n)
            .map(|i| {
                json!({"id": format!("item{:02}", i), "state": if i % 2 == 0 { "active" } else { "removing" }})
                    .as_object()
                    .cloned()
                    .expect("object")
            })
            .collect()
    }

    fn ids(objects: &[Object]) -> Vec<&str> {
        objects.iter().map(|o| o["id"].as_str().unwrap_or_default()).collect()
    }

    #[test]
    fn page_from_marker() {
        let pagination = Pagination {
            limit: Some(3),
            marker: "item03".into(),
            ..Default::default()
        };
        let (page, pagination) = apply_pagination(items(10), &pagination);
        let pagination = pagination.expect("pagination");
        assert_eq!(ids(&page), vec!["item03", "item04", "item05"]);
        assert!(pagination.partial);
        assert_eq!(pagination.previous.as_deref(), Some("item00"));
        assert_eq!(pagination.next.as_deref(), Some("item06"));
        assert_eq!(pagination.first.as_deref(), Some("item00"));
        assert_eq!(pagination.last.as_deref(), Some("item07"));
        assert_eq!(pagination.total, Some(10));
    }

    #[test]
    fn last_page_has_no_next() {
        let pagination = Pagination {
            limit: Some(4),
            marker: "item08".into(),
            ..Default::default()
        };
        let (page, pagination) = apply_pagination(items(10), &pagination);
        let pagination = pagination.expect("pagination");
        assert_eq!(ids(&page), vec!["item08", "item09"]);
        assert!(pagination.next.is_none());
        assert!(pagination.partial);
    }

    #[test]
    fn full_page_is_not_partial() {
        let pagination = Pagination {
            limit: Some(100),
            marker: "unknown".into(),
            ..Default::default()
        };
        let (page, pagination) = apply_pagination(items(5), &pagination);
        let pagination = pagination.expect("pagination");
        assert_eq!(page.len(), 5);
        assert!(!pagination.partial);
        assert!(pagination.previous.is_none() && pagination.first.is_none());
    }

    #[test]
    fn huge_limit_after_a_marker_takes_the_rest() {
        let pagination = Pagination {
            limit: Some(i64::MAX),
            marker: "item02".into(),
            ..Default::default()
        };
        let (page, pagination) = apply_pagination(items(5), &pagination);
        let pagination = pagination.expect("pagination");
        assert_eq!(ids(&page), vec!["item02", "item03", "item04"]);
        assert!(pagination.next.is_none());
        assert!(pagination.last.is_none());
        assert_eq!(pagination.previous.as_deref(), Some("item00"));
    }

    #[test]
    fn no_limit_returns_everything() {
        let (page, pagination) = apply_pagination(items(5), &Pagination::default());
        assert_eq!(page.len(), 5);
        assert!(pagination.is_none());
    }

    #[test]
    fn sort_is_stable_in_both_directions() {
        let mut objects = items(4);
        let sort = Sort {
            name: "state".into(),
            order: SortOrder::Asc,
        };
        apply_sort(&mut objects, &sort);
        assert_eq!(ids(&objects), vec!["item00", "item02", "item01", "item03"]);

        let sort = Sort {
            name: String::new(),
            order: SortOrder::Desc,
        };
        apply_sort(&mut objects, &sort);
        assert_eq!(ids(&objects), vec!["item03", "item02", "item01", "item00"]);
    }

    #[test]
    fn conditions_filter_before_paging() {
        let opts = QueryOptions {
            conditions: vec![QueryCondition::new("state", ModifierType::Ne, vec!["removing".into()])],
            pagination: Pagination {
                limit: Some(2),
                ..Default::default()
            },
            ..Default::default()
        };
        let (page, pagination) = apply_query(items(6), &opts);
        assert_eq!(ids(&page), vec!["item00", "item02"]);
        assert_eq!(pagination.expect("pagination").total, Some(3));
        assert!(page.iter().all(|o| o["state"] == Value::from("active")));
    }
}
