use crate::data::{Object, to_string};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModifierType {
    Eq,
    Ne,
    Null,
    NotNull,
    In,
    NotIn,
    Or,
    And,
}

impl ModifierType {
    pub const ALL: &'static [ModifierType] = &[
        ModifierType::Eq,
        ModifierType::Ne,
        ModifierType::Null,
        ModifierType::NotNull,
        ModifierType::In,
        ModifierType::NotIn,
        ModifierType::Or,
        ModifierType::And,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModifierType::Eq => "eq",
            ModifierType::Ne => "ne",
            ModifierType::Null => "null",
            ModifierType::NotNull => "notnull",
            ModifierType::In => "in",
            ModifierType::NotIn => "notin",
            ModifierType::Or => "or",
            ModifierType::And => "and",
        }
    }
}

impl FromStr for ModifierType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModifierType::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or(())
    }
}

/// One parsed filter: `field`, its modifier, and every value given for the key.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    pub field: String,
    pub modifier: ModifierType,
    pub values: Vec<String>,
}

impl QueryCondition {
    pub fn new(field: impl Into<String>, modifier: ModifierType, values: Vec<String>) -> Self {
        Self {
            field: field.into(),
            modifier,
            values,
        }
    }

    pub fn matches(&self, data: &Object) -> bool {
        let value = data.get(&self.field).filter(|v| !v.is_null());
        let rendered = value.map(to_string);
        let any_equal = || {
            rendered
                .as_deref()
                .is_some_and(|v| self.values.iter().any(|candidate| candidate == v))
        };
        match self.modifier {
            ModifierType::Eq | ModifierType::In | ModifierType::Or => any_equal(),
            ModifierType::Ne | ModifierType::NotIn => !any_equal(),
            ModifierType::And => rendered
                .as_deref()
                .is_some_and(|v| self.values.iter().all(|candidate| candidate == v)),
            ModifierType::Null => rendered.as_deref().is_none_or(str::is_empty),
            ModifierType::NotNull => rendered.as_deref().is_some_and(|v| !v.is_empty()),
        }
    }

    /// The wire form used in a collection's `filters` block.
    pub fn to_value(&self) -> Value {
        let mut data = Object::new();
        data.insert("modifier".into(), Value::from(self.modifier.as_str()));
        let value = match self.values.as_slice() {
            [single] => Value::from(single.clone()),
            many => Value::from(many.to_vec()),
        };
        data.insert("value".into(), value);
        Value::Object(data)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn reverse(&self) -> SortOrder {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sort {
    /// Empty means "sort by id".
    pub name: String,
    pub order: SortOrder,
}

/// Page request and, once applied, the computed cursors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub marker: String,
    pub total: Option<i64>,
    pub first: Option<String>,
    pub previous: Option<String>,
    pub next: Option<String>,
    pub last: Option<String>,
    pub partial: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub sort: Sort,
    pub pagination: Pagination,
    pub conditions: Vec<QueryCondition>,
    /// Raw `_`-prefixed options such as `_replace`.
    pub options: BTreeMap<String, String>,
}

impl QueryOptions {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    pub fn matches(&self, data: &Object) -> bool {
        self.conditions.iter().all(|c| c.matches(data))
    }
}
