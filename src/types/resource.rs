use crate::data::Object;
use crate::types::schema::Schema;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// The wire envelope of one resource, built fresh for every response.
#[derive(Debug, Clone)]
pub struct RawResource {
    pub id: String,
    pub type_name: String,
    pub schema: Arc<Schema>,
    pub links: BTreeMap<String, String>,
    pub actions: BTreeMap<String, String>,
    /// Render actions under `actionLinks` instead of `actions`.
    pub action_links: bool,
    pub values: Object,
}

impl RawResource {
    pub fn new(schema: Arc<Schema>, id: impl Into<String>, values: Object) -> Self {
        Self {
            id: id.into(),
            type_name: schema.id.clone(),
            schema,
            links: BTreeMap::new(),
            actions: BTreeMap::new(),
            action_links: false,
            values,
        }
    }

    pub fn to_object(&self) -> Object {
        let mut data = self.values.clone();
        if !self.id.is_empty() {
            data.insert("id".into(), Value::from(self.id.clone()));
        }
        data.insert("type".into(), Value::from(self.type_name.clone()));
        data.insert("links".into(), string_map(&self.links));
        let key = if self.action_links { "actionLinks" } else { "actions" };
        data.insert(key.into(), string_map(&self.actions));
        data
    }
}

fn string_map(values: &BTreeMap<String, String>) -> Value {
    Value::Object(
        values
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_links_header_renames_key() {
        let schema = Arc::new(Schema::new("widget"));
        let mut resource = RawResource::new(schema, "w1", Object::new());
        resource
            .actions
            .insert("restart".into(), "http://x/w1?action=restart".into());
        let data = resource.to_object();
        assert_eq!(data["id"], "w1");
        assert_eq!(data["type"], "widget");
        assert_eq!(data["actions"]["restart"], json!("http://x/w1?action=restart"));

        resource.action_links = true;
        let data = resource.to_object();
        assert!(data.get("actions").is_none());
        assert!(data.get("actionLinks").is_some());
    }
}
