use super::Mapper;
use crate::data::{Object, get_value};
use crate::error::Result;
use crate::types::{Schema, Schemas};
use serde_json::Value;

/// Reports `active` objects without status conditions as `pending`.
pub struct PendingStatus;

impl Mapper for PendingStatus {
    fn from_internal(&self, data: &mut Object) {
        if data.get("state").and_then(Value::as_str) != Some("active") {
            return;
        }
        let has_conditions = get_value(data, &["status", "conditions"])
            .and_then(Value::as_array)
            .is_some_and(|conditions| !conditions.is_empty());
        if !has_conditions {
            data.insert("state".into(), Value::from("pending"));
        }
    }

    fn to_internal(&self, _data: &mut Object) -> Result<()> {
        Ok(())
    }

    fn modify_schema(&self, _schema: &mut Schema, _schemas: &Schemas) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapper::testing::{assert_round_trip_stable, obj};
    use serde_json::json;

    #[test]
    fn active_without_conditions_is_pending() {
        let mut data = obj(json!({"state": "active"}));
        PendingStatus.from_internal(&mut data);
        assert_eq!(data["state"], "pending");

        let mut data = obj(json!({"state": "active", "status": {"conditions": [{"type": "Ready"}]}}));
        PendingStatus.from_internal(&mut data);
        assert_eq!(data["state"], "active");

        let mut data = obj(json!({"state": "removing"}));
        PendingStatus.from_internal(&mut data);
        assert_eq!(data["state"], "removing");

        assert_round_trip_stable(&PendingStatus, obj(json!({"state": "active"})));
    }
}
