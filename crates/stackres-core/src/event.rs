use crate::types::ResourceStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in a stack's append-only event log. Every resource status
/// transition and every applied signal records one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub resource_name: String,
    pub logical_resource_id: String,
    pub physical_resource_id: String,
    pub resource_type: String,
    pub resource_status: ResourceStatus,
    pub resource_status_reason: String,
    pub event_time: DateTime<Utc>,
    #[serde(default)]
    pub resource_properties: Value,
}

impl Event {
    pub fn new(
        resource_name: &str,
        physical_resource_id: &str,
        resource_type: &str,
        status: ResourceStatus,
        reason: impl Into<String>,
        properties: Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resource_name: resource_name.to_string(),
            logical_resource_id: resource_name.to_string(),
            physical_resource_id: physical_resource_id.to_string(),
            resource_type: resource_type.to_string(),
            resource_status: status,
            resource_status_reason: reason.into(),
            event_time: Utc::now(),
            resource_properties: properties,
        }
    }
}

/// Events for one resource, oldest first.
pub fn for_resource<'a>(events: &'a [Event], resource_name: &str) -> Vec<&'a Event> {
    events
        .iter()
        .filter(|e| e.resource_name == resource_name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Status};

    #[test]
    fn new_event_fills_identifiers() {
        let e = Event::new(
            "EventTestResource",
            "wibble",
            "GenericResourceType",
            ResourceStatus::new(Action::Create, Status::InProgress),
            "Testing",
            serde_json::json!({ "Foo": "goo" }),
        );
        assert_eq!(e.logical_resource_id, "EventTestResource");
        assert_eq!(e.physical_resource_id, "wibble");
        assert_eq!(e.resource_status.to_string(), "CREATE_IN_PROGRESS");
        assert_eq!(e.resource_properties["Foo"], "goo");
        assert!(!e.id.is_empty());
    }

    #[test]
    fn filter_by_resource_keeps_order() {
        let st = ResourceStatus::init();
        let events = vec![
            Event::new("a", "", "T", st, "1", Value::Null),
            Event::new("b", "", "T", st, "2", Value::Null),
            Event::new("a", "", "T", st, "3", Value::Null),
        ];
        let reasons: Vec<_> = for_resource(&events, "a")
            .iter()
            .map(|e| e.resource_status_reason.as_str())
            .collect();
        assert_eq!(reasons, vec!["1", "3"]);
    }
}
