use crate::error::{Result, StackError};
use crate::event::Event;
use crate::template::ResourceDefinition;
use crate::types::{Action, ResourceStatus, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub resource_type: String,
    /// Empty until the resource is created.
    #[serde(default)]
    pub physical_resource_id: String,
    pub status: ResourceStatus,
    #[serde(default)]
    pub status_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub required_by: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Resource {
    pub fn new(name: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            physical_resource_id: String::new(),
            status: ResourceStatus::init(),
            status_reason: String::new(),
            description: None,
            properties: Value::Object(Default::default()),
            metadata: Value::Object(Default::default()),
            depends_on: Vec::new(),
            required_by: Vec::new(),
            created_at: None,
            updated_at: None,
        }
    }

    pub fn from_definition(def: &ResourceDefinition) -> Self {
        let mut r = Self::new(&def.name, &def.resource_type);
        r.description = def.description.clone();
        r.properties = def.properties.clone();
        r.metadata = def.metadata.clone();
        r
    }

    pub fn logical_resource_id(&self) -> &str {
        &self.name
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Mutable access to the metadata object, replacing a non-object value.
    pub fn metadata_mut(&mut self) -> &mut serde_json::Map<String, Value> {
        if !self.metadata.is_object() {
            self.metadata = Value::Object(Default::default());
        }
        match &mut self.metadata {
            Value::Object(m) => m,
            _ => unreachable!("metadata was just replaced with an object"),
        }
    }

    /// Completed creation, possibly followed by a later completed action
    /// such as a scaling update.
    pub fn is_created(&self) -> bool {
        self.status.status == Status::Complete
            && !matches!(self.status.action, Action::Init | Action::Delete)
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ResourceStatus::new(Action::Delete, Status::Complete)
    }

    /// Move to `(action, status)` and return the event recording it.
    ///
    /// An action may only be completed or failed while it is in progress, a
    /// new action may not start while a different one is in progress (delete
    /// excepted), and nothing leaves `DELETE_COMPLETE`.
    pub fn transition(
        &mut self,
        action: Action,
        status: Status,
        reason: impl Into<String>,
    ) -> Result<Event> {
        let to = ResourceStatus::new(action, status);
        check_transition(self.status, to)?;

        let now = Utc::now();
        if to == ResourceStatus::new(Action::Create, Status::InProgress) {
            self.created_at = Some(now);
        }
        self.status = to;
        self.status_reason = reason.into();
        self.updated_at = Some(now);

        tracing::debug!(resource = %self.name, status = %to, "resource status changed");
        Ok(self.event(to, self.status_reason.clone()))
    }

    /// An event for this resource without changing its status.
    pub fn event(&self, status: ResourceStatus, reason: impl Into<String>) -> Event {
        Event::new(
            &self.name,
            &self.physical_resource_id,
            &self.resource_type,
            status,
            reason,
            self.properties.clone(),
        )
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

fn check_transition(from: ResourceStatus, to: ResourceStatus) -> Result<()> {
    let reject = |reason: &str| {
        Err(StackError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
        })
    };

    if from == ResourceStatus::new(Action::Delete, Status::Complete) {
        return reject("resource is deleted");
    }
    match to.status {
        Status::InProgress => {
            if from.is_in_progress() && from.action != to.action && to.action != Action::Delete {
                return reject("another action is in progress");
            }
        }
        Status::Complete | Status::Failed => {
            if !(from.is_in_progress() && from.action == to.action) {
                return reject("action was not started");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_lifecycle() {
        let mut r = Resource::new("WebServer", "AWS::EC2::Instance");
        assert_eq!(r.status.to_string(), "INIT_COMPLETE");
        assert!(r.created_at.is_none());

        let ev = r
            .transition(Action::Create, Status::InProgress, "state changed")
            .unwrap();
        assert_eq!(ev.resource_status.to_string(), "CREATE_IN_PROGRESS");
        assert!(r.created_at.is_some());

        r.transition(Action::Create, Status::Complete, "state changed")
            .unwrap();
        assert_eq!(r.status.to_string(), "CREATE_COMPLETE");
        assert_eq!(r.status_reason, "state changed");
    }

    #[test]
    fn cannot_complete_unstarted_action() {
        let mut r = Resource::new("a", "T");
        let err = r.transition(Action::Create, Status::Complete, "").unwrap_err();
        assert!(matches!(err, StackError::InvalidTransition { .. }));
    }

    #[test]
    fn cannot_start_update_during_create() {
        let mut r = Resource::new("a", "T");
        r.transition(Action::Create, Status::InProgress, "").unwrap();
        assert!(r.transition(Action::Update, Status::InProgress, "").is_err());
        r.transition(Action::Delete, Status::InProgress, "").unwrap();
    }

    #[test]
    fn deleted_is_terminal() {
        let mut r = Resource::new("a", "T");
        r.transition(Action::Delete, Status::InProgress, "").unwrap();
        r.transition(Action::Delete, Status::Complete, "").unwrap();
        assert!(r.is_deleted());
        assert!(r.transition(Action::Create, Status::InProgress, "").is_err());
    }

    #[test]
    fn metadata_mut_replaces_non_object() {
        let mut r = Resource::new("a", "T");
        r.metadata = Value::Null;
        r.metadata_mut().insert("k".into(), Value::from(1));
        assert_eq!(r.metadata["k"], 1);
    }
}
