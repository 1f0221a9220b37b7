use crate::error::{Result, StackError};
use crate::event::Event;
use crate::identity::StackKey;
use crate::paths;
use crate::resource::Resource;
use crate::types::{Action, ResourceStatus, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ParentRef
// ---------------------------------------------------------------------------

/// Back-reference from a nested stack to the resource that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentRef {
    pub stack_id: String,
    pub resource_name: String,
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stack {
    pub tenant_id: String,
    pub stack_name: String,
    pub stack_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ResourceStatus,
    #[serde(default)]
    pub status_reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
    /// Nesting level; 0 for a top-level stack.
    #[serde(default)]
    pub depth: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Kept in dependency order.
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Stack {
    pub fn new(tenant_id: impl Into<String>, stack_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            stack_name: stack_name.into(),
            stack_id: uuid::Uuid::new_v4().to_string(),
            description: None,
            status: ResourceStatus::init(),
            status_reason: String::new(),
            parent: None,
            depth: 0,
            created_at: now,
            updated_at: now,
            resources: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn key(&self) -> StackKey {
        StackKey::new(&self.tenant_id, &self.stack_name, &self.stack_id)
    }

    // ---------------------------------------------------------------------------
    // Persistence
    // ---------------------------------------------------------------------------

    pub fn load(root: &Path, tenant_id: &str, stack_id: &str) -> Result<Self> {
        let manifest = paths::stack_manifest(root, tenant_id, stack_id);
        if !manifest.exists() {
            return Err(StackError::StackNotFound(stack_id.to_string()));
        }
        crate::io::read_yaml(&manifest)
    }

    /// Load the stack named by `key`, requiring both name and id to match.
    pub fn lookup(root: &Path, key: &StackKey) -> Result<Self> {
        key.validate()?;
        let stack = Self::load(root, &key.tenant_id, &key.stack_id)
            .map_err(|e| match e {
                StackError::StackNotFound(_) => StackError::StackNotFound(key.to_string()),
                other => other,
            })?;
        if stack.stack_name != key.stack_name {
            return Err(StackError::StackNotFound(key.to_string()));
        }
        Ok(stack)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::stack_manifest(root, &self.tenant_id, &self.stack_id);
        crate::io::write_yaml(&path, self)
    }

    pub fn remove(root: &Path, tenant_id: &str, stack_id: &str) -> Result<()> {
        crate::io::remove_dir_if_exists(&paths::stack_dir(root, tenant_id, stack_id))
    }

    /// All stacks of a tenant, nested ones included, oldest first.
    pub fn list(root: &Path, tenant_id: &str) -> Result<Vec<Self>> {
        let dir = paths::tenant_stacks_dir(root, tenant_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut stacks = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let manifest = entry.path().join(paths::MANIFEST_FILE);
            if manifest.exists() {
                stacks.push(crate::io::read_yaml::<Stack>(&manifest)?);
            }
        }
        stacks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(stacks)
    }

    pub fn find_by_name(root: &Path, tenant_id: &str, stack_name: &str) -> Result<Option<Self>> {
        Ok(Self::list(root, tenant_id)?
            .into_iter()
            .find(|s| s.stack_name == stack_name))
    }

    // ---------------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------------

    pub fn resource(&self, name: &str) -> Result<&Resource> {
        self.resources
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| self.resource_not_found(name))
    }

    pub fn resource_mut(&mut self, name: &str) -> Result<&mut Resource> {
        let stack = self.key().to_string();
        self.resources
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| StackError::ResourceNotFound {
                stack,
                resource: name.to_string(),
            })
    }

    fn resource_not_found(&self, name: &str) -> StackError {
        StackError::ResourceNotFound {
            stack: self.key().to_string(),
            resource: name.to_string(),
        }
    }

    /// Append a resource; logical ids are unique within a stack.
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        if self.resources.iter().any(|r| r.name == resource.name) {
            return Err(StackError::DuplicateResource(resource.name));
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Transition one resource and append the resulting event.
    pub fn set_resource_state(
        &mut self,
        name: &str,
        action: Action,
        status: Status,
        reason: impl Into<String>,
    ) -> Result<()> {
        let event = self.resource_mut(name)?.transition(action, status, reason)?;
        self.record(event);
        Ok(())
    }

    pub fn record(&mut self, event: Event) {
        self.events.push(event);
        self.updated_at = Utc::now();
    }

    pub fn set_status(&mut self, action: Action, status: Status, reason: impl Into<String>) {
        self.status = ResourceStatus::new(action, status);
        self.status_reason = reason.into();
        self.updated_at = Utc::now();
    }

    /// Roll resource states up into the stack status while a create is
    /// running. Any failure fails the stack and anything still pending keeps
    /// it in progress. A resource that completed a later action (a scaling
    /// group after an adjustment) counts as created.
    pub fn refresh_create_status(&mut self) {
        if self.status.action != Action::Create {
            return;
        }
        let failed = Status::Failed;
        if let Some(r) = self
            .resources
            .iter()
            .find(|r| r.status == ResourceStatus::new(Action::Create, failed))
        {
            let reason = format!("Resource CREATE failed: {}", r.status_reason);
            if self.status.status != failed || self.status_reason != reason {
                self.set_status(Action::Create, failed, reason);
            }
            return;
        }
        if self.resources.iter().all(Resource::is_created) {
            if self.status.status != Status::Complete {
                self.set_status(
                    Action::Create,
                    Status::Complete,
                    "Stack CREATE completed successfully",
                );
            }
        } else if self.status.status != Status::InProgress {
            self.set_status(Action::Create, Status::InProgress, "Stack CREATE started");
        }
    }

    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn save_load_and_lookup() {
        let dir = TempDir::new().unwrap();
        let mut stack = Stack::new("t1", "web");
        stack.add_resource(Resource::new("WebServer", "AWS::EC2::Instance")).unwrap();
        stack.save(dir.path()).unwrap();

        let loaded = Stack::lookup(dir.path(), &stack.key()).unwrap();
        assert_eq!(loaded.resources.len(), 1);
        assert_eq!(loaded.resource("WebServer").unwrap().resource_type, "AWS::EC2::Instance");
    }

    #[test]
    fn lookup_with_wrong_name_is_not_found() {
        let dir = TempDir::new().unwrap();
        let stack = Stack::new("t1", "web");
        stack.save(dir.path()).unwrap();

        let key = StackKey::new("t1", "other", &stack.stack_id);
        assert!(matches!(
            Stack::lookup(dir.path(), &key),
            Err(StackError::StackNotFound(_))
        ));
    }

    #[test]
    fn lookup_in_other_tenant_is_not_found() {
        let dir = TempDir::new().unwrap();
        let stack = Stack::new("t1", "web");
        stack.save(dir.path()).unwrap();

        let key = StackKey::new("t2", "web", &stack.stack_id);
        assert!(matches!(
            Stack::lookup(dir.path(), &key),
            Err(StackError::StackNotFound(_))
        ));
    }

    #[test]
    fn duplicate_resource_rejected() {
        let mut stack = Stack::new("t1", "web");
        stack.add_resource(Resource::new("a", "T")).unwrap();
        assert!(matches!(
            stack.add_resource(Resource::new("a", "T")),
            Err(StackError::DuplicateResource(_))
        ));
    }

    #[test]
    fn set_resource_state_appends_event() {
        let mut stack = Stack::new("t1", "web");
        stack.add_resource(Resource::new("a", "T")).unwrap();
        stack
            .set_resource_state("a", Action::Create, Status::InProgress, "state changed")
            .unwrap();
        assert_eq!(stack.events.len(), 1);
        assert_eq!(stack.events[0].resource_status.to_string(), "CREATE_IN_PROGRESS");
        assert!(stack
            .set_resource_state("missing", Action::Create, Status::InProgress, "")
            .is_err());
    }

    #[test]
    fn list_and_find_by_name() {
        let dir = TempDir::new().unwrap();
        Stack::new("t1", "first").save(dir.path()).unwrap();
        Stack::new("t1", "second").save(dir.path()).unwrap();
        Stack::new("t2", "third").save(dir.path()).unwrap();

        let names: Vec<_> = Stack::list(dir.path(), "t1")
            .unwrap()
            .into_iter()
            .map(|s| s.stack_name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"first".to_string()));
        assert!(Stack::find_by_name(dir.path(), "t1", "third").unwrap().is_none());
        assert!(Stack::list(dir.path(), "nobody").unwrap().is_empty());
    }

    #[test]
    fn refresh_create_status_rolls_up() {
        let mut stack = Stack::new("t1", "web");
        stack.set_status(Action::Create, Status::InProgress, "Stack CREATE started");
        stack.add_resource(Resource::new("a", "T")).unwrap();
        stack
            .set_resource_state("a", Action::Create, Status::InProgress, "")
            .unwrap();
        stack.refresh_create_status();
        assert_eq!(stack.status.to_string(), "CREATE_IN_PROGRESS");

        stack
            .set_resource_state("a", Action::Create, Status::Complete, "")
            .unwrap();
        stack.refresh_create_status();
        assert_eq!(stack.status.to_string(), "CREATE_COMPLETE");
    }
}
