//! Read-side views of stacks, resources and events.

use crate::error::{Result, StackError};
use crate::event::{self, Event};
use crate::identity::{ResourceKey, StackKey};
use crate::paths;
use crate::registry;
use crate::resource::Resource;
use crate::stack::Stack;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;

// ---------------------------------------------------------------------------
// List options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub nested_depth: u32,
    pub with_detail: bool,
}

impl ListOptions {
    /// Parse raw query-string values. `nested_depth` is capped at
    /// `max_depth`.
    pub fn parse(nested_depth: Option<&str>, with_detail: Option<&str>, max_depth: u32) -> Result<Self> {
        let nested_depth = match nested_depth {
            None => 0,
            Some(raw) => parse_depth(raw)?.min(max_depth),
        };
        let with_detail = match with_detail {
            None => false,
            Some(raw) => parse_bool("with_detail", raw)?,
        };
        Ok(Self {
            nested_depth,
            with_detail,
        })
    }
}

fn parse_depth(raw: &str) -> Result<u32> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| StackError::InvalidParameter {
            name: "nested_depth".into(),
            reason: format!("'{raw}' is not a non-negative integer"),
        })
}

pub fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(StackError::InvalidParameter {
            name: name.to_string(),
            reason: format!("'{raw}' is not a boolean"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub href: String,
    pub rel: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceView {
    pub resource_name: String,
    pub logical_resource_id: String,
    pub physical_resource_id: String,
    pub resource_type: String,
    pub resource_status: String,
    pub resource_status_reason: String,
    pub creation_time: Option<DateTime<Utc>>,
    pub updated_time: Option<DateTime<Utc>>,
    pub required_by: Vec<String>,
    pub links: Vec<Link>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Vec<ResourceView>>,
}

impl ResourceView {
    fn summary(stack: &Stack, r: &Resource, child: Option<&Stack>) -> Self {
        let key = stack.key().resource(&r.name);
        let mut links = vec![
            Link {
                href: key.url(),
                rel: "self",
            },
            Link {
                href: stack.key().url(),
                rel: "stack",
            },
        ];
        if let Some(child) = child {
            links.push(Link {
                href: child.key().url(),
                rel: "nested",
            });
        }
        Self {
            resource_name: r.name.clone(),
            logical_resource_id: r.logical_resource_id().to_string(),
            physical_resource_id: r.physical_resource_id.clone(),
            resource_type: r.resource_type.clone(),
            resource_status: r.status.to_string(),
            resource_status_reason: r.status_reason.clone(),
            creation_time: r.created_at,
            updated_time: r.updated_at,
            required_by: r.required_by.clone(),
            links,
            description: None,
            metadata: None,
            properties: None,
            depends_on: None,
            resources: None,
        }
    }

    fn detailed(stack: &Stack, r: &Resource, child: Option<&Stack>) -> Self {
        Self {
            description: Some(r.description.clone().unwrap_or_default()),
            metadata: Some(r.metadata.clone()),
            properties: Some(r.properties.clone()),
            depends_on: Some(r.depends_on.clone()),
            ..Self::summary(stack, r, child)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StackView {
    pub stack_name: String,
    pub id: String,
    pub stack_status: String,
    pub stack_status_reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creation_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub links: Vec<Link>,
}

impl StackView {
    pub fn new(stack: &Stack) -> Self {
        Self {
            stack_name: stack.stack_name.clone(),
            id: stack.stack_id.clone(),
            stack_status: stack.status.to_string(),
            stack_status_reason: stack.status_reason.clone(),
            description: stack.description.clone(),
            creation_time: stack.created_at,
            updated_time: stack.updated_at,
            parent: stack.parent.as_ref().map(|p| p.stack_id.clone()),
            links: vec![Link {
                href: stack.key().url(),
                rel: "self",
            }],
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub fn resource_metadata(root: &Path, key: &ResourceKey) -> Result<Value> {
    key.validate()?;
    let stack = Stack::lookup(root, &key.stack)?;
    Ok(stack.resource(&key.resource_name)?.metadata.clone())
}

pub fn show_resource(root: &Path, key: &ResourceKey) -> Result<ResourceView> {
    key.validate()?;
    let stack = Stack::lookup(root, &key.stack)?;
    let resource = stack.resource(&key.resource_name)?;
    let child = load_child(root, &stack, resource)?;
    Ok(ResourceView::detailed(&stack, resource, child.as_ref()))
}

/// Resources of a stack in dependency order, expanding nested stacks down
/// to `opts.nested_depth` levels.
pub fn list_resources(root: &Path, key: &StackKey, opts: ListOptions) -> Result<Vec<ResourceView>> {
    let stack = Stack::lookup(root, key)?;
    collect(root, &stack, opts, 0)
}

fn collect(root: &Path, stack: &Stack, opts: ListOptions, level: u32) -> Result<Vec<ResourceView>> {
    let mut views = Vec::with_capacity(stack.resources.len());
    for r in &stack.resources {
        let child = load_child(root, stack, r)?;
        let mut view = if opts.with_detail {
            ResourceView::detailed(stack, r, child.as_ref())
        } else {
            ResourceView::summary(stack, r, child.as_ref())
        };
        if let Some(child) = child.filter(|_| level < opts.nested_depth) {
            view.resources = Some(collect(root, &child, opts, level + 1)?);
        }
        views.push(view);
    }
    Ok(views)
}

/// The child stack a nested-stack resource owns; `None` for other types,
/// before creation, or once the child was deleted on its own.
fn load_child(root: &Path, stack: &Stack, r: &Resource) -> Result<Option<Stack>> {
    if !registry::lookup(&r.resource_type).nested || r.physical_resource_id.is_empty() {
        return Ok(None);
    }
    match Stack::load(root, &stack.tenant_id, &r.physical_resource_id) {
        Ok(child) => Ok(Some(child)),
        Err(StackError::StackNotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

pub fn show_stack(root: &Path, key: &StackKey) -> Result<StackView> {
    Ok(StackView::new(&Stack::lookup(root, key)?))
}

/// A tenant's stacks, oldest first. Nested stacks are left out unless
/// `show_nested` is set.
pub fn list_stacks(root: &Path, tenant_id: &str, show_nested: bool) -> Result<Vec<StackView>> {
    paths::validate_tenant_id(tenant_id)?;
    Ok(Stack::list(root, tenant_id)?
        .iter()
        .filter(|s| show_nested || !s.is_nested())
        .map(StackView::new)
        .collect())
}

/// Canonical key of a stack found by name.
pub fn find_stack(root: &Path, tenant_id: &str, stack_name: &str) -> Result<StackKey> {
    paths::validate_tenant_id(tenant_id)?;
    paths::validate_stack_name(stack_name)?;
    Stack::find_by_name(root, tenant_id, stack_name)?
        .map(|s| s.key())
        .ok_or_else(|| StackError::StackNotFound(stack_name.to_string()))
}

pub fn list_events(root: &Path, key: &StackKey) -> Result<Vec<Event>> {
    Ok(Stack::lookup(root, key)?.events)
}

pub fn list_resource_events(root: &Path, key: &ResourceKey) -> Result<Vec<Event>> {
    key.validate()?;
    let stack = Stack::lookup(root, &key.stack)?;
    stack.resource(&key.resource_name)?;
    Ok(event::for_resource(&stack.events, &key.resource_name)
        .into_iter()
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::lifecycle;
    use crate::template::Template;
    use tempfile::TempDir;

    const NESTED: &str = r#"
Resources:
  db:
    Type: AWS::RDS::DBInstance
    Metadata: {role: primary}
  app:
    Type: AWS::CloudFormation::Stack
    DependsOn: db
    Properties:
      Template:
        Resources:
          server: {Type: AWS::EC2::Instance}
          inner:
            Type: AWS::CloudFormation::Stack
            Properties:
              Template:
                Resources:
                  leaf: {Type: AWS::EC2::Instance}
"#;

    fn setup() -> (TempDir, Stack) {
        let dir = TempDir::new().unwrap();
        let cfg = Config::new("test");
        let tmpl = Template::parse(NESTED).unwrap();
        let stack = lifecycle::create_stack(dir.path(), &cfg, "t1", "web", &tmpl).unwrap();
        (dir, stack)
    }

    fn opts(depth: u32, detail: bool) -> ListOptions {
        ListOptions {
            nested_depth: depth,
            with_detail: detail,
        }
    }

    #[test]
    fn parse_list_options() {
        assert_eq!(ListOptions::parse(None, None, 5).unwrap(), ListOptions::default());
        let o = ListOptions::parse(Some("9"), Some("Yes"), 5).unwrap();
        assert_eq!(o, opts(5, true));
        assert!(ListOptions::parse(Some("-1"), None, 5).is_err());
        assert!(ListOptions::parse(Some("two"), None, 5).is_err());
        assert!(ListOptions::parse(None, Some("maybe"), 5).is_err());
    }

    #[test]
    fn depth_zero_has_no_nested_resources() {
        let (dir, stack) = setup();
        let views = list_resources(dir.path(), &stack.key(), opts(0, false)).unwrap();
        let names: Vec<_> = views.iter().map(|v| v.resource_name.as_str()).collect();
        assert_eq!(names, vec!["db", "app"]);
        assert!(views.iter().all(|v| v.resources.is_none()));
        assert!(views.iter().all(|v| v.metadata.is_none()));

        let json = serde_json::to_value(&views).unwrap();
        assert!(json[1].get("resources").is_none());
    }

    #[test]
    fn depth_expands_one_level_at_a_time() {
        let (dir, stack) = setup();
        let views = list_resources(dir.path(), &stack.key(), opts(1, false)).unwrap();
        let app = &views[1];
        let nested = app.resources.as_ref().unwrap();
        assert_eq!(nested.len(), 2);
        assert!(nested.iter().all(|v| v.resources.is_none()));

        let views = list_resources(dir.path(), &stack.key(), opts(2, false)).unwrap();
        let inner = &views[1].resources.as_ref().unwrap()[1];
        assert_eq!(inner.resource_name, "inner");
        assert_eq!(inner.resources.as_ref().unwrap()[0].resource_name, "leaf");
    }

    #[test]
    fn detail_adds_fields() {
        let (dir, stack) = setup();
        let views = list_resources(dir.path(), &stack.key(), opts(0, true)).unwrap();
        assert_eq!(views[0].metadata.as_ref().unwrap()["role"], "primary");
        assert_eq!(views[1].depends_on.as_ref().unwrap(), &vec!["db".to_string()]);
        assert_eq!(views[0].required_by, vec!["app"]);
    }

    #[test]
    fn nested_resource_links_to_child_stack() {
        let (dir, stack) = setup();
        let views = list_resources(dir.path(), &stack.key(), opts(0, false)).unwrap();
        let rels: Vec<_> = views[1].links.iter().map(|l| l.rel).collect();
        assert_eq!(rels, vec!["self", "stack", "nested"]);
        assert!(views[1].links[2].href.contains(&views[1].physical_resource_id));
        assert_eq!(views[0].links.len(), 2);
    }

    #[test]
    fn show_and_metadata() {
        let (dir, stack) = setup();
        let key = stack.key().resource("db");
        let view = show_resource(dir.path(), &key).unwrap();
        assert_eq!(view.resource_status, "CREATE_COMPLETE");
        assert_eq!(view.logical_resource_id, "db");
        assert_eq!(resource_metadata(dir.path(), &key).unwrap()["role"], "primary");

        let missing = stack.key().resource("nope");
        assert!(matches!(
            show_resource(dir.path(), &missing),
            Err(StackError::ResourceNotFound { .. })
        ));
    }

    #[test]
    fn stacks_and_events() {
        let (dir, stack) = setup();
        assert_eq!(list_stacks(dir.path(), "t1", false).unwrap().len(), 1);
        assert_eq!(list_stacks(dir.path(), "t1", true).unwrap().len(), 3);
        assert_eq!(find_stack(dir.path(), "t1", "web").unwrap(), stack.key());

        let events = list_resource_events(dir.path(), &stack.key().resource("db")).unwrap();
        let statuses: Vec<_> = events.iter().map(|e| e.resource_status.to_string()).collect();
        assert_eq!(statuses, vec!["CREATE_IN_PROGRESS", "CREATE_COMPLETE"]);
        assert_eq!(list_events(dir.path(), &stack.key()).unwrap().len(), 4);
    }
}
