//! Stack creation and deletion.
//!
//! Creation walks resources in dependency order. A resource whose
//! dependencies are not all `CREATE_COMPLETE` stays `INIT_COMPLETE`; it is
//! picked up by a later [`provision`] pass once a signal unblocks it.

use crate::config::Config;
use crate::error::{Result, StackError};
use crate::identity::StackKey;
use crate::paths;
use crate::registry::{self, Completion};
use crate::resource::Resource;
use crate::stack::{ParentRef, Stack};
use crate::template::Template;
use crate::types::{Action, ResourceStatus, Status};
use serde_json::Value;
use std::path::Path;

const STATE_CHANGED: &str = "state changed";

pub fn create_stack(
    root: &Path,
    config: &Config,
    tenant_id: &str,
    stack_name: &str,
    template: &Template,
) -> Result<Stack> {
    paths::validate_tenant_id(tenant_id)?;
    paths::validate_stack_name(stack_name)?;
    if Stack::find_by_name(root, tenant_id, stack_name)?.is_some() {
        return Err(StackError::StackExists(stack_name.to_string()));
    }
    build_and_provision(root, config, tenant_id, stack_name, template, None, 0)
}

fn build_and_provision(
    root: &Path,
    config: &Config,
    tenant_id: &str,
    stack_name: &str,
    template: &Template,
    parent: Option<ParentRef>,
    depth: u32,
) -> Result<Stack> {
    let limit = config.limits.max_resources_per_stack;
    if template.resources.len() > limit {
        return Err(StackError::TooManyResources(limit));
    }

    let graph = template.dependency_graph()?;
    let mut stack = Stack::new(tenant_id, stack_name);
    stack.description = template.description.clone();
    stack.parent = parent;
    stack.depth = depth;

    for name in graph.order()? {
        let def = template.resource(&name).ok_or_else(|| {
            StackError::InvalidTemplate(format!("unknown resource '{name}'"))
        })?;
        let mut resource = Resource::from_definition(def);
        resource.depends_on = graph.dependencies(&name);
        resource.required_by = graph.required_by(&name);
        stack.add_resource(resource)?;
    }

    stack.set_status(Action::Create, Status::InProgress, "Stack CREATE started");
    stack.save(root)?;
    provision(root, config, &mut stack)?;
    stack.save(root)?;

    tracing::info!(
        tenant = %stack.tenant_id,
        stack = %stack.key(),
        status = %stack.status,
        resources = stack.resources.len(),
        "stack created"
    );
    Ok(stack)
}

/// Create every resource that is still `INIT_COMPLETE` and whose
/// dependencies are complete, then roll the result up into the stack
/// status. Only runs while the stack itself is `CREATE_IN_PROGRESS`.
pub fn provision(root: &Path, config: &Config, stack: &mut Stack) -> Result<()> {
    if stack.status != ResourceStatus::new(Action::Create, Status::InProgress) {
        return Ok(());
    }

    let names: Vec<String> = stack.resources.iter().map(|r| r.name.clone()).collect();
    for name in names {
        if is_ready(stack, &name)? {
            create_one(root, config, stack, &name)?;
        }
    }
    stack.refresh_create_status();
    Ok(())
}

fn is_ready(stack: &Stack, name: &str) -> Result<bool> {
    let resource = stack.resource(name)?;
    if resource.status != ResourceStatus::init() {
        return Ok(false);
    }
    Ok(resource.depends_on.iter().all(|dep| {
        stack
            .resource(dep)
            .map(Resource::is_created)
            .unwrap_or(false)
    }))
}

fn create_one(root: &Path, config: &Config, stack: &mut Stack, name: &str) -> Result<()> {
    let kind = registry::lookup(&stack.resource(name)?.resource_type);

    if kind.nested {
        stack.set_resource_state(name, Action::Create, Status::InProgress, STATE_CHANGED)?;
        match create_nested(root, config, stack, name) {
            Ok(child) => {
                stack.resource_mut(name)?.physical_resource_id = child.stack_id.clone();
                mirror_child(stack, name, &child)?;
            }
            Err(StackError::Io(e)) => return Err(StackError::Io(e)),
            Err(e) => {
                tracing::warn!(resource = %name, error = %e, "nested stack creation failed");
                stack.set_resource_state(name, Action::Create, Status::Failed, e.to_string())?;
            }
        }
        return Ok(());
    }

    stack.resource_mut(name)?.physical_resource_id = uuid::Uuid::new_v4().to_string();
    match kind.completion {
        Completion::Immediate => {
            stack.set_resource_state(name, Action::Create, Status::InProgress, STATE_CHANGED)?;
            stack.set_resource_state(name, Action::Create, Status::Complete, STATE_CHANGED)?;
        }
        Completion::AwaitSignal => {
            stack.set_resource_state(
                name,
                Action::Create,
                Status::InProgress,
                "Waiting for signal",
            )?;
        }
    }
    Ok(())
}

/// Name of the stack a nested-stack resource owns:
/// `<parent stack>-<resource>-<short id>`.
pub fn nested_stack_name(parent: &str, resource_name: &str) -> String {
    let short = uuid::Uuid::new_v4().simple().to_string();
    format!("{parent}-{resource_name}-{}", &short[..12])
}

fn create_nested(root: &Path, config: &Config, parent: &Stack, resource_name: &str) -> Result<Stack> {
    let depth = parent.depth + 1;
    if depth > config.limits.max_nested_depth {
        return Err(StackError::NestingTooDeep(config.limits.max_nested_depth));
    }

    let resource = parent.resource(resource_name)?;
    let template = match resource
        .property("Template")
        .or_else(|| resource.property("template"))
    {
        Some(Value::String(source)) => Template::parse(source)?,
        Some(doc @ Value::Object(_)) => Template::from_json(doc)?,
        _ => {
            return Err(StackError::InvalidTemplate(format!(
                "nested stack '{resource_name}' has no inline Template"
            )))
        }
    };

    let name = nested_stack_name(&parent.stack_name, resource_name);
    let parent_ref = ParentRef {
        stack_id: parent.stack_id.clone(),
        resource_name: resource_name.to_string(),
    };
    build_and_provision(
        root,
        config,
        &parent.tenant_id,
        &name,
        &template,
        Some(parent_ref),
        depth,
    )
}

/// Settle a nested-stack resource from its child's create status.
fn mirror_child(stack: &mut Stack, name: &str, child: &Stack) -> Result<()> {
    if stack.resource(name)?.status != ResourceStatus::new(Action::Create, Status::InProgress) {
        return Ok(());
    }
    if child.status.action != Action::Create {
        return Ok(());
    }
    match child.status.status {
        Status::Complete => {
            stack.set_resource_state(name, Action::Create, Status::Complete, STATE_CHANGED)
        }
        Status::Failed => stack.set_resource_state(
            name,
            Action::Create,
            Status::Failed,
            child.status_reason.clone(),
        ),
        Status::InProgress => Ok(()),
    }
}

/// After `child` changed, settle its owning resource in the parent stack,
/// continue the parent's creation and walk further up if the parent moved.
pub fn propagate_to_parent(root: &Path, config: &Config, child: &Stack) -> Result<()> {
    let Some(parent_ref) = &child.parent else {
        return Ok(());
    };
    let mut parent = match Stack::load(root, &child.tenant_id, &parent_ref.stack_id) {
        Ok(parent) => parent,
        Err(StackError::StackNotFound(_)) => return Ok(()),
        Err(e) => return Err(e),
    };
    if parent.resource(&parent_ref.resource_name).is_err() {
        return Ok(());
    }

    let before = parent.status;
    mirror_child(&mut parent, &parent_ref.resource_name, child)?;
    provision(root, config, &mut parent)?;
    parent.save(root)?;

    if parent.status != before {
        tracing::info!(stack = %parent.key(), status = %parent.status, "parent stack updated");
        propagate_to_parent(root, config, &parent)?;
    }
    Ok(())
}

/// Delete a stack: resources in reverse dependency order, nested stacks
/// recursively, then the stored manifest. Returns the final state.
pub fn delete_stack(root: &Path, key: &StackKey) -> Result<Stack> {
    let mut stack = Stack::lookup(root, key)?;
    delete_loaded(root, &mut stack)?;
    tracing::info!(stack = %key, "stack deleted");
    Ok(stack)
}

fn delete_loaded(root: &Path, stack: &mut Stack) -> Result<()> {
    stack.set_status(Action::Delete, Status::InProgress, "Stack DELETE started");

    let names: Vec<String> = stack.resources.iter().rev().map(|r| r.name.clone()).collect();
    for name in names {
        let resource = stack.resource(&name)?;
        if resource.is_deleted() {
            continue;
        }
        let child_id = registry::lookup(&resource.resource_type)
            .nested
            .then(|| resource.physical_resource_id.clone())
            .filter(|id| !id.is_empty());

        stack.set_resource_state(&name, Action::Delete, Status::InProgress, STATE_CHANGED)?;
        if let Some(child_id) = child_id {
            match Stack::load(root, &stack.tenant_id, &child_id) {
                Ok(mut child) => delete_loaded(root, &mut child)?,
                Err(StackError::StackNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        stack.set_resource_state(&name, Action::Delete, Status::Complete, STATE_CHANGED)?;
    }

    stack.set_status(
        Action::Delete,
        Status::Complete,
        "Stack DELETE completed successfully",
    );
    Stack::remove(root, &stack.tenant_id, &stack.stack_id)
}
