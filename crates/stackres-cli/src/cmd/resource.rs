use crate::output::{print_json, print_table, time_cell};
use anyhow::Context;
use clap::Subcommand;
use serde_json::Value;
use stackres_core::{
    config::Config,
    identity::ResourceKey,
    query::{self, ListOptions, ResourceView},
    signal,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum ResourceSubcommand {
    /// List the resources of a stack in dependency order
    List {
        stack: String,
        /// Expand nested stacks this many levels
        #[arg(long, default_value = "0")]
        nested_depth: u32,
        /// Include description, metadata, properties and dependencies
        #[arg(long)]
        detail: bool,
    },
    /// Show one resource
    Show { stack: String, resource: String },
    /// Print a resource's metadata document
    Metadata { stack: String, resource: String },
    /// Send a signal to a resource and apply it
    Signal {
        stack: String,
        resource: String,
        /// JSON payload (omit for none)
        #[arg(long)]
        data: Option<String>,
    },
}

pub fn run(
    root: &Path,
    tenant: &str,
    subcmd: ResourceSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    match subcmd {
        ResourceSubcommand::List {
            stack,
            nested_depth,
            detail,
        } => list(root, tenant, &stack, nested_depth, detail, json),
        ResourceSubcommand::Show { stack, resource } => show(root, tenant, &stack, &resource, json),
        ResourceSubcommand::Metadata { stack, resource } => {
            metadata(root, tenant, &stack, &resource)
        }
        ResourceSubcommand::Signal {
            stack,
            resource,
            data,
        } => send_signal(root, tenant, &stack, &resource, data.as_deref(), json),
    }
}

fn resource_key(root: &Path, tenant: &str, stack: &str, resource: &str) -> anyhow::Result<ResourceKey> {
    let key = query::find_stack(root, tenant, stack)
        .with_context(|| format!("stack '{stack}' not found"))?;
    Ok(key.resource(resource))
}

fn list(
    root: &Path,
    tenant: &str,
    stack: &str,
    nested_depth: u32,
    detail: bool,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let key = query::find_stack(root, tenant, stack)
        .with_context(|| format!("stack '{stack}' not found"))?;
    let opts = ListOptions {
        nested_depth: nested_depth.min(config.limits.max_nested_depth),
        with_detail: detail,
    };
    let resources = query::list_resources(root, &key, opts)?;

    if json {
        return print_json(&resources);
    }
    if resources.is_empty() {
        println!("No resources.");
        return Ok(());
    }

    let mut rows = Vec::new();
    flatten(&resources, 0, &mut rows);
    print_table(&["NAME", "TYPE", "STATUS", "PHYSICAL ID", "UPDATED"], rows);
    Ok(())
}

/// Table rows for a resource tree, nested entries indented under their
/// parent.
fn flatten(views: &[ResourceView], level: usize, rows: &mut Vec<Vec<String>>) {
    for v in views {
        rows.push(vec![
            format!("{}{}", "  ".repeat(level), v.resource_name),
            v.resource_type.clone(),
            v.resource_status.clone(),
            v.physical_resource_id.clone(),
            time_cell(v.updated_time),
        ]);
        if let Some(children) = &v.resources {
            flatten(children, level + 1, rows);
        }
    }
}

fn show(root: &Path, tenant: &str, stack: &str, resource: &str, json: bool) -> anyhow::Result<()> {
    let key = resource_key(root, tenant, stack, resource)?;
    let view = query::show_resource(root, &key)?;

    if json {
        return print_json(&view);
    }
    println!("Resource: {} ({})", view.resource_name, view.resource_type);
    println!("Status: {}", view.resource_status);
    if !view.resource_status_reason.is_empty() {
        println!("Reason: {}", view.resource_status_reason);
    }
    if !view.physical_resource_id.is_empty() {
        println!("Physical ID: {}", view.physical_resource_id);
    }
    println!("Created: {}", time_cell(view.creation_time));
    println!("Updated: {}", time_cell(view.updated_time));
    if let Some(deps) = view.depends_on.as_ref().filter(|d| !d.is_empty()) {
        println!("Depends on: {}", deps.join(", "));
    }
    if !view.required_by.is_empty() {
        println!("Required by: {}", view.required_by.join(", "));
    }
    Ok(())
}

fn metadata(root: &Path, tenant: &str, stack: &str, resource: &str) -> anyhow::Result<()> {
    let key = resource_key(root, tenant, stack, resource)?;
    let metadata = query::resource_metadata(root, &key)?;
    print_json(&metadata)
}

fn send_signal(
    root: &Path,
    tenant: &str,
    stack: &str,
    resource: &str,
    data: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let payload: Value = match data {
        Some(raw) => serde_json::from_str(raw).context("--data is not valid JSON")?,
        None => Value::Null,
    };
    let key = resource_key(root, tenant, stack, resource)?;
    let reason = signal::deliver(root, &config, &key, &payload)
        .with_context(|| format!("failed to signal '{resource}'"))?;

    if json {
        print_json(&serde_json::json!({ "resource": resource, "reason": reason }))?;
    } else {
        println!("{reason}");
    }
    Ok(())
}
