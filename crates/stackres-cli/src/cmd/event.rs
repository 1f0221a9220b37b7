use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use stackres_core::query;
use std::path::Path;

#[derive(Subcommand)]
pub enum EventSubcommand {
    /// List a stack's events, oldest first
    List {
        stack: String,
        /// Only events of this resource
        #[arg(long)]
        resource: Option<String>,
    },
}

pub fn run(root: &Path, tenant: &str, subcmd: EventSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        EventSubcommand::List { stack, resource } => {
            list(root, tenant, &stack, resource.as_deref(), json)
        }
    }
}

fn list(
    root: &Path,
    tenant: &str,
    stack: &str,
    resource: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let key = query::find_stack(root, tenant, stack)
        .with_context(|| format!("stack '{stack}' not found"))?;
    let events = match resource {
        Some(name) => query::list_resource_events(root, &key.resource(name))?,
        None => query::list_events(root, &key)?,
    };

    if json {
        return print_json(&events);
    }
    if events.is_empty() {
        println!("No events.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = events
        .iter()
        .map(|e| {
            vec![
                e.event_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                e.resource_name.clone(),
                e.resource_status.to_string(),
                e.resource_status_reason.clone(),
            ]
        })
        .collect();
    print_table(&["TIME", "RESOURCE", "STATUS", "REASON"], rows);
    Ok(())
}
