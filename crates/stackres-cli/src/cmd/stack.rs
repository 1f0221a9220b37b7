use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use stackres_core::{
    config::Config,
    lifecycle,
    query::{self, StackView},
    template::Template,
};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum StackSubcommand {
    /// Create a stack from a JSON or YAML template file
    Create {
        name: String,
        /// Template file
        #[arg(long, short = 't')]
        template: PathBuf,
    },
    /// List stacks of the tenant
    List {
        /// Include nested stacks
        #[arg(long)]
        nested: bool,
    },
    /// Show one stack
    Show { name: String },
    /// Delete a stack and its nested stacks
    Delete { name: String },
}

pub fn run(root: &Path, tenant: &str, subcmd: StackSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StackSubcommand::Create { name, template } => create(root, tenant, &name, &template, json),
        StackSubcommand::List { nested } => list(root, tenant, nested, json),
        StackSubcommand::Show { name } => show(root, tenant, &name, json),
        StackSubcommand::Delete { name } => delete(root, tenant, &name, json),
    }
}

fn create(root: &Path, tenant: &str, name: &str, file: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read template {}", file.display()))?;
    let template = Template::parse(&source)
        .with_context(|| format!("failed to parse template {}", file.display()))?;

    let stack = lifecycle::create_stack(root, &config, tenant, name, &template)
        .with_context(|| format!("failed to create stack '{name}'"))?;

    if json {
        print_json(&StackView::new(&stack))?;
    } else {
        println!("Created stack '{}' ({}): {}", name, stack.stack_id, stack.status);
    }
    Ok(())
}

fn list(root: &Path, tenant: &str, nested: bool, json: bool) -> anyhow::Result<()> {
    let stacks = query::list_stacks(root, tenant, nested).context("failed to list stacks")?;

    if json {
        return print_json(&stacks);
    }
    if stacks.is_empty() {
        println!("No stacks.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = stacks
        .iter()
        .map(|s| {
            vec![
                s.stack_name.clone(),
                s.id.clone(),
                s.stack_status.clone(),
                s.creation_time.format("%Y-%m-%d %H:%M:%S").to_string(),
            ]
        })
        .collect();
    print_table(&["NAME", "ID", "STATUS", "CREATED"], rows);
    Ok(())
}

fn show(root: &Path, tenant: &str, name: &str, json: bool) -> anyhow::Result<()> {
    let key = query::find_stack(root, tenant, name)
        .with_context(|| format!("stack '{name}' not found"))?;
    let stack = query::show_stack(root, &key)?;

    if json {
        return print_json(&stack);
    }
    println!("Stack: {} ({})", stack.stack_name, stack.id);
    println!("Status: {}", stack.stack_status);
    if !stack.stack_status_reason.is_empty() {
        println!("Reason: {}", stack.stack_status_reason);
    }
    if let Some(desc) = &stack.description {
        println!("Description: {desc}");
    }
    if let Some(parent) = &stack.parent {
        println!("Parent: {parent}");
    }
    println!("URL: {}", key.url());
    Ok(())
}

fn delete(root: &Path, tenant: &str, name: &str, json: bool) -> anyhow::Result<()> {
    let key = query::find_stack(root, tenant, name)
        .with_context(|| format!("stack '{name}' not found"))?;
    lifecycle::delete_stack(root, &key)
        .with_context(|| format!("failed to delete stack '{name}'"))?;

    if json {
        print_json(&serde_json::json!({ "deleted": key.stack_id }))?;
    } else {
        println!("Deleted stack '{name}'.");
    }
    Ok(())
}
