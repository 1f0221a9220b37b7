use crate::error::{Result, StackError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const STORE_DIR: &str = ".stackres";
pub const TENANTS_DIR: &str = ".stackres/tenants";
pub const CONFIG_FILE: &str = ".stackres/config.yaml";

pub const STACKS_SUBDIR: &str = "stacks";
pub const MANIFEST_FILE: &str = "stack.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn tenant_stacks_dir(root: &Path, tenant_id: &str) -> PathBuf {
    root.join(TENANTS_DIR).join(tenant_id).join(STACKS_SUBDIR)
}

pub fn stack_dir(root: &Path, tenant_id: &str, stack_id: &str) -> PathBuf {
    tenant_stacks_dir(root, tenant_id).join(stack_id)
}

pub fn stack_manifest(root: &Path, tenant_id: &str, stack_id: &str) -> PathBuf {
    stack_dir(root, tenant_id, stack_id).join(MANIFEST_FILE)
}

// ---------------------------------------------------------------------------
// Identifier validation
// ---------------------------------------------------------------------------

static TENANT_RE: OnceLock<Regex> = OnceLock::new();
static STACK_NAME_RE: OnceLock<Regex> = OnceLock::new();
static STACK_ID_RE: OnceLock<Regex> = OnceLock::new();
static RESOURCE_NAME_RE: OnceLock<Regex> = OnceLock::new();

fn tenant_re() -> &'static Regex {
    TENANT_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").unwrap())
}

fn stack_name_re() -> &'static Regex {
    STACK_NAME_RE.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_.\-]*$").unwrap())
}

fn stack_id_re() -> &'static Regex {
    STACK_ID_RE.get_or_init(|| Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap())
}

fn resource_name_re() -> &'static Regex {
    RESOURCE_NAME_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").unwrap())
}

pub fn validate_tenant_id(tenant_id: &str) -> Result<()> {
    if tenant_id.len() > 64 || !tenant_re().is_match(tenant_id) {
        return Err(StackError::invalid("tenant id", tenant_id));
    }
    Ok(())
}

pub fn validate_stack_name(name: &str) -> Result<()> {
    if name.len() > 255 || !stack_name_re().is_match(name) {
        return Err(StackError::invalid("stack name", name));
    }
    Ok(())
}

/// Stack ids are lowercase hyphenated UUIDs; they double as directory names.
pub fn validate_stack_id(stack_id: &str) -> Result<()> {
    if !stack_id_re().is_match(stack_id) {
        return Err(StackError::invalid("stack id", stack_id));
    }
    Ok(())
}

pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.len() > 255 || !resource_name_re().is_match(name) {
        return Err(StackError::invalid("resource name", name));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
