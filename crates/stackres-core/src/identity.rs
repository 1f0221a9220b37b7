use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The `(tenant_id, stack_name, stack_id)` triple every stack URL carries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackKey {
    pub tenant_id: String,
    pub stack_name: String,
    pub stack_id: String,
}

impl StackKey {
    pub fn new(
        tenant_id: impl Into<String>,
        stack_name: impl Into<String>,
        stack_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            stack_name: stack_name.into(),
            stack_id: stack_id.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        paths::validate_tenant_id(&self.tenant_id)?;
        paths::validate_stack_name(&self.stack_name)?;
        paths::validate_stack_id(&self.stack_id)
    }

    pub fn resource(&self, resource_name: impl Into<String>) -> ResourceKey {
        ResourceKey {
            stack: self.clone(),
            resource_name: resource_name.into(),
        }
    }

    /// Relative URL of the stack.
    pub fn url(&self) -> String {
        format!(
            "/v1/{}/stacks/{}/{}",
            self.tenant_id, self.stack_name, self.stack_id
        )
    }
}

impl fmt::Display for StackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stack_name, self.stack_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub stack: StackKey,
    pub resource_name: String,
}

impl ResourceKey {
    pub fn validate(&self) -> Result<()> {
        self.stack.validate()?;
        paths::validate_resource_name(&self.resource_name)
    }

    pub fn url(&self) -> String {
        format!("{}/resources/{}", self.stack.url(), self.resource_name)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stack, self.resource_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0f4c3a7e-2b1d-4e6f-9a8b-7c6d5e4f3a2b";

    #[test]
    fn urls() {
        let key = StackKey::new("t1", "web", ID);
        assert_eq!(key.url(), format!("/v1/t1/stacks/web/{ID}"));
        assert_eq!(
            key.resource("WebServer").url(),
            format!("/v1/t1/stacks/web/{ID}/resources/WebServer")
        );
    }

    #[test]
    fn validate_rejects_each_bad_part() {
        assert!(StackKey::new("t1", "web", ID).validate().is_ok());
        assert!(StackKey::new("t 1", "web", ID).validate().is_err());
        assert!(StackKey::new("t1", "9web", ID).validate().is_err());
        assert!(StackKey::new("t1", "web", "abc").validate().is_err());
        assert!(StackKey::new("t1", "web", ID)
            .resource("bad name")
            .validate()
            .is_err());
    }
}
