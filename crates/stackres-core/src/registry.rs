//! Resource types and the behavior attached to each.
//!
//! A kind is a static table entry: the type names it answers to, whether it
//! owns a nested stack, how creation finishes, and an optional signal
//! handler. Unknown types fall back to [`GENERIC`].

use crate::error::Result;
use crate::signal::{self, SignalContext};
use crate::resource::Resource;
use crate::stack::Stack;
use serde_json::Value;

/// How a resource leaves `CREATE_IN_PROGRESS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Completes as soon as it is provisioned.
    Immediate,
    /// Stays in progress until a signal completes or fails it.
    AwaitSignal,
}

/// A fn-pointer signal handler; no allocation, no dynamic dispatch.
#[derive(Debug)]
pub struct SignalHandler {
    /// Synchronous payload check run before a signal is accepted.
    pub validate: fn(&Stack, &Resource, &Value) -> Result<()>,
    /// Applies an accepted signal. Returns the event reason.
    pub apply: fn(&mut SignalContext) -> Result<String>,
}

pub struct ResourceKind {
    pub type_names: &'static [&'static str],
    pub nested: bool,
    pub completion: Completion,
    pub signal: Option<SignalHandler>,
}

pub static GENERIC: ResourceKind = ResourceKind {
    type_names: &[],
    nested: false,
    completion: Completion::Immediate,
    signal: None,
};

pub const WAIT_CONDITION_HANDLE: &[&str] = &[
    "AWS::CloudFormation::WaitConditionHandle",
    "OS::Heat::WaitConditionHandle",
];
pub const WAIT_CONDITION: &[&str] = &["AWS::CloudFormation::WaitCondition", "OS::Heat::WaitCondition"];
pub const SCALING_POLICY: &[&str] = &["AWS::AutoScaling::ScalingPolicy", "OS::Heat::ScalingPolicy"];
pub const SCALING_GROUP: &[&str] = &[
    "AWS::AutoScaling::AutoScalingGroup",
    "OS::Heat::AutoScalingGroup",
];
pub const NESTED_STACK: &[&str] = &["AWS::CloudFormation::Stack", "OS::Heat::Stack"];

static KINDS: &[ResourceKind] = &[
    ResourceKind {
        type_names: WAIT_CONDITION_HANDLE,
        nested: false,
        completion: Completion::Immediate,
        signal: Some(SignalHandler {
            validate: signal::validate_wait_handle,
            apply: signal::apply_wait_handle,
        }),
    },
    ResourceKind {
        type_names: WAIT_CONDITION,
        nested: false,
        completion: Completion::AwaitSignal,
        signal: None,
    },
    ResourceKind {
        type_names: SCALING_POLICY,
        nested: false,
        completion: Completion::Immediate,
        signal: Some(SignalHandler {
            validate: signal::validate_scaling_policy,
            apply: signal::apply_scaling_policy,
        }),
    },
    ResourceKind {
        type_names: SCALING_GROUP,
        nested: false,
        completion: Completion::Immediate,
        signal: None,
    },
    ResourceKind {
        type_names: NESTED_STACK,
        nested: true,
        completion: Completion::Immediate,
        signal: None,
    },
];

pub fn lookup(resource_type: &str) -> &'static ResourceKind {
    KINDS
        .iter()
        .find(|k| k.type_names.contains(&resource_type))
        .unwrap_or(&GENERIC)
}

pub fn is_type(resource_type: &str, names: &[&str]) -> bool {
    names.contains(&resource_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_types() {
        assert!(lookup("OS::Heat::WaitConditionHandle").signal.is_some());
        assert!(lookup("AWS::AutoScaling::ScalingPolicy").signal.is_some());
        assert!(lookup("AWS::CloudFormation::Stack").nested);
        assert_eq!(
            lookup("AWS::CloudFormation::WaitCondition").completion,
            Completion::AwaitSignal
        );
    }

    #[test]
    fn unknown_type_is_generic() {
        let k = lookup("AWS::EC2::Instance");
        assert!(k.signal.is_none());
        assert!(!k.nested);
        assert_eq!(k.completion, Completion::Immediate);
    }

    #[test]
    fn type_names_are_unique_across_kinds() {
        let mut all: Vec<&str> = KINDS.iter().flat_map(|k| k.type_names.iter().copied()).collect();
        let n = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), n);
    }
}
