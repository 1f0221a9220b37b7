use thiserror::Error;

#[derive(Debug, Error)]
pub enum StackError {
    #[error("not initialized: run 'stackres init'")]
    NotInitialized,

    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("stack already exists: {0}")]
    StackExists(String),

    #[error("resource '{resource}' not found in stack '{stack}'")]
    ResourceNotFound { stack: String, resource: String },

    #[error("duplicate resource in stack: {0}")]
    DuplicateResource(String),

    #[error("invalid {kind} '{value}'")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("invalid template: {0}")]
    InvalidTemplate(String),

    #[error("circular dependency involving resource '{0}'")]
    CircularDependency(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("resource '{resource}' of type '{resource_type}' does not accept signals")]
    SignalNotSupported {
        resource: String,
        resource_type: String,
    },

    #[error("cannot signal resource '{resource}' during {action}")]
    SignalRejected { resource: String, action: String },

    #[error("invalid signal payload: {0}")]
    InvalidSignal(String),

    #[error("invalid status transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("nested stack depth limit of {0} exceeded")]
    NestingTooDeep(u32),

    #[error("stack exceeds the limit of {0} resources")]
    TooManyResources(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StackError {
    pub fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        StackError::InvalidIdentifier {
            kind,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StackError>;
