use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Init,
    Create,
    Delete,
    Update,
    Rollback,
    Suspend,
    Resume,
    Signal,
}

impl Action {
    pub fn all() -> &'static [Action] {
        &[
            Action::Init,
            Action::Create,
            Action::Delete,
            Action::Update,
            Action::Rollback,
            Action::Suspend,
            Action::Resume,
            Action::Signal,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Init => "INIT",
            Action::Create => "CREATE",
            Action::Delete => "DELETE",
            Action::Update => "UPDATE",
            Action::Rollback => "ROLLBACK",
            Action::Suspend => "SUSPEND",
            Action::Resume => "RESUME",
            Action::Signal => "SIGNAL",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    InProgress,
    Failed,
    Complete,
}

impl Status {
    pub fn all() -> &'static [Status] {
        &[Status::InProgress, Status::Failed, Status::Complete]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::InProgress => "IN_PROGRESS",
            Status::Failed => "FAILED",
            Status::Complete => "COMPLETE",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResourceStatus
// ---------------------------------------------------------------------------

/// An `(action, status)` pair, rendered on the wire as `ACTION_STATUS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceStatus {
    pub action: Action,
    pub status: Status,
}

impl ResourceStatus {
    pub const fn new(action: Action, status: Status) -> Self {
        Self { action, status }
    }

    pub const fn init() -> Self {
        Self::new(Action::Init, Status::Complete)
    }

    pub fn is_in_progress(&self) -> bool {
        self.status == Status::InProgress
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.action, self.status)
    }
}

impl std::str::FromStr for ResourceStatus {
    type Err = crate::error::StackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for action in Action::all() {
            let Some(rest) = s
                .strip_prefix(action.as_str())
                .and_then(|r| r.strip_prefix('_'))
            else {
                continue;
            };
            if let Some(status) = Status::all().iter().find(|st| st.as_str() == rest) {
                return Ok(Self::new(*action, *status));
            }
        }
        Err(crate::error::StackError::InvalidParameter {
            name: "resource_status".to_string(),
            reason: format!("unknown status '{s}'"),
        })
    }
}

impl Serialize for ResourceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
