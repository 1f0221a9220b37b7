use crate::error::{Result, StackError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ServiceConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8004
}

// ---------------------------------------------------------------------------
// AuthConfig
// ---------------------------------------------------------------------------

/// A static token grant. A request carrying `token` in `X-Auth-Token` may act
/// on `tenant_id` only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub token: String,
    pub tenant_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub tokens: Vec<TokenGrant>,
}

impl AuthConfig {
    pub fn enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    /// Tenant the token is scoped to, if the token is known.
    pub fn tenant_for(&self, token: &str) -> Option<&str> {
        self.tokens
            .iter()
            .find(|g| g.token == token)
            .map(|g| g.tenant_id.as_str())
    }
}

// ---------------------------------------------------------------------------
// LimitsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_nested_depth")]
    pub max_nested_depth: u32,
    #[serde(default = "default_max_resources")]
    pub max_resources_per_stack: usize,
}

fn default_max_nested_depth() -> u32 {
    5
}

fn default_max_resources() -> usize {
    1000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_nested_depth: default_max_nested_depth(),
            max_resources_per_stack: default_max_resources(),
        }
    }
}

// ---------------------------------------------------------------------------
// SignalsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_queue_depth() -> usize {
    256
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub service: ServiceConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            service: ServiceConfig {
                name: service_name.into(),
                bind: default_bind(),
                port: default_port(),
            },
            auth: AuthConfig::default(),
            limits: LimitsConfig::default(),
            signals: SignalsConfig::default(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(StackError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    /// Write this config only if the store has none yet. Returns true if
    /// written.
    pub fn save_if_missing(&self, root: &Path) -> Result<bool> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::write_if_missing(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if !self.auth.enabled() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "auth.tokens is empty: every tenant is reachable without a token"
                    .to_string(),
            });
        }

        let mut seen = HashSet::new();
        for grant in &self.auth.tokens {
            if grant.token.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("empty token for tenant '{}'", grant.tenant_id),
                });
            }
            if paths::validate_tenant_id(&grant.tenant_id).is_err() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("invalid tenant id '{}' in auth.tokens", grant.tenant_id),
                });
            }
            if !seen.insert(grant.token.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "token for tenant '{}' is listed more than once",
                        grant.tenant_id
                    ),
                });
            }
        }

        if self.signals.queue_depth == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "signals.queue_depth must be at least 1".to_string(),
            });
        }

        if self.limits.max_nested_depth > 10 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "limits.max_nested_depth={} (>10 is unusual)",
                    self.limits.max_nested_depth
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_config_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(StackError::NotInitialized)
        ));
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::new("orchestration");
        cfg.auth.tokens.push(TokenGrant {
            token: "secret".into(),
            tenant_id: "t1".into(),
        });
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.service.name, "orchestration");
        assert_eq!(loaded.service.port, 8004);
        assert_eq!(loaded.auth.tenant_for("secret"), Some("t1"));
        assert_eq!(loaded.auth.tenant_for("other"), None);
    }

    #[test]
    fn save_if_missing_keeps_existing_config() {
        let dir = TempDir::new().unwrap();
        assert!(Config::new("first").save_if_missing(dir.path()).unwrap());
        assert!(!Config::new("second").save_if_missing(dir.path()).unwrap());
        assert_eq!(Config::load(dir.path()).unwrap().service.name, "first");
    }

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("service:\n  name: svc\n").unwrap();
        assert_eq!(cfg.version, 1);
        assert_eq!(cfg.service.bind, "0.0.0.0");
        assert_eq!(cfg.limits.max_nested_depth, 5);
        assert_eq!(cfg.limits.max_resources_per_stack, 1000);
        assert_eq!(cfg.signals.queue_depth, 256);
        assert!(!cfg.auth.enabled());
    }

    #[test]
    fn validate_warns_when_auth_disabled() {
        let cfg = Config::new("svc");
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("auth.tokens is empty")));
    }

    #[test]
    fn validate_duplicate_token_is_error() {
        let mut cfg = Config::new("svc");
        for tenant in ["a", "b"] {
            cfg.auth.tokens.push(TokenGrant {
                token: "same".into(),
                tenant_id: tenant.into(),
            });
        }
        let warnings = cfg.validate();
        assert!(warnings
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("more than once")));
    }

    #[test]
    fn validate_zero_queue_depth() {
        let mut cfg = Config::new("svc");
        cfg.signals.queue_depth = 0;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.message.contains("queue_depth")));
    }
}
