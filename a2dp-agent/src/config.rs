use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::time::Duration;

use crate::error::{AgentError, AgentResult};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/a2dp-agent/agent.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub agent_path: String,
    pub call_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_path: "/local/a2dpagent".to_string(),
            call_timeout_secs: 5,
        }
    }
}

impl AgentConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &str) -> AgentResult<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(AgentError::Config(format!("{}: {}", path, e))),
        }
    }

    pub fn parse(content: &str) -> AgentResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AgentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AgentResult<()> {
        dbus::Path::new(self.agent_path.as_str())
            .map_err(|e| AgentError::Config(format!("agent_path: {}", e)))?;
        if self.call_timeout_secs == 0 {
            return Err(AgentError::Config(
                "call_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = AgentConfig::parse("").unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.agent_path, "/local/a2dpagent");
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn partial_overrides_keep_other_defaults() {
        let config = AgentConfig::parse(
            r#"
            agent_path = "/com/example/agent"
            "#,
        )
        .unwrap();
        assert_eq!(config.agent_path, "/com/example/agent");
        assert_eq!(config.call_timeout_secs, 5);
    }

    #[test]
    fn invalid_agent_path_is_rejected() {
        let err = AgentConfig::parse(r#"agent_path = "not/a/path""#).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(AgentConfig::parse("call_timeout_secs = 0").is_err());
    }

    #[test]
    fn capability_cannot_be_configured() {
        let err = AgentConfig::parse(r#"capability = "DisplayYesNo""#).unwrap_err();
        assert!(matches!(err, AgentError::Config(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = AgentConfig::load("/nonexistent/a2dp-agent/agent.toml").unwrap();
        assert_eq!(config, AgentConfig::default());
    }
}
