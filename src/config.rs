// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Configuration management

use crate::bridge::router::{RoutingRule, ToolMatcher};
use crate::core::constants::{backends, config as keys, limits, timeouts};
use crate::core::errors::BridgeError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-level settings loaded from environment variables.
///
/// The backend table lives in [`BridgeConfig`]; this struct only carries
/// listener, timeout and logging knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub bind_address: String,
    pub port: u16,

    // Backend table source (None = built-in table)
    pub config_path: Option<PathBuf>,

    // MCP transport timeouts
    pub handshake_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub shutdown_grace_secs: u64,

    // Middleware configuration
    pub request_timeout_secs: u64,
    pub body_size_limit_bytes: usize,

    // Logging configuration
    pub log_level: String,
    pub log_format: String, // "json" or "text"
}

impl Config {
    /// Load configuration from environment variables, validating every value.
    pub fn from_env() -> Result<Self, BridgeError> {
        let config = Self {
            bind_address: env::var(keys::ENV_BIND_ADDRESS)
                .unwrap_or_else(|_| keys::DEFAULT_BIND_ADDRESS.to_string()),
            port: Self::parse_port(env::var(keys::ENV_PORT).ok().as_deref())?,
            config_path: Self::get_optional_path(keys::ENV_CONFIG_PATH),
            handshake_timeout_secs: Self::parse_u64_or_default(
                keys::ENV_HANDSHAKE_TIMEOUT,
                timeouts::DEFAULT_HANDSHAKE_SECS,
            )?,
            tool_timeout_secs: Self::parse_u64_or_default(
                keys::ENV_TOOL_TIMEOUT,
                timeouts::DEFAULT_TOOL_CALL_SECS,
            )?,
            shutdown_grace_secs: Self::parse_u64_or_default(
                keys::ENV_SHUTDOWN_GRACE,
                timeouts::DEFAULT_SHUTDOWN_GRACE_SECS,
            )?,
            request_timeout_secs: Self::parse_u64_or_default(
                keys::ENV_REQUEST_TIMEOUT,
                timeouts::DEFAULT_REQUEST_SECS,
            )?,
            body_size_limit_bytes: Self::parse_usize_or_default(
                keys::ENV_BODY_SIZE_LIMIT,
                limits::DEFAULT_BODY_SIZE_LIMIT_BYTES,
            )?,
            log_level: env::var(keys::ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string()),
            log_format: env::var(keys::ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// The HTTP timeout has to outlive a cold start plus one tool call, or the
    /// layer would cut off calls the bridge is still allowed to finish.
    pub fn validate(&self) -> Result<(), BridgeError> {
        let needed = self.handshake_timeout_secs + self.tool_timeout_secs;
        if self.request_timeout_secs < needed {
            return Err(BridgeError::Configuration(format!(
                "{} ({}s) must be at least handshake + tool timeout ({}s)",
                keys::ENV_REQUEST_TIMEOUT,
                self.request_timeout_secs,
                needed
            )));
        }
        if !matches!(self.log_format.as_str(), "json" | "text") {
            return Err(BridgeError::Configuration(format!(
                "Invalid {} value '{}': expected 'json' or 'text'",
                keys::ENV_LOG_FORMAT,
                self.log_format
            )));
        }
        Ok(())
    }

    fn get_optional_path(key: &str) -> Option<PathBuf> {
        match env::var(key) {
            Ok(value) if !value.is_empty() => Some(PathBuf::from(value)),
            _ => None,
        }
    }

    /// Parse port from PORT value
    pub(crate) fn parse_port(value: Option<&str>) -> Result<u16, BridgeError> {
        let Some(raw) = value else {
            return Ok(keys::DEFAULT_PORT);
        };
        let port = raw.parse::<u16>().map_err(|e| {
            BridgeError::Configuration(format!("Invalid {} value '{}': {}", keys::ENV_PORT, raw, e))
        })?;
        if port == 0 {
            return Err(BridgeError::Configuration(
                "PORT must be between 1 and 65535".to_string(),
            ));
        }
        Ok(port)
    }

    fn parse_u64_or_default(key: &str, default: u64) -> Result<u64, BridgeError> {
        match env::var(key) {
            Ok(value) => Self::parse_positive(key, &value),
            Err(_) => Ok(default),
        }
    }

    fn parse_usize_or_default(key: &str, default: usize) -> Result<usize, BridgeError> {
        match env::var(key) {
            Ok(value) => Self::parse_positive(key, &value),
            Err(_) => Ok(default),
        }
    }

    /// Parse a strictly positive integer.
    pub(crate) fn parse_positive<T>(key: &str, value: &str) -> Result<T, BridgeError>
    where
        T: std::str::FromStr + PartialEq + Default,
        T::Err: std::fmt::Display,
    {
        let parsed = value.trim().parse::<T>().map_err(|e| {
            BridgeError::Configuration(format!("Invalid {} value '{}': {}", key, value, e))
        })?;
        if parsed == T::default() {
            return Err(BridgeError::Configuration(format!(
                "{} must be greater than 0",
                key
            )));
        }
        Ok(parsed)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: keys::DEFAULT_BIND_ADDRESS.to_string(),
            port: keys::DEFAULT_PORT,
            config_path: None,
            handshake_timeout_secs: timeouts::DEFAULT_HANDSHAKE_SECS,
            tool_timeout_secs: timeouts::DEFAULT_TOOL_CALL_SECS,
            shutdown_grace_secs: timeouts::DEFAULT_SHUTDOWN_GRACE_SECS,
            request_timeout_secs: timeouts::DEFAULT_REQUEST_SECS,
            body_size_limit_bytes: limits::DEFAULT_BODY_SIZE_LIMIT_BYTES,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// How to launch one backend. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendServerConfig {
    /// Filled in from the table key.
    #[serde(skip)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Applied on top of the bridge's own environment.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl BackendServerConfig {
    pub fn new(name: &str, command: &str, args: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
        }
    }
}

/// The static backend table and routing rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub backends: BTreeMap<String, BackendServerConfig>,
    /// Evaluated in declaration order.
    #[serde(default)]
    pub routes: Vec<RoutingRule>,
    pub default_backend: String,
}

impl BridgeConfig {
    /// Table used when no config file is given.
    pub fn builtin() -> Self {
        let architecture = backends::SCARMONIT_ARCHITECTURE;
        let devops = backends::LLM_FRAMEWORK_DEVOPS;

        let mut table = BTreeMap::new();
        table.insert(
            architecture.to_string(),
            BackendServerConfig::new(architecture, "node", &["mcp-server/index.js"]),
        );
        table.insert(
            devops.to_string(),
            BackendServerConfig::new(devops, "node", &["llm-framework/mcp-servers/devops/index.js"]),
        );

        let routes = vec![
            RoutingRule::new(ToolMatcher::StartsWith("docker_".to_string()), devops),
            RoutingRule::new(ToolMatcher::StartsWith("k8s_".to_string()), devops),
            RoutingRule::new(ToolMatcher::StartsWith("kubectl_".to_string()), devops),
            RoutingRule::new(ToolMatcher::Contains("deploy".to_string()), devops),
            RoutingRule::new(ToolMatcher::StartsWith("check_".to_string()), architecture),
            RoutingRule::new(ToolMatcher::Contains("agent".to_string()), architecture),
        ];

        Self {
            backends: table,
            routes,
            default_backend: architecture.to_string(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, BridgeError> {
        let mut config: BridgeConfig = serde_yaml_ng::from_str(content)
            .map_err(|e| BridgeError::Configuration(format!("Invalid bridge config: {}", e)))?;
        for (name, backend) in config.backends.iter_mut() {
            backend.name = name.clone();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, BridgeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// File if configured, built-in table otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, BridgeError> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let config = Self::builtin();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.backends.is_empty() {
            return Err(BridgeError::Configuration(
                "At least one backend must be configured".to_string(),
            ));
        }
        for (name, backend) in &self.backends {
            if backend.command.trim().is_empty() {
                return Err(BridgeError::Configuration(format!(
                    "Backend '{}' has an empty command",
                    name
                )));
            }
        }
        if !self.backends.contains_key(&self.default_backend) {
            return Err(BridgeError::Configuration(format!(
                "Default backend '{}' is not configured",
                self.default_backend
            )));
        }
        for (index, rule) in self.routes.iter().enumerate() {
            if !self.backends.contains_key(&rule.backend) {
                return Err(BridgeError::Configuration(format!(
                    "Route #{} ({}) targets unknown backend '{}'",
                    index + 1,
                    rule.matcher,
                    rule.backend
                )));
            }
        }
        Ok(())
    }
}
