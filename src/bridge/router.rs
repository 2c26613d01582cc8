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

//! Tool-name routing.
//!
//! Maps a tool name to a backend name by walking an ordered rule list. The
//! first rule that matches wins; if none does, the default backend is used.
//! Rules are never reordered, so overlapping rules resolve by declaration order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BridgeConfig;

/// Predicate over a tool name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ToolMatcher {
    StartsWith(String),
    Contains(String),
    EndsWith(String),
    Equals(String),
}

impl ToolMatcher {
    pub fn matches(&self, tool_name: &str) -> bool {
        match self {
            ToolMatcher::StartsWith(prefix) => tool_name.starts_with(prefix.as_str()),
            ToolMatcher::Contains(needle) => tool_name.contains(needle.as_str()),
            ToolMatcher::EndsWith(suffix) => tool_name.ends_with(suffix.as_str()),
            ToolMatcher::Equals(exact) => tool_name == exact,
        }
    }
}

impl fmt::Display for ToolMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolMatcher::StartsWith(p) => write!(f, "starts_with '{}'", p),
            ToolMatcher::Contains(p) => write!(f, "contains '{}'", p),
            ToolMatcher::EndsWith(p) => write!(f, "ends_with '{}'", p),
            ToolMatcher::Equals(p) => write!(f, "equals '{}'", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    #[serde(flatten)]
    pub matcher: ToolMatcher,
    pub backend: String,
}

impl RoutingRule {
    pub fn new(matcher: ToolMatcher, backend: &str) -> Self {
        Self {
            matcher,
            backend: backend.to_string(),
        }
    }
}

/// Ordered rule table plus fallback.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    rules: Vec<RoutingRule>,
    default_backend: String,
}

impl ToolRouter {
    pub fn new(rules: Vec<RoutingRule>, default_backend: impl Into<String>) -> Self {
        Self {
            rules,
            default_backend: default_backend.into(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(config.routes.clone(), config.default_backend.clone())
    }

    /// Backend name for `tool_name`. Pure; never fails.
    pub fn resolve(&self, tool_name: &str) -> &str {
        self.matching_rule(tool_name)
            .map(|rule| rule.backend.as_str())
            .unwrap_or(&self.default_backend)
    }

    /// The first rule that matches, if any.
    pub fn matching_rule(&self, tool_name: &str) -> Option<&RoutingRule> {
        self.rules.iter().find(|rule| rule.matcher.matches(tool_name))
    }

    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }

    pub fn default_backend(&self) -> &str {
        &self.default_backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::backends::{LLM_FRAMEWORK_DEVOPS, SCARMONIT_ARCHITECTURE};

    fn builtin() -> ToolRouter {
        ToolRouter::from_config(&BridgeConfig::builtin())
    }

    #[test]
    fn test_builtin_scenarios() {
        let router = builtin();
        assert_eq!(router.resolve("check_system_status"), SCARMONIT_ARCHITECTURE);
        assert_eq!(router.resolve("docker_ps"), LLM_FRAMEWORK_DEVOPS);
        assert_eq!(router.resolve("kubectl_logs"), LLM_FRAMEWORK_DEVOPS);
        assert_eq!(router.resolve("totally_unknown_tool"), SCARMONIT_ARCHITECTURE);
    }

    #[test]
    fn test_first_match_wins() {
        // "docker_agent_status" matches both the docker_ prefix and the
        // "agent" substring rule; the earlier rule decides.
        let router = builtin();
        assert_eq!(router.resolve("docker_agent_status"), LLM_FRAMEWORK_DEVOPS);

        let reversed = ToolRouter::new(
            vec![
                RoutingRule::new(ToolMatcher::Contains("agent".to_string()), "a"),
                RoutingRule::new(ToolMatcher::StartsWith("docker_".to_string()), "b"),
            ],
            "fallback",
        );
        assert_eq!(reversed.resolve("docker_agent_status"), "a");
    }

    #[test]
    fn test_matchers() {
        assert!(ToolMatcher::EndsWith("_logs".to_string()).matches("docker_logs"));
        assert!(ToolMatcher::Equals("ping".to_string()).matches("ping"));
        assert!(!ToolMatcher::Equals("ping".to_string()).matches("ping2"));
        assert!(!ToolMatcher::StartsWith("git_".to_string()).matches("digit_"));
    }

    #[test]
    fn test_empty_rules_use_default() {
        let router = ToolRouter::new(Vec::new(), "only");
        assert_eq!(router.resolve(""), "only");
        assert!(router.matching_rule("anything").is_none());
    }

    #[test]
    fn test_rule_yaml_shape() {
        let rule: RoutingRule =
            serde_yaml_ng::from_str("starts_with: docker_\nbackend: devops\n").unwrap();
        assert_eq!(rule.matcher, ToolMatcher::StartsWith("docker_".to_string()));
        assert_eq!(rule.backend, "devops");
    }
}
