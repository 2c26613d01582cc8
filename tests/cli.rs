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

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn bridge() -> Command {
    let mut cmd = Command::cargo_bin("mcp-bridge").unwrap();
    cmd.env_remove("BRIDGE_CONFIG_PATH")
        .env_remove("PORT")
        .env("LOG_LEVEL", "error");
    cmd
}

#[test]
fn test_binary_help() {
    bridge()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--route"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_route_builtin_table() {
    bridge()
        .args(["--route", "docker_ps"])
        .assert()
        .success()
        .stdout("llm-framework-devops\n");

    bridge()
        .args(["--route", "totally_unknown_tool"])
        .assert()
        .success()
        .stdout("scarmonit-architecture\n");
}

#[test]
fn test_dry_run_prints_effective_config() {
    bridge()
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(predicate::str::contains("default_backend: scarmonit-architecture"))
        .stdout(predicate::str::contains("starts_with: docker_"));
}

#[test]
fn test_config_file_overrides_builtin_table() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        "default_backend: alpha\nbackends:\n  alpha:\n    command: node\n  beta:\n    command: python\nroutes:\n  - starts_with: db_\n    backend: beta\n"
    )
    .unwrap();

    bridge()
        .arg("--config")
        .arg(file.path())
        .args(["--route", "db_query"])
        .assert()
        .success()
        .stdout("beta\n");
}

#[test]
fn test_invalid_config_file_fails_startup() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "default_backend: nowhere\nbackends:\n  alpha:\n    command: node\n").unwrap();

    bridge()
        .arg("--config")
        .arg(file.path())
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));
}

#[test]
fn test_invalid_port_env_fails_startup() {
    bridge()
        .env("PORT", "not-a-port")
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PORT"));
}

#[test]
fn test_json_log_format_starts_cleanly() {
    bridge()
        .env("LOG_FORMAT", "json")
        .env("LOG_LEVEL", "info")
        .args(["--route", "k8s_pods"])
        .assert()
        .success()
        .stdout("llm-framework-devops\n")
        .stderr(predicate::str::contains("Failed to init tracing").not());
}
