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

mod common;

use common::*;
use mcp_bridge::bridge::{ConnectionState, Dispatcher, RoutingRule, ShutdownCoordinator, ToolMatcher, ToolRouter};
use mcp_bridge::core::errors::BridgeError;
use mcp_bridge::core::models::{CallOutcome, CallPhase};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn dispatcher(connector: Arc<MockConnector>) -> (Dispatcher, Arc<mcp_bridge::bridge::ConnectionManager>) {
    let connections = manager(connector);
    let router = Arc::new(ToolRouter::new(
        vec![RoutingRule::new(ToolMatcher::StartsWith("b_".to_string()), "beta")],
        "alpha",
    ));
    (Dispatcher::new(router, connections.clone()), connections)
}

#[tokio::test]
async fn test_auto_routed_call_succeeds() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, _) = dispatcher(connector);

    let result = dispatcher.call_auto("b_lookup", json!({"q": 1})).await;
    assert!(result.is_success());
    assert_eq!(result.server, "beta");
    assert_eq!(result.settled_in, CallPhase::Succeeded);
    match result.outcome {
        CallOutcome::Success(data) => {
            assert_eq!(data["tool"], "b_lookup");
            assert_eq!(data["arguments"], json!({"q": 1}));
        }
        CallOutcome::Error(e) => panic!("unexpected error: {}", e),
    }
}

#[tokio::test]
async fn test_explicit_server_bypasses_router() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, _) = dispatcher(connector);

    let result = dispatcher.call_explicit("alpha", "b_lookup", json!({})).await;
    assert!(result.is_success());
    assert_eq!(result.server, "alpha");
}

#[tokio::test]
async fn test_arguments_forwarded_verbatim() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, _) = dispatcher(connector);

    let odd = json!([null, {"nested": ["x", 1.5]}, "tail"]);
    let result = dispatcher.call_auto("anything", odd.clone()).await;
    match result.outcome {
        CallOutcome::Success(data) => assert_eq!(data["arguments"], odd),
        CallOutcome::Error(e) => panic!("unexpected error: {}", e),
    }
}

#[tokio::test]
async fn test_unknown_backend_becomes_error_result() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, _) = dispatcher(connector.clone());

    let result = dispatcher.call_explicit("gamma", "echo", json!({})).await;
    assert!(!result.is_success());
    assert_eq!(result.status(), "error");
    assert_eq!(result.settled_in, CallPhase::Routed);
    assert_eq!(result.execution_time_ms, 0);
    assert!(matches!(result.error(), Some(BridgeError::BackendUnknown(_))));
    assert_eq!(connector.spawn_count(), 0);
}

#[tokio::test]
async fn test_tool_error_keeps_connection() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, connections) = dispatcher(connector.clone());

    let result = dispatcher.call_auto("fail", json!({})).await;
    assert!(matches!(result.error(), Some(BridgeError::ToolInvocationError { .. })));
    assert_eq!(result.settled_in, CallPhase::Forwarded);

    let result = dispatcher.call_auto("totally_unknown_tool", json!({})).await;
    assert!(matches!(result.error(), Some(BridgeError::UnknownTool { .. })));

    assert_eq!(connections.state("alpha"), ConnectionState::Ready);
    assert!(dispatcher.call_auto("echo", json!({})).await.is_success());
    assert_eq!(connector.spawn_count(), 1);
}

#[tokio::test]
async fn test_transport_error_invalidates_and_next_call_respawns() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, connections) = dispatcher(connector.clone());

    let result = dispatcher.call_auto("crash", json!({})).await;
    assert!(matches!(
        result.error(),
        Some(BridgeError::BackendTransportError { .. })
    ));
    assert_eq!(connections.state("alpha"), ConnectionState::NotStarted);

    let result = dispatcher.call_auto("echo", json!({})).await;
    assert!(result.is_success());
    assert_eq!(connector.spawn_count(), 2);
}

#[tokio::test]
async fn test_backend_dying_between_calls_is_transparent() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, _) = dispatcher(connector.clone());

    assert!(dispatcher.call_auto("echo", json!({})).await.is_success());
    connector.last_session().kill();

    let result = dispatcher.call_auto("echo", json!({})).await;
    assert!(result.is_success());
    assert_eq!(connector.spawn_count(), 2);
}

#[tokio::test]
async fn test_execution_time_covers_forward() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, _) = dispatcher(connector);

    let result = dispatcher.call_auto("slow", json!({})).await;
    assert!(result.is_success());
    assert!(result.execution_time_ms >= 100);
}

#[tokio::test]
async fn test_shutdown_coordinator_reports_each_backend() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, connections) = dispatcher(connector.clone());

    dispatcher.call_auto("echo", json!({})).await;
    dispatcher.call_auto("b_echo", json!({})).await;

    let report = ShutdownCoordinator::new(connections).shutdown().await;
    assert!(report.is_clean());
    assert_eq!(report.closed, vec!["alpha", "beta"]);
    for session in connector.sessions.lock().unwrap().iter() {
        assert_eq!(session.shutdowns.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test]
async fn test_list_tools_through_dispatcher() {
    let connector = Arc::new(MockConnector::default());
    let (dispatcher, _) = dispatcher(connector);

    let tools = dispatcher.list_tools("beta").await.unwrap();
    assert_eq!(tools[0].name, "beta_tool");
    assert!(matches!(
        dispatcher.list_tools("gamma").await,
        Err(BridgeError::BackendUnknown(_))
    ));
}
