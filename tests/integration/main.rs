//! Integration tests for Trellis
//!
//! These drive the CLI binary and a live orchestrator over the fixture
//! workspace model in `tests/fixtures`.

use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_test::{assert_err, assert_ok};
use trellis_core::operations::{Direction, TransitiveHierarchy};
use trellis_core::{MaterializedGraph, MemoryWorkspace, NodeKey};
use trellis_orchestrator::{Orchestrator, OrchestratorEvent, OrchestratorOptions, WorkspaceWatcher};

fn fixture() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/shapes.toml")
}

fn trellis(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_trellis"))
        .args(args)
        .output()
        .expect("failed to run trellis")
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn test_cli_help() {
    let output = trellis(&["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Type dependency graphs"));
    assert!(stdout.contains("query"));
}

#[test]
fn test_index_prints_statistics() {
    let model = fixture();
    let output = trellis(&["index", model.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let lines = stdout_lines(&output);
    assert_eq!(lines[0], "7 types, 8 links, 6 files");
    assert!(lines.iter().any(|line| line == "  inherits: 2, implements: 2"));
    assert!(lines.iter().any(|line| line == "  Canvas: 2"));
}

#[test]
fn test_query_direct_dependents() {
    let model = fixture();
    let output = trellis(&[
        "query",
        model.to_str().unwrap(),
        "Shape",
        "--dependents",
        "--kind",
        "inherits",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    assert_eq!(
        stdout_lines(&output),
        vec![
            "Circle",
            "Shape",
            "Square",
            "Circle -> Shape [inherits]",
            "Square -> Shape [inherits]",
        ]
    );
}

#[test]
fn test_query_transitive_json() {
    let model = fixture();
    let output = trellis(&["query", model.to_str().unwrap(), "Renderer", "--transitive", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let snapshot: MaterializedGraph = serde_json::from_slice(&output.stdout).unwrap();
    let keys: Vec<String> = snapshot.keys().iter().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["Circle", "IDrawable", "Point", "Renderer", "Shape"]);
    assert_eq!(snapshot.statistics.node_count, 5);
}

#[test]
fn test_query_unknown_type_fails() {
    let model = fixture();
    let output = trellis(&["query", model.to_str().unwrap(), "Triangle"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown type `Triangle`"));
}

#[test]
fn test_config_limits_projects() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("trellis.toml");
    std::fs::write(&config, "[graph]\nincluded_projects = [\"Geometry\"]\n").unwrap();

    let model = fixture();
    let output = trellis(&["--config", config.to_str().unwrap(), "index", model.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(stdout_lines(&output)[0], "5 types, 6 links, 5 files");
}

#[test]
fn test_invalid_config_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("trellis.toml");
    std::fs::write(&config, "[orchestrator]\ntraversal_check_interval = 0\n").unwrap();

    let model = fixture();
    let output = trellis(&["--config", config.to_str().unwrap(), "index", model.to_str().unwrap()]);
    assert!(!output.status.success());
}

async fn next_snapshot(
    events: &mut broadcast::Receiver<OrchestratorEvent>,
) -> Arc<MaterializedGraph> {
    timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(OrchestratorEvent::SubgraphChanged(snapshot)) => return snapshot,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("no snapshot in time")
}

/// Editing the model file on disk flows through the watcher into a new
/// snapshot.
#[tokio::test]
async fn test_live_model_edit() {
    let temp_dir = TempDir::new().unwrap();
    let model = temp_dir.path().join("shapes.toml");
    let original = std::fs::read_to_string(fixture()).unwrap();
    std::fs::write(&model, &original).unwrap();

    let workspace = Arc::new(assert_ok!(MemoryWorkspace::load(&model)));
    let options = OrchestratorOptions {
        document_idle: Duration::from_millis(20),
        graph_idle: Duration::from_millis(40),
        ..OrchestratorOptions::default()
    };
    let orchestrator = assert_ok!(Orchestrator::new(workspace.clone(), None, options));
    let mut events = orchestrator.subscribe();
    let watcher = assert_ok!(WorkspaceWatcher::new(&model, workspace, orchestrator.clone()));
    tokio::spawn(watcher.run());

    orchestrator.submit_operation(TransitiveHierarchy::new("Circle", Direction::Dependencies));
    let snapshot = next_snapshot(&mut events).await;
    assert!(snapshot.node(&NodeKey::from("Point")).is_some());

    // Shape no longer uses Point
    let edited = original.replacen("name = \"Shape\"\nuses = [\"Point\"]", "name = \"Shape\"", 1);
    assert_ne!(edited, original);
    std::fs::write(&model, edited).unwrap();

    let snapshot = timeout(Duration::from_secs(10), async {
        loop {
            let snapshot = next_snapshot(&mut events).await;
            if snapshot
                .edges
                .iter()
                .all(|link| !(link.dependent.0 == "Shape" && link.dependency.0 == "Point"))
            {
                return snapshot;
            }
        }
    })
    .await
    .expect("edit never reached the subgraph");

    // Point stays: it is still pinned from the first traversal
    assert!(snapshot.node(&NodeKey::from("Point")).is_some());
    orchestrator.shutdown();
}

#[tokio::test]
async fn test_watcher_needs_existing_directory() {
    let workspace = Arc::new(MemoryWorkspace::new());
    let orchestrator = assert_ok!(Orchestrator::new(
        workspace.clone(),
        None,
        OrchestratorOptions::default()
    ));
    assert_err!(WorkspaceWatcher::new(
        "/nonexistent/trellis/shapes.toml",
        workspace,
        orchestrator.clone()
    ));
    orchestrator.shutdown();
}
