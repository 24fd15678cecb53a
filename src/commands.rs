//! CLI command implementations

use anyhow::{Context, bail};
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use trellis_core::operations::{AddPinned, DirectHierarchy, Direction, TransitiveHierarchy};
use trellis_core::{
    CONFIG_FILE, Graph, GraphStatistics, MaterializedGraph, MemoryWorkspace, NodeKey, Operation,
    PassToken, Relationship, Subgraph, TrellisConfig, rank_types,
};
use trellis_orchestrator::{Orchestrator, OrchestratorEvent, OrchestratorOptions, WorkspaceWatcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LinkKind {
    Inherits,
    Implements,
}

impl From<LinkKind> for Relationship {
    fn from(kind: LinkKind) -> Self {
        match kind {
            LinkKind::Inherits => Relationship::INHERITS,
            LinkKind::Implements => Relationship::IMPLEMENTS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueryArgs {
    pub type_name: String,
    pub transitive: bool,
    pub dependents: bool,
    pub kind: Option<LinkKind>,
    pub json: bool,
}

/// An explicit config must exist; otherwise `trellis.toml` beside the model
/// is used when present.
pub fn load_config(explicit: Option<&Path>, model: &Path) -> anyhow::Result<TrellisConfig> {
    let config = match explicit {
        Some(path) => TrellisConfig::load(path)?,
        None => {
            let beside = model
                .parent()
                .map(|dir| dir.join(CONFIG_FILE))
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            TrellisConfig::load_or_default(&beside)?
        }
    };
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}

fn build_graph(model: &Path, config: &TrellisConfig) -> anyhow::Result<Graph> {
    let workspace = MemoryWorkspace::load(model)
        .with_context(|| format!("failed to load workspace model {}", model.display()))?;
    Graph::build(&workspace, &config.universe(), &PassToken::detached())
        .context("graph build was cancelled")
}

pub fn index(model: &Path, config: &TrellisConfig) -> anyhow::Result<()> {
    tracing::info!("Indexing workspace model: {}", model.display());

    let graph = build_graph(model, config)?;
    print!("{}", GraphStatistics::compute(&graph));

    let ranking = rank_types(&graph, config.subgraph.important_types);
    if !ranking.is_empty() {
        println!("most important types:");
        for ranked in ranking {
            println!(
                "  {:<8} {} ({} dependents)",
                format!("{:?}", ranked.importance).to_lowercase(),
                ranked.key,
                ranked.score
            );
        }
    }
    Ok(())
}

pub fn query(model: &Path, config: &TrellisConfig, args: &QueryArgs) -> anyhow::Result<()> {
    let graph = build_graph(model, config)?;
    let root = NodeKey::new(args.type_name.as_str());
    if graph.node(&root).is_none() {
        bail!("unknown type `{}`", args.type_name);
    }

    let direction = if args.dependents {
        Direction::Dependents
    } else {
        Direction::Dependencies
    };
    let relationship = args.kind.map(Relationship::from);
    let operation: Box<dyn Operation> = if args.transitive {
        let mut operation = TransitiveHierarchy::new(root, direction)
            .with_check_interval(config.orchestrator.traversal_check_interval);
        if let Some(relationship) = relationship {
            operation = operation.with_relationship(relationship);
        }
        Box::new(operation)
    } else {
        let mut operation = DirectHierarchy::new(root, direction);
        if let Some(relationship) = relationship {
            operation = operation.with_relationship(relationship);
        }
        Box::new(operation)
    };

    let mut subgraph = Subgraph::with_filter(Arc::new(config.node_filter()));
    operation.apply(&graph, &mut subgraph, &PassToken::detached());
    let snapshot = MaterializedGraph::build(1, &graph, &subgraph);

    if args.json {
        println!("{}", snapshot.to_json()?);
        return Ok(());
    }
    for node in &snapshot.nodes {
        println!("{}", node.node.key);
    }
    for link in &snapshot.edges {
        println!("{} -> {} [{}]", link.dependent, link.dependency, link.relationship);
    }
    Ok(())
}

pub async fn watch(model: PathBuf, config: TrellisConfig, pins: Vec<String>) -> anyhow::Result<()> {
    let workspace = Arc::new(
        MemoryWorkspace::load(&model)
            .with_context(|| format!("failed to load workspace model {}", model.display()))?,
    );
    let orchestrator = Orchestrator::new(
        workspace.clone(),
        None,
        OrchestratorOptions::from_config(&config),
    )?;
    let mut events = orchestrator.subscribe();

    let watcher = WorkspaceWatcher::new(&model, workspace, orchestrator.clone())?;
    tokio::spawn(watcher.run());

    if pins.is_empty() {
        orchestrator.invalidate_graph();
    } else {
        orchestrator.submit_operation(AddPinned::new(pins.iter().map(String::as_str)));
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(OrchestratorEvent::SubgraphChanged(snapshot)) => {
                    let keys: Vec<String> = snapshot.keys().iter().map(ToString::to_string).collect();
                    println!("#{} {} types: {}", snapshot.sequence, keys.len(), keys.join(", "));
                }
                Ok(OrchestratorEvent::PassFailed { pass, error }) => {
                    tracing::warn!(pass, "pass failed: {:#}", error);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "dropped orchestrator events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    orchestrator.shutdown();
    tracing::info!("Stopped watching {}", model.display());
    Ok(())
}
