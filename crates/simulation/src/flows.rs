//! Flow dependency graph and completion tracking.

use crate::error::SimulationError;
use flowsim_deadlock::graph::{find_cycle, Adjacency};
use flowsim_types::{ConfigError, FlowConfig, FlowId, OffsetType};
use indexmap::IndexMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
struct FlowNode {
    dependencies: Vec<FlowId>,
    dependents: Vec<FlowId>,
    started: bool,
    completed: bool,
}

/// Owns the static dependency DAG and per-flow started/completed status.
///
/// Each status is set at most once; a second mark is a logic error.
#[derive(Debug, Clone)]
pub struct FlowController {
    flows: IndexMap<FlowId, FlowNode>,
}

impl FlowController {
    /// Build the dependency graph and reject cycles.
    pub fn new(flows: &[FlowConfig]) -> Result<Self, SimulationError> {
        let mut nodes: IndexMap<FlowId, FlowNode> = flows
            .iter()
            .map(|flow| {
                let node = FlowNode {
                    dependencies: flow.dependencies.clone(),
                    ..FlowNode::default()
                };
                (flow.flow_id.clone(), node)
            })
            .collect();

        for flow in flows {
            for dependency in &flow.dependencies {
                let node = nodes.get_mut(dependency).ok_or_else(|| {
                    ConfigError::UnknownDependency {
                        flow: flow.flow_id.clone(),
                        dependency: dependency.clone(),
                    }
                })?;
                node.dependents.push(flow.flow_id.clone());
            }
        }

        let graph: Adjacency<FlowId> = flows
            .iter()
            .map(|flow| {
                (
                    flow.flow_id.clone(),
                    flow.dependencies.iter().cloned().collect(),
                )
            })
            .collect();
        if let Some(cycle) = find_cycle(&graph) {
            return Err(ConfigError::DependencyCycle { cycle }.into());
        }

        debug!(flows = nodes.len(), "Flow dependency graph built");
        Ok(Self { flows: nodes })
    }

    fn node_mut(&mut self, flow: &FlowId) -> Result<&mut FlowNode, SimulationError> {
        self.flows
            .get_mut(flow)
            .ok_or_else(|| SimulationError::UnknownFlow(flow.clone()))
    }

    pub fn mark_started(&mut self, flow: &FlowId) -> Result<(), SimulationError> {
        let node = self.node_mut(flow)?;
        if node.started {
            return Err(SimulationError::FlowAlreadyStarted(flow.clone()));
        }
        node.started = true;
        Ok(())
    }

    pub fn mark_completed(&mut self, flow: &FlowId) -> Result<(), SimulationError> {
        let node = self.node_mut(flow)?;
        if node.completed {
            return Err(SimulationError::FlowAlreadyCompleted(flow.clone()));
        }
        node.completed = true;
        Ok(())
    }

    pub fn is_started(&self, flow: &str) -> bool {
        self.flows.get(flow).is_some_and(|n| n.started)
    }

    pub fn is_completed(&self, flow: &str) -> bool {
        self.flows.get(flow).is_some_and(|n| n.completed)
    }

    /// Whether every dependency satisfies `offset_type`: completed for
    /// finish-to-start, started for start-to-start.
    pub fn is_ready(&self, dependencies: &[FlowId], offset_type: OffsetType) -> bool {
        dependencies.iter().all(|dep| match offset_type {
            OffsetType::FinishToStart => self.is_completed(dep.as_str()),
            OffsetType::StartToStart => self.is_started(dep.as_str()),
        })
    }

    /// Flows that list `flow` as a dependency, in configuration order.
    pub fn dependents(&self, flow: &str) -> &[FlowId] {
        self.flows
            .get(flow)
            .map(|n| n.dependents.as_slice())
            .unwrap_or_default()
    }

    pub fn dependencies(&self, flow: &str) -> &[FlowId] {
        self.flows
            .get(flow)
            .map(|n| n.dependencies.as_slice())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn completed_count(&self) -> usize {
        self.flows.values().filter(|n| n.completed).count()
    }
}
