//! The assembly-time registry of every scheduler and solder edge.

use crate::config::BackboneConfig;
use crate::error::{Result, WiringError};
use crate::metrics::SchedulerMetrics;
use crate::wiring::output::SolderType;
use crate::wiring::scheduler::TaskSchedulerBuilder;
use parking_lot::Mutex;
use petgraph::algo::tarjan_scc;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VertexKind {
    Scheduler,
    Consumer,
}

#[derive(Debug)]
struct Vertex {
    name: String,
    kind: VertexKind,
    capacity: Option<u64>,
    metrics: Option<SchedulerMetrics>,
}

#[derive(Debug)]
struct ModelEdge {
    from: usize,
    to: usize,
    label: String,
    solder_type: SolderType,
}

#[derive(Debug, Default)]
struct ModelGraph {
    vertices: Vec<Vertex>,
    by_name: HashMap<String, usize>,
    edges: Vec<ModelEdge>,
}

impl ModelGraph {
    fn add_vertex(&mut self, vertex: Vertex) -> Result<()> {
        if self.by_name.contains_key(&vertex.name) {
            return Err(WiringError::DuplicateName(vertex.name));
        }
        self.by_name.insert(vertex.name.clone(), self.vertices.len());
        self.vertices.push(vertex);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| WiringError::InvalidName(name.to_string()))
    }
}

/// Registry of a statically wired processing graph.
///
/// Cloning is cheap; clones share the same graph.
#[derive(Debug, Clone)]
pub struct WiringModel {
    graph: Arc<Mutex<ModelGraph>>,
    default_capacity: Option<u64>,
    max_backoff_sleep: Duration,
}

impl WiringModel {
    /// An empty model with default settings
    pub fn new() -> Self {
        Self::with_config(&BackboneConfig::default())
    }

    /// An empty model taking scheduler defaults from `config`.
    /// A default capacity of zero is raised to one.
    pub fn with_config(config: &BackboneConfig) -> Self {
        Self {
            graph: Arc::new(Mutex::new(ModelGraph::default())),
            default_capacity: config.default_unhandled_task_capacity.map(|c| c.max(1)),
            max_backoff_sleep: Duration::from_micros(config.backpressure_backoff_max_us),
        }
    }

    /// Start building a scheduler. The name must be a legal identifier.
    pub fn scheduler_builder(&self, name: &str) -> Result<TaskSchedulerBuilder> {
        validate_name(name)?;
        Ok(TaskSchedulerBuilder::new(
            self.clone(),
            name.to_string(),
            self.default_capacity,
            self.max_backoff_sleep,
        ))
    }

    pub(crate) fn register_scheduler(
        &self,
        name: &str,
        capacity: Option<u64>,
        metrics: SchedulerMetrics,
    ) -> Result<()> {
        self.graph.lock().add_vertex(Vertex {
            name: name.to_string(),
            kind: VertexKind::Scheduler,
            capacity,
            metrics: Some(metrics),
        })?;
        debug!(scheduler = name, ?capacity, "scheduler registered");
        Ok(())
    }

    pub(crate) fn register_edge(
        &self,
        from: &str,
        to: &str,
        label: &str,
        solder_type: SolderType,
    ) -> Result<()> {
        let mut graph = self.graph.lock();
        let from = graph.index_of(from)?;
        let to = graph.index_of(to)?;
        graph.edges.push(ModelEdge {
            from,
            to,
            label: label.to_string(),
            solder_type,
        });
        Ok(())
    }

    pub(crate) fn register_consumer(&self, from: &str, name: &str) -> Result<()> {
        validate_name(name)?;
        let mut graph = self.graph.lock();
        let from = graph.index_of(from)?;
        graph.add_vertex(Vertex {
            name: name.to_string(),
            kind: VertexKind::Consumer,
            capacity: None,
            metrics: None,
        })?;
        let to = graph.vertices.len() - 1;
        graph.edges.push(ModelEdge {
            from,
            to,
            label: name.to_string(),
            solder_type: SolderType::Put,
        });
        Ok(())
    }

    /// True if some cycle of blocking edges passes through a bounded
    /// scheduler. Handlers run on the caller's thread, so a task that loops
    /// back into a full scheduler waits on itself; unbounded schedulers on
    /// the cycle do not help. Only an injecting or offering edge, which never
    /// waits, breaks such a cycle.
    pub fn check_for_cyclical_backpressure(&self) -> bool {
        let graph = self.graph.lock();
        let mut blocking = DiGraph::<usize, ()>::new();
        let mut nodes = HashMap::new();
        for (index, vertex) in graph.vertices.iter().enumerate() {
            if vertex.kind == VertexKind::Scheduler {
                nodes.insert(index, blocking.add_node(index));
            }
        }
        for edge in graph.edges.iter().filter(|e| e.solder_type == SolderType::Put) {
            if let (Some(&from), Some(&to)) = (nodes.get(&edge.from), nodes.get(&edge.to)) {
                blocking.add_edge(from, to, ());
            }
        }

        let cyclic = tarjan_scc(&blocking).into_iter().any(|component| {
            let loops = component.len() > 1
                || blocking.contains_edge(component[0], component[0]);
            loops
                && component
                    .iter()
                    .any(|&node| graph.vertices[blocking[node]].capacity.is_some())
        });
        if cyclic {
            warn!("wiring model contains a cycle of backpressure edges");
        }
        cyclic
    }

    /// Render the graph as a mermaid flowchart.
    /// Injecting and offering edges are dashed.
    pub fn generate_wiring_diagram(&self) -> String {
        let graph = self.graph.lock();
        let mut diagram = String::from("flowchart LR\n");
        for vertex in &graph.vertices {
            let _ = match (vertex.kind, vertex.capacity) {
                (VertexKind::Consumer, _) => {
                    writeln!(diagram, "    {}([\"{}\"])", vertex.name, vertex.name)
                }
                (VertexKind::Scheduler, Some(capacity)) => writeln!(
                    diagram,
                    "    {}[\"{} ({})\"]",
                    vertex.name, vertex.name, capacity
                ),
                (VertexKind::Scheduler, None) => {
                    writeln!(diagram, "    {}[\"{}\"]", vertex.name, vertex.name)
                }
            };
        }
        for edge in &graph.edges {
            let from = &graph.vertices[edge.from].name;
            let to = &graph.vertices[edge.to].name;
            let _ = match edge.solder_type {
                SolderType::Put => writeln!(diagram, "    {} -- {} --> {}", from, edge.label, to),
                SolderType::Inject | SolderType::Offer => {
                    writeln!(diagram, "    {} -. {} .-> {}", from, edge.label, to)
                }
            };
        }
        diagram
    }

    /// Metrics of the named scheduler
    pub fn scheduler_metrics(&self, name: &str) -> Option<SchedulerMetrics> {
        let graph = self.graph.lock();
        let index = graph.by_name.get(name)?;
        graph.vertices[*index].metrics.clone()
    }

    /// One line of metrics per scheduler, in registration order
    pub fn metrics_summary(&self) -> String {
        let graph = self.graph.lock();
        let mut summary = String::from("Wiring Metrics Summary:\n");
        for vertex in &graph.vertices {
            if let Some(metrics) = &vertex.metrics {
                let _ = writeln!(summary, "  {}: {}", vertex.name, metrics.snapshot().format());
            }
        }
        summary
    }

    /// Number of registered schedulers, consumers excluded
    pub fn scheduler_count(&self) -> usize {
        self.graph
            .lock()
            .vertices
            .iter()
            .filter(|v| v.kind == VertexKind::Scheduler)
            .count()
    }
}

impl Default for WiringModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Names must be non-empty and contain only ASCII letters, digits and `_`
pub fn validate_name(name: &str) -> Result<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(WiringError::InvalidName(name.to_string()))
    }
}
