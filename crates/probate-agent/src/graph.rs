//! Step transition table.
//!
//! The pipeline is an explicit list of edges rather than positions in an
//! array: linear edges walk the catalog, loop edges form the
//! open → click → close ring, and exactly one `LoopClose` edge marks where an
//! iteration ends. A step with no outgoing edge is terminal.

use probate_core::error::{ProbateError, Result};
use probate_core::types::WorkflowStep;

/// How a step hands over to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Ordinary progression through the catalog.
    Linear,
    /// Progression inside the loop ring.
    Loop,
    /// Returns to the head of the ring; cursor and stall bookkeeping run here.
    LoopClose,
}

/// An edge connecting two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepEdge {
    pub from: WorkflowStep,
    pub to: WorkflowStep,
    pub kind: EdgeKind,
}

impl StepEdge {
    pub fn linear(from: WorkflowStep, to: WorkflowStep) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Linear,
        }
    }

    pub fn ring(from: WorkflowStep, to: WorkflowStep) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::Loop,
        }
    }

    pub fn close(from: WorkflowStep, to: WorkflowStep) -> Self {
        Self {
            from,
            to,
            kind: EdgeKind::LoopClose,
        }
    }
}

/// What completing a step leads to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Move on to the given step.
    Advance(WorkflowStep),
    /// One loop iteration finished; the ring restarts at the given step.
    CloseLoop(WorkflowStep),
    /// No successor; the pipeline is exhausted.
    Finish,
}

/// Validated step graph.
#[derive(Debug, Clone)]
pub struct StepGraph {
    entry: WorkflowStep,
    edges: Vec<StepEdge>,
}

impl StepGraph {
    /// Build a graph, rejecting steps with more than one successor and more
    /// than one loop closure.
    pub fn new(entry: WorkflowStep, edges: Vec<StepEdge>) -> Result<Self> {
        for (i, edge) in edges.iter().enumerate() {
            if edges[..i].iter().any(|e| e.from == edge.from) {
                return Err(ProbateError::Config(format!(
                    "step {} has more than one successor",
                    edge.from
                )));
            }
        }

        let closes = edges
            .iter()
            .filter(|e| e.kind == EdgeKind::LoopClose)
            .count();
        if closes > 1 {
            return Err(ProbateError::Config(format!(
                "graph has {closes} loop closures; at most one is allowed"
            )));
        }

        Ok(Self { entry, edges })
    }

    /// The NY Surrogate's Court pipeline: three linear steps into the
    /// open/click/close ring.
    pub fn probate() -> Self {
        use WorkflowStep::*;
        Self {
            entry: StartScrape,
            edges: vec![
                StepEdge::linear(StartScrape, FileSearchHome),
                StepEdge::linear(FileSearchHome, FileSearchResults),
                StepEdge::linear(FileSearchResults, OpenFileLinks),
                StepEdge::ring(OpenFileLinks, ClickProbatePetition),
                StepEdge::ring(ClickProbatePetition, CloseFile),
                StepEdge::close(CloseFile, OpenFileLinks),
            ],
        }
    }

    pub fn entry(&self) -> WorkflowStep {
        self.entry
    }

    pub fn edges(&self) -> &[StepEdge] {
        &self.edges
    }

    /// Successor of `step` on completion.
    pub fn transition(&self, step: WorkflowStep) -> Transition {
        match self.edges.iter().find(|e| e.from == step) {
            Some(edge) if edge.kind == EdgeKind::LoopClose => Transition::CloseLoop(edge.to),
            Some(edge) => Transition::Advance(edge.to),
            None => Transition::Finish,
        }
    }

    /// Whether `step` belongs to the loop ring.
    pub fn in_loop(&self, step: WorkflowStep) -> bool {
        self.edges
            .iter()
            .any(|e| e.kind != EdgeKind::Linear && (e.from == step || e.to == step))
    }
}

impl Default for StepGraph {
    fn default() -> Self {
        Self::probate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use WorkflowStep::*;

    #[test]
    fn probate_graph_walks_catalog_then_rings() {
        let graph = StepGraph::probate();
        assert_eq!(graph.entry(), StartScrape);
        assert_eq!(graph.transition(StartScrape), Transition::Advance(FileSearchHome));
        assert_eq!(graph.transition(FileSearchHome), Transition::Advance(FileSearchResults));
        assert_eq!(graph.transition(FileSearchResults), Transition::Advance(OpenFileLinks));
        assert_eq!(graph.transition(OpenFileLinks), Transition::Advance(ClickProbatePetition));
        assert_eq!(graph.transition(ClickProbatePetition), Transition::Advance(CloseFile));
        assert_eq!(graph.transition(CloseFile), Transition::CloseLoop(OpenFileLinks));
    }

    #[test]
    fn probate_graph_passes_validation() {
        let graph = StepGraph::probate();
        assert!(StepGraph::new(graph.entry(), graph.edges().to_vec()).is_ok());
    }

    #[test]
    fn loop_membership() {
        let graph = StepGraph::probate();
        assert!(!graph.in_loop(StartScrape));
        assert!(!graph.in_loop(FileSearchResults));
        assert!(graph.in_loop(OpenFileLinks));
        assert!(graph.in_loop(ClickProbatePetition));
        assert!(graph.in_loop(CloseFile));
    }

    #[test]
    fn linear_graph_finishes_at_last_step() {
        let graph = StepGraph::new(
            StartScrape,
            vec![
                StepEdge::linear(StartScrape, FileSearchHome),
                StepEdge::linear(FileSearchHome, FileSearchResults),
            ],
        )
        .unwrap();
        assert_eq!(graph.transition(FileSearchResults), Transition::Finish);
        assert!(!graph.in_loop(FileSearchHome));
    }

    #[test]
    fn rejects_ambiguous_successor() {
        let err = StepGraph::new(
            StartScrape,
            vec![
                StepEdge::linear(StartScrape, FileSearchHome),
                StepEdge::linear(StartScrape, FileSearchResults),
            ],
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one successor"));
    }

    #[test]
    fn rejects_two_loop_closures() {
        let result = StepGraph::new(
            OpenFileLinks,
            vec![
                StepEdge::close(OpenFileLinks, ClickProbatePetition),
                StepEdge::close(ClickProbatePetition, OpenFileLinks),
            ],
        );
        assert!(result.is_err());
    }
}
