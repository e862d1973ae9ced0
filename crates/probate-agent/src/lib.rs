pub mod coordinator;
pub mod graph;
pub mod poller;
pub mod runner;
pub mod service;

pub use coordinator::{Coordinator, Directive};
pub use graph::{EdgeKind, StepEdge, StepGraph, Transition};
pub use poller::{PollOutcome, Poller};
pub use runner::StepRunner;
pub use service::{CoordinatorHandle, CoordinatorService};
