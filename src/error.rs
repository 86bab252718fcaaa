//! Error types for the simulation core
//!
//! Only usage errors are represented here. Logical no-ops (moving a locked
//! node, removing a node that is not a child, finalizing twice) are silent.

use thiserror::Error;

use crate::sim::NodeId;

/// Usage errors raised by the scene graph, the scheduler and configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("child index {index} is out of range ({len} child slots)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("node {node:?} is not a child of {container:?}")]
    NotAChild { node: NodeId, container: NodeId },

    #[error("node {0:?} is not a container")]
    NotAContainer(NodeId),

    #[error("node {0:?} does not exist")]
    NodeNotFound(NodeId),

    #[error("node {0:?} has no container")]
    NoContainer(NodeId),

    #[error("scheduler is full: all {0} callback slots are live")]
    SchedulerExhausted(usize),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, SimError>;
