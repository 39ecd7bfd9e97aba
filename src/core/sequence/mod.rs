// src/core/sequence/mod.rs
//! Sequence diagram reconstruction
//!
//! Walks function bodies from configured entry points and records who calls
//! whom, in source order, together with the control-flow fragments each
//! call happens inside. The result is a renderer-agnostic model; see
//! [`crate::core::render`] for the text emitters.

mod participant;
mod naming;
mod filter;
mod registry;
mod context;
mod recursion;
mod scope;
mod message;
mod resolution;
mod builder;
mod entry_points;
mod multiplexer;
mod diagram;

pub use participant::{Participant, ParticipantId, ParticipantKind};
pub use context::{ControlContext, ControlFrame};
pub use message::{Message, MessageKind, MessageScope, MessageSequence, ResolutionKind};
pub use entry_points::EntryPointDetector;
pub use diagram::{SequenceDiagram, SequenceDiagramGenerator};

#[cfg(test)]
pub use context::{BranchKind, LoopKind};
