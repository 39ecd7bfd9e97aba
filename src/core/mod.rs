// src/core/mod.rs
mod engine;

// Front-end syntax tree model and loading
pub mod ast;

// Sequence diagram reconstruction
pub mod sequence;

// Text emitters
pub mod render;

pub use engine::Engine;
