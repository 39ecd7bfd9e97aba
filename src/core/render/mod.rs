// src/core/render/mod.rs
//! Text emitters for finished sequence diagrams

mod plantuml;
mod mermaid;
mod json;

use crate::config::OutputFormat;
use crate::core::sequence::{ControlContext, ControlFrame, SequenceDiagram};
use crate::error::Result;

pub use plantuml::PlantUmlRenderer;
pub use mermaid::MermaidRenderer;
pub use json::JsonRenderer;

pub trait DiagramRenderer: Send + Sync {
    /// File extension of the rendered output, without the dot
    fn extension(&self) -> &'static str;

    fn render(&self, diagram: &SequenceDiagram) -> Result<String>;
}

pub fn renderer_for(format: OutputFormat) -> Box<dyn DiagramRenderer> {
    match format {
        OutputFormat::Plantuml => Box::new(PlantUmlRenderer),
        OutputFormat::Mermaid => Box::new(MermaidRenderer),
        OutputFormat::Json => Box::new(JsonRenderer),
    }
}

/// Combined-fragment boundary crossed between two consecutive messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FragmentEvent<'c> {
    Open(&'c ControlFrame),
    /// Next alternative of the fragment that is already open
    Alternative(&'c ControlFrame),
    Close(&'c ControlFrame),
}

/// Fragment events needed to move from `prev`'s nesting to `next`'s,
/// innermost closes first
pub(crate) fn transition<'c>(prev: &'c ControlContext, next: &'c ControlContext) -> Vec<FragmentEvent<'c>> {
    let prev_frames = prev.frames();
    let next_frames = next.frames();
    let shared = prev.common_prefix_len(next);
    let mut events = Vec::new();

    let sibling = match (prev_frames.get(shared), next_frames.get(shared)) {
        (Some(p), Some(n)) => n.is_alternative_of(p),
        _ => false,
    };

    let keep = if sibling { shared + 1 } else { shared };
    for frame in prev_frames[keep..].iter().rev() {
        events.push(FragmentEvent::Close(frame));
    }

    if sibling {
        events.push(FragmentEvent::Alternative(&next_frames[shared]));
    }
    for frame in &next_frames[keep..] {
        events.push(FragmentEvent::Open(frame));
    }

    events
}

/// Collapse whitespace so labels stay on one line
pub(crate) fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text shown next to a fragment keyword; a bare `else` needs none
pub(crate) fn fragment_label(frame: &ControlFrame) -> Option<String> {
    frame
        .label()
        .map(single_line)
        .filter(|label| !label.is_empty() && label != "else")
}

/// Comment text without its `\uml{note}` marker
pub(crate) fn note_text(comment: &str) -> String {
    let text = comment.trim();
    let text = text.strip_prefix('\\').unwrap_or(text);
    let text = text.strip_prefix("uml{note}").unwrap_or(text);
    text.trim().to_string()
}
