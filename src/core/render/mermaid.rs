// src/core/render/mermaid.rs
use std::fmt::Write;

use crate::core::sequence::{
    ControlContext, ControlFrame, Message, MessageKind, MessageScope, MessageSequence, ParticipantKind,
    SequenceDiagram,
};
use crate::error::Result;
use super::{fragment_label, note_text, transition, DiagramRenderer, FragmentEvent};

const INDENT: &str = "    ";

#[derive(Debug, Clone, Copy, Default)]
pub struct MermaidRenderer;

impl DiagramRenderer for MermaidRenderer {
    fn extension(&self) -> &'static str {
        "mmd"
    }

    fn render(&self, diagram: &SequenceDiagram) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "sequenceDiagram")?;

        for participant in diagram.lifelines() {
            let keyword = match participant.kind {
                ParticipantKind::External => "actor",
                _ => "participant",
            };
            writeln!(out, "{}{} {} as {}", INDENT, keyword, alias(participant.id), escape(&participant.full_name))?;
        }

        let multiple = diagram.sequences.len() > 1;
        for sequence in &diagram.sequences {
            if multiple {
                writeln!(out, "{}rect rgb(250, 250, 250)", INDENT)?;
                writeln!(out, "{}Note over {}: {}", INDENT, entry_alias(diagram, sequence), escape(&sequence.label))?;
            }

            let empty = ControlContext::default();
            let mut current = &empty;
            for message in &sequence.messages {
                write_fragments(&mut out, transition(current, &message.context))?;
                write_message(&mut out, diagram, message)?;
                current = &message.context;
            }
            write_fragments(&mut out, transition(current, &empty))?;

            if multiple {
                writeln!(out, "{}end", INDENT)?;
            }
        }

        Ok(out)
    }
}

fn alias(id: impl std::fmt::Display) -> String {
    format!("P_{}", id)
}

fn entry_alias(diagram: &SequenceDiagram, sequence: &MessageSequence) -> String {
    match sequence.entry_points.first() {
        Some(id) => alias(diagram.lifeline(*id)),
        None => diagram
            .lifelines()
            .first()
            .map(|p| alias(p.id))
            .unwrap_or_default(),
    }
}

/// Mermaid ends a message at `;` and treats `#` as an entity prefix
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '#' => escaped.push_str("#35;"),
            ';' => escaped.push_str("#59;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn write_message(out: &mut String, diagram: &SequenceDiagram, message: &Message) -> Result<()> {
    let from = alias(diagram.lifeline(message.from));
    let to = alias(diagram.lifeline(message.to));

    if message.kind == MessageKind::Response {
        let label = if message.operation == "void" { "" } else { message.operation.as_str() };
        writeln!(out, "{}{}-->>{}: {}", INDENT, from, to, escape(label))?;
        return Ok(());
    }

    let arrow = match message.kind {
        MessageKind::AsyncCall => "-)",
        _ => "->>",
    };

    let mut label = escape(&message.operation);
    if message.kind == MessageKind::CoAwait {
        label = format!("co_await {}", label);
    }
    if message.scope == MessageScope::Condition {
        label = format!("[{}]", label);
    }
    writeln!(out, "{}{}{}{}: {}", INDENT, from, arrow, to, label)?;

    if let Some(note) = &message.note {
        writeln!(out, "{}Note right of {}: {}", INDENT, to, escape(&note_text(note)))?;
    }
    Ok(())
}

fn write_fragments(out: &mut String, events: Vec<FragmentEvent<'_>>) -> Result<()> {
    for event in events {
        match event {
            FragmentEvent::Open(frame) => {
                let (keyword, fallback) = match frame {
                    ControlFrame::Branch { .. } => ("alt", ""),
                    ControlFrame::Loop { .. } => ("loop", ""),
                    ControlFrame::TryCatch { .. } => ("critical", "catch"),
                    ControlFrame::Coroutine { .. } => ("opt", "coroutine"),
                };
                let label = fragment_label(frame).unwrap_or_else(|| fallback.to_string());
                writeln!(out, "{}{} {}", INDENT, keyword, escape(&label))?;
            }
            FragmentEvent::Alternative(frame) => {
                let keyword = match frame {
                    ControlFrame::TryCatch { .. } => "option",
                    _ => "else",
                };
                let label = fragment_label(frame).unwrap_or_default();
                writeln!(out, "{}{} {}", INDENT, keyword, escape(&label))?;
            }
            FragmentEvent::Close(_) => writeln!(out, "{}end", INDENT)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntryPointSpec, MultiplexMode, SequenceDiagramConfig};
    use crate::core::ast::fixtures::*;
    use crate::core::ast::{AstIndex, CatchHandler, Decl, Stmt};
    use crate::core::sequence::SequenceDiagramGenerator;

    fn render(decls: Vec<Decl>, config: SequenceDiagramConfig) -> String {
        let index = AstIndex::from_units(vec![unit(decls)]);
        let diagram = SequenceDiagramGenerator::new(&index).generate("t", &config, None).unwrap();
        MermaidRenderer.render(&diagram).unwrap()
    }

    fn config(entry: &str) -> SequenceDiagramConfig {
        SequenceDiagramConfig::starting_from(EntryPointSpec::Function(entry.to_string()))
    }

    #[test]
    fn test_calls_and_catch_handlers() {
        let output = render(
            vec![
                function(1, "work", vec![], Some(block(vec![]))),
                function(2, "recover", vec![], Some(block(vec![]))),
                function(3, "tmain", vec![], Some(block(vec![Stmt::Try {
                    body: Box::new(block(vec![expr(call(1))])),
                    handlers: vec![CatchHandler {
                        exception: Some("std::exception &e".to_string()),
                        body: block(vec![expr(call(2))]),
                    }],
                }]))),
            ],
            config("tmain"),
        );

        assert!(output.starts_with("sequenceDiagram\n"));
        let lines: Vec<&str> = output.lines().map(str::trim).filter(|l| !l.starts_with("participant")).collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[1].contains("->>"));
        assert!(lines[1].ends_with(": work()"));
        assert!(lines[2].starts_with("critical"));
        assert!(lines[3].ends_with(": recover()"));
        assert_eq!(lines[4], "end");
    }

    #[test]
    fn test_chains_are_separated() {
        let mut config = config("tmain");
        config.mode = MultiplexMode::Chains;
        config.start_from.push(EntryPointSpec::Function("other".to_string()));
        let output = render(
            vec![
                function(1, "work", vec![], Some(block(vec![]))),
                function(2, "tmain", vec![], Some(block(vec![expr(call(1))]))),
                function(3, "other", vec![], Some(block(vec![expr(call(1))]))),
            ],
            config,
        );

        assert_eq!(output.matches("rect rgb").count(), 2);
        assert!(output.contains(": tmain()"));
        assert!(output.contains(": other()"));
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a;b#c"), "a#59;b#35;c");
    }
}
