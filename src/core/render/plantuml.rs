// src/core/render/plantuml.rs
use std::fmt::Write;

use crate::core::sequence::{
    ControlContext, ControlFrame, Message, MessageKind, MessageScope, ParticipantKind, SequenceDiagram,
};
use crate::error::Result;
use super::{fragment_label, note_text, transition, DiagramRenderer, FragmentEvent};

#[derive(Debug, Clone, Copy, Default)]
pub struct PlantUmlRenderer;

impl DiagramRenderer for PlantUmlRenderer {
    fn extension(&self) -> &'static str {
        "puml"
    }

    fn render(&self, diagram: &SequenceDiagram) -> Result<String> {
        let mut out = String::new();
        writeln!(out, "@startuml")?;
        writeln!(out, "title {}", diagram.name)?;

        for participant in diagram.lifelines() {
            let keyword = match participant.kind {
                ParticipantKind::External => "entity",
                ParticipantKind::File => "collections",
                _ => "participant",
            };
            writeln!(out, "{} \"{}\" as {}", keyword, participant.full_name, alias(participant.id))?;
        }

        let multiple = diagram.sequences.len() > 1;
        for (i, sequence) in diagram.sequences.iter().enumerate() {
            if multiple {
                if i > 0 {
                    writeln!(out, "newpage")?;
                }
                writeln!(out, "== {} ==", sequence.label)?;
            }

            let empty = ControlContext::default();
            let mut current = &empty;
            for message in &sequence.messages {
                write_fragments(&mut out, transition(current, &message.context))?;
                write_message(&mut out, diagram, message)?;
                current = &message.context;
            }
            write_fragments(&mut out, transition(current, &empty))?;
        }

        writeln!(out, "@enduml")?;
        Ok(out)
    }
}

fn alias(id: impl std::fmt::Display) -> String {
    format!("P_{}", id)
}

fn write_message(out: &mut String, diagram: &SequenceDiagram, message: &Message) -> Result<()> {
    let from = alias(diagram.lifeline(message.from));
    let to = alias(diagram.lifeline(message.to));

    if message.kind == MessageKind::Response {
        if message.operation.is_empty() || message.operation == "void" {
            writeln!(out, "{} --> {}", from, to)?;
        } else {
            writeln!(out, "{} --> {} : //{}//", from, to, message.operation)?;
        }
        return Ok(());
    }

    let arrow = match message.kind {
        MessageKind::AsyncCall => "->>",
        _ => "->",
    };

    let is_static = diagram.participant(message.to).map_or(false, |p| p.is_static);
    let mut label = if is_static {
        format!("__{}__", message.operation)
    } else {
        message.operation.clone()
    };
    if message.kind == MessageKind::CoAwait {
        label = format!("<<co_await>> {}", label);
    }
    if message.scope == MessageScope::Condition {
        label = format!("**[**{}**]**", label);
    }

    writeln!(out, "{} {} {} : {}", from, arrow, to, label)?;

    if let Some(note) = &message.note {
        writeln!(out, "note right")?;
        writeln!(out, "{}", note_text(note))?;
        writeln!(out, "end note")?;
    }
    Ok(())
}

fn write_fragments(out: &mut String, events: Vec<FragmentEvent<'_>>) -> Result<()> {
    for event in events {
        match event {
            FragmentEvent::Open(frame) => {
                let keyword = match frame {
                    ControlFrame::Branch { .. } => "alt",
                    ControlFrame::Loop { .. } => "loop",
                    ControlFrame::TryCatch { .. } => "group catch",
                    ControlFrame::Coroutine { .. } => "group coroutine",
                };
                match fragment_label(frame) {
                    Some(label) => writeln!(out, "{} {}", keyword, label)?,
                    None => writeln!(out, "{}", keyword)?,
                }
            }
            FragmentEvent::Alternative(frame) => match fragment_label(frame) {
                Some(label) => writeln!(out, "else {}", label)?,
                None => writeln!(out, "else")?,
            },
            FragmentEvent::Close(_) => writeln!(out, "end")?,
        }
    }
    Ok(())
}
