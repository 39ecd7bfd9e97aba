// src/core/sequence/message.rs
use serde::Serialize;

use crate::core::ast::SourceLocation;
use super::{ControlContext, ParticipantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Call,
    Response,
    AsyncCall,
    CoAwait,
}

/// Whether the call happened while evaluating a condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageScope {
    #[default]
    Normal,
    Condition,
}

/// How certain the traversal is about the callee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    Exact,
    /// Virtual dispatch, drawn against the static type
    StaticTypeOnly,
    /// Dependent call attributed to the primary template
    Approximate,
    /// Unresolved callee drawn as an external participant
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub from: ParticipantId,
    pub to: ParticipantId,
    pub operation: String,
    pub kind: MessageKind,
    pub context: ControlContext,
    /// Call depth below the entry point the message was emitted at
    pub depth: usize,
    pub scope: MessageScope,
    pub resolution: ResolutionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Message {
    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }
}

/// Ordered messages produced from one traversal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageSequence {
    pub label: String,
    pub entry_points: Vec<ParticipantId>,
    pub messages: Vec<Message>,
}

impl MessageSequence {
    pub fn push(&mut self, message: Message) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn calls(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| !m.is_response())
    }

    /// Attach a note to the most recent call emitted for `call_site`
    ///
    /// Returns false when no such message exists, e.g. because the callee
    /// was filtered out.
    pub fn attach_note(&mut self, call_site: &SourceLocation, note: &str) -> bool {
        let target = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| !m.is_response() && m.location.as_ref() == Some(call_site));

        match target {
            Some(message) => {
                message.note = Some(note.trim().to_string());
                true
            }
            None => false,
        }
    }

    /// Participants in order of first appearance, entry points first
    pub fn participant_order(&self) -> Vec<ParticipantId> {
        let mut order: Vec<ParticipantId> = Vec::new();
        let candidates = self
            .entry_points
            .iter()
            .copied()
            .chain(self.messages.iter().flat_map(|m| [m.from, m.to]));
        for id in candidates {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(to: u64, location: Option<SourceLocation>) -> Message {
        Message {
            from: ParticipantId::from_raw(1),
            to: ParticipantId::from_raw(to),
            operation: "f()".to_string(),
            kind: MessageKind::Call,
            context: ControlContext::default(),
            depth: 0,
            scope: MessageScope::Normal,
            resolution: ResolutionKind::Exact,
            location,
            return_type: None,
            note: None,
        }
    }

    #[test]
    fn test_attach_note_targets_latest_matching_call() {
        let site = SourceLocation::new("a.cc", 4, 2);
        let mut sequence = MessageSequence::default();
        sequence.push(message(2, Some(site.clone())));
        sequence.push(message(3, Some(site.clone())));
        sequence.push(message(4, None));

        assert!(sequence.attach_note(&site, " retry the request "));
        assert_eq!(sequence.messages[1].note.as_deref(), Some("retry the request"));
        assert!(sequence.messages[0].note.is_none());

        assert!(!sequence.attach_note(&SourceLocation::new("a.cc", 9, 1), "nothing here"));
    }

    #[test]
    fn test_participant_order_starts_with_entry_points() {
        let mut sequence = MessageSequence::default();
        sequence.entry_points.push(ParticipantId::from_raw(9));
        sequence.push(message(2, None));
        sequence.push(message(3, None));
        sequence.push(message(2, None));

        let order: Vec<u64> = sequence.participant_order().into_iter().map(|id| id.value()).collect();
        assert_eq!(order, vec![9, 1, 2, 3]);
    }
}
