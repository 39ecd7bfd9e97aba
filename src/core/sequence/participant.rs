// src/core/sequence/participant.rs
use std::fmt;
use serde::{Serialize, Serializer};

use crate::core::ast::SourceLocation;

/// Identity of a participant within one diagram pass
///
/// Derived from a hash of the participant key, so the same entity gets the
/// same id in every run over the same input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticipantId(u64);

impl ParticipantId {
    /// Returned for entities the diagram filters exclude
    pub const TOMBSTONE: ParticipantId = ParticipantId(0);

    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn is_tombstone(self) -> bool {
        self == Self::TOMBSTONE
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for ParticipantId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    Function,
    Method,
    Class,
    Lambda,
    CoroutineState,
    File,
    External,
}

impl ParticipantKind {
    pub fn tag(self) -> &'static str {
        match self {
            ParticipantKind::Function => "function",
            ParticipantKind::Method => "method",
            ParticipantKind::Class => "class",
            ParticipantKind::Lambda => "lambda",
            ParticipantKind::CoroutineState => "coroutine",
            ParticipantKind::File => "file",
            ParticipantKind::External => "external",
        }
    }
}

/// A node of the sequence diagram
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub kind: ParticipantKind,
    /// Flat identity key, `<kind>:<full name>`
    #[serde(skip)]
    pub key: String,
    /// Qualified name without the parameter list
    pub qualified_name: String,
    /// Qualified name including the signature where one exists
    pub full_name: String,
    /// Message label used when this participant is called
    pub operation: String,
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Class (or file) whose lifeline this participant is drawn on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<ParticipantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instantiated_from: Option<ParticipantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub is_static: bool,
}

impl Participant {
    /// Id of the lifeline this participant is drawn on
    pub fn lifeline(&self) -> ParticipantId {
        self.owner.unwrap_or(self.id)
    }
}
