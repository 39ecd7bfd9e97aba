// src/core/sequence/diagram.rs
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::SequenceDiagramConfig;
use crate::core::ast::AstIndex;
use crate::error::{SeqwrightError, Result};
use super::builder::BuilderOptions;
use super::entry_points::EntryPointDetector;
use super::filter::ConfigFilter;
use super::multiplexer::EntryPointMultiplexer;
use super::registry::{Registry, RegistryOptions};
use super::{MessageSequence, Participant, ParticipantId};

/// Everything a renderer needs for one diagram
#[derive(Debug, Clone, Serialize)]
pub struct SequenceDiagram {
    pub name: String,
    /// Referenced participants in order of first appearance
    pub participants: Vec<Participant>,
    pub sequences: Vec<MessageSequence>,
    #[serde(skip)]
    index: HashMap<ParticipantId, usize>,
}

impl SequenceDiagram {
    /// Collect the participants the sequences refer to, owners ahead of
    /// the participants drawn on them
    pub fn assemble(name: impl Into<String>, registry: &Registry, sequences: Vec<MessageSequence>) -> Self {
        let mut diagram = Self {
            name: name.into(),
            participants: Vec::new(),
            sequences: Vec::new(),
            index: HashMap::new(),
        };

        for sequence in &sequences {
            for id in sequence.participant_order() {
                diagram.add(registry, id);
            }
        }
        diagram.sequences = sequences;
        diagram
    }

    fn add(&mut self, registry: &Registry, id: ParticipantId) {
        if self.index.contains_key(&id) {
            return;
        }
        let Some(participant) = registry.get(id) else { return };

        if let Some(owner) = participant.owner {
            self.add(registry, owner);
        }
        self.index.insert(id, self.participants.len());
        self.participants.push(participant.clone());

        if let Some(primary) = participant.instantiated_from {
            self.add(registry, primary);
        }
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.index.get(&id).map(|&i| &self.participants[i])
    }

    /// Lifeline a participant's messages are drawn on
    pub fn lifeline(&self, id: ParticipantId) -> ParticipantId {
        self.participant(id).map_or(id, Participant::lifeline)
    }

    /// Participants that carry at least one message or entry point, in
    /// order of first appearance
    pub fn lifelines(&self) -> Vec<&Participant> {
        let mut used = Vec::new();
        for sequence in &self.sequences {
            let endpoints = sequence
                .entry_points
                .iter()
                .copied()
                .chain(sequence.messages.iter().flat_map(|m| [m.from, m.to]));
            for id in endpoints {
                let lifeline = self.lifeline(id);
                if !used.contains(&lifeline) {
                    used.push(lifeline);
                }
            }
        }

        self.participants
            .iter()
            .filter(|p| used.contains(&p.id))
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.sequences.iter().map(MessageSequence::len).sum()
    }
}

#[derive(Debug, Clone)]
pub struct DiagramStatistics {
    pub entry_points: usize,
    pub sequences: usize,
    pub messages: usize,
    pub participants: usize,
    pub generation_time_ms: u128,
}

/// Builds one configured sequence diagram from the AST database
pub struct SequenceDiagramGenerator<'a> {
    ast: &'a AstIndex,
}

impl<'a> SequenceDiagramGenerator<'a> {
    pub fn new(ast: &'a AstIndex) -> Self {
        Self { ast }
    }

    pub fn generate(&self, name: &str, config: &SequenceDiagramConfig, root: Option<&Path>) -> Result<SequenceDiagram> {
        self.generate_with_statistics(name, config, root).map(|(diagram, _)| diagram)
    }

    pub fn generate_with_statistics(
        &self,
        name: &str,
        config: &SequenceDiagramConfig,
        root: Option<&Path>,
    ) -> Result<(SequenceDiagram, DiagramStatistics)> {
        let start_time = Instant::now();
        info!("🧭 Generating sequence diagram '{}'", name);

        let filter = ConfigFilter::new(&config.include, &config.exclude, root)
            .map_err(|e| diagram_error(name, e))?;
        let mut registry = Registry::new(RegistryOptions {
            combine_free_functions_into_file_participants: config.combine_free_functions_into_file_participants,
        });

        let entries = EntryPointDetector::new(self.ast)
            .detect_for(config)
            .map_err(|e| diagram_error(name, e))?;
        info!("🚪 Found {} entry points", entries.len());
        for entry in &entries {
            debug!("Entry point: {} (id {})", entry.name, entry.id);
        }

        let sequences = EntryPointMultiplexer::new(self.ast, &mut registry, &filter, BuilderOptions::from(config))
            .mode(config.effective_mode())
            .target(config.to.as_deref())
            .run(&entries)
            .map_err(|e| diagram_error(name, e))?;

        let diagram = SequenceDiagram::assemble(name, &registry, sequences);
        let stats = DiagramStatistics {
            entry_points: entries.len(),
            sequences: diagram.sequences.len(),
            messages: diagram.message_count(),
            participants: diagram.participants.len(),
            generation_time_ms: start_time.elapsed().as_millis(),
        };
        info!(
            "✅ Diagram '{}': {} messages across {} participants in {}ms",
            name, stats.messages, stats.participants, stats.generation_time_ms
        );
        Ok((diagram, stats))
    }
}

fn diagram_error(name: &str, error: SeqwrightError) -> SeqwrightError {
    match error {
        SeqwrightError::Diagram { .. } => error,
        other => SeqwrightError::Diagram {
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntryPointSpec, FilterRules, MultiplexMode};
    use crate::core::ast::fixtures::*;

    fn index() -> AstIndex {
        AstIndex::from_units(vec![unit(vec![
            in_namespace(record(1, "A"), "ns"),
            in_namespace(method(2, 1, "add", vec![("int", "x"), ("int", "y")], Some(block(vec![]))), "ns"),
            in_namespace(function(3, "tmain", vec![], Some(block(vec![expr(call(2)), expr(call(4))]))), "ns"),
            in_namespace(function(4, "log", vec![], Some(block(vec![]))), "util"),
        ])])
    }

    fn config() -> SequenceDiagramConfig {
        SequenceDiagramConfig::starting_from(EntryPointSpec::Function("ns::tmain".to_string()))
    }

    #[test]
    fn test_participants_follow_first_appearance_with_owner_first() {
        let index = index();
        let diagram = SequenceDiagramGenerator::new(&index).generate("t", &config(), None).unwrap();

        let names: Vec<&str> = diagram.participants.iter().map(|p| p.full_name.as_str()).collect();
        assert_eq!(names, vec!["ns::tmain()", "ns::A", "ns::A::add(int,int)", "util::log()"]);

        let add = &diagram.participants[2];
        assert_eq!(diagram.lifeline(add.id), diagram.participants[1].id);

        let lifelines: Vec<&str> = diagram.lifelines().iter().map(|p| p.full_name.as_str()).collect();
        assert_eq!(lifelines, vec!["ns::tmain()", "ns::A", "util::log()"]);
    }

    #[test]
    fn test_exclude_rules_apply() {
        let index = index();
        let mut config = config();
        config.exclude = FilterRules {
            namespaces: vec!["util".to_string()],
            ..FilterRules::default()
        };

        let (diagram, stats) = SequenceDiagramGenerator::new(&index)
            .generate_with_statistics("t", &config, None)
            .unwrap();
        assert_eq!(stats.messages, 1);
        assert_eq!(stats.entry_points, 1);
        assert!(diagram.participants.iter().all(|p| p.namespace != "util"));
    }

    #[test]
    fn test_missing_entry_point_is_diagram_error() {
        let index = index();
        let config = SequenceDiagramConfig::starting_from(EntryPointSpec::Function("nope".to_string()));

        let err = SequenceDiagramGenerator::new(&index).generate("broken", &config, None).unwrap_err();
        assert!(matches!(err, SeqwrightError::Diagram { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_invalid_element_pattern_is_diagram_error() {
        let index = index();
        let mut config = config();
        config.include.elements = vec!["(".to_string()];

        assert!(SequenceDiagramGenerator::new(&index).generate("t", &config, None).is_err());
    }

    #[test]
    fn test_chains_mode_with_target() {
        let index = index();
        let mut config = config();
        config.mode = MultiplexMode::Chains;
        config.to = Some("util::log".to_string());

        let diagram = SequenceDiagramGenerator::new(&index).generate("t", &config, None).unwrap();
        assert_eq!(diagram.sequences.len(), 1);
        assert_eq!(diagram.sequences[0].messages.len(), 1);
        assert_eq!(diagram.sequences[0].messages[0].operation, "log()");
    }

    #[test]
    fn test_target_only_diagram_collects_every_chain() {
        let index = AstIndex::from_units(vec![unit(vec![
            in_namespace(function(1, "log", vec![], Some(block(vec![]))), "util"),
            in_namespace(function(2, "save", vec![], Some(block(vec![expr(call(1))]))), "app"),
            in_namespace(function(3, "handle", vec![], Some(block(vec![expr(call(2)), expr(call(1))]))), "app"),
            in_namespace(function(4, "shutdown", vec![], Some(block(vec![expr(call(2))]))), "app"),
        ])]);
        let mut config = config();
        config.start_from.clear();
        config.to = Some("util::log".to_string());

        let (diagram, stats) = SequenceDiagramGenerator::new(&index)
            .generate_with_statistics("t", &config, None)
            .unwrap();

        assert_eq!(stats.entry_points, 2);
        let chains: Vec<(String, Vec<String>)> = diagram
            .sequences
            .iter()
            .map(|s| (s.label.clone(), s.messages.iter().map(|m| m.operation.clone()).collect()))
            .collect();
        assert_eq!(chains, vec![
            ("app::handle() #1".to_string(), vec!["save()".to_string(), "log()".to_string()]),
            ("app::handle() #2".to_string(), vec!["log()".to_string()]),
            ("app::shutdown()".to_string(), vec!["save()".to_string(), "log()".to_string()]),
        ]);
    }
}
