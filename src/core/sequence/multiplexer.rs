// src/core/sequence/multiplexer.rs
use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::MultiplexMode;
use crate::core::ast::{AstIndex, Decl};
use crate::error::Result;
use super::builder::{BuilderOptions, SequenceBuilder};
use super::filter::DiagramFilter;
use super::registry::Registry;
use super::{Message, MessageSequence, ParticipantId};

/// Runs the builder over several entry points
pub struct EntryPointMultiplexer<'a, 'r> {
    ast: &'a AstIndex,
    registry: &'r mut Registry,
    filter: &'r dyn DiagramFilter,
    options: BuilderOptions,
    mode: MultiplexMode,
    target: Option<String>,
}

impl<'a, 'r> EntryPointMultiplexer<'a, 'r> {
    pub fn new(
        ast: &'a AstIndex,
        registry: &'r mut Registry,
        filter: &'r dyn DiagramFilter,
        options: BuilderOptions,
    ) -> Self {
        Self {
            ast,
            registry,
            filter,
            options,
            mode: MultiplexMode::default(),
            target: None,
        }
    }

    pub fn mode(mut self, mode: MultiplexMode) -> Self {
        self.mode = mode;
        self
    }

    /// Only keep call chains reaching this function (chains mode)
    pub fn target(mut self, selector: Option<&str>) -> Self {
        self.target = selector.map(str::to_string);
        self
    }

    pub fn run(self, entries: &[&'a Decl]) -> Result<Vec<MessageSequence>> {
        match self.mode {
            MultiplexMode::Merged => self.run_merged(entries),
            MultiplexMode::Chains => self.run_chains(entries),
        }
    }

    fn run_merged(self, entries: &[&'a Decl]) -> Result<Vec<MessageSequence>> {
        let mut builder = SequenceBuilder::new(self.ast, &mut *self.registry, self.filter, self.options);
        for entry in entries {
            builder.traverse(entry)?;
        }

        let mut sequence = builder.finish();
        sequence.label = sequence
            .entry_points
            .iter()
            .filter_map(|id| self.registry.get(*id))
            .map(|p| p.full_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        info!("Built merged sequence of {} messages from {} entry points", sequence.len(), entries.len());
        Ok(vec![sequence])
    }

    fn run_chains(self, entries: &[&'a Decl]) -> Result<Vec<MessageSequence>> {
        let mut sequences = Vec::new();

        for entry in entries {
            let mut builder = SequenceBuilder::new(self.ast, &mut *self.registry, self.filter, self.options);
            builder.traverse(entry)?;
            let mut sequence = builder.finish();
            sequence.label = self.entry_label(&sequence, entry);
            debug!("Built sequence '{}' with {} messages", sequence.label, sequence.len());

            match &self.target {
                Some(selector) => {
                    let targets: HashSet<ParticipantId> = self.registry.find(selector).into_iter().collect();
                    sequences.extend(extract_chains(&sequence, &targets));
                }
                None => sequences.push(sequence),
            }
        }

        info!("Built {} sequences from {} entry points", sequences.len(), entries.len());
        Ok(sequences)
    }

    fn entry_label(&self, sequence: &MessageSequence, entry: &Decl) -> String {
        sequence
            .entry_points
            .first()
            .and_then(|id| self.registry.get(*id))
            .map(|p| p.full_name.clone())
            .unwrap_or_else(|| entry.name.clone())
    }
}

/// Split a sequence into the distinct call paths that end in one of
/// `targets`, each path as its own sequence
pub fn extract_chains(sequence: &MessageSequence, targets: &HashSet<ParticipantId>) -> Vec<MessageSequence> {
    let mut stack: Vec<&Message> = Vec::new();
    let mut chains: Vec<Vec<Message>> = Vec::new();
    let mut seen: HashSet<Vec<(ParticipantId, ParticipantId, String)>> = HashSet::new();

    for message in sequence.calls() {
        stack.truncate(message.depth);
        stack.push(message);

        if targets.contains(&message.to) {
            let path: Vec<(ParticipantId, ParticipantId, String)> = stack
                .iter()
                .map(|m| (m.from, m.to, m.operation.clone()))
                .collect();
            if seen.insert(path) {
                chains.push(stack.iter().map(|m| (*m).clone()).collect());
            }
        }
    }

    let total = chains.len();
    chains
        .into_iter()
        .enumerate()
        .map(|(i, messages)| MessageSequence {
            label: if total > 1 { format!("{} #{}", sequence.label, i + 1) } else { sequence.label.clone() },
            entry_points: sequence.entry_points.clone(),
            messages,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::fixtures::*;
    use crate::core::sequence::filter::IncludeAll;

    fn index() -> AstIndex {
        AstIndex::from_units(vec![unit(vec![
            function(1, "target", vec![], Some(block(vec![]))),
            function(2, "via", vec![], Some(block(vec![expr(call(1)), expr(call(4))]))),
            function(3, "first", vec![], Some(block(vec![expr(call(2)), expr(call(1)), expr(call(2))]))),
            function(4, "unrelated", vec![], Some(block(vec![]))),
            function(5, "second", vec![], Some(block(vec![expr(call(4))]))),
        ])])
    }

    fn entries<'a>(index: &'a AstIndex, ids: &[u64]) -> Vec<&'a Decl> {
        ids.iter().map(|id| index.decl(*id).unwrap()).collect()
    }

    #[test]
    fn test_merged_mode_yields_one_sequence() {
        let index = index();
        let mut registry = Registry::default();

        let sequences = EntryPointMultiplexer::new(&index, &mut registry, &IncludeAll, BuilderOptions::default())
            .run(&entries(&index, &[3, 5]))
            .unwrap();

        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].entry_points.len(), 2);
        assert_eq!(sequences[0].label, "first(), second()");
        assert_eq!(sequences[0].len(), 8);
    }

    #[test]
    fn test_chains_mode_yields_one_sequence_per_entry() {
        let index = index();
        let mut registry = Registry::default();

        let sequences = EntryPointMultiplexer::new(&index, &mut registry, &IncludeAll, BuilderOptions::default())
            .mode(MultiplexMode::Chains)
            .run(&entries(&index, &[3, 5]))
            .unwrap();

        assert_eq!(sequences.len(), 2);
        assert_eq!(sequences[0].label, "first()");
        assert_eq!(sequences[1].label, "second()");
        assert_eq!(sequences[1].len(), 1);
    }

    #[test]
    fn test_target_extracts_distinct_paths() {
        let index = index();
        let mut registry = Registry::default();

        let sequences = EntryPointMultiplexer::new(&index, &mut registry, &IncludeAll, BuilderOptions::default())
            .mode(MultiplexMode::Chains)
            .target(Some("target"))
            .run(&entries(&index, &[3, 5]))
            .unwrap();

        // first -> via -> target (twice, deduplicated) and first -> target
        let paths: Vec<Vec<String>> = sequences
            .iter()
            .map(|s| s.messages.iter().map(|m| m.operation.clone()).collect())
            .collect();
        assert_eq!(paths, vec![
            vec!["via()".to_string(), "target()".to_string()],
            vec!["target()".to_string()],
        ]);
        assert_eq!(sequences[0].label, "first() #1");
    }
}
