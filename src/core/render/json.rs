// src/core/render/json.rs
use crate::core::sequence::SequenceDiagram;
use crate::error::Result;
use super::DiagramRenderer;

/// The diagram model as pretty-printed JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer;

impl DiagramRenderer for JsonRenderer {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn render(&self, diagram: &SequenceDiagram) -> Result<String> {
        let mut json = serde_json::to_string_pretty(diagram)?;
        json.push('\n');
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EntryPointSpec, SequenceDiagramConfig};
    use crate::core::ast::fixtures::*;
    use crate::core::ast::{AstIndex, Stmt};
    use crate::core::sequence::SequenceDiagramGenerator;

    #[test]
    fn test_model_serializes_with_hex_ids() {
        let index = AstIndex::from_units(vec![unit(vec![
            function(1, "work", vec![], Some(block(vec![]))),
            function(2, "tmain", vec![], Some(block(vec![
                while_loop("running", vec![expr(call(1))]),
            ]))),
        ])]);
        let config = SequenceDiagramConfig::starting_from(EntryPointSpec::Function("tmain".to_string()));
        let diagram = SequenceDiagramGenerator::new(&index).generate("loop", &config, None).unwrap();

        let output = JsonRenderer.render(&diagram).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["name"], "loop");
        assert_eq!(value["participants"].as_array().unwrap().len(), 2);
        assert!(value["participants"][0].get("key").is_none());

        let message = &value["sequences"][0]["messages"][0];
        assert_eq!(message["operation"], "work()");
        assert_eq!(message["kind"], "call");
        assert_eq!(message["context"][0]["frame"], "loop");
        assert_eq!(message["context"][0]["label"], "running");

        let id = message["to"].as_str().unwrap();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    fn while_loop(text: &str, body: Vec<Stmt>) -> Stmt {
        Stmt::While {
            cond: opaque(),
            body: Box::new(block(body)),
            cond_text: Some(text.to_string()),
        }
    }
}
