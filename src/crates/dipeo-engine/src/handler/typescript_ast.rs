//! `TypescriptAst` handler (spec §4.9): extracts top-level interfaces,
//! functions, classes, and exports from a TypeScript source string.
//!
//! This is a lightweight declaration scanner rather than a full parser:
//! it finds top-level `interface`/`function`/`class`/`export` keywords
//! by regex, which is sufficient for the declarations the spec asks
//! for without pulling in a full TS compiler front-end.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use crate::diagram::{ExecutableNode, NodeKind};
use crate::envelope::Envelope;
use crate::error::{EngineError, Result};
use crate::resolver::Inputs;
use crate::runtime::ExecutionContext;

use super::Handler;

pub struct TypescriptAstHandler;

fn interface_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:export\s+)?interface\s+(\w+)").unwrap())
}

fn function_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:export\s+)?(?:async\s+)?function\s+(\w+)").unwrap())
}

fn class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:export\s+)?class\s+(\w+)").unwrap())
}

fn export_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\s*export\s+(?:default\s+)?(?:const|let|var|function|class|interface|type)?\s*(\w+)?")
            .unwrap()
    })
}

fn names(re: &Regex, source: &str) -> Vec<String> {
    re.captures_iter(source).filter_map(|c| c.get(1)).map(|m| m.as_str().to_string()).collect()
}

#[async_trait]
impl Handler for TypescriptAstHandler {
    async fn execute(&self, node: &ExecutableNode, _inputs: Inputs, _context: &ExecutionContext) -> Result<Envelope> {
        let NodeKind::TypescriptAst(params) = &node.kind else {
            return Err(EngineError::HandlerValidation {
                node_id: node.id.to_string(),
                message: "TypescriptAstHandler received a non-TypescriptAst node".into(),
            });
        };

        let interfaces = names(interface_re(), &params.source);
        let functions = names(function_re(), &params.source);
        let classes = names(class_re(), &params.source);
        let exports: Vec<String> = names(export_re(), &params.source).into_iter().filter(|n| !n.is_empty()).collect();

        Ok(Envelope::new(json!({
            "interfaces": interfaces,
            "functions": functions,
            "classes": classes,
            "exports": exports,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_top_level_declarations() {
        let source = "export interface Foo {}\nexport function bar() {}\nclass Baz {}\n";
        assert_eq!(names(interface_re(), source), vec!["Foo"]);
        assert_eq!(names(function_re(), source), vec!["bar"]);
        assert_eq!(names(class_re(), source), vec!["Baz"]);
    }
}
