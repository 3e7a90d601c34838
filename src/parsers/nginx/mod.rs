//! nginx configuration parser

mod lexer;
mod parser;

pub use parser::NginxParser;

use serde::{Deserialize, Serialize};

/// A nginx directive (simple or block)
///
/// Serializes to the crossplane shape: `{"directive", "args", "line", "block"}`
/// with `block` omitted for simple directives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    #[serde(rename = "directive")]
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Vec<Directive>>,
}

impl Directive {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            line,
            block: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_block(mut self, block: Vec<Directive>) -> Self {
        self.block = Some(block);
        self
    }

    /// Check if this is a block directive
    pub fn is_block(&self) -> bool {
        self.block.is_some()
    }

    /// Get the first argument
    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(|s| s.as_str())
    }

    /// Find child directive by name
    pub fn find_directive(&self, name: &str) -> Option<&Directive> {
        self.children().iter().find(|d| d.name == name)
    }

    /// Find all child directives by name
    pub fn find_all_directives(&self, name: &str) -> Vec<&Directive> {
        self.children().iter().filter(|d| d.name == name).collect()
    }

    /// Get block children
    pub fn children(&self) -> &[Directive] {
        self.block.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_in_crossplane_shape() {
        let directive = Directive::new("location", 3)
            .with_args(vec!["/".to_string()])
            .with_block(vec![Directive::new("proxy_pass", 4)
                .with_args(vec!["http://app".to_string()])]);

        let value = serde_json::to_value(&directive).unwrap();
        assert_eq!(value["directive"], "location");
        assert_eq!(value["block"][0]["directive"], "proxy_pass");
        assert!(value["block"][0].get("block").is_none());
    }

    #[test]
    fn children_of_simple_directive_is_empty() {
        let directive = Directive::new("listen", 1).with_args(vec!["80".to_string()]);
        assert!(!directive.is_block());
        assert!(directive.children().is_empty());
        assert!(directive.find_directive("anything").is_none());
    }
}
