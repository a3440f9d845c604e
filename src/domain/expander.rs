//! Walks nested content, formatting every string with resolved parameters.

use itertools::Itertools;

use crate::domain::error::DomainResult;
use crate::domain::formatter::{enumerate_required_params, Formatter};
use crate::domain::node::{Node, Params, Tag};

/// Content expander. The plain variant copies strings untouched and only
/// flattens tagged nodes; the parameter variant formats them.
#[derive(Debug, Clone, Copy, Default)]
pub struct Expander {
    formatter: Option<Formatter>,
}

impl Expander {
    pub fn plain() -> Self {
        Self { formatter: None }
    }

    pub fn with_params(formatter: Formatter) -> Self {
        Self {
            formatter: Some(formatter),
        }
    }

    pub fn expand(&self, node: &Node, params: &Params) -> DomainResult<Node> {
        match node {
            Node::Str(text) => match &self.formatter {
                Some(formatter) => formatter.format(text, params),
                None => Ok(node.clone()),
            },
            Node::Seq(items) => items
                .iter()
                .map(|item| self.expand(item, params))
                .collect::<DomainResult<Vec<_>>>()
                .map(Node::Seq),
            Node::Map(map) => {
                let mut expanded = Params::new();
                for (key, value) in map {
                    expanded.insert(self.expand_key(key, params)?, self.expand(value, params)?);
                }
                Ok(Node::Map(expanded))
            }
            Node::Tagged(Tag::Raw(text)) => Ok(Node::Str(text.clone())),
            Node::Tagged(Tag::Join { delimiter, items }) => {
                let parts = items
                    .iter()
                    .map(|item| self.expand(item, params))
                    .collect::<DomainResult<Vec<_>>>()?;
                Ok(Node::Str(parts.iter().join(delimiter)))
            }
            Node::Null | Node::Bool(_) | Node::Int(_) | Node::Float(_) => Ok(node.clone()),
        }
    }

    fn expand_key(&self, key: &str, params: &Params) -> DomainResult<String> {
        match &self.formatter {
            Some(formatter) => Ok(formatter.format(key, params)?.to_string()),
            None => Ok(key.to_string()),
        }
    }

    /// Names referenced anywhere in `node`, keys included, first appearance
    /// first.
    pub fn required_params(&self, node: &Node) -> DomainResult<Vec<String>> {
        let mut names = Vec::new();
        collect_required(node, &mut names)?;
        Ok(names)
    }
}

fn collect_required(node: &Node, names: &mut Vec<String>) -> DomainResult<()> {
    match node {
        Node::Str(text) => push_unique(names, enumerate_required_params(text)?),
        Node::Seq(items) | Node::Tagged(Tag::Join { items, .. }) => {
            for item in items {
                collect_required(item, names)?;
            }
        }
        Node::Map(map) => {
            for (key, value) in map {
                push_unique(names, enumerate_required_params(key)?);
                collect_required(value, names)?;
            }
        }
        Node::Tagged(Tag::Raw(_)) | Node::Null | Node::Bool(_) | Node::Int(_) | Node::Float(_) => {}
    }
    Ok(())
}

fn push_unique(names: &mut Vec<String>, found: Vec<String>) {
    for name in found {
        if !names.contains(&name) {
            names.push(name);
        }
    }
}
