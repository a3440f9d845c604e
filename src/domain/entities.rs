//! Domain entities: templates, projects and the items they expand into

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{quote, Location, Node, Params};

/// Parameter holding the owning template's name; never expanded.
pub const TEMPLATE_NAME_PARAM: &str = "template-name";
/// Parameter listing exclude specs for matrix points.
pub const EXCLUDE_PARAM: &str = "exclude";
/// Body key carrying an item's name.
pub const NAME_KEY: &str = "name";
/// Parameter holding a template's id, when it has one.
pub const ID_PARAM: &str = "id";
/// Defaults set every other set is layered over.
pub const GLOBAL_DEFAULTS: &str = "global";

/// A parameterized definition. Axes are the fields referenced by `name`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub name: String,
    /// Lookup key for specs; the name when absent.
    pub id: Option<String>,
    /// Defaults set to use when the referencing project names none.
    pub defaults: Option<String>,
    pub params: Params,
    pub body: Params,
    pub location: Option<Location>,
}

impl Template {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            defaults: None,
            params: Params::new(),
            body: Params::new(),
            location: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_defaults(mut self, defaults: impl Into<String>) -> Self {
        self.defaults = Some(defaults.into());
        self
    }

    /// The name specs refer to this template by.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_body(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn with_body_params(mut self, body: Params) -> Self {
        self.body.extend(body);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// A non-template definition: expanded once, strings left as written.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub body: Params,
    pub location: Option<Location>,
}

impl Definition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: Params::new(),
            location: None,
        }
    }

    pub fn with_body(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }
}

/// A reference to a template or group, with parameters for this use.
#[derive(Debug, Clone, PartialEq)]
pub struct Spec {
    pub name: String,
    pub params: Params,
}

impl Spec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Read a spec written either as a bare name or as a single-entry
    /// table `{name = {params}}`. `context` names the owner in errors.
    pub fn from_node(node: &Node, context: &str) -> DomainResult<Self> {
        let invalid = |reason: String| DomainError::InvalidSpec {
            context: context.to_string(),
            reason,
        };
        let map = match node {
            Node::Str(name) => return Ok(Self::new(name.as_str())),
            Node::Map(map) => map,
            other => {
                return Err(invalid(format!(
                    "spec should be a name or a table, but is {}",
                    other.type_name()
                )))
            }
        };
        let Ok((name, params)) = map.iter().exactly_one() else {
            return Err(invalid(format!(
                "spec table should be single-item, but has keys [{}]",
                map.keys().map(|key| quote(key)).join(", ")
            )));
        };
        let params = match params {
            Node::Null => Params::new(),
            Node::Map(params) => params.clone(),
            other => {
                return Err(invalid(format!(
                    "{name} params should be a table, but is {} ({})",
                    other.type_name(),
                    other.repr()
                )))
            }
        };
        Ok(Self {
            name: name.clone(),
            params,
        })
    }
}

/// A named list of specs with shared parameters. Projects are the roots
/// that drive template instantiation; groups are reachable through them.
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub name: String,
    /// Defaults set overriding each template's own choice.
    pub defaults: Option<String>,
    pub params: Params,
    pub specs: Vec<Spec>,
    pub location: Option<Location>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            defaults: None,
            params: Params::new(),
            specs: Vec::new(),
            location: None,
        }
    }

    pub fn with_defaults(mut self, defaults: impl Into<String>) -> Self {
        self.defaults = Some(defaults.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Node>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_spec(mut self, spec: Spec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// What a spec name refers to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Root<'p> {
    /// Plain definitions are expanded on their own, never through specs.
    Definition(&'p Definition),
    Template(&'p Template),
    Group(&'p Group),
}

/// Everything defined in one project file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    /// Named parameter sets; `global` sits under every other set.
    pub defaults: BTreeMap<String, Params>,
    pub templates: Vec<Template>,
    pub items: Vec<Definition>,
    pub groups: Vec<Group>,
    pub projects: Vec<Group>,
}

impl Project {
    /// Defaults for one use of `template`: the requested set, else the
    /// template's own, else `global`. Named sets are merged over `global`.
    pub fn defaults_for(&self, template: &Template, requested: Option<&str>) -> DomainResult<Params> {
        let name = requested
            .or(template.defaults.as_deref())
            .unwrap_or(GLOBAL_DEFAULTS);
        let mut merged = self.defaults.get(GLOBAL_DEFAULTS).cloned().unwrap_or_default();
        if name != GLOBAL_DEFAULTS {
            let named = self
                .defaults
                .get(name)
                .ok_or_else(|| DomainError::UndefinedDefaults {
                    template: template.name.clone(),
                    defaults: name.to_string(),
                })?;
            merged.extend(named.clone());
        }
        Ok(merged)
    }

    /// Resolve a spec name: definitions first, then templates by key, then
    /// groups. A later definition of the same name wins.
    pub fn lookup(&self, name: &str) -> Option<Root<'_>> {
        if let Some(definition) = self.items.iter().rev().find(|d| d.name == name) {
            return Some(Root::Definition(definition));
        }
        if let Some(template) = self.templates.iter().rev().find(|t| t.key() == name) {
            return Some(Root::Template(template));
        }
        self.groups
            .iter()
            .rev()
            .find(|g| g.name == name)
            .map(Root::Group)
    }
}

/// One concrete instance of a template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub name: String,
    #[serde(skip)]
    pub params: Params,
    pub contents: Node,
}
