//! Template instantiation service
//!
//! Turns templates into concrete items: axes from the template name, one
//! parameter resolution per matrix point, exclusion, then body expansion.
//! Projects drive which templates are instantiated and with which params.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::application::{ApplicationError, ApplicationResult};
use crate::config::ExpanderConfig;
use crate::domain::node::quote;
use crate::domain::{
    enumerate_param_defaults, enumerate_required_params, expand_parameters, Definition,
    DimensionExpander, DomainError, DomainResult, Expander, Formatter, Group, Item, Node, Params,
    Project, Root, Spec, Template, EXCLUDE_PARAM, ID_PARAM, NAME_KEY, TEMPLATE_NAME_PARAM,
};

/// A matrix axis named by a template, with its inline default if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub name: String,
    pub default: Option<String>,
}

/// Service for expanding templates and projects.
#[derive(Debug, Clone)]
pub struct TemplateService {
    formatter: Formatter,
    allow_duplicates: bool,
}

impl TemplateService {
    /// Create a new template service.
    pub fn new(config: &ExpanderConfig) -> Self {
        Self {
            formatter: Formatter::new(config.allow_empty_variables),
            allow_duplicates: config.allow_duplicates,
        }
    }

    /// Format a single template string.
    pub fn format(&self, template: &str, params: &Params) -> ApplicationResult<Node> {
        Ok(self.formatter.format(template, params)?)
    }

    /// Axes a template with this name expands over, in order.
    pub fn axes(&self, name: &str) -> ApplicationResult<Vec<Axis>> {
        let mut defaults = enumerate_param_defaults(name)?;
        Ok(enumerate_required_params(name)?
            .into_iter()
            .map(|axis| Axis {
                default: defaults.remove(&axis),
                name: axis,
            })
            .collect())
    }

    /// Expand one template.
    ///
    /// Parameters layer as `defaults`, then the template's own, then `params`
    /// from the referencing spec. Items come out in matrix point order.
    /// Errors carry the template's location when it is known.
    pub fn instantiate(
        &self,
        template: &Template,
        defaults: &Params,
        params: &Params,
    ) -> ApplicationResult<Vec<Item>> {
        debug!("instantiate: template={}", template.name);
        self.instantiate_points(template, defaults, params)
            .map_err(|e| e.with_location(template.location.as_ref()).into())
    }

    fn instantiate_points(
        &self,
        template: &Template,
        defaults: &Params,
        params: &Params,
    ) -> DomainResult<Vec<Item>> {
        let name = template.name.as_str();

        let mut item_params = defaults.clone();
        item_params.extend(template.params.clone());
        item_params.extend(params.clone());
        item_params.insert(TEMPLATE_NAME_PARAM.to_string(), Node::from(name));
        if let Some(id) = &template.id {
            item_params.insert(ID_PARAM.to_string(), Node::from(id.as_str()));
        }

        let axes = enumerate_required_params(name)?;
        let axis_defaults: Params = enumerate_param_defaults(name)?
            .into_iter()
            .map(|(axis, default)| (axis, Node::Str(default)))
            .collect();

        let dimensions = DimensionExpander::new(name);
        let points = dimensions.enumerate_dimension_points(&axes, &item_params, &axis_defaults)?;
        debug!(
            "instantiate: template={} axes={:?} points={}",
            name,
            axes,
            points.len()
        );

        let mut contents = Params::from([(NAME_KEY.to_string(), Node::from(name))]);
        contents.extend(template.body.clone());
        let contents = Node::Map(contents);
        let expander = Expander::with_params(self.formatter);

        let items = points
            .into_par_iter()
            .map(|point| -> DomainResult<Option<Item>> {
                let mut instance = item_params.clone();
                instance.extend(point);

                let resolved = expand_parameters(&expander, &instance, name)?;
                let excludes = dimensions.exclude_specs(resolved.get(EXCLUDE_PARAM))?;
                if !dimensions.is_point_included(excludes, &resolved)? {
                    trace!("instantiate: template={} point excluded", name);
                    return Ok(None);
                }

                let contents = expander.expand(&contents, &resolved)?;
                Ok(Some(Item {
                    name: item_name(&contents),
                    params: resolved,
                    contents,
                }))
            })
            .collect::<DomainResult<Vec<Option<Item>>>>()?;

        Ok(items.into_iter().flatten().collect())
    }

    /// Expand a non-template definition. Strings are kept as written.
    pub fn expand_definition(&self, definition: &Definition) -> ApplicationResult<Item> {
        let mut contents = Params::from([(NAME_KEY.to_string(), Node::from(definition.name.as_str()))]);
        contents.extend(definition.body.clone());
        let contents = Expander::plain()
            .expand(&Node::Map(contents), &Params::new())
            .map_err(|e| e.with_location(definition.location.as_ref()))?;
        Ok(Item {
            name: item_name(&contents),
            params: Params::new(),
            contents,
        })
    }

    /// Instantiate everything one project references, in spec order.
    ///
    /// Spec params layer as the owner's params, then (for the project) its
    /// `name`, then the spec's own. Groups are walked with an explicit work
    /// stack; a group reached again through itself is an error.
    pub fn expand_project(&self, project: &Project, root: &Group) -> ApplicationResult<Vec<Item>> {
        debug!("expand_project: project={}", root.name);
        let context = format!("project {}", quote(&root.name));
        let mut own = root.params.clone();
        own.insert(NAME_KEY.to_string(), Node::from(root.name.as_str()));

        let mut pending: Vec<Pending> = root
            .specs
            .iter()
            .rev()
            .map(|spec| Pending::new(spec, &own, Vec::new(), &context))
            .collect();

        let mut items = Vec::new();
        while let Some(task) = pending.pop() {
            match project.lookup(&task.spec.name) {
                Some(Root::Definition(_)) => {
                    trace!("expand_project: '{}' is a plain item", task.spec.name);
                }
                Some(Root::Template(template)) => {
                    let defaults = project
                        .defaults_for(template, root.defaults.as_deref())
                        .map_err(|e| e.with_location(root.location.as_ref()))?;
                    items.extend(self.instantiate(template, &defaults, &task.params)?);
                }
                Some(Root::Group(group)) => {
                    let seen = task.chain.contains(&group.name);
                    let mut chain = task.chain;
                    chain.push(group.name.clone());
                    if seen {
                        return Err(DomainError::RecursiveGroup { context, chain }
                            .with_location(group.location.as_ref())
                            .into());
                    }
                    let group_context = format!("group {}", quote(&group.name));
                    let mut inherited = task.params;
                    inherited.extend(group.params.clone());
                    pending.extend(group.specs.iter().rev().map(|spec| {
                        Pending::new(spec, &inherited, chain.clone(), &group_context)
                    }));
                }
                None => {
                    return Err(DomainError::UnknownSpec {
                        context: task.context,
                        name: task.spec.name.clone(),
                    }
                    .with_location(root.location.as_ref())
                    .into());
                }
            }
        }
        debug!("expand_project: project={} items={}", root.name, items.len());
        Ok(items)
    }

    /// Expand a project file: plain items first, then every project in
    /// order. When names repeat the last definition wins.
    pub fn expand_all(&self, project: &Project) -> ApplicationResult<Vec<Item>> {
        let mut items = Vec::new();
        for definition in &project.items {
            items.push(self.expand_definition(definition)?);
        }
        for root in &project.projects {
            items.extend(self.expand_project(project, root)?);
        }
        debug!("expand_all: {} items before duplicate removal", items.len());
        self.remove_duplicates(items)
    }

    fn remove_duplicates(&self, items: Vec<Item>) -> ApplicationResult<Vec<Item>> {
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(items.len());
        for item in items.into_iter().rev() {
            if seen.contains(&item.name) {
                if !self.allow_duplicates {
                    return Err(ApplicationError::DuplicateItem { name: item.name });
                }
                warn!("Duplicate definitions for item '{}' specified", item.name);
                continue;
            }
            seen.insert(item.name.clone());
            unique.push(item);
        }
        unique.reverse();
        Ok(unique)
    }
}

fn item_name(contents: &Node) -> String {
    contents
        .as_map()
        .and_then(|map| map.get(NAME_KEY))
        .map(Node::to_string)
        .unwrap_or_default()
}

/// A spec waiting to be instantiated, with the params inherited so far.
struct Pending<'p> {
    spec: &'p Spec,
    params: Params,
    /// Groups entered on the way here, outermost first.
    chain: Vec<String>,
    context: String,
}

impl<'p> Pending<'p> {
    fn new(spec: &'p Spec, inherited: &Params, chain: Vec<String>, context: &str) -> Self {
        let mut params = inherited.clone();
        params.extend(spec.params.clone());
        Self {
            spec,
            params,
            chain,
            context: context.to_string(),
        }
    }
}
