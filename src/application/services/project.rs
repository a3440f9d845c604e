//! Project file service
//!
//! Reads TOML project files into templates and plain definitions.
//!
//! ```toml
//! [defaults.global]
//! branch = "main"
//!
//! [defaults.release]
//! branch = "stable"
//!
//! [[template]]
//! name = "build-{platform}"
//! params = { platform = ["linux", "mac"] }
//! body = { command = "make {platform} on {branch}" }
//!
//! [[group]]
//! name = "builds"
//! templates = ["build-{platform}"]
//!
//! [[project]]
//! name = "ci"
//! defaults = "release"
//! templates = ["builds", { "build-{platform}" = { platform = "win" } }]
//!
//! [[item]]
//! name = "nightly"
//! body = { script = { "!raw" = "echo {not-a-field}" } }
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use toml::Spanned;
use tracing::debug;

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::node::quote;
use crate::domain::{
    Definition, DomainResult, Group, Location, Node, Params, Project, Spec, Template,
};
use crate::infrastructure::traits::FileSystem;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    #[serde(default)]
    defaults: BTreeMap<String, Params>,
    #[serde(default)]
    template: Vec<RawTemplate>,
    #[serde(default)]
    item: Vec<RawDefinition>,
    #[serde(default)]
    group: Vec<RawGroup>,
    #[serde(default)]
    project: Vec<RawRoot>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTemplate {
    name: Spanned<String>,
    id: Option<String>,
    defaults: Option<String>,
    #[serde(default)]
    params: Params,
    #[serde(default)]
    body: Params,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    name: Spanned<String>,
    #[serde(default)]
    body: Params,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGroup {
    name: Spanned<String>,
    #[serde(default)]
    params: Params,
    #[serde(default)]
    templates: Vec<Node>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRoot {
    name: Spanned<String>,
    defaults: Option<String>,
    #[serde(default)]
    params: Params,
    #[serde(default)]
    templates: Vec<Node>,
}

/// Service for loading project files.
pub struct ProjectService {
    fs: Arc<dyn FileSystem>,
}

impl ProjectService {
    /// Create a new project service.
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Read and parse a project file.
    pub fn load(&self, path: &Path) -> ApplicationResult<Project> {
        debug!("load: path={}", path.display());
        if !self.fs.exists(path) {
            return Err(ApplicationError::OperationFailed {
                context: format!("project file not found: {}", path.display()),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "file does not exist",
                )),
            });
        }
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read project file", path)?;
        self.parse(&content, path)
    }

    /// Parse project file content. `path` names the source in locations.
    pub fn parse(&self, content: &str, path: &Path) -> ApplicationResult<Project> {
        let raw: RawProject = toml::from_str(content).map_err(|e| ApplicationError::Parse {
            path: path.to_path_buf(),
            message: e.to_string().trim_end().to_string(),
        })?;
        let source = path.display().to_string();

        let templates: Vec<Template> = raw
            .template
            .into_iter()
            .map(|raw| {
                let location = locate(&source, content, &raw.name);
                let mut template = Template::new(raw.name.into_inner())
                    .with_params(raw.params)
                    .with_location(location)
                    .with_body_params(raw.body);
                template.id = raw.id;
                template.defaults = raw.defaults;
                template
            })
            .collect();

        let items: Vec<Definition> = raw
            .item
            .into_iter()
            .map(|raw| Definition {
                location: Some(locate(&source, content, &raw.name)),
                name: raw.name.into_inner(),
                body: raw.body,
            })
            .collect();

        let groups = raw
            .group
            .into_iter()
            .map(|raw| {
                let location = locate(&source, content, &raw.name);
                group(raw.name.into_inner(), None, raw.params, &raw.templates, "group", location)
            })
            .collect::<DomainResult<Vec<Group>>>()?;

        let projects = raw
            .project
            .into_iter()
            .map(|raw| {
                let location = locate(&source, content, &raw.name);
                let name = raw.name.into_inner();
                group(name, raw.defaults, raw.params, &raw.templates, "project", location)
            })
            .collect::<DomainResult<Vec<Group>>>()?;

        debug!(
            "parse: {} templates, {} items, {} groups, {} projects, {} defaults sets",
            templates.len(),
            items.len(),
            groups.len(),
            projects.len(),
            raw.defaults.len()
        );
        Ok(Project {
            defaults: raw.defaults,
            templates,
            items,
            groups,
            projects,
        })
    }
}

fn group(
    name: String,
    defaults: Option<String>,
    params: Params,
    specs: &[Node],
    kind: &str,
    location: Location,
) -> DomainResult<Group> {
    let context = format!("{kind} {}", quote(&name));
    let specs = specs
        .iter()
        .map(|spec| Spec::from_node(spec, &context))
        .collect::<DomainResult<Vec<Spec>>>()
        .map_err(|e| e.with_location(Some(&location)))?;
    Ok(Group {
        name,
        defaults,
        params,
        specs,
        location: Some(location),
    })
}

/// 1-based line and column of a spanned value.
fn locate(source: &str, content: &str, spanned: &Spanned<String>) -> Location {
    let offset = spanned.span().start.min(content.len());
    let before = &content[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |pos| pos + 1);
    let column = before[line_start..].chars().count() + 1;
    Location::new(source).at(line, column)
}
