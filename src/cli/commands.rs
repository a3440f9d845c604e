//! Command dispatch

use std::io;
use std::path::Path;

use clap::CommandFactory;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::application::ApplicationError;
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, Settings};
use crate::domain::{Node, Params};
use crate::infrastructure::di::ServiceContainer;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    if let Commands::Completion { shell } = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, name, &mut io::stdout());
        return Ok(());
    }

    let container = ServiceContainer::new(load_settings(cli)?);
    match &cli.command {
        Commands::Expand { file, names } => _expand(&container, file, *names),
        Commands::Params { file, template } => _params(&container, file, template.as_deref()),
        Commands::Axes { name } => _axes(&container, name),
        Commands::Format { template, params } => _format(&container, template, params),
        Commands::Config { command } => _config(&container, command),
        Commands::Completion { .. } => Ok(()),
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let mut settings = Settings::load(cli.conf.as_deref())?;
    if cli.allow_empty_variables {
        settings.expander.allow_empty_variables = true;
    }
    debug!("settings: {:?}", settings);
    Ok(settings)
}

#[instrument(skip(container))]
fn _expand(container: &ServiceContainer, file: &Path, names: bool) -> CliResult<()> {
    let project = container.projects.load(file)?;
    let items = container.templates.expand_all(&project)?;
    debug!("expanded {} items", items.len());
    if names {
        for item in &items {
            output::info(&item.name);
        }
    } else {
        output::info(&serde_json::to_string_pretty(&items)?);
    }
    Ok(())
}

#[instrument(skip(container))]
fn _params(container: &ServiceContainer, file: &Path, only: Option<&str>) -> CliResult<()> {
    let project = container.projects.load(file)?;
    let templates: Vec<_> = project
        .templates
        .iter()
        .filter(|template| only.map_or(true, |name| template.name == name))
        .collect();
    if let (Some(name), true) = (only, templates.is_empty()) {
        return Err(CliError::InvalidArgs(format!(
            "no template named '{name}' in {}",
            file.display()
        )));
    }

    for template in templates {
        output::header(&template.name);
        let defaults = project
            .defaults_for(template, None)
            .map_err(ApplicationError::from)?;
        let items = container
            .templates
            .instantiate(template, &defaults, &Params::new())?;
        if items.is_empty() {
            output::warning(&format!("template '{}' produced no items", template.name));
        }
        for item in items {
            output::field("item", &item.name);
            output::info(&serde_json::to_string_pretty(&item.params)?);
        }
    }
    Ok(())
}

#[instrument(skip(container))]
fn _axes(container: &ServiceContainer, name: &str) -> CliResult<()> {
    for axis in container.templates.axes(name)? {
        match axis.default {
            Some(default) => output::info(&format!("{} (default: {default})", axis.name)),
            None => output::info(&axis.name),
        }
    }
    Ok(())
}

#[instrument(skip(container))]
fn _format(container: &ServiceContainer, template: &str, raw_params: &[String]) -> CliResult<()> {
    let params = parse_params(raw_params)?;
    match container.templates.format(template, &params)? {
        Node::Str(text) => output::info(&text),
        other => output::info(&serde_json::to_string(&other)?),
    }
    Ok(())
}

#[instrument(skip(container))]
fn _config(container: &ServiceContainer, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => output::info(&container.settings.to_toml()?),
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => match global_config_path() {
            Some(path) => output::field("global", &path.display()),
            None => output::warning("no config directory available on this platform"),
        },
    }
    Ok(())
}

#[derive(Deserialize)]
struct ParamValue {
    v: Node,
}

/// `key=value` pairs. Values that parse as TOML keep their type
/// (`n=3`, `xs=[1, 2]`); anything else is a plain string.
pub fn parse_params(raw: &[String]) -> CliResult<Params> {
    let mut params = Params::new();
    for pair in raw {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| CliError::InvalidArgs(format!("expected KEY=VALUE, got '{pair}'")))?;
        let value = toml::from_str::<ParamValue>(&format!("v = {value}"))
            .map(|parsed| parsed.v)
            .unwrap_or_else(|_| Node::from(value));
        params.insert(key.trim().to_string(), value);
    }
    Ok(params)
}
