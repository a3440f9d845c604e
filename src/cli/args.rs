//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueHint};

/// Expand parameterized templates into concrete items
#[derive(Parser, Debug)]
#[command(name = "rsjobs")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output, repeat for more (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global one
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub conf: Option<PathBuf>,

    /// Substitute empty text for undefined fields without a default
    #[arg(long, global = true)]
    pub allow_empty_variables: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Expand the plain items and projects of a project file
    Expand {
        /// Project file (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Print item names only
        #[arg(long)]
        names: bool,
    },

    /// Show resolved parameters per point, each template instantiated on its own
    Params {
        /// Project file (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,

        /// Only this template
        #[arg(short, long)]
        template: Option<String>,
    },

    /// Show the axes a template name expands over
    Axes {
        /// Template name, e.g. 'build-{branch}-{platform|linux}'
        name: String,
    },

    /// Format one template string
    Format {
        /// Template string
        template: String,

        /// Parameter as key=value; the value is read as a TOML value when it parses
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Generate shell completions
    Completion {
        /// Shell type
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective settings
    Show,

    /// Print a commented config template
    Template,

    /// Show config file locations
    Path,
}
