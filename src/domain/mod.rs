//! Domain layer: value model and expansion engine
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod dimensions;
pub mod entities;
pub mod error;
pub mod expander;
pub mod format_spec;
pub mod formatter;
pub mod node;
pub mod resolver;

pub use dimensions::DimensionExpander;
pub use entities::*;
pub use error::{DomainError, DomainResult};
pub use expander::Expander;
pub use formatter::{enumerate_param_defaults, enumerate_required_params, Formatter};
pub use node::{Location, Node, Params, Tag};
pub use resolver::{expand_parameters, ParameterResolver};
