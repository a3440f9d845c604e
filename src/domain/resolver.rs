//! Parameter resolution: raw, interdependent values to concrete values.
//!
//! Each parameter is resolved depth-first over an explicit frame stack. The
//! names it references are resolved first and handed to the format function;
//! results are cached so every name is resolved once per call. A reference
//! back into the chain being resolved is a cycle.

use std::collections::BTreeSet;

use crate::domain::entities::TEMPLATE_NAME_PARAM;
use crate::domain::error::{DomainError, DomainResult};
use crate::domain::expander::Expander;
use crate::domain::node::{Node, Params};

/// Resolves the parameters of one template instantiation.
#[derive(Debug, Clone)]
pub struct ParameterResolver<'a> {
    template_name: &'a str,
    exempt: BTreeSet<String>,
}

/// Per-call state: results so far.
struct Resolution<'r, F, D> {
    template_name: &'r str,
    exempt: &'r BTreeSet<String>,
    raw: &'r Params,
    format_fn: F,
    deps_fn: D,
    resolved: Params,
}

/// A name whose dependencies are being resolved. The frame stack is the
/// chain of names in progress, outermost first.
struct Frame<'r> {
    name: String,
    raw: &'r Node,
    deps: Vec<String>,
    next: usize,
}

impl<'a> ParameterResolver<'a> {
    /// `template-name` is exempt from expansion and copied verbatim.
    pub fn new(template_name: &'a str) -> Self {
        Self {
            template_name,
            exempt: BTreeSet::from([TEMPLATE_NAME_PARAM.to_string()]),
        }
    }

    pub fn with_exemptions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt.extend(names.into_iter().map(Into::into));
        self
    }

    /// Resolve every name in `raw`.
    ///
    /// `deps_fn` lists the names a raw value references. `format_fn` gets the
    /// raw value and its resolved dependencies; undefined dependencies are
    /// left out so the formatter's default and allow-empty rules apply.
    pub fn expand_parameters<F, D>(
        &self,
        raw: &Params,
        format_fn: F,
        deps_fn: D,
    ) -> DomainResult<Params>
    where
        F: Fn(&Node, &Params) -> DomainResult<Node>,
        D: Fn(&Node) -> DomainResult<Vec<String>>,
    {
        let mut resolution = Resolution {
            template_name: self.template_name,
            exempt: &self.exempt,
            raw,
            format_fn,
            deps_fn,
            resolved: Params::new(),
        };
        for name in raw.keys() {
            resolution.resolve(name)?;
        }
        Ok(resolution.resolved)
    }
}

impl<'r, F, D> Resolution<'r, F, D>
where
    F: Fn(&Node, &Params) -> DomainResult<Node>,
    D: Fn(&Node) -> DomainResult<Vec<String>>,
{
    /// Resolve `root` and everything it references, using an explicit
    /// frame stack so chain depth is bounded by memory only.
    fn resolve(&mut self, root: &str) -> DomainResult<()> {
        if self.is_settled(root) {
            return Ok(());
        }
        let mut frames: Vec<Frame<'r>> = Vec::new();
        self.enter(root, &mut frames)?;

        while let Some(frame) = frames.last_mut() {
            if let Some(dep) = frame.deps.get(frame.next).cloned() {
                frame.next += 1;
                if self.is_settled(&dep) {
                    continue;
                }
                if frames.iter().any(|active| active.name == dep) {
                    let mut chain: Vec<String> =
                        frames.iter().map(|active| active.name.clone()).collect();
                    chain.push(dep.clone());
                    return Err(DomainError::RecursiveParameter {
                        template: self.template_name.to_string(),
                        name: dep,
                        chain,
                    });
                }
                self.enter(&dep, &mut frames)?;
                continue;
            }

            let Some(done) = frames.pop() else {
                break;
            };
            let deps: Params = done
                .deps
                .iter()
                .filter_map(|dep| self.resolved.get(dep).map(|v| (dep.clone(), v.clone())))
                .collect();
            let value = (self.format_fn)(done.raw, &deps)
                .map_err(|e| self.failure(&done.name, &frames, e))?;
            self.resolved.insert(done.name, value);
        }
        Ok(())
    }

    /// Already resolved, or not defined at all.
    fn is_settled(&self, name: &str) -> bool {
        self.resolved.contains_key(name) || !self.raw.contains_key(name)
    }

    /// Exempt names settle immediately; others get a frame.
    fn enter(&mut self, name: &str, frames: &mut Vec<Frame<'r>>) -> DomainResult<()> {
        let raw_params: &'r Params = self.raw;
        let Some(raw) = raw_params.get(name) else {
            return Ok(());
        };
        if self.exempt.contains(name) {
            self.resolved.insert(name.to_string(), raw.clone());
            return Ok(());
        }
        let deps = (self.deps_fn)(raw).map_err(|e| self.failure(name, frames.as_slice(), e))?;
        frames.push(Frame {
            name: name.to_string(),
            raw,
            deps,
            next: 0,
        });
        Ok(())
    }

    fn failure(&self, name: &str, frames: &[Frame<'r>], cause: DomainError) -> DomainError {
        DomainError::FormattingFailure {
            template: self.template_name.to_string(),
            name: name.to_string(),
            used_by: frames.iter().rev().map(|frame| frame.name.clone()).collect(),
            cause: Box::new(cause),
        }
    }
}

/// Resolve `raw` with a content expander: strings are formatted, nested
/// values walked.
pub fn expand_parameters(
    expander: &Expander,
    raw: &Params,
    template_name: &str,
) -> DomainResult<Params> {
    ParameterResolver::new(template_name).expand_parameters(
        raw,
        |value, deps| expander.expand(value, deps),
        |value| expander.required_params(value),
    )
}
