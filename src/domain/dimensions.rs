//! Matrix axes: cross-product of axis values and exclusion filtering.

use itertools::Itertools;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::node::{Node, Params};

/// Expands axes for one template, named by `context` in every error.
#[derive(Debug, Clone, Copy)]
pub struct DimensionExpander<'a> {
    context: &'a str,
}

impl<'a> DimensionExpander<'a> {
    pub fn new(context: &'a str) -> Self {
        Self { context }
    }

    /// One parameter delta per point, in axis order with the rightmost axis
    /// varying fastest. An axis found in neither `params` nor `defaults` is
    /// skipped; no axes at all yields a single empty point.
    pub fn enumerate_dimension_points(
        &self,
        axes: &[String],
        params: &Params,
        defaults: &Params,
    ) -> DomainResult<Vec<Params>> {
        let mut dimensions = Vec::with_capacity(axes.len());
        for axis in axes {
            let Some(value) = params.get(axis).or_else(|| defaults.get(axis)) else {
                continue;
            };
            dimensions.push(self.decode_axis_value(axis, value)?);
        }
        if dimensions.is_empty() {
            return Ok(vec![Params::new()]);
        }

        Ok(dimensions
            .into_iter()
            .multi_cartesian_product()
            .map(|deltas| {
                deltas.into_iter().fold(Params::new(), |mut point, delta| {
                    point.extend(delta);
                    point
                })
            })
            .collect())
    }

    fn decode_axis_value(&self, axis: &str, value: &Node) -> DomainResult<Vec<Params>> {
        let Node::Seq(items) = value else {
            return Ok(vec![Params::from([(axis.to_string(), value.clone())])]);
        };
        items
            .iter()
            .map(|item| match item {
                Node::Map(spec) => {
                    let Some((point_value, extra)) = spec.iter().exactly_one().ok() else {
                        return Err(DomainError::MalformedAxis {
                            template: self.context.to_string(),
                            axis: axis.to_string(),
                            value: item.repr(),
                        });
                    };
                    let mut point = Params::from([(axis.to_string(), Node::from(point_value.as_str()))]);
                    match extra {
                        Node::Map(extra) => point.extend(extra.clone()),
                        Node::Null => {}
                        other => {
                            return Err(DomainError::MalformedAxis {
                                template: self.context.to_string(),
                                axis: axis.to_string(),
                                value: other.repr(),
                            })
                        }
                    }
                    Ok(point)
                }
                scalar => Ok(Params::from([(axis.to_string(), scalar.clone())])),
            })
            .collect()
    }

    /// Interpret the resolved `exclude` parameter: absent or null means no
    /// exclusions, a sequence holds the specs.
    pub fn exclude_specs<'n>(&self, exclude: Option<&'n Node>) -> DomainResult<&'n [Node]> {
        match exclude {
            None | Some(Node::Null) => Ok(&[]),
            Some(Node::Seq(specs)) => Ok(specs),
            Some(other) => Err(DomainError::InvalidExclude {
                template: self.context.to_string(),
                element: other.repr(),
            }),
        }
    }

    /// A point is kept unless some exclude spec matches all of its pairs.
    pub fn is_point_included(&self, excludes: &[Node], point: &Params) -> DomainResult<bool> {
        for exclude in excludes {
            if self.matches_exclude(exclude, point)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn matches_exclude(&self, exclude: &Node, point: &Params) -> DomainResult<bool> {
        let Node::Map(spec) = exclude else {
            return Err(DomainError::InvalidExclude {
                template: self.context.to_string(),
                element: exclude.repr(),
            });
        };
        if spec.is_empty() {
            return Err(DomainError::EmptyExclude {
                template: self.context.to_string(),
            });
        }
        for (axis, expected) in spec {
            let Some(actual) = point.get(axis) else {
                return Err(DomainError::UnknownAxis {
                    template: self.context.to_string(),
                    axis: axis.clone(),
                    exclude: exclude.repr(),
                });
            };
            if !actual.value_eq(expected) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
