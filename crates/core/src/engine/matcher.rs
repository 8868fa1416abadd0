//! Step matching
//!
//! Compiles the composed step definitions into regexes once, before the run,
//! and resolves step text to the first matching definition.

use std::collections::HashMap;

use cucumber_expressions::{Expression, SingleExpression};
use regex::Regex;

use crate::bundle::{ParameterRegistry, ParameterType, StepArgs, StepDefinition, StepPattern};
use crate::error::RunError;

/// Regex groups belonging to one step argument. A parameter type whose
/// regexp has its own capturing groups yields the first of them that matched.
#[derive(Debug, Clone)]
struct Capture {
    groups: Vec<usize>,
    parameter: Option<ParameterType>,
}

#[derive(Debug, Clone)]
struct CompiledStep {
    regex: Regex,
    captures: Vec<Capture>,
    definition: StepDefinition,
}

/// Compiled step definitions, in composed order
#[derive(Debug, Clone, Default)]
pub struct StepMatcher {
    steps: Vec<CompiledStep>,
}

/// A step definition matched against step text
#[derive(Debug, Clone)]
pub struct StepMatch<'m> {
    pub definition: &'m StepDefinition,
    pub captures: Vec<String>,
}

impl StepMatcher {
    /// Compile every definition. Fails on the first invalid pattern or
    /// unknown parameter type.
    pub fn compile(
        steps: &[StepDefinition],
        registry: &ParameterRegistry,
    ) -> Result<Self, RunError> {
        let steps = steps
            .iter()
            .map(|definition| compile_step(definition, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// First definition whose pattern matches `text`
    pub fn find(&self, text: &str) -> Option<StepMatch<'_>> {
        self.steps.iter().find_map(|step| {
            let caps = step.regex.captures(text)?;
            let captures = step
                .captures
                .iter()
                .map(|capture| {
                    let raw = capture
                        .groups
                        .iter()
                        .find_map(|group| caps.get(*group))
                        .map(|m| m.as_str())
                        .unwrap_or("");
                    match &capture.parameter {
                        Some(parameter) => parameter.apply(raw),
                        None => raw.to_string(),
                    }
                })
                .collect();
            Some(StepMatch {
                definition: &step.definition,
                captures,
            })
        })
    }

}

impl StepMatch<'_> {
    pub fn into_args(
        self,
        text: &str,
        docstring: Option<String>,
        table: Option<Vec<Vec<String>>>,
    ) -> StepArgs {
        StepArgs {
            text: text.to_string(),
            captures: self.captures,
            docstring,
            table,
        }
    }
}

fn compile_step(
    definition: &StepDefinition,
    registry: &ParameterRegistry,
) -> Result<CompiledStep, RunError> {
    let invalid = |reason: String| RunError::StepPattern {
        pattern: definition.pattern.to_string(),
        reason,
    };

    let (regex, captures) = match &definition.pattern {
        StepPattern::Regex(source) => {
            let regex = Regex::new(source).map_err(|e| invalid(e.to_string()))?;
            let captures = (1..regex.captures_len())
                .map(|group| Capture {
                    groups: vec![group],
                    parameter: None,
                })
                .collect();
            (regex, captures)
        }
        StepPattern::Expression(expression) => {
            compile_expression(expression, registry).map_err(invalid)?
        }
    };

    Ok(CompiledStep {
        regex,
        captures,
        definition: definition.clone(),
    })
}

/// Expand a cucumber expression into an anchored regex. Registered parameter
/// types take precedence over the expression language's own.
fn compile_expression(
    expression: &str,
    registry: &ParameterRegistry,
) -> Result<(Regex, Vec<Capture>), String> {
    let parameters: HashMap<&str, &str> = registry
        .iter()
        .map(|parameter| (parameter.name.as_str(), parameter.regexp.as_str()))
        .collect();
    let regex =
        Expression::regex_with_parameters(expression, &parameters).map_err(|e| e.to_string())?;

    let names: Vec<String> = Expression::parse(expression)
        .map_err(|e| e.to_string())?
        .0
        .into_iter()
        .filter_map(|item| match item {
            SingleExpression::Parameter(parameter) => Some(parameter.input.to_string()),
            _ => None,
        })
        .collect();

    let mut captures: Vec<Capture> = names
        .iter()
        .map(|name| Capture {
            groups: Vec::new(),
            parameter: registry.get(name).cloned(),
        })
        .collect();

    // Plain groups belong to the parameter after the last one seen; groups
    // inside a parameter's own regexp are named `__{parameter}_{n}`.
    let mut current: Option<usize> = None;
    for (group, name) in regex.capture_names().enumerate().skip(1) {
        let index = match name.and_then(parameter_index) {
            Some(index) => index,
            None => current.map_or(0, |index| index + 1),
        };
        let capture = captures
            .get_mut(index)
            .ok_or_else(|| format!("capture group {} has no parameter", group))?;
        capture.groups.push(group);
        current = Some(index);
    }

    Ok((regex, captures))
}

/// Parameter index of a group named `__{index}_{n}`
fn parameter_index(name: &str) -> Option<usize> {
    let (index, _) = name.strip_prefix("__")?.split_once('_')?;
    index.parse().ok()
}
