//! Parameter types for cucumber expressions

use std::fmt;

/// Converts captured text before it reaches the step
pub type Transform = fn(&str) -> String;

/// A named `{type}` usable in step expressions
#[derive(Clone)]
pub struct ParameterType {
    pub name: String,
    /// Regular expression the parameter matches. When it has capturing
    /// groups, the first group that took part in the match is the argument.
    pub regexp: String,
    /// Who registered it, for diagnostics
    pub source: String,
    pub transform: Option<Transform>,
}

impl ParameterType {
    pub fn new(name: &str, regexp: &str) -> Self {
        Self {
            name: name.to_string(),
            regexp: regexp.to_string(),
            source: "user".to_string(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn apply(&self, captured: &str) -> String {
        match self.transform {
            Some(transform) => transform(captured),
            None => captured.to_string(),
        }
    }
}

impl fmt::Debug for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterType")
            .field("name", &self.name)
            .field("regexp", &self.regexp)
            .field("source", &self.source)
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// Parameter types by name, in registration order
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    types: Vec<ParameterType>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter type
    pub fn register(&mut self, parameter_type: ParameterType) {
        match self.types.iter_mut().find(|t| t.name == parameter_type.name) {
            Some(existing) => *existing = parameter_type,
            None => self.types.push(parameter_type),
        }
    }

    /// Add a parameter type only when the name is free. Returns whether it
    /// was added.
    pub fn register_if_absent(&mut self, parameter_type: ParameterType) -> bool {
        if self.contains(&parameter_type.name) {
            return false;
        }
        self.types.push(parameter_type);
        true
    }

    pub fn get(&self, name: &str) -> Option<&ParameterType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterType> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

const STRING_PATTERN: &str = r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#;

/// `{string}`, `{int}`, `{float}`, `{word}` and `{condition}`
pub fn builtin_parameter_types() -> ParameterRegistry {
    let mut registry = ParameterRegistry::new();
    for parameter_type in [
        ParameterType::new("string", STRING_PATTERN).with_transform(unquote),
        ParameterType::new("int", r"-?\d+"),
        ParameterType::new("float", r"-?\d*\.?\d+"),
        ParameterType::new("word", r"[^\s]+"),
        ParameterType::new("condition", r"to .+"),
    ] {
        registry.register(parameter_type.with_source("builtin"));
    }
    registry
}

/// Strip the surrounding quotes of a `{string}` capture and resolve
/// backslash escapes
fn unquote(captured: &str) -> String {
    let inner = captured
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| captured.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(captured);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(escaped) => out.push(escaped),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
