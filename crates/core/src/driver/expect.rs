//! Expectation conditions
//!
//! `Driver::expect` takes a condition string in one of five fixed forms:
//!
//! ```text
//! to be visible
//! to be hidden
//! to have text "<json string>"
//! to contain text "<json string>"
//! to have value "<json string>"
//! ```
//!
//! Anything else is rejected before the page is touched.

use std::fmt;

use super::element::ElementSnapshot;
use crate::error::{DriverError, DriverResult};

pub const SUPPORTED_CONDITIONS: [&str; 5] = [
    "to be visible",
    "to be hidden",
    "to have text <json string>",
    "to contain text <json string>",
    "to have value <json string>",
];

const HAVE_TEXT: &str = "to have text ";
const CONTAIN_TEXT: &str = "to contain text ";
const HAVE_VALUE: &str = "to have value ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextMode {
    Equals,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectationCondition {
    Visible,
    Hidden,
    Text { mode: TextMode, value: String },
    Value(String),
}

impl ExpectationCondition {
    pub fn parse(condition: &str) -> DriverResult<Self> {
        match condition {
            "to be visible" => return Ok(Self::Visible),
            "to be hidden" => return Ok(Self::Hidden),
            _ => {}
        }

        if let Some(payload) = condition.strip_prefix(HAVE_TEXT) {
            return Ok(Self::Text {
                mode: TextMode::Equals,
                value: decode(payload)?,
            });
        }
        if let Some(payload) = condition.strip_prefix(CONTAIN_TEXT) {
            return Ok(Self::Text {
                mode: TextMode::Contains,
                value: decode(payload)?,
            });
        }
        if let Some(payload) = condition.strip_prefix(HAVE_VALUE) {
            return Ok(Self::Value(decode(payload)?));
        }

        Err(DriverError::UnsupportedCondition {
            condition: condition.to_string(),
        })
    }

    /// Check a snapshot (or its absence) against the condition.
    ///
    /// On mismatch returns a description of what was observed instead.
    pub fn evaluate(&self, element: Option<&ElementSnapshot>) -> Result<(), String> {
        match (self, element) {
            (Self::Hidden, None) => Ok(()),
            (Self::Hidden, Some(el)) if !el.visible => Ok(()),
            (Self::Hidden, Some(_)) => Err("visible".to_string()),
            (_, None) => Err("<missing>".to_string()),
            (Self::Visible, Some(el)) if el.visible => Ok(()),
            (Self::Visible, Some(_)) => Err("hidden".to_string()),
            (Self::Text { mode, value }, Some(el)) => {
                let actual = el.text.trim();
                let matched = match mode {
                    TextMode::Equals => actual == value.as_str(),
                    TextMode::Contains => actual.contains(value.as_str()),
                };
                if matched {
                    Ok(())
                } else {
                    Err(actual.to_string())
                }
            }
            (Self::Value(expected), Some(el)) => {
                let actual = el.extract_value();
                if &actual == expected {
                    Ok(())
                } else {
                    Err(actual)
                }
            }
        }
    }
}

impl fmt::Display for ExpectationCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Visible => f.write_str("to be visible"),
            Self::Hidden => f.write_str("to be hidden"),
            Self::Text {
                mode: TextMode::Equals,
                value,
            } => write!(f, "to have text {:?}", value),
            Self::Text {
                mode: TextMode::Contains,
                value,
            } => write!(f, "to contain text {:?}", value),
            Self::Value(value) => write!(f, "to have value {:?}", value),
        }
    }
}

fn decode(payload: &str) -> DriverResult<String> {
    serde_json::from_str::<String>(payload).map_err(|source| DriverError::ConditionPayload {
        payload: payload.to_string(),
        source,
    })
}
