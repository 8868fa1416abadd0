//! Element snapshots read from a page

use serde::{Deserialize, Serialize};

/// What a backend reports about the first element matching a selector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    /// Lowercase tag name
    pub tag: String,
    /// `type` attribute of `<input>` elements
    pub input_type: Option<String>,
    pub text: String,
    pub value: Option<String>,
    pub checked: bool,
    pub multiple: bool,
    /// Selected option values in DOM order
    pub selected_values: Vec<String>,
    /// All option values in DOM order
    pub options: Vec<String>,
    pub href: Option<String>,
    pub visible: bool,
}

impl Default for ElementSnapshot {
    fn default() -> Self {
        Self::new("div")
    }
}

impl ElementSnapshot {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            input_type: None,
            text: String::new(),
            value: None,
            checked: false,
            multiple: false,
            selected_values: Vec::new(),
            options: Vec::new(),
            href: None,
            visible: true,
        }
    }

    pub fn input(input_type: &str) -> Self {
        Self {
            input_type: Some(input_type.to_string()),
            value: Some(String::new()),
            ..Self::new("input")
        }
    }

    pub fn checkbox(checked: bool) -> Self {
        Self {
            checked,
            value: Some("on".to_string()),
            ..Self::input("checkbox")
        }
    }

    pub fn radio(value: &str, checked: bool) -> Self {
        Self {
            checked,
            value: Some(value.to_string()),
            ..Self::input("radio")
        }
    }

    pub fn select<S: AsRef<str>>(options: &[S], multiple: bool) -> Self {
        let options: Vec<String> = options.iter().map(|o| o.as_ref().to_string()).collect();
        let selected_values = if multiple {
            Vec::new()
        } else {
            options.first().cloned().into_iter().collect()
        };
        Self {
            multiple,
            selected_values,
            options,
            ..Self::new("select")
        }
    }

    pub fn link(href: &str) -> Self {
        Self {
            href: Some(href.to_string()),
            ..Self::new("a")
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn is_checkbox(&self) -> bool {
        self.tag == "input" && self.input_type.as_deref() == Some("checkbox")
    }

    pub fn is_radio(&self) -> bool {
        self.tag == "input" && self.input_type.as_deref() == Some("radio")
    }

    /// Form value as a string.
    ///
    /// Checkboxes report `"true"`/`"false"`, an unchecked radio reports `""`,
    /// a multi-select reports its selected values comma-joined in DOM order.
    pub fn extract_value(&self) -> String {
        if self.is_checkbox() {
            return self.checked.to_string();
        }
        if self.is_radio() {
            return if self.checked {
                self.value.clone().unwrap_or_else(|| "on".to_string())
            } else {
                String::new()
            };
        }
        if self.tag == "select" {
            return if self.multiple {
                self.selected_values.join(",")
            } else {
                self.selected_values.first().cloned().unwrap_or_default()
            };
        }
        match &self.value {
            Some(value) => value.clone(),
            None => self.text.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkbox_value_is_boolean_string() {
        assert_eq!(ElementSnapshot::checkbox(true).extract_value(), "true");
        assert_eq!(ElementSnapshot::checkbox(false).extract_value(), "false");
    }

    #[test]
    fn test_unchecked_radio_is_empty() {
        assert_eq!(ElementSnapshot::radio("express", false).extract_value(), "");
        assert_eq!(ElementSnapshot::radio("express", true).extract_value(), "express");
    }

    #[test]
    fn test_multi_select_joins_in_dom_order() {
        let mut select = ElementSnapshot::select(&["red", "green", "blue"], true);
        select.selected_values = vec!["red".to_string(), "blue".to_string()];
        assert_eq!(select.extract_value(), "red,blue");
    }

    #[test]
    fn test_single_select_defaults_to_first_option() {
        let select = ElementSnapshot::select(&["small", "large"], false);
        assert_eq!(select.extract_value(), "small");
    }

    #[test]
    fn test_text_input_and_plain_element() {
        assert_eq!(ElementSnapshot::input("text").with_value("Ada").extract_value(), "Ada");
        assert_eq!(ElementSnapshot::new("span").with_text(" 42 ").extract_value(), "42");
    }

    #[test]
    fn test_snapshot_from_bridge_json() {
        let json = r#"{"tag":"input","inputType":"checkbox","checked":true,"visible":true}"#;
        let snapshot: ElementSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.is_checkbox());
        assert_eq!(snapshot.extract_value(), "true");
    }
}
