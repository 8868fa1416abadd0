//! Schema validation over the parsed config document.
//!
//! Runs before deserialization so that every violation is reported at once
//! instead of stopping at the first field serde rejects.

use serde_json::{Map, Value};

use super::types::{Browser, DriverKind, ScenarioOrder};
use crate::engine::parse_tag_expression;
use crate::error::ValidationIssue;

const TOP_LEVEL_KEYS: [&str; 9] = [
    "projectRoot",
    "baseURL",
    "features",
    "steps",
    "driver",
    "webServer",
    "cucumber",
    "environment",
    "timeout",
];

/// Validate a config document, returning every issue found
pub fn validate(doc: &Value) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let Some(root) = doc.as_object() else {
        issues.push(ValidationIssue::new("", "config must be a table/object"));
        return issues;
    };

    for key in root.keys() {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            issues.push(ValidationIssue::new(key.as_str(), "unknown option"));
        }
    }

    if let Some(value) = root.get("projectRoot") {
        check_non_empty_string(value, "projectRoot", &mut issues);
    }
    if let Some(value) = root.get("baseURL") {
        check_url(value, "baseURL", &mut issues);
    }
    if let Some(value) = root.get("features") {
        check_string_list(value, "features", &mut issues);
    }
    if let Some(value) = root.get("steps") {
        check_string_list(value, "steps", &mut issues);
    }
    if let Some(value) = root.get("driver") {
        check_driver(value, &mut issues);
    }
    if let Some(value) = root.get("webServer") {
        check_web_server(value, &mut issues);
    }
    if let Some(value) = root.get("cucumber") {
        check_cucumber(value, &mut issues);
    }
    if let Some(value) = root.get("environment") {
        check_environment(value, &mut issues);
    }
    if let Some(value) = root.get("timeout") {
        check_positive_integer(value, "timeout", &mut issues);
    }

    issues
}

fn check_driver(value: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(driver) = table(value, "driver", issues) else {
        return;
    };
    if let Some(kind) = driver.get("kind") {
        check_enum(kind, "driver.kind", &DriverKind::VARIANTS, issues);
    }
    if let Some(browser) = driver.get("browser") {
        check_enum(browser, "driver.browser", &Browser::VARIANTS, issues);
    }
    if let Some(headless) = driver.get("headless") {
        check_bool(headless, "driver.headless", issues);
    }
    for key in driver.keys() {
        if !["kind", "browser", "headless"].contains(&key.as_str()) {
            issues.push(ValidationIssue::new(format!("driver.{}", key), "unknown option"));
        }
    }
}

fn check_web_server(value: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(server) = table(value, "webServer", issues) else {
        return;
    };
    match server.get("command") {
        Some(command) => check_non_empty_string(command, "webServer.command", issues),
        None => issues.push(ValidationIssue::new("webServer.command", "is required")),
    }
    match server.get("port") {
        Some(port) => {
            let in_range = port
                .as_u64()
                .map(|p| (1..=u16::MAX as u64).contains(&p))
                .unwrap_or(false);
            if !in_range {
                issues.push(ValidationIssue::new(
                    "webServer.port",
                    "must be an integer between 1 and 65535",
                ));
            }
        }
        None => issues.push(ValidationIssue::new("webServer.port", "is required")),
    }
    if let Some(url) = server.get("baseURL") {
        check_url(url, "webServer.baseURL", issues);
    }
    if let Some(reuse) = server.get("reuseExistingServer") {
        check_bool(reuse, "webServer.reuseExistingServer", issues);
    }
    if let Some(timeout) = server.get("timeout") {
        check_positive_integer(timeout, "webServer.timeout", issues);
    }
}

fn check_cucumber(value: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(cucumber) = table(value, "cucumber", issues) else {
        return;
    };
    if let Some(expression) = cucumber.get("tagExpression") {
        match expression.as_str() {
            Some(text) if text.trim().is_empty() => {}
            Some(text) => {
                if let Err(reason) = parse_tag_expression(text) {
                    issues.push(ValidationIssue::new("cucumber.tagExpression", reason));
                }
            }
            None => issues.push(ValidationIssue::new("cucumber.tagExpression", "must be a string")),
        }
    }
    if let Some(order) = cucumber.get("order") {
        check_enum(order, "cucumber.order", &ScenarioOrder::VARIANTS, issues);
    }
}

fn check_environment(value: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(environment) = table(value, "environment", issues) else {
        return;
    };
    for (key, value) in environment {
        if !value.is_string() {
            issues.push(ValidationIssue::new(
                format!("environment.{}", key),
                "must be a string",
            ));
        }
    }
}

fn table<'a>(
    value: &'a Value,
    path: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<&'a Map<String, Value>> {
    let table = value.as_object();
    if table.is_none() {
        issues.push(ValidationIssue::new(path, "must be a table/object"));
    }
    table
}

fn check_url(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(text) = value.as_str() else {
        issues.push(ValidationIssue::new(path, "must be a string"));
        return;
    };
    match url::Url::parse(text) {
        Ok(parsed) if parsed.has_host() => {}
        Ok(_) => issues.push(ValidationIssue::new(path, format!("{:?} has no host", text))),
        Err(e) => issues.push(ValidationIssue::new(
            path,
            format!("{:?} is not an absolute URL: {}", text, e),
        )),
    }
}

fn check_string_list(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(items) = value.as_array() else {
        issues.push(ValidationIssue::new(path, "must be an array of strings"));
        return;
    };
    if items.is_empty() {
        issues.push(ValidationIssue::new(path, "must not be empty"));
    }
    for (index, item) in items.iter().enumerate() {
        match item.as_str() {
            Some(text) if !text.trim().is_empty() => {}
            Some(_) => issues.push(ValidationIssue::new(
                format!("{}[{}]", path, index),
                "must not be empty",
            )),
            None => issues.push(ValidationIssue::new(
                format!("{}[{}]", path, index),
                "must be a string",
            )),
        }
    }
}

fn check_enum(value: &Value, path: &str, allowed: &[&str], issues: &mut Vec<ValidationIssue>) {
    match value.as_str() {
        Some(text) if allowed.contains(&text) => {}
        _ => issues.push(ValidationIssue::new(
            path,
            format!("must be one of {}", allowed.join(", ")),
        )),
    }
}

fn check_bool(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    if !value.is_boolean() {
        issues.push(ValidationIssue::new(path, "must be a boolean"));
    }
}

fn check_non_empty_string(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    match value.as_str() {
        Some(text) if !text.trim().is_empty() => {}
        Some(_) => issues.push(ValidationIssue::new(path, "must not be empty")),
        None => issues.push(ValidationIssue::new(path, "must be a string")),
    }
}

fn check_positive_integer(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    if !value.as_u64().map(|n| n > 0).unwrap_or(false) {
        issues.push(ValidationIssue::new(path, "must be a positive integer (milliseconds)"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(issues: &[ValidationIssue]) -> Vec<&str> {
        issues.iter().map(|i| i.path.as_str()).collect()
    }

    #[test]
    fn test_valid_document_has_no_issues() {
        let doc = json!({
            "baseURL": "http://localhost:8080",
            "features": ["features/**/*.feature"],
            "steps": ["bdui/steps/**/*.rs"],
            "driver": { "kind": "mock", "browser": "webkit", "headless": false },
            "webServer": { "command": "npm run dev", "port": 8080, "reuseExistingServer": true },
            "cucumber": { "tagExpression": "@smoke and not @wip", "order": "defined" },
            "environment": { "API_URL": "http://localhost:9000" },
        });
        assert!(validate(&doc).is_empty());
    }

    #[test]
    fn test_every_violation_is_reported() {
        let doc = json!({
            "baseURL": "not a url",
            "features": [],
            "steps": ["ok", 3],
            "driver": { "kind": "selenium", "browser": "netscape" },
            "webServer": { "command": "", "port": 70000 },
        });
        let issues = validate(&doc);
        let found = paths(&issues);
        for expected in [
            "baseURL",
            "features",
            "steps[1]",
            "driver.kind",
            "driver.browser",
            "webServer.command",
            "webServer.port",
        ] {
            assert!(found.contains(&expected), "missing {expected} in {found:?}");
        }
    }

    #[test]
    fn test_non_object_root_is_rejected() {
        let issues = validate(&json!(["features"]));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].path, "");
    }

    #[test]
    fn test_bad_tag_expression_is_reported() {
        let issues = validate(&json!({ "cucumber": { "tagExpression": "@a and (" } }));
        assert_eq!(paths(&issues), vec!["cucumber.tagExpression"]);
    }

    #[test]
    fn test_web_server_requires_command_and_port() {
        let issues = validate(&json!({ "webServer": {} }));
        assert_eq!(paths(&issues), vec!["webServer.command", "webServer.port"]);
    }

    #[test]
    fn test_unknown_keys_are_flagged() {
        let issues = validate(&json!({ "baseUrl": "http://localhost" }));
        assert_eq!(paths(&issues), vec!["baseUrl"]);
    }
}
