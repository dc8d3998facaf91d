//! Closed set of browser actions a sequence step can name.
//!
//! A step's `tool_name` is resolved through [`ACTION_TABLE`]; anything not in
//! the table is [`RoteError::UnknownAction`]. Parameters are then decoded into
//! a typed [`BrowserAction`] and dispatched to a [`BrowserDriver`].

use crate::driver::BrowserDriver;
use crate::errors::RoteError;
use crate::types::{Locator, LocatorBy, Parameters};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Find,
    GetText,
    Hover,
    DoubleClick,
    RightClick,
    PressKey,
    DragAndDrop,
    UploadFile,
}

pub static ACTION_TABLE: &[(&str, ActionKind)] = &[
    ("navigate", ActionKind::Navigate),
    ("click_element", ActionKind::Click),
    ("send_keys", ActionKind::Type),
    ("find_element", ActionKind::Find),
    ("get_element_text", ActionKind::GetText),
    ("hover", ActionKind::Hover),
    ("double_click", ActionKind::DoubleClick),
    ("right_click", ActionKind::RightClick),
    ("press_key", ActionKind::PressKey),
    ("drag_and_drop", ActionKind::DragAndDrop),
    ("upload_file", ActionKind::UploadFile),
];

impl ActionKind {
    pub fn from_tool_name(tool_name: &str) -> Result<Self, RoteError> {
        ACTION_TABLE
            .iter()
            .find(|(name, _)| *name == tool_name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| RoteError::UnknownAction(tool_name.to_string()))
    }

    pub fn tool_name(self) -> &'static str {
        ACTION_TABLE
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserAction {
    Navigate {
        url: String,
    },
    Click {
        locator: Locator,
        timeout_ms: u64,
    },
    Type {
        locator: Locator,
        text: String,
        timeout_ms: u64,
    },
    Find {
        locator: Locator,
        timeout_ms: u64,
    },
    GetText {
        locator: Locator,
        timeout_ms: u64,
    },
    Hover {
        locator: Locator,
        timeout_ms: u64,
    },
    DoubleClick {
        locator: Locator,
        timeout_ms: u64,
    },
    RightClick {
        locator: Locator,
        timeout_ms: u64,
    },
    PressKey {
        key: String,
    },
    DragAndDrop {
        source: Locator,
        target: Locator,
        timeout_ms: u64,
    },
    UploadFile {
        locator: Locator,
        file_path: String,
        timeout_ms: u64,
    },
}

impl BrowserAction {
    /// Decodes `parameters` for `tool_name`. `default_timeout_ms` applies when
    /// the step carries no `timeout`.
    pub fn parse(
        tool_name: &str,
        parameters: &Parameters,
        default_timeout_ms: u64,
    ) -> Result<Self, RoteError> {
        let kind = ActionKind::from_tool_name(tool_name)?;
        let params = ParamReader {
            tool_name,
            parameters,
        };
        let action = match kind {
            ActionKind::Navigate => Self::Navigate {
                url: params.required_str("url")?,
            },
            ActionKind::Click => Self::Click {
                locator: params.locator("by", "value")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::Type => Self::Type {
                locator: params.locator("by", "value")?,
                text: params.required_str("text")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::Find => Self::Find {
                locator: params.locator("by", "value")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::GetText => Self::GetText {
                locator: params.locator("by", "value")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::Hover => Self::Hover {
                locator: params.locator("by", "value")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::DoubleClick => Self::DoubleClick {
                locator: params.locator("by", "value")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::RightClick => Self::RightClick {
                locator: params.locator("by", "value")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::PressKey => Self::PressKey {
                key: params.required_str("key")?,
            },
            ActionKind::DragAndDrop => Self::DragAndDrop {
                source: params.locator("by", "value")?,
                target: params.locator("targetBy", "targetValue")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
            ActionKind::UploadFile => Self::UploadFile {
                locator: params.locator("by", "value")?,
                file_path: params.required_str("filePath")?,
                timeout_ms: params.timeout(default_timeout_ms)?,
            },
        };
        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::Click { .. } => ActionKind::Click,
            Self::Type { .. } => ActionKind::Type,
            Self::Find { .. } => ActionKind::Find,
            Self::GetText { .. } => ActionKind::GetText,
            Self::Hover { .. } => ActionKind::Hover,
            Self::DoubleClick { .. } => ActionKind::DoubleClick,
            Self::RightClick { .. } => ActionKind::RightClick,
            Self::PressKey { .. } => ActionKind::PressKey,
            Self::DragAndDrop { .. } => ActionKind::DragAndDrop,
            Self::UploadFile { .. } => ActionKind::UploadFile,
        }
    }

    /// Performs the action and returns a small JSON summary of what happened.
    pub fn execute(&self, driver: &dyn BrowserDriver) -> Result<Value, RoteError> {
        match self {
            Self::Navigate { url } => {
                driver.navigate(url)?;
                Ok(json!({ "url": url }))
            }
            Self::Click {
                locator,
                timeout_ms,
            } => {
                driver.click(locator, *timeout_ms)?;
                Ok(json!({ "clicked": locator.to_string() }))
            }
            Self::Type {
                locator,
                text,
                timeout_ms,
            } => {
                driver.type_text(locator, text, *timeout_ms)?;
                Ok(json!({ "typed_into": locator.to_string(), "chars": text.chars().count() }))
            }
            Self::Find {
                locator,
                timeout_ms,
            } => {
                driver.find_element(locator, *timeout_ms)?;
                Ok(json!({ "found": locator.to_string() }))
            }
            Self::GetText {
                locator,
                timeout_ms,
            } => {
                let text = driver.get_text(locator, *timeout_ms)?;
                Ok(json!({ "locator": locator.to_string(), "text": text }))
            }
            Self::Hover {
                locator,
                timeout_ms,
            } => {
                driver.hover(locator, *timeout_ms)?;
                Ok(json!({ "hovered": locator.to_string() }))
            }
            Self::DoubleClick {
                locator,
                timeout_ms,
            } => {
                driver.double_click(locator, *timeout_ms)?;
                Ok(json!({ "double_clicked": locator.to_string() }))
            }
            Self::RightClick {
                locator,
                timeout_ms,
            } => {
                driver.right_click(locator, *timeout_ms)?;
                Ok(json!({ "right_clicked": locator.to_string() }))
            }
            Self::PressKey { key } => {
                driver.press_key(key)?;
                Ok(json!({ "key": key }))
            }
            Self::DragAndDrop {
                source,
                target,
                timeout_ms,
            } => {
                driver.drag_and_drop(source, target, *timeout_ms)?;
                Ok(json!({ "source": source.to_string(), "target": target.to_string() }))
            }
            Self::UploadFile {
                locator,
                file_path,
                timeout_ms,
            } => {
                driver.upload_file(locator, file_path, *timeout_ms)?;
                Ok(json!({ "uploaded": file_path, "into": locator.to_string() }))
            }
        }
    }
}

struct ParamReader<'a> {
    tool_name: &'a str,
    parameters: &'a Parameters,
}

impl ParamReader<'_> {
    fn required_str(&self, key: &str) -> Result<String, RoteError> {
        match self.parameters.get(key) {
            Some(Value::String(value)) if !value.is_empty() => Ok(value.clone()),
            Some(Value::String(_)) | None | Some(Value::Null) => Err(RoteError::Validation(
                format!("{} requires '{key}'", self.tool_name),
            )),
            Some(other) => Err(RoteError::Validation(format!(
                "{} expects '{key}' to be a string, got {other}",
                self.tool_name
            ))),
        }
    }

    fn locator(&self, by_key: &str, value_key: &str) -> Result<Locator, RoteError> {
        let by = self.required_str(by_key)?;
        let by = LocatorBy::parse(&by).ok_or_else(|| {
            let allowed = LocatorBy::ALL
                .iter()
                .map(|by| by.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            RoteError::Validation(format!(
                "{} has unknown locator strategy '{by}' (expected one of {allowed})",
                self.tool_name
            ))
        })?;
        Ok(Locator::new(by, self.required_str(value_key)?))
    }

    // Substituted values arrive as strings, so numeric strings are accepted.
    fn timeout(&self, default_ms: u64) -> Result<u64, RoteError> {
        let invalid = |raw: &Value| {
            RoteError::Validation(format!(
                "{} has invalid timeout {raw}",
                self.tool_name
            ))
        };
        match self.parameters.get("timeout") {
            None | Some(Value::Null) => Ok(default_ms),
            Some(raw @ Value::Number(number)) => number.as_u64().ok_or_else(|| invalid(raw)),
            Some(raw @ Value::String(text)) => text.trim().parse().map_err(|_| invalid(raw)),
            Some(raw) => Err(invalid(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::FakeDriver;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().expect("object")
    }

    #[test]
    fn table_round_trips_every_kind() {
        assert_eq!(ACTION_TABLE.len(), 11);
        for (name, kind) in ACTION_TABLE {
            assert_eq!(ActionKind::from_tool_name(name).expect("known"), *kind);
            assert_eq!(kind.tool_name(), *name);
        }
    }

    #[test]
    fn unknown_tool_is_a_typed_error() {
        let err = BrowserAction::parse("take_screenshot", &Parameters::new(), 100)
            .expect_err("must reject");
        assert!(matches!(err, RoteError::UnknownAction(name) if name == "take_screenshot"));
    }

    #[test]
    fn send_keys_decodes_locator_text_and_default_timeout() {
        let action = BrowserAction::parse(
            "send_keys",
            &params(json!({"by": "name", "value": "user", "text": "alice"})),
            7000,
        )
        .expect("parse");
        assert_eq!(
            action,
            BrowserAction::Type {
                locator: Locator::new(LocatorBy::Name, "user"),
                text: "alice".to_string(),
                timeout_ms: 7000,
            }
        );
    }

    #[test]
    fn timeout_accepts_numbers_and_numeric_strings() {
        let numeric = BrowserAction::parse(
            "click_element",
            &params(json!({"by": "id", "value": "go", "timeout": 250})),
            9,
        )
        .expect("numeric");
        let textual = BrowserAction::parse(
            "click_element",
            &params(json!({"by": "id", "value": "go", "timeout": "250"})),
            9,
        )
        .expect("string");
        assert_eq!(numeric, textual);

        let err = BrowserAction::parse(
            "click_element",
            &params(json!({"by": "id", "value": "go", "timeout": "soon"})),
            9,
        )
        .expect_err("bad timeout");
        assert!(matches!(err, RoteError::Validation(_)));
    }

    #[test]
    fn missing_and_malformed_fields_are_validation_errors() {
        let err = BrowserAction::parse("navigate", &Parameters::new(), 1).expect_err("no url");
        assert!(matches!(err, RoteError::Validation(message) if message.contains("'url'")));

        let err = BrowserAction::parse(
            "hover",
            &params(json!({"by": "selector", "value": "#x"})),
            1,
        )
        .expect_err("bad strategy");
        assert!(matches!(err, RoteError::Validation(message) if message.contains("selector")));

        let err = BrowserAction::parse("press_key", &params(json!({"key": 13})), 1)
            .expect_err("non-string key");
        assert!(matches!(err, RoteError::Validation(_)));
    }

    #[test]
    fn drag_and_drop_reads_target_locator() {
        let action = BrowserAction::parse(
            "drag_and_drop",
            &params(json!({
                "by": "css", "value": ".card",
                "targetBy": "xpath", "targetValue": "//ul[2]",
            })),
            5,
        )
        .expect("parse");
        let driver = FakeDriver::new();
        let output = action.execute(&driver).expect("execute");
        assert_eq!(output["target"], json!("xpath=//ul[2]"));
        assert_eq!(driver.calls()[0].detail, "css=.card -> xpath=//ul[2]");
    }

    #[test]
    fn get_text_returns_driver_text() {
        let driver = FakeDriver::new();
        driver.set_text(&Locator::new(LocatorBy::Css, "h1"), "Dashboard");
        let action = BrowserAction::parse(
            "get_element_text",
            &params(json!({"by": "css", "value": "h1"})),
            5,
        )
        .expect("parse");
        assert_eq!(action.kind(), ActionKind::GetText);
        let output = action.execute(&driver).expect("execute");
        assert_eq!(output["text"], json!("Dashboard"));
    }

    #[test]
    fn driver_errors_propagate_from_execute() {
        let driver = FakeDriver::new();
        driver.fail_call(0, "file chooser closed");
        let action = BrowserAction::parse(
            "upload_file",
            &params(json!({"by": "id", "value": "f", "filePath": "/tmp/a.png"})),
            5,
        )
        .expect("parse");
        let err = action.execute(&driver).expect_err("driver fails");
        assert!(matches!(err, RoteError::Driver(_)));
    }
}
