use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Tool parameters as captured from the calling agent.
pub type Parameters = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocatorBy {
    Id,
    Css,
    Xpath,
    Name,
    Tag,
    Class,
}

impl LocatorBy {
    pub const ALL: [LocatorBy; 6] = [
        Self::Id,
        Self::Css,
        Self::Xpath,
        Self::Name,
        Self::Tag,
        Self::Class,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "id" => Some(Self::Id),
            "css" => Some(Self::Css),
            "xpath" => Some(Self::Xpath),
            "name" => Some(Self::Name),
            "tag" => Some(Self::Tag),
            "class" => Some(Self::Class),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Css => "css",
            Self::Xpath => "xpath",
            Self::Name => "name",
            Self::Tag => "tag",
            Self::Class => "class",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub by: LocatorBy,
    pub value: String,
}

impl Locator {
    pub fn new(by: LocatorBy, value: impl Into<String>) -> Self {
        Self {
            by,
            value: value.into(),
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.by.as_str(), self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Parameters,
}

impl Action {
    pub fn new(tool_name: impl Into<String>, parameters: Parameters) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSequence {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub trigger_pattern: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sequence {
    pub name: String,
    pub description: String,
    pub trigger_pattern: Option<String>,
    /// Ordered by step; step `n` is `actions[n - 1]`.
    pub actions: Vec<Action>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceSummary {
    pub name: String,
    pub description: String,
    pub trigger_pattern: Option<String>,
    pub action_count: usize,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewElementMapping {
    pub site_pattern: String,
    pub element_name: String,
    pub locator_by: LocatorBy,
    pub locator_value: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementMapping {
    pub site_pattern: String,
    pub element_name: String,
    pub locator_by: LocatorBy,
    pub locator_value: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ElementMapping {
    pub fn locator(&self) -> Locator {
        Locator::new(self.locator_by, self.locator_value.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExecution {
    /// `None` for a standalone action outside any sequence run.
    pub sequence_name: Option<String>,
    pub tool_name: String,
    pub parameters: Value,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionHistoryEntry {
    pub id: i64,
    pub sequence_name: Option<String>,
    pub tool_name: String,
    pub parameters: Value,
    pub success: bool,
    pub error_message: Option<String>,
    pub executed_at: i64,
}
