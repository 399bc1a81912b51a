use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;

/// Declared schema of one parameter.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Element schema for container types ("array", "tuple", "ArrayList", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<ParamSpec>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ParametersSpec {
    #[serde(default)]
    pub properties: IndexMap<String, ParamSpec>,
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDescription {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: ParametersSpec,
}

/// A tool that takes no arguments, e.g. `{"type": "web_search"}` or `{"name": "web_search"}`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BuiltinTool {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// One entry of a tool pool: either a full schema or a built-in marker, never both.
/// An entry carrying `parameters` is a function and must parse as one.
#[derive(Serialize, Clone, Debug)]
#[serde(untagged)]
pub enum ToolEntry {
    Function(FunctionDescription),
    Builtin(BuiltinTool),
}

impl<'de> Deserialize<'de> for ToolEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.get("parameters").is_some() {
            serde_json::from_value(value)
                .map(ToolEntry::Function)
                .map_err(D::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(ToolEntry::Builtin)
                .map_err(D::Error::custom)
        }
    }
}

impl ToolEntry {
    pub fn as_function(&self) -> Option<&FunctionDescription> {
        match self {
            ToolEntry::Function(f) => Some(f),
            ToolEntry::Builtin(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            ToolEntry::Function(f) => Some(&f.name),
            ToolEntry::Builtin(b) => b.name.as_deref().or(b.kind.as_deref()),
        }
    }
}

/// The `function` field of a test entry holds either a single record or a list.
#[derive(Serialize, Clone, Debug)]
#[serde(untagged)]
pub enum ToolList {
    Many(Vec<ToolEntry>),
    One(ToolEntry),
}

impl<'de> Deserialize<'de> for ToolList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_array() {
            serde_json::from_value(value).map(ToolList::Many).map_err(D::Error::custom)
        } else {
            serde_json::from_value(value).map(ToolList::One).map_err(D::Error::custom)
        }
    }
}

impl ToolList {
    pub fn entries(&self) -> Vec<&ToolEntry> {
        match self {
            ToolList::Many(entries) => entries.iter().collect(),
            ToolList::One(entry) => vec![entry],
        }
    }

    /// The single function a simple-call case is about. Built-in markers are skipped.
    pub fn primary(&self) -> Option<&FunctionDescription> {
        self.entries().into_iter().find_map(ToolEntry::as_function)
    }

    /// Finds the description for a ground-truth function name.
    /// An exact name wins; otherwise the first description whose name is contained in `name`.
    pub fn find(&self, name: &str) -> Option<&FunctionDescription> {
        let functions: Vec<&FunctionDescription> = self
            .entries()
            .into_iter()
            .filter_map(ToolEntry::as_function)
            .collect();
        if let ToolList::One(ToolEntry::Function(only)) = self {
            return Some(only);
        }
        functions
            .iter()
            .find(|f| f.name == name)
            .or_else(|| functions.iter().find(|f| name.contains(f.name.as_str())))
            .copied()
    }
}

impl From<Vec<FunctionDescription>> for ToolList {
    fn from(descriptions: Vec<FunctionDescription>) -> Self {
        ToolList::Many(descriptions.into_iter().map(ToolEntry::Function).collect())
    }
}

impl From<FunctionDescription> for ToolList {
    fn from(description: FunctionDescription) -> Self {
        ToolList::One(ToolEntry::Function(description))
    }
}

/// Rewrites `a.b` to `a_b` for models whose function-calling API rejects dots in names.
pub fn convert_func_name(function_name: &str, model_forbids_dots: bool) -> String {
    if model_forbids_dots && function_name.contains('.') {
        function_name.replace('.', "_")
    } else {
        function_name.to_string()
    }
}
