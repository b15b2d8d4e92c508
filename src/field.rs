//! Field model: typed attribute definitions shared by every record.
//!
//! A [`FieldSet`] is the single schema that validation, form controls and
//! table columns are all derived from.

use crate::error::FieldError;
use crate::record::{FieldValue, Payload};
use crate::validate::Violations;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Character limit for `text` values
pub const TEXT_MAX_CHARS: usize = 20;
/// Character limit for `textarea` values
pub const TEXTAREA_MAX_CHARS: usize = 50;

/// Record attribute that holds the store-assigned identifier
pub const RESERVED_ID: &str = "id";

/// Closed set of field kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    TextArea,
    Date,
    Select,
    Checkbox,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::TextArea => "textarea",
            FieldType::Date => "date",
            FieldType::Select => "select",
            FieldType::Checkbox => "checkbox",
        }
    }

    /// Maximum length in characters, for the free-text kinds
    pub fn max_chars(self) -> Option<usize> {
        match self {
            FieldType::Text => Some(TEXT_MAX_CHARS),
            FieldType::TextArea => Some(TEXTAREA_MAX_CHARS),
            FieldType::Date | FieldType::Select | FieldType::Checkbox => None,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, typed attribute definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, kind: FieldType, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
            required: false,
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Check the model invariants; empty result means the definition is sound
    pub fn check(&self) -> Violations {
        let mut violations = check_spec(&FieldSpec::from(self));
        if self.id.trim().is_empty() {
            violations
                .entry("id".to_string())
                .or_default()
                .push("Field id cannot be empty".to_string());
        } else if self.id == RESERVED_ID {
            violations
                .entry("id".to_string())
                .or_default()
                .push(format!("Field id `{}` is reserved for record ids", RESERVED_ID));
        }
        violations
    }
}

/// A field definition before an id is assigned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub label: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl From<&FieldDefinition> for FieldSpec {
    fn from(def: &FieldDefinition) -> Self {
        Self {
            kind: def.kind,
            label: def.label.clone(),
            required: def.required,
            options: def.options.clone(),
        }
    }
}

/// Partial edit applied by [`FieldSet::update`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPatch {
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<FieldType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Validate a definition that has not been given an id yet
pub fn check_spec(spec: &FieldSpec) -> Violations {
    let mut violations = Violations::new();

    if spec.label.trim().is_empty() {
        violations.insert("label".to_string(), vec!["Label is required".to_string()]);
    }

    match (spec.kind, spec.options.is_empty()) {
        (FieldType::Select, true) => {
            violations.insert(
                "options".to_string(),
                vec!["Select fields need at least one option".to_string()],
            );
        }
        (FieldType::Select, false) => {
            if spec.options.iter().any(|o| o.is_empty()) {
                violations.insert("options".to_string(), vec!["Options cannot be empty".to_string()]);
            }
        }
        (_, false) => {
            violations.insert(
                "options".to_string(),
                vec![format!("{} fields cannot have options", spec.kind)],
            );
        }
        (_, true) => {}
    }

    violations
}

/// Ordered collection of field definitions with unique ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    fields: Vec<FieldDefinition>,
    revision: u64,
}

impl Default for FieldSet {
    /// The built-in member schema
    fn default() -> Self {
        Self {
            fields: vec![
                FieldDefinition::new("name", FieldType::Text, "Name").required(),
                FieldDefinition::new("address", FieldType::Text, "Address"),
                FieldDefinition::new("memo", FieldType::TextArea, "Memo"),
                FieldDefinition::new("joinDate", FieldType::Date, "Join date").required(),
                FieldDefinition::new("job", FieldType::Select, "Job").with_options(["Developer", "PO", "Designer"]),
                FieldDefinition::new("emailSubscription", FieldType::Checkbox, "Email subscription"),
            ],
            revision: 0,
        }
    }
}

impl FieldSet {
    pub fn empty() -> Self {
        Self {
            fields: Vec::new(),
            revision: 0,
        }
    }

    /// Build a set, checking every definition and id uniqueness
    pub fn from_definitions(definitions: Vec<FieldDefinition>) -> Result<Self, FieldError> {
        let mut set = Self::empty();
        for def in definitions {
            set.insert(def)?;
        }
        set.revision = 0;
        Ok(set)
    }

    /// Parse a YAML list of definitions
    pub fn from_yaml(yaml: &str) -> Result<Self, FieldError> {
        let definitions: Vec<FieldDefinition> = serde_yaml::from_str(yaml)?;
        Self::from_definitions(definitions)
    }

    /// Load a YAML field file from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FieldError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| FieldError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let set = Self::from_yaml(&yaml)?;
        debug!(path = ?path, count = set.len(), "Loaded field definitions");
        Ok(set)
    }

    pub fn to_yaml(&self) -> Result<String, FieldError> {
        Ok(serde_yaml::to_string(&self.fields)?)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldDefinition> {
        self.fields.iter()
    }

    pub fn as_slice(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Bumped on every successful edit
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append a definition under a fresh generated id
    pub fn add(&mut self, spec: FieldSpec) -> Result<&FieldDefinition, FieldError> {
        let violations = check_spec(&spec);
        if !violations.is_empty() {
            return Err(FieldError::Invalid(violations));
        }

        let def = FieldDefinition {
            id: uuid::Uuid::new_v4().to_string(),
            kind: spec.kind,
            label: spec.label,
            required: spec.required,
            options: spec.options,
        };
        debug!(id = %def.id, kind = %def.kind, "Adding field");
        self.fields.push(def);
        self.revision += 1;
        Ok(&self.fields[self.fields.len() - 1])
    }

    /// Append a definition that already carries its id
    pub fn insert(&mut self, def: FieldDefinition) -> Result<(), FieldError> {
        let violations = def.check();
        if !violations.is_empty() {
            return Err(FieldError::Invalid(violations));
        }
        if self.contains(&def.id) {
            return Err(FieldError::Duplicate { id: def.id });
        }
        self.fields.push(def);
        self.revision += 1;
        Ok(())
    }

    /// Merge `patch` onto the definition and re-check it
    pub fn update(&mut self, id: &str, patch: FieldPatch) -> Result<&FieldDefinition, FieldError> {
        let index = self
            .fields
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| FieldError::NotFound { id: id.to_string() })?;

        let mut def = self.fields[index].clone();
        if let Some(kind) = patch.kind {
            def.kind = kind;
        }
        if let Some(label) = patch.label {
            def.label = label;
        }
        if let Some(required) = patch.required {
            def.required = required;
        }
        if let Some(options) = patch.options {
            def.options = options;
        }

        let violations = def.check();
        if !violations.is_empty() {
            return Err(FieldError::Invalid(violations));
        }

        self.fields[index] = def;
        self.revision += 1;
        Ok(&self.fields[index])
    }

    pub fn remove(&mut self, id: &str) -> Result<FieldDefinition, FieldError> {
        let index = self
            .fields
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| FieldError::NotFound { id: id.to_string() })?;
        self.revision += 1;
        Ok(self.fields.remove(index))
    }

    /// Starting values for a new record form
    pub fn blank_payload(&self) -> Payload {
        let today = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        self.fields
            .iter()
            .filter_map(|f| {
                let value = match f.kind {
                    FieldType::Text | FieldType::TextArea => FieldValue::Text(String::new()),
                    FieldType::Date => FieldValue::Text(today.clone()),
                    FieldType::Checkbox => FieldValue::Flag(false),
                    FieldType::Select => return None,
                };
                Some((f.id.clone(), value))
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a FieldDefinition;
    type IntoIter = std::slice::Iter<'a, FieldDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}
