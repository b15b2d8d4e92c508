// Column filter choices and matching

use crate::field::FieldType;
use crate::record::FieldValue;
use eyre::{Result, eyre};

/// Checkbox filter choice matching `true`
pub const SELECTED: &str = "Selected";
/// Checkbox filter choice matching `false` or a missing value
pub const NOT_SELECTED: &str = "Not selected";

/// Filter on one column: passes when any choice matches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    /// Field id of the column to filter on
    pub field: String,
    /// Selected filter values, OR-ed together
    pub choices: Vec<String>,
}

impl Filter {
    pub fn new(field: impl Into<String>, choice: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            choices: vec![choice.into()],
        }
    }

    /// Parse `field=value`
    pub fn parse(s: &str) -> Result<Self> {
        let (field, value) = s
            .split_once('=')
            .ok_or_else(|| eyre!("Invalid filter: {} (expected field=value)", s))?;
        if field.is_empty() {
            return Err(eyre!("Invalid filter: {} (field cannot be empty)", s));
        }
        Ok(Self::new(field, value))
    }

    /// Group single-choice filters on the same field into one
    pub fn merge(filters: Vec<Filter>) -> Vec<Filter> {
        let mut merged: Vec<Filter> = Vec::new();
        for filter in filters {
            match merged.iter_mut().find(|f| f.field == filter.field) {
                Some(existing) => existing.choices.extend(filter.choices),
                None => merged.push(filter),
            }
        }
        merged
    }
}

/// How a column compares a record value against a filter choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Contains, // substring of the value
    Exact,    // whole value equals choice
    Flag,     // SELECTED / NOT_SELECTED
}

impl MatchMode {
    pub fn for_type(kind: FieldType) -> Self {
        match kind {
            FieldType::Text | FieldType::TextArea => MatchMode::Contains,
            FieldType::Date | FieldType::Select => MatchMode::Exact,
            FieldType::Checkbox => MatchMode::Flag,
        }
    }

    pub fn matches(self, value: Option<&FieldValue>, choice: &str) -> bool {
        match self {
            // "" stands for the missing value, not "every value"
            MatchMode::Contains if choice.is_empty() => value.is_none_or(|v| v.is_empty()),
            MatchMode::Contains => value.is_some_and(|v| v.to_string().contains(choice)),
            // A missing value is listed as "" among the choices, so it matches ""
            MatchMode::Exact => value.map(|v| v.to_string()).unwrap_or_default() == choice,
            MatchMode::Flag => {
                let checked = match value {
                    Some(FieldValue::Flag(b)) => *b,
                    Some(FieldValue::Text(s)) => !s.is_empty(),
                    None => false,
                };
                match choice {
                    SELECTED => checked,
                    NOT_SELECTED => !checked,
                    _ => false,
                }
            }
        }
    }
}

impl std::fmt::Display for MatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchMode::Contains => write!(f, "contains"),
            MatchMode::Exact => write!(f, "equals"),
            MatchMode::Flag => write!(f, "is"),
        }
    }
}
