// Form controls derived from field definitions

use crate::field::{FieldDefinition, FieldType};
use crate::record::FieldValue;
use crate::validate;
use serde::Serialize;

/// Editable control used for a field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "control", rename_all = "kebab-case")]
pub enum ControlKind {
    TextInput,
    TextArea,
    DatePicker,
    Select { options: Vec<String> },
    Checkbox,
}

impl ControlKind {
    pub fn for_field(field: &FieldDefinition) -> Self {
        match field.kind {
            FieldType::Text => ControlKind::TextInput,
            FieldType::TextArea => ControlKind::TextArea,
            FieldType::Date => ControlKind::DatePicker,
            FieldType::Select => ControlKind::Select {
                options: field.options.clone(),
            },
            FieldType::Checkbox => ControlKind::Checkbox,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ControlKind::TextInput => "text-input",
            ControlKind::TextArea => "text-area",
            ControlKind::DatePicker => "date-picker",
            ControlKind::Select { .. } => "select",
            ControlKind::Checkbox => "checkbox",
        }
    }
}

/// Rule shown alongside a control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "kebab-case")]
pub enum Rule {
    Required { message: String },
    MaxLength { limit: usize },
    DateFormat,
    OneOf { options: Vec<String> },
    Boolean,
}

impl std::fmt::Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Required { .. } => write!(f, "required"),
            Rule::MaxLength { limit } => write!(f, "max {} chars", limit),
            Rule::DateFormat => write!(f, "YYYY-MM-DD"),
            Rule::OneOf { options } => write!(f, "one of {}", options.join(" | ")),
            Rule::Boolean => write!(f, "true/false"),
        }
    }
}

/// Rules that apply to a field, in evaluation order
pub fn rules_for(field: &FieldDefinition) -> Vec<Rule> {
    let mut rules = Vec::new();

    // Checkbox absence is `false`, so `required` never fires for it
    if field.required && field.kind != FieldType::Checkbox {
        rules.push(Rule::Required {
            message: validate::required_message(field),
        });
    }

    match field.kind {
        FieldType::Text | FieldType::TextArea => {
            if let Some(limit) = field.kind.max_chars() {
                rules.push(Rule::MaxLength { limit });
            }
        }
        FieldType::Date => rules.push(Rule::DateFormat),
        FieldType::Select => rules.push(Rule::OneOf {
            options: field.options.clone(),
        }),
        FieldType::Checkbox => rules.push(Rule::Boolean),
    }

    rules
}

/// A form input bound to one field, with live validation feedback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormControl {
    pub field_id: String,
    pub label: String,
    pub required: bool,
    pub kind: ControlKind,
    pub rules: Vec<Rule>,
    #[serde(skip)]
    field: FieldDefinition,
}

impl FormControl {
    pub fn new(field: &FieldDefinition) -> Self {
        Self {
            field_id: field.id.clone(),
            label: field.label.clone(),
            required: field.required,
            kind: ControlKind::for_field(field),
            rules: rules_for(field),
            field: field.clone(),
        }
    }

    /// Messages for the value currently in the control
    pub fn feedback(&self, value: Option<&FieldValue>) -> Vec<String> {
        validate::validate_value(&self.field, value)
    }
}

/// One control per field, in field order
pub fn form_controls<'a, I>(fields: I) -> Vec<FormControl>
where
    I: IntoIterator<Item = &'a FieldDefinition>,
{
    fields.into_iter().map(FormControl::new).collect()
}
