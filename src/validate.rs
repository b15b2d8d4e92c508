//! Field value and record schema validation.
//!
//! Every applicable rule runs; a field's result is the full list of
//! messages, not just the first failure.

use crate::field::{FieldDefinition, FieldType};
use crate::record::{FieldValue, Payload};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Messages keyed by field id; fields without problems are absent
pub type Violations = BTreeMap<String, Vec<String>>;

/// Validate one candidate value against its field definition
///
/// Empty means valid. `None` and `""` count as empty; empty optional values
/// skip the type rules. A missing checkbox is `false`, which satisfies
/// `required`.
pub fn validate_value(field: &FieldDefinition, value: Option<&FieldValue>) -> Vec<String> {
    let mut messages = Vec::new();

    if field.kind == FieldType::Checkbox {
        if let Some(FieldValue::Text(_)) = value {
            messages.push(format!("{} must be true or false", field.label));
        }
        return messages;
    }

    let text = match value {
        None => None,
        Some(FieldValue::Text(s)) => Some(s.as_str()),
        Some(FieldValue::Flag(_)) => {
            messages.push(format!("{} must be text", field.label));
            return messages;
        }
    };

    let text = match text {
        Some(s) if !s.is_empty() => s,
        _ => {
            if field.required {
                messages.push(required_message(field));
            }
            return messages;
        }
    };

    match field.kind {
        FieldType::Text | FieldType::TextArea => {
            if let Some(max) = field.kind.max_chars().filter(|max| text.chars().count() > *max) {
                messages.push(format!("{} must be at most {} characters", field.label, max));
            }
        }
        FieldType::Date => {
            if !is_date_shaped(text) {
                messages.push(format!("{} must use the YYYY-MM-DD format", field.label));
            }
            if !is_calendar_date(text) {
                messages.push(format!("{} is not a valid calendar date", field.label));
            }
        }
        FieldType::Select => {
            if !field.options.iter().any(|o| o == text) {
                messages.push(format!("{} must be one of: {}", field.label, field.options.join(", ")));
            }
        }
        FieldType::Checkbox => {}
    }

    messages
}

/// Message for an empty required field
pub fn required_message(field: &FieldDefinition) -> String {
    match field.kind {
        FieldType::Select => format!("Please choose {}", field.label),
        _ => format!("{} is required", field.label),
    }
}

/// Validate a whole payload against the field set
pub fn validate_record<'a, I>(fields: I, payload: &Payload) -> Result<(), Violations>
where
    I: IntoIterator<Item = &'a FieldDefinition>,
{
    let violations: Violations = fields
        .into_iter()
        .filter_map(|field| {
            let messages = validate_value(field, payload.get(&field.id));
            (!messages.is_empty()).then(|| (field.id.clone(), messages))
        })
        .collect();

    if violations.is_empty() { Ok(()) } else { Err(violations) }
}

/// Record ids are UUIDs generated by the store
pub fn validate_record_id(id: &str) -> bool {
    uuid::Uuid::parse_str(id).is_ok()
}

/// `^\d{4}-\d{2}-\d{2}$`
fn is_date_shaped(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn is_calendar_date(s: &str) -> bool {
    is_date_shaped(s) && NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
}
