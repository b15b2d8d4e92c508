//! Table columns derived from the field model.
//!
//! Columns are pure functions of `(fields, records)`; [`ViewCache`] keeps the
//! last result until the store reports a new revision.

use crate::field::{FieldDefinition, FieldType};
use crate::filter::{Filter, MatchMode, NOT_SELECTED, SELECTED};
use crate::record::{FieldValue, Record};
use crate::store::Store;
use tracing::debug;

/// Display text for an empty cell
pub const EMPTY_CELL: &str = "-";

/// One table column with its filter choices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub field_id: String,
    pub label: String,
    pub kind: FieldType,
    pub required: bool,
    /// Values offered in the column's filter dropdown
    pub choices: Vec<String>,
    pub mode: MatchMode,
}

impl Column {
    pub fn from_field(field: &FieldDefinition, records: &[Record]) -> Self {
        let choices = match field.kind {
            FieldType::Checkbox => vec![SELECTED.to_string(), NOT_SELECTED.to_string()],
            FieldType::Text | FieldType::TextArea | FieldType::Date | FieldType::Select => {
                unique_values(records, &field.id)
            }
        };

        Self {
            field_id: field.id.clone(),
            label: field.label.clone(),
            kind: field.kind,
            required: field.required,
            choices,
            mode: MatchMode::for_type(field.kind),
        }
    }

    /// Does `record` pass this column's filter for `choice`
    pub fn matches(&self, record: &Record, choice: &str) -> bool {
        self.mode.matches(record.get(&self.field_id), choice)
    }

    /// Cell text: `-` when empty, `[x]`/`[ ]` for checkboxes, long text cut
    pub fn display(&self, record: &Record) -> String {
        match record.get(&self.field_id) {
            None => EMPTY_CELL.to_string(),
            Some(value) if value.is_empty() => EMPTY_CELL.to_string(),
            Some(FieldValue::Flag(true)) => "[x]".to_string(),
            Some(FieldValue::Flag(false)) => "[ ]".to_string(),
            Some(FieldValue::Text(s)) => match self.kind.max_chars() {
                Some(max) if s.chars().count() > max => {
                    let cut: String = s.chars().take(max).collect();
                    format!("{}...", cut)
                }
                _ => s.clone(),
            },
        }
    }
}

/// Distinct observed values in first-seen order; missing values show as ""
fn unique_values(records: &[Record], field_id: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for record in records {
        let value = record.get(field_id).map(|v| v.to_string()).unwrap_or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
    values
}

/// One column per field, in field order
pub fn columns<'a, I>(fields: I, records: &[Record]) -> Vec<Column>
where
    I: IntoIterator<Item = &'a FieldDefinition>,
{
    fields
        .into_iter()
        .map(|field| Column::from_field(field, records))
        .collect()
}

/// Records passing every filter (OR within a filter's choices, AND across filters)
///
/// A filter naming a field with no column matches nothing.
pub fn apply_filters<'r>(columns: &[Column], records: &'r [Record], filters: &[Filter]) -> Vec<&'r Record> {
    records
        .iter()
        .filter(|record| {
            filters.iter().all(|filter| {
                columns
                    .iter()
                    .find(|c| c.field_id == filter.field)
                    .is_some_and(|column| filter.choices.iter().any(|choice| column.matches(record, choice)))
            })
        })
        .collect()
}

/// Memoized columns keyed on the store's field and record revisions
#[derive(Debug, Default)]
pub struct ViewCache {
    key: Option<(u64, u64)>,
    columns: Vec<Column>,
}

impl ViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the cached columns were computed for the store's current state
    pub fn is_fresh(&self, store: &Store) -> bool {
        self.key == Some(cache_key(store))
    }

    pub fn columns(&mut self, store: &Store) -> &[Column] {
        let key = cache_key(store);
        if self.key != Some(key) {
            debug!(fields_revision = key.0, store_revision = key.1, "Recomputing columns");
            self.columns = columns(store.fields(), store.records());
            self.key = Some(key);
        }
        &self.columns
    }
}

fn cache_key(store: &Store) -> (u64, u64) {
    (store.fields().revision(), store.revision())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldSet;
    use crate::record::payload;
    use crate::store::default_records;

    fn column(fields: &FieldSet, id: &str, records: &[Record]) -> Column {
        Column::from_field(fields.get(id).unwrap(), records)
    }

    #[test]
    fn test_columns_follow_field_order() {
        let fields = FieldSet::default();
        let cols = columns(&fields, &default_records());
        let ids: Vec<&str> = cols.iter().map(|c| c.field_id.as_str()).collect();
        assert_eq!(ids, ["name", "address", "memo", "joinDate", "job", "emailSubscription"]);
    }

    #[test]
    fn test_choices() {
        let fields = FieldSet::default();
        let mut records = default_records();
        records.push(Record::new("r3", payload([("name", "John Doe")])));

        assert_eq!(column(&fields, "name", &records).choices, ["John Doe", "Foo Bar"]);
        assert_eq!(column(&fields, "job", &records).choices, ["Developer", "PO", ""]);

        // The "" choice for a missing memo selects only that record
        let memo = column(&fields, "memo", &records);
        assert_eq!(memo.choices.last().map(String::as_str), Some(""));
        let missing: Vec<&Record> = records.iter().filter(|r| memo.matches(r, "")).collect();
        assert_eq!(missing, [&records[2]]);
        assert_eq!(
            column(&fields, "emailSubscription", &records).choices,
            [SELECTED, NOT_SELECTED]
        );
    }

    #[test]
    fn test_text_column_substring() {
        let fields = FieldSet::default();
        let records = default_records();
        let address = column(&fields, "address", &records);

        assert!(address.matches(&records[0], "Gangnam"));
        assert!(!address.matches(&records[1], "Gangnam"));
        assert!(address.matches(&records[1], "Seoul"));
        assert_eq!(address.mode, MatchMode::Contains);
    }

    #[test]
    fn test_select_and_date_exact() {
        let fields = FieldSet::default();
        let records = default_records();
        let job = column(&fields, "job", &records);
        let join = column(&fields, "joinDate", &records);

        assert!(job.matches(&records[1], "PO"));
        assert!(!job.matches(&records[0], "Dev"));
        assert!(join.matches(&records[0], "2024-10-02"));
        assert!(!join.matches(&records[0], "2024-10"));
    }

    #[test]
    fn test_checkbox_column() {
        let fields = FieldSet::default();
        let records = default_records();
        let sub = column(&fields, "emailSubscription", &records);

        assert!(sub.matches(&records[0], SELECTED));
        assert!(!sub.matches(&records[0], NOT_SELECTED));
        assert!(sub.matches(&records[1], NOT_SELECTED));
    }

    #[test]
    fn test_display() {
        let fields = FieldSet::default();
        let record = Record::new(
            "r1",
            payload([
                ("name", FieldValue::from("a".repeat(21))),
                ("address", "".into()),
                ("emailSubscription", true.into()),
            ]),
        );
        let cols = columns(&fields, std::slice::from_ref(&record));

        assert_eq!(cols[0].display(&record), format!("{}...", "a".repeat(20)));
        assert_eq!(cols[1].display(&record), EMPTY_CELL);
        assert_eq!(cols[2].display(&record), EMPTY_CELL);
        assert_eq!(cols[5].display(&record), "[x]");
    }

    #[test]
    fn test_apply_filters() {
        let fields = FieldSet::default();
        let records = default_records();
        let cols = columns(&fields, &records);

        let seoul = apply_filters(&cols, &records, &[Filter::new("address", "Seoul")]);
        assert_eq!(seoul.len(), 2);

        let both = apply_filters(
            &cols,
            &records,
            &[Filter::new("address", "Seoul"), Filter::new("emailSubscription", SELECTED)],
        );
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].id, records[0].id);

        let either = Filter {
            field: "job".to_string(),
            choices: vec!["PO".to_string(), "Developer".to_string()],
        };
        assert_eq!(apply_filters(&cols, &records, &[either]).len(), 2);

        assert!(apply_filters(&cols, &records, &[Filter::new("unknown", "x")]).is_empty());
        assert!(apply_filters(&cols, &records, &[Filter::new("memo", "")]).is_empty());
        assert_eq!(apply_filters(&cols, &records, &[]).len(), 2);
    }

    #[test]
    fn test_view_cache_recomputes_on_mutation() {
        let mut store = Store::in_memory(FieldSet::default());
        let mut cache = ViewCache::new();

        assert!(!cache.is_fresh(&store));
        assert_eq!(cache.columns(&store)[0].choices, ["John Doe", "Foo Bar"]);
        assert!(cache.is_fresh(&store));

        store
            .add(payload([("name", FieldValue::from("Jane")), ("joinDate", "2024-01-01".into())]))
            .unwrap();
        assert!(!cache.is_fresh(&store));
        assert_eq!(cache.columns(&store)[0].choices, ["John Doe", "Foo Bar", "Jane"]);
        assert!(cache.is_fresh(&store));
    }
}
