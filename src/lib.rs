// MemberStore - Field-driven member records with schema validation

pub mod column;
pub mod config;
pub mod error;
pub mod field;
pub mod filter;
pub mod form;
pub mod record;
pub mod storage;
pub mod store;
pub mod validate;

// Re-export main types for convenience
pub use column::{Column, ViewCache, apply_filters, columns};
pub use config::{Config, StorageKind};
pub use error::{FieldError, StoreError};
pub use field::{FieldDefinition, FieldPatch, FieldSet, FieldSpec, FieldType};
pub use filter::{Filter, MatchMode};
pub use form::{ControlKind, FormControl, Rule, form_controls};
pub use record::{FieldValue, Payload, Record, payload};
pub use storage::{FileStorage, MemoryStorage, Snapshot, SqliteStorage, Storage};
pub use store::{Store, StoreOptions};
pub use validate::{Violations, validate_record, validate_value};
