use std::sync::Arc;

use crate::types::{ModelDescriptor, Record};

/// Caller-declared shape of a statement. Exactly one applies per execution
/// and it selects the normalization path; SQL text is never inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryIntent {
    Select,
    Insert,
    Update,
    BulkUpdate,
    BulkDelete,
    Upsert,
    Describe,
    ShowIndexes,
    ShowTables,
    ShowConstraints,
    ForeignKeys,
    Call,
    Version,
    Raw,
    /// Anything else; the bound instance is returned unchanged.
    Other,
}

impl QueryIntent {
    /// Statements whose response is a record set.
    pub fn is_select_family(self) -> bool {
        matches!(
            self,
            QueryIntent::Select
                | QueryIntent::Raw
                | QueryIntent::Describe
                | QueryIntent::ShowIndexes
                | QueryIntent::ShowTables
                | QueryIntent::ShowConstraints
                | QueryIntent::ForeignKeys
        )
    }
}

/// Per-statement options set by the caller before execution.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub intent: QueryIntent,
    /// Shape of the records involved, if the statement targets a model.
    pub model: Option<Arc<ModelDescriptor>>,
    /// The in-process instance the statement was issued for.
    pub instance: Option<Record>,
    /// Fetch and log server warnings after a select-family statement.
    pub show_warnings: bool,
}

impl QueryOptions {
    pub fn new(intent: QueryIntent) -> Self {
        Self {
            intent,
            model: None,
            instance: None,
            show_warnings: false,
        }
    }

    pub fn model(mut self, model: Arc<ModelDescriptor>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn instance(mut self, instance: Record) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn show_warnings(mut self, enabled: bool) -> Self {
        self.show_warnings = enabled;
        self
    }
}

impl From<QueryIntent> for QueryOptions {
    fn from(intent: QueryIntent) -> Self {
        QueryOptions::new(intent)
    }
}
