use std::collections::{HashMap, HashSet};

/// A unique key declared on a model.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    /// Fields covered by the key, in declaration order.
    pub fields: Vec<String>,
    /// Message used instead of the default "Validation error".
    pub msg: Option<String>,
}

impl UniqueKey {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            msg: None,
        }
    }

    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }
}

/// Shape of the records a statement reads or writes.
///
/// Normalization reads the JSON attributes, insert handling reads the
/// primary key and auto-increment attribute, and error translation reads
/// the unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelDescriptor {
    pub name: String,
    pub primary_key_attribute: Option<String>,
    /// Column name of the primary key, when it differs from the attribute.
    pub primary_key_field: Option<String>,
    pub auto_increment_attribute: Option<String>,
    pub json_attributes: HashSet<String>,
    /// Unique keys by key name.
    pub unique_keys: HashMap<String, UniqueKey>,
}

impl ModelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn primary_key(mut self, attribute: impl Into<String>) -> Self {
        self.primary_key_attribute = Some(attribute.into());
        self
    }

    pub fn primary_key_field(mut self, field: impl Into<String>) -> Self {
        self.primary_key_field = Some(field.into());
        self
    }

    pub fn auto_increment(mut self, attribute: impl Into<String>) -> Self {
        self.auto_increment_attribute = Some(attribute.into());
        self
    }

    pub fn json_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.json_attributes.insert(attribute.into());
        self
    }

    pub fn unique_key(mut self, name: impl Into<String>, key: UniqueKey) -> Self {
        self.unique_keys.insert(name.into(), key);
        self
    }

    pub fn is_json_attribute(&self, column: &str) -> bool {
        self.json_attributes.contains(column)
    }

    /// Column that receives synthesized identities on bulk insert: the
    /// primary key, provided it is also the auto-increment attribute.
    pub fn auto_increment_primary_field(&self) -> Option<&str> {
        let pk = self.primary_key_attribute.as_deref()?;
        if self.auto_increment_attribute.as_deref() != Some(pk) {
            return None;
        }
        Some(self.primary_key_field.as_deref().unwrap_or(pk))
    }
}
