//! Sort key model: what each key column is, which way it sorts, and whether
//! it participates in duplicate detection.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, SortError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Numeric,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyDefinition {
    pub data_type: KeyType,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub is_unique: bool,
}

impl KeyDefinition {
    pub fn new(data_type: KeyType, direction: SortDirection) -> Self {
        Self {
            data_type,
            direction,
            is_unique: false,
        }
    }

    pub fn numeric(direction: SortDirection) -> Self {
        Self::new(KeyType::Numeric, direction)
    }

    pub fn text(direction: SortDirection) -> Self {
        Self::new(KeyType::Text, direction)
    }

    pub fn unique(mut self) -> Self {
        self.is_unique = true;
        self
    }
}

/// Ordered, non-empty list of key definitions. Position defines tie-break
/// precedence; the first definition is the merge-purge lookup key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinitionSet {
    definitions: Vec<KeyDefinition>,
}

impl KeyDefinitionSet {
    pub fn new(definitions: Vec<KeyDefinition>) -> Result<Self> {
        if definitions.is_empty() {
            return Err(SortError::invalid("At least one key definition is required"));
        }
        Ok(Self { definitions })
    }

    pub fn single(definition: KeyDefinition) -> Self {
        Self {
            definitions: vec![definition],
        }
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn definitions(&self) -> &[KeyDefinition] {
        &self.definitions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, KeyDefinition> {
        self.definitions.iter()
    }

    pub fn lookup_key(&self) -> &KeyDefinition {
        &self.definitions[0]
    }

    pub fn has_unique(&self) -> bool {
        self.definitions.iter().any(|d| d.is_unique)
    }

    /// Number of leading key columns compared when detecting duplicates:
    /// everything up to and including the last unique-flagged key. Comparing a
    /// prefix keeps duplicates adjacent in the sorted scan.
    pub fn dedup_prefix_len(&self) -> Option<usize> {
        self.definitions
            .iter()
            .rposition(|d| d.is_unique)
            .map(|idx| idx + 1)
    }

    /// Checks that an extracted tuple has one value per definition, each of
    /// the declared type.
    pub fn validate_tuple(&self, keys: &[Key]) -> std::result::Result<(), String> {
        if keys.len() != self.definitions.len() {
            return Err(format!(
                "expected {} key values, got {}",
                self.definitions.len(),
                keys.len()
            ));
        }
        self.validate_prefix(keys)
    }

    /// Like [`validate_tuple`](Self::validate_tuple) but accepts any leading
    /// subset of the keys, as used for lookups.
    pub fn validate_prefix(&self, keys: &[Key]) -> std::result::Result<(), String> {
        if keys.is_empty() || keys.len() > self.definitions.len() {
            return Err(format!(
                "expected between 1 and {} key values, got {}",
                self.definitions.len(),
                keys.len()
            ));
        }
        for (idx, (key, def)) in keys.iter().zip(&self.definitions).enumerate() {
            if key.key_type() != def.data_type {
                return Err(format!(
                    "key {} should be {:?} but was {:?}",
                    idx,
                    def.data_type,
                    key.key_type()
                ));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a KeyDefinitionSet {
    type Item = &'a KeyDefinition;
    type IntoIter = std::slice::Iter<'a, KeyDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.definitions.iter()
    }
}

/// One extracted key value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    Numeric(i64),
    Text(String),
}

impl Key {
    pub fn key_type(&self) -> KeyType {
        match self {
            Key::Numeric(_) => KeyType::Numeric,
            Key::Text(_) => KeyType::Text,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Key::Text(value.into())
    }

    pub fn numeric_from_str(value: &str) -> Result<Self> {
        value
            .trim()
            .parse::<i64>()
            .map(Key::Numeric)
            .map_err(|_| SortError::invalid(format!("'{}' is not a valid numeric key", value)))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Numeric(n) => write!(f, "{}", n),
            Key::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Numeric(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

/// Converts a field to a key of the given type.
pub fn key_from_field(value: &str, key_type: KeyType) -> Result<Key> {
    match key_type {
        KeyType::Numeric => Key::numeric_from_str(value),
        KeyType::Text => Ok(Key::text(value)),
    }
}

/// Extractor that reads each key from a field position.
pub fn column_extractor(
    columns: Vec<(usize, KeyType)>,
) -> impl FnMut(&[String], &str) -> Result<Vec<Key>> + Send + 'static {
    move |fields: &[String], _line: &str| {
        columns
            .iter()
            .map(|&(column, key_type)| {
                let value = fields.get(column).ok_or_else(|| {
                    SortError::invalid(format!(
                        "Key column {} is missing from a line with {} fields",
                        column,
                        fields.len()
                    ))
                })?;
                key_from_field(value, key_type)
            })
            .collect()
    }
}

/// Trims and left-pads with `0` so numeric-looking text keys order numerically.
pub fn pad_key_with_zero(value: &str, key_length: usize) -> String {
    pad_left(value.trim(), key_length, '0')
}

/// Trims and right-pads with `fill`.
pub fn pad_key_right(value: &str, key_length: usize, fill: char) -> String {
    let value = value.trim();
    let len = value.chars().count();
    let mut out = String::with_capacity(key_length.max(value.len()));
    out.push_str(value);
    out.extend(std::iter::repeat(fill).take(key_length.saturating_sub(len)));
    out
}

fn pad_left(value: &str, width: usize, fill: char) -> String {
    let len = value.chars().count();
    let mut out: String = std::iter::repeat(fill)
        .take(width.saturating_sub(len))
        .collect();
    out.push_str(value);
    out
}
