//! Parts catalog: part numbers mapped to their parent assembly, known issues
//! and usage notes.

pub mod import;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::Collection;

pub use import::{ImportLine, ImportSummary, merge_import, parse_import_line};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub parent: String,
    #[serde(default)]
    pub issues: String,
    #[serde(default)]
    pub usage: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartEdit {
    pub parent: String,
    pub issues: String,
    pub usage: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLink {
    None,
    Found(String),
    Dangling(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartsError {
    #[error("part number is blank")]
    BlankPartNumber,
    #[error("part `{0}` not found")]
    NotFound(String),
    #[error("no part selected")]
    NoSelection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartsCatalog {
    parts: BTreeMap<String, Part>,
}

impl Collection for PartsCatalog {
    const FILE_NAME: &'static str = "parts.json";
}

pub fn normalize_part_number(raw: &str) -> String {
    raw.trim().to_uppercase()
}

impl PartsCatalog {
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Part)> {
        self.parts.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Part> {
        self.parts.get(key)
    }

    pub(crate) fn get_mut(&mut self, key: &str) -> Option<&mut Part> {
        self.parts.get_mut(key)
    }

    pub(crate) fn insert(&mut self, key: String, part: Part) {
        self.parts.insert(key, part);
    }

    /// Case-insensitive lookup. Keys written by this crate are already
    /// uppercase; the scan covers hand-edited documents.
    pub fn lookup(&self, raw: &str) -> Option<(&str, &Part)> {
        let wanted = normalize_part_number(raw);
        if wanted.is_empty() {
            return None;
        }
        if let Some((key, part)) = self.parts.get_key_value(&wanted) {
            return Some((key.as_str(), part));
        }
        self.parts
            .iter()
            .find(|(key, _)| key.to_uppercase() == wanted)
            .map(|(key, part)| (key.as_str(), part))
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.lookup(raw).is_some()
    }

    /// Confirms a lookup that came back empty. Returns whether a new record
    /// was inserted.
    pub fn add(&mut self, raw: &str) -> Result<bool, PartsError> {
        let key = normalize_part_number(raw);
        if key.is_empty() {
            return Err(PartsError::BlankPartNumber);
        }
        if self.contains(&key) {
            return Ok(false);
        }
        self.parts.insert(key, Part::default());
        Ok(true)
    }

    pub fn edit(&mut self, raw: &str, edit: PartEdit) -> Result<&Part, PartsError> {
        let key = self
            .lookup(raw)
            .map(|(key, _)| key.to_string())
            .ok_or_else(|| PartsError::NotFound(normalize_part_number(raw)))?;
        let part = self
            .parts
            .get_mut(&key)
            .ok_or_else(|| PartsError::NotFound(key.clone()))?;
        part.parent = normalize_part_number(&edit.parent);
        part.issues = edit.issues;
        part.usage = edit.usage;
        Ok(&*part)
    }

    pub fn parent_link(&self, raw: &str) -> Result<ParentLink, PartsError> {
        let (_, part) = self
            .lookup(raw)
            .ok_or_else(|| PartsError::NotFound(normalize_part_number(raw)))?;
        let parent = part.parent.trim();
        if parent.is_empty() {
            return Ok(ParentLink::None);
        }
        Ok(match self.lookup(parent) {
            Some((key, _)) => ParentLink::Found(key.to_string()),
            None => ParentLink::Dangling(normalize_part_number(parent)),
        })
    }

    /// Parts that name `raw` as their parent.
    pub fn children(&self, raw: &str) -> Vec<&str> {
        let wanted = normalize_part_number(raw);
        if wanted.is_empty() {
            return Vec::new();
        }
        self.parts
            .iter()
            .filter(|(_, part)| normalize_part_number(&part.parent) == wanted)
            .map(|(key, _)| key.as_str())
            .collect()
    }

    /// Choices offered for a part's parent: blank plus every known part.
    pub fn parent_options(&self) -> Vec<&str> {
        std::iter::once("")
            .chain(self.parts.keys().map(String::as_str))
            .collect()
    }
}
