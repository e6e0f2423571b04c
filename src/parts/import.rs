//! Tab-separated bulk import: `part_number<TAB>parent[<TAB>issues]`.
//!
//! Existing parents are never overwritten; non-blank issues always are.

use serde::Serialize;
use tracing::debug;

use super::{Part, PartsCatalog, normalize_part_number};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportLine {
    pub part_number: String,
    pub parent: String,
    pub issues: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub issues_updated: usize,
}

impl ImportSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0
    }

    pub fn message(&self) -> String {
        let mut clauses = Vec::new();
        if self.added > 0 {
            clauses.push(format!("Added {} new parts", self.added));
        }
        if self.updated > 0 {
            clauses.push(format!("updated {} existing parts", self.updated));
        }
        if self.issues_updated > 0 {
            clauses.push(format!("updated issues for {} parts", self.issues_updated));
        }
        if clauses.is_empty() {
            return "Import complete! No changes.".to_string();
        }
        format!("Import complete! {}.", clauses.join(", "))
    }
}

/// Returns `None` for lines that do not carry at least a part number and a
/// parent column.
pub fn parse_import_line(line: &str) -> Option<ImportLine> {
    if !line.contains('\t') {
        return None;
    }
    let mut fields = line.split('\t');
    let part_number = normalize_part_number(fields.next()?);
    let parent = normalize_part_number(fields.next()?);
    let issues = fields.next().map(str::trim).unwrap_or("").to_string();
    if part_number.is_empty() {
        return None;
    }
    Some(ImportLine {
        part_number,
        parent,
        issues,
    })
}

pub fn merge_import(catalog: &mut PartsCatalog, text: &str) -> ImportSummary {
    let mut summary = ImportSummary::default();
    for (idx, raw) in text.lines().enumerate() {
        match parse_import_line(raw) {
            Some(line) => apply_line(catalog, line, &mut summary),
            None => {
                if !raw.trim().is_empty() {
                    debug!(line = idx + 1, "skipping malformed import line");
                }
            }
        }
    }
    summary
}

fn apply_line(catalog: &mut PartsCatalog, line: ImportLine, summary: &mut ImportSummary) {
    let existing_key = catalog
        .lookup(&line.part_number)
        .map(|(key, _)| key.to_string());
    let Some(key) = existing_key else {
        catalog.insert(
            line.part_number,
            Part {
                parent: line.parent,
                issues: line.issues,
                usage: String::new(),
            },
        );
        summary.added += 1;
        return;
    };

    let Some(part) = catalog.get_mut(&key) else {
        return;
    };
    let mut changed = false;
    if !line.parent.is_empty() && part.parent.trim().is_empty() {
        part.parent = line.parent;
        changed = true;
    }
    if !line.issues.is_empty() {
        part.issues = line.issues;
        summary.issues_updated += 1;
        changed = true;
    }
    if changed {
        summary.updated += 1;
    }
}
