//! Record merge policy: decides, field by field, what an incoming partial
//! record may change on a stored candidate.
//!
//! Smart import and spreadsheet reconciliation use [`merge`]: fill empty
//! fields, never clobber populated ones, append notes, and only write
//! structured JSON when nothing is stored yet. The direct field-patch endpoint
//! uses [`CandidateUpdate::overwrite`] instead (last write wins).

use serde_json::Value;

use crate::models::candidate::{CandidatePatch, CandidateRecord, TextField};

/// The set of column writes produced by a merge or a direct patch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateUpdate {
    pub texts: Vec<(TextField, String)>,
    /// Full replacement value for `notes`.
    pub notes: Option<String>,
    pub work_history: Option<Value>,
    pub education_details: Option<Value>,
    pub ai_match_result: Option<Value>,
}

impl CandidateUpdate {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
            && self.notes.is_none()
            && self.work_history.is_none()
            && self.education_details.is_none()
            && self.ai_match_result.is_none()
    }

    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields: Vec<&'static str> = self.texts.iter().map(|(f, _)| f.column()).collect();
        if self.notes.is_some() {
            fields.push("notes");
        }
        if self.work_history.is_some() {
            fields.push("work_history");
        }
        if self.education_details.is_some() {
            fields.push("education_details");
        }
        if self.ai_match_result.is_some() {
            fields.push("ai_match_result");
        }
        fields
    }

    /// Applies the writes to an in-memory record.
    pub fn apply_to(&self, record: &mut CandidateRecord) {
        for (field, value) in &self.texts {
            record.set_text(*field, value.clone());
        }
        if let Some(notes) = &self.notes {
            record.notes = Some(notes.clone());
        }
        if let Some(history) = &self.work_history {
            record.work_history = Some(history.clone());
        }
        if let Some(details) = &self.education_details {
            record.education_details = Some(details.clone());
        }
        if let Some(result) = &self.ai_match_result {
            record.ai_match_result = Some(result.clone());
        }
    }

    /// Last-write-wins: every field present in the patch is written as given.
    pub fn overwrite(patch: &CandidatePatch) -> Self {
        CandidateUpdate {
            texts: TextField::ALL
                .into_iter()
                .filter_map(|field| patch.text(field).map(|v| (field, v.to_string())))
                .collect(),
            notes: patch.notes.clone(),
            work_history: patch.work_history.clone(),
            education_details: patch.education_details.clone(),
            ai_match_result: None,
        }
    }
}

/// A stored or incoming value counts as empty when it is missing, blank, or a
/// literal zero in a numeric text field.
pub fn is_blank(field: TextField, value: Option<&str>) -> bool {
    match value.map(str::trim) {
        None | Some("") => true,
        Some(v) if field.is_numeric() => v.parse::<f64>().is_ok_and(|n| n == 0.0),
        Some(_) => false,
    }
}

/// Fill-empty merge of `incoming` into `existing`. Pure; never fails.
///
/// Every write is conditioned on the stored value being empty (or on the
/// incoming notes not already being present as whole lines), so merging the
/// same payload a second time yields an empty update.
pub fn merge(existing: &CandidateRecord, incoming: &CandidatePatch) -> CandidateUpdate {
    let texts = TextField::ALL
        .into_iter()
        .filter(|field| is_blank(*field, existing.text(*field)))
        .filter_map(|field| {
            incoming
                .text(field)
                .filter(|v| !is_blank(field, Some(v)))
                .map(|v| (field, v.to_string()))
        })
        .collect();

    CandidateUpdate {
        texts,
        notes: merge_notes(existing.notes.as_deref(), incoming.notes.as_deref()),
        work_history: fill_absent(&existing.work_history, &incoming.work_history),
        education_details: fill_absent(&existing.education_details, &incoming.education_details),
        ai_match_result: None,
    }
}

/// Returns the new notes value, or `None` when notes stay as they are.
fn merge_notes(existing: Option<&str>, incoming: Option<&str>) -> Option<String> {
    let incoming = incoming.filter(|n| !n.trim().is_empty())?;
    match existing.filter(|n| !n.trim().is_empty()) {
        None => Some(incoming.to_string()),
        Some(current) if notes_already_present(current, incoming) => None,
        Some(current) => Some(format!("{current}\n{incoming}")),
    }
}

/// Whitespace-insensitive match of `incoming` against whole lines of
/// `current`: any single line, or any run of trailing lines (which is what an
/// earlier append of a multi-line note left behind).
fn notes_already_present(current: &str, incoming: &str) -> bool {
    let needle = collapse_whitespace(incoming);
    let lines: Vec<&str> = current.lines().collect();
    if lines.iter().any(|line| collapse_whitespace(line) == needle) {
        return true;
    }
    (1..=lines.len()).any(|k| collapse_whitespace(&lines[lines.len() - k..].join(" ")) == needle)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Structured values are only written when the column is null; an empty array
/// or object already stored is kept.
fn fill_absent(existing: &Option<Value>, incoming: &Option<Value>) -> Option<Value> {
    match (existing, incoming) {
        (None, Some(value)) if !value.is_null() => Some(value.clone()),
        _ => None,
    }
}
