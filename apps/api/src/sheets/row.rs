//! Column layout of the mirror spreadsheet (A..X) and conversions to and from
//! relational records.
//!
//! `github_url` has no column: on the way in it is recovered from the notes
//! cell by the extractor.
//!
//! Rows are written through gog as one `|`-separated argument, so text cells
//! are escaped on the way out (`\` → `\\`, line break → `\n`, `|` → `\p`)
//! and unescaped whenever a row is read back. JSON cells are compact and only
//! need their `|` written as the JSON escape `\u007c`.

use serde_json::Value;

use crate::models::candidate::{CandidatePatch, CandidateRecord, CandidateStatus, TextField};

pub const COLUMN_COUNT: usize = 24;
pub const LAST_COLUMN: char = 'X';

const COL_CONTACT: usize = 1;
const COL_WORK_HISTORY: usize = 12;
const COL_EDUCATION_DETAILS: usize = 15;
const COL_STATUS: usize = 17;
const COL_NOTES: usize = 19;
const COL_PROGRESS: usize = 22;
const COL_RECORD_ID: usize = 23;

const JSON_COLUMNS: [usize; 3] = [COL_WORK_HISTORY, COL_EDUCATION_DETAILS, COL_PROGRESS];

/// Scalar columns that map one-to-one onto a relational text field.
const SCALAR_COLUMNS: [(usize, TextField); 19] = [
    (0, TextField::Name),
    (1, TextField::Email),
    (2, TextField::Phone),
    (3, TextField::Location),
    (4, TextField::CurrentPosition),
    (5, TextField::YearsExperience),
    (6, TextField::JobChanges),
    (7, TextField::AvgTenureMonths),
    (8, TextField::RecentGapMonths),
    (9, TextField::Skills),
    (10, TextField::Education),
    (11, TextField::Source),
    (13, TextField::LeavingReason),
    (14, TextField::StabilityScore),
    (16, TextField::Personality),
    (COL_STATUS, TextField::Status),
    (18, TextField::Consultant),
    (20, TextField::ResumeLink),
    (21, TextField::LinkedinUrl),
];

/// One data row of the mirror. `row_number` is 1-based; row 1 is the header.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetRow {
    pub row_number: usize,
    pub cells: Vec<String>,
}

impl SheetRow {
    /// `cells` as stored in the sheet; text cells are unescaped here.
    pub fn new(row_number: usize, cells: Vec<String>) -> Self {
        let cells = cells
            .into_iter()
            .enumerate()
            .map(|(index, cell)| {
                if JSON_COLUMNS.contains(&index) {
                    cell
                } else {
                    unescape_cell(&cell)
                }
            })
            .collect();
        Self { row_number, cells }
    }

    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(|c| c.trim()).unwrap_or("")
    }

    pub fn name(&self) -> &str {
        self.cell(0)
    }

    pub fn contact(&self) -> &str {
        self.cell(COL_CONTACT)
    }

    pub fn notes(&self) -> &str {
        self.cell(COL_NOTES)
    }

    /// Relational id written into the hidden column, if the row has one.
    pub fn record_id(&self) -> Option<i32> {
        self.cell(COL_RECORD_ID).parse().ok()
    }

    /// Converts the row into an import payload. Progress tracking and the id
    /// column are relational-owned and not read back.
    pub fn to_patch(&self) -> CandidatePatch {
        let mut patch = CandidatePatch::default();
        for (index, field) in SCALAR_COLUMNS {
            let value = self.cell(index);
            if !value.is_empty() {
                patch.set_text(field, Some(value.to_string()));
            }
        }
        let notes = self.notes();
        if !notes.is_empty() {
            patch.notes = Some(notes.to_string());
        }
        patch.work_history = json_cell(self.cell(COL_WORK_HISTORY));
        patch.education_details = json_cell(self.cell(COL_EDUCATION_DETAILS));
        patch
    }
}

/// Renders a record as the full A..X cell vector.
pub fn record_cells(record: &CandidateRecord) -> Vec<String> {
    let mut cells = vec![String::new(); COLUMN_COUNT];
    for (index, field) in SCALAR_COLUMNS {
        cells[index] = record.text(field).unwrap_or_default().to_string();
    }
    cells[COL_STATUS] = CandidateStatus::from_cell(&record.status).label().to_string();
    cells[COL_WORK_HISTORY] = json_text(record.work_history.as_ref());
    cells[COL_EDUCATION_DETAILS] = json_text(record.education_details.as_ref());
    cells[COL_NOTES] = record.notes.clone().unwrap_or_default();
    cells[COL_PROGRESS] = if record.progress_tracking.0.is_empty() {
        String::new()
    } else {
        serde_json::to_string(&record.progress_tracking.0).unwrap_or_default()
    };
    cells[COL_RECORD_ID] = record.id.to_string();
    cells
}

/// The text gog should store for cell `index`.
pub fn encode_cell(index: usize, cell: &str) -> String {
    if JSON_COLUMNS.contains(&index) {
        return cell.replace(['\r', '\n'], "").replace('|', "\\u007c");
    }
    let mut out = String::with_capacity(cell.len());
    for c in cell.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '|' => out.push_str("\\p"),
            '\r' => {}
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`encode_cell`] for text cells. Unknown escapes are kept as typed.
pub fn unescape_cell(cell: &str) -> String {
    if !cell.contains('\\') {
        return cell.to_string();
    }
    let mut out = String::with_capacity(cell.len());
    let mut chars = cell.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => out.push('\n'),
            Some('p') => out.push('|'),
            Some('\\') => out.push('\\'),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}

fn json_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => v.to_string(),
    }
}

/// Cells holding JSON are parsed; anything else non-empty is kept as a string.
fn json_cell(raw: &str) -> Option<Value> {
    if raw.is_empty() {
        return None;
    }
    Some(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use sqlx::types::Json;

    use crate::models::candidate::ProgressEvent;

    fn row(cells: &[(usize, &str)]) -> SheetRow {
        let mut values = vec![String::new(); COLUMN_COUNT];
        for (i, v) in cells {
            values[*i] = v.to_string();
        }
        SheetRow::new(2, values)
    }

    #[test]
    fn test_to_patch_maps_columns() {
        let patch = row(&[
            (0, " Carol "),
            (1, "carol@example.com"),
            (5, "7"),
            (12, r#"[{"company":"Acme"}]"#),
            (15, "NTU CS"),
            (17, "已面試"),
            (19, "strong backend"),
            (23, "42"),
        ])
        .to_patch();
        assert_eq!(patch.name.as_deref(), Some("Carol"));
        assert_eq!(patch.email.as_deref(), Some("carol@example.com"));
        assert_eq!(patch.years_experience.as_deref(), Some("7"));
        assert_eq!(patch.work_history, Some(json!([{"company": "Acme"}])));
        assert_eq!(patch.education_details, Some(json!("NTU CS")));
        assert_eq!(patch.status.as_deref(), Some("已面試"));
        assert_eq!(patch.notes.as_deref(), Some("strong backend"));
        assert_eq!(patch.phone, None);
    }

    #[test]
    fn test_text_cells_survive_encoding() {
        for text in ["first\nsecond", "a|b", r"C:\tools\new", "plain", "tail\\"] {
            let encoded = encode_cell(COL_NOTES, text);
            assert!(!encoded.contains(['\n', '|']), "{encoded:?}");
            assert_eq!(unescape_cell(&encoded), text);
        }
        assert_eq!(encode_cell(COL_NOTES, "x\r\ny"), "x\\ny");
    }

    #[test]
    fn test_json_cells_escape_separator_only() {
        let encoded = encode_cell(COL_WORK_HISTORY, r#"[{"note":"a|b\nc"}]"#);
        assert_eq!(encoded, r#"[{"note":"a\u007cb\nc"}]"#);
        let row = row(&[(COL_WORK_HISTORY, encoded.as_str()), (COL_NOTES, r"line one\nline two")]);
        assert_eq!(row.to_patch().work_history, Some(json!([{"note": "a|b\nc"}])));
        assert_eq!(row.notes(), "line one\nline two");
    }

    #[test]
    fn test_record_id_column() {
        assert_eq!(row(&[(23, "42")]).record_id(), Some(42));
        assert_eq!(row(&[(23, "")]).record_id(), None);
        assert_eq!(SheetRow::new(3, vec!["Dan".to_string()]).record_id(), None);
    }

    #[test]
    fn test_record_cells_layout() {
        let now = Utc::now();
        let record = CandidateRecord {
            id: 7,
            name: "Dan".to_string(),
            email: None,
            phone: Some("0912".to_string()),
            location: None,
            current_position: None,
            years_experience: None,
            job_changes: None,
            avg_tenure_months: None,
            recent_gap_months: None,
            skills: None,
            education: None,
            source: None,
            work_history: Some(json!([])),
            leaving_reason: None,
            stability_score: None,
            education_details: None,
            personality: None,
            status: "offer".to_string(),
            consultant: None,
            notes: Some("n".to_string()),
            resume_link: None,
            linkedin_url: None,
            github_url: Some("https://github.com/dan".to_string()),
            progress_tracking: Json(vec![ProgressEvent::today("offer", "Jacky", None)]),
            ai_match_result: None,
            created_at: now,
            updated_at: now,
        };
        let cells = record_cells(&record);
        assert_eq!(cells.len(), COLUMN_COUNT);
        assert_eq!(cells[0], "Dan");
        assert_eq!(cells[2], "0912");
        assert_eq!(cells[12], "[]");
        assert_eq!(cells[COL_STATUS], "Offer");
        assert_eq!(cells[COL_NOTES], "n");
        assert!(cells[COL_PROGRESS].contains("\"by\":\"Jacky\""));
        assert_eq!(cells[COL_RECORD_ID], "7");
    }
}
