//! Sheets↔SQL reconciliation.
//!
//! Direction A pushes one relational record into the mirror (update the row in
//! place, else append). Direction B walks the CSV export and folds every row
//! into the relational store through the merge policy.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::candidates::extract::extract_profile_links;
use crate::candidates::merge::merge;
use crate::candidates::store::{record_log, CandidateStore};
use crate::errors::AppError;
use crate::models::audit::{LogAction, NewLogEntry};
use crate::models::candidate::{normalize_name, CandidatePatch, CandidateRecord, CandidateStatus};
use crate::sheets::client::MirrorStore;
use crate::sheets::csv::parse_csv;
use crate::sheets::row::{record_cells, SheetRow};
use crate::sheets::SheetsError;

// ────────────────────────────────────────────────────────────────────────────
// Direction A: relational → mirror
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAction {
    Updated { row_number: usize },
    Appended,
}

/// Finds the mirror row for `record`: hidden id column first, then the
/// normalized name on rows that carry no id yet.
pub fn locate_row(rows: &[SheetRow], record: &CandidateRecord) -> Option<usize> {
    if let Some(row) = rows.iter().find(|r| r.record_id() == Some(record.id)) {
        return Some(row.row_number);
    }
    let name = record.normalized_name();
    rows.iter()
        .find(|r| r.record_id().is_none() && normalize_name(r.name()) == name)
        .map(|r| r.row_number)
}

pub async fn push_record(
    mirror: &dyn MirrorStore,
    record: &CandidateRecord,
) -> Result<PushAction, SheetsError> {
    let rows = mirror.read_rows().await?;
    let cells = record_cells(record);
    match locate_row(&rows, record) {
        Some(row_number) => {
            mirror.update_row(row_number, &cells).await?;
            Ok(PushAction::Updated { row_number })
        }
        None => {
            mirror.append_row(&cells).await?;
            Ok(PushAction::Appended)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Direction B: mirror → relational
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct RowError {
    pub row: usize,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileSummary {
    pub total_rows: usize,
    pub updated: usize,
    pub created: usize,
    pub skipped: usize,
    pub error_count: usize,
    pub errors: Vec<RowError>,
    /// Records inserted by this pass; they still need their id written back.
    #[serde(skip)]
    pub created_ids: Vec<i32>,
}

enum RowOutcome {
    Updated,
    Created(i32),
    Skipped,
}

/// Folds the mirror's CSV export into the relational store.
///
/// Rows are processed in order. A name inserted earlier in the same pass makes
/// later rows with that name skip, so duplicate rows collapse to one record.
pub async fn pull_from_mirror(
    store: &dyn CandidateStore,
    mirror: &dyn MirrorStore,
    actor: &str,
) -> Result<ReconcileSummary, AppError> {
    let csv = mirror.export_csv().await?;
    let mut rows = parse_csv(&csv).into_iter();
    // First row is the header
    rows.next();

    let mut index = store.name_index().await?;
    let mut inserted: HashSet<String> = HashSet::new();
    let mut summary = ReconcileSummary::default();

    for (offset, cells) in rows.enumerate() {
        let row = SheetRow::new(offset + 2, cells);
        summary.total_rows += 1;

        let normalized = normalize_name(row.name());
        if normalized.is_empty() || inserted.contains(&normalized) {
            summary.skipped += 1;
            continue;
        }

        match reconcile_row(store, &row, &normalized, &mut index).await {
            Ok(RowOutcome::Updated) => summary.updated += 1,
            Ok(RowOutcome::Created(id)) => {
                summary.created += 1;
                summary.created_ids.push(id);
                inserted.insert(normalized);
            }
            Ok(RowOutcome::Skipped) => summary.skipped += 1,
            Err(e) => {
                warn!("Sheet row {} ({}) failed: {e}", row.row_number, row.name());
                summary.error_count += 1;
                summary.errors.push(RowError {
                    row: row.row_number,
                    name: row.name().to_string(),
                    error: e.reason(),
                });
            }
        }
    }

    info!(
        "Sheets→SQL reconcile: {} rows, {} updated, {} created, {} skipped, {} errors",
        summary.total_rows, summary.updated, summary.created, summary.skipped, summary.error_count
    );
    record_log(
        store,
        NewLogEntry::new(
            actor,
            LogAction::SheetsReconcile,
            json!({
                "total_rows": summary.total_rows,
                "updated": summary.updated,
                "created": summary.created,
                "skipped": summary.skipped,
                "error_count": summary.error_count,
            }),
        ),
    )
    .await;

    Ok(summary)
}

async fn reconcile_row(
    store: &dyn CandidateStore,
    row: &SheetRow,
    normalized: &str,
    index: &mut HashMap<String, i32>,
) -> Result<RowOutcome, AppError> {
    let patch = row_patch(row);

    let existing = match row.record_id() {
        Some(id) => store.get(id).await?,
        None => None,
    };
    let existing = match existing {
        Some(record) => Some(record),
        None => match index.get(normalized) {
            Some(id) => store.get(*id).await?,
            None => None,
        },
    };

    if let Some(existing) = existing {
        let update = merge(&existing, &patch);
        if update.is_empty() {
            return Ok(RowOutcome::Skipped);
        }
        store
            .apply_update(existing.id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Candidate {} not found", existing.id)))?;
        return Ok(RowOutcome::Updated);
    }

    let mut patch = patch;
    patch
        .status
        .get_or_insert_with(|| CandidateStatus::NotStarted.as_str().to_string());
    let record = store.insert(&patch).await?;
    index.insert(normalized.to_string(), record.id);
    Ok(RowOutcome::Created(record.id))
}

/// Row → canonical, schema-fitting payload with profile links filled from the
/// contact and notes cells when their own columns are empty.
fn row_patch(row: &SheetRow) -> CandidatePatch {
    let mut patch = row.to_patch();
    let links = extract_profile_links(row.contact(), row.notes());
    if patch.linkedin_url.is_none() {
        patch.linkedin_url = links.linkedin;
    }
    if patch.github_url.is_none() {
        patch.github_url = links.github;
    }
    patch.canonicalize().fit_to_schema()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::memory::MemoryCandidateStore;
    use crate::sheets::memory::MemoryMirror;
    use crate::sheets::row::COLUMN_COUNT;

    const HEADER: &str = "姓名,Email,電話,地點,職位,年資,轉職,平均任期,空窗,技能,學歷,來源,工作經歷,離職原因,穩定度,教育,DISC,狀態,顧問,備註,履歷,LinkedIn,進度,ID\n";

    fn seeded(name: &str) -> CandidatePatch {
        CandidatePatch {
            name: Some(name.to_string()),
            status: Some("contacted".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_duplicate_rows_collapse_to_one_record() {
        let store = MemoryCandidateStore::new();
        let mirror = MemoryMirror::new().with_csv(&format!("{HEADER}Carol,c1@x.com\nCarol,c2@x.com\n"));

        let summary = pull_from_mirror(&store, &mirror, "tester").await.unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.error_count, 0);
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].email.as_deref(), Some("c1@x.com"));
        assert_eq!(records[0].status, "not_started");
        assert_eq!(summary.created_ids, vec![records[0].id]);
    }

    #[tokio::test]
    async fn test_long_phone_truncated_without_error() {
        let store = MemoryCandidateStore::new();
        let mirror = MemoryMirror::new()
            .with_csv(&format!("{HEADER}Dave,,+886-912-345-678 ext. 12345\n"));

        let summary = pull_from_mirror(&store, &mirror, "tester").await.unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(summary.error_count, 0);
        let phone = store.records()[0].phone.clone().unwrap();
        assert_eq!(phone.chars().count(), 20);
    }

    #[tokio::test]
    async fn test_existing_record_is_merged_not_clobbered() {
        let store = MemoryCandidateStore::new();
        let mut seed = seeded("Erin");
        seed.email = Some("erin@old.com".to_string());
        seed.notes = Some("met in March".to_string());
        store.seed(seed);
        let mirror = MemoryMirror::new().with_csv(&format!(
            "{HEADER}\" erin \",erin@new.com,0911,Taipei,,,,,,,,,,,,,,婉拒,,\"ref from Bob, LinkedIn: https://lnkd.in/erin\"\n"
        ));

        let summary = pull_from_mirror(&store, &mirror, "tester").await.unwrap();

        assert_eq!(summary.updated, 1);
        let record = &store.records()[0];
        assert_eq!(record.email.as_deref(), Some("erin@old.com"));
        assert_eq!(record.phone.as_deref(), Some("0911"));
        assert_eq!(record.status, "contacted");
        assert_eq!(record.linkedin_url.as_deref(), Some("https://lnkd.in/erin"));
        assert_eq!(
            record.notes.as_deref(),
            Some("met in March\nref from Bob, LinkedIn: https://lnkd.in/erin")
        );
    }

    #[tokio::test]
    async fn test_second_pass_is_all_skipped() {
        let store = MemoryCandidateStore::new();
        let csv = format!("{HEADER}Frank,f@x.com,,,,,,,,,,,,,,,,,,notes here\n,,orphan row\n");
        let mirror = MemoryMirror::new().with_csv(&csv);

        let first = pull_from_mirror(&store, &mirror, "tester").await.unwrap();
        let second = pull_from_mirror(&store, &mirror, "tester").await.unwrap();

        assert_eq!(first.created, 1);
        assert_eq!(first.skipped, 1);
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.records().len(), 1);
        assert_eq!(store.logs().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_export_is_external_error() {
        let store = MemoryCandidateStore::new();
        let mirror = MemoryMirror::unavailable();
        let err = pull_from_mirror(&store, &mirror, "tester").await.unwrap_err();
        assert!(matches!(err, AppError::External(_)));
    }

    #[tokio::test]
    async fn test_push_updates_by_id_then_name_else_appends() {
        let store = MemoryCandidateStore::new();
        let grace = store.seed(seeded("Grace"));
        let heidi = store.seed(seeded("Heidi"));
        let ivan = store.seed(seeded("Ivan"));

        let mut by_id = vec![String::new(); COLUMN_COUNT];
        by_id[0] = "Grace (renamed)".to_string();
        by_id[23] = grace.id.to_string();
        let mut by_name = vec![String::new(); COLUMN_COUNT];
        by_name[0] = " heidi ".to_string();
        let mirror = MemoryMirror::new().with_rows(vec![by_id, by_name]);

        assert_eq!(
            push_record(&mirror, &grace).await.unwrap(),
            PushAction::Updated { row_number: 2 }
        );
        assert_eq!(
            push_record(&mirror, &heidi).await.unwrap(),
            PushAction::Updated { row_number: 3 }
        );
        assert_eq!(push_record(&mirror, &ivan).await.unwrap(), PushAction::Appended);

        let rows = mirror.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "Grace");
        assert_eq!(rows[1][23], heidi.id.to_string());
        assert_eq!(rows[2][17], "已聯繫");
    }

    #[tokio::test]
    async fn test_push_then_pull_keeps_multiline_notes() {
        let store = MemoryCandidateStore::new();
        let record = store.seed(CandidatePatch {
            name: Some("Kate".to_string()),
            email: Some("kate@x.com".to_string()),
            notes: Some("first\nsecond".to_string()),
            ..Default::default()
        });
        let mirror = MemoryMirror::new();
        assert_eq!(push_record(&mirror, &record).await.unwrap(), PushAction::Appended);

        for _ in 0..2 {
            let summary = pull_from_mirror(&store, &mirror, "tester").await.unwrap();
            assert_eq!(summary.updated, 0);
            assert_eq!(summary.skipped, 1);
            let stored = store.get(record.id).await.unwrap().unwrap();
            assert_eq!(stored.notes.as_deref(), Some("first\nsecond"));
            assert_eq!(
                push_record(&mirror, &stored).await.unwrap(),
                PushAction::Updated { row_number: 2 }
            );
        }
    }

    #[tokio::test]
    async fn test_sheet_edit_merges_once_then_settles() {
        let store = MemoryCandidateStore::new();
        let record = store.seed(CandidatePatch {
            name: Some("Leo".to_string()),
            notes: Some("met at meetup\nprefers remote".to_string()),
            ..Default::default()
        });
        let mirror = MemoryMirror::new();
        push_record(&mirror, &record).await.unwrap();

        // A consultant fills the phone cell by hand
        let mut edited = record.clone();
        edited.phone = Some("0911-222-333".to_string());
        mirror.update_row(2, &record_cells(&edited)).await.unwrap();

        let first = pull_from_mirror(&store, &mirror, "tester").await.unwrap();
        assert_eq!(first.updated, 1);
        let merged = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(merged.phone.as_deref(), Some("0911-222-333"));
        assert_eq!(merged.notes.as_deref(), Some("met at meetup\nprefers remote"));

        push_record(&mirror, &merged).await.unwrap();
        let second = pull_from_mirror(&store, &mirror, "tester").await.unwrap();
        assert_eq!(second.updated, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(store.records().len(), 1);
    }

    #[tokio::test]
    async fn test_summary_survives_failed_log_write() {
        let store = MemoryCandidateStore::new().with_failing_logs();
        let mirror = MemoryMirror::new().with_csv(&format!("{HEADER}Mia,m@x.com\n"));

        let summary = pull_from_mirror(&store, &mirror, "tester").await.unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(store.records().len(), 1);
        assert!(store.logs().is_empty());
    }
}
