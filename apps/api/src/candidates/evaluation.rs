//! AI match results.
//!
//! Scorers should attach results through [`store_ai_match`]. Older scoring runs
//! only left free text in `notes` (`總分 82/100`, `技能匹配 (40%): 32/40`, …);
//! [`parse_evaluation_notes`] recovers a structured result from that text so
//! the backfill can fill `ai_match_result` after the fact.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::candidates::merge::{is_blank, CandidateUpdate};
use crate::candidates::store::{record_log, CandidateStore};
use crate::errors::AppError;
use crate::models::audit::{LogAction, NewLogEntry};
use crate::models::candidate::{AiMatchResult, CandidateRecord, TextField};

pub const DEFAULT_EVALUATOR: &str = "AIbot";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEvaluation {
    pub result: AiMatchResult,
    pub linkedin_url: Option<String>,
}

fn static_regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex"))
}

fn score_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(\d+)/100")
}

fn job_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"職位[：:]\s*(.+)")
}

fn skills_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"技能[：:]\s*(.+)")
}

fn dimension_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"([^\n:：]{2,8})\s*\(\d+%\)[：:]\s*(\d+)/(\d+)")
}

fn linkedin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    static_regex(&RE, r"(?i)LinkedIn[：:\s]+(https?://\S+)")
}

pub fn recommendation_for(score: u32) -> &'static str {
    if score >= 85 {
        "強力推薦"
    } else if score >= 70 {
        "推薦"
    } else if score >= 55 {
        "觀望"
    } else {
        "不推薦"
    }
}

/// Parses scoring notes. Returns `None` when the text carries no `NN/100` score.
pub fn parse_evaluation_notes(notes: &str, actor: &str) -> Option<ParsedEvaluation> {
    let score: u32 = score_re().captures(notes)?.get(1)?.as_str().parse().ok()?;

    let job_title = job_title_re()
        .captures(notes)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string());

    let skills: Vec<String> = skills_re()
        .captures(notes)
        .and_then(|c| c.get(1))
        .map(|m| {
            m.as_str()
                .split([',', '，', '、'])
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Dimension name → achieved ratio, in order of appearance
    let mut dimensions: Vec<(String, f64)> = Vec::new();
    for caps in dimension_re().captures_iter(notes) {
        let (Ok(got), Ok(max)) = (caps[2].parse::<f64>(), caps[3].parse::<f64>()) else {
            continue;
        };
        if max == 0.0 {
            continue;
        }
        let name = caps[1].trim().to_string();
        match dimensions.iter_mut().find(|(d, _)| *d == name) {
            Some(slot) => slot.1 = got / max,
            None => dimensions.push((name, got / max)),
        }
    }
    let ratio = |name: &str| dimensions.iter().find(|(d, _)| d == name).map(|(_, r)| *r);

    let skill_ratio = ratio("技能匹配").or_else(|| ratio("技能")).unwrap_or(0.7);
    let matched_count =
        ((skills.len() as f64) * (skill_ratio + 0.1).min(1.0)).ceil() as usize;
    let matched_count = matched_count.min(skills.len());
    let matched_skills = skills[..matched_count].to_vec();
    let missing_skills = skills[matched_count..].to_vec();

    let mut strengths: Vec<String> = dimensions
        .iter()
        .filter(|(_, r)| *r >= 0.8)
        .map(|(d, r)| format!("{d}符合度高（{}%）", (r * 100.0).round()))
        .collect();
    if strengths.is_empty() && score >= 70 {
        strengths.push("整體評分良好，具備基本條件".to_string());
    }

    let mut probing_questions = Vec::new();
    if ratio("技能匹配").unwrap_or(1.0) < 0.8 {
        probing_questions.push("目前主力技術棧為何？是否有補足相關技能的計劃？".to_string());
    }
    probing_questions.push("期望薪資與可到職時間？".to_string());
    probing_questions.push("離開現職的主要考量為何？".to_string());
    probing_questions.push("是否同時面試其他機會？".to_string());

    let linkedin_url = linkedin_re()
        .captures(notes)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());

    Some(ParsedEvaluation {
        result: AiMatchResult {
            score,
            recommendation: recommendation_for(score).to_string(),
            job_title,
            matched_skills,
            missing_skills,
            strengths,
            probing_questions,
            conclusion: notes.trim().to_string(),
            evaluated_at: Utc::now(),
            evaluated_by: actor.to_string(),
        },
        linkedin_url,
    })
}

/// Attaches a structured result, replacing any earlier one.
pub async fn store_ai_match(
    store: &dyn CandidateStore,
    id: i32,
    result: AiMatchResult,
    actor: &str,
) -> Result<CandidateRecord, AppError> {
    if result.score > 100 {
        return Err(AppError::Validation(format!(
            "score must be between 0 and 100, got {}",
            result.score
        )));
    }
    let update = CandidateUpdate {
        ai_match_result: Some(serde_json::to_value(&result).map_err(anyhow::Error::from)?),
        ..Default::default()
    };
    let record = store
        .apply_update(id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {id} not found")))?;

    record_log(
        store,
        NewLogEntry::new(
            actor,
            LogAction::AiMatch,
            json!({ "score": result.score, "recommendation": result.recommendation }),
        )
        .for_candidate(record.id, record.name.clone()),
    )
    .await;
    Ok(record)
}

#[derive(Debug, Clone, Serialize)]
pub struct BackfillFailure {
    pub id: i32,
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub filled: usize,
    pub failed: Vec<BackfillFailure>,
}

/// Fills `ai_match_result` (and an empty `linkedin_url`) for every record whose
/// notes carry a score but that has no structured result yet.
pub async fn backfill_from_notes(
    store: &dyn CandidateStore,
    actor: &str,
) -> Result<BackfillReport, AppError> {
    let records = store.with_unparsed_scores().await?;
    let mut report = BackfillReport {
        scanned: records.len(),
        ..Default::default()
    };

    for record in records {
        match backfill_one(store, &record, actor).await {
            Ok(()) => report.filled += 1,
            Err(e) => {
                warn!("Backfill of candidate {} failed: {e}", record.id);
                report.failed.push(BackfillFailure {
                    id: record.id,
                    name: record.name.clone(),
                    reason: e.reason(),
                });
            }
        }
    }

    info!(
        "AI match backfill: {}/{} filled",
        report.filled, report.scanned
    );
    record_log(
        store,
        NewLogEntry::new(
            actor,
            LogAction::AiMatch,
            json!({ "backfill": true, "scanned": report.scanned, "filled": report.filled }),
        ),
    )
    .await;
    Ok(report)
}

async fn backfill_one(
    store: &dyn CandidateStore,
    record: &CandidateRecord,
    actor: &str,
) -> Result<(), AppError> {
    let parsed = record
        .notes
        .as_deref()
        .and_then(|notes| parse_evaluation_notes(notes, actor))
        .ok_or_else(|| AppError::Validation("notes carry no score".to_string()))?;

    let mut update = CandidateUpdate {
        ai_match_result: Some(serde_json::to_value(&parsed.result).map_err(anyhow::Error::from)?),
        ..Default::default()
    };
    if let Some(url) = parsed.linkedin_url {
        if is_blank(TextField::LinkedinUrl, record.linkedin_url.as_deref()) {
            update.texts.push((TextField::LinkedinUrl, url));
        }
    }
    store
        .apply_update(record.id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Candidate {} not found", record.id)))?;
    Ok(())
}
