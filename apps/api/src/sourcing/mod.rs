//! Talent sourcing: shells out to the external scraper and scorer.
//!
//! Both tools live in one directory and are run with the configured Python
//! interpreter. They print progress to stdout around a single JSON document;
//! the document is cut out of the surrounding noise before parsing.

use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::SourcingConfig;
use crate::models::candidate::CandidatePatch;

pub mod handlers;

pub const SCRAPER_SCRIPT: &str = "search-plan-executor.py";
pub const SCORER_SCRIPT: &str = "candidate-scoring-system-v2.py";

const STDERR_EXCERPT: usize = 800;

#[derive(Debug, Error)]
pub enum SourcingError {
    #[error("script not found: {0}")]
    ScriptMissing(String),

    #[error("{script} timed out after {timeout:?}")]
    Timeout { script: String, timeout: Duration },

    #[error("failed to run script: {0}")]
    Io(#[from] std::io::Error),

    #[error("{script} exited with status {status:?}: {stderr}")]
    Exit {
        script: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("no JSON document in {0} output")]
    NoJson(String),

    #[error("malformed JSON from script: {0}")]
    Parse(#[from] serde_json::Error),
}

// ────────────────────────────────────────────────────────────────────────────
// Scraper I/O
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub job_title: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default = "default_industry")]
    pub industry: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_pages")]
    pub pages: u32,
}

fn default_industry() -> String {
    "科技業".to_string()
}

fn default_location() -> String {
    "Taiwan".to_string()
}

fn default_pages() -> u32 {
    2
}

/// One person as reported by the scraper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScrapedCandidate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub github_username: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub public_repos: Option<u32>,
    #[serde(default)]
    pub followers: Option<u32>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    /// `github` or `linkedin`.
    #[serde(default)]
    pub source: Option<String>,
}

impl ScrapedCandidate {
    fn is_github(&self) -> bool {
        self.source
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("github"))
    }

    /// Import payload for the gateway; `consultant` is whoever ran the search.
    pub fn into_patch(self, consultant: &str) -> CandidatePatch {
        let github = self.is_github();
        let mut notes = if github {
            format!(
                "GitHub @{}（公開 repo：{}，followers：{}）",
                self.github_username.as_deref().unwrap_or("?"),
                self.public_repos.unwrap_or(0),
                self.followers.unwrap_or(0)
            )
        } else {
            format!(
                "LinkedIn: {}（via Google 搜尋）",
                self.linkedin_url.as_deref().unwrap_or("")
            )
        };
        if let Some(bio) = self.bio.as_deref().filter(|b| !b.trim().is_empty()) {
            notes.push('\n');
            notes.push_str(bio.trim());
        }

        CandidatePatch {
            name: self.name,
            email: self.email,
            location: self.location,
            current_position: self.company,
            skills: (!self.skills.is_empty()).then(|| self.skills.join(", ")),
            source: Some(if github { "GitHub" } else { "LinkedIn" }.to_string()),
            consultant: Some(consultant.to_string()),
            notes: Some(notes),
            github_url: self.github_url,
            linkedin_url: self.linkedin_url,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScraperOutput {
    #[serde(default)]
    pub all_candidates: Vec<ScrapedCandidate>,
    #[serde(default)]
    pub rate_limit_warning: Option<String>,
    #[serde(default)]
    pub github: Option<SourceCount>,
    #[serde(default)]
    pub linkedin: Option<SourceCount>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceCount {
    #[serde(default)]
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourcingHealth {
    pub tools_dir: String,
    pub scripts_ready: bool,
    pub scraper: bool,
    pub scorer: bool,
}

/// Cuts the JSON document out of script stdout: from the first opening
/// bracket to the last matching closing one.
pub fn extract_json(stdout: &str, allow_array: bool) -> Option<&str> {
    let start = if allow_array {
        stdout.find(['{', '['])?
    } else {
        stdout.find('{')?
    };
    let close = if stdout[start..].starts_with('[') { ']' } else { '}' };
    let end = stdout.rfind(close)?;
    (end > start).then(|| &stdout[start..=end])
}

// ────────────────────────────────────────────────────────────────────────────
// Runner
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TalentSourcingClient {
    config: SourcingConfig,
}

impl TalentSourcingClient {
    pub fn new(config: SourcingConfig) -> Self {
        Self { config }
    }

    async fn script_exists(&self, script: &str) -> bool {
        tokio::fs::try_exists(self.config.dir.join(script))
            .await
            .unwrap_or(false)
    }

    async fn run_script(
        &self,
        script: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<String, SourcingError> {
        if !self.script_exists(script).await {
            return Err(SourcingError::ScriptMissing(script.to_string()));
        }

        let mut cmd = Command::new(&self.config.python_bin);
        cmd.arg(script)
            .args(args)
            .current_dir(&self.config.dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("Running {script} with {} args", args.len());
        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| SourcingError::Timeout {
                script: script.to_string(),
                timeout,
            })??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(SourcingError::Exit {
                script: script.to_string(),
                status: output.status.code(),
                stderr: stderr.chars().take(STDERR_EXCERPT).collect(),
            });
        }
        if !stderr.trim().is_empty() {
            debug!("{script} stderr: {}", stderr.chars().take(STDERR_EXCERPT).collect::<String>());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs the scraper. Pages are clamped to 1..=3.
    pub async fn search(&self, request: &SearchRequest) -> Result<ScraperOutput, SourcingError> {
        let mut args = vec![
            "--job-title".to_string(),
            request.job_title.clone(),
            "--required-skills".to_string(),
            request.required_skills.join(","),
            "--industry".to_string(),
            request.industry.clone(),
            "--location".to_string(),
            request.location.clone(),
            "--pages".to_string(),
            request.pages.clamp(1, 3).to_string(),
        ];
        if let Some(token) = &self.config.github_token {
            args.push("--github-token".to_string());
            args.push(token.clone());
        }

        let started = std::time::Instant::now();
        let stdout = self
            .run_script(SCRAPER_SCRIPT, &args, self.config.scraper_timeout)
            .await?;
        let output: ScraperOutput = match extract_json(&stdout, false) {
            Some(doc) => serde_json::from_str(doc)?,
            None => {
                warn!("Scraper printed no JSON document; treating as no results");
                ScraperOutput::default()
            }
        };
        info!(
            "Scraper found {} candidates in {:.1}s",
            output.all_candidates.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    /// Runs the scorer over `input` (written to a temp file) and returns its
    /// JSON verdict.
    pub async fn score(&self, input: &Value) -> Result<Value, SourcingError> {
        let mut file = tempfile::Builder::new()
            .prefix("scoring-input-")
            .suffix(".json")
            .tempfile()?;
        file.write_all(serde_json::to_string(input)?.as_bytes())?;
        file.flush()?;

        let args = vec![
            "--input-file".to_string(),
            file.path().display().to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        let stdout = self
            .run_script(SCORER_SCRIPT, &args, self.config.scorer_timeout)
            .await?;
        // Temp file is removed when `file` drops
        let doc = extract_json(&stdout, true)
            .ok_or_else(|| SourcingError::NoJson(SCORER_SCRIPT.to_string()))?;
        Ok(serde_json::from_str(doc)?)
    }

    pub async fn health(&self) -> SourcingHealth {
        let scraper = self.script_exists(SCRAPER_SCRIPT).await;
        let scorer = self.script_exists(SCORER_SCRIPT).await;
        SourcingHealth {
            tools_dir: self.config.dir.display().to_string(),
            scripts_ready: scraper && scorer,
            scraper,
            scorer,
        }
    }
}
