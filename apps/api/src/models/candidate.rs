use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

/// Row in `candidates_pipeline`. Numeric profile fields are kept as text because
/// they arrive as spreadsheet cells; `CandidateView` range-checks them on the way out.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CandidateRecord {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub current_position: Option<String>,
    pub years_experience: Option<String>,
    pub job_changes: Option<String>,
    pub avg_tenure_months: Option<String>,
    pub recent_gap_months: Option<String>,
    pub skills: Option<String>,
    pub education: Option<String>,
    pub source: Option<String>,
    pub work_history: Option<Value>,
    pub leaving_reason: Option<String>,
    pub stability_score: Option<String>,
    pub education_details: Option<Value>,
    pub personality: Option<String>,
    pub status: String,
    pub consultant: Option<String>,
    pub notes: Option<String>,
    pub resume_link: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub progress_tracking: Json<Vec<ProgressEvent>>,
    pub ai_match_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CandidateRecord {
    pub fn text(&self, field: TextField) -> Option<&str> {
        match field {
            TextField::Name => Some(self.name.as_str()),
            TextField::Email => self.email.as_deref(),
            TextField::Phone => self.phone.as_deref(),
            TextField::Location => self.location.as_deref(),
            TextField::CurrentPosition => self.current_position.as_deref(),
            TextField::YearsExperience => self.years_experience.as_deref(),
            TextField::JobChanges => self.job_changes.as_deref(),
            TextField::AvgTenureMonths => self.avg_tenure_months.as_deref(),
            TextField::RecentGapMonths => self.recent_gap_months.as_deref(),
            TextField::Skills => self.skills.as_deref(),
            TextField::Education => self.education.as_deref(),
            TextField::Source => self.source.as_deref(),
            TextField::LeavingReason => self.leaving_reason.as_deref(),
            TextField::StabilityScore => self.stability_score.as_deref(),
            TextField::Personality => self.personality.as_deref(),
            TextField::Status => Some(self.status.as_str()),
            TextField::Consultant => self.consultant.as_deref(),
            TextField::ResumeLink => self.resume_link.as_deref(),
            TextField::LinkedinUrl => self.linkedin_url.as_deref(),
            TextField::GithubUrl => self.github_url.as_deref(),
        }
    }

    pub fn set_text(&mut self, field: TextField, value: String) {
        match field {
            TextField::Name => self.name = value,
            TextField::Email => self.email = Some(value),
            TextField::Phone => self.phone = Some(value),
            TextField::Location => self.location = Some(value),
            TextField::CurrentPosition => self.current_position = Some(value),
            TextField::YearsExperience => self.years_experience = Some(value),
            TextField::JobChanges => self.job_changes = Some(value),
            TextField::AvgTenureMonths => self.avg_tenure_months = Some(value),
            TextField::RecentGapMonths => self.recent_gap_months = Some(value),
            TextField::Skills => self.skills = Some(value),
            TextField::Education => self.education = Some(value),
            TextField::Source => self.source = Some(value),
            TextField::LeavingReason => self.leaving_reason = Some(value),
            TextField::StabilityScore => self.stability_score = Some(value),
            TextField::Personality => self.personality = Some(value),
            TextField::Status => self.status = value,
            TextField::Consultant => self.consultant = Some(value),
            TextField::ResumeLink => self.resume_link = Some(value),
            TextField::LinkedinUrl => self.linkedin_url = Some(value),
            TextField::GithubUrl => self.github_url = Some(value),
        }
    }

    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// The de-facto natural key used to match candidates across stores.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

// ────────────────────────────────────────────────────────────────────────────
// Scalar fields
// ────────────────────────────────────────────────────────────────────────────

/// Every scalar text column of `candidates_pipeline`. Notes and the structured
/// JSON columns have their own merge rules and are not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Name,
    Email,
    Phone,
    Location,
    CurrentPosition,
    YearsExperience,
    JobChanges,
    AvgTenureMonths,
    RecentGapMonths,
    Skills,
    Education,
    Source,
    LeavingReason,
    StabilityScore,
    Personality,
    Status,
    Consultant,
    ResumeLink,
    LinkedinUrl,
    GithubUrl,
}

impl TextField {
    pub const ALL: [TextField; 20] = [
        TextField::Name,
        TextField::Email,
        TextField::Phone,
        TextField::Location,
        TextField::CurrentPosition,
        TextField::YearsExperience,
        TextField::JobChanges,
        TextField::AvgTenureMonths,
        TextField::RecentGapMonths,
        TextField::Skills,
        TextField::Education,
        TextField::Source,
        TextField::LeavingReason,
        TextField::StabilityScore,
        TextField::Personality,
        TextField::Status,
        TextField::Consultant,
        TextField::ResumeLink,
        TextField::LinkedinUrl,
        TextField::GithubUrl,
    ];

    pub fn column(self) -> &'static str {
        match self {
            TextField::Name => "name",
            TextField::Email => "email",
            TextField::Phone => "phone",
            TextField::Location => "location",
            TextField::CurrentPosition => "current_position",
            TextField::YearsExperience => "years_experience",
            TextField::JobChanges => "job_changes",
            TextField::AvgTenureMonths => "avg_tenure_months",
            TextField::RecentGapMonths => "recent_gap_months",
            TextField::Skills => "skills",
            TextField::Education => "education",
            TextField::Source => "source",
            TextField::LeavingReason => "leaving_reason",
            TextField::StabilityScore => "stability_score",
            TextField::Personality => "personality",
            TextField::Status => "status",
            TextField::Consultant => "consultant",
            TextField::ResumeLink => "resume_link",
            TextField::LinkedinUrl => "linkedin_url",
            TextField::GithubUrl => "github_url",
        }
    }

    /// VARCHAR width of the column in `candidates_pipeline`, `None` for TEXT.
    pub fn max_width(self) -> Option<usize> {
        match self {
            TextField::Name
            | TextField::Email
            | TextField::CurrentPosition
            | TextField::Education
            | TextField::Personality => Some(255),
            TextField::Phone => Some(20),
            TextField::Location | TextField::Source | TextField::Consultant => Some(100),
            TextField::YearsExperience
            | TextField::JobChanges
            | TextField::AvgTenureMonths
            | TextField::RecentGapMonths
            | TextField::StabilityScore => Some(16),
            TextField::Skills | TextField::ResumeLink => Some(1000),
            TextField::Status => Some(50),
            TextField::LinkedinUrl | TextField::GithubUrl => Some(500),
            TextField::LeavingReason => None,
        }
    }

    /// Inclusive sane range for fields that hold numbers as text.
    pub fn numeric_range(self) -> Option<(u32, u32)> {
        match self {
            TextField::YearsExperience => Some((0, 60)),
            TextField::JobChanges => Some((0, 50)),
            TextField::AvgTenureMonths | TextField::RecentGapMonths => Some((0, 600)),
            TextField::StabilityScore => Some((0, 100)),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        self.numeric_range().is_some()
    }
}

/// Parses a numeric text field, returning 0 for anything non-numeric or outside
/// the field's range.
pub fn coerce_numeric(field: TextField, raw: Option<&str>) -> u32 {
    let Some((min, max)) = field.numeric_range() else {
        return 0;
    };
    raw.map(str::trim)
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= min as f64 && *v <= max as f64)
        .map(|v| v.round() as u32)
        .unwrap_or(0)
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    #[default]
    NotStarted,
    Contacted,
    Interviewed,
    Offer,
    Onboarded,
    Rejected,
    Other,
}

impl CandidateStatus {
    pub const ALL: [CandidateStatus; 7] = [
        CandidateStatus::NotStarted,
        CandidateStatus::Contacted,
        CandidateStatus::Interviewed,
        CandidateStatus::Offer,
        CandidateStatus::Onboarded,
        CandidateStatus::Rejected,
        CandidateStatus::Other,
    ];

    /// Key stored in the relational store and used by the API.
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateStatus::NotStarted => "not_started",
            CandidateStatus::Contacted => "contacted",
            CandidateStatus::Interviewed => "interviewed",
            CandidateStatus::Offer => "offer",
            CandidateStatus::Onboarded => "onboarded",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Other => "other",
        }
    }

    /// Label consultants see and edit in the spreadsheet.
    pub fn label(self) -> &'static str {
        match self {
            CandidateStatus::NotStarted => "未開始",
            CandidateStatus::Contacted => "已聯繫",
            CandidateStatus::Interviewed => "已面試",
            CandidateStatus::Offer => "Offer",
            CandidateStatus::Onboarded => "已上職",
            CandidateStatus::Rejected => "婉拒",
            CandidateStatus::Other => "其他",
        }
    }

    /// Strict parse: accepts the key, the label, or a legacy label.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(status) = Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(input) || s.label() == input)
        {
            return Some(status);
        }
        match input {
            "新進" | "待聯繫" => Some(CandidateStatus::NotStarted),
            _ => None,
        }
    }

    /// Lenient parse for free-form cells: blank is the initial state, unknown is `Other`.
    pub fn from_cell(input: &str) -> Self {
        if input.trim().is_empty() {
            return CandidateStatus::NotStarted;
        }
        Self::parse(input).unwrap_or(CandidateStatus::Other)
    }
}

/// One entry of the append-only `progress_tracking` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub date: String, // YYYY-MM-DD
    pub event: String,
    pub by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ProgressEvent {
    pub fn today(event: impl Into<String>, by: impl Into<String>, note: Option<String>) -> Self {
        Self {
            date: Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            event: event.into(),
            by: by.into(),
            note,
        }
    }
}

/// Structured evaluation attached by automated scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMatchResult {
    pub score: u32,
    pub recommendation: String,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub matched_skills: Vec<String>,
    #[serde(default)]
    pub missing_skills: Vec<String>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub probing_questions: Vec<String>,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default = "Utc::now")]
    pub evaluated_at: DateTime<Utc>,
    #[serde(default)]
    pub evaluated_by: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Incoming payloads
// ────────────────────────────────────────────────────────────────────────────

/// A partial candidate as it arrives from manual entry, bulk upload, the
/// scraper, or a spreadsheet row. Numbers and skill arrays are accepted and
/// folded into text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidatePatch {
    #[serde(default, deserialize_with = "text_or_number")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "contact")]
    pub email: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub location: Option<String>,
    #[serde(
        default,
        deserialize_with = "text_or_number",
        alias = "currentPosition",
        alias = "position"
    )]
    pub current_position: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "years")]
    pub years_experience: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "jobChanges")]
    pub job_changes: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "avgTenure")]
    pub avg_tenure_months: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "lastGap")]
    pub recent_gap_months: Option<String>,
    #[serde(default, deserialize_with = "skills_text")]
    pub skills: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub education: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub source: Option<String>,
    #[serde(default, alias = "workHistory")]
    pub work_history: Option<Value>,
    #[serde(default, deserialize_with = "text_or_number", alias = "quitReasons")]
    pub leaving_reason: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "stabilityScore")]
    pub stability_score: Option<String>,
    #[serde(default, alias = "educationJson")]
    pub education_details: Option<Value>,
    #[serde(default, deserialize_with = "text_or_number", alias = "discProfile")]
    pub personality: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub consultant: Option<String>,
    #[serde(default, deserialize_with = "text_or_number")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "resumeLink")]
    pub resume_link: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "linkedinUrl")]
    pub linkedin_url: Option<String>,
    #[serde(default, deserialize_with = "text_or_number", alias = "githubUrl")]
    pub github_url: Option<String>,
}

impl CandidatePatch {
    pub fn text(&self, field: TextField) -> Option<&str> {
        match field {
            TextField::Name => self.name.as_deref(),
            TextField::Email => self.email.as_deref(),
            TextField::Phone => self.phone.as_deref(),
            TextField::Location => self.location.as_deref(),
            TextField::CurrentPosition => self.current_position.as_deref(),
            TextField::YearsExperience => self.years_experience.as_deref(),
            TextField::JobChanges => self.job_changes.as_deref(),
            TextField::AvgTenureMonths => self.avg_tenure_months.as_deref(),
            TextField::RecentGapMonths => self.recent_gap_months.as_deref(),
            TextField::Skills => self.skills.as_deref(),
            TextField::Education => self.education.as_deref(),
            TextField::Source => self.source.as_deref(),
            TextField::LeavingReason => self.leaving_reason.as_deref(),
            TextField::StabilityScore => self.stability_score.as_deref(),
            TextField::Personality => self.personality.as_deref(),
            TextField::Status => self.status.as_deref(),
            TextField::Consultant => self.consultant.as_deref(),
            TextField::ResumeLink => self.resume_link.as_deref(),
            TextField::LinkedinUrl => self.linkedin_url.as_deref(),
            TextField::GithubUrl => self.github_url.as_deref(),
        }
    }

    pub fn set_text(&mut self, field: TextField, value: Option<String>) {
        let slot = match field {
            TextField::Name => &mut self.name,
            TextField::Email => &mut self.email,
            TextField::Phone => &mut self.phone,
            TextField::Location => &mut self.location,
            TextField::CurrentPosition => &mut self.current_position,
            TextField::YearsExperience => &mut self.years_experience,
            TextField::JobChanges => &mut self.job_changes,
            TextField::AvgTenureMonths => &mut self.avg_tenure_months,
            TextField::RecentGapMonths => &mut self.recent_gap_months,
            TextField::Skills => &mut self.skills,
            TextField::Education => &mut self.education,
            TextField::Source => &mut self.source,
            TextField::LeavingReason => &mut self.leaving_reason,
            TextField::StabilityScore => &mut self.stability_score,
            TextField::Personality => &mut self.personality,
            TextField::Status => &mut self.status,
            TextField::Consultant => &mut self.consultant,
            TextField::ResumeLink => &mut self.resume_link,
            TextField::LinkedinUrl => &mut self.linkedin_url,
            TextField::GithubUrl => &mut self.github_url,
        };
        *slot = value;
    }

    pub fn has_name(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Trims every scalar, drops blanks, and maps the status cell onto a key.
    pub fn canonicalize(mut self) -> Self {
        for field in TextField::ALL {
            let cleaned = self
                .text(field)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            self.set_text(field, cleaned);
        }
        if let Some(status) = self.status.take() {
            self.status = Some(CandidateStatus::from_cell(&status).as_str().to_string());
        }
        if self.notes.as_deref().is_some_and(|n| n.trim().is_empty()) {
            self.notes = None;
        }
        self
    }

    /// Truncates every bounded column to its VARCHAR width.
    pub fn fit_to_schema(mut self) -> Self {
        for field in TextField::ALL {
            let truncated = match (field.max_width(), self.text(field)) {
                (Some(width), Some(value)) if value.chars().count() > width => {
                    Some(truncate_chars(value, width))
                }
                _ => None,
            };
            if let Some(value) = truncated {
                self.set_text(field, Some(value));
            }
        }
        self
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_text))
}

fn skills_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => {
            let joined = items
                .into_iter()
                .filter_map(value_to_text)
                .collect::<Vec<_>>()
                .join(", ");
            Some(joined)
        }
        other => other.and_then(value_to_text),
    })
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Outgoing view
// ────────────────────────────────────────────────────────────────────────────

/// API representation of a candidate: numbers range-checked, skills split.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateView {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub current_position: Option<String>,
    pub years_experience: u32,
    pub job_changes: u32,
    pub avg_tenure_months: u32,
    pub recent_gap_months: u32,
    pub stability_score: u32,
    pub skills: Vec<String>,
    pub education: Option<String>,
    pub source: Option<String>,
    pub work_history: Option<Value>,
    pub leaving_reason: Option<String>,
    pub education_details: Option<Value>,
    pub personality: Option<String>,
    pub status: CandidateStatus,
    pub status_label: &'static str,
    pub consultant: Option<String>,
    pub notes: Option<String>,
    pub resume_link: Option<String>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
    pub progress_tracking: Vec<ProgressEvent>,
    pub ai_match_result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CandidateRecord> for CandidateView {
    fn from(record: &CandidateRecord) -> Self {
        let numeric = |field: TextField| coerce_numeric(field, record.text(field));
        let status = CandidateStatus::from_cell(&record.status);
        CandidateView {
            id: record.id,
            name: record.name.clone(),
            email: record.email.clone(),
            phone: record.phone.clone(),
            location: record.location.clone(),
            current_position: record.current_position.clone(),
            years_experience: numeric(TextField::YearsExperience),
            job_changes: numeric(TextField::JobChanges),
            avg_tenure_months: numeric(TextField::AvgTenureMonths),
            recent_gap_months: numeric(TextField::RecentGapMonths),
            stability_score: numeric(TextField::StabilityScore),
            skills: split_skills(record.skills.as_deref()),
            education: record.education.clone(),
            source: record.source.clone(),
            work_history: record.work_history.clone(),
            leaving_reason: record.leaving_reason.clone(),
            education_details: record.education_details.clone(),
            personality: record.personality.clone(),
            status,
            status_label: status.label(),
            consultant: record.consultant.clone(),
            notes: record.notes.clone(),
            resume_link: record.resume_link.clone(),
            linkedin_url: record.linkedin_url.clone(),
            github_url: record.github_url.clone(),
            progress_tracking: record.progress_tracking.0.clone(),
            ai_match_result: record.ai_match_result.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

fn split_skills(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split([',', '、', '，', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
