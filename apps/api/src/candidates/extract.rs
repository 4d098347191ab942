//! Finds LinkedIn/GitHub profile URLs embedded in free text.
//!
//! The extractor only reports what it finds. Callers decide whether a field is
//! empty enough to be filled.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileLinks {
    pub linkedin: Option<String>,
    pub github: Option<String>,
}

fn linkedin_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:https?://)?(?:www\.)?linkedin\.com/in/[^\s"'<>]+"#)
            .expect("static regex")
    })
}

fn linkedin_labeled() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)linkedin\s*[:：]\s*(https?://[^\s"'<>]+)"#).expect("static regex")
    })
}

fn github_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)(?:https?://)?(?:www\.)?github\.com/[A-Za-z0-9][A-Za-z0-9-]*"#)
            .expect("static regex")
    })
}

fn github_labeled() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)github\s*[:：]\s*(https?://[^\s"'<>]+)"#).expect("static regex")
    })
}

/// Searches `contact_field` and `notes_field` for profile links.
///
/// LinkedIn: bare URL in contact, bare URL in notes, `LinkedIn: <url>` in notes.
/// GitHub: bare URL in notes, `GitHub: <url>` in notes. First hit wins.
pub fn extract_profile_links(contact_field: &str, notes_field: &str) -> ProfileLinks {
    let linkedin = find_bare(linkedin_url(), contact_field)
        .or_else(|| find_bare(linkedin_url(), notes_field))
        .or_else(|| find_labeled(linkedin_labeled(), notes_field));
    let github = find_bare(github_url(), notes_field)
        .or_else(|| find_labeled(github_labeled(), notes_field));
    ProfileLinks { linkedin, github }
}

fn find_bare(re: &Regex, text: &str) -> Option<String> {
    re.find(text).map(|m| clean_url(m.as_str())).filter(|u| !u.is_empty())
}

fn find_labeled(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| clean_url(m.as_str()))
        .filter(|u| !u.is_empty())
}

fn clean_url(raw: &str) -> String {
    raw.trim_end_matches([',', ';']).to_string()
}
