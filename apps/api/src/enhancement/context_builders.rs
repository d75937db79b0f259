//! Context Builders: pure mapping from a resume entry to the metadata sent
//! with an enhancement job.
//!
//! Work entries contribute role, industry and a derived experience level.
//! Education entries contribute degree, institution and a field of study
//! pulled out of the free-text degree. Both share the same base generation
//! parameters and add their own focus areas.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::enhancement::job::{
    EducationContext, EnhancementContext, GenerationParameters, Section, WorkContext,
};

const TEMPERATURE: f32 = 0.7;
const STYLE: &str = "professional";

const WORK_FOCUS_AREAS: &[&str] = &["keywords", "achievements", "metrics", "action_verbs"];
const EDUCATION_FOCUS_AREAS: &[&str] =
    &["academic_achievements", "coursework", "research", "skills"];

/// Checked in order; the first keyword found in the upper-cased title wins.
const TITLE_LEVELS: &[(&str, ExperienceLevel)] = &[
    ("SENIOR", ExperienceLevel::Senior),
    ("LEAD", ExperienceLevel::Senior),
    ("MANAGER", ExperienceLevel::Executive),
    ("EXECUTIVE", ExperienceLevel::Executive),
    ("DIRECTOR", ExperienceLevel::Executive),
    ("VP", ExperienceLevel::Executive),
    ("HEAD", ExperienceLevel::Executive),
    ("CHIEF", ExperienceLevel::Executive),
];

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{4}").expect("valid regex"));

// Longer keywords first so "MASTER" is not read as "MA".
static DEGREE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(BACHELOR|MASTER|DOCTORATE|PHD|BS|BA|MS|MA)\b\s*(?:(?:OF|IN)\b)?\s*(.+)")
        .expect("valid regex")
});

// ────────────────────────────────────────────────────────────────────────────
// Entry data
// ────────────────────────────────────────────────────────────────────────────

/// Ordered from least to most senior; `Ord` is used to pick the higher level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
    Executive,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkEntry {
    pub position: String,
    pub company: String,
    pub start_date: String,
    pub end_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    pub degree: String,
    pub institution: String,
}

/// The resume entry a piece of text belongs to. Selects the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "lowercase")]
pub enum SectionEntry {
    Work(WorkEntry),
    Education(EducationEntry),
}

impl SectionEntry {
    pub fn section(&self) -> Section {
        match self {
            SectionEntry::Work(_) => Section::Work,
            SectionEntry::Education(_) => Section::Education,
        }
    }
}

/// Output of a builder: the `context` and `parameters` halves of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltContext {
    pub context: EnhancementContext,
    pub parameters: GenerationParameters,
}

// ────────────────────────────────────────────────────────────────────────────
// Builders
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ContextBuilder {
    /// What an end date of "Present" resolves to.
    current_year: i32,
}

impl ContextBuilder {
    pub fn new(current_year: i32) -> Self {
        Self { current_year }
    }

    pub fn build(&self, entry: &SectionEntry) -> BuiltContext {
        match entry {
            SectionEntry::Work(work) => self.work(work),
            SectionEntry::Education(education) => self.education(education),
        }
    }

    pub fn work(&self, entry: &WorkEntry) -> BuiltContext {
        BuiltContext {
            context: EnhancementContext::Work(WorkContext {
                role: entry.position.clone(),
                industry: entry.company.clone(),
                experience_level: determine_experience_level(entry, self.current_year),
            }),
            parameters: parameters(WORK_FOCUS_AREAS),
        }
    }

    pub fn education(&self, entry: &EducationEntry) -> BuiltContext {
        BuiltContext {
            context: EnhancementContext::Education(EducationContext {
                degree: entry.degree.clone(),
                institution: entry.institution.clone(),
                field: extract_field_from_degree(&entry.degree),
            }),
            parameters: parameters(EDUCATION_FOCUS_AREAS),
        }
    }
}

fn parameters(focus_areas: &[&str]) -> GenerationParameters {
    GenerationParameters {
        temperature: TEMPERATURE,
        style: STYLE.to_string(),
        focus_areas: focus_areas.iter().map(|s| s.to_string()).collect(),
        preserve_keywords: true,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Experience level
// ────────────────────────────────────────────────────────────────────────────

/// The higher of the title-derived level and the tenure-derived level.
pub fn determine_experience_level(entry: &WorkEntry, current_year: i32) -> ExperienceLevel {
    let years = years_of_experience(&entry.start_date, &entry.end_date, current_year);
    let by_tenure = level_from_years(years);

    match level_from_title(&entry.position) {
        Some(by_title) if by_title > by_tenure => by_title,
        _ => by_tenure,
    }
}

fn level_from_title(title: &str) -> Option<ExperienceLevel> {
    let title = title.to_uppercase();
    TITLE_LEVELS
        .iter()
        .find(|(keyword, _)| title.contains(keyword))
        .map(|(_, level)| *level)
}

fn level_from_years(years: i32) -> ExperienceLevel {
    match years {
        y if y <= 2 => ExperienceLevel::Entry,
        y if y <= 5 => ExperienceLevel::Mid,
        y if y <= 10 => ExperienceLevel::Senior,
        _ => ExperienceLevel::Executive,
    }
}

/// End year minus start year. Zero when either date has no year.
fn years_of_experience(start: &str, end: &str, current_year: i32) -> i32 {
    match (parse_year(start, current_year), parse_year(end, current_year)) {
        (Some(start), Some(end)) => end - start,
        _ => 0,
    }
}

/// "Present" (any case) or the first four-digit run: "2001", "Dec 2023".
fn parse_year(date: &str, current_year: i32) -> Option<i32> {
    let date = date.trim();
    if date.eq_ignore_ascii_case("present") {
        return Some(current_year);
    }
    YEAR.find(date).and_then(|m| m.as_str().parse().ok())
}

// ────────────────────────────────────────────────────────────────────────────
// Field of study
// ────────────────────────────────────────────────────────────────────────────

/// Everything after a degree keyword (and an optional "of"/"in").
/// Returns the degree unchanged when no keyword is found.
pub fn extract_field_from_degree(degree: &str) -> String {
    DEGREE
        .captures(degree)
        .and_then(|caps| caps.get(2))
        .map(|field| field.as_str().trim().to_string())
        .filter(|field| !field.is_empty())
        .unwrap_or_else(|| degree.to_string())
}
