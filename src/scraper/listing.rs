use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

static REPEATED_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}").expect("valid regex"));
static LINE_BREAKS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\n\r]+").expect("valid regex"));

/// Criteria labels read from a listing's detail pane, in the order they are matched.
pub const SENIORITY_LEVEL_LABEL: &str = "Seniority Level";
pub const EMPLOYMENT_TYPE_LABEL: &str = "Employment Type";
pub const INDUSTRY_LABEL: &str = "Industry";
pub const JOB_FUNCTIONS_LABEL: &str = "Job Functions";

/// Fields read from the result list. Missing elements come back as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingSummary {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub place: String,
    pub date: String,
}

/// A label/value pair as found next to each other in the detail pane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaEntry {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCriteria {
    pub seniority_level: String,
    pub job_function: String,
    pub employment_type: String,
    pub industries: String,
}

impl JobCriteria {
    /// Match entries against the known criteria labels. Unknown labels are
    /// ignored and absent ones stay empty.
    pub fn from_entries(entries: &[CriteriaEntry]) -> Self {
        let lookup = |label: &str| {
            entries
                .iter()
                .find(|entry| entry.label.trim() == label)
                .map(|entry| normalize_criteria_value(&entry.value))
                .unwrap_or_default()
        };

        Self {
            seniority_level: lookup(SENIORITY_LEVEL_LABEL),
            job_function: lookup(JOB_FUNCTIONS_LABEL),
            employment_type: lookup(EMPLOYMENT_TYPE_LABEL),
            industries: lookup(INDUSTRY_LABEL),
        }
    }
}

/// Embedded runs of whitespace become ", " separators, remaining line breaks
/// become spaces.
pub fn normalize_criteria_value(raw: &str) -> String {
    let joined = REPEATED_WHITESPACE.replace_all(raw.trim(), ", ");
    LINE_BREAKS.replace_all(&joined, " ").trim().to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingDetail {
    pub description: String,
    pub description_html: String,
    /// Always `None`: the detail pane exposes no stable apply link to read.
    pub apply_link: Option<String>,
    pub seniority_level: String,
    pub job_function: String,
    pub employment_type: String,
    pub industries: String,
}

impl ListingDetail {
    pub fn new(description: String, description_html: String, criteria: JobCriteria) -> Self {
        Self {
            description,
            description_html,
            apply_link: None,
            seniority_level: criteria.seniority_level,
            job_function: criteria.job_function,
            employment_type: criteria.employment_type,
            industries: criteria.industries,
        }
    }
}

/// One extracted listing as delivered to DATA subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventData {
    /// The run that produced this listing.
    pub run_id: Uuid,
    pub query: String,
    pub location: String,
    /// Attempt ordinal within the run; unique and increasing across pages.
    pub job_index: usize,
    pub link: String,
    #[serde(flatten)]
    pub summary: ListingSummary,
    #[serde(flatten)]
    pub detail: ListingDetail,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, value: &str) -> CriteriaEntry {
        CriteriaEntry {
            label: label.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_partial_criteria_leave_missing_fields_empty() {
        let criteria = JobCriteria::from_entries(&[
            entry("Seniority Level", "Mid"),
            entry("Employment Type", "Full-time"),
        ]);

        assert_eq!(criteria.seniority_level, "Mid");
        assert_eq!(criteria.employment_type, "Full-time");
        assert_eq!(criteria.industries, "");
        assert_eq!(criteria.job_function, "");
    }

    #[test]
    fn test_labels_are_trimmed_and_unknown_labels_ignored() {
        let criteria = JobCriteria::from_entries(&[
            entry("  Industry \n", "Software"),
            entry("Salary", "a lot"),
            entry("Job Functions", "Engineering"),
        ]);

        assert_eq!(criteria.industries, "Software");
        assert_eq!(criteria.job_function, "Engineering");
        assert_eq!(criteria.seniority_level, "");
    }

    #[test]
    fn test_normalize_joins_multi_value_criteria() {
        assert_eq!(
            normalize_criteria_value("Engineering\n\n    Information Technology  "),
            "Engineering, Information Technology"
        );
        assert_eq!(normalize_criteria_value("Internet\nSoftware"), "Internet Software");
        assert_eq!(normalize_criteria_value("  Mid  "), "Mid");
        assert_eq!(normalize_criteria_value("Full-time"), "Full-time");
    }

    #[test]
    fn test_event_data_serializes_flat() {
        let data = EventData {
            run_id: Uuid::nil(),
            query: "rust".to_string(),
            location: "Morocco".to_string(),
            job_index: 3,
            link: "/jobs/view/42".to_string(),
            summary: ListingSummary {
                job_id: "42".to_string(),
                title: "Engineer".to_string(),
                ..Default::default()
            },
            detail: ListingDetail::default(),
        };

        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["job_id"], "42");
        assert_eq!(value["title"], "Engineer");
        assert_eq!(value["job_index"], 3);
        assert!(value["apply_link"].is_null());
    }
}
