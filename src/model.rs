use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Source platforms content can be ingested from. Fixed set; unknown values
/// coming from the database or API input are rejected at parse time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    Behance,
    Dribbble,
    Medium,
    Core77,
    Awwwards,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Behance => "Behance",
            Platform::Dribbble => "Dribbble",
            Platform::Medium => "Medium",
            Platform::Core77 => "Core77",
            Platform::Awwwards => "Awwwards",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Behance" => Some(Platform::Behance),
            "Dribbble" => Some(Platform::Dribbble),
            "Medium" => Some(Platform::Medium),
            "Core77" => Some(Platform::Core77),
            "Awwwards" => Some(Platform::Awwwards),
            _ => None,
        }
    }
}

/// Review state for a public submission. `Pending` is the only non-terminal
/// state; approved and rejected submissions are never re-reviewed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SubmissionStatus::Pending),
            "approved" => Some(SubmissionStatus::Approved),
            "rejected" => Some(SubmissionStatus::Rejected),
            _ => None,
        }
    }

    /// Only `pending -> approved` and `pending -> rejected` are legal.
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        matches!(
            (self, next),
            (
                SubmissionStatus::Pending,
                SubmissionStatus::Approved | SubmissionStatus::Rejected
            )
        )
    }
}

/// A single curated design-inspiration record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub content_url: Option<String>,
    pub platform: Platform,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub tags: Vec<String>,
    pub score: f64,
    pub published_at: DateTime<Utc>,
    pub scraped_at: DateTime<Utc>,
    pub archived: bool,
    pub curated_by: Option<String>,
}

/// Fields required to create a content item (ingest or submission approval).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContentItem {
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub content_url: Option<String>,
    pub platform: Platform,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub tags: Vec<String>,
    pub score: f64,
    pub published_at: DateTime<Utc>,
    pub curated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub content_url: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub platform: Platform,
    pub tags: Vec<String>,
    pub status: SubmissionStatus,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub title: String,
    pub description: Option<String>,
    pub content_url: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub platform: Platform,
    pub tags: Vec<String>,
}

/// One persisted curation per UTC calendar day.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCuration {
    pub date: NaiveDate,
    pub award_pick_id: Option<String>,
    pub top10_ids: Vec<String>,
}

/// Filters accepted by the item list queries. `archived` is always set
/// explicitly by the caller; the public surface pins it to `false`.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub platform: Option<Platform>,
    pub tags: Vec<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub archived: bool,
}
