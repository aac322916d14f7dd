//! Daily curation selector.
//!
//! Picks one award pick and up to ten top-10 items per UTC calendar day.
//! The selection runs at most once per date: the first read for a day
//! computes and persists it, every later read returns the stored ids
//! verbatim. Admin overrides write through the same per-date upsert and are
//! never recomputed automatically.
use crate::db::{self, CandidateItem, Pool};
use crate::error::AppError;
use crate::model::{ContentItem, DailyCuration};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{info, instrument};

/// Minimum score for a candidate to be considered at all.
pub const QUALITY_THRESHOLD: f64 = 60.0;
/// Over-sample beyond the 11 slots so the diversity pass can reject
/// candidates without under-filling in the common case.
pub const CANDIDATE_POOL_SIZE: i64 = 15;
/// At most this many picks per platform across one day's selection.
pub const PLATFORM_CAP: usize = 3;
/// At most this many picks per author across one day's selection.
pub const AUTHOR_CAP: usize = 2;
/// Award pick plus top 10.
pub const DAILY_SLOTS: usize = 11;

/// Resolved curation as served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct CurationView {
    pub award_pick: Option<ContentItem>,
    pub top10: Vec<ContentItem>,
}

/// Day boundaries are fixed to UTC so the selection is deterministic across
/// server instances regardless of local timezone.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Walk the score-ordered candidate list and accept entries while their
/// platform and author stay under the caps. Rejected candidates are skipped
/// for good; there is no backfill pass. Stops after [`DAILY_SLOTS`] accepts.
pub fn apply_diversity_caps(candidates: Vec<CandidateItem>) -> Vec<CandidateItem> {
    let mut accepted = Vec::new();
    let mut platform_counts: HashMap<&'static str, usize> = HashMap::new();
    let mut author_counts: HashMap<String, usize> = HashMap::new();

    for candidate in candidates {
        let platform_count = platform_counts
            .get(candidate.platform.as_str())
            .copied()
            .unwrap_or(0);
        if platform_count >= PLATFORM_CAP {
            continue;
        }
        if let Some(author) = &candidate.author_name {
            if author_counts.get(author).copied().unwrap_or(0) >= AUTHOR_CAP {
                continue;
            }
        }

        *platform_counts
            .entry(candidate.platform.as_str())
            .or_insert(0) += 1;
        if let Some(author) = &candidate.author_name {
            *author_counts.entry(author.clone()).or_insert(0) += 1;
        }
        accepted.push(candidate);

        if accepted.len() >= DAILY_SLOTS {
            break;
        }
    }

    accepted
}

/// Return the curation for `date`, computing and persisting it on first
/// access. An existing record (automatic or admin-set) is always used as
/// stored. Persistence failures propagate; there is no stale fallback.
#[instrument(skip_all, fields(%date))]
pub async fn get_or_create_curation(
    pool: &Pool,
    date: NaiveDate,
) -> Result<CurationView, AppError> {
    let curation = match db::find_daily_curation(pool, date).await? {
        Some(existing) => existing,
        None => {
            let candidates =
                db::find_candidate_items(pool, QUALITY_THRESHOLD, CANDIDATE_POOL_SIZE).await?;
            let selected = apply_diversity_caps(candidates);
            let award_pick_id = selected.first().map(|c| c.id.clone());
            let top10_ids: Vec<String> =
                selected.iter().skip(1).map(|c| c.id.clone()).collect();
            info!(
                award = award_pick_id.as_deref().unwrap_or("-"),
                top10 = top10_ids.len(),
                "computed daily curation"
            );
            db::upsert_daily_curation(pool, date, award_pick_id.as_deref(), &top10_ids).await?
        }
    };
    resolve_curation(pool, &curation).await
}

/// Fetch the records behind a curation's ids. Ids that no longer resolve
/// (item deleted since selection) are dropped silently; the top 10 is
/// re-sorted by score at read time.
pub async fn resolve_curation(
    pool: &Pool,
    curation: &DailyCuration,
) -> Result<CurationView, AppError> {
    let mut ids: Vec<String> = Vec::with_capacity(curation.top10_ids.len() + 1);
    if let Some(award_id) = &curation.award_pick_id {
        ids.push(award_id.clone());
    }
    ids.extend(curation.top10_ids.iter().cloned());

    let items = db::find_content_items_by_ids(pool, &ids).await?;
    let mut by_id: HashMap<String, ContentItem> =
        items.into_iter().map(|item| (item.id.clone(), item)).collect();

    let award_pick = curation
        .award_pick_id
        .as_ref()
        .and_then(|id| by_id.remove(id));
    let mut top10: Vec<ContentItem> = curation
        .top10_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect();
    top10.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    Ok(CurationView { award_pick, top10 })
}

/// Admin override: replace a date's curation wholesale.
#[instrument(skip_all, fields(%date))]
pub async fn override_curation(
    pool: &Pool,
    date: NaiveDate,
    award_pick_id: Option<String>,
    top10_ids: Vec<String>,
) -> Result<DailyCuration, AppError> {
    if top10_ids.len() > DAILY_SLOTS - 1 {
        return Err(AppError::Validation(format!(
            "top10 may hold at most {} items",
            DAILY_SLOTS - 1
        )));
    }
    db::upsert_daily_curation(pool, date, award_pick_id.as_deref(), &top10_ids).await
}

/// Admin override: set the award pick for a date, keeping its top 10.
#[instrument(skip_all, fields(%date))]
pub async fn override_award_pick(
    pool: &Pool,
    date: NaiveDate,
    item_id: &str,
) -> Result<(), AppError> {
    if db::get_content_item(pool, item_id).await?.is_none() {
        return Err(AppError::NotFound(format!("content item {item_id}")));
    }
    db::upsert_award_pick(pool, date, item_id).await
}
