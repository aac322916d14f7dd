//! HTTP surface: public browse/search/submit endpoints and the admin
//! moderation/curation dashboard API.
use crate::cache::{QueryCache, TodayCache};
use crate::config::{Config, Scraper};
use crate::curation;
use crate::db::{self, Pool};
use crate::error::AppError;
use crate::ingest;
use crate::model::{ItemFilter, NewSubmission, Platform, SubmissionStatus};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::instrument;

const RELATED_LIMIT: i64 = 6;
const MAX_PAGE_SIZE: i64 = 50;
const DEFAULT_PAGE_SIZE: i64 = 12;
const ANALYTICS_TOP_LIMIT: i64 = 5;
const ANALYTICS_AWARD_LIMIT: i64 = 7;
const ADMIN_RECENT_LIMIT: i64 = 50;

/// Shared handler state. The caches are constructed once here and passed by
/// handle; nothing in the request path owns global mutable state.
#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub list_cache: Arc<QueryCache>,
    pub today_cache: Arc<TodayCache>,
    pub admin_token: String,
    pub scraper: Scraper,
}

impl AppState {
    pub fn new(pool: Pool, cfg: &Config) -> Self {
        Self {
            pool,
            list_cache: Arc::new(QueryCache::new(
                StdDuration::from_secs(cfg.cache.list_ttl_secs),
                cfg.cache.capacity,
            )),
            today_cache: Arc::new(TodayCache::new(StdDuration::from_secs(
                cfg.cache.today_ttl_secs,
            ))),
            admin_token: cfg.admin.token.clone(),
            scraper: cfg.scraper.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/inspirations", get(list_inspirations))
        .route("/api/inspirations/:id", get(get_inspiration))
        .route("/api/inspirations/:id/related", get(related_inspirations))
        .route("/api/today", get(today))
        .route("/api/submissions", post(create_submission))
        .route("/api/admin/submissions", get(admin_list_submissions))
        .route("/api/admin/submissions/:id", patch(admin_review_submission))
        .route(
            "/api/admin/curation",
            get(admin_get_curation).post(admin_set_curation),
        )
        .route("/api/admin/award", post(admin_set_award))
        .route(
            "/api/admin/content",
            patch(admin_update_content).delete(admin_delete_content),
        )
        .route("/api/admin/stats", get(admin_stats))
        .route("/api/admin/analytics", get(admin_analytics))
        .route("/api/admin/inspirations", get(admin_list_inspirations))
        .route("/api/admin/ingest", post(admin_ingest))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(token) if token == state.admin_token => Ok(()),
        _ => Err(AppError::Unauthorized),
    }
}

fn with_cached_flag(mut value: Value, cached: bool) -> Value {
    if let Some(obj) = value.as_object_mut() {
        obj.insert("cached".to_string(), Value::Bool(cached));
    }
    value
}

fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {s} (expected YYYY-MM-DD)")))
}

/// Translate a relative date window into a lower bound on `published_at`.
/// Unknown window names behave like no filter. The bound is fixed when the
/// page is loaded, so a cached page's window edge lags by up to the list TTL.
fn published_after_from_window(window: &str) -> Option<chrono::DateTime<Utc>> {
    let now = Utc::now();
    match window {
        "today" => now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc()),
        "week" => Some(now - Duration::days(7)),
        "month" => Some(now - Duration::days(30)),
        "year" => Some(now - Duration::days(365)),
        _ => None,
    }
}

fn parse_tags_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    search: Option<String>,
    platform: Option<String>,
    tags: Option<String>,
    date: Option<String>,
    page: Option<u32>,
    limit: Option<u32>,
}

async fn list_payload(
    pool: &Pool,
    filter: &ItemFilter,
    page: i64,
    limit: i64,
) -> Result<Value, AppError> {
    let offset = (page - 1) * limit;
    // Fetch one extra row to learn whether another page exists.
    let mut items = db::find_content_items(pool, filter, limit + 1, offset).await?;
    let has_more = items.len() as i64 > limit;
    if has_more {
        items.truncate(limit as usize);
    }

    // Exact counts only for early pages; deep pagination gets an estimate.
    let total = if page <= 5 {
        db::count_content_items(pool, filter).await?
    } else {
        offset + items.len() as i64 + if has_more { limit } else { 0 }
    };
    let total_pages = (total + limit - 1) / limit;

    Ok(json!({
        "data": items,
        "total": total,
        "page": page,
        "totalPages": total_pages,
        "hasMore": has_more,
    }))
}

#[instrument(skip_all)]
async fn list_inspirations(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = i64::from(q.page.unwrap_or(1).max(1));
    let limit = i64::from(q.limit.unwrap_or(DEFAULT_PAGE_SIZE as u32))
        .clamp(1, MAX_PAGE_SIZE);

    let platform = match &q.platform {
        Some(p) => Some(
            Platform::parse(p)
                .ok_or_else(|| AppError::Validation(format!("unknown platform: {p}")))?,
        ),
        None => None,
    };
    let search = q
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let filter = ItemFilter {
        platform,
        tags: q.tags.as_deref().map(parse_tags_csv).unwrap_or_default(),
        published_after: q.date.as_deref().and_then(published_after_from_window),
        search: search.clone(),
        archived: false,
    };

    // Free-text searches are high-cardinality and are never cached.
    if search.is_some() {
        let value = list_payload(&state.pool, &filter, page, limit).await?;
        return Ok(Json(with_cached_flag(value, false)));
    }

    let page_s = page.to_string();
    let limit_s = limit.to_string();
    let mut params: Vec<(&str, &str)> = vec![("page", &page_s), ("limit", &limit_s)];
    if let Some(p) = q.platform.as_deref() {
        params.push(("platform", p));
    }
    if let Some(t) = q.tags.as_deref() {
        params.push(("tags", t));
    }
    if let Some(d) = q.date.as_deref() {
        params.push(("date", d));
    }
    let key = QueryCache::compute_key(&params);

    let pool = state.pool.clone();
    let (value, was_cached) = state
        .list_cache
        .get_or_load(&key, || async move {
            list_payload(&pool, &filter, page, limit).await
        })
        .await?;
    Ok(Json(with_cached_flag(value, was_cached)))
}

#[instrument(skip_all)]
async fn get_inspiration(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let item = db::get_content_item(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("content item {id}")))?;
    Ok(Json(serde_json::to_value(item).map_err(anyhow::Error::from)?))
}

#[instrument(skip_all)]
async fn related_inspirations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let item = db::get_content_item(&state.pool, &id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("content item {id}")))?;
    let related = db::find_related_items(&state.pool, &item, RELATED_LIMIT).await?;
    Ok(Json(json!({ "data": related })))
}

#[instrument(skip_all)]
async fn today(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    let date = curation::today_utc();
    if let Some(hit) = state.today_cache.get(date) {
        return Ok(Json(with_cached_flag(hit, true)));
    }

    let view = curation::get_or_create_curation(&state.pool, date).await?;
    let value = serde_json::to_value(&view).map_err(anyhow::Error::from)?;
    state.today_cache.set(date, value.clone());
    Ok(Json(with_cached_flag(value, false)))
}

#[derive(Debug, Deserialize)]
struct SubmissionPayload {
    title: String,
    #[serde(default)]
    description: Option<String>,
    content_url: String,
    submitter_name: String,
    submitter_email: String,
    platform: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn validate_submission(payload: SubmissionPayload) -> Result<NewSubmission, AppError> {
    let title = payload.title.trim().to_string();
    if title.is_empty() || title.len() > 200 {
        return Err(AppError::Validation(
            "title must be 1-200 characters".to_string(),
        ));
    }
    if let Some(description) = &payload.description {
        if description.len() > 1000 {
            return Err(AppError::Validation(
                "description must be at most 1000 characters".to_string(),
            ));
        }
    }
    if !payload.content_url.starts_with("http://") && !payload.content_url.starts_with("https://") {
        return Err(AppError::Validation(
            "content_url must be an http(s) URL".to_string(),
        ));
    }
    let submitter_name = payload.submitter_name.trim().to_string();
    if submitter_name.is_empty() || submitter_name.len() > 100 {
        return Err(AppError::Validation(
            "submitter_name must be 1-100 characters".to_string(),
        ));
    }
    let email = payload.submitter_email.trim();
    if !email.contains('@') || !email.contains('.') {
        return Err(AppError::Validation(
            "submitter_email must be a valid email address".to_string(),
        ));
    }
    let platform = Platform::parse(&payload.platform)
        .ok_or_else(|| AppError::Validation(format!("unknown platform: {}", payload.platform)))?;
    let tags: Vec<String> = payload
        .tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if tags.is_empty() || tags.len() > 10 {
        return Err(AppError::Validation(
            "tags must hold 1-10 entries".to_string(),
        ));
    }

    Ok(NewSubmission {
        title,
        description: payload.description,
        content_url: payload.content_url,
        submitter_name,
        submitter_email: email.to_string(),
        platform,
        tags,
    })
}

#[instrument(skip_all)]
async fn create_submission(
    State(state): State<AppState>,
    Json(payload): Json<SubmissionPayload>,
) -> Result<impl IntoResponse, AppError> {
    let new = validate_submission(payload)?;
    let submission = db::create_submission(&state.pool, &new).await?;
    let body = serde_json::to_value(submission).map_err(anyhow::Error::from)?;
    Ok((StatusCode::CREATED, Json(body)))
}

#[derive(Debug, Deserialize, Default)]
struct SubmissionListQuery {
    status: Option<String>,
}

#[instrument(skip_all)]
async fn admin_list_submissions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<SubmissionListQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let status = match q.status.as_deref() {
        Some(raw) => Some(
            SubmissionStatus::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown status: {raw}")))?,
        ),
        None => None,
    };
    let submissions = db::list_submissions(&state.pool, status).await?;
    Ok(Json(json!({ "data": submissions })))
}

#[derive(Debug, Deserialize)]
struct ReviewPayload {
    status: String,
    #[serde(default)]
    rejection_reason: Option<String>,
}

#[instrument(skip_all)]
async fn admin_review_submission(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ReviewPayload>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let next = SubmissionStatus::parse(&payload.status)
        .ok_or_else(|| AppError::Validation(format!("unknown status: {}", payload.status)))?;
    let submission = db::update_submission_status(
        &state.pool,
        &id,
        next,
        "admin",
        payload.rejection_reason.as_deref(),
    )
    .await?;
    Ok(Json(serde_json::to_value(submission).map_err(anyhow::Error::from)?))
}

#[derive(Debug, Deserialize, Default)]
struct CurationQuery {
    date: Option<String>,
}

#[instrument(skip_all)]
async fn admin_get_curation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<CurationQuery>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let date = match q.date.as_deref() {
        Some(raw) => parse_date(raw)?,
        None => curation::today_utc(),
    };

    match db::find_daily_curation(&state.pool, date).await? {
        Some(record) => {
            let view = curation::resolve_curation(&state.pool, &record).await?;
            Ok(Json(json!({
                "date": date,
                "awardPick": view.award_pick,
                "top10": view.top10,
                "hasData": true,
            })))
        }
        None => Ok(Json(json!({
            "date": date,
            "awardPick": Value::Null,
            "top10": [],
            "hasData": false,
        }))),
    }
}

#[derive(Debug, Deserialize)]
struct CurationPayload {
    date: String,
    #[serde(default)]
    award_pick_id: Option<String>,
    #[serde(default)]
    top10_ids: Vec<String>,
}

#[instrument(skip_all)]
async fn admin_set_curation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CurationPayload>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let date = parse_date(&payload.date)?;
    let record = curation::override_curation(
        &state.pool,
        date,
        payload.award_pick_id,
        payload.top10_ids,
    )
    .await?;
    Ok(Json(json!({ "success": true, "curation": record })))
}

#[derive(Debug, Deserialize)]
struct AwardPayload {
    item_id: String,
}

#[instrument(skip_all)]
async fn admin_set_award(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AwardPayload>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    curation::override_award_pick(&state.pool, curation::today_utc(), &payload.item_id).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct ContentActionPayload {
    ids: Vec<String>,
    action: String,
}

#[instrument(skip_all)]
async fn admin_update_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ContentActionPayload>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    if payload.ids.is_empty() {
        return Err(AppError::Validation("ids must be non-empty".to_string()));
    }
    let archived = match payload.action.as_str() {
        "archive" => true,
        "unarchive" => false,
        other => {
            return Err(AppError::Validation(format!("unknown action: {other}")));
        }
    };
    let updated = db::set_items_archived(&state.pool, &payload.ids, archived).await?;
    Ok(Json(json!({
        "success": true,
        "updated": updated,
        "action": payload.action,
    })))
}

#[derive(Debug, Deserialize)]
struct ContentDeletePayload {
    ids: Vec<String>,
}

#[instrument(skip_all)]
async fn admin_delete_content(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ContentDeletePayload>,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    if payload.ids.is_empty() {
        return Err(AppError::Validation("ids must be non-empty".to_string()));
    }
    let deleted = db::delete_content_items(&state.pool, &payload.ids).await?;
    Ok(Json(json!({ "success": true, "deleted": deleted })))
}

#[instrument(skip_all)]
async fn admin_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let total_items = db::count_all_content_items(&state.pool).await?;
    let pending_submissions =
        db::count_submissions_with_status(&state.pool, SubmissionStatus::Pending).await?;
    Ok(Json(json!({
        "totalInspirations": total_items,
        "pendingSubmissions": pending_submissions,
    })))
}

/// Dashboard analytics: submission outcomes, per-platform corpus breakdown,
/// ingestion series (daily over 30 days, monthly over a year), week-on-week
/// ingestion growth, current top-scored items, and recent award picks.
#[instrument(skip_all)]
async fn admin_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let pool = &state.pool;

    let pending = db::count_submissions_with_status(pool, SubmissionStatus::Pending).await?;
    let approved = db::count_submissions_with_status(pool, SubmissionStatus::Approved).await?;
    let rejected = db::count_submissions_with_status(pool, SubmissionStatus::Rejected).await?;

    let platforms: Vec<Value> = db::platform_breakdown(pool)
        .await?
        .into_iter()
        .map(|(platform, count)| json!({ "platform": platform, "count": count }))
        .collect();

    let now = Utc::now();
    let daily: Vec<Value> = db::daily_scrape_counts(pool, now - Duration::days(30))
        .await?
        .into_iter()
        .map(|(day, count)| json!({ "day": day, "count": count }))
        .collect();
    let monthly: Vec<Value> = db::monthly_scrape_counts(pool, now - Duration::days(365))
        .await?
        .into_iter()
        .map(|(month, count)| json!({ "month": month, "count": count }))
        .collect();

    let this_week =
        db::count_items_scraped_between(pool, now - Duration::days(7), now).await?;
    let last_week =
        db::count_items_scraped_between(pool, now - Duration::days(14), now - Duration::days(7))
            .await?;

    let top_scored =
        db::find_content_items(pool, &ItemFilter::default(), ANALYTICS_TOP_LIMIT, 0).await?;

    let recent = db::recent_daily_curations(pool, ANALYTICS_AWARD_LIMIT).await?;
    let award_ids: Vec<String> = recent
        .iter()
        .filter_map(|c| c.award_pick_id.clone())
        .collect();
    let mut award_items: HashMap<String, Value> = db::find_content_items_by_ids(pool, &award_ids)
        .await?
        .into_iter()
        .map(|item| {
            let id = item.id.clone();
            (id, json!(item))
        })
        .collect();
    let recent_awards: Vec<Value> = recent
        .iter()
        .filter_map(|c| {
            let id = c.award_pick_id.as_ref()?;
            let item = award_items.remove(id)?;
            Some(json!({ "date": c.date, "item": item }))
        })
        .collect();

    Ok(Json(json!({
        "submissions": { "pending": pending, "approved": approved, "rejected": rejected },
        "platforms": platforms,
        "dailyScrapes": daily,
        "monthlyScrapes": monthly,
        "weeklyGrowth": { "thisWeek": this_week, "lastWeek": last_week },
        "topScored": top_scored,
        "recentAwardPicks": recent_awards,
    })))
}

/// Recently ingested items for the dashboard, archived included.
#[instrument(skip_all)]
async fn admin_list_inspirations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let items = db::recent_content_items(&state.pool, ADMIN_RECENT_LIMIT).await?;
    Ok(Json(json!({ "data": items })))
}

#[instrument(skip_all)]
async fn admin_ingest(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    require_admin(&state, &headers)?;
    let report = ingest::run_scraper(&state.scraper, &state.pool).await?;
    Ok(Json(serde_json::to_value(report).map_err(anyhow::Error::from)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds() {
        assert!(published_after_from_window("today").is_some());
        assert!(published_after_from_window("week").is_some());
        assert!(published_after_from_window("month").is_some());
        assert!(published_after_from_window("year").is_some());
        assert!(published_after_from_window("fortnight").is_none());
    }

    #[test]
    fn tags_csv_trims_and_drops_empties() {
        assert_eq!(
            parse_tags_csv(" ui, branding ,,3d "),
            vec!["ui", "branding", "3d"]
        );
        assert!(parse_tags_csv(" , ").is_empty());
    }

    fn payload() -> SubmissionPayload {
        SubmissionPayload {
            title: "A poster series".to_string(),
            description: None,
            content_url: "https://example.com/posters".to_string(),
            submitter_name: "Kim".to_string(),
            submitter_email: "kim@example.com".to_string(),
            platform: "Behance".to_string(),
            tags: vec!["print".to_string()],
        }
    }

    #[test]
    fn submission_validation_accepts_good_payload() {
        let new = validate_submission(payload()).unwrap();
        assert_eq!(new.platform, Platform::Behance);
        assert_eq!(new.tags, vec!["print"]);
    }

    #[test]
    fn submission_validation_rejects_bad_fields() {
        let mut p = payload();
        p.title = "".to_string();
        assert!(matches!(
            validate_submission(p),
            Err(AppError::Validation(_))
        ));

        let mut p = payload();
        p.content_url = "ftp://example.com".to_string();
        assert!(matches!(
            validate_submission(p),
            Err(AppError::Validation(_))
        ));

        let mut p = payload();
        p.submitter_email = "not-an-email".to_string();
        assert!(matches!(
            validate_submission(p),
            Err(AppError::Validation(_))
        ));

        let mut p = payload();
        p.platform = "Pinterest".to_string();
        assert!(matches!(
            validate_submission(p),
            Err(AppError::Validation(_))
        ));

        let mut p = payload();
        p.tags = vec![];
        assert!(matches!(
            validate_submission(p),
            Err(AppError::Validation(_))
        ));
    }
}
