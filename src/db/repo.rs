use super::model::CandidateItem;
use crate::error::AppError;
use crate::model::{
    ContentItem, DailyCuration, ItemFilter, NewContentItem, NewSubmission, Platform, Submission,
    SubmissionStatus,
};
use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use tracing::instrument;
use uuid::Uuid;

pub type Pool = SqlitePool;

/// Score assigned to content items created from approved submissions.
pub const DEFAULT_SUBMISSION_SCORE: f64 = 50.0;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// For file-backed SQLite URLs, expand a leading `~/` and make sure the
/// parent directory exists. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rel), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rel),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query_part {
        Some(q) => format!("sqlite://{expanded_path}?{q}"),
        None => format!("sqlite://{expanded_path}"),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn item_from_row(row: &SqliteRow) -> Result<ContentItem, AppError> {
    let platform_str: String = row.try_get("platform")?;
    let platform = Platform::parse(&platform_str).ok_or_else(|| {
        AppError::Validation(format!("unknown platform in store: {platform_str}"))
    })?;
    let tags_json: String = row.try_get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(ContentItem {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        thumbnail_url: row.try_get("thumbnail_url")?,
        content_url: row.try_get("content_url")?,
        platform,
        author_name: row.try_get("author_name")?,
        author_url: row.try_get("author_url")?,
        tags,
        score: row.try_get("score")?,
        published_at: row.try_get("published_at")?,
        scraped_at: row.try_get("scraped_at")?,
        archived: row.try_get("archived")?,
        curated_by: row.try_get("curated_by")?,
    })
}

fn submission_from_row(row: &SqliteRow) -> Result<Submission, AppError> {
    let platform_str: String = row.try_get("platform")?;
    let platform = Platform::parse(&platform_str).ok_or_else(|| {
        AppError::Validation(format!("unknown platform in store: {platform_str}"))
    })?;
    let status_str: String = row.try_get("status")?;
    let status = SubmissionStatus::parse(&status_str).ok_or_else(|| {
        AppError::Validation(format!("unknown submission status in store: {status_str}"))
    })?;
    let tags_json: String = row.try_get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

    Ok(Submission {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        content_url: row.try_get("content_url")?,
        submitter_name: row.try_get("submitter_name")?,
        submitter_email: row.try_get("submitter_email")?,
        platform,
        tags,
        status,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
        reviewed_by: row.try_get("reviewed_by")?,
        rejection_reason: row.try_get("rejection_reason")?,
    })
}

/// WHERE fragment for an [`ItemFilter`]. Bind order must match
/// [`bind_filter`]: archived, platform, published_after, tags, search.
fn filter_sql(filter: &ItemFilter) -> String {
    let mut clauses = vec!["archived = ?".to_string()];
    if filter.platform.is_some() {
        clauses.push("platform = ?".to_string());
    }
    if filter.published_after.is_some() {
        clauses.push("published_at >= ?".to_string());
    }
    if !filter.tags.is_empty() {
        let marks = vec!["?"; filter.tags.len()].join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(content_items.tags) WHERE json_each.value IN ({marks}))"
        ));
    }
    if filter.search.is_some() {
        clauses.push(
            "(LOWER(title) LIKE ? OR LOWER(COALESCE(description, '')) LIKE ? \
             OR EXISTS (SELECT 1 FROM json_each(content_items.tags) WHERE LOWER(json_each.value) LIKE ?))"
                .to_string(),
        );
    }
    clauses.join(" AND ")
}

fn bind_filter<'q>(
    mut query: sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    filter: &ItemFilter,
) -> sqlx::query::Query<'q, Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query = query.bind(filter.archived);
    if let Some(platform) = filter.platform {
        query = query.bind(platform.as_str());
    }
    if let Some(after) = filter.published_after {
        query = query.bind(after);
    }
    for tag in &filter.tags {
        query = query.bind(tag.clone());
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search.trim().to_lowercase());
        query = query.bind(pattern.clone()).bind(pattern.clone()).bind(pattern);
    }
    query
}

#[instrument(skip_all)]
pub async fn find_content_items(
    pool: &Pool,
    filter: &ItemFilter,
    limit: i64,
    offset: i64,
) -> Result<Vec<ContentItem>, AppError> {
    let sql = format!(
        "SELECT * FROM content_items WHERE {} ORDER BY score DESC, published_at DESC LIMIT ? OFFSET ?",
        filter_sql(filter)
    );
    let rows = bind_filter(sqlx::query(&sql), filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    rows.iter().map(item_from_row).collect()
}

#[instrument(skip_all)]
pub async fn count_content_items(pool: &Pool, filter: &ItemFilter) -> Result<i64, AppError> {
    let sql = format!(
        "SELECT COUNT(*) AS n FROM content_items WHERE {}",
        filter_sql(filter)
    );
    let row = bind_filter(sqlx::query(&sql), filter).fetch_one(pool).await?;
    Ok(row.try_get("n")?)
}

#[instrument(skip_all)]
pub async fn get_content_item(pool: &Pool, id: &str) -> Result<Option<ContentItem>, AppError> {
    let row = sqlx::query("SELECT * FROM content_items WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(item_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn find_content_items_by_ids(
    pool: &Pool,
    ids: &[String],
) -> Result<Vec<ContentItem>, AppError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let marks = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT * FROM content_items WHERE id IN ({marks})");
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let rows = query.fetch_all(pool).await?;
    rows.iter().map(item_from_row).collect()
}

/// Unarchived items sharing the platform of `item`, best first.
#[instrument(skip_all)]
pub async fn find_related_items(
    pool: &Pool,
    item: &ContentItem,
    limit: i64,
) -> Result<Vec<ContentItem>, AppError> {
    let rows = sqlx::query(
        "SELECT * FROM content_items WHERE archived = 0 AND platform = ? AND id != ? \
         ORDER BY score DESC, published_at DESC LIMIT ?",
    )
    .bind(item.platform.as_str())
    .bind(&item.id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(item_from_row).collect()
}

/// Ranked candidate pool for the daily selection: unarchived, at or above
/// the quality threshold, best score first with recency as tie-break.
#[instrument(skip_all)]
pub async fn find_candidate_items(
    pool: &Pool,
    min_score: f64,
    limit: i64,
) -> Result<Vec<CandidateItem>, AppError> {
    let rows = sqlx::query(
        "SELECT id, score, platform, author_name FROM content_items \
         WHERE archived = 0 AND score >= ? \
         ORDER BY score DESC, published_at DESC LIMIT ?",
    )
    .bind(min_score)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let platform_str: String = row.try_get("platform")?;
            let platform = Platform::parse(&platform_str).ok_or_else(|| {
                AppError::Validation(format!("unknown platform in store: {platform_str}"))
            })?;
            Ok(CandidateItem {
                id: row.try_get("id")?,
                score: row.try_get("score")?,
                platform,
                author_name: row.try_get("author_name")?,
            })
        })
        .collect()
}

async fn insert_content_item_with<'e, E>(
    executor: E,
    new: &NewContentItem,
) -> Result<ContentItem, AppError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let id = Uuid::new_v4().to_string();
    let scraped_at = Utc::now();
    let tags_json = serde_json::to_string(&new.tags)
        .map_err(|e| AppError::Validation(format!("unserializable tags: {e}")))?;
    sqlx::query(
        "INSERT INTO content_items \
         (id, title, description, thumbnail_url, content_url, platform, author_name, author_url, \
          tags, score, published_at, scraped_at, archived, curated_by) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
    )
    .bind(&id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.thumbnail_url)
    .bind(&new.content_url)
    .bind(new.platform.as_str())
    .bind(&new.author_name)
    .bind(&new.author_url)
    .bind(&tags_json)
    .bind(new.score)
    .bind(new.published_at)
    .bind(scraped_at)
    .bind(&new.curated_by)
    .execute(executor)
    .await?;

    Ok(ContentItem {
        id,
        title: new.title.clone(),
        description: new.description.clone(),
        thumbnail_url: new.thumbnail_url.clone(),
        content_url: new.content_url.clone(),
        platform: new.platform,
        author_name: new.author_name.clone(),
        author_url: new.author_url.clone(),
        tags: new.tags.clone(),
        score: new.score,
        published_at: new.published_at,
        scraped_at,
        archived: false,
        curated_by: new.curated_by.clone(),
    })
}

#[instrument(skip_all)]
pub async fn create_content_item(
    pool: &Pool,
    new: &NewContentItem,
) -> Result<ContentItem, AppError> {
    insert_content_item_with(pool, new).await
}

#[instrument(skip_all)]
pub async fn content_url_exists(pool: &Pool, content_url: &str) -> Result<bool, AppError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_items WHERE content_url = ?")
        .bind(content_url)
        .fetch_one(pool)
        .await?;
    Ok(n > 0)
}

#[instrument(skip_all)]
pub async fn set_items_archived(
    pool: &Pool,
    ids: &[String],
    archived: bool,
) -> Result<u64, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let marks = vec!["?"; ids.len()].join(", ");
    let sql = format!("UPDATE content_items SET archived = ? WHERE id IN ({marks})");
    let mut query = sqlx::query(&sql).bind(archived);
    for id in ids {
        query = query.bind(id);
    }
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Hard delete; only reachable through the explicit admin bulk action.
#[instrument(skip_all)]
pub async fn delete_content_items(pool: &Pool, ids: &[String]) -> Result<u64, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let marks = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM content_items WHERE id IN ({marks})");
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[instrument(skip_all)]
pub async fn create_submission(
    pool: &Pool,
    new: &NewSubmission,
) -> Result<Submission, AppError> {
    let id = Uuid::new_v4().to_string();
    let submitted_at = Utc::now();
    let tags_json = serde_json::to_string(&new.tags)
        .map_err(|e| AppError::Validation(format!("unserializable tags: {e}")))?;
    sqlx::query(
        "INSERT INTO submissions \
         (id, title, description, content_url, submitter_name, submitter_email, platform, tags, \
          status, submitted_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'pending', ?)",
    )
    .bind(&id)
    .bind(&new.title)
    .bind(&new.description)
    .bind(&new.content_url)
    .bind(&new.submitter_name)
    .bind(&new.submitter_email)
    .bind(new.platform.as_str())
    .bind(&tags_json)
    .bind(submitted_at)
    .execute(pool)
    .await?;

    Ok(Submission {
        id,
        title: new.title.clone(),
        description: new.description.clone(),
        content_url: new.content_url.clone(),
        submitter_name: new.submitter_name.clone(),
        submitter_email: new.submitter_email.clone(),
        platform: new.platform,
        tags: new.tags.clone(),
        status: SubmissionStatus::Pending,
        submitted_at,
        reviewed_at: None,
        reviewed_by: None,
        rejection_reason: None,
    })
}

#[instrument(skip_all)]
pub async fn list_submissions(
    pool: &Pool,
    status: Option<SubmissionStatus>,
) -> Result<Vec<Submission>, AppError> {
    let rows = match status {
        Some(status) => {
            sqlx::query(
                "SELECT * FROM submissions WHERE status = ? ORDER BY submitted_at DESC",
            )
            .bind(status.as_str())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM submissions ORDER BY submitted_at DESC")
                .fetch_all(pool)
                .await?
        }
    };
    rows.iter().map(submission_from_row).collect()
}

/// Apply a review decision. `approved` and `rejected` are terminal: a second
/// review attempt fails validation. Approval creates a content item from the
/// submission's fields with [`DEFAULT_SUBMISSION_SCORE`], in the same
/// transaction as the status update.
#[instrument(skip_all)]
pub async fn update_submission_status(
    pool: &Pool,
    id: &str,
    next: SubmissionStatus,
    reviewer: &str,
    rejection_reason: Option<&str>,
) -> Result<Submission, AppError> {
    if next == SubmissionStatus::Pending {
        return Err(AppError::Validation(
            "a submission cannot be moved back to pending".to_string(),
        ));
    }

    let mut tx = pool.begin().await?;

    let row = sqlx::query("SELECT * FROM submissions WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
    let Some(row) = row else {
        return Err(AppError::NotFound(format!("submission {id}")));
    };
    let mut submission = submission_from_row(&row)?;

    if !submission.status.can_transition_to(next) {
        return Err(AppError::Validation(format!(
            "submission {id} is {}; only pending submissions can be reviewed",
            submission.status.as_str()
        )));
    }

    let reviewed_at = Utc::now();
    let reason = match next {
        SubmissionStatus::Rejected => rejection_reason,
        _ => None,
    };
    sqlx::query(
        "UPDATE submissions SET status = ?, reviewed_at = ?, reviewed_by = ?, rejection_reason = ? \
         WHERE id = ?",
    )
    .bind(next.as_str())
    .bind(reviewed_at)
    .bind(reviewer)
    .bind(reason)
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if next == SubmissionStatus::Approved {
        let new_item = NewContentItem {
            title: submission.title.clone(),
            description: submission.description.clone(),
            thumbnail_url: None,
            content_url: Some(submission.content_url.clone()),
            platform: submission.platform,
            author_name: Some(submission.submitter_name.clone()),
            author_url: None,
            tags: submission.tags.clone(),
            score: DEFAULT_SUBMISSION_SCORE,
            published_at: reviewed_at,
            curated_by: Some(reviewer.to_string()),
        };
        insert_content_item_with(&mut *tx, &new_item).await?;
    }

    tx.commit().await?;

    submission.status = next;
    submission.reviewed_at = Some(reviewed_at);
    submission.reviewed_by = Some(reviewer.to_string());
    submission.rejection_reason = reason.map(str::to_string);
    Ok(submission)
}

fn curation_from_row(row: &SqliteRow) -> Result<DailyCuration, AppError> {
    let top10_json: String = row.try_get("top10_ids")?;
    let top10_ids: Vec<String> = serde_json::from_str(&top10_json).unwrap_or_default();
    Ok(DailyCuration {
        date: row.try_get("date")?,
        award_pick_id: row.try_get("award_pick_id")?,
        top10_ids,
    })
}

#[instrument(skip_all)]
pub async fn find_daily_curation(
    pool: &Pool,
    date: NaiveDate,
) -> Result<Option<DailyCuration>, AppError> {
    let row = sqlx::query("SELECT date, award_pick_id, top10_ids FROM daily_curations WHERE date = ?")
        .bind(date)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(curation_from_row).transpose()
}

/// Insert-or-replace keyed by date. Concurrent first computations for the
/// same day both land here; last write wins.
#[instrument(skip_all)]
pub async fn upsert_daily_curation(
    pool: &Pool,
    date: NaiveDate,
    award_pick_id: Option<&str>,
    top10_ids: &[String],
) -> Result<DailyCuration, AppError> {
    let top10_json = serde_json::to_string(top10_ids)
        .map_err(|e| AppError::Validation(format!("unserializable top10 ids: {e}")))?;
    sqlx::query(
        "INSERT INTO daily_curations (date, award_pick_id, top10_ids) VALUES (?, ?, ?) \
         ON CONFLICT(date) DO UPDATE SET \
            award_pick_id = excluded.award_pick_id, \
            top10_ids = excluded.top10_ids, \
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(date)
    .bind(award_pick_id)
    .bind(&top10_json)
    .execute(pool)
    .await?;

    Ok(DailyCuration {
        date,
        award_pick_id: award_pick_id.map(str::to_string),
        top10_ids: top10_ids.to_vec(),
    })
}

/// Admin award override: replaces only the award pick, keeping whatever
/// top-10 list the date already has.
#[instrument(skip_all)]
pub async fn upsert_award_pick(
    pool: &Pool,
    date: NaiveDate,
    item_id: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO daily_curations (date, award_pick_id, top10_ids) VALUES (?, ?, '[]') \
         ON CONFLICT(date) DO UPDATE SET \
            award_pick_id = excluded.award_pick_id, \
            updated_at = CURRENT_TIMESTAMP",
    )
    .bind(date)
    .bind(item_id)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn count_all_content_items(pool: &Pool) -> Result<i64, AppError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_items")
        .fetch_one(pool)
        .await?;
    Ok(n)
}

#[instrument(skip_all)]
pub async fn count_submissions_with_status(
    pool: &Pool,
    status: SubmissionStatus,
) -> Result<i64, AppError> {
    let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM submissions WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Item counts grouped by platform, largest first. Archived items are
/// included; the dashboard reports the whole corpus.
#[instrument(skip_all)]
pub async fn platform_breakdown(pool: &Pool) -> Result<Vec<(Platform, i64)>, AppError> {
    let rows = sqlx::query(
        "SELECT platform, COUNT(*) AS n FROM content_items GROUP BY platform ORDER BY n DESC",
    )
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            let platform_str: String = row.try_get("platform")?;
            let platform = Platform::parse(&platform_str).ok_or_else(|| {
                AppError::Validation(format!("unknown platform in store: {platform_str}"))
            })?;
            Ok((platform, row.try_get("n")?))
        })
        .collect()
}

/// Per-day ingestion counts since `since`, oldest day first.
#[instrument(skip_all)]
pub async fn daily_scrape_counts(
    pool: &Pool,
    since: DateTime<Utc>,
) -> Result<Vec<(String, i64)>, AppError> {
    let rows = sqlx::query(
        "SELECT DATE(scraped_at) AS day, COUNT(*) AS n FROM content_items \
         WHERE scraped_at >= ? GROUP BY day ORDER BY day",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| Ok((row.try_get("day")?, row.try_get("n")?)))
        .collect()
}

/// Per-month (`YYYY-MM`) ingestion counts since `since`, oldest first.
#[instrument(skip_all)]
pub async fn monthly_scrape_counts(
    pool: &Pool,
    since: DateTime<Utc>,
) -> Result<Vec<(String, i64)>, AppError> {
    let rows = sqlx::query(
        "SELECT strftime('%Y-%m', scraped_at) AS month, COUNT(*) AS n FROM content_items \
         WHERE scraped_at >= ? GROUP BY month ORDER BY month",
    )
    .bind(since)
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| Ok((row.try_get("month")?, row.try_get("n")?)))
        .collect()
}

#[instrument(skip_all)]
pub async fn count_items_scraped_between(
    pool: &Pool,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<i64, AppError> {
    let n: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM content_items WHERE scraped_at >= ? AND scraped_at < ?",
    )
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;
    Ok(n)
}

/// Most recently ingested items, archived included (admin dashboard view).
#[instrument(skip_all)]
pub async fn recent_content_items(pool: &Pool, limit: i64) -> Result<Vec<ContentItem>, AppError> {
    let rows = sqlx::query("SELECT * FROM content_items ORDER BY scraped_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(item_from_row).collect()
}

#[instrument(skip_all)]
pub async fn recent_daily_curations(
    pool: &Pool,
    limit: i64,
) -> Result<Vec<DailyCuration>, AppError> {
    let rows = sqlx::query(
        "SELECT date, award_pick_id, top10_ids FROM daily_curations ORDER BY date DESC LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(curation_from_row).collect()
}
