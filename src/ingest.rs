//! Invocation of the external scraper process.
//!
//! The scrapers themselves live outside this service. We run the configured
//! command, read one JSON object per stdout line, and insert anything new.
//! Lines that fail to parse or carry an unknown platform are skipped with a
//! warning rather than failing the whole run.
use crate::config::Scraper;
use crate::db::{self, Pool};
use crate::error::AppError;
use crate::model::{NewContentItem, Platform};
use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{info, instrument, warn};

/// One scraped record as emitted by the scraper subprocess.
#[derive(Debug, Deserialize)]
struct ScrapedItem {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    content_url: String,
    platform: String,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    author_url: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    score: f64,
    published_at: DateTime<Utc>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub inserted: u64,
    pub skipped: u64,
}

/// Run the scraper once and persist its output. Items whose content URL is
/// already stored are counted as skipped, keeping the run idempotent.
/// Subprocess failures surface as internal errors; database failures keep
/// their persistence classification.
#[instrument(skip_all)]
pub async fn run_scraper(cfg: &Scraper, pool: &Pool) -> Result<IngestReport, AppError> {
    let output = Command::new(&cfg.command)
        .args(&cfg.args)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to spawn scraper: {}", cfg.command))?;

    if !output.status.success() {
        return Err(anyhow!(
            "scraper exited with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )
        .into());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut report = IngestReport::default();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let scraped: ScrapedItem = match serde_json::from_str(line) {
            Ok(item) => item,
            Err(err) => {
                warn!(?err, "skipping unparseable scraper line");
                report.skipped += 1;
                continue;
            }
        };

        let Some(platform) = Platform::parse(&scraped.platform) else {
            warn!(platform = %scraped.platform, "skipping item from unknown platform");
            report.skipped += 1;
            continue;
        };

        if db::content_url_exists(pool, &scraped.content_url).await? {
            report.skipped += 1;
            continue;
        }

        let new_item = NewContentItem {
            title: scraped.title,
            description: scraped.description,
            thumbnail_url: scraped.thumbnail_url,
            content_url: Some(scraped.content_url),
            platform,
            author_name: scraped.author_name,
            author_url: scraped.author_url,
            tags: scraped.tags,
            score: scraped.score,
            published_at: scraped.published_at,
            curated_by: None,
        };
        db::create_content_item(pool, &new_item).await?;
        report.inserted += 1;
    }

    info!(
        inserted = report.inserted,
        skipped = report.skipped,
        "scraper run finished"
    );
    Ok(report)
}
