// Cache and blacklist persistence.
//
// The pipeline only sees the two traits; `PgStore` backs them with Postgres
// and `MemoryStore` (memory.rs) keeps everything in-process.

use std::collections::HashSet;

use async_trait::async_trait;
use autodidact_common::{
    canonical_or_raw, content_hash, BrokenLinkReport, CuratedStepResources, Resource, StepKey,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool};
use tracing::info;

use crate::curator::normalize_payload;
use crate::error::Result;

#[async_trait]
pub trait ResourceCache: Send + Sync {
    async fn get(&self, key: &StepKey) -> Result<Option<CuratedStepResources>>;

    async fn put(&self, key: &StepKey, bundle: &CuratedStepResources) -> Result<()>;

    /// Apply `edit` to the current bundle for `key` and persist it if `edit`
    /// returns true. Concurrent updates to the same key are serialized.
    /// Returns false when nothing is cached or nothing changed.
    async fn update(&self, key: &StepKey, edit: BundleEdit<'_>) -> Result<bool>;

    /// Drop `url` from the cached bundle for `key`.
    async fn remove_url(&self, key: &StepKey, url: &str) -> Result<bool> {
        self.update(key, &|bundle: &mut CuratedStepResources| bundle.remove_url(url))
            .await
    }
}

pub type BundleEdit<'a> = &'a (dyn Fn(&mut CuratedStepResources) -> bool + Send + Sync);

#[async_trait]
pub trait LinkBlacklist: Send + Sync {
    /// Canonical forms of every reported URL.
    async fn blocked_urls(&self) -> Result<HashSet<String>>;

    async fn report(&self, report: &BrokenLinkReport) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

pub struct PgStore {
    pool: PgPool,
    max_alternatives: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, max_alternatives: usize) -> Self {
        Self {
            pool,
            max_alternatives,
        }
    }

    /// Connect and run the embedded migrations.
    pub async fn connect(database_url: &str, max_alternatives: usize) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self::new(pool, max_alternatives);
        store.migrate().await?;
        info!("Postgres store ready");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // Rows written by older versions hold other payload shapes.
    fn row_to_bundle(&self, row: CacheRow) -> CuratedStepResources {
        let (step_title, discipline, resources, updated_at) = row;
        let mut bundle =
            normalize_payload(&step_title, &discipline, &resources, self.max_alternatives);
        bundle.generated_at = updated_at;
        bundle
    }
}

type CacheRow = (String, String, serde_json::Value, DateTime<Utc>);

async fn write_bundle<'e>(
    executor: impl PgExecutor<'e>,
    key: &StepKey,
    bundle: &CuratedStepResources,
) -> Result<()> {
    let resources = serde_json::to_value(bundle)?;
    let hash = content_hash(&serde_json::to_string(
        &bundle.all().collect::<Vec<&Resource>>(),
    )?);

    sqlx::query(
        r#"
        INSERT INTO step_resource_cache
            (step_key, discipline_key, step_title, discipline, resources,
             content_hash, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, now())
        ON CONFLICT (step_key, discipline_key) DO UPDATE SET
            step_title = EXCLUDED.step_title,
            discipline = EXCLUDED.discipline,
            resources = EXCLUDED.resources,
            content_hash = EXCLUDED.content_hash,
            updated_at = now()
        WHERE step_resource_cache.content_hash IS DISTINCT FROM EXCLUDED.content_hash
        "#,
    )
    .bind(&key.step_title)
    .bind(&key.discipline)
    .bind(&bundle.step_title)
    .bind(&bundle.discipline)
    .bind(&resources)
    .bind(&hash)
    .execute(executor)
    .await?;

    Ok(())
}

#[async_trait]
impl ResourceCache for PgStore {
    async fn get(&self, key: &StepKey) -> Result<Option<CuratedStepResources>> {
        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT step_title, discipline, resources, updated_at
            FROM step_resource_cache
            WHERE step_key = $1 AND discipline_key = $2
            "#,
        )
        .bind(&key.step_title)
        .bind(&key.discipline)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| self.row_to_bundle(row)))
    }

    /// Rewrites are skipped when the bundle's resources are unchanged.
    async fn put(&self, key: &StepKey, bundle: &CuratedStepResources) -> Result<()> {
        write_bundle(&self.pool, key, bundle).await
    }

    async fn update(&self, key: &StepKey, edit: BundleEdit<'_>) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, CacheRow>(
            r#"
            SELECT step_title, discipline, resources, updated_at
            FROM step_resource_cache
            WHERE step_key = $1 AND discipline_key = $2
            FOR UPDATE
            "#,
        )
        .bind(&key.step_title)
        .bind(&key.discipline)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(false);
        };
        let mut bundle = self.row_to_bundle(row);
        if !edit(&mut bundle) {
            return Ok(false);
        }
        bundle.from_cache = false;

        write_bundle(&mut *tx, key, &bundle).await?;
        tx.commit().await?;
        Ok(true)
    }
}

#[async_trait]
impl LinkBlacklist for PgStore {
    async fn blocked_urls(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT url_canonical FROM broken_link_reports",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().collect())
    }

    async fn report(&self, report: &BrokenLinkReport) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO broken_link_reports
                (url_canonical, url, step_title, discipline, reason)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(canonical_or_raw(&report.url))
        .bind(&report.url)
        .bind(&report.step_title)
        .bind(&report.discipline)
        .bind(&report.reason)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
