use crate::config::DatabaseConfig;
use crate::models::{ImageId, ImageRecord, ImageRow, NewImage, UserProfile};
use crate::session::Session;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Errors raised while reading from the catalog
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Catalog query failed: {0}")]
    Query(String),
}

/// Errors raised while writing image records
#[derive(Error, Debug)]
pub enum InsertError {
    #[error("Image URL must not be empty")]
    EmptyUrl,

    #[error("Failed to insert image record: {0}")]
    Query(String),
}

/// Which images a fetch returns
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImageFilter {
    /// Only the caller's own images
    #[serde(default)]
    pub owner_only: bool,
    /// Only starred images
    #[serde(default)]
    pub starred_only: bool,
    /// Case-insensitive substring of location or uploader name
    #[serde(default)]
    pub search: Option<String>,
}

impl ImageFilter {
    pub fn own() -> Self {
        Self {
            owner_only: true,
            ..Default::default()
        }
    }

    fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Ordering of fetched images
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSort {
    /// Newest creation time first
    #[default]
    Newest,
    /// Location ascending
    Location,
}

impl ImageSort {
    fn order_by(&self) -> &'static str {
        match self {
            ImageSort::Newest => " ORDER BY i.created_at DESC",
            ImageSort::Location => " ORDER BY i.location ASC NULLS LAST, i.created_at DESC",
        }
    }
}

/// Full fetch request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageQuery {
    pub filter: ImageFilter,
    pub sort: ImageSort,
    pub limit: Option<i64>,
}

/// Image repository gateway
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Fetch image records visible to the session
    async fn fetch(&self, session: &Session, query: &ImageQuery) -> Result<Vec<ImageRecord>, FetchError>;

    /// Record an uploaded image owned by the session's user
    async fn insert(&self, session: &Session, image: NewImage) -> Result<ImageId, InsertError>;

    /// Count images matching the filter
    async fn count(&self, session: &Session, filter: &ImageFilter) -> Result<i64, FetchError>;

    /// Profile of the session's user
    async fn profile(&self, session: &Session) -> Result<Option<UserProfile>, FetchError>;
}

const IMAGE_COLUMNS: &str = r#"
    SELECT i.id, i.url, i.location, i.created_at, i.user_id,
           i.is_starred, i.likes, i.comments,
           p.name AS profile_name, p.avatar_url AS profile_avatar_url
    FROM images i
    LEFT JOIN profiles p ON p.id = i.user_id
    WHERE 1=1
"#;

const IMAGE_COUNT: &str = r#"
    SELECT COUNT(*)
    FROM images i
    LEFT JOIN profiles p ON p.id = i.user_id
    WHERE 1=1
"#;

/// Values bound to the placeholders produced by [`filter_sql`], in order
#[derive(Debug, Default, PartialEq)]
struct FilterBinds {
    owner: Option<Uuid>,
    pattern: Option<String>,
}

/// Append the WHERE conditions for a filter, returning the next free placeholder
fn filter_sql(sql: &mut String, filter: &ImageFilter, session: &Session) -> (FilterBinds, usize) {
    let mut binds = FilterBinds::default();
    let mut param_count = 0;

    if filter.owner_only {
        param_count += 1;
        sql.push_str(&format!(" AND i.user_id = ${}", param_count));
        binds.owner = Some(session.user_id);
    }

    if filter.starred_only {
        sql.push_str(" AND i.is_starred = TRUE");
    }

    if let Some(term) = filter.search_term() {
        param_count += 1;
        sql.push_str(&format!(
            " AND (i.location ILIKE ${n} OR p.name ILIKE ${n})",
            n = param_count
        ));
        binds.pattern = Some(format!("%{}%", escape_like(term)));
    }

    (binds, param_count + 1)
}

/// Escape LIKE wildcards so user input matches literally
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Image catalog backed by PostgreSQL
pub struct CatalogStore {
    pool: PgPool,
}

impl CatalogStore {
    /// Create a new catalog store with connection pool
    pub async fn new(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout())
            .idle_timeout(Some(config.idle_timeout()))
            .connect(&config.url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        info!("Connected to PostgreSQL database");

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run migrations")?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool (for health checks)
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ImageRepository for CatalogStore {
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    async fn fetch(&self, session: &Session, query: &ImageQuery) -> Result<Vec<ImageRecord>, FetchError> {
        let mut sql = String::from(IMAGE_COLUMNS);
        let (binds, next_param) = filter_sql(&mut sql, &query.filter, session);
        sql.push_str(query.sort.order_by());
        if query.limit.is_some() {
            sql.push_str(&format!(" LIMIT ${}", next_param));
        }

        let mut query_builder = sqlx::query_as::<_, ImageRow>(&sql);
        if let Some(owner) = binds.owner {
            query_builder = query_builder.bind(owner);
        }
        if let Some(ref pattern) = binds.pattern {
            query_builder = query_builder.bind(pattern);
        }
        if let Some(limit) = query.limit {
            query_builder = query_builder.bind(limit);
        }

        let rows = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FetchError::Query(e.to_string()))?;

        let total = rows.len();
        let images: Vec<ImageRecord> = rows
            .into_iter()
            .filter_map(|row| match ImageRecord::try_from(row) {
                Ok(image) => Some(image),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid image row");
                    metrics::counter!("gallery.images.invalid").increment(1);
                    None
                }
            })
            .collect();

        debug!(rows = total, images = images.len(), "Images fetched");
        metrics::counter!("gallery.images.fetched").increment(images.len() as u64);

        Ok(images)
    }

    #[instrument(skip(self, session, image), fields(user_id = %session.user_id))]
    async fn insert(&self, session: &Session, image: NewImage) -> Result<ImageId, InsertError> {
        if image.url.trim().is_empty() {
            return Err(InsertError::EmptyUrl);
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO images (id, url, location, user_id, is_starred, created_at)
            VALUES ($1, $2, $3, $4, FALSE, NOW())
            "#,
        )
        .bind(id)
        .bind(&image.url)
        .bind(&image.location)
        .bind(session.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| InsertError::Query(e.to_string()))?;

        debug!(image_id = %id, url = %image.url, "Image recorded");
        metrics::counter!("gallery.images.inserted").increment(1);

        Ok(ImageId::from(id))
    }

    async fn count(&self, session: &Session, filter: &ImageFilter) -> Result<i64, FetchError> {
        let mut sql = String::from(IMAGE_COUNT);
        let (binds, _) = filter_sql(&mut sql, filter, session);

        let mut query_builder = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(owner) = binds.owner {
            query_builder = query_builder.bind(owner);
        }
        if let Some(ref pattern) = binds.pattern {
            query_builder = query_builder.bind(pattern);
        }

        query_builder
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FetchError::Query(e.to_string()))
    }

    async fn profile(&self, session: &Session) -> Result<Option<UserProfile>, FetchError> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT id, username, avatar_url, subscription_tier, storage_used
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(session.user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FetchError::Query(e.to_string()))
    }
}
