use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use nc_core::{ArticleQuery, ArticleRecord, ArticleStorage, Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::StorageBackend;

const DEFAULT_DB_PATH: &str = "articles.db";

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL UNIQUE,
        source TEXT NOT NULL,
        title TEXT NOT NULL,
        content TEXT,
        description TEXT,
        image_url TEXT,
        category TEXT,
        reporter TEXT,
        published_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_source ON articles (source)",
    "CREATE INDEX IF NOT EXISTS idx_articles_published_at ON articles (published_at)",
    "CREATE INDEX IF NOT EXISTS idx_title_source ON articles (title, source)",
    "CREATE INDEX IF NOT EXISTS idx_published_source ON articles (published_at, source)",
    // Add future migrations here
];

// Fixed-width UTC text so lexical order matches chronological order.
fn to_db_time(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn from_db_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Database(format!("Failed to parse date '{}': {}", text, e)))
}

fn db_error(context: &'static str) -> impl Fn(sqlx::Error) -> Error {
    move |e| Error::Database(format!("{}: {}", context, e))
}

fn row_to_article(row: &SqliteRow) -> Result<ArticleRecord> {
    let get_time = |column: &str| -> Result<DateTime<Utc>> {
        let text: String = row.try_get(column).map_err(db_error("Failed to read row"))?;
        from_db_time(&text)
    };

    Ok(ArticleRecord {
        url: row.try_get("url").map_err(db_error("Failed to read row"))?,
        source: row.try_get("source").map_err(db_error("Failed to read row"))?,
        title: row.try_get("title").map_err(db_error("Failed to read row"))?,
        content: row.try_get("content").map_err(db_error("Failed to read row"))?,
        description: row.try_get("description").map_err(db_error("Failed to read row"))?,
        image_url: row.try_get("image_url").map_err(db_error("Failed to read row"))?,
        category: row.try_get("category").map_err(db_error("Failed to read row"))?,
        reporter: row.try_get("reporter").map_err(db_error("Failed to read row"))?,
        published_at: get_time("published_at")?,
        created_at: Some(get_time("created_at")?),
        updated_at: Some(get_time("updated_at")?),
    })
}

/// SQLite article table with a unique index on `url`.
///
/// Writes use `ON CONFLICT(url) DO UPDATE`, so two crawl runs racing on the
/// same URL still leave a single row behind.
pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be writable at ./articles.db"
    }

    async fn open(url: Option<&str>) -> Result<Self> {
        let path = url
            .map(|u| u.trim_start_matches("sqlite://").trim_start_matches("sqlite:"))
            .unwrap_or(DEFAULT_DB_PATH);
        Self::new_with_path(Path::new(path)).await
    }
}

impl SqliteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(db_error("Failed to connect to database"))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Database(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl ArticleStorage for SqliteStorage {
    async fn find_by_url(&self, url: &str) -> Result<Option<ArticleRecord>> {
        let row = sqlx::query("SELECT * FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&*self.pool)
            .await
            .map_err(db_error("Failed to look up article"))?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn upsert_batch(&self, records: &[ArticleRecord]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("Failed to begin transaction"))?;

        for article in records {
            let now = Utc::now();
            let created_at = article.created_at.unwrap_or(now);
            let updated_at = article.updated_at.unwrap_or(now);

            sqlx::query(
                r#"
                INSERT INTO articles
                (url, source, title, content, description, image_url, category, reporter,
                 published_at, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    title = excluded.title,
                    content = excluded.content,
                    description = excluded.description,
                    image_url = excluded.image_url,
                    category = excluded.category,
                    reporter = excluded.reporter,
                    published_at = excluded.published_at,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&article.url)
            .bind(&article.source)
            .bind(&article.title)
            .bind(article.content.as_deref())
            .bind(article.description.as_deref())
            .bind(article.image_url.as_deref())
            .bind(article.category.as_deref())
            .bind(article.reporter.as_deref())
            .bind(to_db_time(&article.published_at))
            .bind(to_db_time(&created_at))
            .bind(to_db_time(&updated_at))
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to store article"))?;
        }

        tx.commit().await.map_err(db_error("Failed to commit batch"))
    }

    async fn get_by_source(&self, source: &str) -> Result<Vec<ArticleRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM articles
            WHERE source = ?
            ORDER BY published_at DESC
            "#,
        )
        .bind(source)
        .fetch_all(&*self.pool)
        .await
        .map_err(db_error("Failed to get articles by source"))?;

        rows.iter().map(row_to_article).collect()
    }

    async fn search(&self, query: &ArticleQuery) -> Result<Vec<ArticleRecord>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM articles WHERE 1 = 1");

        if let Some(source) = &query.source {
            builder.push(" AND source = ").push_bind(source.clone());
        }
        if let Some(category) = &query.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        // instr keeps `%` and `_` literal; lower() folds ASCII only, like ArticleQuery::matches
        if let Some(keyword) = &query.keyword {
            let needle = keyword.to_ascii_lowercase();
            builder
                .push(" AND (instr(lower(title), ")
                .push_bind(needle.clone())
                .push(") > 0 OR instr(lower(content), ")
                .push_bind(needle)
                .push(") > 0)");
        }
        let (start, end) = query.window.utc_bounds();
        if let Some(start) = start {
            builder.push(" AND published_at >= ").push_bind(to_db_time(&start));
        }
        if let Some(end) = end {
            builder.push(" AND published_at < ").push_bind(to_db_time(&end));
        }

        builder.push(" ORDER BY published_at DESC, url ASC");
        builder
            .push(" LIMIT ")
            .push_bind(query.limit.map_or(-1, |l| l as i64))
            .push(" OFFSET ")
            .push_bind(query.offset as i64);

        let rows = builder
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(db_error("Failed to search articles"))?;

        rows.iter().map(row_to_article).collect()
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&*self.pool)
            .await
            .map_err(db_error("Failed to count articles"))?;
        Ok(count as u64)
    }
}
