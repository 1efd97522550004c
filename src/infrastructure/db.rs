//! SQLite 连接池与建表

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::StoreError;

/// 连接数据库并执行建表
///
/// 内存库每个连接各自独立，所以只开一个连接并保持常驻。
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let in_memory = database_url.contains(":memory:");

    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    run_migrations(&pool).await?;
    info!("✓ 数据库已就绪: {}", database_url);

    Ok(pool)
}

/// 建表（幂等）
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_jobs (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL
                CHECK (status IN ('processing', 'ready_for_review', 'completed', 'failed')),
            filename TEXT NOT NULL,
            school TEXT NOT NULL,
            year INTEGER NOT NULL,
            exam_type TEXT NOT NULL,
            paper_number INTEGER,
            page_count INTEGER,
            questions_count INTEGER NOT NULL DEFAULT 0,
            lessons_count INTEGER NOT NULL DEFAULT 0,
            error_message TEXT,
            extracted_payload TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS exam_sources (
            job_id TEXT PRIMARY KEY,
            filename TEXT NOT NULL,
            school TEXT NOT NULL,
            year INTEGER NOT NULL,
            exam_type TEXT NOT NULL,
            paper_number INTEGER,
            created_at TEXT NOT NULL,
            FOREIGN KEY (job_id) REFERENCES import_jobs(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            content TEXT NOT NULL,
            solution TEXT NOT NULL,
            answer TEXT NOT NULL,
            hints_json TEXT,
            topic TEXT NOT NULL,
            difficulty TEXT NOT NULL,
            confidence REAL NOT NULL,
            question_num INTEGER NOT NULL,
            school TEXT NOT NULL,
            year INTEGER NOT NULL,
            exam_type TEXT NOT NULL,
            paper_number INTEGER,
            created_at TEXT NOT NULL,
            UNIQUE (job_id, position),
            FOREIGN KEY (job_id) REFERENCES exam_sources(job_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS catalog_lessons (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            content_type TEXT NOT NULL,
            topic TEXT NOT NULL,
            lesson_order INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (job_id, position),
            FOREIGN KEY (job_id) REFERENCES exam_sources(job_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_jobs_status ON import_jobs(status)")
        .execute(pool)
        .await?;

    debug!("数据库表结构已检查");
    Ok(())
}
