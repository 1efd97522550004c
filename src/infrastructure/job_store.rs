//! 导入任务存储 - 基础设施层
//!
//! 任务记录是唯一的共享可变资源。每次迁移都是一条带 `WHERE status = ?`
//! 的比较并交换更新，迁移是否合法由 [`JobStatus::can_transition_to`] 决定。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteQueryResult, SqliteRow};
use sqlx::Row;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{ExamType, ExtractedContent, ImportJob, JobStatus, SourceDescriptor};

/// 任务存储能力
#[async_trait]
pub trait JobStore: Send + Sync {
    /// 持久化新建的任务
    async fn create(&self, job: &ImportJob) -> Result<(), StoreError>;

    /// 按 id 读取任务
    async fn get(&self, job_id: &str) -> Result<Option<ImportJob>, StoreError>;

    /// 文本提取成功后写入页数（状态保持 `processing`）
    async fn record_page_count(&self, job_id: &str, page_count: u32) -> Result<(), StoreError>;

    /// `processing → failed`
    async fn mark_failed(&self, job_id: &str, error_message: &str) -> Result<(), StoreError>;

    /// `processing → ready_for_review`，写入提取数量与 payload
    async fn mark_ready_for_review(
        &self,
        job_id: &str,
        payload: &ExtractedContent,
    ) -> Result<(), StoreError>;

    /// `ready_for_review → completed`，写入保存数量、完成时间并清空 payload
    async fn mark_completed(
        &self,
        job_id: &str,
        saved_questions: u32,
        saved_lessons: u32,
    ) -> Result<ImportJob, StoreError>;
}

/// 基于 SQLite 的任务存储
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn current_status(&self, job_id: &str) -> Result<JobStatus, StoreError> {
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM import_jobs WHERE id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;

        let status = status.ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))?;
        parse_status(job_id, &status)
    }

    /// 迁移前检查，返回当前状态
    async fn guard(&self, job_id: &str, to: JobStatus) -> Result<JobStatus, StoreError> {
        let from = self.current_status(job_id).await?;
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition {
                job_id: job_id.to_string(),
                from,
                to,
            });
        }
        Ok(from)
    }

    /// 比较并交换失败时（其他写入者抢先迁移）报告实际状态
    async fn ensure_applied(
        &self,
        result: SqliteQueryResult,
        job_id: &str,
        to: JobStatus,
    ) -> Result<(), StoreError> {
        if result.rows_affected() == 1 {
            return Ok(());
        }
        let from = self.current_status(job_id).await?;
        Err(StoreError::IllegalTransition {
            job_id: job_id.to_string(),
            from,
            to,
        })
    }

    async fn fetch(&self, job_id: &str) -> Result<ImportJob, StoreError> {
        self.get(job_id)
            .await?
            .ok_or_else(|| StoreError::JobNotFound(job_id.to_string()))
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, job: &ImportJob) -> Result<(), StoreError> {
        let payload = job
            .extracted_payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO import_jobs (
                id, status, filename, school, year, exam_type, paper_number,
                page_count, questions_count, lessons_count, error_message,
                extracted_payload, created_at, updated_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(&job.source.filename)
        .bind(&job.source.school)
        .bind(job.source.year)
        .bind(job.source.exam_type.as_str())
        .bind(job.source.paper_number.map(i64::from))
        .bind(job.page_count.map(i64::from))
        .bind(i64::from(job.questions_count))
        .bind(i64::from(job.lessons_count))
        .bind(&job.error_message)
        .bind(payload)
        .bind(job.created_at.to_rfc3339())
        .bind(job.updated_at.to_rfc3339())
        .bind(job.completed_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        debug!("任务已创建: {}", job.id);
        Ok(())
    }

    async fn get(&self, job_id: &str) -> Result<Option<ImportJob>, StoreError> {
        let row = sqlx::query("SELECT * FROM import_jobs WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let job = row_to_job(&row)?;
        let violations = job.invariant_violations();
        if !violations.is_empty() {
            warn!("任务 {} 记录不一致: {:?}", job.id, violations);
        }
        Ok(Some(job))
    }

    async fn record_page_count(&self, job_id: &str, page_count: u32) -> Result<(), StoreError> {
        let from = self.guard(job_id, JobStatus::Processing).await?;

        let result = sqlx::query(
            "UPDATE import_jobs SET page_count = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(i64::from(page_count))
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        self.ensure_applied(result, job_id, JobStatus::Processing).await
    }

    async fn mark_failed(&self, job_id: &str, error_message: &str) -> Result<(), StoreError> {
        let from = self.guard(job_id, JobStatus::Failed).await?;

        // failed 状态必须带非空错误信息
        let message = if error_message.trim().is_empty() {
            "Unknown error"
        } else {
            error_message
        };

        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = ?, error_message = ?, extracted_payload = NULL, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(JobStatus::Failed.as_str())
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        self.ensure_applied(result, job_id, JobStatus::Failed).await
    }

    async fn mark_ready_for_review(
        &self,
        job_id: &str,
        payload: &ExtractedContent,
    ) -> Result<(), StoreError> {
        let from = self.guard(job_id, JobStatus::ReadyForReview).await?;
        let payload_json = serde_json::to_string(payload)?;

        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = ?, questions_count = ?, lessons_count = ?,
                extracted_payload = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(JobStatus::ReadyForReview.as_str())
        .bind(payload.questions.len() as i64)
        .bind(payload.lessons.len() as i64)
        .bind(payload_json)
        .bind(Utc::now().to_rfc3339())
        .bind(job_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        self.ensure_applied(result, job_id, JobStatus::ReadyForReview)
            .await
    }

    async fn mark_completed(
        &self,
        job_id: &str,
        saved_questions: u32,
        saved_lessons: u32,
    ) -> Result<ImportJob, StoreError> {
        let from = self.guard(job_id, JobStatus::Completed).await?;
        let now = Utc::now().to_rfc3339();

        // 状态、数量、完成时间和清空 payload 在同一条语句中完成
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET status = ?, questions_count = ?, lessons_count = ?,
                extracted_payload = NULL, completed_at = ?, updated_at = ?
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(JobStatus::Completed.as_str())
        .bind(i64::from(saved_questions))
        .bind(i64::from(saved_lessons))
        .bind(&now)
        .bind(&now)
        .bind(job_id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        self.ensure_applied(result, job_id, JobStatus::Completed)
            .await?;
        self.fetch(job_id).await
    }
}

// ========== 行映射 ==========

fn parse_status(job_id: &str, status: &str) -> Result<JobStatus, StoreError> {
    JobStatus::parse(status).ok_or_else(|| StoreError::CorruptRecord {
        id: job_id.to_string(),
        reason: format!("unknown status '{}'", status),
    })
}

fn parse_time(job_id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRecord {
            id: job_id.to_string(),
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn to_u32(job_id: &str, column: &str, value: i64) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::CorruptRecord {
        id: job_id.to_string(),
        reason: format!("{} out of range: {}", column, value),
    })
}

fn row_to_job(row: &SqliteRow) -> Result<ImportJob, StoreError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let exam_type: String = row.try_get("exam_type")?;
    let paper_number: Option<i64> = row.try_get("paper_number")?;
    let page_count: Option<i64> = row.try_get("page_count")?;
    let payload: Option<String> = row.try_get("extracted_payload")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let completed_at: Option<String> = row.try_get("completed_at")?;

    let exam_type = ExamType::parse(&exam_type).ok_or_else(|| StoreError::CorruptRecord {
        id: id.clone(),
        reason: format!("unknown exam type '{}'", exam_type),
    })?;

    let source = SourceDescriptor {
        filename: row.try_get("filename")?,
        school: row.try_get("school")?,
        year: row.try_get("year")?,
        exam_type,
        paper_number: paper_number
            .map(|n| to_u32(&id, "paper_number", n))
            .transpose()?,
    };

    Ok(ImportJob {
        status: parse_status(&id, &status)?,
        source,
        page_count: page_count
            .map(|n| to_u32(&id, "page_count", n))
            .transpose()?,
        questions_count: to_u32(&id, "questions_count", row.try_get("questions_count")?)?,
        lessons_count: to_u32(&id, "lessons_count", row.try_get("lessons_count")?)?,
        error_message: row.try_get("error_message")?,
        extracted_payload: payload
            .map(|json| serde_json::from_str(&json))
            .transpose()?,
        created_at: parse_time(&id, &created_at)?,
        updated_at: parse_time(&id, &updated_at)?,
        completed_at: completed_at
            .map(|t| parse_time(&id, &t))
            .transpose()?,
        id,
    })
}
