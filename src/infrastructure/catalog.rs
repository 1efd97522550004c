//! 永久题库存储 - 基础设施层
//!
//! 保存审核后的题目与课程。每条记录以 `(job_id, position)` 为键，
//! 同一条目重复保存只会覆盖，不会产生重复行。

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePool;

use crate::error::StoreError;
use crate::models::{ExtractedLesson, ExtractedQuestion, SourceDescriptor};

/// 题库存储能力
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 创建任务对应的来源记录
    async fn register_source(&self, job_id: &str, source: &SourceDescriptor)
        -> Result<(), StoreError>;

    /// 任务是否有来源记录
    async fn has_source(&self, job_id: &str) -> Result<bool, StoreError>;

    /// 保存一道题目（考试元数据冗余写入每一行）
    async fn save_question(
        &self,
        job_id: &str,
        position: usize,
        source: &SourceDescriptor,
        question: &ExtractedQuestion,
    ) -> Result<(), StoreError>;

    /// 保存一节课程
    async fn save_lesson(
        &self,
        job_id: &str,
        position: usize,
        lesson: &ExtractedLesson,
    ) -> Result<(), StoreError>;

    /// 任务已保存的题目数
    async fn count_questions(&self, job_id: &str) -> Result<u32, StoreError>;

    /// 任务已保存的课程数
    async fn count_lessons(&self, job_id: &str) -> Result<u32, StoreError>;
}

/// 基于 SQLite 的题库
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn count(&self, table: &str, job_id: &str) -> Result<u32, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE job_id = ?", table);
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(job_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u32)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn register_source(
        &self,
        job_id: &str,
        source: &SourceDescriptor,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO exam_sources (job_id, filename, school, year, exam_type, paper_number, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id) DO NOTHING
            "#,
        )
        .bind(job_id)
        .bind(&source.filename)
        .bind(&source.school)
        .bind(source.year)
        .bind(source.exam_type.as_str())
        .bind(source.paper_number.map(i64::from))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_source(&self, job_id: &str) -> Result<bool, StoreError> {
        let found: Option<String> =
            sqlx::query_scalar("SELECT job_id FROM exam_sources WHERE job_id = ?")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }

    async fn save_question(
        &self,
        job_id: &str,
        position: usize,
        source: &SourceDescriptor,
        question: &ExtractedQuestion,
    ) -> Result<(), StoreError> {
        let hints_json = question
            .hints
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO catalog_questions (
                job_id, position, content, solution, answer, hints_json, topic,
                difficulty, confidence, question_num, school, year, exam_type,
                paper_number, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id, position) DO UPDATE SET
                content = excluded.content,
                solution = excluded.solution,
                answer = excluded.answer,
                hints_json = excluded.hints_json,
                topic = excluded.topic,
                difficulty = excluded.difficulty,
                confidence = excluded.confidence,
                question_num = excluded.question_num
            "#,
        )
        .bind(job_id)
        .bind(position as i64)
        .bind(&question.content)
        .bind(&question.solution)
        .bind(&question.answer)
        .bind(hints_json)
        .bind(&question.topic)
        .bind(&question.difficulty)
        .bind(f64::from(question.confidence.clamp(0.0, 1.0)))
        .bind(i64::from(question.question_num))
        .bind(&source.school)
        .bind(source.year)
        .bind(source.exam_type.as_str())
        .bind(source.paper_number.map(i64::from))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_lesson(
        &self,
        job_id: &str,
        position: usize,
        lesson: &ExtractedLesson,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO catalog_lessons (
                job_id, position, title, content, content_type, topic, lesson_order, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(job_id, position) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                content_type = excluded.content_type,
                topic = excluded.topic,
                lesson_order = excluded.lesson_order
            "#,
        )
        .bind(job_id)
        .bind(position as i64)
        .bind(&lesson.title)
        .bind(&lesson.content)
        .bind(&lesson.content_type)
        .bind(&lesson.topic)
        .bind(i64::from(lesson.order))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_questions(&self, job_id: &str) -> Result<u32, StoreError> {
        self.count("catalog_questions", job_id).await
    }

    async fn count_lessons(&self, job_id: &str) -> Result<u32, StoreError> {
        self.count("catalog_lessons", job_id).await
    }
}
