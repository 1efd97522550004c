//! 审核提交服务 - 业务能力层
//!
//! 读取待审核内容；把审核后的题目与课程逐条写入题库，单条失败不影响其余条目，
//! 全部尝试完成后把任务置为 completed。

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ImportError, ImportResult, PersistenceItemError, ValidationError};
use crate::infrastructure::{CatalogStore, JobStore};
use crate::models::{
    ExamMetadata, ExtractedContent, ExtractedLesson, ExtractedQuestion, ImportJob, JobStatus,
};
use crate::utils::logging::log_commit_stats;

/// 审核后提交的内容
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    #[serde(default)]
    pub questions: Vec<ExtractedQuestion>,
    #[serde(default)]
    pub lessons: Vec<ExtractedLesson>,
    /// 客户端回传的原始元数据，仅用于核对
    #[serde(default)]
    pub metadata: Option<ExamMetadata>,
}

/// 不做修改，按提取结果原样提交
impl From<ExtractedContent> for CommitRequest {
    fn from(content: ExtractedContent) -> Self {
        Self {
            questions: content.questions,
            lessons: content.lessons,
            metadata: Some(content.metadata),
        }
    }
}

/// 条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Question,
    Lesson,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Question => "question",
            ItemKind::Lesson => "lesson",
        }
    }
}

/// 单条保存结果
#[derive(Debug)]
pub struct ItemOutcome {
    pub kind: ItemKind,
    pub position: usize,
    pub result: Result<(), PersistenceItemError>,
}

/// 保存失败的条目（对外展示）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItem {
    pub kind: ItemKind,
    pub position: usize,
    pub message: String,
}

/// 提交结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResult {
    pub saved_questions: u32,
    pub saved_lessons: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_items: Vec<FailedItem>,
}

impl CommitResult {
    /// 由逐条结果汇总计数
    pub fn from_outcomes(outcomes: &[ItemOutcome]) -> Self {
        let saved = |kind: ItemKind| {
            outcomes
                .iter()
                .filter(|o| o.kind == kind && o.result.is_ok())
                .count() as u32
        };

        Self {
            saved_questions: saved(ItemKind::Question),
            saved_lessons: saved(ItemKind::Lesson),
            failed_items: outcomes
                .iter()
                .filter_map(|o| {
                    o.result.as_ref().err().map(|e| FailedItem {
                        kind: o.kind,
                        position: o.position,
                        message: e.to_string(),
                    })
                })
                .collect(),
        }
    }
}

/// 审核提交服务
#[derive(Clone)]
pub struct ReviewService {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogStore>,
}

impl ReviewService {
    pub fn new(jobs: Arc<dyn JobStore>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { jobs, catalog }
    }

    /// 读取待审核内容（不修改任务）
    pub async fn fetch_for_review(&self, job_id: &str) -> ImportResult<ExtractedContent> {
        let job = self.load_job(job_id).await?;

        if job.status != JobStatus::ReadyForReview {
            return Err(ImportError::state_mismatch(
                job_id,
                JobStatus::ReadyForReview,
                job.status,
            ));
        }

        match job.extracted_payload {
            Some(payload) if !payload.is_empty() => Ok(payload),
            _ => Err(ImportError::NotFound {
                entity: "extracted payload",
                id: job_id.to_string(),
            }),
        }
    }

    /// 提交审核结果
    ///
    /// 单条保存失败只记录日志并计为"未保存"；完成迁移在所有条目尝试后总会执行，
    /// 即使保存数为 0。
    pub async fn commit(&self, job_id: &str, request: CommitRequest) -> ImportResult<CommitResult> {
        let job = self.load_job(job_id).await?;
        let ctx = format!("[任务 {}]", job.id);

        if !self.catalog.has_source(job_id).await? {
            return Err(ImportError::NotFound {
                entity: "exam source",
                id: job_id.to_string(),
            });
        }
        if job.status != JobStatus::ReadyForReview {
            return Err(ImportError::state_mismatch(
                job_id,
                JobStatus::ReadyForReview,
                job.status,
            ));
        }

        check_item_counts(&job, &request)?;

        if let Some(metadata) = &request.metadata {
            if metadata.school != job.source.school || metadata.year != job.source.year {
                debug!("{} 提交的元数据与来源不一致，以来源记录为准", ctx);
            }
        }

        info!(
            "{} 💾 开始提交: {} 道题目, {} 节课程",
            ctx,
            request.questions.len(),
            request.lessons.len()
        );

        let outcomes = self.save_all(&ctx, &job, &request).await;
        let result = CommitResult::from_outcomes(&outcomes);

        self.jobs
            .mark_completed(job_id, result.saved_questions, result.saved_lessons)
            .await?;

        log_commit_stats(
            &ctx,
            result.saved_questions,
            request.questions.len(),
            result.saved_lessons,
            request.lessons.len(),
        );

        Ok(result)
    }

    /// 逐条尝试保存，收集每一条的结果
    async fn save_all(
        &self,
        ctx: &str,
        job: &ImportJob,
        request: &CommitRequest,
    ) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(request.questions.len() + request.lessons.len());

        for (position, question) in request.questions.iter().enumerate() {
            let result = self
                .catalog
                .save_question(&job.id, position, &job.source, question)
                .await
                .map_err(|source| PersistenceItemError {
                    kind: ItemKind::Question.as_str(),
                    position,
                    source,
                });
            if let Err(e) = &result {
                warn!("{} ⚠️ {}", ctx, e);
            }
            outcomes.push(ItemOutcome {
                kind: ItemKind::Question,
                position,
                result,
            });
        }

        for (position, lesson) in request.lessons.iter().enumerate() {
            let result = self
                .catalog
                .save_lesson(&job.id, position, lesson)
                .await
                .map_err(|source| PersistenceItemError {
                    kind: ItemKind::Lesson.as_str(),
                    position,
                    source,
                });
            if let Err(e) = &result {
                warn!("{} ⚠️ {}", ctx, e);
            }
            outcomes.push(ItemOutcome {
                kind: ItemKind::Lesson,
                position,
                result,
            });
        }

        outcomes
    }

    async fn load_job(&self, job_id: &str) -> ImportResult<ImportJob> {
        self.jobs
            .get(job_id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(job_id))
    }
}

/// 提交数量不能超过提取数量
fn check_item_counts(job: &ImportJob, request: &CommitRequest) -> Result<(), ValidationError> {
    if request.questions.len() > job.questions_count as usize {
        return Err(ValidationError::TooManyItems {
            kind: "questions",
            submitted: request.questions.len(),
            found: job.questions_count,
        });
    }
    if request.lessons.len() > job.lessons_count as usize {
        return Err(ValidationError::TooManyItems {
            kind: "lessons",
            submitted: request.lessons.len(),
            found: job.lessons_count,
        });
    }
    Ok(())
}
