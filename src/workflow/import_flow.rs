//! 导入处理流程 - 流程层
//!
//! 核心职责：定义"一次上传"从字节到待审核的完整处理流程
//!
//! 流程顺序（严格串行，每一步先持久化再继续）：
//! 1. 文本提取 → 写入页数
//! 2. 页数上限复查（可配置）
//! 3. AI 内容提取
//! 4. 写入 ready_for_review（数量 + payload）
//!
//! 任一阶段失败都会立即把任务置为 failed，并返回 [`StageOutcome::Failed`]，
//! 阶段错误不会继续向上抛出。

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{ImportError, ImportResult};
use crate::infrastructure::JobStore;
use crate::models::{ExamMetadata, SourceDescriptor};
use crate::services::validation::{check_limits, UploadLimits};
use crate::services::{ContentExtractor, TextExtractor};
use crate::workflow::import_ctx::ImportCtx;

/// 失败发生的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TextExtraction,
    PageLimit,
    AiExtraction,
    EmptyResult,
    /// 阶段结果无法写入存储
    Storage,
    /// 后台任务异常退出（panic 或被取消）
    Aborted,
}

/// 流程结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// 提取成功，等待审核
    ReadyForReview { questions: usize, lessons: usize },
    /// 某个阶段失败，任务已置为 failed
    Failed { stage: Stage, message: String },
}

/// 导入处理流程
///
/// - 只依赖业务能力（services）和任务存储
/// - 不做校验以外的业务判断，不持有上传字节
pub struct ImportFlow {
    jobs: Arc<dyn JobStore>,
    text_extractor: Arc<dyn TextExtractor>,
    content_extractor: Arc<dyn ContentExtractor>,
    limits: UploadLimits,
    enforce_page_limit: bool,
}

impl ImportFlow {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        text_extractor: Arc<dyn TextExtractor>,
        content_extractor: Arc<dyn ContentExtractor>,
        limits: UploadLimits,
        enforce_page_limit: bool,
    ) -> Self {
        Self {
            jobs,
            text_extractor,
            content_extractor,
            limits,
            enforce_page_limit,
        }
    }

    /// 执行流程
    ///
    /// 返回 `Err` 只代表存储故障（阶段结果无法写入），阶段失败以 `Ok(Failed)` 返回。
    pub async fn run(
        &self,
        ctx: &ImportCtx,
        source: &SourceDescriptor,
        bytes: &[u8],
    ) -> ImportResult<StageOutcome> {
        // ========== 阶段 1: 文本提取 ==========
        info!("{} 📄 开始文本提取 ({} 字节)", ctx, bytes.len());

        let text = match self.text_extractor.extract(bytes).await {
            Ok(text) => text,
            Err(e) => return self.fail(ctx, Stage::TextExtraction, e.into()).await,
        };

        info!(
            "{} ✓ 文本提取完成: {} 页, {} 字符",
            ctx,
            text.page_count,
            text.text.chars().count()
        );
        self.jobs
            .record_page_count(&ctx.job_id, text.page_count)
            .await?;

        // ========== 阶段 2: 页数复查 ==========
        if self.enforce_page_limit {
            if let Err(e) = check_limits(bytes.len(), Some(text.page_count), &self.limits) {
                return self.fail(ctx, Stage::PageLimit, e.into()).await;
            }
        }

        // ========== 阶段 3: AI 提取 ==========
        info!("{} 🤖 开始 AI 内容提取...", ctx);

        let metadata = ExamMetadata::from_source(source, Some(text.page_count));
        let content = match self.content_extractor.extract(&text.text, &metadata).await {
            Ok(content) => content,
            Err(e) => return self.fail(ctx, Stage::AiExtraction, e.into()).await,
        };

        if content.is_empty() {
            return self
                .fail(ctx, Stage::EmptyResult, ImportError::EmptyResult)
                .await;
        }

        // ========== 阶段 4: 等待审核 ==========
        self.jobs
            .mark_ready_for_review(&ctx.job_id, &content)
            .await?;

        info!(
            "{} ✅ 提取完成: {} 道题目, {} 节课程 (平均置信度 {})",
            ctx,
            content.questions.len(),
            content.lessons.len(),
            content
                .mean_confidence()
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "-".to_string())
        );

        Ok(StageOutcome::ReadyForReview {
            questions: content.questions.len(),
            lessons: content.lessons.len(),
        })
    }

    /// 阶段失败：写入 failed 并返回结果
    async fn fail(
        &self,
        ctx: &ImportCtx,
        stage: Stage,
        err: ImportError,
    ) -> ImportResult<StageOutcome> {
        let message = err.to_string();
        match stage {
            Stage::EmptyResult | Stage::PageLimit => warn!("{} ⚠️ {}", ctx, message),
            _ => error!("{} ❌ {}", ctx, message),
        }

        self.jobs.mark_failed(&ctx.job_id, &message).await?;
        Ok(StageOutcome::Failed { stage, message })
    }
}
