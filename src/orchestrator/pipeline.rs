//! 导入流水线 - 编排层
//!
//! ## 职责
//!
//! 1. **同步校验**：上传不合法时立即返回，不创建任务
//! 2. **创建任务**：持久化 processing 任务和来源记录
//! 3. **后台执行**：用 `tokio::spawn` 运行 [`ImportFlow`]，调用方立即拿到任务 ID
//! 4. **兜底**：流程因存储故障中断或 panic 时，尽量把任务置为 failed

use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{ImportError, ImportResult};
use crate::infrastructure::{CatalogStore, JobStore, SqliteCatalog, SqliteJobStore};
use crate::models::{ImportJob, JobStatusView};
use crate::services::{
    validate_upload, ContentExtractor, LlmContentExtractor, LopdfTextExtractor, ReviewService,
    TextExtractor, UploadLimits, UploadRequest, ValidatedUpload,
};
use crate::workflow::{ImportCtx, ImportFlow, Stage, StageOutcome};

/// 后台任务句柄
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: String,
    task: JoinHandle<StageOutcome>,
}

impl JobHandle {
    /// 等待流程结束
    pub async fn wait(self) -> ImportResult<StageOutcome> {
        self.task
            .await
            .map_err(|e| ImportError::Internal(format!("import task aborted: {}", e)))
    }
}

/// 导入流水线
#[derive(Clone)]
pub struct ImportPipeline {
    jobs: Arc<dyn JobStore>,
    catalog: Arc<dyn CatalogStore>,
    flow: Arc<ImportFlow>,
    limits: UploadLimits,
}

impl ImportPipeline {
    /// 注入存储与提取能力
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalog: Arc<dyn CatalogStore>,
        text_extractor: Arc<dyn TextExtractor>,
        content_extractor: Arc<dyn ContentExtractor>,
        limits: UploadLimits,
        enforce_page_limit: bool,
    ) -> Self {
        let flow = ImportFlow::new(
            jobs.clone(),
            text_extractor,
            content_extractor,
            limits,
            enforce_page_limit,
        );
        Self {
            jobs,
            catalog,
            flow: Arc::new(flow),
            limits,
        }
    }

    /// 按配置组装生产环境的流水线（SQLite + lopdf + LLM）
    pub fn from_config(config: &Config, pool: SqlitePool) -> Self {
        Self::new(
            Arc::new(SqliteJobStore::new(pool.clone())),
            Arc::new(SqliteCatalog::new(pool)),
            Arc::new(LopdfTextExtractor::new()),
            Arc::new(LlmContentExtractor::new(config)),
            UploadLimits::from_config(config),
            config.enforce_page_limit_after_extraction,
        )
    }

    /// 共享同一组存储的审核提交服务
    pub fn review_service(&self) -> ReviewService {
        ReviewService::new(self.jobs.clone(), self.catalog.clone())
    }

    /// 提交上传
    ///
    /// 校验失败直接返回 `ImportError::Validation`，不创建任务。
    /// 成功时任务已持久化为 processing，提取在后台进行。
    pub async fn submit(&self, request: UploadRequest) -> ImportResult<JobHandle> {
        let upload = validate_upload(request, &self.limits).map_err(|e| {
            info!("🚫 上传被拒绝: {}", e);
            e
        })?;

        let job = ImportJob::new(upload.source.clone());
        let ctx = ImportCtx::new(&job.id, &job.source.filename);

        self.jobs.create(&job).await?;
        if let Err(e) = self.catalog.register_source(&job.id, &job.source).await {
            error!("{} ❌ 来源记录写入失败: {}", ctx, e);
            mark_failed_best_effort(self.jobs.as_ref(), &ctx, &format!("Internal error: {}", e))
                .await;
            return Err(e.into());
        }

        info!(
            "{} 📥 任务已创建 ({} {} {})",
            ctx, job.source.school, job.source.year, job.source.exam_type
        );

        let task = tokio::spawn(supervise(self.flow.clone(), self.jobs.clone(), ctx, upload));

        Ok(JobHandle {
            job_id: job.id,
            task,
        })
    }

    /// 查询任务状态
    pub async fn job_status(&self, job_id: &str) -> ImportResult<JobStatusView> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| ImportError::job_not_found(job_id))?;
        Ok(JobStatusView::from(&job))
    }
}

/// 在独立任务中运行流程，并兜住 panic
async fn supervise(
    flow: Arc<ImportFlow>,
    jobs: Arc<dyn JobStore>,
    ctx: ImportCtx,
    upload: ValidatedUpload,
) -> StageOutcome {
    let inner = {
        let jobs = jobs.clone();
        let ctx = ctx.clone();
        tokio::spawn(async move { run_flow(&flow, jobs.as_ref(), &ctx, upload).await })
    };

    match inner.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{} ❌ 流程异常退出: {}", ctx, e);
            let message = format!("Internal error: import task aborted: {}", e);
            mark_failed_best_effort(jobs.as_ref(), &ctx, &message).await;
            StageOutcome::Failed {
                stage: Stage::Aborted,
                message,
            }
        }
    }
}

async fn run_flow(
    flow: &ImportFlow,
    jobs: &dyn JobStore,
    ctx: &ImportCtx,
    upload: ValidatedUpload,
) -> StageOutcome {
    match flow.run(ctx, &upload.source, &upload.bytes).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("{} ❌ 流程中断: {}", ctx, e);
            let message = format!("Internal error: {}", e);
            mark_failed_best_effort(jobs, ctx, &message).await;
            StageOutcome::Failed {
                stage: Stage::Storage,
                message,
            }
        }
    }
}

async fn mark_failed_best_effort(jobs: &dyn JobStore, ctx: &ImportCtx, message: &str) {
    if let Err(e) = jobs.mark_failed(&ctx.job_id, message).await {
        error!("{} ❌ 无法写入失败状态: {}", ctx, e);
    }
}
