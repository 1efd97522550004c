//! # Paper Import
//!
//! 试卷 PDF 导入流水线：文本提取 → AI 提取题目与课程 → 人工审核 → 写入题库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有数据库连接池，只暴露存储能力
//! - `JobStore` - 导入任务的持久化与状态迁移（比较并交换）
//! - `CatalogStore` - 来源记录与审核后的题目/课程
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心任务状态流转
//! - `validation` - 上传校验（文件、元数据、签名、大小、页数）
//! - `TextExtractor` - PDF 文本提取能力
//! - `ContentExtractor` - AI 内容提取能力
//! - `ReviewService` - 读取待审核内容、逐条提交
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次上传"的完整处理流程
//! - `ImportCtx` - 上下文封装（job_id + filename）
//! - `ImportFlow` - 流程编排（文本 → 页数复查 → AI → 待审核）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 同步校验、创建任务、后台运行流程
//!
//! ### 外围
//! - `server/` - axum HTTP API
//! - `clients/` - HTTP 客户端与状态轮询器
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod server;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{ImportClient, PollOutcome, StatusPoller, StatusSource};
pub use config::Config;
pub use error::{ImportError, ImportResult};
pub use models::{ImportJob, JobStatus, JobStatusView};
pub use orchestrator::{ImportPipeline, JobHandle};
pub use services::{CommitRequest, CommitResult, ReviewService, UploadRequest};
pub use workflow::{ImportCtx, ImportFlow, StageOutcome};
