//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务的创建和后台调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 导入流水线
//! - 同步执行上传校验（失败不创建任务）
//! - 创建 processing 任务和来源记录
//! - 后台运行 ImportFlow，立即返回任务 ID
//! - 提供状态查询
//!
//! ## 层次关系
//!
//! ```text
//! pipeline (处理一次上传)
//!     ↓
//! workflow::ImportFlow (文本 → 页数复查 → AI → 待审核)
//!     ↓
//! services (能力层：validation / text / content / review)
//!     ↓
//! infrastructure (基础设施：JobStore / CatalogStore)
//! ```
//!
//! ## 设计原则
//!
//! 1. **向下依赖**：编排层 → workflow → services → infrastructure
//! 2. **无业务逻辑**：只做调度，不做具体业务判断
//! 3. **能力注入**：提取器和存储都以 trait 对象注入，测试时可替换

pub mod pipeline;

// 重新导出主要类型
pub use pipeline::{ImportPipeline, JobHandle};
