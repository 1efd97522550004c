//! 导入任务上下文
//!
//! 封装"我正在处理哪个任务的哪份文件"这一信息

use std::fmt::Display;

/// 导入任务上下文（仅用于日志前缀）
#[derive(Debug, Clone)]
pub struct ImportCtx {
    /// 任务ID
    pub job_id: String,

    /// 上传文件名
    pub filename: String,
}

impl ImportCtx {
    pub fn new(job_id: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            filename: filename.into(),
        }
    }
}

impl Display for ImportCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[任务 {} 文件 {}]", self.job_id, self.filename)
    }
}
