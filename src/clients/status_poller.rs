//! 任务状态轮询器（客户端）
//!
//! 按固定间隔查询任务状态，一次只有一个请求在途。两个计数器：
//! - `attempts`：已发出的查询总数（成功或失败都算），达到上限视为超时
//! - `consecutive_errors`：连续查询失败次数，任一成功即清零，达到上限视为不可达
//!
//! 成功与失败交替出现时不会触发不可达，但总次数上限仍然生效。

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{JobStatus, JobStatusView};
use crate::orchestrator::ImportPipeline;

/// 单次状态查询能力
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> anyhow::Result<JobStatusView>;
}

#[async_trait]
impl StatusSource for ImportPipeline {
    async fn fetch_status(&self, job_id: &str) -> anyhow::Result<JobStatusView> {
        Ok(self.job_status(job_id).await?)
    }
}

/// 轮询结束原因
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// 提取完成，等待审核
    Ready(JobStatusView),
    /// 已提交
    Completed(JobStatusView),
    /// 任务失败
    Failed(JobStatusView),
    /// 达到次数上限仍未进入终态
    TimedOut { attempts: u32 },
    /// 连续查询失败
    Unreachable {
        consecutive_errors: u32,
        last_error: String,
    },
    /// 调用方取消
    Cancelled,
}

/// 状态轮询器
#[derive(Debug, Clone, Copy)]
pub struct StatusPoller {
    interval: Duration,
    max_attempts: u32,
    max_consecutive_errors: u32,
}

impl Default for StatusPoller {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 120,
            max_consecutive_errors: 3,
        }
    }
}

impl StatusPoller {
    pub fn new(interval: Duration, max_attempts: u32, max_consecutive_errors: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
            max_consecutive_errors: max_consecutive_errors.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Duration::from_millis(config.poll_interval_ms),
            config.poll_max_attempts,
            config.poll_max_consecutive_errors,
        )
    }

    /// 轮询直到终态、超时、不可达或取消
    ///
    /// `on_progress` 在每次成功查询后调用。所有退出路径都会释放定时器。
    pub async fn poll<S, F>(
        &self,
        source: &S,
        job_id: &str,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> PollOutcome
    where
        S: StatusSource + ?Sized,
        F: FnMut(&JobStatusView),
    {
        let mut ticker = interval(self.interval);
        // 慢请求之后顺延，不补发
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts: u32 = 0;
        let mut consecutive_errors: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollOutcome::Cancelled,
                fetched = source.fetch_status(job_id) => fetched,
            };

            attempts += 1;

            match fetched {
                Ok(view) => {
                    consecutive_errors = 0;
                    on_progress(&view);

                    match view.status {
                        JobStatus::ReadyForReview => return PollOutcome::Ready(view),
                        JobStatus::Completed => return PollOutcome::Completed(view),
                        JobStatus::Failed => return PollOutcome::Failed(view),
                        JobStatus::Processing => {
                            debug!("任务 {} 处理中 ({}/{})", job_id, attempts, self.max_attempts);
                            if attempts >= self.max_attempts {
                                warn!("⏱️ 任务 {} 轮询超时 ({} 次)", job_id, attempts);
                                return PollOutcome::TimedOut { attempts };
                            }
                        }
                    }
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        "⚠️ 任务 {} 状态查询失败 ({}/{}): {}",
                        job_id, consecutive_errors, self.max_consecutive_errors, e
                    );
                    if consecutive_errors >= self.max_consecutive_errors {
                        return PollOutcome::Unreachable {
                            consecutive_errors,
                            last_error: e.to_string(),
                        };
                    }
                    if attempts >= self.max_attempts {
                        warn!("⏱️ 任务 {} 轮询超时 ({} 次)", job_id, attempts);
                        return PollOutcome::TimedOut { attempts };
                    }
                }
            }
        }
    }
}
