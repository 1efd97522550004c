use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use paper_import::clients::{ImportClient, PollOutcome, StatusPoller, UploadForm};
use paper_import::config::Config;
use paper_import::server;
use paper_import::services::CommitRequest;
use paper_import::utils::logging;

#[derive(Parser)]
#[command(name = "paper-import", version, about = "试卷 PDF 导入服务")]
struct Cli {
    /// TOML 配置文件（可选，环境变量优先）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动 HTTP 服务
    Serve,
    /// 上传一份 PDF 并等待提取完成
    Upload {
        file: PathBuf,
        #[arg(long)]
        school: String,
        #[arg(long)]
        year: i32,
        #[arg(long)]
        exam_type: String,
        #[arg(long)]
        paper_number: Option<u32>,
        /// 服务地址，默认使用配置中的 bind_addr
        #[arg(long)]
        server: Option<String>,
    },
    /// 导出待审核内容（JSON）
    Review {
        job_id: String,
        /// 输出文件，缺省时打印到标准输出
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        server: Option<String>,
    },
    /// 提交审核后的内容（与 review 导出的 JSON 格式相同）
    Commit {
        job_id: String,
        file: PathBuf,
        #[arg(long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load(cli.config.as_deref())?;

    // 初始化日志
    logging::init(config.verbose_logging);

    match cli.command {
        Commands::Serve => server::run_server(&config).await,
        Commands::Upload {
            file,
            school,
            year,
            exam_type,
            paper_number,
            server,
        } => {
            let base_url = base_url(&config, server);
            let form = UploadForm {
                school,
                year,
                exam_type,
                paper_number,
            };
            upload_and_wait(&config, &base_url, &file, &form).await
        }
        Commands::Review {
            job_id,
            output,
            server,
        } => export_review(&base_url(&config, server), &job_id, output.as_deref()).await,
        Commands::Commit {
            job_id,
            file,
            server,
        } => commit_reviewed(&base_url(&config, server), &job_id, &file).await,
    }
}

fn base_url(config: &Config, server: Option<String>) -> String {
    server.unwrap_or_else(|| format!("http://{}", config.bind_addr))
}

async fn export_review(base_url: &str, job_id: &str, output: Option<&Path>) -> Result<()> {
    let content = ImportClient::new(base_url).fetch_review(job_id).await?;
    let json = serde_json::to_string_pretty(&content)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("无法写入文件: {}", path.display()))?;
            info!(
                "📝 已导出 {} 道题目, {} 节课程 -> {}",
                content.questions.len(),
                content.lessons.len(),
                path.display()
            );
        }
        None => println!("{}", json),
    }
    Ok(())
}

async fn commit_reviewed(base_url: &str, job_id: &str, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("无法读取文件: {}", file.display()))?;
    let request: CommitRequest = serde_json::from_str(&text)
        .with_context(|| format!("审核文件格式错误: {}", file.display()))?;

    let result = ImportClient::new(base_url).commit(job_id, &request).await?;
    info!(
        "✅ 已提交: {}/{} 道题目, {}/{} 节课程",
        result.saved_questions,
        request.questions.len(),
        result.saved_lessons,
        request.lessons.len()
    );
    for item in &result.failed_items {
        warn!("⚠️ {} #{} 保存失败: {}", item.kind.as_str(), item.position, item.message);
    }
    Ok(())
}

async fn upload_and_wait(
    config: &Config,
    base_url: &str,
    file: &Path,
    form: &UploadForm,
) -> Result<()> {
    let client = ImportClient::new(base_url);
    let submitted = client
        .upload(file, form)
        .await
        .with_context(|| format!("上传失败: {}", file.display()))?;
    info!("📥 任务已创建: {}", submitted.job_id);

    // Ctrl-C 时停止轮询
    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let poller = StatusPoller::from_config(config);
    let outcome = poller
        .poll(&client, &submitted.job_id, &cancel, |view| {
            if let Some(progress) = view.progress {
                info!("⏳ {} {}%", view.status, progress);
            }
        })
        .await;
    ctrl_c.abort();

    match outcome {
        PollOutcome::Ready(view) => {
            info!(
                "✅ 提取完成: {} 道题目, {} 节课程, 共 {} 页",
                view.questions_count,
                view.lessons_count,
                view.page_count.unwrap_or_default()
            );
            Ok(())
        }
        PollOutcome::Completed(_) => {
            info!("✅ 任务已提交");
            Ok(())
        }
        PollOutcome::Failed(view) => {
            let message = view.error_message.unwrap_or_default();
            error!("❌ 任务失败: {}", message);
            anyhow::bail!("任务 {} 失败: {}", submitted.job_id, message)
        }
        PollOutcome::TimedOut { attempts } => {
            anyhow::bail!("轮询超时: {} 次后任务仍在处理中", attempts)
        }
        PollOutcome::Unreachable {
            consecutive_errors,
            last_error,
        } => anyhow::bail!(
            "服务不可达: 连续 {} 次查询失败 ({})",
            consecutive_errors,
            last_error
        ),
        PollOutcome::Cancelled => {
            warn!("已取消，任务 {} 仍在服务端处理", submitted.job_id);
            Ok(())
        }
    }
}
