/// 日志工具模块
///
/// 提供日志初始化和格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化 tracing 订阅者
///
/// 优先使用 `RUST_LOG`，否则 verbose 时为 `debug`，默认 `info`。
/// 重复调用（例如多个测试）时忽略已初始化的错误。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录服务启动信息
///
/// # 参数
/// - `bind_addr`: 监听地址
/// - `database_url`: 数据库地址
pub fn log_startup(bind_addr: &str, database_url: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 试卷导入服务启动");
    info!("🌐 监听地址: {}", bind_addr);
    info!("🗄️ 数据库: {}", database_url);
    info!("{}", "=".repeat(60));
}

/// 记录提交统计
///
/// # 参数
/// - `ctx`: 任务上下文（日志前缀）
/// - `saved_questions` / `found_questions`: 题目保存数 / 提取数
/// - `saved_lessons` / `found_lessons`: 课程保存数 / 提取数
pub fn log_commit_stats(
    ctx: &impl std::fmt::Display,
    saved_questions: u32,
    found_questions: usize,
    saved_lessons: u32,
    found_lessons: usize,
) {
    info!("{} {}", ctx, "─".repeat(40));
    info!(
        "{} ✅ 题目: {}/{}  课程: {}/{}",
        ctx, saved_questions, found_questions, saved_lessons, found_lessons
    );
    info!("{} {}", ctx, "─".repeat(40));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("短文本", 10), "短文本");
        assert_eq!(truncate_text("abcdef", 3), "abc...");
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(false);
        init(true);
    }
}
