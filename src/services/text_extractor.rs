//! PDF 文本提取 - 业务能力层
//!
//! 只负责"字节 → 规范化文本 + 页数"，不关心任务状态

use async_trait::async_trait;
use lopdf::{Document, Object};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

use crate::error::ExtractionError;

/// 文本提取结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedText {
    /// 规范化后的全文
    pub text: String,
    /// 每页文本（按页序）
    pub pages: Vec<String>,
    pub page_count: u32,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// 文本提取能力
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError>;
}

/// 基于 lopdf 的文本提取器
#[derive(Debug, Clone, Default)]
pub struct LopdfTextExtractor;

impl LopdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TextExtractor for LopdfTextExtractor {
    async fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
        let data = bytes.to_vec();

        // PDF 解析是 CPU 密集型操作，放到阻塞线程池
        tokio::task::spawn_blocking(move || extract_from_bytes(&data))
            .await
            .map_err(|e| ExtractionError::Worker(e.to_string()))?
    }
}

fn extract_from_bytes(bytes: &[u8]) -> Result<ExtractedText, ExtractionError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let mut page_numbers: Vec<u32> = doc.get_pages().keys().cloned().collect();
    page_numbers.sort();
    if page_numbers.is_empty() {
        return Err(ExtractionError::NoPages);
    }

    let pages: Vec<String> = page_numbers
        .iter()
        .map(|n| normalize_text(&doc.extract_text(&[*n]).unwrap_or_default()))
        .collect();

    let text = normalize_text(&pages.join("\n\n"));
    let (title, author) = document_info(&doc);

    debug!(
        "提取了 {} 页, {} 字符",
        page_numbers.len(),
        text.chars().count()
    );

    Ok(ExtractedText {
        text,
        page_count: page_numbers.len() as u32,
        pages,
        title,
        author,
    })
}

/// 从 Info 字典读取标题与作者
fn document_info(doc: &Document) -> (Option<String>, Option<String>) {
    let info = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_object(*id).ok(),
        Ok(obj) => Some(obj),
        Err(_) => None,
    };
    let Some(Object::Dictionary(dict)) = info else {
        return (None, None);
    };

    let read = |key: &[u8]| match dict.get(key) {
        Ok(Object::String(bytes, _)) => {
            let value = normalize_text(&String::from_utf8_lossy(bytes));
            (!value.is_empty()).then_some(value)
        }
        _ => None,
    };

    (read(b"Title"), read(b"Author"))
}

static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}\u{2000}-\u{200A}\u{3000}]+").unwrap());
static SPACES_AROUND_NEWLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" ?\n ?").unwrap());
static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

/// 文本规范化
///
/// - 弯引号、破折号、省略号替换为 ASCII
/// - 去掉不可打印控制字符（保留换行和制表）和零宽空格
/// - 连续水平空白折叠为一个空格
/// - 3 个及以上换行折叠为 2 个
/// - 首尾去空白
pub fn normalize_text(raw: &str) -> String {
    let mut text = String::with_capacity(raw.len());
    for c in raw.replace("\r\n", "\n").replace('\r', "\n").chars() {
        match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => text.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => text.push('"'),
            '\u{2013}' | '\u{2014}' | '\u{2015}' | '\u{2212}' => text.push('-'),
            '\u{2026}' => text.push_str("..."),
            '\u{200B}' | '\u{FEFF}' => {}
            '\n' | '\t' => text.push(c),
            c if c.is_control() => {}
            c => text.push(c),
        }
    }

    let text = HORIZONTAL_WS.replace_all(&text, " ");
    let text = SPACES_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = EXCESS_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}
