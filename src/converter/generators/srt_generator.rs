//! # SRT 字幕生成器
//!
//! 输出恒为逐行粒度：逐字文档在上层降级后到达这里，
//! 每行的单词列表按 `part` 标志合并为一个字符串。

use std::fmt::Write as _;

use tracing::warn;

use crate::converter::time::format_time;
use crate::converter::types::LyricDocument;
use crate::error::ConvertError;

/// 最后一行缺少结束时间时使用的兜底时长。
const DEFAULT_LAST_LINE_DURATION_MS: u64 = 10000;

/// 从规范文档生成 SRT 文本。块编号从 1 重新连续编号。
///
/// # Errors
///
/// 行缺少开始时间（只可能来自畸形的 JSON 输入）时返回
/// [`ConvertError::Internal`]。
pub fn generate_srt(document: &LyricDocument) -> Result<String, ConvertError> {
    let mut output = String::new();
    for (index, line) in document.lyrics.iter().enumerate() {
        let begin = line.begin.ok_or_else(|| {
            ConvertError::Internal(format!("第 {} 行缺少开始时间，无法写出 SRT", index + 1))
        })?;
        let end = line.end.unwrap_or_else(|| {
            warn!(
                "第 {} 行缺少结束时间，已按 {DEFAULT_LAST_LINE_DURATION_MS}ms 兜底",
                index + 1
            );
            begin + DEFAULT_LAST_LINE_DURATION_MS
        });

        writeln!(output, "{}", index + 1)?;
        writeln!(
            output,
            "{} --> {}",
            format_time(begin, 2, true),
            format_time(end, 2, true)
        )?;
        writeln!(output, "{}", line.plain_text())?;
        writeln!(output)?;
    }
    Ok(output)
}
