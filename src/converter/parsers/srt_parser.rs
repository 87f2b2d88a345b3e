//! # SRT 字幕解析器
//!
//! 按空行切分编号块，块内为 `begin --> end` 时间行加一行文本。
//! 解析结果恒为逐行计时。

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::converter::time::parse_time;
use crate::converter::types::{LineContent, LyricDocument, LyricFormat, LyricLine, TimingMode};
use crate::error::ConvertError;

/// 一个完整的字幕块：编号、时间行、首行文本。
static BLOCK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\n(\d{2}(?::\d{2})+,\d+) --> (\d{2}(?::\d{2})+,\d+)\n(.+)")
        .expect("未能编译 BLOCK_REGEX")
});

/// SRT 解析选项。
#[derive(Debug, Clone, Copy, Default)]
pub struct SrtParsingOptions {
    /// 为 `true` 时跳过无法识别的字幕块而不是报错。
    /// 默认严格：任何不符合块语法的内容都是解析错误。
    pub skip_invalid_blocks: bool,
}

/// 解析 SRT 内容为规范文档。
///
/// 块编号必须从 1 开始连续递增，缺号或重号都是解析错误。
///
/// # Errors
///
/// * [`ConvertError::ParseError`] - 块语法不符或编号不连续。
/// * [`ConvertError::InvalidTime`] - 时间戳无法解析。
pub fn parse_srt(
    content: &str,
    options: &SrtParsingOptions,
) -> Result<LyricDocument, ConvertError> {
    let normalized = content.replace("\r\n", "\n");
    let mut lines: Vec<LyricLine> = Vec::new();
    let mut last_index: u64 = 0;

    for block in normalized.split("\n\n") {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let Some(caps) = BLOCK_REGEX.captures(block) else {
            if options.skip_invalid_blocks {
                warn!("已跳过无法识别的字幕块: {:?}", block.lines().next().unwrap_or(""));
                continue;
            }
            return Err(ConvertError::ParseError {
                format: LyricFormat::Srt,
                reason: format!(
                    "无法识别的字幕块: {:?}",
                    block.lines().next().unwrap_or("")
                ),
            });
        };

        let index: u64 = caps[1].parse()?;
        if index != last_index + 1 {
            return Err(ConvertError::ParseError {
                format: LyricFormat::Srt,
                reason: format!("字幕块编号不连续: 预期 {}，实际 {index}", last_index + 1),
            });
        }
        last_index = index;

        lines.push(LyricLine {
            begin: Some(parse_time(&caps[2], true)?),
            end: Some(parse_time(&caps[3], true)?),
            agent: None,
            background: false,
            content: LineContent::Text(caps[4].to_string()),
        });
    }

    Ok(LyricDocument {
        timing: TimingMode::Line,
        lyrics: lines,
    })
}
