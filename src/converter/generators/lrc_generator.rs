//! # 增强型 LRC 生成器

use std::fmt::Write as _;

use crate::converter::time::format_time;
use crate::converter::types::{LineContent, LyricDocument, LyricWord, TimingMode};
use crate::error::ConvertError;

/// 从规范文档生成增强型 LRC 文本。
///
/// 逐行计时下，相邻行之间的静默以裸 `[时间戳]` 标记行表示，
/// 最后一行之后写出其结束时间的收尾标记。
/// 逐字计时下结束时间已内嵌在词级标签里，不写标记行。
///
/// # Errors
///
/// 行或单词缺少时间（只可能来自畸形的 JSON 输入）时返回
/// [`ConvertError::Internal`]。
pub fn generate_lrc(document: &LyricDocument) -> Result<String, ConvertError> {
    let mut output = String::new();

    if document.timing == TimingMode::None {
        for line in &document.lyrics {
            if let LineContent::Text(text) = &line.content {
                output.push_str(text);
                output.push('\n');
            }
        }
        return Ok(output);
    }

    let mut last_line_end: Option<u64> = None;
    let mut last_begin: Option<u64> = None;
    for (index, line) in document.lyrics.iter().enumerate() {
        let begin = line.begin.ok_or_else(|| {
            ConvertError::Internal(format!("第 {} 行缺少开始时间，无法写出 LRC", index + 1))
        })?;

        if document.timing == TimingMode::Line
            && !line.background
            && let Some(previous_end) = last_line_end
            && previous_end != begin
        {
            writeln!(output, "[{}]", format_time(previous_end, 1, false))?;
        }
        last_line_end = line.end;
        last_begin = Some(begin);

        if line.background {
            // 背景行并入上一物理行的括号形式
            if output.ends_with('\n') {
                output.pop();
            }
            output.push_str(" [bg:");
        }
        write!(output, "[{}]", format_time(begin, 1, false))?;
        if let Some(agent) = &line.agent {
            write!(output, "{agent}:")?;
        }
        match &line.content {
            LineContent::Text(text) => output.push_str(text),
            LineContent::Words(words) => write_word_tags(&mut output, words, line.end, index)?,
        }
        if line.background {
            output.push(']');
        }
        output.push('\n');
    }

    if document.timing == TimingMode::Line
        && let (Some(end), Some(begin)) = (last_line_end, last_begin)
        && end != begin
    {
        writeln!(output, "[{}]", format_time(end, 1, false))?;
    }
    Ok(output)
}

/// 写出一行的逐字标签序列。
///
/// 与光标处已有的时间戳相同的标签不再重复写出；
/// `part` 为假且不是行尾的单词后补一个空格。
fn write_word_tags(
    output: &mut String,
    words: &[LyricWord],
    line_end: Option<u64>,
    line_index: usize,
) -> Result<(), ConvertError> {
    let missing = |what: &str| {
        ConvertError::Internal(format!(
            "第 {} 行的单词缺少{what}时间，无法写出 LRC",
            line_index + 1
        ))
    };
    for (index, word) in words.iter().enumerate() {
        let begin = word.begin.ok_or_else(|| missing("开始"))?;
        let begin_tag = format!("<{}>", format_time(begin, 1, false));
        if !output.ends_with(&begin_tag) {
            output.push_str(&begin_tag);
        }
        output.push_str(&word.text);
        let end = word.end.ok_or_else(|| missing("结束"))?;
        write!(output, "<{}>", format_time(end, 1, false))?;
        if !word.part && index + 1 != words.len() {
            output.push(' ');
        }
    }
    if let Some(line_end) = line_end {
        let end_tag = format!("<{}>", format_time(line_end, 1, false));
        if !output.ends_with(&end_tag) {
            output.push_str(&end_tag);
        }
    }
    Ok(())
}
