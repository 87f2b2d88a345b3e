//! # TTML 歌词生成器
//!
//! 输出 Apple Music 风格的紧凑 TTML：不做缩进，
//! 词间空格作为 `</span>` 之后的尾随文本写出，保证重新解析时语义不变。

use std::io::Cursor;

use quick_xml::{
    Writer,
    events::{BytesDecl, BytesText, Event},
};

use crate::converter::time::format_time;
use crate::converter::types::{LineContent, LyricDocument, LyricLine, LyricWord, TimingMode};
use crate::error::ConvertError;

const NS_TT: &str = "http://www.w3.org/ns/ttml";
const NS_TTM: &str = "http://www.w3.org/ns/ttml#metadata";
const NS_ITUNES: &str = "http://music.apple.com/lyric-ttml-internal";

/// 从规范文档生成 TTML 文本。
///
/// 根元素携带 `itunes:timing` 与固定的 `xml:lang`；
/// `head/metadata` 列出行中出现过的全部演唱者，
/// 按标识里的数字排序，约定的前两个双人对唱者为 `person`，其余为 `group`。
///
/// # Errors
///
/// 行或单词缺少时间（只可能来自畸形的 JSON 输入）时返回
/// [`ConvertError::Internal`]；XML 写出失败时返回对应的包装错误。
pub fn generate_ttml(document: &LyricDocument) -> Result<String, ConvertError> {
    let mut buffer = Vec::new();
    let mut writer = Writer::new(Cursor::new(&mut buffer));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let timing_value = document.timing.to_string();
    writer
        .create_element("tt")
        .with_attribute(("xmlns", NS_TT))
        .with_attribute(("xmlns:ttm", NS_TTM))
        .with_attribute(("xmlns:itunes", NS_ITUNES))
        .with_attribute(("itunes:timing", timing_value.as_str()))
        .with_attribute(("xml:lang", "en"))
        .write_inner_content(|writer| -> std::io::Result<()> {
            write_head(writer, &document.lyrics)?;
            write_body(writer, document)?;
            Ok(())
        })?;

    String::from_utf8(buffer).map_err(ConvertError::FromUtf8)
}

/// 写出 `head/metadata`，内含按数字排序的演唱者列表。
fn write_head<W: std::io::Write>(
    writer: &mut Writer<W>,
    lines: &[LyricLine],
) -> Result<(), ConvertError> {
    let mut agents: Vec<&str> = lines
        .iter()
        .filter_map(|line| line.agent.as_deref())
        .collect();
    agents.sort_unstable();
    agents.dedup();
    agents.sort_by_key(|id| agent_numeric_key(id));

    writer
        .create_element("head")
        .write_inner_content(|writer| -> std::io::Result<()> {
            let metadata = writer.create_element("metadata");
            if agents.is_empty() {
                metadata.write_empty()?;
                return Ok(());
            }
            metadata.write_inner_content(|writer| -> std::io::Result<()> {
                for id in &agents {
                    let agent_type = if matches!(*id, "v1" | "v2") {
                        "person"
                    } else {
                        "group"
                    };
                    writer
                        .create_element("ttm:agent")
                        .with_attribute(("type", agent_type))
                        .with_attribute(("xml:id", *id))
                        .write_empty()?;
                }
                Ok(())
            })?;
            Ok(())
        })?;
    Ok(())
}

/// 取演唱者标识中的数字部分作为排序键，如 `"v10"` -> 10。
fn agent_numeric_key(id: &str) -> u64 {
    id.chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

fn write_body<W: std::io::Write>(
    writer: &mut Writer<W>,
    document: &LyricDocument,
) -> Result<(), ConvertError> {
    writer
        .create_element("body")
        .write_inner_content(|writer| -> std::io::Result<()> {
            writer
                .create_element("div")
                .write_inner_content(|writer| -> std::io::Result<()> {
                    for (index, line) in document.lyrics.iter().enumerate() {
                        write_p(writer, document.timing, line, index)?;
                    }
                    Ok(())
                })?;
            Ok(())
        })?;
    Ok(())
}

fn write_p<W: std::io::Write>(
    writer: &mut Writer<W>,
    timing: TimingMode,
    line: &LyricLine,
    index: usize,
) -> Result<(), ConvertError> {
    if timing == TimingMode::None {
        let text = line.plain_text();
        let element = writer.create_element("p");
        if text.is_empty() {
            element.write_empty()?;
        } else {
            element.write_text_content(BytesText::new(&text))?;
        }
        return Ok(());
    }

    let begin = line.begin.ok_or_else(|| {
        ConvertError::Internal(format!("第 {} 行缺少开始时间，无法写出 TTML", index + 1))
    })?;
    let begin_text = format_time(begin, 1, false);
    let end_text = line.end.map(|end| format_time(end, 1, false));

    let mut element = writer
        .create_element("p")
        .with_attribute(("begin", begin_text.as_str()));
    if let Some(end_text) = &end_text {
        element = element.with_attribute(("end", end_text.as_str()));
    }
    if line.background {
        element = element.with_attribute(("ttm:role", "x-bg"));
    }
    if let Some(agent) = &line.agent {
        element = element.with_attribute(("ttm:agent", agent.as_str()));
    }

    match &line.content {
        LineContent::Text(text) if text.is_empty() => {
            element.write_empty()?;
        }
        LineContent::Text(text) => {
            element.write_text_content(BytesText::new(text))?;
        }
        LineContent::Words(words) if words.is_empty() => {
            element.write_empty()?;
        }
        LineContent::Words(words) => {
            element.write_inner_content(|writer| write_words(writer, words, index).map_err(Into::into))?;
        }
    }
    Ok(())
}

/// 写出一行的全部单词 span；`part` 为假的词后补一个尾随空格。
fn write_words<W: std::io::Write>(
    writer: &mut Writer<W>,
    words: &[LyricWord],
    line_index: usize,
) -> Result<(), ConvertError> {
    let missing = |what: &str| {
        ConvertError::Internal(format!(
            "第 {} 行的单词缺少{what}时间，无法写出 TTML",
            line_index + 1
        ))
    };
    for word in words {
        let begin = word.begin.ok_or_else(|| missing("开始"))?;
        let end = word.end.ok_or_else(|| missing("结束"))?;
        writer
            .create_element("span")
            .with_attribute(("begin", format_time(begin, 1, false).as_str()))
            .with_attribute(("end", format_time(end, 1, false).as_str()))
            .write_text_content(BytesText::new(&word.text))?;
        if !word.part {
            writer.write_event(Event::Text(BytesText::new(" ")))?;
        }
    }
    Ok(())
}
