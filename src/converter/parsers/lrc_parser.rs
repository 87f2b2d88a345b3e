//! # 增强型 LRC 解析器
//!
//! 支持行时间戳、`<MM:SS.mmm>` 逐字时间戳、`v1:` 声部标签
//! 以及 `[bg:...]` 背景人声括号。

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::converter::time::parse_time;
use crate::converter::types::{LineContent, LyricDocument, LyricLine, LyricWord, TimingMode};
use crate::error::ConvertError;

/// 元数据行，如 `[ti:...]`、`[ar:...]`。键不含数字，以区别于时间戳。
static METADATA_LINE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\D+):(.*)\]$").expect("未能编译 METADATA_LINE_REGEX"));

/// 歌词行：可选的 `[时间戳]` 前缀、可选的声部标签、剩余内容。
static TIMED_LINE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\[(\d{2}(?::\d{2})+\.\d+)\](?:(v\d+):)?)? ?(.*)$")
        .expect("未能编译 TIMED_LINE_REGEX")
});

/// 行内逐字时间戳片段。
static WORD_TAG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(\d{2}(?::\d{2})+\.\d+)>([^<]*)").expect("未能编译 WORD_TAG_REGEX"));

/// 解析增强型 LRC 内容为规范文档。
///
/// # Errors
///
/// * [`ConvertError::InconsistentTiming`] - 文档混用逐字/逐行/无计时行。
/// * [`ConvertError::InvalidTime`] - 时间戳无法解析。
pub fn parse_lrc(content: &str) -> Result<LyricDocument, ConvertError> {
    let mut timing: Option<TimingMode> = None;
    let mut lines: Vec<LyricLine> = Vec::new();

    for (index, raw_line) in content.lines().enumerate() {
        let line_number = index + 1;
        if METADATA_LINE_REGEX.is_match(raw_line) {
            continue;
        }
        let Some(caps) = TIMED_LINE_REGEX.captures(raw_line) else {
            continue;
        };
        let rest = caps.get(3).map_or("", |m| m.as_str());

        let Some(timestamp) = caps.get(1) else {
            handle_untagged_line(rest, &mut timing, &mut lines, line_number);
            continue;
        };

        if timing == Some(TimingMode::None) {
            return Err(ConvertError::InconsistentTiming { line: line_number });
        }

        let begin = parse_time(timestamp.as_str(), false)?;
        // 新行的开始时间立即回填所有仍未闭合的行
        close_open_line_ends(&mut lines, begin);

        if rest.is_empty() {
            // 裸时间戳行只是上一行的结束标记
            continue;
        }

        let agent = caps.get(2).map(|m| m.as_str().to_string());
        let (line, background_lines) = parse_line_body(rest, agent, Some(begin), false)?;

        let is_empty_text = matches!(&line.content, LineContent::Text(text) if text.is_empty());
        let parsed: Vec<LyricLine> = if is_empty_text && !background_lines.is_empty() {
            // 主行内容被背景括号占满时，只保留背景行
            background_lines
        } else {
            std::iter::once(line).chain(background_lines).collect()
        };

        for parsed_line in parsed {
            check_timing(&parsed_line.content, &mut timing, line_number)?;
            lines.push(parsed_line);
        }
    }

    resolve_word_line_times(&mut lines);

    Ok(LyricDocument {
        timing: timing.unwrap_or_default(),
        lyrics: lines,
    })
}

/// 处理不带时间戳的物理行。
fn handle_untagged_line(
    text: &str,
    timing: &mut Option<TimingMode>,
    lines: &mut Vec<LyricLine>,
    line_number: usize,
) {
    if lines.last().is_none_or(|line| line.begin.is_none()) {
        // 尚未出现带时间戳的行，按无计时歌词累积
        lines.push(LyricLine {
            content: LineContent::Text(text.to_string()),
            ..Default::default()
        });
        timing.get_or_insert(TimingMode::None);
    } else if *timing == Some(TimingMode::Line) {
        // 逐行计时下，后续的无标签行并入上一行（跨行歌词）
        if !text.trim().is_empty()
            && let Some(last) = lines.last_mut()
            && let LineContent::Text(previous) = &mut last.content
        {
            previous.push('\n');
            previous.push_str(text);
        }
    } else if !text.trim().is_empty() {
        warn!("已忽略第 {line_number} 行: 逐字歌词中出现无时间戳的文本");
    }
}

/// 根据行内容推断或校验文档计时粒度。
fn check_timing(
    content: &LineContent,
    timing: &mut Option<TimingMode>,
    line_number: usize,
) -> Result<(), ConvertError> {
    let mode = match content {
        LineContent::Words(_) => TimingMode::Word,
        LineContent::Text(_) => TimingMode::Line,
    };
    match timing {
        None => {
            *timing = Some(mode);
            Ok(())
        }
        Some(current) if *current == mode => Ok(()),
        Some(_) => Err(ConvertError::InconsistentTiming { line: line_number }),
    }
}

/// 用新行的开始时间闭合前面所有结束时间缺失的行。
fn close_open_line_ends(lines: &mut [LyricLine], end: u64) {
    for line in lines.iter_mut().rev() {
        if line.end.is_some() {
            break;
        }
        line.end = Some(end);
    }
}

/// 解析一行（或一个背景括号内）的正文：先剥离背景括号，再扫描逐字片段。
fn parse_line_body(
    content: &str,
    agent: Option<String>,
    begin: Option<u64>,
    background: bool,
) -> Result<(LyricLine, Vec<LyricLine>), ConvertError> {
    let (remaining, background_spans) = extract_background_spans(content);

    let mut background_lines = Vec::new();
    for span in background_spans {
        background_lines.extend(parse_background_span(&span)?);
    }

    let mut line = LyricLine {
        begin,
        end: None,
        agent,
        background,
        content: LineContent::Text(String::new()),
    };

    let mut words: Vec<LyricWord> = Vec::new();
    let mut last_tag_ms: Option<u64> = None;
    for caps in WORD_TAG_REGEX.captures_iter(&remaining) {
        let tag_ms = parse_time(&caps[1], false)?;
        last_tag_ms = Some(tag_ms);
        if let Some(last) = words.last_mut() {
            if last.end.is_none() {
                last.end = Some(tag_ms);
            }
        } else if line.begin.is_none() {
            line.begin = Some(tag_ms);
        }

        let run_text = &caps[2];
        let text = run_text.trim_end_matches(' ');
        if text.is_empty() {
            // 纯空白片段只承载结束时间和词间空格
            if run_text.contains(' ')
                && let Some(last) = words.last_mut()
            {
                last.part = false;
            }
            continue;
        }
        words.push(LyricWord {
            begin: Some(tag_ms),
            end: None,
            part: !run_text.ends_with(' '),
            text: text.to_string(),
        });
    }

    if words.is_empty() {
        line.content = LineContent::Text(remaining);
    } else {
        // 行内最后一个时间戳即该行的结束时间
        if line.end.is_none() {
            line.end = last_tag_ms;
        }
        line.content = LineContent::Words(words);
    }
    Ok((line, background_lines))
}

/// 解析一个 `[bg:...]` 括号内的内容。
/// 背景行沿用整行语法：可选的 `[时间戳]` 前缀、可选声部标签、正文。
fn parse_background_span(span: &str) -> Result<Vec<LyricLine>, ConvertError> {
    let Some(caps) = TIMED_LINE_REGEX.captures(span) else {
        return Ok(Vec::new());
    };
    let begin = caps
        .get(1)
        .map(|m| parse_time(m.as_str(), false))
        .transpose()?;
    let agent = caps.get(2).map(|m| m.as_str().to_string());
    let rest = caps.get(3).map_or("", |m| m.as_str());
    let (line, nested) = parse_line_body(rest, agent, begin, true)?;
    let mut result = vec![line];
    result.extend(nested);
    Ok(result)
}

/// 从一行文本中剥离全部 `[bg:...]` 括号。
/// 手工扫描配对方括号，允许括号内再嵌一层 `[时间戳]`。
fn extract_background_spans(content: &str) -> (String, Vec<String>) {
    let mut remaining = String::with_capacity(content.len());
    let mut spans = Vec::new();
    let mut rest = content;

    while let Some(position) = rest.find("[bg:") {
        let inner_start = position + "[bg:".len();
        let mut depth = 1usize;
        let mut close_index = None;
        for (offset, character) in rest[inner_start..].char_indices() {
            match character {
                '[' => depth += 1,
                ']' => {
                    depth -= 1;
                    if depth == 0 {
                        close_index = Some(inner_start + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(close_index) = close_index else {
            // 未闭合的括号按普通文本保留
            break;
        };
        let before = &rest[..position];
        remaining.push_str(before.strip_suffix(' ').unwrap_or(before));
        spans.push(rest[inner_start..close_index].to_string());
        rest = &rest[close_index + 1..];
    }
    remaining.push_str(rest);
    (remaining, spans)
}

/// 在整个文档解析完成后补全逐字行的行级与词级时间。
fn resolve_word_line_times(lines: &mut [LyricLine]) {
    for line in lines {
        if let LineContent::Words(words) = &mut line.content {
            if line.begin.is_none() {
                line.begin = words.first().and_then(|word| word.begin);
            }
            let line_end = line.end;
            if let Some(last) = words.last_mut()
                && last.end.is_none()
            {
                last.end = line_end.or(last.begin);
            }
            if line.end.is_none() {
                line.end = words.last().and_then(|word| word.end);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_timed_parsing() {
        let content = "[ti:Test]\n[00:10.000]Hello\n[00:12.000]World\n";
        let document = parse_lrc(content).unwrap();
        assert_eq!(document.timing, TimingMode::Line);
        assert_eq!(document.lyrics.len(), 2);
        assert_eq!(document.lyrics[0].begin, Some(10000));
        assert_eq!(document.lyrics[0].end, Some(12000));
        assert_eq!(
            document.lyrics[0].content,
            LineContent::Text("Hello".to_string())
        );
        assert_eq!(document.lyrics[1].end, None);
    }

    #[test]
    fn test_trailing_marker_closes_last_line() {
        let content = "[00:10.000]Hello\n[00:12.000]World\n[00:14.000]\n";
        let document = parse_lrc(content).unwrap();
        assert_eq!(document.lyrics.len(), 2);
        assert_eq!(document.lyrics[1].end, Some(14000));
    }

    #[test]
    fn test_word_timed_parsing() {
        let content = "[00:01.000]<00:01.000>Hel<00:01.200>lo<00:01.400> <00:01.600>world<00:01.800>\n";
        let document = parse_lrc(content).unwrap();
        assert_eq!(document.timing, TimingMode::Word);
        let LineContent::Words(words) = &document.lyrics[0].content else {
            panic!("expected word list");
        };
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].text, "Hel");
        assert_eq!(words[0].begin, Some(1000));
        assert_eq!(words[0].end, Some(1200));
        assert!(words[0].part);
        assert_eq!(words[1].text, "lo");
        assert!(!words[1].part);
        assert_eq!(words[2].text, "world");
        assert_eq!(words[2].end, Some(1800));
        assert_eq!(document.lyrics[0].end, Some(1800));
    }

    #[test]
    fn test_voice_tag() {
        let content = "[00:10.000]v1:Hello\n[00:12.000]v2:World\n";
        let document = parse_lrc(content).unwrap();
        assert_eq!(document.lyrics[0].agent.as_deref(), Some("v1"));
        assert_eq!(document.lyrics[1].agent.as_deref(), Some("v2"));
    }

    #[test]
    fn test_background_bracket() {
        let content = "[00:10.000]Lead [bg:[00:10.000]Echo]\n";
        let document = parse_lrc(content).unwrap();
        assert_eq!(document.timing, TimingMode::Line);
        assert_eq!(document.lyrics.len(), 2);
        assert_eq!(
            document.lyrics[0].content,
            LineContent::Text("Lead".to_string())
        );
        assert!(!document.lyrics[0].background);
        assert_eq!(
            document.lyrics[1].content,
            LineContent::Text("Echo".to_string())
        );
        assert!(document.lyrics[1].background);
        assert_eq!(document.lyrics[1].begin, Some(10000));
    }

    #[test]
    fn test_untimed_document() {
        let content = "Hello darkness\nmy old friend\n";
        let document = parse_lrc(content).unwrap();
        assert_eq!(document.timing, TimingMode::None);
        assert_eq!(document.lyrics.len(), 2);
    }

    #[test]
    fn test_mixed_timing_is_rejected() {
        let content = "[00:10.000]<00:10.000>Hello<00:11.000>\n[00:12.000]Plain text\n";
        let error = parse_lrc(content).unwrap_err();
        assert!(matches!(
            error,
            ConvertError::InconsistentTiming { line: 2 }
        ));
    }

    #[test]
    fn test_timed_after_untimed_is_rejected() {
        let content = "Plain prelude\n[00:10.000]Hello\n";
        let error = parse_lrc(content).unwrap_err();
        assert!(matches!(
            error,
            ConvertError::InconsistentTiming { line: 2 }
        ));
    }

    #[test]
    fn test_multiline_lyric_joins_untagged_continuation() {
        let content = "[00:10.000]first\nsecond\n[00:12.000]third\n";
        let document = parse_lrc(content).unwrap();
        assert_eq!(document.lyrics.len(), 2);
        assert_eq!(
            document.lyrics[0].content,
            LineContent::Text("first\nsecond".to_string())
        );
    }

    #[test]
    fn test_extract_background_spans_nested_bracket() {
        let (remaining, spans) = extract_background_spans("Lead [bg:[00:10.000]Echo]");
        assert_eq!(remaining, "Lead");
        assert_eq!(spans, vec!["[00:10.000]Echo".to_string()]);
    }
}
