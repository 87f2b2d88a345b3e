//! # 时间戳编解码
//!
//! 在整数毫秒与各格式的文本时间戳之间双向转换。
//! LRC/TTML 使用 `MM:SS.mmm`（小数点分隔），SRT 使用 `HH:MM:SS,mmm`（逗号分隔）。

use crate::error::ConvertError;

/// 解析一个文本时间戳为毫秒数。
///
/// 接受 `MM:SS.mmm` 及任意多出的 `:` 分组（每多一组按 60 倍进位），
/// 兼容部分 TTML 写法的尾缀 `s`（如 `7.123s`）。
/// `alt_separator` 为 `true` 时以逗号作为亚秒分隔符（SRT 约定）。
///
/// 仅做毫秒截断，不做任何舍入：小数部分超过三位的数字被丢弃。
pub(crate) fn parse_time(text: &str, alt_separator: bool) -> Result<u64, ConvertError> {
    let trimmed = text.trim();
    let trimmed = match trimmed.strip_suffix('s') {
        Some(stripped) if stripped.ends_with(|c: char| c.is_ascii_digit()) => stripped,
        _ => trimmed,
    };
    if trimmed.is_empty() {
        return Err(ConvertError::InvalidTime(format!("时间戳为空: '{text}'")));
    }

    let separator = if alt_separator { ',' } else { '.' };
    let mut total_ms: u64 = 0;
    let mut scale: u64 = 1000;
    for (index, group) in trimmed.rsplit(':').enumerate() {
        // 小数部分只允许出现在最低位分组
        let (integer_part, fraction_ms) = if index == 0 {
            match group.split_once(separator) {
                Some((seconds, fraction)) => (seconds, parse_fraction(fraction, text)?),
                None => (group, 0),
            }
        } else {
            (group, 0)
        };

        if integer_part.is_empty() || !integer_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConvertError::InvalidTime(format!(
                "无法解析时间戳 '{text}' 中的分组 '{group}'"
            )));
        }
        let value: u64 = integer_part.parse()?;
        total_ms = total_ms.saturating_add(value.saturating_mul(scale).saturating_add(fraction_ms));
        scale = scale.saturating_mul(60);
    }
    Ok(total_ms)
}

/// 解析亚秒部分，按位数补齐到毫秒，超出三位的数字截断。
fn parse_fraction(digits: &str, original: &str) -> Result<u64, ConvertError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConvertError::InvalidTime(format!(
            "无效的毫秒部分: '{original}'"
        )));
    }
    let truncated = &digits[..digits.len().min(3)];
    let value: u64 = truncated.parse()?;
    Ok(value * 10u64.pow(3 - truncated.len() as u32))
}

/// 将毫秒数格式化为文本时间戳。
///
/// `colon_groups` 控制秒分组之前的 `:` 分组数量（LRC 为 1，SRT 为 2）。
/// 每个分组补零到两位，亚秒补零到三位；最高位分组不受 60 限制，
/// 因此 `parse_time(format_time(ms, g, alt), alt) == ms` 恒成立。
pub(crate) fn format_time(ms: u64, colon_groups: usize, alt_separator: bool) -> String {
    let separator = if alt_separator { ',' } else { '.' };
    let mut text = format!("{separator}{:03}", ms % 1000);
    let mut rest = ms / 1000;
    for index in 0..=colon_groups {
        let group = if index == colon_groups {
            rest
        } else {
            rest % 60
        };
        if index == 0 {
            text = format!("{group:02}{text}");
        } else {
            text = format!("{group:02}:{text}");
        }
        rest /= 60;
    }
    text
}
