// ==========================================
// 价格目录系统 - 数据清洗器实现
// ==========================================
// 职责: 标识符 token 规则 / 金额解析 / 描述标准化
// 约定: 金额一律换算为整数分（value × 100 四舍五入）
// ==========================================

use crate::domain::types::Cents;

/// 标识符 token 的清洗规则，按声明顺序依次应用
#[derive(Debug, Clone, PartialEq)]
pub enum TokenRule {
    /// 去首尾空白
    Trim,
    /// 去除标记字符（如 `*`、`†`）
    StripChars(Vec<char>),
    /// 取前 n 个字符
    Prefix(usize),
    /// 取后 n 个字符
    Suffix(usize),
    /// 转为整数编码（"36.0" → "36"）
    IntegerCode,
    /// 左侧补齐到固定宽度（"5" → "05"）
    PadLeft(usize, char),
    Uppercase,
    Lowercase,
}

/// 应用 token 规则；失败时返回原因（由调用方记录为行级问题）
pub fn normalize_token(raw: &str, rules: &[TokenRule]) -> Result<String, String> {
    let mut value = raw.to_string();
    for rule in rules {
        value = match rule {
            TokenRule::Trim => value.trim().to_string(),
            TokenRule::StripChars(chars) => value.chars().filter(|c| !chars.contains(c)).collect(),
            TokenRule::Prefix(n) => value.chars().take(*n).collect(),
            TokenRule::Suffix(n) => {
                let len = value.chars().count();
                value.chars().skip(len.saturating_sub(*n)).collect()
            }
            TokenRule::IntegerCode => {
                let trimmed = value.trim();
                let parsed: f64 = trimmed
                    .parse()
                    .map_err(|_| format!("无法转为整数编码: {}", raw))?;
                if parsed.fract() != 0.0 {
                    return Err(format!("非整数编码: {}", raw));
                }
                format!("{}", parsed as i64)
            }
            TokenRule::PadLeft(width, fill) => {
                let len = value.chars().count();
                if len >= *width {
                    value
                } else {
                    let mut padded: String = std::iter::repeat(*fill).take(width - len).collect();
                    padded.push_str(&value);
                    padded
                }
            }
            TokenRule::Uppercase => value.to_uppercase(),
            TokenRule::Lowercase => value.to_lowercase(),
        };
    }

    if value.is_empty() {
        return Err(format!("标识符清洗后为空: {:?}", raw));
    }
    Ok(value)
}

/// 解析金额文本: 去除货币符号、千分位、空白；括号表示负数
pub fn parse_decimal(text: &str) -> Option<f64> {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '$' | '¥' | '€' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let negative = cleaned.starts_with('(') && cleaned.ends_with(')');
    if negative {
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// 元 → 分
pub fn to_cents(value: f64) -> Cents {
    (value * 100.0).round() as Cents
}

/// 描述标准化: 小写 + 去除全部空白
pub fn normalize_description(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// 去首尾空白后为空则视为 None
pub fn normalize_null(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
