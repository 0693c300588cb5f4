use lazy_static::lazy_static;
use regex::Regex;

use crate::core::{Result, ShardingError};

lazy_static! {
    static ref INLINE_PART: Regex = Regex::new(r"\$\{([^}]*)\}").unwrap();
    static ref INLINE_RANGE: Regex = Regex::new(r"^\s*(-?\d+)\s*\.\.\s*(-?\d+)\s*$").unwrap();
}

/// Upper bound on the names a single inline expression may produce.
pub const MAX_INLINE_EXPANSION: usize = 100_000;

fn too_large(expression: &str) -> ShardingError {
    ShardingError::Config(format!(
        "inline expression '{}' expands to more than {} names",
        expression, MAX_INLINE_EXPANSION
    ))
}

/// Expands an inline expression such as `ds_${0..1}.t_order_${[0, 1]}`.
///
/// Each `${...}` holds an inclusive integer range `a..b` or a list
/// `[x, y]`; several of them multiply out left to right. Top-level commas
/// separate independent expressions. Expansions larger than
/// [`MAX_INLINE_EXPANSION`] are rejected.
pub fn expand_inline(expression: &str) -> Result<Vec<String>> {
    let mut expanded = Vec::new();
    for segment in split_top_level(expression) {
        let segment = segment.trim();
        if !segment.is_empty() {
            expanded.extend(expand_segment(segment)?);
            if expanded.len() > MAX_INLINE_EXPANSION {
                return Err(too_large(expression));
            }
        }
    }
    Ok(expanded)
}

fn split_top_level(expression: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in expression.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                segments.push(&expression[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    segments.push(&expression[start..]);
    segments
}

fn expand_segment(segment: &str) -> Result<Vec<String>> {
    let mut results = vec![String::new()];
    let mut last = 0;
    for captures in INLINE_PART.captures_iter(segment) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        let literal = &segment[last..whole.start()];
        let choices = choices(&captures[1])?;
        let total = results
            .len()
            .checked_mul(choices.len())
            .filter(|&total| total <= MAX_INLINE_EXPANSION)
            .ok_or_else(|| too_large(segment))?;
        let mut next = Vec::with_capacity(total);
        for prefix in &results {
            for choice in &choices {
                next.push(format!("{}{}{}", prefix, literal, choice));
            }
        }
        results = next;
        last = whole.end();
    }

    let tail = &segment[last..];
    if tail.contains("${") {
        return Err(ShardingError::Config(format!(
            "unterminated inline expression '{}'",
            segment
        )));
    }
    Ok(results.into_iter().map(|r| r + tail).collect())
}

fn choices(body: &str) -> Result<Vec<String>> {
    if let Some(range) = INLINE_RANGE.captures(body) {
        let bound = |i: usize| {
            range[i].parse::<i64>().map_err(|e| {
                ShardingError::Config(format!("invalid range bound in '{}': {}", body, e))
            })
        };
        let (lower, upper) = (bound(1)?, bound(2)?);
        if lower > upper {
            return Err(ShardingError::Config(format!(
                "empty range '{}' in inline expression",
                body
            )));
        }
        let size = (upper as i128) - (lower as i128) + 1;
        if size > MAX_INLINE_EXPANSION as i128 {
            return Err(too_large(body));
        }
        return Ok((lower..=upper).map(|n| n.to_string()).collect());
    }

    let list = body.trim();
    let list = list
        .strip_prefix('[')
        .and_then(|l| l.strip_suffix(']'))
        .unwrap_or(list);
    let items: Vec<String> = list
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() {
        return Err(ShardingError::Config(format!(
            "inline expression '${{{}}}' has no values",
            body
        )));
    }
    Ok(items)
}
