use crate::error::PipelineError;

/// A model reply split into its Markdown report and raw signal entries.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitReply {
    pub markdown: String,
    /// Unvalidated entries of the `signals` array.
    pub signals: Vec<serde_json::Value>,
}

/// Split a reply into Markdown and signals JSON.
///
/// Handles common reply formats:
/// - Marker line: `-->Json:` or `JSON:` (any case) followed by the JSON
/// - Fenced JSON after the marker: ```json\n{...}\n```
/// - No marker: the last balanced `{"signals": ...}` object in the text
///
/// The JSON may be an object with a `signals` array or a bare array.
pub fn split_reply(raw: &str) -> Result<SplitReply, PipelineError> {
    let text = raw.trim();

    let (markdown, json_part) = match find_marker_line(text) {
        Some((start, end)) => (&text[..start], &text[end..]),
        None => {
            let start = find_last_signals_object(text).ok_or_else(|| {
                PipelineError::ParseInvalid(format!(
                    "no signals JSON found in reply (length={})",
                    raw.len()
                ))
            })?;
            (&text[..start], &text[start..])
        }
    };

    let signals = parse_signals(json_part)?;
    let markdown = clean_markdown(markdown);
    if markdown.is_empty() {
        return Err(PipelineError::ParseInvalid(
            "reply contains no Markdown report".to_string(),
        ));
    }
    Ok(SplitReply { markdown, signals })
}

/// Byte range of the first marker line, e.g. `-->Json:` or `JSON:`.
fn find_marker_line(text: &str) -> Option<(usize, usize)> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if is_marker(line) {
            return Some((offset, offset + line.len()));
        }
        offset += line.len();
    }
    None
}

fn is_marker(line: &str) -> bool {
    let compact: String = line
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    let compact = compact.trim_start_matches("-->");
    compact == "json:"
}

/// Start of the last `{` whose first key is `"signals"` and which balances.
fn find_last_signals_object(text: &str) -> Option<usize> {
    text.char_indices()
        .filter(|(_, c)| *c == '{')
        .map(|(i, _)| i)
        .filter(|&i| text[i + 1..].trim_start().starts_with("\"signals\""))
        .filter(|&i| balanced_object_at(text, i).is_some())
        .last()
}

/// The balanced `{ ... }` starting at byte `start`, skipping braces in strings.
fn balanced_object_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_string => {
                escape_next = true;
            }
            '"' => {
                in_string = !in_string;
            }
            '{' if !in_string => {
                depth += 1;
            }
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..=start + i]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Remove a surrounding ```json ... ``` fence if present.
fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn parse_signals(json_part: &str) -> Result<Vec<serde_json::Value>, PipelineError> {
    let candidate = strip_code_fences(json_part);

    let value: serde_json::Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(first_err) => {
            // Trailing prose after the JSON: fall back to the first balanced object.
            let object = candidate
                .find('{')
                .and_then(|i| balanced_object_at(candidate, i))
                .ok_or_else(|| {
                    PipelineError::ParseInvalid(format!("signals JSON does not parse: {first_err}"))
                })?;
            serde_json::from_str(object).map_err(|e| {
                PipelineError::ParseInvalid(format!("signals JSON does not parse: {e}"))
            })?
        }
    };

    match value {
        serde_json::Value::Array(entries) => Ok(entries),
        serde_json::Value::Object(mut map) => match map.remove("signals") {
            Some(serde_json::Value::Array(entries)) => Ok(entries),
            Some(_) => Err(PipelineError::ParseInvalid(
                "`signals` is not an array".to_string(),
            )),
            None => Err(PipelineError::ParseInvalid(
                "JSON object has no `signals` field".to_string(),
            )),
        },
        _ => Err(PipelineError::ParseInvalid(
            "signals JSON is neither an object nor an array".to_string(),
        )),
    }
}

/// Trim the Markdown part: drop a leading `-->Markdown` line and a dangling
/// opening fence left behind when the JSON was fenced.
fn clean_markdown(markdown: &str) -> String {
    let mut text = markdown.trim();
    if let Some(first) = text.lines().next() {
        if first.trim().eq_ignore_ascii_case("-->markdown") {
            text = text[first.len()..].trim_start();
        }
    }
    if let Some(last_line_start) = text.rfind('\n') {
        if text[last_line_start..].trim().starts_with("```") {
            text = &text[..last_line_start];
        }
    } else if text.starts_with("```") {
        text = "";
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKDOWN: &str = "## Daily Brief\nApple rallied [1].";

    #[test]
    fn split_on_arrow_marker() {
        let raw = format!(
            "-->Markdown\n{MARKDOWN}\n\n-->Json:\n{{\"signals\": [{{\"ticker\": \"AAPL\", \"action\": \"Buy\"}}]}}"
        );
        let split = split_reply(&raw).unwrap();
        assert_eq!(split.markdown, MARKDOWN);
        assert_eq!(split.signals.len(), 1);
        assert_eq!(split.signals[0]["ticker"], "AAPL");
    }

    #[test]
    fn split_on_plain_json_marker_with_fence() {
        let raw = format!(
            "{MARKDOWN}\nJSON:\n```json\n{{\"signals\": [{{\"ticker\": \"MSFT\"}}]}}\n```\n"
        );
        let split = split_reply(&raw).unwrap();
        assert_eq!(split.markdown, MARKDOWN);
        assert_eq!(split.signals[0]["ticker"], "MSFT");
    }

    #[test]
    fn bare_array_is_accepted() {
        let raw = format!("{MARKDOWN}\n  json :  \n[{{\"ticker\": \"AAPL\"}}, {{\"ticker\": \"MSFT\"}}]");
        let split = split_reply(&raw).unwrap();
        assert_eq!(split.signals.len(), 2);
    }

    #[test]
    fn last_signals_object_without_marker() {
        let raw = format!(
            "{MARKDOWN}\nExample: {{\"signals\": []}}\n\n```json\n{{\"signals\": [{{\"ticker\": \"NVDA\", \"reason\": \"up {{a lot}}\"}}]}}\n```"
        );
        let split = split_reply(&raw).unwrap();
        assert_eq!(split.signals.len(), 1);
        assert_eq!(split.signals[0]["ticker"], "NVDA");
        assert!(split.markdown.ends_with("Example: {\"signals\": []}"));
    }

    #[test]
    fn trailing_prose_after_json() {
        let raw = format!("{MARKDOWN}\n-->Json:\n{{\"signals\": []}}\nHope this helps!");
        let split = split_reply(&raw).unwrap();
        assert!(split.signals.is_empty());
    }

    #[test]
    fn missing_json_is_invalid() {
        let err = split_reply(MARKDOWN).unwrap_err();
        assert!(matches!(err, PipelineError::ParseInvalid(_)));
    }

    #[test]
    fn unparsable_json_is_invalid() {
        let raw = format!("{MARKDOWN}\n-->Json:\n{{\"signals\": [{{\"ticker\": }}");
        assert!(matches!(
            split_reply(&raw),
            Err(PipelineError::ParseInvalid(_))
        ));
    }

    #[test]
    fn object_without_signals_is_invalid() {
        let raw = format!("{MARKDOWN}\n-->Json:\n{{\"tickers\": []}}");
        assert!(matches!(
            split_reply(&raw),
            Err(PipelineError::ParseInvalid(_))
        ));
    }

    #[test]
    fn json_only_reply_is_invalid() {
        let raw = "-->Json:\n{\"signals\": []}";
        assert!(matches!(
            split_reply(raw),
            Err(PipelineError::ParseInvalid(_))
        ));
    }

    #[test]
    fn balanced_object_ignores_braces_in_strings() {
        let text = r#"{"reason": "range {low} to {high}", "n": {"x": 1}} tail"#;
        assert_eq!(
            balanced_object_at(text, 0),
            Some(r#"{"reason": "range {low} to {high}", "n": {"x": 1}}"#)
        );
    }
}
