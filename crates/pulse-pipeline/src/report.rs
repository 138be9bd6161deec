//! Local validation of the model's report. The reply is untrusted: citations
//! are range-checked, the Sources and Key Indicators sections are rebuilt
//! from local data, and each signal entry is checked on its own.

use std::collections::HashSet;

use chrono::Utc;
use pulse_models::report::{RunResult, Signal, SignalAction};
use pulse_models::ticker::Ticker;
use tracing::warn;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::grounding::Grounding;
use crate::parser::split_reply;

const HOLD_REASON: &str = "No validated signal was produced for this ticker.";

/// A validated report plus the problems found and corrected on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedReport {
    pub result: RunResult,
    pub warnings: Vec<String>,
}

/// Parse and validate a raw reply against the run's grounding.
///
/// Fails only when the reply cannot be split into Markdown and signals JSON.
pub fn validate_report(
    run_id: Uuid,
    raw: &str,
    grounding: &Grounding,
    tickers: &[Ticker],
) -> Result<ValidatedReport, PipelineError> {
    let split = split_reply(raw)?;
    let mut warnings = Vec::new();
    let max = grounding.source_count();

    let (body, removed) = strip_invalid_citations(&split.markdown, max);
    for member in removed {
        warnings.push(format!("report cites [{member}] but only {max} sources exist; removed"));
    }

    let body = remove_section(&body, is_sources_heading);
    let body = if grounding.include_indicators {
        if find_section(&body, is_key_indicators_heading).is_some() {
            body
        } else {
            insert_after_first_section(&body, &grounding.render_key_indicators())
        }
    } else {
        remove_section(&body, is_key_indicators_heading)
    };
    let markdown = format!("{}\n\n{}\n", body.trim_end(), grounding.render_sources());

    for ticker in tickers {
        if !mentions_symbol(&split.markdown, &ticker.symbol) {
            warnings.push(format!("report does not mention {}", ticker.symbol));
        }
    }

    let signals = validate_signals(&split.signals, grounding, tickers, &mut warnings);

    for warning in &warnings {
        warn!(run_id = %run_id, "{warning}");
    }

    Ok(ValidatedReport {
        result: RunResult {
            run_id,
            markdown,
            tickers: tickers.to_vec(),
            sources: grounding.sources.clone(),
            signals,
            indicators: grounding.indicator_sets(),
            generated_at: Utc::now(),
        },
        warnings,
    })
}

// --- Citations ---

/// One member of a citation: `k` or an inclusive range `a-b`.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Member {
    Single(usize),
    Range(usize, usize),
}

impl Member {
    fn render(self) -> String {
        match self {
            Member::Single(k) => k.to_string(),
            Member::Range(lo, hi) if lo == hi => lo.to_string(),
            Member::Range(lo, hi) => format!("{lo}-{hi}"),
        }
    }

    /// Split into the part inside `1..=max` and the rendered parts outside it.
    fn clamp(self, max: usize) -> (Option<Member>, Vec<String>) {
        match self {
            Member::Single(k) if (1..=max).contains(&k) => (Some(self), Vec::new()),
            Member::Single(k) => (None, vec![k.to_string()]),
            Member::Range(lo, hi) => {
                let mut outside = Vec::new();
                if lo == 0 {
                    outside.push("0".to_string());
                }
                if hi > max {
                    outside.push(Member::Range(lo.max(max + 1), hi).render());
                }
                let (lo, hi) = (lo.max(1), hi.min(max));
                let inside = (lo <= hi).then_some(Member::Range(lo, hi));
                (inside, outside)
            }
        }
    }
}

/// A bracketed citation found in text: `[k]`, `[k, m]` or `[a-b]`.
struct Citation {
    start: usize,
    end: usize,
    members: Vec<Member>,
    /// The list had an empty member such as `[5,]`.
    ragged: bool,
}

/// Citations in `text`, skipping Markdown links such as `[2](https://...)`.
fn find_citations(text: &str) -> Vec<Citation> {
    let mut found = Vec::new();
    let mut cursor = 0;
    while let Some(rel) = text[cursor..].find('[') {
        let start = cursor + rel;
        let Some(close_rel) = text[start..].find(']') else {
            break;
        };
        let end = start + close_rel + 1;
        let inner = &text[start + 1..end - 1];
        let is_link = text[end..].starts_with('(');
        match parse_members(inner) {
            Some((members, ragged)) if !is_link => {
                found.push(Citation {
                    start,
                    end,
                    members,
                    ragged,
                });
                cursor = end;
            }
            _ => cursor = start + 1,
        }
    }
    found
}

/// Members of a comma-separated citation list. Empty members are tolerated
/// as long as at least one member is present.
fn parse_members(inner: &str) -> Option<(Vec<Member>, bool)> {
    let mut members = Vec::new();
    let mut ragged = false;
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            ragged = true;
            continue;
        }
        members.push(parse_member(part)?);
    }
    (!members.is_empty()).then_some((members, ragged))
}

fn parse_member(part: &str) -> Option<Member> {
    let number = |s: &str| -> Option<usize> {
        let s = s.trim();
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        s.parse().ok()
    };
    match part.split_once(['-', '\u{2013}']) {
        Some((lo, hi)) => {
            let (lo, hi) = (number(lo)?, number(hi)?);
            Some(Member::Range(lo.min(hi), lo.max(hi)))
        }
        None => number(part).map(Member::Single),
    }
}

/// Longest range expanded by [`cited_ordinals`].
const MAX_RANGE_EXPANSION: usize = 256;

/// Ordinals cited anywhere in `text`, in order of appearance. Ranges are
/// expanded.
pub fn cited_ordinals(text: &str) -> Vec<usize> {
    find_citations(text)
        .into_iter()
        .flat_map(|c| c.members)
        .flat_map(|member| match member {
            Member::Single(k) => (k..=k).take(1),
            Member::Range(lo, hi) => (lo..=hi).take(MAX_RANGE_EXPANSION),
        })
        .collect()
}

/// Remove citation members outside `1..=max`. A list keeps its valid members
/// and ranges are cut to the valid span; a citation with nothing left is
/// removed together with one preceding space. Empty list members are dropped.
/// Returns the rewritten text and the removed members as cited.
pub fn strip_invalid_citations(text: &str, max: usize) -> (String, Vec<String>) {
    let mut out = String::with_capacity(text.len());
    let mut removed = Vec::new();
    let mut last = 0;

    for citation in find_citations(text) {
        let mut valid = Vec::new();
        let mut invalid = Vec::new();
        for member in &citation.members {
            let (inside, outside) = member.clamp(max);
            valid.extend(inside);
            invalid.extend(outside);
        }
        if invalid.is_empty() && !citation.ragged {
            continue;
        }
        removed.extend(invalid);
        out.push_str(&text[last..citation.start]);
        if valid.is_empty() {
            if out.ends_with(' ') {
                out.pop();
            }
        } else {
            let members: Vec<String> = valid.into_iter().map(Member::render).collect();
            out.push_str(&format!("[{}]", members.join(", ")));
        }
        last = citation.end;
    }
    out.push_str(&text[last..]);
    (out, removed)
}

// --- Sections ---

/// Section titles recognized on plain `Title:` label lines.
const LABEL_TITLES: &[&str] = &[
    "daily brief",
    "summary",
    "key indicators",
    "insights",
    "signals",
    "outlook",
    "sources",
    "source list",
    "references",
];

/// Heading level and normalized title of a section heading line.
///
/// Accepts `## Title` headings, whole-line bold titles like `**Sources:**`
/// (optionally behind a list marker such as `2)`), and plain label lines
/// such as `Key Indicators:` naming a known section.
fn heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim();
    if trimmed.starts_with('#') {
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        return Some((level, normalize_title(&trimmed[level..])));
    }

    let rest = strip_list_marker(trimmed);
    if let Some(inner) = bold_title(rest) {
        return Some((2, normalize_title(inner)));
    }
    let label = rest.strip_suffix(':')?;
    let title = normalize_title(label);
    LABEL_TITLES.contains(&title.as_str()).then_some((2, title))
}

/// The text of a line that is exactly one bold span, with an optional colon
/// inside or after it.
fn bold_title(text: &str) -> Option<&str> {
    let text = text.strip_suffix(':').unwrap_or(text);
    let inner = text.strip_prefix("**")?.strip_suffix("**")?;
    let inner = inner.strip_suffix(':').unwrap_or(inner).trim();
    (!inner.is_empty() && !inner.contains("**")).then_some(inner)
}

/// Drop a leading `-`, `*`, `+`, `1.` or `2)` list marker.
fn strip_list_marker(line: &str) -> &str {
    for bullet in ["- ", "* ", "+ "] {
        if let Some(rest) = line.strip_prefix(bullet) {
            return rest.trim_start();
        }
    }
    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix(". ").or_else(|| rest.strip_prefix(") ")) {
            return rest.trim_start();
        }
    }
    line
}

fn normalize_title(title: &str) -> String {
    title
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit() || c == ')' || c == '.')
        .trim()
        .trim_end_matches(':')
        .trim()
        .to_lowercase()
}

fn is_sources_heading(title: &str) -> bool {
    title == "sources" || title == "source list" || title == "references"
}

fn is_key_indicators_heading(title: &str) -> bool {
    title.starts_with("key indicators")
}

/// Line range `[start, end)` of the first section whose heading matches.
fn find_section(markdown: &str, matches: fn(&str) -> bool) -> Option<(usize, usize)> {
    let lines: Vec<&str> = markdown.lines().collect();
    let start = lines
        .iter()
        .position(|l| heading(l).is_some_and(|(_, title)| matches(&title)))?;
    let (level, _) = heading(lines[start])?;
    let end = lines[start + 1..]
        .iter()
        .position(|l| heading(l).is_some_and(|(other, _)| other <= level))
        .map(|offset| start + 1 + offset)
        .unwrap_or(lines.len());
    Some((start, end))
}

fn remove_section(markdown: &str, matches: fn(&str) -> bool) -> String {
    let mut text = markdown.to_string();
    while let Some((start, end)) = find_section(&text, matches) {
        let lines: Vec<&str> = text.lines().collect();
        text = lines[..start]
            .iter()
            .chain(lines[end..].iter())
            .copied()
            .collect::<Vec<_>>()
            .join("\n");
    }
    text.trim_end().to_string()
}

/// Insert `section` before the second heading, or append it when there is none.
fn insert_after_first_section(markdown: &str, section: &str) -> String {
    let lines: Vec<&str> = markdown.lines().collect();
    let first = lines.iter().position(|l| heading(l).is_some());
    let second = first.and_then(|f| {
        lines[f + 1..]
            .iter()
            .position(|l| heading(l).is_some())
            .map(|offset| f + 1 + offset)
    });
    match second {
        Some(at) => {
            let before = lines[..at].join("\n");
            let after = lines[at..].join("\n");
            format!("{}\n\n{section}\n\n{after}", before.trim_end())
        }
        None => format!("{}\n\n{section}", markdown.trim_end()),
    }
}

/// Whether `symbol` appears as a standalone token.
fn mentions_symbol(markdown: &str, symbol: &str) -> bool {
    markdown.match_indices(symbol).any(|(i, _)| {
        let before = markdown[..i].chars().next_back();
        let after = markdown[i + symbol.len()..].chars().next();
        !before.is_some_and(|c| c.is_ascii_alphanumeric())
            && !after.is_some_and(|c| c.is_ascii_alphanumeric())
    })
}

// --- Signals ---

/// Validate raw signal entries. Invalid or duplicate entries are dropped with
/// a warning and every requested ticker ends up with exactly one signal,
/// ordered as the tickers were selected.
pub fn validate_signals(
    entries: &[serde_json::Value],
    grounding: &Grounding,
    tickers: &[Ticker],
    warnings: &mut Vec<String>,
) -> Vec<Signal> {
    let requested: HashSet<&str> = tickers.iter().map(|t| t.symbol.as_str()).collect();
    let mut accepted: Vec<Signal> = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let field = |name: &str| entry.get(name).and_then(|v| v.as_str()).map(str::trim);

        let Some(symbol) = field("ticker").map(str::to_ascii_uppercase).filter(|s| !s.is_empty()) else {
            warnings.push(format!("signal #{index} has no ticker; dropped"));
            continue;
        };
        if !requested.contains(symbol.as_str()) {
            warnings.push(format!("signal for unrequested ticker {symbol}; dropped"));
            continue;
        }
        if accepted.iter().any(|s| s.ticker == symbol) {
            warnings.push(format!("duplicate signal for {symbol}; dropped"));
            continue;
        }
        let Some(action) = field("action").and_then(SignalAction::parse) else {
            warnings.push(format!(
                "signal for {symbol} has invalid action {:?}; dropped",
                entry.get("action").cloned().unwrap_or(serde_json::Value::Null)
            ));
            continue;
        };

        let reason = validate_reason(&symbol, field("reason").unwrap_or_default(), grounding, warnings);
        let name = field("name")
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| display_name(&symbol, grounding));

        accepted.push(Signal {
            ticker: symbol,
            name,
            action,
            reason,
        });
    }

    tickers
        .iter()
        .map(|ticker| {
            match accepted.iter().position(|s| s.ticker == ticker.symbol) {
                Some(i) => accepted.swap_remove(i),
                None => {
                    warnings.push(format!("no valid signal for {}; defaulting to hold", ticker.symbol));
                    Signal {
                        ticker: ticker.symbol.clone(),
                        name: display_name(&ticker.symbol, grounding),
                        action: SignalAction::Hold,
                        reason: HOLD_REASON.to_string(),
                    }
                }
            }
        })
        .collect()
}

fn validate_reason(
    symbol: &str,
    reason: &str,
    grounding: &Grounding,
    warnings: &mut Vec<String>,
) -> String {
    let has_sources = grounding.block(symbol).is_some_and(|b| !b.ordinals.is_empty());
    let max = if has_sources { grounding.source_count() } else { 0 };

    let (cleaned, removed) = strip_invalid_citations(reason, max);
    for member in removed {
        warnings.push(format!("signal for {symbol} cites [{member}]; removed"));
    }
    if has_sources && cited_ordinals(&cleaned).is_empty() {
        warnings.push(format!("signal for {symbol} cites none of its sources"));
    }
    cleaned.trim().to_string()
}

fn display_name(symbol: &str, grounding: &Grounding) -> String {
    grounding
        .block(symbol)
        .and_then(|b| b.indicators.name.clone())
        .unwrap_or_else(|| symbol.to_string())
}
