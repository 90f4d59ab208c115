//! Parsing of the tracker's JSON search response into [`Candidate`]s.
//!
//! Response envelope: `{"data": [row, ...]}`, or `{"error": "..."}` when
//! nothing matched. Each row carries `id`, `title`, `author_info` (a JSON
//! string mapping author id to name), `size`, `seeders`, `leechers`,
//! `filetype`, and `catname`. Numeric fields may arrive as numbers or as
//! numeric strings.

use std::sync::LazyLock;

use bookhound_core::acquisition::TARGET_FORMAT;
use bookhound_core::matching::Candidate;
use regex::Regex;
use serde_json::Value;

/// Errors from decoding tracker payloads.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Malformed search response: {0}")]
    Envelope(String),

    #[error("Malformed search row: {0}")]
    Row(String),

    #[error("Response is not a torrent file")]
    NotTorrent,
}

static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*([0-9][0-9.,]*)\s*([kmgt]i?b|b|bytes)?\s*$").expect("valid regex")
});

/// Parse a search response body.
///
/// Rows that fail to parse are skipped with a warning; a body that is not
/// a recognisable envelope is an error.
pub fn parse_search_response(body: &str, base_url: &str) -> Result<Vec<Candidate>, ParseError> {
    let envelope: Value =
        serde_json::from_str(body).map_err(|e| ParseError::Envelope(e.to_string()))?;
    let Some(obj) = envelope.as_object() else {
        return Err(ParseError::Envelope("expected a JSON object".to_string()));
    };

    let rows = match obj.get("data") {
        Some(Value::Array(rows)) => rows,
        Some(_) => return Err(ParseError::Envelope("`data` is not an array".to_string())),
        None if obj.contains_key("error") => {
            tracing::debug!(error = %obj["error"], "Tracker returned no results");
            return Ok(Vec::new());
        }
        None => return Err(ParseError::Envelope("missing `data`".to_string())),
    };

    let mut candidates = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_row(row, base_url) {
            Ok(c) => candidates.push(c),
            Err(e) => tracing::warn!(error = %e, "Skipping unparseable search row"),
        }
    }
    Ok(candidates)
}

/// Decode one result row. The returned candidate is unscored.
pub fn parse_row(row: &Value, base_url: &str) -> Result<Candidate, ParseError> {
    let id = row
        .get("id")
        .and_then(value_as_string)
        .ok_or_else(|| ParseError::Row("missing id".to_string()))?;
    let title = row
        .get("title")
        .and_then(value_as_string)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ParseError::Row(format!("row {id}: missing title")))?;

    let author = row
        .get("author_info")
        .and_then(Value::as_str)
        .map(parse_author_info)
        .unwrap_or_default();

    let size = match row.get("size") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => parse_size(s),
        _ => None,
    }
    .ok_or_else(|| ParseError::Row(format!("row {id}: bad size")))?;

    let format = row
        .get("filetype")
        .and_then(Value::as_str)
        .map(normalize_format)
        .unwrap_or_default();

    Ok(Candidate {
        download_url: download_url(base_url, &id),
        id,
        title: title.trim().to_string(),
        author,
        size,
        seeders: peer_count(row.get("seeders")),
        leechers: peer_count(row.get("leechers")),
        format,
        category: row
            .get("catname")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confidence_score: 0.0,
    })
}

/// URL of the `.torrent` file for tracker id `id`.
pub fn download_url(base_url: &str, id: &str) -> String {
    format!("{}/tor/download.php?tid={id}", base_url.trim_end_matches('/'))
}

/// Decode the `author_info` field into a comma-separated author list.
///
/// Falls back to the raw string when it is not a JSON object.
pub fn parse_author_info(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Map<String, Value>>(raw) {
        Ok(map) => map
            .values()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Err(_) => raw.trim().to_string(),
    }
}

/// Parse a size such as `"2488130"`, `"1.2 MiB"` or `"850 KB"` into bytes.
pub fn parse_size(raw: &str) -> Option<i64> {
    let caps = SIZE_RE.captures(raw)?;
    let number: f64 = caps[1].replace(',', "").parse().ok()?;
    let multiplier = match caps.get(2).map(|m| m.as_str().to_ascii_lowercase()) {
        None => 1.0,
        Some(unit) if unit == "b" || unit == "bytes" => 1.0,
        Some(unit) => match unit.trim_end_matches('b').trim_end_matches('i') {
            "k" => 1024.0,
            "m" => 1024.0_f64.powi(2),
            "g" => 1024.0_f64.powi(3),
            "t" => 1024.0_f64.powi(4),
            _ => return None,
        },
    };
    Some((number * multiplier).round() as i64)
}

/// Lowercase the declared file type; a multi-format listing that includes
/// the target format counts as that format.
fn normalize_format(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.contains(&TARGET_FORMAT) {
        return TARGET_FORMAT.to_string();
    }
    tokens.first().copied().unwrap_or_default().to_string()
}

fn value_as_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_as_i64(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Peer count clamped to `0..=i32::MAX`; missing or malformed is 0.
fn peer_count(v: Option<&Value>) -> i32 {
    let n = v.and_then(value_as_i64).unwrap_or(0).max(0);
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Whether `bytes` looks like a bencoded torrent (a top-level dictionary).
pub fn looks_like_torrent(bytes: &[u8]) -> bool {
    bytes.first() == Some(&b'd') && bytes.last() == Some(&b'e')
}
