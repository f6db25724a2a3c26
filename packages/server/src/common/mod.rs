//! Shared helpers used across the kernel.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use uuid::Uuid;

/// Time-ordered UUID for database primary keys.
///
/// V7 UUIDs sort by creation time, which gives better index locality and
/// lets "most recent row" queries tie-break on id.
pub fn db_id() -> Uuid {
    Uuid::now_v7()
}

/// Parse a human-readable duration: `"30s"`, `"2m"`, `"1h"`, or bare seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: u64 = value
        .parse()
        .with_context(|| format!("invalid duration: {s:?}"))?;
    let secs = match unit.trim() {
        "" | "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        other => bail!("unknown duration unit: {other:?}"),
    };
    Ok(Duration::from_secs(secs))
}

/// Parse a comma-separated duration list like `"30s,2m,10m"`.
pub fn parse_duration_list(s: &str) -> Result<Vec<Duration>> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse_duration)
        .collect()
}
