//! Expiration codec - TTL ポリシーとメタデータの相互変換
//!
//! バックエンドは文字列→文字列のメタデータしか持てないので、
//! [`StorageEntryOptions`] をここでエンコード／デコードします。
//!
//! # 永続化フォーマット
//! - `AbsoluteExpiration`: RFC 3339（UTC、秒未満は必要な桁だけ）。
//!   0000-9999 年の外は符号付きの年（`+10000-01-01T00:00:00Z`）で書く
//! - `SlidingExpiration`: `[-][d.]hh:mm:ss[.fffffff]`（100ns tick）。
//!   tick で割り切れない値だけ 9 桁（ns）で書く
//! - キーが無い = その次元は未設定
//!
//! sliding の表記は旧デプロイが書いたメタデータもそのまま読めるように
//! time-span 形式に合わせています。

use chrono::{DateTime, Datelike, SecondsFormat, TimeDelta, Utc};

use super::entry::Metadata;
use super::errors::{StorageError, StorageResult};
use super::options::StorageEntryOptions;

pub const ABSOLUTE_EXPIRATION_KEY: &str = "AbsoluteExpiration";
pub const SLIDING_EXPIRATION_KEY: &str = "SlidingExpiration";

const NANOS_PER_TICK: i128 = 100;
const NANOS_PER_SECOND: i128 = 1_000_000_000;
const NANOS_PER_MINUTE: i128 = NANOS_PER_SECOND * 60;
const NANOS_PER_HOUR: i128 = NANOS_PER_MINUTE * 60;
const NANOS_PER_DAY: i128 = NANOS_PER_HOUR * 24;
const TICK_DIGITS: usize = 7;
const NANO_DIGITS: usize = 9;

/// Encode a policy into backend metadata. Unset fields produce no key.
pub fn encode(options: &StorageEntryOptions) -> Metadata {
    let mut metadata = Metadata::new();

    if let Some(absolute) = options.absolute_expiration {
        metadata.insert(
            ABSOLUTE_EXPIRATION_KEY.to_string(),
            absolute.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        );
    }

    if let Some(sliding) = options.sliding_expiration {
        metadata.insert(SLIDING_EXPIRATION_KEY.to_string(), format_time_span(sliding));
    }

    metadata
}

/// Decode backend metadata into a policy.
///
/// Unknown keys are ignored. A malformed value is an error, never a default.
pub fn decode(metadata: &Metadata) -> StorageResult<StorageEntryOptions> {
    let mut options = StorageEntryOptions::default();

    if let Some(value) = metadata.get(ABSOLUTE_EXPIRATION_KEY) {
        let absolute =
            parse_instant(value).map_err(|reason| invalid(ABSOLUTE_EXPIRATION_KEY, value, reason))?;
        options.absolute_expiration = Some(absolute);
    }

    if let Some(value) = metadata.get(SLIDING_EXPIRATION_KEY) {
        let sliding =
            parse_time_span(value).map_err(|reason| invalid(SLIDING_EXPIRATION_KEY, value, reason))?;
        options.sliding_expiration = Some(sliding);
    }

    Ok(options)
}

/// Whether an entry written at `last_modified` with `metadata` is expired at `now`.
///
/// This is the only eviction predicate. Reads never call it.
pub fn is_expired(
    last_modified: DateTime<Utc>,
    metadata: &Metadata,
    now: DateTime<Utc>,
) -> StorageResult<bool> {
    Ok(decode(metadata)?.is_expired_at(last_modified, now))
}

fn invalid(key: &str, value: &str, reason: String) -> StorageError {
    StorageError::InvalidMetadata {
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

/// Parse an RFC 3339 instant, including the signed-year form chrono writes
/// for years outside 0000-9999.
fn parse_instant(value: &str) -> Result<DateTime<Utc>, String> {
    let err = match DateTime::parse_from_rfc3339(value) {
        Ok(parsed) => return Ok(parsed.with_timezone(&Utc)),
        Err(err) => err,
    };
    let (sign, rest) = match value.as_bytes().first() {
        Some(b'+') => (1, &value[1..]),
        Some(b'-') => (-1, &value[1..]),
        _ => return Err(err.to_string()),
    };
    let (year, tail) = rest.split_once('-').ok_or_else(|| err.to_string())?;
    if year.len() < 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err.to_string());
    }
    let year = year
        .parse::<i32>()
        .map_err(|e| format!("invalid year: {e}"))?
        * sign;

    // 2000 is a leap year, so any month/day that is valid in `year` parses here
    let placeholder =
        DateTime::parse_from_rfc3339(&format!("2000-{tail}")).map_err(|e| e.to_string())?;
    placeholder
        .with_year(year)
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| format!("year {year} is out of range"))
}

fn total_nanos(delta: TimeDelta) -> i128 {
    // num_seconds truncates toward zero and subsec_nanos carries the same sign
    delta.num_seconds() as i128 * NANOS_PER_SECOND + delta.subsec_nanos() as i128
}

/// Format a duration as `[-][d.]hh:mm:ss[.fffffff]`, or nine fraction digits
/// when the value is not a whole number of ticks.
fn format_time_span(delta: TimeDelta) -> String {
    let nanos = total_nanos(delta);
    let sign = if nanos < 0 { "-" } else { "" };
    let nanos = nanos.unsigned_abs();

    let days = nanos / NANOS_PER_DAY as u128;
    let hours = nanos % NANOS_PER_DAY as u128 / NANOS_PER_HOUR as u128;
    let minutes = nanos % NANOS_PER_HOUR as u128 / NANOS_PER_MINUTE as u128;
    let seconds = nanos % NANOS_PER_MINUTE as u128 / NANOS_PER_SECOND as u128;
    let fraction = nanos % NANOS_PER_SECOND as u128;

    let mut out = String::from(sign);
    if days > 0 {
        out.push_str(&format!("{days}."));
    }
    out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
    if fraction > 0 {
        if fraction % NANOS_PER_TICK as u128 == 0 {
            let ticks = fraction / NANOS_PER_TICK as u128;
            out.push_str(&format!(".{ticks:0width$}", width = TICK_DIGITS));
        } else {
            out.push_str(&format!(".{fraction:0width$}", width = NANO_DIGITS));
        }
    }
    out
}

/// Parse `[-]d`, `[-]hh:mm` or `[-][d.]hh:mm:ss[.f{1,9}]`.
fn parse_time_span(text: &str) -> Result<TimeDelta, String> {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    if body.is_empty() {
        return Err("empty time span".to_string());
    }

    let parts: Vec<&str> = body.split(':').collect();
    let (days, hours, minutes, seconds, fraction) = match parts.as_slice() {
        [days] => (parse_number(days, "days")?, 0, 0, 0, 0),
        [hours, minutes] => (
            0,
            parse_number(hours, "hours")?,
            parse_number(minutes, "minutes")?,
            0,
            0,
        ),
        [head, minutes, tail] => {
            let (days, hours) = match head.split_once('.') {
                Some((days, hours)) => (parse_number(days, "days")?, parse_number(hours, "hours")?),
                None => (0, parse_number(head, "hours")?),
            };
            let (seconds, fraction) = match tail.split_once('.') {
                Some((seconds, fraction)) => {
                    (parse_number(seconds, "seconds")?, parse_fraction(fraction)?)
                }
                None => (parse_number(tail, "seconds")?, 0),
            };
            (days, hours, parse_number(minutes, "minutes")?, seconds, fraction)
        }
        _ => return Err(format!("unexpected time span layout: {text}")),
    };

    if hours >= 24 || minutes >= 60 || seconds >= 60 {
        return Err(format!("time span component out of range: {text}"));
    }

    let nanos = days
        .checked_mul(NANOS_PER_DAY)
        .map(|total| {
            total
                + hours * NANOS_PER_HOUR
                + minutes * NANOS_PER_MINUTE
                + seconds * NANOS_PER_SECOND
                + fraction
        })
        .ok_or_else(|| format!("time span out of range: {text}"))?;
    let nanos = if negative { -nanos } else { nanos };

    let secs = i64::try_from(nanos / NANOS_PER_SECOND)
        .map_err(|_| format!("time span out of range: {text}"))?;
    let nanos = (nanos % NANOS_PER_SECOND) as i64;
    TimeDelta::try_seconds(secs)
        .and_then(|whole| whole.checked_add(&TimeDelta::nanoseconds(nanos)))
        .ok_or_else(|| format!("time span out of range: {text}"))
}

fn parse_number(part: &str, what: &str) -> Result<i128, String> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid {what}: {part:?}"));
    }
    part.parse::<i128>().map_err(|e| format!("invalid {what}: {e}"))
}

/// Fraction of a second in nanoseconds.
fn parse_fraction(part: &str) -> Result<i128, String> {
    if part.is_empty() || part.len() > NANO_DIGITS {
        return Err(format!("invalid fraction: {part:?}"));
    }
    let padded = format!("{part:0<width$}", width = NANO_DIGITS);
    parse_number(&padded, "fraction")
}
