use crate::models::{
    BenchmarkClose, HourlyPriceBar, RawBenchmarkRow, RawHourlyRow, RawSentimentRow, SentimentRecord,
    SentimentScore,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

// ── Parsers ───────────────────────────────────────────────────────────────────

fn is_blank(s: &str) -> bool {
    s.is_empty() || s == "N/A" || s == "-" || s == "—" || s.eq_ignore_ascii_case("nan")
}

/// Parse price: thousands separators and a leading `$` are removed, anything
/// else must be a plain float.
/// "$1,234.56" → 1234.56 | "187.4" → 187.4 | "0.5abc" / "(12)" → None
pub fn parse_price(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_blank(s) {
        return None;
    }
    let cleaned = s.strip_prefix('$').unwrap_or(s).replace(',', "");
    cleaned.parse().ok().filter(|v: &f64| v.is_finite())
}

/// Parse volume with K/M/B suffixes.
/// "1.2M" → 1,200,000 | "345K" → 345,000 | "12345" → 12345 | "12345.0" → 12345
pub fn parse_volume_shorthand(s: &str) -> Option<i64> {
    let s = s.trim().to_uppercase().replace(',', "");
    if is_blank(&s) {
        return None;
    }

    let (num_str, multiplier) = if let Some(n) = s.strip_suffix('B') {
        (n, 1_000_000_000.0)
    } else if let Some(n) = s.strip_suffix('M') {
        (n, 1_000_000.0)
    } else if let Some(n) = s.strip_suffix('K') {
        (n, 1_000.0)
    } else {
        (s.as_str(), 1.0)
    };

    let num: f64 = num_str.trim().parse().ok()?;
    if !num.is_finite() || num < 0.0 {
        return None;
    }
    Some((num * multiplier).round() as i64)
}

/// Dates: ISO first, then the common US/EU layouts. A full timestamp is
/// accepted and truncated to its local date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%b %d, %Y", "%m/%d/%Y", "%d %b %Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    parse_datetime(s).map(|dt| dt.date())
}

/// Timestamps with or without a UTC offset. An offset is dropped, keeping
/// the exchange-local wall-clock time:
/// "2025-01-02 09:30:00-05:00" → 2025-01-02T09:30:00.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    None
}

pub fn normalise_symbol(s: &str) -> String {
    s.trim().to_uppercase()
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, String> {
    match value.as_deref().map(str::trim) {
        Some(v) if !is_blank(v) => Ok(v),
        _ => Err(format!("missing {}", field)),
    }
}

fn number(value: &Option<String>, field: &str) -> Result<f64, String> {
    let raw = required(value, field)?;
    parse_price(raw).ok_or_else(|| format!("invalid {} {:?}", field, raw))
}

fn in_range(v: f64, lo: f64, hi: f64, field: &str) -> Result<f64, String> {
    if (lo..=hi).contains(&v) {
        Ok(v)
    } else {
        Err(format!("{} {} outside [{}, {}]", field, v, lo, hi))
    }
}

// ── Sentiment CSV → SentimentRecord ───────────────────────────────────────────

pub fn sentiment_row_to_record(row: &RawSentimentRow) -> Result<SentimentRecord, String> {
    let ticker = normalise_symbol(required(&row.ticker, "ticker")?);
    let raw_date = required(&row.date, "date")?;
    let date = parse_date(raw_date).ok_or_else(|| format!("invalid date {:?}", raw_date))?;

    let sentiment = SentimentScore {
        score: in_range(number(&row.score, "score")?, -1.0, 1.0, "score")?,
        positive: in_range(number(&row.positive, "positive")?, 0.0, 1.0, "positive")?,
        neutral: in_range(number(&row.neutral, "neutral")?, 0.0, 1.0, "neutral")?,
        negative: in_range(number(&row.negative, "negative")?, 0.0, 1.0, "negative")?,
    };

    Ok(SentimentRecord { ticker, date, sentiment })
}

// ── Hourly CSV → HourlyPriceBar ───────────────────────────────────────────────

pub fn hourly_row_to_bar(fallback_ticker: Option<&str>, row: &RawHourlyRow) -> Result<HourlyPriceBar, String> {
    let ticker = match required(&row.ticker, "ticker") {
        Ok(t) => normalise_symbol(t),
        Err(e) => fallback_ticker.map(normalise_symbol).ok_or(e)?,
    };
    let raw_dt = required(&row.datetime, "datetime")?;
    let datetime = parse_datetime(raw_dt).ok_or_else(|| format!("invalid datetime {:?}", raw_dt))?;

    let open = number(&row.open, "open")?;
    let high = number(&row.high, "high")?;
    let low = number(&row.low, "low")?;
    let close = number(&row.close, "close")?;
    if high < low {
        return Err(format!("high {} below low {}", high, low));
    }
    let volume = match row.volume.as_deref().map(str::trim) {
        Some(v) if !is_blank(v) => {
            parse_volume_shorthand(v).ok_or_else(|| format!("invalid volume {:?}", v))?
        }
        _ => 0,
    };

    Ok(HourlyPriceBar {
        ticker,
        datetime,
        open,
        high,
        low,
        close,
        volume,
    })
}

// ── Benchmark CSV → BenchmarkClose ────────────────────────────────────────────

pub fn benchmark_row_to_close(row: &RawBenchmarkRow) -> Result<BenchmarkClose, String> {
    let symbol = normalise_symbol(required(&row.symbol, "symbol")?);
    let raw_date = required(&row.date, "date")?;
    let date = parse_date(raw_date).ok_or_else(|| format!("invalid date {:?}", raw_date))?;
    let close = number(&row.close, "close")?;
    if close <= 0.0 {
        return Err(format!("non-positive close {}", close));
    }
    Ok(BenchmarkClose { symbol, date, close })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
