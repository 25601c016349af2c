//! Intraday → daily bar reduction, plus benchmark close-to-close returns.

use crate::error::{AnalysisError, AnalysisResult};
use crate::models::{BenchmarkClose, BenchmarkRow, DailyPriceBar, HourlyPriceBar};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Group hourly bars by (ticker, local calendar date) and build one daily bar
/// per group. Input order is irrelevant: each group is sorted by timestamp
/// before open/close are taken.
///
/// Output is sorted by (ticker, date).
pub fn to_daily(bars: &[HourlyPriceBar]) -> AnalysisResult<Vec<DailyPriceBar>> {
    let mut groups: BTreeMap<(&str, NaiveDate), Vec<&HourlyPriceBar>> = BTreeMap::new();
    for bar in bars {
        groups
            .entry((bar.ticker.as_str(), bar.datetime.date()))
            .or_default()
            .push(bar);
    }

    let mut daily = Vec::with_capacity(groups.len());
    for ((ticker, date), mut group) in groups {
        group.sort_by_key(|b| b.datetime);

        if let Some(pair) = group.windows(2).find(|w| w[0].datetime == w[1].datetime) {
            return Err(AnalysisError::integrity(format!(
                "{} has two bars at {}",
                ticker, pair[0].datetime
            )));
        }

        // Non-empty by construction.
        let first = group[0];
        let last = group[group.len() - 1];

        let open = first.open;
        if !(open > 0.0) {
            return Err(AnalysisError::integrity(format!(
                "{} {}: non-positive open {}",
                ticker, date, open
            )));
        }

        let close = last.close;
        let high = group.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
        let low = group.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let volume = group.iter().map(|b| b.volume).sum();

        daily.push(DailyPriceBar {
            ticker: ticker.to_string(),
            date,
            open,
            close,
            high,
            low,
            volume,
            ret: (close - open) / open,
            range: (high - low) / open,
        });
    }

    Ok(daily)
}

/// Close-to-close percentage change per benchmark symbol. The first date of
/// each symbol has no prior close and produces no row.
pub fn benchmark_returns(closes: &[BenchmarkClose]) -> AnalysisResult<Vec<BenchmarkRow>> {
    let mut by_symbol: BTreeMap<&str, Vec<&BenchmarkClose>> = BTreeMap::new();
    for c in closes {
        by_symbol.entry(c.symbol.as_str()).or_default().push(c);
    }

    let mut rows = Vec::new();
    for (symbol, mut series) in by_symbol {
        series.sort_by_key(|c| c.date);

        for w in series.windows(2) {
            let (prev, cur) = (w[0], w[1]);
            if prev.date == cur.date {
                return Err(AnalysisError::integrity(format!(
                    "benchmark {} has two closes on {}",
                    symbol, cur.date
                )));
            }
            if !(prev.close > 0.0) {
                return Err(AnalysisError::integrity(format!(
                    "benchmark {} {}: non-positive close {}",
                    symbol, prev.date, prev.close
                )));
            }
            rows.push(BenchmarkRow {
                symbol: symbol.to_string(),
                date: cur.date,
                ret: cur.close / prev.close - 1.0,
            });
        }
    }

    Ok(rows)
}
