//! Joins daily sentiment to the *following* trading day's outcome.
//!
//! "Next" means the next date present in that ticker's price series, not the
//! next calendar day: Friday sentiment is paired with Monday's session.

use crate::models::{benchmark_column, AlignedRow, BenchmarkRow, DailyAggregate, DailyPriceBar};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Per-date price context after the shift.
struct Shifted {
    ret: f64,
    next_return: Option<f64>,
    next_range: Option<f64>,
    ret_lags: Vec<Option<f64>>,
}

/// Align aggregates with next-day return/range.
///
/// Aggregates with no same-date price row are dropped, as are rows whose
/// ticker has no later price date. When `benchmarks` is given every row
/// carries every benchmark column, `None` where that date is missing.
/// Output is sorted by (ticker, date).
pub fn align(
    aggregates: &[DailyAggregate],
    daily_prices: &[DailyPriceBar],
    benchmarks: Option<&[BenchmarkRow]>,
    return_lags: usize,
) -> Vec<AlignedRow> {
    let shifted = shift_prices(daily_prices, return_lags);

    let bench = benchmarks.map(pivot_benchmarks);

    let mut rows: Vec<AlignedRow> = aggregates
        .iter()
        .filter_map(|agg| {
            let px = shifted.get(&(agg.ticker.as_str(), agg.date))?;
            let (next_return, next_range) = (px.next_return?, px.next_range?);

            let benchmarks = match &bench {
                Some((columns, by_date)) => columns
                    .iter()
                    .map(|col| {
                        let v = by_date.get(&agg.date).and_then(|m| m.get(col)).copied();
                        (col.clone(), v)
                    })
                    .collect(),
                None => BTreeMap::new(),
            };

            Some(AlignedRow {
                ticker: agg.ticker.clone(),
                date: agg.date,
                sent_mean: agg.sent_mean,
                sent_std: agg.sent_std,
                attention: agg.attention,
                bull_bear_ratio: agg.bull_bear_ratio,
                ret: px.ret,
                next_return,
                next_range,
                ret_lags: px.ret_lags.clone(),
                benchmarks,
            })
        })
        .collect();

    rows.sort_by(|a, b| (&a.ticker, a.date).cmp(&(&b.ticker, b.date)));
    rows
}

/// Sort by (ticker, date) and shift return/range by -1 and lags by +k within
/// each ticker.
fn shift_prices(daily_prices: &[DailyPriceBar], return_lags: usize) -> HashMap<(&str, NaiveDate), Shifted> {
    let mut sorted: Vec<&DailyPriceBar> = daily_prices.iter().collect();
    sorted.sort_by(|a, b| (&a.ticker, a.date).cmp(&(&b.ticker, b.date)));

    let mut out = HashMap::with_capacity(sorted.len());
    for series in sorted.chunk_by(|a, b| a.ticker == b.ticker) {
        for (i, bar) in series.iter().enumerate() {
            let next = series.get(i + 1);
            let ret_lags = (1..=return_lags)
                .map(|k| i.checked_sub(k).map(|j| series[j].ret))
                .collect();

            out.insert(
                (bar.ticker.as_str(), bar.date),
                Shifted {
                    ret: bar.ret,
                    next_return: next.map(|n| n.ret),
                    next_range: next.map(|n| n.range),
                    ret_lags,
                },
            );
        }
    }
    out
}

/// Benchmark rows pivoted to `date → column → return`, plus the column set.
fn pivot_benchmarks(rows: &[BenchmarkRow]) -> (BTreeSet<String>, HashMap<NaiveDate, HashMap<String, f64>>) {
    let mut columns = BTreeSet::new();
    let mut by_date: HashMap<NaiveDate, HashMap<String, f64>> = HashMap::new();
    for row in rows {
        let col = benchmark_column(&row.symbol);
        columns.insert(col.clone());
        by_date.entry(row.date).or_default().insert(col, row.ret);
    }
    (columns, by_date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    fn agg(ticker: &str, day: u32, sent_mean: f64) -> DailyAggregate {
        DailyAggregate {
            ticker: ticker.to_string(),
            date: d(day),
            sent_mean,
            sent_std: 0.1,
            attention: 3,
            bull_bear_ratio: 1.0,
        }
    }

    fn px(ticker: &str, day: u32, ret: f64) -> DailyPriceBar {
        DailyPriceBar {
            ticker: ticker.to_string(),
            date: d(day),
            open: 100.0,
            close: 100.0 * (1.0 + ret),
            high: 101.0,
            low: 99.0,
            volume: 1_000,
            ret,
            range: 0.02 + ret.abs(),
        }
    }

    #[test]
    fn test_end_to_end_scenario() {
        let aggs = vec![agg("TEST", 1, 0.5), agg("TEST", 2, -0.3), agg("TEST", 3, 0.1)];
        let prices = vec![px("TEST", 1, 0.01), px("TEST", 2, -0.02), px("TEST", 3, 0.03)];

        let rows = align(&aggs, &prices, None, 0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, d(1));
        assert_eq!(rows[0].next_return, -0.02);
        assert_eq!(rows[1].date, d(2));
        assert_eq!(rows[1].next_return, 0.03);
        assert_eq!(rows[0].sent_mean, 0.5);
    }

    #[test]
    fn test_next_is_next_trading_date_not_calendar_day() {
        let aggs = vec![agg("TEST", 2, 0.2)];
        // Gap over the weekend: 2 → 5.
        let prices = vec![px("TEST", 5, 0.04), px("TEST", 2, 0.01)];
        let rows = align(&aggs, &prices, None, 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].next_return, 0.04);
    }

    #[test]
    fn test_last_date_per_ticker_dropped_and_no_cross_ticker_shift() {
        let aggs = vec![agg("AAA", 1, 0.1), agg("AAA", 2, 0.2), agg("BBB", 1, 0.3), agg("BBB", 2, 0.4)];
        let prices = vec![px("AAA", 1, 0.01), px("AAA", 2, 0.02), px("BBB", 1, 0.03), px("BBB", 2, 0.04)];
        let rows = align(&aggs, &prices, None, 0);
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].ticker.as_str(), rows[0].next_return), ("AAA", 0.02));
        assert_eq!((rows[1].ticker.as_str(), rows[1].next_return), ("BBB", 0.04));
    }

    #[test]
    fn test_aggregate_without_price_dropped() {
        let aggs = vec![agg("TEST", 1, 0.1), agg("TEST", 4, 0.2)];
        let prices = vec![px("TEST", 1, 0.01), px("TEST", 2, 0.02), px("TEST", 3, 0.03)];
        let rows = align(&aggs, &prices, None, 0);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, d(1));
    }

    #[test]
    fn test_lagged_returns() {
        let aggs: Vec<_> = (1..=4).map(|i| agg("TEST", i, 0.0)).collect();
        let prices: Vec<_> = (1..=5).map(|i| px("TEST", i, i as f64 / 100.0)).collect();
        let rows = align(&aggs, &prices, None, 2);
        assert_eq!(rows[0].ret_lags, vec![None, None]);
        assert_eq!(rows[1].ret_lags, vec![Some(0.01), None]);
        assert_eq!(rows[3].ret_lags, vec![Some(0.03), Some(0.02)]);
        assert_eq!(rows[3].ret, 0.04);
    }

    #[test]
    fn test_benchmarks_left_joined_with_absent_markers() {
        let aggs = vec![agg("TEST", 1, 0.1), agg("TEST", 2, 0.2)];
        let prices = vec![px("TEST", 1, 0.01), px("TEST", 2, 0.02), px("TEST", 3, 0.03)];
        let bench = vec![
            BenchmarkRow { symbol: "SPY".into(), date: d(1), ret: 0.005 },
            BenchmarkRow { symbol: "^VIX".into(), date: d(2), ret: -0.1 },
        ];
        let rows = align(&aggs, &prices, Some(&bench), 0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].benchmarks.get("spy_return"), Some(&Some(0.005)));
        assert_eq!(rows[0].benchmarks.get("vix_return"), Some(&None));
        assert_eq!(rows[1].benchmarks.get("spy_return"), Some(&None));
        assert_eq!(rows[1].benchmarks.get("vix_return"), Some(&Some(-0.1)));
    }
}
