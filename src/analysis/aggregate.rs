//! Daily sentiment consensus: reduces one (ticker, date)'s article scores to
//! a fixed feature vector.

use crate::models::{DailyAggregate, SentimentScore};
use chrono::NaiveDate;

/// Aggregate the scores of every article for `ticker` on `date`.
///
/// Returns `None` for an empty slice; an aggregate is never created without
/// at least one article. Order of `scores` does not matter.
///
/// * `sent_mean`: arithmetic mean of `score` (high = bullish)
/// * `sent_std`: population std of `score`, 0.0 when fewer than two articles
/// * `attention`: article count
/// * `bull_bear_ratio`: `#(score > 0) / (#(score < 0) + 1)`; the +1 is smoothing
pub fn aggregate(ticker: &str, date: NaiveDate, scores: &[SentimentScore]) -> Option<DailyAggregate> {
    if scores.is_empty() {
        return None;
    }

    let n = scores.len() as f64;
    let mean = scores.iter().map(|s| s.score).sum::<f64>() / n;

    // Single article: std defined as 0 by convention.
    let std = if scores.len() > 1 {
        let var = scores.iter().map(|s| (s.score - mean).powi(2)).sum::<f64>() / n;
        var.sqrt()
    } else {
        0.0
    };

    let bullish = scores.iter().filter(|s| s.score > 0.0).count();
    let bearish = scores.iter().filter(|s| s.score < 0.0).count();

    Some(DailyAggregate {
        ticker: ticker.to_string(),
        date,
        sent_mean: mean,
        sent_std: std,
        attention: scores.len() as u32,
        bull_bear_ratio: bullish as f64 / (bearish as f64 + 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(s: f64) -> SentimentScore {
        SentimentScore {
            score: s,
            positive: s.max(0.0),
            neutral: 1.0 - s.abs(),
            negative: (-s).max(0.0),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 5).unwrap()
    }

    #[test]
    fn test_empty_is_none() {
        assert!(aggregate("AAPL", day(), &[]).is_none());
    }

    #[test]
    fn test_attention_equals_len() {
        for n in 1..20 {
            let scores: Vec<_> = (0..n).map(|i| score(((i % 10) as f64 / 10.0) - 0.5)).collect();
            let agg = aggregate("AAPL", day(), &scores).unwrap();
            assert_eq!(agg.attention as usize, n);
        }
    }

    #[test]
    fn test_single_record_std_is_zero() {
        let agg = aggregate("AAPL", day(), &[score(0.7)]).unwrap();
        assert_eq!(agg.sent_std, 0.0);
        assert_eq!(agg.sent_mean, 0.7);
        assert_eq!(agg.bull_bear_ratio, 1.0);
    }

    #[test]
    fn test_bull_bear_ratio_three_two() {
        let scores = [score(0.4), score(0.9), score(0.1), score(-0.3), score(-0.8)];
        let agg = aggregate("AAPL", day(), &scores).unwrap();
        assert_eq!(agg.bull_bear_ratio, 1.0);
    }

    #[test]
    fn test_neutral_scores_count_neither_side() {
        let scores = [score(0.0), score(0.0), score(0.5)];
        let agg = aggregate("AAPL", day(), &scores).unwrap();
        assert_eq!(agg.bull_bear_ratio, 1.0);
    }

    #[test]
    fn test_population_std_and_order_independence() {
        let a = [score(0.5), score(-0.5), score(0.5), score(-0.5)];
        let b = [score(-0.5), score(-0.5), score(0.5), score(0.5)];
        let x = aggregate("AAPL", day(), &a).unwrap();
        let y = aggregate("AAPL", day(), &b).unwrap();
        assert!((x.sent_std - 0.5).abs() < 1e-12);
        assert_eq!(x, y);
    }
}
