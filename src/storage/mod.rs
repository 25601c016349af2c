use crate::analysis::prices::benchmark_returns;
use crate::error::AnalysisError;
use crate::models::{
    BenchmarkClose, BenchmarkRow, DailyAggregate, HourlyPriceBar, SentimentRecord, SentimentScore,
};
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use duckdb::{params, Connection};
use std::path::Path;
use tracing::{debug, info};

// ── Schema ────────────────────────────────────────────────────────────────────

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS news_sentiment (
    ticker      VARCHAR  NOT NULL,
    date        DATE     NOT NULL,
    score       DOUBLE   NOT NULL,
    positive    DOUBLE   NOT NULL,
    neutral     DOUBLE   NOT NULL,
    negative    DOUBLE   NOT NULL,
    -- File the row was imported from; re-importing a file replaces its rows
    source      VARCHAR  NOT NULL,
    loaded_at   TIMESTAMP NOT NULL
);

CREATE TABLE IF NOT EXISTS hourly_prices (
    ticker      VARCHAR   NOT NULL,
    datetime    TIMESTAMP NOT NULL,
    open        DOUBLE    NOT NULL,
    high        DOUBLE    NOT NULL,
    low         DOUBLE    NOT NULL,
    close       DOUBLE    NOT NULL,
    volume      BIGINT    NOT NULL DEFAULT 0,
    loaded_at   TIMESTAMP NOT NULL,
    PRIMARY KEY (ticker, datetime)
);

CREATE TABLE IF NOT EXISTS benchmark_returns (
    symbol      VARCHAR  NOT NULL,
    date        DATE     NOT NULL,
    close       DOUBLE   NOT NULL,
    -- NULL on each symbol's first date
    ret         DOUBLE,
    loaded_at   TIMESTAMP NOT NULL,
    PRIMARY KEY (symbol, date)
);

CREATE TABLE IF NOT EXISTS daily_aggregates (
    ticker           VARCHAR  NOT NULL,
    date             DATE     NOT NULL,
    sent_mean        DOUBLE   NOT NULL,
    sent_std         DOUBLE   NOT NULL,
    attention        INTEGER  NOT NULL,
    bull_bear_ratio  DOUBLE   NOT NULL,
    updated_at       TIMESTAMP NOT NULL,
    PRIMARY KEY (ticker, date)
);

CREATE SEQUENCE IF NOT EXISTS seq_analysis_runs START 1;

CREATE TABLE IF NOT EXISTS analysis_runs (
    id                  INTEGER PRIMARY KEY DEFAULT nextval('seq_analysis_runs'),
    started_at          TIMESTAMP NOT NULL,
    finished_at         TIMESTAMP,
    status              VARCHAR NOT NULL DEFAULT 'running',
    tickers_analyzed    INTEGER DEFAULT 0,
    tickers_failed      INTEGER DEFAULT 0,
    report_path         VARCHAR,
    error_msg           VARCHAR
);

CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TIMESTAMP NOT NULL
);
"#;

const INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_news_ticker_date ON news_sentiment (ticker, date);
CREATE INDEX IF NOT EXISTS idx_news_source      ON news_sentiment (source);
CREATE INDEX IF NOT EXISTS idx_hourly_ticker    ON hourly_prices (ticker);
CREATE INDEX IF NOT EXISTS idx_bench_date       ON benchmark_returns (date);
"#;

// ── Store contract ────────────────────────────────────────────────────────────

/// What the aggregation and analysis drivers need from persistence.
pub trait ConsensusStore {
    fn sentiment_scores(&self, ticker: &str, date: NaiveDate) -> Result<Vec<SentimentScore>>;

    /// Distinct dates with at least one sentiment record, ascending.
    fn sentiment_dates(&self, ticker: &str) -> Result<Vec<NaiveDate>>;

    /// Ordered by timestamp.
    fn hourly_bars(&self, ticker: &str) -> Result<Vec<HourlyPriceBar>>;

    /// Rows with a defined return, ordered by (symbol, date).
    fn benchmark_rows(&self) -> Result<Vec<BenchmarkRow>>;

    /// Ordered by date.
    fn daily_aggregates(&self, ticker: &str) -> Result<Vec<DailyAggregate>>;

    /// Insert or replace on (ticker, date).
    fn upsert_daily_aggregates(&self, aggregates: &[DailyAggregate]) -> Result<usize>;

    /// Insert; an existing (ticker, date) is a `DataIntegrity` error.
    fn insert_daily_aggregate(&self, aggregate: &DailyAggregate) -> Result<()>;
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

#[derive(Debug, Clone, Default)]
pub struct StoreCounts {
    pub sentiment_records: i64,
    pub tickers: i64,
    pub hourly_bars: i64,
    pub benchmark_rows: i64,
    pub daily_aggregates: i64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open DuckDB at {:?}", path))?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    pub fn run_migrations(&self) -> Result<()> {
        info!("Running migrations…");
        self.conn.execute_batch(DDL).context("DDL failed")?;
        self.conn.execute_batch(INDEXES).context("Index creation failed")?;
        self.conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, ?)",
            params![Utc::now().naive_utc()],
        )?;
        info!("Migrations done.");
        Ok(())
    }

    // ── Sentiment ─────────────────────────────────────────────────────────────

    /// Replace every row previously imported from `source` with `records`.
    /// Re-running the same import is idempotent.
    pub fn replace_sentiment(&self, source: &str, records: &[SentimentRecord]) -> Result<usize> {
        let now = Utc::now().naive_utc();
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx
            .execute("DELETE FROM news_sentiment WHERE source = ?", params![source])
            .with_context(|| format!("clear sentiment from {}", source))?;
        if removed > 0 {
            debug!("{}: replacing {} earlier sentiment rows", source, removed);
        }

        for rec in records {
            let s = &rec.sentiment;
            tx.execute(
                r#"INSERT INTO news_sentiment
                       (ticker, date, score, positive, neutral, negative, source, loaded_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
                params![rec.ticker, rec.date, s.score, s.positive, s.neutral, s.negative, source, now],
            )
            .with_context(|| format!("insert sentiment {} {}", rec.ticker, rec.date))?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    pub fn sentiment_tickers(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT ticker FROM news_sentiment ORDER BY ticker")?;
        let tickers = stmt
            .query_map([], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tickers)
    }

    // ── Prices ────────────────────────────────────────────────────────────────

    /// Upsert bars — idempotent, safe to re-run on same data.
    pub fn upsert_hourly_bars(&self, bars: &[HourlyPriceBar]) -> Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().naive_utc();
        let tx = self.conn.unchecked_transaction()?;
        let sql = r#"
            INSERT INTO hourly_prices
                (ticker, datetime, open, high, low, close, volume, loaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (ticker, datetime) DO UPDATE SET
                open      = excluded.open,
                high      = excluded.high,
                low       = excluded.low,
                close     = excluded.close,
                volume    = excluded.volume,
                loaded_at = excluded.loaded_at
        "#;

        for bar in bars {
            tx.execute(
                sql,
                params![bar.ticker, bar.datetime, bar.open, bar.high, bar.low, bar.close, bar.volume, now],
            )
            .with_context(|| format!("insert bar {} {}", bar.ticker, bar.datetime))?;
        }

        tx.commit()?;
        Ok(bars.len())
    }

    /// Upsert closes, then recompute close-to-close returns for every
    /// affected symbol from its full stored history.
    pub fn upsert_benchmark_closes(&self, closes: &[BenchmarkClose]) -> Result<usize> {
        if closes.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().naive_utc();
        let tx = self.conn.unchecked_transaction()?;
        for c in closes {
            tx.execute(
                r#"INSERT INTO benchmark_returns (symbol, date, close, ret, loaded_at)
                   VALUES (?, ?, ?, NULL, ?)
                   ON CONFLICT (symbol, date) DO UPDATE SET
                       close = excluded.close,
                       loaded_at = excluded.loaded_at"#,
                params![c.symbol, c.date, c.close, now],
            )
            .with_context(|| format!("insert benchmark {} {}", c.symbol, c.date))?;
        }

        let mut symbols: Vec<&str> = closes.iter().map(|c| c.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols.dedup();

        for symbol in symbols {
            let history = {
                let mut stmt = tx.prepare(
                    "SELECT symbol, date, close FROM benchmark_returns WHERE symbol = ? ORDER BY date",
                )?;
                stmt.query_map(params![symbol], |r| {
                    Ok(BenchmarkClose {
                        symbol: r.get(0)?,
                        date: r.get(1)?,
                        close: r.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?
            };

            for row in benchmark_returns(&history)? {
                tx.execute(
                    "UPDATE benchmark_returns SET ret = ? WHERE symbol = ? AND date = ?",
                    params![row.ret, row.symbol, row.date],
                )?;
            }
        }

        tx.commit()?;
        Ok(closes.len())
    }

    // ── Stats ─────────────────────────────────────────────────────────────────

    fn count(&self, sql: &str) -> Result<i64> {
        let mut s = self.conn.prepare(sql)?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let (first_date, last_date): (Option<NaiveDate>, Option<NaiveDate>) = {
            let mut s = self.conn.prepare("SELECT MIN(date), MAX(date) FROM news_sentiment")?;
            s.query_row([], |r| Ok((r.get(0)?, r.get(1)?)))?
        };
        Ok(StoreCounts {
            sentiment_records: self.count("SELECT COUNT(*) FROM news_sentiment")?,
            tickers: self.count("SELECT COUNT(DISTINCT ticker) FROM news_sentiment")?,
            hourly_bars: self.count("SELECT COUNT(*) FROM hourly_prices")?,
            benchmark_rows: self.count("SELECT COUNT(*) FROM benchmark_returns")?,
            daily_aggregates: self.count("SELECT COUNT(*) FROM daily_aggregates")?,
            first_date,
            last_date,
        })
    }

    // ── Analysis run log ──────────────────────────────────────────────────────

    pub fn begin_analysis_run(&self) -> Result<i64> {
        let id: i64 = self.conn.query_row(
            "INSERT INTO analysis_runs (started_at, status) VALUES (?, 'running') RETURNING id",
            params![Utc::now().naive_utc()],
            |r| r.get(0),
        )?;
        Ok(id)
    }

    pub fn finish_analysis_run(
        &self,
        run_id: i64,
        analyzed: usize,
        failed: usize,
        report_path: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        self.conn.execute(
            r#"UPDATE analysis_runs SET
               finished_at = ?, status = ?,
               tickers_analyzed = ?, tickers_failed = ?, report_path = ?, error_msg = ?
               WHERE id = ?"#,
            params![
                Utc::now().naive_utc(),
                if error.is_none() { "success" } else { "error" },
                analyzed as i64,
                failed as i64,
                report_path,
                error,
                run_id,
            ],
        )?;
        Ok(())
    }

    pub fn last_run_status(&self) -> Result<Option<String>> {
        let mut s = self
            .conn
            .prepare("SELECT status FROM analysis_runs ORDER BY id DESC LIMIT 1")?;
        let mut rows = s.query_map([], |r| r.get(0))?;
        Ok(rows.next().transpose()?)
    }
}

fn read_aggregate(r: &duckdb::Row<'_>) -> duckdb::Result<DailyAggregate> {
    let attention: i64 = r.get(4)?;
    Ok(DailyAggregate {
        ticker: r.get(0)?,
        date: r.get(1)?,
        sent_mean: r.get(2)?,
        sent_std: r.get(3)?,
        attention: attention.max(0) as u32,
        bull_bear_ratio: r.get(5)?,
    })
}

impl ConsensusStore for Repository {
    fn sentiment_scores(&self, ticker: &str, date: NaiveDate) -> Result<Vec<SentimentScore>> {
        let mut stmt = self.conn.prepare(
            "SELECT score, positive, neutral, negative FROM news_sentiment WHERE ticker = ? AND date = ?",
        )?;
        let scores = stmt
            .query_map(params![ticker, date], |r| {
                Ok(SentimentScore {
                    score: r.get(0)?,
                    positive: r.get(1)?,
                    neutral: r.get(2)?,
                    negative: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("sentiment for {} {}", ticker, date))?;
        Ok(scores)
    }

    fn sentiment_dates(&self, ticker: &str) -> Result<Vec<NaiveDate>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT date FROM news_sentiment WHERE ticker = ? ORDER BY date")?;
        let dates = stmt
            .query_map(params![ticker], |r| r.get(0))?
            .collect::<Result<Vec<NaiveDate>, _>>()?;
        Ok(dates)
    }

    fn hourly_bars(&self, ticker: &str) -> Result<Vec<HourlyPriceBar>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT ticker, datetime, open, high, low, close, volume
               FROM hourly_prices WHERE ticker = ? ORDER BY datetime"#,
        )?;
        let bars = stmt
            .query_map(params![ticker], |r| {
                Ok(HourlyPriceBar {
                    ticker: r.get(0)?,
                    datetime: r.get(1)?,
                    open: r.get(2)?,
                    high: r.get(3)?,
                    low: r.get(4)?,
                    close: r.get(5)?,
                    volume: r.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("hourly bars for {}", ticker))?;
        Ok(bars)
    }

    fn benchmark_rows(&self) -> Result<Vec<BenchmarkRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT symbol, date, ret FROM benchmark_returns WHERE ret IS NOT NULL ORDER BY symbol, date",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(BenchmarkRow {
                    symbol: r.get(0)?,
                    date: r.get(1)?,
                    ret: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn daily_aggregates(&self, ticker: &str) -> Result<Vec<DailyAggregate>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT ticker, date, sent_mean, sent_std, attention, bull_bear_ratio
               FROM daily_aggregates WHERE ticker = ? ORDER BY date"#,
        )?;
        let aggs = stmt
            .query_map(params![ticker], read_aggregate)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(aggs)
    }

    fn upsert_daily_aggregates(&self, aggregates: &[DailyAggregate]) -> Result<usize> {
        if aggregates.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().naive_utc();
        let tx = self.conn.unchecked_transaction()?;
        for a in aggregates {
            tx.execute(
                r#"INSERT INTO daily_aggregates
                       (ticker, date, sent_mean, sent_std, attention, bull_bear_ratio, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT (ticker, date) DO UPDATE SET
                       sent_mean       = excluded.sent_mean,
                       sent_std        = excluded.sent_std,
                       attention       = excluded.attention,
                       bull_bear_ratio = excluded.bull_bear_ratio,
                       updated_at      = excluded.updated_at"#,
                params![a.ticker, a.date, a.sent_mean, a.sent_std, a.attention as i64, a.bull_bear_ratio, now],
            )
            .with_context(|| format!("upsert aggregate {} {}", a.ticker, a.date))?;
        }
        tx.commit()?;
        Ok(aggregates.len())
    }

    fn insert_daily_aggregate(&self, a: &DailyAggregate) -> Result<()> {
        let existing: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM daily_aggregates WHERE ticker = ? AND date = ?",
            params![a.ticker, a.date],
            |r| r.get(0),
        )?;
        if existing > 0 {
            return Err(AnalysisError::integrity(format!(
                "daily aggregate for {} {} already exists",
                a.ticker, a.date
            ))
            .into());
        }

        self.conn
            .execute(
                r#"INSERT INTO daily_aggregates
                       (ticker, date, sent_mean, sent_std, attention, bull_bear_ratio, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)"#,
                params![
                    a.ticker,
                    a.date,
                    a.sent_mean,
                    a.sent_std,
                    a.attention as i64,
                    a.bull_bear_ratio,
                    Utc::now().naive_utc()
                ],
            )
            .with_context(|| format!("insert aggregate {} {}", a.ticker, a.date))?;
        Ok(())
    }
}
