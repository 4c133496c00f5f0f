//! Persistence for active signals, one row per symbol.

use crate::error::Result;
use crate::types::{Bias, HtfTrend, Signal, SignalSource};
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Storage for the active signal of each symbol.
pub trait SignalRepository: Send + Sync {
    fn load_all(&self) -> Result<Vec<Signal>>;

    fn get(&self, symbol: &str) -> Result<Option<Signal>>;

    /// Insert or replace the signal for `signal.symbol`.
    fn upsert(&self, signal: &Signal) -> Result<()>;

    fn remove(&self, symbol: &str) -> Result<()>;
}

/// In-process repository. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemorySignalRepository {
    signals: DashMap<String, Signal>,
}

impl MemorySignalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

impl SignalRepository for MemorySignalRepository {
    fn load_all(&self) -> Result<Vec<Signal>> {
        Ok(self.signals.iter().map(|e| e.value().clone()).collect())
    }

    fn get(&self, symbol: &str) -> Result<Option<Signal>> {
        Ok(self.signals.get(symbol).map(|e| e.value().clone()))
    }

    fn upsert(&self, signal: &Signal) -> Result<()> {
        self.signals.insert(signal.symbol.clone(), signal.clone());
        Ok(())
    }

    fn remove(&self, symbol: &str) -> Result<()> {
        self.signals.remove(symbol);
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT id, symbol, bias, confidence, entry_price, entry_low, entry_high,
        stop_loss, take_profit, htf_trend, source, provisional,
        created_at, last_changed_at, expires_at
     FROM active_signals";

/// SQLite-backed repository in the `active_signals` table. Timestamps are unix milliseconds.
pub struct SqliteSignalRepository {
    conn: Mutex<Connection>,
}

impl SqliteSignalRepository {
    /// Open (or create) the database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        info!("Signal repository initialized");
        Ok(repo)
    }

    /// In-memory database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        debug!("In-memory signal repository initialized");
        Ok(repo)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS active_signals (
                symbol TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                bias TEXT NOT NULL,
                confidence REAL NOT NULL,
                entry_price REAL NOT NULL,
                entry_low REAL NOT NULL,
                entry_high REAL NOT NULL,
                stop_loss REAL NOT NULL,
                take_profit REAL NOT NULL,
                htf_trend TEXT NOT NULL,
                source TEXT NOT NULL,
                provisional INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_changed_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_active_signals_expires ON active_signals(expires_at)",
            [],
        )?;
        Ok(())
    }

    /// Number of stored rows.
    pub fn count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM active_signals", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn parse_column<T>(
    row: &Row<'_>,
    idx: usize,
    parse: impl Fn(&str) -> Option<T>,
) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("invalid value {:?}", raw).into(),
        )
    })
}

fn millis_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let ms: i64 = row.get(idx)?;
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("invalid timestamp {}", ms).into(),
        )
    })
}

fn signal_from_row(row: &Row<'_>) -> rusqlite::Result<Signal> {
    Ok(Signal {
        id: parse_column(row, 0, |s| Uuid::parse_str(s).ok())?,
        symbol: row.get(1)?,
        bias: parse_column(row, 2, Bias::from_str)?,
        confidence: row.get(3)?,
        entry_price: row.get(4)?,
        entry_low: row.get(5)?,
        entry_high: row.get(6)?,
        stop_loss: row.get(7)?,
        take_profit: row.get(8)?,
        htf_trend: parse_column(row, 9, HtfTrend::from_str)?,
        source: parse_column(row, 10, SignalSource::from_str)?,
        provisional: row.get(11)?,
        created_at: millis_column(row, 12)?,
        last_changed_at: millis_column(row, 13)?,
        expires_at: millis_column(row, 14)?,
    })
}

impl SignalRepository for SqliteSignalRepository {
    fn load_all(&self) -> Result<Vec<Signal>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!("{} ORDER BY symbol", SELECT_COLUMNS))?;
        let signals = stmt
            .query_map([], signal_from_row)?
            .collect::<rusqlite::Result<Vec<Signal>>>()?;
        Ok(signals)
    }

    fn get(&self, symbol: &str) -> Result<Option<Signal>> {
        let conn = self.lock();
        let signal = conn
            .query_row(
                &format!("{} WHERE symbol = ?1", SELECT_COLUMNS),
                params![symbol],
                signal_from_row,
            )
            .optional()?;
        Ok(signal)
    }

    fn upsert(&self, signal: &Signal) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO active_signals (
                symbol, id, bias, confidence, entry_price, entry_low, entry_high,
                stop_loss, take_profit, htf_trend, source, provisional,
                created_at, last_changed_at, expires_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
             ON CONFLICT(symbol) DO UPDATE SET
                id = excluded.id,
                bias = excluded.bias,
                confidence = excluded.confidence,
                entry_price = excluded.entry_price,
                entry_low = excluded.entry_low,
                entry_high = excluded.entry_high,
                stop_loss = excluded.stop_loss,
                take_profit = excluded.take_profit,
                htf_trend = excluded.htf_trend,
                source = excluded.source,
                provisional = excluded.provisional,
                created_at = excluded.created_at,
                last_changed_at = excluded.last_changed_at,
                expires_at = excluded.expires_at",
            params![
                signal.symbol,
                signal.id.to_string(),
                signal.bias.as_str(),
                signal.confidence,
                signal.entry_price,
                signal.entry_low,
                signal.entry_high,
                signal.stop_loss,
                signal.take_profit,
                signal.htf_trend.as_str(),
                signal.source.as_str(),
                signal.provisional,
                signal.created_at.timestamp_millis(),
                signal.last_changed_at.timestamp_millis(),
                signal.expires_at.timestamp_millis(),
            ],
        )?;
        tx.commit()?;
        debug!("Persisted {} signal for {}", signal.bias, signal.symbol);
        Ok(())
    }

    fn remove(&self, symbol: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM active_signals WHERE symbol = ?1", params![symbol])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signal(symbol: &str, bias: Bias) -> Signal {
        let now = Utc.timestamp_millis_opt(1_709_294_400_123).unwrap();
        Signal {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            bias,
            confidence: 72.5,
            entry_price: 100.0,
            entry_low: 99.5,
            entry_high: 100.5,
            stop_loss: 97.0,
            take_profit: 108.0,
            htf_trend: HtfTrend::Bullish,
            source: SignalSource::DominantTf,
            provisional: true,
            created_at: now,
            last_changed_at: now,
            expires_at: now + Duration::hours(4),
        }
    }

    fn exercise(repo: &dyn SignalRepository) {
        assert!(repo.load_all().unwrap().is_empty());
        assert!(repo.get("BTC").unwrap().is_none());

        let btc = signal("BTC", Bias::Buy);
        repo.upsert(&btc).unwrap();
        repo.upsert(&signal("ETH", Bias::Sell)).unwrap();
        assert_eq!(repo.get("BTC").unwrap(), Some(btc.clone()));

        let mut replaced = btc.clone();
        replaced.bias = Bias::Sell;
        replaced.confidence = 61.0;
        repo.upsert(&replaced).unwrap();
        assert_eq!(repo.get("BTC").unwrap(), Some(replaced));
        assert_eq!(repo.load_all().unwrap().len(), 2);

        repo.remove("BTC").unwrap();
        assert!(repo.get("BTC").unwrap().is_none());
        repo.remove("BTC").unwrap();
        assert_eq!(repo.load_all().unwrap().len(), 1);
    }

    #[test]
    fn test_memory_repository() {
        let repo = MemorySignalRepository::new();
        exercise(&repo);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_sqlite_repository() {
        let repo = SqliteSignalRepository::new_in_memory().unwrap();
        exercise(&repo);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_sqlite_round_trips_every_field() {
        let repo = SqliteSignalRepository::new_in_memory().unwrap();
        let original = signal("SOL", Bias::Buy);
        repo.upsert(&original).unwrap();

        let loaded = repo.load_all().unwrap();
        assert_eq!(loaded, vec![original]);
    }

    #[test]
    fn test_sqlite_rejects_corrupt_rows() {
        let repo = SqliteSignalRepository::new_in_memory().unwrap();
        repo.upsert(&signal("ADA", Bias::Buy)).unwrap();
        repo.lock()
            .execute("UPDATE active_signals SET bias = 'MAYBE'", [])
            .unwrap();
        assert!(repo.get("ADA").is_err());
    }

    #[test]
    fn test_sqlite_persists_across_connections() {
        let path = std::env::temp_dir().join(format!("omen_repo_{}.db", Uuid::new_v4()));
        {
            let repo = SqliteSignalRepository::new(&path).unwrap();
            repo.upsert(&signal("LINK", Bias::Sell)).unwrap();
        }
        let reopened = SqliteSignalRepository::new(&path).unwrap();
        assert_eq!(reopened.get("LINK").unwrap().map(|s| s.bias), Some(Bias::Sell));
        drop(reopened);
        let _ = std::fs::remove_file(&path);
    }
}
