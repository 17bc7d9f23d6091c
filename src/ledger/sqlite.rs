//! SQLite-backed ledger.

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, ToSql, params};

use super::ReceiptLedger;
use crate::error::Result;
use crate::models::ValidatedReceipt;

pub type LedgerPool = Pool<SqliteConnectionManager>;

const RECEIPT_COLS: &str = "product_id, purchase_date, transaction_id";

pub fn create_pool(database_path: &str) -> std::result::Result<LedgerPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path);
    Pool::builder().max_size(4).build(manager)
}

/// Initialize the ledger schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- One row per redeemed transaction. purchase_date is Unix milliseconds.
        CREATE TABLE IF NOT EXISTS receipts (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            transaction_id TEXT NOT NULL UNIQUE,
            product_id TEXT NOT NULL,
            purchase_date INTEGER NOT NULL,
            recorded_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_receipts_product ON receipts(product_id);
        "#,
    )
}

/// Trait for constructing a type from a database row.
trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

impl FromRow for ValidatedReceipt {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let millis: i64 = row.get(1)?;
        let purchase_date = DateTime::<Utc>::from_timestamp_millis(millis).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(
                1,
                "purchase_date".to_string(),
                rusqlite::types::Type::Integer,
            )
        })?;
        Ok(ValidatedReceipt {
            product_id: row.get(0)?,
            purchase_date,
            transaction_id: row.get(2)?,
        })
    }
}

fn query_one<T: FromRow>(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

fn query_all<T: FromRow>(conn: &Connection, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[derive(Clone)]
pub struct SqliteLedger {
    pool: LedgerPool,
}

impl SqliteLedger {
    /// Wrap a pool, creating the schema if needed.
    pub fn new(pool: LedgerPool) -> Result<Self> {
        let conn = pool.get()?;
        init_db(&conn)?;
        Ok(Self { pool })
    }

    pub fn open(database_path: &str) -> Result<Self> {
        let pool = create_pool(database_path)?;
        Self::new(pool)
    }

    pub fn get_by_transaction(&self, transaction_id: &str) -> Result<Option<ValidatedReceipt>> {
        let conn = self.pool.get()?;
        query_one(
            &conn,
            &format!("SELECT {} FROM receipts WHERE transaction_id = ?1", RECEIPT_COLS),
            &[&transaction_id],
        )
    }
}

impl ReceiptLedger for SqliteLedger {
    fn append(&self, receipt: &ValidatedReceipt) -> Result<bool> {
        let conn = self.pool.get()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO receipts (transaction_id, product_id, purchase_date, recorded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                receipt.transaction_id,
                receipt.product_id,
                receipt.purchase_date.timestamp_millis(),
                Utc::now().timestamp(),
            ],
        )?;

        if inserted == 0 {
            tracing::debug!(
                "Receipt {} already in ledger, not recorded again",
                receipt.transaction_id
            );
        }
        Ok(inserted > 0)
    }

    fn list(&self) -> Result<Vec<ValidatedReceipt>> {
        let conn = self.pool.get()?;
        query_all(
            &conn,
            &format!("SELECT {} FROM receipts ORDER BY seq", RECEIPT_COLS),
            &[],
        )
    }

    fn contains_transaction(&self, transaction_id: &str) -> Result<bool> {
        Ok(self.get_by_transaction(transaction_id)?.is_some())
    }
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("connections", &self.pool.state().connections)
            .finish()
    }
}
