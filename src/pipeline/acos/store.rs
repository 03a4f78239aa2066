//! SQLite-backed result store for the `acos_results` table.

use std::collections::BTreeMap;

use rusqlite::{params, Connection};

use super::traits::ResultStore;
use super::types::*;
use crate::db::{self, DatabaseError};

pub struct SqliteResultStore;

impl SqliteResultStore {
    pub fn new() -> Self {
        Self
    }

    /// Row counts per sentiment for one product. Sentiments with no rows are absent.
    pub fn sentiment_breakdown(
        &self,
        conn: &Connection,
        product_id: &str,
    ) -> Result<BTreeMap<&'static str, u64>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT sentiment, COUNT(*) FROM acos_results
             WHERE product_id = ?1
             GROUP BY sentiment",
        )?;
        let rows = stmt.query_map(params![product_id], |row| {
            Ok((row.get::<_, Option<i64>>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (code, count) = row?;
            let sentiment = Sentiment::from_code(code.unwrap_or(-1));
            *counts.entry(sentiment.as_str()).or_insert(0) += count.max(0) as u64;
        }
        Ok(counts)
    }
}

impl Default for SqliteResultStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultStore for SqliteResultStore {
    fn ensure_schema(&self, conn: &Connection) -> Result<(), DatabaseError> {
        db::run_migrations(conn)
    }

    fn insert(&self, conn: &Connection, record: &AcosRecord) -> Result<i64, DatabaseError> {
        conn.execute(
            "INSERT INTO acos_results
             (product_id, review_text, aspect, opinion, category, sentiment)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.product_id,
                record.review_text,
                record.aspect,
                record.opinion,
                record.category,
                record.sentiment.code(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn count(&self, conn: &Connection) -> Result<u64, DatabaseError> {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM acos_results", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn list_by_product(
        &self,
        conn: &Connection,
        product_id: &str,
    ) -> Result<Vec<StoredQuad>, DatabaseError> {
        let mut stmt = conn.prepare(
            "SELECT id, product_id, review_text, aspect, opinion, category, sentiment
             FROM acos_results
             WHERE product_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![product_id], |row| {
            Ok(StoredQuad {
                id: row.get(0)?,
                record: AcosRecord {
                    product_id: row.get(1)?,
                    review_text: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    aspect: row.get(3)?,
                    opinion: row.get(4)?,
                    category: row.get(5)?,
                    sentiment: Sentiment::from_code(row.get::<_, Option<i64>>(6)?.unwrap_or(-1)),
                },
            })
        })?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }
}
