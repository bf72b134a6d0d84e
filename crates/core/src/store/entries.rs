//! Cache entry CRUD operations on the SQLite table.
//!
//! These are the fallible primitives; [`super::PersistentStore`] layers the
//! never-fail contract on top. Timestamps are stored as Unix milliseconds.

use chrono::{DateTime, Utc};
use tokio_rusqlite::{params, rusqlite};

use super::connection::CacheDb;
use super::entity::{EntityClass, StoreKey};
use crate::Error;

/// A raw row of the `cache_entries` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub class: EntityClass,
    pub entry_key: String,
    pub payload_json: String,
    pub written_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl StoredRow {
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

fn millis_to_datetime(col: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(col, ms))
}

impl CacheDb {
    /// Insert or replace the entry for `key`.
    ///
    /// `written_at = now` and `expires_at = now + ttl(class)`.
    pub async fn put_entry(&self, key: &StoreKey, payload_json: String, now: DateTime<Utc>) -> Result<(), Error> {
        self.put_entry_if(key, payload_json, now, || true).await.map(|_| ())
    }

    /// Like [`put_entry`](Self::put_entry), but `keep` is evaluated on the
    /// connection thread right before the write and the row is skipped when
    /// it returns false. Returns whether the row was written.
    pub async fn put_entry_if<F>(
        &self, key: &StoreKey, payload_json: String, now: DateTime<Utc>, keep: F,
    ) -> Result<bool, Error>
    where
        F: FnOnce() -> bool + Send + 'static,
    {
        let class = key.class();
        let entry_key = key.encode();
        let written_at = now.timestamp_millis();
        let expires_at = (now + class.ttl()).timestamp_millis();

        self.conn
            .call(move |conn| -> Result<bool, Error> {
                if !keep() {
                    return Ok(false);
                }
                conn.execute(
                    "INSERT INTO cache_entries (class, entry_key, payload_json, written_at, expires_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    ON CONFLICT(class, entry_key) DO UPDATE SET
                        payload_json = excluded.payload_json,
                        written_at = excluded.written_at,
                        expires_at = excluded.expires_at",
                    params![class.as_str(), entry_key, payload_json, written_at, expires_at],
                )?;
                Ok(true)
            })
            .await
            .map_err(Error::from)
    }

    /// Get the row stored under `key`.
    ///
    /// Returns None if the key doesn't exist.
    pub async fn get_entry(&self, key: &StoreKey) -> Result<Option<StoredRow>, Error> {
        let class = key.class();
        let entry_key = key.encode();
        self.conn
            .call(move |conn| -> Result<Option<StoredRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT entry_key, payload_json, written_at, expires_at
                    FROM cache_entries WHERE class = ?1 AND entry_key = ?2",
                )?;

                let result = stmt.query_row(params![class.as_str(), entry_key], |row| {
                    Ok(StoredRow {
                        class,
                        entry_key: row.get(0)?,
                        payload_json: row.get(1)?,
                        written_at: millis_to_datetime(2, row.get(2)?)?,
                        expires_at: millis_to_datetime(3, row.get(3)?)?,
                    })
                });

                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Delete entries of `class` that expired before `now`.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self, class: EntityClass, now: DateTime<Utc>) -> Result<u64, Error> {
        let now = now.timestamp_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM cache_entries WHERE class = ?1 AND expires_at < ?2",
                    params![class.as_str(), now],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every entry of `class`, or of all classes when `None`.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_class(&self, class: Option<EntityClass>) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = match class {
                    Some(class) => conn.execute("DELETE FROM cache_entries WHERE class = ?1", params![class.as_str()])?,
                    None => conn.execute("DELETE FROM cache_entries", [])?,
                };
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count stored entries of `class`, or of all classes when `None`.
    pub async fn count_entries(&self, class: Option<EntityClass>) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = match class {
                    Some(class) => conn.query_row(
                        "SELECT COUNT(*) FROM cache_entries WHERE class = ?1",
                        params![class.as_str()],
                        |row| row.get(0),
                    )?,
                    None => conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?,
                };
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// List every row of `class`, newest write first.
    pub async fn list_entries(&self, class: EntityClass) -> Result<Vec<StoredRow>, Error> {
        self.conn
            .call(move |conn| -> Result<Vec<StoredRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT entry_key, payload_json, written_at, expires_at
                    FROM cache_entries WHERE class = ?1 ORDER BY written_at DESC",
                )?;
                let rows = stmt
                    .query_map(params![class.as_str()], |row| {
                        Ok(StoredRow {
                            class,
                            entry_key: row.get(0)?,
                            payload_json: row.get(1)?,
                            written_at: millis_to_datetime(2, row.get(2)?)?,
                            expires_at: millis_to_datetime(3, row.get(3)?)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 4, 0, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = StoreKey::portfolio("u1");

        db.put_entry(&key, r#"{"value":100}"#.into(), t0()).await.unwrap();

        let row = db.get_entry(&key).await.unwrap().unwrap();
        assert_eq!(row.class, EntityClass::Portfolio);
        assert_eq!(row.entry_key, "u1");
        assert_eq!(row.payload_json, r#"{"value":100}"#);
        assert_eq!(row.written_at, t0());
        assert_eq!(row.expires_at, t0() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_get_missing_entry() {
        let db = CacheDb::open_in_memory().await.unwrap();
        assert!(db.get_entry(&StoreKey::portfolio("nobody")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_encoding_in_different_classes_is_distinct() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&StoreKey::portfolio("u1"), "1".into(), t0()).await.unwrap();
        db.put_entry(&StoreKey::open_trades("u1"), "[]".into(), t0()).await.unwrap();

        assert_eq!(db.get_entry(&StoreKey::portfolio("u1")).await.unwrap().unwrap().payload_json, "1");
        assert_eq!(db.get_entry(&StoreKey::open_trades("u1")).await.unwrap().unwrap().payload_json, "[]");
    }

    #[tokio::test]
    async fn test_upsert_bumps_timestamps() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let key = StoreKey::market_status(day());

        db.put_entry(&key, r#"{"old":1}"#.into(), t0()).await.unwrap();
        let later = t0() + Duration::minutes(7);
        db.put_entry(&key, r#"{"new":2}"#.into(), later).await.unwrap();

        let row = db.get_entry(&key).await.unwrap().unwrap();
        assert_eq!(row.payload_json, r#"{"new":2}"#);
        assert_eq!(row.written_at, later);
        assert_eq!(db.count_entries(Some(EntityClass::MarketStatus)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_expired_only_touches_class() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&StoreKey::portfolio("u1"), "{}".into(), t0()).await.unwrap();
        db.put_entry(&StoreKey::open_trades("u1"), "[]".into(), t0()).await.unwrap();

        let later = t0() + Duration::minutes(6);
        let deleted = db.purge_expired(EntityClass::Portfolio, later).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(db.get_entry(&StoreKey::portfolio("u1")).await.unwrap().is_none());
        assert!(db.get_entry(&StoreKey::open_trades("u1")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_class_and_all() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&StoreKey::portfolio("u1"), "{}".into(), t0()).await.unwrap();
        db.put_entry(&StoreKey::analysis("INFY", day(), "u1"), "{}".into(), t0()).await.unwrap();
        db.put_entry(&StoreKey::analysis("TCS", day(), "u1"), "{}".into(), t0()).await.unwrap();

        assert_eq!(db.clear_class(Some(EntityClass::Analysis)).await.unwrap(), 2);
        assert_eq!(db.count_entries(None).await.unwrap(), 1);
        assert_eq!(db.clear_class(None).await.unwrap(), 1);
        assert_eq!(db.count_entries(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_entries_newest_first() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.put_entry(&StoreKey::analysis("INFY", day(), "u1"), "{}".into(), t0()).await.unwrap();
        db.put_entry(&StoreKey::analysis("TCS", day(), "u1"), "{}".into(), t0() + Duration::minutes(1))
            .await
            .unwrap();

        let rows = db.list_entries(EntityClass::Analysis).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].entry_key.starts_with("TCS"));
        assert!(!rows[0].is_stale_at(t0() + Duration::hours(1)));
    }
}
