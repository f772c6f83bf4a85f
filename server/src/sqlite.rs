use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use kernel::{BlobInfo, Metadata};
use rusqlite::blob::ZeroBlob;
use rusqlite::{
    params, Connection, DatabaseName, OpenFlags, OptionalExtension, Row, TransactionBehavior,
};
use thiserror::Error;

use crate::domain::BlobStore;

const CACHE_SIZE: &str = "4096";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("blob '{container}/{name}' not found")]
    NotFound { container: String, name: String },
    #[error("blob of {0} bytes is too large to store")]
    TooLarge(usize),
}

impl StoreError {
    fn not_found(container: &str, name: &str) -> Self {
        Self::NotFound {
            container: container.to_owned(),
            name: name.to_owned(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub enum Mode {
    ReadWrite,
    ReadOnly,
}

pub struct Sqlite {
    conn: Connection,
}

impl BlobStore for Sqlite {
    type Err = StoreError;

    fn new_database(&self) -> Result<(), Self::Err> {
        self.pragma_update("encoding", "UTF-8")?;
        self.conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS blob (
                  blake3_hash    TEXT PRIMARY KEY,
                  data           BLOB NOT NULL
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS object (
                  id            INTEGER PRIMARY KEY AUTOINCREMENT,
                  container     TEXT NOT NULL,
                  name          TEXT NOT NULL,
                  content_type  TEXT NOT NULL,
                  size          INTEGER NOT NULL,
                  blake3_hash   TEXT NOT NULL REFERENCES blob(blake3_hash) ON DELETE RESTRICT ON UPDATE RESTRICT
                  )",
            [],
        )?;

        self.conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS unique_container_name_ix ON object(container, name)",
            [],
        )?;

        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                  object_id  INTEGER NOT NULL REFERENCES object(id) ON DELETE CASCADE,
                  key        TEXT NOT NULL,
                  value      TEXT NOT NULL,
                  PRIMARY KEY (object_id, key)
                  )",
            [],
        )?;

        Ok(())
    }

    fn upload_blob(
        &mut self,
        container: &str,
        name: &str,
        content_type: &str,
        data: &[u8],
    ) -> Result<BlobInfo, Self::Err> {
        self.assign_cache_size()?;
        self.enable_foreign_keys()?;
        self.pragma_update("synchronous", "FULL")?;

        let len = i32::try_from(data.len()).map_err(|_| StoreError::TooLarge(data.len()))?;
        let hash = blake3::hash(data).to_string();

        // IMMEDIATE: contending writers wait out the busy timeout
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
            .prepare_cached("SELECT blake3_hash FROM blob WHERE blake3_hash = ?1")?
            .exists(params![&hash])?;

        if !exists {
            tx.execute(
                "INSERT INTO blob (blake3_hash, data) VALUES (?1, ?2)",
                params![&hash, &ZeroBlob(len)],
            )?;

            let rowid = tx.last_insert_rowid();

            let mut blob = tx.blob_open(DatabaseName::Main, "blob", "data", rowid, false)?;
            blob.write_all(data)?;
            blob.flush()?;
            blob.close()?;
        }

        let previous: Option<(i64, String)> = tx
            .query_row(
                "SELECT id, blake3_hash FROM object WHERE container = ?1 AND name = ?2",
                params![container, name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match &previous {
            Some((id, _)) => {
                tx.execute(
                    "UPDATE object SET content_type = ?1, size = ?2, blake3_hash = ?3 WHERE id = ?4",
                    params![content_type, len, &hash, id],
                )?;
                // a replaced object starts over without metadata
                tx.execute("DELETE FROM metadata WHERE object_id = ?1", params![id])?;
            }
            None => {
                tx.prepare_cached(
                    "INSERT INTO object (container, name, content_type, size, blake3_hash)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?
                .execute(params![container, name, content_type, len, &hash])?;
            }
        }

        if let Some((_, old_hash)) = previous.filter(|(_, old_hash)| *old_hash != hash) {
            tx.execute(
                "DELETE FROM blob WHERE blake3_hash = ?1
                 AND NOT EXISTS (SELECT 1 FROM object WHERE blake3_hash = ?1)",
                params![old_hash],
            )?;
        }

        tx.commit()?;

        Ok(BlobInfo {
            container: container.to_owned(),
            name: name.to_owned(),
            content_type: content_type.to_owned(),
            size: data.len(),
            blake3_hash: hash,
        })
    }

    fn list_blobs(&mut self, container: &str) -> Result<Vec<BlobInfo>, Self::Err> {
        self.assign_cache_size()?;

        let mut stmt = self.conn.prepare_cached(
            "SELECT container, name, content_type, size, blake3_hash
             FROM object WHERE container = ?1 ORDER BY name",
        )?;
        let rows = stmt.query_map(params![container], blob_info)?;
        let result = rows.collect::<Result<Vec<BlobInfo>, _>>()?;
        Ok(result)
    }

    fn get_blob_info(&mut self, container: &str, name: &str) -> Result<BlobInfo, Self::Err> {
        self.conn
            .query_row(
                "SELECT container, name, content_type, size, blake3_hash
                 FROM object WHERE container = ?1 AND name = ?2",
                params![container, name],
                blob_info,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found(container, name))
    }

    fn get_blob_data(&self, container: &str, name: &str) -> Result<Vec<u8>, Self::Err> {
        let (rowid, size): (i64, usize) = self
            .conn
            .query_row(
                "SELECT b.rowid, o.size FROM object o
                 INNER JOIN blob b ON b.blake3_hash = o.blake3_hash
                 WHERE o.container = ?1 AND o.name = ?2",
                params![container, name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found(container, name))?;

        let mut blob = self
            .conn
            .blob_open(DatabaseName::Main, "blob", "data", rowid, true)?;
        let mut content = Vec::<u8>::with_capacity(size);
        blob.read_to_end(&mut content)?;
        Ok(content)
    }

    fn get_metadata(&mut self, container: &str, name: &str) -> Result<Metadata, Self::Err> {
        let id = object_id(&self.conn, container, name)?;

        let mut stmt = self
            .conn
            .prepare_cached("SELECT key, value FROM metadata WHERE object_id = ?1")?;
        let rows = stmt.query_map(params![id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let result = rows.collect::<Result<Metadata, _>>()?;
        Ok(result)
    }

    fn set_metadata(
        &mut self,
        container: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<(), Self::Err> {
        self.enable_foreign_keys()?;

        // IMMEDIATE: contending writers wait out the busy timeout
        let tx = self.conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let id = object_id(&tx, container, name)?;

        tx.execute("DELETE FROM metadata WHERE object_id = ?1", params![id])?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO metadata (object_id, key, value) VALUES (?1, ?2, ?3)",
            )?;
            for (key, value) in metadata {
                stmt.execute(params![id, key, value])?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl Sqlite {
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> Result<Self, StoreError> {
        let conn = match mode {
            Mode::ReadWrite => Connection::open(path),
            Mode::ReadOnly => Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY),
        }?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.new_database()?;
        Ok(store)
    }

    fn enable_foreign_keys(&self) -> Result<(), rusqlite::Error> {
        self.pragma_update("foreign_keys", "ON")
    }

    fn assign_cache_size(&self) -> Result<(), rusqlite::Error> {
        self.pragma_update("cache_size", CACHE_SIZE)
    }

    fn pragma_update(&self, name: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.pragma_update(None, name, value)
    }
}

fn object_id(conn: &Connection, container: &str, name: &str) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT id FROM object WHERE container = ?1 AND name = ?2",
        params![container, name],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found(container, name))
}

fn blob_info(row: &Row<'_>) -> Result<BlobInfo, rusqlite::Error> {
    Ok(BlobInfo {
        container: row.get(0)?,
        name: row.get(1)?,
        content_type: row.get(2)?,
        size: row.get(3)?,
        blake3_hash: row.get(4)?,
    })
}
