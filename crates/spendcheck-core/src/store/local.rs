//! Local document store on SQLite with optional SQLCipher encryption
//!
//! Every document is one row in a single `documents` table, with fields
//! kept in their Firestore REST encoding. Filters and ordering run in Rust.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{
    fields_from_firestore, fields_to_firestore, generate_document_id, merge_fields,
    split_document_path, validate_collection_path, Document, DocumentStore, Fields, Query,
};
use crate::error::{Error, Result};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for the local store encryption passphrase
pub const DB_KEY_ENV: &str = "SPENDCHECK_DB_KEY";

/// Derive a SQLCipher key from a passphrase using Argon2id.
///
/// The salt is fixed so the same passphrase opens the file wherever it is moved.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted store
    const APP_SALT: &[u8; 16] = b"spendcheck-salt1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let hash = Argon2::default()
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let output = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(output.as_bytes()))
}

#[derive(Clone)]
pub struct LocalStore {
    pool: DbPool,
    path: String,
    encrypted: bool,
}

impl LocalStore {
    /// Open an encrypted store; requires `SPENDCHECK_DB_KEY`
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV) {
            Ok(key) if !key.is_empty() => Self::new_with_key(path, Some(&key)),
            _ => Err(Error::Encryption(format!(
                "Store encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for an unencrypted store (development only).",
                DB_KEY_ENV
            ))),
        }
    }

    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);

        let pool = if let Some(pass) = passphrase {
            let key = derive_key(pass)?;
            let key_pragma = format!("PRAGMA key = 'x\"{}\"';", key);
            let manager = manager.with_init(move |conn| {
                conn.execute_batch(&key_pragma)?;
                Ok(())
            });
            Pool::builder().max_size(10).build(manager)?
        } else {
            Pool::builder().max_size(10).build(manager)?
        };

        let store = Self {
            pool,
            path: path.to_string(),
            encrypted: passphrase.is_some(),
        };
        store.run_migrations()?;
        debug!(path = %path, encrypted = store.encrypted, "Opened local store");
        Ok(store)
    }

    /// Fresh store in a temp file (SQLCipher pools misbehave with `:memory:`)
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "spendcheck_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path.to_string_lossy())
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,                 -- Firestore-encoded fields
                updated_at DATETIME NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
            "#,
        )?;
        Ok(())
    }

    fn read(conn: &rusqlite::Connection, collection: &str, id: &str) -> Result<Option<Fields>> {
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => {
                let value: serde_json::Value = serde_json::from_str(&data)?;
                fields_from_firestore(&value).map(Some)
            }
            None => Ok(None),
        }
    }

    fn write(
        conn: &rusqlite::Connection,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> Result<()> {
        let data = serde_json::to_string(&fields_to_firestore(fields))?;
        conn.execute(
            r#"
            INSERT INTO documents (collection, id, data, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
            params![collection, id, data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let (collection, id) = split_document_path(path)?;
        let conn = self.conn()?;
        Ok(Self::read(&conn, collection, id)?.map(|fields| Document {
            id: id.to_string(),
            fields,
        }))
    }

    async fn set(&self, path: &str, fields: Fields, merge: bool) -> Result<()> {
        let (collection, id) = split_document_path(path)?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let merged = if merge {
            let mut existing = Self::read(&tx, collection, id)?.unwrap_or_default();
            merge_fields(&mut existing, fields);
            existing
        } else {
            fields
        };

        Self::write(&tx, collection, id, &merged)?;
        tx.commit()?;
        Ok(())
    }

    async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
        validate_collection_path(collection)?;
        let id = generate_document_id();
        let conn = self.conn()?;
        Self::write(&conn, collection, &id, &fields)?;
        Ok(id)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let (collection, id) = split_document_path(path)?;
        let conn = self.conn()?;
        conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        validate_collection_path(collection)?;
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let docs = rows
            .into_iter()
            .map(|(id, data)| {
                let value: serde_json::Value = serde_json::from_str(&data)?;
                Ok(Document {
                    id,
                    fields: fields_from_firestore(&value)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(query.apply(docs))
    }

    /// Includes ids that only exist as parents of subcollection documents
    async fn list_documents(&self, collection: &str) -> Result<Vec<String>> {
        validate_collection_path(collection)?;
        let conn = self.conn()?;
        let mut ids = BTreeSet::new();

        let mut stmt = conn.prepare("SELECT id FROM documents WHERE collection = ?1")?;
        for id in stmt.query_map(params![collection], |row| row.get::<_, String>(0))? {
            ids.insert(id?);
        }

        let prefix = format!("{}/", collection);
        let mut stmt = conn.prepare(
            "SELECT DISTINCT collection FROM documents WHERE substr(collection, 1, length(?1)) = ?1",
        )?;
        for child in stmt.query_map(params![prefix], |row| row.get::<_, String>(0))? {
            let child = child?;
            if let Some(id) = child[prefix.len()..].split('/').next() {
                if !id.is_empty() {
                    ids.insert(id.to_string());
                }
            }
        }

        Ok(ids.into_iter().collect())
    }
}
