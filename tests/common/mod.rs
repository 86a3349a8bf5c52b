#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use meowmery::auth::{accounts, Identity};
use meowmery::db;
use meowmery::services::posts::MediaUpload;
use meowmery::state::DbPool;
use meowmery::storage::{LocalObjectStore, ObjectStore, StorageError, UploadOptions};
use tempfile::TempDir;

pub const BUCKET: &str = "meowmery-media";

pub fn test_pool(dir: &TempDir) -> DbPool {
    let pool = db::create_pool(&dir.path().join("test.db")).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");
    pool
}

pub fn local_store(dir: &TempDir) -> LocalObjectStore {
    LocalObjectStore::new(&dir.path().join("uploads"), BUCKET, "/storage")
}

pub fn sign_up(pool: &DbPool, email: &str) -> Identity {
    accounts::sign_up(pool, email, "whiskers123", 4).expect("sign up")
}

pub fn count(pool: &DbPool, table: &str) -> i64 {
    let conn = pool.get().unwrap();
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

pub fn image(name: &str, data: &'static [u8]) -> MediaUpload {
    MediaUpload {
        file_name: name.to_string(),
        content_type: "image/jpeg".to_string(),
        data: Bytes::from_static(data),
    }
}

/// Wraps the local store, failing any upload whose payload is `fail` and
/// counting every upload attempt.
pub struct FlakyStore {
    pub inner: LocalObjectStore,
    pub attempts: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: LocalObjectStore) -> Self {
        Self {
            inner,
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn upload(
        &self,
        path: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> Result<String, StorageError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if &data[..] == b"fail" {
            return Err(StorageError::Backend("bucket unavailable".into()));
        }
        self.inner.upload(path, data, options).await
    }

    async fn download(&self, path: &str) -> Result<Bytes, StorageError> {
        self.inner.download(path).await
    }

    async fn remove(&self, paths: &[String]) -> Result<(), StorageError> {
        self.inner.remove(paths).await
    }

    fn public_url(&self, path: &str) -> String {
        self.inner.public_url(path)
    }
}
