mod buffer_pool_test;
mod concurrent_test;
mod parallel_buffer_pool_test;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::buffer::buffer_pool_manager::BufferPoolManagerInstance;
use crate::storage::disk::manager::DiskManager;

/// A database file under the system temp directory, removed on drop.
pub(crate) struct TestDb {
    path: PathBuf,
}

impl TestDb {
    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TestDb {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub(crate) fn test_db(tag: &str) -> TestDb {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let path = std::env::temp_dir().join(format!(
        "agate_{}_{}_{}.db",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    let _ = std::fs::remove_file(&path);
    let _ = env_logger::builder().is_test(true).try_init();
    TestDb { path }
}

pub(crate) fn single_pool(db: &TestDb, pool_size: usize) -> Arc<BufferPoolManagerInstance> {
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    Arc::new(BufferPoolManagerInstance::new(pool_size, disk_manager))
}
