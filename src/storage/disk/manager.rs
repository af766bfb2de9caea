use std::{
    collections::HashSet,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use log::debug;
use parking_lot::Mutex;

use crate::storage::page::page::PageId;
use crate::storage::page::page_layout::PAGE_SIZE;

struct DiskInner {
    db_io: File,
    // Deallocated page ids. Bookkeeping only: page ids are handed out by the
    // buffer pool's sharded allocator, never recycled here.
    deallocated: HashSet<PageId>,
    num_writes: u64,
    num_deletes: u64,
}

/// Page-addressed store over a single database file. A page id maps to the
/// fixed offset `page_id * PAGE_SIZE`. Writes are flushed before returning.
pub struct DiskManager {
    db_path: PathBuf,
    inner: Mutex<DiskInner>,
}

impl DiskManager {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        let db_io = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&db_path)
            .with_context(|| format!("failed to open db file {}", db_path.display()))?;

        Ok(Self {
            db_path,
            inner: Mutex::new(DiskInner {
                db_io,
                deallocated: HashSet::new(),
                num_writes: 0,
                num_deletes: 0,
            }),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Writes one page at its fixed offset and flushes it out.
    pub fn write_page(&self, page_id: PageId, page_data: &[u8]) -> Result<()> {
        if page_id < 0 || page_data.len() != PAGE_SIZE {
            return Err(anyhow!("invalid write of page {}", page_id));
        }
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut inner = self.inner.lock();
        inner
            .db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek failed for page {}", page_id))?;
        inner
            .db_io
            .write_all(page_data)
            .with_context(|| format!("write failed for page {}", page_id))?;
        inner
            .db_io
            .flush()
            .with_context(|| format!("flush failed for page {}", page_id))?;
        inner.num_writes += 1;
        Ok(())
    }

    /// Reads one page into `page_data`. Reading past the end of the file
    /// zero-fills: freshly allocated pages have no bytes on disk yet.
    pub fn read_page(&self, page_id: PageId, page_data: &mut [u8]) -> Result<()> {
        if page_id < 0 || page_data.len() != PAGE_SIZE {
            return Err(anyhow!("invalid read of page {}", page_id));
        }
        let offset = page_id as u64 * PAGE_SIZE as u64;

        let mut inner = self.inner.lock();
        let file_len = inner.db_io.metadata()?.len();
        if offset >= file_len {
            page_data.fill(0);
            return Ok(());
        }

        inner
            .db_io
            .seek(SeekFrom::Start(offset))
            .with_context(|| format!("seek failed for page {}", page_id))?;
        let available = ((file_len - offset) as usize).min(PAGE_SIZE);
        inner
            .db_io
            .read_exact(&mut page_data[..available])
            .with_context(|| format!("read failed for page {}", page_id))?;
        page_data[available..].fill(0);
        Ok(())
    }

    /// Records that `page_id` no longer backs live data. The slot is not
    /// reclaimed; the pool's allocator owns id assignment.
    pub fn deallocate_page(&self, page_id: PageId) {
        debug!("deallocating page {}", page_id);
        let mut inner = self.inner.lock();
        inner.deallocated.insert(page_id);
        inner.num_deletes += 1;
    }

    pub fn num_writes(&self) -> u64 {
        self.inner.lock().num_writes
    }

    pub fn num_deletes(&self) -> u64 {
        self.inner.lock().num_deletes
    }
}
