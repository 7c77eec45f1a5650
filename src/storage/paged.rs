//! Paged file
//!
//! A file made of a fixed-size header followed by equally sized pages,
//! addressed by index. Used by the open-address file hash (one slot per
//! page) and the flat file (one record per page).

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{CairnError, Result};

/// Pages written per call when zero-filling a new file
const ZERO_FILL_BATCH: u64 = 256;

/// Fixed-size page access over a single file
pub struct PagedFile {
    file: File,
    path: PathBuf,
    header_len: u64,
    page_size: usize,
    page_count: u64,
    sync_writes: bool,
}

impl PagedFile {
    /// Create (or truncate) a file and write its header
    pub fn create(path: &Path, header: &[u8], page_size: usize, sync_writes: bool) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        file.write_all(header)?;
        file.sync_all()?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header_len: header.len() as u64,
            page_size,
            page_count: 0,
            sync_writes,
        })
    }

    /// Open an existing file, returning it with its raw header bytes.
    ///
    /// A trailing partial page (torn append) is cut off.
    pub fn open(
        path: &Path,
        header_len: usize,
        page_size: usize,
        sync_writes: bool,
    ) -> Result<(Self, Vec<u8>)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();

        if file_len < header_len as u64 {
            return Err(CairnError::Corruption(format!(
                "{} is shorter than its header ({} < {} bytes)",
                path.display(),
                file_len,
                header_len
            )));
        }

        let mut header = vec![0u8; header_len];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;

        let data_len = file_len - header_len as u64;
        let page_count = data_len / page_size as u64;
        if data_len % page_size as u64 != 0 {
            warn!(
                path = %path.display(),
                trailing_bytes = data_len % page_size as u64,
                "Truncating partial page at end of file"
            );
            file.set_len(header_len as u64 + page_count * page_size as u64)?;
        }

        Ok((
            Self {
                file,
                path: path.to_path_buf(),
                header_len: header_len as u64,
                page_size,
                page_count,
                sync_writes,
            },
            header,
        ))
    }

    /// Read just the first `header_len` bytes, leaving the file untouched
    pub fn read_header(path: &Path, header_len: usize) -> Result<Vec<u8>> {
        let mut file = File::open(path)?;
        let mut header = vec![0u8; header_len];
        file.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                CairnError::Corruption(format!(
                    "{} is shorter than its header",
                    path.display()
                ))
            } else {
                e.into()
            }
        })?;
        Ok(header)
    }

    fn offset(&self, index: u64) -> u64 {
        self.header_len + index * self.page_size as u64
    }

    fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.page_count {
            return Err(CairnError::Corruption(format!(
                "page {} is beyond the end of {} ({} pages)",
                index,
                self.path.display(),
                self.page_count
            )));
        }
        Ok(())
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len != self.page_size {
            return Err(CairnError::Corruption(format!(
                "page buffer is {} bytes, pages are {}",
                len, self.page_size
            )));
        }
        Ok(())
    }

    /// Read page `index` into `buf` (which must be exactly one page)
    pub fn read_page(&mut self, index: u64, buf: &mut [u8]) -> Result<()> {
        self.check_index(index)?;
        self.check_len(buf.len())?;
        self.file.seek(SeekFrom::Start(self.offset(index)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Overwrite an existing page
    pub fn write_page(&mut self, index: u64, data: &[u8]) -> Result<()> {
        self.check_index(index)?;
        self.check_len(data.len())?;
        self.file.seek(SeekFrom::Start(self.offset(index)))?;
        self.file.write_all(data)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Append a page, returning its index
    pub fn append_page(&mut self, data: &[u8]) -> Result<u64> {
        self.check_len(data.len())?;
        let index = self.page_count;
        self.file.seek(SeekFrom::Start(self.offset(index)))?;
        self.file.write_all(data)?;
        self.page_count += 1;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(index)
    }

    /// Append `count` zero-filled pages
    pub fn append_zeroed(&mut self, count: u64) -> Result<()> {
        let batch = vec![0u8; self.page_size * ZERO_FILL_BATCH.min(count.max(1)) as usize];
        self.file.seek(SeekFrom::Start(self.offset(self.page_count)))?;

        let mut remaining = count;
        while remaining > 0 {
            let pages = remaining.min(ZERO_FILL_BATCH);
            self.file.write_all(&batch[..pages as usize * self.page_size])?;
            remaining -= pages;
        }

        self.page_count += count;
        self.file.sync_all()?;
        Ok(())
    }

    /// Replace the header (must keep its length)
    pub fn rewrite_header(&mut self, header: &[u8]) -> Result<()> {
        if header.len() as u64 != self.header_len {
            return Err(CairnError::Corruption(format!(
                "header length changed from {} to {}",
                self.header_len,
                header.len()
            )));
        }
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(header)?;
        if self.sync_writes {
            self.file.sync_data()?;
        }
        Ok(())
    }

    /// Flush all writes to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    pub fn page_count(&self) -> u64 {
        self.page_count
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
