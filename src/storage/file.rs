//! # Database File I/O
//!
//! [`DbFile`] wraps the single file a RowanDB database lives in and exposes
//! whole-page positioned reads and writes plus header access. It is the only
//! module that performs disk I/O; the pager decides *when* to read or write,
//! this module decides *how*.
//!
//! ## Offsets
//!
//! Page `p` occupies bytes `8 + p*4096 .. 8 + (p+1)*4096`. The 8-byte file
//! header sits at offset 0. A well-formed file is therefore always exactly
//! `8 + 4096 * num_pages` bytes long, and [`DbFile::page_count`] fails with
//! a corruption error for any other length.
//!
//! ## Why explicit I/O instead of mmap
//!
//! The cache semantics under test (LRU eviction, dirty write-back, flush on
//! close) require the engine to own its page buffers. A memory map would
//! delegate residency to the OS and make eviction unobservable.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};

use crate::config::{FILE_HEADER_SIZE, PAGE_SIZE};

use super::FileHeader;

#[derive(Debug)]
pub struct DbFile {
    file: File,
}

impl DbFile {
    /// Opens an existing database file for read/write access.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        Ok(Self { file })
    }

    /// Creates a new database file. Fails if the file already exists.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create database file '{}'", path.display()))?;

        Ok(Self { file })
    }

    pub fn len(&self) -> Result<u64> {
        let meta = self.file.metadata().wrap_err("failed to stat database file")?;
        Ok(meta.len())
    }

    /// Derives the page count from the file length, rejecting lengths that
    /// cannot result from a completed shutdown.
    pub fn page_count(&self) -> Result<u32> {
        let len = self.len()?;

        ensure!(
            len >= FILE_HEADER_SIZE as u64,
            "corrupt database file: {} bytes is shorter than the file header",
            len
        );

        let body = len - FILE_HEADER_SIZE as u64;
        ensure!(
            body % PAGE_SIZE as u64 == 0,
            "corrupt database file: length {} is not a whole number of pages",
            len
        );

        Ok((body / PAGE_SIZE as u64) as u32)
    }

    pub fn read_header(&mut self) -> Result<FileHeader> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        self.file
            .seek(SeekFrom::Start(0))
            .wrap_err("failed to seek to file header")?;
        self.file
            .read_exact(&mut buf)
            .wrap_err("failed to read file header")?;

        Ok(*FileHeader::from_bytes(&buf)?)
    }

    pub fn write_header(&mut self, header: &FileHeader) -> Result<()> {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        header.write_to(&mut buf)?;

        self.file
            .seek(SeekFrom::Start(0))
            .wrap_err("failed to seek to file header")?;
        self.file
            .write_all(&buf)
            .wrap_err("failed to write file header")?;

        Ok(())
    }

    pub fn read_page(&mut self, page_no: u32, buf: &mut [u8]) -> Result<()> {
        ensure!(
            buf.len() == PAGE_SIZE,
            "invalid page buffer size: {} != {}",
            buf.len(),
            PAGE_SIZE
        );

        self.file
            .seek(SeekFrom::Start(page_offset(page_no)))
            .wrap_err_with(|| format!("failed to seek to page {}", page_no))?;
        self.file
            .read_exact(buf)
            .wrap_err_with(|| format!("failed to read page {}", page_no))?;

        Ok(())
    }

    pub fn write_page(&mut self, page_no: u32, buf: &[u8]) -> Result<()> {
        ensure!(
            buf.len() == PAGE_SIZE,
            "invalid page buffer size: {} != {}",
            buf.len(),
            PAGE_SIZE
        );

        self.file
            .seek(SeekFrom::Start(page_offset(page_no)))
            .wrap_err_with(|| format!("failed to seek to page {}", page_no))?;
        self.file
            .write_all(buf)
            .wrap_err_with(|| format!("failed to write page {}", page_no))?;

        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync_all().wrap_err("failed to sync database file")
    }
}

fn page_offset(page_no: u32) -> u64 {
    FILE_HEADER_SIZE as u64 + page_no as u64 * PAGE_SIZE as u64
}
