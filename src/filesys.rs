//! Read-only boot-image filesystem.
//!
//! Layout: one 4KB boot block (entry counts plus up to 63 directory
//! entries), then the inode blocks, then the data blocks. An inode is a
//! length followed by data-block indices. Nothing here ever writes.

use thiserror::Error;

use crate::layout::{FNAME_LEN, PAGE_SIZE};

pub const BLOCK_SIZE: usize = PAGE_SIZE;
pub const MAX_DENTRIES: usize = 63;

const DENTRY_SIZE: usize = 64;
const DENTRY_TYPE_OFFSET: usize = 32;
const DENTRY_INODE_OFFSET: usize = 36;

/// Declared type of a directory entry: 0 names the RTC device, 1 a
/// directory, 2 a regular file.
pub const TYPE_RTC: i32 = 0;
pub const TYPE_DIR: i32 = 1;
pub const TYPE_FILE: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FsError {
    #[error("image too small for a boot block")]
    TruncatedBootBlock,
    #[error("block counts exceed the image")]
    TruncatedImage,
    #[error("directory entry count exceeds the boot block")]
    BadDentryCount,
}

/// A resolved directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dentry {
    name: [u8; FNAME_LEN],
    pub file_type: i32,
    pub inode: u32,
}

impl Dentry {
    /// Name bytes up to the NUL padding.
    pub fn name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(FNAME_LEN);
        &self.name[..end]
    }
}

pub struct Filesys<'a> {
    image: &'a [u8],
    dir_count: usize,
    inode_count: usize,
    data_count: usize,
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl<'a> Filesys<'a> {
    pub fn new(image: &'a [u8]) -> Result<Self, FsError> {
        if image.len() < BLOCK_SIZE {
            return Err(FsError::TruncatedBootBlock);
        }
        let dir_count = read_i32(image, 0) as usize;
        let inode_count = read_i32(image, 4) as usize;
        let data_count = read_i32(image, 8) as usize;
        if dir_count > MAX_DENTRIES {
            return Err(FsError::BadDentryCount);
        }
        if (1 + inode_count + data_count) * BLOCK_SIZE > image.len() {
            return Err(FsError::TruncatedImage);
        }
        log::debug!("filesys: {dir_count} entries, {inode_count} inodes, {data_count} data blocks");
        Ok(Self {
            image,
            dir_count,
            inode_count,
            data_count,
        })
    }

    pub fn dir_count(&self) -> usize {
        self.dir_count
    }

    /// Look a file up by name. Names longer than 32 bytes match nothing.
    pub fn resolve(&self, name: &[u8]) -> Option<Dentry> {
        if name.len() > FNAME_LEN {
            return None;
        }
        let mut padded = [0u8; FNAME_LEN];
        padded[..name.len()].copy_from_slice(name);
        (0..self.dir_count)
            .filter_map(|i| self.dentry_by_index(i))
            .find(|d| d.name == padded)
    }

    pub fn dentry_by_index(&self, index: usize) -> Option<Dentry> {
        if index >= self.dir_count {
            return None;
        }
        let base = DENTRY_SIZE + index * DENTRY_SIZE;
        let raw = &self.image[base..base + DENTRY_SIZE];
        let mut name = [0u8; FNAME_LEN];
        name.copy_from_slice(&raw[..FNAME_LEN]);
        Some(Dentry {
            name,
            file_type: read_i32(raw, DENTRY_TYPE_OFFSET),
            inode: read_i32(raw, DENTRY_INODE_OFFSET) as u32,
        })
    }

    fn inode_block(&self, inode: u32) -> &[u8] {
        let base = (1 + inode as usize) * BLOCK_SIZE;
        &self.image[base..base + BLOCK_SIZE]
    }

    /// Byte length of the file behind `inode`, or 0 for a bad inode.
    pub fn file_len(&self, inode: u32) -> usize {
        if inode as usize >= self.inode_count {
            return 0;
        }
        read_i32(self.inode_block(inode), 0) as usize
    }

    /// Copy file bytes starting at `offset` into `buf`. Stops at the inode
    /// length; returns the count copied. A bad inode reads zero bytes.
    pub fn read_data(&self, inode: u32, offset: usize, buf: &mut [u8]) -> usize {
        if inode as usize >= self.inode_count {
            return 0;
        }
        let node = self.inode_block(inode);
        let file_len = read_i32(node, 0) as usize;
        let data_base = (1 + self.inode_count) * BLOCK_SIZE;

        let mut copied = 0;
        while copied < buf.len() {
            let pos = offset + copied;
            if pos >= file_len {
                break;
            }
            let block_slot = pos / BLOCK_SIZE;
            if 8 + block_slot * 4 > BLOCK_SIZE {
                break;
            }
            let block_index = read_i32(node, 4 + block_slot * 4) as usize;
            if block_index >= self.data_count {
                break;
            }
            let block = &self.image[data_base + block_index * BLOCK_SIZE..][..BLOCK_SIZE];

            let in_block = pos % BLOCK_SIZE;
            let run = (BLOCK_SIZE - in_block)
                .min(buf.len() - copied)
                .min(file_len - pos);
            buf[copied..copied + run].copy_from_slice(&block[in_block..in_block + run]);
            copied += run;
        }
        copied
    }
}
