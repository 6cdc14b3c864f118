#![allow(dead_code)]

//! Shared fixtures: a boot-image builder matching the read-only filesystem
//! layout, a recording interrupt controller, and bootstrap helpers.

use triton::context::{InterruptController, SavedContext};
use triton::filesys::{TYPE_DIR, TYPE_FILE, TYPE_RTC};
use triton::Kernel;

pub const BLOCK: usize = 4096;
const DENTRY_SIZE: usize = 64;

/// A minimal valid executable: magic, padding, entry point at offset 24,
/// then a little filler standing in for code.
pub fn executable(entry: u32) -> Vec<u8> {
    let mut image = vec![0u8; 28];
    image[..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
    image[24..28].copy_from_slice(&entry.to_le_bytes());
    image.extend_from_slice(b"\x55\x89\xe5\xc3 filler code bytes");
    image
}

/// Assemble a filesystem image: boot block, one inode per regular file,
/// then data blocks in file order.
pub fn build_image(files: &[(&str, i32, &[u8])]) -> Vec<u8> {
    let regular: Vec<_> = files.iter().filter(|(_, t, _)| *t == TYPE_FILE).collect();
    let blocks_of = |len: usize| len.div_ceil(BLOCK).max(1);
    let data_blocks: usize = regular.iter().map(|(_, _, c)| blocks_of(c.len())).sum();

    let mut img = vec![0u8; (1 + regular.len() + data_blocks) * BLOCK];
    img[0..4].copy_from_slice(&(files.len() as i32).to_le_bytes());
    img[4..8].copy_from_slice(&(regular.len() as i32).to_le_bytes());
    img[8..12].copy_from_slice(&(data_blocks as i32).to_le_bytes());

    let mut inode = 0i32;
    let mut next_block = 0usize;
    for (i, (name, ftype, content)) in files.iter().enumerate() {
        let base = DENTRY_SIZE + i * DENTRY_SIZE;
        img[base..base + name.len()].copy_from_slice(name.as_bytes());
        img[base + 32..base + 36].copy_from_slice(&ftype.to_le_bytes());
        if *ftype != TYPE_FILE {
            continue;
        }
        img[base + 36..base + 40].copy_from_slice(&inode.to_le_bytes());

        let node = (1 + inode as usize) * BLOCK;
        img[node..node + 4].copy_from_slice(&(content.len() as i32).to_le_bytes());
        for (slot, chunk) in content.chunks(BLOCK).enumerate() {
            img[node + 4 + slot * 4..node + 8 + slot * 4]
                .copy_from_slice(&(next_block as i32).to_le_bytes());
            let data = (1 + regular.len() + next_block) * BLOCK;
            img[data..data + chunk.len()].copy_from_slice(chunk);
            next_block += 1;
        }
        inode += 1;
    }
    img
}

pub const SHELL_ENTRY: u32 = 0x0804_8010;
pub const PROG_ENTRY: u32 = 0x0804_8040;

/// The standard fixture image: a shell, two programs, a text file, the
/// RTC device node and the directory entry.
pub fn default_image() -> Vec<u8> {
    build_image(&[
        (".", TYPE_DIR, b""),
        ("shell", TYPE_FILE, &executable(SHELL_ENTRY)),
        ("prog", TYPE_FILE, &executable(PROG_ENTRY)),
        ("counter", TYPE_FILE, &executable(0x0804_8080)),
        ("frame0.txt", TYPE_FILE, b"fish swim in the sea\n"),
        ("rtc", TYPE_RTC, b""),
        ("notes", TYPE_FILE, b"plain text, not a program"),
    ])
}

/// Records every acknowledgment the core sends.
#[derive(Default)]
pub struct TestPic {
    pub eois: Vec<u8>,
}

impl InterruptController for TestPic {
    fn end_of_interrupt(&mut self, irq: u8) {
        self.eois.push(irq);
    }
}

pub fn ctx(tag: usize) -> SavedContext {
    SavedContext { sp: tag, fp: tag }
}

/// Drive timer ticks until every terminal has its shell. Leaves the
/// running index at terminal 1 with all three shells live (pids 0..=2 on
/// terminals 1, 2, 0 in activation order).
pub fn boot_all_terminals(kernel: &mut Kernel<'_>) {
    let mut pic = TestPic::default();
    for tick in 0..6 {
        kernel.timer_tick(ctx(0xF000 + tick), &mut pic);
    }
    for tid in 0..3 {
        assert!(kernel.terminals.term(tid).foreground.is_some());
    }
}

/// Live-count invariant, re-checked after every create and halt.
pub fn assert_term_invariant(kernel: &Kernel<'_>) {
    for tid in 0..3 {
        let term = kernel.terminals.term(tid);
        assert_eq!(
            term.num_proc as usize,
            term.occupied(),
            "terminal {tid} live count out of sync"
        );
    }
}
