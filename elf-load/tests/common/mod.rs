#![allow(dead_code)]

use std::cell::RefCell;

use elf_load::{AddressSpace, LoadTarget, SegmentFlags, VirtAddr};
use ta_store::{ReadMode, StoreError, StoreHandle, StoreResult, TaStore, TaStoreHandle};
use tee_core::TaUuid;

pub const UUID: TaUuid = TaUuid::new(
    0x8aaa_f200,
    0x2450,
    0x11e4,
    [0xab, 0xe2, 0x00, 0x02, 0xa5, 0xd5, 0xc5, 0x1b],
);

pub const EM_ARM: u16 = 40;
pub const EM_AARCH64: u16 = 183;
pub const ET_DYN: u16 = 3;

pub const PT_LOAD: u32 = 1;
pub const PT_INTERP: u32 = 3;
pub const PT_NOTE: u32 = 4;

pub const RX: SegmentFlags = SegmentFlags::READ.union(SegmentFlags::EXECUTE);
pub const RW: SegmentFlags = SegmentFlags::READ.union(SegmentFlags::WRITE);

/// Deterministic, non-zero filler so that misplaced bytes are noticed.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) | 1)
        .collect()
}

#[derive(Debug, Clone, Copy)]
pub struct Phdr {
    pub kind: u32,
    pub flags: u32,
    pub offset: u64,
    pub vaddr: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub align: u64,
}

impl Phdr {
    pub fn load(offset: u64, vaddr: u64, filesz: u64, memsz: u64, flags: SegmentFlags) -> Self {
        Self {
            kind: PT_LOAD,
            flags: flags.bits(),
            offset,
            vaddr,
            filesz,
            memsz,
            align: 0x1000,
        }
    }

    pub fn other(kind: u32) -> Self {
        Self {
            kind,
            flags: SegmentFlags::READ.bits(),
            offset: 0,
            vaddr: 0,
            filesz: 0,
            memsz: 0,
            align: 1,
        }
    }
}

/// Byte-level ELF writer, in the native encoding.
#[derive(Debug, Clone)]
pub struct ElfBuilder {
    is_32bit: bool,
    machine: u16,
    entry: u64,
    phoff: Option<u64>,
    phdrs: Vec<Phdr>,
    data: Vec<(u64, Vec<u8>)>,
    size: Option<usize>,
}

impl ElfBuilder {
    pub fn new64() -> Self {
        Self {
            is_32bit: false,
            machine: EM_AARCH64,
            entry: 0,
            phoff: None,
            phdrs: Vec::new(),
            data: Vec::new(),
            size: None,
        }
    }

    pub fn new32() -> Self {
        Self {
            is_32bit: true,
            machine: EM_ARM,
            ..Self::new64()
        }
    }

    pub fn entry(mut self, entry: u64) -> Self {
        self.entry = entry;
        self
    }

    pub fn phoff(mut self, phoff: u64) -> Self {
        self.phoff = Some(phoff);
        self
    }

    pub fn phdr(mut self, phdr: Phdr) -> Self {
        self.phdrs.push(phdr);
        self
    }

    pub fn data(mut self, offset: u64, bytes: Vec<u8>) -> Self {
        self.data.push((offset, bytes));
        self
    }

    /// Forces the file size. Anything that does not fit is dropped.
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    fn sizes(&self) -> (u64, u64) {
        if self.is_32bit { (52, 32) } else { (64, 56) }
    }

    pub fn table_end(&self) -> u64 {
        let (ehsize, phentsize) = self.sizes();
        self.phoff.unwrap_or(ehsize) + phentsize * self.phdrs.len() as u64
    }

    pub fn build(&self) -> Vec<u8> {
        let (ehsize, phentsize) = self.sizes();
        let phoff = self.phoff.unwrap_or(ehsize);
        let natural = self
            .data
            .iter()
            .map(|(offset, bytes)| *offset as usize + bytes.len())
            .chain([self.table_end() as usize])
            .max()
            .unwrap_or(0);
        let mut out = vec![0u8; self.size.unwrap_or(natural)];

        for (i, ph) in self.phdrs.iter().enumerate() {
            let at = (phoff + i as u64 * phentsize) as usize;
            if self.is_32bit {
                put(&mut out, at, &ph.kind.to_ne_bytes());
                put(&mut out, at + 4, &(ph.offset as u32).to_ne_bytes());
                put(&mut out, at + 8, &(ph.vaddr as u32).to_ne_bytes());
                put(&mut out, at + 12, &(ph.vaddr as u32).to_ne_bytes());
                put(&mut out, at + 16, &(ph.filesz as u32).to_ne_bytes());
                put(&mut out, at + 20, &(ph.memsz as u32).to_ne_bytes());
                put(&mut out, at + 24, &ph.flags.to_ne_bytes());
                put(&mut out, at + 28, &(ph.align as u32).to_ne_bytes());
            } else {
                put(&mut out, at, &ph.kind.to_ne_bytes());
                put(&mut out, at + 4, &ph.flags.to_ne_bytes());
                put(&mut out, at + 8, &ph.offset.to_ne_bytes());
                put(&mut out, at + 16, &ph.vaddr.to_ne_bytes());
                put(&mut out, at + 24, &ph.vaddr.to_ne_bytes());
                put(&mut out, at + 32, &ph.filesz.to_ne_bytes());
                put(&mut out, at + 40, &ph.memsz.to_ne_bytes());
                put(&mut out, at + 48, &ph.align.to_ne_bytes());
            }
        }

        for (offset, bytes) in &self.data {
            put(&mut out, *offset as usize, bytes);
        }

        // Written last so that the header wins over overlapping entries
        put(&mut out, 0, &[0x7f, b'E', b'L', b'F']);
        put(&mut out, 4, &[if self.is_32bit { 1 } else { 2 }]);
        put(&mut out, 5, &[if cfg!(target_endian = "little") { 1 } else { 2 }]);
        put(&mut out, 6, &[1]);
        put(&mut out, 16, &ET_DYN.to_ne_bytes());
        put(&mut out, 18, &self.machine.to_ne_bytes());
        put(&mut out, 20, &1u32.to_ne_bytes());

        let phnum = self.phdrs.len() as u16;
        if self.is_32bit {
            put(&mut out, 24, &(self.entry as u32).to_ne_bytes());
            put(&mut out, 28, &(phoff as u32).to_ne_bytes());
            put(&mut out, 40, &(ehsize as u16).to_ne_bytes());
            put(&mut out, 42, &(phentsize as u16).to_ne_bytes());
            put(&mut out, 44, &phnum.to_ne_bytes());
        } else {
            put(&mut out, 24, &self.entry.to_ne_bytes());
            put(&mut out, 32, &phoff.to_ne_bytes());
            put(&mut out, 52, &(ehsize as u16).to_ne_bytes());
            put(&mut out, 54, &(phentsize as u16).to_ne_bytes());
            put(&mut out, 56, &phnum.to_ne_bytes());
        }
        out
    }
}

fn put(out: &mut [u8], at: usize, bytes: &[u8]) {
    for (i, b) in bytes.iter().enumerate() {
        if let Some(slot) = out.get_mut(at + i) {
            *slot = *b;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Copy(usize),
    Skip(usize),
    Close,
}

/// A store serving a single image and journaling every backend call.
pub struct RecordingStore {
    uuid: TaUuid,
    image: Vec<u8>,
    fail_at: Option<usize>,
    journal: RefCell<Vec<Op>>,
}

impl RecordingStore {
    pub fn new(uuid: TaUuid, image: Vec<u8>) -> Self {
        Self {
            uuid,
            image,
            fail_at: None,
            journal: RefCell::new(Vec::new()),
        }
    }

    /// Makes any read crossing `offset` fail with an I/O error.
    pub fn failing_at(mut self, offset: usize) -> Self {
        self.fail_at = Some(offset);
        self
    }

    pub fn size(&self) -> usize {
        self.image.len()
    }

    pub fn handle(&self) -> StoreHandle<'_> {
        StoreHandle::open(self, &self.uuid).expect("open recording store")
    }

    pub fn ops(&self) -> Vec<Op> {
        self.journal.borrow().clone()
    }

    pub fn consumed(&self) -> usize {
        self.journal
            .borrow()
            .iter()
            .map(|op| match op {
                Op::Copy(n) | Op::Skip(n) => *n,
                Op::Close => 0,
            })
            .sum()
    }

    pub fn copied(&self) -> usize {
        self.journal
            .borrow()
            .iter()
            .map(|op| match op {
                Op::Copy(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn closes(&self) -> usize {
        self.journal
            .borrow()
            .iter()
            .filter(|op| **op == Op::Close)
            .count()
    }
}

impl TaStore for RecordingStore {
    fn description(&self) -> &str {
        "recording"
    }

    fn open(&self, uuid: &TaUuid) -> StoreResult<Box<dyn TaStoreHandle + '_>> {
        if *uuid != self.uuid {
            return Err(StoreError::NotFound);
        }
        Ok(Box::new(RecordingHandle {
            store: self,
            offset: 0,
        }))
    }
}

struct RecordingHandle<'a> {
    store: &'a RecordingStore,
    offset: usize,
}

impl TaStoreHandle for RecordingHandle<'_> {
    fn size(&self) -> StoreResult<usize> {
        Ok(self.store.image.len())
    }

    fn read(&mut self, mode: ReadMode<'_>) -> StoreResult<()> {
        let len = mode.len();
        let end = self.offset + len;
        assert!(end <= self.store.image.len(), "read past the end of the TA");
        if self.store.fail_at.is_some_and(|at| end > at) {
            return Err(StoreError::Io);
        }

        let op = match mode {
            ReadMode::Copy(buf) => {
                buf.copy_from_slice(&self.store.image[self.offset..end]);
                Op::Copy(len)
            }
            ReadMode::Skip(n) => Op::Skip(n),
        };
        self.store.journal.borrow_mut().push(op);
        self.offset = end;
        Ok(())
    }

    fn close(&mut self) {
        self.store.journal.borrow_mut().push(Op::Close);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpaceOp {
    Reserve(u64),
    Protect(VirtAddr, u64, SegmentFlags),
    Release(VirtAddr, u64),
}

/// An address space with a single span, starting at a fixed address.
///
/// Reserved memory is filled with `0xCC` so that missing zero-fills show.
#[derive(Debug)]
pub struct RecordingSpace {
    pub base: VirtAddr,
    pub memory: Vec<u8>,
    pub ops: Vec<SpaceOp>,
    pub fail_protect: bool,
}

impl RecordingSpace {
    pub fn new(base: u64) -> Self {
        Self {
            base: VirtAddr::new(base),
            memory: Vec::new(),
            ops: Vec::new(),
            fail_protect: false,
        }
    }

    /// A space whose span is already reserved.
    pub fn with_span(base: u64, size: usize) -> Self {
        let mut space = Self::new(base);
        space.memory = vec![0xCC; size];
        space
    }

    pub fn at(&self, addr: u64, len: usize) -> &[u8] {
        let start = (addr - self.base.as_u64()) as usize;
        &self.memory[start..start + len]
    }

    fn window(&mut self, dest: VirtAddr, len: u64) -> Result<&mut [u8], ()> {
        let start = dest.checked_offset_from(self.base).ok_or(())? as usize;
        let end = start.checked_add(len as usize).ok_or(())?;
        self.memory.get_mut(start..end).ok_or(())
    }
}

impl LoadTarget for RecordingSpace {
    fn copy_data(&mut self, dest: VirtAddr, src: &[u8]) -> Result<(), ()> {
        self.window(dest, src.len() as u64)?.copy_from_slice(src);
        Ok(())
    }

    fn zero_region(&mut self, dest: VirtAddr, size: u64) -> Result<(), ()> {
        self.window(dest, size)?.fill(0);
        Ok(())
    }
}

impl AddressSpace for RecordingSpace {
    fn reserve(&mut self, size: u64) -> Result<VirtAddr, ()> {
        self.ops.push(SpaceOp::Reserve(size));
        self.memory = vec![0xCC; size as usize];
        Ok(self.base)
    }

    fn protect(&mut self, addr: VirtAddr, size: u64, flags: SegmentFlags) -> Result<(), ()> {
        if self.fail_protect {
            return Err(());
        }
        self.ops.push(SpaceOp::Protect(addr, size, flags));
        Ok(())
    }

    fn release(&mut self, addr: VirtAddr, size: u64) {
        self.ops.push(SpaceOp::Release(addr, size));
    }
}
