//! Banked memory regions with per-page access interception.
//!
//! A `Bank` covers `size` pages of 256 bytes starting at `base` in the
//! emulated address space. Storage is either allocated by the bank itself or
//! bound to RAM owned elsewhere (main/aux memory shared by several banks).
//!
//! Two addressing modes exist:
//! - flat: one linear offset `logical_mem_offset + (addr - base)`
//! - video: the offset is split into a (page, offset) pair, the page goes
//!   through a `PageMap` and every write marks the physical page dirty

use std::cell::RefCell;
use std::rc::Rc;

use bitvec::prelude::*;
use smallvec::SmallVec;

use crate::error::{DiskError, DiskResult};

/// Addressing granule for intercepts and dirty tracking.
pub const PAGE_SIZE: usize = 256;

/// RAM owned outside the bank. The binding side keeps ownership.
pub type SharedRam = Rc<RefCell<Vec<u8>>>;

/// Handler shared by every page of an intercepted range.
pub type SharedHandler = Rc<RefCell<dyn PageHandler>>;

/// One access presented to a page handler.
pub enum PageAccess<'a> {
    /// CPU read; the handler may fill `data`.
    Read { addr: u16, data: &'a mut [u8] },
    /// CPU write of `data`.
    Write { addr: u16, data: &'a [u8] },
    /// Bank is being disposed. Sent once per intercepted page.
    Teardown,
}

/// Memory-mapped I/O hook. Returning `true` means the access was handled and
/// the default copy is skipped.
pub trait PageHandler {
    fn access(&mut self, access: PageAccess<'_>) -> bool;
}

impl<F> PageHandler for F
where
    F: FnMut(PageAccess<'_>) -> bool,
{
    fn access(&mut self, access: PageAccess<'_>) -> bool {
        self(access)
    }
}

/// Wrap a handler for `Bank::install_intercept`.
pub fn shared_handler<H: PageHandler + 'static>(handler: H) -> SharedHandler {
    Rc::new(RefCell::new(handler))
}

/// Resolves a logical page (offset >> 8) to a physical page of the backing
/// storage. Several logical pages may alias the same physical page.
pub trait PageMap {
    fn resolve(&self, logical_page: u32) -> Option<u32>;
}

impl<F> PageMap for F
where
    F: Fn(u32) -> Option<u32>,
{
    fn resolve(&self, logical_page: u32) -> Option<u32> {
        self(logical_page)
    }
}

/// Logical page N is physical page N.
pub struct IdentityMap;

impl PageMap for IdentityMap {
    fn resolve(&self, logical_page: u32) -> Option<u32> {
        Some(logical_page)
    }
}

/// Dirty bitmap for video pages, shared between a bank and the renderer.
/// Clone is cheap (just clones the Rc).
#[derive(Clone)]
pub struct DirtyPages {
    bits: Rc<RefCell<BitVec>>,
}

impl DirtyPages {
    pub fn new(pages: usize) -> Self {
        Self {
            bits: Rc::new(RefCell::new(bitvec![0; pages])),
        }
    }

    /// Number of pages tracked.
    pub fn len(&self) -> usize {
        self.bits.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark a physical page dirty. Pages past the bitmap are ignored.
    pub fn mark(&self, page: usize) {
        let mut bits = self.bits.borrow_mut();
        if page < bits.len() {
            bits.set(page, true);
        }
    }

    pub fn is_dirty(&self, page: usize) -> bool {
        let bits = self.bits.borrow();
        page < bits.len() && bits[page]
    }

    pub fn any(&self) -> bool {
        self.bits.borrow().any()
    }

    /// Return the dirty pages in ascending order and clear them.
    pub fn take(&self) -> Vec<usize> {
        let mut bits = self.bits.borrow_mut();
        let pages = bits.iter_ones().collect();
        bits.fill(false);
        pages
    }
}

/// Video addressing: page mapping plus the dirty bitmap it feeds.
pub struct VideoPages {
    map: Box<dyn PageMap>,
    dirty: DirtyPages,
}

impl VideoPages {
    pub fn new(map: impl PageMap + 'static, dirty: DirtyPages) -> Self {
        Self {
            map: Box::new(map),
            dirty,
        }
    }
}

enum Backing {
    Unbound,
    Owned(Vec<u8>),
    Shared(SharedRam),
}

/// A contiguous piece of an access: `len` bytes at raw offset `raw`.
struct Segment {
    raw: usize,
    len: usize,
    page: Option<usize>,
}

type Segments = SmallVec<[Segment; 2]>;

/// An addressable region of emulated memory.
pub struct Bank {
    name: String,
    base: u16,
    /// Size in pages.
    size: u16,
    logical_mem_offset: u32,
    external: Option<SharedRam>,
    backing: Backing,
    access: Option<Vec<Option<SharedHandler>>>,
    video: Option<VideoPages>,
}

impl Bank {
    /// Bank that allocates its own `size * 256` bytes on `init`.
    pub fn new(name: &str, base: u16, size: u16) -> Self {
        Self {
            name: name.to_string(),
            base,
            size,
            logical_mem_offset: 0,
            external: None,
            backing: Backing::Unbound,
            access: None,
            video: None,
        }
    }

    /// Bank bound to RAM owned by the caller, starting at `offset` in it.
    /// `init` never allocates for such a bank.
    pub fn with_storage(name: &str, base: u16, size: u16, ram: SharedRam, offset: u32) -> Self {
        let mut bank = Self::new(name, base, size);
        bank.external = Some(ram);
        bank.logical_mem_offset = offset;
        bank
    }

    /// Switch the bank to video addressing.
    pub fn with_video(mut self, video: VideoPages) -> Self {
        self.video = Some(video);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    /// Size in pages.
    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn is_initialized(&self) -> bool {
        !matches!(self.backing, Backing::Unbound)
    }

    /// Whether storage was allocated by this bank.
    pub fn owns_storage(&self) -> bool {
        matches!(self.backing, Backing::Owned(_))
    }

    /// Dirty bitmap of a video bank.
    pub fn dirty_pages(&self) -> Option<&DirtyPages> {
        self.video.as_ref().map(|v| &v.dirty)
    }

    /// Bind or allocate storage. Calling it again is a no-op.
    pub fn init(&mut self) -> DiskResult<()> {
        if self.is_initialized() {
            return Ok(());
        }
        if let Some(ram) = &self.external {
            self.backing = Backing::Shared(Rc::clone(ram));
            return Ok(());
        }

        let bytes = self.size as usize * PAGE_SIZE;
        let mut raw = Vec::new();
        raw.try_reserve_exact(bytes)
            .map_err(|_| DiskError::BankAlloc {
                bank: self.name.clone(),
                bytes,
            })?;
        raw.resize(bytes, 0);
        self.backing = Backing::Owned(raw);
        Ok(())
    }

    /// Release storage and intercepts. Every intercepted page sees one
    /// `Teardown`. Safe to call twice.
    pub fn dispose(&mut self) {
        self.backing = Backing::Unbound;
        if let Some(table) = self.access.take() {
            for handler in table.iter().flatten() {
                handler.borrow_mut().access(PageAccess::Teardown);
            }
        }
    }

    /// Install `handler` on pages `first..=last` (absolute page numbers).
    /// `None` for `last` covers the single page `first`.
    pub fn install_intercept(
        &mut self,
        handler: SharedHandler,
        first: u8,
        last: Option<u8>,
    ) -> DiskResult<()> {
        let last = last.unwrap_or(first);
        let base_page = (self.base >> 8) as u32;
        let (first_abs, last_abs) = (first as u32, last as u32);

        if first_abs < base_page || last_abs < first_abs || last_abs - base_page >= self.size as u32
        {
            log::debug!(
                "{}: invalid intercept range {:02x}-{:02x}",
                self.name,
                first,
                last
            );
            return Err(DiskError::InvalidPageRange { first, last });
        }

        let size = self.size as usize;
        let table = self.access.get_or_insert_with(|| vec![None; size]);
        log::debug!("{}: intercept pages {:02x}:{:02x}", self.name, first, last);
        for page in (first_abs - base_page)..=(last_abs - base_page) {
            let slot = &mut table[page as usize];
            if slot.is_some() {
                log::debug!("{}: page {:02x} already has a handler", self.name, page);
            }
            *slot = Some(Rc::clone(&handler));
        }
        Ok(())
    }

    /// Whether a handler is installed for the page holding `addr`.
    pub fn is_intercepted(&self, addr: u16) -> bool {
        self.handler_for(addr).is_some()
    }

    /// Read `data.len()` bytes at `addr`.
    pub fn read(&self, addr: u16, data: &mut [u8]) -> DiskResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_window(addr, data.len())?;
        if let Some(handler) = self.handler_for(addr) {
            let access = PageAccess::Read {
                addr,
                data: &mut *data,
            };
            if handler.borrow_mut().access(access) {
                return Ok(());
            }
        }

        let segments = self.segments(addr, data.len())?;
        match &self.backing {
            Backing::Owned(raw) => copy_out(raw, &segments, data),
            Backing::Shared(ram) => copy_out(&ram.borrow(), &segments, data),
            Backing::Unbound => return Err(DiskError::BankUninitialized(self.name.clone())),
        }
        Ok(())
    }

    /// Write `data` at `addr`. Video banks mark each touched page dirty.
    pub fn write(&mut self, addr: u16, data: &[u8]) -> DiskResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.check_window(addr, data.len())?;
        if let Some(handler) = self.handler_for(addr) {
            if handler
                .borrow_mut()
                .access(PageAccess::Write { addr, data })
            {
                return Ok(());
            }
        }

        let segments = self.segments(addr, data.len())?;
        match &mut self.backing {
            Backing::Owned(raw) => copy_in(raw, &segments, data),
            Backing::Shared(ram) => copy_in(&mut ram.borrow_mut(), &segments, data),
            Backing::Unbound => return Err(DiskError::BankUninitialized(self.name.clone())),
        }
        if let Some(video) = &self.video {
            for page in segments.iter().filter_map(|s| s.page) {
                video.dirty.mark(page);
            }
        }
        Ok(())
    }

    /// Read a single byte.
    pub fn peek(&self, addr: u16) -> DiskResult<u8> {
        let mut byte = [0u8; 1];
        self.read(addr, &mut byte)?;
        Ok(byte[0])
    }

    /// Write a single byte.
    pub fn poke(&mut self, addr: u16, value: u8) -> DiskResult<()> {
        self.write(addr, &[value])
    }

    fn handler_for(&self, addr: u16) -> Option<SharedHandler> {
        let table = self.access.as_ref()?;
        let page = (addr.checked_sub(self.base)? >> 8) as usize;
        table.get(page)?.clone()
    }

    fn check_window(&self, addr: u16, len: usize) -> DiskResult<()> {
        if !self.is_initialized() {
            return Err(DiskError::BankUninitialized(self.name.clone()));
        }
        let window = self.size as usize * PAGE_SIZE;
        let inside = addr
            .checked_sub(self.base)
            .map(|rel| rel as usize + len <= window)
            .unwrap_or(false);
        if inside {
            Ok(())
        } else {
            Err(self.out_of_range(addr, len))
        }
    }

    fn raw_len(&self) -> usize {
        match &self.backing {
            Backing::Unbound => 0,
            Backing::Owned(raw) => raw.len(),
            Backing::Shared(ram) => ram.borrow().len(),
        }
    }

    /// Split an access into raw-storage segments, resolving every page before
    /// any byte moves.
    fn segments(&self, addr: u16, len: usize) -> DiskResult<Segments> {
        let raw_len = self.raw_len();
        let start = self.logical_mem_offset as usize + (addr - self.base) as usize;
        let mut segments = Segments::new();

        let Some(video) = &self.video else {
            if start + len > raw_len {
                return Err(self.out_of_range(addr, len));
            }
            segments.push(Segment {
                raw: start,
                len,
                page: None,
            });
            return Ok(segments);
        };

        let mut phy = start;
        let mut left = len;
        while left > 0 {
            let off = phy % PAGE_SIZE;
            let n = left.min(PAGE_SIZE - off);
            let logical = (phy / PAGE_SIZE) as u32;
            let page = video
                .map
                .resolve(logical)
                .map(|p| p as usize)
                .filter(|p| (p + 1) * PAGE_SIZE <= raw_len)
                .ok_or_else(|| DiskError::UnmappedPage {
                    bank: self.name.clone(),
                    page: logical,
                })?;
            segments.push(Segment {
                raw: page * PAGE_SIZE + off,
                len: n,
                page: Some(page),
            });
            phy += n;
            left -= n;
        }
        Ok(segments)
    }

    fn out_of_range(&self, addr: u16, len: usize) -> DiskError {
        DiskError::AddressOutOfRange {
            bank: self.name.clone(),
            addr,
            len,
        }
    }
}

impl Drop for Bank {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn copy_out(raw: &[u8], segments: &[Segment], data: &mut [u8]) {
    let mut pos = 0;
    for seg in segments {
        data[pos..pos + seg.len].copy_from_slice(&raw[seg.raw..seg.raw + seg.len]);
        pos += seg.len;
    }
}

fn copy_in(raw: &mut [u8], segments: &[Segment], data: &[u8]) {
    let mut pos = 0;
    for seg in segments {
        raw[seg.raw..seg.raw + seg.len].copy_from_slice(&data[pos..pos + seg.len]);
        pos += seg.len;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_allocates_once() {
        let mut bank = Bank::new("main", 0x0000, 0xc0);
        assert!(!bank.is_initialized());
        bank.init().unwrap();
        assert!(bank.owns_storage());
        bank.poke(0x1234, 0xA5).unwrap();
        bank.init().unwrap();
        assert_eq!(bank.peek(0x1234).unwrap(), 0xA5);
    }

    #[test]
    fn test_uninitialized_bank_rejects_access() {
        let bank = Bank::new("main", 0x0000, 4);
        let mut buf = [0u8; 2];
        assert!(matches!(
            bank.read(0x0010, &mut buf),
            Err(DiskError::BankUninitialized(_))
        ));
    }

    #[test]
    fn test_external_storage_not_owned() {
        let ram: SharedRam = Rc::new(RefCell::new(vec![0u8; 0x1000]));
        let mut bank = Bank::with_storage("aux", 0x0400, 4, Rc::clone(&ram), 0x0800);
        bank.init().unwrap();
        assert!(!bank.owns_storage());

        bank.write(0x0400, &[1, 2, 3]).unwrap();
        assert_eq!(&ram.borrow()[0x0800..0x0803], &[1, 2, 3]);

        bank.dispose();
        bank.dispose();
        assert!(!bank.is_initialized());
        assert_eq!(Rc::strong_count(&ram), 2);
        assert_eq!(ram.borrow()[0x0801], 2);
    }

    #[test]
    fn test_access_out_of_window() {
        let mut bank = Bank::new("lc", 0xd000, 0x10);
        bank.init().unwrap();
        assert!(bank.poke(0xcfff, 0).is_err());
        assert!(bank.write(0xdfff, &[1, 2]).is_err());
        assert!(bank.poke(0xdfff, 7).is_ok());
    }

    #[test]
    fn test_intercept_handles_and_skips_copy() {
        let mut bank = Bank::new("io", 0xc000, 1);
        bank.init().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let handler = shared_handler(move |access: PageAccess<'_>| match access {
            PageAccess::Read { addr, data } => {
                data[0] = (addr & 0xff) as u8;
                true
            }
            PageAccess::Write { addr, data } => {
                log.borrow_mut().push((addr, data[0]));
                true
            }
            PageAccess::Teardown => false,
        });
        bank.install_intercept(handler, 0xc0, None).unwrap();

        assert_eq!(bank.peek(0xc030).unwrap(), 0x30);
        bank.poke(0xc010, 0x99).unwrap();
        assert_eq!(*seen.borrow(), vec![(0xc010, 0x99)]);
    }

    #[test]
    fn test_unhandled_intercept_falls_through() {
        let mut bank = Bank::new("ram", 0x0000, 2);
        bank.init().unwrap();
        bank.install_intercept(shared_handler(|_: PageAccess<'_>| false), 0x01, None)
            .unwrap();
        bank.poke(0x0120, 0x42).unwrap();
        assert_eq!(bank.peek(0x0120).unwrap(), 0x42);
    }

    #[test]
    fn test_install_rejects_range_outside_bank() {
        let mut bank = Bank::new("lc", 0xd000, 0x10);
        let handler = shared_handler(|_: PageAccess<'_>| true);
        assert!(bank
            .install_intercept(Rc::clone(&handler), 0xc0, Some(0xd0))
            .is_err());
        assert!(bank
            .install_intercept(Rc::clone(&handler), 0xd0, Some(0xe0))
            .is_err());
        assert!(bank
            .install_intercept(Rc::clone(&handler), 0xd4, Some(0xd2))
            .is_err());
        assert!(!bank.is_intercepted(0xd000));
        assert!(bank.install_intercept(handler, 0xd0, Some(0xdf)).is_ok());
        assert!(bank.is_intercepted(0xdf80));
    }

    #[test]
    fn test_install_overwrites_existing_handler() {
        let mut bank = Bank::new("io", 0xc000, 2);
        bank.init().unwrap();
        let tagged = |tag: u8| {
            shared_handler(move |access: PageAccess<'_>| match access {
                PageAccess::Read { data, .. } => {
                    data[0] = tag;
                    true
                }
                _ => false,
            })
        };
        bank.install_intercept(tagged(0x11), 0xc0, Some(0xc1)).unwrap();
        bank.install_intercept(tagged(0x22), 0xc1, None).unwrap();

        assert_eq!(bank.peek(0xc010).unwrap(), 0x11);
        assert_eq!(bank.peek(0xc110).unwrap(), 0x22);
    }

    #[test]
    fn test_dispose_tears_down_every_page() {
        let mut bank = Bank::new("io", 0xc000, 0x10);
        bank.init().unwrap();
        let teardowns = Rc::new(RefCell::new(0));
        let count = Rc::clone(&teardowns);
        let handler = shared_handler(move |access: PageAccess<'_>| {
            if matches!(access, PageAccess::Teardown) {
                *count.borrow_mut() += 1;
            }
            false
        });
        bank.install_intercept(handler, 0xc1, Some(0xc3)).unwrap();
        bank.dispose();
        bank.dispose();
        assert_eq!(*teardowns.borrow(), 3);
    }

    #[test]
    fn test_video_write_splits_pages_and_marks_dirty() {
        let dirty = DirtyPages::new(8);
        let mut bank =
            Bank::new("video", 0x0400, 8).with_video(VideoPages::new(IdentityMap, dirty.clone()));
        bank.init().unwrap();

        let data: Vec<u8> = (0..16).collect();
        bank.write(0x04f8, &data).unwrap();
        assert_eq!(dirty.take(), vec![0, 1]);
        assert!(!dirty.any());

        let mut back = [0u8; 16];
        bank.read(0x04f8, &mut back).unwrap();
        assert_eq!(&back[..], &data[..]);
    }

    #[test]
    fn test_video_aliased_pages() {
        // Logical pages 0-3 and 4-7 share physical pages 0-3.
        let dirty = DirtyPages::new(8);
        let map = |page: u32| Some(page % 4);
        let mut bank = Bank::new("video", 0x0400, 8)
            .with_video(VideoPages::new(map, dirty.clone()));
        bank.init().unwrap();

        bank.poke(0x0810, 0x5a).unwrap();
        assert_eq!(bank.peek(0x0410).unwrap(), 0x5a);
        assert!(dirty.is_dirty(0));
        assert!(!dirty.is_dirty(4));
    }

    #[test]
    fn test_video_unmapped_page_leaves_storage_untouched() {
        let dirty = DirtyPages::new(2);
        let map = |page: u32| if page == 0 { Some(0) } else { None };
        let mut bank = Bank::new("video", 0x2000, 2)
            .with_video(VideoPages::new(map, dirty.clone()));
        bank.init().unwrap();

        assert!(matches!(
            bank.write(0x20ff, &[1, 2]),
            Err(DiskError::UnmappedPage { page: 1, .. })
        ));
        assert_eq!(bank.peek(0x20ff).unwrap(), 0);
        assert!(!dirty.any());
    }
}
