//! Kernel heap: a linked-list allocator over a static arena.
//!
//! The allocator itself only knows its holes through a private list, so the
//! live extents are mirrored next to it. Free-block figures are the gaps
//! between those extents, which is where the allocator keeps its holes.

use core::alloc::Layout;
use core::ptr::NonNull;

use linked_list_allocator::Heap;

use crate::constants::heap::MAX_TRACKED_ALLOCATIONS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub total: usize,
    pub used: usize,
    pub free: usize,
    pub largest_free_block: usize,
    pub allocation_count: usize,
    pub free_block_count: usize,
}

/// Smallest block the allocator hands out; it stores a hole header in freed memory.
const MIN_BLOCK: usize = 16;
const BLOCK_ALIGN: usize = 8;

/// Bytes the allocator actually reserves for `layout`.
fn block_size(layout: Layout) -> usize {
    let size = layout.size().max(MIN_BLOCK);
    (size + BLOCK_ALIGN - 1) & !(BLOCK_ALIGN - 1)
}

/// Live allocations as `(start, size)`, sorted by start.
struct ExtentMap {
    extents: [(usize, usize); MAX_TRACKED_ALLOCATIONS],
    len: usize,
    /// Live allocations that did not fit in the table
    untracked: usize,
}

impl ExtentMap {
    const fn new() -> Self {
        Self {
            extents: [(0, 0); MAX_TRACKED_ALLOCATIONS],
            len: 0,
            untracked: 0,
        }
    }

    fn live(&self) -> &[(usize, usize)] {
        &self.extents[..self.len]
    }

    fn insert(&mut self, start: usize, size: usize) {
        if self.len == MAX_TRACKED_ALLOCATIONS {
            self.untracked += 1;
            return;
        }
        let at = match self.live().binary_search_by_key(&start, |&(s, _)| s) {
            Ok(at) | Err(at) => at,
        };
        self.extents.copy_within(at..self.len, at + 1);
        self.extents[at] = (start, size);
        self.len += 1;
    }

    fn remove(&mut self, start: usize) {
        match self.live().binary_search_by_key(&start, |&(s, _)| s) {
            Ok(at) => {
                self.extents.copy_within(at + 1..self.len, at);
                self.len -= 1;
            }
            Err(_) => self.untracked = self.untracked.saturating_sub(1),
        }
    }

    fn count(&self) -> usize {
        self.len + self.untracked
    }

    /// Number and largest size of the free gaps in `bottom..top`.
    fn gaps(&self, bottom: usize, top: usize) -> (usize, usize) {
        let mut count = 0;
        let mut largest = 0;
        let mut cursor = bottom;
        let ends = self.live().iter().map(|&(s, len)| (s, s + len));
        for (start, end) in ends.chain(core::iter::once((top, top))) {
            if start > cursor {
                count += 1;
                largest = largest.max(start - cursor);
            }
            cursor = cursor.max(end);
        }
        (count, largest)
    }
}

/// The allocator plus a record of what it has handed out.
pub struct TrackedHeap {
    heap: Heap,
    live: ExtentMap,
}

impl TrackedHeap {
    pub const fn empty() -> Self {
        Self {
            heap: Heap::empty(),
            live: ExtentMap::new(),
        }
    }

    /// # Safety
    ///
    /// `bottom..bottom + size` must be valid, unused memory that outlives the heap.
    pub unsafe fn init(&mut self, bottom: *mut u8, size: usize) {
        self.heap.init(bottom, size);
    }

    pub fn allocate(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let ptr = self.heap.allocate_first_fit(layout).ok()?;
        self.live.insert(ptr.as_ptr() as usize, block_size(layout));
        Some(ptr)
    }

    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this heap with the same `layout`.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>, layout: Layout) {
        self.live.remove(ptr.as_ptr() as usize);
        self.heap.deallocate(ptr, layout);
    }

    pub fn stats(&self) -> HeapStats {
        let (free_block_count, largest_free_block) = self
            .live
            .gaps(self.heap.bottom() as usize, self.heap.top() as usize);
        HeapStats {
            total: self.heap.size(),
            used: self.heap.used(),
            free: self.heap.free(),
            largest_free_block,
            allocation_count: self.live.count(),
            free_block_count,
        }
    }
}

#[cfg(target_os = "none")]
pub use arena::{init, stats};

#[cfg(target_os = "none")]
mod arena {
    use core::alloc::{GlobalAlloc, Layout};
    use core::ptr::{self, addr_of_mut, NonNull};

    use spin::Mutex;

    use super::{HeapStats, TrackedHeap};
    use crate::constants::heap::HEAP_SIZE;

    /// The heap lock is also taken by code running in interrupt handlers,
    /// so it is only ever held with interrupts masked.
    struct KernelAllocator(Mutex<TrackedHeap>);

    unsafe impl GlobalAlloc for KernelAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            crate::without_interrupts(|| {
                self.0
                    .lock()
                    .allocate(layout)
                    .map_or(ptr::null_mut(), NonNull::as_ptr)
            })
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            if let Some(ptr) = NonNull::new(ptr) {
                crate::without_interrupts(|| self.0.lock().deallocate(ptr, layout));
            }
        }
    }

    #[global_allocator]
    static ALLOCATOR: KernelAllocator = KernelAllocator(Mutex::new(TrackedHeap::empty()));

    static mut ARENA: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

    /// Must run once, before the first allocation.
    pub fn init() {
        // SAFETY: the arena is only ever handed to the allocator, once.
        crate::without_interrupts(|| unsafe {
            ALLOCATOR
                .0
                .lock()
                .init(addr_of_mut!(ARENA) as *mut u8, HEAP_SIZE);
        });
        log::info!("heap: {} KiB arena ready", HEAP_SIZE / 1024);
    }

    pub fn stats() -> HeapStats {
        crate::without_interrupts(|| ALLOCATOR.0.lock().stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARENA: usize = 4096;

    #[repr(C, align(16))]
    struct Arena([u8; ARENA]);

    fn heap(arena: &mut Arena) -> TrackedHeap {
        let mut heap = TrackedHeap::empty();
        unsafe { heap.init(arena.0.as_mut_ptr(), ARENA) };
        heap
    }

    fn layout(size: usize) -> Layout {
        Layout::from_size_align(size, 8).unwrap()
    }

    #[test]
    fn fresh_heap_is_one_free_block() {
        let mut arena = Box::new(Arena([0; ARENA]));
        let heap = heap(&mut arena);

        let stats = heap.stats();
        assert_eq!(stats.total, ARENA);
        assert_eq!(stats.used, 0);
        assert_eq!(stats.free, ARENA);
        assert_eq!(stats.allocation_count, 0);
        assert_eq!(stats.free_block_count, 1);
        assert_eq!(stats.largest_free_block, ARENA);
    }

    #[test]
    fn freeing_a_middle_block_splits_free_space() {
        let mut arena = Box::new(Arena([0; ARENA]));
        let mut heap = heap(&mut arena);

        let a = heap.allocate(layout(64)).unwrap();
        let b = heap.allocate(layout(64)).unwrap();
        let c = heap.allocate(layout(64)).unwrap();
        let stats = heap.stats();
        assert_eq!(stats.allocation_count, 3);
        assert_eq!(stats.used, 192);
        assert_eq!(stats.free_block_count, 1);
        assert_eq!(stats.largest_free_block, ARENA - 192);

        unsafe { heap.deallocate(b, layout(64)) };
        let stats = heap.stats();
        assert_eq!(stats.allocation_count, 2);
        assert_eq!(stats.free_block_count, 2);
        assert_eq!(stats.largest_free_block, ARENA - 192);

        unsafe {
            heap.deallocate(a, layout(64));
            heap.deallocate(c, layout(64));
        }
        let stats = heap.stats();
        assert_eq!(stats.allocation_count, 0);
        assert_eq!(stats.free_block_count, 1);
        assert_eq!(stats.largest_free_block, ARENA);
    }

    #[test]
    fn small_requests_take_a_minimum_block() {
        assert_eq!(block_size(layout(1)), 16);
        assert_eq!(block_size(layout(17)), 24);
        assert_eq!(block_size(layout(64)), 64);
    }

    #[test]
    fn exhausted_heap_reports_no_free_block() {
        let mut arena = Box::new(Arena([0; ARENA]));
        let mut heap = heap(&mut arena);

        let all = heap.allocate(layout(ARENA)).unwrap();
        assert!(heap.allocate(layout(16)).is_none());
        let stats = heap.stats();
        assert_eq!(stats.free_block_count, 0);
        assert_eq!(stats.largest_free_block, 0);
        assert_eq!(stats.allocation_count, 1);

        unsafe { heap.deallocate(all, layout(ARENA)) };
        assert_eq!(heap.stats().free_block_count, 1);
    }
}
