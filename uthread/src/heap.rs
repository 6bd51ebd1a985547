//! The process heap: a free-list allocator wrapped in the library's own
//! mutex and installed as the `#[global_allocator]`, so `alloc::boxed::Box`,
//! `alloc::vec::Vec`, and `alloc::sync::Arc` work from any thread.
//!
//! Locking only turns on once `thread::init` has run; before that there is
//! only one thread, matching the source's `malloc_init`/`mutex_initialized`
//! fallback of serving allocations unsynchronized until multithreading
//! actually begins.
#![cfg(not(feature = "hosted-mock"))]
use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use linked_list_allocator::Heap;

use crate::mutex::Mutex;

struct HeapAllocator {
    heap: UnsafeCell<Heap>,
    lock: Mutex,
    locking: AtomicBool,
}

unsafe impl Sync for HeapAllocator {}

impl HeapAllocator {
    const fn empty() -> Self {
        HeapAllocator {
            heap: UnsafeCell::new(Heap::empty()),
            lock: Mutex::new(),
            locking: AtomicBool::new(false),
        }
    }

    fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        let locking = self.locking.load(Ordering::Acquire);
        if locking {
            self.lock.lock();
        }
        let result = f(unsafe { &mut *self.heap.get() });
        if locking {
            self.lock.unlock();
        }
        result
    }
}

unsafe impl GlobalAlloc for HeapAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.with_heap(|heap| {
            heap.allocate_first_fit(layout)
                .map(|p| p.as_ptr())
                .unwrap_or(core::ptr::null_mut())
        })
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        self.with_heap(|heap| unsafe {
            heap.deallocate(NonNull::new_unchecked(ptr), layout)
        });
    }
}

#[global_allocator]
static ALLOCATOR: HeapAllocator = HeapAllocator::empty();

/// Gives the heap its backing region. Must be called exactly once, before
/// any allocation, typically by the process's own startup code ahead of
/// `thread::init`.
///
/// # Safety
///
/// `[start, start + size)` must be unused, valid memory for the remainder
/// of the process.
pub unsafe fn init_heap(start: *mut u8, size: usize) {
    unsafe { (&mut *ALLOCATOR.heap.get()).init(start, size) };
}

/// Grows the heap's backing region by `additional` bytes starting right
/// after the current top.
///
/// # Safety
///
/// The `additional` bytes immediately following the heap's current top
/// must be unused, valid memory.
pub unsafe fn extend_heap(additional: usize) {
    ALLOCATOR.with_heap(|heap| unsafe { heap.extend(additional) });
}

/// Arms the allocator's internal mutex. Called once by `thread::init`.
pub fn enable_locking() {
    ALLOCATOR
        .lock
        .init()
        .expect("the heap allocator's mutex is only initialized once");
    ALLOCATOR.locking.store(true, Ordering::Release);
}
