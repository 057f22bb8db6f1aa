use std::cell::Cell;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

#[derive(Debug, Default)]
struct HeapCounters {
    live: Cell<usize>,
    next_id: Cell<u64>,
}

impl HeapCounters {
    fn acquire(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.live.set(self.live.get() + 1);
        id
    }

    fn release(&self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Interpreter heap bookkeeping.
///
/// Every [`Handle`] allocated here is counted until it is dropped, so tests
/// can assert that registrations, frames and variables release what they own.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    counters: Rc<HeapCounters>,
}

impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc<T>(&self, value: T) -> Handle<T> {
        self.pin(Rc::new(value))
    }

    /// Takes an owned handle on an existing shared value.
    pub fn pin<T>(&self, target: Rc<T>) -> Handle<T> {
        let id = self.counters.acquire();
        Handle {
            id,
            target,
            counters: Rc::clone(&self.counters),
        }
    }

    pub fn live_handles(&self) -> usize {
        self.counters.live.get()
    }
}

/// Move-only owning reference into the heap. Dropping it releases the slot
/// exactly once; a second owner needs an explicit [`Handle::duplicate`].
pub struct Handle<T> {
    id: u64,
    target: Rc<T>,
    counters: Rc<HeapCounters>,
}

impl<T> Handle<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn get(&self) -> &T {
        &self.target
    }

    pub fn shared(&self) -> Rc<T> {
        Rc::clone(&self.target)
    }

    /// New handle with its own lifetime pointing at the same target.
    pub fn duplicate(&self) -> Handle<T> {
        let id = self.counters.acquire();
        Handle {
            id,
            target: Rc::clone(&self.target),
            counters: Rc::clone(&self.counters),
        }
    }

    pub fn same_target(&self, other: &Handle<T>) -> bool {
        Rc::ptr_eq(&self.target, &other.target)
    }
}

impl<T> Deref for Handle<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.target
    }
}

impl<T> Drop for Handle<T> {
    fn drop(&mut self) {
        self.counters.release();
    }
}

impl<T: fmt::Debug> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_handles_releases_each_exactly_once() {
        let heap = Heap::new();
        let first = heap.alloc(String::from("main"));
        let second = first.duplicate();
        assert_eq!(heap.live_handles(), 2);
        assert!(first.same_target(&second));
        assert_ne!(first.id(), second.id());

        drop(first);
        assert_eq!(heap.live_handles(), 1);
        assert_eq!(second.as_str(), "main");
        drop(second);
        assert_eq!(heap.live_handles(), 0);
    }

    #[test]
    fn pin_shares_existing_value() {
        let heap = Heap::new();
        let shared = Rc::new(5usize);
        let handle = heap.pin(Rc::clone(&shared));
        assert!(Rc::ptr_eq(&handle.shared(), &shared));
        assert_eq!(*handle.get(), 5);
    }

    #[test]
    fn cloned_heap_shares_counters() {
        let heap = Heap::new();
        let view = heap.clone();
        let _handle = view.alloc(1u8);
        assert_eq!(heap.live_handles(), 1);
    }
}
