//! Synchronous store watchers.
//!
//! A store fires its watchers from inside `save`/`delete`, after its own state
//! is updated and with no internal borrow held, so a watcher may call back
//! into the same store.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Callback fired with the saved entity or the deleted key.
pub type Watcher<T> = Rc<dyn Fn(&T)>;

/// Registration guard. Dropping it (or calling [`Unregister::release`])
/// removes the watcher.
#[must_use = "dropping an Unregister removes the watcher immediately"]
pub struct Unregister {
    release: Option<Box<dyn FnOnce()>>,
}

impl Unregister {
    pub fn new(release: impl FnOnce() + 'static) -> Self {
        Self { release: Some(Box::new(release)) }
    }

    pub fn release(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Unregister {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for Unregister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Unregister").field("active", &self.release.is_some()).finish()
    }
}

type Entries<T> = RefCell<Vec<(u64, Watcher<T>)>>;

/// The watcher list a store keeps for one event.
pub struct Watchers<T: ?Sized> {
    next_id: Cell<u64>,
    entries: Rc<Entries<T>>,
}

impl<T: ?Sized> Default for Watchers<T> {
    fn default() -> Self {
        Self { next_id: Cell::new(0), entries: Rc::new(RefCell::new(Vec::new())) }
    }
}

impl<T: ?Sized + 'static> Watchers<T> {
    pub fn add(&self, watcher: Watcher<T>) -> Unregister {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push((id, watcher));

        let entries: Weak<Entries<T>> = Rc::downgrade(&self.entries);
        Unregister::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries.borrow_mut().retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Call every registered watcher. Watchers added or removed while firing
    /// take effect from the next call.
    pub fn fire(&self, value: &T) {
        let snapshot: Vec<Watcher<T>> = self.entries.borrow().iter().map(|(_, w)| Rc::clone(w)).collect();
        for watcher in snapshot {
            watcher(value);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
