//! Thread-local correlation id.
//!
//! New chains adopt the current correlation id, so setting one before a
//! top-level execution ties every outcome in that chain to it.

use std::cell::RefCell;

thread_local! {
    static CORRELATION_ID: RefCell<Option<String>> = const { RefCell::new(None) };
}

pub struct Correlator;

impl Correlator {
    pub fn id() -> Option<String> {
        CORRELATION_ID.with(|id| id.borrow().clone())
    }

    pub fn set(id: impl Into<String>) {
        let id = id.into();
        CORRELATION_ID.with(|slot| *slot.borrow_mut() = Some(id));
    }

    pub fn clear() {
        CORRELATION_ID.with(|slot| *slot.borrow_mut() = None);
    }

    /// Fresh random id.
    pub fn generate() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Run `f` with `id` as the correlation id, restoring the previous id
    /// afterwards, also when `f` unwinds.
    pub fn use_id<T>(id: impl Into<String>, f: impl FnOnce() -> T) -> T {
        let previous = CORRELATION_ID.with(|slot| slot.replace(Some(id.into())));
        let _restore = Restore(previous);
        f()
    }
}

struct Restore(Option<String>);

impl Drop for Restore {
    fn drop(&mut self) {
        let previous = self.0.take();
        CORRELATION_ID.with(|slot| *slot.borrow_mut() = previous);
    }
}
