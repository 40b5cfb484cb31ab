//! Scoped access to a logging backend.
//!
//! Code deep inside a host (hooks, callbacks) often cannot be handed a
//! logger explicitly. A backend can instead be installed for the current
//! thread; [`with_current`] reaches it until the returned [`ContextGuard`] is
//! dropped. Installs nest: the most recent live install is current, and
//! dropping a guard uninstalls exactly its own backend, in any order.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use audit_core::{context, Error, Event, LogOutcome, LoggingBackend};
//!
//! struct Discard;
//!
//! impl LoggingBackend for Discard {
//!     fn log(&self, _event: Event) -> Result<LogOutcome, Error> {
//!         Ok(LogOutcome::Stored(0))
//!     }
//! }
//!
//! assert!(context::log(Event::new("users", "sessions", "login")).is_none());
//!
//! {
//!     let _guard = context::install(Arc::new(Discard));
//!     let outcome = context::log(Event::new("users", "sessions", "login"));
//!     assert_eq!(outcome.unwrap().unwrap(), LogOutcome::Stored(0));
//! }
//!
//! assert!(context::with_current(|_| ()).is_none());
//! ```

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::Error;
use crate::event::Event;
use crate::logger::{LogOutcome, LoggingBackend};

type Installed = (u64, Arc<dyn LoggingBackend>);

thread_local! {
    // Live installs, oldest first. The last entry is current.
    static INSTALLED: RefCell<Vec<Installed>> = RefCell::new(Vec::new());
    static NEXT_ID: Cell<u64> = Cell::new(0);
}

/// Uninstalls its backend when dropped.
///
/// Guards are tied to the thread that created them.
#[must_use = "the backend is uninstalled as soon as the guard is dropped"]
pub struct ContextGuard {
    id: u64,
    _thread: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let id = self.id;
        let removed = INSTALLED.try_with(|installed| {
            let mut installed = installed.borrow_mut();
            installed
                .iter()
                .rposition(|(entry, _)| *entry == id)
                .map(|index| installed.remove(index))
        });
        // Released after the borrow ends; a backend's drop may touch the context.
        drop(removed);
    }
}

impl std::fmt::Debug for ContextGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGuard").field("id", &self.id).finish()
    }
}

/// Installs a backend for the current thread.
pub fn install(backend: Arc<dyn LoggingBackend>) -> ContextGuard {
    let id = NEXT_ID.with(|next| {
        let id = next.get();
        next.set(id.wrapping_add(1));
        id
    });
    INSTALLED.with(|installed| installed.borrow_mut().push((id, backend)));
    ContextGuard {
        id,
        _thread: PhantomData,
    }
}

/// Runs `f` with the backend installed on this thread.
///
/// Returns `None` when nothing is installed.
pub fn with_current<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&dyn LoggingBackend) -> R,
{
    let backend = INSTALLED.with(|installed| {
        installed
            .borrow()
            .last()
            .map(|(_, backend)| Arc::clone(backend))
    })?;
    Some(f(&*backend))
}

/// Logs through the installed backend, if any.
pub fn log(event: Event) -> Option<Result<LogOutcome, Error>> {
    with_current(|backend| backend.log(event))
}
