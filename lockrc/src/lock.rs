use std::sync::PoisonError;

use crate::process::{ProcessGuard, ProcessMutex};
use crate::sync::{Mutex, MutexGuard};
use crate::{LockPolicy, RefCountError};

/// The lock guarding one object's counter. Never shared between objects
pub(crate) enum CounterLock {
    NoLock,
    Mutex(Mutex<()>),
    ProcessMutex(ProcessMutex),
}

/// Held while the counter is being modified. Unlocks on drop
#[must_use]
pub(crate) enum CounterGuard<'a> {
    NoLock,
    Mutex(#[allow(dead_code)] MutexGuard<'a, ()>),
    ProcessMutex(#[allow(dead_code)] ProcessGuard<'a>),
}

impl CounterLock {
    pub(crate) fn new(policy: LockPolicy) -> Result<Self, RefCountError> {
        Ok(match policy {
            LockPolicy::NoLock => CounterLock::NoLock,
            LockPolicy::Mutex => CounterLock::Mutex(Mutex::new(())),
            LockPolicy::ProcessMutex => CounterLock::ProcessMutex(
                ProcessMutex::new().map_err(|source| RefCountError::LockInit { policy, source })?,
            ),
        })
    }

    #[inline]
    pub(crate) fn acquire(&self) -> CounterGuard<'_> {
        match self {
            CounterLock::NoLock => CounterGuard::NoLock,
            // The mutex protects no data of its own, so a panic elsewhere can't leave anything
            // half updated and poisoning is ignored
            CounterLock::Mutex(mutex) => {
                CounterGuard::Mutex(mutex.lock().unwrap_or_else(PoisonError::into_inner))
            }
            CounterLock::ProcessMutex(mutex) => CounterGuard::ProcessMutex(mutex.lock()),
        }
    }
}
