// Model checked builds (`RUSTFLAGS="--cfg loom"`) swap in loom's primitives so every
// interleaving of the counter and its lock is explored

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{fence, AtomicI64, Ordering};
#[cfg(loom)]
pub(crate) use loom::sync::{Mutex, MutexGuard};

#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{fence, AtomicI64, Ordering};
#[cfg(not(loom))]
pub(crate) use std::sync::{Mutex, MutexGuard};
