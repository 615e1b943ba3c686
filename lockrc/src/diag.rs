use core::fmt;
use core::panic::Location;
#[cfg(feature = "diagnostics")]
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) const TARGET: &str = "lockrc";

/// Where a lifecycle operation was called from. Only recorded in `diagnostics` builds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallSite {
    file: &'static str,
    function: Option<&'static str>,
    line: u32,
    column: u32,
}

impl CallSite {
    /// Build a call site by hand. Most callers want [`call_site!`](crate::call_site) instead
    #[inline]
    pub const fn new(file: &'static str, function: &'static str, line: u32, column: u32) -> Self {
        Self {
            file,
            function: Some(function),
            line,
            column,
        }
    }

    /// The location of the caller (propagated through any chain of `#[track_caller]` functions)
    #[track_caller]
    #[inline]
    pub fn caller() -> Self {
        let location = Location::caller();
        Self {
            file: location.file(),
            function: None,
            line: location.line(),
            column: location.column(),
        }
    }

    #[inline]
    pub fn file(&self) -> &'static str {
        self.file
    }

    #[inline]
    pub fn function(&self) -> Option<&'static str> {
        self.function
    }

    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.function {
            Some(function) => write!(f, "{}::{}({})", self.file, function, self.line),
            None => write!(f, "{}({}:{})", self.file, self.line, self.column),
        }
    }
}

/// Captures the current file, module path and line as a [`CallSite`]
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::CallSite::new(file!(), module_path!(), line!(), column!())
    };
}

// *** Lifecycle records ***

#[cfg(feature = "diagnostics")]
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[cfg(feature = "diagnostics")]
#[inline]
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

#[cfg(feature = "diagnostics")]
pub(crate) fn allocated(id: u64, site: CallSite, count: i64) {
    log::debug!(target: TARGET, "{site} Allocated object #{id} (current reference count = {count})");
}

#[cfg(feature = "diagnostics")]
pub(crate) fn retained(id: u64, site: CallSite, count: i64) {
    log::debug!(target: TARGET, "{site} Retained object #{id} (current reference count = {count})");
}

#[cfg(feature = "diagnostics")]
pub(crate) fn released(id: u64, site: CallSite, count: i64) {
    log::debug!(target: TARGET, "{site} Released object #{id} (current reference count = {count})");
}

#[cfg(feature = "diagnostics")]
pub(crate) fn deleted(id: u64, count: i64) {
    log::debug!(target: TARGET, "Deleted object #{id} (current reference count = {count})");
}
