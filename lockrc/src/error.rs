use std::io;

use thiserror::Error;

use crate::LockPolicy;

/// How bad a reported fault is
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The lock configuration is unusable. No object can be built from it
    Configuration,
    /// A caller broke the retain/release contract but the object is still consistent
    Logic,
    /// The object's lifecycle is broken beyond repair
    Runtime,
}

#[derive(Error, Debug)]
pub enum RefCountError {
    #[error("Unrecognized lock policy {value:?}")]
    UnknownLockPolicy { value: String },

    #[error("Unable to initialize the {policy} lock")]
    LockInit {
        policy: LockPolicy,
        #[source]
        source: io::Error,
    },

    #[error("Reference count is negative! Reference count: {count}")]
    NegativeCount { count: i64 },

    #[error("The reference count is not 0 at destruction! Reference count: {count}")]
    ResidualCount { count: i64 },
}

impl RefCountError {
    #[cold]
    pub(crate) fn unknown_lock_policy(value: impl Into<String>) -> Self {
        RefCountError::UnknownLockPolicy {
            value: value.into(),
        }
    }

    #[inline]
    pub fn severity(&self) -> Severity {
        match self {
            RefCountError::UnknownLockPolicy { .. } | RefCountError::LockInit { .. } => {
                Severity::Configuration
            }
            RefCountError::NegativeCount { .. } => Severity::Logic,
            RefCountError::ResidualCount { .. } => Severity::Runtime,
        }
    }

    /// The illegal count carried by a lifecycle fault
    #[inline]
    pub fn count(&self) -> Option<i64> {
        match self {
            RefCountError::NegativeCount { count } | RefCountError::ResidualCount { count } => {
                Some(*count)
            }
            _ => None,
        }
    }
}

/// Reports a fault detected where there is no caller to hand it back to (inside `Drop`)
///
/// Logic faults are logged and the program carries on. Anything worse panics, unless the thread is
/// already unwinding in which case a second panic would abort, so it is only logged
#[cold]
pub(crate) fn report(err: RefCountError) {
    log::error!(target: crate::diag::TARGET, "{err}");

    if err.severity() != Severity::Logic && !std::thread::panicking() {
        panic!("{err}");
    }
}
