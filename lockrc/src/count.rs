use core::fmt;

use static_assertions::assert_impl_all;

use crate::diag::{self, CallSite};
use crate::error::report;
use crate::lock::CounterLock;
use crate::sync::{fence, AtomicI64, Ordering};
use crate::{LockPolicy, RefCountError};

assert_impl_all!(RefCount: Send, Sync, Clone, Default);

// Allow some room for overflow
const MAX_COUNT: i64 = i64::MAX >> 1;

/// What a successful release left behind
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Release {
    /// Other owners remain. Carries the count after the release
    Remaining(i64),
    /// That was the last owner. Whoever released it now destroys the object
    Last,
}

/// Reference counter embedded in every shared-ownership object.
///
/// Starts at one (the creator is the first owner). Every change to the count happens while
/// holding this instance's own lock, chosen by its [`LockPolicy`]. The counter itself is atomic
/// so even [`LockPolicy::NoLock`] can't corrupt it, it only gives up serializing the checks
/// around it.
///
/// Cloning gives a brand new counter (count one, same policy, its own lock): a copy is a new
/// object that shares configuration, not identity.
pub struct RefCount {
    count: AtomicI64,
    policy: LockPolicy,
    lock: CounterLock,
    #[cfg(feature = "diagnostics")]
    id: u64,
}

impl RefCount {
    /// # Panics
    /// When the OS refuses to create the lock (see [`try_new`](Self::try_new)). A counter without
    /// its lock is unusable
    #[track_caller]
    #[inline]
    pub fn new(policy: LockPolicy) -> Self {
        Self::new_at(policy, CallSite::caller())
    }

    #[track_caller]
    #[inline]
    pub fn try_new(policy: LockPolicy) -> Result<Self, RefCountError> {
        Self::try_new_at(policy, CallSite::caller())
    }

    pub fn new_at(policy: LockPolicy, site: CallSite) -> Self {
        match Self::try_new_at(policy, site) {
            Ok(this) => this,
            Err(err) => panic!("{err}"),
        }
    }

    #[cfg_attr(not(feature = "diagnostics"), allow(unused_variables))]
    pub fn try_new_at(policy: LockPolicy, site: CallSite) -> Result<Self, RefCountError> {
        let this = Self {
            count: AtomicI64::new(1),
            policy,
            lock: CounterLock::new(policy)?,
            #[cfg(feature = "diagnostics")]
            id: diag::next_id(),
        };

        #[cfg(feature = "diagnostics")]
        diag::allocated(this.id, site, 1);

        Ok(this)
    }

    #[inline]
    pub fn policy(&self) -> LockPolicy {
        self.policy
    }

    /// Current number of owners. Only a snapshot, other threads may change it right after
    #[inline]
    pub fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Returns true if this is the last owner
    #[inline]
    pub fn is_unique(&self) -> bool {
        // Long discussion on why this ordering is required: https://github.com/servo/servo/issues/21186
        self.count.load(Ordering::Acquire) == 1
    }

    /// Object number used in diagnostic log records
    #[cfg(feature = "diagnostics")]
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Declare one more owner
    #[track_caller]
    #[inline]
    pub fn retain(&self) {
        self.retain_at(CallSite::caller())
    }

    #[cfg_attr(not(feature = "diagnostics"), allow(unused_variables))]
    pub fn retain_at(&self, site: CallSite) {
        let _guard = self.lock.acquire();
        let old = self.count.fetch_add(1, Ordering::Relaxed);

        if old > MAX_COUNT {
            abort();
        }
        debug_assert!(old > 0, "Retained an object without owners. Reference count: {old}");

        #[cfg(feature = "diagnostics")]
        diag::retained(self.id, site, old + 1);
    }

    /// Declare that one owner is done.
    ///
    /// Returns [`Release::Last`] exactly once per object: for the release that brings the count
    /// to zero. The caller must then destroy the object and never touch it again. Releasing more
    /// often than there are owners is reported as [`RefCountError::NegativeCount`] and leaves the
    /// count as it was.
    ///
    /// # Safety
    /// The caller must give up one owner it actually holds (the creator's or one from
    /// [`retain`](Self::retain)). Owning handles such as [`SmartPtr`](crate::SmartPtr) free the
    /// object when they see [`Release::Last`], so a release on behalf of someone else frees it
    /// under their feet
    #[track_caller]
    #[inline]
    pub unsafe fn release(&self) -> Result<Release, RefCountError> {
        // SAFETY: Forwarded to the caller
        unsafe { self.release_at(CallSite::caller()) }
    }

    /// # Safety
    /// See [`release`](Self::release)
    #[cfg_attr(not(feature = "diagnostics"), allow(unused_variables))]
    pub unsafe fn release_at(&self, site: CallSite) -> Result<Release, RefCountError> {
        let guard = self.lock.acquire();
        let count = self.count.fetch_sub(1, Ordering::Release) - 1;

        #[cfg(feature = "diagnostics")]
        diag::released(self.id, site, count);

        if count == 0 {
            drop(guard);
            fence(Ordering::Acquire);
            Ok(Release::Last)
        } else if count < 0 {
            // Undo so the object stays as it was before the bad call
            self.count.fetch_add(1, Ordering::Relaxed);
            drop(guard);
            Err(RefCountError::NegativeCount { count })
        } else {
            Ok(Release::Remaining(count))
        }
    }

    /// Copy the configuration of `other` (its lock policy) into this counter.
    ///
    /// Counts are never transferred: both objects keep their own owners. If the policy changes a
    /// fresh lock is built for this object, locks are never shared
    ///
    /// # Panics
    /// When the OS refuses to create the new lock
    pub fn assign(&mut self, other: &RefCount) -> &mut Self {
        match self.try_assign(other) {
            Ok(this) => this,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_assign(&mut self, other: &RefCount) -> Result<&mut Self, RefCountError> {
        if self.policy != other.policy {
            // Exclusive borrow, so nobody can be holding the old lock
            self.lock = CounterLock::new(other.policy)?;
            self.policy = other.policy;
        }
        Ok(self)
    }
}

#[cold]
fn abort() -> ! {
    log::error!(target: diag::TARGET, "Reference count overflow");
    std::process::abort()
}

impl Clone for RefCount {
    #[track_caller]
    #[inline]
    fn clone(&self) -> Self {
        Self::new(self.policy)
    }

    #[inline]
    fn clone_from(&mut self, source: &Self) {
        self.assign(source);
    }
}

impl Default for RefCount {
    #[track_caller]
    #[inline]
    fn default() -> Self {
        Self::new(LockPolicy::default())
    }
}

impl fmt::Debug for RefCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RefCount");
        #[cfg(feature = "diagnostics")]
        s.field("id", &self.id);
        s.field("count", &self.count())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Drop for RefCount {
    fn drop(&mut self) {
        let guard = self.lock.acquire();
        let count = self.count.load(Ordering::Acquire);

        #[cfg(feature = "diagnostics")]
        diag::deleted(self.id, count);

        drop(guard);

        // Zero when the last `release` got here first, one when the sole owner dropped the value.
        // Anything else means some owner is still out there (or one released twice)
        if !matches!(count, 0 | 1) {
            report(RefCountError::ResidualCount { count });
        }
    }
}
