//! Manually retained and released reference counting for polymorphic objects.
//!
//! Every shared object embeds a [`RefCount`] and implements [`SmartObject`]. Owners are declared
//! with `retain` and given up with `release`. The release that brings the count to zero destroys
//! the object. Each counter is guarded by its own lock, picked per object by a [`LockPolicy`].
//!
//! ```
//! use lockrc::{LockPolicy, RefCount, SmartObject, SmartPtr};
//!
//! struct Texture {
//!     rc: RefCount,
//!     name: String,
//! }
//!
//! // SAFETY: `rc` lives inside the texture and is never handed to another object
//! unsafe impl SmartObject for Texture {
//!     fn ref_count(&self) -> &RefCount {
//!         &self.rc
//!     }
//! }
//!
//! let texture = SmartPtr::new(Texture {
//!     rc: RefCount::new(LockPolicy::Mutex),
//!     name: "grass".to_string(),
//! });
//!
//! let other = texture.retain();
//! assert_eq!(texture.count(), 2);
//! assert_eq!(other.name, "grass");
//!
//! other.release().unwrap();
//! assert_eq!(texture.count(), 1);
//!
//! // The last owner going away destroys the texture
//! texture.release().unwrap();
//! ```
//!
//! With the `diagnostics` feature every allocation, retain, release and destruction is logged
//! through the `log` facade (target `lockrc`) together with the call site.

mod count;
mod diag;
mod error;
mod lock;
mod policy;
mod process;
mod sync;
#[cfg(all(test, not(loom)))]
mod tests;

pub use count::*;
pub use diag::CallSite;
pub use error::*;
pub use policy::*;

use core::fmt;
use core::marker::PhantomData;
use core::mem::ManuallyDrop;
use core::ops::Deref;
use core::ptr::NonNull;

use static_assertions::{assert_impl_all, assert_not_impl_any};

assert_impl_all!(SmartPtr<dyn SmartObject + Send + Sync>: Send, Sync, Clone);
assert_not_impl_any!(SmartPtr<dyn SmartObject>: Send, Sync);

/// An object whose lifetime is managed by an embedded [`RefCount`]
///
/// The trait is object safe, so hierarchies built on `dyn Trait` (with `SmartObject` as a
/// supertrait) can be shared through [`SmartPtr`] as well.
///
/// # Safety
/// `ref_count` must always return the same counter, stored inside `self` and never shared with
/// any other object. [`SmartPtr`] frees the object based on what that counter says
pub unsafe trait SmartObject {
    fn ref_count(&self) -> &RefCount;
}

// *** SmartPtr ***

/// One counted owner of a heap allocated [`SmartObject`]
///
/// Cloning (or [`retain`](Self::retain)) adds an owner, dropping (or
/// [`release`](Self::release)) gives one up. The handle that gives up the last owner destroys
/// the object once the counter's lock has been let go.
pub struct SmartPtr<T>
where
    T: SmartObject + ?Sized,
{
    ptr: NonNull<T>,
    phantom: PhantomData<T>,
}

// SAFETY: The counter is synchronized by its own lock and atomics, and the object itself is only
// shared when it is `Send + Sync`, same rules as `Arc`
unsafe impl<T: SmartObject + Send + Sync + ?Sized> Send for SmartPtr<T> {}
unsafe impl<T: SmartObject + Send + Sync + ?Sized> Sync for SmartPtr<T> {}

impl<T: SmartObject> SmartPtr<T> {
    #[inline]
    pub fn new(data: T) -> Self {
        Self::from_box(Box::new(data))
    }
}

impl<T> SmartPtr<T>
where
    T: SmartObject + ?Sized,
{
    /// Take over a boxed object, typically a `Box<dyn Trait>`. The handle becomes the owner
    /// counted at construction
    #[inline]
    pub fn from_box(data: Box<T>) -> Self {
        Self::from_inner(NonNull::from(Box::leak(data)))
    }

    #[inline(always)]
    fn from_inner(ptr: NonNull<T>) -> Self {
        Self {
            ptr,
            phantom: PhantomData,
        }
    }

    #[inline(always)]
    fn as_inner(&self) -> &T {
        // SAFETY: As long as we have an instance, our pointer is guaranteed valid
        unsafe { self.ptr.as_ref() }
    }

    /// Current number of owners
    #[inline]
    pub fn count(&self) -> i64 {
        self.as_inner().ref_count().count()
    }

    /// Returns true if both handles own the same object
    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr.cast::<u8>() == other.ptr.cast::<u8>()
    }

    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        if self.as_inner().ref_count().is_unique() {
            // SAFETY: Since this is the unique owner, we can be assured we are only giving out one `&mut`
            unsafe { Some(self.ptr.as_mut()) }
        } else {
            None
        }
    }

    /// Add an owner and return its handle
    #[track_caller]
    #[inline]
    pub fn retain(&self) -> Self {
        self.retain_at(CallSite::caller())
    }

    pub fn retain_at(&self, site: CallSite) -> Self {
        self.as_inner().ref_count().retain_at(site);
        Self::from_inner(self.ptr)
    }

    /// Give up this owner, destroying the object if it was the last one. Same as dropping the
    /// handle, except a broken count is returned instead of logged
    #[track_caller]
    #[inline]
    pub fn release(self) -> Result<(), RefCountError> {
        self.release_at(CallSite::caller())
    }

    pub fn release_at(self, site: CallSite) -> Result<(), RefCountError> {
        // Avoid drop, the release happens here
        let ptr = ManuallyDrop::new(self).ptr;

        // SAFETY: This handle owned one counted reference and has been consumed
        unsafe { Self::release_raw_at(ptr, site) }
    }

    /// Turn the handle into a bare pointer without giving up its owner. Pair with
    /// [`release_raw`](Self::release_raw) or [`from_raw`](Self::from_raw)
    #[inline]
    pub fn into_raw(self) -> NonNull<T> {
        ManuallyDrop::new(self).ptr
    }

    /// # Safety
    /// `ptr` must come from [`into_raw`](Self::into_raw) and carry one owner that nobody else
    /// will release
    #[inline]
    pub unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Self::from_inner(ptr)
    }

    /// Add an owner to an object known only by pointer
    ///
    /// # Safety
    /// `ptr` must point to a live object owned by `SmartPtr`
    #[track_caller]
    #[inline]
    pub unsafe fn retain_raw(ptr: NonNull<T>) {
        // SAFETY: The object is alive per the caller
        unsafe { ptr.as_ref() }.ref_count().retain_at(CallSite::caller());
    }

    /// Give up an owner of an object known only by pointer. The object is destroyed (and `ptr`
    /// dangles) when that was the last owner
    ///
    /// # Safety
    /// `ptr` must point to a live object owned by `SmartPtr` and the caller must hold the owner
    /// being given up (from [`into_raw`](Self::into_raw) or [`retain_raw`](Self::retain_raw))
    #[track_caller]
    #[inline]
    pub unsafe fn release_raw(ptr: NonNull<T>) -> Result<(), RefCountError> {
        // SAFETY: Forwarded to the caller
        unsafe { Self::release_raw_at(ptr, CallSite::caller()) }
    }

    /// # Safety
    /// See [`release_raw`](Self::release_raw)
    pub unsafe fn release_raw_at(ptr: NonNull<T>, site: CallSite) -> Result<(), RefCountError> {
        // SAFETY: The object is alive and the caller owns the reference given up
        let released = unsafe { ptr.as_ref().ref_count().release_at(site)? };

        if released == Release::Last {
            // SAFETY: The count hit zero so nobody else can reach the object. It was allocated by
            // `Box` in `from_box` and the counter's lock was already let go
            unsafe {
                // Once back into a box, it will drop and deallocate normally
                drop(Box::from_raw(ptr.as_ptr()));
            }
        }

        Ok(())
    }
}

impl<T> Deref for SmartPtr<T>
where
    T: SmartObject + ?Sized,
{
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        self.as_inner()
    }
}

impl<T> AsRef<T> for SmartPtr<T>
where
    T: SmartObject + ?Sized,
{
    #[inline(always)]
    fn as_ref(&self) -> &T {
        self.as_inner()
    }
}

impl<T> Clone for SmartPtr<T>
where
    T: SmartObject + ?Sized,
{
    #[track_caller]
    #[inline(always)]
    fn clone(&self) -> Self {
        self.retain_at(CallSite::caller())
    }
}

impl<T> Drop for SmartPtr<T>
where
    T: SmartObject + ?Sized,
{
    #[inline]
    fn drop(&mut self) {
        // SAFETY: Each handle owns exactly one counted reference which is given up here
        if let Err(err) = unsafe { Self::release_raw_at(self.ptr, CallSite::caller()) } {
            error::report(err);
        }
    }
}

impl<T> fmt::Debug for SmartPtr<T>
where
    T: SmartObject + fmt::Debug + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_inner(), f)
    }
}

impl<T> fmt::Display for SmartPtr<T>
where
    T: SmartObject + fmt::Display + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_inner(), f)
    }
}

impl<T> fmt::Pointer for SmartPtr<T>
where
    T: SmartObject + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.ptr, f)
    }
}
