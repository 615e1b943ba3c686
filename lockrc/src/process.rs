//! The heavyweight lock behind [`LockPolicy::ProcessMutex`](crate::LockPolicy::ProcessMutex).
//!
//! On unix this is a `PTHREAD_PROCESS_SHARED` pthread mutex, on windows a kernel mutex object.
//! Both are capable of synchronizing separate processes when placed in shared memory (or
//! duplicated, for the windows handle). Model checked builds and other targets fall back to a
//! regular mutex.

pub(crate) use imp::{ProcessGuard, ProcessMutex};

#[cfg(all(unix, not(loom)))]
mod imp {
    use core::cell::UnsafeCell;
    use core::mem::MaybeUninit;
    use std::io;

    pub(crate) struct ProcessMutex {
        // Boxed: an initialized pthread mutex must never move
        raw: Box<UnsafeCell<libc::pthread_mutex_t>>,
    }

    // SAFETY: The pthread mutex is designed to be shared across threads (and processes). We only
    // ever touch it through the pthread API
    unsafe impl Send for ProcessMutex {}
    unsafe impl Sync for ProcessMutex {}

    #[inline]
    fn check(rc: libc::c_int) -> io::Result<()> {
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(rc))
        }
    }

    impl ProcessMutex {
        pub(crate) fn new() -> io::Result<Self> {
            let raw = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
            let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();

            // SAFETY: `attr` is initialized by `pthread_mutexattr_init` before any other use and
            // destroyed exactly once. `raw` is heap allocated so its address is stable
            unsafe {
                check(libc::pthread_mutexattr_init(attr.as_mut_ptr()))?;
                let result = check(libc::pthread_mutexattr_setpshared(
                    attr.as_mut_ptr(),
                    libc::PTHREAD_PROCESS_SHARED,
                ))
                .and_then(|()| check(libc::pthread_mutex_init(raw.get(), attr.as_ptr())));
                libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
                result?;
            }

            Ok(Self { raw })
        }

        #[inline]
        pub(crate) fn lock(&self) -> ProcessGuard<'_> {
            // SAFETY: The mutex was successfully initialized in `new` and lives as long as `self`
            let rc = unsafe { libc::pthread_mutex_lock(self.raw.get()) };
            debug_assert_eq!(rc, 0, "pthread_mutex_lock failed");
            ProcessGuard { mutex: self }
        }
    }

    impl Drop for ProcessMutex {
        fn drop(&mut self) {
            // SAFETY: We have exclusive access so no guard can be outstanding
            unsafe {
                libc::pthread_mutex_destroy(self.raw.get());
            }
        }
    }

    pub(crate) struct ProcessGuard<'a> {
        mutex: &'a ProcessMutex,
    }

    impl Drop for ProcessGuard<'_> {
        #[inline]
        fn drop(&mut self) {
            // SAFETY: A guard only exists while this thread holds the lock
            let rc = unsafe { libc::pthread_mutex_unlock(self.mutex.raw.get()) };
            debug_assert_eq!(rc, 0, "pthread_mutex_unlock failed");
        }
    }
}

#[cfg(all(windows, not(loom)))]
mod imp {
    use core::ptr;
    use std::io;

    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED};
    use windows_sys::Win32::System::Threading::{
        CreateMutexW, ReleaseMutex, WaitForSingleObject, INFINITE,
    };

    pub(crate) struct ProcessMutex {
        handle: HANDLE,
    }

    // SAFETY: Kernel mutex handles are valid from any thread
    unsafe impl Send for ProcessMutex {}
    unsafe impl Sync for ProcessMutex {}

    impl ProcessMutex {
        pub(crate) fn new() -> io::Result<Self> {
            // SAFETY: Unnamed mutex, default security, not initially owned
            let handle = unsafe { CreateMutexW(ptr::null(), 0, ptr::null()) };
            if handle == 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(Self { handle })
            }
        }

        #[inline]
        pub(crate) fn lock(&self) -> ProcessGuard<'_> {
            // SAFETY: The handle is valid for the life of `self`
            let rc = unsafe { WaitForSingleObject(self.handle, INFINITE) };
            debug_assert_ne!(rc, WAIT_FAILED, "WaitForSingleObject failed");
            ProcessGuard { mutex: self }
        }
    }

    impl Drop for ProcessMutex {
        fn drop(&mut self) {
            // SAFETY: We own the handle and close it exactly once
            unsafe {
                CloseHandle(self.handle);
            }
        }
    }

    pub(crate) struct ProcessGuard<'a> {
        mutex: &'a ProcessMutex,
    }

    impl Drop for ProcessGuard<'_> {
        #[inline]
        fn drop(&mut self) {
            // SAFETY: A guard only exists while this thread owns the mutex
            unsafe {
                ReleaseMutex(self.mutex.handle);
            }
        }
    }
}

#[cfg(any(loom, not(any(unix, windows))))]
mod imp {
    use std::io;
    use std::sync::PoisonError;

    use crate::sync::{Mutex, MutexGuard};

    pub(crate) struct ProcessMutex(Mutex<()>);

    impl ProcessMutex {
        pub(crate) fn new() -> io::Result<Self> {
            Ok(Self(Mutex::new(())))
        }

        #[inline]
        pub(crate) fn lock(&self) -> ProcessGuard<'_> {
            ProcessGuard(self.0.lock().unwrap_or_else(PoisonError::into_inner))
        }
    }

    pub(crate) struct ProcessGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);
}
