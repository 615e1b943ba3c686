use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::*;

// A simple drop tracker to verify that the object is destroyed exactly once
struct Tracked {
    rc: RefCount,
    drops: Arc<AtomicUsize>,
    value: usize,
}

impl Tracked {
    fn new(policy: LockPolicy, drops: Arc<AtomicUsize>, value: usize) -> Self {
        Self {
            rc: RefCount::new(policy),
            drops,
            value,
        }
    }
}

unsafe impl SmartObject for Tracked {
    fn ref_count(&self) -> &RefCount {
        &self.rc
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }
}

fn release_n(rc: &RefCount, n: usize) {
    for _ in 0..n {
        assert!(matches!(unsafe { rc.release() }, Ok(Release::Remaining(_))));
    }
}

// *** RefCount ***

#[test]
fn new_starts_with_one_owner() {
    for policy in LockPolicy::ALL {
        let rc = RefCount::new(policy);
        assert_eq!(rc.count(), 1);
        assert_eq!(rc.policy(), policy);
        assert!(rc.is_unique());
    }
}

#[test]
fn try_new_builds_every_policy() {
    for policy in LockPolicy::ALL {
        let rc = RefCount::try_new(policy).unwrap();
        assert_eq!(rc.count(), 1);
    }
}

#[test]
fn default_uses_mutex() {
    assert_eq!(RefCount::default().policy(), LockPolicy::Mutex);
}

#[test]
fn retain_and_release_track_owners() {
    for policy in LockPolicy::ALL {
        let rc = RefCount::new(policy);
        rc.retain();
        rc.retain();
        assert_eq!(rc.count(), 3);
        assert!(!rc.is_unique());

        assert_eq!(unsafe { rc.release() }.unwrap(), Release::Remaining(2));
        assert_eq!(unsafe { rc.release() }.unwrap(), Release::Remaining(1));
        assert_eq!(unsafe { rc.release() }.unwrap(), Release::Last);
        assert_eq!(rc.count(), 0);
    }
}

#[test]
fn release_of_last_owner_is_not_an_error() {
    let rc = RefCount::new(LockPolicy::Mutex);
    assert_eq!(unsafe { rc.release() }.unwrap(), Release::Last);
}

#[test]
fn release_past_zero_reports_negative_count() {
    for policy in LockPolicy::ALL {
        let rc = RefCount::new(policy);
        assert_eq!(unsafe { rc.release() }.unwrap(), Release::Last);

        let err = unsafe { rc.release() }.unwrap_err();
        assert!(matches!(err, RefCountError::NegativeCount { count: -1 }));
        assert_eq!(err.severity(), Severity::Logic);
        assert_eq!(err.count(), Some(-1));
        assert!(err.to_string().contains("-1"));

        // The bad release is rolled back, so dropping now is clean
        assert_eq!(rc.count(), 0);
    }
}

#[test]
fn clone_starts_a_fresh_count() {
    let source = RefCount::new(LockPolicy::ProcessMutex);
    for _ in 0..4 {
        source.retain();
    }
    assert_eq!(source.count(), 5);

    let copy = source.clone();
    assert_eq!(copy.count(), 1);
    assert_eq!(copy.policy(), LockPolicy::ProcessMutex);

    drop(copy);
    assert_eq!(source.count(), 5);

    release_n(&source, 4);
}

#[test]
fn assign_copies_policy_not_count() {
    let mut a = RefCount::new(LockPolicy::Mutex);
    a.retain();
    a.retain();
    let b = RefCount::new(LockPolicy::NoLock);

    assert_eq!(a.assign(&b).count(), 3);
    assert_eq!(a.policy(), LockPolicy::NoLock);
    assert_eq!(b.count(), 1);

    release_n(&a, 2);
}

#[test]
fn assign_between_equal_policies_keeps_counts() {
    let mut a = RefCount::new(LockPolicy::Mutex);
    a.retain();
    a.retain();
    let b = RefCount::new(LockPolicy::Mutex);

    a.clone_from(&b);
    assert_eq!(a.count(), 3);
    assert_eq!(b.count(), 1);

    release_n(&a, 2);
}

#[test]
fn assigned_lock_still_guards_the_counter() {
    let mut a = RefCount::new(LockPolicy::NoLock);
    let b = RefCount::new(LockPolicy::ProcessMutex);
    a.try_assign(&b).unwrap();
    assert_eq!(a.policy(), LockPolicy::ProcessMutex);

    a.retain();
    assert_eq!(unsafe { a.release() }.unwrap(), Release::Remaining(1));
}

#[test]
#[should_panic(expected = "not 0 at destruction! Reference count: 2")]
fn drop_with_outstanding_owner_is_fatal() {
    let rc = RefCount::new(LockPolicy::Mutex);
    rc.retain();
    drop(rc);
}

#[test]
fn drop_by_sole_owner_is_clean() {
    for policy in LockPolicy::ALL {
        drop(RefCount::new(policy));
    }
}

#[test]
fn debug_shows_count_and_policy() {
    let rc = RefCount::new(LockPolicy::NoLock);
    let debug = format!("{rc:?}");
    assert!(debug.contains("count: 1"));
    assert!(debug.contains("NoLock"));
}

// *** LockPolicy ***

#[test]
fn policy_parses_names_and_codes() {
    for policy in LockPolicy::ALL {
        assert_eq!(policy.name().parse::<LockPolicy>().unwrap(), policy);
        assert_eq!(LockPolicy::try_from(policy.code()).unwrap(), policy);
    }
    assert_eq!("CRITICAL_SECTION".parse::<LockPolicy>().unwrap(), LockPolicy::Mutex);
    assert_eq!("nolock".parse::<LockPolicy>().unwrap(), LockPolicy::NoLock);
    assert_eq!("process".parse::<LockPolicy>().unwrap(), LockPolicy::ProcessMutex);
}

#[test]
fn unknown_policy_is_a_configuration_error() {
    let err = "spinlock".parse::<LockPolicy>().unwrap_err();
    assert!(matches!(&err, RefCountError::UnknownLockPolicy { value } if value == "spinlock"));
    assert_eq!(err.severity(), Severity::Configuration);
    assert_eq!(err.count(), None);

    let err = LockPolicy::try_from(7).unwrap_err();
    assert!(matches!(&err, RefCountError::UnknownLockPolicy { value } if value == "7"));
}

#[test]
fn env_policy_defaults_when_unset() {
    assert_eq!(LockPolicy::from_env_value(None).unwrap(), LockPolicy::Mutex);
    assert_eq!(LockPolicy::from_env_value(Some("  ")).unwrap(), LockPolicy::Mutex);
    assert_eq!(
        LockPolicy::from_env_value(Some(" none ")).unwrap(),
        LockPolicy::NoLock
    );
    assert!(LockPolicy::from_env_value(Some("bogus")).is_err());
}

#[test]
fn policy_displays_its_name() {
    assert_eq!(LockPolicy::ProcessMutex.to_string(), "process_mutex");
}

// *** CallSite ***

#[test]
fn call_site_captures_caller() {
    let site = CallSite::caller();
    assert!(site.file().ends_with("tests.rs"));
    assert_eq!(site.function(), None);
    assert!(site.to_string().starts_with(site.file()));

    let site = crate::call_site!();
    assert_eq!(site.function(), Some(module_path!()));
    assert!(site.to_string().contains("lockrc::tests("));
}

// *** SmartPtr ***

#[test]
fn last_release_destroys_once() {
    for policy in LockPolicy::ALL {
        let drops = Arc::new(AtomicUsize::new(0));
        let ptr = SmartPtr::new(Tracked::new(policy, drops.clone(), 42));

        let other = ptr.retain();
        let third = other.clone();
        assert_eq!(ptr.count(), 3);
        assert!(ptr.ptr_eq(&third));

        other.release().unwrap();
        drop(third);
        assert_eq!(drops.load(Ordering::Relaxed), 0);
        assert_eq!(ptr.value, 42);

        ptr.release().unwrap();
        assert_eq!(drops.load(Ordering::Relaxed), 1);
    }
}

#[test]
fn get_mut_only_for_sole_owner() {
    let drops = Arc::new(AtomicUsize::new(0));
    let mut ptr = SmartPtr::new(Tracked::new(LockPolicy::Mutex, drops, 1));

    ptr.get_mut().unwrap().value = 2;
    let other = ptr.clone();
    assert!(ptr.get_mut().is_none());
    drop(other);

    assert_eq!(ptr.get_mut().map(|t| t.value), Some(2));
}

#[test]
fn raw_owners_are_counted() {
    let drops = Arc::new(AtomicUsize::new(0));
    let ptr = SmartPtr::new(Tracked::new(LockPolicy::NoLock, drops.clone(), 5));
    let raw = ptr.into_raw();

    unsafe {
        SmartPtr::retain_raw(raw);
        assert_eq!(raw.as_ref().rc.count(), 2);

        SmartPtr::release_raw(raw).unwrap();
        assert_eq!(drops.load(Ordering::Relaxed), 0);

        let ptr = SmartPtr::from_raw(raw);
        assert_eq!(ptr.value, 5);
    }

    assert_eq!(drops.load(Ordering::Relaxed), 1);
}

trait Shape: SmartObject {
    fn area(&self) -> f64;
}

struct Square {
    rc: RefCount,
    side: f64,
    drops: Arc<AtomicUsize>,
}

unsafe impl SmartObject for Square {
    fn ref_count(&self) -> &RefCount {
        &self.rc
    }
}

impl Shape for Square {
    fn area(&self) -> f64 {
        self.side * self.side
    }
}

impl Drop for Square {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn polymorphic_objects_destroy_concrete_type() {
    let drops = Arc::new(AtomicUsize::new(0));
    let square: Box<dyn Shape> = Box::new(Square {
        rc: RefCount::new(LockPolicy::Mutex),
        side: 3.0,
        drops: drops.clone(),
    });

    let shape = SmartPtr::from_box(square);
    let other = shape.retain();
    assert_eq!(other.area(), 9.0);
    assert_eq!(shape.count(), 2);

    drop(shape);
    assert_eq!(drops.load(Ordering::Relaxed), 0);
    drop(other);
    assert_eq!(drops.load(Ordering::Relaxed), 1);
}

#[test]
fn owners_shared_across_threads() {
    let drops = Arc::new(AtomicUsize::new(0));
    let ptr = SmartPtr::new(Tracked::new(LockPolicy::Mutex, drops.clone(), 7));

    std::thread::scope(|s| {
        for _ in 0..4 {
            let owner = ptr.retain();
            s.spawn(move || {
                for _ in 0..100 {
                    let extra = owner.clone();
                    assert_eq!(extra.value, 7);
                }
            });
        }
    });

    assert_eq!(ptr.count(), 1);
    drop(ptr);
    assert_eq!(drops.load(Ordering::Relaxed), 1);
}
