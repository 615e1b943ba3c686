use lockrc::{LockPolicy, RefCount, SmartObject, SmartPtr};

/// Minimal shared object used by the benches
pub struct Payload {
    rc: RefCount,
    pub value: usize,
}

unsafe impl SmartObject for Payload {
    #[inline]
    fn ref_count(&self) -> &RefCount {
        &self.rc
    }
}

#[inline]
pub fn payload(policy: LockPolicy, value: usize) -> SmartPtr<Payload> {
    SmartPtr::new(Payload {
        rc: RefCount::new(policy),
        value,
    })
}
