use core::fmt;
use core::str::FromStr;

use crate::RefCountError;

/// Environment variable consulted by [`LockPolicy::from_env`]
pub const LOCK_POLICY_ENV: &str = "LOCKRC_LOCK_POLICY";

/// Which lock backs an object's reference counter. Fixed when the object is built
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LockPolicy {
    /// No locking at all, for objects that never leave one thread or are already externally
    /// synchronized
    NoLock,
    /// Lightweight intra-process mutual exclusion
    #[default]
    Mutex,
    /// Heavier OS mutex that can be shared between processes
    ProcessMutex,
}

impl LockPolicy {
    pub const ALL: [LockPolicy; 3] = [
        LockPolicy::NoLock,
        LockPolicy::Mutex,
        LockPolicy::ProcessMutex,
    ];

    /// Reads the policy from `LOCKRC_LOCK_POLICY`, falling back to the default when unset
    pub fn from_env() -> Result<Self, RefCountError> {
        Self::from_env_value(std::env::var(LOCK_POLICY_ENV).ok().as_deref())
    }

    pub(crate) fn from_env_value(value: Option<&str>) -> Result<Self, RefCountError> {
        match value.map(str::trim) {
            None | Some("") => Ok(LockPolicy::default()),
            Some(value) => value.parse(),
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        match self {
            LockPolicy::NoLock => 0,
            LockPolicy::Mutex => 1,
            LockPolicy::ProcessMutex => 2,
        }
    }

    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            LockPolicy::NoLock => "none",
            LockPolicy::Mutex => "mutex",
            LockPolicy::ProcessMutex => "process_mutex",
        }
    }
}

impl fmt::Display for LockPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LockPolicy {
    type Err = RefCountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "nolock" | "no_lock" => Ok(LockPolicy::NoLock),
            "mutex" | "critical_section" | "criticalsection" => Ok(LockPolicy::Mutex),
            "process" | "process_mutex" | "processmutex" => Ok(LockPolicy::ProcessMutex),
            _ => Err(RefCountError::unknown_lock_policy(s)),
        }
    }
}

impl TryFrom<u8> for LockPolicy {
    type Error = RefCountError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(LockPolicy::NoLock),
            1 => Ok(LockPolicy::Mutex),
            2 => Ok(LockPolicy::ProcessMutex),
            _ => Err(RefCountError::unknown_lock_policy(code.to_string())),
        }
    }
}
