//! Server-side scripts used by the lock
//!
//! Scripts are kept as standalone `.lua` files so they can be reviewed and
//! loaded into a store independently of this crate.

/// A named, versioned server-side script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockScript {
    pub name: &'static str,
    pub version: u32,
    pub source: &'static str,
    /// Number of `KEYS` the script expects
    pub num_keys: usize,
}

impl LockScript {
    /// `name:v<version>`, used in log fields
    pub fn qualified_name(&self) -> String {
        format!("{}:v{}", self.name, self.version)
    }

    /// Script handle for the Redis backend (EVALSHA with EVAL fallback)
    pub fn to_redis_script(&self) -> redis::Script {
        redis::Script::new(self.source)
    }

    /// SHA1 the store will register this script under
    pub fn sha1(&self) -> String {
        self.to_redis_script().get_hash().to_string()
    }
}

/// Delete `KEYS[1]` only if its value equals `ARGV[1]`; returns keys deleted
pub const COMPARE_AND_DELETE: LockScript = LockScript {
    name: "compare_and_delete",
    version: 1,
    source: include_str!("compare_and_delete.lua"),
    num_keys: 1,
};
