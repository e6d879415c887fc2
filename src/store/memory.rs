//! In-process store backend
//!
//! Implements the same command contract as the Redis backend (per-entry TTL,
//! `NX` writes, cursor-based `SCAN MATCH`, atomic compare-and-delete) inside
//! one process. Used for local development and for exercising outage handling
//! in tests: [`MemoryStore::set_available`] and [`MemoryStore::drop_connections`]
//! simulate a store going away and connections being cut, and
//! [`MemoryStore::set_open_delay`] simulates a store that accepts but never
//! answers.
//!
//! Expired entries are dropped lazily: every `SCAN` purges them, and so does
//! every [`SWEEP_INTERVAL`]th write.
//!
//! **Important**: state is per-process. This is not a distributed cache and
//! gives no cross-process exclusion.

use super::{Command, Reply};
use crate::error::{CacheError, CacheResult};
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Writes between sweeps of expired entries
pub const SWEEP_INTERVAL: u32 = 128;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug)]
struct MemoryInner {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    available: AtomicBool,
    /// Bumped whenever connections are cut; handles from older generations fail
    generation: AtomicU64,
    connect_attempts: AtomicU32,
    open_delay: Mutex<Duration>,
    writes_since_sweep: AtomicU32,
}

/// Shared in-process store. Clones share state.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                entries: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
                generation: AtomicU64::new(0),
                connect_attempts: AtomicU32::new(0),
                open_delay: Mutex::new(Duration::ZERO),
                writes_since_sweep: AtomicU32::new(0),
            }),
        }
    }

    /// Simulate the store going down (`false`) or coming back (`true`).
    /// Going down also cuts every open connection.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
        if !available {
            self.drop_connections();
        }
        debug!(available = available, "Memory store availability changed");
    }

    /// Cut all open connections while leaving the store reachable
    pub fn drop_connections(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Make every `open` stall for `delay` before answering
    pub fn set_open_delay(&self, delay: Duration) {
        *self.inner.open_delay.lock() = delay;
    }

    pub fn open_delay(&self) -> Duration {
        *self.inner.open_delay.lock()
    }

    /// Drop every expired entry now; returns how many were dropped
    pub fn purge_expired(&self) -> usize {
        purge_expired(&mut self.inner.entries.lock(), Instant::now())
    }

    /// Sweep expired entries once every [`SWEEP_INTERVAL`] writes
    fn note_writes(&self, entries: &mut HashMap<String, MemoryEntry>, writes: u32, now: Instant) {
        if writes == 0 {
            return;
        }
        let before = self.inner.writes_since_sweep.fetch_add(writes, Ordering::Relaxed);
        if before + writes >= SWEEP_INTERVAL {
            self.inner.writes_since_sweep.store(0, Ordering::Relaxed);
            purge_expired(entries, now);
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Number of times `open` has been called
    pub fn connect_attempts(&self) -> u32 {
        self.inner.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of live (unexpired) keys, for assertions
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read a raw stored value, bypassing connections
    pub fn raw_get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.inner
            .entries
            .lock()
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.value.clone())
    }

    /// Write a raw value, bypassing connections (e.g. to plant a corrupt entry)
    pub fn raw_set(&self, key: &str, value: &str) {
        self.inner.entries.lock().insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: None,
            },
        );
    }

    pub fn open(&self) -> CacheResult<MemoryConnection> {
        self.inner.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.is_available() {
            return Err(CacheError::Connection(
                "Connection refused (memory store unavailable)".to_string(),
            ));
        }
        Ok(MemoryConnection {
            store: self.clone(),
            generation: self.inner.generation.load(Ordering::SeqCst),
        })
    }
}

/// Handle to a [`MemoryStore`]; fails once its generation has been cut
#[derive(Debug, Clone)]
pub struct MemoryConnection {
    store: MemoryStore,
    generation: u64,
}

impl MemoryConnection {
    fn check_alive(&self, command: &str) -> CacheResult<()> {
        let current = self.store.inner.generation.load(Ordering::SeqCst);
        if !self.store.is_available() || current != self.generation {
            return Err(CacheError::ConnectionLost(format!(
                "Memory {} failed: connection closed",
                command
            )));
        }
        Ok(())
    }

    pub fn execute(&mut self, command: Command) -> CacheResult<Reply> {
        self.check_alive(command.name())?;
        let writes = u32::from(command.is_write());
        let now = Instant::now();
        let mut entries = self.store.inner.entries.lock();
        let reply = apply(&mut entries, command, now)?;
        self.store.note_writes(&mut entries, writes, now);
        Ok(reply)
    }

    /// Apply every command under one lock acquisition, in order
    pub fn execute_batch(&mut self, commands: Vec<Command>) -> CacheResult<()> {
        self.check_alive("MULTI")?;
        let mut entries = self.store.inner.entries.lock();
        let now = Instant::now();
        let writes = commands.iter().filter(|c| c.is_write()).count() as u32;
        for command in commands {
            apply(&mut entries, command, now)?;
        }
        self.store.note_writes(&mut entries, writes, now);
        Ok(())
    }
}

fn purge_expired(entries: &mut HashMap<String, MemoryEntry>, now: Instant) -> usize {
    let before = entries.len();
    entries.retain(|_, e| !e.is_expired(now));
    let purged = before - entries.len();
    if purged > 0 {
        trace!(purged = purged, "Purged expired memory store entries");
    }
    purged
}

fn live<'a>(
    entries: &'a HashMap<String, MemoryEntry>,
    key: &str,
    now: Instant,
) -> Option<&'a MemoryEntry> {
    entries.get(key).filter(|e| !e.is_expired(now))
}

fn apply(
    entries: &mut HashMap<String, MemoryEntry>,
    command: Command,
    now: Instant,
) -> CacheResult<Reply> {
    let reply = match command {
        Command::Get { key } => live(entries, &key, now)
            .map(|e| Reply::Text(e.value.clone()))
            .unwrap_or(Reply::Nil),
        Command::MGet { keys } => Reply::List(
            keys.iter()
                .map(|k| live(entries, k, now).map(|e| e.value.clone()))
                .collect(),
        ),
        Command::Set {
            key,
            value,
            ttl,
            only_if_absent,
        } => {
            if only_if_absent && live(entries, &key, now).is_some() {
                Reply::Nil
            } else {
                entries.insert(
                    key,
                    MemoryEntry {
                        value,
                        expires_at: ttl.map(|t| now + t.max(Duration::from_millis(1))),
                    },
                );
                Reply::Ok
            }
        }
        Command::Del { keys } => {
            let mut deleted = 0;
            for key in keys {
                if let Some(entry) = entries.remove(&key) {
                    if !entry.is_expired(now) {
                        deleted += 1;
                    }
                }
            }
            Reply::Int(deleted)
        }
        Command::Exists { key } => Reply::Int(i64::from(live(entries, &key, now).is_some())),
        Command::IncrBy { key, delta } => {
            let (current, expires_at) = match live(entries, &key, now) {
                Some(entry) => {
                    let n: i64 = entry.value.parse().map_err(|_| {
                        CacheError::Backend("ERR value is not an integer or out of range".into())
                    })?;
                    (n, entry.expires_at)
                }
                None => (0, None),
            };
            let next = current
                .checked_add(delta)
                .ok_or_else(|| CacheError::Backend("ERR increment or decrement would overflow".into()))?;
            entries.insert(
                key,
                MemoryEntry {
                    value: next.to_string(),
                    expires_at,
                },
            );
            Reply::Int(next)
        }
        Command::Expire { key, ttl } => match entries.get_mut(&key) {
            Some(entry) if !entry.is_expired(now) => {
                entry.expires_at = Some(now + Duration::from_secs(ttl.as_secs().max(1)));
                Reply::Int(1)
            }
            _ => Reply::Int(0),
        },
        Command::Ttl { key } => match live(entries, &key, now) {
            None => Reply::Int(-2),
            Some(MemoryEntry {
                expires_at: None, ..
            }) => Reply::Int(-1),
            Some(MemoryEntry {
                expires_at: Some(at),
                ..
            }) => {
                // Round up like the server does for sub-second remainders
                let remaining = at.saturating_duration_since(now);
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                Reply::Int(secs as i64)
            }
        },
        Command::Scan {
            cursor,
            pattern,
            count,
        } => {
            purge_expired(entries, now);
            // Keys are visited in hash order and the cursor is the next position,
            // so deleting already-returned keys never skips the rest
            let mut pending: Vec<(u64, &String)> = entries
                .iter()
                .map(|(k, _)| (scan_position(k), k))
                .filter(|(position, _)| *position >= cursor)
                .collect();
            pending.sort();

            let take = count.max(1);
            let next = pending.get(take).map_or(0, |(position, _)| *position);
            let page: Vec<String> = pending
                .iter()
                .take(take)
                .filter(|(_, k)| glob_match(&pattern, k))
                .map(|(_, k)| (*k).clone())
                .collect();
            Reply::ScanPage {
                cursor: next,
                keys: page,
            }
        }
        Command::CompareAndDelete { key, expected } => {
            let matches = live(entries, &key, now).is_some_and(|e| e.value == expected);
            if matches {
                entries.remove(&key);
                Reply::Int(1)
            } else {
                Reply::Int(0)
            }
        }
        Command::Ping => Reply::Text("PONG".to_string()),
    };
    Ok(reply)
}

/// Stable non-zero ordering key for `SCAN`; zero is reserved for "done"
fn scan_position(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish().max(1)
}

/// Redis-style glob matching: `*`, `?`, `[abc]`, `[^a]`, `[a-z]`, and `\` escapes
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = key.chars().collect();
    glob_match_at(&p, &s)
}

fn glob_match_at(p: &[char], s: &[char]) -> bool {
    let (mut pi, mut si) = (0usize, 0usize);
    // Backtrack point for the most recent `*`
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, si));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    si += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next_pi)) = match_class(p, pi, s[si]) {
                        if matched {
                            pi = next_pi;
                            si += 1;
                            continue;
                        }
                    }
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == s[si] {
                        pi += 2;
                        si += 1;
                        continue;
                    }
                }
                c => {
                    if c == s[si] {
                        pi += 1;
                        si += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((star_pi, star_si)) => {
                pi = star_pi + 1;
                si = star_si + 1;
                star = Some((star_pi, star_si + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Evaluate a `[...]` class starting at `p[start]`. Returns whether `c` matched
/// and the index just past the closing bracket, or `None` if unterminated.
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = i < p.len() && p[i] == '^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    while i < p.len() && (p[i] != ']' || first) {
        first = false;
        if p[i] == '\\' && i + 1 < p.len() {
            matched |= p[i + 1] == c;
            i += 2;
        } else if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            let (lo, hi) = if p[i] <= p[i + 2] {
                (p[i], p[i + 2])
            } else {
                (p[i + 2], p[i])
            };
            matched |= lo <= c && c <= hi;
            i += 3;
        } else {
            matched |= p[i] == c;
            i += 1;
        }
    }

    if i >= p.len() {
        return None;
    }
    Some((matched != negate, i + 1))
}
