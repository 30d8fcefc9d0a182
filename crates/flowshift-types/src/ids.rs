use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;

/// Identifier of one execution within a process instance's execution tree.
///
/// The root execution's id doubles as the process instance id.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Deterministic id source for entities created while transforming one instance.
///
/// Each id is `SHA-256(seed_len || seed || kind_len || kind || seq)` truncated to
/// eight bytes of hex. Every field is length-prefixed (little-endian u32) so that
/// adjacent fields cannot be confused. Ids already present in the instance are
/// registered as taken and skipped, which keeps repeated migrations of the same
/// instance collision free while staying reproducible.
#[derive(Clone, Debug)]
pub struct IdGenerator {
    seed: String,
    seq: u32,
    taken: HashSet<String>,
}

impl IdGenerator {
    pub fn new(seed: impl Into<String>) -> Self {
        Self {
            seed: seed.into(),
            seq: 0,
            taken: HashSet::new(),
        }
    }

    /// Register ids that must never be produced.
    pub fn with_taken<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.taken.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Hash `(seed, kind, seq)` into a short hex token.
    pub fn derive(seed: &str, kind: &str, seq: u32) -> String {
        let mut hasher = Sha256::new();
        hasher.update((seed.len() as u32).to_le_bytes());
        hasher.update(seed.as_bytes());
        hasher.update((kind.len() as u32).to_le_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(seq.to_le_bytes());
        let hash: [u8; 32] = hasher.finalize().into();
        hex::encode(&hash[..8])
    }

    /// Next free id for an entity of the given kind (`"subscription"`, `"job"`, ...).
    pub fn next_id(&mut self, kind: &str) -> String {
        loop {
            let candidate = Self::derive(&self.seed, kind, self.seq);
            self.seq = self.seq.wrapping_add(1);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    pub fn next_execution_id(&mut self) -> ExecutionId {
        ExecutionId::new(self.next_id("execution"))
    }

    /// Activity-instance ids read `<activityId>:<token>`.
    pub fn next_activity_instance_id(&mut self, activity_id: &str) -> String {
        loop {
            let token = Self::derive(&self.seed, activity_id, self.seq);
            self.seq = self.seq.wrapping_add(1);
            let candidate = format!("{activity_id}:{token}");
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}
