//! Collection names for one queue instance.

use rand::Rng;
use rand::distributions::Alphanumeric;

/// Length of an auto-generated prefix. Only meant to keep independently
/// constructed queues apart on a shared store; not a secret.
pub const RANDOM_PREFIX_LEN: usize = 6;

/// The three collection keys a queue owns inside the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    prefix: String,
    set: String,
    list: String,
    expiry: String,
}

impl Namespace {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            set: format!("{prefix}:set"),
            list: format!("{prefix}:list"),
            expiry: format!("{prefix}:expiry"),
            prefix,
        }
    }

    /// Namespace with a random alphanumeric prefix drawn from `rng`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let prefix: String = (0..RANDOM_PREFIX_LEN)
            .map(|_| rng.sample(Alphanumeric) as char)
            .collect();
        Self::new(prefix)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Membership set: keys pending or leased.
    pub fn set(&self) -> &str {
        &self.set
    }

    /// Payload sequence: serialized envelopes awaiting a first fetch.
    pub fn list(&self) -> &str {
        &self.list
    }

    /// Expiry index: leased key -> expiry timestamp.
    pub fn expiry(&self) -> &str {
        &self.expiry
    }
}
