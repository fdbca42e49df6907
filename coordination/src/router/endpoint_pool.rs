//! Endpoint pool: per-tier round-robin selection with failure skip.
//!
//! Every tier owns an ordered ring of backend addresses and a cursor into it.
//! `select` hands out the next address and advances the cursor. An address
//! whose consecutive failures exceed the threshold is passed over for one full
//! rotation and then handed out again as a probe, so a recovered backend
//! rejoins the ring without operator action.
//!
//! The pool is shared by every concurrent pipeline run. Each tier's ring sits
//! behind its own mutex; `select` and `record_outcome` hold it only for the
//! counter update and never across an await point.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Model tiers a pipeline run can call into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Short strategy descriptions for an objective.
    Planning,
    /// Candidate code and test suites.
    Generation,
    /// Stronger model that repairs failing candidates.
    Escalation,
}

impl Tier {
    /// All tiers, in pipeline order.
    pub fn all() -> &'static [Tier] {
        &[Tier::Planning, Tier::Generation, Tier::Escalation]
    }

    /// Configuration key for this tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Generation => "generation",
            Self::Escalation => "escalation",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Tier {
    type Err = PoolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "planning" => Ok(Self::Planning),
            "generation" => Ok(Self::Generation),
            "escalation" => Ok(Self::Escalation),
            other => Err(PoolError::UnknownTier(other.to_string())),
        }
    }
}

/// Errors raised by the endpoint pool.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("No endpoints configured for tier {0}")]
    NoEndpoints(Tier),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),
}

/// Health bookkeeping for one backend address within a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    /// Opaque backend address (usually an OpenAI-compatible base URL).
    pub address: String,
    /// Tier this record belongs to.
    pub tier: Tier,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Rotations left before a tripped address is probed again.
    #[serde(default)]
    pub skips_remaining: u32,
}

impl EndpointRecord {
    fn new(address: impl Into<String>, tier: Tier) -> Self {
        Self {
            address: address.into(),
            tier,
            consecutive_failures: 0,
            skips_remaining: 0,
        }
    }

    /// Whether the failure counter is above `threshold`.
    pub fn is_tripped(&self, threshold: u32) -> bool {
        self.consecutive_failures > threshold
    }
}

#[derive(Debug)]
struct TierRing {
    records: Vec<EndpointRecord>,
    cursor: usize,
}

/// Shared reference to an [`EndpointPool`].
pub type SharedEndpointPool = Arc<EndpointPool>;

/// Round-robin endpoint pool keyed by tier.
#[derive(Debug)]
pub struct EndpointPool {
    rings: HashMap<Tier, Mutex<TierRing>>,
    failure_threshold: u32,
}

impl EndpointPool {
    /// Default number of consecutive failures tolerated before skipping.
    pub const DEFAULT_FAILURE_THRESHOLD: u32 = 2;

    /// Build a pool from per-tier ordered address lists.
    ///
    /// Duplicate addresses within a tier are kept in order; tiers with an
    /// empty list are accepted here and reported at `select` time.
    pub fn new(tiers: HashMap<Tier, Vec<String>>, failure_threshold: u32) -> Self {
        let rings = tiers
            .into_iter()
            .map(|(tier, addresses)| {
                let records = addresses
                    .into_iter()
                    .map(|addr| EndpointRecord::new(addr, tier))
                    .collect();
                (tier, Mutex::new(TierRing { records, cursor: 0 }))
            })
            .collect();
        Self {
            rings,
            failure_threshold,
        }
    }

    /// Create a shared reference to this pool.
    pub fn shared(self) -> SharedEndpointPool {
        Arc::new(self)
    }

    /// Consecutive failures tolerated before an address is skipped.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    fn ring(&self, tier: Tier) -> Result<MutexGuard<'_, TierRing>, PoolError> {
        let ring = self.rings.get(&tier).ok_or(PoolError::NoEndpoints(tier))?;
        // A panic while holding the lock leaves only counters behind; they
        // stay usable, so recover the guard instead of propagating poison.
        Ok(ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Select the next address for `tier`.
    ///
    /// Tripped addresses with rotations left to skip are passed over (and
    /// their skip counter consumed). If every address is being skipped the
    /// address under the cursor is returned anyway so callers always get a
    /// probe target.
    pub fn select(&self, tier: Tier) -> Result<String, PoolError> {
        let mut ring = self.ring(tier)?;
        let len = ring.records.len();
        if len == 0 {
            return Err(PoolError::NoEndpoints(tier));
        }

        let threshold = self.failure_threshold;
        let start = ring.cursor % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            let record = &mut ring.records[idx];
            if record.is_tripped(threshold) && record.skips_remaining > 0 {
                record.skips_remaining -= 1;
                debug!(%tier, address = %record.address, "Skipping tripped endpoint");
                continue;
            }
            let address = record.address.clone();
            ring.cursor = (idx + 1) % len;
            debug!(%tier, %address, "Selected endpoint");
            return Ok(address);
        }

        let address = ring.records[start].address.clone();
        ring.cursor = (start + 1) % len;
        debug!(%tier, %address, "All endpoints tripped, probing cursor endpoint");
        Ok(address)
    }

    /// Record the outcome of a call against `address`.
    ///
    /// Updates the record in every tier that lists the address, since one
    /// backend commonly serves several tiers. Unknown addresses are ignored.
    ///
    /// Returns the records this call tripped (crossed the threshold just now).
    pub fn record_outcome(&self, address: &str, success: bool) -> Vec<EndpointRecord> {
        let threshold = self.failure_threshold;
        let mut tripped = Vec::new();
        for (tier, ring) in &self.rings {
            let mut ring = ring.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            for record in ring.records.iter_mut().filter(|r| r.address == address) {
                if success {
                    record.consecutive_failures = 0;
                    record.skips_remaining = 0;
                    continue;
                }
                record.consecutive_failures = record.consecutive_failures.saturating_add(1);
                if record.is_tripped(threshold) {
                    // One full rotation: each pass over the ring visits it once.
                    record.skips_remaining = 1;
                    if record.consecutive_failures == threshold + 1 {
                        warn!(
                            %tier,
                            address = %record.address,
                            failures = record.consecutive_failures,
                            "Endpoint tripped, skipping for one rotation"
                        );
                        tripped.push(record.clone());
                    }
                }
            }
        }
        tripped
    }

    /// Clone of every record in `tier`, in ring order.
    pub fn snapshot(&self, tier: Tier) -> Vec<EndpointRecord> {
        match self.ring(tier) {
            Ok(ring) => ring.records.clone(),
            Err(_) => Vec::new(),
        }
    }

    /// Number of addresses configured for `tier`.
    pub fn len(&self, tier: Tier) -> usize {
        self.snapshot(tier).len()
    }

    /// Whether `tier` has no addresses.
    pub fn is_empty(&self, tier: Tier) -> bool {
        self.len(tier) == 0
    }
}
