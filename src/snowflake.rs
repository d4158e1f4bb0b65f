//! Snowflake-style identifier generation.
//!
//! Identifiers are 64-bit integers laid out as
//! `[timestamp since epoch: 41][datacenter: 5][worker: 5][sequence: 12]`.
//! Uniqueness holds within one running instance.

use crate::config::SnowflakeSettings;
use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const WORKER_ID_BITS: u32 = 5;
const DATACENTER_ID_BITS: u32 = 5;
const SEQUENCE_BITS: u32 = 12;

const MAX_NODE_ID: u64 = (1 << WORKER_ID_BITS) - 1;
const SEQUENCE_MASK: u64 = (1 << SEQUENCE_BITS) - 1;
const TIMESTAMP_MASK: u64 = (1 << 41) - 1;

const WORKER_ID_SHIFT: u32 = SEQUENCE_BITS;
const DATACENTER_ID_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_ID_BITS + DATACENTER_ID_BITS;

/// Identifier generator errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SnowflakeError {
    #[error("clock moved backwards: last id at {last_ms}ms, now {now_ms}ms; refusing to generate id")]
    ClockMovedBackwards { last_ms: i64, now_ms: i64 },

    #[error("{kind} id {value} out of range (0-31)")]
    InvalidNodeId { kind: &'static str, value: u64 },

    #[error("clock {now_ms}ms is before the configured epoch {epoch_ms}ms")]
    BeforeEpoch { now_ms: i64, epoch_ms: i64 },
}

/// Source of unique identifiers.
pub trait IdGenerator: Send + Sync {
    /// Next identifier as a raw integer.
    fn next_id(&self) -> Result<u64, SnowflakeError>;

    /// Next identifier encoded as a decimal string.
    fn next_id_string(&self) -> Result<String, SnowflakeError> {
        self.next_id().map(|id| id.to_string())
    }
}

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Decoded fields of an identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeParts {
    pub timestamp_ms: i64,
    pub datacenter_id: u64,
    pub worker_id: u64,
    pub sequence: u64,
}

#[derive(Debug)]
struct State {
    last_timestamp: i64,
    sequence: u64,
}

/// Lock-protected snowflake generator.
pub struct SnowflakeGenerator<C: Clock = SystemClock> {
    epoch_ms: i64,
    datacenter_id: u64,
    worker_id: u64,
    clock: C,
    state: Mutex<State>,
}

impl SnowflakeGenerator<SystemClock> {
    /// Create a generator on the system clock.
    pub fn new(settings: &SnowflakeSettings) -> Result<Self, SnowflakeError> {
        Self::with_clock(settings, SystemClock)
    }
}

impl<C: Clock> SnowflakeGenerator<C> {
    /// Create a generator on a custom clock.
    pub fn with_clock(settings: &SnowflakeSettings, clock: C) -> Result<Self, SnowflakeError> {
        if settings.datacenter_id > MAX_NODE_ID {
            return Err(SnowflakeError::InvalidNodeId {
                kind: "datacenter",
                value: settings.datacenter_id,
            });
        }
        if settings.worker_id > MAX_NODE_ID {
            return Err(SnowflakeError::InvalidNodeId {
                kind: "worker",
                value: settings.worker_id,
            });
        }

        Ok(Self {
            epoch_ms: settings.epoch_ms,
            datacenter_id: settings.datacenter_id,
            worker_id: settings.worker_id,
            clock,
            state: Mutex::new(State {
                last_timestamp: -1,
                sequence: 0,
            }),
        })
    }

    /// Split an identifier back into its fields.
    pub fn decompose(&self, id: u64) -> SnowflakeParts {
        SnowflakeParts {
            timestamp_ms: ((id >> TIMESTAMP_SHIFT) & TIMESTAMP_MASK) as i64 + self.epoch_ms,
            datacenter_id: (id >> DATACENTER_ID_SHIFT) & MAX_NODE_ID,
            worker_id: (id >> WORKER_ID_SHIFT) & MAX_NODE_ID,
            sequence: id & SEQUENCE_MASK,
        }
    }

    fn til_next_millis(&self, last_timestamp: i64) -> i64 {
        let mut timestamp = self.clock.now_millis();
        while timestamp <= last_timestamp {
            std::hint::spin_loop();
            timestamp = self.clock.now_millis();
        }
        timestamp
    }
}

impl<C: Clock> IdGenerator for SnowflakeGenerator<C> {
    fn next_id(&self) -> Result<u64, SnowflakeError> {
        let mut state = self.state.lock();
        let mut timestamp = self.clock.now_millis();

        if timestamp < state.last_timestamp {
            return Err(SnowflakeError::ClockMovedBackwards {
                last_ms: state.last_timestamp,
                now_ms: timestamp,
            });
        }
        if timestamp < self.epoch_ms {
            return Err(SnowflakeError::BeforeEpoch {
                now_ms: timestamp,
                epoch_ms: self.epoch_ms,
            });
        }

        if timestamp == state.last_timestamp {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                // Sequence exhausted for this millisecond.
                timestamp = self.til_next_millis(state.last_timestamp);
            }
        } else {
            state.sequence = 0;
        }
        state.last_timestamp = timestamp;

        let elapsed = ((timestamp - self.epoch_ms) as u64) & TIMESTAMP_MASK;
        Ok((elapsed << TIMESTAMP_SHIFT)
            | (self.datacenter_id << DATACENTER_ID_SHIFT)
            | (self.worker_id << WORKER_ID_SHIFT)
            | state.sequence)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
    use std::sync::Arc;

    const EPOCH: i64 = 1_704_067_200_000;

    /// Clock whose value is set by the test.
    struct ManualClock(AtomicI64);

    impl Clock for ManualClock {
        fn now_millis(&self) -> i64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Clock for Arc<ManualClock> {
        fn now_millis(&self) -> i64 {
            self.as_ref().now_millis()
        }
    }

    /// Clock that advances one millisecond every `per_tick` reads.
    struct TickingClock {
        reads: AtomicU64,
        per_tick: u64,
    }

    impl Clock for TickingClock {
        fn now_millis(&self) -> i64 {
            let reads = self.reads.fetch_add(1, Ordering::SeqCst);
            EPOCH + 1_000 + (reads / self.per_tick) as i64
        }
    }

    fn settings(datacenter_id: u64, worker_id: u64) -> SnowflakeSettings {
        SnowflakeSettings {
            epoch_ms: EPOCH,
            datacenter_id,
            worker_id,
        }
    }

    #[test]
    fn test_bit_layout() {
        let clock = ManualClock(AtomicI64::new(EPOCH + 5));
        let gen = SnowflakeGenerator::with_clock(&settings(3, 7), clock).unwrap();

        let first = gen.next_id().unwrap();
        assert_eq!(first, (5 << 22) | (3 << 17) | (7 << 12));

        let second = gen.next_id().unwrap();
        assert_eq!(second, first + 1);

        let parts = gen.decompose(second);
        assert_eq!(
            parts,
            SnowflakeParts {
                timestamp_ms: EPOCH + 5,
                datacenter_id: 3,
                worker_id: 7,
                sequence: 1,
            }
        );
    }

    #[test]
    fn test_sequence_resets_each_millisecond() {
        let clock = Arc::new(ManualClock(AtomicI64::new(EPOCH + 10)));
        let gen = SnowflakeGenerator::with_clock(&settings(1, 1), clock.clone()).unwrap();

        gen.next_id().unwrap();
        gen.next_id().unwrap();
        clock.0.store(EPOCH + 11, Ordering::SeqCst);
        let id = gen.next_id().unwrap();
        assert_eq!(gen.decompose(id).sequence, 0);
        assert_eq!(gen.decompose(id).timestamp_ms, EPOCH + 11);
    }

    #[test]
    fn test_clock_rollback_fails() {
        let clock = Arc::new(ManualClock(AtomicI64::new(EPOCH + 100)));
        let gen = SnowflakeGenerator::with_clock(&settings(1, 1), clock.clone()).unwrap();

        gen.next_id().unwrap();
        clock.0.store(EPOCH + 99, Ordering::SeqCst);
        assert_eq!(
            gen.next_id(),
            Err(SnowflakeError::ClockMovedBackwards {
                last_ms: EPOCH + 100,
                now_ms: EPOCH + 99,
            })
        );

        // Recovers once the clock catches up.
        clock.0.store(EPOCH + 101, Ordering::SeqCst);
        assert!(gen.next_id().is_ok());
    }

    #[test]
    fn test_sequence_overflow_waits_for_next_millisecond() {
        let clock = TickingClock {
            reads: AtomicU64::new(0),
            per_tick: 10_000,
        };
        let gen = SnowflakeGenerator::with_clock(&settings(0, 0), clock).unwrap();

        let ids: Vec<u64> = (0..5_000).map(|_| gen.next_id().unwrap()).collect();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(gen.decompose(ids[4096]).sequence, 0);
    }

    #[test]
    fn test_invalid_node_ids() {
        assert!(matches!(
            SnowflakeGenerator::new(&settings(32, 0)),
            Err(SnowflakeError::InvalidNodeId { kind: "datacenter", .. })
        ));
        assert!(matches!(
            SnowflakeGenerator::new(&settings(0, 40)),
            Err(SnowflakeError::InvalidNodeId { kind: "worker", .. })
        ));
    }

    #[test]
    fn test_before_epoch() {
        let clock = ManualClock(AtomicI64::new(EPOCH - 1));
        let gen = SnowflakeGenerator::with_clock(&settings(1, 1), clock).unwrap();
        assert!(matches!(gen.next_id(), Err(SnowflakeError::BeforeEpoch { .. })));
    }

    #[test]
    fn test_string_encoding() {
        let gen = SnowflakeGenerator::new(&SnowflakeSettings::default()).unwrap();
        let id = gen.next_id_string().unwrap();
        assert!(id.parse::<u64>().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_ids_are_distinct() {
        let gen = Arc::new(SnowflakeGenerator::new(&SnowflakeSettings::default()).unwrap());

        let handles: Vec<_> = (0..10_000)
            .map(|_| {
                let gen = gen.clone();
                tokio::spawn(async move { gen.next_id().unwrap() })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_threaded_ids_are_distinct() {
        let gen = Arc::new(SnowflakeGenerator::new(&SnowflakeSettings::default()).unwrap());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let gen = gen.clone();
                std::thread::spawn(move || {
                    (0..2_000).map(|_| gen.next_id().unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for t in threads {
            ids.extend(t.join().unwrap());
        }
        assert_eq!(ids.len(), 16_000);
    }
}
