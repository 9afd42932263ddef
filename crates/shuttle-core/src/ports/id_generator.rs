//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock のタイムスタンプ + ランダム部分で ULID を作る

use crate::domain::ids::{EngineId, RunId};
use crate::ports::Clock;
use ulid::Ulid;

pub trait IdGenerator: Send + Sync {
    fn generate_run_id(&self) -> RunId;

    fn generate_engine_id(&self) -> EngineId;
}

/// ULID ベースの ID 生成器
///
/// FixedClock を渡すと timestamp 部分が決定的になる（ランダム部分は毎回異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_run_id(&self) -> RunId {
        RunId::from(self.next_ulid())
    }

    fn generate_engine_id(&self) -> EngineId {
        EngineId::from(self.next_ulid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_run_id();
        let id2 = id_gen.generate_run_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_run_id();
        let id2 = id_gen.generate_run_id();

        // ランダム部分があるので ID は異なる
        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }

    #[test]
    fn engine_and_run_ids_have_distinct_prefixes() {
        let id_gen = UlidGenerator::new(SystemClock);
        assert!(id_gen.generate_run_id().to_string().starts_with("run-"));
        assert!(id_gen.generate_engine_id().to_string().starts_with("engine-"));
    }
}
