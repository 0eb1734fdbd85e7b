// 基本的なデータ型と数学ユーティリティ
pub mod common;

// エラー型
pub mod error;

// 時刻源インターフェースと実装
pub mod traits;
pub mod clock;

// 射撃指揮の各コンポーネント
pub mod firing_table;
pub mod solver;
pub mod battery;
pub mod mission;
pub mod registry;
pub mod fire_command;

// 便利な re-export
pub use common::*;
pub use error::{FdcError, RangeError};
pub use traits::*;
pub use clock::{ManualClock, WallClock};
pub use firing_table::{Charge, ChargeTable, ChargeTableSpec, FiringTableEntry, FiringTableRepository};
pub use solver::{BallisticSolver, CorrectionParams, FiringSolution};
pub use battery::{Battery, BatteryCatalogue, BatteryStatus};
pub use mission::{BlockingCondition, FireMission, MissionId, MissionRequest, MissionStatus, Target};
pub use registry::{CycleTiming, FireMissionRegistry, FireOutcome, FireRecord, RegistryStats};
pub use fire_command::{format_fire_command, FireCommand, ROUNDS_PER_COMMAND};
