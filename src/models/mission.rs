use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::common::{AmmoType, FuzeType, Grid, MissionPriority, MissionType};
use crate::models::error::FdcError;
use crate::models::solver::FiringSolution;

/// 射撃任務ID（登録簿内のインデックス）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MissionId(pub usize);

impl fmt::Display for MissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FM{:04}", self.0 + 1)
    }
}

/// 射撃任務の状態
///
/// `Complete`と`Cancelled`が終端状態です。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MissionStatus {
    Pending,    // 要求受付
    Computing,  // 諸元計算中
    Ready,      // 諸元確定、射撃待ち
    Firing,     // 射撃サイクル実行中
    Adjusting,  // 修正待ち
    Complete,   // 完了
    Cancelled,  // 中止
}

impl MissionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionStatus::Complete | MissionStatus::Cancelled)
    }

    /// この状態で射撃諸元を保持しているべきか
    pub fn holds_solution(&self) -> bool {
        matches!(
            self,
            MissionStatus::Ready | MissionStatus::Firing | MissionStatus::Adjusting | MissionStatus::Complete
        )
    }
}

/// 目標情報
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Target {
    pub grid: Grid,
    pub priority: MissionPriority,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub description: String,
}

impl Target {
    pub fn new(grid: Grid, priority: MissionPriority, target_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            grid,
            priority,
            target_type: target_type.into(),
            description: description.into(),
        }
    }
}

/// 観測者からの射撃要求
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MissionRequest {
    pub observer_id: String,
    pub target: Target,
    pub mission_type: MissionType,
    pub ammunition: AmmoType,
    pub fuze: FuzeType,
    pub rounds_requested: u32,
}

impl MissionRequest {
    pub fn validate(&self) -> Result<(), FdcError> {
        if self.observer_id.trim().is_empty() {
            return Err(FdcError::Validation("観測者IDが空です".to_string()));
        }
        if !self.target.grid.is_finite() {
            return Err(FdcError::Validation("目標グリッドが非有限値です".to_string()));
        }
        if self.rounds_requested == 0 {
            return Err(FdcError::Validation("要求弾数は1以上でなければなりません".to_string()));
        }
        Ok(())
    }
}

/// 任務が射撃できない理由
#[derive(Debug, Clone, PartialEq)]
pub enum BlockingCondition {
    /// 他の任務が射撃スロットを保持しているため待機中
    AwaitingSlot { battery: String },
    /// 指定弾種の残弾なし
    AmmunitionExhausted { battery: String, ammunition: AmmoType },
}

impl fmt::Display for BlockingCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockingCondition::AwaitingSlot { battery } => write!(f, "中隊 {} の射撃スロット待ち", battery),
            BlockingCondition::AmmunitionExhausted { battery, ammunition } => {
                write!(f, "中隊 {} の {} 弾切れ", battery, ammunition)
            }
        }
    }
}

/// 射撃任務
///
/// 登録簿の操作によってのみ変更されます。
#[derive(Debug, Clone)]
pub struct FireMission {
    pub id: MissionId,
    pub observer_id: String,
    pub target: Target,
    pub mission_type: MissionType,
    pub ammunition: AmmoType,
    pub fuze: FuzeType,
    pub rounds_requested: u32,
    pub rounds_fired: u32,
    pub status: MissionStatus,
    pub solution: Option<FiringSolution>,
    /// 射撃諸元を計算した中隊（以後この中隊でのみ射撃可能）
    pub battery_id: Option<String>,
    pub blocked: Option<BlockingCondition>,
    pub created_at: f64,
}

impl FireMission {
    pub(crate) fn from_request(id: MissionId, request: MissionRequest, created_at: f64) -> Self {
        Self {
            id,
            observer_id: request.observer_id,
            target: request.target,
            mission_type: request.mission_type,
            ammunition: request.ammunition,
            fuze: request.fuze,
            rounds_requested: request.rounds_requested,
            rounds_fired: 0,
            status: MissionStatus::Pending,
            solution: None,
            battery_id: None,
            blocked: None,
            created_at,
        }
    }

    pub fn rounds_remaining(&self) -> u32 {
        self.rounds_requested - self.rounds_fired
    }

    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}
