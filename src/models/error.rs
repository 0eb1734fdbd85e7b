//! 射撃指揮計算のエラー型
//!
//! エラーはすべて戻り値として返され、失敗した操作は任務状態を変更しません。

use thiserror::Error;

use crate::models::common::AmmoType;
use crate::models::mission::{MissionId, MissionStatus};

/// 射程に対応する装薬が存在しない
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RangeError {
    /// 最小装薬の最小射程より近い
    #[error("射程が短すぎます: {range:.1}m (最小 {min:.1}m)")]
    TooShort { range: f64, min: f64 },
    /// 最大装薬の最大射程を超えている
    #[error("射程を超えています: {range:.1}m (最大 {max:.1}m)")]
    Exceeded { range: f64, max: f64 },
}

/// 射撃指揮エンジンのエラー
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FdcError {
    /// 非有限値や欠損した入力
    #[error("入力検証エラー: {0}")]
    Validation(String),

    #[error(transparent)]
    Range(#[from] RangeError),

    /// 指定弾種の残弾がない
    #[error("弾薬不足: 中隊 {battery} に {ammunition} の残弾がありません")]
    ResourceUnavailable { battery: String, ammunition: AmmoType },

    /// 諸元を計算した中隊とは別の中隊での射撃要求
    #[error("競合: 任務 {mission} は他の中隊に割り当て済みのため中隊 {battery} では射撃できません")]
    ConcurrencyConflict { mission: MissionId, battery: String },

    /// 現在の状態では許可されない操作
    #[error("状態遷移エラー: 任務 {mission} は {status:?} 状態のため {operation} を実行できません")]
    InvalidTransition {
        mission: MissionId,
        status: MissionStatus,
        operation: &'static str,
    },

    #[error("任務が見つかりません: {0}")]
    UnknownMission(MissionId),

    #[error("中隊が見つかりません: {0}")]
    UnknownBattery(String),

    /// 射表データの不整合
    #[error("射表エラー: {0}")]
    FiringTable(String),

    /// 射撃号令の解析失敗
    #[error("射撃号令の解析エラー: {0}")]
    CommandParse(String),
}
