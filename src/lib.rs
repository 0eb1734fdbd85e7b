//! # fdcsim
//!
//! 射撃指揮所（FDC）の射撃諸元計算と射撃任務管理を行う訓練シミュレーション用エンジンです。

pub mod logging;
pub mod models;
pub mod scenario;
pub mod simulation;
