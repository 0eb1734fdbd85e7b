//! # FireCommand モジュール
//!
//! 射撃諸元と任務から固定書式の射撃号令文を生成し、また逆に解析します。
//!
//! ```text
//! BATTERY {designation} FIRE DEFLECTION {defl:04} QUADRANT {qe:04} CHARGE {charge} FUZE {fuze} SHELL {ammo} ROUNDS {n}
//! ```
//!
//! 方向と射角は最も近いミルに丸めて4桁ゼロ埋めします。項目順は固定で、
//! 表示・記録側との互換性の前提になっています。`ROUNDS`はその号令で射撃する弾数で、
//! 任務の要求弾数ではありません。

use std::fmt;
use std::str::FromStr;

use crate::models::common::{math_utils, AmmoType, FuzeType, MILS_PER_CIRCLE};
use crate::models::error::FdcError;
use crate::models::mission::FireMission;
use crate::models::solver::FiringSolution;

/// 1回の射撃号令で射撃する弾数
pub const ROUNDS_PER_COMMAND: u32 = 1;

/// 射撃号令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireCommand {
    pub battery: String,
    pub deflection_mils: u32,
    pub quadrant_elevation_mils: u32,
    pub charge: String,
    pub fuze: FuzeType,
    pub ammunition: AmmoType,
    pub rounds: u32,
}

impl FireCommand {
    pub fn new(battery_designation: &str, solution: &FiringSolution, mission: &FireMission) -> Self {
        Self {
            battery: battery_designation.to_string(),
            deflection_mils: math_utils::round_mils(solution.deflection_mils),
            quadrant_elevation_mils: math_utils::round_mils(solution.quadrant_elevation_mils),
            charge: solution.charge.designation.clone(),
            fuze: mission.fuze,
            ammunition: mission.ammunition,
            rounds: ROUNDS_PER_COMMAND,
        }
    }

    /// 号令文を解析
    pub fn parse(text: &str) -> Result<Self, FdcError> {
        let text = text.trim();
        let rest = text
            .strip_prefix("BATTERY ")
            .ok_or_else(|| FdcError::CommandParse("BATTERY で始まっていません".to_string()))?;
        let (battery, fields) = rest
            .split_once(" FIRE DEFLECTION ")
            .ok_or_else(|| FdcError::CommandParse("FIRE DEFLECTION がありません".to_string()))?;
        if battery.trim().is_empty() {
            return Err(FdcError::CommandParse("中隊名が空です".to_string()));
        }

        let tokens: Vec<&str> = fields.split_whitespace().collect();
        let keywords = ["QUADRANT", "CHARGE", "FUZE", "SHELL", "ROUNDS"];
        if tokens.len() != 1 + keywords.len() * 2 {
            return Err(FdcError::CommandParse(format!("項目数が不正です: {}", tokens.len())));
        }
        for (i, keyword) in keywords.iter().enumerate() {
            if tokens[1 + i * 2] != *keyword {
                return Err(FdcError::CommandParse(format!(
                    "{} があるべき位置に {} があります", keyword, tokens[1 + i * 2]
                )));
            }
        }

        Ok(Self {
            battery: battery.to_string(),
            deflection_mils: parse_mils(tokens[0], "DEFLECTION")?,
            quadrant_elevation_mils: parse_mils(tokens[2], "QUADRANT")?,
            charge: tokens[4].to_string(),
            fuze: tokens[6].parse().map_err(FdcError::CommandParse)?,
            ammunition: tokens[8].parse().map_err(FdcError::CommandParse)?,
            rounds: tokens[10]
                .parse()
                .map_err(|_| FdcError::CommandParse(format!("ROUNDS が数値ではありません: {}", tokens[10])))?,
        })
    }
}

fn parse_mils(token: &str, field: &str) -> Result<u32, FdcError> {
    if token.len() != 4 {
        return Err(FdcError::CommandParse(format!("{} は4桁でなければなりません: {}", field, token)));
    }
    let value: u32 = token
        .parse()
        .map_err(|_| FdcError::CommandParse(format!("{} が数値ではありません: {}", field, token)))?;
    if f64::from(value) >= MILS_PER_CIRCLE {
        return Err(FdcError::CommandParse(format!("{} が範囲外です: {}", field, value)));
    }
    Ok(value)
}

impl fmt::Display for FireCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BATTERY {} FIRE DEFLECTION {:04} QUADRANT {:04} CHARGE {} FUZE {} SHELL {} ROUNDS {}",
            self.battery,
            self.deflection_mils,
            self.quadrant_elevation_mils,
            self.charge,
            self.fuze,
            self.ammunition,
            self.rounds
        )
    }
}

impl FromStr for FireCommand {
    type Err = FdcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 射撃号令文を生成
pub fn format_fire_command(battery_designation: &str, solution: &FiringSolution, mission: &FireMission) -> String {
    FireCommand::new(battery_designation, solution, mission).to_string()
}
