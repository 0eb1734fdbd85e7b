use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 1周あたりのミル数
pub const MILS_PER_CIRCLE: f64 = 6400.0;

/// グリッド座標（東距・北距・標高、すべてメートル）
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Grid {
    pub easting: f64,  // m
    pub northing: f64, // m
    pub altitude: f64, // m
}

impl Grid {
    pub fn new(easting: f64, northing: f64, altitude: f64) -> Self {
        Self { easting, northing, altitude }
    }

    /// 全成分が有限値かどうか
    pub fn is_finite(&self) -> bool {
        self.easting.is_finite() && self.northing.is_finite() && self.altitude.is_finite()
    }

    /// 水平面での2次元距離を計算
    pub fn distance_xy(&self, other: &Grid) -> f64 {
        ((self.easting - other.easting).powi(2) + (self.northing - other.northing).powi(2)).sqrt()
    }

    /// otherへの方位角（ミル、北=0・時計回り）
    pub fn azimuth_to(&self, other: &Grid) -> f64 {
        let d = *other - *self;
        math_utils::rad_to_mils(d.easting.atan2(d.northing))
    }
}

impl Add for Grid {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.easting + other.easting, self.northing + other.northing, self.altitude + other.altitude)
    }
}

impl Sub for Grid {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.easting - other.easting, self.northing - other.northing, self.altitude - other.altitude)
    }
}

/// 弾種
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum AmmoType {
    #[serde(rename = "HE")]
    HighExplosive,
    #[serde(rename = "SMOKE")]
    Smoke,
    #[serde(rename = "ILLUM")]
    Illumination,
    #[serde(rename = "WP")]
    WhitePhosphorus,
    #[serde(rename = "DPICM")]
    Dpicm,
}

impl fmt::Display for AmmoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AmmoType::HighExplosive => "HE",
            AmmoType::Smoke => "SMOKE",
            AmmoType::Illumination => "ILLUM",
            AmmoType::WhitePhosphorus => "WP",
            AmmoType::Dpicm => "DPICM",
        };
        f.write_str(s)
    }
}

impl FromStr for AmmoType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HE" => Ok(AmmoType::HighExplosive),
            "SMOKE" => Ok(AmmoType::Smoke),
            "ILLUM" => Ok(AmmoType::Illumination),
            "WP" => Ok(AmmoType::WhitePhosphorus),
            "DPICM" => Ok(AmmoType::Dpicm),
            _ => Err(format!("無効な弾種: {}", s)),
        }
    }
}

/// 信管
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FuzeType {
    Quick,
    Delay,
    Vt,
    Time,
}

impl fmt::Display for FuzeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FuzeType::Quick => "QUICK",
            FuzeType::Delay => "DELAY",
            FuzeType::Vt => "VT",
            FuzeType::Time => "TIME",
        };
        f.write_str(s)
    }
}

impl FromStr for FuzeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "QUICK" => Ok(FuzeType::Quick),
            "DELAY" => Ok(FuzeType::Delay),
            "VT" => Ok(FuzeType::Vt),
            "TIME" => Ok(FuzeType::Time),
            _ => Err(format!("無効な信管: {}", s)),
        }
    }
}

/// 射撃任務の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionType {
    AdjustFire,
    FireForEffect,
    Suppression,
    Illumination,
}

/// 目標の緊急度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPriority {
    Routine,
    Priority,
    Immediate,
}

/// 装薬温度区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropellantTemp {
    Cold,
    #[default]
    Standard,
    Hot,
}

/// 気象データ
///
/// 射撃諸元の計算ごとに不変として扱います。
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct MeteoSample {
    /// 空気密度偏差（%）
    pub air_density_deviation_pct: f64,
    /// 風速（ノット）
    pub wind_speed_knots: f64,
    /// 風向（ミル、風が吹いてくる方向）
    pub wind_direction_mils: f64,
    #[serde(default)]
    pub propellant_temp: PropellantTemp,
}

impl MeteoSample {
    /// 補正のかからない標準気象
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn is_finite(&self) -> bool {
        self.air_density_deviation_pct.is_finite()
            && self.wind_speed_knots.is_finite()
            && self.wind_direction_mils.is_finite()
    }
}

/// 数学ユーティリティ関数
pub mod math_utils {
    use super::MILS_PER_CIRCLE;

    /// 1ラジアンあたりのミル数
    pub const MILS_PER_RADIAN: f64 = MILS_PER_CIRCLE / (2.0 * std::f64::consts::PI);

    /// ラジアンをミルに変換
    pub fn rad_to_mils(radians: f64) -> f64 {
        radians * MILS_PER_RADIAN
    }

    /// ミルをラジアンに変換
    pub fn mils_to_rad(mils: f64) -> f64 {
        mils / MILS_PER_RADIAN
    }

    /// 角度を[0, 6400)ミルの範囲に正規化
    pub fn normalize_mils(angle_mils: f64) -> f64 {
        let normalized = angle_mils.rem_euclid(MILS_PER_CIRCLE);
        // 微小な負値はrem_euclidで6400ちょうどになりうる
        if normalized >= MILS_PER_CIRCLE { 0.0 } else { normalized }
    }

    /// 最も近いミルへ丸めて[0, 6400)の整数にする
    pub fn round_mils(angle_mils: f64) -> u32 {
        (normalize_mils(angle_mils).round() as u32) % MILS_PER_CIRCLE as u32
    }
}
