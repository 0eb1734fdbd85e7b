//! # Solver モジュール
//!
//! 中隊位置・目標・気象から射撃諸元（方向・射角・装薬・飛翔時間）を算出します。
//!
//! ## 計算手順
//!
//! 1. 中隊から目標への水平距離と方位角（北=0、時計回り）を求める
//! 2. 基準方位角との差から方向（deflection）を求める
//! 3. 射程を含む最小の装薬を選び、射表を補間して基本射角と飛翔時間を得る
//! 4. 高低差による高低角補正（小角近似）を加える
//! 5. 空気密度・装薬温度による射角補正と、横風による方向補正を加える
//!
//! 角度はいずれも[0, 6400)ミルに正規化されます。計算は副作用を持たず、
//! 入力に非有限値があれば部分的な結果を返さずに失敗します。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::battery::Battery;
use crate::models::common::{math_utils, MeteoSample, PropellantTemp};
use crate::models::error::FdcError;
use crate::models::firing_table::{Charge, ChargeTable, FiringTableRepository};
use crate::models::mission::Target;

/// 射撃諸元
#[derive(Debug, Clone, PartialEq)]
pub struct FiringSolution {
    /// 方向（ミル、[0, 6400)）
    pub deflection_mils: f64,
    /// 射角（ミル、[0, 6400)）
    pub quadrant_elevation_mils: f64,
    pub charge: Charge,
    /// 水平射程（m）
    pub range: f64,
    /// 飛翔時間（秒）
    pub time_of_flight_s: f64,
}

/// 気象補正の調整係数
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct CorrectionParams {
    /// 横風1ノット・射程1kmあたりの方向補正（ミル）
    pub crosswind_mils_per_knot_per_km: f64,
}

impl Default for CorrectionParams {
    fn default() -> Self {
        Self {
            crosswind_mils_per_knot_per_km: 0.5,
        }
    }
}

impl CorrectionParams {
    pub fn validate(&self) -> Result<(), FdcError> {
        if !self.crosswind_mils_per_knot_per_km.is_finite() {
            return Err(FdcError::Validation(format!(
                "横風補正係数が非有限値です: {}", self.crosswind_mils_per_knot_per_km
            )));
        }
        Ok(())
    }
}

/// 射撃諸元計算機
#[derive(Debug, Clone)]
pub struct BallisticSolver {
    tables: Arc<FiringTableRepository>,
    params: CorrectionParams,
}

impl BallisticSolver {
    pub fn new(tables: Arc<FiringTableRepository>, params: CorrectionParams) -> Result<Self, FdcError> {
        params.validate()?;
        Ok(Self { tables, params })
    }

    pub fn tables(&self) -> &FiringTableRepository {
        &self.tables
    }

    pub fn params(&self) -> CorrectionParams {
        self.params
    }

    /// 射撃諸元を算出
    pub fn solve(&self, battery: &Battery, target: &Target, meteo: &MeteoSample) -> Result<FiringSolution, FdcError> {
        validate_inputs(battery, target, meteo)?;

        let origin = battery.position;
        let delta = target.grid - origin;
        let range = origin.distance_xy(&target.grid);
        let azimuth = math_utils::normalize_mils(origin.azimuth_to(&target.grid));
        let deflection = math_utils::normalize_mils(azimuth - battery.reference_azimuth_mils);

        let table = self.tables.select_charge(range)?;
        let (base_elevation, time_of_flight) = table.interpolate(range)?;

        let site = math_utils::rad_to_mils(delta.altitude / range);
        let meteo_elevation = meteo_elevation_correction(table, meteo);
        let meteo_deflection = crosswind_component(meteo, azimuth) * self.range_factor(range);

        // 有限な入力でも補正量が溢れうる
        let raw_deflection = deflection + meteo_deflection;
        let raw_elevation = base_elevation + site + meteo_elevation;
        if !(raw_deflection.is_finite() && raw_elevation.is_finite()) {
            return Err(FdcError::Validation(format!(
                "射撃諸元が非有限値になりました (方向 {}, 射角 {})", raw_deflection, raw_elevation
            )));
        }

        Ok(FiringSolution {
            deflection_mils: math_utils::normalize_mils(raw_deflection),
            quadrant_elevation_mils: math_utils::normalize_mils(raw_elevation),
            charge: table.charge.clone(),
            range,
            time_of_flight_s: time_of_flight,
        })
    }

    /// 横風1ノットあたりの方向補正（ミル）
    fn range_factor(&self, range: f64) -> f64 {
        self.params.crosswind_mils_per_knot_per_km * range / 1000.0
    }
}

fn validate_inputs(battery: &Battery, target: &Target, meteo: &MeteoSample) -> Result<(), FdcError> {
    if !battery.position.is_finite() {
        return Err(FdcError::Validation(format!("中隊 {} の位置が非有限値です", battery.id)));
    }
    if !battery.reference_azimuth_mils.is_finite() {
        return Err(FdcError::Validation(format!("中隊 {} の基準方位角が非有限値です", battery.id)));
    }
    if !target.grid.is_finite() {
        return Err(FdcError::Validation("目標グリッドが非有限値です".to_string()));
    }
    if !meteo.is_finite() {
        return Err(FdcError::Validation("気象データが非有限値です".to_string()));
    }
    if meteo.wind_speed_knots < 0.0 {
        return Err(FdcError::Validation(format!("風速が負です: {}", meteo.wind_speed_knots)));
    }
    Ok(())
}

/// 空気密度と装薬温度による射角補正（ミル）
fn meteo_elevation_correction(table: &ChargeTable, meteo: &MeteoSample) -> f64 {
    let density = meteo.air_density_deviation_pct * table.density_coeff_mils_per_pct;
    let propellant = match meteo.propellant_temp {
        // 低温の装薬は初速が落ちるため射角を上げる
        PropellantTemp::Cold => table.propellant_coeff_mils,
        PropellantTemp::Standard => 0.0,
        PropellantTemp::Hot => -table.propellant_coeff_mils,
    };
    density + propellant
}

/// 射線に直交する風速成分（ノット）
///
/// 正の値は弾着を左へ流す風（右から吹く風）で、方向を右へ補正します。
pub fn crosswind_component(meteo: &MeteoSample, azimuth_mils: f64) -> f64 {
    let relative = math_utils::mils_to_rad(meteo.wind_direction_mils - azimuth_mils);
    meteo.wind_speed_knots * relative.sin()
}
