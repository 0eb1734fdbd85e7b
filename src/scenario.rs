use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{
    AmmoType, BatteryStatus, ChargeTableSpec, CorrectionParams, CycleTiming, FdcError, FiringTableRepository,
    FuzeType, Grid, MeteoSample, MissionPriority, MissionType,
};

/// シナリオメタデータ
#[derive(Debug, Deserialize, Serialize)]
pub struct ScenarioMeta {
    pub version: String,
    pub name: String,
    pub description: String,
}

/// シミュレーション設定
#[derive(Debug, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub dt_s: f64,
    pub t_max_s: f64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct GridConfig {
    pub easting_m: f64,
    pub northing_m: f64,
    #[serde(default)]
    pub altitude_m: f64,
}

impl GridConfig {
    pub fn to_grid(&self) -> Grid {
        Grid::new(self.easting_m, self.northing_m, self.altitude_m)
    }
}

/// 中隊設定
#[derive(Debug, Deserialize, Serialize)]
pub struct BatteryConfig {
    pub id: String,
    pub designation: String,
    pub position: GridConfig,
    pub reference_azimuth_mils: f64,
    pub gun_count: u32,
    pub rounds_available: HashMap<AmmoType, u32>,
    #[serde(default)]
    pub status: BatteryStatus,
}

/// 訓練運用ポリシー
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PolicyConfig {
    /// 修正待ちの任務を同じ目標で自動的に再計算・再射撃する
    #[serde(default)]
    pub auto_continue_adjusting: bool,
    /// 弾切れで保留中の任務を毎ステップ再試行する
    #[serde(default)]
    pub retry_blocked: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TargetConfig {
    pub grid: GridConfig,
    pub priority: MissionPriority,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub description: String,
}

/// 時刻指定のシナリオ操作
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduledAction {
    pub at_s: f64,
    #[serde(flatten)]
    pub action: ActionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionConfig {
    /// 射撃要求を作成し、諸元計算と射撃号令まで行う
    Create {
        mission: String,
        battery: String,
        observer_id: String,
        target: TargetConfig,
        mission_type: MissionType,
        ammunition: AmmoType,
        fuze: FuzeType,
        rounds_requested: u32,
    },
    /// 観測修正（目標グリッドをずらして再計算・再射撃）
    Adjust {
        mission: String,
        #[serde(default)]
        delta_easting_m: f64,
        #[serde(default)]
        delta_northing_m: f64,
        #[serde(default)]
        delta_altitude_m: f64,
    },
    Cancel {
        mission: String,
    },
    Resupply {
        battery: String,
        ammunition: AmmoType,
        rounds: u32,
    },
    /// 気象データの更新
    Meteo {
        sample: MeteoSample,
    },
}

/// 完全なシナリオ設定
#[derive(Debug, Deserialize, Serialize)]
pub struct ScenarioConfig {
    pub meta: ScenarioMeta,
    pub sim: SimulationConfig,
    #[serde(default)]
    pub meteo: MeteoSample,
    #[serde(default)]
    pub correction: CorrectionParams,
    #[serde(default)]
    pub cycle_timing: CycleTiming,
    /// 省略時は標準射表
    #[serde(default)]
    pub firing_tables: Option<Vec<ChargeTableSpec>>,
    pub batteries: Vec<BatteryConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub actions: Vec<ScheduledAction>,
}

impl ScenarioConfig {
    /// YAMLファイルからシナリオ設定を読み込み
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let path = path.as_ref();

        // ファイル存在チェック
        if !path.exists() {
            return Err(ScenarioError::FileNotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| ScenarioError::IoError(path.to_path_buf(), e))?;

        let config: ScenarioConfig = serde_yaml::from_str(&contents)
            .map_err(|e| ScenarioError::ParseError(path.to_path_buf(), e))?;

        config.validate()?;

        Ok(config)
    }

    /// YAML文字列から読み込み
    pub fn from_yaml(contents: &str) -> Result<Self, ScenarioError> {
        let config: ScenarioConfig = serde_yaml::from_str(contents)
            .map_err(|e| ScenarioError::ParseError(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// 射表リポジトリを構築
    pub fn build_firing_tables(&self) -> Result<FiringTableRepository, FdcError> {
        match &self.firing_tables {
            Some(specs) => FiringTableRepository::new(specs.clone()),
            None => FiringTableRepository::standard(),
        }
    }

    /// 設定の検証
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if !(self.sim.dt_s > 0.0) {
            return Err(ScenarioError::ValidationError("dt_s must be positive".to_string()));
        }
        if !(self.sim.t_max_s > 0.0) {
            return Err(ScenarioError::ValidationError("t_max_s must be positive".to_string()));
        }
        if !self.meteo.is_finite() {
            return Err(ScenarioError::ValidationError("meteo must be finite".to_string()));
        }
        if !self.correction.crosswind_mils_per_knot_per_km.is_finite() {
            return Err(ScenarioError::ValidationError("correction coefficient must be finite".to_string()));
        }
        self.cycle_timing.validate()?;
        self.build_firing_tables()?;

        if self.batteries.is_empty() {
            return Err(ScenarioError::ValidationError("at least one battery is required".to_string()));
        }
        let mut battery_ids = HashSet::new();
        for battery in &self.batteries {
            if !battery_ids.insert(battery.id.as_str()) {
                return Err(ScenarioError::ValidationError(format!("duplicate battery id {}", battery.id)));
            }
            if !battery.position.to_grid().is_finite() || !battery.reference_azimuth_mils.is_finite() {
                return Err(ScenarioError::ValidationError(format!("battery {} has non-finite position", battery.id)));
            }
        }

        // 操作の参照整合性（時刻順に処理されるため並べ替えて確認）
        let mut ordered: Vec<&ScheduledAction> = self.actions.iter().collect();
        ordered.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));
        let mut missions = HashSet::new();
        for scheduled in ordered {
            if !(scheduled.at_s >= 0.0 && scheduled.at_s <= self.sim.t_max_s) {
                return Err(ScenarioError::ValidationError(format!(
                    "action at {} is outside [0, {}]", scheduled.at_s, self.sim.t_max_s
                )));
            }
            match &scheduled.action {
                ActionConfig::Create { mission, battery, rounds_requested, target, .. } => {
                    if !missions.insert(mission.as_str()) {
                        return Err(ScenarioError::ValidationError(format!("duplicate mission key {}", mission)));
                    }
                    if !battery_ids.contains(battery.as_str()) {
                        return Err(ScenarioError::ValidationError(format!(
                            "mission {} references unknown battery {}", mission, battery
                        )));
                    }
                    if *rounds_requested == 0 {
                        return Err(ScenarioError::ValidationError(format!("mission {} requests zero rounds", mission)));
                    }
                    if !target.grid.to_grid().is_finite() {
                        return Err(ScenarioError::ValidationError(format!("mission {} has non-finite target", mission)));
                    }
                }
                ActionConfig::Adjust { mission, .. } | ActionConfig::Cancel { mission } => {
                    if !missions.contains(mission.as_str()) {
                        return Err(ScenarioError::ValidationError(format!(
                            "action at {} references mission {} before it is created", scheduled.at_s, mission
                        )));
                    }
                }
                ActionConfig::Resupply { battery, .. } => {
                    if !battery_ids.contains(battery.as_str()) {
                        return Err(ScenarioError::ValidationError(format!("resupply of unknown battery {}", battery)));
                    }
                }
                ActionConfig::Meteo { sample } => {
                    if !sample.is_finite() {
                        return Err(ScenarioError::ValidationError("meteo must be finite".to_string()));
                    }
                }
            }
        }

        Ok(())
    }

    /// シナリオの概要を表示
    pub fn print_summary(&self) {
        println!("=== シナリオ情報 ===");
        println!("名前: {}", self.meta.name);
        println!("説明: {}", self.meta.description);
        println!("バージョン: {}", self.meta.version);
        println!();

        println!("=== シミュレーション設定 ===");
        println!("時間刻み: {:.3}秒", self.sim.dt_s);
        println!("最大時間: {:.1}秒 ({:.1}分)", self.sim.t_max_s, self.sim.t_max_s / 60.0);
        println!(
            "気象: 密度偏差 {:+.1}%, 風 {:.0}ノット / {:.0}ミル, 装薬温度 {:?}",
            self.meteo.air_density_deviation_pct,
            self.meteo.wind_speed_knots,
            self.meteo.wind_direction_mils,
            self.meteo.propellant_temp
        );
        match &self.firing_tables {
            Some(specs) => println!("射表: {}装薬 (シナリオ定義)", specs.len()),
            None => println!("射表: 標準射表"),
        }
        println!();

        println!("=== 射撃中隊 ===");
        for battery in &self.batteries {
            let total: u32 = battery.rounds_available.values().sum();
            println!(
                "  {} ({}): {}門, 残弾 {}発, 位置 ({:.0}, {:.0})",
                battery.id, battery.designation, battery.gun_count, total, battery.position.easting_m, battery.position.northing_m
            );
        }
        println!();

        let missions = self
            .actions
            .iter()
            .filter(|a| matches!(a.action, ActionConfig::Create { .. }))
            .count();
        println!("=== 訓練シナリオ ===");
        println!("射撃要求: {}件", missions);
        println!("操作総数: {}件", self.actions.len());
    }
}

/// シナリオ読み込みエラー
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("シナリオファイルが見つかりません: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("ファイル読み込みエラー {}: {}", .0.display(), .1)]
    IoError(PathBuf, #[source] std::io::Error),
    #[error("YAML解析エラー {}: {}", .0.display(), .1)]
    ParseError(PathBuf, #[source] serde_yaml::Error),
    #[error("設定検証エラー: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Engine(#[from] FdcError),
}
