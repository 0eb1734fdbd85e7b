//! # Simulation モジュール
//!
//! 射撃指揮訓練セッションを時間駆動で実行するシミュレーションエンジンを提供します。
//!
//! エンジンは手動時計・中隊一覧・射撃任務登録簿を所有し、シナリオの操作
//! （射撃要求、観測修正、中止、補給、気象更新）を固定時間刻みで実行します。
//! 時計を進めるたびに、登録簿に予定された射撃サイクル完了イベントを処理します。
//!
//! ## 1ステップの処理順序
//!
//! 1. **時計更新**: 手動時計を現在時刻に進め、予定イベントを処理
//! 2. **シナリオ操作**: 現在時刻までに予定された操作を時刻順に実行
//! 3. **運用ポリシー**: 修正待ち任務の自動継続、弾切れ保留任務の再試行
//!
//! ## 使用例
//!
//! ```no_run
//! use fdcsim::simulation::SimulationEngine;
//! use fdcsim::scenario::ScenarioConfig;
//!
//! let config = ScenarioConfig::from_file("scenarios/basic_fire_mission.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1)?;
//! let summary = engine.run()?;
//! summary.print();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::models::*;
use crate::scenario::*;

/// セッション実行結果
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub elapsed_s: f64,
    pub steps: u64,
    pub stats: RegistryStats,
    pub commands: Vec<String>,
    /// 操作が拒否された回数
    pub rejected_operations: usize,
    pub rounds_remaining: Vec<(String, u32)>,
}

impl SessionSummary {
    pub fn print(&self) {
        println!("=== 訓練結果 ===");
        println!("経過時間: {:.1}秒 ({}ステップ)", self.elapsed_s, self.steps);
        println!(
            "任務: 計 {} / 完了 {} / 中止 {} / 修正待ち {} / 射撃待ち {} / 未計算 {}",
            self.stats.total_missions,
            self.stats.complete,
            self.stats.cancelled,
            self.stats.adjusting,
            self.stats.ready,
            self.stats.pending
        );
        println!("射撃弾数: {}発", self.stats.rounds_fired);
        println!("拒否された操作: {}件", self.rejected_operations);
        for (battery, rounds) in &self.rounds_remaining {
            println!("  中隊 {} 残弾: {}発", battery, rounds);
        }
        println!();
        println!("=== 射撃号令 ===");
        for command in &self.commands {
            println!("{}", command);
        }
    }
}

pub struct SimulationEngine {
    pub current_time: f64,
    pub dt: f64,
    pub max_time: f64,
    pub step_count: u64,

    clock: ManualClock,
    registry: FireMissionRegistry<ManualClock>,
    pub batteries: BatteryCatalogue,
    pub meteo: MeteoSample,

    actions: Vec<ScheduledAction>,
    next_action: usize,
    mission_keys: HashMap<String, MissionId>,
    rejected_operations: usize,

    pub policy: PolicyConfig,
    pub verbose_level: u8,
}

impl SimulationEngine {
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Result<Self, ScenarioError> {
        let tables = Arc::new(scenario.build_firing_tables()?);
        let solver = BallisticSolver::new(tables, scenario.correction)?;
        let clock = ManualClock::new(0.0);
        let registry = FireMissionRegistry::new(clock.clone(), solver, scenario.cycle_timing)?;

        let mut batteries = BatteryCatalogue::new();
        for config in scenario.batteries {
            let mut battery = Battery::new(
                config.id,
                config.designation,
                config.position.to_grid(),
                config.reference_azimuth_mils,
                config.gun_count,
                config.rounds_available,
            );
            battery.status = config.status;
            if verbose_level > 1 {
                debug!(
                    "中隊初期化: {} ({}門, 残弾 {}発)",
                    battery.id, battery.gun_count, battery.total_rounds()
                );
            }
            batteries.add(battery)?;
        }

        let mut actions = scenario.actions;
        // 同時刻の操作は記述順を保つ
        actions.sort_by(|a, b| a.at_s.total_cmp(&b.at_s));

        if verbose_level > 0 {
            info!("初期化完了:");
            info!("  中隊: {}個", batteries.len());
            info!("  操作: {}件", actions.len());
        }

        Ok(Self {
            current_time: 0.0,
            dt: scenario.sim.dt_s,
            max_time: scenario.sim.t_max_s,
            step_count: 0,
            clock,
            registry,
            batteries,
            meteo: scenario.meteo,
            actions,
            next_action: 0,
            mission_keys: HashMap::new(),
            rejected_operations: 0,
            policy: scenario.policy,
            verbose_level,
        })
    }

    pub fn registry(&self) -> &FireMissionRegistry<ManualClock> {
        &self.registry
    }

    pub fn mission_id(&self, key: &str) -> Option<MissionId> {
        self.mission_keys.get(key).copied()
    }

    pub fn run(&mut self) -> Result<SessionSummary, ScenarioError> {
        info!("=== 訓練セッション開始 ===");

        while self.current_time <= self.max_time {
            self.step();

            if self.verbose_level > 2 {
                trace!("時刻: {:.1}秒 (ステップ: {})", self.current_time, self.step_count);
            }

            if self.step_count % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.current_time / self.max_time) * 100.0;
                info!("進行状況: {:.1}% ({:.1}/{:.1}秒)", progress, self.current_time, self.max_time);
            }

            if self.is_idle() {
                debug!("予定された操作とイベントがなくなったため終了");
                break;
            }
        }

        info!("=== 訓練セッション完了 ===");
        info!("実行時間: {:.1}秒", self.current_time);
        info!("総ステップ数: {}", self.step_count);

        Ok(self.summary())
    }

    /// 1ステップ実行
    pub fn step(&mut self) {
        self.clock.set(self.current_time);
        let completed = self.registry.advance(&mut self.batteries);
        for id in completed {
            debug!("射撃サイクル完了: {} (時刻 {:.1}秒)", id, self.current_time);
        }

        self.process_actions();
        self.apply_policy();

        self.current_time += self.dt;
        self.step_count += 1;
    }

    fn is_idle(&self) -> bool {
        let has_blocked = self.policy.retry_blocked
            && self.registry.missions().any(|m| m.status == MissionStatus::Ready && m.blocked.is_some());
        let has_adjusting = self.policy.auto_continue_adjusting
            && self.registry.missions().any(|m| m.status == MissionStatus::Adjusting);
        self.next_action >= self.actions.len()
            && self.registry.next_event_time().is_none()
            && !has_blocked
            && !has_adjusting
    }

    fn process_actions(&mut self) {
        while let Some(scheduled) = self.actions.get(self.next_action) {
            if scheduled.at_s > self.current_time {
                break;
            }
            let action = scheduled.action.clone();
            self.next_action += 1;
            if let Err(e) = self.execute(action) {
                self.rejected_operations += 1;
                warn!("操作を実行できません (時刻 {:.1}秒): {}", self.current_time, e);
            }
        }
    }

    fn execute(&mut self, action: ActionConfig) -> Result<(), FdcError> {
        match action {
            ActionConfig::Create {
                mission,
                battery,
                observer_id,
                target,
                mission_type,
                ammunition,
                fuze,
                rounds_requested,
            } => {
                let request = MissionRequest {
                    observer_id,
                    target: Target::new(target.grid.to_grid(), target.priority, target.target_type, target.description),
                    mission_type,
                    ammunition,
                    fuze,
                    rounds_requested,
                };
                let id = self.registry.create(request)?;
                self.mission_keys.insert(mission, id);
                self.solve_and_fire(id, &battery)
            }
            ActionConfig::Adjust {
                mission,
                delta_easting_m,
                delta_northing_m,
                delta_altitude_m,
            } => {
                let id = self.lookup(&mission)?;
                let current = self.registry.mission(id)?;
                let grid = current.target.grid + Grid::new(delta_easting_m, delta_northing_m, delta_altitude_m);
                // 修正待ちの任務は必ず諸元計算済みの中隊を持つ
                let battery = current.battery_id.clone().ok_or(FdcError::InvalidTransition {
                    mission: id,
                    status: current.status,
                    operation: "adjust_target",
                })?;
                self.registry.adjust_target(id, grid)?;
                self.solve_and_fire(id, &battery)
            }
            ActionConfig::Cancel { mission } => {
                let id = self.lookup(&mission)?;
                self.registry.cancel(id, &mut self.batteries)
            }
            ActionConfig::Resupply { battery, ammunition, rounds } => {
                let battery = self.batteries.require_mut(&battery)?;
                battery.resupply(ammunition, rounds);
                info!("弾薬補給: 中隊 {} に {} を{}発 (残弾 {}発)", battery.id, ammunition, rounds, battery.rounds_of(ammunition));
                Ok(())
            }
            ActionConfig::Meteo { sample } => {
                info!(
                    "気象更新: 密度偏差 {:+.1}%, 風 {:.0}ノット / {:.0}ミル",
                    sample.air_density_deviation_pct, sample.wind_speed_knots, sample.wind_direction_mils
                );
                self.meteo = sample;
                Ok(())
            }
        }
    }

    fn lookup(&self, key: &str) -> Result<MissionId, FdcError> {
        self.mission_keys
            .get(key)
            .copied()
            .ok_or_else(|| FdcError::Validation(format!("未作成の任務キー: {}", key)))
    }

    /// 諸元計算から射撃号令まで
    fn solve_and_fire(&mut self, id: MissionId, battery_id: &str) -> Result<(), FdcError> {
        let battery = self.batteries.require(battery_id)?.clone();
        self.registry.request_solution(id, &battery, &self.meteo)?;
        self.fire(id, battery_id)
    }

    fn fire(&mut self, id: MissionId, battery_id: &str) -> Result<(), FdcError> {
        match self.registry.issue_fire_command(id, &mut self.batteries, battery_id)? {
            FireOutcome::Fired(command) => {
                if self.verbose_level > 0 {
                    println!("[{:7.1}s] {}", self.current_time, command);
                }
            }
            FireOutcome::Queued { position } => {
                debug!("{} は中隊 {} の待ち行列 {}番目", id, battery_id, position);
            }
        }
        Ok(())
    }

    fn apply_policy(&mut self) {
        let mut work = Vec::new();
        for mission in self.registry.missions() {
            let Some(battery) = mission.battery_id.clone() else {
                continue;
            };
            let adjusting = self.policy.auto_continue_adjusting && mission.status == MissionStatus::Adjusting;
            let blocked = self.policy.retry_blocked
                && mission.status == MissionStatus::Ready
                && matches!(mission.blocked, Some(BlockingCondition::AmmunitionExhausted { .. }));
            if adjusting || blocked {
                work.push((mission.id, battery, adjusting));
            }
        }

        for (id, battery_id, adjusting) in work {
            let has_ammo = self
                .registry
                .mission(id)
                .ok()
                .zip(self.batteries.get(&battery_id))
                .is_some_and(|(m, b)| b.has_round(m.ammunition));
            if !has_ammo {
                continue;
            }
            let result = if adjusting {
                self.solve_and_fire(id, &battery_id)
            } else {
                self.fire(id, &battery_id)
            };
            if let Err(e) = result {
                warn!("自動処理に失敗: {} ({})", id, e);
            }
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            elapsed_s: self.current_time,
            steps: self.step_count,
            stats: self.registry.stats(),
            commands: self
                .registry
                .fire_history()
                .iter()
                .map(|r| format!("[{:7.1}s] {}", r.timestamp, r.command))
                .collect(),
            rejected_operations: self.rejected_operations,
            rounds_remaining: self.batteries.iter().map(|b| (b.id.clone(), b.total_rounds())).collect(),
        }
    }
}
