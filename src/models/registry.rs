//! # Registry モジュール
//!
//! 射撃任務の所有と状態遷移、中隊ごとの射撃スロット管理を行います。
//!
//! ## 状態遷移
//!
//! ```text
//! Pending ──request_solution──▶ Computing ──▶ Ready ──issue_fire_command──▶ Firing
//!    ▲                              │                                        │
//!    └──────── 計算失敗で元に戻る ───┘        fire_cycle_complete ◀──────────┘
//!                                             ├─ 要求弾数到達 ─▶ Complete
//!                                             └─ 未達 ─▶ Adjusting ──request_solution──▶ …
//! 非終端状態からはいつでも cancel ─▶ Cancelled
//! ```
//!
//! ## 射撃スロット
//!
//! 各中隊で射撃中の任務は常に高々1つです。スロットが埋まっている中隊への射撃号令は
//! FIFOの待ち行列に入り、サイクル完了または中止でスロットが空いた時点で、
//! 待ち行列の順序を保ちつつ緊急（immediate）目標を優先して次の任務が射撃に入ります。
//! 中隊同士は状態を共有しません。
//!
//! ## 時刻
//!
//! 射撃サイクルの完了は注入された時計上の予定イベントとして登録され、
//! `advance`で現在時刻以前のイベントをすべて時刻順に処理します。

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::battery::{Battery, BatteryCatalogue};
use crate::models::common::{AmmoType, Grid, MeteoSample, MissionPriority};
use crate::models::error::FdcError;
use crate::models::fire_command::{FireCommand, ROUNDS_PER_COMMAND};
use crate::models::firing_table::Charge;
use crate::models::mission::{BlockingCondition, FireMission, MissionId, MissionRequest, MissionStatus};
use crate::models::solver::{BallisticSolver, FiringSolution};
use crate::models::traits::IClock;

/// 射撃サイクル時間の設定
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CycleTiming {
    /// 弾種別の指定がない場合の基本時間[s]
    pub default_s: f64,
    /// 装薬の序列1つあたりの追加時間[s]
    pub per_charge_s: f64,
    /// 弾種別の基本時間[s]
    #[serde(default)]
    pub by_ammunition: HashMap<AmmoType, f64>,
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self {
            default_s: 20.0,
            per_charge_s: 2.0,
            by_ammunition: HashMap::new(),
        }
    }
}

impl CycleTiming {
    /// 1射撃サイクルの所要時間
    pub fn cycle_duration(&self, ammunition: AmmoType, charge: &Charge) -> f64 {
        let base = self.by_ammunition.get(&ammunition).copied().unwrap_or(self.default_s);
        (base + self.per_charge_s * charge.rank as f64).max(0.0)
    }

    pub fn validate(&self) -> Result<(), FdcError> {
        let all_finite = self.default_s.is_finite()
            && self.per_charge_s.is_finite()
            && self.by_ammunition.values().all(|v| v.is_finite());
        if !all_finite {
            return Err(FdcError::Validation("射撃サイクル時間に非有限値があります".to_string()));
        }
        if self.default_s < 0.0 || self.per_charge_s < 0.0 || self.by_ammunition.values().any(|v| *v < 0.0) {
            return Err(FdcError::Validation("射撃サイクル時間は負にできません".to_string()));
        }
        Ok(())
    }
}

/// 射撃号令の結果
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// 射撃スロットを得て射撃した
    Fired(FireCommand),
    /// スロットが使用中のため待ち行列に入った（1始まりの順位）
    Queued { position: usize },
}

/// 射撃記録
#[derive(Debug, Clone)]
pub struct FireRecord {
    pub timestamp: f64,
    pub mission: MissionId,
    pub battery_id: String,
    pub command: FireCommand,
}

/// 登録簿の統計情報
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryStats {
    pub total_missions: usize,
    pub pending: usize,
    pub ready: usize,
    pub firing: usize,
    pub adjusting: usize,
    pub complete: usize,
    pub cancelled: usize,
    pub queued: usize,
    pub rounds_fired: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum EventKind {
    FireCycleComplete,
}

#[derive(Debug, Clone)]
struct ScheduledEvent {
    at: f64,
    seq: u64,
    mission: MissionId,
    kind: EventKind,
}

/// 中隊ごとの射撃スロットと待ち行列
#[derive(Debug, Default)]
struct BatterySlot {
    active: Option<MissionId>,
    queue: VecDeque<MissionId>,
}

/// 射撃任務登録簿
pub struct FireMissionRegistry<C: IClock> {
    clock: C,
    solver: BallisticSolver,
    timing: CycleTiming,
    missions: Vec<FireMission>,
    slots: HashMap<String, BatterySlot>,
    events: Vec<ScheduledEvent>,
    event_counter: u64,
    history: Vec<FireRecord>,
}

impl<C: IClock> FireMissionRegistry<C> {
    /// サイクル時間が負・非有限の場合は作成できません
    pub fn new(clock: C, solver: BallisticSolver, timing: CycleTiming) -> Result<Self, FdcError> {
        timing.validate()?;
        Ok(Self {
            clock,
            solver,
            timing,
            missions: Vec::new(),
            slots: HashMap::new(),
            events: Vec::new(),
            event_counter: 0,
            history: Vec::new(),
        })
    }

    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn solver(&self) -> &BallisticSolver {
        &self.solver
    }

    pub fn timing(&self) -> &CycleTiming {
        &self.timing
    }

    /// 観測者の要求から任務を作成（Pending）
    pub fn create(&mut self, request: MissionRequest) -> Result<MissionId, FdcError> {
        request.validate()?;
        let id = MissionId(self.missions.len());
        let mission = FireMission::from_request(id, request, self.clock.now());
        debug!(
            "任務作成: {} (観測者: {}, 目標: {:.0}, {:.0}, 優先度: {:?})",
            id, mission.observer_id, mission.target.grid.easting, mission.target.grid.northing, mission.target.priority
        );
        self.missions.push(mission);
        Ok(id)
    }

    pub fn mission(&self, id: MissionId) -> Result<&FireMission, FdcError> {
        self.missions.get(id.0).ok_or(FdcError::UnknownMission(id))
    }

    pub fn missions(&self) -> impl Iterator<Item = &FireMission> {
        self.missions.iter()
    }

    fn mission_mut(&mut self, id: MissionId) -> Result<&mut FireMission, FdcError> {
        self.missions.get_mut(id.0).ok_or(FdcError::UnknownMission(id))
    }

    /// 射撃諸元を計算して任務に付与（Pending/Adjusting → Ready）
    ///
    /// 計算に失敗した場合、任務は呼び出し前の状態に戻り、エラーが返されます。
    pub fn request_solution(
        &mut self,
        id: MissionId,
        battery: &Battery,
        meteo: &MeteoSample,
    ) -> Result<FiringSolution, FdcError> {
        let mission = self.missions.get_mut(id.0).ok_or(FdcError::UnknownMission(id))?;
        if !matches!(mission.status, MissionStatus::Pending | MissionStatus::Adjusting) {
            return Err(FdcError::InvalidTransition {
                mission: id,
                status: mission.status,
                operation: "request_solution",
            });
        }
        if let Some(bound) = &mission.battery_id {
            if *bound != battery.id {
                return Err(FdcError::Validation(format!(
                    "任務 {} は中隊 {} に割り当て済みです", id, bound
                )));
            }
        }

        let prior_status = mission.status;
        let prior_solution = mission.solution.take();
        mission.status = MissionStatus::Computing;

        match self.solver.solve(battery, &mission.target, meteo) {
            Ok(solution) => {
                debug!(
                    "諸元確定: {} 方向 {:.1} 射角 {:.1} 装薬 {} 射程 {:.0}m",
                    id, solution.deflection_mils, solution.quadrant_elevation_mils, solution.charge, solution.range
                );
                mission.solution = Some(solution.clone());
                mission.battery_id = Some(battery.id.clone());
                mission.status = MissionStatus::Ready;
                Ok(solution)
            }
            Err(e) => {
                mission.status = prior_status;
                mission.solution = prior_solution;
                warn!("諸元計算失敗: {} ({})", id, e);
                Err(e)
            }
        }
    }

    /// 射撃号令を発する
    ///
    /// 残弾は中隊一覧の中隊から消費します。中隊のスロットが他の任務に使用されていれば
    /// 待ち行列に入ります。
    pub fn issue_fire_command(
        &mut self,
        id: MissionId,
        batteries: &mut BatteryCatalogue,
        battery_id: &str,
    ) -> Result<FireOutcome, FdcError> {
        let mission = self.mission(id)?;
        if mission.status != MissionStatus::Ready || mission.rounds_remaining() == 0 {
            return Err(FdcError::InvalidTransition {
                mission: id,
                status: mission.status,
                operation: "issue_fire_command",
            });
        }
        if let Some(bound) = &mission.battery_id {
            if bound != battery_id {
                warn!("射撃競合: {} は中隊 {} に割り当て済み (要求: {})", id, bound, battery_id);
                return Err(FdcError::ConcurrencyConflict {
                    mission: id,
                    battery: battery_id.to_string(),
                });
            }
        }
        let ammunition = mission.ammunition;
        let battery = batteries.require_mut(battery_id)?;

        if !battery.has_round(ammunition) {
            warn!("弾薬不足: {} 中隊 {} の {} が尽きています", id, battery.id, ammunition);
            let mission = self.mission_mut(id)?;
            mission.blocked = Some(BlockingCondition::AmmunitionExhausted {
                battery: battery.id.clone(),
                ammunition,
            });
            return Err(FdcError::ResourceUnavailable {
                battery: battery.id.clone(),
                ammunition,
            });
        }

        let slot = self.slots.entry(battery.id.clone()).or_default();
        if let Some(active) = slot.active {
            if active != id {
                if !slot.queue.contains(&id) {
                    slot.queue.push_back(id);
                }
                let position = slot.queue.iter().position(|m| *m == id).map_or(slot.queue.len(), |p| p + 1);
                debug!("待ち行列へ: {} 中隊 {} (順位 {}, 射撃中: {})", id, battery.id, position, active);
                let mission = self.mission_mut(id)?;
                mission.blocked = Some(BlockingCondition::AwaitingSlot {
                    battery: battery.id.clone(),
                });
                return Ok(FireOutcome::Queued { position });
            }
        }

        let now = self.clock.now();
        let command = self.fire_round(id, battery, now)?;
        Ok(FireOutcome::Fired(command))
    }

    /// 観測修正による目標グリッド更新（Adjustingのみ、状態は変えない）
    pub fn adjust_target(&mut self, id: MissionId, grid: Grid) -> Result<(), FdcError> {
        if !grid.is_finite() {
            return Err(FdcError::Validation("修正グリッドが非有限値です".to_string()));
        }
        let mission = self.mission_mut(id)?;
        if mission.status != MissionStatus::Adjusting {
            return Err(FdcError::InvalidTransition {
                mission: id,
                status: mission.status,
                operation: "adjust_target",
            });
        }
        debug!(
            "目標修正: {} ({:.0}, {:.0}) → ({:.0}, {:.0})",
            id, mission.target.grid.easting, mission.target.grid.northing, grid.easting, grid.northing
        );
        mission.target.grid = grid;
        Ok(())
    }

    /// 任務を中止
    ///
    /// スロットを保持していれば同じ呼び出しの中で解放し、次の待機任務が射撃に入ります。
    pub fn cancel(&mut self, id: MissionId, batteries: &mut BatteryCatalogue) -> Result<(), FdcError> {
        let mission = self.mission_mut(id)?;
        if mission.status.is_terminal() {
            return Err(FdcError::InvalidTransition {
                mission: id,
                status: mission.status,
                operation: "cancel",
            });
        }
        let previous = mission.status;
        mission.status = MissionStatus::Cancelled;
        mission.solution = None;
        mission.blocked = None;
        let bound = mission.battery_id.clone();
        info!("任務中止: {} ({:?} から)", id, previous);

        self.events.retain(|e| e.mission != id);
        for slot in self.slots.values_mut() {
            slot.queue.retain(|m| *m != id);
        }

        if let Some(battery_id) = bound {
            let held = self
                .slots
                .get_mut(&battery_id)
                .is_some_and(|slot| slot.active == Some(id));
            if held {
                if let Some(slot) = self.slots.get_mut(&battery_id) {
                    slot.active = None;
                }
                let now = self.clock.now();
                self.promote_next(&battery_id, batteries, now);
            }
        }
        Ok(())
    }

    /// 時計の現在時刻までに予定されたイベントをすべて処理
    ///
    /// 射撃サイクルを終えた任務のIDを処理順に返します。
    pub fn advance(&mut self, batteries: &mut BatteryCatalogue) -> Vec<MissionId> {
        let now = self.clock.now();
        let mut completed = Vec::new();

        while let Some(index) = self.next_due_event(now) {
            let event = self.events.swap_remove(index);
            match event.kind {
                EventKind::FireCycleComplete => {
                    if self.fire_cycle_complete(event.mission, event.at, batteries) {
                        completed.push(event.mission);
                    }
                }
            }
        }

        completed
    }

    /// 次に予定されているイベントの時刻
    pub fn next_event_time(&self) -> Option<f64> {
        self.events.iter().map(|e| e.at).min_by(|a, b| a.total_cmp(b))
    }

    fn next_due_event(&self, now: f64) -> Option<usize> {
        self.events
            .iter()
            .enumerate()
            .filter(|(_, e)| e.at <= now)
            .min_by(|(_, a), (_, b)| a.at.total_cmp(&b.at).then(a.seq.cmp(&b.seq)))
            .map(|(i, _)| i)
    }

    fn schedule(&mut self, mission: MissionId, at: f64, kind: EventKind) {
        self.event_counter += 1;
        self.events.push(ScheduledEvent {
            at,
            seq: self.event_counter,
            mission,
            kind,
        });
    }

    /// 射撃サイクル完了（Firing → Complete / Adjusting）
    fn fire_cycle_complete(&mut self, id: MissionId, at: f64, batteries: &mut BatteryCatalogue) -> bool {
        let Some(mission) = self.missions.get_mut(id.0) else {
            return false;
        };
        if mission.status != MissionStatus::Firing {
            warn!("射撃中でない任務のサイクル完了を無視: {} ({:?})", id, mission.status);
            return false;
        }

        mission.status = if mission.rounds_fired >= mission.rounds_requested {
            MissionStatus::Complete
        } else {
            MissionStatus::Adjusting
        };
        debug!(
            "射撃サイクル完了: {} 時刻 {:.1}秒 → {:?} ({}/{}発)",
            id, at, mission.status, mission.rounds_fired, mission.rounds_requested
        );

        let Some(battery_id) = mission.battery_id.clone() else {
            return true;
        };
        if let Some(slot) = self.slots.get_mut(&battery_id) {
            if slot.active == Some(id) {
                slot.active = None;
            }
        }
        self.promote_next(&battery_id, batteries, at);
        true
    }

    /// 空いたスロットを待ち行列の次の任務に渡す
    fn promote_next(&mut self, battery_id: &str, batteries: &mut BatteryCatalogue, now: f64) {
        let candidates: Vec<MissionId> = match self.slots.get(battery_id) {
            Some(slot) if slot.active.is_none() => {
                // 待ち行列の順序を保ったまま緊急目標を先に
                let (mut immediate, routine): (Vec<MissionId>, Vec<MissionId>) = slot
                    .queue
                    .iter()
                    .partition(|m| self.missions[m.0].target.priority == MissionPriority::Immediate);
                immediate.extend(routine);
                immediate
            }
            _ => return,
        };
        if candidates.is_empty() {
            return;
        }

        let Some(battery) = batteries.get_mut(battery_id) else {
            warn!("待機任務を射撃できません: 中隊 {} が見つかりません", battery_id);
            return;
        };

        for id in candidates {
            let mission = &mut self.missions[id.0];
            if mission.status != MissionStatus::Ready {
                continue;
            }
            if !battery.has_round(mission.ammunition) {
                warn!("待機任務 {} は {} の弾切れのため保留", id, mission.ammunition);
                mission.blocked = Some(BlockingCondition::AmmunitionExhausted {
                    battery: battery_id.to_string(),
                    ammunition: mission.ammunition,
                });
                continue;
            }
            match self.fire_round(id, battery, now) {
                Ok(_) => return,
                Err(e) => warn!("待機任務 {} の射撃に失敗: {}", id, e),
            }
        }
    }

    /// 1発射撃してスロットを確保し、サイクル完了を予約
    fn fire_round(&mut self, id: MissionId, battery: &mut Battery, now: f64) -> Result<FireCommand, FdcError> {
        let mission = self.missions.get_mut(id.0).ok_or(FdcError::UnknownMission(id))?;
        let Some(solution) = mission.solution.as_ref() else {
            return Err(FdcError::InvalidTransition {
                mission: id,
                status: mission.status,
                operation: "fire",
            });
        };

        battery.expend_round(mission.ammunition)?;
        mission.rounds_fired += ROUNDS_PER_COMMAND;
        mission.status = MissionStatus::Firing;
        mission.blocked = None;
        mission.battery_id = Some(battery.id.clone());

        let command = FireCommand::new(&battery.designation, solution, mission);
        let duration = self.timing.cycle_duration(mission.ammunition, &solution.charge);

        let slot = self.slots.entry(battery.id.clone()).or_default();
        slot.active = Some(id);
        slot.queue.retain(|m| *m != id);

        info!("射撃号令 [{}] {} (時刻 {:.1}秒)", id, command, now);
        self.history.push(FireRecord {
            timestamp: now,
            mission: id,
            battery_id: battery.id.clone(),
            command: command.clone(),
        });
        self.schedule(id, now + duration, EventKind::FireCycleComplete);
        Ok(command)
    }

    /// 中隊の射撃スロットを保持している任務
    pub fn active_mission(&self, battery_id: &str) -> Option<MissionId> {
        self.slots.get(battery_id).and_then(|s| s.active)
    }

    /// 中隊の待ち行列（FIFO順）
    pub fn queued_missions(&self, battery_id: &str) -> Vec<MissionId> {
        self.slots
            .get(battery_id)
            .map(|s| s.queue.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 任務の現在の諸元から射撃号令文を生成
    pub fn format_command(&self, id: MissionId, battery_designation: &str) -> Result<String, FdcError> {
        let mission = self.mission(id)?;
        let solution = mission.solution.as_ref().ok_or(FdcError::InvalidTransition {
            mission: id,
            status: mission.status,
            operation: "format_command",
        })?;
        Ok(FireCommand::new(battery_designation, solution, mission).to_string())
    }

    pub fn fire_history(&self) -> &[FireRecord] {
        &self.history
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            total_missions: self.missions.len(),
            queued: self.slots.values().map(|s| s.queue.len()).sum(),
            ..Default::default()
        };
        for mission in &self.missions {
            stats.rounds_fired += mission.rounds_fired;
            match mission.status {
                MissionStatus::Pending | MissionStatus::Computing => stats.pending += 1,
                MissionStatus::Ready => stats.ready += 1,
                MissionStatus::Firing => stats.firing += 1,
                MissionStatus::Adjusting => stats.adjusting += 1,
                MissionStatus::Complete => stats.complete += 1,
                MissionStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::clock::ManualClock;
    use crate::models::common::{FuzeType, MissionType};
    use crate::models::error::RangeError;
    use crate::models::firing_table::FiringTableRepository;
    use crate::models::mission::Target;
    use crate::models::solver::CorrectionParams;
    use std::sync::Arc;

    struct Fixture {
        clock: ManualClock,
        registry: FireMissionRegistry<ManualClock>,
        batteries: BatteryCatalogue,
        meteo: MeteoSample,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = ManualClock::new(0.0);
            let tables = Arc::new(FiringTableRepository::standard().unwrap());
            let solver = BallisticSolver::new(tables, CorrectionParams::default()).unwrap();
            let registry = FireMissionRegistry::new(clock.clone(), solver, CycleTiming::default()).unwrap();

            let mut batteries = BatteryCatalogue::new();
            for (id, designation) in [("B1", "ALPHA"), ("B2", "BRAVO")] {
                let mut rounds = HashMap::new();
                rounds.insert(AmmoType::HighExplosive, 10);
                rounds.insert(AmmoType::Smoke, 1);
                batteries
                    .add(Battery::new(id, designation, Grid::new(0.0, 0.0, 0.0), 0.0, 6, rounds))
                    .unwrap();
            }

            Self { clock, registry, batteries, meteo: MeteoSample::neutral() }
        }

        fn create(&mut self, northing: f64, priority: MissionPriority, ammunition: AmmoType, rounds: u32) -> MissionId {
            let request = MissionRequest {
                observer_id: "OP1".to_string(),
                target: Target::new(Grid::new(0.0, northing, 0.0), priority, "troops", ""),
                mission_type: MissionType::FireForEffect,
                ammunition,
                fuze: FuzeType::Quick,
                rounds_requested: rounds,
            };
            self.registry.create(request).unwrap()
        }

        fn ready(&mut self, id: MissionId, battery: &str) {
            let battery = self.batteries.require(battery).unwrap().clone();
            self.registry.request_solution(id, &battery, &self.meteo).unwrap();
        }

        fn fire(&mut self, id: MissionId, battery: &str) -> Result<FireOutcome, FdcError> {
            self.registry.issue_fire_command(id, &mut self.batteries, battery)
        }

        fn status(&self, id: MissionId) -> MissionStatus {
            self.registry.mission(id).unwrap().status
        }

        fn advance_to(&mut self, time: f64) -> Vec<MissionId> {
            self.clock.set(time);
            self.registry.advance(&mut self.batteries)
        }
    }

    #[test]
    fn test_single_round_lifecycle() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        assert_eq!(fx.status(m), MissionStatus::Pending);

        fx.ready(m, "B1");
        assert_eq!(fx.status(m), MissionStatus::Ready);
        assert!(fx.registry.mission(m).unwrap().solution.is_some());

        let command = match fx.fire(m, "B1").unwrap() {
            FireOutcome::Fired(command) => command,
            other => panic!("expected fired, got {:?}", other),
        };
        assert_eq!(command.battery, "ALPHA");
        assert_eq!(command.charge, "1");
        assert_eq!(fx.status(m), MissionStatus::Firing);
        assert_eq!(fx.registry.active_mission("B1"), Some(m));
        assert_eq!(fx.batteries.require("B1").unwrap().rounds_of(AmmoType::HighExplosive), 9);
        assert_eq!(fx.registry.next_event_time(), Some(20.0));

        assert!(fx.advance_to(19.9).is_empty());
        assert_eq!(fx.status(m), MissionStatus::Firing);

        assert_eq!(fx.advance_to(20.0), vec![m]);
        assert_eq!(fx.status(m), MissionStatus::Complete);
        assert!(fx.registry.mission(m).unwrap().solution.is_some());
        assert_eq!(fx.registry.active_mission("B1"), None);
    }

    #[test]
    fn test_adjust_then_refire_until_complete() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 2);
        fx.ready(m, "B1");
        fx.fire(m, "B1").unwrap();
        fx.advance_to(20.0);
        assert_eq!(fx.status(m), MissionStatus::Adjusting);
        assert_eq!(fx.registry.active_mission("B1"), None);

        // Adjusting中は再計算が必要
        assert!(matches!(fx.fire(m, "B1"), Err(FdcError::InvalidTransition { .. })));

        fx.registry.adjust_target(m, Grid::new(100.0, 2100.0, 0.0)).unwrap();
        assert_eq!(fx.status(m), MissionStatus::Adjusting);
        fx.ready(m, "B1");
        assert!(fx.registry.mission(m).unwrap().solution.as_ref().unwrap().deflection_mils > 0.0);

        fx.fire(m, "B1").unwrap();
        fx.advance_to(40.0);
        let mission = fx.registry.mission(m).unwrap();
        assert_eq!(mission.status, MissionStatus::Complete);
        assert_eq!(mission.rounds_fired, 2);
        assert!(matches!(fx.fire(m, "B1"), Err(FdcError::InvalidTransition { .. })));
    }

    #[test]
    fn test_range_exceeded_leaves_mission_pending() {
        let mut fx = Fixture::new();
        let m = fx.create(30000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let battery = fx.batteries.require("B1").unwrap().clone();
        let result = fx.registry.request_solution(m, &battery, &fx.meteo);
        assert!(matches!(result, Err(FdcError::Range(RangeError::Exceeded { .. }))));
        let mission = fx.registry.mission(m).unwrap();
        assert_eq!(mission.status, MissionStatus::Pending);
        assert!(mission.solution.is_none());
        assert!(mission.battery_id.is_none());
    }

    #[test]
    fn test_failed_resolve_restores_adjusting_solution() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 2);
        fx.ready(m, "B1");
        fx.fire(m, "B1").unwrap();
        fx.advance_to(20.0);
        let before = fx.registry.mission(m).unwrap().solution.clone();

        fx.registry.adjust_target(m, Grid::new(0.0, 50000.0, 0.0)).unwrap();
        let battery = fx.batteries.require("B1").unwrap().clone();
        assert!(fx.registry.request_solution(m, &battery, &fx.meteo).is_err());
        let mission = fx.registry.mission(m).unwrap();
        assert_eq!(mission.status, MissionStatus::Adjusting);
        assert_eq!(mission.solution, before);
    }

    #[test]
    fn test_queue_prefers_immediate_targets() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m2 = fx.create(2500.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m3 = fx.create(3000.0, MissionPriority::Immediate, AmmoType::HighExplosive, 1);
        for m in [m1, m2, m3] {
            fx.ready(m, "B1");
        }

        assert!(matches!(fx.fire(m1, "B1"), Ok(FireOutcome::Fired(_))));
        assert_eq!(fx.fire(m2, "B1"), Ok(FireOutcome::Queued { position: 1 }));
        assert_eq!(fx.fire(m3, "B1"), Ok(FireOutcome::Queued { position: 2 }));
        assert_eq!(fx.status(m2), MissionStatus::Ready);
        assert_eq!(
            fx.registry.mission(m2).unwrap().blocked,
            Some(BlockingCondition::AwaitingSlot { battery: "B1".to_string() })
        );

        fx.advance_to(20.0);
        assert_eq!(fx.status(m1), MissionStatus::Complete);
        assert_eq!(fx.status(m3), MissionStatus::Firing);
        assert_eq!(fx.status(m2), MissionStatus::Ready);
        assert_eq!(fx.registry.queued_missions("B1"), vec![m2]);
    }

    #[test]
    fn test_cancel_firing_mission_promotes_next_in_same_call() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 3);
        let m2 = fx.create(2500.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        fx.ready(m1, "B1");
        fx.ready(m2, "B1");
        fx.fire(m1, "B1").unwrap();
        fx.fire(m2, "B1").unwrap();

        fx.clock.set(5.0);
        fx.registry.cancel(m1, &mut fx.batteries).unwrap();
        let cancelled = fx.registry.mission(m1).unwrap();
        assert_eq!(cancelled.status, MissionStatus::Cancelled);
        assert!(cancelled.solution.is_none());
        assert_eq!(fx.status(m2), MissionStatus::Firing);
        assert_eq!(fx.registry.active_mission("B1"), Some(m2));

        // 中止した任務のサイクル完了は取り消されている
        assert!(fx.advance_to(20.0).is_empty());
        assert_eq!(fx.advance_to(25.0), vec![m2]);
        assert_eq!(fx.status(m2), MissionStatus::Complete);

        assert!(matches!(
            fx.registry.cancel(m1, &mut fx.batteries),
            Err(FdcError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_cancel_queued_mission_leaves_queue() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m2 = fx.create(2500.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        fx.ready(m1, "B1");
        fx.ready(m2, "B1");
        fx.fire(m1, "B1").unwrap();
        fx.fire(m2, "B1").unwrap();

        fx.registry.cancel(m2, &mut fx.batteries).unwrap();
        assert!(fx.registry.queued_missions("B1").is_empty());
        assert_eq!(fx.registry.active_mission("B1"), Some(m1));
        fx.advance_to(20.0);
        assert_eq!(fx.status(m2), MissionStatus::Cancelled);
        assert_eq!(fx.registry.active_mission("B1"), None);
    }

    #[test]
    fn test_resource_unavailable_then_resupply() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::Smoke, 1);
        let m2 = fx.create(2000.0, MissionPriority::Routine, AmmoType::Smoke, 1);
        fx.ready(m1, "B1");
        fx.ready(m2, "B1");
        fx.fire(m1, "B1").unwrap();
        fx.advance_to(20.0);

        let result = fx.fire(m2, "B1");
        assert!(matches!(result, Err(FdcError::ResourceUnavailable { .. })));
        let mission = fx.registry.mission(m2).unwrap();
        assert_eq!(mission.status, MissionStatus::Ready);
        assert!(matches!(mission.blocked, Some(BlockingCondition::AmmunitionExhausted { .. })));
        assert_eq!(fx.batteries.require("B1").unwrap().rounds_of(AmmoType::Smoke), 0);

        fx.batteries.require_mut("B1").unwrap().resupply(AmmoType::Smoke, 2);
        assert!(matches!(fx.fire(m2, "B1"), Ok(FireOutcome::Fired(_))));
        assert!(fx.registry.mission(m2).unwrap().blocked.is_none());
    }

    #[test]
    fn test_promotion_skips_missions_without_ammunition() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m2 = fx.create(2000.0, MissionPriority::Routine, AmmoType::Smoke, 1);
        let m3 = fx.create(2000.0, MissionPriority::Routine, AmmoType::Smoke, 1);
        let m4 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        for m in [m1, m2, m3, m4] {
            fx.ready(m, "B1");
        }
        fx.fire(m1, "B1").unwrap();
        for m in [m2, m3, m4] {
            assert!(matches!(fx.fire(m, "B1"), Ok(FireOutcome::Queued { .. })));
        }

        fx.advance_to(20.0);
        assert_eq!(fx.status(m2), MissionStatus::Firing);
        fx.advance_to(40.0);
        assert_eq!(fx.status(m3), MissionStatus::Ready);
        assert!(matches!(
            fx.registry.mission(m3).unwrap().blocked,
            Some(BlockingCondition::AmmunitionExhausted { .. })
        ));
        assert_eq!(fx.status(m4), MissionStatus::Firing);
        assert_eq!(fx.registry.queued_missions("B1"), vec![m3]);
    }

    #[test]
    fn test_fire_on_other_battery_is_conflict() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        fx.ready(m, "B1");

        let result = fx.fire(m, "B2");
        assert!(matches!(result, Err(FdcError::ConcurrencyConflict { .. })));
        assert_eq!(fx.status(m), MissionStatus::Ready);
        assert_eq!(fx.batteries.require("B2").unwrap().rounds_of(AmmoType::HighExplosive), 10);
        assert_eq!(fx.registry.active_mission("B2"), None);
    }

    #[test]
    fn test_batteries_fire_independently() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m2 = fx.create(2500.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        fx.ready(m1, "B1");
        fx.ready(m2, "B2");
        assert!(matches!(fx.fire(m1, "B1"), Ok(FireOutcome::Fired(_))));
        assert!(matches!(fx.fire(m2, "B2"), Ok(FireOutcome::Fired(_))));
        assert_eq!(fx.registry.active_mission("B1"), Some(m1));
        assert_eq!(fx.registry.active_mission("B2"), Some(m2));
    }

    #[test]
    fn test_advance_drains_chained_events_in_order() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m2 = fx.create(2500.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        fx.ready(m1, "B1");
        fx.ready(m2, "B1");
        fx.fire(m1, "B1").unwrap();
        fx.fire(m2, "B1").unwrap();

        assert_eq!(fx.advance_to(100.0), vec![m1, m2]);
        let times: Vec<f64> = fx.registry.fire_history().iter().map(|r| r.timestamp).collect();
        assert_eq!(times, vec![0.0, 20.0]);
        assert_eq!(fx.registry.next_event_time(), None);
    }

    #[test]
    fn test_invalid_operations_do_not_mutate() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);

        assert!(matches!(fx.fire(m, "B1"), Err(FdcError::InvalidTransition { .. })));
        assert!(matches!(
            fx.registry.adjust_target(m, Grid::new(0.0, 2100.0, 0.0)),
            Err(FdcError::InvalidTransition { .. })
        ));
        assert_eq!(fx.status(m), MissionStatus::Pending);

        fx.ready(m, "B1");
        let battery = fx.batteries.require("B1").unwrap().clone();
        assert!(matches!(
            fx.registry.request_solution(m, &battery, &fx.meteo),
            Err(FdcError::InvalidTransition { .. })
        ));

        let bad = MissionRequest {
            observer_id: "OP1".to_string(),
            target: Target::new(Grid::new(0.0, 2000.0, 0.0), MissionPriority::Routine, "troops", ""),
            mission_type: MissionType::AdjustFire,
            ammunition: AmmoType::HighExplosive,
            fuze: FuzeType::Quick,
            rounds_requested: 0,
        };
        assert!(matches!(fx.registry.create(bad), Err(FdcError::Validation(_))));
        assert_eq!(fx.registry.missions().count(), 1);
        assert!(matches!(fx.registry.mission(MissionId(9)), Err(FdcError::UnknownMission(_))));
    }

    #[test]
    fn test_stats_and_format_command() {
        let mut fx = Fixture::new();
        let m1 = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m2 = fx.create(2500.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let m3 = fx.create(2500.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        fx.ready(m1, "B1");
        fx.ready(m2, "B1");
        fx.fire(m1, "B1").unwrap();
        fx.fire(m2, "B1").unwrap();

        let stats = fx.registry.stats();
        assert_eq!(stats.total_missions, 3);
        assert_eq!(stats.firing, 1);
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.rounds_fired, 1);

        let text = fx.registry.format_command(m1, "ALPHA").unwrap();
        assert!(text.starts_with("BATTERY ALPHA FIRE DEFLECTION 0000 QUADRANT "));
        assert!(fx.registry.format_command(m3, "ALPHA").is_err());
    }

    #[test]
    fn test_history_rounds_match_rounds_fired() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 3);
        for cycle in 1..=3 {
            fx.ready(m, "B1");
            assert!(matches!(fx.fire(m, "B1"), Ok(FireOutcome::Fired(_))));
            fx.advance_to(20.0 * cycle as f64);
        }

        let mission = fx.registry.mission(m).unwrap();
        assert_eq!(mission.status, MissionStatus::Complete);
        let history = fx.registry.fire_history();
        assert_eq!(history.len(), 3);
        let logged: u32 = history.iter().map(|r| r.command.rounds).sum();
        assert_eq!(logged, mission.rounds_fired);
        assert!(history.iter().all(|r| r.command.to_string().ends_with("ROUNDS 1")));
        assert_eq!(fx.batteries.require("B1").unwrap().rounds_of(AmmoType::HighExplosive), 7);
    }

    #[test]
    fn test_rejects_unbounded_cycle_timing() {
        let tables = Arc::new(FiringTableRepository::standard().unwrap());
        let solver = BallisticSolver::new(tables, CorrectionParams::default()).unwrap();
        let timing = CycleTiming {
            default_s: f64::INFINITY,
            ..CycleTiming::default()
        };
        let result = FireMissionRegistry::new(ManualClock::new(0.0), solver.clone(), timing);
        assert!(matches!(result, Err(FdcError::Validation(_))));

        let mut negative = CycleTiming::default();
        negative.by_ammunition.insert(AmmoType::Smoke, -5.0);
        assert!(FireMissionRegistry::new(ManualClock::new(0.0), solver, negative).is_err());
    }

    #[test]
    fn test_fire_draws_from_catalogue_stock() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::Smoke, 1);
        fx.ready(m, "B1");

        assert!(matches!(fx.fire(m, "B9"), Err(FdcError::ConcurrencyConflict { .. })));
        assert!(matches!(fx.fire(m, "B1"), Ok(FireOutcome::Fired(_))));
        assert_eq!(fx.batteries.require("B1").unwrap().rounds_of(AmmoType::Smoke), 0);
        assert_eq!(fx.batteries.require("B2").unwrap().rounds_of(AmmoType::Smoke), 1);
    }

    #[test]
    fn test_fire_on_missing_battery_changes_nothing() {
        let mut fx = Fixture::new();
        let m = fx.create(2000.0, MissionPriority::Routine, AmmoType::HighExplosive, 1);
        let battery = fx.batteries.require("B1").unwrap().clone();
        fx.registry.request_solution(m, &battery, &fx.meteo).unwrap();
        fx.batteries = BatteryCatalogue::new();

        assert!(matches!(fx.fire(m, "B1"), Err(FdcError::UnknownBattery(_))));
        assert_eq!(fx.status(m), MissionStatus::Ready);
        assert_eq!(fx.registry.active_mission("B1"), None);
    }
}
