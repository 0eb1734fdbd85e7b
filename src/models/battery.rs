use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::models::common::{AmmoType, Grid};
use crate::models::error::FdcError;

/// 中隊の運用状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatteryStatus {
    #[default]
    Operational, // 射撃可能
    Displacing,  // 陣地変換中
    OutOfAction, // 戦闘不能
}

/// 射撃中隊
///
/// 呼び出し側が所有し、エンジンは射撃時の残弾数のみを変更します。
#[derive(Debug, Clone)]
pub struct Battery {
    pub id: String,
    pub designation: String,
    pub position: Grid,
    pub reference_azimuth_mils: f64, // 基準方位角
    pub gun_count: u32,
    pub rounds_available: HashMap<AmmoType, u32>,
    pub status: BatteryStatus,
}

impl Battery {
    pub fn new(
        id: impl Into<String>,
        designation: impl Into<String>,
        position: Grid,
        reference_azimuth_mils: f64,
        gun_count: u32,
        rounds_available: HashMap<AmmoType, u32>,
    ) -> Self {
        Self {
            id: id.into(),
            designation: designation.into(),
            position,
            reference_azimuth_mils,
            gun_count,
            rounds_available,
            status: BatteryStatus::Operational,
        }
    }

    /// 指定弾種の残弾数
    pub fn rounds_of(&self, ammunition: AmmoType) -> u32 {
        self.rounds_available.get(&ammunition).copied().unwrap_or(0)
    }

    pub fn has_round(&self, ammunition: AmmoType) -> bool {
        self.rounds_of(ammunition) > 0
    }

    /// 1発消費（残弾がなければ失敗し、何も変更しない）
    pub(crate) fn expend_round(&mut self, ammunition: AmmoType) -> Result<(), FdcError> {
        match self.rounds_available.get_mut(&ammunition) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Ok(())
            }
            _ => Err(FdcError::ResourceUnavailable {
                battery: self.id.clone(),
                ammunition,
            }),
        }
    }

    /// 弾薬補給
    pub fn resupply(&mut self, ammunition: AmmoType, count: u32) {
        let stock = self.rounds_available.entry(ammunition).or_insert(0);
        *stock = stock.saturating_add(count);
    }

    /// 全弾種の残弾合計
    pub fn total_rounds(&self) -> u32 {
        self.rounds_available.values().sum()
    }
}

/// セッション中の中隊一覧
///
/// 中隊同士は状態を共有せず、IDで引き当てます。
#[derive(Debug, Clone, Default)]
pub struct BatteryCatalogue {
    batteries: BTreeMap<String, Battery>,
}

impl BatteryCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, battery: Battery) -> Result<(), FdcError> {
        if self.batteries.contains_key(&battery.id) {
            return Err(FdcError::Validation(format!("中隊IDが重複しています: {}", battery.id)));
        }
        self.batteries.insert(battery.id.clone(), battery);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Battery> {
        self.batteries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Battery> {
        self.batteries.get_mut(id)
    }

    pub fn require(&self, id: &str) -> Result<&Battery, FdcError> {
        self.get(id).ok_or_else(|| FdcError::UnknownBattery(id.to_string()))
    }

    pub fn require_mut(&mut self, id: &str) -> Result<&mut Battery, FdcError> {
        self.get_mut(id).ok_or_else(|| FdcError::UnknownBattery(id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Battery> {
        self.batteries.values()
    }

    pub fn len(&self) -> usize {
        self.batteries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batteries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn battery() -> Battery {
        let mut rounds = HashMap::new();
        rounds.insert(AmmoType::HighExplosive, 1);
        Battery::new("B1", "ALPHA", Grid::new(0.0, 0.0, 0.0), 0.0, 6, rounds)
    }

    #[test]
    fn test_expend_round_never_negative() {
        let mut b = battery();
        assert!(b.expend_round(AmmoType::HighExplosive).is_ok());
        assert_eq!(b.rounds_of(AmmoType::HighExplosive), 0);
        let err = b.expend_round(AmmoType::HighExplosive).unwrap_err();
        assert!(matches!(err, FdcError::ResourceUnavailable { .. }));
        assert_eq!(b.rounds_of(AmmoType::HighExplosive), 0);
        assert!(b.expend_round(AmmoType::Smoke).is_err());
    }

    #[test]
    fn test_resupply() {
        let mut b = battery();
        b.resupply(AmmoType::Smoke, 4);
        b.resupply(AmmoType::HighExplosive, 2);
        assert_eq!(b.rounds_of(AmmoType::Smoke), 4);
        assert_eq!(b.rounds_of(AmmoType::HighExplosive), 3);
        assert_eq!(b.total_rounds(), 7);
    }

    #[test]
    fn test_catalogue_rejects_duplicates() {
        let mut catalogue = BatteryCatalogue::new();
        catalogue.add(battery()).unwrap();
        assert!(catalogue.add(battery()).is_err());
        assert!(catalogue.require("B1").is_ok());
        assert!(matches!(catalogue.require("B9"), Err(FdcError::UnknownBattery(_))));
    }
}
