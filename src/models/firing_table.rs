//! # FiringTable モジュール
//!
//! 装薬ごとの射表（射程 → 射角・飛翔時間）と射程範囲を保持し、
//! 装薬選定と線形補間を提供します。
//!
//! 射表は装薬の低い順に並び、各装薬の射程範囲は後退せず、隙間なく連続している
//! 必要があります。この条件により、射程が伸びても選定される装薬は下がりません。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::error::{FdcError, RangeError};

/// 射表の1行
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct FiringTableEntry {
    /// 射程（m）
    pub range: f64,
    /// 射角（ミル）
    pub elevation_mils: f64,
    /// 飛翔時間（秒）
    pub time_of_flight_s: f64,
}

impl FiringTableEntry {
    pub fn new(range: f64, elevation_mils: f64, time_of_flight_s: f64) -> Self {
        Self { range, elevation_mils, time_of_flight_s }
    }
}

/// 装薬の識別子
///
/// `rank`は低装薬から0始まりの序列です。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Charge {
    pub rank: usize,
    pub designation: String,
}

impl fmt::Display for Charge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.designation)
    }
}

/// 射表の入力定義（シナリオファイルからも読み込まれる）
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChargeTableSpec {
    pub designation: String,
    /// 省略時は射表の最小射程
    #[serde(default)]
    pub min_range_m: Option<f64>,
    /// 省略時は射表の最大射程
    #[serde(default)]
    pub max_range_m: Option<f64>,
    /// 空気密度偏差1%あたりの射角補正（ミル）
    #[serde(default)]
    pub density_coeff_mils_per_pct: f64,
    /// 装薬温度が標準から外れた場合の射角補正（ミル）
    #[serde(default)]
    pub propellant_coeff_mils: f64,
    pub entries: Vec<FiringTableEntry>,
}

/// 1装薬分の検証済み射表
#[derive(Debug, Clone)]
pub struct ChargeTable {
    pub charge: Charge,
    pub min_range: f64,
    pub max_range: f64,
    pub density_coeff_mils_per_pct: f64,
    pub propellant_coeff_mils: f64,
    entries: Vec<FiringTableEntry>,
}

impl ChargeTable {
    fn from_spec(rank: usize, spec: ChargeTableSpec) -> Result<Self, FdcError> {
        let name = &spec.designation;
        if name.trim().is_empty() || name.contains(char::is_whitespace) {
            return Err(FdcError::FiringTable(format!("装薬名が不正です: '{}'", name)));
        }
        if spec.entries.len() < 2 {
            return Err(FdcError::FiringTable(format!("装薬 {} の射表は2行以上必要です", name)));
        }
        for entry in &spec.entries {
            if !(entry.range.is_finite() && entry.elevation_mils.is_finite() && entry.time_of_flight_s.is_finite()) {
                return Err(FdcError::FiringTable(format!("装薬 {} の射表に非有限値があります", name)));
            }
        }
        if spec.entries.windows(2).any(|w| w[1].range <= w[0].range) {
            return Err(FdcError::FiringTable(format!(
                "装薬 {} の射表は射程の昇順（重複なし）でなければなりません", name
            )));
        }

        let first = spec.entries[0].range;
        let last = spec.entries[spec.entries.len() - 1].range;
        let min_range = spec.min_range_m.unwrap_or(first);
        let max_range = spec.max_range_m.unwrap_or(last);
        if !(min_range.is_finite() && max_range.is_finite()) || min_range < first || max_range > last || min_range >= max_range {
            return Err(FdcError::FiringTable(format!(
                "装薬 {} の射程範囲 [{}, {}] が射表 [{}, {}] に収まっていません",
                name, min_range, max_range, first, last
            )));
        }
        if min_range <= 0.0 {
            return Err(FdcError::FiringTable(format!("装薬 {} の最小射程は正でなければなりません", name)));
        }
        if !(spec.density_coeff_mils_per_pct.is_finite() && spec.propellant_coeff_mils.is_finite()) {
            return Err(FdcError::FiringTable(format!("装薬 {} の補正係数に非有限値があります", name)));
        }

        Ok(Self {
            charge: Charge { rank, designation: spec.designation },
            min_range,
            max_range,
            density_coeff_mils_per_pct: spec.density_coeff_mils_per_pct,
            propellant_coeff_mils: spec.propellant_coeff_mils,
            entries: spec.entries,
        })
    }

    pub fn entries(&self) -> &[FiringTableEntry] {
        &self.entries
    }

    pub fn covers(&self, range: f64) -> bool {
        range >= self.min_range && range <= self.max_range
    }

    /// 挟み込む2行から射角と飛翔時間を線形補間
    pub fn interpolate(&self, range: f64) -> Result<(f64, f64), FdcError> {
        if !range.is_finite() {
            return Err(FdcError::Validation(format!("射程が非有限値です: {}", range)));
        }
        let first = self.entries[0];
        let last = self.entries[self.entries.len() - 1];
        if range < first.range {
            return Err(RangeError::TooShort { range, min: first.range }.into());
        }
        if range > last.range {
            return Err(RangeError::Exceeded { range, max: last.range }.into());
        }

        // range以上の最初の行。行ちょうどの射程はそのまま返す
        let upper = self.entries.partition_point(|e| e.range < range);
        let hi = self.entries[upper];
        if hi.range == range || upper == 0 {
            return Ok((hi.elevation_mils, hi.time_of_flight_s));
        }
        let lo = self.entries[upper - 1];
        let t = (range - lo.range) / (hi.range - lo.range);
        let elevation = lo.elevation_mils + t * (hi.elevation_mils - lo.elevation_mils);
        let tof = lo.time_of_flight_s + t * (hi.time_of_flight_s - lo.time_of_flight_s);
        Ok((elevation, tof))
    }
}

/// 装薬別射表リポジトリ
///
/// セッションごとに1回作成され、以降は読み取り専用です。
#[derive(Debug, Clone)]
pub struct FiringTableRepository {
    tables: Vec<ChargeTable>,
}

impl FiringTableRepository {
    /// 低装薬から順に並んだ射表定義からリポジトリを構築
    pub fn new(specs: Vec<ChargeTableSpec>) -> Result<Self, FdcError> {
        if specs.is_empty() {
            return Err(FdcError::FiringTable("射表が1つもありません".to_string()));
        }

        let tables = specs
            .into_iter()
            .enumerate()
            .map(|(rank, spec)| ChargeTable::from_spec(rank, spec))
            .collect::<Result<Vec<_>, _>>()?;

        for pair in tables.windows(2) {
            let (lower, higher) = (&pair[0], &pair[1]);
            if higher.charge.designation == lower.charge.designation {
                return Err(FdcError::FiringTable(format!("装薬 {} が重複しています", lower.charge)));
            }
            if higher.min_range < lower.min_range || higher.max_range <= lower.max_range {
                return Err(FdcError::FiringTable(format!(
                    "装薬 {} の射程範囲が装薬 {} より後退しています", higher.charge, lower.charge
                )));
            }
            if higher.min_range > lower.max_range {
                return Err(FdcError::FiringTable(format!(
                    "装薬 {} と {} の間に射程の空白があります", lower.charge, higher.charge
                )));
            }
        }

        Ok(Self { tables })
    }

    /// 訓練用の標準射表（装薬1〜4とSUPER）
    pub fn standard() -> Result<Self, FdcError> {
        let spec = |name: &str, density: f64, propellant: f64, rows: &[(f64, f64, f64)]| ChargeTableSpec {
            designation: name.to_string(),
            min_range_m: None,
            max_range_m: None,
            density_coeff_mils_per_pct: density,
            propellant_coeff_mils: propellant,
            entries: rows.iter().map(|&(r, e, t)| FiringTableEntry::new(r, e, t)).collect(),
        };

        let specs = vec![
            spec("1", 1.5, 3.0, &[(1000.0, 120.0, 6.0), (2000.0, 260.0, 12.5), (3000.0, 430.0, 19.5), (4000.0, 640.0, 27.5)]),
            spec("2", 2.0, 4.0, &[(2000.0, 150.0, 8.0), (3000.0, 240.0, 12.5), (4000.0, 345.0, 17.5), (5000.0, 465.0, 23.0), (6000.0, 610.0, 29.0)]),
            spec("3", 2.5, 5.0, &[(3000.0, 140.0, 9.0), (5000.0, 270.0, 16.0), (7000.0, 430.0, 24.0), (9000.0, 640.0, 33.0)]),
            spec("4", 3.0, 6.0, &[(5000.0, 150.0, 13.0), (7000.0, 230.0, 18.5), (9000.0, 325.0, 24.5), (11000.0, 440.0, 31.0), (13000.0, 580.0, 38.5)]),
            spec("SUPER", 3.5, 7.0, &[(8000.0, 160.0, 17.0), (10000.0, 215.0, 21.5), (12000.0, 280.0, 26.5), (14000.0, 355.0, 32.0), (16000.0, 445.0, 38.0), (18000.0, 550.0, 45.0)]),
        ];

        Self::new(specs)
    }

    pub fn charges(&self) -> impl Iterator<Item = &Charge> {
        self.tables.iter().map(|t| &t.charge)
    }

    pub fn table(&self, charge: &Charge) -> Option<&ChargeTable> {
        self.tables.get(charge.rank).filter(|t| t.charge == *charge)
    }

    pub fn find_designation(&self, designation: &str) -> Option<&ChargeTable> {
        self.tables.iter().find(|t| t.charge.designation == designation)
    }

    /// 全装薬を通じた最小射程
    pub fn min_range(&self) -> f64 {
        self.tables[0].min_range
    }

    /// 全装薬を通じた最大射程
    pub fn max_range(&self) -> f64 {
        self.tables[self.tables.len() - 1].max_range
    }

    /// 射程を含む最小の装薬を選定
    pub fn select_charge(&self, range: f64) -> Result<&ChargeTable, FdcError> {
        if !range.is_finite() {
            return Err(FdcError::Validation(format!("射程が非有限値です: {}", range)));
        }
        if range < self.min_range() {
            return Err(RangeError::TooShort { range, min: self.min_range() }.into());
        }
        if range > self.max_range() {
            return Err(RangeError::Exceeded { range, max: self.max_range() }.into());
        }
        self.tables
            .iter()
            .find(|t| t.covers(range))
            .ok_or_else(|| FdcError::FiringTable(format!("射程 {:.1}m を含む装薬がありません", range)))
    }

    /// 指定装薬の射表で補間
    pub fn interpolate(&self, charge: &Charge, range: f64) -> Result<(f64, f64), FdcError> {
        let table = self
            .table(charge)
            .ok_or_else(|| FdcError::FiringTable(format!("未知の装薬: {}", charge)))?;
        table.interpolate(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_row(name: &str, rows: [(f64, f64, f64); 2]) -> ChargeTableSpec {
        ChargeTableSpec {
            designation: name.to_string(),
            min_range_m: None,
            max_range_m: None,
            density_coeff_mils_per_pct: 0.0,
            propellant_coeff_mils: 0.0,
            entries: rows.iter().map(|&(r, e, t)| FiringTableEntry::new(r, e, t)).collect(),
        }
    }

    #[test]
    fn test_interpolate_midpoint_and_endpoints() {
        let repo = FiringTableRepository::new(vec![two_row("3", [(1000.0, 1100.0, 22.0), (2000.0, 900.0, 35.0)])]).unwrap();
        let charge = repo.charges().next().unwrap().clone();

        let (elev, tof) = repo.interpolate(&charge, 1500.0).unwrap();
        assert!((elev - 1000.0).abs() < 1e-9);
        assert!((tof - 28.5).abs() < 1e-9);

        assert_eq!(repo.interpolate(&charge, 1000.0).unwrap(), (1100.0, 22.0));
        assert_eq!(repo.interpolate(&charge, 2000.0).unwrap(), (900.0, 35.0));
    }

    #[test]
    fn test_interpolate_exact_interior_row() {
        let repo = FiringTableRepository::standard().unwrap();
        let charge = repo.find_designation("2").unwrap().charge.clone();
        assert_eq!(repo.interpolate(&charge, 4000.0).unwrap(), (345.0, 17.5));
    }

    #[test]
    fn test_select_smallest_covering_charge() {
        let repo = FiringTableRepository::standard().unwrap();
        assert_eq!(repo.select_charge(1500.0).unwrap().charge.designation, "1");
        // 装薬1と2が重なる範囲では低い方
        assert_eq!(repo.select_charge(3500.0).unwrap().charge.designation, "1");
        assert_eq!(repo.select_charge(4500.0).unwrap().charge.designation, "2");
        assert_eq!(repo.select_charge(18000.0).unwrap().charge.designation, "SUPER");
    }

    #[test]
    fn test_select_charge_range_errors() {
        let repo = FiringTableRepository::standard().unwrap();
        assert!(matches!(repo.select_charge(500.0), Err(FdcError::Range(RangeError::TooShort { .. }))));
        assert!(matches!(repo.select_charge(18000.1), Err(FdcError::Range(RangeError::Exceeded { .. }))));
        assert!(matches!(repo.select_charge(f64::NAN), Err(FdcError::Validation(_))));
    }

    #[test]
    fn test_charge_selection_is_monotonic() {
        let repo = FiringTableRepository::standard().unwrap();
        let mut previous = 0;
        let mut range = repo.min_range();
        while range <= repo.max_range() {
            let rank = repo.select_charge(range).unwrap().charge.rank;
            assert!(rank >= previous, "range {} selected rank {} after {}", range, rank, previous);
            previous = rank;
            range += 37.0;
        }
    }

    #[test]
    fn test_rejects_invalid_tables() {
        assert!(FiringTableRepository::new(vec![]).is_err());

        let single = ChargeTableSpec {
            entries: vec![FiringTableEntry::new(1000.0, 100.0, 5.0)],
            ..two_row("1", [(0.0, 0.0, 0.0); 2])
        };
        assert!(FiringTableRepository::new(vec![single]).is_err());

        let duplicate = two_row("1", [(1000.0, 100.0, 5.0), (1000.0, 120.0, 6.0)]);
        assert!(FiringTableRepository::new(vec![duplicate]).is_err());

        let gap = vec![
            two_row("1", [(1000.0, 100.0, 5.0), (2000.0, 200.0, 10.0)]),
            two_row("2", [(3000.0, 100.0, 8.0), (5000.0, 300.0, 15.0)]),
        ];
        assert!(FiringTableRepository::new(gap).is_err());

        let regressing = vec![
            two_row("1", [(1000.0, 100.0, 5.0), (4000.0, 400.0, 20.0)]),
            two_row("2", [(2000.0, 100.0, 8.0), (3000.0, 300.0, 15.0)]),
        ];
        assert!(FiringTableRepository::new(regressing).is_err());
    }

    #[test]
    fn test_explicit_bounds_inside_table() {
        let mut spec = two_row("1", [(1000.0, 100.0, 5.0), (3000.0, 300.0, 15.0)]);
        spec.min_range_m = Some(1200.0);
        spec.max_range_m = Some(2800.0);
        let repo = FiringTableRepository::new(vec![spec.clone()]).unwrap();
        assert!(matches!(repo.select_charge(1100.0), Err(FdcError::Range(RangeError::TooShort { .. }))));

        spec.max_range_m = Some(3500.0);
        assert!(FiringTableRepository::new(vec![spec]).is_err());
    }
}
