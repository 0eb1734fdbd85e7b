use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::models::traits::IClock;

/// 手動で進める時計
///
/// クローンは同じ時刻を共有するため、登録簿に渡した後も呼び出し側から進められます。
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    current: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_time: f64) -> Self {
        Self {
            current: Rc::new(Cell::new(start_time)),
        }
    }

    /// 指定時刻に設定（巻き戻しは無視）
    pub fn set(&self, time: f64) {
        if time > self.current.get() {
            self.current.set(time);
        }
    }

    /// dt秒進める
    pub fn advance(&self, dt: f64) {
        if dt > 0.0 {
            self.current.set(self.current.get() + dt);
        }
    }
}

impl IClock for ManualClock {
    fn now(&self) -> f64 {
        self.current.get()
    }
}

/// 実時間に追従する時計（対話型訓練用）
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    origin: Instant,
}

impl WallClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl IClock for WallClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}
