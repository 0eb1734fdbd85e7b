/// 登録簿の予定イベントを駆動する時刻源のインターフェース
pub trait IClock {
    /// 現在時刻（セッション開始からの秒）
    fn now(&self) -> f64;
}

impl<C: IClock + ?Sized> IClock for &C {
    fn now(&self) -> f64 {
        (**self).now()
    }
}
