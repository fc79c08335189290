//! 仿真时间类型
//!
//! 定义仿真时间（纳秒）及其与绝对时间戳（秒，`f64`）之间的转换。
//! 契约计划、消息截止时间等都以秒为单位给出，内核统一用整数纳秒推进。

/// 仿真时间（纳秒）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);
    pub const MAX: SimTime = SimTime(u64::MAX);

    pub fn from_micros(us: u64) -> SimTime {
        SimTime(us.saturating_mul(1_000))
    }
    pub fn from_millis(ms: u64) -> SimTime {
        SimTime(ms.saturating_mul(1_000_000))
    }
    pub fn from_secs(s: u64) -> SimTime {
        SimTime(s.saturating_mul(1_000_000_000))
    }

    /// 从秒（浮点）转换；负数与 NaN 视为 0，超出范围（含 +inf）饱和到 `MAX`。
    pub fn from_secs_f64(s: f64) -> SimTime {
        if s.is_nan() || s <= 0.0 {
            return SimTime::ZERO;
        }
        let nanos = (s * 1e9).round();
        if nanos >= u64::MAX as f64 {
            SimTime::MAX
        } else {
            SimTime(nanos as u64)
        }
    }

    /// 转换为秒（浮点）。
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    pub fn saturating_add(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(other.0))
    }

    /// 从 `self`（当前时刻）等待到 `target` 需要的时长；目标已过去时为 0。
    pub fn wait_until(self, target: SimTime) -> SimTime {
        SimTime(target.0.saturating_sub(self.0))
    }
}

/// 把绝对时间戳（秒）换算为相对 `now` 的等待时长（秒），已过去则为 0。
pub fn wait_duration(now: SimTime, at_secs: f64) -> f64 {
    now.wait_until(SimTime::from_secs_f64(at_secs)).as_secs_f64()
}

/// “睡眠到 `at_secs`”对应的唤醒时刻：目标已过去时立即（即 `now`）唤醒。
pub fn wake_time(now: SimTime, at_secs: f64) -> SimTime {
    now.max(SimTime::from_secs_f64(at_secs))
}
