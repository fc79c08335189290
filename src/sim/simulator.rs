//! 仿真器
//!
//! 定义事件驱动仿真器，维护当前时间与事件队列。

use super::event::{Event, World};
use super::scheduled_event::ScheduledEvent;
use super::time::{SimTime, wake_time};
use std::collections::BinaryHeap;
use tracing::{debug, info, trace};

/// 事件驱动仿真器：维护当前时间与事件队列。
#[derive(Default)]
pub struct Simulator {
    now: SimTime,
    next_seq: u64,
    q: BinaryHeap<ScheduledEvent>,
}

impl Simulator {
    /// 获取当前仿真时间
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// 当前仿真时间（秒）
    pub fn now_secs(&self) -> f64 {
        self.now.as_secs_f64()
    }

    /// 调度事件在指定时间执行。早于当前时间的请求会被钳制到当前时间。
    #[tracing::instrument(skip(self, ev), fields(event_type = std::any::type_name::<E>(), schedule_at = ?at))]
    pub fn schedule<E: Event>(&mut self, at: SimTime, ev: E) {
        let at = at.max(self.now);
        let seq = self.next_seq;
        trace!(now = ?self.now, seq, "调度事件");

        self.next_seq = self.next_seq.wrapping_add(1);
        self.q.push(ScheduledEvent {
            at,
            seq,
            ev: Box::new(ev),
        });

        debug!(queue_size = self.q.len(), "事件已加入队列");
    }

    /// 在绝对时间戳 `at_secs`（秒）执行事件；时间已过去则在当前时刻执行。
    pub fn schedule_at_secs<E: Event>(&mut self, at_secs: f64, ev: E) {
        let at = wake_time(self.now, at_secs);
        self.schedule(at, ev);
    }

    /// 在 `delay_secs` 秒之后执行事件。
    pub fn schedule_in_secs<E: Event>(&mut self, delay_secs: f64, ev: E) {
        let at = self.now.saturating_add(SimTime::from_secs_f64(delay_secs));
        self.schedule(at, ev);
    }

    /// 队列中尚未执行的事件数
    pub fn pending(&self) -> usize {
        self.q.len()
    }

    /// 运行直到事件队列为空或到达 `until`。
    pub fn run_until(&mut self, until: SimTime, world: &mut dyn World) {
        while let Some(top) = self.q.peek() {
            if top.at > until {
                break;
            }
            let item = self.q.pop().expect("peek then pop");
            self.now = item.at;
            item.ev.execute(self, world);
        }
        self.now = self.now.max(until);
    }

    /// 运行所有事件直到队列为空。
    #[tracing::instrument(skip(self, world))]
    pub fn run(&mut self, world: &mut dyn World) {
        info!("▶️  开始运行仿真");
        debug!(now = ?self.now, queue_size = self.q.len(), "初始状态");

        let mut event_count = 0;
        while let Some(item) = self.q.pop() {
            event_count += 1;
            self.now = item.at;

            trace!(
                event_num = event_count,
                now = ?self.now,
                seq = item.seq,
                event = item.ev.name(),
                remaining_queue = self.q.len(),
                "执行事件"
            );

            item.ev.execute(self, world);
        }

        info!(
            total_events = event_count,
            final_time = ?self.now,
            "✅ 仿真完成"
        );
    }
}
