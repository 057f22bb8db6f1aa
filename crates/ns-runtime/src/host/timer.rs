use std::collections::HashMap;

use ns_core::InstanceId;

use super::{TimerHandle, TimerHost};

#[derive(Debug, Clone, Copy)]
struct ScheduledWake {
    due: u64,
    instance: InstanceId,
}

/// One-shot timers on a manually advanced tick clock.
#[derive(Debug, Default)]
pub struct TickTimerQueue {
    now: u64,
    next_id: u64,
    timers: HashMap<TimerHandle, ScheduledWake>,
}

impl TickTimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.timers.values().map(|timer| timer.due).min()
    }

    /// Moves the clock forward and returns the instances whose timers fired,
    /// in due order.
    pub fn advance(&mut self, ticks: u64) -> Vec<InstanceId> {
        self.now += ticks;
        let mut fired = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.due <= self.now)
            .map(|(handle, timer)| (timer.due, *handle, timer.instance))
            .collect::<Vec<_>>();
        fired.sort();
        for (_, handle, _) in &fired {
            self.timers.remove(handle);
        }
        fired.into_iter().map(|(_, _, instance)| instance).collect()
    }

    /// Jumps straight to the earliest pending timer.
    pub fn advance_to_next(&mut self) -> Vec<InstanceId> {
        match self.next_due() {
            Some(due) => self.advance(due.saturating_sub(self.now)),
            None => Vec::new(),
        }
    }
}

impl TimerHost for TickTimerQueue {
    fn schedule_once(&mut self, delay_ticks: u32, instance: InstanceId) -> Option<TimerHandle> {
        self.next_id += 1;
        let handle = TimerHandle(self.next_id);
        self.timers.insert(
            handle,
            ScheduledWake {
                due: self.now + u64::from(delay_ticks),
                instance,
            },
        );
        Some(handle)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }
}
