use crate::mobile::expiration::ExpireFlag;
use crate::mobile::Serial;
use crate::world::time::GameTick;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Every recurring or one-shot mobile timer is keyed by owner and kind, so a
/// mobile can own at most one live timer of each kind. Re-setting a key
/// replaces the pending entry; the superseded heap entry is dropped lazily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerKey {
    pub serial: Serial,
    pub kind: TimerKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    HitsRegen,
    StamRegen,
    ManaRegen,
    CombatSwing,
    CombatExpire,
    AggressionSweep,
    Paralysis,
    ExpireFlag(ExpireFlag),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TimerPriority {
    Normal,
    High,
}

#[derive(Debug, Clone, Copy)]
struct TimerEntry {
    key: TimerKey,
    target: GameTick,
    priority: TimerPriority,
}

/// Min-heap by target tick; High priority wins ties within a tick.
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .target
            .cmp(&self.target)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| other.key.cmp(&self.key))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.target == other.target
    }
}

impl Eq for TimerEntry {}

#[derive(Debug, Default)]
pub struct TimerSystem {
    heap: BinaryHeap<TimerEntry>,
    index: HashMap<TimerKey, TimerEntry>,
}

impl TimerSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule (or reschedule) a timer. An existing entry for the same key
    /// is cancelled: the index is authoritative, the old heap entry becomes
    /// stale and is skipped when popped.
    pub fn set(&mut self, key: TimerKey, delay: u64, priority: TimerPriority, now: GameTick) {
        let entry = TimerEntry {
            key,
            target: now.plus(delay),
            priority,
        };
        self.index.insert(key, entry);
        self.heap.push(entry);
    }

    /// Cancel a timer. Idempotent; returns the remaining ticks if it was live.
    pub fn stop(&mut self, key: TimerKey, now: GameTick) -> Option<u64> {
        let entry = self.index.remove(&key)?;
        Some(entry.target.since(now).max(1))
    }

    pub fn contains(&self, key: TimerKey) -> bool {
        self.index.contains_key(&key)
    }

    pub fn remaining(&self, key: TimerKey, now: GameTick) -> Option<u64> {
        let entry = self.index.get(&key)?;
        Some(entry.target.since(now).max(1))
    }

    /// Pop the next timer that is due, skipping stale heap entries.
    pub fn pop_ready(&mut self, now: GameTick) -> Option<TimerKey> {
        loop {
            let entry = self.heap.peek()?;
            match self.index.get(&entry.key) {
                Some(active) if active.target == entry.target => {
                    if entry.target <= now {
                        let entry = self.heap.pop()?;
                        self.index.remove(&entry.key);
                        return Some(entry.key);
                    }
                    return None;
                }
                _ => {
                    self.heap.pop();
                    continue;
                }
            }
        }
    }

    /// Cancel every timer owned by a serial; the deletion path relies on this.
    pub fn stop_all_for(&mut self, serial: Serial) -> usize {
        let keys: Vec<TimerKey> = self
            .index
            .keys()
            .filter(|key| key.serial == serial)
            .copied()
            .collect();
        for key in &keys {
            self.index.remove(key);
        }
        keys.len()
    }

    /// Count of live timers owned by a serial.
    pub fn count_for(&self, serial: Serial) -> usize {
        self.index.keys().filter(|key| key.serial == serial).count()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(serial: u32, kind: TimerKind) -> TimerKey {
        TimerKey {
            serial: Serial(serial),
            kind,
        }
    }

    #[test]
    fn timers_fire_in_tick_order() {
        let mut timers = TimerSystem::new();
        let now = GameTick(100);
        timers.set(key(1, TimerKind::HitsRegen), 10, TimerPriority::Normal, now);
        timers.set(key(2, TimerKind::HitsRegen), 5, TimerPriority::Normal, now);

        assert_eq!(timers.pop_ready(GameTick(104)), None);
        assert_eq!(timers.pop_ready(GameTick(105)), Some(key(2, TimerKind::HitsRegen)));
        assert_eq!(timers.pop_ready(GameTick(105)), None);
        assert_eq!(timers.pop_ready(GameTick(110)), Some(key(1, TimerKind::HitsRegen)));
        assert!(timers.is_empty());
    }

    #[test]
    fn reset_replaces_pending_entry() {
        let mut timers = TimerSystem::new();
        let now = GameTick(0);
        let k = key(7, TimerKind::CombatExpire);
        timers.set(k, 10, TimerPriority::Normal, now);
        timers.set(k, 30, TimerPriority::Normal, now);

        // The superseded entry at tick 10 must not fire.
        assert_eq!(timers.pop_ready(GameTick(10)), None);
        assert_eq!(timers.pop_ready(GameTick(30)), Some(k));
        assert_eq!(timers.len(), 0);
    }

    #[test]
    fn stop_is_idempotent_and_reports_remaining() {
        let mut timers = TimerSystem::new();
        let now = GameTick(1000);
        let k = key(3, TimerKind::ManaRegen);
        timers.set(k, 50, TimerPriority::Normal, now);

        assert_eq!(timers.stop(k, GameTick(1020)), Some(30));
        assert_eq!(timers.stop(k, GameTick(1020)), None);
        assert_eq!(timers.pop_ready(GameTick(2000)), None);
    }

    #[test]
    fn high_priority_wins_ties_within_a_tick() {
        let mut timers = TimerSystem::new();
        let now = GameTick(0);
        timers.set(key(1, TimerKind::CombatSwing), 5, TimerPriority::Normal, now);
        timers.set(key(2, TimerKind::CombatSwing), 5, TimerPriority::High, now);

        assert_eq!(timers.pop_ready(GameTick(5)), Some(key(2, TimerKind::CombatSwing)));
        assert_eq!(timers.pop_ready(GameTick(5)), Some(key(1, TimerKind::CombatSwing)));
    }

    #[test]
    fn stop_all_for_clears_every_owned_timer() {
        let mut timers = TimerSystem::new();
        let now = GameTick(0);
        timers.set(key(9, TimerKind::HitsRegen), 5, TimerPriority::Normal, now);
        timers.set(key(9, TimerKind::CombatSwing), 5, TimerPriority::Normal, now);
        timers.set(key(8, TimerKind::HitsRegen), 5, TimerPriority::Normal, now);

        assert_eq!(timers.stop_all_for(Serial(9)), 2);
        assert_eq!(timers.count_for(Serial(9)), 0);
        assert_eq!(timers.pop_ready(GameTick(5)), Some(key(8, TimerKind::HitsRegen)));
        assert_eq!(timers.pop_ready(GameTick(5)), None);
    }

    #[test]
    fn expire_flag_timers_are_distinct_keys() {
        let mut timers = TimerSystem::new();
        let now = GameTick(0);
        let a = key(4, TimerKind::ExpireFlag(ExpireFlag(0x81)));
        let b = key(4, TimerKind::ExpireFlag(ExpireFlag(0x82)));
        timers.set(a, 5, TimerPriority::Normal, now);
        timers.set(b, 5, TimerPriority::Normal, now);
        assert_eq!(timers.len(), 2);
    }
}
