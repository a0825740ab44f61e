use crate::mobile::{MobileFlags, Serial};
use crate::world::delta::DeltaFlags;
use crate::world::scheduler::{TimerKey, TimerKind, TimerPriority};
use crate::world::state::World;
use crate::world::time::GameTick;

/// Generic timed boolean state. Flags at or above `NOTO_THRESHOLD` affect
/// how the mobile renders to others and force a notoriety refresh whenever
/// they change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExpireFlag(pub u16);

impl ExpireFlag {
    pub const NOTO_THRESHOLD: u16 = 0x80;

    pub const BANDAGE: ExpireFlag = ExpireFlag(0x01);
    pub const CRIMINAL: ExpireFlag = ExpireFlag(0x81);
    pub const MURDERER: ExpireFlag = ExpireFlag(0x82);

    pub fn is_noto_flag(self) -> bool {
        self.0 >= Self::NOTO_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpireEntry {
    pub flag: ExpireFlag,
    pub started: GameTick,
    pub duration: u64,
}

impl World {
    /// Install (or refresh) a timed flag. At most one active tuple per flag
    /// per mobile: the scheduler `set` cancels the earlier callback before
    /// the new one is installed, so a duplicate never leaks a timer.
    pub fn set_expiration_flag(&mut self, serial: Serial, flag: ExpireFlag, duration: u64) {
        let now = self.clock.now();
        let Some(mobile) = self.mobiles.get_mut(&serial) else {
            return;
        };
        if mobile.deleted {
            return;
        }
        mobile.expirations.retain(|entry| entry.flag != flag);
        mobile.expirations.push(ExpireEntry {
            flag,
            started: now,
            duration,
        });
        self.timers.set(
            TimerKey {
                serial,
                kind: TimerKind::ExpireFlag(flag),
            },
            duration,
            TimerPriority::Normal,
            now,
        );
        if flag.is_noto_flag() {
            self.delta(serial, DeltaFlags::NOTO);
        }
    }

    pub fn has_expiration_flag(&self, serial: Serial, flag: ExpireFlag) -> bool {
        self.mobiles
            .get(&serial)
            .map(|mobile| mobile.expirations.iter().any(|entry| entry.flag == flag))
            .unwrap_or(false)
    }

    /// Remaining ticks on a live flag timer.
    pub fn expiration_remaining(&self, serial: Serial, flag: ExpireFlag) -> Option<u64> {
        if !self.has_expiration_flag(serial, flag) {
            return None;
        }
        self.timers.remaining(
            TimerKey {
                serial,
                kind: TimerKind::ExpireFlag(flag),
            },
            self.clock.now(),
        )
    }

    /// Explicitly drop a flag ahead of its timer.
    pub fn clear_expiration_flag(&mut self, serial: Serial, flag: ExpireFlag) -> bool {
        let now = self.clock.now();
        self.timers.stop(
            TimerKey {
                serial,
                kind: TimerKind::ExpireFlag(flag),
            },
            now,
        );
        self.remove_expiration(serial, flag)
    }

    pub(crate) fn on_expiration_timer(&mut self, serial: Serial, flag: ExpireFlag) {
        self.remove_expiration(serial, flag);
    }

    fn remove_expiration(&mut self, serial: Serial, flag: ExpireFlag) -> bool {
        let Some(mobile) = self.mobiles.get_mut(&serial) else {
            return false;
        };
        let before = mobile.expirations.len();
        mobile.expirations.retain(|entry| entry.flag != flag);
        if mobile.expirations.len() == before {
            return false;
        }
        let kind = mobile.kind;
        if flag == ExpireFlag::CRIMINAL {
            mobile.flags.set(MobileFlags::CRIMINAL, false);
            self.delta(serial, DeltaFlags::FLAGS);
        }
        if flag == ExpireFlag::MURDERER {
            let Some(mobile) = self.mobiles.get_mut(&serial) else {
                return true;
            };
            mobile.flags.set(MobileFlags::MURDERER, false);
            self.delta(serial, DeltaFlags::FLAGS);
        }
        if flag.is_noto_flag() {
            self.delta(serial, DeltaFlags::NOTO);
        }
        self.behaviors
            .get(kind)
            .on_expiration_flag_removed(self, serial, flag);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::tests::test_world;

    #[test]
    fn duplicate_flag_leaves_one_timer_and_one_entry() {
        let (mut world, a, _) = test_world();
        world.set_expiration_flag(a, ExpireFlag::BANDAGE, 100);
        world.set_expiration_flag(a, ExpireFlag::BANDAGE, 300);

        let entries = world
            .mobile(a)
            .unwrap()
            .expirations
            .iter()
            .filter(|entry| entry.flag == ExpireFlag::BANDAGE)
            .count();
        assert_eq!(entries, 1);
        let key = TimerKey {
            serial: a,
            kind: TimerKind::ExpireFlag(ExpireFlag::BANDAGE),
        };
        assert!(world.timers.contains(key));
        assert_eq!(world.timers.remaining(key, world.clock.now()), Some(300));

        // The superseded 100-tick timer must not fire.
        world.run_ticks(100);
        assert!(world.has_expiration_flag(a, ExpireFlag::BANDAGE));
        world.run_ticks(200);
        assert!(!world.has_expiration_flag(a, ExpireFlag::BANDAGE));
    }

    #[test]
    fn flag_removes_itself_when_the_timer_fires() {
        let (mut world, a, _) = test_world();
        world.set_expiration_flag(a, ExpireFlag::BANDAGE, 50);
        assert!(world.has_expiration_flag(a, ExpireFlag::BANDAGE));
        world.run_ticks(49);
        assert!(world.has_expiration_flag(a, ExpireFlag::BANDAGE));
        world.run_ticks(1);
        assert!(!world.has_expiration_flag(a, ExpireFlag::BANDAGE));
    }

    #[test]
    fn criminal_flag_clears_the_mobile_flag_on_expiry() {
        let (mut world, a, _) = test_world();
        world.flag_criminal(a);
        assert!(world.mobile(a).unwrap().flags.contains(MobileFlags::CRIMINAL));

        let duration = world.criminal_duration_ticks();
        world.run_ticks(duration);
        assert!(!world.mobile(a).unwrap().flags.contains(MobileFlags::CRIMINAL));
        assert!(!world.has_expiration_flag(a, ExpireFlag::CRIMINAL));
    }

    #[test]
    fn explicit_clear_stops_the_timer() {
        let (mut world, a, _) = test_world();
        world.set_expiration_flag(a, ExpireFlag::BANDAGE, 500);
        assert!(world.clear_expiration_flag(a, ExpireFlag::BANDAGE));
        assert!(!world.clear_expiration_flag(a, ExpireFlag::BANDAGE));
        assert!(!world.timers.contains(TimerKey {
            serial: a,
            kind: TimerKind::ExpireFlag(ExpireFlag::BANDAGE),
        }));
    }

    #[test]
    fn noto_flags_queue_a_notoriety_delta() {
        let (mut world, a, _) = test_world();
        world.process_deltas();
        world.set_expiration_flag(a, ExpireFlag::MURDERER, 100);
        assert!(world
            .mobile(a)
            .unwrap()
            .delta_flags
            .contains(DeltaFlags::NOTO));
    }
}
