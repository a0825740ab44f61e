use crate::mobile::Serial;
use crate::world::delta::DeltaFlags;
use crate::world::scheduler::{TimerKey, TimerKind, TimerPriority};
use crate::world::state::World;

/// Vital regeneration. Each vital below its derived maximum keeps exactly one
/// recurring timer; the timer stops itself once the vital is full and is
/// restarted by whatever drops the vital again.
impl World {
    pub(crate) fn schedule_regen(&mut self, serial: Serial) {
        let alive = self
            .mobiles
            .get(&serial)
            .map(|mobile| !mobile.deleted && mobile.is_alive())
            .unwrap_or(false);
        if !alive {
            return;
        }
        let Some(max_hits) = self.max_hits_of(serial) else {
            return;
        };
        let max_stam = self.max_stam_of(serial).unwrap_or(0);
        let max_mana = self.max_mana_of(serial).unwrap_or(0);

        let now = self.clock.now();
        let (dex, int) = {
            let Some(mobile) = self.mobiles.get_mut(&serial) else {
                return;
            };
            (mobile.dex_value(now), mobile.int_value(now))
        };
        let (hits, stam, mana, hits_ms, stam_ms, mana_ms) = {
            let Some(mobile) = self.mobiles.get(&serial) else {
                return;
            };
            let behavior = self.behaviors.get(mobile.kind);
            (
                mobile.hits,
                mobile.stam,
                mobile.mana,
                behavior.hits_regen_millis(mobile),
                behavior.stam_regen_millis(dex),
                behavior.mana_regen_millis(int),
            )
        };
        let plans = [
            (TimerKind::HitsRegen, hits < max_hits, hits_ms),
            (TimerKind::StamRegen, stam < max_stam, stam_ms),
            (TimerKind::ManaRegen, mana < max_mana, mana_ms),
        ];
        for (kind, wanted, millis) in plans {
            let key = TimerKey { serial, kind };
            if wanted && !self.timers.contains(key) {
                let ticks = self.clock.ticks_from_millis(millis).max(1);
                self.timers.set(key, ticks, TimerPriority::Normal, now);
            }
        }
    }

    pub(crate) fn on_regen_timer(&mut self, serial: Serial, kind: TimerKind) {
        let alive = self
            .mobiles
            .get(&serial)
            .map(|mobile| !mobile.deleted && mobile.is_alive())
            .unwrap_or(false);
        if !alive {
            return;
        }
        let max = match kind {
            TimerKind::HitsRegen => self.max_hits_of(serial),
            TimerKind::StamRegen => self.max_stam_of(serial),
            TimerKind::ManaRegen => self.max_mana_of(serial),
            _ => None,
        };
        let Some(max) = max else {
            return;
        };

        let now = self.clock.now();
        let stat = {
            let Some(mobile) = self.mobiles.get_mut(&serial) else {
                return;
            };
            match kind {
                TimerKind::StamRegen => mobile.dex_value(now),
                TimerKind::ManaRegen => mobile.int_value(now),
                _ => 0,
            }
        };
        let (current, amount, millis) = {
            let Some(mobile) = self.mobiles.get(&serial) else {
                return;
            };
            let behavior = self.behaviors.get(mobile.kind);
            let (current, millis) = match kind {
                TimerKind::HitsRegen => (mobile.hits, behavior.hits_regen_millis(mobile)),
                TimerKind::StamRegen => (mobile.stam, behavior.stam_regen_millis(stat)),
                _ => (mobile.mana, behavior.mana_regen_millis(stat)),
            };
            (current, behavior.regen_amount().max(1), millis)
        };
        if current >= max {
            return;
        }
        let new = (current + amount).min(max);
        let delta_flag = {
            let Some(mobile) = self.mobiles.get_mut(&serial) else {
                return;
            };
            match kind {
                TimerKind::HitsRegen => {
                    mobile.hits = new;
                    DeltaFlags::HITS
                }
                TimerKind::StamRegen => {
                    mobile.stam = new;
                    DeltaFlags::STAM
                }
                _ => {
                    mobile.mana = new;
                    DeltaFlags::MANA
                }
            }
        };
        self.delta(serial, delta_flag);
        if new < max {
            let ticks = self.clock.ticks_from_millis(millis).max(1);
            self.timers
                .set(TimerKey { serial, kind }, ticks, TimerPriority::Normal, now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::state::tests::test_world;

    #[test]
    fn hits_regenerate_up_to_max_then_stop() {
        let (mut world, a, _) = test_world();
        let max = world.max_hits_of(a).unwrap();
        world.set_hits(a, max - 2);
        assert!(world.timers.contains(TimerKey {
            serial: a,
            kind: TimerKind::HitsRegen,
        }));

        let interval = world.clock.ticks_from_millis(11_000);
        world.run_ticks(interval);
        assert_eq!(world.mobile(a).unwrap().hits, max - 1);
        world.run_ticks(interval);
        assert_eq!(world.mobile(a).unwrap().hits, max);

        // Timer stops once the vital is full.
        assert!(!world.timers.contains(TimerKey {
            serial: a,
            kind: TimerKind::HitsRegen,
        }));
    }

    #[test]
    fn regen_restarts_after_damage() {
        let (mut world, a, b) = test_world();
        let max = world.max_hits_of(a).unwrap();
        world.damage(a, 3, Some(b));
        assert!(world.mobile(a).unwrap().hits < max);
        assert!(world.timers.contains(TimerKey {
            serial: a,
            kind: TimerKind::HitsRegen,
        }));
    }

    #[test]
    fn stat_mods_shift_the_stamina_cadence() {
        use crate::mobile::stats::{StatMod, StatType};
        let (mut world, a, _) = test_world();
        let now = world.now();
        world.add_stat_mod(a, StatMod::new("agility", StatType::DEX, 100, now, 0));
        let max = world.max_stam_of(a).unwrap();
        world.set_stam(a, max - 1);

        // Raw dex 10 plus the mod gives 110: a 5.9 s interval, not 6.9 s.
        let boosted = world.clock.ticks_from_millis(5_900);
        world.run_ticks(boosted - 1);
        assert_eq!(world.mobile(a).unwrap().stam, max - 1);
        world.run_ticks(1);
        assert_eq!(world.mobile(a).unwrap().stam, max);
    }

    #[test]
    fn dead_mobiles_do_not_regenerate() {
        let (mut world, a, b) = test_world();
        let max = world.max_hits_of(a).unwrap();
        world.damage(a, max * 2, Some(b));
        assert_eq!(world.mobile(a).unwrap().hits, 0);

        let interval = world.clock.ticks_from_millis(11_000);
        world.run_ticks(interval * 3);
        assert_eq!(world.mobile(a).unwrap().hits, 0);
    }
}
