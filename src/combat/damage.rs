use crate::mobile::{MobileFlags, Serial};
use crate::telemetry::logging;
use crate::world::delta::DeltaFlags;
use crate::world::state::World;
use crate::world::time::GameTick;

/// Accumulated damage from one source. A master's entry carries child
/// entries naming which of its followers actually dealt the damage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageEntry {
    pub damager: Serial,
    pub total: i32,
    pub last_damage: GameTick,
    pub children: Vec<DamageEntry>,
}

impl DamageEntry {
    pub fn new(damager: Serial, now: GameTick) -> Self {
        Self {
            damager,
            total: 0,
            last_damage: now,
            children: Vec::new(),
        }
    }

    pub fn has_expired(&self, now: GameTick, window: u64) -> bool {
        now.since(self.last_damage) >= window
    }
}

fn accumulate(entries: &mut Vec<DamageEntry>, damager: Serial, amount: i32, now: GameTick) -> usize {
    if let Some(index) = entries.iter().position(|entry| entry.damager == damager) {
        let entry = &mut entries[index];
        entry.total = entry.total.saturating_add(amount);
        entry.last_damage = now;
        index
    } else {
        let mut entry = DamageEntry::new(damager, now);
        entry.total = amount;
        entries.push(entry);
        entries.len() - 1
    }
}

impl World {
    /// Book damage onto the target's ledger. A sourced pet or summon also
    /// credits its master: the master gets (or refreshes) a top-level entry
    /// and the actual damager lands in that entry's child list.
    pub fn register_damage(&mut self, target: Serial, amount: i32, source: Serial) {
        if amount <= 0 {
            return;
        }
        let now = self.clock.now();
        let master = self
            .mobiles
            .get(&source)
            .and_then(|m| m.master)
            .filter(|master| *master != source && *master != target);
        let Some(mobile) = self.mobiles.get_mut(&target) else {
            return;
        };
        accumulate(&mut mobile.damage_entries, source, amount, now);
        if let Some(master) = master {
            let index = accumulate(&mut mobile.damage_entries, master, amount, now);
            accumulate(&mut mobile.damage_entries[index].children, source, amount, now);
        }
    }

    /// Apply damage: the region may veto or adjust it, protection flags zero
    /// it, hits clamp at zero, and crossing zero fires the death transition
    /// exactly once. Returns the amount actually applied.
    pub fn damage(&mut self, target: Serial, amount: i32, source: Option<Serial>) -> i32 {
        {
            let Some(mobile) = self.mobiles.get(&target) else {
                return 0;
            };
            if mobile.deleted || !mobile.is_alive() {
                return 0;
            }
            if mobile.flags.contains(MobileFlags::INVULNERABLE)
                || mobile.flags.contains(MobileFlags::BLOCK_DAMAGE)
            {
                return 0;
            }
        }
        // Sourced harm is a hostile act; the region gets its veto before
        // anything mutates. Unsourced damage (falls, field ticks) passes.
        if let Some(source) = source {
            if !self.region.allow_harmful(self, source, target) {
                return 0;
            }
        }
        let mut amount = amount.max(0);
        self.region.on_damage(self, target, source, &mut amount);
        let amount = amount.max(0);
        if amount == 0 {
            return 0;
        }

        if let Some(source) = source {
            let criminal = self.harm_is_criminal(source, target);
            self.aggressive_action(source, target, criminal);
            self.register_damage(target, amount, source);
        }

        let died = {
            let Some(mobile) = self.mobiles.get_mut(&target) else {
                return 0;
            };
            mobile.hits = (mobile.hits - amount).max(0);
            mobile.hits == 0
        };
        self.delta(target, DeltaFlags::HITS);
        if died {
            self.kill(target);
        } else {
            self.schedule_regen(target);
        }
        amount
    }

    /// Restore hits, through the region's `on_heal` adjustment, clamped to
    /// the derived max. Returns the amount actually restored.
    pub fn heal(&mut self, target: Serial, amount: i32, source: Option<Serial>) -> i32 {
        {
            let Some(mobile) = self.mobiles.get(&target) else {
                return 0;
            };
            if mobile.deleted || !mobile.is_alive() {
                return 0;
            }
        }
        if let Some(source) = source {
            if !self.region.allow_beneficial(self, source, target) {
                return 0;
            }
        }
        let mut amount = amount.max(0);
        self.region.on_heal(self, target, source, &mut amount);
        let amount = amount.max(0);
        if amount == 0 {
            return 0;
        }
        let Some(max) = self.max_hits_of(target) else {
            return 0;
        };
        let applied = {
            let Some(mobile) = self.mobiles.get_mut(&target) else {
                return 0;
            };
            let before = mobile.hits;
            mobile.hits = (before + amount).min(max);
            mobile.hits - before
        };
        if applied > 0 {
            self.delta(target, DeltaFlags::HITS);
            self.schedule_regen(target);
        }
        applied
    }

    /// Death transition. Fires at most once per life: overkill after the
    /// fact is a no-op. Combat ends unconditionally, observers get the ghost
    /// reinsert, and the behavior and region hooks run last.
    pub fn kill(&mut self, target: Serial) {
        let kind = {
            let Some(mobile) = self.mobiles.get_mut(&target) else {
                return;
            };
            if mobile.deleted || mobile.flags.contains(MobileFlags::DEAD) {
                return;
            }
            mobile.flags.set(MobileFlags::DEAD, true);
            mobile.hits = 0;
            logging::log_combat(&format!("{} ({}) was slain", mobile.name, mobile.serial));
            mobile.kind
        };
        self.delta(target, DeltaFlags::FLAGS | DeltaFlags::GHOST_UPDATE);
        self.clear_combat(target);
        self.behaviors.get(kind).on_death(self, target);
        self.region.on_death(self, target);
    }

    fn prune_damage_entries(&mut self, target: Serial) {
        let window = self.damage_expire_ticks();
        let now = self.clock.now();
        if let Some(mobile) = self.mobiles.get_mut(&target) {
            mobile
                .damage_entries
                .retain(|entry| !entry.has_expired(now, window));
        }
    }

    /// Highest accumulated damage; prunes expired entries as a side effect.
    pub fn most_total_damager(&mut self, target: Serial, exclude_self: bool) -> Option<Serial> {
        self.prune_damage_entries(target);
        self.mobiles.get(&target).and_then(|mobile| {
            mobile
                .damage_entries
                .iter()
                .filter(|entry| !exclude_self || entry.damager != target)
                .max_by_key(|entry| entry.total)
                .map(|entry| entry.damager)
        })
    }

    pub fn least_total_damager(&mut self, target: Serial, exclude_self: bool) -> Option<Serial> {
        self.prune_damage_entries(target);
        self.mobiles.get(&target).and_then(|mobile| {
            mobile
                .damage_entries
                .iter()
                .filter(|entry| !exclude_self || entry.damager != target)
                .min_by_key(|entry| entry.total)
                .map(|entry| entry.damager)
        })
    }

    pub fn most_recent_damager(&mut self, target: Serial, exclude_self: bool) -> Option<Serial> {
        self.prune_damage_entries(target);
        self.mobiles.get(&target).and_then(|mobile| {
            mobile
                .damage_entries
                .iter()
                .filter(|entry| !exclude_self || entry.damager != target)
                .max_by_key(|entry| entry.last_damage)
                .map(|entry| entry.damager)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobile::behavior::MobileBehavior;
    use crate::mobile::MobileKind;
    use crate::world::state::tests::test_world;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingDeath(Arc<AtomicUsize>);

    impl MobileBehavior for CountingDeath {
        fn on_death(&self, _world: &World, _deceased: Serial) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn overkill_fires_death_exactly_once() {
        let (mut world, a, b) = test_world();
        let deaths = Arc::new(AtomicUsize::new(0));
        world.register_behavior(MobileKind::Monster, Box::new(CountingDeath(deaths.clone())));

        let max = world.max_hits_of(b).unwrap();
        world.damage(b, max * 3, Some(a));
        assert_eq!(world.mobile(b).unwrap().hits, 0);
        assert!(world.mobile(b).unwrap().flags.contains(MobileFlags::DEAD));
        assert_eq!(deaths.load(Ordering::SeqCst), 1);

        // Hitting the corpse neither damages nor re-fires death.
        assert_eq!(world.damage(b, 50, Some(a)), 0);
        assert_eq!(deaths.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn death_ends_combat() {
        let (mut world, a, b) = test_world();
        world.set_combatant(b, Some(a)).expect("combat");
        let max = world.max_hits_of(b).unwrap();
        world.damage(b, max, Some(a));
        assert_eq!(world.mobile(b).unwrap().combatant, None);
        assert!(!world.timers.contains(crate::world::scheduler::TimerKey {
            serial: b,
            kind: crate::world::scheduler::TimerKind::CombatSwing,
        }));
        assert!(!world.timers.contains(crate::world::scheduler::TimerKey {
            serial: b,
            kind: crate::world::scheduler::TimerKind::CombatExpire,
        }));
    }

    struct Sanctuary;

    impl crate::policy::region::RegionPolicy for Sanctuary {
        fn allow_harmful(&self, _world: &World, _source: Serial, _target: Serial) -> bool {
            false
        }
    }

    #[test]
    fn region_harmful_veto_aborts_with_no_partial_state() {
        let (mut world, a, b) = test_world();
        world.set_region_policy(Box::new(Sanctuary));
        let before = world.mobile(b).unwrap().hits;

        assert_eq!(world.damage(b, 10, Some(a)), 0);
        let m = world.mobile(b).unwrap();
        assert_eq!(m.hits, before);
        assert!(m.damage_entries.is_empty());
        assert!(m.aggressors.is_empty());

        // Unsourced damage is not a hostile act; the veto does not apply.
        assert_eq!(world.damage(b, 10, None), 10);
    }

    #[test]
    fn protection_flags_zero_the_damage() {
        let (mut world, a, b) = test_world();
        world.set_flag(b, MobileFlags::INVULNERABLE, true);
        assert_eq!(world.damage(b, 30, Some(a)), 0);
        world.set_flag(b, MobileFlags::INVULNERABLE, false);
        world.set_flag(b, MobileFlags::BLOCK_DAMAGE, true);
        assert_eq!(world.damage(b, 30, Some(a)), 0);
        assert!(world.mobile(b).unwrap().damage_entries.is_empty());
    }

    #[test]
    fn ledger_credits_the_master_with_children() {
        let (mut world, a, b) = test_world();
        let pet = world.create_mobile(
            "a wolf",
            MobileKind::Animal,
            crate::world::position::MapId(0),
            crate::world::position::Point3D::new(101, 100, 0),
        );
        world.mobile_mut(pet).unwrap().master = Some(a);

        world.damage(b, 7, Some(pet));
        let entries = &world.mobile(b).unwrap().damage_entries;
        let pet_entry = entries.iter().find(|e| e.damager == pet).expect("pet entry");
        let master_entry = entries.iter().find(|e| e.damager == a).expect("master entry");
        assert_eq!(pet_entry.total, 7);
        assert_eq!(master_entry.total, 7);
        assert_eq!(master_entry.children.len(), 1);
        assert_eq!(master_entry.children[0].damager, pet);
        assert_eq!(master_entry.children[0].total, 7);
    }

    #[test]
    fn damager_queries_prune_and_rank() {
        let (mut world, a, b) = test_world();
        let c = world.create_mobile(
            "an orc",
            MobileKind::Monster,
            crate::world::position::MapId(0),
            crate::world::position::Point3D::new(101, 101, 0),
        );
        world.damage(a, 10, Some(b));
        world.clock.advance(5);
        world.damage(a, 3, Some(c));

        assert_eq!(world.most_total_damager(a, false), Some(b));
        assert_eq!(world.least_total_damager(a, false), Some(c));
        assert_eq!(world.most_recent_damager(a, false), Some(c));

        // Past the expiry window the ledger reads empty.
        let window = world.damage_expire_ticks();
        world.clock.advance(window);
        assert_eq!(world.most_total_damager(a, false), None);
        assert!(world.mobile(a).unwrap().damage_entries.is_empty());
    }

    #[test]
    fn self_damage_can_be_excluded_from_queries() {
        let (mut world, a, b) = test_world();
        world.damage(a, 20, Some(a));
        world.damage(a, 5, Some(b));
        assert_eq!(world.most_total_damager(a, false), Some(a));
        assert_eq!(world.most_total_damager(a, true), Some(b));
    }

    #[test]
    fn heal_clamps_to_max_and_restarts_regen() {
        let (mut world, a, b) = test_world();
        let max = world.max_hits_of(a).unwrap();
        world.damage(a, 10, Some(b));
        assert_eq!(world.heal(a, 500, None), 10);
        assert_eq!(world.mobile(a).unwrap().hits, max);
        assert_eq!(world.heal(a, 5, None), 0);
    }
}
