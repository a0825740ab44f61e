use crate::config::ShardConfig;
use crate::mobile::behavior::{BehaviorTable, MobileBehavior};
use crate::mobile::expiration::ExpireFlag;
use crate::mobile::{Mobile, MobileFlags, MobileKind, Serial};
use crate::net::channel::{ClientChannel, NetError};
use crate::net::packet::Packet;
use crate::policy::notoriety::{DefaultNotoriety, NotorietyPolicy};
use crate::policy::region::{NullRegionPolicy, RegionPolicy};
use crate::world::delta::DeltaFlags;
use crate::world::map::{Flatland, MovementOracle};
use crate::world::movement::{FastwalkPolicy, WindowFastwalk};
use crate::world::position::{MapId, Point3D};
use crate::world::scheduler::{TimerKind, TimerSystem};
use crate::world::sector::SectorIndex;
use crate::world::time::GameClock;
use std::collections::HashMap;
use std::time::Duration;

/// The whole simulation: entity table, spatial index, clock, timer wheel and
/// the dirty-state queues. Cross-entity operations are methods here; no
/// mobile ever reaches into another mobile's fields directly.
pub struct World {
    pub(crate) mobiles: HashMap<Serial, Mobile>,
    pub(crate) next_serial: u32,
    pub(crate) sectors: SectorIndex,
    pub(crate) clock: GameClock,
    pub(crate) timers: TimerSystem,
    pub(crate) delta_queue: Vec<Serial>,
    pub(crate) deferred_deltas: Vec<Serial>,
    pub(crate) processing_deltas: bool,
    pub(crate) config: ShardConfig,
    pub(crate) behaviors: BehaviorTable,
    pub(crate) notoriety: Box<dyn NotorietyPolicy>,
    pub(crate) region: Box<dyn RegionPolicy>,
    pub(crate) oracle: Box<dyn MovementOracle>,
    pub(crate) fastwalk: Box<dyn FastwalkPolicy>,
}

impl World {
    pub fn new(config: ShardConfig) -> Self {
        let clock = GameClock::new(Duration::from_millis(config.tick_ms));
        Self {
            mobiles: HashMap::new(),
            next_serial: 1,
            sectors: SectorIndex::new(),
            clock,
            timers: TimerSystem::new(),
            delta_queue: Vec::new(),
            deferred_deltas: Vec::new(),
            processing_deltas: false,
            config,
            behaviors: BehaviorTable::new(),
            notoriety: Box::new(DefaultNotoriety),
            region: Box::new(NullRegionPolicy),
            oracle: Box::new(Flatland),
            fastwalk: Box::new(WindowFastwalk),
        }
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn now(&self) -> crate::world::time::GameTick {
        self.clock.now()
    }

    pub fn set_notoriety_policy(&mut self, policy: Box<dyn NotorietyPolicy>) {
        self.notoriety = policy;
    }

    pub fn set_region_policy(&mut self, policy: Box<dyn RegionPolicy>) {
        self.region = policy;
    }

    pub fn set_movement_oracle(&mut self, oracle: Box<dyn MovementOracle>) {
        self.oracle = oracle;
    }

    pub fn set_fastwalk_policy(&mut self, policy: Box<dyn FastwalkPolicy>) {
        self.fastwalk = policy;
    }

    pub fn register_behavior(&mut self, kind: MobileKind, behavior: Box<dyn MobileBehavior>) {
        self.behaviors.register(kind, behavior);
    }

    // ---- lifecycle ----

    pub fn create_mobile(
        &mut self,
        name: impl Into<String>,
        kind: MobileKind,
        map: MapId,
        location: Point3D,
    ) -> Serial {
        let serial = Serial(self.next_serial);
        self.next_serial = self.next_serial.wrapping_add(1).max(1);
        self.insert_mobile(Mobile::new(serial, name, kind), map, location);
        serial
    }

    /// Insert a mobile under a known serial; the load path uses this. The
    /// allocator is bumped past it so fresh serials never collide.
    pub fn insert_mobile(&mut self, mut mobile: Mobile, map: MapId, location: Point3D) {
        let serial = mobile.serial;
        if serial.0 >= self.next_serial {
            self.next_serial = serial.0.wrapping_add(1).max(1);
        }
        mobile.map = Some(map);
        mobile.location = location;
        self.sectors.insert(map, location, serial);
        self.mobiles.insert(serial, mobile);
    }

    /// Idempotent removal. The record stays in the table flagged deleted so
    /// late readers see a tombstone instead of a dangling serial; every owned
    /// timer stops and the sector entry detaches.
    pub fn delete_mobile(&mut self, serial: Serial) -> bool {
        let Some(mobile) = self.mobiles.get_mut(&serial) else {
            return false;
        };
        if mobile.deleted {
            return false;
        }
        mobile.deleted = true;
        mobile.channel = None;
        mobile.combatant = None;
        mobile.delta_flags = DeltaFlags::NONE;
        mobile.in_delta_queue = false;
        let map = mobile.map.take();
        let location = mobile.location;
        if let Some(map) = map {
            self.sectors.remove(map, location, serial);
        }
        self.timers.stop_all_for(serial);
        true
    }

    pub fn mobile(&self, serial: Serial) -> Option<&Mobile> {
        self.mobiles.get(&serial)
    }

    pub fn mobile_mut(&mut self, serial: Serial) -> Option<&mut Mobile> {
        self.mobiles.get_mut(&serial)
    }

    pub fn mobile_count(&self) -> usize {
        self.mobiles.values().filter(|m| !m.deleted).count()
    }

    // ---- connectivity ----

    pub fn attach_channel(&mut self, serial: Serial, channel: ClientChannel) -> bool {
        match self.mobiles.get_mut(&serial) {
            Some(mobile) if !mobile.deleted => {
                mobile.channel = Some(channel);
                true
            }
            _ => false,
        }
    }

    /// Dropping the channel also ends combat; a disconnected mobile must not
    /// keep swinging.
    pub fn detach_channel(&mut self, serial: Serial) -> bool {
        let detached = match self.mobiles.get_mut(&serial) {
            Some(mobile) => mobile.channel.take().is_some(),
            None => false,
        };
        if detached {
            self.clear_combat(serial);
        }
        detached
    }

    /// Deliver to the mobile's channel if one is attached. An absent channel
    /// drops the packet and reports false; most callers don't care.
    pub fn send_to(&self, serial: Serial, packet: Packet) -> bool {
        match self.mobiles.get(&serial).and_then(|m| m.channel.as_ref()) {
            Some(channel) => {
                channel.send(packet);
                true
            }
            None => false,
        }
    }

    /// Opt-in hard failure for callers asserting the target is online.
    pub fn send_to_strict(&self, serial: Serial, packet: Packet) -> Result<(), NetError> {
        let mobile = self
            .mobiles
            .get(&serial)
            .filter(|m| !m.deleted)
            .ok_or(NetError::NoSuchMobile)?;
        let channel = mobile.channel.as_ref().ok_or(NetError::NotConnected)?;
        channel.send(packet);
        Ok(())
    }

    /// Connected mobiles within update range of the subject, subject excluded.
    pub fn observers_of(&self, serial: Serial) -> Vec<Serial> {
        let Some(subject) = self.mobiles.get(&serial) else {
            return Vec::new();
        };
        let Some(map) = subject.map else {
            return Vec::new();
        };
        let range = self.config.update_range;
        self.sectors
            .mobiles_near(map, subject.location, range)
            .into_iter()
            .filter(|other| *other != serial)
            .filter(|other| {
                self.mobiles
                    .get(other)
                    .map(|m| {
                        !m.deleted
                            && m.channel.is_some()
                            && subject.location.range_to(m.location) <= range
                    })
                    .unwrap_or(false)
            })
            .collect()
    }

    // ---- derived vitals ----

    pub fn max_hits_of(&mut self, serial: Serial) -> Option<i32> {
        let now = self.clock.now();
        let (kind, str_value) = {
            let mobile = self.mobiles.get_mut(&serial)?;
            (mobile.kind, mobile.str_value(now))
        };
        Some(self.behaviors.get(kind).max_hits(str_value))
    }

    pub fn max_stam_of(&mut self, serial: Serial) -> Option<i32> {
        let now = self.clock.now();
        let (kind, dex_value) = {
            let mobile = self.mobiles.get_mut(&serial)?;
            (mobile.kind, mobile.dex_value(now))
        };
        Some(self.behaviors.get(kind).max_stam(dex_value))
    }

    pub fn max_mana_of(&mut self, serial: Serial) -> Option<i32> {
        let now = self.clock.now();
        let (kind, int_value) = {
            let mobile = self.mobiles.get_mut(&serial)?;
            (mobile.kind, mobile.int_value(now))
        };
        Some(self.behaviors.get(kind).max_mana(int_value))
    }

    // ---- attribute mutators ----

    pub fn set_hits(&mut self, serial: Serial, value: i32) {
        let Some(max) = self.max_hits_of(serial) else {
            return;
        };
        let value = value.clamp(0, max);
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            if mobile.hits == value {
                return;
            }
            mobile.hits = value;
        }
        self.delta(serial, DeltaFlags::HITS);
        self.schedule_regen(serial);
    }

    pub fn set_stam(&mut self, serial: Serial, value: i32) {
        let Some(max) = self.max_stam_of(serial) else {
            return;
        };
        let value = value.clamp(0, max);
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            if mobile.stam == value {
                return;
            }
            mobile.stam = value;
        }
        self.delta(serial, DeltaFlags::STAM);
        self.schedule_regen(serial);
    }

    pub fn set_mana(&mut self, serial: Serial, value: i32) {
        let Some(max) = self.max_mana_of(serial) else {
            return;
        };
        let value = value.clamp(0, max);
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            if mobile.mana == value {
                return;
            }
            mobile.mana = value;
        }
        self.delta(serial, DeltaFlags::MANA);
        self.schedule_regen(serial);
    }

    pub fn set_name(&mut self, serial: Serial, name: impl Into<String>) {
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            mobile.name = name.into();
        }
        self.delta(serial, DeltaFlags::NAME);
    }

    pub fn set_hue(&mut self, serial: Serial, hue: u16) {
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            if mobile.hue == hue {
                return;
            }
            mobile.hue = hue;
        }
        self.delta(serial, DeltaFlags::HUE);
    }

    pub fn set_body(&mut self, serial: Serial, body: u16) {
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            if mobile.body == body {
                return;
            }
            mobile.body = body;
        }
        self.delta(serial, DeltaFlags::BODY);
    }

    pub fn set_flag(&mut self, serial: Serial, flag: MobileFlags, on: bool) {
        let Some(mobile) = self.mobiles.get_mut(&serial) else {
            return;
        };
        if mobile.flags.contains(flag) == on {
            return;
        }
        mobile.flags.set(flag, on);
        let mut delta = DeltaFlags::FLAGS;
        if flag == MobileFlags::CRIMINAL || flag == MobileFlags::MURDERER {
            delta |= DeltaFlags::NOTO;
        }
        self.delta(serial, delta);
    }

    /// Attach a stat mod. Same-name replacement still yields exactly one
    /// queued Stat delta.
    pub fn add_stat_mod(&mut self, serial: Serial, stat_mod: crate::mobile::stats::StatMod) {
        match self.mobiles.get_mut(&serial) {
            Some(mobile) if !mobile.deleted => mobile.add_stat_mod(stat_mod),
            _ => return,
        }
        self.delta(serial, DeltaFlags::STAT);
        self.schedule_regen(serial);
    }

    pub fn remove_stat_mod(&mut self, serial: Serial, name: &str) -> bool {
        let removed = self
            .mobiles
            .get_mut(&serial)
            .map(|mobile| mobile.remove_stat_mod(name))
            .unwrap_or(false);
        if removed {
            self.delta(serial, DeltaFlags::STAT);
        }
        removed
    }

    pub fn add_resistance_mod(
        &mut self,
        serial: Serial,
        resist_mod: crate::mobile::resist::ResistanceMod,
    ) {
        match self.mobiles.get_mut(&serial) {
            Some(mobile) if !mobile.deleted => mobile.add_resistance_mod(resist_mod),
            _ => return,
        }
        self.delta(serial, DeltaFlags::RESISTANCES);
    }

    pub fn remove_resistance_mods(
        &mut self,
        serial: Serial,
        element: crate::mobile::resist::Element,
    ) -> usize {
        let removed = self
            .mobiles
            .get_mut(&serial)
            .map(|mobile| mobile.remove_resistance_mods(element))
            .unwrap_or(0);
        if removed > 0 {
            self.delta(serial, DeltaFlags::RESISTANCES);
        }
        removed
    }

    // ---- notoriety & aggression helpers ----

    /// Mark an offender criminal: the flag, the timed expiry, and the region
    /// callback, in that order.
    pub fn flag_criminal(&mut self, serial: Serial) {
        let Some(mobile) = self.mobiles.get_mut(&serial) else {
            return;
        };
        if mobile.deleted {
            return;
        }
        mobile.flags.set(MobileFlags::CRIMINAL, true);
        self.delta(serial, DeltaFlags::FLAGS);
        let duration = self.criminal_duration_ticks();
        self.set_expiration_flag(serial, ExpireFlag::CRIMINAL, duration);
        self.region.on_criminal_action(self, serial);
    }

    pub fn criminal_duration_ticks(&self) -> u64 {
        self.clock
            .ticks_from_millis(self.config.criminal_duration_ms)
            .max(1)
    }

    pub(crate) fn aggression_expire_ticks(&self) -> u64 {
        self.clock
            .ticks_from_millis(self.config.aggression_expire_ms)
            .max(1)
    }

    pub(crate) fn damage_expire_ticks(&self) -> u64 {
        self.clock
            .ticks_from_millis(self.config.damage_entry_expire_ms)
            .max(1)
    }

    /// Is `attacker` currently on `victim`'s aggressor ledger (unexpired)?
    pub fn is_aggressor_of(&self, attacker: Serial, victim: Serial) -> bool {
        let expire = self.aggression_expire_ticks();
        let now = self.clock.now();
        self.mobiles
            .get(&victim)
            .map(|m| {
                m.aggressors
                    .iter()
                    .any(|info| info.attacker == attacker && now.since(info.last_refresh) < expire)
            })
            .unwrap_or(false)
    }

    // ---- the tick loop ----

    /// Advance one tick: fire due timers, then flush the delta queues.
    pub fn tick(&mut self) {
        let now = self.clock.advance(1);
        while let Some(key) = self.timers.pop_ready(now) {
            match key.kind {
                TimerKind::HitsRegen | TimerKind::StamRegen | TimerKind::ManaRegen => {
                    self.on_regen_timer(key.serial, key.kind)
                }
                TimerKind::CombatSwing => self.on_combat_swing(key.serial),
                TimerKind::CombatExpire => self.on_combat_expire(key.serial),
                TimerKind::AggressionSweep => self.on_aggression_sweep(key.serial),
                TimerKind::Paralysis => self.on_paralysis_timer(key.serial),
                TimerKind::ExpireFlag(flag) => self.on_expiration_timer(key.serial, flag),
            }
        }
        self.process_deltas();
    }

    pub fn run_ticks(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::net::packet::{Packet, PacketKind};

    pub(crate) fn test_world() -> (World, Serial, Serial) {
        let mut world = World::new(ShardConfig::default());
        let a = world.create_mobile("Edric", MobileKind::Player, MapId(0), Point3D::new(100, 100, 0));
        let b = world.create_mobile(
            "a mongbat",
            MobileKind::Monster,
            MapId(0),
            Point3D::new(102, 100, 0),
        );
        (world, a, b)
    }

    fn ping() -> Packet {
        Packet::new(PacketKind::SystemMessage, vec![])
    }

    #[test]
    fn serials_are_unique_and_monotonic() {
        let (mut world, a, b) = test_world();
        assert_ne!(a, b);
        let c = world.create_mobile("third", MobileKind::Animal, MapId(0), Point3D::new(5, 5, 0));
        assert!(c.0 > b.0);
        assert!(b.0 > a.0);
    }

    #[test]
    fn insert_with_known_serial_bumps_the_allocator() {
        let (mut world, _, b) = test_world();
        let fixed = Serial(b.0 + 50);
        world.insert_mobile(
            Mobile::new(fixed, "loaded", MobileKind::Player),
            MapId(0),
            Point3D::new(10, 10, 0),
        );
        let next = world.create_mobile("fresh", MobileKind::Player, MapId(0), Point3D::new(11, 10, 0));
        assert!(next.0 > fixed.0);
    }

    #[test]
    fn delete_is_idempotent_and_detaches_everything() {
        let (mut world, a, _) = test_world();
        world.set_hits(a, 10);
        assert!(world.timers.count_for(a) > 0);
        let location = world.mobile(a).unwrap().location;

        assert!(world.delete_mobile(a));
        assert!(!world.delete_mobile(a));
        assert_eq!(world.timers.count_for(a), 0);
        assert!(!world.sectors.contains(MapId(0), location, a));
        // Tombstone stays readable.
        assert!(world.mobile(a).unwrap().deleted);
        assert!(world.mobile(a).unwrap().map.is_none());
    }

    #[test]
    fn send_to_strict_distinguishes_missing_from_offline() {
        let (mut world, a, _) = test_world();
        assert_eq!(
            world.send_to_strict(Serial(9999), ping()),
            Err(NetError::NoSuchMobile)
        );
        assert_eq!(world.send_to_strict(a, ping()), Err(NetError::NotConnected));
        assert!(!world.send_to(a, ping()));

        let channel = ClientChannel::new();
        world.attach_channel(a, channel.clone());
        assert_eq!(world.send_to_strict(a, ping()), Ok(()));
        assert!(world.send_to(a, ping()));
        assert_eq!(channel.len(), 2);
    }

    #[test]
    fn observers_require_a_channel_and_update_range() {
        let (mut world, a, b) = test_world();
        assert!(world.observers_of(a).is_empty());

        world.attach_channel(b, ClientChannel::new());
        assert_eq!(world.observers_of(a), vec![b]);

        let far = world.create_mobile(
            "watcher",
            MobileKind::Player,
            MapId(0),
            Point3D::new(100 + world.config.update_range + 2, 100, 0),
        );
        world.attach_channel(far, ClientChannel::new());
        assert!(!world.observers_of(a).contains(&far));
    }

    #[test]
    fn vitals_clamp_to_the_derived_max() {
        let (mut world, a, _) = test_world();
        let max = world.max_hits_of(a).unwrap();
        world.set_hits(a, max + 500);
        assert_eq!(world.mobile(a).unwrap().hits, max);
        world.set_hits(a, -5);
        assert_eq!(world.mobile(a).unwrap().hits, 0);
    }

    #[test]
    fn replacing_a_stat_mod_queues_one_delta() {
        use crate::mobile::stats::{StatMod, StatType};
        let (mut world, a, _) = test_world();
        world.process_deltas();

        let now = world.now();
        world.add_stat_mod(a, StatMod::new("might", StatType::STR, 10, now, 0));
        world.add_stat_mod(a, StatMod::new("might", StatType::STR, 25, now, 0));
        let m = world.mobile(a).unwrap();
        assert_eq!(m.stat_mods.len(), 1);
        assert!(m.delta_flags.contains(DeltaFlags::STAT));
        assert_eq!(world.delta_queue.iter().filter(|s| **s == a).count(), 1);
    }

    #[test]
    fn resistance_mods_queue_a_resistances_delta() {
        use crate::mobile::resist::{Element, ResistanceMod};
        let (mut world, a, _) = test_world();
        world.process_deltas();

        world.add_resistance_mod(a, ResistanceMod::new(Element::Cold, 15));
        assert!(world
            .mobile(a)
            .unwrap()
            .delta_flags
            .contains(DeltaFlags::RESISTANCES));
        assert_eq!(world.remove_resistance_mods(a, Element::Cold), 1);
        assert_eq!(world.mobile(a).unwrap().resistances[Element::Cold.index()], 0);
    }

    #[test]
    fn detach_channel_ends_combat() {
        let (mut world, a, b) = test_world();
        world.attach_channel(a, ClientChannel::new());
        world.set_combatant(a, Some(b)).expect("combat starts");
        assert_eq!(world.mobile(a).unwrap().combatant, Some(b));

        world.detach_channel(a);
        assert_eq!(world.mobile(a).unwrap().combatant, None);
    }
}
