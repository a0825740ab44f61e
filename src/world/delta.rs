use crate::mobile::{Mobile, MobileFlags, Serial};
use crate::net::packet::{Packet, PacketKind, PacketWriter};
use crate::policy::notoriety::Notoriety;
use crate::world::state::World;

/// One bit per client-visible attribute group. A mobile accumulates bits in
/// its pending mask; `process_deltas` maps the merged mask to the minimal
/// packet set once per drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeltaFlags(pub u32);

impl DeltaFlags {
    pub const NONE: DeltaFlags = DeltaFlags(0);
    pub const NAME: DeltaFlags = DeltaFlags(1 << 0);
    pub const FLAGS: DeltaFlags = DeltaFlags(1 << 1);
    pub const HITS: DeltaFlags = DeltaFlags(1 << 2);
    pub const MANA: DeltaFlags = DeltaFlags(1 << 3);
    pub const STAM: DeltaFlags = DeltaFlags(1 << 4);
    pub const STAT: DeltaFlags = DeltaFlags(1 << 5);
    pub const NOTO: DeltaFlags = DeltaFlags(1 << 6);
    pub const GOLD: DeltaFlags = DeltaFlags(1 << 7);
    pub const WEIGHT: DeltaFlags = DeltaFlags(1 << 8);
    pub const DIRECTION: DeltaFlags = DeltaFlags(1 << 9);
    pub const HUE: DeltaFlags = DeltaFlags(1 << 10);
    pub const BODY: DeltaFlags = DeltaFlags(1 << 11);
    pub const ARMOR: DeltaFlags = DeltaFlags(1 << 12);
    pub const STAT_CAP: DeltaFlags = DeltaFlags(1 << 13);
    pub const GHOST_UPDATE: DeltaFlags = DeltaFlags(1 << 14);
    pub const FOLLOWERS: DeltaFlags = DeltaFlags(1 << 15);
    pub const PROPERTIES: DeltaFlags = DeltaFlags(1 << 16);
    pub const TITHING: DeltaFlags = DeltaFlags(1 << 17);
    pub const RESISTANCES: DeltaFlags = DeltaFlags(1 << 18);
    pub const WEAPON_DAMAGE: DeltaFlags = DeltaFlags(1 << 19);
    pub const HAIR: DeltaFlags = DeltaFlags(1 << 20);
    pub const FACIAL_HAIR: DeltaFlags = DeltaFlags(1 << 21);
    pub const RACE: DeltaFlags = DeltaFlags(1 << 22);
    pub const HEALTHBAR_YELLOW: DeltaFlags = DeltaFlags(1 << 23);
    pub const HEALTHBAR_POISON: DeltaFlags = DeltaFlags(1 << 24);

    pub fn contains(self, other: DeltaFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: DeltaFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for DeltaFlags {
    type Output = DeltaFlags;

    fn bitor(self, rhs: DeltaFlags) -> DeltaFlags {
        DeltaFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DeltaFlags {
    fn bitor_assign(&mut self, rhs: DeltaFlags) {
        self.0 |= rhs.0;
    }
}

const REINSERT: DeltaFlags =
    DeltaFlags(DeltaFlags::HUE.0 | DeltaFlags::BODY.0 | DeltaFlags::GHOST_UPDATE.0);
const MOVING: DeltaFlags = DeltaFlags(
    DeltaFlags::FLAGS.0
        | DeltaFlags::DIRECTION.0
        | DeltaFlags::NOTO.0
        | DeltaFlags::HEALTHBAR_YELLOW.0
        | DeltaFlags::HEALTHBAR_POISON.0,
);
const STATUS: DeltaFlags = DeltaFlags(
    DeltaFlags::STAT.0
        | DeltaFlags::STAT_CAP.0
        | DeltaFlags::GOLD.0
        | DeltaFlags::WEIGHT.0
        | DeltaFlags::ARMOR.0
        | DeltaFlags::FOLLOWERS.0
        | DeltaFlags::TITHING.0
        | DeltaFlags::WEAPON_DAMAGE.0
        | DeltaFlags::RACE.0
        | DeltaFlags::NAME.0,
);

/// Packets keyed by notoriety value (1..=7); a broadcast builds each distinct
/// hue at most once. The cache lives for a single broadcast only.
pub(crate) struct PacketCache {
    slots: [Option<Packet>; 8],
}

impl PacketCache {
    pub(crate) fn new() -> Self {
        Self {
            slots: Default::default(),
        }
    }

    pub(crate) fn get_or_build(
        &mut self,
        noto: Notoriety,
        build: impl FnOnce(u16) -> Packet,
    ) -> Packet {
        let slot = &mut self.slots[noto.value() as usize];
        slot.get_or_insert_with(|| build(noto.hue())).clone()
    }
}

fn visibility_byte(mobile: &Mobile) -> u8 {
    let mut value = 0u8;
    if mobile
        .flags
        .contains(MobileFlags::PARALYZED)
        || mobile.flags.contains(MobileFlags::FROZEN)
    {
        value |= 0x01;
    }
    if mobile.flags.contains(MobileFlags::WARMODE) {
        value |= 0x40;
    }
    if mobile.flags.contains(MobileFlags::HIDDEN) {
        value |= 0x80;
    }
    value
}

pub(crate) fn mobile_incoming(mobile: &Mobile, noto_hue: u16) -> Packet {
    let mut writer = PacketWriter::with_capacity(24);
    writer.write_u32(mobile.serial.0);
    writer.write_u16(mobile.body);
    writer.write_i32(mobile.location.x);
    writer.write_i32(mobile.location.y);
    writer.write_i32(mobile.location.z);
    writer.write_u8(mobile.facing.as_byte());
    writer.write_u16(mobile.hue);
    writer.write_u8(visibility_byte(mobile));
    writer.write_u16(noto_hue);
    Packet::new(PacketKind::MobileIncoming, writer.into_vec())
}

pub(crate) fn remove_entity(serial: Serial) -> Packet {
    let mut writer = PacketWriter::with_capacity(4);
    writer.write_u32(serial.0);
    Packet::new(PacketKind::RemoveEntity, writer.into_vec())
}

pub(crate) fn mobile_moving(mobile: &Mobile, noto_hue: u16) -> Packet {
    let mut writer = PacketWriter::with_capacity(24);
    writer.write_u32(mobile.serial.0);
    writer.write_u16(mobile.body);
    writer.write_i32(mobile.location.x);
    writer.write_i32(mobile.location.y);
    writer.write_i32(mobile.location.z);
    writer.write_u8(mobile.facing.as_byte());
    writer.write_u16(mobile.hue);
    writer.write_u8(visibility_byte(mobile));
    writer.write_u16(noto_hue);
    Packet::new(PacketKind::MobileMoving, writer.into_vec())
}

fn vital_packet(kind: PacketKind, serial: Serial, current: i32, max: i32) -> Packet {
    let mut writer = PacketWriter::with_capacity(8);
    writer.write_u32(serial.0);
    writer.write_u16(max.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(current.clamp(0, u16::MAX as i32) as u16);
    Packet::new(kind, writer.into_vec())
}

/// Observer form: vitals scaled to a 0..=25 bar so exact values leak only to
/// the owner.
fn normalized_hits(serial: Serial, current: i32, max: i32) -> Packet {
    let max = max.max(1);
    let scaled = (current.clamp(0, max) * 25 + max - 1) / max;
    vital_packet(PacketKind::HitsUpdate, serial, scaled, 25)
}

fn healthbar_packet(kind: PacketKind, serial: Serial, active: bool) -> Packet {
    let mut writer = PacketWriter::with_capacity(5);
    writer.write_u32(serial.0);
    writer.write_u8(active as u8);
    Packet::new(kind, writer.into_vec())
}

fn properties_changed(serial: Serial) -> Packet {
    let mut writer = PacketWriter::with_capacity(4);
    writer.write_u32(serial.0);
    Packet::new(PacketKind::PropertiesChanged, writer.into_vec())
}

fn hair_packet(kind: PacketKind, mobile: &Mobile) -> Packet {
    let mut writer = PacketWriter::with_capacity(8);
    writer.write_u32(mobile.serial.0);
    writer.write_u16(mobile.hue);
    Packet::new(kind, writer.into_vec())
}

fn resist_refresh(mobile: &Mobile) -> Packet {
    let mut writer = PacketWriter::with_capacity(24);
    writer.write_u32(mobile.serial.0);
    for value in mobile.resistances {
        writer.write_i32(value);
    }
    Packet::new(PacketKind::ResistRefresh, writer.into_vec())
}

/// Owner form of the status bar: everything the client status window shows.
fn mobile_status(
    mobile: &Mobile,
    max_hits: i32,
    max_stam: i32,
    max_mana: i32,
    str_value: i32,
    dex_value: i32,
    int_value: i32,
) -> Packet {
    let mut writer = PacketWriter::with_capacity(64);
    writer.write_u32(mobile.serial.0);
    writer.write_string(&mobile.name);
    writer.write_u16(mobile.hits.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(max_hits.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(mobile.stam.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(max_stam.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(mobile.mana.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(max_mana.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(str_value.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(dex_value.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(int_value.clamp(0, u16::MAX as i32) as u16);
    writer.write_u16(mobile.stat_cap.clamp(0, u16::MAX as i32) as u16);
    writer.write_u32(mobile.gold);
    writer.write_u32(mobile.weight);
    writer.write_u16(mobile.armor.clamp(0, u16::MAX as i32) as u16);
    writer.write_u8(mobile.followers);
    writer.write_u8(mobile.followers_max);
    writer.write_u32(mobile.tithing);
    writer.write_u8(mobile.race);
    Packet::new(PacketKind::MobileStatus, writer.into_vec())
}

/// Observer form: name and normalized hits only.
fn mobile_status_short(mobile: &Mobile, max_hits: i32) -> Packet {
    let max = max_hits.max(1);
    let scaled = (mobile.hits.clamp(0, max) * 25 + max - 1) / max;
    let mut writer = PacketWriter::with_capacity(32);
    writer.write_u32(mobile.serial.0);
    writer.write_string(&mobile.name);
    writer.write_u16(scaled as u16);
    writer.write_u16(25);
    Packet::new(PacketKind::MobileStatus, writer.into_vec())
}

impl World {
    /// Merge dirty bits and enqueue the mobile at most once. A no-op for
    /// deleted or off-map mobiles. During a drain the mobile lands in the
    /// deferred queue, processed strictly after the main pass.
    pub fn delta(&mut self, serial: Serial, flags: DeltaFlags) {
        let processing = self.processing_deltas;
        let Some(mobile) = self.mobiles.get_mut(&serial) else {
            return;
        };
        if mobile.deleted || mobile.map.is_none() || flags.is_empty() {
            return;
        }
        mobile.delta_flags |= flags;
        if !mobile.in_delta_queue {
            mobile.in_delta_queue = true;
            if processing {
                self.deferred_deltas.push(serial);
            } else {
                self.delta_queue.push(serial);
            }
        }
    }

    /// Drain the dirty queue: each queued mobile's merged mask is cleared,
    /// then mapped to packets against a read-only view of the world. Above
    /// the configured batch threshold packet construction fans out across
    /// scoped worker threads.
    pub fn process_deltas(&mut self) {
        if self.processing_deltas {
            return;
        }
        self.processing_deltas = true;
        loop {
            let batch = std::mem::take(&mut self.delta_queue);
            if batch.is_empty() {
                break;
            }
            let mut work: Vec<(Serial, DeltaFlags)> = Vec::with_capacity(batch.len());
            for serial in batch {
                let Some(mobile) = self.mobiles.get_mut(&serial) else {
                    continue;
                };
                let mask = mobile.delta_flags;
                mobile.delta_flags = DeltaFlags::NONE;
                mobile.in_delta_queue = false;
                if !mobile.deleted && mobile.map.is_some() && !mask.is_empty() {
                    work.push((serial, mask));
                }
            }

            if work.len() >= self.config.delta_parallel_threshold {
                let threads = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                let chunk_size = (work.len() + threads - 1) / threads;
                let world = &*self;
                std::thread::scope(|scope| {
                    for chunk in work.chunks(chunk_size.max(1)) {
                        scope.spawn(move || {
                            for (serial, mask) in chunk {
                                world.emit_deltas(*serial, *mask);
                            }
                        });
                    }
                });
            } else {
                for (serial, mask) in &work {
                    self.emit_deltas(*serial, *mask);
                }
            }

            // Mobiles re-dirtied by the emit pass run in a follow-up batch.
            self.delta_queue = std::mem::take(&mut self.deferred_deltas);
        }
        self.processing_deltas = false;
    }

    fn emit_deltas(&self, serial: Serial, mask: DeltaFlags) {
        let Some(subject) = self.mobiles.get(&serial) else {
            return;
        };
        if subject.deleted || subject.map.is_none() {
            return;
        }
        let now = self.clock.now();
        let behavior = self.behaviors.get(subject.kind);
        let max_hits = behavior.max_hits(subject.str_snapshot(now));
        let observers = self.observers_of(serial);

        if mask.intersects(REINSERT) {
            // Full reinsert supersedes the cheaper moving refresh.
            let mut cache = PacketCache::new();
            for observer in &observers {
                let noto = self.notoriety.compute(self, *observer, serial);
                let incoming = cache.get_or_build(noto, |hue| mobile_incoming(subject, hue));
                self.send_to(*observer, remove_entity(serial));
                self.send_to(*observer, incoming);
            }
            if let Some(channel) = &subject.channel {
                let noto = self.notoriety.compute(self, serial, serial);
                channel.send(mobile_incoming(subject, noto.hue()));
            }
        } else if mask.intersects(MOVING) {
            let mut cache = PacketCache::new();
            for observer in &observers {
                let noto = self.notoriety.compute(self, *observer, serial);
                let moving = cache.get_or_build(noto, |hue| mobile_moving(subject, hue));
                self.send_to(*observer, moving);
            }
        }

        if mask.intersects(DeltaFlags::HEALTHBAR_YELLOW) {
            let packet = healthbar_packet(
                PacketKind::HealthbarYellow,
                serial,
                subject.flags.contains(MobileFlags::BLESSED),
            );
            for observer in &observers {
                self.send_to(*observer, packet.clone());
            }
            if let Some(channel) = &subject.channel {
                channel.send(packet);
            }
        }
        if mask.intersects(DeltaFlags::HEALTHBAR_POISON) {
            let packet = healthbar_packet(PacketKind::HealthbarPoison, serial, true);
            for observer in &observers {
                self.send_to(*observer, packet.clone());
            }
            if let Some(channel) = &subject.channel {
                channel.send(packet);
            }
        }

        if mask.intersects(DeltaFlags::HITS) {
            let packet = normalized_hits(serial, subject.hits, max_hits);
            for observer in &observers {
                self.send_to(*observer, packet.clone());
            }
            if let Some(channel) = &subject.channel {
                channel.send(vital_packet(
                    PacketKind::HitsUpdate,
                    serial,
                    subject.hits,
                    max_hits,
                ));
            }
        }
        if mask.intersects(DeltaFlags::MANA) {
            if let Some(channel) = &subject.channel {
                let max_mana = behavior.max_mana(subject.int_snapshot(now));
                channel.send(vital_packet(
                    PacketKind::ManaUpdate,
                    serial,
                    subject.mana,
                    max_mana,
                ));
            }
        }
        if mask.intersects(DeltaFlags::STAM) {
            if let Some(channel) = &subject.channel {
                let max_stam = behavior.max_stam(subject.dex_snapshot(now));
                channel.send(vital_packet(
                    PacketKind::StamUpdate,
                    serial,
                    subject.stam,
                    max_stam,
                ));
            }
        }

        if mask.intersects(STATUS) {
            if let Some(channel) = &subject.channel {
                let str_value = subject.str_snapshot(now);
                let dex_value = subject.dex_snapshot(now);
                let int_value = subject.int_snapshot(now);
                channel.send(mobile_status(
                    subject,
                    max_hits,
                    behavior.max_stam(dex_value),
                    behavior.max_mana(int_value),
                    str_value,
                    dex_value,
                    int_value,
                ));
            }
            if mask.intersects(DeltaFlags::NAME) {
                let packet = mobile_status_short(subject, max_hits);
                for observer in &observers {
                    self.send_to(*observer, packet.clone());
                }
            }
        }

        if mask.intersects(DeltaFlags::PROPERTIES) {
            let packet = properties_changed(serial);
            for observer in &observers {
                self.send_to(*observer, packet.clone());
            }
            if let Some(channel) = &subject.channel {
                channel.send(packet);
            }
        }
        if mask.intersects(DeltaFlags::HAIR) {
            let packet = hair_packet(PacketKind::HairUpdate, subject);
            for observer in &observers {
                self.send_to(*observer, packet.clone());
            }
        }
        if mask.intersects(DeltaFlags::FACIAL_HAIR) {
            let packet = hair_packet(PacketKind::FacialHairUpdate, subject);
            for observer in &observers {
                self.send_to(*observer, packet.clone());
            }
        }
        if mask.intersects(DeltaFlags::RESISTANCES) {
            if let Some(channel) = &subject.channel {
                channel.send(resist_refresh(subject));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::channel::ClientChannel;
    use crate::world::state::tests::test_world;

    fn count_kind(packets: &[Packet], kind: PacketKind) -> usize {
        packets.iter().filter(|p| p.kind == kind).count()
    }

    #[test]
    fn double_dirty_yields_one_packet() {
        let (mut world, a, _) = test_world();
        let channel = ClientChannel::new();
        world.attach_channel(a, channel.clone());
        world.process_deltas();
        channel.drain();

        world.set_hits(a, 30);
        world.set_hits(a, 20);
        assert_eq!(world.delta_queue.len(), 1);
        world.process_deltas();

        let packets = channel.drain();
        assert_eq!(count_kind(&packets, PacketKind::HitsUpdate), 1);
    }

    #[test]
    fn body_change_reinserts_for_observers() {
        let (mut world, a, b) = test_world();
        let watcher = ClientChannel::new();
        world.attach_channel(b, watcher.clone());
        world.process_deltas();
        watcher.drain();

        world.set_body(a, 401);
        world.process_deltas();

        let packets = watcher.drain();
        assert_eq!(count_kind(&packets, PacketKind::RemoveEntity), 1);
        assert_eq!(count_kind(&packets, PacketKind::MobileIncoming), 1);
        // A reinsert covers the moving refresh; no separate moving packet.
        assert_eq!(count_kind(&packets, PacketKind::MobileMoving), 0);
    }

    #[test]
    fn mana_updates_stay_private() {
        let (mut world, a, b) = test_world();
        let own = ClientChannel::new();
        let watcher = ClientChannel::new();
        world.attach_channel(a, own.clone());
        world.attach_channel(b, watcher.clone());
        world.process_deltas();
        own.drain();
        watcher.drain();

        world.delta(a, DeltaFlags::MANA);
        world.process_deltas();

        assert_eq!(count_kind(&own.drain(), PacketKind::ManaUpdate), 1);
        assert!(watcher.drain().is_empty());
    }

    #[test]
    fn hits_are_normalized_for_observers_and_exact_for_self() {
        let (mut world, a, b) = test_world();
        let own = ClientChannel::new();
        let watcher = ClientChannel::new();
        world.attach_channel(a, own.clone());
        world.attach_channel(b, watcher.clone());
        world.process_deltas();
        own.drain();
        watcher.drain();

        world.set_hits(a, 27);
        world.process_deltas();

        let exact = own.drain();
        let observed = watcher.drain();
        assert_eq!(count_kind(&exact, PacketKind::HitsUpdate), 1);
        assert_eq!(count_kind(&observed, PacketKind::HitsUpdate), 1);
        // The observer copy is scaled to the 25-point bar.
        assert_ne!(exact[0].data, observed[0].data);
    }

    #[test]
    fn deleted_mobiles_accumulate_nothing() {
        let (mut world, a, _) = test_world();
        world.delete_mobile(a);
        world.delta(a, DeltaFlags::HITS);
        assert!(world.delta_queue.is_empty());
        assert!(world
            .mobile(a)
            .map(|m| m.delta_flags.is_empty())
            .unwrap_or(true));
    }

    #[test]
    fn flags_cover_distinct_bits() {
        let all = [
            DeltaFlags::NAME,
            DeltaFlags::FLAGS,
            DeltaFlags::HITS,
            DeltaFlags::MANA,
            DeltaFlags::STAM,
            DeltaFlags::STAT,
            DeltaFlags::NOTO,
            DeltaFlags::GOLD,
            DeltaFlags::WEIGHT,
            DeltaFlags::DIRECTION,
            DeltaFlags::HUE,
            DeltaFlags::BODY,
            DeltaFlags::ARMOR,
            DeltaFlags::STAT_CAP,
            DeltaFlags::GHOST_UPDATE,
            DeltaFlags::FOLLOWERS,
            DeltaFlags::PROPERTIES,
            DeltaFlags::TITHING,
            DeltaFlags::RESISTANCES,
            DeltaFlags::WEAPON_DAMAGE,
            DeltaFlags::HAIR,
            DeltaFlags::FACIAL_HAIR,
            DeltaFlags::RACE,
            DeltaFlags::HEALTHBAR_YELLOW,
            DeltaFlags::HEALTHBAR_POISON,
        ];
        let mut merged = DeltaFlags::NONE;
        for flag in all {
            assert!(!merged.intersects(flag));
            merged |= flag;
        }
        assert_eq!(merged.0.count_ones(), 25);
    }
}
