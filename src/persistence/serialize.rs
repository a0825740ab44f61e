use crate::mobile::expiration::ExpireFlag;
use crate::mobile::resist::Element;
use crate::mobile::skills::SkillId;
use crate::mobile::{AccessLevel, Mobile, MobileFlags, MobileKind, Serial};
use crate::persistence::record::{RecordReader, RecordWriter};
use crate::world::position::{Facing, MapId, Point3D};
use crate::world::state::World;

/// Current mobile record version. History:
///   1 - base record
///   2 - optional base-skill block
///   3 - follower counts
///   4 - optional base-resistance block
///   5 - tithing points
///   6 - race byte
pub const SAVE_VERSION: u32 = 6;

const HAS_MASTER: u32 = 0x01;
const HAS_ITEMS: u32 = 0x02;
const HAS_SKILLS: u32 = 0x04;
const HAS_RESISTANCES: u32 = 0x08;
const HAS_CRIMINAL: u32 = 0x10;
const HAS_MURDERER: u32 = 0x20;

/// Flag bits that describe transient runtime state; they are stripped on
/// save and rebuilt from their own timers on load.
const TRANSIENT_FLAGS: u32 =
    MobileFlags::PARALYZED.0 | MobileFlags::CRIMINAL.0 | MobileFlags::MURDERER.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    Truncated,
    UnsupportedVersion(u32),
    UnknownKind(u8),
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SaveError::Truncated => write!(f, "record ends before the declared fields"),
            SaveError::UnsupportedVersion(version) => {
                write!(f, "unsupported record version {}", version)
            }
            SaveError::UnknownKind(value) => write!(f, "unknown mobile kind byte {}", value),
        }
    }
}

impl std::error::Error for SaveError {}

/// A mobile as it came off disk, plus the timed-flag durations that have to
/// be re-armed on the scheduler once the mobile is back in a world.
#[derive(Debug)]
pub struct MobileRecord {
    pub mobile: Mobile,
    pub criminal_remaining: Option<u64>,
    pub murderer_remaining: Option<u64>,
}

fn kind_to_byte(kind: MobileKind) -> u8 {
    match kind {
        MobileKind::Player => 0,
        MobileKind::Animal => 1,
        MobileKind::Monster => 2,
        MobileKind::Vendor => 3,
    }
}

fn kind_from_byte(value: u8) -> Result<MobileKind, SaveError> {
    match value {
        0 => Ok(MobileKind::Player),
        1 => Ok(MobileKind::Animal),
        2 => Ok(MobileKind::Monster),
        3 => Ok(MobileKind::Vendor),
        other => Err(SaveError::UnknownKind(other)),
    }
}

/// Serialize one mobile at the current version. The save-flag mask is
/// recomputed from live state on every save; it is never stored on the
/// mobile.
pub fn write_mobile(
    mobile: &Mobile,
    criminal_remaining: Option<u64>,
    murderer_remaining: Option<u64>,
) -> Vec<u8> {
    let mut mask = 0u32;
    if mobile.master.is_some() {
        mask |= HAS_MASTER;
    }
    if !mobile.items.is_empty() {
        mask |= HAS_ITEMS;
    }
    if !mobile.base_skills.is_empty() {
        mask |= HAS_SKILLS;
    }
    if mobile.base_resistances.iter().any(|value| *value != 0) {
        mask |= HAS_RESISTANCES;
    }
    if criminal_remaining.is_some() {
        mask |= HAS_CRIMINAL;
    }
    if murderer_remaining.is_some() {
        mask |= HAS_MURDERER;
    }

    let mut writer = RecordWriter::with_capacity(128);
    writer.write_u32(SAVE_VERSION);
    writer.write_u32(mask);

    writer.write_serial(mobile.serial);
    writer.write_string(&mobile.name);
    writer.write_u8(kind_to_byte(mobile.kind));
    writer.write_u16(mobile.body);
    writer.write_u16(mobile.hue);
    writer.write_u8(mobile.race);

    writer.write_i32(mobile.location.x);
    writer.write_i32(mobile.location.y);
    writer.write_i32(mobile.location.z);
    match mobile.map {
        Some(map) => {
            writer.write_bool(true);
            writer.write_u8(map.0);
        }
        None => writer.write_bool(false),
    }
    writer.write_u8(mobile.facing.as_byte());
    writer.write_u8(mobile.access_level.as_byte());
    writer.write_u32(mobile.flags.0 & !TRANSIENT_FLAGS);

    writer.write_i32(mobile.raw_str);
    writer.write_i32(mobile.raw_dex);
    writer.write_i32(mobile.raw_int);
    writer.write_i32(mobile.stat_cap);
    writer.write_i32(mobile.hits);
    writer.write_i32(mobile.stam);
    writer.write_i32(mobile.mana);

    writer.write_u32(mobile.gold);
    writer.write_u32(mobile.weight);
    writer.write_i32(mobile.armor);
    writer.write_u8(mobile.followers);
    writer.write_u8(mobile.followers_max);
    writer.write_u32(mobile.tithing);

    if mask & HAS_MASTER != 0 {
        writer.write_serial(mobile.master.unwrap_or(Serial(0)));
    }
    if mask & HAS_ITEMS != 0 {
        writer.write_u16(mobile.items.len().min(u16::MAX as usize) as u16);
        for item in &mobile.items {
            writer.write_serial(*item);
        }
    }
    if mask & HAS_SKILLS != 0 {
        let mut skills: Vec<(SkillId, i32)> = mobile
            .base_skills
            .iter()
            .map(|(id, value)| (*id, *value))
            .collect();
        skills.sort_by_key(|(id, _)| *id);
        writer.write_u16(skills.len().min(u16::MAX as usize) as u16);
        for (id, value) in skills {
            writer.write_u16(id.0);
            writer.write_i32(value);
        }
    }
    if mask & HAS_RESISTANCES != 0 {
        for value in mobile.base_resistances {
            writer.write_i32(value);
        }
    }
    if let Some(remaining) = criminal_remaining {
        writer.write_u64(remaining);
    }
    if let Some(remaining) = murderer_remaining {
        writer.write_u64(remaining);
    }

    writer.into_vec()
}

/// Deserialize a record of any supported version. Fields a version predates
/// fall through to the defaults that version shipped with.
pub fn read_mobile(data: &[u8]) -> Result<MobileRecord, SaveError> {
    let mut reader = RecordReader::new(data);
    let version = reader.read_u32().ok_or(SaveError::Truncated)?;
    if version == 0 || version > SAVE_VERSION {
        return Err(SaveError::UnsupportedVersion(version));
    }
    let mask = reader.read_u32().ok_or(SaveError::Truncated)?;

    let serial = reader.read_serial().ok_or(SaveError::Truncated)?;
    let name = reader.read_string().ok_or(SaveError::Truncated)?;
    let kind = kind_from_byte(reader.read_u8().ok_or(SaveError::Truncated)?)?;
    let mut mobile = Mobile::new(serial, name, kind);

    mobile.body = reader.read_u16().ok_or(SaveError::Truncated)?;
    mobile.hue = reader.read_u16().ok_or(SaveError::Truncated)?;
    if version >= 6 {
        mobile.race = reader.read_u8().ok_or(SaveError::Truncated)?;
    }

    let x = reader.read_i32().ok_or(SaveError::Truncated)?;
    let y = reader.read_i32().ok_or(SaveError::Truncated)?;
    let z = reader.read_i32().ok_or(SaveError::Truncated)?;
    mobile.location = Point3D::new(x, y, z);
    if reader.read_bool().ok_or(SaveError::Truncated)? {
        mobile.map = Some(MapId(reader.read_u8().ok_or(SaveError::Truncated)?));
    }
    mobile.facing = Facing::from_byte(reader.read_u8().ok_or(SaveError::Truncated)?);
    mobile.access_level = AccessLevel::from_byte(reader.read_u8().ok_or(SaveError::Truncated)?);
    mobile.flags = MobileFlags(reader.read_u32().ok_or(SaveError::Truncated)? & !TRANSIENT_FLAGS);

    mobile.raw_str = reader.read_i32().ok_or(SaveError::Truncated)?;
    mobile.raw_dex = reader.read_i32().ok_or(SaveError::Truncated)?;
    mobile.raw_int = reader.read_i32().ok_or(SaveError::Truncated)?;
    mobile.stat_cap = reader.read_i32().ok_or(SaveError::Truncated)?;
    mobile.hits = reader.read_i32().ok_or(SaveError::Truncated)?;
    mobile.stam = reader.read_i32().ok_or(SaveError::Truncated)?;
    mobile.mana = reader.read_i32().ok_or(SaveError::Truncated)?;

    mobile.gold = reader.read_u32().ok_or(SaveError::Truncated)?;
    mobile.weight = reader.read_u32().ok_or(SaveError::Truncated)?;
    mobile.armor = reader.read_i32().ok_or(SaveError::Truncated)?;
    if version >= 3 {
        mobile.followers = reader.read_u8().ok_or(SaveError::Truncated)?;
        mobile.followers_max = reader.read_u8().ok_or(SaveError::Truncated)?;
    }
    if version >= 5 {
        mobile.tithing = reader.read_u32().ok_or(SaveError::Truncated)?;
    }

    if mask & HAS_MASTER != 0 {
        mobile.master = Some(reader.read_serial().ok_or(SaveError::Truncated)?);
    }
    if mask & HAS_ITEMS != 0 {
        let count = reader.read_u16().ok_or(SaveError::Truncated)?;
        for _ in 0..count {
            mobile
                .items
                .push(reader.read_serial().ok_or(SaveError::Truncated)?);
        }
    }
    if version >= 2 && mask & HAS_SKILLS != 0 {
        let count = reader.read_u16().ok_or(SaveError::Truncated)?;
        for _ in 0..count {
            let id = SkillId(reader.read_u16().ok_or(SaveError::Truncated)?);
            let value = reader.read_i32().ok_or(SaveError::Truncated)?;
            mobile.base_skills.insert(id, value);
        }
    }
    if version >= 4 && mask & HAS_RESISTANCES != 0 {
        for slot in 0..Element::COUNT {
            mobile.base_resistances[slot] = reader.read_i32().ok_or(SaveError::Truncated)?;
        }
        mobile.update_resistances();
    }
    let criminal_remaining = if mask & HAS_CRIMINAL != 0 {
        Some(reader.read_u64().ok_or(SaveError::Truncated)?)
    } else {
        None
    };
    let murderer_remaining = if mask & HAS_MURDERER != 0 {
        Some(reader.read_u64().ok_or(SaveError::Truncated)?)
    } else {
        None
    };

    Ok(MobileRecord {
        mobile,
        criminal_remaining,
        murderer_remaining,
    })
}

impl World {
    /// Serialize a live mobile, capturing the remaining duration of its timed
    /// notoriety flags. Deleted tombstones do not snapshot.
    pub fn snapshot_mobile(&self, serial: Serial) -> Option<Vec<u8>> {
        let mobile = self.mobiles.get(&serial).filter(|m| !m.deleted)?;
        let criminal = self.expiration_remaining(serial, ExpireFlag::CRIMINAL);
        let murderer = self.expiration_remaining(serial, ExpireFlag::MURDERER);
        Some(write_mobile(mobile, criminal, murderer))
    }

    /// Insert a mobile from a record, re-arming its timed flags with the
    /// remaining durations captured at save time.
    pub fn restore_mobile(&mut self, data: &[u8]) -> Result<Serial, SaveError> {
        let record = read_mobile(data)?;
        let serial = record.mobile.serial;
        match record.mobile.map {
            Some(map) => {
                let location = record.mobile.location;
                self.insert_mobile(record.mobile, map, location);
            }
            None => {
                if serial.0 >= self.next_serial {
                    self.next_serial = serial.0.wrapping_add(1).max(1);
                }
                self.mobiles.insert(serial, record.mobile);
            }
        }
        if let Some(remaining) = record.criminal_remaining {
            if let Some(mobile) = self.mobiles.get_mut(&serial) {
                mobile.flags.set(MobileFlags::CRIMINAL, true);
            }
            self.set_expiration_flag(serial, ExpireFlag::CRIMINAL, remaining.max(1));
        }
        if let Some(remaining) = record.murderer_remaining {
            if let Some(mobile) = self.mobiles.get_mut(&serial) {
                mobile.flags.set(MobileFlags::MURDERER, true);
            }
            self.set_expiration_flag(serial, ExpireFlag::MURDERER, remaining.max(1));
        }
        self.schedule_regen(serial);
        Ok(serial)
    }
}
