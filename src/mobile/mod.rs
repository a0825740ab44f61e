pub mod behavior;
pub mod expiration;
pub mod regen;
pub mod resist;
pub mod skills;
pub mod stats;

use crate::combat::aggression::AggressorInfo;
use crate::combat::damage::DamageEntry;
use crate::mobile::expiration::ExpireEntry;
use crate::mobile::resist::{compute_resistances, Element, ResistanceMod};
use crate::mobile::skills::{SkillId, SkillMod, SKILL_VALUE_CAP};
use crate::mobile::stats::{clamp_stat, StatMod, StatType};
use crate::net::channel::ClientChannel;
use crate::world::delta::DeltaFlags;
use crate::world::position::{Facing, MapId, Point3D};
use crate::world::time::GameTick;
use std::collections::{HashMap, VecDeque};

/// Stable unique identity of a simulation object. Assigned at creation,
/// never reused while the entity lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Serial(pub u32);

impl std::fmt::Display for Serial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Behavior dispatch key: gameplay hooks and vital formulas resolve per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MobileKind {
    Player,
    Animal,
    Monster,
    Vendor,
}

/// Command authority. The generic mutator never grants the two highest
/// levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Player,
    Reporter,
    FightBroker,
    Counselor,
    GameMaster,
    Seer,
    Administrator,
    Owner,
    System,
}

impl AccessLevel {
    pub fn as_byte(self) -> u8 {
        match self {
            AccessLevel::Player => 0,
            AccessLevel::Reporter => 1,
            AccessLevel::FightBroker => 2,
            AccessLevel::Counselor => 3,
            AccessLevel::GameMaster => 4,
            AccessLevel::Seer => 5,
            AccessLevel::Administrator => 6,
            AccessLevel::Owner => 7,
            AccessLevel::System => 8,
        }
    }

    pub fn from_byte(value: u8) -> Self {
        match value {
            0 => AccessLevel::Player,
            1 => AccessLevel::Reporter,
            2 => AccessLevel::FightBroker,
            3 => AccessLevel::Counselor,
            4 => AccessLevel::GameMaster,
            5 => AccessLevel::Seer,
            6 => AccessLevel::Administrator,
            7 => AccessLevel::Owner,
            _ => AccessLevel::System,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MobileFlags(pub u32);

impl MobileFlags {
    pub const INVULNERABLE: MobileFlags = MobileFlags(0x0001);
    pub const BLESSED: MobileFlags = MobileFlags(0x0002);
    pub const HIDDEN: MobileFlags = MobileFlags(0x0004);
    pub const WARMODE: MobileFlags = MobileFlags(0x0008);
    pub const CRIMINAL: MobileFlags = MobileFlags(0x0010);
    pub const PARALYZED: MobileFlags = MobileFlags(0x0020);
    pub const FROZEN: MobileFlags = MobileFlags(0x0040);
    pub const STAFF_OWNED: MobileFlags = MobileFlags(0x0080);
    pub const TEMP_OBJECT: MobileFlags = MobileFlags(0x0100);
    pub const MOUNTED: MobileFlags = MobileFlags(0x0200);
    pub const MURDERER: MobileFlags = MobileFlags(0x0400);
    pub const BLOCK_DAMAGE: MobileFlags = MobileFlags(0x0800);
    pub const DEAD: MobileFlags = MobileFlags(0x1000);

    pub fn contains(self, flag: MobileFlags) -> bool {
        self.0 & flag.0 != 0
    }

    pub fn set(&mut self, flag: MobileFlags, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

/// A live simulation entity: player or creature. Field state is owned
/// exclusively by the entity; cross-entity operations route through `World`
/// methods, never into another mobile's fields.
#[derive(Debug)]
pub struct Mobile {
    pub serial: Serial,
    pub name: String,
    pub kind: MobileKind,
    pub body: u16,
    pub hue: u16,
    pub race: u8,
    pub location: Point3D,
    pub map: Option<MapId>,
    pub facing: Facing,
    pub access_level: AccessLevel,
    pub flags: MobileFlags,

    pub raw_str: i32,
    pub raw_dex: i32,
    pub raw_int: i32,
    pub stat_cap: i32,
    pub hits: i32,
    pub stam: i32,
    pub mana: i32,

    pub gold: u32,
    pub weight: u32,
    pub armor: i32,
    pub followers: u8,
    pub followers_max: u8,
    pub tithing: u32,

    /// Insertion order is layer/paperdoll order.
    pub items: Vec<Serial>,
    pub base_skills: HashMap<SkillId, i32>,
    pub stat_mods: Vec<StatMod>,
    pub skill_mods: Vec<SkillMod>,
    pub resist_mods: Vec<ResistanceMod>,
    pub base_resistances: [i32; Element::COUNT],
    pub resistances: [i32; Element::COUNT],
    pub expirations: Vec<ExpireEntry>,

    pub aggressors: Vec<AggressorInfo>,
    pub aggressed: Vec<AggressorInfo>,
    pub damage_entries: Vec<DamageEntry>,
    pub combatant: Option<Serial>,
    /// Counted reentrancy guard for combatant transitions; nested re-entry
    /// is legal, promotion while a change is in flight is not.
    pub changing_combatant: u32,
    pub master: Option<Serial>,

    pub channel: Option<ClientChannel>,
    pub delta_flags: DeltaFlags,
    pub in_delta_queue: bool,
    pub deleted: bool,
    pub recent_steps: VecDeque<GameTick>,
}

impl Mobile {
    pub fn new(serial: Serial, name: impl Into<String>, kind: MobileKind) -> Self {
        Self {
            serial,
            name: name.into(),
            kind,
            body: 400,
            hue: 0,
            race: 0,
            location: Point3D::new(0, 0, 0),
            map: None,
            facing: Facing::default(),
            access_level: AccessLevel::Player,
            flags: MobileFlags::default(),
            raw_str: 10,
            raw_dex: 10,
            raw_int: 10,
            stat_cap: 225,
            hits: 55,
            stam: 10,
            mana: 10,
            gold: 0,
            weight: 0,
            armor: 0,
            followers: 0,
            followers_max: 5,
            tithing: 0,
            items: Vec::new(),
            base_skills: HashMap::new(),
            stat_mods: Vec::new(),
            skill_mods: Vec::new(),
            resist_mods: Vec::new(),
            base_resistances: [0; Element::COUNT],
            resistances: [0; Element::COUNT],
            expirations: Vec::new(),
            aggressors: Vec::new(),
            aggressed: Vec::new(),
            damage_entries: Vec::new(),
            combatant: None,
            changing_combatant: 0,
            master: None,
            channel: None,
            delta_flags: DeltaFlags::NONE,
            in_delta_queue: false,
            deleted: false,
            recent_steps: VecDeque::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.deleted && !self.flags.contains(MobileFlags::DEAD)
    }

    pub fn is_staff(&self) -> bool {
        self.access_level >= AccessLevel::Counselor
    }

    /// Generic access mutator; Owner and System are never grantable here.
    pub fn try_set_access_level(&mut self, level: AccessLevel) -> bool {
        if level >= AccessLevel::Owner {
            return false;
        }
        self.access_level = level;
        true
    }

    pub fn set_raw_str(&mut self, value: i32) {
        self.raw_str = clamp_stat(value);
    }

    pub fn set_raw_dex(&mut self, value: i32) {
        self.raw_dex = clamp_stat(value);
    }

    pub fn set_raw_int(&mut self, value: i32) {
        self.raw_int = clamp_stat(value);
    }

    /// Drop every stat mod whose time is up. Required before any effective
    /// read; returns how many were detached.
    pub fn prune_stat_mods(&mut self, now: GameTick) -> usize {
        let before = self.stat_mods.len();
        self.stat_mods.retain(|stat_mod| !stat_mod.has_elapsed(now));
        before - self.stat_mods.len()
    }

    /// Add-or-replace by name; at most one mod per name survives.
    pub fn add_stat_mod(&mut self, stat_mod: StatMod) {
        self.stat_mods.retain(|existing| existing.name != stat_mod.name);
        self.stat_mods.push(stat_mod);
    }

    pub fn remove_stat_mod(&mut self, name: &str) -> bool {
        let before = self.stat_mods.len();
        self.stat_mods.retain(|existing| existing.name != name);
        before != self.stat_mods.len()
    }

    fn effective_stat(&mut self, stat: StatType, raw: i32, now: GameTick) -> i32 {
        self.prune_stat_mods(now);
        let offset: i32 = self
            .stat_mods
            .iter()
            .filter(|stat_mod| stat_mod.stat.affects(stat))
            .map(|stat_mod| stat_mod.offset)
            .sum();
        clamp_stat(raw.saturating_add(offset))
    }

    /// Read-only effective stat for the broadcast path, which holds shared
    /// world borrows and cannot prune. Elapsed mods are skipped, not removed.
    fn stat_snapshot(&self, stat: StatType, raw: i32, now: GameTick) -> i32 {
        let offset: i32 = self
            .stat_mods
            .iter()
            .filter(|stat_mod| !stat_mod.has_elapsed(now) && stat_mod.stat.affects(stat))
            .map(|stat_mod| stat_mod.offset)
            .sum();
        clamp_stat(raw.saturating_add(offset))
    }

    pub fn str_snapshot(&self, now: GameTick) -> i32 {
        self.stat_snapshot(StatType::STR, self.raw_str, now)
    }

    pub fn dex_snapshot(&self, now: GameTick) -> i32 {
        self.stat_snapshot(StatType::DEX, self.raw_dex, now)
    }

    pub fn int_snapshot(&self, now: GameTick) -> i32 {
        self.stat_snapshot(StatType::INT, self.raw_int, now)
    }

    pub fn str_value(&mut self, now: GameTick) -> i32 {
        let raw = self.raw_str;
        self.effective_stat(StatType::STR, raw, now)
    }

    pub fn dex_value(&mut self, now: GameTick) -> i32 {
        let raw = self.raw_dex;
        self.effective_stat(StatType::DEX, raw, now)
    }

    pub fn int_value(&mut self, now: GameTick) -> i32 {
        let raw = self.raw_int;
        self.effective_stat(StatType::INT, raw, now)
    }

    /// Drop every skill mod whose condition no longer holds. Required before
    /// any skill read.
    pub fn prune_skill_mods(&mut self, now: GameTick) -> usize {
        let items = &self.items;
        let before = self.skill_mods.len();
        self.skill_mods
            .retain(|skill_mod| skill_mod.check_condition(items, now));
        before - self.skill_mods.len()
    }

    pub fn add_skill_mod(&mut self, skill_mod: SkillMod) {
        self.skill_mods.push(skill_mod);
    }

    pub fn skill_value(&mut self, skill: SkillId, now: GameTick) -> i32 {
        self.prune_skill_mods(now);
        let mut base = self.base_skills.get(&skill).copied().unwrap_or(0);
        let mut offset = 0;
        for skill_mod in &self.skill_mods {
            if skill_mod.skill != skill {
                continue;
            }
            if skill_mod.relative {
                offset += skill_mod.value;
            } else {
                base = skill_mod.value;
            }
        }
        (base + offset).clamp(0, SKILL_VALUE_CAP)
    }

    /// Recompute the summed resistance array; every resist-mod mutation and
    /// every read goes through here.
    pub fn update_resistances(&mut self) {
        self.resistances = compute_resistances(&self.base_resistances, &self.resist_mods);
    }

    pub fn add_resistance_mod(&mut self, resist_mod: ResistanceMod) {
        self.resist_mods.push(resist_mod);
        self.update_resistances();
    }

    pub fn remove_resistance_mods(&mut self, element: Element) -> usize {
        let before = self.resist_mods.len();
        self.resist_mods
            .retain(|resist_mod| resist_mod.element != element);
        self.update_resistances();
        before - self.resist_mods.len()
    }

    pub fn resistance(&mut self, element: Element) -> i32 {
        self.update_resistances();
        self.resistances[element.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mobile() -> Mobile {
        Mobile::new(Serial(1), "test", MobileKind::Player)
    }

    #[test]
    fn raw_stats_clamp_on_assignment() {
        let mut m = mobile();
        m.set_raw_str(0);
        assert_eq!(m.raw_str, 1);
        m.set_raw_dex(100_000);
        assert_eq!(m.raw_dex, 65000);
        m.set_raw_int(-3);
        assert_eq!(m.raw_int, 1);
    }

    #[test]
    fn effective_stat_sums_active_mods_and_clamps() {
        let mut m = mobile();
        m.set_raw_str(100);
        m.add_stat_mod(StatMod::new("might", StatType::STR, 20, GameTick(0), 0));
        m.add_stat_mod(StatMod::new("weaken", StatType::STR, -50, GameTick(0), 0));
        assert_eq!(m.str_value(GameTick(0)), 70);

        m.add_stat_mod(StatMod::new("curse", StatType::STR, -500, GameTick(0), 0));
        assert_eq!(m.str_value(GameTick(0)), 1);
    }

    #[test]
    fn reading_a_stat_prunes_elapsed_mods() {
        let mut m = mobile();
        m.set_raw_dex(50);
        m.add_stat_mod(StatMod::new("agility", StatType::DEX, 10, GameTick(0), 100));
        assert_eq!(m.dex_value(GameTick(50)), 60);
        assert_eq!(m.stat_mods.len(), 1);

        assert_eq!(m.dex_value(GameTick(100)), 50);
        assert!(m.stat_mods.is_empty());
    }

    #[test]
    fn stat_mod_with_same_name_replaces() {
        let mut m = mobile();
        m.add_stat_mod(StatMod::new("might", StatType::STR, 10, GameTick(0), 0));
        m.add_stat_mod(StatMod::new("might", StatType::STR, 25, GameTick(0), 0));
        assert_eq!(m.stat_mods.len(), 1);
        assert_eq!(m.stat_mods[0].offset, 25);
    }

    #[test]
    fn skill_read_prunes_unequipped_item_mods() {
        let mut m = mobile();
        m.base_skills.insert(SkillId(1), 500);
        m.items.push(Serial(40));
        m.add_skill_mod(SkillMod::equipped(SkillId(1), true, 100, Serial(40)));
        assert_eq!(m.skill_value(SkillId(1), GameTick(0)), 600);

        m.items.clear();
        assert_eq!(m.skill_value(SkillId(1), GameTick(0)), 500);
        assert!(m.skill_mods.is_empty());
    }

    #[test]
    fn absolute_skill_mod_replaces_base() {
        let mut m = mobile();
        m.base_skills.insert(SkillId(2), 300);
        m.add_skill_mod(SkillMod::always(SkillId(2), false, 1000));
        m.add_skill_mod(SkillMod::always(SkillId(2), true, 50));
        assert_eq!(m.skill_value(SkillId(2), GameTick(0)), 1050);
    }

    #[test]
    fn resistance_mods_recompute_on_mutation() {
        let mut m = mobile();
        m.base_resistances[Element::Fire.index()] = 10;
        m.add_resistance_mod(ResistanceMod::new(Element::Fire, 25));
        assert_eq!(m.resistance(Element::Fire), 35);

        m.remove_resistance_mods(Element::Fire);
        assert_eq!(m.resistance(Element::Fire), 10);
    }

    #[test]
    fn access_level_mutator_refuses_owner_and_system() {
        let mut m = mobile();
        assert!(m.try_set_access_level(AccessLevel::GameMaster));
        assert_eq!(m.access_level, AccessLevel::GameMaster);
        assert!(!m.try_set_access_level(AccessLevel::Owner));
        assert!(!m.try_set_access_level(AccessLevel::System));
        assert_eq!(m.access_level, AccessLevel::GameMaster);
    }

    #[test]
    fn flag_bitset_toggles() {
        let mut flags = MobileFlags::default();
        flags.set(MobileFlags::HIDDEN, true);
        flags.set(MobileFlags::WARMODE, true);
        assert!(flags.contains(MobileFlags::HIDDEN));
        flags.set(MobileFlags::HIDDEN, false);
        assert!(!flags.contains(MobileFlags::HIDDEN));
        assert!(flags.contains(MobileFlags::WARMODE));
    }
}
