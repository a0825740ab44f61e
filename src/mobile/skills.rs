use crate::mobile::Serial;
use crate::world::time::GameTick;

/// Skill values are stored in tenths of a point, 0..=1200 by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SkillId(pub u16);

pub const SKILL_VALUE_CAP: i32 = 1200;

/// Why a skill mod stays alive. The condition is re-evaluated on every
/// validation pass; a mod whose condition turns false detaches from its
/// owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillModCondition {
    /// Active until the given tick.
    Timed(GameTick),
    /// Active while the item remains in the owner's item list.
    Equipped(Serial),
    /// Always active until explicitly removed.
    Always,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillMod {
    pub skill: SkillId,
    /// Relative mods add to the base value; absolute mods replace it.
    pub relative: bool,
    pub value: i32,
    pub condition: SkillModCondition,
}

impl SkillMod {
    pub fn timed(skill: SkillId, relative: bool, value: i32, expires: GameTick) -> Self {
        Self {
            skill,
            relative,
            value,
            condition: SkillModCondition::Timed(expires),
        }
    }

    pub fn equipped(skill: SkillId, relative: bool, value: i32, item: Serial) -> Self {
        Self {
            skill,
            relative,
            value,
            condition: SkillModCondition::Equipped(item),
        }
    }

    pub fn always(skill: SkillId, relative: bool, value: i32) -> Self {
        Self {
            skill,
            relative,
            value,
            condition: SkillModCondition::Always,
        }
    }

    pub fn check_condition(&self, owned_items: &[Serial], now: GameTick) -> bool {
        match self.condition {
            SkillModCondition::Timed(expires) => now < expires,
            SkillModCondition::Equipped(item) => owned_items.contains(&item),
            SkillModCondition::Always => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_mod_expires() {
        let skill_mod = SkillMod::timed(SkillId(5), true, 100, GameTick(50));
        assert!(skill_mod.check_condition(&[], GameTick(49)));
        assert!(!skill_mod.check_condition(&[], GameTick(50)));
    }

    #[test]
    fn equipped_mod_follows_item_ownership() {
        let skill_mod = SkillMod::equipped(SkillId(5), true, 100, Serial(9));
        assert!(skill_mod.check_condition(&[Serial(9)], GameTick(0)));
        assert!(!skill_mod.check_condition(&[Serial(10)], GameTick(0)));
        assert!(!skill_mod.check_condition(&[], GameTick(0)));
    }

    #[test]
    fn always_mod_never_detaches_on_its_own() {
        let skill_mod = SkillMod::always(SkillId(1), false, 500);
        assert!(skill_mod.check_condition(&[], GameTick(u64::MAX)));
    }
}
