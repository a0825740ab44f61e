use crate::world::time::GameTick;

/// Raw stats are clamped to this range; effective stats are re-clamped after
/// modifiers are summed.
pub const STAT_MIN: i32 = 1;
pub const STAT_MAX: i32 = 65000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatType(pub u8);

impl StatType {
    pub const STR: StatType = StatType(0x1);
    pub const DEX: StatType = StatType(0x2);
    pub const INT: StatType = StatType(0x4);
    pub const ALL: StatType = StatType(0x7);

    pub fn affects(self, stat: StatType) -> bool {
        self.0 & stat.0 != 0
    }
}

impl std::ops::BitOr for StatType {
    type Output = StatType;

    fn bitor(self, rhs: StatType) -> StatType {
        StatType(self.0 | rhs.0)
    }
}

/// A named, time-bounded stat offset. Duration zero never elapses. Adding a
/// mod whose name matches an existing one replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatMod {
    pub name: String,
    pub stat: StatType,
    pub offset: i32,
    pub added: GameTick,
    pub duration: u64,
}

impl StatMod {
    pub fn new(name: impl Into<String>, stat: StatType, offset: i32, added: GameTick, duration: u64) -> Self {
        Self {
            name: name.into(),
            stat,
            offset,
            added,
            duration,
        }
    }

    pub fn has_elapsed(&self, now: GameTick) -> bool {
        if self.duration == 0 {
            return false;
        }
        now.since(self.added) >= self.duration
    }
}

pub fn clamp_stat(value: i32) -> i32 {
    value.clamp(STAT_MIN, STAT_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_never_elapses() {
        let stat_mod = StatMod::new("blessing", StatType::STR, 10, GameTick(100), 0);
        assert!(!stat_mod.has_elapsed(GameTick(u64::MAX)));
    }

    #[test]
    fn elapses_exactly_at_duration() {
        let stat_mod = StatMod::new("clumsy", StatType::DEX, -5, GameTick(100), 50);
        assert!(!stat_mod.has_elapsed(GameTick(149)));
        assert!(stat_mod.has_elapsed(GameTick(150)));
    }

    #[test]
    fn combined_types_affect_each_stat() {
        let both = StatType::STR | StatType::INT;
        assert!(both.affects(StatType::STR));
        assert!(both.affects(StatType::INT));
        assert!(!both.affects(StatType::DEX));
        assert!(StatType::ALL.affects(StatType::DEX));
    }

    #[test]
    fn clamp_bounds() {
        assert_eq!(clamp_stat(0), STAT_MIN);
        assert_eq!(clamp_stat(-50), STAT_MIN);
        assert_eq!(clamp_stat(70_000), STAT_MAX);
        assert_eq!(clamp_stat(100), 100);
    }
}
