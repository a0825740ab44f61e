use crate::mobile::{MobileFlags, MobileKind, Serial};
use crate::world::state::World;

/// How one mobile classifies another; drives name hue and combat legality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Notoriety {
    Innocent,
    Ally,
    Attackable,
    Criminal,
    Enemy,
    Murderer,
    Invulnerable,
}

/// Name hues by notoriety value; index 0 is unused padding so the wire value
/// (1..=7) indexes directly.
pub const NOTORIETY_HUES: [u16; 8] = [
    0x000, 0x059, 0x03F, 0x3B2, 0x3B2, 0x090, 0x022, 0x035,
];

impl Notoriety {
    pub fn value(self) -> u8 {
        match self {
            Notoriety::Innocent => 1,
            Notoriety::Ally => 2,
            Notoriety::Attackable => 3,
            Notoriety::Criminal => 4,
            Notoriety::Enemy => 5,
            Notoriety::Murderer => 6,
            Notoriety::Invulnerable => 7,
        }
    }

    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Notoriety::Innocent),
            2 => Some(Notoriety::Ally),
            3 => Some(Notoriety::Attackable),
            4 => Some(Notoriety::Criminal),
            5 => Some(Notoriety::Enemy),
            6 => Some(Notoriety::Murderer),
            7 => Some(Notoriety::Invulnerable),
            _ => None,
        }
    }

    pub fn hue(self) -> u16 {
        NOTORIETY_HUES[self.value() as usize]
    }

    /// Harming this target is a criminal act for the source.
    pub fn is_criminal_to_harm(self) -> bool {
        matches!(self, Notoriety::Innocent | Notoriety::Ally)
    }
}

/// Externally injected classification function. The delta engine and the
/// movement broadcast depend on it for hue selection.
pub trait NotorietyPolicy: Send + Sync {
    fn compute(&self, world: &World, source: Serial, target: Serial) -> Notoriety;
}

/// The fallback when no shard policy is installed: everything is attackable.
#[derive(Debug, Default)]
pub struct DefaultNotoriety;

impl NotorietyPolicy for DefaultNotoriety {
    fn compute(&self, _world: &World, _source: Serial, _target: Serial) -> Notoriety {
        Notoriety::Attackable
    }
}

/// Flag-and-ledger based classification used by the stock shard rules.
#[derive(Debug, Default)]
pub struct StandardNotoriety;

impl NotorietyPolicy for StandardNotoriety {
    fn compute(&self, world: &World, source: Serial, target: Serial) -> Notoriety {
        let Some(mobile) = world.mobile(target) else {
            return Notoriety::Attackable;
        };
        if mobile.flags.contains(MobileFlags::INVULNERABLE) {
            return Notoriety::Invulnerable;
        }
        if mobile.flags.contains(MobileFlags::MURDERER) {
            return Notoriety::Murderer;
        }
        if mobile.flags.contains(MobileFlags::CRIMINAL) {
            return Notoriety::Criminal;
        }
        if source != target && world.is_aggressor_of(target, source) {
            return Notoriety::Enemy;
        }
        match mobile.kind {
            MobileKind::Player | MobileKind::Vendor => Notoriety::Innocent,
            MobileKind::Animal => Notoriety::Attackable,
            MobileKind::Monster => Notoriety::Attackable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_cover_the_wire_range() {
        for value in 1..=7u8 {
            let noto = Notoriety::from_value(value).expect("notoriety");
            assert_eq!(noto.value(), value);
        }
        assert_eq!(Notoriety::from_value(0), None);
        assert_eq!(Notoriety::from_value(8), None);
    }

    #[test]
    fn hue_table_matches_reference() {
        assert_eq!(Notoriety::Innocent.hue(), 0x059);
        assert_eq!(Notoriety::Ally.hue(), 0x03F);
        assert_eq!(Notoriety::Attackable.hue(), 0x3B2);
        assert_eq!(Notoriety::Criminal.hue(), 0x3B2);
        assert_eq!(Notoriety::Enemy.hue(), 0x090);
        assert_eq!(Notoriety::Murderer.hue(), 0x022);
        assert_eq!(Notoriety::Invulnerable.hue(), 0x035);
    }

    #[test]
    fn harming_innocents_is_criminal() {
        assert!(Notoriety::Innocent.is_criminal_to_harm());
        assert!(Notoriety::Ally.is_criminal_to_harm());
        assert!(!Notoriety::Criminal.is_criminal_to_harm());
        assert!(!Notoriety::Murderer.is_criminal_to_harm());
    }
}
