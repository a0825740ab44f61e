use crate::mobile::expiration::ExpireFlag;
use crate::mobile::{Mobile, MobileKind, Serial};
use crate::world::state::World;
use std::collections::HashMap;

/// Per-kind gameplay hooks and formulas. Call sites live in `World`; every
/// hook has the veto/no-op default the stock rules use, so a kind only
/// overrides what it changes.
pub trait MobileBehavior: Send + Sync {
    fn max_hits(&self, str_value: i32) -> i32 {
        50 + str_value / 2
    }

    fn max_stam(&self, dex_value: i32) -> i32 {
        dex_value
    }

    fn max_mana(&self, int_value: i32) -> i32 {
        int_value
    }

    fn hits_regen_millis(&self, _mobile: &Mobile) -> u64 {
        11_000
    }

    /// Faster with dexterity, floored at one second. Takes the effective
    /// stat so active mods shift the cadence.
    fn stam_regen_millis(&self, dex_value: i32) -> u64 {
        (7_000i64 - i64::from(dex_value) * 10).max(1_000) as u64
    }

    /// Faster with intelligence, floored at one second.
    fn mana_regen_millis(&self, int_value: i32) -> u64 {
        (7_000i64 - i64::from(int_value) * 10).max(1_000) as u64
    }

    fn regen_amount(&self) -> i32 {
        1
    }

    /// Whether the aggression path may promote this mobile's combatant.
    fn accepts_combatant_change(&self, _mobile: &Mobile) -> bool {
        true
    }

    /// Sector-boundary hooks; a false return vetoes the whole move.
    fn on_move_off(&self, _world: &World, _occupant: Serial, _mover: Serial) -> bool {
        true
    }

    fn on_move_over(&self, _world: &World, _occupant: Serial, _mover: Serial) -> bool {
        true
    }

    fn on_death(&self, _world: &World, _deceased: Serial) {}

    fn on_expiration_flag_removed(&self, _world: &World, _owner: Serial, _flag: ExpireFlag) {}
}

#[derive(Debug, Default)]
pub struct DefaultBehavior;

impl MobileBehavior for DefaultBehavior {}

/// Dispatch table keyed by mobile kind, with a fallback for unregistered
/// kinds.
pub struct BehaviorTable {
    entries: HashMap<MobileKind, Box<dyn MobileBehavior>>,
    fallback: Box<dyn MobileBehavior>,
}

impl BehaviorTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            fallback: Box::new(DefaultBehavior),
        }
    }

    pub fn register(&mut self, kind: MobileKind, behavior: Box<dyn MobileBehavior>) {
        self.entries.insert(kind, behavior);
    }

    pub fn get(&self, kind: MobileKind) -> &dyn MobileBehavior {
        self.entries
            .get(&kind)
            .map(Box::as_ref)
            .unwrap_or(self.fallback.as_ref())
    }
}

impl Default for BehaviorTable {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BehaviorTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorTable")
            .field("kinds", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Brute;

    impl MobileBehavior for Brute {
        fn max_hits(&self, str_value: i32) -> i32 {
            str_value * 2
        }

        fn accepts_combatant_change(&self, _mobile: &Mobile) -> bool {
            false
        }
    }

    #[test]
    fn unregistered_kinds_use_the_fallback_formula() {
        let table = BehaviorTable::new();
        assert_eq!(table.get(MobileKind::Player).max_hits(100), 100);
        assert_eq!(table.get(MobileKind::Monster).max_stam(80), 80);
    }

    #[test]
    fn registered_kind_overrides_only_what_it_changes() {
        let mut table = BehaviorTable::new();
        table.register(MobileKind::Monster, Box::new(Brute));
        assert_eq!(table.get(MobileKind::Monster).max_hits(100), 200);
        // Unchanged hooks fall through to the trait defaults.
        assert_eq!(table.get(MobileKind::Monster).max_mana(40), 40);
        assert_eq!(table.get(MobileKind::Player).max_hits(100), 100);
    }
}
