use crate::mobile::Serial;
use crate::world::state::World;

/// Narrow callback surface consulted before combat, aggression, and
/// beneficial-action transitions commit. A `false` return vetoes the
/// transition with no partial side effects; the hooks run before any state
/// change, so they observe the world as it was.
pub trait RegionPolicy: Send + Sync {
    fn allow_harmful(&self, _world: &World, _source: Serial, _target: Serial) -> bool {
        true
    }

    fn allow_beneficial(&self, _world: &World, _source: Serial, _target: Serial) -> bool {
        true
    }

    fn on_combatant_change(
        &self,
        _world: &World,
        _owner: Serial,
        _old: Option<Serial>,
        _new: Option<Serial>,
    ) -> bool {
        true
    }

    fn on_aggressed(&self, _world: &World, _aggressor: Serial, _target: Serial, _criminal: bool) {}

    fn on_criminal_action(&self, _world: &World, _offender: Serial) {}

    /// May adjust incoming damage before it is applied.
    fn on_damage(&self, _world: &World, _target: Serial, _source: Option<Serial>, _amount: &mut i32) {
    }

    fn on_heal(&self, _world: &World, _target: Serial, _source: Option<Serial>, _amount: &mut i32) {}

    fn on_death(&self, _world: &World, _deceased: Serial) {}
}

/// Default policy: no region anywhere objects to anything.
#[derive(Debug, Default)]
pub struct NullRegionPolicy;

impl RegionPolicy for NullRegionPolicy {}
