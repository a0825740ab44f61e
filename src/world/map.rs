use crate::mobile::Serial;
use crate::world::position::{Direction, Point3D};
use crate::world::state::World;

/// Terrain query the movement pipeline consults before committing a step.
/// `Some(z)` allows the step and names the elevation the mover lands on;
/// `None` blocks it. Implementations own the tile data; the engine never
/// inspects terrain directly.
pub trait MovementOracle: Send + Sync {
    fn check_movement(
        &self,
        world: &World,
        mover: Serial,
        from: Point3D,
        direction: Direction,
    ) -> Option<i32>;
}

/// Featureless ground at a constant elevation. The stock oracle for tests and
/// for shards that patch in terrain later.
#[derive(Debug, Default)]
pub struct Flatland;

impl MovementOracle for Flatland {
    fn check_movement(
        &self,
        _world: &World,
        _mover: Serial,
        from: Point3D,
        _direction: Direction,
    ) -> Option<i32> {
        Some(from.z)
    }
}

/// Blocks a fixed set of tiles; enough oracle for collision tests.
#[derive(Debug, Default)]
pub struct BlockedTiles {
    blocked: Vec<Point3D>,
}

impl BlockedTiles {
    pub fn new(blocked: Vec<Point3D>) -> Self {
        Self { blocked }
    }
}

impl MovementOracle for BlockedTiles {
    fn check_movement(
        &self,
        _world: &World,
        _mover: Serial,
        from: Point3D,
        direction: Direction,
    ) -> Option<i32> {
        let dest = from.step(direction);
        if self
            .blocked
            .iter()
            .any(|tile| tile.x == dest.x && tile.y == dest.y)
        {
            return None;
        }
        Some(from.z)
    }
}
