#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point3D {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u8);

/// Facing order matches the wire encoding: north is 0, clockwise from there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    Northeast,
    East,
    Southeast,
    South,
    Southwest,
    West,
    Northwest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointDelta {
    pub dx: i32,
    pub dy: i32,
}

impl Point3D {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(self, delta: PointDelta) -> Self {
        Self {
            x: self.x.saturating_add(delta.dx),
            y: self.y.saturating_add(delta.dy),
            z: self.z,
        }
    }

    pub fn step(self, direction: Direction) -> Self {
        self.offset(direction.delta())
    }

    pub fn with_z(self, z: i32) -> Self {
        Self { z, ..self }
    }

    /// Chebyshev distance on the ground plane; Z is ignored for range checks.
    pub fn range_to(self, other: Point3D) -> i32 {
        let dx = (self.x - other.x).abs();
        let dy = (self.y - other.y).abs();
        dx.max(dy)
    }
}

impl Direction {
    pub fn delta(self) -> PointDelta {
        match self {
            Direction::North => PointDelta { dx: 0, dy: -1 },
            Direction::Northeast => PointDelta { dx: 1, dy: -1 },
            Direction::East => PointDelta { dx: 1, dy: 0 },
            Direction::Southeast => PointDelta { dx: 1, dy: 1 },
            Direction::South => PointDelta { dx: 0, dy: 1 },
            Direction::Southwest => PointDelta { dx: -1, dy: 1 },
            Direction::West => PointDelta { dx: -1, dy: 0 },
            Direction::Northwest => PointDelta { dx: -1, dy: -1 },
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Direction::North => 0,
            Direction::Northeast => 1,
            Direction::East => 2,
            Direction::Southeast => 3,
            Direction::South => 4,
            Direction::Southwest => 5,
            Direction::West => 6,
            Direction::Northwest => 7,
        }
    }

    pub fn from_byte(value: u8) -> Self {
        match value & 0x7 {
            0 => Direction::North,
            1 => Direction::Northeast,
            2 => Direction::East,
            3 => Direction::Southeast,
            4 => Direction::South,
            5 => Direction::Southwest,
            6 => Direction::West,
            _ => Direction::Northwest,
        }
    }
}

/// Facing plus the running bit, as carried in movement requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Facing {
    pub direction: Direction,
    pub running: bool,
}

impl Facing {
    pub fn new(direction: Direction, running: bool) -> Self {
        Self { direction, running }
    }

    pub fn as_byte(self) -> u8 {
        let mut value = self.direction.as_byte();
        if self.running {
            value |= 0x80;
        }
        value
    }

    pub fn from_byte(value: u8) -> Self {
        Self {
            direction: Direction::from_byte(value),
            running: value & 0x80 != 0,
        }
    }
}

impl Default for Facing {
    fn default() -> Self {
        Self {
            direction: Direction::South,
            running: false,
        }
    }
}
