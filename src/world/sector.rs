use crate::mobile::Serial;
use crate::world::position::{MapId, Point3D};
use std::collections::HashMap;

/// Sectors are 16x16 tile squares; proximity queries and boundary-crossing
/// notification work at this granularity.
pub const SECTOR_SHIFT: i32 = 4;
pub const SECTOR_SIZE: i32 = 1 << SECTOR_SHIFT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorCoord {
    pub x: i32,
    pub y: i32,
}

impl SectorCoord {
    pub fn of(point: Point3D) -> Self {
        Self {
            x: point.x >> SECTOR_SHIFT,
            y: point.y >> SECTOR_SHIFT,
        }
    }
}

/// Spatial index of live mobiles, bucketed per map and sector.
#[derive(Debug, Default)]
pub struct SectorIndex {
    occupants: HashMap<(MapId, SectorCoord), Vec<Serial>>,
}

impl SectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, map: MapId, location: Point3D, serial: Serial) {
        let bucket = self
            .occupants
            .entry((map, SectorCoord::of(location)))
            .or_default();
        if !bucket.contains(&serial) {
            bucket.push(serial);
        }
    }

    pub fn remove(&mut self, map: MapId, location: Point3D, serial: Serial) {
        let key = (map, SectorCoord::of(location));
        if let Some(bucket) = self.occupants.get_mut(&key) {
            bucket.retain(|entry| *entry != serial);
            if bucket.is_empty() {
                self.occupants.remove(&key);
            }
        }
    }

    /// Re-bucket a mobile after a location change. Returns the two distinct
    /// sector coordinates when the move crossed a boundary.
    pub fn relocate(
        &mut self,
        map: MapId,
        from: Point3D,
        to: Point3D,
        serial: Serial,
    ) -> Option<(SectorCoord, SectorCoord)> {
        let old = SectorCoord::of(from);
        let new = SectorCoord::of(to);
        if old == new {
            return None;
        }
        self.remove(map, from, serial);
        self.insert(map, to, serial);
        Some((old, new))
    }

    pub fn occupants(&self, map: MapId, sector: SectorCoord) -> &[Serial] {
        self.occupants
            .get(&(map, sector))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, map: MapId, location: Point3D, serial: Serial) -> bool {
        self.occupants(map, SectorCoord::of(location))
            .contains(&serial)
    }

    /// Every mobile whose sector overlaps the square of `range` tiles around
    /// `center`. Callers filter by exact range when it matters.
    pub fn mobiles_near(&self, map: MapId, center: Point3D, range: i32) -> Vec<Serial> {
        let min = SectorCoord::of(Point3D::new(center.x - range, center.y - range, center.z));
        let max = SectorCoord::of(Point3D::new(center.x + range, center.y + range, center.z));
        let mut found = Vec::new();
        for sx in min.x..=max.x {
            for sy in min.y..=max.y {
                for serial in self.occupants(map, SectorCoord { x: sx, y: sy }) {
                    found.push(*serial);
                }
            }
        }
        found
    }

    pub fn sector_count(&self) -> usize {
        self.occupants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAP: MapId = MapId(0);

    #[test]
    fn insert_and_remove_roundtrip() {
        let mut index = SectorIndex::new();
        let at = Point3D::new(100, 100, 0);
        index.insert(MAP, at, Serial(1));
        assert!(index.contains(MAP, at, Serial(1)));
        index.remove(MAP, at, Serial(1));
        assert!(!index.contains(MAP, at, Serial(1)));
        assert_eq!(index.sector_count(), 0);
    }

    #[test]
    fn relocate_reports_boundary_crossings_only() {
        let mut index = SectorIndex::new();
        let from = Point3D::new(10, 10, 0);
        let inside = Point3D::new(11, 10, 0);
        let outside = Point3D::new(16, 10, 0);
        index.insert(MAP, from, Serial(5));

        assert_eq!(index.relocate(MAP, from, inside, Serial(5)), None);
        let crossing = index.relocate(MAP, inside, outside, Serial(5));
        assert_eq!(
            crossing,
            Some((SectorCoord { x: 0, y: 0 }, SectorCoord { x: 1, y: 0 }))
        );
        assert!(index.contains(MAP, outside, Serial(5)));
        assert!(!index.contains(MAP, inside, Serial(5)));
    }

    #[test]
    fn mobiles_near_spans_adjacent_sectors() {
        let mut index = SectorIndex::new();
        index.insert(MAP, Point3D::new(15, 15, 0), Serial(1));
        index.insert(MAP, Point3D::new(17, 15, 0), Serial(2));
        index.insert(MAP, Point3D::new(200, 200, 0), Serial(3));

        let near = index.mobiles_near(MAP, Point3D::new(16, 15, 0), 4);
        assert!(near.contains(&Serial(1)));
        assert!(near.contains(&Serial(2)));
        assert!(!near.contains(&Serial(3)));
    }

    #[test]
    fn maps_do_not_leak_into_each_other() {
        let mut index = SectorIndex::new();
        let at = Point3D::new(50, 50, 0);
        index.insert(MapId(0), at, Serial(1));
        index.insert(MapId(1), at, Serial(2));

        let near = index.mobiles_near(MapId(0), at, 8);
        assert_eq!(near, vec![Serial(1)]);
    }
}
