use crate::mobile::{MobileFlags, Serial};
use crate::net::packet::{Packet, PacketKind, PacketWriter};
use crate::telemetry::logging;
use crate::world::delta::{mobile_moving, PacketCache};
use crate::world::position::Facing;
use crate::world::scheduler::{TimerKey, TimerKind, TimerPriority};
use crate::world::sector::SectorCoord;
use crate::world::state::World;
use crate::world::time::GameTick;
use std::time::Duration;

/// Why a movement request was refused. No rejection leaves partial state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveRejection {
    Deleted,
    Paralyzed,
    Frozen,
    Blocked,
    Vetoed,
    TooFast,
}

impl std::fmt::Display for MoveRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoveRejection::Deleted => write!(f, "mobile is deleted"),
            MoveRejection::Paralyzed => write!(f, "mobile is paralyzed"),
            MoveRejection::Frozen => write!(f, "mobile is frozen"),
            MoveRejection::Blocked => write!(f, "terrain blocks the step"),
            MoveRejection::Vetoed => write!(f, "an occupant vetoed the step"),
            MoveRejection::TooFast => write!(f, "step rate exceeded"),
        }
    }
}

/// Consulted only once a mover exceeds the configured steps-per-window
/// threshold; the verdict applies to the step that crossed the line.
pub trait FastwalkPolicy: Send + Sync {
    fn allow_step(&self, world: &World, mover: Serial, steps_in_window: usize) -> bool;
}

/// Stock policy: anything over the window threshold is refused.
#[derive(Debug, Default)]
pub struct WindowFastwalk;

impl FastwalkPolicy for WindowFastwalk {
    fn allow_step(&self, _world: &World, _mover: Serial, _steps_in_window: usize) -> bool {
        false
    }
}

/// Trusts the client entirely; staff shards and tests use it.
#[derive(Debug, Default)]
pub struct LenientFastwalk;

impl FastwalkPolicy for LenientFastwalk {
    fn allow_step(&self, _world: &World, _mover: Serial, _steps_in_window: usize) -> bool {
        true
    }
}

pub(crate) fn system_message(text: &str) -> Packet {
    let mut writer = PacketWriter::with_capacity(text.len() + 2);
    writer.write_string(text);
    Packet::new(PacketKind::SystemMessage, writer.into_vec())
}

impl World {
    /// One step (or turn in place) in the requested direction. A request
    /// whose direction differs from the current facing only turns; it still
    /// costs a step against the fastwalk window and still broadcasts.
    pub fn move_mobile(&mut self, serial: Serial, facing: Facing) -> Result<(), MoveRejection> {
        let now = self.clock.now();
        let (location, map, current_facing) = {
            let mobile = self.mobiles.get(&serial).ok_or(MoveRejection::Deleted)?;
            if mobile.deleted {
                return Err(MoveRejection::Deleted);
            }
            if mobile.flags.contains(MobileFlags::PARALYZED) {
                self.send_to(serial, system_message("You are paralyzed and cannot move!"));
                return Err(MoveRejection::Paralyzed);
            }
            if mobile.flags.contains(MobileFlags::FROZEN) {
                self.send_to(serial, system_message("You cannot move."));
                return Err(MoveRejection::Frozen);
            }
            let map = mobile.map.ok_or(MoveRejection::Deleted)?;
            (mobile.location, map, mobile.facing)
        };

        if facing.direction != current_facing.direction {
            self.note_step(serial, now)?;
            if let Some(mobile) = self.mobiles.get_mut(&serial) {
                mobile.facing = facing;
            }
            self.broadcast_moving(serial);
            return Ok(());
        }

        let direction = facing.direction;
        let new_z = self
            .oracle
            .check_movement(self, serial, location, direction)
            .ok_or(MoveRejection::Blocked)?;
        let dest = location.step(direction).with_z(new_z);

        let old_sector = SectorCoord::of(location);
        let new_sector = SectorCoord::of(dest);
        if old_sector != new_sector {
            for occupant in self.sectors.occupants(map, old_sector).to_vec() {
                if occupant == serial {
                    continue;
                }
                let kind = match self.mobiles.get(&occupant) {
                    Some(m) if !m.deleted => m.kind,
                    _ => continue,
                };
                if !self.behaviors.get(kind).on_move_off(self, occupant, serial) {
                    return Err(MoveRejection::Vetoed);
                }
            }
            for occupant in self.sectors.occupants(map, new_sector).to_vec() {
                if occupant == serial {
                    continue;
                }
                let kind = match self.mobiles.get(&occupant) {
                    Some(m) if !m.deleted => m.kind,
                    _ => continue,
                };
                if !self.behaviors.get(kind).on_move_over(self, occupant, serial) {
                    return Err(MoveRejection::Vetoed);
                }
            }
        }

        self.note_step(serial, now)?;

        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            mobile.location = dest;
            mobile.facing = facing;
        }
        self.sectors.relocate(map, location, dest, serial);
        self.broadcast_moving(serial);
        Ok(())
    }

    /// Record one step in the sliding window; over the threshold the
    /// fastwalk policy decides, and a refusal takes the step back.
    fn note_step(&mut self, serial: Serial, now: GameTick) -> Result<(), MoveRejection> {
        let window = self
            .clock
            .ticks_from_millis(self.config.fastwalk_window_ms)
            .max(1);
        let max_steps = self.config.fastwalk_max_steps;
        let steps = {
            let Some(mobile) = self.mobiles.get_mut(&serial) else {
                return Err(MoveRejection::Deleted);
            };
            while let Some(front) = mobile.recent_steps.front() {
                if now.since(*front) >= window {
                    mobile.recent_steps.pop_front();
                } else {
                    break;
                }
            }
            mobile.recent_steps.push_back(now);
            mobile.recent_steps.len()
        };
        if steps > max_steps && !self.fastwalk.allow_step(self, serial, steps) {
            if let Some(mobile) = self.mobiles.get_mut(&serial) {
                mobile.recent_steps.pop_back();
            }
            logging::log_movement(&format!(
                "{} refused: {} steps inside the fastwalk window",
                serial, steps
            ));
            return Err(MoveRejection::TooFast);
        }
        Ok(())
    }

    /// Hue-cached position refresh to every observer; the movement commit and
    /// the flag/notoriety deltas both use it.
    pub(crate) fn broadcast_moving(&self, serial: Serial) {
        let Some(subject) = self.mobiles.get(&serial) else {
            return;
        };
        let mut cache = PacketCache::new();
        for observer in self.observers_of(serial) {
            let noto = self.notoriety.compute(self, observer, serial);
            let packet = cache.get_or_build(noto, |hue| mobile_moving(subject, hue));
            self.send_to(observer, packet);
        }
    }

    /// Step cost, independent of execution: walk 400 ms, run 200 ms, both
    /// halved while mounted.
    pub fn compute_movement_speed(&self, serial: Serial, running: bool) -> Duration {
        let mounted = self
            .mobiles
            .get(&serial)
            .map(|m| m.flags.contains(MobileFlags::MOUNTED))
            .unwrap_or(false);
        let mut millis: u64 = if running { 200 } else { 400 };
        if mounted {
            millis /= 2;
        }
        Duration::from_millis(millis)
    }

    pub fn paralyze(&mut self, serial: Serial, duration_ticks: u64) {
        let Some(mobile) = self.mobiles.get(&serial) else {
            return;
        };
        if mobile.deleted {
            return;
        }
        self.set_flag(serial, MobileFlags::PARALYZED, true);
        let now = self.clock.now();
        self.timers.set(
            TimerKey {
                serial,
                kind: TimerKind::Paralysis,
            },
            duration_ticks.max(1),
            TimerPriority::Normal,
            now,
        );
    }

    pub(crate) fn on_paralysis_timer(&mut self, serial: Serial) {
        self.set_flag(serial, MobileFlags::PARALYZED, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mobile::behavior::MobileBehavior;
    use crate::mobile::{Mobile, MobileKind};
    use crate::world::map::BlockedTiles;
    use crate::world::position::{Direction, MapId, Point3D};
    use crate::world::state::tests::test_world;

    fn walk(direction: Direction) -> Facing {
        Facing::new(direction, false)
    }

    #[test]
    fn a_step_moves_and_reindexes() {
        let (mut world, _, _) = test_world();
        // Start at a sector edge so the step lands in the next bucket.
        let edge = Point3D::new(111, 100, 0);
        let m = world.create_mobile("walker", MobileKind::Player, MapId(0), edge);
        // First request turns (spawn facing is south), second steps.
        world.move_mobile(m, walk(Direction::East)).expect("turn");
        world.move_mobile(m, walk(Direction::East)).expect("step");

        let mobile = world.mobile(m).unwrap();
        assert_eq!(mobile.location, Point3D::new(112, 100, 0));
        assert!(world.sectors.contains(MapId(0), mobile.location, m));
        assert!(!world.sectors.contains(MapId(0), edge, m));
    }

    #[test]
    fn turning_in_place_changes_facing_only() {
        let (mut world, a, _) = test_world();
        let before = world.mobile(a).unwrap().location;
        world.move_mobile(a, walk(Direction::North)).expect("turn");

        let mobile = world.mobile(a).unwrap();
        assert_eq!(mobile.location, before);
        assert_eq!(mobile.facing.direction, Direction::North);
        assert_eq!(mobile.recent_steps.len(), 1);
    }

    #[test]
    fn paralyzed_movers_are_refused_with_a_message() {
        let (mut world, a, _) = test_world();
        let channel = crate::net::channel::ClientChannel::new();
        world.attach_channel(a, channel.clone());
        world.paralyze(a, 50);
        channel.drain();

        assert_eq!(
            world.move_mobile(a, walk(Direction::East)),
            Err(MoveRejection::Paralyzed)
        );
        let packets = channel.drain();
        assert!(packets
            .iter()
            .any(|p| p.kind == PacketKind::SystemMessage));

        // The paralysis timer releases the flag.
        world.run_ticks(50);
        world.move_mobile(a, walk(Direction::East)).expect("turn");
    }

    #[test]
    fn terrain_blocks_abort_with_no_state_change() {
        let (mut world, a, _) = test_world();
        world.set_movement_oracle(Box::new(BlockedTiles::new(vec![Point3D::new(101, 100, 0)])));
        world.move_mobile(a, walk(Direction::East)).expect("turn");

        assert_eq!(
            world.move_mobile(a, walk(Direction::East)),
            Err(MoveRejection::Blocked)
        );
        assert_eq!(world.mobile(a).unwrap().location, Point3D::new(100, 100, 0));
    }

    struct Territorial;

    impl MobileBehavior for Territorial {
        fn on_move_over(&self, _world: &World, _occupant: Serial, _mover: Serial) -> bool {
            false
        }
    }

    #[test]
    fn sector_crossing_veto_aborts_the_move() {
        let (mut world, a, _) = test_world();
        world.register_behavior(MobileKind::Monster, Box::new(Territorial));
        // Guard in the sector east of the mover's.
        let guard = Mobile::new(Serial(500), "guard", MobileKind::Monster);
        world.insert_mobile(guard, MapId(0), Point3D::new(115, 100, 0));

        // Walk the mover to the sector edge, then across.
        world.move_mobile(a, walk(Direction::East)).expect("turn");
        for _ in 100..111 {
            world.run_ticks(20);
            world.move_mobile(a, walk(Direction::East)).expect("step");
        }
        assert_eq!(world.mobile(a).unwrap().location.x, 111);

        world.run_ticks(20);
        assert_eq!(
            world.move_mobile(a, walk(Direction::East)),
            Err(MoveRejection::Vetoed)
        );
        assert_eq!(world.mobile(a).unwrap().location.x, 111);
    }

    #[test]
    fn fastwalk_window_throttles_burst_steps() {
        let (mut world, a, _) = test_world();
        world.move_mobile(a, walk(Direction::East)).expect("turn");
        // The default window allows five steps; the turn used one.
        for _ in 0..4 {
            world.move_mobile(a, walk(Direction::East)).expect("step");
        }
        assert_eq!(
            world.move_mobile(a, walk(Direction::East)),
            Err(MoveRejection::TooFast)
        );

        // Once the window slides past, stepping resumes.
        let window = world.clock.ticks_from_millis(world.config().fastwalk_window_ms);
        world.run_ticks(window);
        world.move_mobile(a, walk(Direction::East)).expect("step");
    }

    #[test]
    fn lenient_policy_waves_bursts_through() {
        let (mut world, a, _) = test_world();
        world.set_fastwalk_policy(Box::new(LenientFastwalk));
        world.move_mobile(a, walk(Direction::East)).expect("turn");
        for _ in 0..20 {
            world.move_mobile(a, walk(Direction::East)).expect("step");
        }
    }

    #[test]
    fn movement_speed_follows_gait_and_mount() {
        let (mut world, a, _) = test_world();
        assert_eq!(world.compute_movement_speed(a, false), Duration::from_millis(400));
        assert_eq!(world.compute_movement_speed(a, true), Duration::from_millis(200));

        world.set_flag(a, MobileFlags::MOUNTED, true);
        assert_eq!(world.compute_movement_speed(a, false), Duration::from_millis(200));
        assert_eq!(world.compute_movement_speed(a, true), Duration::from_millis(100));
    }
}
