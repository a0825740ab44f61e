use crate::mobile::Serial;
use crate::world::delta::DeltaFlags;
use crate::world::scheduler::{TimerKey, TimerKind, TimerPriority};
use crate::world::state::World;
use crate::world::time::GameTick;

/// One row of the aggression ledger. The same row is mirrored on both
/// participants (the attacker's `aggressed` list, the defender's `aggressors`
/// list) and both copies expire together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggressorInfo {
    pub attacker: Serial,
    pub defender: Serial,
    pub last_refresh: GameTick,
    pub criminal: bool,
}

fn refresh_entry(
    entries: &mut Vec<AggressorInfo>,
    attacker: Serial,
    defender: Serial,
    now: GameTick,
    criminal: bool,
) {
    for entry in entries.iter_mut() {
        if entry.attacker == attacker && entry.defender == defender {
            entry.last_refresh = now;
            entry.criminal = entry.criminal || criminal;
            return;
        }
    }
    entries.push(AggressorInfo {
        attacker,
        defender,
        last_refresh: now,
        criminal,
    });
}

impl World {
    /// Would harming this target be a criminal act for the source?
    pub fn harm_is_criminal(&self, source: Serial, target: Serial) -> bool {
        self.notoriety
            .compute(self, source, target)
            .is_criminal_to_harm()
    }

    /// Record one hostile act. Self-aggression is a no-op; a repeat within
    /// the expiry window refreshes the existing row instead of duplicating.
    /// The defender's combatant is promoted when unset, criminal acts flag
    /// the offender, and both sides get an aggression sweep timer.
    pub fn aggressive_action(&mut self, aggressor: Serial, target: Serial, criminal: bool) {
        if aggressor == target {
            return;
        }
        let live = |world: &World, serial: Serial| {
            world
                .mobiles
                .get(&serial)
                .map(|m| !m.deleted)
                .unwrap_or(false)
        };
        if !live(self, aggressor) || !live(self, target) {
            return;
        }
        if !self.region.allow_harmful(self, aggressor, target) {
            return;
        }
        let now = self.clock.now();

        if let Some(mobile) = self.mobiles.get_mut(&aggressor) {
            refresh_entry(&mut mobile.aggressed, aggressor, target, now, criminal);
        }
        if let Some(mobile) = self.mobiles.get_mut(&target) {
            refresh_entry(&mut mobile.aggressors, aggressor, target, now, criminal);
        }
        self.delta(aggressor, DeltaFlags::NOTO);
        self.delta(target, DeltaFlags::NOTO);

        let promote = {
            match self.mobiles.get(&target) {
                Some(m) => {
                    m.combatant.is_none()
                        && m.is_alive()
                        && m.changing_combatant == 0
                        && self.behaviors.get(m.kind).accepts_combatant_change(m)
                }
                None => false,
            }
        };
        if promote {
            let _ = self.set_combatant(target, Some(aggressor));
        }

        self.region.on_aggressed(self, aggressor, target, criminal);
        if criminal {
            self.flag_criminal(aggressor);
        }

        // A hostile act keeps combat alive on both sides.
        let idle = self
            .clock
            .ticks_from_millis(self.config.combat_idle_timeout_ms)
            .max(1);
        for serial in [aggressor, target] {
            let in_combat = self
                .mobiles
                .get(&serial)
                .map(|m| m.combatant.is_some())
                .unwrap_or(false);
            if in_combat {
                self.timers.set(
                    TimerKey {
                        serial,
                        kind: TimerKind::CombatExpire,
                    },
                    idle,
                    TimerPriority::Normal,
                    now,
                );
            }
        }

        let expire = self.aggression_expire_ticks();
        for serial in [aggressor, target] {
            let key = TimerKey {
                serial,
                kind: TimerKind::AggressionSweep,
            };
            if !self.timers.contains(key) {
                self.timers.set(key, expire, TimerPriority::Normal, now);
            }
        }
    }

    /// Pruning read: is `attacker` on `victim`'s aggressor list?
    pub fn check_aggressor(&mut self, victim: Serial, attacker: Serial) -> bool {
        self.prune_aggression(victim);
        self.mobiles
            .get(&victim)
            .map(|m| m.aggressors.iter().any(|info| info.attacker == attacker))
            .unwrap_or(false)
    }

    /// Pruning read: has `aggressor` recently attacked `target`?
    pub fn check_aggressed(&mut self, aggressor: Serial, target: Serial) -> bool {
        self.prune_aggression(aggressor);
        self.mobiles
            .get(&aggressor)
            .map(|m| m.aggressed.iter().any(|info| info.defender == target))
            .unwrap_or(false)
    }

    /// Drop this mobile's expired ledger rows and their mirror copies on the
    /// other participant. Every removal refreshes notoriety on both sides.
    pub(crate) fn prune_aggression(&mut self, serial: Serial) {
        let expire = self.aggression_expire_ticks();
        let now = self.clock.now();
        let (expired_in, expired_out) = {
            let Some(mobile) = self.mobiles.get_mut(&serial) else {
                return;
            };
            let mut expired_in = Vec::new();
            let mut expired_out = Vec::new();
            mobile.aggressors.retain(|info| {
                if now.since(info.last_refresh) >= expire {
                    expired_in.push(*info);
                    false
                } else {
                    true
                }
            });
            mobile.aggressed.retain(|info| {
                if now.since(info.last_refresh) >= expire {
                    expired_out.push(*info);
                    false
                } else {
                    true
                }
            });
            (expired_in, expired_out)
        };
        if expired_in.is_empty() && expired_out.is_empty() {
            return;
        }
        for info in &expired_in {
            if let Some(other) = self.mobiles.get_mut(&info.attacker) {
                other
                    .aggressed
                    .retain(|mirror| mirror.defender != info.defender || mirror.attacker != info.attacker);
            }
            self.delta(info.attacker, DeltaFlags::NOTO);
        }
        for info in &expired_out {
            if let Some(other) = self.mobiles.get_mut(&info.defender) {
                other
                    .aggressors
                    .retain(|mirror| mirror.defender != info.defender || mirror.attacker != info.attacker);
            }
            self.delta(info.defender, DeltaFlags::NOTO);
        }
        self.delta(serial, DeltaFlags::NOTO);
    }

    pub(crate) fn on_aggression_sweep(&mut self, serial: Serial) {
        self.prune_aggression(serial);
        let remaining = self
            .mobiles
            .get(&serial)
            .map(|m| !m.aggressors.is_empty() || !m.aggressed.is_empty())
            .unwrap_or(false);
        if remaining {
            let now = self.clock.now();
            let expire = self.aggression_expire_ticks();
            self.timers.set(
                TimerKey {
                    serial,
                    kind: TimerKind::AggressionSweep,
                },
                expire,
                TimerPriority::Normal,
                now,
            );
        }
    }
}
