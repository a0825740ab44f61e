use crate::mobile::{MobileKind, Serial};
use crate::world::delta::DeltaFlags;
use crate::world::scheduler::{TimerKey, TimerKind, TimerPriority};
use crate::world::state::World;
use crate::world::time::GameTick;

/// Why a combatant transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombatRejection {
    /// The serial does not name a live mobile.
    Deleted,
    /// Another transition on the same mobile has not finished.
    ChangeInProgress,
    /// The region policy refused; the old combatant stands.
    Vetoed,
}

impl std::fmt::Display for CombatRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombatRejection::Deleted => write!(f, "mobile is deleted"),
            CombatRejection::ChangeInProgress => write!(f, "combatant change already in progress"),
            CombatRejection::Vetoed => write!(f, "region policy vetoed the combatant change"),
        }
    }
}

impl World {
    /// Guarded combatant transition. The counted guard covers the region
    /// callback: a second change attempted while one is in flight is refused
    /// cleanly rather than interleaved. Entering combat arms the swing and
    /// idle timers; leaving stops them.
    pub fn set_combatant(
        &mut self,
        serial: Serial,
        target: Option<Serial>,
    ) -> Result<(), CombatRejection> {
        let now = self.clock.now();
        let old = {
            let mobile = self.mobiles.get(&serial).ok_or(CombatRejection::Deleted)?;
            if mobile.deleted {
                return Err(CombatRejection::Deleted);
            }
            if mobile.changing_combatant > 0 {
                return Err(CombatRejection::ChangeInProgress);
            }
            mobile.combatant
        };
        if old == target {
            if target.is_some() {
                self.arm_combat_timers(serial, now);
            }
            return Ok(());
        }

        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            mobile.changing_combatant += 1;
        }
        let accepted = self.region.on_combatant_change(self, serial, old, target);
        {
            let Some(mobile) = self.mobiles.get_mut(&serial) else {
                return Err(CombatRejection::Deleted);
            };
            mobile.changing_combatant = mobile.changing_combatant.saturating_sub(1);
            if accepted {
                mobile.combatant = target;
            }
        }
        if !accepted {
            return Err(CombatRejection::Vetoed);
        }

        if target.is_some() {
            self.arm_combat_timers(serial, now);
        } else {
            self.stop_combat_timers(serial, now);
        }
        self.delta(serial, DeltaFlags::FLAGS);
        Ok(())
    }

    /// Swing cadence runs at elevated priority for slow non-players so their
    /// swings are not starved behind a full tick.
    fn arm_combat_timers(&mut self, serial: Serial, now: GameTick) {
        let Some((kind, dex)) = self
            .mobiles
            .get(&serial)
            .map(|m| (m.kind, m.raw_dex))
        else {
            return;
        };
        let priority = if kind != MobileKind::Player && dex < 50 {
            TimerPriority::High
        } else {
            TimerPriority::Normal
        };
        let swing = self
            .clock
            .ticks_from_millis(self.config.swing_delay_ms)
            .max(1);
        self.timers.set(
            TimerKey {
                serial,
                kind: TimerKind::CombatSwing,
            },
            swing,
            priority,
            now,
        );
        let idle = self
            .clock
            .ticks_from_millis(self.config.combat_idle_timeout_ms)
            .max(1);
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

    fn stop_combat_timers(&mut self, serial: Serial, now: GameTick) {
        self.timers.stop(
            TimerKey {
                serial,
                kind: TimerKind::CombatSwing,
            },
            now,
        );
        self.timers.stop(
            TimerKey {
                serial,
                kind: TimerKind::CombatExpire,
            },
            now,
        );
    }

    /// Unconditional combat teardown; death and disconnect use it because
    /// neither may be vetoed.
    pub(crate) fn clear_combat(&mut self, serial: Serial) {
        let now = self.clock.now();
        if let Some(mobile) = self.mobiles.get_mut(&serial) {
            mobile.combatant = None;
        }
        self.stop_combat_timers(serial, now);
        self.delta(serial, DeltaFlags::FLAGS);
    }

    /// Swing cadence: keep the timer running while the pairing is valid,
    /// drop out of combat when the opponent is gone.
    pub(crate) fn on_combat_swing(&mut self, serial: Serial) {
        let target = match self.mobiles.get(&serial) {
            Some(m) if !m.deleted && m.is_alive() => m.combatant,
            _ => None,
        };
        let Some(target) = target else {
            return;
        };
        let target_ok = self
            .mobiles
            .get(&target)
            .map(|m| !m.deleted && m.is_alive())
            .unwrap_or(false);
        if !target_ok {
            self.clear_combat(serial);
            return;
        }
        let now = self.clock.now();
        self.arm_combat_timers_swing_only(serial, now);
    }

    fn arm_combat_timers_swing_only(&mut self, serial: Serial, now: GameTick) {
        let Some((kind, dex)) = self
            .mobiles
            .get(&serial)
            .map(|m| (m.kind, m.raw_dex))
        else {
            return;
        };
        let priority = if kind != MobileKind::Player && dex < 50 {
            TimerPriority::High
        } else {
            TimerPriority::Normal
        };
        let swing = self
            .clock
            .ticks_from_millis(self.config.swing_delay_ms)
            .max(1);
        self.timers.set(
            TimerKey {
                serial,
                kind: TimerKind::CombatSwing,
            },
            swing,
            priority,
            now,
        );
    }

    /// One idle minute without a hostile refresh ends the engagement.
    pub(crate) fn on_combat_expire(&mut self, serial: Serial) {
        self.clear_combat(serial);
    }
}
