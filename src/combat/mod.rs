pub mod aggression;
pub mod combatant;
pub mod damage;
