pub mod delta;
pub mod map;
pub mod movement;
pub mod position;
pub mod scheduler;
pub mod sector;
pub mod state;
pub mod time;
