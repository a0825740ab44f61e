pub mod notoriety;
pub mod region;
