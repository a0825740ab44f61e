pub mod channel;
pub mod packet;
