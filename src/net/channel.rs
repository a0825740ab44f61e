use crate::net::packet::Packet;
use std::sync::{Arc, Mutex};

/// The opaque sink a connected client hangs off a mobile. Internally
/// synchronized so the delta drain may deliver from worker threads; a mobile
/// without a channel simply drops its updates.
#[derive(Debug, Clone, Default)]
pub struct ClientChannel {
    queue: Arc<Mutex<Vec<Packet>>>,
}

impl ClientChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&self, packet: Packet) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(packet);
        }
    }

    /// Take everything queued since the last drain. The transport layer (or a
    /// test) consumes from here.
    pub fn drain(&self) -> Vec<Packet> {
        match self.queue.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// The caller asserted the mobile must be online, but no channel is
    /// attached.
    NotConnected,
    /// The serial does not name a live mobile.
    NoSuchMobile,
}

impl std::fmt::Display for NetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetError::NotConnected => write!(f, "mobile has no attached channel"),
            NetError::NoSuchMobile => write!(f, "serial does not name a live mobile"),
        }
    }
}

impl std::error::Error for NetError {}
