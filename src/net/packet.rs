/// Outbound protocol message kinds the delta engine can emit. The payload
/// layout is the minimal big-endian encoding the shard protocol uses; the
/// full client framing lives outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    MobileIncoming,
    RemoveEntity,
    MobileMoving,
    HitsUpdate,
    ManaUpdate,
    StamUpdate,
    MobileStatus,
    PropertiesChanged,
    HairUpdate,
    FacialHairUpdate,
    HealthbarYellow,
    HealthbarPoison,
    ResistRefresh,
    SystemMessage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind, data: Vec<u8>) -> Self {
        Self { kind, data }
    }
}

#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        if self.remaining() < 1 {
            return None;
        }
        let value = self.data[self.pos];
        self.pos += 1;
        Some(value)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        if self.remaining() < 2 {
            return None;
        }
        let hi = self.data[self.pos] as u16;
        let lo = self.data[self.pos + 1] as u16;
        self.pos += 2;
        Some((hi << 8) | lo)
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        let b0 = self.data[self.pos] as u32;
        let b1 = self.data[self.pos + 1] as u32;
        let b2 = self.data[self.pos + 2] as u32;
        let b3 = self.data[self.pos + 3] as u32;
        self.pos += 4;
        Some((b0 << 24) | (b1 << 16) | (b2 << 8) | b3)
    }

    pub fn read_i32(&mut self) -> Option<i32> {
        self.read_u32().map(|value| value as i32)
    }

    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        if self.remaining() < len {
            return None;
        }
        let start = self.pos;
        self.pos += len;
        Some(&self.data[start..start + len])
    }

    pub fn read_string(&mut self) -> Option<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        Some(String::from_utf8_lossy(bytes).to_string())
    }

    pub fn skip(&mut self, len: usize) -> Option<()> {
        if self.remaining() < len {
            return None;
        }
        self.pos += len;
        Some(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PacketWriter {
    data: Vec<u8>,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    pub fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.data.push((value >> 8) as u8);
        self.data.push((value & 0xff) as u8);
    }

    pub fn write_u32(&mut self, value: u32) {
        self.data.push((value >> 24) as u8);
        self.data.push(((value >> 16) & 0xff) as u8);
        self.data.push(((value >> 8) & 0xff) as u8);
        self.data.push((value & 0xff) as u8);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        let bytes = value.as_bytes();
        let len = bytes.len().min(u16::MAX as usize);
        self.write_u16(len as u16);
        self.write_bytes(&bytes[..len]);
    }
}
