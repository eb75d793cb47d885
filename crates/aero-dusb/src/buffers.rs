//! Single-slot mailboxes backing device-to-host endpoints.

use std::collections::BTreeMap;

use crate::endpoint::EndpointAddress;

/// One mailbox per IN endpoint. A slot is either empty or holds exactly one payload; reading
/// it empties it, and a new fill overwrites whatever was left unread.
#[derive(Debug, Clone, Default)]
pub struct EndpointBuffers {
    slots: BTreeMap<EndpointAddress, Vec<u8>>,
}

impl EndpointBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the slot contents. Returns `true` if an unread payload was overwritten.
    pub fn fill(&mut self, ep: EndpointAddress, payload: Vec<u8>) -> bool {
        if payload.is_empty() {
            return self.slots.remove(&ep).is_some();
        }
        self.slots.insert(ep, payload).is_some()
    }

    pub fn len(&self, ep: EndpointAddress) -> usize {
        self.slots.get(&ep).map_or(0, Vec::len)
    }

    pub fn is_empty(&self, ep: EndpointAddress) -> bool {
        !self.slots.contains_key(&ep)
    }

    pub fn peek(&self, ep: EndpointAddress) -> Option<&[u8]> {
        self.slots.get(&ep).map(Vec::as_slice)
    }

    /// Copies up to `buf.len()` bytes of the pending payload and empties the slot. Any bytes the
    /// host did not ask for are dropped with the rest of the payload.
    pub fn drain_into(&mut self, ep: EndpointAddress, buf: &mut [u8]) -> Option<usize> {
        let payload = self.slots.remove(&ep)?;
        let len = buf.len().min(payload.len());
        buf[..len].copy_from_slice(&payload[..len]);
        Some(len)
    }

    pub fn clear(&mut self, ep: EndpointAddress) {
        self.slots.remove(&ep);
    }

    pub fn clear_all(&mut self) {
        self.slots.clear();
    }

    /// Number of endpoints holding a payload.
    pub fn occupied(&self) -> usize {
        self.slots.len()
    }
}
