use std::mem::size_of;

use raw;

/// Kernel-classification bits for a received frame, as they appear in
/// `sockaddr_ll::sll_pkttype`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketClass {
    Host,
    Broadcast,
    Multicast,
    OtherHost,
    Outgoing,
}

impl PacketClass {
    pub fn from_sll_pkttype(t: u8) -> Option<PacketClass> {
        match t as i32 {
            libc::PACKET_HOST => Some(PacketClass::Host),
            libc::PACKET_BROADCAST => Some(PacketClass::Broadcast),
            libc::PACKET_MULTICAST => Some(PacketClass::Multicast),
            libc::PACKET_OTHERHOST => Some(PacketClass::OtherHost),
            libc::PACKET_OUTGOING => Some(PacketClass::Outgoing),
            _ => None,
        }
    }

    pub fn matches(self, filter: ::context::PacketType) -> bool {
        use context::PacketType as PT;
        let bit = match self {
            PacketClass::Host => PT::HOST,
            PacketClass::Broadcast => PT::BROADCAST,
            PacketClass::Multicast => PT::MULTICAST,
            PacketClass::OtherHost => PT::OTHER_HOST,
            PacketClass::Outgoing => PT::OUTGOING,
        };
        filter.contains(bit)
    }
}

/// Read-only view of a `tpacket2_hdr`-framed slot's metadata, decoded from raw
/// ring memory. Does not copy the payload.
pub struct FrameHeader<'a> {
    hdr: &'a raw::tpacket2_hdr,
    base: *const u8,
}

impl<'a> FrameHeader<'a> {
    /// # Safety
    /// `base` must point at a live ring slot at least `tpacket2_hdrlen()` bytes long.
    pub unsafe fn from_slot(base: *const u8) -> FrameHeader<'a> {
        FrameHeader {
            hdr: &*(base as *const raw::tpacket2_hdr),
            base,
        }
    }

    /// The kernel's classification of this frame (`sockaddr_ll::sll_pkttype`),
    /// read out of the `sockaddr_ll` the kernel places right after the header.
    pub fn pkttype(&self) -> u8 {
        unsafe {
            let sll = self.base.add(raw::sockaddr_ll_offset()) as *const libc::sockaddr_ll;
            (*sll).sll_pkttype
        }
    }

    pub fn status(&self) -> u32 {
        self.hdr.tp_status
    }

    pub fn snaplen(&self) -> u32 {
        self.hdr.tp_snaplen
    }

    pub fn len(&self) -> u32 {
        self.hdr.tp_len
    }

    pub fn mac_offset(&self) -> u16 {
        self.hdr.tp_mac
    }

    pub fn timestamp(&self) -> (u32, u32) {
        (self.hdr.tp_sec, self.hdr.tp_nsec)
    }
}

/// Mutable view used when publishing a TX slot.
pub struct FrameHeaderMut<'a> {
    hdr: &'a mut raw::tpacket2_hdr,
}

impl<'a> FrameHeaderMut<'a> {
    /// # Safety
    /// `base` must point at a live, user-owned ring slot.
    pub unsafe fn from_slot(base: *mut u8) -> FrameHeaderMut<'a> {
        FrameHeaderMut {
            hdr: &mut *(base as *mut raw::tpacket2_hdr),
        }
    }

    pub fn set_len(&mut self, len: u32) {
        self.hdr.tp_len = len;
        self.hdr.tp_snaplen = len;
    }

    pub fn set_status(&mut self, status: u32) {
        self.hdr.tp_status = status;
    }
}

pub fn header_size() -> usize {
    size_of::<raw::tpacket2_hdr>()
}
