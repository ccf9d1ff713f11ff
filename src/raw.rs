#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(unused)]

//! Raw `PACKET_MMAP`/BPF struct and constant bindings generated from the kernel
//! UAPI headers (`<linux/if_packet.h>`, `<linux/filter.h>`, `<net/if.h>`). Most
//! RX-ring items (`tpacket_req`, `tpacket_hdr`, `sockaddr_ll`, `SO_ATTACH_FILTER`,
//! ...) are already exposed directly by `libc`; this module only supplies the
//! TPACKET2-era items `libc` omits (`tpacket2_hdr`, the extended `TP_STATUS_*`
//! bits, `tpacket_auxdata`) plus the few constants bindgen can compute that
//! `libc` does not (`TPACKET_ALIGNMENT`-derived header lengths).

include!(concat!(env!("OUT_DIR"), "/bindings.rs"));

/// `TPACKET2_HDRLEN` from `<linux/if_packet.h>`: the aligned `tpacket2_hdr`
/// size plus the `sockaddr_ll` that precedes frame data in a v2 ring slot.
pub fn tpacket2_hdrlen() -> usize {
    sockaddr_ll_offset() + std::mem::size_of::<libc::sockaddr_ll>()
}

/// Offset of the `sockaddr_ll` that sits between the aligned `tpacket2_hdr`
/// and the frame payload in a v2 ring slot.
pub fn sockaddr_ll_offset() -> usize {
    tpacket_align(std::mem::size_of::<tpacket2_hdr>())
}

const TPACKET_ALIGNMENT: usize = 16;

fn tpacket_align(x: usize) -> usize {
    (x + TPACKET_ALIGNMENT - 1) & !(TPACKET_ALIGNMENT - 1)
}
