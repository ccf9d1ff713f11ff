//! Component A: the mapped RX/TX ring. Wraps a `PACKET_MMAP` ring the kernel
//! creates on request; the only synchronization with the kernel producer or
//! consumer is the per-slot ownership bit (`tp_status`), observed/published
//! with acquire/release fences rather than a lock.

pub mod frame;

use std::ffi::CString;
use std::io;
use std::mem::size_of;
use std::os::unix::io::RawFd;
use std::sync::atomic::{fence, Ordering};

use rand::Rng;

use error::{Error, Result};
use filter::Program;
use raw;

pub use self::frame::{FrameHeader, FrameHeaderMut, PacketClass};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

/// A mapped ring of `frame_nr` equal-sized slots bound to one interface.
pub struct Ring {
    fd: RawFd,
    map: *mut u8,
    map_len: usize,
    frame_size: u32,
    frame_nr: u32,
    cursor: usize,
    direction: Direction,
}

fn last_os_err() -> Error {
    Error::Io {
        inner: io::Error::last_os_error(),
    }
}

fn htons(v: u16) -> u16 {
    v.to_be()
}

pub fn ifindex_for(name: &str) -> Result<i32> {
    let cname = CString::new(name)?;
    let idx = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if idx == 0 {
        return Err(Error::NoDevice {
            reason: format!("no such interface: {}", name),
        });
    }
    Ok(idx as i32)
}

impl Ring {
    fn open(
        direction: Direction,
        ifindex: i32,
        reserve_size: usize,
        jumbo: bool,
        promiscuous: bool,
    ) -> Result<Ring> {
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, htons(libc::ETH_P_ALL as u16) as i32) };
        if fd < 0 {
            return Err(last_os_err());
        }

        let version = raw::tpacket_versions::TPACKET_V2 as libc::c_int;
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                libc::PACKET_VERSION,
                &version as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let e = last_os_err();
            unsafe { libc::close(fd) };
            return Err(e);
        }

        let frame_size: u32 = if jumbo { 16 * page_size::get() as u32 } else { 3 * page_size::get() as u32 };
        let block_size: u32 = reserve_size.max(frame_size as usize) as u32;
        let block_size = round_up_pow2(block_size.max(frame_size));
        let block_nr: u32 = 64;
        let req = libc::tpacket_req {
            tp_block_size: block_size,
            tp_block_nr: block_nr,
            tp_frame_size: frame_size,
            tp_frame_nr: (block_size / frame_size) * block_nr,
        };

        let optname = match direction {
            Direction::Rx => libc::PACKET_RX_RING,
            Direction::Tx => libc::PACKET_TX_RING,
        };
        let ret = unsafe {
            libc::setsockopt(
                fd,
                libc::SOL_PACKET,
                optname,
                &req as *const _ as *const libc::c_void,
                size_of::<libc::tpacket_req>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let e = last_os_err();
            unsafe { libc::close(fd) };
            return Err(Error::Config {
                reason: format!("kernel rejected ring layout: {}", e),
            });
        }

        let map_len = (req.tp_block_size as usize) * (req.tp_block_nr as usize);
        let map = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        if map == libc::MAP_FAILED {
            let e = last_os_err();
            unsafe { libc::close(fd) };
            return Err(e);
        }

        let mut sll: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        sll.sll_family = libc::AF_PACKET as u16;
        sll.sll_protocol = htons(libc::ETH_P_ALL as u16);
        sll.sll_ifindex = ifindex;
        let ret = unsafe {
            libc::bind(
                fd,
                &sll as *const _ as *const libc::sockaddr,
                size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            let e = last_os_err();
            unsafe {
                libc::munmap(map, map_len);
                libc::close(fd);
            }
            return Err(e);
        }

        if promiscuous && direction == Direction::Rx {
            let mreq = libc::packet_mreq {
                mr_ifindex: ifindex,
                mr_type: libc::PACKET_MR_PROMISC as u16,
                mr_alen: 0,
                mr_address: [0; 8],
            };
            unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_PACKET,
                    libc::PACKET_ADD_MEMBERSHIP,
                    &mreq as *const _ as *const libc::c_void,
                    size_of::<libc::packet_mreq>() as libc::socklen_t,
                );
            }
        }

        Ok(Ring {
            fd,
            map: map as *mut u8,
            map_len,
            frame_size: req.tp_frame_size,
            frame_nr: req.tp_frame_nr,
            cursor: 0,
            direction,
        })
    }

    pub fn open_rx(ifindex: i32, reserve_size: usize, jumbo: bool, promiscuous: bool) -> Result<Ring> {
        Ring::open(Direction::Rx, ifindex, reserve_size, jumbo, promiscuous)
    }

    pub fn open_tx(ifindex: i32, reserve_size: usize, jumbo: bool) -> Result<Ring> {
        Ring::open(Direction::Tx, ifindex, reserve_size, jumbo, false)
    }

    pub fn as_raw_fd(&self) -> RawFd {
        self.fd
    }

    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn frame_nr(&self) -> u32 {
        self.frame_nr
    }

    pub fn current(&self) -> usize {
        self.cursor
    }

    fn slot_ptr(&self, idx: usize) -> *mut u8 {
        debug_assert!(idx < self.frame_nr as usize);
        unsafe { self.map.add(idx * self.frame_size as usize) }
    }

    /// Attaches a classic-BPF program compiled by [`crate::filter`] to the RX socket.
    pub fn attach_filter(&self, program: &Program) -> Result<()> {
        let insns = program.as_sock_filter();
        let prog = libc::sock_fprog {
            len: insns.len() as u16,
            filter: insns.as_ptr() as *mut libc::sock_filter,
        };
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_ATTACH_FILTER,
                &prog as *const _ as *const libc::c_void,
                size_of::<libc::sock_fprog>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(last_os_err());
        }
        Ok(())
    }

    pub fn set_packet_loss_discard(&self) -> Result<()> {
        let one: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_PACKET,
                raw::PACKET_LOSS as libc::c_int,
                &one as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        // best-effort: older kernels may not support this option.
        if ret < 0 {
            debug!("set_packet_loss_discard: {}", io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn set_hwtimestamp_best_effort(&self) {
        let flags: libc::c_int =
            libc::SOF_TIMESTAMPING_RAW_HARDWARE | libc::SOF_TIMESTAMPING_SYS_HARDWARE;
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_TIMESTAMPING,
                &flags as *const _ as *const libc::c_void,
                size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            debug!("hardware timestamping unsupported: {}", io::Error::last_os_error());
        }
    }

    /// Reads the ownership bit for `idx`. On `true`, acquires the kernel's
    /// prior writes to the rest of the slot header.
    pub fn rx_slot_ready(&self, idx: usize) -> bool {
        let status = unsafe { FrameHeader::from_slot(self.slot_ptr(idx)).status() };
        let ready = status & libc::TP_STATUS_USER != 0;
        if ready {
            fence(Ordering::Acquire);
        }
        ready
    }

    pub fn tx_slot_ready(&self, idx: usize) -> bool {
        let status = unsafe { FrameHeader::from_slot(self.slot_ptr(idx)).status() };
        status == libc::TP_STATUS_AVAILABLE
    }

    /// Publishes `idx` back to the kernel, releasing this side's writes.
    pub fn rx_release(&mut self, idx: usize) {
        fence(Ordering::Release);
        unsafe {
            FrameHeaderMut::from_slot(self.slot_ptr(idx)).set_status(libc::TP_STATUS_KERNEL);
        }
    }

    pub fn tx_release(&mut self, idx: usize) {
        fence(Ordering::Release);
        unsafe {
            FrameHeaderMut::from_slot(self.slot_ptr(idx)).set_status(libc::TP_STATUS_SEND_REQUEST);
        }
    }

    pub fn header(&self, idx: usize) -> FrameHeader {
        unsafe { FrameHeader::from_slot(self.slot_ptr(idx)) }
    }

    pub fn header_mut(&mut self, idx: usize) -> FrameHeaderMut {
        unsafe { FrameHeaderMut::from_slot(self.slot_ptr(idx)) }
    }

    /// Slice of the frame payload for a ready RX slot.
    pub fn payload(&self, idx: usize) -> &[u8] {
        let hdr = self.header(idx);
        unsafe {
            std::slice::from_raw_parts(
                self.slot_ptr(idx).add(hdr.mac_offset() as usize),
                hdr.snaplen() as usize,
            )
        }
    }

    /// Mutable payload region of a TX slot, offset past the v2 header + `sockaddr_ll`.
    pub fn payload_mut(&mut self, idx: usize) -> &mut [u8] {
        let frame_size = self.frame_size as usize;
        let hdrlen = raw::tpacket2_hdrlen();
        unsafe {
            std::slice::from_raw_parts_mut(self.slot_ptr(idx).add(hdrlen), frame_size - hdrlen)
        }
    }

    pub fn advance(&mut self) -> usize {
        let prev = self.cursor;
        self.cursor = (self.cursor + 1) % self.frame_nr as usize;
        prev
    }

    /// Picks a uniformly random slot different from the current one; used only
    /// for TX under randomize mode (no need for a high-quality RNG).
    pub fn advance_random(&mut self) -> usize {
        let prev = self.cursor;
        if self.frame_nr > 1 {
            let mut rng = rand::thread_rng();
            loop {
                let next = rng.gen_range(0, self.frame_nr as usize);
                if next != prev {
                    self.cursor = next;
                    break;
                }
            }
        }
        prev
    }
}

fn round_up_pow2(mut v: u32) -> u32 {
    v -= 1;
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v + 1
}

impl Drop for Ring {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.map as *mut libc::c_void, self.map_len);
            libc::close(self.fd);
        }
    }
}

unsafe impl Send for Ring {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_up_pow2_rounds_correctly() {
        assert_eq!(round_up_pow2(1), 1);
        assert_eq!(round_up_pow2(5), 8);
        assert_eq!(round_up_pow2(4096), 4096);
        assert_eq!(round_up_pow2(4097), 8192);
    }
}
