//! File→TX loop: replays a capture file into a transmit ring, honoring the
//! filter per record and truncating anything wider than a ring slot.

use std::time::{Duration, Instant};

use context::{Endpoint, RunContext};
use dispatch::Plan;
use error::{Error, Result};
use filter;
use pcap::CaptureBackend;
use raw;
use ring::{ifindex_for, Ring};
use summary::Summary;
use timer;

use super::{backend_for_file, file_for_endpoint_read};

pub fn run(ctx: &RunContext, plan: &Plan) -> Result<Summary> {
    let ifname = match &ctx.device_out {
        Endpoint::Interface(name) => name.clone(),
        other => {
            return Err(Error::Config {
                reason: format!("file->TX loop requires an interface output, got {:?}", other),
            })
        }
    };
    let ifindex = ifindex_for(&ifname)?;

    let mut ring = Ring::open_tx(ifindex, ctx.reserve_size, ctx.jumbo)?;
    ring.set_packet_loss_discard()?;
    ring.set_hwtimestamp_best_effort();

    let program = filter::parse(ctx.filter.as_deref())?;

    let file = file_for_endpoint_read(&ctx.device_in)?;
    let mut backend = backend_for_file(file, plan.backend, ctx.jumbo, false)?;
    let file_hdr = backend.read_global_header()?;
    let magic = ::context::Magic::from_magic(file_hdr.magic)?;

    timer::install_signal_handlers(timer::AlarmPurpose::FlushTx(ring.as_raw_fd()))?;
    timer::arm_interval(Duration::from_micros(ctx.kernel_pull_interval_us))?;

    let start = Instant::now();
    let mut summary = Summary::new();
    let hdrlen = raw::tpacket2_hdrlen();
    let slot_capacity = ring.frame_size() as usize - hdrlen;
    let mut read_buf = vec![0u8; slot_capacity.max(65536)];

    'outer: while !timer::stop_requested() {
        let idx = ring.current();
        if !ring.tx_slot_ready(idx) {
            continue;
        }

        let (meta, n) = loop {
            match backend.read_record(magic, &mut read_buf)? {
                None => {
                    timer::request_stop();
                    break 'outer;
                }
                Some((meta, n)) => {
                    if ctx.filter.is_none() || program.run(&read_buf[..n]) {
                        break (meta, n);
                    }
                }
            }
        };

        let mut n = n;
        if n > slot_capacity {
            n = slot_capacity;
            summary.record_truncated();
        }

        ring.payload_mut(idx)[..n].copy_from_slice(&read_buf[..n]);
        ring.header_mut(idx).set_len(n as u32);

        summary.record_frame(n as u32);
        let _ = meta;

        ring.tx_release(idx);
        ring.advance();

        if let Some(max) = ctx.frame_count_max {
            if summary.packets_seen >= max {
                timer::request_stop();
            }
        }
    }

    timer::disarm();
    debug!("{}", summary.render(start.elapsed()));
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::{Backend, RunContextBuilder};
    use dispatch::LoopKind;

    #[test]
    fn rejects_non_interface_output() {
        let ctx = RunContextBuilder::new()
            .device_in(Endpoint::Path("/dev/null".into()))
            .device_out(Endpoint::Path("/dev/null".into()))
            .build()
            .unwrap();
        let plan = Plan {
            loop_kind: LoopKind::FileToTx,
            backend: Backend::Mapped,
        };
        assert!(run(&ctx, &plan).is_err());
    }
}
