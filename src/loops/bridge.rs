//! RX→TX bridge: forwards every accepted frame from one interface straight
//! into another interface's transmit ring, copying the payload once.

use std::time::{Duration, Instant};

use context::{Endpoint, RunContext};
use error::{Error, Result};
use ring::{ifindex_for, Ring};
use summary::Summary;
use timer;

/// Spins the TX ring cursor until a ready slot turns up, or the stop flag
/// fires while waiting. There is no TX-side suspension point in the original
/// design — the flush-TX timer is what keeps the kernel draining slots.
fn next_ready_tx(ring: &mut Ring, randomize: bool) -> Option<usize> {
    let frame_nr = ring.frame_nr() as usize;
    for _ in 0..frame_nr.max(1) * 4 {
        if timer::stop_requested() {
            return None;
        }
        let idx = if randomize { ring.advance_random() } else { ring.current() };
        if ring.tx_slot_ready(idx) {
            if !randomize {
                ring.advance();
            }
            return Some(idx);
        }
        if !randomize {
            ring.advance();
        }
    }
    None
}

pub fn run(ctx: &RunContext) -> Result<Summary> {
    let in_name = match &ctx.device_in {
        Endpoint::Interface(name) => name.clone(),
        other => {
            return Err(Error::Config {
                reason: format!("bridge loop requires an interface input, got {:?}", other),
            })
        }
    };
    let out_name = match &ctx.device_out {
        Endpoint::Interface(name) => name.clone(),
        other => {
            return Err(Error::Config {
                reason: format!("bridge loop requires an interface output, got {:?}", other),
            })
        }
    };
    if in_name == out_name {
        return Err(Error::Config {
            reason: "ingress and egress devices must be different".into(),
        });
    }

    let ifindex_in = ifindex_for(&in_name)?;
    let ifindex_out = ifindex_for(&out_name)?;

    let mut rx = Ring::open_rx(ifindex_in, ctx.reserve_size, ctx.jumbo, ctx.promiscuous)?;
    let mut tx = Ring::open_tx(ifindex_out, ctx.reserve_size, ctx.jumbo)?;
    tx.set_packet_loss_discard()?;
    tx.set_hwtimestamp_best_effort();

    let program = ::filter::parse(ctx.filter.as_deref())?;
    rx.attach_filter(&program)?;

    timer::install_signal_handlers(timer::AlarmPurpose::FlushTx(tx.as_raw_fd()))?;
    timer::arm_interval(Duration::from_micros(ctx.kernel_pull_interval_us))?;

    let start = Instant::now();
    let mut summary = Summary::new();

    while !timer::stop_requested() {
        let rx_idx = rx.current();
        if !rx.rx_slot_ready(rx_idx) {
            super::wait_readable(rx.as_raw_fd())?;
            continue;
        }

        let tx_idx = match next_ready_tx(&mut tx, ctx.randomize) {
            Some(i) => i,
            None => break,
        };

        let hdr = rx.header(rx_idx);
        let caplen = hdr.snaplen();
        let len = hdr.len();
        let payload = &rx.payload(rx_idx)[..caplen as usize];

        tx.payload_mut(tx_idx)[..payload.len()].copy_from_slice(payload);
        tx.header_mut(tx_idx).set_len(len.min(caplen));

        tx.tx_release(tx_idx);
        rx.rx_release(rx_idx);
        rx.advance();

        summary.record_frame(caplen);

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
    use context::RunContextBuilder;

    #[test]
    fn rejects_identical_in_and_out_device() {
        let ctx = RunContextBuilder::new()
            .device_in(Endpoint::iface("eth0"))
            .device_out(Endpoint::iface("eth0"))
            .build()
            .unwrap();
        assert!(run(&ctx).is_err());
    }
}
