//! File→file translation: reads every record out of a capture file and
//! writes a trafgen-style byte-array block per record. No ring, no timer —
//! this loop is pure file I/O.

use std::io::BufWriter;

use context::{Magic, RunContext};
use dispatch::Plan;
use error::Result;
use pcap::CaptureBackend;
use summary::Summary;
use trafgen;

use super::{file_for_endpoint_read, file_for_endpoint_write};

pub fn run(ctx: &RunContext, plan: &Plan) -> Result<Summary> {
    let in_file = file_for_endpoint_read(&ctx.device_in)?;
    let mut backend = super::backend_for_file(in_file, plan.backend, ctx.jumbo, false)?;
    let hdr = backend.read_global_header()?;
    let magic = Magic::from_magic(hdr.magic)?;

    let out_file = file_for_endpoint_write(&ctx.device_out)?;
    let mut out = BufWriter::new(out_file);

    let mut summary = Summary::new();
    let mut buf = vec![0u8; 1 << 20];

    loop {
        match backend.read_record(magic, &mut buf)? {
            None => break,
            Some((meta, n)) => {
                trafgen::write_block(&mut out, &buf[..n])?;
                summary.record_frame(meta.caplen);
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::{Backend, Endpoint, RunContextBuilder};
    use dispatch::LoopKind;
    use pcap::{BufferedBackend, FrameMeta, GlobalHeader};
    use std::fs::File;

    #[test]
    fn translates_every_record_into_a_block() {
        let dir = tempfile::tempdir().unwrap();
        let in_path = dir.path().join("in.pcap");
        let out_path = dir.path().join("out.txt");

        {
            let f = File::create(&in_path).unwrap();
            let mut b = BufferedBackend::new(f);
            b.write_global_header(&GlobalHeader::new(Magic::Default, 65535, 1)).unwrap();
            let meta = FrameMeta {
                sec: 1,
                subsec: 0,
                caplen: 3,
                len: 3,
                ifindex: 0,
                protocol: 0,
                pkt_type: 0,
                cpu: 0,
                tsc: 0,
            };
            b.write_record(Magic::Default, &meta, &[1, 2, 3]).unwrap();
            b.flush().unwrap();
        }

        let ctx = RunContextBuilder::new()
            .device_in(Endpoint::Path(in_path))
            .device_out(Endpoint::Path(out_path.clone()))
            .build()
            .unwrap();
        let plan = Plan {
            loop_kind: LoopKind::FileToTxt,
            backend: Backend::Buffered,
        };

        let summary = run(&ctx, &plan).unwrap();
        assert_eq!(summary.packets_seen, 1);

        let text = std::fs::read_to_string(&out_path).unwrap();
        assert!(text.contains("0x01, 0x02, 0x03"));
    }
}
