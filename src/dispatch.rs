//! Component F: classifies the two endpoints and picks a loop plus a default
//! capture-file backend, per the decision table in `netsniff-ng.c`'s
//! `main()` (iface/iface/absent dispatch on `ctx->device_in`/`device_out`).

use std::fs;

use context::{Backend, Endpoint, RunContext};
use error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    Iface,
    File,
    Dir,
    Stdio,
    Absent,
}

fn classify(e: &Endpoint) -> Result<EndpointKind> {
    match e {
        Endpoint::Interface(_) => Ok(EndpointKind::Iface),
        Endpoint::Stdio => Ok(EndpointKind::Stdio),
        Endpoint::Absent => Ok(EndpointKind::Absent),
        Endpoint::Path(p) => match fs::metadata(p) {
            Ok(m) if m.is_dir() => Ok(EndpointKind::Dir),
            Ok(_) => Ok(EndpointKind::File),
            // A path that doesn't exist yet is a file to be created (e.g. a
            // fresh dump target), not an error.
            Err(_) => Ok(EndpointKind::File),
        },
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopKind {
    RxToStdout,
    RxToTxBridge,
    RxToFile,
    RxToFileRotated,
    FileToTx,
    FileToTxt,
}

#[derive(Clone, Debug)]
pub struct Plan {
    pub loop_kind: LoopKind,
    pub backend: Backend,
}

/// Downgrades `Mapped` to `ScatterGather` against a stream endpoint; every
/// other backend choice passes through untouched.
fn resolve_backend(requested: Backend, endpoint_is_stream: bool) -> Backend {
    if endpoint_is_stream && requested == Backend::Mapped {
        Backend::ScatterGather
    } else {
        requested
    }
}

pub fn dispatch(ctx: &RunContext) -> Result<Plan> {
    let in_kind = classify(&ctx.device_in)?;
    let out_kind = classify(&ctx.device_out)?;

    let stream_out = matches!(ctx.device_out, Endpoint::Stdio);
    let stream_in = matches!(ctx.device_in, Endpoint::Stdio);

    let (loop_kind, default_backend) = match (in_kind, out_kind) {
        (EndpointKind::Iface, EndpointKind::Absent) => (LoopKind::RxToStdout, ctx.backend),
        (EndpointKind::Iface, EndpointKind::Iface) => (LoopKind::RxToTxBridge, ctx.backend),
        (EndpointKind::Iface, EndpointKind::File) | (EndpointKind::Iface, EndpointKind::Stdio) => {
            (LoopKind::RxToFile, Backend::ScatterGather)
        }
        (EndpointKind::Iface, EndpointKind::Dir) => (LoopKind::RxToFileRotated, Backend::ScatterGather),
        (EndpointKind::File, EndpointKind::Iface) | (EndpointKind::Stdio, EndpointKind::Iface) => {
            (LoopKind::FileToTx, Backend::Mapped)
        }
        (EndpointKind::File, EndpointKind::File)
        | (EndpointKind::File, EndpointKind::Stdio)
        | (EndpointKind::Stdio, EndpointKind::File)
        | (EndpointKind::Stdio, EndpointKind::Stdio) => (LoopKind::FileToTxt, Backend::ScatterGather),
        (in_k, out_k) => {
            return Err(Error::Config {
                reason: format!("unsupported endpoint combination: {:?} -> {:?}", in_k, out_k),
            })
        }
    };

    let backend = resolve_backend(default_backend, stream_in || stream_out);
    Ok(Plan { loop_kind, backend })
}

#[cfg(test)]
mod tests {
    use super::*;
    use context::{Endpoint, RunContextBuilder};

    fn ctx(input: Endpoint, output: Endpoint) -> RunContext {
        RunContextBuilder::new()
            .device_in(input)
            .device_out(output)
            .build()
            .unwrap()
    }

    #[test]
    fn iface_to_absent_is_rx_to_stdout() {
        let c = ctx(Endpoint::iface("eth0"), Endpoint::Absent);
        let plan = dispatch(&c).unwrap();
        assert_eq!(plan.loop_kind, LoopKind::RxToStdout);
    }

    #[test]
    fn iface_to_iface_is_bridge() {
        let c = ctx(Endpoint::iface("eth0"), Endpoint::iface("eth1"));
        let plan = dispatch(&c).unwrap();
        assert_eq!(plan.loop_kind, LoopKind::RxToTxBridge);
    }

    #[test]
    fn iface_to_dir_is_rotated_dump_with_sg_backend() {
        let dir = tempfile::tempdir().unwrap();
        let c = ctx(Endpoint::iface("eth0"), Endpoint::Path(dir.path().to_path_buf()));
        let plan = dispatch(&c).unwrap();
        assert_eq!(plan.loop_kind, LoopKind::RxToFileRotated);
        assert_eq!(plan.backend, Backend::ScatterGather);
    }

    #[test]
    fn stdin_forces_sg_even_when_mapped_requested() {
        let c = RunContextBuilder::new()
            .device_in(Endpoint::Stdio)
            .device_out(Endpoint::iface("eth0"))
            .backend(Backend::Mapped)
            .build()
            .unwrap();
        let plan = dispatch(&c).unwrap();
        assert_eq!(plan.loop_kind, LoopKind::FileToTx);
        assert_eq!(plan.backend, Backend::ScatterGather);
    }

    #[test]
    fn file_to_iface_defaults_to_mapped_backend() {
        let f = tempfile::NamedTempFile::new().unwrap();
        let c = ctx(Endpoint::Path(f.path().to_path_buf()), Endpoint::iface("eth0"));
        let plan = dispatch(&c).unwrap();
        assert_eq!(plan.loop_kind, LoopKind::FileToTx);
        assert_eq!(plan.backend, Backend::Mapped);
    }
}
