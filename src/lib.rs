#[macro_use]
extern crate bitflags;
extern crate failure;
#[macro_use]
extern crate failure_derive;
extern crate libc;
#[macro_use]
extern crate log;
extern crate memmap2;
extern crate nix;
extern crate page_size;
extern crate rand;
#[macro_use]
extern crate strum_macros;

pub mod context;
pub mod dispatch;
pub mod dissector;
pub mod error;
pub mod filter;
pub mod loops;
pub mod pcap;
pub mod raw;
pub mod ring;
pub mod rotator;
pub mod summary;
pub mod timer;
pub mod trafgen;

pub use context::{Backend, CpuBind, DumpMode, Endpoint, Magic, PacketType, PrintMode, RunContext, RunContextBuilder};
pub use dispatch::{dispatch, LoopKind, Plan};
pub use error::{Error, Result};
pub use summary::Summary;

/// Drives the loop the dispatcher selected for `ctx` to completion. This is
/// the single entry point the binary (and any embedder) needs.
pub fn run(ctx: &RunContext) -> Result<Summary> {
    let plan = dispatch::dispatch(ctx)?;
    match plan.loop_kind {
        LoopKind::RxToStdout | LoopKind::RxToFile | LoopKind::RxToFileRotated => loops::rx_to_file::run(ctx, &plan),
        LoopKind::RxToTxBridge => loops::bridge::run(ctx),
        LoopKind::FileToTx => loops::file_to_tx::run(ctx, &plan),
        LoopKind::FileToTxt => loops::file_to_txt::run(ctx, &plan),
    }
}
