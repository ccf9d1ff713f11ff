use std::path::PathBuf;

use error::{Error, Result};

/// Where one end of a run points: a live interface, a file path (`"-"` means
/// stdin/stdout), or — discovered later by [`crate::dispatch`] — a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Interface(String),
    Path(PathBuf),
    Stdio,
    Absent,
}

impl Endpoint {
    pub fn parse(raw: &str) -> Endpoint {
        if raw == "-" {
            Endpoint::Stdio
        } else {
            Endpoint::Path(PathBuf::from(raw))
        }
    }

    pub fn iface(name: impl Into<String>) -> Endpoint {
        Endpoint::Interface(name.into())
    }

    pub fn is_stdio(&self) -> bool {
        matches!(self, Endpoint::Stdio)
    }
}

/// One of the four on-disk record flavors, keyed by the capture file's magic number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Magic {
    #[strum(to_string = "default (usec)")]
    Default,
    #[strum(to_string = "nsec")]
    Nsec,
    #[strum(to_string = "Kuznetzov")]
    Kuznetzov,
    #[strum(to_string = "Borkmann")]
    Borkmann,
}

impl Magic {
    pub const TCPDUMP_MAGIC: u32 = 0xa1b2_c3d4;
    pub const NSEC_MAGIC: u32 = 0xa1b2_3c4d;
    pub const KUZNETZOV_MAGIC: u32 = 0xa1b2_cd34;
    pub const BORKMANN_MAGIC: u32 = 0xa1e2_cb12;

    pub fn from_magic(magic: u32) -> Result<Magic> {
        match magic {
            Self::TCPDUMP_MAGIC => Ok(Magic::Default),
            Self::NSEC_MAGIC => Ok(Magic::Nsec),
            Self::KUZNETZOV_MAGIC => Ok(Magic::Kuznetzov),
            Self::BORKMANN_MAGIC => Ok(Magic::Borkmann),
            other => Err(Error::Magic { magic: other }),
        }
    }

    pub fn as_magic(self) -> u32 {
        match self {
            Magic::Default => Self::TCPDUMP_MAGIC,
            Magic::Nsec => Self::NSEC_MAGIC,
            Magic::Kuznetzov => Self::KUZNETZOV_MAGIC,
            Magic::Borkmann => Self::BORKMANN_MAGIC,
        }
    }
}

/// Requested capture-file I/O strategy. The dispatcher may downgrade `Mapped`
/// to `ScatterGather` when an endpoint turns out to be a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Buffered,
    Mapped,
    ScatterGather,
}

/// What triggers file rotation when dumping into a directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DumpMode {
    Interval { seconds: u64 },
    Size { bytes: u64 },
}

/// How much the dissector renders per frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrintMode {
    None,
    Silent,
    Less,
    Normal,
    Hex,
    Ascii,
    HexAscii,
}

/// CPU-bind sentinel values from the original CLI surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuBind {
    None,
    NoTouchIrq,
    Cpu(i32),
}

impl CpuBind {
    pub fn from_raw(v: i32) -> CpuBind {
        match v {
            -1 => CpuBind::None,
            -2 => CpuBind::NoTouchIrq,
            cpu => CpuBind::Cpu(cpu),
        }
    }
}

bitflags! {
    /// Packet-type classification bits taken off `tpacket2_hdr::tp_status`'s
    /// sibling field; `ALL` is the `-1` "accept everything" sentinel from the CLI.
    pub struct PacketType: u32 {
        const HOST        = 0b0000_0001;
        const BROADCAST   = 0b0000_0010;
        const MULTICAST   = 0b0000_0100;
        const OTHER_HOST  = 0b0000_1000;
        const OUTGOING    = 0b0001_0000;
        const ALL = Self::HOST.bits | Self::BROADCAST.bits | Self::MULTICAST.bits
            | Self::OTHER_HOST.bits | Self::OUTGOING.bits;
    }
}

impl PacketType {
    pub fn parse(name: &str) -> Result<PacketType> {
        match name {
            "host" => Ok(PacketType::HOST),
            "broadcast" => Ok(PacketType::BROADCAST),
            "multicast" => Ok(PacketType::MULTICAST),
            "others" | "other-host" => Ok(PacketType::OTHER_HOST),
            "outgoing" => Ok(PacketType::OUTGOING),
            other => Err(Error::Config {
                reason: format!("unknown packet type `{}`", other),
            }),
        }
    }
}

/// Immutable run parameters, assembled once by [`RunContextBuilder`] and
/// validated before any privileged syscall (ring creation, socket binding,
/// privilege drop) runs.
#[derive(Clone, Debug)]
pub struct RunContext {
    pub device_in: Endpoint,
    pub device_out: Endpoint,
    pub filter: Option<PathBuf>,
    pub link_type: i32,
    pub magic: Magic,
    pub reserve_size: usize,
    pub jumbo: bool,
    pub promiscuous: bool,
    pub rfraw: bool,
    pub cpu: CpuBind,
    pub packet_type: PacketType,
    pub kernel_pull_interval_us: u64,
    pub dump_mode: Option<DumpMode>,
    pub randomize: bool,
    pub frame_count_max: Option<u64>,
    pub print_mode: PrintMode,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub backend: Backend,
    pub prefix: String,
    pub dump_bpf: bool,
    pub verbose: bool,
}

pub struct RunContextBuilder {
    device_in: Option<Endpoint>,
    device_out: Option<Endpoint>,
    filter: Option<PathBuf>,
    link_type: i32,
    magic: Magic,
    reserve_size: usize,
    jumbo: bool,
    promiscuous: bool,
    rfraw: bool,
    cpu: CpuBind,
    packet_type: PacketType,
    kernel_pull_interval_us: u64,
    dump_mode: Option<DumpMode>,
    randomize: bool,
    frame_count_max: Option<u64>,
    print_mode: PrintMode,
    uid: Option<u32>,
    gid: Option<u32>,
    backend: Backend,
    prefix: String,
    dump_bpf: bool,
    verbose: bool,
}

/// Matches `netsniff-ng.c`'s defaults: promiscuous on, SG backend, 10µs kernel pull.
impl Default for RunContextBuilder {
    fn default() -> Self {
        RunContextBuilder {
            device_in: None,
            device_out: None,
            filter: None,
            link_type: libc::ARPHRD_ETHER as i32,
            magic: Magic::Default,
            reserve_size: 0,
            jumbo: false,
            promiscuous: true,
            rfraw: false,
            cpu: CpuBind::None,
            packet_type: PacketType::ALL,
            kernel_pull_interval_us: 10,
            dump_mode: None,
            randomize: false,
            frame_count_max: None,
            print_mode: PrintMode::Normal,
            uid: None,
            gid: None,
            backend: Backend::ScatterGather,
            prefix: String::new(),
            dump_bpf: false,
            verbose: false,
        }
    }
}

impl RunContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_in(mut self, e: Endpoint) -> Self {
        self.device_in = Some(e);
        self
    }

    pub fn device_out(mut self, e: Endpoint) -> Self {
        self.device_out = Some(e);
        self
    }

    pub fn filter(mut self, path: PathBuf) -> Self {
        self.filter = Some(path);
        self
    }

    pub fn magic(mut self, magic: Magic) -> Self {
        self.magic = magic;
        self
    }

    pub fn reserve_size(mut self, bytes: usize) -> Self {
        self.reserve_size = bytes;
        self
    }

    pub fn jumbo(mut self, v: bool) -> Self {
        self.jumbo = v;
        self
    }

    pub fn promiscuous(mut self, v: bool) -> Self {
        self.promiscuous = v;
        self
    }

    pub fn rfraw(mut self, v: bool) -> Self {
        self.rfraw = v;
        self
    }

    pub fn cpu(mut self, cpu: CpuBind) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn packet_type(mut self, pt: PacketType) -> Self {
        self.packet_type = pt;
        self
    }

    pub fn kernel_pull_interval_us(mut self, us: u64) -> Self {
        self.kernel_pull_interval_us = us;
        self
    }

    pub fn dump_mode(mut self, mode: DumpMode) -> Self {
        self.dump_mode = Some(mode);
        self
    }

    pub fn randomize(mut self, v: bool) -> Self {
        self.randomize = v;
        self
    }

    pub fn frame_count_max(mut self, n: u64) -> Self {
        self.frame_count_max = Some(n);
        self
    }

    pub fn print_mode(mut self, mode: PrintMode) -> Self {
        self.print_mode = mode;
        self
    }

    pub fn drop_to(mut self, uid: u32, gid: u32) -> Self {
        self.uid = Some(uid);
        self.gid = Some(gid);
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn dump_bpf(mut self, v: bool) -> Self {
        self.dump_bpf = v;
        self
    }

    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }

    /// Validates the accumulated parameters. No privileged syscall may run
    /// before this succeeds.
    pub fn build(self) -> Result<RunContext> {
        let device_in = self.device_in.ok_or_else(|| Error::Config {
            reason: "missing input endpoint".into(),
        })?;
        let device_out = self.device_out.unwrap_or(Endpoint::Absent);

        if let DumpMode::Size { bytes } = self.dump_mode.unwrap_or(DumpMode::Size { bytes: 1 }) {
            if matches!(self.dump_mode, Some(DumpMode::Size { .. })) && bytes == 0 {
                return Err(Error::Config {
                    reason: "size-mode rotation threshold must be non-zero".into(),
                });
            }
        }

        Ok(RunContext {
            device_in,
            device_out,
            filter: self.filter,
            link_type: self.link_type,
            magic: self.magic,
            reserve_size: self.reserve_size,
            jumbo: self.jumbo,
            promiscuous: self.promiscuous,
            rfraw: self.rfraw,
            cpu: self.cpu,
            packet_type: self.packet_type,
            kernel_pull_interval_us: self.kernel_pull_interval_us,
            dump_mode: self.dump_mode,
            randomize: self.randomize,
            frame_count_max: self.frame_count_max,
            print_mode: self.print_mode,
            uid: self.uid,
            gid: self.gid,
            backend: self.backend,
            prefix: self.prefix,
            dump_bpf: self.dump_bpf,
            verbose: self.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_parses_stdio_sentinel() {
        assert_eq!(Endpoint::parse("-"), Endpoint::Stdio);
        assert_eq!(Endpoint::parse("eth0"), Endpoint::Path("eth0".into()));
    }

    #[test]
    fn magic_round_trips() {
        for m in [Magic::Default, Magic::Nsec, Magic::Kuznetzov, Magic::Borkmann] {
            assert_eq!(Magic::from_magic(m.as_magic()).unwrap(), m);
        }
    }

    #[test]
    fn unknown_magic_is_rejected() {
        assert!(Magic::from_magic(0xdead_beef).is_err());
    }

    #[test]
    fn cpu_bind_sentinels() {
        assert_eq!(CpuBind::from_raw(-1), CpuBind::None);
        assert_eq!(CpuBind::from_raw(-2), CpuBind::NoTouchIrq);
        assert_eq!(CpuBind::from_raw(3), CpuBind::Cpu(3));
    }

    #[test]
    fn builder_requires_input_endpoint() {
        let err = RunContextBuilder::new().build();
        assert!(err.is_err());
    }

    #[test]
    fn builder_happy_path() {
        let ctx = RunContextBuilder::new()
            .device_in(Endpoint::iface("eth0"))
            .device_out(Endpoint::parse("/tmp/out.pcap"))
            .build()
            .unwrap();
        assert_eq!(ctx.device_in, Endpoint::iface("eth0"));
        assert!(ctx.promiscuous);
    }
}
