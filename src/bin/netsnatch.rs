extern crate env_logger;
extern crate netsnatch;

use std::env;
use std::path::PathBuf;
use std::process;

use netsnatch::{
    Backend, CpuBind, DumpMode, Endpoint, Magic, PacketType, PrintMode, RunContext, RunContextBuilder,
};

fn parse_size(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (digits, mult): (&str, u64) = if let Some(n) = raw.strip_suffix("GiB") {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix("MiB") {
        (n, 1024 * 1024)
    } else if let Some(n) = raw.strip_suffix("KiB") {
        (n, 1024)
    } else if let Some(n) = raw.strip_suffix("hrs") {
        (n, 3600)
    } else if let Some(n) = raw.strip_suffix("min") {
        (n, 60)
    } else if let Some(n) = raw.strip_suffix("sec") {
        (n, 1)
    } else if let Some(n) = raw.strip_suffix('s') {
        (n, 1)
    } else {
        (raw, 1)
    };
    digits.trim().parse::<u64>().ok().map(|n| n * mult)
}

/// Parses `-F/--interval`'s argument: a `KiB`/`MiB`/`GiB` suffix rotates on
/// accumulated size, an `s`/`sec`/`min`/`hrs` suffix (or no suffix at all)
/// rotates on wall-clock time.
fn parse_dump_mode(raw: &str) -> Option<DumpMode> {
    let raw = raw.trim();
    if let Some(n) = raw.strip_suffix("GiB") {
        return n.trim().parse::<u64>().ok().map(|v| DumpMode::Size { bytes: v * 1024 * 1024 * 1024 });
    }
    if let Some(n) = raw.strip_suffix("MiB") {
        return n.trim().parse::<u64>().ok().map(|v| DumpMode::Size { bytes: v * 1024 * 1024 });
    }
    if let Some(n) = raw.strip_suffix("KiB") {
        return n.trim().parse::<u64>().ok().map(|v| DumpMode::Size { bytes: v * 1024 });
    }
    if let Some(n) = raw.strip_suffix("hrs") {
        return n.trim().parse::<u64>().ok().map(|v| DumpMode::Interval { seconds: v * 3600 });
    }
    if let Some(n) = raw.strip_suffix("min") {
        return n.trim().parse::<u64>().ok().map(|v| DumpMode::Interval { seconds: v * 60 });
    }
    if let Some(n) = raw.strip_suffix("sec") {
        return n.trim().parse::<u64>().ok().map(|v| DumpMode::Interval { seconds: v });
    }
    if let Some(n) = raw.strip_suffix('s') {
        return n.trim().parse::<u64>().ok().map(|v| DumpMode::Interval { seconds: v });
    }
    raw.parse::<u64>().ok().map(|v| DumpMode::Interval { seconds: v })
}

fn parse_print_mode(name: &str) -> PrintMode {
    match name {
        "silent" => PrintMode::Silent,
        "less" => PrintMode::Less,
        "hex" => PrintMode::Hex,
        "ascii" => PrintMode::Ascii,
        "hexascii" => PrintMode::HexAscii,
        _ => PrintMode::Normal,
    }
}

/// Assembles a `RunContext` from `argv`, matching `netsniff-ng.c`'s long
/// option table in spirit (this crate carries no argument-parsing
/// dependency, so parsing is hand-rolled here and nowhere else).
fn build_context(argv: &[String]) -> netsnatch::Result<RunContext> {
    let mut b = RunContextBuilder::new();
    let mut i = 0;
    let mut dump_interval: Option<DumpMode> = None;

    while i < argv.len() {
        let arg = argv[i].as_str();
        let mut next = || {
            i += 1;
            argv.get(i).cloned().unwrap_or_default()
        };
        match arg {
            "--in" | "-i" | "--dev" | "-d" => b = b.device_in(Endpoint::parse(&next())),
            "--out" | "-o" => b = b.device_out(Endpoint::parse(&next())),
            "--filter" | "-f" => b = b.filter(PathBuf::from(next())),
            "--type" | "-t" => {
                if let Ok(pt) = PacketType::parse(&next()) {
                    b = b.packet_type(pt);
                }
            }
            "--interval" | "-F" => {
                dump_interval = parse_dump_mode(&next());
            }
            "--ring-size" | "-S" => {
                if let Some(sz) = parse_size(&next()) {
                    b = b.reserve_size(sz as usize);
                }
            }
            "--kernel-pull" | "-k" => {
                if let Ok(us) = next().parse() {
                    b = b.kernel_pull_interval_us(us);
                }
            }
            "--bind-cpu" | "-b" => {
                if let Ok(v) = next().parse() {
                    b = b.cpu(CpuBind::from_raw(v));
                }
            }
            "--prefix" | "-P" => b = b.prefix(next()),
            "--magic" | "-T" => {
                if let Ok(m) = next().parse::<u32>() {
                    if let Ok(magic) = Magic::from_magic(m) {
                        b = b.magic(magic);
                    }
                }
            }
            "--num" | "-n" => {
                if let Ok(n) = next().parse() {
                    b = b.frame_count_max(n);
                }
            }
            "--rand" | "-r" => b = b.randomize(true),
            "--rfraw" | "-R" => b = b.rfraw(true),
            "--mmap" | "-m" => b = b.backend(Backend::Mapped),
            "--sg" | "-G" => b = b.backend(Backend::ScatterGather),
            "--clrw" | "-c" => b = b.backend(Backend::Buffered),
            "--jumbo-support" | "-J" => b = b.jumbo(true),
            "--no-promisc" | "-M" => b = b.promiscuous(false),
            "--dump-bpf" | "-B" => b = b.dump_bpf(true),
            "--silent" | "-s" => b = b.print_mode(parse_print_mode("silent")),
            "--less" | "-q" => b = b.print_mode(parse_print_mode("less")),
            "--hex" | "-X" => b = b.print_mode(parse_print_mode("hex")),
            "--ascii" | "-l" => b = b.print_mode(parse_print_mode("ascii")),
            "--verbose" | "-V" => b = b.verbose(true),
            "--user" | "-u" | "--group" | "-g" => {
                let _ = next();
            }
            _ => {}
        }
        i += 1;
    }

    if let Some(mode) = dump_interval {
        b = b.dump_mode(mode);
    }

    b.build()
}

fn main() {
    env_logger::init();

    let argv: Vec<String> = env::args().skip(1).collect();
    let ctx = match build_context(&argv) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("netsnatch: {}", e);
            process::exit(1);
        }
    };

    println!("Running! Hang up with ^C!\n");

    match netsnatch::run(&ctx) {
        Ok(summary) => {
            println!("\n{:12} packets seen", summary.packets_seen);
            println!("{:12} packets dropped", summary.packets_dropped);
            println!("{:12} packets truncated", summary.truncated);
            println!("{:12} bytes total", summary.bytes);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("netsnatch: {}", e);
            process::exit(1);
        }
    }
}
