//! Thin CLI driver for running a single `rf24mesh` node against the
//! in-process UDP simulator transport. Not part of the specified core;
//! a convenience for exercising the stack without real NRF24L01 hardware
//! (spec §1 "Out of scope: the CLI/test harness; it is a thin driver").

use std::time::Duration;

use clap::Parser;
use log::{error, info};

use rf24mesh::address::LogicalAddress;
use rf24mesh::config::EndpointConfig;
use rf24mesh::endpoint::Endpoint;
use rf24mesh::transport::UdpPhysicalLink;

/// Run one mesh node against the UDP simulator.
#[derive(Parser, Debug)]
#[command(name = "rf24mesh-cli", version, about)]
struct Args {
    /// This node's logical address, in octal (e.g. "21" for 0o21). `0`
    /// configures the mesh root.
    #[arg(long, default_value_t = String::from("0"))]
    address: String,

    /// This node's parent, in octal. Ignored for the root. Pass "lookup"
    /// to resolve the parent dynamically from the tree algebra (requires
    /// `--mesh`).
    #[arg(long)]
    parent: Option<String>,

    /// Use MESH mode instead of STATIC (spec §3 "EndpointConfig.mode").
    #[arg(long)]
    mesh: bool,

    /// Human-readable device name, surfaced in logs only.
    #[arg(long, default_value_t = String::from("node"))]
    name: String,

    /// RF channel, 0..125 (spec §3). Unused by the UDP simulator beyond
    /// validation.
    #[arg(long, default_value_t = 76)]
    channel: u8,

    /// Cadence, in milliseconds, at which `do_async_processing` is driven
    /// (spec §4.5 "typical: every 15ms thread tick").
    #[arg(long, default_value_t = 15)]
    tick_ms: u64,

    /// Budget, in milliseconds, for the initial `connect()` call. Ignored
    /// for the root, which is always connected.
    #[arg(long, default_value_t = 10_000)]
    connect_timeout_ms: u64,

    /// Optional one-shot payload to send to `--send-to` after connecting,
    /// then exit.
    #[arg(long)]
    send: Option<String>,

    /// Destination (octal logical address) for `--send`.
    #[arg(long)]
    send_to: Option<String>,

    /// Number of ticks to run before exiting when not sending/pinging
    /// (0 = run forever).
    #[arg(long, default_value_t = 0)]
    ticks: u64,

    /// Ping `--send-to` instead of writing a payload, then exit.
    #[arg(long)]
    ping: bool,
}

fn parse_octal(s: &str) -> Result<LogicalAddress, String> {
    u16::from_str_radix(s, 8)
        .map(LogicalAddress)
        .map_err(|e| format!("{:?}: not a valid octal address: {}", s, e))
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let node = match parse_octal(&args.address) {
        Ok(a) => a,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let mut cfg = if args.mesh {
        EndpointConfig::mesh(args.name.clone(), node)
    } else if node == rf24mesh::address::ROOT_NODE_0 {
        EndpointConfig::root(args.name.clone())
    } else {
        let parent = match args.parent.as_deref() {
            Some(p) => match parse_octal(p) {
                Ok(a) => a,
                Err(e) => {
                    error!("{}", e);
                    std::process::exit(2);
                }
            },
            None => {
                error!("--parent is required in STATIC mode for a non-root node");
                std::process::exit(2);
            }
        };
        EndpointConfig::child(args.name.clone(), node, parent)
    };
    cfg.rf_channel = args.channel;
    cfg.connect_timeout = Duration::from_millis(args.connect_timeout_ms);
    cfg.tick_interval = Duration::from_millis(args.tick_ms);

    if let Some(parent) = &args.parent {
        if args.mesh && parent.eq_ignore_ascii_case("lookup") {
            cfg.parent_static_address = rf24mesh::address::RSVD_ADDR_LOOKUP;
        }
    }

    info!(
        "starting node {} ({:?} mode, address {})",
        args.name, cfg.mode, node
    );

    let mut endpoint = Endpoint::new();
    if let Err(e) = endpoint.configure(cfg, Box::new(UdpPhysicalLink::new())) {
        error!("configure failed: {}", e);
        std::process::exit(1);
    }

    if node != rf24mesh::address::ROOT_NODE_0 {
        match endpoint.connect(Duration::from_millis(args.connect_timeout_ms)) {
            Ok(true) => info!("connected to parent"),
            Ok(false) => {
                error!("failed to connect to parent within timeout");
                std::process::exit(1);
            }
            Err(e) => {
                error!("connect error: {}", e);
                std::process::exit(1);
            }
        }
    }

    if let Some(dst) = &args.send_to {
        let dst = match parse_octal(dst) {
            Ok(a) => a,
            Err(e) => {
                error!("{}", e);
                std::process::exit(2);
            }
        };
        if args.ping {
            let ok = endpoint
                .ping(dst, Duration::from_millis(args.connect_timeout_ms))
                .unwrap_or(false);
            println!("ping {} -> {}", dst, if ok { "ok" } else { "timeout" });
            return;
        }
        if let Some(payload) = &args.send {
            if let Err(e) = endpoint.write(dst, payload.as_bytes()) {
                error!("write failed: {}", e);
                std::process::exit(1);
            }
            for _ in 0..20 {
                endpoint.do_async_processing();
                std::thread::sleep(Duration::from_millis(args.tick_ms));
            }
            return;
        }
    }

    let mut tick: u64 = 0;
    let mut buf = [0u8; rf24mesh::frame::PACKET_WIDTH];
    loop {
        endpoint.do_async_processing();
        if endpoint.packet_available().unwrap_or(false) {
            if let Ok(n) = endpoint.read(&mut buf) {
                info!("received {} bytes: {:?}", n, &buf[..n]);
            }
        }
        tick += 1;
        if args.ticks != 0 && tick >= args.ticks {
            break;
        }
        std::thread::sleep(Duration::from_millis(args.tick_ms));
    }
}
