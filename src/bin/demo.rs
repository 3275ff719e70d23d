//! Thin demo entry point: parses `host port`, then listens or connects and
//! exchanges a canned packet. Not part of the library's test surface.

use std::{
    net::{SocketAddr, ToSocketAddrs},
    process::ExitCode,
    time::Duration,
};

use clap::{Parser, ValueEnum};
use packetline::{Acceptor, Endian, Packet, ReadOrder, Session};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Listen,
    Connect,
}

/// Minimal echo demo for the `packetline` session layer.
#[derive(Parser, Debug)]
#[command(name = "packetline-demo")]
struct Args {
    host: String,
    port: u16,
    #[arg(long, value_enum, default_value_t = Mode::Connect)]
    mode: Mode,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let addr = match (args.host.as_str(), args.port).to_socket_addrs() {
        Ok(mut addrs) => match addrs.next() {
            Some(addr) => addr,
            None => {
                error!("could not resolve {}:{}", args.host, args.port);
                return ExitCode::FAILURE;
            }
        },
        Err(e) => {
            error!(?e, "could not resolve address");
            return ExitCode::FAILURE;
        }
    };

    match args.mode {
        Mode::Listen => run_listener(addr),
        Mode::Connect => run_connect(addr),
    }
    ExitCode::SUCCESS
}

fn run_listener(addr: SocketAddr) {
    let acceptor = match Acceptor::bind(addr, Session::DEFAULT_CAPACITY, 0) {
        Ok(a) => a,
        Err(e) => {
            error!(?e, "failed to bind");
            return;
        }
    };
    acceptor.on_connect(|session: &Session| {
        let session = session.clone();
        session.read_until(
            1,
            move |bytes| {
                info!(tag = bytes[0], "demo: received tag byte");
                session.read_until(
                    4,
                    |int_bytes| {
                        let value = Endian::Big.read_i32(int_bytes);
                        info!(value, "demo: received int payload");
                        false
                    },
                    ReadOrder::Nested,
                );
                false
            },
            ReadOrder::Nested,
        );
    });
    info!(%addr, "demo: listening, Ctrl-C to exit");
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

fn run_connect(addr: SocketAddr) {
    let session = Session::new(Session::DEFAULT_CAPACITY);
    let done = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let done_for_connect = done.clone();
    session.on_connect(move |session| {
        info!("demo: connected, sending canned packet");
        let packet = Packet::builder().put_byte(1).put_int(42, Endian::Big);
        session.queue_and_flush(packet);
        done_for_connect.store(true, std::sync::atomic::Ordering::SeqCst);
    });

    let result = session.connect(addr, Duration::from_secs(5), || error!("demo: connect timed out"));
    if let Err(e) = result {
        error!(?e, "demo: connect failed");
        return;
    }

    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while !done.load(std::sync::atomic::Ordering::SeqCst) && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    session.close();
}
