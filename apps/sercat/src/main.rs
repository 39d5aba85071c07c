//! Bridge a pub/sub node onto a TCP byte stream and drive it from the
//! terminal. TCP stands in for the UART: one end listens, the other
//! connects, and every byte between them is frames. Received payloads on
//! subscribed topics go to stdout; stdin lines of the form `topic=payload`
//! are published.

use std::io::{self, BufRead, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::exit;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use clap::Parser;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use seriplex::{Node, PublishResponse, Topic};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Wait for a peer to connect on this address
    #[arg(short, long, conflicts_with = "connect")]
    listen: Option<String>,

    /// Connect out to a peer on this address
    #[arg(short, long)]
    connect: Option<String>,

    /// Topic(s) to subscribe to
    #[arg(short, long)]
    subscribe: Vec<String>,

    /// Publish acknowledged, waiting for the peer's ACK
    #[arg(short, long)]
    ack: bool,

    /// ACK timeout in milliseconds
    #[arg(short, long, default_value_t = 1000)]
    timeout: u64,

    /// Verbose mode 0(errors)..4(debug)..5(trace)
    #[arg(short, long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(0..=5))]
    verbose: u8,
}

fn open_stream(args: &Args) -> io::Result<TcpStream> {
    if let Some(address) = &args.listen {
        info!("Waiting for a peer on {}", address);
        let (stream, peer) = TcpListener::bind(address)?.accept()?;
        info!("Peer connected from {}", peer);
        Ok(stream)
    } else if let Some(address) = &args.connect {
        info!("Connecting to {}", address);
        TcpStream::connect(address)
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "one of --listen or --connect is required",
        ))
    }
}

fn main() {
    const LOG_LEVEL: [LevelFilter; 6] = [
        LevelFilter::Off,
        LevelFilter::Error,
        LevelFilter::Warn,
        LevelFilter::Info,
        LevelFilter::Debug,
        LevelFilter::Trace,
    ];
    let args = Args::parse();

    TermLogger::init(
        LOG_LEVEL[args.verbose as usize],
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .expect("Couldn't start logging");
    debug!("{:?}", args);

    let stream = match open_stream(&args) {
        Ok(stream) => stream,
        Err(x) => {
            error!("{}", x);
            exit(1);
        }
    };

    let node = Arc::new(Node::new());

    let tx_stream = Mutex::new(stream.try_clone().expect("Couldn't clone the stream"));
    node.set_tx_data_ready(move |frame| {
        let mut stream = tx_stream.lock().expect("tx stream lock poisoned");
        if let Err(x) = stream.write_all(frame).and_then(|_| stream.flush()) {
            error!("Transmit failed: {}", x);
        }
    });
    node.set_no_subscribers_hook(|topic, _data| {
        warn!("Nobody here subscribes to '{}'", topic);
    });

    for name in &args.subscribe {
        let topic = match Topic::new(name) {
            Ok(topic) => topic,
            Err(x) => {
                error!("{}: {}", name, x);
                exit(1);
            }
        };
        let label = name.clone();
        node.subscribe(&topic, move |data| {
            println!("[{}] {}", label, String::from_utf8_lossy(data));
        });
        info!("Subscribed to {}", name);
    }

    /* Socket to node */
    let rx_node = node.clone();
    let mut rx_stream = stream;
    thread::spawn(move || {
        let mut tokens = [0u8; 1024];
        loop {
            match rx_stream.read(&mut tokens) {
                Ok(0) => {
                    warn!("Peer closed the link");
                    exit(0);
                }
                Ok(n) => {
                    if let Err(x) = rx_node.give_rx_data(&tokens[..n]) {
                        debug!("Dropped rx data: {}", x);
                    }
                }
                Err(x) => {
                    error!("Read failed: {}", x);
                    exit(1);
                }
            }
        }
    });

    /* Terminal to node: each stdin line "topic=payload" is one publish */
    for line in io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let Some((name, payload)) = line.split_once('=') else {
            warn!("Use topic=payload");
            continue;
        };
        let topic = match Topic::new(name) {
            Ok(topic) => topic,
            Err(x) => {
                warn!("{}: {}", name, x);
                continue;
            }
        };

        if args.ack {
            match node.publish_wait(&topic, payload.as_bytes(), Duration::from_millis(args.timeout))
            {
                PublishResponse::Success => info!("'{}' acknowledged", name),
                other => warn!("'{}' not acknowledged: {:?}", name, other),
            }
        } else {
            let id = node.publish(&topic, payload.as_bytes());
            trace!("Sent packet {}", id);
        }
    }
}
