//! RLPx CLI
//!
//! Key management and an in-memory loopback exchange between two
//! transport endpoints.

mod config;

use bytes::Bytes;
use clap::{Parser, Subcommand};
use rand::Rng;
use rlpx_core::{
    Addressing, Command, DispatchError, Dispatcher, MultiplexedSession, Packet, SubProtocol,
};
use rlpx_crypto::{KeyPair, SecretKey};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use config::Config;

/// Highest command id of the base protocol
const BASE_MAX_CMD_ID: u8 = 15;

/// RLPx - encrypted, multiplexed peer-to-peer transport
#[derive(Parser)]
#[command(name = "rlpx")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new secp256k1 identity keypair
    Keygen {
        /// Output file for the hex-encoded secret key
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Derive the public key of a hex-encoded secret key
    Pubkey {
        /// Secret key (64 hex characters)
        secret: String,
    },

    /// Run a handshake and packet exchange between two in-memory peers
    Loopback {
        /// Number of sub-protocols besides the base protocol
        #[arg(long, default_value_t = 2)]
        protocols: u16,

        /// Payload size of each packet in bytes
        #[arg(long, default_value_t = 64 * 1024)]
        payload_size: usize,

        /// Number of packets to send
        #[arg(long, default_value_t = 16)]
        packets: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.validate()?;

    let level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.to_lowercase()
    };
    tracing_subscriber::fmt().with_env_filter(level).init();

    match cli.command {
        Commands::Keygen { output } => generate_keypair(output),
        Commands::Pubkey { secret } => derive_pubkey(&secret),
        Commands::Loopback {
            protocols,
            payload_size,
            packets,
        } => run_loopback(&config, protocols, payload_size, packets),
    }
}

/// Generate a new identity keypair
fn generate_keypair(output: Option<PathBuf>) -> anyhow::Result<()> {
    let pair = KeyPair::generate()?;
    println!("Public key: {}", hex::encode(pair.public().as_bytes()));

    let secret_hex = hex::encode(pair.secret().to_bytes());
    if let Some(output_path) = output {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&output_path, &secret_hex)?;
        println!("Secret key saved to: {}", output_path.display());
    } else {
        println!("Secret key: {secret_hex}");
    }

    Ok(())
}

fn derive_pubkey(secret_hex: &str) -> anyhow::Result<()> {
    let bytes = hex::decode(secret_hex.trim())?;
    let pair = KeyPair::from_secret(SecretKey::from_slice(&bytes)?);
    println!("{}", hex::encode(pair.public().as_bytes()));
    Ok(())
}

/// Opaque payload carried by the loopback protocols
struct Blob(Bytes);

impl Command for Blob {
    const ID: u8 = 1;

    fn encode(&self) -> Bytes {
        self.0.clone()
    }

    fn decode(payload: &[u8]) -> Result<Self, DispatchError> {
        Ok(Self(Bytes::copy_from_slice(payload)))
    }
}

/// Base-protocol greeting carrying the client name
struct Hello(String);

impl Command for Hello {
    const ID: u8 = 0;

    fn encode(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }

    fn decode(payload: &[u8]) -> Result<Self, DispatchError> {
        String::from_utf8(payload.to_vec())
            .map(Self)
            .map_err(|_| DispatchError::Decode("hello is not utf-8"))
    }
}

fn identity(config: &Config, suffix: &str) -> anyhow::Result<KeyPair> {
    Ok(match &config.node.identity_seed {
        Some(seed) => KeyPair::from_seed(format!("{seed}-{suffix}").as_bytes())?,
        None => KeyPair::generate()?,
    })
}

fn registry(protocols: u16) -> anyhow::Result<Dispatcher> {
    let mut dispatcher = Dispatcher::default();
    dispatcher.register_protocol(SubProtocol::new(0, "p2p", 5, BASE_MAX_CMD_ID))?;
    for id in 1..=protocols {
        dispatcher.register_protocol(SubProtocol::new(id, format!("loop{id}"), 1, Blob::ID))?;
    }
    Ok(dispatcher)
}

/// Move every queued wire message from `from` into `to`, returning the byte count.
fn pump(from: &MultiplexedSession, to: &mut MultiplexedSession) -> anyhow::Result<usize> {
    let queue = from.outbound_queue();
    let mut moved = 0;
    while let Some(msg) = queue.try_deq()? {
        moved += msg.len();
        to.add_message(&msg)?;
    }
    Ok(moved)
}

fn run_loopback(
    config: &Config,
    protocols: u16,
    payload_size: usize,
    packets: usize,
) -> anyhow::Result<()> {
    if protocols == 0 {
        anyhow::bail!("at least one loopback protocol is required");
    }

    let alice = identity(config, "a")?;
    let bob = identity(config, "b")?;
    let bob_pub = *bob.public();

    let hello = |name: &str| Packet::new(0, Hello::ID, Hello(name.to_string()).encode());
    let mut a = MultiplexedSession::new(alice, hello("rlpx-a"), Some(bob_pub), config.transport)?;
    let mut b = MultiplexedSession::new(bob, hello("rlpx-b"), None, config.transport)?;

    let start = Instant::now();
    pump(&a, &mut b)?;
    pump(&b, &mut a)?;
    if !(a.is_ready() && b.is_ready()) {
        anyhow::bail!("handshake did not complete");
    }
    tracing::info!("handshake completed in {:?}", start.elapsed());

    let version = a.session().remote_version().unwrap_or(4);
    let addressing = Addressing::for_version(version);
    println!("Remote version: {version} ({addressing:?} addressing)");

    let mut sender = registry(protocols)?;
    sender.set_addressing(addressing);
    if addressing == Addressing::ProtocolId {
        for id in 1..=protocols {
            a.add_protocol(id)?;
            b.add_protocol(id)?;
        }
    }

    let received = Arc::new(AtomicUsize::new(0));
    let mut receiver = registry(protocols)?;
    receiver.set_addressing(addressing);
    receiver.on::<Hello, _>(0, |hello| {
        tracing::info!("peer says hello: {}", hello.0);
        Ok(())
    })?;
    for id in 1..=protocols {
        let received = Arc::clone(&received);
        receiver.on::<Blob, _>(id, move |blob| {
            received.fetch_add(blob.0.len(), Ordering::Relaxed);
            Ok(())
        })?;
    }

    let inbound = b.inbound_queue();
    let reader = thread::spawn(move || -> Result<usize, DispatchError> {
        let mut count = 0;
        while let Ok(packet) = inbound.deq() {
            receiver.dispatch(&packet)?;
            count += 1;
        }
        Ok(count)
    });

    let mut payload = vec![0u8; payload_size];
    rand::thread_rng().fill(&mut payload[..]);
    let payload = Bytes::from(payload);

    let mut wire_bytes = pump(&a, &mut b)?;
    for i in 0..packets {
        let protocol_id = 1 + u16::try_from(i % usize::from(protocols))?;
        a.add_packet(sender.encode(protocol_id, &Blob(payload.clone()))?)?;
        wire_bytes += pump(&a, &mut b)?;
    }
    b.close();
    a.close();

    let delivered = reader
        .join()
        .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
    let elapsed = start.elapsed();
    let payload_bytes = received.load(Ordering::Relaxed);

    println!("Packets delivered: {delivered} (including hello)");
    println!("Payload bytes: {payload_bytes}");
    println!("Wire bytes: {wire_bytes}");
    println!("Elapsed: {elapsed:?}");

    if payload_bytes != payload_size * packets {
        anyhow::bail!(
            "expected {} payload bytes, received {}",
            payload_size * packets,
            payload_bytes
        );
    }
    Ok(())
}
