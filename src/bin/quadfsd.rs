//! quadfsd: one storage server of the four-server pool.

use anyhow::{bail, Context, Result};
use clap::Parser;
use quadfs::config::UserTable;
use quadfs::server::Server;
use quadfs::storage::Storage;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ports below this are rejected to keep clear of privileged/system ranges.
const MIN_PORT: u16 = 5000;

#[derive(Debug, Parser)]
#[command(name = "quadfsd", about = "Distributed file store storage server")]
struct Opts {
    /// Root directory holding per-user storage
    root: PathBuf,

    /// Port to listen on (loopback only)
    port: u16,

    /// Credential file, one `username password` pair per line
    #[arg(long, default_value = "dfs.conf")]
    users: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();
    if opts.port < MIN_PORT {
        bail!("invalid port {}: must be at least {}", opts.port, MIN_PORT);
    }
    if !opts.root.is_dir() {
        bail!("invalid root directory {:?}", opts.root);
    }
    let root = std::fs::canonicalize(&opts.root)
        .with_context(|| format!("resolving root {}", opts.root.display()))?;
    let users = UserTable::load(&opts.users)?;

    let addr: SocketAddr = ([127, 0, 0, 1], opts.port).into();
    let mut server = Server::bind(addr, Storage::new(root), users)?;
    server.run()
}
