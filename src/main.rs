//! quadfs client: interactive shell driving the four storage servers.

use anyhow::{Context, Result};
use clap::Parser;
use quadfs::client::Client;
use quadfs::command::{self, Command};
use quadfs::config::ClientConfig;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quadfs", about = "Distributed file store client")]
struct Opts {
    /// Client configuration file (servers, username, password)
    #[arg(default_value = "quadfs.conf")]
    config: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let config = ClientConfig::load(&opts.config)?;
    for (i, slot) in config.servers.iter().enumerate() {
        println!("DFS{} {}:{}", i + 1, slot.host, slot.port);
    }
    println!("username {}", config.username);
    let client = Client::new(config);

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        std::io::stdout().flush().context("flushing prompt")?;
        let Some(line) = lines.next() else {
            println!("exiting...");
            break;
        };
        let line = line.context("reading command")?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match command::parse(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("invalid command {:?}: {}", line, err);
                continue;
            }
        };
        if let Err(err) = run_command(&client, command) {
            println!("{:#}", err);
        }
    }
    Ok(())
}

fn run_command(client: &Client, command: Command) -> Result<()> {
    match command {
        Command::Put { local, remote_dir } => {
            let file = std::fs::read(&local)
                .with_context(|| format!("unable to read file {}", local.display()))?;
            let remote = command::remote_put_path(&local, &remote_dir)?;
            client.put_file(&remote, &file)?;
            println!("put {:?} as {:?}", local.display().to_string(), remote);
        }
        Command::Get { path } => {
            let out = client.get_file(&path, Path::new("."))?;
            println!("success getting file, written to {:?}", out.display().to_string());
        }
        Command::List { path } => {
            let listing = client.list_files(&path)?;
            println!("files:");
            if listing.files.is_empty() {
                println!("(no files)");
            }
            for (name, complete) in &listing.files {
                if *complete {
                    println!("{}", name);
                } else {
                    println!("{} [incomplete]", name);
                }
            }
            println!("directories:");
            if listing.directories.is_empty() {
                println!("(no directories)");
            }
            for dir in &listing.directories {
                println!("{}", dir);
            }
        }
        Command::Mkdir { path } => {
            for (server, status) in client.make_directory(&path)? {
                println!("dfs[{}]: {}", server, status);
            }
        }
    }
    Ok(())
}
