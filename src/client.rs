//! Client engines: redundant placement of parts across the server pool,
//! pair-based retrieval and reconstruction, listing reconciliation, and the
//! mkdir broadcast.
//!
//! The client is single-threaded and blocking: one server at a time, each
//! connect bounded by a timeout so one unreachable server costs at most the
//! timeout. A failed connect means "skip this server", never "abort the
//! whole multi-server operation"; only fatal response statuses abort.

use crate::config::ClientConfig;
use crate::parts;
use crate::protocol::{Status, MAX_FRAME_SIZE, NUM_PARTS, NUM_SERVERS};
use crate::wire::{read_response, write_request, Request, RequestOp, Response, ResponseBody};
use anyhow::{bail, Context, Result};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

pub const CONNECT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Aggregated LIST result: logical files with their completeness, and
/// deduplicated subdirectories, both in first-seen order.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<(String, bool)>,
    pub directories: Vec<String>,
}

pub struct Client {
    config: ClientConfig,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Client { config }
    }

    fn connect(&self, server: usize) -> Option<TcpStream> {
        let slot = &self.config.servers[server];
        match TcpStream::connect_timeout(&slot.addr, CONNECT_TIMEOUT) {
            Ok(stream) => Some(stream),
            Err(err) => {
                warn!(server, addr = %slot.addr, %err, "unable to connect");
                None
            }
        }
    }

    fn request(&self, op: RequestOp) -> Request {
        Request {
            username: self.config.username.clone(),
            password: self.config.password.clone(),
            op,
        }
    }

    /// One synchronous request/response exchange on an open connection.
    fn exchange(&self, stream: &mut TcpStream, op: RequestOp) -> Result<Response> {
        let kind = op.kind();
        write_request(stream, &self.request(op))?;
        read_response(stream, kind)
    }

    /// Upload a file: mask, split into four parts, and send every part to
    /// two servers. Part `i` goes to server `(i + offset) % 4` together
    /// with part `(i + 1) % 4`, so a dead server only loses copies that
    /// exist elsewhere. A fatal status (invalid path, invalid identity)
    /// aborts the whole put; unreachable or faulting servers are skipped,
    /// but a part that ends with no home at all is an error, since the
    /// file could never be retrieved again.
    pub fn put_file(&self, path: &str, file: &[u8]) -> Result<()> {
        // The largest part (part 3) must fit a single frame, or every
        // server would refuse it.
        if parts::part_range(file.len(), NUM_PARTS - 1).len() > MAX_FRAME_SIZE {
            bail!(
                "{:?} is too large to store: a part would exceed the {} byte frame limit",
                path,
                MAX_FRAME_SIZE
            );
        }

        let mut masked = file.to_vec();
        parts::apply_mask(&mut masked, parts::make_mask(&self.config.password));
        let offset = parts::placement_offset(&masked);
        debug!(path, offset, len = masked.len(), "placing file");

        let mut homes = [0usize; NUM_PARTS];
        for i in 0..NUM_PARTS {
            let server = parts::primary_server(i, offset);
            let Some(mut stream) = self.connect(server) else {
                // Both parts this server would hold exist on its neighbors.
                continue;
            };
            for part in [i, (i + 1) % NUM_PARTS] {
                let op = RequestOp::Put {
                    path: parts::part_path(path, part),
                    file: parts::part_slice(&masked, part).to_vec(),
                };
                let response = match self.exchange(&mut stream, op) {
                    Ok(response) => response,
                    Err(err) => {
                        warn!(server, part, %err, "exchange failed, skipping server");
                        break;
                    }
                };
                match response.status {
                    Status::Success => {
                        info!(part, server, "stored part");
                        homes[part] += 1;
                    }
                    Status::InvalidPath => {
                        bail!("invalid put path {:?} on server {}", path, server);
                    }
                    Status::InvalidIdentity => {
                        bail!("invalid username/password for server {}", server);
                    }
                    other => bail!("unexpected PUT status {} from server {}", other, server),
                }
            }
        }

        for (part, &count) in homes.iter().enumerate() {
            if count == 0 {
                bail!("failed to put {:?}: part {} was not stored on any server", path, part);
            }
            if count < 2 {
                warn!(part, "part stored without redundancy");
            }
        }
        Ok(())
    }

    /// Retrieve and reconstruct a file, writing `<basename>.received` under
    /// `out_dir`. Tries the server pairs (0,2) then (1,3); a pair is
    /// skipped when either member is unreachable. Each connected member is
    /// asked for all four part indices; a part index arriving twice is a
    /// protocol-invariant violation and fails the retrieval outright. On
    /// failure nothing is written and no partial buffers are kept.
    pub fn get_file(&self, path: &str, out_dir: &Path) -> Result<PathBuf> {
        let mut collected: [Option<Vec<u8>>; NUM_PARTS] = [None, None, None, None];

        for pair in 0..2 {
            let members = [pair, pair + 2];
            let Some(mut first) = self.connect(members[0]) else {
                continue;
            };
            let Some(mut second) = self.connect(members[1]) else {
                continue;
            };

            for (stream, server) in [(&mut first, members[0]), (&mut second, members[1])] {
                for part in 0..NUM_PARTS {
                    let op = RequestOp::Get {
                        path: parts::part_path(path, part),
                    };
                    let response = self
                        .exchange(stream, op)
                        .with_context(|| format!("fetching part {} from server {}", part, server))?;
                    if response.status != Status::Success {
                        continue;
                    }
                    let ResponseBody::File(bytes) = response.body else {
                        bail!("GET success response without a file body");
                    };
                    debug!(part, server, len = bytes.len(), "collected part");
                    if collected[part].is_some() {
                        bail!(
                            "part {} delivered twice (server {}): replication invariant violated",
                            part,
                            server
                        );
                    }
                    collected[part] = Some(bytes);
                }
            }

            if collected.iter().all(Option::is_some) {
                let mut file = Vec::new();
                for part in collected.iter().flatten() {
                    file.extend_from_slice(part);
                }
                parts::apply_mask(&mut file, parts::make_mask(&self.config.password));

                let out_path = out_dir.join(parts::received_name(path));
                std::fs::write(&out_path, &file)
                    .with_context(|| format!("writing {}", out_path.display()))?;
                info!(path, out = %out_path.display(), len = file.len(), "file reconstructed");
                return Ok(out_path);
            }

            // Incomplete pair: release the partial buffers and try the next.
            debug!(pair, "pair incomplete, retrying with the other pair");
            collected = [None, None, None, None];
        }

        bail!("failed to get {:?}: file incomplete", path);
    }

    /// Query every server for the directory listing and merge the results:
    /// names without the part marker are subdirectories (deduplicated by
    /// exact name); part files are decoded back to their logical filename
    /// and a 4-slot presence map. A file is complete only when all four
    /// parts are present across the union of responses.
    pub fn list_files(&self, path: &str) -> Result<Listing> {
        let mut files: Vec<(String, [bool; NUM_PARTS])> = Vec::new();
        let mut directories: Vec<String> = Vec::new();

        for server in 0..NUM_SERVERS {
            let Some(mut stream) = self.connect(server) else {
                continue;
            };
            let response = self
                .exchange(&mut stream, RequestOp::List { path: path.into() })
                .with_context(|| format!("listing on server {}", server))?;
            let names = match (response.status, response.body) {
                (Status::Success, ResponseBody::Listing(names)) => names,
                (Status::NotDirectory, _) => bail!("{:?} is not a directory", path),
                (Status::FileNotFound, _) => bail!("{:?} not found", path),
                (Status::InvalidIdentity, _) => {
                    bail!("invalid username/password for server {}", server)
                }
                (other, _) => bail!("unexpected LIST status {} from server {}", other, server),
            };

            for name in names {
                if !name.starts_with('.') {
                    if !directories.iter().any(|d| d == &name) {
                        directories.push(name);
                    }
                    continue;
                }
                let Some((logical, part)) = parts::parse_part_name(&name) else {
                    debug!(%name, "ignoring entry outside the part convention");
                    continue;
                };
                match files.iter_mut().find(|(f, _)| f == &logical) {
                    Some((_, present)) => present[part] = true,
                    None => {
                        let mut present = [false; NUM_PARTS];
                        present[part] = true;
                        files.push((logical, present));
                    }
                }
            }
        }

        Ok(Listing {
            files: files
                .into_iter()
                .map(|(name, present)| (name, present.iter().all(|&p| p)))
                .collect(),
            directories,
        })
    }

    /// Create a directory on every reachable server, reporting each
    /// server's status distinctly. A bad identity aborts, as everywhere
    /// else; the per-server outcomes are only ever path statuses.
    pub fn make_directory(&self, path: &str) -> Result<Vec<(usize, Status)>> {
        let mut outcomes = Vec::new();
        for server in 0..NUM_SERVERS {
            let Some(mut stream) = self.connect(server) else {
                continue;
            };
            let response = self
                .exchange(&mut stream, RequestOp::Mkdir { path: path.into() })
                .with_context(|| format!("mkdir on server {}", server))?;
            match response.status {
                Status::Success | Status::PathAlreadyExists | Status::InvalidPath => {
                    outcomes.push((server, response.status));
                }
                Status::InvalidIdentity => {
                    bail!("invalid username/password for server {}", server)
                }
                other => bail!("unexpected MKDIR status {} from server {}", other, server),
            }
        }
        Ok(outcomes)
    }
}
