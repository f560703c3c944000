//! Configuration providers: the client's server-pool config and the
//! server's credential table. Both are loaded once at startup and shared
//! read-only afterwards.

use crate::protocol::NUM_SERVERS;
use anyhow::{bail, Context, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;

/// One storage server slot, immutable after load.
#[derive(Debug, Clone)]
pub struct ServerSlot {
    pub host: String,
    pub port: u16,
    pub addr: SocketAddr,
}

/// Client configuration: identity plus the four fixed server slots.
///
/// File format (one item per line):
/// ```text
/// Server DFS1 127.0.0.1:10001
/// Username: alice
/// Password: secret
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub username: String,
    pub password: String,
    pub servers: [ServerSlot; NUM_SERVERS],
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut username = None;
        let mut password = None;
        let mut servers: [Option<ServerSlot>; NUM_SERVERS] = [None, None, None, None];

        for line in text.lines() {
            let mut tokens = line.split_whitespace();
            match tokens.next() {
                Some("Server") => {
                    let name = tokens.next().context("Server line missing name")?;
                    let index = name
                        .strip_prefix("DFS")
                        .and_then(|n| n.parse::<usize>().ok())
                        .with_context(|| format!("bad server name {:?}", name))?;
                    if index < 1 || index > NUM_SERVERS {
                        bail!("server index out of range in {:?}", name);
                    }
                    let hostport = tokens.next().context("Server line missing address")?;
                    let (host, port) = hostport
                        .rsplit_once(':')
                        .with_context(|| format!("bad server address {:?}", hostport))?;
                    let port: u16 = port
                        .parse()
                        .with_context(|| format!("bad server port {:?}", port))?;
                    let addr = (host, port)
                        .to_socket_addrs()
                        .with_context(|| format!("resolving {}", hostport))?
                        .next()
                        .with_context(|| format!("no address for {}", hostport))?;
                    servers[index - 1] = Some(ServerSlot {
                        host: host.to_string(),
                        port,
                        addr,
                    });
                }
                Some("Username:") => {
                    username = Some(tokens.next().context("Username line empty")?.to_string());
                }
                Some("Password:") => {
                    password = Some(tokens.next().context("Password line empty")?.to_string());
                }
                _ => continue,
            }
        }

        let mut slots = Vec::with_capacity(NUM_SERVERS);
        for (i, slot) in servers.into_iter().enumerate() {
            slots.push(slot.with_context(|| format!("config missing Server DFS{}", i + 1))?);
        }
        let servers: [ServerSlot; NUM_SERVERS] = match slots.try_into() {
            Ok(arr) => arr,
            Err(_) => unreachable!("slot count checked above"),
        };

        Ok(ClientConfig {
            username: username.context("config missing Username:")?,
            password: password.context("config missing Password:")?,
            servers,
        })
    }
}

/// The server's credential table: flat `username password` lines, checked
/// with plain equality. Not an authentication boundary by design.
#[derive(Debug, Default, Clone)]
pub struct UserTable {
    entries: Vec<(String, String)>,
}

impl UserTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading user table {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing user table {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let mut tokens = line.split_whitespace();
            let username = tokens
                .next()
                .with_context(|| format!("bad user line {:?}", line))?;
            let password = tokens
                .next()
                .with_context(|| format!("user {:?} missing password", username))?;
            entries.push((username.to_string(), password.to_string()));
        }
        Ok(UserTable { entries })
    }

    pub fn is_valid(&self, username: &str, password: &str) -> bool {
        self.entries
            .iter()
            .any(|(u, p)| u == username && p == password)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONF: &str = "\
Server DFS1 127.0.0.1:10001
Server DFS2 127.0.0.1:10002
Server DFS3 127.0.0.1:10003
Server DFS4 127.0.0.1:10004
Username: alice
Password: secret
";

    #[test]
    fn parses_client_config() {
        let cfg = ClientConfig::parse(CONF).unwrap();
        assert_eq!(cfg.username, "alice");
        assert_eq!(cfg.password, "secret");
        assert_eq!(cfg.servers[0].port, 10001);
        assert_eq!(cfg.servers[3].port, 10004);
        assert_eq!(cfg.servers[2].host, "127.0.0.1");
    }

    #[test]
    fn server_order_comes_from_names_not_line_order() {
        let shuffled = "\
Server DFS3 127.0.0.1:10003
Username: bob
Server DFS1 127.0.0.1:10001
Server DFS4 127.0.0.1:10004
Password: pw
Server DFS2 127.0.0.1:10002
";
        let cfg = ClientConfig::parse(shuffled).unwrap();
        for (i, slot) in cfg.servers.iter().enumerate() {
            assert_eq!(slot.port as usize, 10001 + i);
        }
    }

    #[test]
    fn missing_server_is_an_error() {
        let partial = "\
Server DFS1 127.0.0.1:10001
Username: alice
Password: secret
";
        assert!(ClientConfig::parse(partial).is_err());
    }

    #[test]
    fn user_table_flat_equality() {
        let users = UserTable::parse("alice secret\nbob hunter2\n").unwrap();
        assert!(users.is_valid("alice", "secret"));
        assert!(users.is_valid("bob", "hunter2"));
        assert!(!users.is_valid("alice", "hunter2"));
        assert!(!users.is_valid("carol", "secret"));
    }
}
