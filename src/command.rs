//! Interactive command parsing for the client shell.
//!
//! Commands are case-insensitive: `put <local-file> [remote-dir]`,
//! `get <path>`, `list [path]`, `mkdir <path>`.

use anyhow::{bail, Result};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Upload a local file into the given remote directory (default `.`).
    Put {
        local: PathBuf,
        remote_dir: String,
    },
    Get { path: String },
    List { path: String },
    Mkdir { path: String },
}

/// Remote path a PUT stores under: the remote directory joined with the
/// local file's basename.
pub fn remote_put_path(local: &std::path::Path, remote_dir: &str) -> Result<String> {
    let Some(name) = local.file_name().and_then(|n| n.to_str()) else {
        bail!("local path {:?} has no usable filename", local);
    };
    if remote_dir.ends_with('/') {
        Ok(format!("{remote_dir}{name}"))
    } else {
        Ok(format!("{remote_dir}/{name}"))
    }
}

pub fn parse(line: &str) -> Result<Command> {
    let mut tokens = line.split_whitespace();
    let Some(verb) = tokens.next() else {
        bail!("empty command");
    };
    let command = match verb.to_ascii_uppercase().as_str() {
        "PUT" => {
            let Some(local) = tokens.next() else {
                bail!("put needs a local file");
            };
            Command::Put {
                local: PathBuf::from(local),
                remote_dir: tokens.next().unwrap_or(".").to_string(),
            }
        }
        "GET" => {
            let Some(path) = tokens.next() else {
                bail!("get needs a path");
            };
            Command::Get { path: path.into() }
        }
        "LIST" => Command::List {
            path: tokens.next().unwrap_or(".").to_string(),
        },
        "MKDIR" => {
            let Some(path) = tokens.next() else {
                bail!("mkdir needs a path");
            };
            Command::Mkdir { path: path.into() }
        }
        other => bail!("unknown command {:?}", other),
    };
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn parses_all_verbs_case_insensitively() {
        assert_eq!(
            parse("put report.txt docs").unwrap(),
            Command::Put {
                local: PathBuf::from("report.txt"),
                remote_dir: "docs".into(),
            }
        );
        assert_eq!(
            parse("PUT report.txt").unwrap(),
            Command::Put {
                local: PathBuf::from("report.txt"),
                remote_dir: ".".into(),
            }
        );
        assert_eq!(
            parse("Get a/b.txt").unwrap(),
            Command::Get {
                path: "a/b.txt".into()
            }
        );
        assert_eq!(parse("list").unwrap(), Command::List { path: ".".into() });
        assert_eq!(
            parse("mkdir docs").unwrap(),
            Command::Mkdir {
                path: "docs".into()
            }
        );
    }

    #[test]
    fn rejects_bad_commands() {
        assert!(parse("").is_err());
        assert!(parse("frobnicate x").is_err());
        assert!(parse("get").is_err());
        assert!(parse("mkdir").is_err());
        assert!(parse("put").is_err());
    }

    #[test]
    fn remote_path_joins_basename() {
        assert_eq!(
            remote_put_path(Path::new("/tmp/report.txt"), ".").unwrap(),
            "./report.txt"
        );
        assert_eq!(
            remote_put_path(Path::new("report.txt"), "docs/").unwrap(),
            "docs/report.txt"
        );
    }
}
