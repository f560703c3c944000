//! Shared wire protocol constants for the quadfs framed transport

use anyhow::{bail, Result};

/// First byte of every request frame.
pub const REQUEST_START: u8 = b'R';
/// First byte of every response frame.
pub const RESPONSE_START: u8 = b'T';

/// Length fields on the wire are native-endian, architecture-width integers.
/// Client and server always run on the same platform family in this design.
pub const LEN_FIELD: usize = std::mem::size_of::<usize>();

/// Fixed request header:
/// `[start:1][type:1][username_len][password_len][path_len][file_len]`
/// (`file_len` is zero for everything but PUT).
pub const REQUEST_HEADER_LEN: usize = 2 + 4 * LEN_FIELD;

/// Fixed response header: `[start:1][type:1][status:1][len]`
/// (`len` is file length for GET, entry count for LIST, zero otherwise).
pub const RESPONSE_HEADER_LEN: usize = 3 + LEN_FIELD;

/// Maximum frame payload size. Bounds what a single length field can make
/// either side allocate; a frame announcing more than this is malformed.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// LIST responses carry each entry name in a fixed slot of this many bytes,
/// zero-padded or truncated. Forces an upper bound on path names; must be
/// preserved for wire compatibility.
pub const NAME_MAX: usize = 255;

/// The number of storage servers and file parts is fixed at four.
pub const NUM_SERVERS: usize = 4;
pub const NUM_PARTS: usize = 4;

/// Operation kind, one per request/response variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Put,
    Get,
    List,
    Mkdir,
}

impl OpKind {
    pub fn tag(self) -> u8 {
        match self {
            OpKind::Put => b'P',
            OpKind::Get => b'G',
            OpKind::List => b'L',
            OpKind::Mkdir => b'M',
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        Ok(match tag {
            b'P' => OpKind::Put,
            b'G' => OpKind::Get,
            b'L' => OpKind::List,
            b'M' => OpKind::Mkdir,
            other => bail!("unknown operation tag {:#04x}", other),
        })
    }
}

/// Single status enumeration shared by all four operations. Each non-Success
/// status has a fixed, operation-specific meaning (NotDirectory only for
/// LIST, PathAlreadyExists only for MKDIR, and so on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    FileNotFound,
    InvalidIdentity,
    NotDirectory,
    PathAlreadyExists,
    InvalidPath,
}

impl Status {
    pub fn code(self) -> u8 {
        match self {
            Status::Success => 0,
            Status::FileNotFound => 1,
            Status::InvalidIdentity => 2,
            Status::NotDirectory => 3,
            Status::PathAlreadyExists => 4,
            Status::InvalidPath => 5,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            0 => Status::Success,
            1 => Status::FileNotFound,
            2 => Status::InvalidIdentity,
            3 => Status::NotDirectory,
            4 => Status::PathAlreadyExists,
            5 => Status::InvalidPath,
            other => bail!("unknown status code {}", other),
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::FileNotFound => "file not found",
            Status::InvalidIdentity => "invalid username/password",
            Status::NotDirectory => "path is not a directory",
            Status::PathAlreadyExists => "path already exists",
            Status::InvalidPath => "path is invalid",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_tags_round_trip() {
        for kind in [OpKind::Put, OpKind::Get, OpKind::List, OpKind::Mkdir] {
            assert_eq!(OpKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(OpKind::from_tag(b'X').is_err());
    }

    #[test]
    fn status_codes_round_trip() {
        for status in [
            Status::Success,
            Status::FileNotFound,
            Status::InvalidIdentity,
            Status::NotDirectory,
            Status::PathAlreadyExists,
            Status::InvalidPath,
        ] {
            assert_eq!(Status::from_code(status.code()).unwrap(), status);
        }
        assert!(Status::from_code(6).is_err());
    }
}
