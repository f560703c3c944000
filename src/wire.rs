//! Wire codec: encoding and decoding of request/response frames.
//!
//! A frame is a fixed header immediately followed by username bytes,
//! password bytes, then the variant payload, with no delimiters. The length
//! fields in the header are authoritative; decoding defers (returns `None`)
//! until the full frame has been buffered.

use crate::protocol::{
    OpKind, Status, LEN_FIELD, MAX_FRAME_SIZE, NAME_MAX, REQUEST_HEADER_LEN, REQUEST_START,
    RESPONSE_HEADER_LEN, RESPONSE_START,
};
use anyhow::{bail, Context, Result};
use std::io::{Read, Write};

/// One client request. Constructed fresh per operation and consumed by the
/// send (client) or by response building (server).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub username: String,
    pub password: String,
    pub op: RequestOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOp {
    Put { path: String, file: Vec<u8> },
    Get { path: String },
    List { path: String },
    Mkdir { path: String },
}

impl RequestOp {
    pub fn kind(&self) -> OpKind {
        match self {
            RequestOp::Put { .. } => OpKind::Put,
            RequestOp::Get { .. } => OpKind::Get,
            RequestOp::List { .. } => OpKind::List,
            RequestOp::Mkdir { .. } => OpKind::Mkdir,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            RequestOp::Put { path, .. }
            | RequestOp::Get { path }
            | RequestOp::List { path }
            | RequestOp::Mkdir { path } => path,
        }
    }
}

/// One server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub kind: OpKind,
    pub status: Status,
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// PUT and MKDIR responses, and any non-Success GET/LIST.
    Empty,
    /// Successful GET: the stored (still masked) file bytes.
    File(Vec<u8>),
    /// Successful LIST: directory entry names.
    Listing(Vec<String>),
}

impl Response {
    pub fn empty(kind: OpKind, status: Status) -> Self {
        Response {
            kind,
            status,
            body: ResponseBody::Empty,
        }
    }
}

fn put_len(buf: &mut Vec<u8>, v: usize) {
    buf.extend_from_slice(&v.to_ne_bytes());
}

fn get_len(buf: &[u8]) -> usize {
    let mut raw = [0u8; LEN_FIELD];
    raw.copy_from_slice(&buf[..LEN_FIELD]);
    usize::from_ne_bytes(raw)
}

/// Serialize a request into a fresh frame.
pub fn encode_request(req: &Request) -> Vec<u8> {
    let (path, file): (&str, &[u8]) = match &req.op {
        RequestOp::Put { path, file } => (path, file),
        RequestOp::Get { path } | RequestOp::List { path } | RequestOp::Mkdir { path } => {
            (path, &[])
        }
    };

    let mut buf = Vec::with_capacity(
        REQUEST_HEADER_LEN + req.username.len() + req.password.len() + path.len() + file.len(),
    );
    buf.push(REQUEST_START);
    buf.push(req.op.kind().tag());
    put_len(&mut buf, req.username.len());
    put_len(&mut buf, req.password.len());
    put_len(&mut buf, path.len());
    put_len(&mut buf, file.len());
    buf.extend_from_slice(req.username.as_bytes());
    buf.extend_from_slice(req.password.as_bytes());
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(file);
    buf
}

fn str_field(raw: &[u8], what: &str) -> Result<String> {
    Ok(std::str::from_utf8(raw)
        .with_context(|| format!("{} is not valid utf-8", what))?
        .to_string())
}

/// Attempt to decode one request frame from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame;
/// on success returns the request and the number of bytes consumed. A bad
/// start marker or unknown tag is an error, fatal to the connection.
pub fn try_decode_request(buf: &[u8]) -> Result<Option<(Request, usize)>> {
    if buf.len() < REQUEST_HEADER_LEN {
        return Ok(None);
    }
    if buf[0] != REQUEST_START {
        bail!("request frame does not begin with start marker: {:#04x}", buf[0]);
    }
    let kind = OpKind::from_tag(buf[1])?;
    let username_len = get_len(&buf[2..]);
    let password_len = get_len(&buf[2 + LEN_FIELD..]);
    let path_len = get_len(&buf[2 + 2 * LEN_FIELD..]);
    let file_len = get_len(&buf[2 + 3 * LEN_FIELD..]);
    if kind != OpKind::Put && file_len != 0 {
        bail!("non-zero file length {} in {:?} request", file_len, kind);
    }

    let data_len = username_len
        .checked_add(password_len)
        .and_then(|n| n.checked_add(path_len))
        .and_then(|n| n.checked_add(file_len))
        .context("request length fields overflow")?;
    if data_len > MAX_FRAME_SIZE {
        bail!("request frame too large: {} bytes", data_len);
    }
    let frame_len = REQUEST_HEADER_LEN
        .checked_add(data_len)
        .context("request frame length overflows")?;
    if buf.len() < frame_len {
        return Ok(None);
    }

    let data = &buf[REQUEST_HEADER_LEN..frame_len];
    let username = str_field(&data[..username_len], "username")?;
    let password = str_field(&data[username_len..username_len + password_len], "password")?;
    let variant = &data[username_len + password_len..];
    let path = str_field(&variant[..path_len], "path")?;
    let op = match kind {
        OpKind::Put => RequestOp::Put {
            path,
            file: variant[path_len..].to_vec(),
        },
        OpKind::Get => RequestOp::Get { path },
        OpKind::List => RequestOp::List { path },
        OpKind::Mkdir => RequestOp::Mkdir { path },
    };

    Ok(Some((
        Request {
            username,
            password,
            op,
        },
        frame_len,
    )))
}

/// Serialized length of a response frame.
pub fn response_len(res: &Response) -> usize {
    RESPONSE_HEADER_LEN
        + match &res.body {
            ResponseBody::Empty => 0,
            ResponseBody::File(file) => file.len(),
            ResponseBody::Listing(names) => names.len() * NAME_MAX,
        }
}

/// Serialize a response into a fresh frame.
pub fn encode_response(res: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(response_len(res));
    buf.push(RESPONSE_START);
    buf.push(res.kind.tag());
    buf.push(res.status.code());
    match &res.body {
        ResponseBody::Empty => put_len(&mut buf, 0),
        ResponseBody::File(file) => {
            put_len(&mut buf, file.len());
            buf.extend_from_slice(file);
        }
        ResponseBody::Listing(names) => {
            put_len(&mut buf, names.len());
            // Fixed NAME_MAX-byte slots, zero-padded, truncated when longer.
            for name in names {
                let raw = name.as_bytes();
                let take = raw.len().min(NAME_MAX);
                buf.extend_from_slice(&raw[..take]);
                buf.resize(buf.len() + NAME_MAX - take, 0);
            }
        }
    }
    buf
}

/// Attempt to decode one response frame from the front of `buf`, deferring
/// until the full frame has arrived. Returns the response and the bytes
/// consumed.
pub fn try_decode_response(buf: &[u8]) -> Result<Option<(Response, usize)>> {
    if buf.len() < RESPONSE_HEADER_LEN {
        return Ok(None);
    }
    if buf[0] != RESPONSE_START {
        bail!("response frame does not begin with start marker: {:#04x}", buf[0]);
    }
    let kind = OpKind::from_tag(buf[1])?;
    let status = Status::from_code(buf[2])?;
    let len = get_len(&buf[3..]);

    let body_len = match (kind, status) {
        (OpKind::Get, Status::Success) => len,
        (OpKind::List, Status::Success) => len
            .checked_mul(NAME_MAX)
            .context("listing entry count overflows")?,
        _ => 0,
    };
    if body_len > MAX_FRAME_SIZE {
        bail!("response frame too large: {} bytes", body_len);
    }
    let frame_len = RESPONSE_HEADER_LEN
        .checked_add(body_len)
        .context("response frame length overflows")?;
    if buf.len() < frame_len {
        return Ok(None);
    }

    let data = &buf[RESPONSE_HEADER_LEN..frame_len];
    let body = match (kind, status) {
        (OpKind::Get, Status::Success) => ResponseBody::File(data.to_vec()),
        (OpKind::List, Status::Success) => {
            let mut names = Vec::with_capacity(len);
            for slot in data.chunks_exact(NAME_MAX) {
                let end = slot.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
                names.push(str_field(&slot[..end], "listing entry")?);
            }
            ResponseBody::Listing(names)
        }
        _ => ResponseBody::Empty,
    };

    Ok(Some((Response { kind, status, body }, frame_len)))
}

/// Blocking send of one request over a stream (client side).
pub fn write_request(stream: &mut impl Write, req: &Request) -> Result<()> {
    let frame = encode_request(req);
    stream
        .write_all(&frame)
        .context("writing request frame")?;
    Ok(())
}

/// Blocking receive of one response (client side). Reads the fixed header,
/// then exactly the announced payload. The response type must match the
/// request that was sent; a mismatch is a protocol violation.
pub fn read_response(stream: &mut impl Read, expected: OpKind) -> Result<Response> {
    let mut header = vec![0u8; RESPONSE_HEADER_LEN];
    stream
        .read_exact(&mut header)
        .context("reading response header")?;

    if header[0] != RESPONSE_START {
        bail!("response does not begin with start marker: {:#04x}", header[0]);
    }
    let kind = OpKind::from_tag(header[1])?;
    if kind != expected {
        bail!("expected {:?} response, got {:?}", expected, kind);
    }
    let status = Status::from_code(header[2])?;
    let len = get_len(&header[3..]);

    // For LIST the header field counts entries, not bytes; bound the byte
    // size it implies before allocating anything.
    let body_len = match (kind, status) {
        (OpKind::Get, Status::Success) => len,
        (OpKind::List, Status::Success) => len
            .checked_mul(NAME_MAX)
            .context("listing entry count overflows")?,
        _ => 0,
    };
    if body_len > MAX_FRAME_SIZE {
        bail!("response announces {} bytes, refusing", body_len);
    }

    let body = match (kind, status) {
        (OpKind::Get, Status::Success) => {
            let mut file = vec![0u8; len];
            stream
                .read_exact(&mut file)
                .context("reading GET response body")?;
            ResponseBody::File(file)
        }
        (OpKind::List, Status::Success) => {
            let mut names = Vec::with_capacity(len);
            let mut slot = [0u8; NAME_MAX];
            for _ in 0..len {
                stream
                    .read_exact(&mut slot)
                    .context("reading LIST response entry")?;
                let end = slot.iter().position(|&b| b == 0).unwrap_or(NAME_MAX);
                names.push(str_field(&slot[..end], "listing entry")?);
            }
            ResponseBody::Listing(names)
        }
        _ => ResponseBody::Empty,
    };

    Ok(Response { kind, status, body })
}
