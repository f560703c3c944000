//! Storage server event loop: single-threaded, readiness-driven.
//!
//! One `mio` poll drives the listener and every connection. Connections are
//! owned by a token-keyed map, created on accept and removed on peer
//! half-close or fatal I/O error; nothing is shared between them except the
//! read-only root and user table. All socket work is non-blocking; local
//! filesystem calls made while building a response are synchronous by
//! design.

use crate::config::UserTable;
use crate::connbuf::{ReadRegion, WriteRegion};
use crate::storage::Storage;
use crate::wire::{encode_response, try_decode_request};
use anyhow::{Context, Result};
use mio::event::Event;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use tracing::{debug, info, trace, warn};

const LISTENER: Token = Token(0);
const MAX_EVENTS: usize = 1024;

/// Per-connection state: the socket plus its two buffer regions.
struct Connection {
    token: Token,
    socket: TcpStream,
    read: ReadRegion,
    write: WriteRegion,
    interest: Interest,
    /// Peer sent EOF; drop after the final opportunistic flush.
    peer_closed: bool,
}

pub struct Server {
    poll: Poll,
    listener: TcpListener,
    local_addr: SocketAddr,
    storage: Storage,
    users: UserTable,
    connections: HashMap<Token, Connection>,
    next_token: usize,
}

impl Server {
    pub fn bind(addr: SocketAddr, storage: Storage, users: UserTable) -> Result<Self> {
        let poll = Poll::new().context("creating poll")?;
        let mut listener =
            TcpListener::bind(addr).with_context(|| format!("binding {}", addr))?;
        let local_addr = listener.local_addr().context("listener local addr")?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .context("registering listener")?;
        Ok(Server {
            poll,
            listener,
            local_addr,
            storage,
            users,
            connections: HashMap::new(),
            next_token: 1,
        })
    }

    /// Bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the event loop until the process is stopped.
    pub fn run(&mut self) -> Result<()> {
        info!(addr = %self.local_addr, "storage server listening");
        let mut events = Events::with_capacity(MAX_EVENTS);
        loop {
            match self.poll.poll(&mut events, None) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err).context("polling for readiness"),
            }
            for event in events.iter() {
                if event.token() == LISTENER {
                    self.accept_ready();
                } else {
                    self.connection_ready(event);
                }
            }
        }
    }

    /// Accept until the listener reports no more pending connections,
    /// registering each with read interest only.
    fn accept_ready(&mut self) {
        loop {
            let (mut socket, peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "accept failed");
                    break;
                }
            };
            let token = Token(self.next_token);
            self.next_token += 1;
            if let Err(err) =
                self.poll
                    .registry()
                    .register(&mut socket, token, Interest::READABLE)
            {
                warn!(%peer, %err, "registering connection failed");
                continue;
            }
            debug!(%peer, ?token, "accepted connection");
            self.connections.insert(
                token,
                Connection {
                    token,
                    socket,
                    read: ReadRegion::new(),
                    write: WriteRegion::new(),
                    interest: Interest::READABLE,
                    peer_closed: false,
                },
            );
        }
    }

    /// Drive one connection through read, frame servicing, and flush. The
    /// connection is taken out of the map for the duration; a fatal error
    /// or a completed half-close means it is simply not put back.
    fn connection_ready(&mut self, event: &Event) {
        let token = event.token();
        let Some(mut conn) = self.connections.remove(&token) else {
            return;
        };

        if event.is_read_closed() {
            conn.peer_closed = true;
        }

        let alive = self.drive(&mut conn, event.is_readable());
        if alive && !conn.peer_closed {
            self.connections.insert(token, conn);
        } else {
            debug!(?token, "closing connection");
            if let Err(err) = self.poll.registry().deregister(&mut conn.socket) {
                trace!(?token, %err, "deregister failed");
            }
        }
    }

    /// Returns false when the connection hit a fatal condition.
    fn drive(&mut self, conn: &mut Connection, readable: bool) -> bool {
        if readable {
            if !Self::drain_socket(conn) {
                return false;
            }
        }
        if !self.service_frames(conn) {
            return false;
        }
        if !self.flush(conn) {
            return false;
        }
        true
    }

    /// Drain the socket into the read region until the kernel reports no
    /// more data or the peer closed, growing the region as needed.
    fn drain_socket(conn: &mut Connection) -> bool {
        loop {
            let spare = conn.read.spare();
            match conn.socket.read(spare) {
                Ok(0) => {
                    conn.peer_closed = true;
                    return true;
                }
                Ok(n) => {
                    trace!(n, "read bytes");
                    conn.read.advance_end(n);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => return true,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "read failed");
                    return false;
                }
            }
        }
    }

    /// Parse and service every complete buffered frame. A single readiness
    /// event may carry multiple pipelined requests. A malformed frame is
    /// fatal to this connection only.
    fn service_frames(&mut self, conn: &mut Connection) -> bool {
        loop {
            match try_decode_request(conn.read.parseable()) {
                Ok(Some((request, frame_len))) => {
                    conn.read.consume(frame_len);
                    debug!(
                        kind = ?request.op.kind(),
                        path = %request.op.path(),
                        "servicing request"
                    );
                    let response = self.storage.build_response(&self.users, &request);
                    conn.write.push(&encode_response(&response));
                }
                Ok(None) => return true,
                Err(err) => {
                    warn!(%err, "protocol violation");
                    return false;
                }
            }
        }
    }

    /// Flush the write region until the socket would block. Write interest
    /// is requested only while flushes are partial, and dropped again once
    /// the region drains.
    fn flush(&mut self, conn: &mut Connection) -> bool {
        while !conn.write.is_empty() {
            match conn.socket.write(conn.write.pending()) {
                Ok(0) => return false,
                Ok(n) => {
                    trace!(n, "wrote bytes");
                    conn.write.consume(n);
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    warn!(%err, "write failed");
                    return false;
                }
            }
        }

        let wanted = if conn.write.is_empty() {
            Interest::READABLE
        } else {
            Interest::READABLE | Interest::WRITABLE
        };
        if wanted != conn.interest {
            let token = conn.token;
            if let Err(err) = self
                .poll
                .registry()
                .reregister(&mut conn.socket, token, wanted)
            {
                warn!(%err, "reregister failed");
                return false;
            }
            conn.interest = wanted;
        }
        true
    }
}
