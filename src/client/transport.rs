// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Transport endpoints the engine core consumes.
//!
//! The engine only needs three things from a transport: send one message,
//! receive one whole message, and report its message-size ceiling. UDP
//! maps messages onto datagrams; TCP carries a byte stream that is framed
//! back into messages with [`message::check_packet`].

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpSocket, TcpStream, UdpSocket,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ErrorKind, SnmpError, SnmpResult},
    models::message,
};

/// Largest UDP payload we will attempt (IPv4 maximum minus headers).
pub const UDP_MSG_MAX_SIZE: usize = 65507;
/// Stream transports are bounded by the protocol's 2^31-1 message cap.
pub const STREAM_MSG_MAX_SIZE: usize = 0x7fff_ffff;

/// One endpoint the session writes to and the read loop drains.
#[derive(Debug)]
pub enum Transport {
    Udp(UdpTransport),
    Tcp(TcpTransport),
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

#[derive(Debug)]
pub struct TcpTransport {
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,
    scratch: Mutex<BytesMut>,
    peer: SocketAddr,
}

impl Transport {
    /// UDP endpoint bound to `local` (or an ephemeral port) and connected
    /// to `peer`.
    pub async fn udp(peer: SocketAddr, local: Option<SocketAddr>) -> SnmpResult<Self> {
        let bind = local.unwrap_or_else(|| match peer {
            SocketAddr::V4(_) => "0.0.0.0:0".parse().expect("ipv4 any"),
            SocketAddr::V6(_) => "[::]:0".parse().expect("ipv6 any"),
        });
        let socket = UdpSocket::bind(bind).await.map_err(|e| {
            SnmpError::with_detail(ErrorKind::TransportConfigError, e.to_string())
        })?;
        socket.connect(peer).await.map_err(|e| {
            SnmpError::with_detail(ErrorKind::TransportConfigError, e.to_string())
        })?;
        Ok(Transport::Udp(UdpTransport { socket, peer }))
    }

    /// TCP endpoint connected to `peer`, honouring the configured socket
    /// buffer hints.
    pub async fn tcp(
        peer: SocketAddr,
        send_buf: Option<usize>,
        recv_buf: Option<usize>,
    ) -> SnmpResult<Self> {
        let socket = match peer {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| {
            SnmpError::with_detail(ErrorKind::TransportConfigError, e.to_string())
        })?;
        if let Some(size) = send_buf {
            socket.set_send_buffer_size(size as u32).map_err(|e| {
                SnmpError::with_detail(
                    ErrorKind::TransportConfigError,
                    e.to_string(),
                )
            })?;
        }
        if let Some(size) = recv_buf {
            socket.set_recv_buffer_size(size as u32).map_err(|e| {
                SnmpError::with_detail(
                    ErrorKind::TransportConfigError,
                    e.to_string(),
                )
            })?;
        }
        let stream = socket.connect(peer).await.map_err(|e| {
            SnmpError::with_detail(ErrorKind::TransportConfigError, e.to_string())
        })?;
        stream.set_nodelay(true).ok();
        Ok(Self::from_tcp_stream(stream, peer))
    }

    /// Wrap an accepted stream (listener child sessions).
    pub fn from_tcp_stream(stream: TcpStream, peer: SocketAddr) -> Self {
        let (r, w) = stream.into_split();
        Transport::Tcp(TcpTransport {
            reader: Mutex::new(r),
            writer: Mutex::new(w),
            scratch: Mutex::new(BytesMut::with_capacity(8192)),
            peer,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        match self {
            Transport::Udp(t) => t.peer,
            Transport::Tcp(t) => t.peer,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Transport::Udp(t) => t.socket.local_addr().ok(),
            Transport::Tcp(_) => None,
        }
    }

    /// Transport-imposed message size ceiling.
    pub fn msg_max_size(&self) -> usize {
        match self {
            Transport::Udp(_) => UDP_MSG_MAX_SIZE,
            Transport::Tcp(_) => STREAM_MSG_MAX_SIZE,
        }
    }

    pub async fn send(&self, bytes: &[u8]) -> SnmpResult<()> {
        match self {
            Transport::Udp(t) => {
                let sent = t.socket.send(bytes).await.map_err(|e| {
                    SnmpError::with_detail(ErrorKind::BadSendto, e.to_string())
                })?;
                if sent != bytes.len() {
                    return Err(SnmpError::with_detail(
                        ErrorKind::BadSendto,
                        format!("short datagram write: {sent}/{}", bytes.len()),
                    ));
                }
                Ok(())
            },
            Transport::Tcp(t) => {
                let mut w = t.writer.lock().await;
                w.write_all(bytes).await.map_err(|e| {
                    SnmpError::with_detail(ErrorKind::BadSendto, e.to_string())
                })?;
                Ok(())
            },
        }
    }

    /// Receive the next whole message. Cancellation resolves to `Abort`.
    pub async fn recv_frame(&self, cancel: &CancellationToken) -> SnmpResult<Bytes> {
        match self {
            Transport::Udp(t) => {
                let mut buf = vec![0u8; UDP_MSG_MAX_SIZE];
                tokio::select! {
                    _ = cancel.cancelled() => Err(SnmpError::new(ErrorKind::Abort)),
                    res = t.socket.recv(&mut buf) => {
                        let n = res.map_err(|e| SnmpError::with_detail(
                            ErrorKind::BadRecvfrom, e.to_string()))?;
                        buf.truncate(n);
                        Ok(Bytes::from(buf))
                    },
                }
            },
            Transport::Tcp(t) => {
                let mut scratch = t.scratch.lock().await;
                loop {
                    if let Some(total) = message::check_packet(&scratch)?
                        && scratch.len() >= total
                    {
                        return Ok(scratch.split_to(total).freeze());
                    }
                    let mut chunk = [0u8; 4096];
                    let n = tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(SnmpError::new(ErrorKind::Abort));
                        },
                        res = async {
                            let mut r = t.reader.lock().await;
                            r.read(&mut chunk).await
                        } => res.map_err(|e| SnmpError::with_detail(
                            ErrorKind::BadRecvfrom, e.to_string()))?,
                    };
                    if n == 0 {
                        return Err(SnmpError::with_detail(
                            ErrorKind::BadRecvfrom,
                            "connection closed by peer",
                        ));
                    }
                    scratch.extend_from_slice(&chunk[..n]);
                }
            },
        }
    }
}
