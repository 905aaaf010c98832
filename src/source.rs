//! Byte sources: external collaborators around the core's `read(n) -> bytes`
//! boundary (spec.md §1, §9 "Exception-for-control-flow on EOF").
//!
//! The core never calls into the operating system directly; it only ever
//! calls [`Source::read`]. A short read of `0` bytes signals end-of-stream;
//! any other short read is only legal at a packet boundary (the framer turns
//! a short read that lands mid-packet into `Error::Desynchronized`).

use std::fs::File;
use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

/// A pull-based byte source. `read(n)` returns up to `n` bytes; returning
/// fewer than `n` (including zero) is always legal and is the only way to
/// signal a short read or end-of-stream — there is no separate EOF error.
pub trait Source {
    /// Read up to `n` bytes. `Ok(buf)` with `buf.is_empty()` means EOF.
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>>;
}

/// Reads a concatenation of 188-byte packets from a local file.
pub struct FileSource {
    file: File,
}

impl FileSource {
    /// Opens `path` for reading.
    pub fn open(path: impl AsRef<std::path::Path>) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
        })
    }
}

impl Source for FileSource {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let mut total = 0;
        while total < n {
            let read = self.file.read(&mut buf[total..])?;
            if read == 0 {
                break;
            }
            total += read;
        }
        buf.truncate(total);
        Ok(buf)
    }
}

/// Reads 188-byte-aligned packets from an IPv4 UDP socket, joining a
/// multicast group when `addr` is a multicast address (spec.md §6).
///
/// Grounded on the teacher's `network::create_udp_socket`: the same
/// `socket2` setup (`SO_REUSEADDR`, `IP_ADD_MEMBERSHIP` on the unspecified
/// interface), made blocking since the core is synchronous (see
/// SPEC_FULL.md §5). The CLI binary uses an async `tokio::net::UdpSocket`
/// on a background task instead and feeds a channel-backed `Source`; this
/// type is for synchronous callers (and tests) that want a plain blocking
/// UDP read loop.
pub struct UdpSource {
    socket: std::net::UdpSocket,
    pending: Vec<u8>,
}

impl UdpSource {
    /// Binds (and, if multicast, joins) `addr`.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let ip = match addr.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "only IPv4 is supported",
                ));
            }
        };

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        if ip.is_multicast() {
            socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
        }
        socket.set_nonblocking(false)?;

        Ok(Self {
            socket: socket.into(),
            pending: Vec::new(),
        })
    }
}

impl Source for UdpSource {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        while self.pending.len() < n {
            let mut datagram = [0u8; 65_507];
            let received = self.socket.recv(&mut datagram)?;
            if received == 0 {
                break;
            }
            self.pending.extend_from_slice(&datagram[..received]);
        }
        let take = n.min(self.pending.len());
        Ok(self.pending.drain(..take).collect())
    }
}

/// Reads from a prebuilt in-memory buffer. Used by tests and by the
/// channel-backed CLI adapter.
pub struct SliceSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SliceSource<'a> {
    /// Wraps `data` for sequential reading from the start.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl Source for SliceSource<'_> {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let end = (self.pos + n).min(self.data.len());
        let out = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(out)
    }
}

impl<T: Source + ?Sized> Source for Box<T> {
    fn read(&mut self, n: usize) -> io::Result<Vec<u8>> {
        (**self).read(n)
    }
}
