use eft_common::Array;
use no_std_net::{SocketAddr, ToSocketAddrs};

/// The default (unsecured) CoAP port
pub const DEFAULT_PORT: u16 = 5683;

/// The most bytes this implementation will put in a single datagram
pub const MAX_DATAGRAM_SIZE: usize = 1152;

/// Data that came from (or is going to) a network socket
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// Borrow the contents of this Addressed
  pub fn as_ref(&self) -> Addrd<&T> {
    Addrd(self.data(), self.addr())
  }

  /// Discard the socket and get the data in this Addressed
  pub fn unwrap(self) -> T {
    self.0
  }

  /// Map the data contained in this Addressed
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }

  /// Map the data contained in this Addressed (with a copy of the address)
  pub fn map_with_addr<R>(self, f: impl FnOnce(T, SocketAddr) -> R) -> Addrd<R> {
    Addrd(f(self.0, self.1), self.1)
  }

  /// Borrow the contents of the addressed item
  pub fn data(&self) -> &T {
    &self.0
  }

  /// Mutably borrow the contents of the addressed item
  pub fn data_mut(&mut self) -> &mut T {
    &mut self.0
  }

  /// Copy the socket address for the data
  pub fn addr(&self) -> SocketAddr {
    self.1
  }

  /// Turn the entire structure into something else
  pub fn fold<R>(self, f: impl FnOnce(T, SocketAddr) -> R) -> R {
    f(self.0, self.1)
  }
}

impl<T> AsMut<T> for Addrd<T> {
  fn as_mut(&mut self) -> &mut T {
    &mut self.0
  }
}

/// A CoAP network socket
///
/// This mirrors the Udp socket traits in embedded-nal, but allows us
/// to implement them for foreign types (like `std::net::UdpSocket`).
pub trait Socket: Sized {
  /// The error yielded by socket operations
  type Error: core::fmt::Debug;

  /// Buffer type used for receiving and sending datagrams.
  ///
  /// GOTCHA: if the length of the buffer is zero (even if the capacity
  /// is greater in the case of ArrayVec or Vec), no bytes will be
  /// read. Make sure you set the length manually with zero `0u8`
  /// filled in each position. (ex. `Vec::resize(_, 1024usize, 0u8)`)
  type Dgram: Array<Item = u8> + AsRef<[u8]> + Clone + core::fmt::Debug + PartialEq;

  /// Get the local address this socket was bound to
  fn local_addr(&self) -> SocketAddr;

  /// Create an empty [`Socket::Dgram`] buffer
  ///
  /// (this has a major GOTCHA, see [`Socket::Dgram`].)
  fn empty_dgram() -> Self::Dgram;

  /// Bind the socket to an address, without joining any multicast
  /// groups.
  ///
  /// Implementors of `bind_raw` should:
  ///  - yield a socket in a non-blocking state
  ///  - bind to the first address if `addr` yields multiple addresses
  fn bind_raw<A: ToSocketAddrs>(addr: A) -> Result<Self, Self::Error>;

  /// Binds the socket to a local address.
  ///
  /// This function will automatically invoke
  /// [`Socket::join_multicast`] if the address is a multicast address,
  /// and should yield a non-blocking socket.
  fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self, Self::Error> {
    let addr = addr.to_socket_addrs()
                   .unwrap()
                   .next()
                   .expect("ToSocketAddrs yielded no addresses");

    let sock = Self::bind_raw(addr)?;

    match addr.ip() {
      | ip if ip.is_multicast() => sock.join_multicast(ip)?,
      | _ => (),
    };

    Ok(sock)
  }

  /// Send a message to a remote address
  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error>;

  /// Pull a buffered datagram from the socket, along with the address
  /// of the sender.
  ///
  /// It is expected that (like [`std::net::UdpSocket`]) if the message
  /// is larger than the buffer, the excess bytes are dropped and not
  /// considered an error condition.
  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error>;

  /// Look at a buffered datagram without clearing the receive queue.
  fn peek(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error>;

  /// Poll the socket for a datagram, yielding `None` when the socket
  /// would block.
  fn poll(&self) -> Result<Option<Addrd<Self::Dgram>>, Self::Error> {
    let mut buf = Self::empty_dgram();
    let recvd = self.recv(&mut buf);

    match recvd {
      | Ok(Addrd(n, addr)) => Ok(Some(Addrd(buf.into_iter().take(n).collect(), addr))),
      | Err(nb::Error::WouldBlock) => Ok(None),
      | Err(nb::Error::Other(e)) => Err(e),
    }
  }

  /// Join a multicast group
  fn join_multicast(&self, addr: no_std_net::IpAddr) -> Result<(), Self::Error>;
}
