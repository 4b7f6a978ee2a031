#![allow(clippy::many_single_char_names)]

use ::std::io;
use ::std::net::UdpSocket;

use embedded_time::rate::Fraction;
use tinyvec::ArrayVec;

use crate::net::{Addrd, Socket, MAX_DATAGRAM_SIZE};

/// Conversions between [`std::net`] and [`no_std_net`] address types
pub mod convert {
  /// [`no_std_net`] address -> [`std::net`] address
  pub fn std_addr(addr: no_std_net::SocketAddr) -> std::net::SocketAddr {
    use no_std_net::SocketAddr::*;

    match addr {
      | V4(v4) => {
        let [a, b, c, d] = v4.ip().octets();
        std::net::SocketAddr::V4(std::net::SocketAddrV4::new(std::net::Ipv4Addr::new(a, b, c, d),
                                                             v4.port()))
      },
      | V6(v6) => {
        let [a, b, c, d, e, f, g, h] = v6.ip().segments();
        std::net::SocketAddr::V6(std::net::SocketAddrV6::new(std::net::Ipv6Addr::new(a, b, c, d,
                                                                                     e, f, g, h),
                                                             v6.port(),
                                                             v6.flowinfo(),
                                                             v6.scope_id()))
      },
    }
  }

  /// [`std::net`] address -> [`no_std_net`] address
  pub fn no_std_addr(addr: std::net::SocketAddr) -> no_std_net::SocketAddr {
    use std::net::SocketAddr::*;

    match addr {
      | V4(v4) => {
        let [a, b, c, d] = v4.ip().octets();
        no_std_net::SocketAddr::V4(no_std_net::SocketAddrV4::new(no_std_net::Ipv4Addr::new(a, b,
                                                                                           c, d),
                                                                 v4.port()))
      },
      | V6(v6) => {
        let [a, b, c, d, e, f, g, h] = v6.ip().segments();
        no_std_net::SocketAddr::V6(no_std_net::SocketAddrV6::new(no_std_net::Ipv6Addr::new(a, b,
                                                                                           c, d,
                                                                                           e, f,
                                                                                           g, h),
                                                                 v6.port(),
                                                                 v6.flowinfo(),
                                                                 v6.scope_id()))
      },
    }
  }
}

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives
#[derive(Debug, Clone, Copy)]
pub struct Clock(::std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock, whose epoch is the moment of its creation
  pub fn new() -> Self {
    Self(::std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  // microseconds
  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<embedded_time::Instant<Self>, embedded_time::clock::Error> {
    let elapsed = ::std::time::Instant::now().duration_since(self.0);
    Ok(embedded_time::Instant::new(elapsed.as_micros() as u64))
  }
}

impl Socket for UdpSocket {
  type Error = io::Error;
  type Dgram = ArrayVec<[u8; MAX_DATAGRAM_SIZE]>;

  fn local_addr(&self) -> no_std_net::SocketAddr {
    convert::no_std_addr(UdpSocket::local_addr(self).expect("bound socket must have a local address"))
  }

  fn empty_dgram() -> Self::Dgram {
    ArrayVec::from([0u8; MAX_DATAGRAM_SIZE])
  }

  fn bind_raw<A: no_std_net::ToSocketAddrs>(addr: A) -> Result<Self, Self::Error> {
    let addrs = addr.to_socket_addrs()
                    .unwrap()
                    .map(convert::std_addr)
                    .collect::<Vec<_>>();

    let sock = UdpSocket::bind(&addrs[..])?;
    sock.set_nonblocking(true)?;
    Ok(sock)
  }

  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    self.send_to(msg.data(), convert::std_addr(msg.addr()))
        .map(|_| ())
        .map_err(|e| match e.kind() {
          | io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
          | _ => nb::Error::Other(e),
        })
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    self.recv_from(buffer)
        .map(|(n, addr)| Addrd(n, convert::no_std_addr(addr)))
        .map_err(|e| match e.kind() {
          | io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
          | _ => nb::Error::Other(e),
        })
  }

  fn peek(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    self.peek_from(buffer)
        .map(|(n, addr)| Addrd(n, convert::no_std_addr(addr)))
        .map_err(|e| match e.kind() {
          | io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
          | _ => nb::Error::Other(e),
        })
  }

  fn join_multicast(&self, addr: no_std_net::IpAddr) -> Result<(), Self::Error> {
    match addr {
      | no_std_net::IpAddr::V4(v4) => {
        let [a, b, c, d] = v4.octets();
        self.join_multicast_v4(&std::net::Ipv4Addr::new(a, b, c, d),
                               &std::net::Ipv4Addr::UNSPECIFIED)
      },
      | no_std_net::IpAddr::V6(v6) => {
        let [a, b, c, d, e, f, g, h] = v6.segments();
        self.join_multicast_v6(&std::net::Ipv6Addr::new(a, b, c, d, e, f, g, h), 0)
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn addr_conversion_roundtrips() {
    let v4: no_std_net::SocketAddr = "192.168.0.1:5683".parse().unwrap();
    let v6: no_std_net::SocketAddr = "[2001:db8::17]:5683".parse().unwrap();

    assert_eq!(convert::no_std_addr(convert::std_addr(v4)), v4);
    assert_eq!(convert::no_std_addr(convert::std_addr(v6)), v6);
  }

  #[test]
  fn clock_is_monotonic() {
    use embedded_time::Clock as _;

    let clock = Clock::new();
    let a = clock.try_now().unwrap();
    let b = clock.try_now().unwrap();
    assert!(b >= a);
  }
}
