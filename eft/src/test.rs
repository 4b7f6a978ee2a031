#![allow(dead_code)]

use ::std::sync::{Arc, Mutex};

use embedded_time::rate::Fraction;
use embedded_time::Instant;
use no_std_net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::net::{Addrd, Socket};
use crate::platform;

/// Build an [`Addrd`]`<`[`test::Message`](Message)`>` from a terse
/// type/code/port description.
macro_rules! msg {
  (CON GET x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Con} {eft_msg::Code::GET} x.x.x.x:$port) };
  (CON PUT x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Con} {eft_msg::Code::PUT} x.x.x.x:$port) };
  (CON POST x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Con} {eft_msg::Code::POST} x.x.x.x:$port) };
  (CON DELETE x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Con} {eft_msg::Code::DELETE} x.x.x.x:$port) };
  (NON GET x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Non} {eft_msg::Code::GET} x.x.x.x:$port) };
  (NON PUT x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Non} {eft_msg::Code::PUT} x.x.x.x:$port) };
  (NON POST x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Non} {eft_msg::Code::POST} x.x.x.x:$port) };
  (NON DELETE x.x.x.x:$port:literal) => { $crate::test::msg!({eft_msg::Type::Non} {eft_msg::Code::DELETE} x.x.x.x:$port) };

  (CON {$c:literal . $d:literal} x.x.x.x:$port:literal) => {{
    $crate::test::msg!({eft_msg::Type::Con} {eft_msg::Code::new($c, $d)} x.x.x.x:$port)
  }};
  (NON {$c:literal . $d:literal} x.x.x.x:$port:literal) => {{
    $crate::test::msg!({eft_msg::Type::Non} {eft_msg::Code::new($c, $d)} x.x.x.x:$port)
  }};
  (ACK {$c:literal . $d:literal} x.x.x.x:$port:literal) => {{
    $crate::test::msg!({eft_msg::Type::Ack} {eft_msg::Code::new($c, $d)} x.x.x.x:$port)
  }};
  (ACK EMPTY x.x.x.x:$port:literal) => {{
    $crate::test::msg!({eft_msg::Type::Ack} {eft_msg::Code::EMPTY} x.x.x.x:$port)
  }};

  ({$ty:expr} {$code:expr} x.x.x.x:$port:literal) => {{
    use no_std_net::*;

    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), $port));

    $crate::net::Addrd($crate::test::Message::new($ty,
                                                  $code,
                                                  eft_msg::Id(0),
                                                  eft_msg::Token(Default::default())),
                       addr)
  }};
}

pub(crate) use msg;

pub type Platform = platform::Alloc<ClockMock, SockMock>;
pub type Message = platform::Message<Platform>;
pub type Req = crate::req::Req<Platform>;
pub type Resp = crate::resp::Resp<Platform>;
pub type Snapshot = platform::Snapshot<Platform>;
pub type Effect = platform::Effect<Platform>;

pub fn dummy_addr() -> SocketAddr {
  SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 8080))
}

pub fn dummy_addr_2() -> SocketAddr {
  SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 2), 8080))
}

/// A snapshot at `time_millis` containing `dgram` (if any)
pub fn snapshot(dgram: Option<Addrd<Vec<u8>>>, time_millis: u64) -> Snapshot {
  Snapshot { time: ClockMock::instant(time_millis * 1000),
             recvd_dgram: dgram,
             config: Default::default() }
}

/// A clock mock whose current instant is set by tests;
/// ticks are microseconds.
///
/// Cloning yields a handle to the same underlying time, so tests can
/// hand a clock to a [`Core`](crate::core::Core) and keep winding it.
#[derive(Debug, Clone, Default)]
pub struct ClockMock(pub Arc<Mutex<u64>>);

impl ClockMock {
  pub fn new() -> Self {
    Default::default()
  }

  /// Set the current time, in microseconds
  pub fn set(&self, to: u64) {
    *self.0.lock().unwrap() = to;
  }

  /// Set the current time, in milliseconds
  pub fn set_millis(&self, to: u64) {
    self.set(to * 1000);
  }

  pub fn instant(n: u64) -> Instant<Self> {
    Instant::new(n)
  }
}

impl embedded_time::Clock for ClockMock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    Ok(Instant::new(*self.0.lock().unwrap()))
  }
}

/// A mocked socket
#[derive(Debug, Default)]
pub struct SockMock {
  /// Inbound bytes from remote sockets. Address represents the sender
  pub rx: Arc<Mutex<Vec<Addrd<Vec<u8>>>>>,
  /// Outbound bytes to remote sockets. Address represents the destination
  pub tx: Arc<Mutex<Vec<Addrd<Vec<u8>>>>>,
}

impl SockMock {
  pub fn new() -> Self {
    Default::default()
  }
}

impl Socket for SockMock {
  type Error = Option<()>;
  type Dgram = Vec<u8>;

  fn local_addr(&self) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 5683))
  }

  fn empty_dgram() -> Vec<u8> {
    vec![0u8; crate::net::MAX_DATAGRAM_SIZE]
  }

  fn bind_raw<A: no_std_net::ToSocketAddrs>(_: A) -> Result<Self, Self::Error> {
    Ok(Self::new())
  }

  fn recv(&self, buf: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    let mut rx = self.rx.lock().unwrap();

    if rx.is_empty() {
      return Err(nb::Error::WouldBlock);
    }

    let dgram = rx.remove(0);

    dgram.data()
         .iter()
         .enumerate()
         .for_each(|(ix, byte)| buf[ix] = *byte);

    Ok(dgram.map(|bytes| bytes.len()))
  }

  fn peek(&self, buf: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    let rx = self.rx.lock().unwrap();

    match rx.first() {
      | None => Err(nb::Error::WouldBlock),
      | Some(dgram) => {
        dgram.data()
             .iter()
             .enumerate()
             .for_each(|(ix, byte)| buf[ix] = *byte);
        Ok(dgram.as_ref().map(|bytes| bytes.len()))
      },
    }
  }

  fn send(&self, buf: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    let mut tx = self.tx.lock().unwrap();
    tx.push(buf.map(Vec::from));
    Ok(())
  }

  fn join_multicast(&self, _: no_std_net::IpAddr) -> Result<(), Self::Error> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use eft_msg::TryIntoBytes;

  use super::*;

  #[test]
  fn sock_mock_roundtrip() {
    let sock = SockMock::new();
    let msg = msg!(CON GET x.x.x.x:1111);
    let bytes: Vec<u8> = msg.data().clone().try_into_bytes().unwrap();

    sock.rx.lock().unwrap().push(Addrd(bytes.clone(), msg.addr()));

    let polled = sock.poll().unwrap().unwrap();
    assert_eq!(polled, Addrd(bytes, msg.addr()));

    assert!(sock.poll().unwrap().is_none());
  }
}
