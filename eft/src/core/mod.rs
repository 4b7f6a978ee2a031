use eft_msg::{Code, CodeKind, Id, Token, TryIntoBytes, Type};
use embedded_time::Clock;
use no_std_net::SocketAddr;
use std_alloc::vec::Vec;

use crate::config::Config;
use crate::net::{Addrd, Socket};
use crate::platform::{self, Dgram, Effect, PlatformTypes, Snapshot};
use crate::req::Req;
use crate::resp::{code, Resp};
use crate::server::{Handler, Interceptor, Resources};
use crate::step::{self, Step};
use eft_common::Stem;

/// Errors that can occur while running the core
pub mod error;
pub use error::Error;

use crate::step::{ack, block, dedup, parse, provision_ids, reset, retry, Empty};
use embedded_time::duration::Milliseconds;

/// The canonical step chain driven by [`Core`]: parse, stamp ids,
/// police unsolicited traffic, ack separate responses, retransmit &
/// time out transactions, deduplicate requests, orchestrate block-wise
/// transfer.
pub type Runtime<P> =
  block::Block<P,
               dedup::alloc::Dedup<P,
                                   retry::alloc::Retry<P,
                                                       ack::Ack<reset::alloc::Reset<provision_ids::ProvisionIds<parse::Parse<Empty>>>>>>>;

/// Invoked exactly once per transaction started with
/// [`Core::send_req`] (or [`Core::ping`]): either with the response,
/// or with the reason there will never be one.
///
/// Requests sent to a multicast address are the exception: their
/// handler may see several `Ok` responses before the terminal
/// [`Error::Timeout`].
pub type ResponseHandler<P> = fn(Result<Addrd<Resp<P>>, Error<P>>);

struct Pending<P: PlatformTypes> {
  handler: ResponseHandler<P>,
  dest: SocketAddr,
}

impl<P: PlatformTypes> Clone for Pending<P> {
  fn clone(&self) -> Self {
    Self { handler: self.handler,
           dest: self.dest }
  }
}

impl<P: PlatformTypes> Copy for Pending<P> {}

/// A CoAP endpoint: client & server over one socket.
///
/// `Core` owns the clock, the socket, the step pipeline, the resource
/// table and the set of in-flight client transactions. It is driven
/// entirely by [`Core::tick`], which the host event loop should invoke
/// whenever a datagram arrives or a millisecond or so has passed;
/// handlers run to completion on the calling thread.
pub struct Core<P: PlatformTypes> {
  config: Stem<Config>,
  clock: P::Clock,
  socket: P::Socket,
  steps: Runtime<P>,
  resources: Stem<Resources<P>>,
  pending: Stem<Vec<(Token, Pending<P>)>>,
  token_counter: Stem<u64>,
}

impl<P: PlatformTypes> core::fmt::Debug for Core<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Core")
     .field("config", &self.config.map_ref(|c| *c))
     .field("pending", &self.pending.map_ref(|p| p.len()))
     .finish()
  }
}

impl<P: PlatformTypes> Core<P> {
  /// Create a new endpoint over an already-bound socket.
  pub fn new(clock: P::Clock, socket: P::Socket, config: Config) -> Self {
    Self { config: Stem::new(config),
           clock,
           socket,
           steps: Runtime::<P>::default(),
           resources: Default::default(),
           pending: Default::default(),
           token_counter: Stem::new(0) }
  }

  /// Copy the current runtime config
  pub fn config(&self) -> Config {
    self.config.map_ref(|c| *c)
  }

  /// Serve `handler` under `path`.
  pub fn add_resource(&self, path: &'static str, handler: Handler<P>) {
    self.resources.map_mut(|r| r.add(path, handler));
  }

  /// Stop serving `path`.
  pub fn remove_resource(&self, path: &'static str) {
    self.resources.map_mut(|r| {
                    r.remove(path);
                  });
  }

  /// Set the handler for requests matching no resource.
  ///
  /// Without one, unmatched unicast requests are answered
  /// `4.04 Not Found`.
  pub fn set_default_handler(&self, handler: Handler<P>) {
    self.resources.map_mut(|r| r.set_default_handler(handler));
  }

  /// Set the access-control hook run before dispatch.
  pub fn set_interceptor(&self, interceptor: Interceptor<P>) {
    self.resources.map_mut(|r| r.set_interceptor(interceptor));
  }

  /// Set the largest block size exponent used for block-wise
  /// transfers (clamped to 0..=6).
  pub fn set_max_block_size(&self, szx: u8) {
    self.config.map_mut(|c| c.max_block_szx = szx.min(6));
  }

  /// The largest block size exponent used for block-wise transfers.
  pub fn get_max_block_size(&self) -> u8 {
    self.config.map_ref(|c| c.max_block_szx)
  }

  fn snapshot(&self, dgram: Option<Addrd<Dgram<P>>>) -> Result<Snapshot<P>, Error<P>> {
    let time = self.clock.try_now().map_err(Error::Clock)?;
    Ok(Snapshot { time,
                  recvd_dgram: dgram,
                  config: self.config() })
  }

  fn next_token(&self) -> Token {
    let seed = self.config().token_seed as u64;
    let n = self.token_counter.map_mut(|c| {
                                *c += 1;
                                *c
                              });

    let raw = (seed as u64) << 48 | n;
    let bytes = raw.to_be_bytes();
    let zeroes = bytes.iter().take_while(|b| **b == 0).count();

    Token(bytes[zeroes..].iter().copied().collect())
  }

  /// Send a message through the outbound pipeline: ids are stamped,
  /// over-large bodies sliced, Confirmable messages stored for
  /// retransmission and piggybacked responses cached for
  /// deduplication.
  pub fn send_msg(&self, mut msg: Addrd<platform::Message<P>>) -> Result<(), Error<P>> {
    let snap = self.snapshot(None)?;
    let mut effects = P::Effects::default();

    self.steps
        .before_message_sent(&snap, &mut effects, &mut msg)
        .map_err(|e| Error::of_step_kind(step::Error::kind(&e)))?;

    let bytes = msg.data()
                   .clone()
                   .try_into_bytes::<Dgram<P>>()
                   .map_err(Error::ToBytes)?;

    nb::block!(self.socket.send(Addrd(bytes.as_ref(), msg.addr()))).map_err(Error::Socket)?;

    self.steps
        .on_message_sent(&snap, &mut effects, &msg)
        .map_err(|e| Error::of_step_kind(step::Error::kind(&e)))?;

    self.exec_effects(effects)
  }

  /// Send a request and register `handler` for its outcome.
  ///
  /// An empty token is replaced with a generated one; the token
  /// identifying the transaction is returned and may be passed to
  /// [`Core::abort`].
  ///
  /// On failure the transaction is released before the error is
  /// returned; the handler will never be invoked.
  pub fn send_req(&self,
                  mut msg: Addrd<platform::Message<P>>,
                  handler: ResponseHandler<P>)
                  -> Result<Token, Error<P>> {
    if msg.data().token.is_empty() && msg.data().code.kind() == CodeKind::Request {
      msg.as_mut().token = self.next_token();
    }

    let token = msg.data().token;
    let dest = msg.addr();

    self.pending
        .map_mut(|p| p.push((token, Pending { handler, dest })));

    match self.send_msg(msg) {
      | Ok(()) => Ok(token),
      | Err(e) => {
        self.pending.map_mut(|p| {
                      if let Some(ix) = p.iter().position(|(t, pend)| *t == token && pend.dest == dest) {
                        p.remove(ix);
                      }
                    });
        Err(e)
      },
    }
  }

  /// CoAP ping: send an Empty Confirmable message to check a peer's
  /// liveness.
  ///
  /// A live peer answers with a Reset, which (per the Reset semantics)
  /// finalizes the transaction with [`Error::Abort`]; for a ping,
  /// `Err(Abort)` *is* the pong. A dead peer yields
  /// [`Error::Timeout`].
  pub fn ping(&self, addr: SocketAddr, handler: ResponseHandler<P>) -> Result<(), Error<P>> {
    let msg = platform::Message::<P>::new(Type::Con,
                                          Code::EMPTY,
                                          Id(0),
                                          Token(Default::default()));

    self.pending
        .map_mut(|p| p.push((Token(Default::default()), Pending { handler, dest: addr })));

    match self.send_msg(Addrd(msg, addr)) {
      | Ok(()) => Ok(()),
      | Err(e) => {
        self.pending.map_mut(|p| {
                      if let Some(ix) =
                        p.iter()
                         .position(|(t, pend)| t.is_empty() && pend.dest == addr)
                      {
                        p.remove(ix);
                      }
                    });
        Err(e)
      },
    }
  }

  /// Abort the transaction identified by `token`, finalizing its
  /// handler with [`Error::Abort`] and dropping all state held for it.
  pub fn abort(&self, token: Token, addr: SocketAddr) {
    let entry = self.pending.map_mut(|p| {
                               p.iter()
                                .position(|(t, pend)| *t == token && pend.dest == addr)
                                .map(|ix| p.remove(ix).1)
                             });

    if let Some(pending) = entry {
      (pending.handler)(Err(Error::Abort));
    }

    self.steps.on_abort(Addrd(token, addr));
  }

  /// Abort every in-flight transaction addressed to `peer`, finalizing
  /// each handler with [`Error::Abort`].
  pub fn abort_peer(&self, peer: SocketAddr) {
    let entries = self.pending.map_mut(|p| {
                                 let mut aborted = Vec::new();
                                 let mut ix = 0;
                                 while ix < p.len() {
                                   if p[ix].1.dest == peer {
                                     aborted.push(p.remove(ix));
                                   } else {
                                     ix += 1;
                                   }
                                 }
                                 aborted
                               });

    for (token, pending) in entries.into_iter() {
      (pending.handler)(Err(Error::Abort));
      self.steps.on_abort(Addrd(token, peer));
    }
  }

  /// Clear all requests and responses: every in-flight transaction is
  /// finalized with [`Error::Abort`] and all protocol state
  /// (retransmission queues, dedup cache, block-wise sessions) is
  /// dropped. No callbacks fire after `stop` returns.
  pub fn stop(&mut self) {
    let entries = self.pending.map_mut(core::mem::take);

    for (_, pending) in entries.into_iter() {
      (pending.handler)(Err(Error::Abort));
    }

    self.steps = Runtime::<P>::default();
  }

  /// Drive one turn of the event loop: poll the socket, serve at most
  /// one inbound message, and run the timers of every in-flight
  /// transaction.
  pub fn tick(&self) -> Result<(), Error<P>> {
    let dgram = self.socket.poll().map_err(Error::Socket)?;

    match &dgram {
      | Some(d) if Self::looks_like_response(d.data().as_ref()) => {
        let token = Self::peek_token(d.data().as_ref());
        let addr = d.addr();
        let snap = self.snapshot(dgram.clone())?;
        self.deliver(snap, token, addr)?;
      },
      | _ => {
        let snap = self.snapshot(dgram.clone())?;
        self.serve(snap)?;
      },
    }

    self.sweep()
  }

  // Requests route through the server flow; everything else
  // (responses, acks, resets, pings, and garbage too short to have a
  // code) through the client flow.
  fn looks_like_response(bytes: &[u8]) -> bool {
    match bytes.get(1) {
      | Some(code) => (*code >> 5) != 0 || *code == 0,
      | None => false,
    }
  }

  fn peek_token(bytes: &[u8]) -> Token {
    let tkl = (bytes.first().copied().unwrap_or(0) & 0xF) as usize;

    match bytes.get(4..4 + tkl.min(8)) {
      | Some(bs) => Token(bs.iter().copied().collect()),
      | None => Token(Default::default()),
    }
  }

  fn serve(&self, snap: Snapshot<P>) -> Result<(), Error<P>> {
    let mut effects = P::Effects::default();

    match self.steps.poll_req(&snap, &mut effects) {
      | None | Some(Err(nb::Error::WouldBlock)) => (),
      | Some(Err(nb::Error::Other(e))) => match step::Error::kind(&e) {
        | step::ErrorKind::Parse => self.reset_malformed(&snap)?,
        | kind => log::warn!(target: "eft", "serving failed: {:?}", kind),
      },
      | Some(Ok(req)) => self.dispatch(req)?,
    }

    self.exec_effects(effects)
  }

  fn dispatch(&self, req: Addrd<Req<P>>) -> Result<(), Error<P>> {
    let interceptor = self.resources.map_ref(|r| r.interceptor());
    if let Some(intercept) = interceptor {
      if !intercept(&req) {
        return Ok(());
      }
    }

    log::debug!(target: "eft",
                "<- {}",
                crate::logging::msg_summary::<P>(req.data().msg()));

    // handlers are copied out of the table before they run, so they
    // are free to add & remove resources
    let handler = self.resources.map_ref(|r| r.lookup(req.data()));

    match handler {
      | Some(handler) => {
        if let Some(rep) = handler(&req) {
          self.send_msg(Addrd(rep, req.addr()))?;
        }

        Ok(())
      },
      | None if self.socket.local_addr().ip().is_multicast() => Ok(()),
      | None => match Resp::for_request(req.data()) {
        | Some(mut rep) => {
          rep.set_code(code::NOT_FOUND);
          self.send_msg(Addrd(rep.into(), req.addr()))
        },
        | None => Ok(()),
      },
    }
  }

  fn deliver(&self, snap: Snapshot<P>, token: Token, addr: SocketAddr) -> Result<(), Error<P>> {
    let mut effects = P::Effects::default();

    match self.steps.poll_resp(&snap, &mut effects, token, addr) {
      | None | Some(Err(nb::Error::WouldBlock)) => (),
      | Some(Err(nb::Error::Other(e))) => match step::Error::kind(&e) {
        | kind @ (step::ErrorKind::Timeout | step::ErrorKind::Abort) => {
          self.finalize(token, addr, Err(Error::of_step_kind(kind)))
        },
        | step::ErrorKind::Parse => self.reset_malformed(&snap)?,
        | kind => log::warn!(target: "eft", "response handling failed: {:?}", kind),
      },
      | Some(Ok(rep))
        if rep.data().msg().token == token
           && rep.data().msg().code.kind() == CodeKind::Response =>
      {
        self.finalize(token, addr, Ok(rep))
      },
      // empty acks & resets were consumed by the steps
      | Some(Ok(_)) => (),
    }

    self.exec_effects(effects)
  }

  fn finalize(&self, token: Token, addr: SocketAddr, result: Result<Addrd<Resp<P>>, Error<P>>) {
    let entry = self.pending.map_mut(|p| {
                               let found = p.iter().position(|(t, pend)| {
                                                      *t == token
                                                      && (pend.dest == addr
                                                          || pend.dest.ip().is_multicast())
                                                    });

                               match found {
                                 | None => None,
                                 // multicast transactions accept many responses and die
                                 // by their deadline only
                                 | Some(ix)
                                   if result.is_ok() && p[ix].1.dest.ip().is_multicast() =>
                                 {
                                   Some(p[ix].1)
                                 },
                                 | Some(ix) => Some(p.remove(ix).1),
                               }
                             });

    if let Some(pending) = entry {
      (pending.handler)(result);
    }
  }

  fn sweep(&self) -> Result<(), Error<P>> {
    let entries = self.pending.map_ref(|p| {
                                 p.iter()
                                  .map(|(token, pend)| (*token, pend.dest))
                                  .collect::<Vec<_>>()
                               });

    for (token, dest) in entries.into_iter() {
      let snap = self.snapshot(None)?;
      self.deliver(snap, token, dest)?;
    }

    Ok(())
  }

  // Unicast Confirmable garbage elicits a Reset echoing the (trusted
  // that far) message id; everything else is dropped silently.
  fn reset_malformed(&self, snap: &Snapshot<P>) -> Result<(), Error<P>> {
    if self.socket.local_addr().ip().is_multicast() {
      return Ok(());
    }

    let dgram = match snap.recvd_dgram.as_ref() {
      | Some(d) => d,
      | None => return Ok(()),
    };

    let bytes = dgram.data().as_ref();
    let confirmable = bytes.first().map(|b| (b >> 4) & 0b11 == 0).unwrap_or(false);

    if !confirmable || bytes.len() < 4 {
      return Ok(());
    }

    let id = Id(u16::from_be_bytes([bytes[2], bytes[3]]));
    let rst = platform::Message::<P>::reset(id);
    let out = rst.try_into_bytes::<Dgram<P>>().map_err(Error::ToBytes)?;

    nb::block!(self.socket.send(Addrd(out.as_ref(), dgram.addr()))).map_err(Error::Socket)
  }

  fn exec_effects(&self, effects: P::Effects) -> Result<(), Error<P>> {
    for effect in effects.into_iter() {
      match effect {
        | Effect::Send(msg) => self.send_msg(msg)?,
        | Effect::SendDgram(dgram) => {
          nb::block!(self.socket.send(dgram.as_ref().map(|d| d.as_ref()))).map_err(Error::Socket)?
        },
        | Effect::Log(level, msg) => log::log!(target: "eft", level, "{}", msg.as_str()),
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use ::std::sync::Mutex;

  use eft_msg::{MessageOptions, Payload, TryFromBytes, TryIntoBytes};

  use super::*;
  use crate::config::AckRandomFactor;
  use crate::test::{self, ClockMock, SockMock};
  use crate::time::Millis;

  type Rx = ::std::sync::Arc<Mutex<Vec<Addrd<Vec<u8>>>>>;

  fn harness(config: Config) -> (Core<test::Platform>, ClockMock, Rx, Rx) {
    let clock = ClockMock::new();
    let sock = SockMock::new();
    let (rx, tx) = (sock.rx.clone(), sock.tx.clone());

    (Core::new(clock.clone(), sock, config), clock, rx, tx)
  }

  fn push_rx(rx: &Rx, msg: Addrd<test::Message>) {
    rx.lock()
      .unwrap()
      .push(msg.map(|m| m.try_into_bytes().unwrap()));
  }

  fn drain_tx(tx: &Rx) -> Vec<Addrd<test::Message>> {
    tx.lock()
      .unwrap()
      .drain(..)
      .map(|Addrd(bytes, addr)| Addrd(test::Message::try_from_bytes(bytes).unwrap(), addr))
      .collect()
  }

  fn drain_tx_raw(tx: &Rx) -> Vec<Addrd<Vec<u8>>> {
    tx.lock().unwrap().drain(..).collect()
  }

  fn hello(req: &Addrd<Req<test::Platform>>) -> Option<platform::Message<test::Platform>> {
    let mut rep = Resp::for_request(req.data()).unwrap();
    rep.set_payload("hello".bytes());
    Some(rep.into())
  }

  fn get_test(id: u16, token: u8) -> Addrd<test::Message> {
    test::msg!(CON GET x.x.x.x:1111).map(|mut m| {
                                      m.id = Id(id);
                                      m.token =
                                        Token(tinyvec::array_vec!([u8; 8] => token));
                                      m.set_path("test").unwrap();
                                      m
                                    })
  }

  #[test]
  fn get_round_trip() {
    let (core, _, rx, tx) = harness(Config::default());
    core.add_resource("test", hello);

    push_rx(&rx, get_test(0x1234, 0xAB));
    core.tick().unwrap();

    let out = drain_tx(&tx);
    assert_eq!(out.len(), 1);

    let rep = out[0].data();
    assert_eq!(rep.ty, Type::Ack);
    assert_eq!(rep.code, Code::new(2, 5));
    assert_eq!(rep.id, Id(0x1234));
    assert_eq!(rep.token, Token(tinyvec::array_vec!([u8; 8] => 0xAB)));
    assert_eq!(&rep.payload.0, b"hello");
  }

  #[test]
  fn duplicate_con_request_is_answered_byte_identically() {
    static CALLS: Mutex<usize> = Mutex::new(0);

    fn counting(req: &Addrd<Req<test::Platform>>) -> Option<platform::Message<test::Platform>> {
      *CALLS.lock().unwrap() += 1;

      let mut rep = Resp::for_request(req.data()).unwrap();
      rep.set_payload("hi".bytes());
      Some(rep.into())
    }

    let (core, _, rx, tx) = harness(Config::default());
    core.add_resource("test", counting);

    push_rx(&rx, get_test(0x1234, 0xAB));
    core.tick().unwrap();
    let first = drain_tx_raw(&tx);

    push_rx(&rx, get_test(0x1234, 0xAB));
    core.tick().unwrap();
    let second = drain_tx_raw(&tx);

    assert_eq!(*CALLS.lock().unwrap(), 1);
    assert_eq!(first, second);
  }

  #[test]
  fn unmatched_unicast_request_is_404() {
    let (core, _, rx, tx) = harness(Config::default());

    let req = test::msg!(NON GET x.x.x.x:1111).map(|mut m| {
                                                m.id = Id(2);
                                                m.token =
                                                  Token(tinyvec::array_vec!([u8; 8] => 7));
                                                m.set_path("no").unwrap();
                                                m
                                              });
    push_rx(&rx, req);
    core.tick().unwrap();

    let out = drain_tx(&tx);
    assert_eq!(out.len(), 1);

    let rep = out[0].data();
    assert_eq!(rep.ty, Type::Non);
    assert_eq!(rep.code, code::NOT_FOUND);
    assert_ne!(rep.id, Id(0));
    assert_eq!(rep.token, Token(tinyvec::array_vec!([u8; 8] => 7)));
  }

  #[test]
  fn malformed_unicast_con_is_reset() {
    let (core, _, rx, tx) = harness(Config::default());

    // token length 9 is illegal; header is otherwise CON 2.05 id 0x1234
    rx.lock()
      .unwrap()
      .push(Addrd(vec![0b0100_1001, 0x45, 0x12, 0x34, 0, 0, 0, 0, 0, 0, 0, 0, 0],
                  test::dummy_addr()));

    core.tick().unwrap();

    let out = drain_tx(&tx);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].data().ty, Type::Reset);
    assert_eq!(out[0].data().id, Id(0x1234));
    assert!(out[0].data().token.is_empty());
  }

  #[test]
  fn con_request_times_out_after_retransmissions() {
    static OUTCOMES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    fn on_resp(result: Result<Addrd<Resp<test::Platform>>, Error<test::Platform>>) {
      OUTCOMES.lock()
              .unwrap()
              .push(match result {
                      | Ok(_) => "ok",
                      | Err(Error::Timeout) => "timeout",
                      | Err(_) => "other",
                    });
    }

    let config = Config { ack_timeout: Milliseconds(100),
                          ack_random_factor: AckRandomFactor { numerator: 1,
                                                               denominator: 1 },
                          max_retransmit: 2,
                          ..Default::default() };
    let (core, clock, _, tx) = harness(config);

    let req = Req::<test::Platform>::get("missing");
    core.send_req(Addrd(req.into(), test::dummy_addr()), on_resp)
        .unwrap();

    assert_eq!(drain_tx(&tx).len(), 1);

    // first retransmission
    clock.set_millis(100);
    core.tick().unwrap();
    assert_eq!(drain_tx(&tx).len(), 1);

    // second retransmission
    clock.set_millis(300);
    core.tick().unwrap();
    assert_eq!(drain_tx(&tx).len(), 1);

    // budget spent
    clock.set_millis(700);
    core.tick().unwrap();
    assert_eq!(&*OUTCOMES.lock().unwrap(), &vec!["timeout"]);

    // terminal callback fires exactly once
    clock.set_millis(1_000);
    core.tick().unwrap();
    core.tick().unwrap();
    assert_eq!(&*OUTCOMES.lock().unwrap(), &vec!["timeout"]);
  }

  #[test]
  fn response_finalizes_transaction() {
    static OUTCOMES: Mutex<Vec<Option<Vec<u8>>>> = Mutex::new(Vec::new());

    fn on_resp(result: Result<Addrd<Resp<test::Platform>>, Error<test::Platform>>) {
      OUTCOMES.lock()
              .unwrap()
              .push(result.ok()
                          .map(|rep| rep.data().payload().copied().collect()));
    }

    let (core, _, rx, tx) = harness(Config::default());

    let req = Req::<test::Platform>::get("test");
    let token = core.send_req(Addrd(req.into(), test::dummy_addr()), on_resp)
                    .unwrap();

    let sent = drain_tx(&tx).remove(0);
    assert_eq!(sent.data().token, token);
    assert_ne!(sent.data().id, Id(0));

    // the peer answers with a piggybacked response
    let rep = test::msg!({Type::Ack} {Code::new(2, 5)} x.x.x.x:1111).map(|mut m| {
                                                                      m.id = sent.data().id;
                                                                      m.token = token;
                                                                      m.payload =
                                                                        Payload(b"quux".to_vec());
                                                                      m
                                                                    });
    push_rx(&rx, rep);
    core.tick().unwrap();

    assert_eq!(&*OUTCOMES.lock().unwrap(),
               &vec![Some(b"quux".to_vec())]);

    // no RST was sent back; the response was solicited
    assert!(drain_tx(&tx).is_empty());
  }

  #[test]
  fn ping_pong_aborts_with_reset() {
    static OUTCOMES: Mutex<Vec<&'static str>> = Mutex::new(Vec::new());

    fn on_pong(result: Result<Addrd<Resp<test::Platform>>, Error<test::Platform>>) {
      OUTCOMES.lock()
              .unwrap()
              .push(match result {
                      | Err(Error::Abort) => "pong",
                      | _ => "other",
                    });
    }

    let (core, _, rx, tx) = harness(Config::default());

    core.ping(test::dummy_addr(), on_pong).unwrap();

    let sent = drain_tx(&tx).remove(0);
    assert_eq!(sent.data().code, Code::EMPTY);
    assert_eq!(sent.data().ty, Type::Con);

    push_rx(&rx,
            Addrd(test::Message::reset(sent.data().id), test::dummy_addr()));
    core.tick().unwrap();

    assert_eq!(&*OUTCOMES.lock().unwrap(), &vec!["pong"]);
  }

  #[test]
  fn fragmented_request_is_reassembled_before_dispatch() {
    static BODIES: Mutex<Vec<usize>> = Mutex::new(Vec::new());

    fn big(req: &Addrd<Req<test::Platform>>) -> Option<platform::Message<test::Platform>> {
      BODIES.lock().unwrap().push(req.data().payload().len());

      let mut rep = Resp::for_request(req.data()).unwrap();
      rep.set_code(code::CHANGED);
      Some(rep.into())
    }

    let (core, _, rx, tx) = harness(Config::default());
    core.add_resource("big", big);

    let body = (0..40).collect::<Vec<u8>>();
    for (num, chunk) in body.chunks(16).enumerate() {
      let msg = test::msg!(CON POST x.x.x.x:1111).map(|mut m| {
                                                   m.id = Id(num as u16 + 1);
                                                   m.token =
                                                     Token(tinyvec::array_vec!([u8; 8] => 3));
                                                   m.set_path("big").unwrap();
                                                   m.set_block1(16, num as u32, num < 2).unwrap();
                                                   m.payload = Payload(chunk.to_vec());
                                                   m
                                                 });
      push_rx(&rx, msg);
      core.tick().unwrap();
    }

    assert_eq!(&*BODIES.lock().unwrap(), &vec![40]);

    let out = drain_tx(&tx);
    assert_eq!(out.len(), 3);
    assert_eq!(out[0].data().code, code::CONTINUE);
    assert_eq!(out[1].data().code, code::CONTINUE);
    assert_eq!(out[2].data().code, code::CHANGED);
  }
}
