use eft_common::{AppendCopy, Array, GetSize, Stem};
use eft_msg::{CodeKind, Id, MessageOptions, Payload, Token, Type};
use eft_msg::no_repeat::{BLOCK1, BLOCK2};
use embedded_time::duration::Milliseconds;
use embedded_time::Instant;
use no_std_net::SocketAddr;

use super::{Step, StepOutput, _try};
use crate::net::Addrd;
use crate::platform::{self, Effect, PlatformTypes, Snapshot};
use crate::req::Req;
use crate::resp::code::{CONTINUE,
                        NOT_FOUND,
                        REQUEST_ENTITY_INCOMPLETE,
                        REQUEST_ENTITY_TOO_LARGE,
                        SERVICE_UNAVAILABLE};
use crate::resp::Resp;

/// Hard ceiling on the size of a reassembled request body.
///
/// A transfer that would exceed it is rejected with
/// `4.13 Request Entity Too Large`.
pub const MAX_ASSEMBLED_BODY: usize = 4096;

fn block_size(szx: u8) -> usize {
  1usize << (szx.min(6) + 4)
}

fn slice_of<A>(body: &A, offset: usize, size: usize) -> A
  where A: Array<Item = u8> + AppendCopy<u8>
{
  let end = (offset + size).min(body.get_size());
  let mut out = A::reserve(end - offset);
  out.append_copy(&body[offset..end]);
  out
}

/// An in-flight **outbound** block-wise exchange.
///
/// At most one may be active at a time; starting a second fails with
/// [`Error::Busy`].
#[derive(Debug)]
enum SendState<P: PlatformTypes> {
  /// Client-side Block1: we are pushing a fragmented request body.
  PushingRequest {
    /// The first fragment as it went on the wire; continuations clone
    /// its options & token
    original: Addrd<platform::Message<P>>,
    /// The complete request body
    body: P::MessagePayload,
    /// How many bytes of `body` have been sent so far
    offset: usize,
    /// The block number of the most recent fragment
    num: u32,
    /// Current block size exponent (may shrink if the server
    /// renegotiates)
    szx: u8,
    /// When this exchange is forgotten
    expires_at: Instant<P::Clock>,
  },
  /// Server-side Block2: we are serving a fragmented response body.
  ServingResponse {
    /// The complete response, options and all
    response: Addrd<platform::Message<P>>,
    /// Negotiated block size exponent
    szx: u8,
    /// When this exchange is forgotten
    expires_at: Instant<P::Clock>,
  },
}

/// An in-flight **inbound** block-wise exchange.
///
/// At most one may be active at a time; a competing exchange is
/// rejected on the wire.
#[derive(Debug)]
enum RecvState<P: PlatformTypes> {
  /// Server-side Block1: we are reassembling a fragmented request.
  AssemblingRequest {
    /// Whose fragments we accept
    peer: SocketAddr,
    /// Body assembled so far
    buf: P::MessagePayload,
    /// The only block number we will accept next
    expect_num: u32,
    /// Negotiated (echoed) block size exponent
    szx: u8,
    /// When this exchange is forgotten
    expires_at: Instant<P::Clock>,
  },
  /// Client-side Block2: we are reassembling a fragmented response.
  AssemblingResponse {
    /// The request that elicited the response; mirrored (sans payload)
    /// to ask for further blocks
    original: Addrd<platform::Message<P>>,
    /// Body assembled so far
    buf: P::MessagePayload,
    /// The last block number received
    num: u32,
    /// Block size exponent the server chose
    szx: u8,
    /// When this exchange is forgotten
    expires_at: Instant<P::Clock>,
  },
}

/// Step orchestrating block-wise transfer (RFC7959).
///
/// - outbound request bodies larger than the configured block size are
///   fragmented (`Block1`), with continuations driven by
///   `2.31 Continue` acknowledgements and size renegotiation honored;
/// - inbound fragmented requests are reassembled, answering each
///   non-final fragment with `2.31 Continue`, out-of-order fragments
///   with `4.08` and over-large bodies with `4.13`;
/// - outbound response bodies larger than the negotiated block size
///   are stored and served slice-by-slice (`Block2`), `4.04` past the
///   end;
/// - inbound fragmented responses are reassembled by mirroring the
///   original request with increasing block numbers.
///
/// Only one exchange may be in flight per direction; RFC7959 makes
/// this legal and it bounds memory to two bodies.
#[derive(Debug)]
pub struct Block<P: PlatformTypes, S> {
  inner: S,
  tx: Stem<Option<SendState<P>>>,
  rx: Stem<Option<RecvState<P>>>,
  last_request: Stem<Option<Addrd<platform::Message<P>>>>,
  peer_szx: Stem<Option<(SocketAddr, u8)>>,
}

impl<P: PlatformTypes, S: Default> Default for Block<P, S> {
  fn default() -> Self {
    Self { inner: S::default(),
           tx: Default::default(),
           rx: Default::default(),
           last_request: Default::default(),
           peer_szx: Default::default() }
  }
}

/// Errors that can be encountered orchestrating block-wise transfers
#[derive(Clone, Copy, PartialEq)]
pub enum Error<E> {
  /// The inner step failed.
  ///
  /// This variant's Debug representation is completely
  /// replaced by the inner type E's debug representation
  Inner(E),
  /// A block-wise exchange is already in flight in this direction
  Busy,
  /// A block option could not be encoded
  InvalidBlock(eft_msg::SetError),
}

impl<E> From<E> for Error<E> {
  fn from(e: E) -> Self {
    Error::Inner(e)
  }
}

impl<E: core::fmt::Debug> core::fmt::Debug for Error<E> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::Busy => f.debug_struct("Busy").finish(),
      | Self::InvalidBlock(e) => f.debug_tuple("InvalidBlock").field(e).finish(),
      | Self::Inner(e) => e.fmt(f),
    }
  }
}

impl<E: super::Error> super::Error for Error<E> {
  fn kind(&self) -> super::ErrorKind {
    match self {
      | Self::Busy => super::ErrorKind::Busy,
      | Self::InvalidBlock(_) => super::ErrorKind::Other,
      | Self::Inner(e) => e.kind(),
    }
  }
}

enum ReqOutcome<P: PlatformTypes> {
  Yield,
  YieldAssembled(P::MessagePayload),
  Continue { num: u32, szx: u8 },
  Slice(platform::Message<P>),
  Reject408,
  Reject413,
  Reject404,
  OtherExchangeActive,
  PassWithHint(u8),
}

enum RespOutcome<P: PlatformTypes> {
  Yield,
  YieldAssembled(P::MessagePayload),
  SendNext(platform::Message<P>),
}

impl<P: PlatformTypes, S> Block<P, S> {
  fn prune(&self, now: Instant<P::Clock>) {
    self.tx.map_mut(|tx| {
             let expired = match tx {
               | Some(SendState::PushingRequest { expires_at, .. })
               | Some(SendState::ServingResponse { expires_at, .. }) => now >= *expires_at,
               | None => false,
             };

             if expired {
               *tx = None;
             }
           });

    self.rx.map_mut(|rx| {
             let expired = match rx {
               | Some(RecvState::AssemblingRequest { expires_at, .. })
               | Some(RecvState::AssemblingResponse { expires_at, .. }) => now >= *expires_at,
               | None => false,
             };

             if expired {
               *rx = None;
             }
           });
  }

  fn expiry(&self, snap: &Snapshot<P>) -> Instant<P::Clock> {
    snap.time + Milliseconds(snap.config.exchange_lifetime_millis())
  }

  fn teardown_client_states(&self) {
    self.tx.map_mut(|tx| {
             if matches!(tx, Some(SendState::PushingRequest { .. })) {
               *tx = None;
             }
           });
    self.rx.map_mut(|rx| {
             if matches!(rx, Some(RecvState::AssemblingResponse { .. })) {
               *rx = None;
             }
           });
  }
}

impl<P, S, E> Step<P> for Block<P, S>
  where P: PlatformTypes,
        E: super::Error,
        S: Step<P, PollReq = Addrd<Req<P>>, PollResp = Addrd<Resp<P>>, Error = E>
{
  type PollReq = Addrd<Req<P>>;
  type PollResp = Addrd<Resp<P>>;
  type Error = Error<E>;
  type Inner = S;

  fn inner(&self) -> &S {
    &self.inner
  }

  fn poll_req(&self,
              snap: &Snapshot<P>,
              effects: &mut P::Effects)
              -> StepOutput<Self::PollReq, Self::Error> {
    self.prune(snap.time);

    let mut req = _try!(Option<nb::Result>; self.inner.poll_req(snap, effects));

    macro_rules! respond {
      ($code:expr, $block1:expr) => {{
        let msg = req.data().msg();
        let (ty, id) = match msg.ty {
          | Type::Con => (Type::Ack, msg.id),
          | _ => (Type::Non, Id(0)),
        };

        let mut rep = platform::Message::<P>::new(ty, $code, id, msg.token);
        let block1: Option<(u16, u32, bool)> = $block1;
        if let Some((size, num, more)) = block1 {
          rep.set_block1(size, num, more).ok();
        }

        effects.push(Effect::Send(Addrd(rep, req.addr())));
      }};
    }

    let outcome: ReqOutcome<P> = if let Some(b1) = req.data().msg().block1() {
      let szx_cap = snap.config.max_block_szx;
      let expires_at = self.expiry(snap);

      self.rx.map_mut(|rx| {
               // a zero-numbered block always restarts assembly for
               // its sender
               let state = match rx.take() {
                 | Some(RecvState::AssemblingRequest { peer, .. })
                   if peer == req.addr() && b1.num() == 0 =>
                 {
                   None
                 },
                 | s => s,
               };

               match state {
                 | None if b1.num() == 0 && !b1.more() => ReqOutcome::Yield,
                 | None if b1.num() == 0 => {
                   let szx = b1.szx().min(szx_cap);
                   let expect_num = if szx < b1.szx() {
                     (1u32 << (b1.szx() - szx)) - 1
                   } else {
                     1
                   };

                   let mut buf = P::MessagePayload::default();
                   buf.append_copy(&req.data().msg().payload.0);

                   *rx = Some(RecvState::AssemblingRequest { peer: req.addr(),
                                                             buf,
                                                             expect_num,
                                                             szx,
                                                             expires_at });

                   ReqOutcome::Continue { num: 0, szx }
                 },
                 | None => ReqOutcome::Reject408,
                 | Some(RecvState::AssemblingRequest { peer,
                                                       mut buf,
                                                       expect_num,
                                                       szx,
                                                       expires_at, })
                   if peer == req.addr() =>
                 {
                   let payload = &req.data().msg().payload.0;

                   if b1.num() != expect_num || b1.szx() != szx {
                     ReqOutcome::Reject408
                   } else if buf.get_size() + payload.get_size() > MAX_ASSEMBLED_BODY
                             || buf.is_full()
                   {
                     ReqOutcome::Reject413
                   } else {
                     buf.append_copy(payload);

                     if b1.more() {
                       *rx = Some(RecvState::AssemblingRequest { peer,
                                                                 buf,
                                                                 expect_num: b1.num() + 1,
                                                                 szx,
                                                                 expires_at });
                       ReqOutcome::Continue { num: b1.num(), szx }
                     } else {
                       ReqOutcome::YieldAssembled(buf)
                     }
                   }
                 },
                 | Some(other) => {
                   *rx = Some(other);
                   ReqOutcome::OtherExchangeActive
                 },
               }
             })
    } else if let Some(b2) = req.data().msg().block2() {
      self.tx.map_mut(|tx| match tx.take() {
               | Some(SendState::ServingResponse { response, szx, expires_at })
                 if response.addr() == req.addr() =>
               {
                 let size = block_size(szx);
                 let offset = b2.num() as usize * size;
                 let len = response.data().payload.0.get_size();

                 if offset >= len {
                   *tx = Some(SendState::ServingResponse { response,
                                                           szx,
                                                           expires_at });
                   ReqOutcome::Reject404
                 } else {
                   let end = (offset + size).min(len);
                   let more = end < len;

                   let mut rep = response.data().clone();
                   let (ty, id) = match req.data().msg().ty {
                     | Type::Con => (Type::Ack, req.data().msg().id),
                     | _ => (Type::Non, Id(0)),
                   };
                   rep.ty = ty;
                   rep.id = id;
                   rep.token = req.data().msg().token;
                   rep.payload = Payload(slice_of(&response.data().payload.0, offset, size));
                   rep.set_block2(size as u16, b2.num(), more).ok();

                   if more {
                     *tx = Some(SendState::ServingResponse { response,
                                                             szx,
                                                             expires_at });
                   }

                   ReqOutcome::Slice(rep)
                 }
               },
               | Some(other) => {
                 *tx = Some(other);
                 if b2.num() == 0 {
                   ReqOutcome::PassWithHint(b2.szx())
                 } else {
                   ReqOutcome::Reject404
                 }
               },
               | None if b2.num() == 0 => ReqOutcome::PassWithHint(b2.szx()),
               | None => ReqOutcome::Reject404,
             })
    } else {
      // a blockless request from a peer mid-assembly abandons the
      // partial body
      let stale = self.rx.map_mut(|rx| match rx.take() {
                           | Some(RecvState::AssemblingRequest { peer, .. })
                             if peer == req.addr() =>
                           {
                             true
                           },
                           | s => {
                             *rx = s;
                             false
                           },
                         });

      if stale {
        respond!(REQUEST_ENTITY_INCOMPLETE, None);
      }

      ReqOutcome::Yield
    };

    match outcome {
      | ReqOutcome::Yield => Some(Ok(req)),
      | ReqOutcome::YieldAssembled(buf) => {
        req.as_mut().msg_mut().payload = Payload(buf);
        req.as_mut().msg_mut().remove(BLOCK1);
        Some(Ok(req))
      },
      | ReqOutcome::Continue { num, szx } => {
        respond!(CONTINUE, Some((block_size(szx) as u16, num, true)));
        Some(Err(nb::Error::WouldBlock))
      },
      | ReqOutcome::Slice(rep) => {
        effects.push(Effect::Send(Addrd(rep, req.addr())));
        Some(Err(nb::Error::WouldBlock))
      },
      | ReqOutcome::Reject408 => {
        respond!(REQUEST_ENTITY_INCOMPLETE, None);
        Some(Err(nb::Error::WouldBlock))
      },
      | ReqOutcome::Reject413 => {
        respond!(REQUEST_ENTITY_TOO_LARGE, None);
        Some(Err(nb::Error::WouldBlock))
      },
      | ReqOutcome::Reject404 => {
        respond!(NOT_FOUND, None);
        Some(Err(nb::Error::WouldBlock))
      },
      | ReqOutcome::OtherExchangeActive => {
        respond!(SERVICE_UNAVAILABLE, None);
        Some(Err(nb::Error::WouldBlock))
      },
      | ReqOutcome::PassWithHint(szx) => {
        self.peer_szx
            .map_mut(|h| *h = Some((req.addr(), szx.min(snap.config.max_block_szx))));
        Some(Ok(req))
      },
    }
  }

  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: Token,
               addr: SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error> {
    self.prune(snap.time);

    let mut rep = _try!(Option<nb::Result>; self.inner.poll_resp(snap, effects, token, addr));

    if rep.data().msg().ty == Type::Reset {
      self.teardown_client_states();
      return Some(Ok(rep));
    }

    let rep_token = rep.data().msg().token;
    let expires_at = self.expiry(snap);

    let outcome: RespOutcome<P> = if let Some(b2) = rep.data().msg().block2() {
      self.rx.map_mut(|rx| match rx.take() {
               | None if b2.num() == 0 && b2.more() => {
                 let original = self.last_request.map_mut(Option::take);

                 match original {
                   | Some(original) if original.data().token == rep_token => {
                     let mut buf = P::MessagePayload::default();
                     buf.append_copy(&rep.data().msg().payload.0);

                     let mut next = original.data().clone();
                     next.id = Id(0);
                     next.payload = Payload(Default::default());
                     next.set_block2(b2.size(), 1, false).ok();

                     *rx = Some(RecvState::AssemblingResponse { original,
                                                                buf,
                                                                num: 0,
                                                                szx: b2.szx(),
                                                                expires_at });

                     RespOutcome::SendNext(next)
                   },
                   | original => {
                     self.last_request.map_mut(|l| *l = original.clone());
                     RespOutcome::Yield
                   },
                 }
               },
               | None => RespOutcome::Yield,
               | Some(RecvState::AssemblingResponse { original,
                                                      mut buf,
                                                      num,
                                                      szx,
                                                      expires_at, })
                 if original.data().token == rep_token =>
               {
                 if b2.num() != num + 1 || b2.szx() != szx {
                   // broken sequence; give up on reassembly
                   RespOutcome::Yield
                 } else {
                   buf.append_copy(&rep.data().msg().payload.0);

                   if b2.more() {
                     let mut next = original.data().clone();
                     next.id = Id(0);
                     next.payload = Payload(Default::default());
                     next.set_block2(b2.size(), b2.num() + 1, false).ok();

                     *rx = Some(RecvState::AssemblingResponse { original,
                                                                buf,
                                                                num: b2.num(),
                                                                szx,
                                                                expires_at });

                     RespOutcome::SendNext(next)
                   } else {
                     RespOutcome::YieldAssembled(buf)
                   }
                 }
               },
               | Some(other) => {
                 *rx = Some(other);
                 RespOutcome::Yield
               },
             })
    } else if let Some(b1) = rep.data().msg().block1() {
      let rep_code = rep.data().msg().code;

      self.tx.map_mut(|tx| match tx.take() {
               | Some(SendState::PushingRequest { original,
                                                  body,
                                                  offset,
                                                  num: _,
                                                  szx,
                                                  expires_at, })
                 if original.data().token == rep_token =>
               {
                 if rep_code != CONTINUE {
                   // the final outcome arrived; nothing left to push
                   RespOutcome::Yield
                 } else {
                   let (next_num, next_szx) = if b1.szx() < szx {
                     ((1u32 << (szx - b1.szx())) - 1 + b1.num(), b1.szx())
                   } else {
                     (b1.num() + 1, szx)
                   };

                   let size = block_size(next_szx);
                   let end = (offset + size).min(body.get_size());
                   let more = end < body.get_size();

                   let mut next = original.data().clone();
                   next.id = Id(0);
                   next.payload = Payload(slice_of(&body, offset, size));
                   next.set_block1(size as u16, next_num, more).ok();

                   *tx = Some(SendState::PushingRequest { original,
                                                          body,
                                                          offset: end,
                                                          num: next_num,
                                                          szx: next_szx,
                                                          expires_at });

                   RespOutcome::SendNext(next)
                 }
               },
               | other => {
                 *tx = other;
                 RespOutcome::Yield
               },
             })
    } else {
      // a blockless response finalizes any outbound push with this
      // token
      self.tx.map_mut(|tx| match tx.take() {
               | Some(SendState::PushingRequest { original, .. })
                 if original.data().token == rep_token =>
               {
                 ()
               },
               | s => *tx = s,
             });

      RespOutcome::Yield
    };

    match outcome {
      | RespOutcome::Yield => Some(Ok(rep)),
      | RespOutcome::YieldAssembled(buf) => {
        rep.as_mut().msg_mut().payload = Payload(buf);
        rep.as_mut().msg_mut().remove(BLOCK2);
        Some(Ok(rep))
      },
      | RespOutcome::SendNext(next) => {
        effects.push(Effect::Send(Addrd(next, rep.addr())));
        Some(Err(nb::Error::WouldBlock))
      },
    }
  }

  fn before_message_sent(&self,
                         snap: &Snapshot<P>,
                         effects: &mut P::Effects,
                         msg: &mut Addrd<platform::Message<P>>)
                         -> Result<(), Self::Error> {
    self.inner
        .before_message_sent(snap, effects, msg)
        .map_err(Error::Inner)?;

    self.prune(snap.time);

    let len = msg.data().payload.0.get_size();
    let has_block = msg.data().block1().is_some() || msg.data().block2().is_some();
    let expires_at = self.expiry(snap);

    match msg.data().code.kind() {
      | CodeKind::Request if !has_block => {
        let szx = snap.config.max_block_szx.min(6);
        let size = block_size(szx);

        if len > size {
          if self.tx.map_ref(|tx| tx.is_some()) {
            return Err(Error::Busy);
          }

          let body = core::mem::replace(&mut msg.as_mut().payload, Payload(Default::default())).0;
          msg.as_mut().payload = Payload(slice_of(&body, 0, size));
          msg.as_mut()
             .set_block1(size as u16, 0, true)
             .map_err(Error::InvalidBlock)?;
          msg.as_mut().set_size1(len as u32).ok();

          let mut state = Some(SendState::PushingRequest { original: msg.clone(),
                                                           body,
                                                           offset: size,
                                                           num: 0,
                                                           szx,
                                                           expires_at });
          self.tx.map_mut(|tx| *tx = Option::take(&mut state));
        }
      },
      | CodeKind::Response if !has_block => {
        let hint = self.peer_szx.map_ref(|h| {
                                  h.and_then(|(a, szx)| if a == msg.addr() {
                                               Some(szx)
                                             } else {
                                               None
                                             })
                                });
        let szx = hint.unwrap_or(snap.config.max_block_szx)
                      .min(snap.config.max_block_szx)
                      .min(6);
        let size = block_size(szx);

        if len > size {
          if self.tx.map_ref(|tx| tx.is_some()) {
            return Err(Error::Busy);
          }

          let full = msg.clone();
          msg.as_mut().payload = Payload(slice_of(&full.data().payload.0, 0, size));
          msg.as_mut()
             .set_block2(size as u16, 0, true)
             .map_err(Error::InvalidBlock)?;
          msg.as_mut().set_size2(len as u32).ok();

          let mut state = Some(SendState::ServingResponse { response: full,
                                                            szx,
                                                            expires_at });
          self.tx.map_mut(|tx| *tx = Option::take(&mut state));
        }
      },
      | _ => (),
    }

    Ok(())
  }

  fn on_message_sent(&self,
                     snap: &Snapshot<P>,
                     effects: &mut P::Effects,
                     msg: &Addrd<platform::Message<P>>)
                     -> Result<(), Self::Error> {
    self.inner
        .on_message_sent(snap, effects, msg)
        .map_err(Error::Inner)?;

    if msg.data().code.kind() == CodeKind::Request && msg.data().block1().is_none() {
      self.last_request.map_mut(|l| *l = Some(msg.clone()));
    }

    Ok(())
  }

  fn on_abort(&self, token: Addrd<Token>) {
    self.tx.map_mut(|tx| {
             let matches = match tx {
               | Some(SendState::PushingRequest { original, .. }) => {
                 original.data().token == *token.data()
               },
               | Some(SendState::ServingResponse { response, .. }) => {
                 response.data().token == *token.data()
               },
               | None => false,
             };

             if matches {
               *tx = None;
             }
           });

    self.rx.map_mut(|rx| {
             let matches = match rx {
               | Some(RecvState::AssemblingResponse { original, .. }) => {
                 original.data().token == *token.data()
               },
               | _ => false,
             };

             if matches {
               *rx = None;
             }
           });

    self.inner.on_abort(token);
  }
}

#[cfg(test)]
mod tests {
  use eft_msg::{Code, TryIntoBytes};

  use super::*;
  use crate::step::parse::Parse;
  use crate::step::Empty;
  use crate::test::{self, ClockMock};

  type Harness = Block<test::Platform, Parse<Empty>>;

  fn snap_with(dgram: Option<Addrd<Vec<u8>>>) -> Snapshot<test::Platform> {
    Snapshot { time: ClockMock::instant(0),
               recvd_dgram: dgram,
               config: Default::default() }
  }

  fn block1_request(num: u32, more: bool, size: u16, payload: &[u8], id: u16) -> Addrd<Vec<u8>> {
    let mut msg = test::msg!(CON POST x.x.x.x:1111).unwrap();
    msg.id = Id(id);
    msg.token = Token(tinyvec::array_vec!([u8; 8] => 1));
    msg.set_path("big").unwrap();
    msg.set_block1(size, num, more).unwrap();
    msg.payload = Payload(payload.to_vec());

    Addrd(msg.try_into_bytes().unwrap(), test::dummy_addr())
  }

  #[test]
  fn server_reassembles_fragmented_request() {
    let step = Harness::default();
    let body = (0..40).collect::<Vec<u8>>();

    // blocks of 16: [0..16), [16..32), [32..40)
    for (num, chunk) in body.chunks(16).enumerate() {
      let more = num < 2;
      let snap = snap_with(Some(block1_request(num as u32, more, 16, chunk, num as u16)));

      let mut effects = vec![];
      let out = step.poll_req(&snap, &mut effects);

      if more {
        assert!(matches!(out, Some(Err(nb::Error::WouldBlock))));

        let rep = effects.iter().find_map(Effect::get_send).unwrap();
        assert_eq!(rep.data().code, CONTINUE);

        let echo = rep.data().block1().unwrap();
        assert_eq!(echo.num(), num as u32);
        assert!(echo.more());
        assert_eq!(echo.size(), 16);
      } else {
        let req = out.unwrap().unwrap();
        assert_eq!(req.data().payload(), &body[..]);
        assert!(req.data().msg().block1().is_none());
        assert!(effects.is_empty());
      }
    }
  }

  #[test]
  fn out_of_order_fragment_is_408() {
    let step = Harness::default();

    let snap = snap_with(Some(block1_request(0, true, 16, &[0; 16], 1)));
    step.poll_req(&snap, &mut vec![]);

    // skip num=1
    let snap = snap_with(Some(block1_request(2, true, 16, &[0; 16], 2)));
    let mut effects = vec![];
    let out = step.poll_req(&snap, &mut effects);

    assert!(matches!(out, Some(Err(nb::Error::WouldBlock))));
    let rep = effects.iter().find_map(Effect::get_send).unwrap();
    assert_eq!(rep.data().code, REQUEST_ENTITY_INCOMPLETE);
  }

  #[test]
  fn fragment_with_no_session_is_408() {
    let step = Harness::default();

    let snap = snap_with(Some(block1_request(3, true, 16, &[0; 16], 1)));
    let mut effects = vec![];
    let out = step.poll_req(&snap, &mut effects);

    assert!(matches!(out, Some(Err(nb::Error::WouldBlock))));
    let rep = effects.iter().find_map(Effect::get_send).unwrap();
    assert_eq!(rep.data().code, REQUEST_ENTITY_INCOMPLETE);
  }

  #[test]
  fn oversized_assembly_is_413() {
    let step = Harness::default();

    let mut num = 0u32;
    loop {
      let snap = snap_with(Some(block1_request(num, true, 1024, &[0xA; 1024], num as u16)));
      let mut effects = vec![];
      step.poll_req(&snap, &mut effects);

      let rep = effects.iter().find_map(Effect::get_send).unwrap();
      if rep.data().code == REQUEST_ENTITY_TOO_LARGE {
        break;
      }

      assert_eq!(rep.data().code, CONTINUE);
      num += 1;
      assert!(num < 10, "4.13 never sent");
    }
  }

  #[test]
  fn client_request_body_is_fragmented() {
    let step = Harness::default();
    let body = (0..3000).map(|n| n as u8).collect::<Vec<u8>>();

    let mut msg = test::msg!(CON POST x.x.x.x:1111).unwrap();
    msg.token = Token(tinyvec::array_vec!([u8; 8] => 9));
    msg.set_path("big").unwrap();
    msg.payload = Payload(body.clone());
    let mut msg = Addrd(msg, test::dummy_addr());

    step.before_message_sent(&snap_with(None), &mut vec![], &mut msg)
        .unwrap();

    assert_eq!(msg.data().payload.0, body[..1024].to_vec());
    let b1 = msg.data().block1().unwrap();
    assert_eq!((b1.num(), b1.more(), b1.size()), (0, true, 1024));
    assert_eq!(msg.data().size1(), Some(3000));
  }

  #[test]
  fn second_fragmented_request_is_busy() {
    let step = Harness::default();
    let body = (0..3000).map(|n| n as u8).collect::<Vec<u8>>();

    let mut first = test::msg!(CON POST x.x.x.x:1111).unwrap();
    first.token = Token(tinyvec::array_vec!([u8; 8] => 1));
    first.payload = Payload(body.clone());
    let mut first = Addrd(first, test::dummy_addr());

    step.before_message_sent(&snap_with(None), &mut vec![], &mut first)
        .unwrap();

    let mut second = test::msg!(CON POST x.x.x.x:1111).unwrap();
    second.token = Token(tinyvec::array_vec!([u8; 8] => 2));
    second.payload = Payload(body);
    let mut second = Addrd(second, test::dummy_addr());

    let out = step.before_message_sent(&snap_with(None), &mut vec![], &mut second);
    assert!(matches!(out, Err(Error::Busy)));
  }

  #[test]
  fn continue_with_smaller_szx_renegotiates() {
    let step = Harness::default();
    let body = (0..3000).map(|n| n as u8).collect::<Vec<u8>>();

    let mut msg = test::msg!(CON POST x.x.x.x:1111).unwrap();
    msg.token = Token(tinyvec::array_vec!([u8; 8] => 9));
    msg.payload = Payload(body.clone());
    let mut msg = Addrd(msg, test::dummy_addr());

    step.before_message_sent(&snap_with(None), &mut vec![], &mut msg)
        .unwrap();

    // server acks block 0 but lowers the block size to 256 (szx 4)
    let mut ack = test::msg!({Type::Ack} {CONTINUE} x.x.x.x:1111).unwrap();
    ack.token = Token(tinyvec::array_vec!([u8; 8] => 9));
    ack.set_block1(256, 0, true).unwrap();
    let snap = snap_with(Some(Addrd(ack.try_into_bytes().unwrap(), test::dummy_addr())));

    let mut effects = vec![];
    let out = step.poll_resp(&snap,
                             &mut effects,
                             Token(tinyvec::array_vec!([u8; 8] => 9)),
                             test::dummy_addr());

    assert!(matches!(out, Some(Err(nb::Error::WouldBlock))));

    let next = effects.iter().find_map(Effect::get_send).unwrap();
    let b1 = next.data().block1().unwrap();

    // (1 << (6 - 4)) - 1 + 0 = 3
    assert_eq!(b1.num(), 3);
    assert_eq!(b1.size(), 256);
    assert!(b1.more());
    assert_eq!(next.data().payload.0, body[1024..1280].to_vec());
  }

  #[test]
  fn final_result_finishes_the_push() {
    let step = Harness::default();
    let body = (0..3000).map(|n| n as u8).collect::<Vec<u8>>();

    let mut msg = test::msg!(CON POST x.x.x.x:1111).unwrap();
    msg.token = Token(tinyvec::array_vec!([u8; 8] => 9));
    msg.payload = Payload(body);
    let mut msg = Addrd(msg, test::dummy_addr());

    step.before_message_sent(&snap_with(None), &mut vec![], &mut msg)
        .unwrap();

    let mut ack = test::msg!({Type::Ack} {Code::new(2, 4)} x.x.x.x:1111).unwrap();
    ack.token = Token(tinyvec::array_vec!([u8; 8] => 9));
    ack.set_block1(1024, 2, false).unwrap();
    let snap = snap_with(Some(Addrd(ack.try_into_bytes().unwrap(), test::dummy_addr())));

    let mut effects = vec![];
    let out = step.poll_resp(&snap,
                             &mut effects,
                             Token(tinyvec::array_vec!([u8; 8] => 9)),
                             test::dummy_addr());

    assert!(matches!(out, Some(Ok(_))));
    assert!(effects.is_empty());
  }

  #[test]
  fn server_slices_large_response() {
    let step = Harness::default();
    let body = (0..100).collect::<Vec<u8>>();

    // the requester asked for 16-byte blocks
    let mut get = test::msg!(CON GET x.x.x.x:1111).unwrap();
    get.id = Id(1);
    get.token = Token(tinyvec::array_vec!([u8; 8] => 5));
    get.set_block2(16, 0, false).unwrap();
    let snap = snap_with(Some(Addrd(get.clone().try_into_bytes().unwrap(), test::dummy_addr())));

    let out = step.poll_req(&snap, &mut vec![]);
    assert!(matches!(out, Some(Ok(_))));

    // handler answers with the full body; the step slices it
    let mut rep = test::msg!({Type::Ack} {Code::new(2, 5)} x.x.x.x:1111).unwrap();
    rep.id = Id(1);
    rep.token = get.token;
    rep.payload = Payload(body.clone());
    let mut rep = Addrd(rep, test::dummy_addr());

    step.before_message_sent(&snap_with(None), &mut vec![], &mut rep)
        .unwrap();

    assert_eq!(rep.data().payload.0, body[..16].to_vec());
    let b2 = rep.data().block2().unwrap();
    assert_eq!((b2.num(), b2.more(), b2.size()), (0, true, 16));
    assert_eq!(rep.data().size2(), Some(100));

    // the client asks for block 3
    let mut get3 = test::msg!(CON GET x.x.x.x:1111).unwrap();
    get3.id = Id(2);
    get3.token = Token(tinyvec::array_vec!([u8; 8] => 6));
    get3.set_block2(16, 3, false).unwrap();
    let snap = snap_with(Some(Addrd(get3.try_into_bytes().unwrap(), test::dummy_addr())));

    let mut effects = vec![];
    let out = step.poll_req(&snap, &mut effects);
    assert!(matches!(out, Some(Err(nb::Error::WouldBlock))));

    let slice = effects.iter().find_map(Effect::get_send).unwrap();
    assert_eq!(slice.data().payload.0, body[48..64].to_vec());
    assert_eq!(slice.data().block2().unwrap().num(), 3);
    assert_eq!(slice.data().id, Id(2));

    // past the end -> 4.04
    let mut get9 = test::msg!(CON GET x.x.x.x:1111).unwrap();
    get9.id = Id(3);
    get9.set_block2(16, 9, false).unwrap();
    let snap = snap_with(Some(Addrd(get9.try_into_bytes().unwrap(), test::dummy_addr())));

    let mut effects = vec![];
    step.poll_req(&snap, &mut effects);
    let rep = effects.iter().find_map(Effect::get_send).unwrap();
    assert_eq!(rep.data().code, NOT_FOUND);
  }

  #[test]
  fn client_reassembles_fragmented_response() {
    let step = Harness::default();

    // our outbound GET is remembered for mirroring
    let mut get = test::msg!(CON GET x.x.x.x:1111).unwrap();
    get.id = Id(1);
    get.token = Token(tinyvec::array_vec!([u8; 8] => 5));
    get.set_path("big").unwrap();
    let get = Addrd(get, test::dummy_addr());

    step.on_message_sent(&snap_with(None), &mut vec![], &get).unwrap();

    // block 0 arrives
    let mut rep0 = test::msg!({Type::Ack} {Code::new(2, 5)} x.x.x.x:1111).unwrap();
    rep0.id = Id(1);
    rep0.token = get.data().token;
    rep0.set_block2(16, 0, true).unwrap();
    rep0.payload = Payload((0..16).collect());
    let snap = snap_with(Some(Addrd(rep0.try_into_bytes().unwrap(), test::dummy_addr())));

    let mut effects = vec![];
    let out = step.poll_resp(&snap, &mut effects, get.data().token, get.addr());
    assert!(matches!(out, Some(Err(nb::Error::WouldBlock))));

    let next = effects.iter().find_map(Effect::get_send).unwrap();
    assert_eq!(next.data().block2().unwrap().num(), 1);
    assert!(next.data().payload.0.is_empty());
    assert_eq!(next.data().token, get.data().token);

    // final block arrives
    let mut rep1 = test::msg!({Type::Ack} {Code::new(2, 5)} x.x.x.x:1111).unwrap();
    rep1.id = Id(2);
    rep1.token = get.data().token;
    rep1.set_block2(16, 1, false).unwrap();
    rep1.payload = Payload((16..24).collect());
    let snap = snap_with(Some(Addrd(rep1.try_into_bytes().unwrap(), test::dummy_addr())));

    let mut effects = vec![];
    let out = step.poll_resp(&snap, &mut effects, get.data().token, get.addr());

    let rep = out.unwrap().unwrap();
    assert_eq!(rep.data().payload().copied().collect::<Vec<u8>>(),
               (0..24).collect::<Vec<u8>>());
    assert!(rep.data().msg().block2().is_none());
  }
}
