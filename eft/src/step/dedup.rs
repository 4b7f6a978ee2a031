use eft_common::{Array, Stem};
use eft_msg::{CodeKind, TryIntoBytes, Type};
use embedded_time::duration::Milliseconds;
use embedded_time::Instant;

use super::{Step, StepOutput, _try};
use crate::net::Addrd;
use crate::platform::{self, Dgram, Effect, PlatformTypes, Snapshot};
use crate::req::Req;
use crate::resp::Resp;
use crate::time::Stamped;

/// Most responses the cache will hold; the oldest entry is evicted
/// when a new response arrives while full.
pub const MAX_CACHED_RESPONSES: usize = 16;

/// `Dedup` that uses Vec
///
/// Only enabled when feature "alloc" enabled.
#[cfg(feature = "alloc")]
pub mod alloc {
  use ::std_alloc::vec::Vec;

  use super::*;

  /// [`Dedup`](super::Dedup) that uses Vec.
  ///
  /// For more information see [`super::Dedup`].
  pub type Dedup<P, S> =
    super::Dedup<S, Vec<Stamped<<P as PlatformTypes>::Clock, Addrd<platform::Message<P>>>>>;
}

/// The server-side response cache.
///
/// Every Acknowledgement carrying a piggybacked response is cached
/// (keyed on the peer's address and the request's message id) until
/// `EXCHANGE_LIFETIME` has passed. When a request arrives whose
/// `(peer, id)` hits the cache, the cached response is re-sent
/// byte-identically and the request is **not** dispatched again.
///
/// Invariant: the cache never contains two entries with the same
/// `(peer address, peer port, message id)`.
#[derive(Debug)]
pub struct Dedup<S, B> {
  cache: Stem<B>,
  inner: S,
}

impl<S: Default, B: Default> Default for Dedup<S, B> {
  fn default() -> Self {
    Self { cache: Default::default(),
           inner: S::default() }
  }
}

/// Errors that can be encountered when deduplicating requests
#[derive(Clone, Copy, PartialEq)]
pub enum Error<E> {
  /// The inner step failed.
  ///
  /// This variant's Debug representation is completely
  /// replaced by the inner type E's debug representation
  Inner(E),
  /// A cached response could not be re-serialized
  SerializingCached(eft_msg::to_bytes::MessageToBytesError),
}

impl<E> From<E> for Error<E> {
  fn from(e: E) -> Self {
    Error::Inner(e)
  }
}

impl<E: core::fmt::Debug> core::fmt::Debug for Error<E> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::SerializingCached(e) => f.debug_tuple("SerializingCached").field(e).finish(),
      | Self::Inner(e) => e.fmt(f),
    }
  }
}

impl<E: super::Error> super::Error for Error<E> {
  fn kind(&self) -> super::ErrorKind {
    match self {
      | Self::SerializingCached(_) => super::ErrorKind::Serialize,
      | Self::Inner(e) => e.kind(),
    }
  }
}

impl<S, B> Dedup<S, B> {
  fn prune<P>(&self, now: Instant<P::Clock>)
    where P: PlatformTypes,
          B: Array<Item = Stamped<P::Clock, Addrd<platform::Message<P>>>>
  {
    self.cache.map_mut(|cache| {
                let mut ix = cache.get_size();
                while ix > 0 {
                  ix -= 1;
                  if now >= cache[ix].time() {
                    Array::remove(cache, ix);
                  }
                }
              });
  }

  fn find_match<P>(&self,
                   req: &Addrd<Req<P>>)
                   -> Option<Addrd<platform::Message<P>>>
    where P: PlatformTypes,
          B: Array<Item = Stamped<P::Clock, Addrd<platform::Message<P>>>>
  {
    self.cache.map_ref(|cache| {
                cache.iter()
                     .find(|entry| {
                       entry.data().addr() == req.addr()
                       && entry.data().data().id == req.data().msg().id
                     })
                     .map(|entry| entry.data().clone())
              })
  }
}

impl<P: PlatformTypes,
      B: Array<Item = Stamped<P::Clock, Addrd<platform::Message<P>>>>,
      E: super::Error,
      S: Step<P, PollReq = Addrd<Req<P>>, PollResp = Addrd<Resp<P>>, Error = E>> Step<P>
  for Dedup<S, B>
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
    self.prune::<P>(snap.time);

    let req = _try!(Option<nb::Result>; self.inner.poll_req(snap, effects));

    match self.find_match(&req) {
      | Some(cached) => {
        // duplicate; re-send the original bytes and suppress dispatch
        let dgram = _try!(Result; cached.data()
                                        .clone()
                                        .try_into_bytes::<Dgram<P>>()
                                        .map_err(Error::SerializingCached::<E>));
        effects.push(Effect::SendDgram(Addrd(dgram, cached.addr())));
        Some(Err(nb::Error::WouldBlock))
      },
      | None => Some(Ok(req)),
    }
  }

  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: eft_msg::Token,
               addr: no_std_net::SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error> {
    self.prune::<P>(snap.time);

    self.inner
        .poll_resp(snap, effects, token, addr)
        .map(|o| o.map_err(|e| e.map(Error::Inner)))
  }

  fn on_message_sent(&self,
                     snap: &Snapshot<P>,
                     effects: &mut P::Effects,
                     msg: &Addrd<platform::Message<P>>)
                     -> Result<(), Self::Error> {
    self.inner
        .on_message_sent(snap, effects, msg)
        .map_err(Error::Inner)?;

    if msg.data().ty == Type::Ack && msg.data().code.kind() == CodeKind::Response {
      self.prune::<P>(snap.time);

      self.cache.map_mut(|cache| {
                  let exists = cache.iter().any(|entry| {
                                               entry.data().addr() == msg.addr()
                                               && entry.data().data().id == msg.data().id
                                             });

                  if !exists {
                    if cache.get_size()
                       >= cache.max_size()
                               .unwrap_or(MAX_CACHED_RESPONSES)
                               .min(MAX_CACHED_RESPONSES)
                    {
                      Array::remove(cache, 0);
                    }

                    let dequeue_at =
                      snap.time + Milliseconds(snap.config.exchange_lifetime_millis());
                    cache.push(Stamped(msg.clone(), dequeue_at));
                  }
                });
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use eft_msg::{Code, Id, Token, TryIntoBytes};

  use super::*;
  use crate::step::parse::Parse;
  use crate::step::Empty;
  use crate::test::{self, ClockMock};

  type Harness = alloc::Dedup<test::Platform, Parse<Empty>>;

  fn piggybacked_response(id: u16) -> Addrd<platform::Message<test::Platform>> {
    test::msg!({eft_msg::Type::Ack} {Code::new(2, 5)} x.x.x.x:1111).map(|mut m| {
                                                                     m.id = Id(id);
                                                                     m
                                                                   })
  }

  fn request_dgram(id: u16) -> Addrd<Vec<u8>> {
    let msg = test::msg!(CON GET x.x.x.x:1111).map(|mut m| {
                                                m.id = Id(id);
                                                m
                                              });
    Addrd(msg.data().clone().try_into_bytes().unwrap(), msg.addr())
  }

  fn snap_at(time_millis: u64) -> Snapshot<test::Platform> {
    Snapshot { time: ClockMock::instant(time_millis * 1000),
               recvd_dgram: None,
               config: Default::default() }
  }

  #[test]
  fn duplicate_request_is_answered_from_cache() {
    let step = Harness::default();
    let rep = piggybacked_response(0x1234);

    step.on_message_sent(&snap_at(0), &mut vec![], &rep).unwrap();

    let mut snap = snap_at(1);
    snap.recvd_dgram = Some(request_dgram(0x1234));

    let mut effects = vec![];
    let out = step.poll_req(&snap, &mut effects);

    assert!(matches!(out, Some(Err(nb::Error::WouldBlock))));

    let expected: Vec<u8> = rep.data().clone().try_into_bytes().unwrap();
    assert!(matches!(&effects[0],
                     Effect::SendDgram(Addrd(d, _)) if d == &expected));
  }

  #[test]
  fn fresh_request_is_dispatched() {
    let step = Harness::default();
    let rep = piggybacked_response(0x1234);

    step.on_message_sent(&snap_at(0), &mut vec![], &rep).unwrap();

    let mut snap = snap_at(1);
    snap.recvd_dgram = Some(request_dgram(0x4321));

    let mut effects = vec![];
    let out = step.poll_req(&snap, &mut effects);

    assert!(matches!(out, Some(Ok(_))));
    assert!(effects.is_empty());
  }

  #[test]
  fn cache_is_unique_per_peer_and_id() {
    let step = Harness::default();
    let rep = piggybacked_response(7);

    step.on_message_sent(&snap_at(0), &mut vec![], &rep).unwrap();
    step.on_message_sent(&snap_at(1), &mut vec![], &rep).unwrap();

    step.cache.map_ref(|cache| assert_eq!(cache.len(), 1));
  }

  #[test]
  fn entries_expire_after_exchange_lifetime() {
    let step = Harness::default();
    let rep = piggybacked_response(7);
    let lifetime = snap_at(0).config.exchange_lifetime_millis();

    step.on_message_sent(&snap_at(0), &mut vec![], &rep).unwrap();

    let mut snap = snap_at(lifetime - 1);
    snap.recvd_dgram = Some(request_dgram(7));
    assert!(matches!(step.poll_req(&snap, &mut vec![]),
                     Some(Err(nb::Error::WouldBlock))));

    let mut snap = snap_at(lifetime + 1);
    snap.recvd_dgram = Some(request_dgram(7));
    assert!(matches!(step.poll_req(&snap, &mut vec![]), Some(Ok(_))));
  }

  #[test]
  fn oldest_entry_is_evicted_when_full() {
    let step = Harness::default();

    for id in 0..MAX_CACHED_RESPONSES as u16 + 1 {
      step.on_message_sent(&snap_at(id as u64), &mut vec![], &piggybacked_response(id))
          .unwrap();
    }

    step.cache.map_ref(|cache| {
               assert_eq!(cache.len(), MAX_CACHED_RESPONSES);
               assert!(cache.iter().all(|e| e.data().data().id != Id(0)));
             });
  }

  #[test]
  fn empty_acks_are_not_cached() {
    let step = Harness::default();
    let ack = test::msg!(ACK EMPTY x.x.x.x:1111);

    step.on_message_sent(&snap_at(0), &mut vec![], &ack).unwrap();
    step.cache.map_ref(|cache| assert!(cache.is_empty()));
  }

  #[test]
  fn non_responses_are_not_cached() {
    let step = Harness::default();
    let rep = test::msg!(NON {2 . 05} x.x.x.x:1111);

    step.on_message_sent(&snap_at(0), &mut vec![], &rep).unwrap();
    step.cache.map_ref(|cache| assert!(cache.is_empty()));
  }
}
