use eft_common::{Array, Stem};
use eft_msg::{CodeKind, Id, Token, TryIntoBytes, Type};
use embedded_time::Instant;
use no_std_net::SocketAddr;

use super::{Step, StepOutput, _try};
use crate::config::Config;
use crate::net::Addrd;
use crate::platform::{self, Dgram, Effect, PlatformTypes, Snapshot};
use crate::req::Req;
use crate::resp::Resp;
use crate::retry::{Attempts, RetryTimer, Strategy, YouShould};
use crate::time::{Clock, Millis};
use embedded_time::duration::Milliseconds;

/// Most terminal outcomes kept for unpolled transactions before old
/// ones are discarded
const MAX_DEAD: usize = 16;

/// `Retry` that uses Vec
///
/// Only enabled when feature "alloc" enabled.
#[cfg(feature = "alloc")]
pub mod alloc {
  use ::std_alloc::vec::Vec;

  use super::*;

  /// [`Retry`](super::Retry) that uses Vec.
  ///
  /// For more information see [`super::Retry`].
  pub type Retry<P, S> =
    super::Retry<S,
                 Vec<(State<<P as PlatformTypes>::Clock>, Addrd<platform::Message<P>>)>,
                 Vec<(Finale, Addrd<platform::Message<P>>)>>;
}

/// The transaction store.
///
/// Owns clones of outbound messages that may need to be sent again:
///
/// - Confirmable messages are retransmitted with exponential backoff
///   (first delay uniform in `[ACK_TIMEOUT, ACK_TIMEOUT *
///   ACK_RANDOM_FACTOR + 1)`, doubling per attempt) until acked,
///   answered, reset, or out of attempts.
/// - An Empty Ack swaps a Confirmable request's timer for a single
///   `MAX_TRANSMIT_WAIT` deadline (the separate-response wait); an
///   Empty Ack for a Confirmable *response* retires it.
/// - Non-confirmable requests are not retransmitted but carry the
///   `MAX_TRANSMIT_WAIT` deadline so their transaction can time out.
///
/// Terminal outcomes (timeout, peer reset) surface exactly once
/// through `poll_resp` for the transaction's token.
#[derive(Debug)]
pub struct Retry<Inner, Buffer, Dead> {
  inner: Inner,
  buf: Stem<Buffer>,
  dead: Stem<Dead>,
}

impl<Inner, Buffer, Dead> Default for Retry<Inner, Buffer, Dead>
  where Inner: Default,
        Buffer: Default,
        Dead: Default
{
  fn default() -> Self {
    Self { inner: Inner::default(),
           buf: Default::default(),
           dead: Default::default() }
  }
}

/// How a stored transaction ended without a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Finale {
  /// The retransmission budget was spent with nothing heard back
  Timeout,
  /// The peer sent an Empty Reset
  Abort,
}

/// The state of a message stored in the retry [buffer](Buf)
#[derive(Debug, PartialEq)]
pub enum State<C>
  where C: Clock
{
  /// An un-acked Confirmable message.
  ///
  /// When it is acked, the retry timer is replaced with a single
  /// deadline spanning the rest of `MAX_TRANSMIT_WAIT` (waiting for a
  /// separate response).
  ConPreAck {
    /// The current (unacked) retransmission timer
    timer: RetryTimer<C>,
    /// The deadline to adopt once the message is acked
    post_ack_wait: Millis,
  },
  /// Anything else; the timer never changes shape.
  Just(RetryTimer<C>),
}

impl<C> Copy for State<C> where C: Clock + Copy {}
impl<C> Clone for State<C> where C: Clock + Copy
{
  fn clone(&self) -> Self {
    match self {
      | Self::Just(t) => Self::Just(*t),
      | Self::ConPreAck { timer, post_ack_wait } => Self::ConPreAck { timer: *timer,
                                                                     post_ack_wait:
                                                                       *post_ack_wait },
    }
  }
}

impl<C> State<C> where C: Clock
{
  fn timer(&mut self) -> &mut RetryTimer<C> {
    match self {
      | Self::Just(t) => t,
      | Self::ConPreAck { timer, .. } => timer,
    }
  }
}

/// Buffer used to store messages queued for retry
pub trait Buf<P>
  where P: PlatformTypes,
        Self: Array<Item = (State<P::Clock>, Addrd<platform::Message<P>>)>
{
  /// Retransmit every stored message whose timer says its time has
  /// come; move the ones that are out of attempts to the `dead` list.
  fn attempt_all<Dead>(&mut self,
                       time: Instant<P::Clock>,
                       effects: &mut P::Effects,
                       dead: &mut Dead)
                       -> Result<(), eft_msg::to_bytes::MessageToBytesError>
    where Dead: Array<Item = (Finale, Addrd<platform::Message<P>>)>
  {
    let mut ix = self.get_size();

    while ix > 0 {
      ix -= 1;

      match self[ix].0.timer().what_should_i_do(time) {
        | Err(nb::Error::WouldBlock) => (),
        | Err(nb::Error::Other(_)) => (),
        | Ok(YouShould::Retry) => {
          let dgram = self[ix].1.data().clone().try_into_bytes::<Dgram<P>>()?;
          effects.push(Effect::SendDgram(Addrd(dgram, self[ix].1.addr())));
        },
        | Ok(YouShould::Cry) => {
          if let Some((_, msg)) = Array::remove(self, ix) {
            if dead.get_size() >= dead.max_size().unwrap_or(MAX_DEAD).min(MAX_DEAD) {
              Array::remove(dead, 0);
            }
            dead.push((Finale::Timeout, msg));
          }
        },
      }
    }

    Ok(())
  }

  /// An Empty Ack arrived; retire acked Confirmable responses and
  /// switch acked Confirmable requests to the separate-response
  /// deadline.
  fn mark_acked(&mut self, id: Id, addr: SocketAddr, time: Instant<P::Clock>) {
    let found = self.iter()
                    .enumerate()
                    .find(|(_, (_, msg))| msg.data().id == id && msg.addr() == addr)
                    .map(|(ix, _)| ix);

    let ix = match found {
      | Some(ix) => ix,
      | None => return,
    };

    if self[ix].1.data().code.kind() == CodeKind::Response {
      Array::remove(self, ix);
      return;
    }

    if let State::ConPreAck { post_ack_wait, .. } = self[ix].0 {
      self[ix].0 = State::Just(RetryTimer::new(time,
                                               Strategy::Deadline { after: post_ack_wait },
                                               Attempts(1)));
    }
  }

  /// We saw a response and should remove all tracking of its token.
  ///
  /// Requests sent to a multicast address stay stored (and keep
  /// accepting responses) until their deadline.
  fn forget(&mut self, token: Token, addr: SocketAddr) {
    let found = self.iter()
                    .enumerate()
                    .find(|(_, (_, msg))| {
                      msg.data().token == token
                      && (msg.addr() == addr || msg.addr().ip().is_multicast())
                    })
                    .map(|(ix, _)| ix);

    match found {
      | Some(ix) if !self[ix].1.addr().ip().is_multicast() => {
        Array::remove(self, ix);
      },
      | _ => (),
    }
  }

  /// An Empty Reset arrived; the matching transaction (by message id)
  /// is aborted.
  fn process_reset<Dead>(&mut self, id: Id, addr: SocketAddr, dead: &mut Dead)
    where Dead: Array<Item = (Finale, Addrd<platform::Message<P>>)>
  {
    let found = self.iter()
                    .enumerate()
                    .find(|(_, (_, msg))| msg.data().id == id && msg.addr() == addr)
                    .map(|(ix, _)| ix);

    if let Some(ix) = found {
      if let Some((_, msg)) = Array::remove(self, ix) {
        dead.push((Finale::Abort, msg));
      }
    }
  }

  /// Called when a message of any kind is received, updating stored
  /// transactions it acks, answers or aborts.
  fn maybe_seen_response<Dead>(&mut self,
                               time: Instant<P::Clock>,
                               msg: Addrd<&platform::Message<P>>,
                               dead: &mut Dead)
    where Dead: Array<Item = (Finale, Addrd<platform::Message<P>>)>
  {
    match (msg.data().ty, msg.data().code.kind()) {
      | (Type::Ack, CodeKind::Empty) => self.mark_acked(msg.data().id, msg.addr(), time),
      | (Type::Reset, CodeKind::Empty) => self.process_reset(msg.data().id, msg.addr(), dead),
      | (_, CodeKind::Response) => self.forget(msg.data().token, msg.addr()),
      | _ => (),
    }
  }

  /// Called when a message of any kind is sent,
  /// and may store it to be retried in the future
  fn store_retryables(&mut self,
                      msg: &Addrd<platform::Message<P>>,
                      time: Instant<P::Clock>,
                      config: Config)
                      -> Result<(), ()> {
    match msg.data().ty {
      | Type::Con | Type::Non if self.is_full() => Err(()),
      | Type::Con => {
        let (init_min, init_max) = config.initial_retry_delay();

        self.push((State::ConPreAck { timer:
                                        RetryTimer::new(time,
                                                        Strategy::Exponential { init_min,
                                                                                init_max },
                                                        Attempts(config.max_retransmit + 1)),
                                      post_ack_wait:
                                        Milliseconds(config.max_transmit_wait_millis()) },
                   msg.clone()));

        Ok(())
      },
      | Type::Non if msg.data().code.kind() == CodeKind::Request => {
        self.push((State::Just(RetryTimer::new(time,
                                               Strategy::Deadline { after: Milliseconds(config.max_transmit_wait_millis()) },
                                               Attempts(1))),
                   msg.clone()));

        Ok(())
      },
      | _ => Ok(()),
    }
  }
}

impl<T, P> Buf<P> for T
  where T: Array<Item = (State<P::Clock>, Addrd<platform::Message<P>>)>,
        P: PlatformTypes
{
}

/// Errors that can be encountered when retrying messages
#[derive(Clone, Copy, PartialEq)]
pub enum Error<E> {
  /// The inner step failed.
  ///
  /// This variant's Debug representation is completely
  /// replaced by the inner type E's debug representation.
  Inner(E),
  /// Storing this message would exceed a hard capacity for the
  /// buffer of messages waiting for responses.
  RetryBufferFull,
  /// A stored message could not be re-serialized for retransmission
  SerializingRetry(eft_msg::to_bytes::MessageToBytesError),
  /// The polled transaction spent its retransmission budget without
  /// hearing back
  Timeout,
  /// The polled transaction was Reset by the peer
  Abort,
}

impl<E: core::fmt::Debug> core::fmt::Debug for Error<E> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::RetryBufferFull => f.debug_struct("RetryBufferFull").finish(),
      | Self::SerializingRetry(e) => f.debug_tuple("SerializingRetry").field(e).finish(),
      | Self::Timeout => f.debug_struct("Timeout").finish(),
      | Self::Abort => f.debug_struct("Abort").finish(),
      | Self::Inner(e) => e.fmt(f),
    }
  }
}

impl<E: super::Error> super::Error for Error<E> {
  fn kind(&self) -> super::ErrorKind {
    match self {
      | Self::RetryBufferFull => super::ErrorKind::Capacity,
      | Self::SerializingRetry(_) => super::ErrorKind::Serialize,
      | Self::Timeout => super::ErrorKind::Timeout,
      | Self::Abort => super::ErrorKind::Abort,
      | Self::Inner(e) => e.kind(),
    }
  }
}

impl<E> From<E> for Error<E> {
  fn from(e: E) -> Self {
    Error::Inner(e)
  }
}

impl<Inner, Buffer, Dead> Retry<Inner, Buffer, Dead> {
  fn attempt_all<P, E>(&self, snap: &Snapshot<P>, effects: &mut P::Effects) -> Result<(), Error<E>>
    where P: PlatformTypes,
          Buffer: Buf<P>,
          Dead: Array<Item = (Finale, Addrd<platform::Message<P>>)>
  {
    self.buf
        .map_mut(|buf| {
          self.dead
              .map_mut(|dead| buf.attempt_all::<Dead>(snap.time, effects, dead))
        })
        .map_err(Error::SerializingRetry)
  }

  fn take_dead<P>(&self, token: Token, addr: SocketAddr) -> Option<Finale>
    where P: PlatformTypes,
          Dead: Array<Item = (Finale, Addrd<platform::Message<P>>)>
  {
    self.dead.map_mut(|dead| {
               let found = dead.iter()
                               .position(|(_, msg)| {
                                 msg.data().token == token
                                 && (msg.addr() == addr || msg.addr().ip().is_multicast())
                               });

               found.and_then(|ix| Array::remove(dead, ix)).map(|(finale, _)| finale)
             })
  }
}

impl<P, E, Inner, Buffer, Dead> Step<P> for Retry<Inner, Buffer, Dead>
  where Buffer: Buf<P>,
        Dead: Array<Item = (Finale, Addrd<platform::Message<P>>)>,
        P: PlatformTypes,
        E: super::Error,
        Inner: Step<P, PollReq = Addrd<Req<P>>, PollResp = Addrd<Resp<P>>, Error = E>
{
  type PollReq = Addrd<Req<P>>;
  type PollResp = Addrd<Resp<P>>;
  type Error = Error<E>;
  type Inner = Inner;

  fn inner(&self) -> &Inner {
    &self.inner
  }

  fn poll_req(&self,
              snap: &Snapshot<P>,
              effects: &mut P::Effects)
              -> StepOutput<Self::PollReq, Self::Error> {
    // SERVER FLOW:
    //  * CON responses WILL     be retried
    //  * NON responses WILL NOT be retried
    //  * ACKs          WILL NOT be retried
    //  * RESET         WILL NOT be retried
    _try!(Result; self.attempt_all(snap, effects));

    let req = _try!(Option<nb::Result>; self.inner.poll_req(snap, effects));
    Some(Ok(req))
  }

  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: Token,
               addr: SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error> {
    // CLIENT FLOW:
    //  * CON requests WILL     be retried
    //  * NON requests WILL NOT be retried, but DO time out
    _try!(Result; self.attempt_all(snap, effects));

    match self.take_dead::<P>(token, addr) {
      | Some(Finale::Timeout) => return Some(Err(nb::Error::Other(Error::Timeout))),
      | Some(Finale::Abort) => return Some(Err(nb::Error::Other(Error::Abort))),
      | None => (),
    }

    let rep = _try!(Option<nb::Result>; self.inner.poll_resp(snap, effects, token, addr));

    self.buf.map_mut(|buf| {
             self.dead.map_mut(|dead| {
                        buf.maybe_seen_response::<Dead>(snap.time,
                                                        rep.as_ref().map(|r| r.msg()),
                                                        dead)
                      })
           });

    Some(Ok(rep))
  }

  fn on_message_sent(&self,
                     snap: &Snapshot<P>,
                     effects: &mut P::Effects,
                     msg: &Addrd<platform::Message<P>>)
                     -> Result<(), Self::Error> {
    self.inner
        .on_message_sent(snap, effects, msg)
        .map_err(Error::Inner)?;

    self.buf
        .map_mut(|buf| buf.store_retryables(msg, snap.time, snap.config))
        .map_err(|()| Error::RetryBufferFull)
  }

  fn on_abort(&self, token: Addrd<Token>) {
    self.buf.map_mut(|buf| {
             let found = buf.iter()
                            .position(|(_, msg)| {
                              msg.data().token == *token.data() && msg.addr() == token.addr()
                            });

             if let Some(ix) = found {
               Array::remove(buf, ix);
             }
           });
    self.inner.on_abort(token);
  }
}
