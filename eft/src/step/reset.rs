use eft_common::{Array, GetSize, Map, Stem};
use eft_msg::{CodeKind, Token, Type};
use no_std_net::SocketAddr;
use tinyvec::ArrayVec;

use super::{Step, StepOutput, _try};
use crate::logging::log;
use crate::net::Addrd;
use crate::platform::{self, Effect, PlatformTypes, Snapshot};
use crate::req::Req;
use crate::resp::Resp;

/// `Reset` that uses BTreeMap
///
/// Only enabled when feature "alloc" enabled.
#[cfg(feature = "alloc")]
pub mod alloc {
  use ::std_alloc::collections::BTreeMap;

  use super::*;

  /// [`Reset`](super::Reset) that uses BTreeMap
  ///
  /// For more information see [`super::Reset`].
  pub type Reset<S> = super::Reset<S, BTreeMap<Addrd<Token>, ()>>;
}

/// [`Reset`] that does not use heap allocation,
/// storing the token registry on the stack.
pub mod no_alloc {
  use super::*;

  /// [`Reset`](super::Reset) that does not use heap allocation.
  ///
  /// For more information see [`super::Reset`].
  pub type Reset<S> = super::Reset<S, ArrayVec<[(Addrd<Token>, ()); 16]>>;
}

/// Step that polices inbound traffic that answers nothing we sent:
///
/// - Confirmable or Non-confirmable **responses** whose token matches
///   no in-flight request are answered with an Empty Reset and
///   dropped.
/// - Empty **Confirmable** messages (CoAP ping) are answered with an
///   Empty Reset ("pong") and dropped.
/// - Inbound Resets and Empty Acks pass through untouched; matching
///   them to transactions is the retry step's business.
///
/// To know what "solicited" means, the step keeps a registry of the
/// tokens of outbound requests, pruned when a response arrives or the
/// transaction is aborted.
#[derive(Debug)]
pub struct Reset<S, B> {
  registry: Stem<B>,
  inner: S,
}

impl<S: Default, B: Default> Default for Reset<S, B> {
  fn default() -> Self {
    Self { registry: Default::default(),
           inner: S::default() }
  }
}

/// Errors that can be encountered when policing unsolicited responses
#[derive(Clone, PartialEq)]
pub enum Error<E> {
  /// The inner step failed.
  ///
  /// This variant's Debug representation is completely
  /// replaced by the inner type E's debug representation
  Inner(E),
  /// Tracking this outbound request would exceed a hard capacity for
  /// the token registry.
  ///
  /// Only applicable to [`Reset`] that uses `ArrayVec` or
  /// similar heapless backing structure.
  RegistryFull,
}

impl<E> From<E> for Error<E> {
  fn from(e: E) -> Self {
    Error::Inner(e)
  }
}

impl<E: core::fmt::Debug> core::fmt::Debug for Error<E> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::RegistryFull => f.debug_struct("RegistryFull").finish(),
      | Self::Inner(e) => e.fmt(f),
    }
  }
}

impl<E: super::Error> super::Error for Error<E> {
  fn kind(&self) -> super::ErrorKind {
    match self {
      | Self::RegistryFull => super::ErrorKind::Capacity,
      | Self::Inner(e) => e.kind(),
    }
  }
}

impl<S, B> Reset<S, B> {
  fn solicited(&self, token: Token, addr: SocketAddr) -> bool
    where B: Map<Addrd<Token>, ()>
  {
    self.registry.map_ref(|reg| {
                   reg.iter().any(|(Addrd(t, a), _)| {
                               *t == token && (*a == addr || a.ip().is_multicast())
                             })
                 })
  }

  fn forget(&self, token: Token, addr: SocketAddr)
    where B: Map<Addrd<Token>, ()>
  {
    self.registry.map_mut(|reg| {
                   // multicast destinations stay registered; many
                   // members may still respond
                   if reg.has(&Addrd(token, addr)) {
                     reg.remove(&Addrd(token, addr));
                   }
                 });
  }
}

impl<P: PlatformTypes,
      B: Map<Addrd<Token>, ()>,
      E: super::Error,
      S: Step<P, PollReq = Addrd<Req<P>>, PollResp = Addrd<Resp<P>>, Error = E>> Step<P>
  for Reset<S, B>
{
  type PollReq = Addrd<Req<P>>;
  type PollResp = Addrd<Resp<P>>;
  type Error = Error<E>;
  type Inner = S;

  fn poll_req(&self,
              snap: &Snapshot<P>,
              effects: &mut P::Effects)
              -> StepOutput<Self::PollReq, Self::Error> {
    self.inner
        .poll_req(snap, effects)
        .map(|o| o.map_err(|e| e.map(Error::Inner)))
  }

  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: Token,
               addr: no_std_net::SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error> {
    let rep = _try!(Option<nb::Result>; self.inner.poll_resp(snap, effects, token, addr));

    let (ty, kind) = (rep.data().msg().ty, rep.data().msg().code.kind());

    match (ty, kind) {
      | (Type::Con, CodeKind::Empty) => {
        // CoAP ping; pong with Reset
        let pong = platform::Message::<P>::reset(rep.data().msg().id);
        effects.push(Effect::Send(Addrd(pong, rep.addr())));
        None
      },
      | (Type::Con | Type::Non, CodeKind::Response)
        if !self.solicited(rep.data().msg().token, rep.addr()) =>
      {
        let rst = platform::Message::<P>::reset(rep.data().msg().id);
        log!(Reset::poll_resp,
             effects,
             log::Level::Warn,
             "{:?} unsolicited response from {:?} rejected",
             rep.data().msg().token,
             rep.addr());
        effects.push(Effect::Send(Addrd(rst, rep.addr())));
        None
      },
      | (_, CodeKind::Response) => {
        self.forget(rep.data().msg().token, rep.addr());
        Some(Ok(rep))
      },
      | _ => Some(Ok(rep)),
    }
  }

  fn on_message_sent(&self,
                     snap: &Snapshot<P>,
                     effects: &mut P::Effects,
                     msg: &Addrd<platform::Message<P>>)
                     -> Result<(), Self::Error> {
    self.inner
        .on_message_sent(snap, effects, msg)
        .map_err(Error::Inner)?;

    match msg.data().code.kind() {
      | CodeKind::Request => {
        self.registry
            .map_mut(|reg| match reg.is_full() {
              | true => Err(Error::RegistryFull),
              | false => {
                reg.insert(msg.as_ref().map(|m| m.token), ()).ok();
                Ok(())
              },
            })
      },
      | _ => Ok(()),
    }
  }

  fn inner(&self) -> &S {
    &self.inner
  }

  fn on_abort(&self, token: Addrd<Token>) {
    self.registry.map_mut(|reg| reg.remove(&token));
    self.inner.on_abort(token);
  }
}

#[cfg(test)]
mod test {
  use eft_msg::{Id, TryIntoBytes};

  use super::*;
  use crate::step::parse::Parse;
  use crate::step::Empty;
  use crate::test;

  type Harness = alloc::Reset<Parse<Empty>>;

  fn resp_dgram(ty: Type, token: u8, addr: no_std_net::SocketAddr) -> Addrd<Vec<u8>> {
    let mut msg = test::msg!({ty} {eft_msg::Code::new(2, 5)} x.x.x.x:1111).unwrap();
    msg.id = Id(9);
    msg.token = Token(tinyvec::array_vec!([u8; 8] => token));
    Addrd(msg.try_into_bytes().unwrap(), addr)
  }

  #[test]
  fn unsolicited_con_response_is_reset() {
    let step = Harness::default();
    let snap = test::snapshot(Some(resp_dgram(Type::Con, 1, test::dummy_addr())), 0);

    let mut effects = vec![];
    let out = step.poll_resp(&snap,
                             &mut effects,
                             Token(tinyvec::array_vec!([u8; 8] => 1)),
                             test::dummy_addr());

    assert!(out.is_none());
    let rst = effects.iter().find_map(Effect::get_send).unwrap();
    assert_eq!(rst.data().ty, Type::Reset);
    assert_eq!(rst.data().id, Id(9));
  }

  #[test]
  fn solicited_response_passes() {
    let step = Harness::default();
    let req = test::msg!(CON GET x.x.x.x:1111).map(|mut m| {
                                                m.token =
                                                  Token(tinyvec::array_vec!([u8; 8] => 1));
                                                m
                                              });

    step.on_message_sent(&test::snapshot(None, 0), &mut vec![], &req)
        .unwrap();

    let snap = test::snapshot(Some(resp_dgram(Type::Con, 1, req.addr())), 0);
    let mut effects = vec![];
    let out = step.poll_resp(&snap,
                             &mut effects,
                             Token(tinyvec::array_vec!([u8; 8] => 1)),
                             req.addr());

    assert!(matches!(out, Some(Ok(_))));
    assert!(effects.iter().all(|e| !e.is_send()));
  }

  #[test]
  fn ping_is_ponged() {
    let step = Harness::default();
    let mut ping = test::msg!({Type::Con} {eft_msg::Code::EMPTY} x.x.x.x:1111).unwrap();
    ping.id = Id(44);
    let bytes: Vec<u8> = ping.try_into_bytes().unwrap();
    let snap = test::snapshot(Some(Addrd(bytes, test::dummy_addr())), 0);

    let mut effects = vec![];
    let out = step.poll_resp(&snap,
                             &mut effects,
                             Token(Default::default()),
                             test::dummy_addr());

    assert!(out.is_none());
    let pong = effects.iter().find_map(Effect::get_send).unwrap();
    assert_eq!(pong.data().ty, Type::Reset);
    assert_eq!(pong.data().id, Id(44));
  }

  #[test]
  fn inbound_reset_passes_through() {
    let step = Harness::default();
    let mut rst = test::msg!({Type::Reset} {eft_msg::Code::EMPTY} x.x.x.x:1111).unwrap();
    rst.id = Id(3);
    let bytes: Vec<u8> = rst.try_into_bytes().unwrap();
    let snap = test::snapshot(Some(Addrd(bytes, test::dummy_addr())), 0);

    let out = step.poll_resp(&snap,
                             &mut vec![],
                             Token(Default::default()),
                             test::dummy_addr());

    assert!(matches!(out, Some(Ok(rep)) if rep.data().msg().ty == Type::Reset));
  }
}
