use eft_msg::TryFromBytes;

use super::{Step, StepOutput, _try};
use crate::net::Addrd;
use crate::platform::{self, PlatformTypes, Snapshot};
use crate::req::Req;
use crate::resp::Resp;

/// The message parsing CoAP lifecycle step.
///
/// Wraps the step that came before it, most likely
/// [`Empty`](crate::step::Empty), and turns the datagram in the
/// snapshot (if any) into a [`Req`] or [`Resp`].
///
/// Malformed datagrams yield [`Error::Parsing`]; the endpoint decides
/// whether that warrants a Reset (unicast Confirmable garbage does).
#[derive(Default, Debug, Clone, Copy)]
pub struct Parse<S>(S);

impl<S> Parse<S> {
  /// Create a new Parse step
  pub fn new(s: S) -> Self {
    Self(s)
  }
}

/// Errors that can occur during this step
#[derive(Clone, PartialEq)]
pub enum Error<E> {
  /// Datagram failed to parse as a CoAP message
  Parsing(eft_msg::MessageParseError),
  /// The inner step failed.
  ///
  /// This variant's Debug representation is completely
  /// replaced by the inner type E's debug representation
  Inner(E),
}

impl<E> From<E> for Error<E> {
  fn from(e: E) -> Self {
    Error::Inner(e)
  }
}

impl<E: core::fmt::Debug> core::fmt::Debug for Error<E> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::Parsing(e) => f.debug_tuple("Parsing").field(e).finish(),
      | Self::Inner(e) => e.fmt(f),
    }
  }
}

impl<E: super::Error> super::Error for Error<E> {
  fn kind(&self) -> super::ErrorKind {
    match self {
      | Self::Parsing(_) => super::ErrorKind::Parse,
      | Self::Inner(e) => e.kind(),
    }
  }
}

macro_rules! common {
  ($snap:expr) => {{
    match $snap.recvd_dgram.as_ref() {
      | None => return None,
      | Some(dgram) => {
        dgram.as_ref()
             .fold(|dgram, addr| {
               platform::Message::<P>::try_from_bytes(dgram).map(|msg| Addrd(msg, addr))
             })
             .map_err(Error::Parsing)
             .map_err(nb::Error::Other)
      },
    }
  }};
}

impl<Inner: Step<P>, P: PlatformTypes> Step<P> for Parse<Inner> {
  type PollReq = Addrd<Req<P>>;
  type PollResp = Addrd<Resp<P>>;
  type Error = Error<Inner::Error>;
  type Inner = Inner;

  fn inner(&self) -> &Inner {
    &self.0
  }

  fn poll_req(&self,
              snap: &Snapshot<P>,
              effects: &mut P::Effects)
              -> StepOutput<Self::PollReq, Self::Error> {
    _try!(Option<nb::Result>; self.0.poll_req(snap, effects).map(|r| r.map(|_| ())));
    Some(common!(snap).map(|addrd| addrd.map(Req::from)))
  }

  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: eft_msg::Token,
               addr: no_std_net::SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error> {
    _try!(Option<nb::Result>; self.0.poll_resp(snap, effects, token, addr).map(|r| r.map(|_| ())));
    Some(common!(snap).map(|addrd| addrd.map(Resp::from)))
  }
}
