use eft_common::Array;
use eft_msg::{CodeKind, Type};

use super::{Step, StepOutput, _try};
use crate::net::Addrd;
use crate::platform::{Effect, PlatformTypes, Snapshot};
use crate::req::Req;
use crate::resp::Resp;

/// Step that acknowledges inbound **Confirmable responses** with an
/// Empty Ack (the "separate response" flow: we sent a request, the
/// server acked it, and the actual response arrived later as its own
/// Confirmable message).
///
/// Inbound Confirmable *requests* are deliberately not acked here;
/// the resource handler's reply rides the Ack instead ("piggybacked
/// response").
#[derive(Debug, Clone, Copy)]
pub struct Ack<S>(S);

impl<S: Default> Default for Ack<S> {
  fn default() -> Self {
    Ack(Default::default())
  }
}

impl<S> Ack<S> {
  /// Create a new Ack step
  pub fn new(s: S) -> Self {
    Self(s)
  }
}

type InnerPollReq<P> = Addrd<Req<P>>;
type InnerPollResp<P> = Addrd<Resp<P>>;

impl<Inner: Step<P, PollReq = InnerPollReq<P>, PollResp = InnerPollResp<P>>, P: PlatformTypes>
  Step<P> for Ack<Inner>
{
  type PollReq = Addrd<Req<P>>;
  type PollResp = Addrd<Resp<P>>;
  type Error = Inner::Error;
  type Inner = Inner;

  fn inner(&self) -> &Inner {
    &self.0
  }

  fn poll_req(&self,
              snap: &Snapshot<P>,
              effects: &mut P::Effects)
              -> StepOutput<Self::PollReq, Self::Error> {
    self.0.poll_req(snap, effects)
  }

  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: eft_msg::Token,
               addr: no_std_net::SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error> {
    let rep = _try!(Option<nb::Result>; self.0.poll_resp(snap, effects, token, addr));

    if rep.data().msg().ty == Type::Con && rep.data().msg().code.kind() == CodeKind::Response {
      effects.push(Effect::Send(rep.as_ref().map(|r| r.msg().ack())));
    }

    Some(Ok(rep))
  }
}
