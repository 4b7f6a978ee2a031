use eft_common::Stem;
use eft_msg::Id;

use super::{Step, StepOutput};
use crate::net::Addrd;
use crate::platform::{self, PlatformTypes, Snapshot};

/// Step responsible for replacing message ids of zero `Id(0)` (assumed
/// to be meaningless) on outbound messages with a fresh id from a
/// strictly increasing per-endpoint counter.
///
/// Ids are 16-bit and wrap around, skipping zero; the counter starts
/// at [`Config.msg_id_seed`](crate::config::Config::msg_id_seed).
#[derive(Debug, Default)]
pub struct ProvisionIds<S> {
  inner: S,
  next: Stem<u16>,
}

impl<S> ProvisionIds<S> {
  fn next_id(&self, seed: u16) -> Id {
    Id(self.next.map_mut(|n| {
                  if *n == 0 {
                    *n = seed;
                  }

                  *n = match *n {
                    | u16::MAX => 1,
                    | n => n + 1,
                  };

                  *n
                }))
  }
}

impl<P: PlatformTypes, Inner: Step<P>> Step<P> for ProvisionIds<Inner> {
  type PollReq = Inner::PollReq;
  type PollResp = Inner::PollResp;
  type Error = Inner::Error;
  type Inner = Inner;

  fn inner(&self) -> &Inner {
    &self.inner
  }

  fn poll_req(&self,
              snap: &Snapshot<P>,
              effects: &mut P::Effects)
              -> StepOutput<Self::PollReq, Self::Error> {
    self.inner.poll_req(snap, effects)
  }

  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: eft_msg::Token,
               addr: no_std_net::SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error> {
    self.inner.poll_resp(snap, effects, token, addr)
  }

  fn before_message_sent(&self,
                         snap: &Snapshot<P>,
                         effects: &mut P::Effects,
                         msg: &mut Addrd<platform::Message<P>>)
                         -> Result<(), Self::Error> {
    self.inner.before_message_sent(snap, effects, msg)?;

    if msg.data().id == Id(0) {
      msg.as_mut().id = self.next_id(snap.config.msg_id_seed);
    }

    Ok(())
  }
}

#[cfg(test)]
mod test {
  use eft_msg::{Code, Token, Type};

  use super::*;
  use crate::step::parse::Parse;
  use crate::step::Empty;
  use crate::test;

  type Harness = ProvisionIds<Parse<Empty>>;

  #[test]
  fn zero_ids_are_stamped_monotonically() {
    let step = Harness::default();
    let snap = test::snapshot(None, 0);

    let mut a = test::msg!(CON GET x.x.x.x:1111);
    let mut b = test::msg!(CON GET x.x.x.x:1111);

    step.before_message_sent(&snap, &mut vec![], &mut a).unwrap();
    step.before_message_sent(&snap, &mut vec![], &mut b).unwrap();

    assert_ne!(a.data().id, Id(0));
    assert_eq!(b.data().id.0, a.data().id.0 + 1);
  }

  #[test]
  fn nonzero_ids_are_left_alone() {
    let step = Harness::default();
    let snap = test::snapshot(None, 0);

    let mut msg = test::msg!(CON GET x.x.x.x:1111);
    msg.as_mut().id = Id(0x1234);

    step.before_message_sent(&snap, &mut vec![], &mut msg).unwrap();
    assert_eq!(msg.data().id, Id(0x1234));
  }

  #[test]
  fn counter_starts_at_seed() {
    let step = Harness::default();
    let mut snap = test::snapshot(None, 0);
    snap.config.msg_id_seed = 700;

    let mut msg = test::msg!({Type::Con} {Code::GET} x.x.x.x:1111);
    step.before_message_sent(&snap, &mut vec![], &mut msg).unwrap();

    assert_eq!(msg.data().id, Id(701));
  }

  #[test]
  fn polls_pass_through() {
    let step = Harness::default();
    let snap = test::snapshot(None, 0);
    assert!(step.poll_req(&snap, &mut vec![]).is_none());
    assert!(step.poll_resp(&snap, &mut vec![], Token(Default::default()), test::dummy_addr())
                .is_none());
  }
}
