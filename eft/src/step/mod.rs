use no_std_net::SocketAddr;

use eft_msg::Token;

use crate::net::Addrd;
use crate::platform::{self, PlatformTypes, Snapshot};

/// Parsing inbound datagrams into requests & responses
pub mod parse;

/// Stamping zero message ids with fresh ones
pub mod provision_ids;

/// Rejecting unsolicited responses & handling CoAP ping
pub mod reset;

/// Acknowledging inbound Confirmable responses
pub mod ack;

/// The transaction store: retransmission & transaction timeout
pub mod retry;

/// The server-side response cache: deduplication of Confirmable
/// requests
pub mod dedup;

/// Block-wise transfer (RFC7959)
pub mod block;

/// ```text
///             None -> "You may run, the step may have done nothing or just performed some effects"
///         Some(Ok) -> "You may run, the step yielded a T that could be transformed or discarded"
///        Some(Err) -> "You should not run, something unrecoverable happened"
/// Some(WouldBlock) -> "You may run, but we should all wait until the resource would no longer block"
/// ```
pub type StepOutput<T, E> = Option<nb::Result<T, E>>;

/// A rough classification of step errors, so that the
/// [`Core`](crate::core::Core) can map deeply nested step error enums
/// onto caller-facing outcomes without matching on the nesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorKind {
  /// A transaction exhausted its retransmission budget with no
  /// response
  Timeout,
  /// A transaction was reset by the peer or aborted locally
  Abort,
  /// A block-wise transfer is already in flight
  Busy,
  /// A fixed-capacity buffer is full
  Capacity,
  /// An inbound datagram failed to parse
  Parse,
  /// An outbound message failed to serialize
  Serialize,
  /// Anything else
  Other,
}

/// Errors that steps may yield.
pub trait Error: core::fmt::Debug {
  /// Classify this error; used by the endpoint to map step errors to
  /// caller-facing outcomes.
  fn kind(&self) -> ErrorKind {
    ErrorKind::Other
  }
}

impl Error for core::convert::Infallible {}
impl Error for () {}

/// Short-circuit on the error pathways of inner steps and fallible
/// step internals.
macro_rules! _try {
  (Result; $result:expr) => {
    match $result {
      | Ok(t) => t,
      | Err(e) => return Some(Err(nb::Error::Other(e.into()))),
    }
  };
  (Option<nb::Result>; $result:expr) => {
    match $result {
      | None => return None,
      | Some(Err(nb::Error::WouldBlock)) => return Some(Err(nb::Error::WouldBlock)),
      | Some(Err(nb::Error::Other(e))) => return Some(Err(nb::Error::Other(e.into()))),
      | Some(Ok(t)) => t,
    }
  };
}

pub(crate) use _try;

/// A discrete piece of the CoAP runtime.
///
/// Steps form a type-level linked list (each step wraps the one that
/// runs before it) and are polled two ways:
/// - [`Step::poll_req`]: "serve an inbound request" (server flow)
/// - [`Step::poll_resp`]: "look for the response to a request I sent"
///   (client flow)
///
/// Steps are also notified of outbound traffic
/// ([`Step::before_message_sent`] to modify messages about to hit the
/// wire, [`Step::on_message_sent`] once they have) and of transaction
/// cancellation ([`Step::on_abort`]).
pub trait Step<P: PlatformTypes> {
  /// Type this step yields when polled for a request
  type PollReq;

  /// Type this step yields when polled for a response
  type PollResp;

  /// Errors this step (or its inner steps) can yield
  type Error: Error + From<<Self::Inner as Step<P>>::Error>;

  /// The step that runs before this one
  type Inner: Step<P>;

  /// Borrow the inner step
  fn inner(&self) -> &Self::Inner;

  /// Poll for an inbound request
  fn poll_req(&self,
              snap: &Snapshot<P>,
              effects: &mut P::Effects)
              -> StepOutput<Self::PollReq, Self::Error>;

  /// Poll for a response to the request identified by `token` sent to
  /// `addr`
  fn poll_resp(&self,
               snap: &Snapshot<P>,
               effects: &mut P::Effects,
               token: Token,
               addr: SocketAddr)
               -> StepOutput<Self::PollResp, Self::Error>;

  /// Invoked before an outbound message is serialized; the step may
  /// modify it (e.g. stamp a message id, slice an over-large body).
  fn before_message_sent(&self,
                         snap: &Snapshot<P>,
                         effects: &mut P::Effects,
                         msg: &mut Addrd<platform::Message<P>>)
                         -> Result<(), Self::Error> {
    self.inner()
        .before_message_sent(snap, effects, msg)
        .map_err(Self::Error::from)
  }

  /// Invoked after an outbound message hit the socket.
  fn on_message_sent(&self,
                     snap: &Snapshot<P>,
                     effects: &mut P::Effects,
                     msg: &Addrd<platform::Message<P>>)
                     -> Result<(), Self::Error> {
    self.inner()
        .on_message_sent(snap, effects, msg)
        .map_err(Self::Error::from)
  }

  /// Invoked when the transaction identified by `token` (sent to the
  /// contained address) is aborted; steps drop any state they hold for
  /// it.
  fn on_abort(&self, token: Addrd<Token>) {
    self.inner().on_abort(token)
  }
}

/// The terminal no-op step at the bottom of every step chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Empty;

impl<P: PlatformTypes> Step<P> for Empty {
  type PollReq = ();
  type PollResp = ();
  type Error = core::convert::Infallible;
  type Inner = Empty;

  fn inner(&self) -> &Empty {
    self
  }

  fn poll_req(&self,
              _: &Snapshot<P>,
              _: &mut P::Effects)
              -> StepOutput<(), core::convert::Infallible> {
    None
  }

  fn poll_resp(&self,
               _: &Snapshot<P>,
               _: &mut P::Effects,
               _: Token,
               _: SocketAddr)
               -> StepOutput<(), core::convert::Infallible> {
    None
  }

  fn before_message_sent(&self,
                         _: &Snapshot<P>,
                         _: &mut P::Effects,
                         _: &mut Addrd<platform::Message<P>>)
                         -> Result<(), Self::Error> {
    Ok(())
  }

  fn on_message_sent(&self,
                     _: &Snapshot<P>,
                     _: &mut P::Effects,
                     _: &Addrd<platform::Message<P>>)
                     -> Result<(), Self::Error> {
    Ok(())
  }

  fn on_abort(&self, _: Addrd<Token>) {}
}
