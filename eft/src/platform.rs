use core::fmt::Debug;

use eft_common::{Array, Writable};
use eft_msg::OptionMap;
use embedded_time::Instant;
use tinyvec::ArrayVec;

use crate::config::Config;
use crate::net::{Addrd, Socket};
use crate::time::Clock;

/// A 1KB stack-allocated string used for log lines
pub type String1Kb = Writable<ArrayVec<[u8; 1024]>>;

/// eft configuration trait
///
/// Fills in the collection, clock and socket types that the runtime is
/// generic over.
pub trait PlatformTypes: Sized + 'static + core::fmt::Debug {
  /// What type should we use to store message payloads?
  type MessagePayload: Array<Item = u8> + eft_common::AppendCopy<u8> + Clone + Debug + PartialEq;

  /// What type should we use to store message options?
  type MessageOptions: OptionMap;

  /// What should we use to keep track of time?
  type Clock: Clock + Debug;

  /// What should we use for networking?
  type Socket: Socket;

  /// How will we store a sequence of effects to perform?
  type Effects: Array<Item = Effect<Self>>;
}

/// [`eft_msg::Message`] shorthand using Platform types
pub type Message<P> =
  eft_msg::Message<<P as PlatformTypes>::MessagePayload, <P as PlatformTypes>::MessageOptions>;

/// The datagram buffer type of a Platform's socket
pub type Dgram<P> = <<P as PlatformTypes>::Socket as Socket>::Dgram;

/// A snapshot of the system's state at a given moment
///
/// ```text
/// let Snapshot {time, recvd_dgram, ..} = snap;
/// ```
#[allow(missing_debug_implementations)]
#[non_exhaustive]
pub struct Snapshot<P: PlatformTypes> {
  /// The current system time at the start of the step pipe
  pub time: Instant<P::Clock>,

  /// A UDP datagram received from somewhere, if any arrived
  pub recvd_dgram: Option<Addrd<Dgram<P>>>,

  /// Runtime config, includes many useful timings
  pub config: Config,
}

impl<P: PlatformTypes> Snapshot<P> {
  /// A snapshot with no inbound datagram, used to drive timers
  pub fn timer_only(time: Instant<P::Clock>, config: Config) -> Self {
    Self { time,
           recvd_dgram: None,
           config }
  }
}

impl<P: PlatformTypes> Clone for Snapshot<P> {
  fn clone(&self) -> Self {
    Self { time: self.time,
           recvd_dgram: self.recvd_dgram.clone(),
           config: self.config }
  }
}

/// Used by [`Step`](crate::step::Step)s to deterministically
/// communicate side-effects they would like performed to the
/// [`Core`](crate::core::Core) driving them.
pub enum Effect<P: PlatformTypes> {
  /// Send a message through the full outbound pipeline
  /// (id provisioning, block-wise slicing, retransmission tracking,
  /// dedup caching).
  Send(Addrd<Message<P>>),
  /// Send raw bytes directly out the socket, bypassing the outbound
  /// pipeline.
  ///
  /// Used for retransmissions and cached-response resends, which must
  /// be byte-identical to the original emission and must not be
  /// re-tracked.
  SendDgram(Addrd<Dgram<P>>),
  /// Log a line
  Log(log::Level, String1Kb),
}

impl<P: PlatformTypes> Clone for Effect<P> {
  fn clone(&self) -> Self {
    match self {
      | Effect::Send(m) => Effect::Send(m.clone()),
      | Effect::SendDgram(d) => Effect::SendDgram(d.clone()),
      | Effect::Log(l, m) => Effect::Log(*l, *m),
    }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Effect<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::Send(m) => f.debug_tuple("Send").field(m).finish(),
      | Self::SendDgram(d) => f.debug_tuple("SendDgram").field(d).finish(),
      | Self::Log(l, s) => f.debug_tuple("Log").field(l).field(&s.as_str()).finish(),
    }
  }
}

impl<P: PlatformTypes> PartialEq for Effect<P> {
  fn eq(&self, other: &Self) -> bool {
    match (self, other) {
      | (Self::Send(a), Self::Send(b)) => a == b,
      | (Self::SendDgram(a), Self::SendDgram(b)) => a == b,
      | (Self::Log(al, am), Self::Log(bl, bm)) => al == bl && am.as_str() == bm.as_str(),
      | _ => false,
    }
  }
}

impl<P: PlatformTypes> Effect<P> {
  /// Borrow the message if this is an [`Effect::Send`]
  pub fn get_send(&self) -> Option<&Addrd<Message<P>>> {
    match self {
      | Self::Send(m) => Some(m),
      | _ => None,
    }
  }

  /// Is this an [`Effect::Send`] or [`Effect::SendDgram`]?
  pub fn is_send(&self) -> bool {
    matches!(self, Self::Send(_) | Self::SendDgram(_))
  }
}

/// Configures `eft` to use `Vec` for collections and
/// whatever clock and socket you provide.
#[cfg(feature = "alloc")]
#[derive(Copy)]
pub struct Alloc<Clk, Sock>(core::marker::PhantomData<(Clk, Sock)>)
  where Clk: Clock + 'static,
        Sock: Socket + 'static;

#[cfg(feature = "alloc")]
impl<Clk: Clock + 'static, Sock: Socket + 'static> core::fmt::Debug for Alloc<Clk, Sock> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "Alloc::<_, _>(_)")
  }
}

#[cfg(feature = "alloc")]
impl<Clk: Clock + 'static, Sock: Socket + 'static> Clone for Alloc<Clk, Sock> {
  fn clone(&self) -> Self {
    Self(Default::default())
  }
}

#[cfg(feature = "alloc")]
impl<Clk: Clock + Debug + 'static, Sock: Socket + Debug + 'static> PlatformTypes
  for Alloc<Clk, Sock>
{
  type MessagePayload = std_alloc::vec::Vec<u8>;
  type MessageOptions = std_alloc::collections::BTreeMap<eft_msg::OptNumber,
                                                          std_alloc::vec::Vec<eft_msg::OptValue<std_alloc::vec::Vec<u8>>>>;
  type Clock = Clk;
  type Socket = Sock;
  type Effects = std_alloc::vec::Vec<Effect<Self>>;
}

/// Configures `eft` to use `Vec` for collections,
/// `UdpSocket` for networking,
/// and [`crate::std::Clock`] for timing
#[cfg(feature = "std")]
pub type Std = Alloc<crate::std::Clock, ::std::net::UdpSocket>;
