use crate::net::Socket;
use crate::platform::PlatformTypes;
use crate::step::ErrorKind;

/// Errors surfaced to users of [`Core`](crate::core::Core).
///
/// Transaction outcomes (`Timeout`, `Abort`) reach response handlers
/// exactly once; everything else is returned from the method that
/// failed.
pub enum Error<P: PlatformTypes> {
  /// The transaction's retransmission budget was spent without hearing
  /// back from the peer.
  Timeout,
  /// The transaction was aborted: the peer sent a Reset, or
  /// [`Core::abort`](crate::core::Core::abort) was invoked.
  ///
  /// Note that a Reset is the *expected* answer to a CoAP ping.
  Abort,
  /// A block-wise transfer is already in flight in that direction.
  Busy,
  /// A fixed-capacity buffer has no room for this transaction.
  NoBufs,
  /// The outbound message could not be serialized.
  ToBytes(eft_msg::to_bytes::MessageToBytesError),
  /// The socket failed.
  Socket(<<P as PlatformTypes>::Socket as Socket>::Error),
  /// The system clock failed.
  Clock(embedded_time::clock::Error),
  /// A step failed in some other way (already logged with more
  /// detail).
  Step(ErrorKind),
}

impl<P: PlatformTypes> Error<P> {
  pub(crate) fn of_step_kind(kind: ErrorKind) -> Self {
    match kind {
      | ErrorKind::Timeout => Self::Timeout,
      | ErrorKind::Abort => Self::Abort,
      | ErrorKind::Busy => Self::Busy,
      | ErrorKind::Capacity => Self::NoBufs,
      | kind => Self::Step(kind),
    }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Error<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    match self {
      | Self::Timeout => f.debug_struct("Timeout").finish(),
      | Self::Abort => f.debug_struct("Abort").finish(),
      | Self::Busy => f.debug_struct("Busy").finish(),
      | Self::NoBufs => f.debug_struct("NoBufs").finish(),
      | Self::ToBytes(e) => f.debug_tuple("ToBytes").field(e).finish(),
      | Self::Socket(e) => f.debug_tuple("Socket").field(e).finish(),
      | Self::Clock(e) => f.debug_tuple("Clock").field(e).finish(),
      | Self::Step(k) => f.debug_tuple("Step").field(k).finish(),
    }
  }
}
