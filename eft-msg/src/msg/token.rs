/// # Token
///
/// 0-8 bytes of opaque data used to correlate requests and responses
/// across message-id boundaries; the "request id" of CoAP.
///
/// Contrast with [`Id`](crate::Id), which correlates ACK/RST messages
/// with the Confirmable/Non-confirmable message they answer and is
/// used for deduplication.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Token(pub tinyvec::ArrayVec<[u8; 8]>);

impl Token {
  /// How many bytes are in this token? (0..=8)
  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Is this a zero-length token?
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}
