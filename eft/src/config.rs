use crate::time::Millis;
use embedded_time::duration::Milliseconds;

/// The `ACK_RANDOM_FACTOR` ratio, expressed as a fraction so that no
/// floating point support is required.
///
/// Invariant: `numerator > denominator` (the factor is > 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AckRandomFactor {
  /// Numerator of the factor (default 3)
  pub numerator: u16,
  /// Denominator of the factor (default 2)
  pub denominator: u16,
}

impl Default for AckRandomFactor {
  fn default() -> Self {
    Self { numerator: 3,
           denominator: 2 }
  }
}

/// Runtime config
///
/// The transmission parameters of RFC7252 section 4.8 plus a couple of
/// eft-specific seeds and ceilings.
///
/// ```
/// use eft::config::Config;
///
/// let config = Config::default();
/// assert_eq!(config.ack_timeout.0, 2_000);
/// assert_eq!(config.max_retransmit, 4);
/// assert_eq!(config.max_block_szx, 6);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Config {
  /// `ACK_TIMEOUT`: the lower bound of the first retransmission delay
  /// for Confirmable messages.
  ///
  /// Defaults to 2 seconds.
  pub ack_timeout: Millis,

  /// `ACK_RANDOM_FACTOR`: multiplied with [`Self::ack_timeout`] this
  /// yields the upper bound of the first retransmission delay.
  ///
  /// Defaults to 3/2.
  pub ack_random_factor: AckRandomFactor,

  /// `MAX_RETRANSMIT`: the number of times a Confirmable message is
  /// retransmitted before the transaction times out.
  ///
  /// Defaults to 4.
  pub max_retransmit: u16,

  /// Seed for the monotonically increasing message-id counter.
  ///
  /// The default value is 0, although you should ideally set this
  /// to something distinct per device (random integer, machine
  /// identifier) to make ids less guessable.
  pub msg_id_seed: u16,

  /// Seed for generated request tokens, same guidance as
  /// [`Self::msg_id_seed`].
  pub token_seed: u16,

  /// Largest block size exponent (`SZX`) this endpoint will use for
  /// block-wise transfers; block size in bytes is `2^(SZX + 4)`.
  ///
  /// Defaults to 6 (1024-byte blocks).
  pub max_block_szx: u8,
}

impl Default for Config {
  fn default() -> Self {
    Config { ack_timeout: Milliseconds(2_000),
             ack_random_factor: AckRandomFactor::default(),
             max_retransmit: 4,
             msg_id_seed: 0,
             token_seed: 0,
             max_block_szx: 6 }
  }
}

impl Config {
  /// The inclusive range the first Confirmable retransmission delay is
  /// uniformly drawn from:
  /// `[ACK_TIMEOUT, ACK_TIMEOUT * ACK_RANDOM_FACTOR]`.
  pub fn initial_retry_delay(&self) -> (Millis, Millis) {
    let min = self.ack_timeout.0;
    let max = (min * self.ack_random_factor.numerator as u64)
              / self.ack_random_factor.denominator as u64;

    (Milliseconds(min), Milliseconds(max))
  }

  /// `MAX_TRANSMIT_SPAN`: the time from the first transmission of a
  /// Confirmable message to its last retransmission.
  ///
  /// `ACK_TIMEOUT * (2^MAX_RETRANSMIT - 1) * ACK_RANDOM_FACTOR`
  pub fn max_transmit_span_millis(&self) -> u64 {
    self.ack_timeout.0 * (2u64.pow(self.max_retransmit as u32) - 1)
    * self.ack_random_factor.numerator as u64
    / self.ack_random_factor.denominator as u64
  }

  /// `MAX_TRANSMIT_WAIT`: the time from the first transmission of a
  /// Confirmable message to the time the sender gives up on receiving
  /// a response.
  ///
  /// `ACK_TIMEOUT * (2^(MAX_RETRANSMIT + 1) - 1) * ACK_RANDOM_FACTOR`
  pub fn max_transmit_wait_millis(&self) -> u64 {
    self.ack_timeout.0 * (2u64.pow(self.max_retransmit as u32 + 1) - 1)
    * self.ack_random_factor.numerator as u64
    / self.ack_random_factor.denominator as u64
  }

  /// `MAX_LATENCY`: the assumed maximum time a datagram takes from the
  /// start of transmission to completion of reception (100 seconds).
  pub fn max_latency_millis(&self) -> u64 {
    100_000
  }

  /// `PROCESSING_DELAY`: the assumed time a node takes to turn around
  /// a Confirmable message into an acknowledgement
  /// (equal to `ACK_TIMEOUT`).
  pub fn processing_delay_millis(&self) -> u64 {
    self.ack_timeout.0
  }

  /// `EXCHANGE_LIFETIME`: how long a message id must not be reused;
  /// the lifetime of entries in the server-side response dedup cache.
  ///
  /// `MAX_TRANSMIT_SPAN + 2 * MAX_LATENCY + PROCESSING_DELAY`
  pub fn exchange_lifetime_millis(&self) -> u64 {
    self.max_transmit_span_millis() + (2 * self.max_latency_millis())
    + self.processing_delay_millis()
  }
}
