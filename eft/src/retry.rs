use core::ops::RangeInclusive;

use embedded_time::duration::Milliseconds;
use embedded_time::{Clock, Instant};
use rand::{Rng, SeedableRng};

use crate::time::Millis;

/// A non-blocking timer that drives either exponential-backoff
/// retransmission or a single fixed deadline, living alongside some
/// operation to retry.
///
/// It does not _contain_ the work to be done (e.g. `Box<fn()>`)
/// because we don't have the luxury of a memory allocator :)
///
/// ```
/// use embedded_time::clock::Clock;
/// use embedded_time::duration::Milliseconds;
/// use eft::retry;
///
/// # main();
/// fn main() {
///   let mut called = false;
///   let mut fails_once = || -> Result<(), ()> {
///     // ...
///     # if !called {
///     #   called = true;
///     #   Err(())
///     # } else {
///     #   Ok(())
///     # }
///   };
///
///   let clock = eft::std::Clock::new();
///   let now = || clock.try_now().unwrap();
///   let strategy = retry::Strategy::Exponential { init_min: Milliseconds(1),
///                                                 init_max: Milliseconds(2) };
///   let mut retry = retry::RetryTimer::new(now(), strategy, retry::Attempts(2));
///
///   while let Err(_) = fails_once() {
///     match nb::block!(retry.what_should_i_do(now())) {
///       | Ok(retry::YouShould::Retry) => continue,
///       | Ok(retry::YouShould::Cry) => panic!("no more attempts! it failed more than once!!"),
///       | Err(_) => unreachable!(),
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryTimer<C: Clock<T = u64>> {
  start: Instant<C>,
  init: Millis,
  strategy: Strategy,
  attempts: Attempts,
  max_attempts: Attempts,
}

/// A number of attempts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Attempts(pub u16);

/// Result of [`RetryTimer::what_should_i_do`].
///
/// This tells you if a retry should be attempted or not.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum YouShould {
  /// Attempts have been exhausted and the work that is
  /// being retried should be considered poisoned.
  Cry,
  /// A retry should be performed
  Retry,
}

impl<C: Clock<T = u64>> RetryTimer<C> {
  /// Create a new retrier
  pub fn new(start: Instant<C>, strategy: Strategy, max_attempts: Attempts) -> Self {
    Self { start,
           strategy,
           init: if strategy.has_jitter() {
             let seed = Milliseconds::<u64>::try_from(start.duration_since_epoch()).map(|Milliseconds(ms)| ms)
                                                                                   .unwrap_or(0);
             let mut rand = rand_chacha::ChaCha8Rng::seed_from_u64(seed);

             Milliseconds(rand.gen_range(strategy.range()))
           } else {
             Milliseconds(*strategy.range().start())
           },
           max_attempts,
           attempts: Attempts(1) }
  }

  /// When the thing we keep trying fails, invoke this to
  /// tell the retrytimer "it failed again! what do I do??"
  ///
  /// Returns `nb::Error::WouldBlock` when we have not yet
  /// waited the appropriate amount of time to retry.
  pub fn what_should_i_do(&mut self,
                          now: Instant<C>)
                          -> nb::Result<YouShould, core::convert::Infallible> {
    let time_passed: Millis = (now - self.start).try_into().unwrap_or(Milliseconds(u64::MAX));

    if !self.is_ready(time_passed) {
      return Err(nb::Error::WouldBlock);
    }

    if self.attempts >= self.max_attempts {
      Ok(YouShould::Cry)
    } else {
      self.attempts.0 += 1;
      Ok(YouShould::Retry)
    }
  }

  /// Check if the strategy says an appropriate time has passed
  pub fn is_ready(&self, Milliseconds(time_passed): Millis) -> bool {
    match self.strategy {
      | Strategy::Exponential { .. } => {
        time_passed >= Strategy::total_delay_exp(self.init, self.attempts.0)
      },
      | Strategy::Deadline { after: Milliseconds(after) } => time_passed >= after,
    }
  }
}

/// Strategy to employ when retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Generate a random delay between `init_min` and `init_max`,
  /// and wait until this delay has passed between attempts.
  ///
  /// After each failed attempt, double the delay before retrying
  /// again.
  Exponential {
    /// Minimum (inclusive) delay for second attempt
    init_min: Millis,
    /// Maximum (inclusive) delay for second attempt
    init_max: Millis,
  },
  /// Never retry; wait until `after` has passed since the first
  /// attempt, then give up.
  Deadline {
    /// How long to wait before poisoning the work
    after: Millis,
  },
}

impl Strategy {
  /// Are min & max delays the same? if so, we should probably skip the
  /// random number generation.
  pub fn has_jitter(&self) -> bool {
    let rng = self.range();
    rng.start() != rng.end()
  }

  /// Get the min & max durations as an inclusive range
  pub fn range(&self) -> RangeInclusive<u64> {
    match self {
      | &Self::Exponential { init_min: Milliseconds(min),
                             init_max: Milliseconds(max), } => (min..=max),
      | &Self::Deadline { after: Milliseconds(after) } => (after..=after),
    }
  }

  /// Get the amount of time this strategy will take if all attempts
  /// fail
  pub fn max_time(&self, max_attempts: Attempts) -> Millis {
    Milliseconds(match self {
                   | Self::Exponential { init_max, .. } => {
                     Self::total_delay_exp(*init_max, max_attempts.0)
                   },
                   | Self::Deadline { after: Milliseconds(after) } => *after,
                 })
  }

  /// Given the initial delay and the number of attempts performed so
  /// far, yields the total time that must have passed since the first
  /// attempt before the next retry fires.
  const fn total_delay_exp(Milliseconds(init): Millis, attempt: u16) -> u64 {
    // | attempt | total delay       |
    // | 1       | init              |
    // | 2       | init * 3          |
    // | 3       | init * 7          |
    // | ...     | ...               |
    // | n       | init * (2^n - 1)  |
    init * (2u64.pow(attempt as u32) - 1)
  }
}

#[cfg(test)]
mod test {
  use embedded_time::rate::Fraction;

  use super::*;

  pub struct FakeClock(pub *const u64);
  impl FakeClock {
    pub fn new(time_ptr: *const u64) -> Self {
      Self(time_ptr)
    }
  }

  impl Clock for FakeClock {
    type T = u64;

    const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

    fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
      unsafe { Ok(Instant::new(*self.0)) }
    }
  }

  #[test]
  fn exponential_retrier_doubles_gaps() {
    #![allow(unused_assignments)]

    let mut time_millis = 0u64;
    let clock = FakeClock::new(&time_millis as *const _);
    let now = || clock.try_now().unwrap();
    let mut retry = RetryTimer::new(now(),
                                    Strategy::Exponential { init_min: Milliseconds(1000),
                                                            init_max: Milliseconds(1000) },
                                    Attempts(3));

    // attempt 1 happens before asking what_should_i_do

    time_millis = 999;
    assert_eq!(retry.what_should_i_do(now()).unwrap_err(),
               nb::Error::WouldBlock);

    time_millis = 1000;
    assert_eq!(retry.what_should_i_do(now()).unwrap(), YouShould::Retry);
    // Fails again (attempt 2)

    time_millis = 2999;
    assert_eq!(retry.what_should_i_do(now()).unwrap_err(),
               nb::Error::WouldBlock);

    time_millis = 3000;
    assert_eq!(retry.what_should_i_do(now()).unwrap(), YouShould::Retry);
    // Fails again (attempt 3)

    time_millis = 6999;
    assert_eq!(retry.what_should_i_do(now()).unwrap_err(),
               nb::Error::WouldBlock);

    time_millis = 7000;
    assert_eq!(retry.what_should_i_do(now()).unwrap(), YouShould::Cry);
  }

  #[test]
  fn deadline_waits_then_cries() {
    #![allow(unused_assignments)]

    let mut time_millis = 0u64;
    let clock = FakeClock::new(&time_millis as *const _);
    let now = || clock.try_now().unwrap();
    let mut retry = RetryTimer::new(now(),
                                    Strategy::Deadline { after: Milliseconds(5000) },
                                    Attempts(1));

    time_millis = 4999;
    assert_eq!(retry.what_should_i_do(now()).unwrap_err(),
               nb::Error::WouldBlock);

    time_millis = 5000;
    assert_eq!(retry.what_should_i_do(now()).unwrap(), YouShould::Cry);
  }

  #[test]
  fn initial_delay_is_within_jitter_range() {
    let time_millis = 12_345u64;
    let clock = FakeClock::new(&time_millis as *const _);
    let retry = RetryTimer::new(clock.try_now().unwrap(),
                                Strategy::Exponential { init_min: Milliseconds(2000),
                                                        init_max: Milliseconds(3000) },
                                Attempts(5));

    assert!(retry.init.0 >= 2000 && retry.init.0 <= 3000);
  }

  #[test]
  fn exp_calculation() {
    let init = Milliseconds(100);
    assert_eq!(Strategy::total_delay_exp(init, 1), 100);
    assert_eq!(Strategy::total_delay_exp(init, 2), 300);
    assert_eq!(Strategy::total_delay_exp(init, 3), 700);
  }
}
