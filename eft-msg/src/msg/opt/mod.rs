use eft_common::{AppendCopy, Array, Cursor, GetSize, Map, Reserve};

/// Errors that can occur while parsing option bytes
pub mod parse_error;
pub use parse_error::*;

/// Well-known option numbers & values
pub mod known;
pub use known::*;

/// # Option Number
///
/// Identifies which option an option value belongs to
/// (e.g. Content-Format has a Number of 12).
///
/// On the wire, numbers are expressed as the difference ("delta")
/// from the previous option's number; [`crate::TryFromBytes`] and
/// [`crate::TryIntoBytes`] convert between the two representations.
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct OptNumber(pub u32);

#[doc = "Whether or not this option may be ignored by a message recipient"]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum OptionMustBeProcessed {
  /// This option must be processed,
  /// and a response that ignores it
  /// will be rejected.
  ///
  /// Corresponds to the option being "critical"
  /// in strict CoAP terms
  Yes,
  /// This option does not _need_ to
  /// be processed,
  /// and a response that ignores it
  /// will be processed anyway.
  ///
  /// Corresponds to the option being "elective"
  /// in strict CoAP terms
  No,
}

#[doc = "Whether a proxy that does not understand this option may forward it"]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum WhenOptionUnsupportedByProxy {
  /// This option must be processed & understood by proxies
  /// and may not be forwarded blindly to their destination.
  ///
  /// Corresponds to the option being "UnSafe" to forward
  /// in strict CoAP terms
  Error,
  /// This option may not be processed & understood by proxies
  /// and may be forwarded blindly to their destination.
  ///
  /// Corresponds to the option being "SafeToForward"
  /// in strict CoAP terms
  Forward,
}

impl OptNumber {
  /// Whether or not this option may be ignored by a server
  pub fn must_be_processed(&self) -> OptionMustBeProcessed {
    #[allow(clippy::wildcard_in_or_patterns)] // will only ever be 0 or 1
    match self.0 & 0b1 {
      | 1 => OptionMustBeProcessed::Yes,
      | 0 | _ => OptionMustBeProcessed::No,
    }
  }

  /// Whether or not this option may be forwarded blindly by
  /// a proxy that does not support processing it
  pub fn when_unsupported_by_proxy(&self) -> WhenOptionUnsupportedByProxy {
    #[allow(clippy::wildcard_in_or_patterns)] // will only ever be 0 or 1
    match (self.0 & 0b10) >> 1 {
      | 1 => WhenOptionUnsupportedByProxy::Error,
      | 0 | _ => WhenOptionUnsupportedByProxy::Forward,
    }
  }
}

/// # Option Value
///
/// The bytes stored under an [`OptNumber`] in a message.
#[derive(Default, Clone, Hash, PartialEq, Eq, PartialOrd, Debug)]
pub struct OptValue<C>(pub C);

/// The collections backing the option storage of a
/// [`Message`](crate::Message).
///
/// Option values are kept in an ordered [`Map`] from [`OptNumber`] to a
/// small [`Array`] of values (repeatable options may occur more than
/// once). Because [`Map`] iteration is ascending by key, serializing a
/// message emits options in non-decreasing number order by
/// construction.
pub trait OptionMap
  where Self: Map<OptNumber, <Self as OptionMap>::OptValues>
              + Clone
              + core::fmt::Debug
              + PartialEq
{
  /// Byte collection backing a single option value
  type OptValue: Array<Item = u8> + AppendCopy<u8> + Clone + core::fmt::Debug + PartialEq + Default;

  /// Collection of the (possibly repeated) values stored under one
  /// number
  type OptValues: Array<Item = OptValue<<Self as OptionMap>::OptValue>>
    + Clone
    + core::fmt::Debug
    + PartialEq
    + Default;
}

#[cfg(feature = "alloc")]
impl OptionMap
  for std_alloc::collections::BTreeMap<OptNumber, std_alloc::vec::Vec<OptValue<std_alloc::vec::Vec<u8>>>>
{
  type OptValue = std_alloc::vec::Vec<u8>;
  type OptValues = std_alloc::vec::Vec<OptValue<std_alloc::vec::Vec<u8>>>;
}

impl<const VALUE_CAP: usize, const VALUES_CAP: usize, const NUM_OPTS: usize> OptionMap
  for tinyvec::ArrayVec<[(OptNumber,
                          tinyvec::ArrayVec<[OptValue<tinyvec::ArrayVec<[u8; VALUE_CAP]>>;
                            VALUES_CAP]>); NUM_OPTS]>
{
  type OptValue = tinyvec::ArrayVec<[u8; VALUE_CAP]>;
  type OptValues = tinyvec::ArrayVec<[OptValue<tinyvec::ArrayVec<[u8; VALUE_CAP]>>; VALUES_CAP]>;
}

/// Errors encounterable when setting an option on a message
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SetError {
  /// The option map has no room for another option
  CapacityExhausted,
  /// The value is longer than the value buffer can hold
  ValueTooLong,
  /// The value is not expressible in this option
  /// (e.g. a block number above 2^20 - 1)
  InvalidValue,
}

pub(crate) fn parse_opt_len_or_delta<A: AsRef<[u8]>>(head: u8,
                                                     bytes: &mut Cursor<A>,
                                                     reserved_err: OptParseError)
                                                     -> Result<u32, OptParseError> {
  match head {
    | 13 => {
      let n = bytes.next().ok_or_else(OptParseError::eof)?;
      Ok((n as u32) + 13)
    },
    | 14 => match bytes.take_exact(2) {
      | Some(&[a, b]) => Ok(u16::from_be_bytes([a, b]) as u32 + 269),
      | _ => Err(OptParseError::eof()),
    },
    | 15 => Err(reserved_err),
    | _ => Ok(head as u32),
  }
}

/// Consume the option section of an encoded message, yielding the
/// filled option map and whether the payload marker (0xFF) was seen.
///
/// A delta nibble of 15 is only legal when the length nibble is also
/// 15, i.e. when the whole byte is the payload marker.
pub(crate) fn try_consume_opts<A, O>(bytes: &mut Cursor<A>) -> Result<(O, bool), OptParseError>
  where A: AsRef<[u8]>,
        O: OptionMap
{
  let mut opts = O::default();
  let mut number = 0u32;

  loop {
    match bytes.next() {
      | None => return Ok((opts, false)),
      | Some(0b1111_1111) => return Ok((opts, true)),
      | Some(byte1) => {
        // NOTE: Delta **MUST** be consumed before the length extension
        let delta = parse_opt_len_or_delta(byte1 >> 4,
                                           bytes,
                                           OptParseError::OptionDeltaReservedValue(15))?;
        let len = parse_opt_len_or_delta(byte1 & 0b00001111,
                                         bytes,
                                         OptParseError::ValueLengthReservedValue(15))?
                  as usize;

        let mut value = O::OptValue::reserve(len);
        value.append_copy(bytes.take(len));

        if value.get_size() < len {
          return Err(OptParseError::UnexpectedEndOfStream);
        }

        number += delta;
        let number = OptNumber(number);
        let value = OptValue(value);

        if opts.has(&number) {
          if let Some(values) = opts.get_mut(&number) {
            if values.is_full() {
              return Err(OptParseError::TooManyOptions(number.0 as usize));
            }

            values.push(value);
          }
        } else {
          let mut values = O::OptValues::default();
          values.push(value);
          opts.insert(number, values)
              .map_err(|_| OptParseError::TooManyOptions(number.0 as usize))?;
        }
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  type Opts = std_alloc::collections::BTreeMap<OptNumber, Vec<OptValue<Vec<u8>>>>;

  #[test]
  fn parse_opt() {
    let mut bytes = Cursor::new([0b00010001, 0b00000001]);
    let (opts, marker) = try_consume_opts::<_, Opts>(&mut bytes).unwrap();
    assert_eq!(opts.get(&OptNumber(1)), Some(&vec![OptValue(vec![1])]));
    assert!(!marker);

    let mut bytes = Cursor::new([0b11010001, 0b00000001, 0b00000001]);
    let (opts, _) = try_consume_opts::<_, Opts>(&mut bytes).unwrap();
    assert_eq!(opts.get(&OptNumber(14)), Some(&vec![OptValue(vec![1])]));

    let mut bytes = Cursor::new([0b11100001, 0b00000000, 0b00000001, 0b00000001]);
    let (opts, _) = try_consume_opts::<_, Opts>(&mut bytes).unwrap();
    assert_eq!(opts.get(&OptNumber(270)), Some(&vec![OptValue(vec![1])]));
  }

  #[test]
  fn parse_accumulates_deltas() {
    let mut bytes = Cursor::new([0b00000001, 0b00000001, 0b00010001, 0b00000011, 0b11111111, 0b10101010]);
    let (opts, marker) = try_consume_opts::<_, Opts>(&mut bytes).unwrap();

    assert_eq!(opts.get(&OptNumber(0)), Some(&vec![OptValue(vec![1])]));
    assert_eq!(opts.get(&OptNumber(1)), Some(&vec![OptValue(vec![3])]));
    assert!(marker);
  }

  #[test]
  fn parse_repeated_options() {
    // two Uri-Path segments: 11, then delta 0
    let mut bytes = Cursor::new([0b10110001, b'a', 0b00000001, b'b']);
    let (opts, _) = try_consume_opts::<_, Opts>(&mut bytes).unwrap();
    assert_eq!(opts.get(&OptNumber(11)),
               Some(&vec![OptValue(vec![b'a']), OptValue(vec![b'b'])]));
  }

  #[test]
  fn parse_reserved_delta_is_err() {
    let mut bytes = Cursor::new([0b11110001, 0b00000001]);
    assert_eq!(try_consume_opts::<_, Opts>(&mut bytes),
               Err(OptParseError::OptionDeltaReservedValue(15)));
  }

  #[test]
  fn parse_reserved_length_is_err() {
    let mut bytes = Cursor::new([0b00011111, 0b00000001]);
    assert_eq!(try_consume_opts::<_, Opts>(&mut bytes),
               Err(OptParseError::ValueLengthReservedValue(15)));
  }

  #[test]
  fn parse_truncated_value_is_err() {
    let mut bytes = Cursor::new([0b00000011, 0b00000001]);
    assert_eq!(try_consume_opts::<_, Opts>(&mut bytes),
               Err(OptParseError::UnexpectedEndOfStream));
  }

  #[test]
  fn opt_number_qualities() {
    // critical, safe-to-fwd
    let if_match = OptNumber(1);

    // critical, unsafe-to-fwd
    let uri_host = OptNumber(3);

    // elective, safe-to-fwd
    let etag = OptNumber(4);
    let size1 = OptNumber(60);

    [&if_match, &uri_host].into_iter()
                          .for_each(|num| {
                            assert_eq!(num.must_be_processed(), OptionMustBeProcessed::Yes);
                          });

    [&etag, &size1].into_iter().for_each(|num| {
                                 assert_eq!(num.must_be_processed(), OptionMustBeProcessed::No);
                               });

    [&if_match, &etag, &size1].into_iter().for_each(|num| {
                                            assert_eq!(num.when_unsupported_by_proxy(),
                                                       WhenOptionUnsupportedByProxy::Forward);
                                          });

    [&uri_host].into_iter().for_each(|num| {
                             assert_eq!(num.when_unsupported_by_proxy(),
                                        WhenOptionUnsupportedByProxy::Error);
                           });
  }
}
