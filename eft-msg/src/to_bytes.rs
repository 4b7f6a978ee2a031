use eft_common::{Array, GetSize};
use tinyvec::ArrayVec;

use crate::*;

/// Trait allowing fallible conversion into bytes
pub trait TryIntoBytes {
  /// Error type yielded if conversion fails
  type Error;

  /// Try to convert into a collection of bytes
  ///
  /// ```
  /// use eft_msg::{Code, Id, Token, Type, TryIntoBytes};
  ///
  /// let msg = eft_msg::alloc::Message::new(Type::Con,
  ///                                        Code::GET,
  ///                                        Id(1),
  ///                                        Token(Default::default()));
  ///
  /// let bytes: Vec<u8> = msg.try_into_bytes().unwrap();
  /// assert_eq!(bytes, vec![0b0100_0000, 0b0000_0001, 0, 1]);
  /// ```
  fn try_into_bytes<C: Array<Item = u8>>(self) -> Result<C, Self::Error>;
}

/// Errors encounterable serializing to bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MessageToBytesError {
  /// Reserved capacity was not enough for size of message
  TooLong {
    /// Maximum size of the byte buffer
    capacity: usize,
    /// Encoded size of the message
    size: usize,
  },
  /// The gap between 2 adjacent option numbers exceeds the encodable
  /// maximum (65804)
  OptionDeltaTooLarge(u32),
  /// An option value exceeds the encodable maximum length (65804)
  OptionValueTooLong(usize),
}

pub(crate) fn opt_len_or_delta(val: u32) -> (u8, Option<ArrayVec<[u8; 2]>>) {
  match val {
    | n if n >= 269 => {
      let mut bytes = ArrayVec::new();
      bytes.extend(((n - 269) as u16).to_be_bytes());
      (14, Some(bytes))
    },
    | n if n >= 13 => {
      let mut bytes = ArrayVec::new();
      bytes.push((n as u8) - 13);
      (13, Some(bytes))
    },
    | n => (n as u8, None),
  }
}

impl<PayloadBytes: Array<Item = u8> + eft_common::AppendCopy<u8>, Options: OptionMap> TryIntoBytes
  for Message<PayloadBytes, Options>
{
  type Error = MessageToBytesError;

  fn try_into_bytes<C: Array<Item = u8>>(self) -> Result<C, Self::Error> {
    let size: usize = self.get_size();
    let mut bytes = C::reserve(size);

    if let Some(max) = bytes.max_size() {
      if max < size {
        return Err(Self::Error::TooLong { capacity: max,
                                          size });
      }
    }

    let Message { id,
                  ty,
                  ver,
                  token,
                  code,
                  opts,
                  payload, } = self;

    let byte1: u8 = Byte1 { tkl: token.0.len() as u8,
                            ver,
                            ty }.into();
    let code: u8 = code.into();
    let id: [u8; 2] = id.into();

    bytes.extend(Some(byte1));
    bytes.extend(Some(code));
    bytes.extend(id);
    bytes.extend(token.0);

    let mut last = 0u32;
    for (num, values) in opts.into_iter() {
      for value in values.into_iter() {
        let delta = num.0 - last;
        if delta > 65804 {
          return Err(Self::Error::OptionDeltaTooLarge(num.0));
        }

        let len = value.0.get_size();
        if len > 65804 {
          return Err(Self::Error::OptionValueTooLong(len));
        }

        let (del, del_bytes) = opt_len_or_delta(delta);
        let (len_nibble, len_bytes) = opt_len_or_delta(len as u32);
        let header = (del << 4) | len_nibble;

        bytes.extend(Some(header));

        if let Some(bs) = del_bytes {
          bytes.extend(bs);
        }

        if let Some(bs) = len_bytes {
          bytes.extend(bs);
        }

        bytes.extend(value.0);
        last = num.0;
      }
    }

    if !payload.0.size_is_zero() {
      bytes.extend(Some(0b11111111));
      bytes.extend(payload.0);
    }

    Ok(bytes)
  }
}

impl From<Id> for [u8; 2] {
  fn from(id: Id) -> [u8; 2] {
    id.0.to_be_bytes()
  }
}

impl From<Byte1> for u8 {
  fn from(b: Byte1) -> u8 {
    let ver = b.ver.0 << 6;
    let ty = u8::from(b.ty) << 4;
    let tkl = b.tkl;

    ver | ty | tkl
  }
}
