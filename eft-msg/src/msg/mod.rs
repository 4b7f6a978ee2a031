use eft_common::{AppendCopy, Array, Cursor, GetSize};

/// Message Code
pub mod code;

/// Message parsing errors
pub mod parse_error;

/// Message ID
pub mod id;

/// Message Options
pub mod opt;

/// Message Type
pub mod ty;

/// Message Token
pub mod token;

/// Message Version
pub mod ver;

/// Typed option accessors
pub mod ext;

pub use code::*;
pub use ext::*;
pub use id::*;
pub use opt::*;
pub use parse_error::*;
pub use token::*;
pub use ty::*;
pub use ver::*;

use crate::from_bytes::TryConsumeBytes;
use crate::TryFromBytes;

/// The payload of a message; the request or response body.
#[derive(Clone, Debug, PartialEq, PartialOrd, Default)]
pub struct Payload<C>(pub C);

/// Struct representing the first byte of a message.
///
/// ```text
/// CoAP version
/// |
/// |  Message type (request, response, empty)
/// |  |
/// |  |  Length of token, in bytes. (4-bit integer)
/// |  |  |
/// vv vv vvvv
/// 01 00 0000
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub(crate) struct Byte1 {
  pub(crate) ver: Version,
  pub(crate) ty: Type,
  pub(crate) tkl: u8,
}

impl TryFrom<u8> for Byte1 {
  type Error = MessageParseError;

  fn try_from(b: u8) -> Result<Self, Self::Error> {
    let ver = b >> 6; // bits 0 & 1
    let ty = b >> 4 & 0b11; // bits 2 & 3
    let tkl = b & 0b1111u8; // last 4 bits

    Ok(Byte1 { ver: Version(ver),
               ty: Type::try_from(ty)?,
               tkl })
  }
}

/// # `Message` struct
/// Low-level representation of a message that has been parsed from the
/// raw binary format.
///
/// Note that `Message` is generic over 2 collections:
///  - `PayloadBytes`: the byte buffer used to store the message's
///    [`Payload`]
///  - `Options`: the [`OptionMap`] storing the message's options
///
/// Messages support both serializing to bytes and from bytes, by using
/// the provided [`TryFromBytes`] and [`crate::TryIntoBytes`] traits.
///
/// ```
/// use eft_msg::TryFromBytes;
/// use eft_msg::*;
/// # //                       version  token len  code (2.05 Content)
/// # //                       |        |          /
/// # //                       |  type  |         /  message ID
/// # //                       |  |     |        |   |
/// # //                       vv vv vvvv vvvvvvvv vvvvvvvvvvvvvvvv
/// # let header: [u8; 4] = 0b_01_00_0001_01000101_0000000000000001u32.to_be_bytes();
/// # let token: [u8; 1] = [254u8];
/// # let content_format: &[u8] = b"application/json";
/// # let options: [&[u8]; 2] = [&[0b_1100_1101u8, 0b00000011u8], content_format];
/// # let payload: [&[u8]; 2] = [&[0b_11111111u8], b"hello, world!"];
/// let packet: Vec<u8> = /* bytes! */
/// # [header.as_ref(), token.as_ref(), options.concat().as_ref(), payload.concat().as_ref()].concat();
///
/// let msg = eft_msg::alloc::Message::try_from_bytes(packet).unwrap();
///
/// assert_eq!(msg.code, Code { class: 2, detail: 5 });
/// assert_eq!(&msg.payload.0, b"hello, world!");
/// ```
#[derive(Clone, PartialEq, Debug)]
pub struct Message<PayloadBytes, Options> {
  /// see [`Id`] for details
  pub id: Id,
  /// see [`Type`] for details
  pub ty: Type,
  /// see [`Version`] for details
  pub ver: Version,
  /// see [`Token`] for details
  pub token: Token,
  /// see [`Code`] for details
  pub code: Code,
  /// see [`OptionMap`] for details
  pub opts: Options,
  /// see [`Payload`]
  pub payload: Payload<PayloadBytes>,
}

impl<PayloadBytes: Array<Item = u8> + AppendCopy<u8>, Options: OptionMap>
  Message<PayloadBytes, Options>
{
  /// Create a new message with an empty option map and payload
  pub fn new(ty: Type, code: Code, id: Id, token: Token) -> Self {
    Self { id,
           ty,
           code,
           token,
           ver: Default::default(),
           opts: Default::default(),
           payload: Payload(Default::default()) }
  }

  /// Create the Empty Acknowledgement for this message.
  ///
  /// The ACK echoes this message's [`Id`] and carries no token,
  /// no options and no payload.
  pub fn ack(&self) -> Self {
    Self::new(Type::Ack, Code::EMPTY, self.id, Token(Default::default()))
  }

  /// Create an Empty Reset message answering the message with id `id`.
  pub fn reset(id: Id) -> Self {
    Self::new(Type::Reset, Code::EMPTY, id, Token(Default::default()))
  }
}

impl<PayloadBytes: Array<Item = u8> + AppendCopy<u8>, Options: OptionMap> GetSize
  for Message<PayloadBytes, Options>
{
  fn get_size(&self) -> usize {
    let header_size = 4;
    let token_size = self.token.0.len();

    let mut opts_size = 0;
    let mut last = 0u32;
    for (num, values) in self.opts.iter() {
      for value in values.iter() {
        let delta = num.0 - last;
        let delta_size = match delta {
          | n if n >= 269 => 2,
          | n if n >= 13 => 1,
          | _ => 0,
        };
        let len = value.0.get_size();
        let len_size = match len {
          | n if n >= 269 => 2,
          | n if n >= 13 => 1,
          | _ => 0,
        };

        opts_size += 1 + delta_size + len_size + len;
        last = num.0;
      }
    }

    let payload_size = match self.payload.0.get_size() {
      | 0 => 0,
      | n => 1 + n,
    };

    header_size + token_size + opts_size + payload_size
  }

  fn max_size(&self) -> Option<usize> {
    None
  }

  fn is_full(&self) -> bool {
    false
  }
}

impl<Bytes: AsRef<[u8]>,
      PayloadBytes: Array<Item = u8> + AppendCopy<u8>,
      Options: OptionMap> TryFromBytes<Bytes> for Message<PayloadBytes, Options>
{
  type Error = MessageParseError;

  fn try_from_bytes(bytes: Bytes) -> Result<Self, Self::Error> {
    let mut bytes = Cursor::new(bytes);

    let Byte1 { tkl, ty, ver } = bytes.next()
                                      .ok_or_else(MessageParseError::eof)?
                                      .try_into()?;

    if tkl > 8 {
      return Err(Self::Error::InvalidTokenLength(tkl));
    }

    let code: Code = bytes.next().ok_or_else(MessageParseError::eof)?.into();
    let id: Id = Id::try_consume_bytes(&mut bytes)?;

    let token = bytes.take_exact(tkl as usize)
                     .ok_or_else(MessageParseError::eof)?;
    let token = tinyvec::ArrayVec::<[u8; 8]>::try_from(token).expect("tkl was checked to be <= 8");
    let token = Token(token);

    let (opts, saw_payload_marker) =
      opt::try_consume_opts::<_, Options>(&mut bytes).map_err(Self::Error::OptParseError)?;

    if saw_payload_marker && bytes.remaining() == 0 {
      return Err(Self::Error::PayloadMarkerWithoutPayload);
    }

    if code == Code::EMPTY && (tkl > 0 || saw_payload_marker) {
      return Err(Self::Error::InvalidEmpty);
    }

    let mut payload = PayloadBytes::reserve(bytes.remaining());
    payload.append_copy(bytes.take_until_end());
    let payload = Payload(payload);

    Ok(Message { id,
                 ty,
                 ver,
                 code,
                 token,
                 opts,
                 payload })
  }
}
