use eft_common::{Array, GetSize, InsertError, Map};

use crate::{no_repeat, repeat};
use crate::{Block, ContentFormat, Message, OptNumber, OptValue, OptionMap, SetError};

fn collect_value<O: OptionMap>(value: impl IntoIterator<Item = u8>)
                               -> Result<OptValue<O::OptValue>, SetError> {
  let mut bytes = O::OptValue::default();

  for b in value.into_iter() {
    if bytes.is_full() {
      return Err(SetError::ValueTooLong);
    }

    bytes.push(b);
  }

  Ok(OptValue(bytes))
}

/// Typed accessors over the option map of a [`Message`].
///
/// ```
/// use eft_msg::alloc::Message;
/// use eft_msg::{Code, Id, MessageOptions, Token, Type};
///
/// let mut msg = Message::new(Type::Con, Code::GET, Id(1), Token(Default::default()));
/// msg.set_path("sensors/temperature").unwrap();
/// msg.set_block2(1024, 0, false).unwrap();
///
/// assert_eq!(msg.path_segments().collect::<Vec<_>>(),
///            vec!["sensors", "temperature"]);
/// assert_eq!(msg.block2().unwrap().size(), 1024);
/// ```
pub trait MessageOptions<O: OptionMap> {
  /// Store `value` under option number `num`, replacing any existing
  /// values.
  fn set(&mut self, num: OptNumber, value: impl IntoIterator<Item = u8>) -> Result<(), SetError>;

  /// Add another `value` under the (repeatable) option number `num`.
  fn add(&mut self, num: OptNumber, value: impl IntoIterator<Item = u8>) -> Result<(), SetError>;

  /// All values stored under `num`.
  fn get(&self, num: OptNumber) -> Option<&O::OptValues>;

  /// The first value stored under `num`.
  fn get_first(&self, num: OptNumber) -> Option<&OptValue<O::OptValue>>;

  /// Remove (and yield) all values stored under `num`.
  fn remove(&mut self, num: OptNumber) -> Option<O::OptValues>;

  /// Store an unsigned integer option in the RFC7252 minimal
  /// big-endian encoding (leading zero bytes stripped; zero is encoded
  /// as the empty value).
  fn set_uint(&mut self, num: OptNumber, value: u32) -> Result<(), SetError>;

  /// Read an unsigned integer option.
  ///
  /// Yields `None` when the option is absent or wider than 4 bytes.
  fn uint(&self, num: OptNumber) -> Option<u32>;

  /// Set the Uri-Path, one option per non-empty `/`-separated segment.
  fn set_path(&mut self, path: &str) -> Result<(), SetError>;

  /// The Uri-Path segments in order.
  ///
  /// Segments that are not UTF-8 are skipped.
  fn path_segments(&self) -> PathSegments<'_, O>;

  /// Read a Block1 or Block2 option by number.
  ///
  /// Yields `None` when absent or malformed (wider than 3 bytes).
  fn block(&self, num: OptNumber) -> Option<Block>;

  /// The Block1 option (request body fragmentation)
  fn block1(&self) -> Option<Block> {
    self.block(no_repeat::BLOCK1)
  }

  /// The Block2 option (response body fragmentation)
  fn block2(&self) -> Option<Block> {
    self.block(no_repeat::BLOCK2)
  }

  /// Set the Block1 option. Fails with [`SetError::InvalidValue`] when
  /// `num` exceeds [`Block::MAX_NUM`].
  fn set_block1(&mut self, size: u16, num: u32, more: bool) -> Result<(), SetError>;

  /// Set the Block2 option. Fails with [`SetError::InvalidValue`] when
  /// `num` exceeds [`Block::MAX_NUM`].
  fn set_block2(&mut self, size: u16, num: u32, more: bool) -> Result<(), SetError>;

  /// The Size1 option (total size of a fragmented request body)
  fn size1(&self) -> Option<u32> {
    self.uint(no_repeat::SIZE1)
  }

  /// Set the Size1 option
  fn set_size1(&mut self, size: u32) -> Result<(), SetError> {
    self.set_uint(no_repeat::SIZE1, size)
  }

  /// The Size2 option (total size of a fragmented response body)
  fn size2(&self) -> Option<u32> {
    self.uint(no_repeat::SIZE2)
  }

  /// Set the Size2 option
  fn set_size2(&mut self, size: u32) -> Result<(), SetError> {
    self.set_uint(no_repeat::SIZE2, size)
  }

  /// The Content-Format option
  fn content_format(&self) -> Option<ContentFormat> {
    self.uint(no_repeat::CONTENT_FORMAT)
        .map(|n| ContentFormat::from(n as u16))
  }

  /// Set the Content-Format option
  fn set_content_format(&mut self, format: ContentFormat) -> Result<(), SetError> {
    self.set_uint(no_repeat::CONTENT_FORMAT, u16::from(&format) as u32)
  }

  /// The Accept option
  fn accept(&self) -> Option<ContentFormat> {
    self.uint(no_repeat::ACCEPT).map(|n| ContentFormat::from(n as u16))
  }

  /// Set the Accept option
  fn set_accept(&mut self, format: ContentFormat) -> Result<(), SetError> {
    self.set_uint(no_repeat::ACCEPT, u16::from(&format) as u32)
  }
}

/// Iterator over the Uri-Path segments of a message,
/// yielded by [`MessageOptions::path_segments`].
#[derive(Debug)]
pub struct PathSegments<'a, O: OptionMap> {
  values: Option<core::slice::Iter<'a, OptValue<O::OptValue>>>,
}

impl<'a, O: OptionMap> Iterator for PathSegments<'a, O> {
  type Item = &'a str;

  fn next(&mut self) -> Option<&'a str> {
    let values = self.values.as_mut()?;

    loop {
      match values.next() {
        | None => return None,
        | Some(v) => match core::str::from_utf8(&v.0) {
          | Ok(seg) => return Some(seg),
          | Err(_) => continue,
        },
      }
    }
  }
}

impl<P, O> MessageOptions<O> for Message<P, O>
  where P: Array<Item = u8> + eft_common::AppendCopy<u8>,
        O: OptionMap
{
  fn set(&mut self, num: OptNumber, value: impl IntoIterator<Item = u8>) -> Result<(), SetError> {
    let value = collect_value::<O>(value)?;
    let mut values = O::OptValues::default();
    values.push(value);

    match self.opts.insert(num, values) {
      | Ok(()) | Err(InsertError::Exists(_)) => Ok(()),
      | Err(InsertError::CapacityExhausted) => Err(SetError::CapacityExhausted),
    }
  }

  fn add(&mut self, num: OptNumber, value: impl IntoIterator<Item = u8>) -> Result<(), SetError> {
    let value = collect_value::<O>(value)?;

    if self.opts.has(&num) {
      if let Some(values) = self.opts.get_mut(&num) {
        if values.is_full() {
          return Err(SetError::CapacityExhausted);
        }

        values.push(value);
      }

      Ok(())
    } else {
      let mut values = O::OptValues::default();
      values.push(value);

      self.opts
          .insert(num, values)
          .map_err(|_| SetError::CapacityExhausted)
    }
  }

  fn get(&self, num: OptNumber) -> Option<&O::OptValues> {
    Map::get(&self.opts, &num)
  }

  fn get_first(&self, num: OptNumber) -> Option<&OptValue<O::OptValue>> {
    self.get(num).and_then(|values| values.first())
  }

  fn remove(&mut self, num: OptNumber) -> Option<O::OptValues> {
    Map::remove(&mut self.opts, &num)
  }

  fn set_uint(&mut self, num: OptNumber, value: u32) -> Result<(), SetError> {
    let bytes = value.to_be_bytes();
    let zeroes = bytes.iter().take_while(|b| **b == 0).count();

    self.set(num, bytes[zeroes..].iter().copied())
  }

  fn uint(&self, num: OptNumber) -> Option<u32> {
    self.get_first(num).and_then(|v| {
                         if v.0.get_size() > 4 {
                           return None;
                         }

                         Some(v.0.iter().fold(0u32, |n, b| (n << 8) | (*b as u32)))
                       })
  }

  fn set_path(&mut self, path: &str) -> Result<(), SetError> {
    self.remove(repeat::PATH);

    for seg in path.split('/').filter(|seg| !seg.is_empty()) {
      self.add(repeat::PATH, seg.bytes())?;
    }

    Ok(())
  }

  fn path_segments(&self) -> PathSegments<'_, O> {
    PathSegments { values: self.get(repeat::PATH).map(|values| values.iter()) }
  }

  fn block(&self, num: OptNumber) -> Option<Block> {
    self.get_first(num).and_then(|v| {
                         if v.0.get_size() > 3 {
                           return None;
                         }

                         let raw = v.0.iter().fold(0u32, |n, b| (n << 8) | (*b as u32));
                         Some(Block::from(raw))
                       })
  }

  fn set_block1(&mut self, size: u16, num: u32, more: bool) -> Result<(), SetError> {
    if num > Block::MAX_NUM {
      return Err(SetError::InvalidValue);
    }

    self.set_uint(no_repeat::BLOCK1, Block::new(size, num, more).into())
  }

  fn set_block2(&mut self, size: u16, num: u32, more: bool) -> Result<(), SetError> {
    if num > Block::MAX_NUM {
      return Err(SetError::InvalidValue);
    }

    self.set_uint(no_repeat::BLOCK2, Block::new(size, num, more).into())
  }
}
