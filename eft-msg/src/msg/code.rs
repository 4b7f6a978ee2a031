/// # Message Code
///
/// 8-bit value split into a 3-bit class and 5-bit detail,
/// conventionally written `class.detail` (e.g. `2.05`, `4.04`).
///
/// - class 0, detail 0: an Empty message
/// - class 0, detail 1-31: a request method
/// - class 2: a success response
/// - class 4: a client error response
/// - class 5: a server error response
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Code {
  /// The "class" of the code (0 for requests, 2/4/5 for responses)
  pub class: u8,
  /// The "detail" of the code
  pub detail: u8,
}

/// The 3 broad categories `Code`s fall into
#[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum CodeKind {
  /// A message without any request or response semantics (0.00)
  Empty,
  /// A request method (0.01 - 0.31)
  Request,
  /// A response status (2.xx, 4.xx, 5.xx)
  Response,
}

impl Code {
  /// Create a new Code from a class and detail
  #[allow(clippy::zero_prefixed_literal)]
  pub const fn new(class: u8, detail: u8) -> Self {
    Self { class, detail }
  }

  /// 0.00 Empty
  pub const EMPTY: Code = Code::new(0, 0);
  /// 0.01 GET
  pub const GET: Code = Code::new(0, 1);
  /// 0.02 POST
  pub const POST: Code = Code::new(0, 2);
  /// 0.03 PUT
  pub const PUT: Code = Code::new(0, 3);
  /// 0.04 DELETE
  pub const DELETE: Code = Code::new(0, 4);

  /// Is this code an empty message, a request method, or a response
  /// status?
  pub fn kind(&self) -> CodeKind {
    match (self.class, self.detail) {
      | (0, 0) => CodeKind::Empty,
      | (0, _) => CodeKind::Request,
      | _ => CodeKind::Response,
    }
  }
}

impl From<u8> for Code {
  fn from(b: u8) -> Self {
    Self { class: b >> 5,
           detail: b & 0b11111 }
  }
}

impl From<Code> for u8 {
  fn from(code: Code) -> u8 {
    (code.class << 5) | code.detail
  }
}
