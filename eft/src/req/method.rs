use eft_msg::Code;

/// A request method
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Method(pub(crate) Code);

impl Method {
  /// GET
  pub const GET: Method = Method(Code::GET);
  /// POST
  pub const POST: Method = Method(Code::POST);
  /// PUT
  pub const PUT: Method = Method(Code::PUT);
  /// DELETE
  pub const DELETE: Method = Method(Code::DELETE);

  /// The [`Code`] this method corresponds to
  pub fn code(&self) -> Code {
    self.0
  }
}

impl From<Code> for Method {
  fn from(code: Code) -> Self {
    Self(code)
  }
}
