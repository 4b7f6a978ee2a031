use eft_msg::{Id, MessageOptions, Token, Type};

use crate::platform::{self, PlatformTypes};

/// Request methods
pub mod method;

#[doc(inline)]
pub use method::Method;

/// A CoAP request
///
/// A thin wrapper around a [`platform::Message`] that names the
/// request-side semantics: the code is a [`Method`] and the Uri-Path
/// options are the resource being addressed.
pub struct Req<P: PlatformTypes>(platform::Message<P>);

impl<P: PlatformTypes> Req<P> {
  /// Create a new Confirmable request.
  ///
  /// The message id is left zero to be provisioned by the runtime when
  /// the request is sent; the token is left empty to be generated by
  /// [`Core::send_req`](crate::core::Core::send_req).
  ///
  /// ```
  /// use eft::platform::Std;
  /// use eft::req::{Method, Req};
  ///
  /// let req = Req::<Std>::new(Method::GET, "sensors/temp");
  /// assert_eq!(req.path_string().as_str(), "sensors/temp");
  /// ```
  pub fn new(method: Method, path: &str) -> Self {
    let mut msg = platform::Message::<P>::new(Type::Con,
                                              method.code(),
                                              Id(0),
                                              Token(Default::default()));
    msg.set_path(path).ok();

    Self(msg)
  }

  /// Creates a new GET request
  pub fn get(path: &str) -> Self {
    Self::new(Method::GET, path)
  }

  /// Creates a new POST request
  pub fn post(path: &str) -> Self {
    Self::new(Method::POST, path)
  }

  /// Creates a new PUT request
  pub fn put(path: &str) -> Self {
    Self::new(Method::PUT, path)
  }

  /// Creates a new DELETE request
  pub fn delete(path: &str) -> Self {
    Self::new(Method::DELETE, path)
  }

  /// Set this request to be non-confirmable
  ///
  /// Some messages do not require an acknowledgement. This is
  /// particularly true for messages that are repeated regularly for
  /// application requirements, such as repeated readings from a
  /// sensor.
  pub fn non(mut self) -> Self {
    self.0.ty = Type::Non;
    self
  }

  /// Get the request method
  pub fn method(&self) -> Method {
    Method(self.0.code)
  }

  /// Get the request type (confirmable, non-confirmable)
  pub fn msg_type(&self) -> Type {
    self.0.ty
  }

  /// Get a copy of the message id for this request
  pub fn msg_id(&self) -> Id {
    self.0.id
  }

  /// Get a copy of the message token for this request
  pub fn msg_token(&self) -> Token {
    self.0.token
  }

  /// Borrow the underlying message
  pub fn msg(&self) -> &platform::Message<P> {
    &self.0
  }

  /// Mutably borrow the underlying message
  pub fn msg_mut(&mut self) -> &mut platform::Message<P> {
    &mut self.0
  }

  /// Add a payload to this request
  pub fn set_payload(&mut self, payload: impl IntoIterator<Item = u8>) {
    self.0.payload = eft_msg::Payload(payload.into_iter().collect());
  }

  /// Get the payload's raw bytes
  pub fn payload(&self) -> &[u8] {
    &self.0.payload.0
  }

  /// Get the payload and attempt to interpret it as an ASCII string
  pub fn payload_str(&self) -> Result<&str, core::str::Utf8Error> {
    core::str::from_utf8(self.payload())
  }

  /// The request path as a `/`-joined stack string
  /// (capped at 1KB; longer paths are truncated)
  pub fn path_string(&self) -> crate::platform::String1Kb {
    use core::fmt::Write;

    let mut out = crate::platform::String1Kb::default();
    let mut first = true;
    for seg in self.0.path_segments() {
      if !first {
        write!(out, "/").ok();
      }
      write!(out, "{}", seg).ok();
      first = false;
    }

    out
  }
}

impl<P: PlatformTypes> Clone for Req<P> {
  fn clone(&self) -> Self {
    Self(self.0.clone())
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Req<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_tuple("Req").field(&self.0).finish()
  }
}

impl<P: PlatformTypes> PartialEq for Req<P> {
  fn eq(&self, other: &Self) -> bool {
    self.0 == other.0
  }
}

impl<P: PlatformTypes> From<platform::Message<P>> for Req<P> {
  fn from(msg: platform::Message<P>) -> Self {
    Self(msg)
  }
}

impl<P: PlatformTypes> From<Req<P>> for platform::Message<P> {
  fn from(req: Req<P>) -> Self {
    req.0
  }
}
