use eft_msg::{Code, Id, Token, Type};

use crate::platform::{self, PlatformTypes};
use crate::req::Req;

/// Response codes
pub mod code;

/// A CoAP response
///
/// A thin wrapper around a [`platform::Message`] that names the
/// response-side semantics: the code is a status and the token echoes
/// the request being answered.
pub struct Resp<P: PlatformTypes>(platform::Message<P>);

impl<P: PlatformTypes> Resp<P> {
  /// Create a new response for a given request.
  ///
  /// If the request is CONfirmable, this will return Some(ACK)
  /// piggybacking the response on the acknowledgement.
  ///
  /// If the request is NONconfirmable, this will return Some(NON)
  /// with a fresh (zero, to-be-provisioned) message id.
  ///
  /// If the request is EMPTY, ACK or RESET, this will return None.
  pub fn for_request(req: &Req<P>) -> Option<Self> {
    match req.msg_type() {
      | Type::Con => Some(Self::ack(req)),
      | Type::Non => Some(Self::non(req)),
      | _ => None,
    }
  }

  /// Create a response ACKnowledging an incoming request.
  ///
  /// The ACK echoes the request's id and token, so that the response
  /// rides the acknowledgement ("piggybacked response").
  pub fn ack(req: &Req<P>) -> Self {
    Self(platform::Message::<P>::new(Type::Ack,
                                     code::CONTENT,
                                     req.msg_id(),
                                     req.msg_token()))
  }

  /// Create a CONfirmable response for an incoming request.
  ///
  /// A confirmable response should be used when you receive a NON
  /// request and want to ensure the client receives your response.
  /// The runtime will retransmit it until the client acknowledges.
  pub fn con(req: &Req<P>) -> Self {
    Self(platform::Message::<P>::new(Type::Con,
                                     code::CONTENT,
                                     Id(0),
                                     req.msg_token()))
  }

  /// Create a NONconfirmable response for an incoming request.
  ///
  /// The message id is left zero to be provisioned when sent; the
  /// token echoes the request.
  pub fn non(req: &Req<P>) -> Self {
    Self(platform::Message::<P>::new(Type::Non,
                                     code::CONTENT,
                                     Id(0),
                                     req.msg_token()))
  }

  /// Get the response code
  pub fn code(&self) -> Code {
    self.0.code
  }

  /// Change the response code
  pub fn set_code(&mut self, code: Code) {
    self.0.code = code;
  }

  /// Get the message type
  pub fn msg_type(&self) -> Type {
    self.0.ty
  }

  /// Get the message id
  pub fn msg_id(&self) -> Id {
    self.0.id
  }

  /// Get the message token
  pub fn token(&self) -> Token {
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

  /// Add a payload to this response
  pub fn set_payload(&mut self, payload: impl IntoIterator<Item = u8>) {
    self.0.payload = eft_msg::Payload(payload.into_iter().collect());
  }

  /// Iterate over the payload's bytes
  pub fn payload(&self) -> impl Iterator<Item = &u8> {
    self.0.payload.0.iter()
  }

  /// Get the payload and attempt to interpret it as a UTF-8 string
  #[cfg(feature = "alloc")]
  pub fn payload_string(&self) -> Result<std_alloc::string::String, std_alloc::string::FromUtf8Error> {
    std_alloc::string::String::from_utf8(self.payload().copied().collect())
  }
}

impl<P: PlatformTypes> Clone for Resp<P> {
  fn clone(&self) -> Self {
    Self(self.0.clone())
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Resp<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_tuple("Resp").field(&self.0).finish()
  }
}

impl<P: PlatformTypes> PartialEq for Resp<P> {
  fn eq(&self, other: &Self) -> bool {
    self.0 == other.0
  }
}

impl<P: PlatformTypes> From<platform::Message<P>> for Resp<P> {
  fn from(msg: platform::Message<P>) -> Self {
    Self(msg)
  }
}

impl<P: PlatformTypes> From<Resp<P>> for platform::Message<P> {
  fn from(rep: Resp<P>) -> Self {
    rep.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test;

  #[test]
  fn for_con_request_is_piggybacked_ack() {
    let mut req = test::msg!(CON GET x.x.x.x:1111).unwrap();
    req.id = Id(33);
    req.token = Token(tinyvec::array_vec!([u8; 8] => 7));
    let req = Req::<test::Platform>::from(req);

    let rep = Resp::for_request(&req).unwrap();
    assert_eq!(rep.msg_type(), Type::Ack);
    assert_eq!(rep.msg_id(), Id(33));
    assert_eq!(rep.token(), req.msg_token());
  }

  #[test]
  fn for_non_request_is_non_with_fresh_id() {
    let mut req = test::msg!(NON GET x.x.x.x:1111).unwrap();
    req.id = Id(33);
    req.token = Token(tinyvec::array_vec!([u8; 8] => 7));
    let req = Req::<test::Platform>::from(req);

    let rep = Resp::for_request(&req).unwrap();
    assert_eq!(rep.msg_type(), Type::Non);
    assert_eq!(rep.msg_id(), Id(0));
    assert_eq!(rep.token(), req.msg_token());
  }

  #[test]
  fn for_ack_is_none() {
    let req = Req::<test::Platform>::from(test::msg!(ACK EMPTY x.x.x.x:1111).unwrap());
    assert!(Resp::for_request(&req).is_none());
  }
}
