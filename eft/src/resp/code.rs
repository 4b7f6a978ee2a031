pub use eft_msg::Code;

// 2.xx
/// 2.01 Created
pub const CREATED: Code = Code::new(2, 1);
/// 2.02 Deleted
pub const DELETED: Code = Code::new(2, 2);
/// 2.03 Valid
pub const VALID: Code = Code::new(2, 3);
/// 2.04 Changed
pub const CHANGED: Code = Code::new(2, 4);
/// 2.05 Content
pub const CONTENT: Code = Code::new(2, 5);
/// 2.31 Continue
///
/// This success status code indicates that the transfer of this
/// block of the request body was successful and that the server
/// encourages sending further blocks, but that a final outcome of the
/// whole block-wise request cannot yet be determined.
pub const CONTINUE: Code = Code::new(2, 31);

// 4.xx
/// 4.00 Bad Request
pub const BAD_REQUEST: Code = Code::new(4, 0);
/// 4.01 Unauthorized
pub const UNAUTHORIZED: Code = Code::new(4, 1);
/// 4.02 Bad Option
pub const BAD_OPTION: Code = Code::new(4, 2);
/// 4.03 Forbidden
pub const FORBIDDEN: Code = Code::new(4, 3);
/// 4.04 Not Found
pub const NOT_FOUND: Code = Code::new(4, 4);
/// 4.05 Method Not Allowed
pub const METHOD_NOT_ALLOWED: Code = Code::new(4, 5);
/// 4.06 Not Acceptable
pub const NOT_ACCEPTABLE: Code = Code::new(4, 6);
/// 4.08 Request Entity Incomplete
///
/// This client error status code indicates that the server has not
/// received the blocks of the request body that it needs to proceed.
/// The client has not sent all blocks, not sent them in the order
/// required by the server, or has sent them long enough ago that the
/// server has already discarded them.
pub const REQUEST_ENTITY_INCOMPLETE: Code = Code::new(4, 8);
/// 4.12 Precondition Failed
pub const PRECONDITION_FAILED: Code = Code::new(4, 12);
/// 4.13 Request Entity Too Large
pub const REQUEST_ENTITY_TOO_LARGE: Code = Code::new(4, 13);
/// 4.15 Unsupported Content-Format
pub const UNSUPPORTED_CONTENT_FORMAT: Code = Code::new(4, 15);

// 5.xx
/// 5.00 Internal Server Error
pub const INTERNAL_SERVER_ERROR: Code = Code::new(5, 0);
/// 5.01 Not Implemented
pub const NOT_IMPLEMENTED: Code = Code::new(5, 1);
/// 5.02 Bad Gateway
pub const BAD_GATEWAY: Code = Code::new(5, 2);
/// 5.03 Service Unavailable
pub const SERVICE_UNAVAILABLE: Code = Code::new(5, 3);
/// 5.04 Gateway Timeout
pub const GATEWAY_TIMEOUT: Code = Code::new(5, 4);
/// 5.05 Proxying Not Supported
pub const PROXYING_NOT_SUPPORTED: Code = Code::new(5, 5);
