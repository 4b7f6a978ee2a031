use eft_msg::MessageOptions;

use crate::net::Addrd;
use crate::platform::{self, PlatformTypes};
use crate::req::Req;

/// A request handler bound to a path.
///
/// Handlers are plain `fn` pointers; they run to completion on the
/// engine's thread and must not block. Returning `Some(message)` asks
/// the endpoint to send it to the requester (typically built with
/// [`Resp::for_request`](crate::resp::Resp::for_request)); returning
/// `None` means the handler produced no reply (or sent one itself).
pub type Handler<P> = fn(&Addrd<Req<P>>) -> Option<platform::Message<P>>;

/// An access-control hook run before dispatch; returning `false`
/// abandons the request without any reply.
pub type Interceptor<P> = fn(&Addrd<Req<P>>) -> bool;

/// A (uri-path, handler) pair served by the endpoint.
pub struct Resource<P: PlatformTypes> {
  /// The path this resource is reachable under, without a leading
  /// slash (e.g. `"sensors/temp"`). Matching is case-sensitive and
  /// segment-wise.
  pub path: &'static str,
  /// The handler invoked for matching requests
  pub handler: Handler<P>,
}

impl<P: PlatformTypes> Clone for Resource<P> {
  fn clone(&self) -> Self {
    Self { path: self.path,
           handler: self.handler }
  }
}

impl<P: PlatformTypes> Copy for Resource<P> {}

impl<P: PlatformTypes> core::fmt::Debug for Resource<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Resource").field("path", &self.path).finish()
  }
}

fn paths_match<'a>(path: &'static str, segments: impl Iterator<Item = &'a str>) -> bool {
  path.split('/').filter(|seg| !seg.is_empty()).eq(segments)
}

/// The set of resources served by an endpoint, iterated linearly on
/// each inbound request.
pub struct Resources<P: PlatformTypes> {
  entries: std_alloc::vec::Vec<Resource<P>>,
  default_handler: Option<Handler<P>>,
  interceptor: Option<Interceptor<P>>,
}

impl<P: PlatformTypes> Default for Resources<P> {
  fn default() -> Self {
    Self { entries: Default::default(),
           default_handler: None,
           interceptor: None }
  }
}

impl<P: PlatformTypes> core::fmt::Debug for Resources<P> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Resources")
     .field("entries", &self.entries)
     .field("default_handler", &self.default_handler.is_some())
     .field("interceptor", &self.interceptor.is_some())
     .finish()
  }
}

impl<P: PlatformTypes> Resources<P> {
  /// Add (or replace) the resource served under `path`.
  pub fn add(&mut self, path: &'static str, handler: Handler<P>) {
    self.remove(path);
    self.entries.push(Resource { path, handler });
  }

  /// Stop serving `path`.
  pub fn remove(&mut self, path: &'static str) -> Option<Resource<P>> {
    self.entries
        .iter()
        .position(|r| r.path == path)
        .map(|ix| self.entries.remove(ix))
  }

  /// Set the handler for requests matching no resource.
  pub fn set_default_handler(&mut self, handler: Handler<P>) {
    self.default_handler = Some(handler);
  }

  /// Set the access-control hook.
  pub fn set_interceptor(&mut self, interceptor: Interceptor<P>) {
    self.interceptor = Some(interceptor);
  }

  pub(crate) fn interceptor(&self) -> Option<Interceptor<P>> {
    self.interceptor
  }

  /// The handler that should serve `req`: the first resource whose
  /// path matches exactly, else the default handler.
  pub fn lookup(&self, req: &Req<P>) -> Option<Handler<P>> {
    self.entries
        .iter()
        .find(|r| paths_match(r.path, req.msg().path_segments()))
        .map(|r| r.handler)
        .or(self.default_handler)
  }
}
