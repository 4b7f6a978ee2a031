//! `eft` is a Rust CoAP endpoint with block-wise transfer, aimed at
//! constrained IPv6-capable devices. It aims to be:
//! - Platform-independent
//! - Extensible
//! - Approachable
//!
//! ## CoAP
//! CoAP is an application-level network protocol that copies the
//! semantics of HTTP to an environment conducive to **constrained**
//! devices. (weak hardware, small battery capacity, etc.)
//!
//! This means that you can write and run two-way RESTful communication
//! between devices very similarly to the networking semantics you are
//! most likely very familiar with.
//!
//! ### Similarities to HTTP
//! CoAP has the same verbs and many of the same semantics as HTTP;
//! - GET, POST, PUT, DELETE
//! - Headers (renamed to [Options](https://datatracker.ietf.org/doc/html/rfc7252#section-5.10))
//! - Data format independent (via the [Content-Format](https://datatracker.ietf.org/doc/html/rfc7252#section-12.3) Option)
//! - [Response status codes](https://datatracker.ietf.org/doc/html/rfc7252#section-5.9)
//!
//! ### Differences from HTTP
//! - CoAP customarily sits on top of UDP. Because UDP is a
//!   "connectionless" protocol, CoAP machines are expected to perform
//!   both client and server roles (or more accurately, _sender_ and
//!   _receiver_ roles)
//! - Confirmable messages are retransmitted with exponential backoff
//!   until acknowledged, and large bodies are fragmented across
//!   datagrams ([RFC 7959](https://www.rfc-editor.org/rfc/rfc7959)
//!   block-wise transfer)

// style
#![allow(clippy::unused_unit)]
// -
// deny
#![deny(missing_docs)]
#![deny(missing_debug_implementations)]
#![cfg_attr(not(test), deny(unsafe_code))]
// -
// warnings
#![cfg_attr(not(test), warn(unreachable_pub))]
// -
// features
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc as std_alloc;

#[cfg(test)]
pub(crate) mod test;

pub(crate) mod logging;

/// customizable retrying of fallible operations
pub mod retry;

/// responses
pub mod resp;

/// requests
pub mod req;

/// the endpoint that ties the runtime together
#[cfg(feature = "alloc")]
pub mod core;

/// # CoAP core runtime
///
/// The core CoAP runtime is broken into discrete steps
/// that are mostly deterministic and therefore highly
/// testable.
///
/// Steps are expressed as types that impl a [`Step`](crate::step::Step)
/// trait which defines 2 flows: "poll for a request" and "poll for a
/// response to a request i sent"
///
/// Steps are usually parameterized by 1 type; the Step that came
/// before it, so the entire runtime transparently describes what
/// happens when a message is received, and layers can be swapped or
/// added at the end without forking `eft`.
///
/// # Step demands
/// Steps demand 2 pieces of information:
///  - A snapshot of the system's state right now
///  - A mutable reference to a list of effectful actions to perform
///    once all steps have run
///
/// The system state allows for all steps to have access to the same
/// effectful information e.g. system time and incoming network
/// messages.
///
/// The list of Effects allows for steps to deterministically express
/// the IO that they would like performed, e.g. log a line or send a
/// datagram.
pub mod step;

/// platform configuration
pub mod platform;

/// network abstractions
pub mod net;

/// time abstractions
pub mod time;

/// server-side resources and dispatch
#[cfg(feature = "alloc")]
pub mod server;

/// configuring runtime behavior
pub mod config;

/// `std`-only eft stuff
#[cfg(feature = "std")]
pub mod std;

/// Helper constants and functions for creating multicast addresses
pub mod multicast {
  use no_std_net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

  /// IPv4 "All CoAP devices" multicast address.
  ///
  /// If using multicast to discover devices, it's recommended
  /// that you use this address with a port specific to your
  /// application.
  pub const ALL_COAP_DEVICES_IP: Ipv4Addr = Ipv4Addr::new(224, 0, 1, 187);

  /// IPv6 link-local "All CoAP nodes" multicast address (`FF02::FD`).
  pub const ALL_COAP_NODES_LINK_LOCAL_IP: Ipv6Addr = Ipv6Addr::new(0xFF02, 0, 0, 0, 0, 0, 0, 0xFD);

  /// Create a SocketAddr (IP + port) with the [`ALL_COAP_DEVICES_IP`]
  /// address
  pub const fn all_coap_devices(port: u16) -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(ALL_COAP_DEVICES_IP, port))
  }

  /// Create a SocketAddr (IP + port) with the
  /// [`ALL_COAP_NODES_LINK_LOCAL_IP`] address
  pub const fn all_coap_nodes_link_local(port: u16) -> SocketAddr {
    SocketAddr::V6(SocketAddrV6::new(ALL_COAP_NODES_LINK_LOCAL_IP, port, 0, 0))
  }
}

pub use eft_msg::ContentFormat;
