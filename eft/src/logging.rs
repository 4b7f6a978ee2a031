use core::fmt::Write;

use eft_common::GetSize;

use crate::platform::{self, PlatformTypes, String1Kb};

/// Push an [`Effect::Log`](crate::platform::Effect::Log) onto the
/// effect list, formatting the message into a stack buffer.
macro_rules! log {
  ($at:path, $effects:expr, $level:expr, $($arg:tt)*) => {{
    use core::fmt::Write;

    let mut out = $crate::platform::String1Kb::default();
    write!(out, "[{}] ", stringify!($at)).ok();
    write!(out, $($arg)*).ok();
    $effects.push($crate::platform::Effect::Log($level, out));
  }};
}

pub(crate) use log;

pub(crate) fn msg_summary<P: PlatformTypes>(msg: &platform::Message<P>) -> String1Kb {
  let mut buf = String1Kb::default();
  write!(buf,
         "{:?} {:?} {}.{:02} id {} with {} byte payload",
         msg.code.kind(),
         msg.ty,
         msg.code.class,
         msg.code.detail,
         msg.id.0,
         msg.payload.0.get_size()).ok();
  buf
}
