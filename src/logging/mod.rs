//! Remote log forwarding
//!
//! Log calls are marshalled as a format id plus typed argument values and
//! rendered by whichever process receives them.

pub mod format;
pub mod forwarder;
pub mod forwarding;

pub use format::{
    scan, ConversionKind, Count, FormatData, FormatFlags, LengthModifier, Segment, MAX_FIELD_WIDTH,
};
pub use forwarder::{ForwardError, LogForwarder, LogFrame, LogLine, LogReceiver};
pub use forwarding::{format_args, ForwardingStringHandler, LogArg, SkipReason, TokenOutcome};
