//! Log lines as frames
//!
//! The forwarding side sends each distinct format string once
//! ([`LogFrame::AddFormat`]) and afterwards only its id and argument values
//! ([`LogFrame::Record`]). The receiving side keeps the format table and
//! renders lines. Frames must be consumed in the order they were produced.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::forwarding::{format_args, ForwardingStringHandler, LogArg, TokenOutcome};
use crate::network::stream::{
    ensure_consumed, get_blob, get_string, get_u16, get_u8, put_blob, put_string, WireError,
};

pub type FormatId = u16;

const FRAME_ADD_FORMAT: u8 = 1;
const FRAME_RECORD: u8 = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForwardError {
    #[error("wire error: {0}")]
    Wire(#[from] WireError),
    #[error("record refers to unknown format {0}")]
    UnknownFormat(FormatId),
    #[error("format table full")]
    TableFull,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFrame {
    AddFormat { id: FormatId, format: String },
    Record { id: FormatId, component: String, args: Bytes },
}

impl LogFrame {
    pub fn encode(&self) -> Result<Bytes, WireError> {
        let mut out = BytesMut::new();
        match self {
            LogFrame::AddFormat { id, format } => {
                out.put_u8(FRAME_ADD_FORMAT);
                out.put_u16_le(*id);
                put_string(&mut out, format)?;
            }
            LogFrame::Record { id, component, args } => {
                out.put_u8(FRAME_RECORD);
                out.put_u16_le(*id);
                put_string(&mut out, component)?;
                put_blob(&mut out, args)?;
            }
        }
        Ok(out.freeze())
    }

    pub fn decode(mut data: Bytes) -> Result<Self, WireError> {
        let frame = match get_u8(&mut data)? {
            FRAME_ADD_FORMAT => LogFrame::AddFormat {
                id: get_u16(&mut data)?,
                format: get_string(&mut data)?,
            },
            FRAME_RECORD => LogFrame::Record {
                id: get_u16(&mut data)?,
                component: get_string(&mut data)?,
                args: get_blob(&mut data)?,
            },
            other => return Err(WireError::UnknownKind(other)),
        };
        ensure_consumed(&data)?;
        Ok(frame)
    }
}

/// Producer side: turns log calls into frames.
#[derive(Debug)]
pub struct LogForwarder {
    component: String,
    ids: HashMap<String, FormatId>,
    handlers: Vec<ForwardingStringHandler>,
}

impl LogForwarder {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            ids: HashMap::new(),
            handlers: Vec::new(),
        }
    }

    pub fn format_count(&self) -> usize {
        self.handlers.len()
    }

    /// Frames for one log call: an `AddFormat` the first time `format` is
    /// seen, then the `Record`.
    pub fn log(&mut self, format: &str, args: &[LogArg]) -> Result<Vec<LogFrame>, ForwardError> {
        let mut frames = Vec::with_capacity(2);
        let id = match self.ids.get(format) {
            Some(&id) => id,
            None => {
                let id = FormatId::try_from(self.handlers.len()).map_err(|_| ForwardError::TableFull)?;
                self.ids.insert(format.to_string(), id);
                self.handlers.push(ForwardingStringHandler::new(format));
                frames.push(LogFrame::AddFormat {
                    id,
                    format: format.to_string(),
                });
                id
            }
        };

        let mut encoded = BytesMut::new();
        let outcomes = self.handlers[id as usize].parse_args(args, &mut encoded);
        let degraded = outcomes
            .iter()
            .filter(|outcome| **outcome != TokenOutcome::Emitted)
            .count();
        if degraded > 0 {
            tracing::debug!("[log_forward] [degraded] id={} tokens={}", id, degraded);
        }
        frames.push(LogFrame::Record {
            id,
            component: self.component.clone(),
            args: encoded.freeze(),
        });
        Ok(frames)
    }
}

/// A rendered line from a remote component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub component: String,
    pub text: String,
}

/// Consumer side: keeps the format table and renders records.
#[derive(Debug, Default)]
pub struct LogReceiver {
    handlers: HashMap<FormatId, ForwardingStringHandler>,
}

impl LogReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one frame. Records yield a line; format definitions yield nothing.
    pub fn receive(&mut self, frame: LogFrame) -> Result<Option<LogLine>, ForwardError> {
        match frame {
            LogFrame::AddFormat { id, format } => {
                self.handlers.insert(id, ForwardingStringHandler::new(&format));
                Ok(None)
            }
            LogFrame::Record { id, component, mut args } => {
                let handler = self.handlers.get(&id).ok_or(ForwardError::UnknownFormat(id))?;
                let values = handler.read_args(&mut args)?;
                Ok(Some(LogLine {
                    component,
                    text: format_args(handler, &values),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_sent_once() {
        let mut forwarder = LogForwarder::new("baseapp01");
        let first = forwarder.log("load %.2f", &[LogArg::Float(0.5)]).unwrap();
        assert_eq!(first.len(), 2);
        assert!(matches!(&first[0], LogFrame::AddFormat { id: 0, format } if format == "load %.2f"));

        let second = forwarder.log("load %.2f", &[LogArg::Float(0.75)]).unwrap();
        assert_eq!(second.len(), 1);
        assert!(matches!(&second[0], LogFrame::Record { id: 0, .. }));

        let other = forwarder.log("users %d", &[LogArg::Int(3)]).unwrap();
        assert!(matches!(&other[0], LogFrame::AddFormat { id: 1, .. }));
        assert_eq!(forwarder.format_count(), 2);
    }

    #[test]
    fn test_receiver_renders_through_wire() {
        let mut forwarder = LogForwarder::new("cellapp02");
        let mut receiver = LogReceiver::new();
        let mut lines = Vec::new();

        let calls: [(&str, Vec<LogArg>); 3] = [
            ("entity %u moved to %s", vec![LogArg::UInt(7), LogArg::from("space 3")]),
            ("tick %d took %.1fms", vec![LogArg::Int(100), LogArg::Float(2.5)]),
            ("entity %u moved to %s", vec![LogArg::UInt(8), LogArg::Str(None)]),
        ];
        for (format, args) in calls {
            for frame in forwarder.log(format, &args).unwrap() {
                let frame = LogFrame::decode(frame.encode().unwrap()).unwrap();
                lines.extend(receiver.receive(frame).unwrap());
            }
        }

        let texts: Vec<_> = lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "entity 7 moved to space 3",
                "tick 100 took 2.5ms",
                "entity 8 moved to (null)",
            ]
        );
        assert!(lines.iter().all(|line| line.component == "cellapp02"));
    }

    #[test]
    fn test_record_before_format_is_rejected() {
        let mut receiver = LogReceiver::new();
        let frame = LogFrame::Record {
            id: 4,
            component: "x".into(),
            args: Bytes::new(),
        };
        assert_eq!(receiver.receive(frame), Err(ForwardError::UnknownFormat(4)));
    }

    fn render_remote(format: &str, args: Vec<u8>) -> String {
        let mut receiver = LogReceiver::new();
        let define = LogFrame::AddFormat {
            id: 0,
            format: format.into(),
        };
        assert_eq!(receiver.receive(define), Ok(None));
        let record = LogFrame::Record {
            id: 0,
            component: "loginapp".into(),
            args: Bytes::from(args),
        };
        receiver.receive(record).unwrap().unwrap().text
    }

    #[test]
    fn test_huge_literal_width_renders_raw() {
        let text = render_remote("%99999999999999999999d", vec![1, 0, 0, 0]);
        assert_eq!(text, "%99999999999999999999d");
    }

    #[test]
    fn test_huge_runtime_width_and_precision_render_raw() {
        let mut args = i32::MIN.to_le_bytes().to_vec();
        args.extend_from_slice(&5i32.to_le_bytes());
        assert_eq!(render_remote("[%*d]", args), "[%*d]");

        let mut args = i32::MAX.to_le_bytes().to_vec();
        args.extend_from_slice(&1.5f64.to_le_bytes());
        assert_eq!(render_remote("load %.*f", args), "load %.*f");

        let mut args = 3i32.to_le_bytes().to_vec();
        args.extend_from_slice(&5i32.to_le_bytes());
        assert_eq!(render_remote("[%*d]", args), "[  5]");
    }

    #[test]
    fn test_decode_rejects_unknown_frame() {
        assert_eq!(
            LogFrame::decode(Bytes::from_static(&[9, 0, 0])),
            Err(WireError::UnknownKind(9))
        );
    }
}
