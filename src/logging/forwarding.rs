//! Shipping printf arguments instead of formatted text
//!
//! A [`ForwardingStringHandler`] scans its format string once. For each log
//! call it writes only the argument values, typed by the specification they
//! belong to, so the receiving process can format the line itself. The
//! reader ([`ForwardingStringHandler::read_args`]) replays the same
//! specifications, which keeps writer and reader in lockstep as long as
//! every specification consumes the stream the same way on both sides.
//!
//! Value encoding, little-endian:
//!
//! | specification            | bytes                               |
//! |--------------------------|-------------------------------------|
//! | `*` width or precision   | i32, ahead of the value             |
//! | `d i` / `u o x X`        | 2, 4 or 8 byte int by length (hh, h → 2; none → 4; l ll j z t → 8) |
//! | `f F e E g G a A`        | f64 (also for `L`)                  |
//! | `s`                      | packed string, `"(null)"` for none  |
//! | `p`                      | u64                                 |
//! | `c`                      | u8                                  |
//! | `%%`, unknown            | nothing                             |

use std::fmt::Write as _;

use bytes::{Buf, BufMut, Bytes};
use thiserror::Error;

use super::format::{
    scan, ConversionKind, Count, FormatData, FormatFlags, LengthModifier, Segment, MAX_FIELD_WIDTH,
};
use crate::network::stream::{
    ensure_consumed, ensure_remaining, get_i32, get_string, get_u8, put_string, WireError,
};

/// Written in place of a missing string.
pub const NULL_STRING: &str = "(null)";

/// One argument of a log call.
#[derive(Debug, Clone, PartialEq)]
pub enum LogArg {
    Int(i64),
    UInt(u64),
    Float(f64),
    /// `None` stands for a null pointer.
    Str(Option<String>),
    Ptr(u64),
    Char(u8),
}

impl LogArg {
    fn as_i64(&self) -> Option<i64> {
        match *self {
            LogArg::Int(v) => Some(v),
            LogArg::UInt(v) => Some(v as i64),
            LogArg::Char(v) => Some(i64::from(v)),
            LogArg::Ptr(v) => Some(v as i64),
            LogArg::Float(_) | LogArg::Str(_) => None,
        }
    }

    fn as_u64(&self) -> Option<u64> {
        self.as_i64().map(|v| v as u64)
    }

    fn as_f64(&self) -> Option<f64> {
        match *self {
            LogArg::Float(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for LogArg {
    fn from(v: i32) -> Self {
        LogArg::Int(i64::from(v))
    }
}

impl From<i64> for LogArg {
    fn from(v: i64) -> Self {
        LogArg::Int(v)
    }
}

impl From<u32> for LogArg {
    fn from(v: u32) -> Self {
        LogArg::UInt(u64::from(v))
    }
}

impl From<u64> for LogArg {
    fn from(v: u64) -> Self {
        LogArg::UInt(v)
    }
}

impl From<f64> for LogArg {
    fn from(v: f64) -> Self {
        LogArg::Float(v)
    }
}

impl From<&str> for LogArg {
    fn from(v: &str) -> Self {
        LogArg::Str(Some(v.to_string()))
    }
}

impl From<Option<&str>> for LogArg {
    fn from(v: Option<&str>) -> Self {
        LogArg::Str(v.map(str::to_string))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("unknown conversion '{0}'")]
    UnknownConversion(char),
    #[error("missing argument")]
    MissingArgument,
    #[error("argument does not suit {0:?} conversion")]
    TypeMismatch(ConversionKind),
    #[error("string of {0} bytes too long")]
    StringTooLong(usize),
}

/// What happened to one specification while writing arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenOutcome {
    Emitted,
    /// A zero value of the right width was written in place of the argument.
    Defaulted(SkipReason),
    /// Nothing was written and no argument was consumed.
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct ForwardingStringHandler {
    format: String,
    segments: Vec<Segment>,
}

impl ForwardingStringHandler {
    pub fn new(format: &str) -> Self {
        Self {
            format: format.to_string(),
            segments: scan(format),
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    pub fn tokens(&self) -> impl Iterator<Item = &FormatData> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Spec(spec) => Some(spec),
            Segment::Literal(_) => None,
        })
    }

    /// Write the values of `args` to `out`, one outcome per specification.
    pub fn parse_args<B: BufMut>(&self, args: &[LogArg], out: &mut B) -> Vec<TokenOutcome> {
        let mut args = args.iter();
        let mut outcomes = Vec::new();
        for spec in self.tokens() {
            let outcome = write_spec(spec, &mut args, out);
            match &outcome {
                TokenOutcome::Skipped(reason) | TokenOutcome::Defaulted(reason) => {
                    tracing::warn!(
                        "[log_forward] [token] format={:?} spec={} outcome={:?} reason={}",
                        self.format,
                        spec.raw,
                        outcome,
                        reason
                    );
                }
                TokenOutcome::Emitted => {}
            }
            outcomes.push(outcome);
        }
        let extra = args.count();
        if extra > 0 {
            tracing::debug!("[log_forward] [extra_args] format={:?} count={}", self.format, extra);
        }
        outcomes
    }

    /// Read back what [`ForwardingStringHandler::parse_args`] wrote. The
    /// input must be consumed exactly.
    pub fn read_args(&self, input: &mut Bytes) -> Result<Vec<LogArg>, WireError> {
        let mut args = Vec::new();
        for spec in self.tokens() {
            let kind = spec.kind();
            if matches!(kind, ConversionKind::Percent | ConversionKind::Unknown) {
                continue;
            }
            if spec.width == Count::Runtime {
                args.push(LogArg::Int(i64::from(get_i32(input)?)));
            }
            if spec.precision == Count::Runtime {
                args.push(LogArg::Int(i64::from(get_i32(input)?)));
            }
            let value = match kind {
                ConversionKind::Signed => LogArg::Int(get_int(input, spec.length.int_width())?),
                ConversionKind::Unsigned => LogArg::UInt(get_uint(input, spec.length.int_width())?),
                ConversionKind::Float => {
                    ensure_remaining(&*input, 8)?;
                    LogArg::Float(input.get_f64_le())
                }
                ConversionKind::Str => LogArg::Str(Some(get_string(input)?)),
                ConversionKind::Pointer => LogArg::Ptr(get_uint(input, 8)?),
                ConversionKind::Char => LogArg::Char(get_u8(input)?),
                ConversionKind::Percent | ConversionKind::Unknown => continue,
            };
            args.push(value);
        }
        ensure_consumed(&*input)?;
        Ok(args)
    }
}

fn write_spec<'a, B: BufMut>(
    spec: &FormatData,
    args: &mut impl Iterator<Item = &'a LogArg>,
    out: &mut B,
) -> TokenOutcome {
    let kind = spec.kind();
    match kind {
        ConversionKind::Percent => return TokenOutcome::Emitted,
        ConversionKind::Unknown => {
            return TokenOutcome::Skipped(SkipReason::UnknownConversion(spec.conversion))
        }
        _ => {}
    }

    let mut problem = None;
    for count in [spec.width, spec.precision] {
        if count == Count::Runtime {
            let value = match args.next() {
                Some(arg) => arg.as_i64().unwrap_or_else(|| {
                    problem.get_or_insert(SkipReason::TypeMismatch(ConversionKind::Signed));
                    0
                }),
                None => {
                    problem.get_or_insert(SkipReason::MissingArgument);
                    0
                }
            };
            out.put_i32_le(value as i32);
        }
    }

    let arg = args.next();
    if arg.is_none() {
        problem.get_or_insert(SkipReason::MissingArgument);
    }
    let mismatch = || SkipReason::TypeMismatch(kind);
    match kind {
        ConversionKind::Signed => {
            let v = arg.and_then(LogArg::as_i64).unwrap_or_else(|| {
                problem.get_or_insert_with(mismatch);
                0
            });
            put_int(out, spec.length.int_width(), v as u64);
        }
        ConversionKind::Unsigned => {
            let v = arg.and_then(LogArg::as_u64).unwrap_or_else(|| {
                problem.get_or_insert_with(mismatch);
                0
            });
            put_int(out, spec.length.int_width(), v);
        }
        ConversionKind::Float => {
            let v = arg.and_then(LogArg::as_f64).unwrap_or_else(|| {
                problem.get_or_insert_with(mismatch);
                0.0
            });
            out.put_f64_le(v);
        }
        ConversionKind::Str => {
            let s = match arg {
                Some(LogArg::Str(Some(s))) => s.as_str(),
                Some(LogArg::Str(None)) => NULL_STRING,
                _ => {
                    problem.get_or_insert_with(mismatch);
                    NULL_STRING
                }
            };
            if put_string(out, s).is_err() {
                problem.get_or_insert(SkipReason::StringTooLong(s.len()));
                out.put_u8(0);
            }
        }
        ConversionKind::Pointer => {
            let v = arg.and_then(LogArg::as_u64).unwrap_or_else(|| {
                problem.get_or_insert_with(mismatch);
                0
            });
            out.put_u64_le(v);
        }
        ConversionKind::Char => {
            let v = arg.and_then(LogArg::as_u64).unwrap_or_else(|| {
                problem.get_or_insert_with(mismatch);
                0
            });
            out.put_u8(v as u8);
        }
        ConversionKind::Percent | ConversionKind::Unknown => {}
    }

    match problem {
        Some(reason) => TokenOutcome::Defaulted(reason),
        None => TokenOutcome::Emitted,
    }
}

fn put_int<B: BufMut>(out: &mut B, width: usize, v: u64) {
    match width {
        2 => out.put_u16_le(v as u16),
        4 => out.put_u32_le(v as u32),
        _ => out.put_u64_le(v),
    }
}

fn get_int(input: &mut Bytes, width: usize) -> Result<i64, WireError> {
    ensure_remaining(&*input, width)?;
    Ok(match width {
        2 => i64::from(input.get_i16_le()),
        4 => i64::from(input.get_i32_le()),
        _ => input.get_i64_le(),
    })
}

fn get_uint(input: &mut Bytes, width: usize) -> Result<u64, WireError> {
    ensure_remaining(&*input, width)?;
    Ok(match width {
        2 => u64::from(input.get_u16_le()),
        4 => u64::from(input.get_u32_le()),
        _ => input.get_u64_le(),
    })
}

/// Render the line `handler`'s format describes, printf style.
///
/// Specifications without a usable argument are rendered as written.
pub fn format_args(handler: &ForwardingStringHandler, args: &[LogArg]) -> String {
    let mut args = args.iter();
    let mut out = String::with_capacity(handler.format.len() + 16);
    for segment in &handler.segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Spec(spec) => render_spec(spec, &mut args, &mut out),
        }
    }
    out
}

fn render_spec<'a>(spec: &FormatData, args: &mut impl Iterator<Item = &'a LogArg>, out: &mut String) {
    let kind = spec.kind();
    match kind {
        ConversionKind::Percent => {
            out.push('%');
            return;
        }
        ConversionKind::Unknown => {
            out.push_str(&spec.raw);
            return;
        }
        _ => {}
    }

    let mut flags = spec.flags;
    let width = match spec.width {
        Count::Unspecified => 0,
        Count::Literal(w) => w,
        Count::Runtime => {
            let w = args.next().and_then(LogArg::as_i64).unwrap_or(0);
            if w < 0 {
                flags.left = true;
            }
            usize::try_from(w.unsigned_abs()).unwrap_or(usize::MAX)
        }
    };
    let precision = match spec.precision {
        Count::Unspecified => None,
        Count::Literal(p) => Some(p),
        Count::Runtime => {
            let p = args.next().and_then(LogArg::as_i64).unwrap_or(-1);
            usize::try_from(p).ok()
        }
    };

    let Some(arg) = args.next() else {
        out.push_str(&spec.raw);
        return;
    };
    // counts arrive from remote peers; past the bound the spec is echoed
    if width > MAX_FIELD_WIDTH || precision.is_some_and(|p| p > MAX_FIELD_WIDTH) {
        tracing::debug!("[log_forward] [oversized_field] spec={} width={}", spec.raw, width);
        out.push_str(&spec.raw);
        return;
    }
    let rendered = match kind {
        ConversionKind::Signed => arg
            .as_i64()
            .map(|v| render_signed(flags, width, precision, narrow_signed(v, spec.length))),
        ConversionKind::Unsigned => arg.as_u64().map(|v| {
            render_unsigned(spec.conversion, flags, width, precision, narrow_unsigned(v, spec.length))
        }),
        ConversionKind::Float => arg
            .as_f64()
            .map(|v| render_float(spec.conversion, flags, width, precision, v)),
        ConversionKind::Str => match arg {
            LogArg::Str(s) => {
                let s = s.as_deref().unwrap_or(NULL_STRING);
                let s: String = match precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.to_string(),
                };
                Some(pad(flags, width, "", &s, false))
            }
            _ => None,
        },
        ConversionKind::Pointer => arg
            .as_u64()
            .map(|v| pad(flags, width, "", &format!("0x{v:x}"), false)),
        ConversionKind::Char => arg
            .as_u64()
            .map(|v| pad(flags, width, "", &char::from(v as u8).to_string(), false)),
        ConversionKind::Percent | ConversionKind::Unknown => None,
    };
    match rendered {
        Some(text) => out.push_str(&text),
        None => out.push_str(&spec.raw),
    }
}

fn narrow_signed(v: i64, length: LengthModifier) -> i64 {
    match length.int_width() {
        2 => i64::from(v as i16),
        4 => i64::from(v as i32),
        _ => v,
    }
}

fn narrow_unsigned(v: u64, length: LengthModifier) -> u64 {
    match length.int_width() {
        2 => u64::from(v as u16),
        4 => u64::from(v as u32),
        _ => v,
    }
}

fn sign_of(negative: bool, flags: FormatFlags) -> &'static str {
    if negative {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    }
}

fn pad(flags: FormatFlags, width: usize, prefix: &str, body: &str, zero_ok: bool) -> String {
    let len = prefix.chars().count() + body.chars().count();
    let mut out = String::with_capacity(width.max(len));
    if len >= width {
        out.push_str(prefix);
        out.push_str(body);
    } else if flags.left {
        out.push_str(prefix);
        out.push_str(body);
        out.extend(std::iter::repeat(' ').take(width - len));
    } else if flags.zero && zero_ok {
        out.push_str(prefix);
        out.extend(std::iter::repeat('0').take(width - len));
        out.push_str(body);
    } else {
        out.extend(std::iter::repeat(' ').take(width - len));
        out.push_str(prefix);
        out.push_str(body);
    }
    out
}

fn with_int_precision(digits: String, precision: Option<usize>) -> String {
    match precision {
        Some(0) if digits == "0" => String::new(),
        Some(p) if digits.len() < p => {
            let mut padded = "0".repeat(p - digits.len());
            padded.push_str(&digits);
            padded
        }
        _ => digits,
    }
}

fn render_signed(flags: FormatFlags, width: usize, precision: Option<usize>, v: i64) -> String {
    let digits = with_int_precision(v.unsigned_abs().to_string(), precision);
    pad(flags, width, sign_of(v < 0, flags), &digits, precision.is_none())
}

fn render_unsigned(
    conversion: char,
    flags: FormatFlags,
    width: usize,
    precision: Option<usize>,
    v: u64,
) -> String {
    let (digits, prefix) = match conversion {
        'o' => {
            let mut digits = with_int_precision(format!("{v:o}"), precision);
            if flags.alt && !digits.starts_with('0') {
                digits.insert(0, '0');
            }
            (digits, "")
        }
        'x' => (
            with_int_precision(format!("{v:x}"), precision),
            if flags.alt && v != 0 { "0x" } else { "" },
        ),
        'X' => (
            with_int_precision(format!("{v:X}"), precision),
            if flags.alt && v != 0 { "0X" } else { "" },
        ),
        _ => (with_int_precision(v.to_string(), precision), ""),
    };
    pad(flags, width, prefix, &digits, precision.is_none())
}

fn render_float(
    conversion: char,
    flags: FormatFlags,
    width: usize,
    precision: Option<usize>,
    v: f64,
) -> String {
    let sign = sign_of(v.is_sign_negative() && !v.is_nan(), flags);
    let magnitude = v.abs();
    let mut body = if magnitude.is_nan() {
        "nan".to_string()
    } else if magnitude.is_infinite() {
        "inf".to_string()
    } else {
        match conversion.to_ascii_lowercase() {
            'f' => {
                let mut s = format!("{:.*}", precision.unwrap_or(6), magnitude);
                if flags.alt && !s.contains('.') {
                    s.push('.');
                }
                s
            }
            'g' => general_form(magnitude, precision, flags.alt),
            // 'e', and 'a' which is rendered in decimal exponent form
            _ => exponent_form(magnitude, precision.unwrap_or(6)),
        }
    };
    if conversion.is_ascii_uppercase() {
        body.make_ascii_uppercase();
    }
    pad(flags, width, sign, &body, magnitude.is_finite())
}

/// `d.ddde±XX`, at least two exponent digits.
fn exponent_form(v: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision, v);
    let Some((mantissa, exp)) = s.split_once('e') else {
        return s;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let mut out = String::with_capacity(mantissa.len() + 4);
    out.push_str(mantissa);
    let _ = write!(out, "e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.unsigned_abs());
    out
}

fn general_form(v: f64, precision: Option<usize>, alt: bool) -> String {
    let p = match precision {
        None => 6,
        Some(0) => 1,
        Some(p) => p,
    };
    let exp = if v == 0.0 {
        0
    } else {
        format!("{:.*e}", p - 1, v)
            .split_once('e')
            .and_then(|(_, e)| e.parse::<i64>().ok())
            .unwrap_or(0)
    };
    let body = if exp < p as i64 && exp >= -4 {
        format!("{:.*}", (p as i64 - 1 - exp) as usize, v)
    } else {
        exponent_form(v, p - 1)
    };
    if alt {
        body
    } else {
        strip_trailing_zeros(&body)
    }
}

fn strip_trailing_zeros(s: &str) -> String {
    let (mantissa, exp) = match s.find('e') {
        Some(i) => s.split_at(i),
        None => (s, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exp}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn forward(fmt: &str, args: &[LogArg]) -> (Vec<TokenOutcome>, Bytes) {
        let handler = ForwardingStringHandler::new(fmt);
        let mut out = BytesMut::new();
        let outcomes = handler.parse_args(args, &mut out);
        (outcomes, out.freeze())
    }

    fn render(fmt: &str, args: &[LogArg]) -> String {
        format_args(&ForwardingStringHandler::new(fmt), args)
    }

    #[test]
    fn test_values_read_back_in_lockstep() {
        let handler = ForwardingStringHandler::new("%d %s %f");
        let args = vec![LogArg::from(42), LogArg::from("x"), LogArg::from(3.5)];
        let mut out = BytesMut::new();
        let outcomes = handler.parse_args(&args, &mut out);
        assert_eq!(outcomes, vec![TokenOutcome::Emitted; 3]);

        let mut wire = out.freeze();
        assert_eq!(wire.len(), 4 + 2 + 8);
        let back = handler.read_args(&mut wire).unwrap();
        assert_eq!(back, args);
        assert_eq!(format_args(&handler, &back), "42 x 3.500000");
    }

    #[test]
    fn test_null_string_is_sent_as_text() {
        let (outcomes, wire) = forward("%s", &[LogArg::Str(None)]);
        assert_eq!(outcomes, vec![TokenOutcome::Emitted]);
        assert_eq!(&wire[..], b"\x06(null)");
    }

    #[test]
    fn test_integer_widths_follow_length_modifier() {
        let (_, wire) = forward(
            "%hhd %hu %d %lu %lld %zu",
            &[
                LogArg::Int(-1),
                LogArg::UInt(7),
                LogArg::Int(-2),
                LogArg::UInt(3),
                LogArg::Int(-4),
                LogArg::UInt(5),
            ],
        );
        assert_eq!(wire.len(), 2 + 2 + 4 + 8 + 8 + 8);
        assert_eq!(&wire[..2], &[0xFF, 0xFF]);
        assert_eq!(&wire[2..4], &[7, 0]);
    }

    #[test]
    fn test_runtime_width_precedes_value() {
        let handler = ForwardingStringHandler::new("[%*d] [%-*.*f]");
        let args = [
            LogArg::Int(5),
            LogArg::Int(42),
            LogArg::Int(8),
            LogArg::Int(2),
            LogArg::Float(1.5),
        ];
        let mut out = BytesMut::new();
        handler.parse_args(&args, &mut out);
        let mut wire = out.freeze();
        assert_eq!(wire.len(), 4 + 4 + 4 + 4 + 8);
        assert_eq!(&wire[..4], &[5, 0, 0, 0]);

        let back = handler.read_args(&mut wire).unwrap();
        assert_eq!(back, args);
        assert_eq!(format_args(&handler, &back), "[   42] [1.50    ]");
    }

    #[test]
    fn test_unknown_conversion_is_skipped() {
        let handler = ForwardingStringHandler::new("%d %q %d");
        let mut out = BytesMut::new();
        let outcomes = handler.parse_args(&[LogArg::Int(1), LogArg::Int(2)], &mut out);
        assert_eq!(
            outcomes,
            vec![
                TokenOutcome::Emitted,
                TokenOutcome::Skipped(SkipReason::UnknownConversion('q')),
                TokenOutcome::Emitted,
            ]
        );
        // the skipped token consumed no argument, so the second int lands in the last slot
        let mut wire = out.freeze();
        let back = handler.read_args(&mut wire).unwrap();
        assert_eq!(back, vec![LogArg::Int(1), LogArg::Int(2)]);
        assert_eq!(format_args(&handler, &back), "1 %q 2");
    }

    #[test]
    fn test_percent_has_no_payload() {
        let (outcomes, wire) = forward("100%%", &[]);
        assert_eq!(outcomes, vec![TokenOutcome::Emitted]);
        assert!(wire.is_empty());
        assert_eq!(render("100%%", &[]), "100%");
    }

    #[test]
    fn test_missing_and_mismatched_args_keep_framing() {
        let handler = ForwardingStringHandler::new("%d %f");
        let mut out = BytesMut::new();
        let outcomes = handler.parse_args(&[LogArg::from("oops")], &mut out);
        assert_eq!(
            outcomes,
            vec![
                TokenOutcome::Defaulted(SkipReason::TypeMismatch(ConversionKind::Signed)),
                TokenOutcome::Defaulted(SkipReason::MissingArgument),
            ]
        );
        let mut wire = out.freeze();
        assert_eq!(
            handler.read_args(&mut wire).unwrap(),
            vec![LogArg::Int(0), LogArg::Float(0.0)]
        );
    }

    #[test]
    fn test_read_rejects_short_and_long_input() {
        let handler = ForwardingStringHandler::new("%d");
        let mut short = Bytes::from_static(&[1, 0]);
        assert!(matches!(
            handler.read_args(&mut short),
            Err(WireError::Truncated { .. })
        ));
        let mut long = Bytes::from_static(&[1, 0, 0, 0, 9]);
        assert_eq!(handler.read_args(&mut long), Err(WireError::TrailingBytes(1)));
    }

    #[test]
    fn test_render_integers() {
        let n = LogArg::Int(42);
        assert_eq!(render("%5d|%-5d|%05d", &[n.clone(), n.clone(), n]), "   42|42   |00042");
        assert_eq!(render("%+d % d", &[LogArg::Int(3), LogArg::Int(3)]), "+3  3");
        assert_eq!(render("%.3d", &[LogArg::Int(-7)]), "-007");
        assert_eq!(render("%.0d|", &[LogArg::Int(0)]), "|");
        assert_eq!(
            render("%x %#X %o %#o", &[
                LogArg::UInt(255),
                LogArg::UInt(255),
                LogArg::UInt(8),
                LogArg::UInt(8)
            ]),
            "ff 0XFF 10 010"
        );
        assert_eq!(render("%hd", &[LogArg::Int(70000)]), "4464");
        assert_eq!(render("%u", &[LogArg::Int(-1)]), "4294967295");
    }

    #[test]
    fn test_render_floats() {
        assert_eq!(render("%+.2f", &[LogArg::Float(3.14159)]), "+3.14");
        assert_eq!(render("%e", &[LogArg::Float(12345.678)]), "1.234568e+04");
        assert_eq!(render("%E", &[LogArg::Float(0.00012)]), "1.200000E-04");
        assert_eq!(render("%g", &[LogArg::Float(3.5)]), "3.5");
        assert_eq!(render("%g", &[LogArg::Float(0.0001)]), "0.0001");
        assert_eq!(render("%g", &[LogArg::Float(100000.0)]), "100000");
        assert_eq!(render("%g", &[LogArg::Float(1e6)]), "1e+06");
        assert_eq!(render("%08.3f", &[LogArg::Float(-2.5)]), "-002.500");
        assert_eq!(render("%f", &[LogArg::Float(f64::INFINITY)]), "inf");
        assert_eq!(render("%F", &[LogArg::Float(f64::NAN)]), "NAN");
    }

    #[test]
    fn test_render_strings_chars_pointers() {
        assert_eq!(render("%.3s|%-6s|", &[LogArg::from("abcdef"), LogArg::from("ab")]), "abc|ab    |");
        assert_eq!(render("%s", &[LogArg::Str(None)]), "(null)");
        assert_eq!(render("%c%c", &[LogArg::Char(b'o'), LogArg::Char(b'k')]), "ok");
        assert_eq!(render("%p", &[LogArg::Ptr(0xdead)]), "0xdead");
        assert_eq!(render("%d and %d", &[LogArg::Int(1)]), "1 and %d");
    }

    #[test]
    fn test_oversized_runtime_counts_render_raw() {
        let min = LogArg::Int(i64::from(i32::MIN));
        assert_eq!(render("%*d %d", &[min, LogArg::Int(1), LogArg::Int(2)]), "%*d 2");
        let max = LogArg::Int(i64::from(i32::MAX));
        assert_eq!(render("%.*f", &[max, LogArg::Float(1.0)]), "%.*f");

        let widest = render("%*d|", &[LogArg::Int(-(MAX_FIELD_WIDTH as i64)), LogArg::Int(7)]);
        assert_eq!(widest.len(), MAX_FIELD_WIDTH + 1);
        assert!(widest.starts_with("7 ") && widest.ends_with(" |"));
    }
}
