//! printf-style format strings, scanned once
//!
//! A format string becomes a list of [`Segment`]s: literal text and
//! conversion specifications ([`FormatData`]). Scanning never fails; text
//! that does not form a complete specification is kept as a literal, and
//! unknown conversion characters are kept as specifications for the
//! caller to skip.

/// Largest width or precision rendered. Literal counts above it scan as
/// `MAX_FIELD_WIDTH + 1`.
pub const MAX_FIELD_WIDTH: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthModifier {
    #[default]
    None,
    /// `hh`
    Char,
    /// `h`
    Short,
    /// `l`
    Long,
    /// `ll`
    LongLong,
    /// `j`
    IntMax,
    /// `z`
    Size,
    /// `t`
    PtrDiff,
    /// `L`
    LongDouble,
}

impl LengthModifier {
    /// Integer payload width in bytes for this modifier.
    pub fn int_width(self) -> usize {
        match self {
            LengthModifier::Char | LengthModifier::Short => 2,
            LengthModifier::None | LengthModifier::LongDouble => 4,
            LengthModifier::Long
            | LengthModifier::LongLong
            | LengthModifier::IntMax
            | LengthModifier::Size
            | LengthModifier::PtrDiff => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FormatFlags {
    /// `-`
    pub left: bool,
    /// `0`
    pub zero: bool,
    /// `+`
    pub plus: bool,
    /// ` `
    pub space: bool,
    /// `#`
    pub alt: bool,
}

/// Width or precision of a specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Count {
    #[default]
    Unspecified,
    Literal(usize),
    /// `*`: supplied as an `int` argument ahead of the value.
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Signed,
    Unsigned,
    Float,
    Str,
    Pointer,
    Char,
    Percent,
    Unknown,
}

/// One conversion specification, e.g. `%-08.3ld`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatData {
    pub conversion: char,
    pub length: LengthModifier,
    pub flags: FormatFlags,
    pub width: Count,
    pub precision: Count,
    /// The specification exactly as written, `%` included.
    pub raw: String,
}

impl FormatData {
    pub fn kind(&self) -> ConversionKind {
        match self.conversion {
            'd' | 'i' => ConversionKind::Signed,
            'u' | 'o' | 'x' | 'X' => ConversionKind::Unsigned,
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'a' | 'A' => ConversionKind::Float,
            's' => ConversionKind::Str,
            'p' => ConversionKind::Pointer,
            'c' => ConversionKind::Char,
            '%' => ConversionKind::Percent,
            _ => ConversionKind::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Spec(FormatData),
}

/// Split `fmt` into literal text and specifications.
pub fn scan(fmt: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = fmt.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            literal.push(c);
            continue;
        }

        let mut flags = FormatFlags::default();
        while let Some(&(_, f)) = chars.peek() {
            match f {
                '-' => flags.left = true,
                '0' => flags.zero = true,
                '+' => flags.plus = true,
                ' ' => flags.space = true,
                '#' => flags.alt = true,
                _ => break,
            }
            chars.next();
        }

        let width = scan_count(&mut chars);
        let precision = match chars.peek() {
            Some(&(_, '.')) => {
                chars.next();
                match scan_count(&mut chars) {
                    Count::Unspecified => Count::Literal(0),
                    count => count,
                }
            }
            _ => Count::Unspecified,
        };

        let mut length = LengthModifier::None;
        if let Some(&(_, m)) = chars.peek() {
            length = match m {
                'h' => LengthModifier::Short,
                'l' => LengthModifier::Long,
                'j' => LengthModifier::IntMax,
                'z' => LengthModifier::Size,
                't' => LengthModifier::PtrDiff,
                'L' => LengthModifier::LongDouble,
                _ => LengthModifier::None,
            };
            if length != LengthModifier::None {
                chars.next();
                match (length, chars.peek()) {
                    (LengthModifier::Short, Some(&(_, 'h'))) => {
                        chars.next();
                        length = LengthModifier::Char;
                    }
                    (LengthModifier::Long, Some(&(_, 'l'))) => {
                        chars.next();
                        length = LengthModifier::LongLong;
                    }
                    _ => {}
                }
            }
        }

        let Some((end, conversion)) = chars.next() else {
            // dangling specification at the end of the string
            literal.push_str(&fmt[start..]);
            break;
        };
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(Segment::Spec(FormatData {
            conversion,
            length,
            flags,
            width,
            precision,
            raw: fmt[start..end + conversion.len_utf8()].to_string(),
        }));
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    segments
}

fn scan_count(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Count {
    if let Some(&(_, '*')) = chars.peek() {
        chars.next();
        return Count::Runtime;
    }
    let mut value: Option<usize> = None;
    while let Some(&(_, d)) = chars.peek() {
        let Some(digit) = d.to_digit(10) else {
            break;
        };
        let next = value.unwrap_or(0) * 10 + digit as usize;
        value = Some(next.min(MAX_FIELD_WIDTH + 1));
        chars.next();
    }
    value.map_or(Count::Unspecified, Count::Literal)
}
