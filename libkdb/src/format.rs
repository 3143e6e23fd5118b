//! The per-command format-string mini-language.
//!
//! A format string mixes literal text (echoed verbatim) with directives that
//! each read one typed field:
//!
//! | directive            | reads                                         |
//! |----------------------|-----------------------------------------------|
//! | `%c` / `%C`          | one keystroke (`%C` does not echo)            |
//! | `%d %u %x %X %o %i`  | an integer, `h`/`l`/`ll` select its size      |
//! | `%p`                 | a pointer-sized hexadecimal integer           |
//! | `%t`                 | a `task.thread` identifier                    |
//! | `%s` / `%S`          | a string of at most `width - 1` characters    |
//! | `%%`                 | nothing, echoes `%`                           |
//!
//! An optional decimal width may follow the `%`.

use crate::error::FormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    /// `%d`, a leading `-` is accepted.
    SignedDecimal,
    /// `%u`
    Decimal,
    /// `%o`
    Octal,
    /// `%x`, `%X` and `%p`
    Hex,
    /// `%i`: decimal, octal after a leading `0`, hex after `0x`.
    Any,
}

impl Radix {
    pub fn initial_base(&self) -> u64 {
        match self {
            Radix::SignedDecimal | Radix::Decimal | Radix::Any => 10,
            Radix::Octal => 8,
            Radix::Hex => 16,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Radix::SignedDecimal | Radix::Any)
    }

    /// Text echoed before the first digit.
    pub fn echo_prefix(&self) -> &'static str {
        match self {
            Radix::Hex => "0x",
            Radix::Octal => "0",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntSize {
    Half,
    Int,
    Long,
    LongLong,
}

impl IntSize {
    pub fn bits(&self) -> u32 {
        match self {
            IntSize::Half => 16,
            IntSize::Int => 32,
            IntSize::Long | IntSize::LongLong => 64,
        }
    }

    fn from_modifier(long_count: i32) -> Self {
        match long_count {
            i32::MIN..=-1 => IntSize::Half,
            0 => IntSize::Int,
            1 => IntSize::Long,
            _ => IntSize::LongLong,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive<'f> {
    Literal(&'f str),
    Percent,
    Char { echo: bool },
    Number { radix: Radix, width: usize, size: IntSize },
    ThreadId,
    Text { width: usize, live: bool },
}

impl Directive<'_> {
    /// Whether the directive consumes keystrokes.
    pub fn reads_input(&self) -> bool {
        !matches!(self, Directive::Literal(_) | Directive::Percent)
    }
}

/// Number of hex digits in a pointer.
pub const POINTER_DIGITS: usize = 2 * std::mem::size_of::<usize>();

/// Splits a format string into directives, lazily.
pub struct Tokens<'f> {
    format: &'f str,
    position: usize,
}

pub fn tokenize(format: &str) -> Tokens<'_> {
    Tokens {
        format,
        position: 0,
    }
}

impl<'f> Iterator for Tokens<'f> {
    type Item = Result<Directive<'f>, FormatError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.format[self.position..];
        if rest.is_empty() {
            return None;
        }
        if !rest.starts_with('%') {
            let literal_len = rest.find('%').unwrap_or(rest.len());
            self.position += literal_len;
            return Some(Ok(Directive::Literal(&rest[..literal_len])));
        }

        let start = self.position;
        let mut width = 0usize;
        let mut long_count = 0i32;
        let mut chars = rest.char_indices().skip(1);
        loop {
            let Some((index, c)) = chars.next() else {
                self.position = self.format.len();
                return Some(Err(FormatError::Truncated { position: start }));
            };
            let directive = match c {
                '0'..='9' => {
                    let digit = c as usize - '0' as usize;
                    let Some(wider) = width.checked_mul(10).and_then(|w| w.checked_add(digit)) else {
                        self.position = self.format.len();
                        return Some(Err(FormatError::WidthOverflow { position: start }));
                    };
                    width = wider;
                    continue;
                }
                'l' => {
                    long_count = (long_count + 1).min(2);
                    continue;
                }
                'h' => {
                    long_count = (long_count - 1).max(-1);
                    continue;
                }
                '%' => Directive::Percent,
                'c' => Directive::Char { echo: true },
                'C' => Directive::Char { echo: false },
                'd' => number(Radix::SignedDecimal, width, long_count),
                'u' => number(Radix::Decimal, width, long_count),
                'o' => number(Radix::Octal, width, long_count),
                'x' | 'X' => number(Radix::Hex, width, long_count),
                'i' => number(Radix::Any, width, long_count),
                'p' => Directive::Number {
                    radix: Radix::Hex,
                    width: POINTER_DIGITS,
                    size: IntSize::Long,
                },
                't' => Directive::ThreadId,
                's' | 'S' if width == 0 => {
                    self.position += index + 1;
                    return Some(Err(FormatError::MissingWidth { position: start }));
                }
                's' => Directive::Text { width, live: false },
                'S' => Directive::Text { width, live: true },
                other => {
                    self.position += index + other.len_utf8();
                    return Some(Err(FormatError::UnknownDirective {
                        directive: other,
                        position: start,
                    }));
                }
            };
            self.position += index + 1;
            return Some(Ok(directive));
        }
    }
}

fn number<'f>(radix: Radix, width: usize, long_count: i32) -> Directive<'f> {
    Directive::Number {
        radix,
        width,
        size: IntSize::from_modifier(long_count),
    }
}

/// Checks a format string without reading any input.
pub fn validate(format: &str) -> Result<(), FormatError> {
    tokenize(format).try_for_each(|token| token.map(|_| ()))
}

/// Number of input fields a (valid) format string reads.
pub fn field_count(format: &str) -> usize {
    tokenize(format)
        .filter(|token| matches!(token, Ok(d) if d.reads_input()))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed() {
        let tokens: Vec<_> = tokenize(" addr=%8lx len=%1x%%\n")
            .collect::<Result<_, _>>()
            .expect("valid format");
        assert_eq!(
            tokens,
            vec![
                Directive::Literal(" addr="),
                Directive::Number {
                    radix: Radix::Hex,
                    width: 8,
                    size: IntSize::Long
                },
                Directive::Literal(" len="),
                Directive::Number {
                    radix: Radix::Hex,
                    width: 1,
                    size: IntSize::Int
                },
                Directive::Percent,
                Directive::Literal("\n"),
            ]
        );
    }

    #[test]
    fn test_size_modifiers() {
        let size_of = |format: &str| match tokenize(format).next() {
            Some(Ok(Directive::Number { size, .. })) => size,
            other => panic!("unexpected token {:?}", other),
        };
        assert_eq!(size_of("%hd"), IntSize::Half);
        assert_eq!(size_of("%d"), IntSize::Int);
        assert_eq!(size_of("%ld"), IntSize::Long);
        assert_eq!(size_of("%llld"), IntSize::LongLong);
        assert_eq!(size_of("%p"), IntSize::Long);
    }

    #[test]
    fn test_validate_errors() {
        assert!(validate("%C").is_ok());
        assert!(validate("thread==%t\n").is_ok());
        assert_eq!(
            validate("x=%q"),
            Err(FormatError::UnknownDirective {
                directive: 'q',
                position: 2
            })
        );
        assert_eq!(validate("%s"), Err(FormatError::MissingWidth { position: 0 }));
        assert_eq!(validate("abc%"), Err(FormatError::Truncated { position: 3 }));
    }

    #[test]
    fn test_oversized_width() {
        let format = format!(" v=%{}x", "9".repeat(40));
        assert_eq!(validate(&format), Err(FormatError::WidthOverflow { position: 3 }));
        // the tokenizer stops after the error
        assert_eq!(tokenize(&format).count(), 2);
        assert!(validate(&format!("%{}x", usize::MAX)).is_ok());
    }

    #[test]
    fn test_field_count() {
        assert_eq!(field_count("-byte addr=%8x between[%8x-%8x]\n"), 3);
        assert_eq!(field_count("%%"), 0);
        assert_eq!(field_count(""), 0);
    }
}
