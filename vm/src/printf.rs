// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! `printf`-style formatting over VM words. Every argument is one word;
//! `%s` arguments are addresses resolved through the active [`Memory`].

use core::iter;

use thiserror::Error;

use crate::{arch::Word, error::MemoryError, memory::Memory};

/// Most bytes a single call may produce. Widths and precisions above it are
/// rejected before anything is allocated.
pub const OUTPUT_LIMIT: usize = 1 << 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("formatted output would exceed {} bytes", OUTPUT_LIMIT)]
    Overflow,
}

pub type FormatResult<T> = Result<T, FormatError>;

#[derive(Default)]
struct Directive {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

impl Directive {
    fn pad(
        &self,
        out: &mut Vec<u8>,
        prefix: &[u8],
        body: &[u8],
        numeric: bool,
    ) -> FormatResult<()> {
        let fill = self
            .width
            .unwrap_or(0)
            .saturating_sub(prefix.len() + body.len());
        if out.len() + fill + prefix.len() + body.len() > OUTPUT_LIMIT {
            return Err(FormatError::Overflow);
        }
        if self.left {
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
            out.extend(iter::repeat(b' ').take(fill));
        } else if self.zero && numeric && self.precision.is_none() {
            out.extend_from_slice(prefix);
            out.extend(iter::repeat(b'0').take(fill));
            out.extend_from_slice(body);
        } else {
            out.extend(iter::repeat(b' ').take(fill));
            out.extend_from_slice(prefix);
            out.extend_from_slice(body);
        }
        Ok(())
    }

    /// Applies the precision as a minimum digit count.
    fn digits(&self, digits: String, is_zero: bool) -> Vec<u8> {
        match self.precision {
            Some(0) if is_zero => vec![],
            Some(precision) if precision > digits.len() => {
                let mut padded = vec![b'0'; precision - digits.len()];
                padded.extend_from_slice(digits.as_bytes());
                padded
            }
            _ => digits.into_bytes(),
        }
    }
}

struct Formatter<'a, M: Memory + ?Sized, A: Iterator<Item = Word>> {
    memory: &'a M,
    args: A,
    out: Vec<u8>,
}

impl<M: Memory + ?Sized, A: Iterator<Item = Word>> Formatter<'_, M, A> {
    fn next_arg(&mut self) -> Word {
        self.args.next().unwrap_or(0)
    }

    fn convert(&mut self, directive: &Directive, conversion: u8) -> FormatResult<bool> {
        match conversion {
            b'd' | b'i' => {
                let value = self.next_arg();
                let sign: &[u8] = if value < 0 {
                    b"-"
                } else if directive.plus {
                    b"+"
                } else if directive.space {
                    b" "
                } else {
                    b""
                };
                let body = directive.digits(value.unsigned_abs().to_string(), value == 0);
                directive.pad(&mut self.out, sign, &body, true)?;
            }
            b'u' => {
                let value = self.next_arg() as u64;
                let body = directive.digits(value.to_string(), value == 0);
                directive.pad(&mut self.out, b"", &body, true)?;
            }
            b'x' | b'X' => {
                let value = self.next_arg() as u64;
                let (digits, prefix): (String, &[u8]) = if conversion == b'x' {
                    (format!("{:x}", value), &b"0x"[..])
                } else {
                    (format!("{:X}", value), &b"0X"[..])
                };
                let prefix: &[u8] = if directive.alternate && value != 0 { prefix } else { b"" };
                let body = directive.digits(digits, value == 0);
                directive.pad(&mut self.out, prefix, &body, true)?;
            }
            b'o' => {
                let value = self.next_arg() as u64;
                let mut body = directive.digits(format!("{:o}", value), value == 0);
                if directive.alternate && body.first() != Some(&b'0') {
                    body.insert(0, b'0');
                }
                directive.pad(&mut self.out, b"", &body, true)?;
            }
            b'p' => {
                let value = self.next_arg() as u64;
                let digits = format!("{:x}", value);
                directive.pad(&mut self.out, b"0x", digits.as_bytes(), false)?;
            }
            b'c' => {
                let value = self.next_arg() as u8;
                directive.pad(&mut self.out, b"", &[value], false)?;
            }
            b's' => {
                let address = self.next_arg();
                let mut string = if address == 0 {
                    b"(null)".to_vec()
                } else {
                    self.memory.read_c_string(address)?
                };
                if let Some(precision) = directive.precision {
                    string.truncate(precision);
                }
                directive.pad(&mut self.out, b"", &string, false)?;
            }
            b'%' => self.out.push(b'%'),
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Parses a run of decimal digits, saturating instead of overflowing.
fn parse_number(format: &[u8], index: &mut usize) -> Option<usize> {
    let start = *index;
    let mut value = 0usize;
    while let Some(digit) = format.get(*index).filter(|byte| byte.is_ascii_digit()) {
        value = value
            .saturating_mul(10)
            .saturating_add(usize::from(digit - b'0'));
        *index += 1;
    }
    (*index > start).then_some(value)
}

fn bounded(value: usize) -> FormatResult<usize> {
    if value > OUTPUT_LIMIT {
        return Err(FormatError::Overflow);
    }
    Ok(value)
}

/// Renders `format` with `args`, returning the produced bytes. Conversions
/// that are not understood are copied through unchanged. Output longer than
/// [`OUTPUT_LIMIT`] is [`FormatError::Overflow`].
pub fn format<M: Memory + ?Sized>(
    memory: &M,
    format: &[u8],
    args: &[Word],
) -> FormatResult<Vec<u8>> {
    let mut formatter = Formatter {
        memory,
        args: args.iter().copied(),
        out: Vec::with_capacity(format.len()),
    };

    let mut index = 0;
    while index < format.len() {
        if format[index] != b'%' {
            formatter.out.push(format[index]);
            index += 1;
            continue;
        }

        let start = index;
        index += 1;
        let mut directive = Directive::default();

        while let Some(&flag) = format.get(index) {
            match flag {
                b'-' => directive.left = true,
                b'0' => directive.zero = true,
                b'+' => directive.plus = true,
                b' ' => directive.space = true,
                b'#' => directive.alternate = true,
                _ => break,
            }
            index += 1;
        }

        if format.get(index) == Some(&b'*') {
            index += 1;
            let width = formatter.next_arg();
            if width < 0 {
                directive.left = true;
            }
            directive.width = Some(bounded(width.unsigned_abs() as usize)?);
        } else {
            directive.width = parse_number(format, &mut index).map(bounded).transpose()?;
        }

        if format.get(index) == Some(&b'.') {
            index += 1;
            if format.get(index) == Some(&b'*') {
                index += 1;
                let precision = formatter.next_arg();
                if precision >= 0 {
                    directive.precision = Some(bounded(precision as usize)?);
                }
            } else {
                directive.precision =
                    Some(bounded(parse_number(format, &mut index).unwrap_or(0))?);
            }
        }

        while format
            .get(index)
            .is_some_and(|byte| b"hlLjzt".contains(byte))
        {
            index += 1;
        }

        let converted = match format.get(index) {
            Some(&conversion) => formatter.convert(&directive, conversion)?,
            None => false,
        };
        if converted {
            index += 1;
        } else {
            let end = (index + 1).min(format.len());
            if formatter.out.len() + (end - start) > OUTPUT_LIMIT {
                return Err(FormatError::Overflow);
            }
            formatter.out.extend_from_slice(&format[start..end]);
            index = end;
        }
    }

    Ok(formatter.out)
}
