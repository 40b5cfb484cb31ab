//! printf-style message templates.
//!
//! Record summaries are rendered from a template such as
//! `"Updated \"%s\" (%d revisions)"` and an ordered argument list.
//! Rendering is strict: every placeholder needs an argument of a compatible
//! type and every argument must be consumed. A mismatch is a [`FormatError`]
//! and no summary is produced.
//!
//! Placeholder syntax is `%[N$][flags][width][.precision]conversion`:
//!
//! | part        | meaning                                                     |
//! |-------------|-------------------------------------------------------------|
//! | `N$`        | 1-based argument position                                   |
//! | flags       | `-` left-justify, `+` force sign, `0`/space/`'c` padding    |
//! | width       | minimum field width                                         |
//! | `.precision`| digits after the point (`f`, `F`, `e`) or max chars (`s`)   |
//! | conversion  | `s d u f F e x X o b c`, or `%%` for a literal percent sign |

use std::fmt;

use serde_json::Value;

/// Error returned when a template does not match its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The template ended in the middle of a placeholder.
    Truncated,
    /// A placeholder used a conversion that is not supported.
    UnknownConversion {
        /// The conversion character
        conversion: char,
    },
    /// A positional placeholder referenced argument 0.
    InvalidPosition,
    /// A placeholder referenced an argument that was not supplied.
    MissingArgument {
        /// 1-based argument position
        position: usize,
    },
    /// Some arguments were never referenced by the template.
    UnusedArguments {
        /// Number of unreferenced arguments
        count: usize,
    },
    /// An argument could not be converted for its placeholder.
    TypeMismatch {
        /// 1-based argument position
        position: usize,
        /// The placeholder's conversion character
        conversion: char,
        /// JSON type of the offending argument
        found: &'static str,
    },
    /// A width or precision exceeded [`MAX_FIELD_WIDTH`].
    WidthOutOfRange {
        /// The requested width or precision, saturated at `usize::MAX`
        requested: usize,
    },
}

/// Largest width or precision a placeholder may request.
pub const MAX_FIELD_WIDTH: usize = u16::MAX as usize;

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "template ends inside a placeholder"),
            Self::UnknownConversion { conversion } => {
                write!(f, "unknown conversion '%{}'", conversion)
            }
            Self::InvalidPosition => write!(f, "argument positions start at 1"),
            Self::MissingArgument { position } => {
                write!(f, "missing argument #{}", position)
            }
            Self::UnusedArguments { count } => {
                write!(f, "{} argument(s) not referenced by the template", count)
            }
            Self::TypeMismatch {
                position,
                conversion,
                found,
            } => write!(
                f,
                "argument #{} is {} and cannot be formatted with '%{}'",
                position, found, conversion
            ),
            Self::WidthOutOfRange { requested } => write!(
                f,
                "field width {} exceeds the limit of {}",
                requested, MAX_FIELD_WIDTH
            ),
        }
    }
}

impl std::error::Error for FormatError {}

/// Renders a template with positional arguments.
///
/// # Errors
///
/// Returns a [`FormatError`] if a placeholder is malformed, an argument is
/// missing or has an incompatible type, or an argument is never used.
///
/// # Examples
///
/// ```
/// use audit_core::{render, FormatError};
/// use serde_json::json;
///
/// let summary = render("Deleted %s items by %s", &[json!("3"), json!("admin")]).unwrap();
/// assert_eq!(summary, "Deleted 3 items by admin");
///
/// let err = render("Deleted %s items by %s", &[json!("3")]).unwrap_err();
/// assert_eq!(err, FormatError::MissingArgument { position: 2 });
/// ```
pub fn render(template: &str, args: &[Value]) -> Result<String, FormatError> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::with_capacity(template.len());
    let mut used = vec![false; args.len()];
    let mut next_arg = 0;
    let mut i = 0;

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;

        if chars.get(i) == Some(&'%') {
            out.push('%');
            i += 1;
            continue;
        }

        let (spec, consumed) = Spec::parse(&chars[i..])?;
        i += consumed;

        let index = match spec.position {
            Some(position) => position - 1,
            None => {
                let index = next_arg;
                next_arg += 1;
                index
            }
        };
        let arg = args
            .get(index)
            .ok_or(FormatError::MissingArgument { position: index + 1 })?;
        used[index] = true;

        let body = spec.convert(arg, index + 1)?;
        out.push_str(&spec.pad(body));
    }

    let unused = used.iter().filter(|u| !**u).count();
    if unused > 0 {
        return Err(FormatError::UnusedArguments { count: unused });
    }

    Ok(out)
}

/// One parsed placeholder.
#[derive(Debug, Clone, PartialEq)]
struct Spec {
    position: Option<usize>,
    left: bool,
    plus: bool,
    pad: char,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

impl Spec {
    /// Parses a placeholder body (everything after `%`), returning it and the
    /// number of chars consumed.
    fn parse(chars: &[char]) -> Result<(Self, usize), FormatError> {
        let mut i = 0;

        let digits = count_digits(&chars[i..]);
        let mut position = None;
        if digits > 0 && chars.get(digits) == Some(&'$') {
            let n = parse_digits(&chars[..digits]);
            if n == 0 {
                return Err(FormatError::InvalidPosition);
            }
            position = Some(n);
            i = digits + 1;
        }

        let mut left = false;
        let mut plus = false;
        let mut pad = ' ';
        loop {
            match chars.get(i) {
                Some('-') => left = true,
                Some('+') => plus = true,
                Some('0') => pad = '0',
                Some(' ') => pad = ' ',
                Some('\'') => {
                    pad = *chars.get(i + 1).ok_or(FormatError::Truncated)?;
                    i += 1;
                }
                _ => break,
            }
            i += 1;
        }

        let digits = count_digits(&chars[i..]);
        let width = bounded(parse_digits(&chars[i..i + digits]))?;
        i += digits;

        let mut precision = None;
        if chars.get(i) == Some(&'.') {
            i += 1;
            let digits = count_digits(&chars[i..]);
            precision = Some(bounded(parse_digits(&chars[i..i + digits]))?);
            i += digits;
        }

        let conversion = *chars.get(i).ok_or(FormatError::Truncated)?;
        if !matches!(
            conversion,
            's' | 'd' | 'u' | 'f' | 'F' | 'e' | 'x' | 'X' | 'o' | 'b' | 'c'
        ) {
            return Err(FormatError::UnknownConversion { conversion });
        }

        let spec = Spec {
            position,
            left,
            plus,
            pad,
            width,
            precision,
            conversion,
        };
        Ok((spec, i + 1))
    }

    fn convert(&self, arg: &Value, position: usize) -> Result<String, FormatError> {
        let mismatch = || FormatError::TypeMismatch {
            position,
            conversion: self.conversion,
            found: json_type(arg),
        };

        let text = match self.conversion {
            's' => {
                let s = match arg {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return Err(mismatch()),
                };
                match self.precision {
                    Some(max) => s.chars().take(max).collect(),
                    None => s,
                }
            }
            'd' => {
                let n = as_integer(arg).ok_or_else(mismatch)?;
                if self.plus && n >= 0 {
                    format!("+{}", n)
                } else {
                    n.to_string()
                }
            }
            'u' => (as_integer(arg).ok_or_else(mismatch)? as u64).to_string(),
            'f' | 'F' => {
                let x = as_float(arg).ok_or_else(mismatch)?;
                let s = format!("{:.*}", self.precision.unwrap_or(6), x);
                if self.plus && x >= 0.0 {
                    format!("+{}", s)
                } else {
                    s
                }
            }
            'e' => {
                let x = as_float(arg).ok_or_else(mismatch)?;
                let s = format!("{:.*e}", self.precision.unwrap_or(6), x);
                // Exponents always carry a sign.
                let s = match s.split_once('e') {
                    Some((mantissa, exp)) if !exp.starts_with('-') => {
                        format!("{}e+{}", mantissa, exp)
                    }
                    _ => s,
                };
                if self.plus && x >= 0.0 {
                    format!("+{}", s)
                } else {
                    s
                }
            }
            'x' => format!("{:x}", as_integer(arg).ok_or_else(mismatch)? as u64),
            'X' => format!("{:X}", as_integer(arg).ok_or_else(mismatch)? as u64),
            'o' => format!("{:o}", as_integer(arg).ok_or_else(mismatch)? as u64),
            'b' => format!("{:b}", as_integer(arg).ok_or_else(mismatch)? as u64),
            'c' => {
                let code = as_integer(arg).ok_or_else(mismatch)?;
                let c = u32::try_from(code)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(mismatch)?;
                c.to_string()
            }
            _ => return Err(FormatError::UnknownConversion {
                conversion: self.conversion,
            }),
        };

        Ok(text)
    }

    fn pad(&self, body: String) -> String {
        let len = body.chars().count();
        if len >= self.width {
            return body;
        }
        let fill: String = std::iter::repeat(self.pad).take(self.width - len).collect();

        if self.left {
            return body + &fill;
        }

        let numeric = matches!(self.conversion, 'd' | 'f' | 'F' | 'e');
        if self.pad == '0' && numeric && (body.starts_with('-') || body.starts_with('+')) {
            let (sign, rest) = body.split_at(1);
            return format!("{}{}{}", sign, fill, rest);
        }

        fill + &body
    }
}

fn count_digits(chars: &[char]) -> usize {
    chars.iter().take_while(|c| c.is_ascii_digit()).count()
}

fn bounded(value: usize) -> Result<usize, FormatError> {
    if value > MAX_FIELD_WIDTH {
        return Err(FormatError::WidthOutOfRange { requested: value });
    }
    Ok(value)
}

fn parse_digits(chars: &[char]) -> usize {
    chars.iter().fold(0usize, |acc, c| {
        acc.saturating_mul(10)
            .saturating_add(c.to_digit(10).unwrap_or(0) as usize)
    })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A number recognized inside a string value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub(crate) fn truncate(self) -> i64 {
        match self {
            Numeric::Int(n) => n,
            Numeric::Float(x) => x.trunc() as i64,
        }
    }

    fn to_f64(self) -> f64 {
        match self {
            Numeric::Int(n) => n as f64,
            Numeric::Float(x) => x,
        }
    }
}

/// Parses a numeric string such as `"42"`, `" 7 "`, `"-3.5"` or `"1e3"`.
///
/// Infinities and NaN are not numeric.
pub(crate) fn parse_numeric(s: &str) -> Option<Numeric> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<i64>() {
        return Some(Numeric::Int(n));
    }
    // Rust accepts "inf"/"nan" spellings; only plain decimal forms count.
    if !s.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+' || c == '.') {
        return None;
    }
    s.parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .map(Numeric::Float)
}

fn as_numeric(value: &Value) -> Option<Numeric> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Numeric::Int)
            .or_else(|| n.as_u64().map(|u| Numeric::Int(u as i64)))
            .or_else(|| n.as_f64().map(Numeric::Float)),
        Value::String(s) => parse_numeric(s),
        Value::Bool(b) => Some(Numeric::Int(i64::from(*b))),
        _ => None,
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    as_numeric(value).map(Numeric::truncate)
}

fn as_float(value: &Value) -> Option<f64> {
    as_numeric(value).map(Numeric::to_f64)
}
