//! Mapping of sanitized listings into [`CanonicalRecord`]s
//!
//! Text fields are upper-cased and stripped of standalone region codes,
//! numeric fields take the leading numeric prefix of their text and default to
//! zero. Only structural problems (a record that is not an object, a required
//! text field that is missing or not a scalar) are reported as errors.

use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

use super::types::CanonicalRecord;

/// Region codes removed from `country` and `shop_name` by default
pub const DEFAULT_DENYLIST: &[&str] = &[
    "AL", "AD", "AM", "AT", "BY", "BE", "BA", "BG", "HR", "CY", "CZ", "DK", "EE", "FI", "FR",
    "GE", "DE", "GR", "HU", "IS", "IE", "IT", "KZ", "XK", "LV", "LI", "LT", "LU", "MT", "MD",
    "MC", "ME", "NL", "MK", "NO", "PL", "PT", "RO", "RU", "SM", "RS", "SK", "SI", "ES", "SE",
    "CH", "TR", "UA", "UK", "VA", "BR",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Record is not a JSON object")]
    NotAnObject,
    #[error("Required field '{0}' is missing")]
    MissingField(&'static str),
    #[error("Field '{field}' must be a scalar, got {kind}")]
    InvalidField {
        field: &'static str,
        kind: &'static str,
    },
}

/// Compiled set of tokens removed as whole words
#[derive(Debug, Clone)]
pub struct Denylist {
    tokens: Vec<String>,
    pattern: Option<Regex>,
}

impl Denylist {
    /// Compile a denylist. Tokens are upper-cased, blanks are ignored and
    /// multi-word fragments are matched with single spaces.
    pub fn new<I, S>(tokens: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tokens: Vec<String> = tokens
            .into_iter()
            .map(|t| collapse_whitespace(&t.as_ref().to_uppercase()))
            .filter(|t| !t.is_empty())
            .collect();
        // Longest first so a fragment wins over a code it contains
        tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        tokens.dedup();

        let pattern = if tokens.is_empty() {
            None
        } else {
            let alternation = tokens
                .iter()
                .map(|t| regex::escape(t))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&format!(r"\b(?:{alternation})\b"))?)
        };

        Ok(Self { tokens, pattern })
    }

    /// The default region codes plus `extra`
    pub fn with_extra<S: AsRef<str>>(extra: &[S]) -> Result<Self, regex::Error> {
        Self::new(
            DEFAULT_DENYLIST
                .iter()
                .map(|t| t.to_string())
                .chain(extra.iter().map(|t| t.as_ref().to_string())),
        )
    }

    pub fn standard() -> Result<Self, regex::Error> {
        Self::new(DEFAULT_DENYLIST)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    fn remove_tokens<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match &self.pattern {
            Some(pattern) => pattern.replace_all(text, ""),
            None => Cow::Borrowed(text),
        }
    }
}

/// Turns sanitized JSON records into canonical listings
#[derive(Debug, Clone)]
pub struct Normalizer {
    denylist: Denylist,
}

impl Normalizer {
    pub fn new(denylist: Denylist) -> Self {
        Self { denylist }
    }

    pub fn denylist(&self) -> &Denylist {
        &self.denylist
    }

    /// Upper-case `text`, drop denylisted tokens, collapse whitespace and trim.
    ///
    /// Applying it to its own output returns the same string.
    pub fn clean_invalid_chars(&self, text: &str) -> String {
        let mut current = collapse_whitespace(&text.to_uppercase());
        loop {
            let next = collapse_whitespace(&self.denylist.remove_tokens(&current));
            // Removing a token can bring two halves of a fragment together
            if next == current {
                return current;
            }
            current = next;
        }
    }

    pub fn normalize(&self, raw: &Value) -> Result<CanonicalRecord, NormalizeError> {
        let fields = raw.as_object().ok_or(NormalizeError::NotAnObject)?;
        let get = |name: &str| fields.get(name);

        let shop_source = if is_truthy(get("ismarketplace")) {
            "marketplaceseller"
        } else {
            "site"
        };

        Ok(CanonicalRecord {
            country: optional_text(get("country"), "country")?
                .map(|c| self.clean_invalid_chars(&c)),
            brand: required_text(get("brand"), "brand")?.to_uppercase(),
            product_id: integer_value(get("sku")),
            product_name: required_text(get("model"), "model")?.to_uppercase(),
            shop_name: optional_text(get(shop_source), shop_source)?
                .map(|s| self.clean_invalid_chars(&s)),
            product_category_id: integer_value(get("categoryId")),
            price: float_value(get("price")),
            url: required_text(get("url"), "url")?.to_lowercase(),
        })
    }

    /// A listing is stored only when it is available and has a positive price
    pub fn is_eligible(raw: &Value, record: &CanonicalRecord) -> bool {
        is_truthy(raw.get("availability")) && record.price > 0.0
    }
}

/// `null`, a missing field and `false` are falsy, everything else is truthy
pub fn is_truthy(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn optional_text(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<String>, NormalizeError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(other) => Err(NormalizeError::InvalidField {
            field,
            kind: kind_of(other),
        }),
    }
}

fn required_text(value: Option<&Value>, field: &'static str) -> Result<String, NormalizeError> {
    optional_text(value, field)?.ok_or(NormalizeError::MissingField(field))
}

fn integer_value(value: Option<&Value>) -> i64 {
    match value {
        Some(Value::String(s)) => leading_integer(s),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        _ => 0,
    }
}

fn float_value(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::String(s)) => leading_float(s),
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        _ => 0.0,
    };
    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Integer formed by the leading digits of `text`, after optional whitespace
/// and sign. Returns 0 when there are no digits and saturates on overflow.
pub fn leading_integer(text: &str) -> i64 {
    let trimmed = text.trim_start();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let mut value: i64 = 0;
    for byte in digits.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(byte - b'0');
        value = if negative {
            value.saturating_mul(10).saturating_sub(digit)
        } else {
            value.saturating_mul(10).saturating_add(digit)
        };
    }
    value
}

/// Float formed by the leading `[sign]digits[.digits][e[sign]digits]` prefix
/// of `text`. Returns 0.0 when no number starts the string.
pub fn leading_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let bytes = trimmed.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'-') | Some(b'+')) {
        end += 1;
    }
    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut has_digits = end > int_start;

    if bytes.get(end) == Some(&b'.') && bytes.get(end + 1).is_some_and(u8::is_ascii_digit) {
        end += 1;
        while bytes.get(end).is_some_and(u8::is_ascii_digit) {
            end += 1;
        }
        has_digits = true;
    }

    if !has_digits {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'-') | Some(b'+')) {
            exp_end += 1;
        }
        if bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
                exp_end += 1;
            }
            end = exp_end;
        }
    }

    trimmed[..end].parse().unwrap_or(0.0)
}
