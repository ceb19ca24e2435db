//! Field-level PII detection.
//!
//! Detection runs once per field per batch against a [`FieldSample`]: the
//! field name plus the first string value seen for it. Detectors are tried
//! in registration order and the first match tags the field. Built-in order:
//! - Email addresses
//! - Credit card numbers
//! - SSNs
//! - Phone numbers
//! - IP addresses
//! - Person names
//!
//! Each built-in fires on either a field-name keyword or the value shape.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Email pattern
    static ref EMAIL_PATTERN: Regex = Regex::new(
        r"^[^\s@]+@[^\s@]+\.[^\s@]+$"
    ).unwrap();

    /// Credit card pattern (16 digits, optional separators every 4)
    static ref CC_PATTERN: Regex = Regex::new(
        r"^\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}$"
    ).unwrap();

    /// SSN pattern
    static ref SSN_PATTERN: Regex = Regex::new(
        r"^\d{3}-\d{2}-\d{4}$"
    ).unwrap();

    /// Phone number shape: digits, spaces, dashes, parens, leading +
    static ref PHONE_PATTERN: Regex = Regex::new(
        r"^\+?[\d\s\-()]+$"
    ).unwrap();

    /// ISO-style dates share the phone shape and are excluded from it
    static ref DATE_LIKE_PATTERN: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}"
    ).unwrap();

    /// IP address pattern (IPv4)
    static ref IP_PATTERN: Regex = Regex::new(
        r"^(?:\d{1,3}\.){3}\d{1,3}$"
    ).unwrap();
}

/// Minimum digit count before a phone-shaped value counts as a phone number.
const MIN_PHONE_DIGITS: usize = 7;

/// What a detector gets to look at for one field.
#[derive(Debug, Clone)]
pub struct FieldSample<'a> {
    pub name: &'a str,
    pub lower_name: String,
    /// First non-empty string value of the field in the batch, if any.
    pub value: Option<&'a str>,
}

impl<'a> FieldSample<'a> {
    pub fn new(name: &'a str, value: Option<&'a str>) -> Self {
        Self {
            name,
            lower_name: name.to_lowercase(),
            value,
        }
    }

    pub fn name_contains_any(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|k| self.lower_name.contains(k))
    }
}

/// A single PII heuristic.
pub trait PiiDetector: Send + Sync {
    /// Tag applied to matching fields, e.g. `"email"`.
    fn pii_type(&self) -> &str;

    fn matches(&self, sample: &FieldSample<'_>) -> bool;
}

/// Keyword-or-shape detector used for most built-ins.
pub struct PatternDetector {
    pii_type: &'static str,
    name_keywords: &'static [&'static str],
    pattern: &'static Regex,
    exclude: Option<&'static Regex>,
    min_digits: usize,
}

impl PatternDetector {
    fn value_matches(&self, value: &str) -> bool {
        let value = value.trim();
        if !self.pattern.is_match(value) {
            return false;
        }
        if self.exclude.map_or(false, |ex| ex.is_match(value)) {
            return false;
        }
        self.min_digits == 0
            || value.chars().filter(|c| c.is_ascii_digit()).count() >= self.min_digits
    }
}

impl PiiDetector for PatternDetector {
    fn pii_type(&self) -> &str {
        self.pii_type
    }

    fn matches(&self, sample: &FieldSample<'_>) -> bool {
        sample.name_contains_any(self.name_keywords)
            || sample.value.map_or(false, |v| self.value_matches(v))
    }
}

/// Person names: a name-like field holding at least two words.
pub struct PersonNameDetector;

impl PiiDetector for PersonNameDetector {
    fn pii_type(&self) -> &str {
        "name"
    }

    fn matches(&self, sample: &FieldSample<'_>) -> bool {
        sample.lower_name.contains("name")
            && sample
                .value
                .map_or(false, |v| v.split_whitespace().count() >= 2)
    }
}

/// Closure-backed detector for callers adding their own heuristics.
pub struct FnDetector<F> {
    pii_type: String,
    predicate: F,
}

impl<F> FnDetector<F>
where
    F: Fn(&FieldSample<'_>) -> bool + Send + Sync,
{
    pub fn new(pii_type: &str, predicate: F) -> Self {
        Self {
            pii_type: pii_type.to_string(),
            predicate,
        }
    }
}

impl<F> PiiDetector for FnDetector<F>
where
    F: Fn(&FieldSample<'_>) -> bool + Send + Sync,
{
    fn pii_type(&self) -> &str {
        &self.pii_type
    }

    fn matches(&self, sample: &FieldSample<'_>) -> bool {
        (self.predicate)(sample)
    }
}

pub fn email_detector() -> PatternDetector {
    PatternDetector {
        pii_type: "email",
        name_keywords: &["email"],
        pattern: &EMAIL_PATTERN,
        exclude: None,
        min_digits: 0,
    }
}

pub fn credit_card_detector() -> PatternDetector {
    PatternDetector {
        pii_type: "credit_card",
        name_keywords: &["card_number", "credit_card", "creditcard", "cc_number"],
        pattern: &CC_PATTERN,
        exclude: None,
        min_digits: 0,
    }
}

pub fn ssn_detector() -> PatternDetector {
    PatternDetector {
        pii_type: "ssn",
        name_keywords: &["ssn", "social_security"],
        pattern: &SSN_PATTERN,
        exclude: None,
        min_digits: 0,
    }
}

pub fn phone_detector() -> PatternDetector {
    PatternDetector {
        pii_type: "phone",
        name_keywords: &["phone", "mobile"],
        pattern: &PHONE_PATTERN,
        exclude: Some(&*DATE_LIKE_PATTERN),
        min_digits: MIN_PHONE_DIGITS,
    }
}

pub fn ip_address_detector() -> PatternDetector {
    PatternDetector {
        pii_type: "ip_address",
        name_keywords: &["ip_address", "ipaddress"],
        pattern: &IP_PATTERN,
        exclude: None,
        min_digits: 0,
    }
}

/// Ordered detector cascade. First match wins.
pub struct DetectorChain {
    detectors: Vec<Box<dyn PiiDetector>>,
}

impl Default for DetectorChain {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DetectorChain {
    /// A chain with no detectors.
    pub fn empty() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// The built-in cascade.
    pub fn builtin() -> Self {
        Self::empty()
            .with(email_detector())
            .with(credit_card_detector())
            .with(ssn_detector())
            .with(phone_detector())
            .with(ip_address_detector())
            .with(PersonNameDetector)
    }

    /// Append a detector; it runs after every detector already registered.
    pub fn with<D: PiiDetector + 'static>(mut self, detector: D) -> Self {
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn push(&mut self, detector: Box<dyn PiiDetector>) {
        self.detectors.push(detector);
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Return the PII type of the first matching detector.
    pub fn detect(&self, sample: &FieldSample<'_>) -> Option<&str> {
        self.detectors
            .iter()
            .find(|d| d.matches(sample))
            .map(|d| d.pii_type())
    }
}
