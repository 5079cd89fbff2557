//! Structured recommendation extracted from valuation narrative.
//!
//! The valuation stage asks the generator to state a rating, a base-case
//! target and the implied upside. This module pulls those three fields out of
//! free text. Anything it cannot find stays unset and displays as
//! [`UNDETERMINED`].

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Display value for a field that was never determined.
pub const UNDETERMINED: &str = "undetermined";

static RATING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bRATING\s*:\s*[*_\[\s]*(BUY|HOLD|SELL)\b").expect("valid rating regex")
});

static TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bbase\b[^\n$]*?\btarget\b[^\n$]*?\$\s?([0-9][0-9,]*(?:\.[0-9]+)?)")
        .expect("valid target regex")
});

static UPSIDE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bupside\b[^\n%]*?([+-]?[0-9]+(?:\.[0-9]+)?)\s*%").expect("valid upside regex")
});

/// Investment rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rating {
    Buy,
    Hold,
    Sell,
}

impl Rating {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Hold => "HOLD",
            Self::Sell => "SELL",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "HOLD" => Some(Self::Hold),
            "SELL" => Some(Self::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rating, base-case target and upside. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Recommendation {
    pub rating: Option<Rating>,
    /// Formatted with a leading `$`, e.g. `$142.50`.
    pub target_price: Option<String>,
    /// Formatted with a trailing `%`, e.g. `+38%`.
    pub upside: Option<String>,
}

impl Recommendation {
    /// Extract whatever fields `text` states explicitly.
    pub fn extract(text: &str) -> Self {
        let rating = RATING_RE
            .captures(text)
            .and_then(|c| Rating::parse(&c[1]));
        let target_price = TARGET_RE
            .captures(text)
            .map(|c| format!("${}", &c[1]));
        let upside = UPSIDE_RE.captures(text).map(|c| {
            let value = &c[1];
            if value.starts_with(['+', '-']) {
                format!("{value}%")
            } else {
                format!("+{value}%")
            }
        });

        Self {
            rating,
            target_price,
            upside,
        }
    }

    /// True when no field was determined.
    pub fn is_empty(&self) -> bool {
        self.rating.is_none() && self.target_price.is_none() && self.upside.is_none()
    }

    pub fn rating_label(&self) -> &str {
        self.rating.as_ref().map_or(UNDETERMINED, Rating::as_str)
    }

    pub fn target_label(&self) -> &str {
        self.target_price.as_deref().unwrap_or(UNDETERMINED)
    }

    pub fn upside_label(&self) -> &str {
        self.upside.as_deref().unwrap_or(UNDETERMINED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_all_fields() {
        let text = "\
**Current Price vs Target:**
- Current: $98
- Base Target: $135.50
- Upside: +38% over 3 years (11% annualized)

**RATING: BUY** based on 38% upside and a contained risk profile";

        let rec = Recommendation::extract(text);
        assert_eq!(rec.rating, Some(Rating::Buy));
        assert_eq!(rec.target_price.as_deref(), Some("$135.50"));
        assert_eq!(rec.upside.as_deref(), Some("+38%"));
    }

    #[test]
    fn rating_tolerates_emphasis_and_case() {
        let rec = Recommendation::extract("Final call: **Rating:** *hold* given balanced risks.");
        assert_eq!(rec.rating, Some(Rating::Hold));

        let rec = Recommendation::extract("RATING: [SELL]");
        assert_eq!(rec.rating, Some(Rating::Sell));
    }

    #[test]
    fn negative_upside_keeps_sign() {
        let rec = Recommendation::extract("Downside risk dominates; upside: -12% to base target.");
        assert_eq!(rec.upside.as_deref(), Some("-12%"));
    }

    #[test]
    fn target_requires_base_case_context() {
        let rec = Recommendation::extract("Bull Case Price Target: $200\nBase case price target of $1,250");
        assert_eq!(rec.target_price.as_deref(), Some("$1,250"));
    }

    #[test]
    fn missing_fields_are_undetermined() {
        let rec = Recommendation::extract("The valuation looks full but no explicit call is made.");
        assert!(rec.is_empty());
        assert_eq!(rec.rating_label(), UNDETERMINED);
        assert_eq!(rec.target_label(), UNDETERMINED);
        assert_eq!(rec.upside_label(), UNDETERMINED);
    }
}
