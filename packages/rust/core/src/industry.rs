//! Mapping from CRM industry-sector values to opportunity industries.
//!
//! The CRM stores the GICS sector either as its two-digit code or as the
//! sector label. Both forms are recognised; anything else is unmapped.

/// `(GICS code, GICS sector label, opportunity industry)`.
const SECTORS: &[(&str, &str, &str)] = &[
    ("10", "Energy", "Energy - Oil and Gas"),
    ("15", "Materials", "Manufacturing"),
    ("20", "Industrials", "Manufacturing"),
    ("25", "Consumer Discretionary", "Retail"),
    ("30", "Consumer Staples", "Consumer Goods"),
    ("35", "Health Care", "Healthcare"),
    ("40", "Financials", "Financial Services"),
    ("45", "Information Technology", "Software and Internet"),
    ("50", "Communication Services", "Telecommunications"),
    ("55", "Utilities", "Energy - Power and Utilities"),
    ("60", "Real Estate", "Real Estate and Construction"),
];

/// Opportunity industry for a CRM sector value, or `None` when unmapped.
pub fn map_industry(sector: &str) -> Option<&'static str> {
    let sector = sector.trim();
    if sector.is_empty() {
        return None;
    }

    SECTORS
        .iter()
        .find(|(code, label, _)| *code == sector || label.eq_ignore_ascii_case(sector))
        .map(|(_, _, industry)| *industry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_codes_and_labels() {
        assert_eq!(map_industry("45"), Some("Software and Internet"));
        assert_eq!(map_industry("Information Technology"), Some("Software and Internet"));
        assert_eq!(map_industry("health care"), Some("Healthcare"));
        assert_eq!(map_industry(" 40 "), Some("Financial Services"));
    }

    #[test]
    fn unknown_values_are_unmapped() {
        assert_eq!(map_industry(""), None);
        assert_eq!(map_industry("99"), None);
        assert_eq!(map_industry("Space Mining"), None);
    }

    #[test]
    fn every_code_is_unique() {
        let mut codes: Vec<_> = SECTORS.iter().map(|(code, _, _)| *code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), SECTORS.len());
    }
}
