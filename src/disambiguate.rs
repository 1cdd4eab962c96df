use crate::places::SearchCandidate;

/// Picks the first candidate whose formatted address has a second-to-last
/// comma-separated field starting with `locale_hint` (case-sensitive, after
/// trimming the field). `None` means no confident match.
///
/// An empty hint matches every candidate with at least two address fields.
pub fn select<'a>(
    candidates: &'a [SearchCandidate],
    locale_hint: &str,
) -> Option<&'a SearchCandidate> {
    candidates.iter().find(|candidate| {
        region_field(&candidate.formatted_address)
            .is_some_and(|field| field.starts_with(locale_hint))
    })
}

/// `"1 Main St, Springfield, IL 62701, USA"` -> `"IL 62701"`.
fn region_field(formatted_address: &str) -> Option<&str> {
    let mut fields = formatted_address.rsplit(',');
    fields.next()?;
    fields.next().map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(address: &str) -> SearchCandidate {
        SearchCandidate {
            formatted_address: address.into(),
            ..SearchCandidate::default()
        }
    }

    fn springfields() -> Vec<SearchCandidate> {
        vec![
            candidate("1 Main St, Springfield, IL, USA"),
            candidate("2 Oak Rd, Springfield, OH, USA"),
        ]
    }

    #[test]
    fn selects_candidate_matching_region() {
        let candidates = springfields();
        let chosen = select(&candidates, "OH").unwrap();
        assert_eq!(chosen.formatted_address, "2 Oak Rd, Springfield, OH, USA");
    }

    #[test]
    fn returns_none_without_match() {
        assert!(select(&springfields(), "ZZ").is_none());
        assert!(select(&[], "OH").is_none());
    }

    #[test]
    fn prefers_earliest_match_and_handles_postal_suffix() {
        let candidates = vec![
            candidate("Somewhere"),
            candidate("9 Elm St, Columbus, OH 43004, USA"),
            candidate("2 Oak Rd, Springfield, OH, USA"),
        ];
        let chosen = select(&candidates, "OH").unwrap();
        assert_eq!(chosen.formatted_address, "9 Elm St, Columbus, OH 43004, USA");
    }

    #[test]
    fn match_is_case_sensitive() {
        assert!(select(&springfields(), "oh").is_none());
    }

    #[test]
    fn empty_hint_takes_first_usable_candidate() {
        let candidates = springfields();
        let chosen = select(&candidates, "").unwrap();
        assert_eq!(chosen.formatted_address, "1 Main St, Springfield, IL, USA");
    }
}
