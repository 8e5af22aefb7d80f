//! `sort` query parameter: comma-separated names, `-` prefix for descending.

use std::collections::BTreeSet;

pub const SORT_ARG: &str = "sort";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortField {
    pub name: String,
    pub descending: bool,
}

impl SortField {
    pub fn asc(name: impl Into<String>) -> Self {
        SortField {
            name: name.into(),
            descending: false,
        }
    }

    pub fn desc(name: impl Into<String>) -> Self {
        SortField {
            name: name.into(),
            descending: true,
        }
    }
}

/// Parse `raw` keeping only names in `allowed`, in request order.
pub fn parse_sort(raw: &str, allowed: &BTreeSet<String>) -> Vec<SortField> {
    raw.split(',')
        .filter_map(|part| {
            let part = part.trim();
            let name = part.trim_start_matches('-');
            allowed.contains(name).then(|| SortField {
                name: name.to_string(),
                descending: part.starts_with('-'),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_are_dropped() {
        let allowed: BTreeSet<String> = ["name", "age"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            parse_sort("-age,password,name", &allowed),
            vec![SortField::desc("age"), SortField::asc("name")]
        );
        assert!(parse_sort("", &allowed).is_empty());
    }

    #[test]
    fn only_leading_dashes_mark_descending() {
        let allowed: BTreeSet<String> = ["name", "age"].iter().map(|s| s.to_string()).collect();
        assert!(parse_sort("name-", &allowed).is_empty());
        assert_eq!(
            parse_sort(" -age , name", &allowed),
            vec![SortField::desc("age"), SortField::asc("name")]
        );
    }
}
