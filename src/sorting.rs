//! Ordering of image sequences
//!
//! The order chosen here becomes the manifest's entry order and therefore
//! the permanent frame numbering of a dataset. It is computed once, when
//! the reader is built.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// How to order an image sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortingMethod {
    /// Plain string order: "a10" before "a2"
    Lexicographical,
    /// Digit runs compare numerically: "a2" before "a10"
    Natural,
    /// Keep the caller's order
    #[default]
    Predefined,
    /// Uniform shuffle, different on every run
    Random,
}

impl SortingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortingMethod::Lexicographical => "lexicographical",
            SortingMethod::Natural => "natural",
            SortingMethod::Predefined => "predefined",
            SortingMethod::Random => "random",
        }
    }
}

impl fmt::Display for SortingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortingMethod {
    type Err = ManifestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexicographical" => Ok(SortingMethod::Lexicographical),
            "natural" => Ok(SortingMethod::Natural),
            "predefined" => Ok(SortingMethod::Predefined),
            "random" => Ok(SortingMethod::Random),
            other => Err(ManifestError::Config(format!(
                "Unknown sorting method: {}",
                other
            ))),
        }
    }
}

/// Sort strings with the given method
pub fn sort<S: AsRef<str>>(items: Vec<S>, method: SortingMethod) -> Vec<S> {
    sort_by_key(items, method, |s| s.as_ref().to_string())
}

/// Sort arbitrary items by a string key.
///
/// Lexicographical and natural sorts are stable.
pub fn sort_by_key<T, F>(mut items: Vec<T>, method: SortingMethod, key: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    match method {
        SortingMethod::Lexicographical => items.sort_by_cached_key(|item| key(item)),
        SortingMethod::Natural => {
            let mut keyed: Vec<(String, T)> = items.into_iter().map(|i| (key(&i), i)).collect();
            keyed.sort_by(|a, b| natural_cmp(&a.0, &b.0));
            items = keyed.into_iter().map(|(_, i)| i).collect();
        }
        SortingMethod::Predefined => {}
        SortingMethod::Random => items.shuffle(&mut rand::thread_rng()),
    }
    items
}

enum Chunk<'a> {
    Digits(&'a str),
    Text(&'a str),
}

fn chunks(s: &str) -> impl Iterator<Item = Chunk<'_>> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let first = rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(end);
        rest = tail;
        Some(if digits {
            Chunk::Digits(head)
        } else {
            Chunk::Text(head)
        })
    })
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a_trim = a.trim_start_matches('0');
    let b_trim = b.trim_start_matches('0');
    a_trim
        .len()
        .cmp(&b_trim.len())
        .then_with(|| a_trim.cmp(b_trim))
        // "01" after "1" so that equal values still order deterministically
        .then_with(|| a.len().cmp(&b.len()))
}

/// Natural ("OS") ordering: digit runs compare by numeric value, text runs
/// compare case-insensitively with the exact string as the final tie-break.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        let ord = match (left.next(), right.next()) {
            (None, None) => break,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Chunk::Digits(x)), Some(Chunk::Digits(y))) => cmp_digits(x, y),
            (Some(Chunk::Digits(_)), Some(Chunk::Text(_))) => Ordering::Less,
            (Some(Chunk::Text(_)), Some(Chunk::Digits(_))) => Ordering::Greater,
            (Some(Chunk::Text(x)), Some(Chunk::Text(y))) => x.to_lowercase().cmp(&y.to_lowercase()),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.cmp(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<&'static str> {
        vec!["b2.jpg", "a10.jpg", "a2.jpg"]
    }

    #[test]
    fn test_natural() {
        assert_eq!(
            sort(sample(), SortingMethod::Natural),
            vec!["a2.jpg", "a10.jpg", "b2.jpg"]
        );
    }

    #[test]
    fn test_lexicographical() {
        assert_eq!(
            sort(sample(), SortingMethod::Lexicographical),
            vec!["a10.jpg", "a2.jpg", "b2.jpg"]
        );
    }

    #[test]
    fn test_predefined_keeps_order() {
        assert_eq!(sort(sample(), SortingMethod::Predefined), sample());
    }

    #[test]
    fn test_random_is_permutation() {
        let items: Vec<String> = (0..50).map(|i| format!("img{}.png", i)).collect();
        let mut shuffled = sort(items.clone(), SortingMethod::Random);
        assert_eq!(shuffled.len(), items.len());
        shuffled.sort();
        let mut expected = items;
        expected.sort();
        assert_eq!(shuffled, expected);
    }

    #[test]
    fn test_natural_cmp_details() {
        assert_eq!(natural_cmp("img2", "img10"), Ordering::Less);
        assert_eq!(natural_cmp("img10", "img10"), Ordering::Equal);
        assert_eq!(natural_cmp("dir/a", "dir/a1"), Ordering::Less);
        assert_eq!(natural_cmp("Frame_3", "frame_20"), Ordering::Less);
        assert_eq!(natural_cmp("x1", "x01"), Ordering::Less);
        assert_eq!(natural_cmp("99999999999999999999999", "100000000000000000000000"), Ordering::Less);
    }

    #[test]
    fn test_sort_by_key() {
        let items = vec![(1, "f10"), (2, "f9"), (3, "f1")];
        let sorted = sort_by_key(items, SortingMethod::Natural, |(_, name)| name.to_string());
        let ids: Vec<i32> = sorted.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("natural".parse::<SortingMethod>().unwrap(), SortingMethod::Natural);
        assert_eq!("RANDOM".parse::<SortingMethod>().unwrap(), SortingMethod::Random);
        assert!("alphabetical".parse::<SortingMethod>().is_err());
    }
}
