// ABOUTME: Levenshtein edit distance used to rank option and package names
// ABOUTME: Operates on chars so multi-byte names are measured correctly

/// Number of single-character insertions, deletions or substitutions
/// needed to turn `a` into `b`
pub fn levenshtein(a: &str, b: &str) -> usize {
    let b_chars: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0; b_chars.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}

/// The candidate closest to `query`; ties go to the earliest candidate
pub fn closest<'a, I>(query: &str, candidates: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    candidates
        .into_iter()
        .map(|c| (levenshtein(query, c), c))
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, c)| c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("flaw", "lawn"), 2);
    }

    #[test]
    fn test_levenshtein_multibyte() {
        assert_eq!(levenshtein("nixö", "nixo"), 1);
    }

    #[test]
    fn test_closest_prefers_smallest_distance() {
        let names = [
            "networking.firewall.enable",
            "networking.hostName",
            "services.openssh.enable",
        ];
        assert_eq!(
            closest("networking.firewal.enable", names),
            Some("networking.firewall.enable")
        );
    }

    #[test]
    fn test_closest_tie_goes_to_first() {
        assert_eq!(closest("ab", ["aa", "bb"]), Some("aa"));
        assert_eq!(closest("x", std::iter::empty()), None);
    }
}
