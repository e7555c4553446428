//! Multi-pattern case-insensitive substring search.
//!
//! A query string is split into keywords and compiled once into a
//! [`SearchEngine`]: every keyword gets a rolling-hash fingerprint over its
//! first `m` bytes (`m` = shortest keyword length, capped at 4) and all
//! fingerprints are folded into one 64-bit Bloom filter. Scanning a
//! haystack then costs one hash update per byte; only windows whose Bloom
//! mask is covered by the filter are verified against the actual keyword
//! bytes. Cost is independent of the keyword count in the common
//! non-candidate case.
//!
//! The hash is a case-folding variant of Buzhash, so `"FLAC"` and `"flac"`
//! hash identically and verification only needs an ASCII-case-insensitive
//! byte compare.

/// Buzhash table: 256 random constants where each of the 32 bit columns
/// contains exactly 128 ones. Upper- and lowercase letters share an entry,
/// which makes the window hash case-insensitive by construction.
#[rustfmt::skip]
static BUZHASH_TABLE: [u32; 256] = [
    0xae56688c, 0x99531140, 0x030f64ac, 0x519951cc,
    0x835da0cc, 0xb18f08bd, 0xd0710294, 0xe66cc76c,
    0x6c006d6b, 0xdc70ffcb, 0xfbf65331, 0x5656f7e3,
    0x8bdf5f61, 0x8ec48fa6, 0xf5b56a5f, 0x86cade8c,
    0xf3ea7915, 0x79d93d75, 0xf08a2706, 0x6170fd3e,
    0x4aeedf1a, 0x74627950, 0x681cb2a6, 0x5c6281b8,
    0x40ba779b, 0x1ac5aedf, 0xd567f59e, 0x10d58569,
    0x6768ac12, 0x8b6aef21, 0xa8536ac7, 0xae59f950,
    0x9dda2d56, 0x5a656ee2, 0x33ddeaa4, 0xa0426548,
    0x792fb8b6, 0xb094040d, 0x1fe3ecba, 0x680f8dce,
    0xae4b120b, 0x90f8d7a9, 0xc7bb9c84, 0xe1cbde50,
    0x0a0cccff, 0x1e9d44b4, 0x79e08311, 0x1463330c,
    0x93a2de3a, 0xab731a92, 0x02b2f865, 0xa48efbbc,
    0x529fd95c, 0x7e2cf1c3, 0x5ace3467, 0x96afd1e5,
    0x6d165c73, 0xa3e40723, 0xdf27fd14, 0x73a956d1,
    0x68988af8, 0x4c2b1282, 0x9f22fa43, 0x05f93272,
    0x300c0d01, 0xf129db59, 0xf8daefd3, 0xe437d1e1,
    0x137f89a0, 0x6e3b2267, 0x285b5627, 0x8294c6a9,
    0x86d7855a, 0x9df7d66e, 0x33c3c757, 0x7be0f49c,
    0xae75e426, 0x9e3f25bf, 0x3d412518, 0x6f28ac44,
    0xb0f78454, 0x1b029a30, 0x79dbb1b7, 0xe57500c1,
    0x0bd79669, 0x2451a917, 0x8e98e5aa, 0x056d56c2,
    0x7158d15b, 0x2b4161ef, 0x0a04362d, 0x213c69e7,
    0x64322e22, 0x942f1055, 0x2fe50298, 0x72c55745,
    0x1f996ee9, 0xf129db59, 0xf8daefd3, 0xe437d1e1,
    0x137f89a0, 0x6e3b2267, 0x285b5627, 0x8294c6a9,
    0x86d7855a, 0x9df7d66e, 0x33c3c757, 0x7be0f49c,
    0xae75e426, 0x9e3f25bf, 0x3d412518, 0x6f28ac44,
    0xb0f78454, 0x1b029a30, 0x79dbb1b7, 0xe57500c1,
    0x0bd79669, 0x2451a917, 0x8e98e5aa, 0x056d56c2,
    0x7158d15b, 0x2b4161ef, 0x0a04362d, 0x641eff80,
    0xca3904f4, 0xc3ad0c69, 0xee04978a, 0xaf707848,
    0x91c97519, 0xc162ba9f, 0xf5c85dc7, 0xcae2c69f,
    0x5fddba8e, 0x073d6ccb, 0x07c0bd4b, 0x04bbb6d0,
    0x26020f54, 0xeb741a75, 0x1b23e92c, 0x791ea3e9,
    0x43febe50, 0xebf287a8, 0xf1fcab3a, 0x2f6a50b6,
    0x21de8cb8, 0xcac20d4b, 0x350f2be3, 0x378bf0d9,
    0x0ed5d3e3, 0x619c7c8f, 0x296477cd, 0x78a8367e,
    0x90f7092f, 0x3b55e467, 0x56e949b6, 0x6bb206b4,
    0xf9b67be4, 0x5d64cdbf, 0x900926c4, 0xdb3b6bef,
    0xc903b3d9, 0x4565d716, 0xa0cd3854, 0x565408f3,
    0x8a5bd169, 0x4a3554c6, 0x94b983d5, 0x0df113b0,
    0xe7fc4a09, 0xdfb8c8b7, 0xc46f2e61, 0x3fe84289,
    0x7980d20c, 0xf880d11a, 0x5bba09ac, 0xe367bbbc,
    0xee290c9b, 0xca43bd0a, 0x9a958f74, 0xdbf56cd3,
    0xacad7ae0, 0xf3888fe4, 0xd687800a, 0x160e5d73,
    0x6c7eb51c, 0x18434798, 0x4202315c, 0xa28676f4,
    0xa557dd74, 0xf72662c3, 0x3b99b817, 0x07ca43bb,
    0x469c814f, 0x7e3516ee, 0x90de11ba, 0x912e998b,
    0xb910b01b, 0x24d7aa1d, 0x5d522541, 0x08b4a6cd,
    0xb0a3b81f, 0x3b33a012, 0xc5c10231, 0x355185d6,
    0xa8f7d90b, 0xa565fcba, 0x8dcfac96, 0x9f125e7b,
    0x968ebcab, 0x408fc9fb, 0x20e27844, 0x1f117a1d,
    0xf65623de, 0xb78c03b6, 0x25a0f9e1, 0x0b2f211d,
    0x5e9c7393, 0xfc004b79, 0x5faac6e2, 0xa0fd541f,
    0xe982df45, 0x18adc29d, 0x63ce10a6, 0xaf4a7c4c,
    0x5024b426, 0x89b1c582, 0xa6bad136, 0x4dd5b07a,
    0x552c02c8, 0xbdc32cfb, 0x632ee33e, 0x4d8b0776,
    0x527362b3, 0xef12f92e, 0xd4ef3ea5, 0x4bc9cf80,
    0xf083ef4a, 0x6f680942, 0x7d9434c2, 0xb53a1cfb,
    0x9a89dbe4, 0x563d58bd, 0xc62e0b55, 0xe238784f,
    0x84803ad3, 0xd4b45ad1, 0xe4240b3f, 0xcc302b20,
    0x84ac5fb4, 0xfc086a7d, 0x941c0aa1, 0xdc942a28,
    0xd4963b39, 0xd43e3a2c, 0xd4ac6b28, 0xd42c3b38,
];

/// Rolling windows wider than this stop paying off; longer keywords are
/// fingerprinted on their first 4 bytes and verified in full.
const MAX_WINDOW: usize = 4;

/// Keyword search errors.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The query contained no usable keyword.
    #[error("search pattern contains no keywords")]
    EmptyPattern,
}

/// Accumulated match regions from a scan.
///
/// One bit per Bloom-filter region, NOT one bit per keyword. Two keywords
/// may share regions, so [`SearchEngine::matches_all`] is a
/// necessary-but-not-sufficient conjunctive test; see its docs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchSet(u64);

impl std::ops::BitOr for MatchSet {
    type Output = MatchSet;

    fn bitor(self, rhs: MatchSet) -> MatchSet {
        MatchSet(self.0 | rhs.0)
    }
}

struct Pattern {
    hash: u32,
    bytes: Box<[u8]>,
}

/// A compiled multi-keyword query.
pub struct SearchEngine {
    patterns: Vec<Pattern>,
    bloom: u64,
    window: usize,
}

impl SearchEngine {
    /// Compile `query`, split on `delimiter` (the whole string is one
    /// keyword when `None`). Empty tokens are skipped; a query with no
    /// usable keyword is an error.
    pub fn new(query: &str, delimiter: Option<char>) -> Result<Self, SearchError> {
        let tokens: Vec<&str> = match delimiter {
            Some(d) => query.split(d).filter(|t| !t.is_empty()).collect(),
            None if query.is_empty() => Vec::new(),
            None => vec![query],
        };
        if tokens.is_empty() {
            return Err(SearchError::EmptyPattern);
        }

        let window = tokens
            .iter()
            .map(|t| t.len())
            .min()
            .unwrap_or(0)
            .min(MAX_WINDOW);

        let mut bloom = 0u64;
        let patterns = tokens
            .into_iter()
            .map(|token| {
                let bytes: Box<[u8]> = token.as_bytes().into();
                let hash = hash_init(&bytes[..window]);
                bloom |= bloom_mask(hash);
                Pattern { hash, bytes }
            })
            .collect();

        Ok(Self {
            patterns,
            bloom,
            window,
        })
    }

    /// Number of compiled keywords.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Scan until the first keyword verifies, then stop.
    pub fn find_any(&self, haystack: &str) -> MatchSet {
        self.scan(haystack.as_bytes(), true).0
    }

    /// Scan until every Bloom region of the query has been seen (or the
    /// haystack ends).
    pub fn find_all(&self, haystack: &str) -> MatchSet {
        self.scan(haystack.as_bytes(), false).0
    }

    /// True if at least one keyword was found.
    pub fn matches_any(&self, matches: MatchSet) -> bool {
        matches.0 & self.bloom != 0
    }

    /// True if the accumulated regions cover the whole query filter.
    ///
    /// This is an approximation of "every keyword was found": distinct
    /// keywords can map to overlapping Bloom regions, in which case one
    /// match covers both. Designed behavior; an exact conjunctive test
    /// would need a per-keyword bitmask instead.
    pub fn matches_all(&self, matches: MatchSet) -> bool {
        matches.0 == self.bloom
    }

    /// Returns the accumulated regions and the number of windows visited
    /// (the latter is what the early-exit tests observe).
    fn scan(&self, hay: &[u8], stop_on_first: bool) -> (MatchSet, usize) {
        let m = self.window;
        if hay.len() < m {
            return (MatchSet::default(), 0);
        }

        let mut result = 0u64;
        let mut hash = hash_init(&hay[..m]);
        let mut pos = 0;
        let mut visited = 0;
        loop {
            visited += 1;
            let mask = bloom_mask(hash);
            if self.bloom & mask == mask {
                // Bloom candidate: verify against every keyword. Keywords
                // may be longer than the window, so the full byte compare
                // also weeds out filter false positives.
                for pattern in &self.patterns {
                    let rest = &hay[pos..];
                    if pattern.hash == hash
                        && rest.len() >= pattern.bytes.len()
                        && rest[..pattern.bytes.len()].eq_ignore_ascii_case(&pattern.bytes)
                    {
                        result |= mask;
                        if stop_on_first || (self.bloom & result) == self.bloom {
                            return (MatchSet(result), visited);
                        }
                    }
                }
            }

            if pos + m >= hay.len() {
                break;
            }
            hash = hash_update(hash, hay[pos], hay[pos + m], m);
            pos += 1;
        }
        (MatchSet(result), visited)
    }
}

fn hash_init(window: &[u8]) -> u32 {
    let len = window.len();
    window.iter().enumerate().fold(0u32, |hash, (i, &byte)| {
        hash ^ BUZHASH_TABLE[byte as usize].rotate_left((len - 1 - i) as u32)
    })
}

fn hash_update(hash: u32, outgoing: u8, incoming: u8, window: usize) -> u32 {
    hash.rotate_left(1)
        ^ BUZHASH_TABLE[outgoing as usize].rotate_left(window as u32)
        ^ BUZHASH_TABLE[incoming as usize]
}

/// Three bit positions derived from pairwise-coprime moduli, spread over
/// one u64 word.
fn bloom_mask(hash: u32) -> u64 {
    (1u64 << (hash % 23)) | (1u64 << (hash % 47)) | (1u64 << (hash % 61))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conjunctive_match() {
        let engine = SearchEngine::new("foo bar", Some(' ')).unwrap();
        assert!(engine.matches_all(engine.find_all("foobarbaz")));
        assert!(!engine.matches_all(engine.find_all("foobaz")));
    }

    #[test]
    fn test_case_insensitive_match() {
        let engine = SearchEngine::new("FOO BAR", Some(' ')).unwrap();
        assert!(engine.matches_all(engine.find_all("fooBARbaz")));
    }

    #[test]
    fn test_disjunctive_match_stops_early() {
        let engine = SearchEngine::new("foo bar", Some(' ')).unwrap();
        let haystack = "xxfooyyyyyyyyyyyyyyyyyyyy";
        let (matches, visited) = engine.scan(haystack.as_bytes(), true);
        assert!(engine.matches_any(matches));
        // Match sits at offset 2; scanning must not continue past it.
        assert_eq!(visited, 3);
        assert!(!engine.matches_all(matches) || engine.pattern_count() == 1);
    }

    #[test]
    fn test_no_match_in_short_haystack() {
        let engine = SearchEngine::new("foo", Some(' ')).unwrap();
        assert!(!engine.matches_any(engine.find_any("fo")));
        assert!(!engine.matches_any(engine.find_any("")));
    }

    #[test]
    fn test_pattern_longer_than_window_verified_in_full() {
        // window = min(6, 3) = 3, fingerprint over "foo" only
        let engine = SearchEngine::new("foobar baz", Some(' ')).unwrap();
        let matches = engine.find_all("fooqar baz");
        assert!(engine.matches_any(matches)); // "baz" is there
        assert!(!engine.matches_all(matches)); // "foobar" is not
        assert!(engine.matches_all(engine.find_all("foobar baz")));
    }

    #[test]
    fn test_window_capped_at_four() {
        let engine = SearchEngine::new("abcdefgh", Some(' ')).unwrap();
        assert!(engine.matches_all(engine.find_all("xxabcdefghxx")));
        // Same 4-byte prefix but the tail differs: the window hash hits,
        // full verification must reject.
        assert!(!engine.matches_any(engine.find_any("xxabcdxx")));
    }

    #[test]
    fn test_whole_query_as_single_pattern() {
        let engine = SearchEngine::new("foo bar", None).unwrap();
        assert!(engine.matches_any(engine.find_any("x foo bar x")));
        assert!(!engine.matches_any(engine.find_any("foobar")));
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(SearchEngine::new("", Some(' ')).is_err());
        assert!(SearchEngine::new("   ", Some(' ')).is_err());
        assert!(SearchEngine::new("", None).is_err());
    }

    #[test]
    fn test_match_set_accumulates_across_fields() {
        // The library combines directory and file matches with bitor.
        let engine = SearchEngine::new("artist song", Some(' ')).unwrap();
        let dir = engine.find_all("Some Artist - Album");
        let file = engine.find_all("01 - Song Title.flac");
        assert!(!engine.matches_all(dir));
        assert!(!engine.matches_all(file));
        assert!(engine.matches_all(dir | file));
    }
}
