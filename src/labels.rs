use std::collections::HashMap;
use std::sync::OnceLock;

const FILES: [char; 8] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];
const RANKS: [char; 8] = ['1', '2', '3', '4', '5', '6', '7', '8'];
const KNIGHT_OFFSETS: [(i32, i32); 8] = [
    (-2, -1),
    (-1, -2),
    (-2, 1),
    (1, -2),
    (2, -1),
    (-1, 2),
    (2, 1),
    (1, 2),
];
const PROMOTION_PIECES: [char; 4] = ['q', 'r', 'b', 'n'];

static LABELS: OnceLock<Vec<String>> = OnceLock::new();
static INDEX: OnceLock<HashMap<&'static str, usize>> = OnceLock::new();

fn encode(l1: i32, n1: i32, l2: i32, n2: i32) -> String {
    format!(
        "{}{}{}{}",
        FILES[l1 as usize], RANKS[n1 as usize], FILES[l2 as usize], RANKS[n2 as usize]
    )
}

fn build() -> Vec<String> {
    let mut labels = Vec::new();

    // Queen-line and knight destinations from every origin square.
    // The generation order is load-bearing: cache rows store bare indices
    // into this sequence, so it must be identical across restarts.
    for l1 in 0..8i32 {
        for n1 in 0..8i32 {
            let mut destinations: Vec<(i32, i32)> = Vec::new();
            destinations.extend((0..8).map(|t| (t, n1)));
            destinations.extend((0..8).map(|t| (l1, t)));
            destinations.extend((-7..8).map(|t| (l1 + t, n1 + t)));
            destinations.extend((-7..8).map(|t| (l1 + t, n1 - t)));
            destinations.extend(KNIGHT_OFFSETS.iter().map(|&(a, b)| (l1 + a, n1 + b)));

            for (l2, n2) in destinations {
                if (l2, n2) != (l1, n1) && (0..8).contains(&l2) && (0..8).contains(&n2) {
                    labels.push(encode(l1, n1, l2, n2));
                }
            }
        }
    }

    // Promotions: straight push, then capture toward the a-file, then
    // toward the h-file, for each promotable piece. Suffixed encodings
    // never collide with the four-character moves above.
    for l1 in 0..8i32 {
        let file = FILES[l1 as usize];
        for piece in PROMOTION_PIECES {
            labels.push(format!("{file}2{file}1{piece}"));
            labels.push(format!("{file}7{file}8{piece}"));
            if l1 > 0 {
                let left = FILES[l1 as usize - 1];
                labels.push(format!("{file}2{left}1{piece}"));
                labels.push(format!("{file}7{left}8{piece}"));
            }
            if l1 < 7 {
                let right = FILES[l1 as usize + 1];
                labels.push(format!("{file}2{right}1{piece}"));
                labels.push(format!("{file}7{right}8{piece}"));
            }
        }
    }

    labels
}

/// All move encodings in their fixed order. Built once per process.
pub fn all() -> &'static [String] {
    LABELS.get_or_init(build).as_slice()
}

/// Number of move encodings; every policy vector has this length.
pub fn count() -> usize {
    all().len()
}

/// Index of a move encoding in the action space.
pub fn index_of(label: &str) -> Option<usize> {
    let index = INDEX.get_or_init(|| {
        all()
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect()
    });
    index.get(label).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_label_count() {
        // 1792 queen-line + knight pairs, 176 promotion encodings
        assert_eq!(all().len(), 1968);
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        assert_eq!(all(), build().as_slice());
    }

    #[test]
    fn test_known_prefix_order() {
        let labels = all();
        // From a1: along the first rank, then the a-file, then the long
        // diagonal, then the two in-board knight hops.
        assert_eq!(labels[0], "a1b1");
        assert_eq!(labels[6], "a1h1");
        assert_eq!(labels[7], "a1a2");
        assert_eq!(labels[13], "a1a8");
        assert_eq!(labels[14], "a1b2");
        assert_eq!(labels[20], "a1h8");
        assert_eq!(labels[21], "a1c2");
        assert_eq!(labels[22], "a1b3");
        // Next origin: a2, first rank-wise again.
        assert_eq!(labels[23], "a2b2");
    }

    #[test]
    fn test_no_duplicates() {
        let unique: HashSet<&str> = all().iter().map(|s| s.as_str()).collect();
        assert_eq!(unique.len(), all().len());
    }

    #[test]
    fn test_promotions_present() {
        for label in ["e7e8q", "e2e1q", "a7b8n", "h2g1r", "d7d8b"] {
            assert!(index_of(label).is_some(), "missing promotion {}", label);
        }
        assert!(index_of("a7b8").is_some());
        assert!(index_of("i9i9").is_none());
    }

    #[test]
    fn test_index_roundtrip() {
        let labels = all();
        for idx in [0, 1, 500, 1791, 1967] {
            assert_eq!(index_of(&labels[idx]), Some(idx));
        }
    }
}
