//! Hash-chain match finder shared by the encoders.

const HASH_BITS: u32 = 14;
const HASH_SIZE: usize = 1 << HASH_BITS;
const MIN_MATCH: usize = 3;
/// Candidates examined per lookup.
const MAX_CHAIN: usize = 32;
const NIL: usize = usize::MAX;

pub(super) struct MatchFinder<'a> {
    data: &'a [u8],
    head: Vec<usize>,
    prev: Vec<usize>,
}

impl<'a> MatchFinder<'a> {
    pub(super) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            head: vec![NIL; HASH_SIZE],
            prev: vec![NIL; data.len()],
        }
    }

    fn hash(&self, pos: usize) -> usize {
        let v = u32::from(self.data[pos]) << 16
            | u32::from(self.data[pos + 1]) << 8
            | u32::from(self.data[pos + 2]);
        (v.wrapping_mul(0x9E37_79B1) >> (32 - HASH_BITS)) as usize
    }

    pub(super) fn insert(&mut self, pos: usize) {
        if pos + MIN_MATCH > self.data.len() {
            return;
        }
        let h = self.hash(pos);
        self.prev[pos] = self.head[h];
        self.head[h] = pos;
    }

    pub(super) fn insert_range(&mut self, pos: usize, len: usize) {
        for p in pos..pos + len {
            self.insert(p);
        }
    }

    /// Longest earlier match for the bytes at `pos`, as `(distance, length)`.
    ///
    /// Matches may overlap `pos`; the decoders copy byte by byte.
    pub(super) fn longest_match(
        &self,
        pos: usize,
        max_distance: usize,
        max_len: usize,
    ) -> Option<(usize, usize)> {
        if pos + MIN_MATCH > self.data.len() {
            return None;
        }
        let max_len = max_len.min(self.data.len() - pos);
        let mut candidate = self.head[self.hash(pos)];
        let mut best = (0, 0);

        for _ in 0..MAX_CHAIN {
            if candidate == NIL {
                break;
            }
            let distance = pos - candidate;
            if distance > max_distance {
                break;
            }
            let len = self.data[candidate..]
                .iter()
                .zip(&self.data[pos..pos + max_len])
                .take_while(|(a, b)| a == b)
                .count();
            if len > best.1 {
                best = (distance, len);
                if len == max_len {
                    break;
                }
            }
            candidate = self.prev[candidate];
        }

        (best.1 >= MIN_MATCH).then_some(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_repeat() {
        let data = b"abcdXabcdY";
        let mut finder = MatchFinder::new(data);
        finder.insert_range(0, 5);
        assert_eq!(finder.longest_match(5, 4096, 64), Some((5, 4)));
    }

    #[test]
    fn test_overlapping_run() {
        let data = b"aaaaaaaa";
        let mut finder = MatchFinder::new(data);
        finder.insert(0);
        assert_eq!(finder.longest_match(1, 4096, 64), Some((1, 7)));
    }

    #[test]
    fn test_respects_distance() {
        let data = b"abcXXXXXabc";
        let mut finder = MatchFinder::new(data);
        finder.insert_range(0, 8);
        assert_eq!(finder.longest_match(8, 4, 64), None);
    }
}
