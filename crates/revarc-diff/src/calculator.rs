//! Word-granularity diff calculation between adjacent revisions.
//!
//! The calculator tokenizes both texts into word and whitespace runs, finds
//! a shortest edit script over the token sequences (Myers' greedy algorithm),
//! collects the matched runs as [`DiffBlock`]s, and linearizes the gaps
//! between them into insert/delete/replace parts.
//!
//! Parts are emitted with offsets into the *evolving* buffer: once the
//! prefix of the old text has been transformed, the buffer equals
//! `new[..b_pos] + old[a_pos..]`, so a gap starting at old position `a_pos`
//! sits at buffer position `b_pos`. Sequential replay therefore reproduces
//! the new text exactly.

use revarc_types::RevisionMeta;

use crate::{Diff, DiffBlock, DiffError, DiffPart};

/// A token is a run of non-whitespace or a run of whitespace characters,
/// addressed by its character range in the source text.
#[derive(Debug, Clone, Copy)]
struct Token {
    start: usize,
    end: usize,
}

/// Computes edit scripts between adjacent revisions of one article.
///
/// The calculator owns scratch state for the computation in flight so a
/// mid-task failure can be discarded with [`DiffCalculator::reset`] without
/// leaking into the next revision pair.
#[derive(Debug, Default)]
pub struct DiffCalculator {
    blocks: Vec<DiffBlock>,
}

impl DiffCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all partial state from an interrupted computation.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }

    /// Matched blocks of the most recent computation.
    pub fn blocks(&self) -> &[DiffBlock] {
        &self.blocks
    }

    /// Computes the edit script transforming `previous` into `current`.
    ///
    /// With no predecessor the revision is stored whole as a single
    /// full-revision part rather than diffed.
    pub fn calculate(
        &mut self,
        meta: RevisionMeta,
        previous: Option<&str>,
        current: &str,
    ) -> Result<Diff, DiffError> {
        self.reset();

        let Some(previous) = previous else {
            return Ok(Diff::new(meta, vec![DiffPart::full_revision(current)]));
        };

        let old_chars: Vec<char> = previous.chars().collect();
        let new_chars: Vec<char> = current.chars().collect();
        let old_tokens = tokenize(&old_chars);
        let new_tokens = tokenize(&new_chars);

        let matches = token_matches(&old_chars, &old_tokens, &new_chars, &new_tokens);
        self.collect_blocks(&old_tokens, &new_tokens, &matches, old_chars.len(), new_chars.len());

        let parts = self.linearize(&new_chars);
        Ok(Diff::new(meta, parts))
    }

    /// Merges consecutive matched token pairs into maximal aligned blocks
    /// and appends a zero-length sentinel block at the end of both texts so
    /// linearization sees the trailing gap.
    fn collect_blocks(
        &mut self,
        old_tokens: &[Token],
        new_tokens: &[Token],
        matches: &[(usize, usize)],
        old_len: usize,
        new_len: usize,
    ) {
        let mut run: Option<(usize, usize, usize, usize)> = None;

        for &(ai, bi) in matches {
            let a_tok = old_tokens[ai];
            let b_tok = new_tokens[bi];
            match run {
                Some((a_start, a_end, b_start, b_end))
                    if a_end == a_tok.start && b_end == b_tok.start =>
                {
                    run = Some((a_start, a_tok.end, b_start, b_tok.end));
                }
                Some((a_start, a_end, b_start, b_end)) => {
                    self.blocks.push(DiffBlock::new(a_start, a_end, b_start, b_end));
                    run = Some((a_tok.start, a_tok.end, b_tok.start, b_tok.end));
                }
                None => {
                    run = Some((a_tok.start, a_tok.end, b_tok.start, b_tok.end));
                }
            }
        }
        if let Some((a_start, a_end, b_start, b_end)) = run {
            self.blocks.push(DiffBlock::new(a_start, a_end, b_start, b_end));
        }
        self.blocks.push(DiffBlock::new(old_len, old_len, new_len, new_len));
    }

    /// Turns the gaps between matched blocks into sequentially applicable
    /// parts. See the module docs for the offset argument.
    fn linearize(&self, new_chars: &[char]) -> Vec<DiffPart> {
        let mut parts = Vec::new();
        let mut a_pos = 0usize;
        let mut b_pos = 0usize;

        for block in &self.blocks {
            let gap_a = block.a_start - a_pos;
            let gap_b = block.b_start - b_pos;

            if gap_a > 0 && gap_b > 0 {
                let text: String = new_chars[b_pos..block.b_start].iter().collect();
                parts.push(DiffPart::replace(b_pos, gap_a, text));
            } else if gap_a > 0 {
                parts.push(DiffPart::delete(b_pos, gap_a));
            } else if gap_b > 0 {
                let text: String = new_chars[b_pos..block.b_start].iter().collect();
                parts.push(DiffPart::insert(b_pos, text));
            }

            a_pos = block.a_end;
            b_pos = block.b_end;
        }
        parts
    }
}

/// Splits `chars` into alternating runs of non-whitespace and whitespace.
fn tokenize(chars: &[char]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let is_ws = chars[start].is_whitespace();
        let mut end = start + 1;
        while end < chars.len() && chars[end].is_whitespace() == is_ws {
            end += 1;
        }
        tokens.push(Token { start, end });
        start = end;
    }
    tokens
}

fn token_eq(a_chars: &[char], a: Token, b_chars: &[char], b: Token) -> bool {
    a_chars[a.start..a.end] == b_chars[b.start..b.end]
}

/// Myers' greedy shortest-edit-script over the token sequences, returning
/// the matched token index pairs in order.
fn token_matches(
    a_chars: &[char],
    a: &[Token],
    b_chars: &[char],
    b: &[Token],
) -> Vec<(usize, usize)> {
    let n = a.len() as isize;
    let m = b.len() as isize;
    if n == 0 || m == 0 {
        return Vec::new();
    }

    let max = n + m;
    let offset = max;
    let width = (2 * max + 1) as usize;
    let mut v = vec![0isize; width];
    let mut trace: Vec<Vec<isize>> = Vec::new();

    'outer: for d in 0..=max {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + offset) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1]
            } else {
                v[idx - 1] + 1
            };
            let mut y = x - k;
            while x < n
                && y < m
                && token_eq(a_chars, a[x as usize], b_chars, b[y as usize])
            {
                x += 1;
                y += 1;
            }
            v[idx] = x;
            if x >= n && y >= m {
                break 'outer;
            }
            k += 2;
        }
    }

    // Backtrack from (n, m), collecting diagonal moves as matches.
    let mut matches = Vec::new();
    let mut x = n;
    let mut y = m;
    for (d, v) in trace.iter().enumerate().rev() {
        let d = d as isize;
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[(k - 1 + offset) as usize] < v[(k + 1 + offset) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + offset) as usize];
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            matches.push((x as usize, y as usize));
        }
        if d > 0 {
            x = prev_x;
            y = prev_y;
        }
    }
    matches.reverse();
    matches
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use revarc_types::{ArticleId, Contributor, RevisionCounter, RevisionId, Timestamp};

    use super::*;
    use crate::DiffAction;

    fn meta(counter: u32) -> RevisionMeta {
        RevisionMeta {
            id: RevisionId::new(u64::from(counter)),
            article_id: ArticleId::new(1),
            counter: RevisionCounter::new(counter),
            timestamp: Timestamp::from_millis(i64::from(counter) * 1_000),
            contributor: Contributor::anonymous("10.0.0.1"),
            comment: String::new(),
            minor: false,
        }
    }

    fn roundtrip(old: &str, new: &str) -> Diff {
        let mut calc = DiffCalculator::new();
        let diff = calc.calculate(meta(2), Some(old), new).unwrap();
        assert_eq!(diff.apply(old).unwrap(), new, "replay mismatch {old:?} -> {new:?}");
        diff
    }

    #[test]
    fn no_predecessor_yields_full_revision() {
        let mut calc = DiffCalculator::new();
        let diff = calc.calculate(meta(1), None, "the first text").unwrap();
        assert!(diff.is_full_revision());
        assert_eq!(diff.parts().len(), 1);
    }

    #[test]
    fn identical_texts_yield_empty_script() {
        let diff = roundtrip("same text here", "same text here");
        assert!(diff.parts().is_empty());
    }

    #[test]
    fn pure_insert() {
        let diff = roundtrip("alpha gamma", "alpha beta gamma");
        assert!(diff
            .parts()
            .iter()
            .all(|p| p.action() == DiffAction::Insert));
    }

    #[test]
    fn pure_delete() {
        let diff = roundtrip("alpha beta gamma", "alpha gamma");
        assert!(diff
            .parts()
            .iter()
            .all(|p| p.action() == DiffAction::Delete));
    }

    #[test]
    fn replace_in_middle() {
        let diff = roundtrip("one two three", "one TWO three");
        assert!(diff
            .parts()
            .iter()
            .any(|p| p.action() == DiffAction::Replace));
    }

    #[test]
    fn disjoint_texts() {
        roundtrip("completely different", "nothing shared at all!");
    }

    #[test]
    fn empty_old_text() {
        let diff = roundtrip("", "fresh content");
        assert_eq!(diff.parts().len(), 1);
        assert_eq!(diff.parts()[0].action(), DiffAction::Insert);
    }

    #[test]
    fn empty_new_text() {
        let diff = roundtrip("goes away", "");
        assert_eq!(diff.parts().len(), 1);
        assert_eq!(diff.parts()[0].action(), DiffAction::Delete);
    }

    #[test]
    fn unicode_word_edit() {
        roundtrip("der Käfer läuft", "der Käfer fliegt");
    }

    #[test]
    fn reset_clears_scratch_state() {
        let mut calc = DiffCalculator::new();
        calc.calculate(meta(2), Some("a b c"), "a x c").unwrap();
        assert!(!calc.blocks().is_empty());
        calc.reset();
        assert!(calc.blocks().is_empty());
    }

    #[test]
    fn calculator_reusable_across_pairs() {
        let mut calc = DiffCalculator::new();
        let d1 = calc.calculate(meta(2), Some("a b"), "a c b").unwrap();
        let d2 = calc.calculate(meta(3), Some("a c b"), "a b").unwrap();
        assert_eq!(d1.apply("a b").unwrap(), "a c b");
        assert_eq!(d2.apply("a c b").unwrap(), "a b");
    }

    proptest! {
        #[test]
        fn replay_reproduces_new_text(
            old in "[ab ]{0,40}",
            new in "[ab ]{0,40}",
        ) {
            let mut calc = DiffCalculator::new();
            let diff = calc.calculate(meta(2), Some(&old), &new).unwrap();
            prop_assert_eq!(diff.apply(&old).unwrap(), new);
        }
    }
}
