//! Segmentation lattice over one sentence.
//!
//! Each node in the lattice is one vocabulary piece spanning a range of
//! symbols; an edge exists between two nodes when one ends where the other
//! begins. The lattice answers three questions for the trainer:
//!
//! - the max-score segmentation (Viterbi), used for the objective and for
//!   hard token counts,
//! - the expected traversal count of every piece under the full segmentation
//!   posterior (forward-backward), which makes the E-step counts "expected"
//!   rather than a single hard segmentation's counts,
//! - the n best segmentations, used by the pruner to find how a piece would
//!   be re-segmented if it were removed.

use crate::error::{Result, TrainerError};
use dary_heap::OctonaryHeap;

/// Sentinel piece id for the bos/eos boundary nodes.
const NO_PIECE: u32 = u32::MAX;

/// Safety cap on the n-best agenda so degenerate lattices cannot blow up.
const MAX_AGENDA_SIZE: usize = 100_000;

#[derive(Debug, Clone)]
struct Node {
    piece_id: u32,
    pos: usize,
    len: usize,
    score: f64,
    /// Best path score from bos up to and including this node (Viterbi).
    backtrace_score: f64,
    prev: Option<u32>,
}

/// Segmentation lattice for a single sentence.
#[derive(Debug)]
pub struct Lattice<'a> {
    sentence: &'a str,
    chars: Vec<char>,
    nodes: Vec<Node>,
    /// Nodes starting at each symbol boundary; `begin_nodes[len]` holds eos.
    begin_nodes: Vec<Vec<u32>>,
    /// Nodes ending at each symbol boundary; `end_nodes[0]` holds bos.
    end_nodes: Vec<Vec<u32>>,
    viterbi_done: bool,
}

impl<'a> Lattice<'a> {
    /// Build an empty lattice for `sentence` with only bos/eos nodes.
    pub fn new(sentence: &'a str) -> Self {
        let chars: Vec<char> = sentence.chars().collect();
        let len = chars.len();
        let mut begin_nodes = vec![Vec::new(); len + 1];
        let mut end_nodes = vec![Vec::new(); len + 1];

        let bos = Node {
            piece_id: NO_PIECE,
            pos: 0,
            len: 0,
            score: 0.0,
            backtrace_score: 0.0,
            prev: None,
        };
        let eos = Node {
            piece_id: NO_PIECE,
            pos: len,
            len: 0,
            score: 0.0,
            backtrace_score: f64::NEG_INFINITY,
            prev: None,
        };
        let nodes = vec![bos, eos];
        end_nodes[0].push(0);
        begin_nodes[len].push(1);

        Self {
            sentence,
            chars,
            nodes,
            begin_nodes,
            end_nodes,
            viterbi_done: false,
        }
    }

    /// Sentence length in symbols.
    #[inline]
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Whether the sentence is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The symbols of the sentence.
    #[inline]
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Insert a piece spanning `[pos, pos + len)` symbols.
    pub fn insert(&mut self, pos: usize, len: usize, score: f64, piece_id: u32) {
        debug_assert!(len > 0 && pos + len <= self.chars.len());
        let id = self.nodes.len() as u32;
        self.nodes.push(Node {
            piece_id,
            pos,
            len,
            score,
            backtrace_score: f64::NEG_INFINITY,
            prev: None,
        });
        self.begin_nodes[pos].push(id);
        self.end_nodes[pos + len].push(id);
    }

    /// Piece id of a node returned by [`viterbi`](Self::viterbi) or
    /// [`nbest`](Self::nbest).
    #[inline]
    pub fn piece_id(&self, node: u32) -> u32 {
        self.nodes[node as usize].piece_id
    }

    /// Symbol span `(pos, len)` of a node.
    #[inline]
    pub fn span(&self, node: u32) -> (usize, usize) {
        let n = &self.nodes[node as usize];
        (n.pos, n.len)
    }

    /// Compute the max-score segmentation.
    ///
    /// Returns the node ids of the best path (bos/eos excluded) in sentence
    /// order. Fails with [`TrainerError::CoverageGap`] when some boundary has
    /// no covering piece.
    pub fn viterbi(&mut self) -> Result<Vec<u32>> {
        for pos in 0..=self.chars.len() {
            for k in 0..self.begin_nodes[pos].len() {
                let rid = self.begin_nodes[pos][k] as usize;
                let mut best = f64::NEG_INFINITY;
                let mut best_prev = None;
                for &lid in &self.end_nodes[pos] {
                    let lnode = &self.nodes[lid as usize];
                    if lnode.prev.is_none() && lid != 0 {
                        continue; // unreachable predecessor
                    }
                    let score = lnode.backtrace_score + self.nodes[rid].score;
                    if score > best {
                        best = score;
                        best_prev = Some(lid);
                    }
                }
                if let Some(prev) = best_prev {
                    self.nodes[rid].backtrace_score = best;
                    self.nodes[rid].prev = Some(prev);
                }
            }
        }
        self.viterbi_done = true;

        // eos is node 1
        if self.nodes[1].prev.is_none() && !self.chars.is_empty() {
            return Err(self.coverage_gap());
        }

        let mut path = Vec::new();
        let mut node = self.nodes[1].prev;
        while let Some(id) = node {
            if id == 0 {
                break;
            }
            path.push(id);
            node = self.nodes[id as usize].prev;
        }
        path.reverse();
        Ok(path)
    }

    /// Best total path score; only valid after [`viterbi`](Self::viterbi).
    #[inline]
    pub fn viterbi_score(&self) -> f64 {
        self.nodes[1].backtrace_score
    }

    /// Accumulate expected piece traversal counts into `expected`, weighted
    /// by the sentence weight `freq`.
    ///
    /// Runs a forward-backward (sum-product) pass in log space and adds
    /// `freq * P(piece used | sentence)` to `expected[piece_id]` for every
    /// lattice node. Returns `freq * log Z`, the weighted log-likelihood
    /// contribution of the sentence.
    pub fn populate_marginal(&self, freq: f64, expected: &mut [f64]) -> Result<f64> {
        let len = self.chars.len();
        let n = self.nodes.len();
        let mut alpha = vec![f64::NEG_INFINITY; n];
        let mut beta = vec![f64::NEG_INFINITY; n];
        alpha[0] = 0.0; // bos
        beta[1] = 0.0; // eos

        for pos in 0..=len {
            for &rid in &self.begin_nodes[pos] {
                let mut acc = f64::NEG_INFINITY;
                for &lid in &self.end_nodes[pos] {
                    acc = log_sum_exp(acc, alpha[lid as usize]);
                }
                if rid != 0 {
                    alpha[rid as usize] = acc + self.nodes[rid as usize].score;
                }
            }
        }
        for pos in (0..=len).rev() {
            for &lid in &self.end_nodes[pos] {
                let mut acc = f64::NEG_INFINITY;
                for &rid in &self.begin_nodes[pos] {
                    acc = log_sum_exp(
                        acc,
                        beta[rid as usize] + self.nodes[rid as usize].score,
                    );
                }
                if lid != 1 {
                    beta[lid as usize] = acc;
                }
            }
        }

        // alpha[eos] carries no eos score term, so it is exactly log Z.
        let mut z = f64::NEG_INFINITY;
        for &lid in &self.end_nodes[len] {
            z = log_sum_exp(z, alpha[lid as usize]);
        }
        if !z.is_finite() {
            return Err(self.coverage_gap());
        }

        for pos in 0..len {
            for &id in &self.begin_nodes[pos] {
                let node = &self.nodes[id as usize];
                let marginal = (alpha[id as usize] + beta[id as usize] - z).exp();
                expected[node.piece_id as usize] += freq * marginal;
            }
        }

        Ok(freq * z)
    }

    /// Compute the `n` best segmentations, best first.
    ///
    /// A* search backwards from eos, using each node's Viterbi score from
    /// bos as an exact heuristic. Each returned path is a sequence of node
    /// ids in sentence order (bos/eos excluded).
    pub fn nbest(&mut self, n: usize) -> Result<Vec<Vec<u32>>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if n == 1 {
            return Ok(vec![self.viterbi()?]);
        }
        if !self.viterbi_done {
            self.viterbi()?;
        }

        // Hypothesis: a fixed path suffix from `node` to eos. `gx` is the
        // score of the suffix excluding `node`; `fx` adds the best possible
        // prefix through `node`.
        struct Hypothesis {
            node: u32,
            next: Option<u32>,
            fx: f64,
            gx: f64,
        }

        #[derive(PartialEq)]
        struct Entry {
            fx: f64,
            hyp: u32,
        }
        impl Eq for Entry {}
        impl Ord for Entry {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.fx
                    .total_cmp(&other.fx)
                    .then_with(|| other.hyp.cmp(&self.hyp))
            }
        }
        impl PartialOrd for Entry {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        let mut hyps: Vec<Hypothesis> = Vec::new();
        let mut agenda: OctonaryHeap<Entry> = OctonaryHeap::new();
        hyps.push(Hypothesis {
            node: 1,
            next: None,
            fx: self.nodes[1].backtrace_score,
            gx: 0.0,
        });
        agenda.push(Entry {
            fx: hyps[0].fx,
            hyp: 0,
        });

        let mut results = Vec::with_capacity(n);
        while let Some(top) = agenda.pop() {
            let (node, gx, next) = {
                let h = &hyps[top.hyp as usize];
                (h.node, h.gx, top.hyp)
            };
            if node == 0 {
                // Reached bos: the suffix chain is a complete path.
                let mut path = Vec::new();
                let mut cur = hyps[next as usize].next;
                while let Some(h) = cur {
                    let hyp = &hyps[h as usize];
                    if hyp.node == 1 {
                        break;
                    }
                    path.push(hyp.node);
                    cur = hyp.next;
                }
                results.push(path);
                if results.len() == n {
                    break;
                }
                continue;
            }

            let pos = self.nodes[node as usize].pos;
            let node_score = self.nodes[node as usize].score;
            for k in 0..self.end_nodes[pos].len() {
                let lid = self.end_nodes[pos][k];
                let lnode = &self.nodes[lid as usize];
                if lnode.prev.is_none() && lid != 0 {
                    continue;
                }
                let gx_new = node_score + gx;
                let fx_new = lnode.backtrace_score + gx_new;
                let id = hyps.len() as u32;
                hyps.push(Hypothesis {
                    node: lid,
                    next: Some(next),
                    fx: fx_new,
                    gx: gx_new,
                });
                agenda.push(Entry { fx: fx_new, hyp: id });
            }
            if hyps.len() > MAX_AGENDA_SIZE {
                break;
            }
        }

        Ok(results)
    }

    /// Locate the first uncoverable boundary for diagnostics.
    fn coverage_gap(&self) -> TrainerError {
        let len = self.chars.len();
        let mut reachable = vec![false; len + 1];
        reachable[0] = true;
        let mut gap = len;
        for pos in 0..len {
            if !reachable[pos] {
                continue;
            }
            if self.begin_nodes[pos].is_empty() {
                gap = pos;
                break;
            }
            for &id in &self.begin_nodes[pos] {
                let node = &self.nodes[id as usize];
                reachable[node.pos + node.len] = true;
            }
        }
        TrainerError::CoverageGap {
            pos: gap,
            sentence: self.sentence.to_string(),
        }
    }
}

#[inline]
fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc_lattice(sentence: &str) -> Lattice<'_> {
        // pieces: a=0, b=1, c=2, ab=3
        let mut lattice = Lattice::new(sentence);
        let chars: Vec<char> = sentence.chars().collect();
        for (pos, &c) in chars.iter().enumerate() {
            let (id, score) = match c {
                'a' => (0, -1.5),
                'b' => (1, -1.5),
                _ => (2, -1.5),
            };
            lattice.insert(pos, 1, score, id);
        }
        for pos in 0..chars.len().saturating_sub(1) {
            if chars[pos] == 'a' && chars[pos + 1] == 'b' {
                lattice.insert(pos, 2, -1.0, 3);
            }
        }
        lattice
    }

    #[test]
    fn test_viterbi_prefers_merged_piece() {
        let mut lattice = abc_lattice("abc");
        let path = lattice.viterbi().unwrap();
        let ids: Vec<u32> = path.iter().map(|&n| lattice.piece_id(n)).collect();
        // "ab" (-1.0) + "c" (-1.5) beats "a" + "b" + "c" (-4.5)
        assert_eq!(ids, vec![3, 2]);
        assert!((lattice.viterbi_score() - (-2.5)).abs() < 1e-9);
    }

    #[test]
    fn test_viterbi_coverage_gap() {
        let mut lattice = Lattice::new("ab");
        lattice.insert(0, 1, -1.0, 0); // only "a" is covered
        match lattice.viterbi() {
            Err(TrainerError::CoverageGap { pos, .. }) => assert_eq!(pos, 1),
            other => panic!("expected coverage gap, got {:?}", other),
        }
    }

    #[test]
    fn test_marginal_sums_to_expected_mass() {
        let mut lattice = abc_lattice("ab");
        let mut expected = vec![0.0; 4];
        let z = lattice.populate_marginal(1.0, &mut expected).unwrap();
        assert!(z.is_finite());
        // Two paths: [ab] with score -1.0, [a, b] with score -3.0.
        let p_merged = (-1.0f64).exp() / ((-1.0f64).exp() + (-3.0f64).exp());
        assert!((expected[3] - p_merged).abs() < 1e-9);
        assert!((expected[0] - (1.0 - p_merged)).abs() < 1e-9);
        assert!((expected[1] - (1.0 - p_merged)).abs() < 1e-9);
        // Every path covers the sentence: symbol mass must total the length.
        let mass = expected[0] + expected[1] + 2.0 * expected[3];
        assert!((mass - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_marginal_weighted_by_freq() {
        let mut lattice = abc_lattice("ab");
        let mut e1 = vec![0.0; 4];
        let mut e3 = vec![0.0; 4];
        let z1 = lattice.populate_marginal(1.0, &mut e1).unwrap();
        let z3 = lattice.populate_marginal(3.0, &mut e3).unwrap();
        assert!((z3 - 3.0 * z1).abs() < 1e-9);
        for (a, b) in e1.iter().zip(&e3) {
            assert!((3.0 * a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_nbest_orders_paths_by_score() {
        let mut lattice = abc_lattice("ab");
        let nbests = lattice.nbest(2).unwrap();
        assert_eq!(nbests.len(), 2);
        let first: Vec<u32> = nbests[0].iter().map(|&n| lattice.piece_id(n)).collect();
        let second: Vec<u32> = nbests[1].iter().map(|&n| lattice.piece_id(n)).collect();
        assert_eq!(first, vec![3]);
        assert_eq!(second, vec![0, 1]);
    }

    #[test]
    fn test_nbest_single_path() {
        let mut lattice = Lattice::new("a");
        lattice.insert(0, 1, -1.0, 0);
        let nbests = lattice.nbest(2).unwrap();
        assert_eq!(nbests.len(), 1);
    }

    #[test]
    fn test_empty_sentence() {
        let mut lattice = Lattice::new("");
        assert!(lattice.is_empty());
        let path = lattice.viterbi().unwrap();
        assert!(path.is_empty());
    }
}
