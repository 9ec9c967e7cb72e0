/// String closeness in `[0, 1]`; identical strings score 1.0.
pub trait Similarity {
    fn ratio(&self, a: &str, b: &str) -> f64;
}

/// Ratcliff/Obershelp matching: twice the number of characters in common
/// (longest common block first, then recursively on either side) over the total length.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceRatio;

impl Similarity for SequenceRatio {
    fn ratio(&self, a: &str, b: &str) -> f64 {
        let a: Vec<char> = a.chars().collect();
        let b: Vec<char> = b.chars().collect();
        let total = a.len() + b.len();
        if total == 0 { return 1.0; }
        2.0 * matching_chars(&a, &b) as f64 / total as f64
    }
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]` as `(i, j, len)`.
/// Ties go to the block that ends first in `a`, then in `b`.
fn longest_match(a: &[char], b: &[char], alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
    let (mut bi, mut bj, mut best) = (alo, blo, 0usize);
    let width = bhi - blo;
    let mut prev = vec![0usize; width + 1];
    let mut cur = vec![0usize; width + 1];
    for i in alo..ahi {
        for j in blo..bhi {
            let k = j - blo + 1;
            cur[k] = if a[i] == b[j] { prev[k - 1] + 1 } else { 0 };
            if cur[k] > best {
                best = cur[k];
                bi = i + 1 - best;
                bj = j + 1 - best;
            }
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    (bi, bj, best)
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let mut total = 0;
    let mut queue = vec![(0, a.len(), 0, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        if alo >= ahi || blo >= bhi { continue; }
        let (i, j, k) = longest_match(a, b, alo, ahi, blo, bhi);
        if k == 0 { continue; }
        total += k;
        queue.push((alo, i, blo, j));
        queue.push((i + k, ahi, j + k, bhi));
    }
    total
}
