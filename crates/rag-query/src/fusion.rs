//! Weighted fusion of dense and lexical scores.

use std::cmp::Ordering;
use std::collections::HashMap;

use ulid::Ulid;

use rag_core::ScoredChunk;

/// Min-max normalise scores into [0, 1].
///
/// A list whose scores are all equal maps to 1.0 everywhere.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    scores
        .iter()
        .map(|s| if range > 0.0 { (s - min) / range } else { 1.0 })
        .collect()
}

/// `(1 - lexical_weight) * dense + lexical_weight * lexical`.
pub fn fuse_scores(dense: f32, lexical: f32, lexical_weight: f32) -> f32 {
    (1.0 - lexical_weight) * dense + lexical_weight * lexical
}

/// Descending order with NaN last.
pub(crate) fn descending(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Fuse a dense and a lexical result list by chunk id.
///
/// Each list is normalised on its own; a chunk missing from one list
/// contributes 0 for that signal. Ties keep dense-first order.
pub fn hybrid_fusion(
    dense: Vec<ScoredChunk>,
    lexical: Vec<ScoredChunk>,
    lexical_weight: f32,
    k: usize,
) -> Vec<ScoredChunk> {
    let dense_norm = min_max_normalize(&raw_scores(&dense));
    let lexical_norm = min_max_normalize(&raw_scores(&lexical));

    // (chunk, dense signal, lexical signal) in first-seen order
    let mut entries: Vec<(ScoredChunk, f32, f32)> = Vec::with_capacity(dense.len() + lexical.len());
    let mut index: HashMap<Ulid, usize> = HashMap::new();

    for (sc, norm) in dense.into_iter().zip(dense_norm) {
        if !index.contains_key(&sc.chunk.id) {
            index.insert(sc.chunk.id, entries.len());
            entries.push((sc, norm, 0.0));
        }
    }

    for (sc, norm) in lexical.into_iter().zip(lexical_norm) {
        match index.get(&sc.chunk.id) {
            Some(&i) => entries[i].2 = entries[i].2.max(norm),
            None => {
                index.insert(sc.chunk.id, entries.len());
                entries.push((sc, 0.0, norm));
            }
        }
    }

    let mut fused: Vec<ScoredChunk> = entries
        .into_iter()
        .map(|(sc, d, l)| ScoredChunk::new(sc.chunk, fuse_scores(d, l, lexical_weight)))
        .collect();

    fused.sort_by(|a, b| descending(a.score.unwrap_or(0.0), b.score.unwrap_or(0.0)));
    fused.truncate(k);

    fused
}

fn raw_scores(chunks: &[ScoredChunk]) -> Vec<f32> {
    chunks.iter().map(|c| c.score.unwrap_or(0.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::Chunk;

    fn scored(document: &str, position: u32, score: f32) -> ScoredChunk {
        ScoredChunk::new(Chunk::new(document, position, document), score)
    }

    #[test]
    fn test_fuse_scores() {
        assert!((fuse_scores(0.9, 0.4, 0.3) - 0.75).abs() < 1e-6);
        assert_eq!(fuse_scores(1.0, 0.0, 0.0), 1.0);
        assert_eq!(fuse_scores(1.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_min_max_normalize() {
        assert_eq!(min_max_normalize(&[2.0, 4.0, 3.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_normalize(&[5.0, 5.0]), vec![1.0, 1.0]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_descending_puts_nan_last() {
        let mut v = vec![0.2, f32::NAN, 0.9, 0.5];
        v.sort_by(|a, b| descending(*a, *b));
        assert_eq!(&v[..3], &[0.9, 0.5, 0.2]);
        assert!(v[3].is_nan());
    }

    #[test]
    fn test_hybrid_fusion_combines_signals() {
        let a = scored("a", 0, 0.9);
        let b = scored("b", 0, 0.5);
        let c = scored("c", 0, 8.0);

        let dense = vec![a.clone(), b.clone()];
        // b is the best lexical match, c is lexical-only
        let lexical = vec![
            ScoredChunk::new(b.chunk.clone(), 10.0),
            c.clone(),
        ];

        let fused = hybrid_fusion(dense, lexical, 0.3, 10);
        let order: Vec<&str> = fused.iter().map(|s| s.chunk.source.document.as_str()).collect();

        // a: 0.7*1 + 0 = 0.7, b: 0.7*0 + 0.3*1 = 0.3, c: 0 + 0.3*0 = 0.0
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!((fused[0].score.unwrap() - 0.7).abs() < 1e-6);
        assert!((fused[1].score.unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_hybrid_fusion_dedups_and_truncates() {
        let a = scored("a", 0, 0.9);
        let b = scored("b", 0, 0.8);
        let dense = vec![a.clone(), b.clone(), a.clone()];
        let lexical = vec![a.clone(), b.clone()];

        let fused = hybrid_fusion(dense, lexical, 0.5, 1);
        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].chunk.id, a.chunk.id);

        let all = hybrid_fusion(vec![a.clone(), b.clone()], vec![b, a], 0.5, 10);
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_hybrid_fusion_zero_weight_keeps_dense_order() {
        let dense = vec![scored("a", 0, 0.9), scored("b", 0, 0.8), scored("c", 0, 0.1)];
        let lexical = vec![scored("c", 1, 3.0)];

        let fused = hybrid_fusion(dense, lexical, 0.0, 3);
        let order: Vec<&str> = fused.iter().map(|s| s.chunk.source.document.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
