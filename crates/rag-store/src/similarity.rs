//! Vector similarity and maximal marginal relevance selection.

/// Cosine similarity of two vectors; 0.0 when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Greedy maximal marginal relevance selection.
///
/// Picks up to `k` candidate indices. Each step takes the candidate
/// maximising `lambda_mult * sim(query, c) - (1 - lambda_mult) * max sim(c, selected)`.
/// The first pick is always the candidate most similar to the query. Ties keep
/// the earlier candidate.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda_mult: f32,
) -> Vec<usize> {
    let k = k.min(candidates.len());
    if k == 0 {
        return Vec::new();
    }

    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    // Highest similarity of each candidate to anything already selected.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut taken = vec![false; candidates.len()];
    let mut selected = Vec::with_capacity(k);

    while selected.len() < k {
        let mut best: Option<(usize, f32)> = None;

        for (i, rel) in relevance.iter().enumerate() {
            if taken[i] {
                continue;
            }
            let score = if selected.is_empty() {
                *rel
            } else {
                lambda_mult * rel - (1.0 - lambda_mult) * redundancy[i]
            };
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((i, score));
            }
        }

        let Some((pick, _)) = best else { break };
        taken[pick] = true;
        selected.push(pick);

        for (i, candidate) in candidates.iter().enumerate() {
            if !taken[i] {
                let sim = cosine_similarity(candidates[pick], candidate);
                redundancy[i] = redundancy[i].max(sim);
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_mmr_pure_relevance_matches_similarity_order() {
        let query = [1.0, 0.0];
        let a = [0.9, 0.1];
        let b = [1.0, 0.0];
        let c = [0.5, 0.5];
        let candidates: Vec<&[f32]> = vec![&a, &b, &c];

        assert_eq!(maximal_marginal_relevance(&query, &candidates, 3, 1.0), vec![1, 0, 2]);
    }

    #[test]
    fn test_mmr_skips_near_duplicates() {
        let query = [1.0, 0.2];
        let first = [1.0, 0.1];
        let duplicate = [1.0, 0.09];
        let different = [0.6, 0.8];
        let candidates: Vec<&[f32]> = vec![&first, &duplicate, &different];

        let picked = maximal_marginal_relevance(&query, &candidates, 2, 0.5);
        assert_eq!(picked, vec![0, 2]);
    }

    #[test]
    fn test_mmr_bounds() {
        let query = [1.0];
        let a = [1.0];
        let candidates: Vec<&[f32]> = vec![&a];

        assert!(maximal_marginal_relevance(&query, &candidates, 0, 0.7).is_empty());
        assert_eq!(maximal_marginal_relevance(&query, &candidates, 5, 0.7), vec![0]);
        assert!(maximal_marginal_relevance(&query, &[], 3, 0.7).is_empty());
    }
}
