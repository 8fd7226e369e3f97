//! Cosine-similarity ranking of indexed pages against a query vector.

use std::cmp::Ordering;

use sitedesk_shared::{PageHit, PageRecord};

/// Cosine similarity: `dot(a, b) / (|a| * |b|)`.
///
/// Empty vectors, mismatched dimensions, and zero norms all score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Rank `pages` against `query`, most similar first.
///
/// Only pages with similarity strictly above zero are returned. Ties keep
/// their index order. Pure: the same inputs always give the same output.
pub fn rank(pages: &[PageRecord], query: &[f32], top_k: usize) -> Vec<PageHit> {
    if top_k == 0 || query.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f32, &PageRecord)> = pages
        .iter()
        .filter(|page| !page.vector.is_empty())
        .map(|page| (cosine_similarity(query, &page.vector), page))
        .filter(|(score, _)| *score > 0.0)
        .collect();

    // `sort_by` is stable, which is what keeps ties in index order.
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

    scored
        .into_iter()
        .take(top_k)
        .map(|(score, page)| PageHit {
            url: page.url.clone(),
            title: page.title.clone(),
            text: page.text.clone(),
            score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, vector: Vec<f32>) -> PageRecord {
        PageRecord {
            url: url.into(),
            title: url.into(),
            text: format!("text of {url}"),
            vector,
        }
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Magnitude does not matter.
        assert!((cosine_similarity(&[2.0, 2.0], &[0.5, 0.5]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_vectors_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn ranks_by_descending_similarity() {
        let pages = vec![
            page("weak", vec![0.2, 1.0, 0.0]),
            page("strong", vec![1.0, 0.1, 0.0]),
            page("middle", vec![1.0, 1.0, 0.0]),
        ];
        let hits = rank(&pages, &[1.0, 0.0, 0.0], 10);
        let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, ["strong", "middle", "weak"]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn excludes_zero_and_negative_similarity() {
        let pages = vec![
            page("orthogonal", vec![0.0, 1.0]),
            page("opposite", vec![-1.0, 0.0]),
            page("unembedded", vec![]),
            page("wrong-dims", vec![1.0, 0.0, 0.0]),
            page("match", vec![1.0, 0.0]),
        ];
        let hits = rank(&pages, &[1.0, 0.0], 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "match");
        assert!(hits[0].score > 0.0);
    }

    #[test]
    fn ties_keep_index_order() {
        let pages = vec![
            page("first", vec![1.0, 0.0]),
            page("second", vec![2.0, 0.0]),
            page("third", vec![0.5, 0.0]),
        ];
        let hits = rank(&pages, &[1.0, 0.0], 10);
        let urls: Vec<&str> = hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, ["first", "second", "third"]);
    }

    #[test]
    fn top_k_limits_results() {
        let pages: Vec<PageRecord> = (0..5)
            .map(|i| page(&format!("p{i}"), vec![1.0, i as f32]))
            .collect();
        assert_eq!(rank(&pages, &[1.0, 0.0], 2).len(), 2);
        assert!(rank(&pages, &[1.0, 0.0], 0).is_empty());
        assert!(rank(&pages, &[], 3).is_empty());
    }

    #[test]
    fn ranking_is_deterministic() {
        let pages: Vec<PageRecord> = (0..8)
            .map(|i| page(&format!("p{i}"), vec![(i % 3) as f32 + 0.1, 1.0]))
            .collect();
        let first = rank(&pages, &[1.0, 0.5], 8);
        let second = rank(&pages, &[1.0, 0.5], 8);
        assert_eq!(first, second);
    }
}
