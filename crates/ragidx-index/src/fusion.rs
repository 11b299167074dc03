//! Score fusion of the semantic and keyword legs.
//!
//! Each leg is min-max normalized over its own candidates, absent ids score 0
//! in that leg, and the fused score is the weighted mean of the two.

use std::collections::HashMap;

use ragidx_core::config::HybridWeights;
use ragidx_core::types::{Chunk, ChunkId, QueryResult, SearchHit};

/// Min-max normalize one leg into [0, 1]. A single distinct score maps to 1.0.
pub fn normalize(hits: &[SearchHit]) -> HashMap<&str, f32> {
    let (min, max) = hits
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), h| (lo.min(h.score), hi.max(h.score)));
    let range = max - min;
    hits.iter()
        .map(|h| {
            let norm = if range > 0.0 { (h.score - min) / range } else { 1.0 };
            (h.id.as_str(), norm)
        })
        .collect()
}

/// Fused score per candidate id. A leg passed as `None` was not executed and
/// its weight is dropped from the denominator.
pub fn fuse(semantic: Option<&[SearchHit]>, keyword: Option<&[SearchHit]>, weights: HybridWeights) -> Vec<(ChunkId, f32)> {
    let ws = if semantic.is_some() { weights.semantic.max(0.0) } else { 0.0 };
    let wk = if keyword.is_some() { weights.keyword.max(0.0) } else { 0.0 };
    let total = ws + wk;
    if total <= 0.0 {
        return Vec::new();
    }
    let sem = semantic.map(normalize).unwrap_or_default();
    let kw = keyword.map(normalize).unwrap_or_default();

    let mut ids: Vec<&str> = sem.keys().chain(kw.keys()).copied().collect();
    ids.sort_unstable();
    ids.dedup();
    ids.into_iter()
        .map(|id| {
            let s = sem.get(id).copied().unwrap_or(0.0);
            let k = kw.get(id).copied().unwrap_or(0.0);
            (id.to_string(), (ws * s + wk * k) / total)
        })
        .collect()
}

/// Resolve fused scores to results, drop those under `min_score`, order and truncate.
///
/// Ids that `lookup` cannot resolve are skipped.
pub fn rank<'a, F>(scored: Vec<(ChunkId, f32)>, lookup: F, min_score: f32, top_k: usize) -> Vec<QueryResult>
where
    F: Fn(&str) -> Option<&'a Chunk>,
{
    let mut results: Vec<QueryResult> = scored
        .into_iter()
        .filter(|(_, score)| *score >= min_score)
        .filter_map(|(id, score)| {
            lookup(&id).map(|chunk| QueryResult {
                chunk_id: id,
                file_path: chunk.path.clone(),
                text: chunk.text.clone(),
                start: chunk.start,
                end: chunk.end,
                score,
            })
        })
        .collect();
    results.sort_by(QueryResult::rank_cmp);
    results.truncate(top_k);
    results
}
