//! Near-duplicate collapsing.
//!
//! Candidates are visited in canonical order (fused score descending, id
//! ascending) and each one is kept unless it is similar enough to a candidate
//! already kept. Visiting in canonical order makes the surviving set a function
//! of the input set alone, whatever order it arrived in.
//!
//! Large inputs only compare candidates that share a bucket: neighbouring
//! positions of one document, an identical normalized text, a MinHash band over
//! character shingles or a sign-projection band over embeddings.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};

use twox_hash::XxHash64;

use kbsearch_core::config::SimilarityMetric;
use kbsearch_core::tokenize::tokenize;
use kbsearch_core::types::ScoredCandidate;

use crate::fusion::sort_by_fused;

const MINHASH_BANDS: usize = 8;
const MINHASH_ROWS: usize = 2;
const PROJECTION_BANDS: usize = 8;
const PROJECTION_BITS: usize = 3;
const SHINGLE_CHARS: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated {
    pub kept: Vec<ScoredCandidate>,
    pub dropped: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum BucketKey {
    Position(String, u64),
    Fingerprint([u8; 32]),
    MinHash(usize, u64),
    Projection(usize, u32),
}

struct Features {
    tokens: BTreeSet<String>,
    shingles: BTreeSet<u64>,
    normalized: String,
}

impl Features {
    fn of(c: &ScoredCandidate) -> Self {
        let tokens: Vec<String> = tokenize(&c.chunk.text);
        let normalized = c.chunk.text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let shingles = shingles(&normalized);
        Self { tokens: tokens.into_iter().collect(), shingles, normalized }
    }
}

/// Hashed character n-grams of `text`; shorter texts yield one shingle.
fn shingles(text: &str) -> BTreeSet<u64> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return BTreeSet::new();
    }
    if chars.len() <= SHINGLE_CHARS {
        return BTreeSet::from([seeded_hash(0, &chars)]);
    }
    chars.windows(SHINGLE_CHARS).map(|w| seeded_hash(0, w)).collect()
}

fn seeded_hash<T: Hash + ?Sized>(seed: u64, value: &T) -> u64 {
    let mut hasher = XxHash64::with_seed(seed);
    value.hash(&mut hasher);
    hasher.finish()
}

fn minhash_keys(shingles: &BTreeSet<u64>, keys: &mut Vec<BucketKey>) {
    if shingles.is_empty() {
        return;
    }
    let signature: Vec<u64> = (0..MINHASH_BANDS * MINHASH_ROWS)
        .map(|seed| shingles.iter().map(|s| seeded_hash(seed as u64 + 1, s)).min().unwrap_or(0))
        .collect();
    for (band, rows) in signature.chunks(MINHASH_ROWS).enumerate() {
        keys.push(BucketKey::MinHash(band, seeded_hash(band as u64, rows)));
    }
}

/// Coordinate `dim` of random hyperplane `plane`, uniform in `[-1, 1]`.
fn plane_coord(plane: usize, dim: usize) -> f32 {
    let h = seeded_hash(plane as u64, &dim);
    (h as f64 / u64::MAX as f64 * 2.0 - 1.0) as f32
}

fn projection_keys(embedding: &[f32], keys: &mut Vec<BucketKey>) {
    if embedding.is_empty() {
        return;
    }
    for band in 0..PROJECTION_BANDS {
        let mut bits = 0u32;
        for bit in 0..PROJECTION_BITS {
            let plane = band * PROJECTION_BITS + bit;
            let side: f32 = embedding.iter().enumerate().map(|(d, x)| x * plane_coord(plane, d)).sum();
            if side >= 0.0 {
                bits |= 1 << bit;
            }
        }
        // length is part of the key so mismatched dimensions never share a bucket
        keys.push(BucketKey::Projection(band, bits | ((embedding.len() as u32) << PROJECTION_BITS)));
    }
}

fn own_keys(c: &ScoredCandidate, f: &Features) -> Vec<BucketKey> {
    let mut keys = vec![
        BucketKey::Position(c.chunk.doc_id.clone(), c.chunk.position),
        BucketKey::Fingerprint(*blake3::hash(f.normalized.as_bytes()).as_bytes()),
    ];
    minhash_keys(&f.shingles, &mut keys);
    if let Some(e) = &c.chunk.embedding {
        projection_keys(e, &mut keys);
    }
    keys
}

fn lookup_keys(c: &ScoredCandidate, own: &[BucketKey]) -> Vec<BucketKey> {
    let mut keys = own.to_vec();
    let p = c.chunk.position;
    if p > 0 {
        keys.push(BucketKey::Position(c.chunk.doc_id.clone(), p - 1));
    }
    if let Some(next) = p.checked_add(1) {
        keys.push(BucketKey::Position(c.chunk.doc_id.clone(), next));
    }
    keys
}

fn jaccard<T: Ord>(a: &BTreeSet<T>, b: &BTreeSet<T>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Similarity in `[0, 1]`: the largest of token-set Jaccard, character-shingle
/// Jaccard and embedding cosine.
fn similarity(a: &ScoredCandidate, fa: &Features, b: &ScoredCandidate, fb: &Features) -> f32 {
    if !fa.normalized.is_empty() && fa.normalized == fb.normalized {
        return 1.0;
    }
    let text = jaccard(&fa.tokens, &fb.tokens).max(jaccard(&fa.shingles, &fb.shingles));
    let vector = match (&a.chunk.embedding, &b.chunk.embedding) {
        (Some(x), Some(y)) => SimilarityMetric::Cosine.score(x, y).unwrap_or(0.0).max(0.0),
        _ => 0.0,
    };
    text.max(vector)
}

/// Collapses candidates whose similarity reaches `threshold`, keeping the best
/// fused member of each cluster. Below `exact_limit` candidates every pair is
/// compared; above it only bucket-mates are.
pub fn dedup(mut candidates: Vec<ScoredCandidate>, threshold: f32, exact_limit: usize) -> Deduplicated {
    sort_by_fused(&mut candidates);
    let total = candidates.len();
    let exhaustive = total <= exact_limit;

    let mut seen_ids: HashSet<String> = HashSet::with_capacity(total);
    let mut kept: Vec<(ScoredCandidate, Features)> = Vec::with_capacity(total);
    let mut buckets: HashMap<BucketKey, Vec<usize>> = HashMap::new();

    for c in candidates {
        if !seen_ids.insert(c.chunk.id.clone()) {
            continue;
        }
        let f = Features::of(&c);
        let own = own_keys(&c, &f);

        let duplicate = if exhaustive {
            kept.iter().any(|(k, kf)| similarity(k, kf, &c, &f) >= threshold)
        } else {
            let mut mates: BTreeSet<usize> = BTreeSet::new();
            for key in lookup_keys(&c, &own) {
                if let Some(ix) = buckets.get(&key) {
                    mates.extend(ix.iter().copied());
                }
            }
            mates.into_iter().any(|i| {
                let (k, kf) = &kept[i];
                similarity(k, kf, &c, &f) >= threshold
            })
        };
        if duplicate {
            continue;
        }

        let ix = kept.len();
        if !exhaustive {
            for key in own {
                buckets.entry(key).or_default().push(ix);
            }
        }
        kept.push((c, f));
    }

    let kept: Vec<ScoredCandidate> = kept.into_iter().map(|(c, _)| c).collect();
    let dropped = total - kept.len();
    Deduplicated { kept, dropped }
}
