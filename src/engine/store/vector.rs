// ── Vector math utilities ──────────────────────────────────────────────

/// Decode a little-endian f32 BLOB. Trailing bytes that do not form a whole
/// float are ignored.
pub fn blob_to_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Encode a vector for BLOB storage.
pub fn vector_to_blob(vec: &[f32]) -> Vec<u8> {
    vec.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Cosine similarity in [-1, 1]. Mismatched, empty or zero-norm inputs score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}

/// Element-wise mean of equally sized vectors, L2-normalized.
/// Vectors whose length differs from the first are skipped.
pub fn centroid(vectors: &[&[f32]]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dims = first.len();
    if dims == 0 {
        return None;
    }
    let mut sum = vec![0.0f64; dims];
    let mut n = 0usize;
    for v in vectors.iter().filter(|v| v.len() == dims) {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += *x as f64;
        }
        n += 1;
    }
    let mean: Vec<f64> = sum.into_iter().map(|s| s / n as f64).collect();
    Some(normalize(&mean))
}

fn normalize(v: &[f64]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm < 1e-12 {
        return v.iter().map(|x| *x as f32).collect();
    }
    v.iter().map(|x| (*x / norm) as f32).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0f32, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_degenerate_inputs_score_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn blob_decoding_preserves_values() {
        let original = vec![1.0f32, -2.5, 3.25, 0.0];
        assert_eq!(blob_to_vector(&vector_to_blob(&original)), original);
        assert!(blob_to_vector(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn centroid_is_unit_length_and_between_inputs() {
        let a = [1.0f32, 0.0];
        let b = [0.0f32, 1.0];
        let c = centroid(&[&a, &b]).unwrap();
        let norm: f32 = c.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!((c[0] - c[1]).abs() < 1e-6);
        assert!(centroid(&[]).is_none());
    }
}
