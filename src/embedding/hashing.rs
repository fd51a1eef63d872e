//! 어휘 해싱 임베딩
//!
//! 단어와 bigram을 해시해 고정 차원 버킷에 누적한 뒤 L2 정규화합니다.
//! 의미 임베딩은 아니지만 같은 단어를 공유하는 텍스트끼리 유사도가 높아
//! 오프라인 실행과 테스트에 쓰입니다.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::ProviderError;

use super::EmbeddingProvider;

const BIGRAM_WEIGHT: f32 = 0.5;

/// 결정적 해싱 임베딩
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            anyhow::bail!("Hashing embedding dimension must be positive");
        }
        Ok(Self { dimension })
    }

    /// 텍스트 -> 정규화 벡터 (동기)
    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let normalized: String = text
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        let words: Vec<&str> = normalized.split_whitespace().collect();

        let mut vector = vec![0.0f32; self.dimension];

        for word in &words {
            let (idx, sign) = self.bucket(word.as_bytes());
            vector[idx] += sign;
        }

        for pair in words.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            let (idx, sign) = self.bucket(bigram.as_bytes());
            vector[idx] += sign * BIGRAM_WEIGHT;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }

    /// 해시 -> (버킷, 부호)
    fn bucket(&self, token: &[u8]) -> (usize, f32) {
        let digest = Sha256::digest(token);
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(raw);

        let idx = (hash % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.vectorize(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing-v1"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedding::new(0).is_err());
    }

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedding::new(128).expect("dimension");
        let a = embedder.vectorize("Uma classe abstrata");
        let b = embedder.vectorize("Uma classe abstrata");
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);

        let magnitude: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = HashingEmbedding::new(128).expect("dimension");
        let a = embedder.vectorize("classe abstrata?");
        let b = embedder.vectorize("Classe, Abstrata");
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashingEmbedding::new(512).expect("dimension");
        let query = embedder.vectorize("O que é uma classe abstrata?");
        let related =
            embedder.vectorize("Uma classe abstrata não pode ser instanciada diretamente.");
        let unrelated = embedder.vectorize("Loops for percorrem arrays de inteiros.");

        assert!(
            cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated)
        );
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedding::new(16).expect("dimension");
        assert!(embedder.vectorize("  ...  ").iter().all(|&x| x == 0.0));
    }
}
