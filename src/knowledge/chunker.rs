//! Text Chunking Module
//!
//! 공백 기준으로 단어를 나눈 뒤 고정 단어 수 단위로 묶습니다.
//! 순서를 보존하고 청크 간 중첩은 없습니다.

use crate::config::DEFAULT_CHUNK_SIZE;

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WordChunker
// ============================================================================

/// 고정 단어 수 청커
///
/// 마지막 청크를 제외한 모든 청크는 정확히 `chunk_size` 단어입니다.
#[derive(Debug, Clone)]
pub struct WordChunker {
    chunk_size: usize,
}

impl WordChunker {
    /// 청크 크기 지정 (0은 1로 취급)
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Default for WordChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker for WordChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_words(text, self.chunk_size)
    }

    fn name(&self) -> &'static str {
        "WordChunker"
    }
}

/// 텍스트를 `chunk_size` 단어씩 분할
pub fn chunk_words(text: &str, chunk_size: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    words
        .chunks(chunk_size.max(1))
        .map(|group| group.join(" "))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_empty() {
        assert!(chunk_words("", 4).is_empty());
        assert!(chunk_words("   \n\t ", 4).is_empty());
    }

    #[test]
    fn test_chunk_exact_sizes() {
        let chunks = chunk_words("a b c d e f g h i j", 4);
        assert_eq!(chunks, vec!["a b c d", "e f g h", "i j"]);
    }

    #[test]
    fn test_chunk_small_text() {
        let chunks = chunk_words("a b c", 4);
        assert_eq!(chunks, vec!["a b c"]);
    }

    #[test]
    fn test_chunk_normalizes_whitespace() {
        let text = "  first\tsecond\n\nthird   fourth fifth ";
        let chunks = chunk_words(text, 2);

        assert_eq!(chunks.join(" "), "first second third fourth fifth");
        assert!(chunks[..chunks.len() - 1]
            .iter()
            .all(|c| c.split_whitespace().count() == 2));
    }

    #[test]
    fn test_chunk_round_trip_long_text() {
        let text: String = (0..1234).map(|i| format!("w{} ", i)).collect();
        let chunks = WordChunker::new(500).chunk(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split_whitespace().count(), 500);
        assert_eq!(chunks[1].split_whitespace().count(), 500);
        assert_eq!(chunks[2].split_whitespace().count(), 234);
        assert_eq!(
            chunks.join(" "),
            text.split_whitespace().collect::<Vec<_>>().join(" ")
        );
    }

    #[test]
    fn test_zero_chunk_size_treated_as_one() {
        let chunker = WordChunker::new(0);
        assert_eq!(chunker.chunk_size(), 1);
        assert_eq!(chunker.chunk("x y"), vec!["x", "y"]);
    }

    #[test]
    fn test_default_chunk_size() {
        assert_eq!(WordChunker::default().chunk_size(), 500);
        assert_eq!(WordChunker::default().name(), "WordChunker");
    }
}
