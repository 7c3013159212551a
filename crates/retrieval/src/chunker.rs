//! Fixed-window text chunking

/// Configuration for chunking behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// Window size in characters
    pub chunk_size: usize,
    /// Characters shared by consecutive windows
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// Split text into overlapping character windows
///
/// Each window is stripped and empty windows are dropped. When the size does
/// not exceed the overlap the whole stripped text becomes a single chunk.
pub fn chunk_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    if config.chunk_size <= config.chunk_overlap {
        let stripped = text.trim();
        return if stripped.is_empty() {
            Vec::new()
        } else {
            vec![stripped.to_string()]
        };
    }

    let chars: Vec<char> = text.chars().collect();
    let length = chars.len();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < length {
        let end = length.min(start + config.chunk_size);
        let window: String = chars[start..end].iter().collect();
        let stripped = window.trim();
        if !stripped.is_empty() {
            chunks.push(stripped.to_string());
        }
        if end >= length {
            break;
        }
        start = end - config.chunk_overlap;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_overlap() {
        let text: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, &ChunkConfig::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 800);
        assert_eq!(chunks[1].chars().count(), 300);
        assert_eq!(&chunks[0][700..], &chunks[1][..100]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("  hello world \n", &ChunkConfig::default());
        assert_eq!(chunks, vec!["hello world"]);
    }

    #[test]
    fn test_blank_windows_dropped() {
        let config = ChunkConfig {
            chunk_size: 4,
            chunk_overlap: 1,
        };
        assert!(chunk_text("        ", &config).is_empty());
        assert_eq!(chunk_text("ab      cd", &config), vec!["ab", "cd"]);
    }

    #[test]
    fn test_size_not_above_overlap() {
        let config = ChunkConfig {
            chunk_size: 10,
            chunk_overlap: 10,
        };
        assert_eq!(chunk_text(" long text here ", &config), vec!["long text here"]);
        assert!(chunk_text("   ", &config).is_empty());
    }

    #[test]
    fn test_multibyte_characters() {
        let config = ChunkConfig {
            chunk_size: 3,
            chunk_overlap: 1,
        };
        let chunks = chunk_text("가나다라마", &config);
        assert_eq!(chunks, vec!["가나다", "다라마"]);
    }
}
