use crate::error::EngineError;
use std::ops::Range;
use tiktoken_rs::{o200k_base, CoreBPE};

/// Token budgets for one segmentation pass. The step size
/// `chunk_tokens - overlap_tokens` must be positive or the walk below would
/// never terminate; [`SegmenterConfig::validate`] is checked wherever a
/// segmenter is constructed.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    pub chunk_tokens: usize,
    pub overlap_tokens: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_tokens: 2_500,
            overlap_tokens: 200,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_tokens == 0 {
            return Err(EngineError::InvalidChunkConfig(
                "chunk_tokens must be positive".to_string(),
            ));
        }
        if self.overlap_tokens >= self.chunk_tokens {
            return Err(EngineError::InvalidChunkConfig(format!(
                "overlap {} must be smaller than chunk size {}",
                self.overlap_tokens, self.chunk_tokens
            )));
        }
        Ok(())
    }

    fn step(&self) -> usize {
        self.chunk_tokens - self.overlap_tokens
    }
}

/// Token index windows covering `[0, total_tokens)`. Consecutive windows
/// overlap by `overlap_tokens`; the walk stops once a window reaches the end
/// of the stream, so the final window may be short and is never padded.
fn chunk_spans(total_tokens: usize, config: &SegmenterConfig) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    if total_tokens == 0 {
        return spans;
    }

    let mut start = 0usize;
    loop {
        let end = (start + config.chunk_tokens).min(total_tokens);
        spans.push(start..end);
        if end == total_tokens {
            break;
        }
        start += config.step();
    }
    spans
}

/// Splits normalized text into overlapping, size-bounded chunks measured in
/// tokens of one fixed tokenizer. Identical text and config always yield the
/// identical chunk sequence.
pub struct Segmenter {
    encoder: CoreBPE,
    config: SegmenterConfig,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let encoder = o200k_base().map_err(|error| EngineError::Tokenizer(error.to_string()))?;
        Ok(Self { encoder, config })
    }

    pub fn config(&self) -> SegmenterConfig {
        self.config
    }

    pub fn segment(&self, text: &str) -> Result<Vec<String>, EngineError> {
        let tokens = self.encoder.encode_with_special_tokens(text);

        let mut chunks = Vec::new();
        for span in chunk_spans(tokens.len(), &self.config) {
            let piece = self
                .encoder
                .decode(tokens[span].to_vec())
                .map_err(|error| EngineError::Tokenizer(error.to_string()))?;
            chunks.push(piece);
        }
        Ok(chunks)
    }
}
