//! Byte-pair-encoding tokenizer adapter.
//!
//! Wraps a fixed `tiktoken` vocabulary behind the [`Tokenizer`] trait so the
//! budget code can be exercised with any encoding, including test doubles.

use std::fmt;
use std::str::FromStr;

use tiktoken_rs::CoreBPE;

#[derive(Debug, thiserror::Error)]
pub enum TokenizerError {
    #[error("unknown encoding '{0}' (expected one of: cl100k_base, o200k_base, p50k_base, r50k_base)")]
    UnknownEncoding(String),
    #[error("failed to load {encoding} table: {reason}")]
    Configuration { encoding: Encoding, reason: String },
}

/// Converts text to token ids and back under one fixed vocabulary.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decodes any slice of ids. Never fails: ids outside the vocabulary are
    /// skipped, an incomplete character at the end of the slice is dropped,
    /// and other undecodable bytes become U+FFFD.
    fn decode(&self, tokens: &[u32]) -> String;

    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Cl100kBase,
    O200kBase,
    P50kBase,
    R50kBase,
}

impl Encoding {
    pub fn name(self) -> &'static str {
        match self {
            Encoding::Cl100kBase => "cl100k_base",
            Encoding::O200kBase => "o200k_base",
            Encoding::P50kBase => "p50k_base",
            Encoding::R50kBase => "r50k_base",
        }
    }

    /// Whether `id` is an ordinary or special token of this table.
    pub fn is_known_id(self, id: u32) -> bool {
        match self {
            Encoding::Cl100kBase => matches!(id, 0..=100_255 | 100_257..=100_260 | 100_276),
            Encoding::O200kBase => matches!(id, 0..=199_997 | 199_999 | 200_018),
            Encoding::P50kBase => id <= 50_280,
            Encoding::R50kBase => id <= 50_256,
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cl100k_base" => Ok(Encoding::Cl100kBase),
            "o200k_base" => Ok(Encoding::O200kBase),
            "p50k_base" => Ok(Encoding::P50kBase),
            "r50k_base" => Ok(Encoding::R50kBase),
            _ => Err(TokenizerError::UnknownEncoding(s.to_string())),
        }
    }
}

/// Production tokenizer over a `tiktoken` BPE table.
pub struct BpeTokenizer {
    encoding: Encoding,
    bpe: CoreBPE,
}

impl BpeTokenizer {
    pub fn new(encoding: Encoding) -> Result<Self, TokenizerError> {
        let loaded = match encoding {
            Encoding::Cl100kBase => tiktoken_rs::cl100k_base(),
            Encoding::O200kBase => tiktoken_rs::o200k_base(),
            Encoding::P50kBase => tiktoken_rs::p50k_base(),
            Encoding::R50kBase => tiktoken_rs::r50k_base(),
        };
        let bpe = loaded.map_err(|e| TokenizerError::Configuration {
            encoding,
            reason: e.to_string(),
        })?;
        tracing::debug!(encoding = %encoding, "Loaded BPE table");
        Ok(Self { encoding, bpe })
    }

    pub fn from_name(name: &str) -> Result<Self, TokenizerError> {
        Self::new(name.parse()?)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn decode_bytes(&self, tokens: &[u32]) -> Vec<u8> {
        let known: Vec<u32> = tokens
            .iter()
            .copied()
            .filter(|id| self.encoding.is_known_id(*id))
            .collect();
        if known.len() < tokens.len() {
            tracing::debug!(
                encoding = %self.encoding,
                skipped = tokens.len() - known.len(),
                "Skipping token ids outside the vocabulary"
            );
        }
        self.bpe._decode_native_and_split(known).flatten().collect()
    }
}

impl fmt::Debug for BpeTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BpeTokenizer")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl Tokenizer for BpeTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> String {
        bytes_to_text(self.decode_bytes(tokens))
    }
}

/// Converts decoded bytes to text, dropping a truncated trailing character
/// and replacing any other invalid sequence.
pub fn bytes_to_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            let utf8 = e.utf8_error();
            let bytes = e.into_bytes();
            match utf8.error_len() {
                // Incomplete sequence at the very end
                None => String::from_utf8_lossy(&bytes[..utf8.valid_up_to()]).into_owned(),
                Some(_) => String::from_utf8_lossy(&bytes).into_owned(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cl100k() -> BpeTokenizer {
        BpeTokenizer::new(Encoding::Cl100kBase).unwrap()
    }

    #[test]
    fn test_encoding_names_round_trip() {
        for enc in [
            Encoding::Cl100kBase,
            Encoding::O200kBase,
            Encoding::P50kBase,
            Encoding::R50kBase,
        ] {
            assert_eq!(enc.name().parse::<Encoding>().unwrap(), enc);
        }
        assert_eq!(" CL100K_BASE ".parse::<Encoding>().unwrap(), Encoding::Cl100kBase);
    }

    #[test]
    fn test_unknown_encoding_is_configuration_error() {
        let err = BpeTokenizer::from_name("gpt2_base").unwrap_err();
        assert!(matches!(err, TokenizerError::UnknownEncoding(_)));
        assert!(err.to_string().contains("gpt2_base"));
    }

    #[test]
    fn test_encode_decode() {
        let tok = cl100k();
        let text = "The quick brown fox jumps over the lazy dog.";
        let ids = tok.encode(text);
        assert!(!ids.is_empty());
        assert!(ids.len() < text.len());
        assert_eq!(tok.decode(&ids), text);
        assert_eq!(tok.count(text), ids.len());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let tok = cl100k();
        assert_eq!(tok.encode("same input"), tok.encode("same input"));
    }

    #[test]
    fn test_empty() {
        let tok = cl100k();
        assert!(tok.encode("").is_empty());
        assert_eq!(tok.decode(&[]), "");
    }

    #[test]
    fn test_decode_prefix_never_panics_on_multibyte() {
        let tok = cl100k();
        let text = "日本語のテキストと絵文字 🦀🦀🦀 が混ざっています。";
        let ids = tok.encode(text);
        for n in 0..=ids.len() {
            let decoded = tok.decode(&ids[..n]);
            assert!(
                text.starts_with(&decoded),
                "prefix {n} decoded to {decoded:?}, not a prefix of the input"
            );
        }
    }

    #[test]
    fn test_decode_skips_unknown_ids() {
        let tok = cl100k();
        let head = tok.encode("Hello there,");
        let tail = tok.encode(" general Kenobi.");
        let mut ids = head.clone();
        ids.push(u32::MAX);
        ids.push(100_256);
        ids.extend(&tail);
        assert_eq!(tok.decode(&ids), "Hello there, general Kenobi.");
        assert_eq!(tok.decode(&[u32::MAX]), "");
    }

    #[test]
    fn test_decode_special_tokens() {
        assert_eq!(cl100k().decode(&[100_257]), "<|endoftext|>");
        assert_eq!(cl100k().decode(&[100_276]), "<|endofprompt|>");
        let r50k = BpeTokenizer::new(Encoding::R50kBase).unwrap();
        assert_eq!(r50k.decode(&[50_256]), "<|endoftext|>");
    }

    #[test]
    fn test_encoded_ids_are_known_in_every_table() {
        let text = "Plain ASCII, ünïcödé, 日本語, emoji 🦀 and    runs of spaces.\n\tTabs too!";
        for enc in [
            Encoding::Cl100kBase,
            Encoding::O200kBase,
            Encoding::P50kBase,
            Encoding::R50kBase,
        ] {
            let tok = BpeTokenizer::new(enc).unwrap();
            let ids = tok.encode(text);
            assert!(ids.iter().all(|id| enc.is_known_id(*id)), "{enc}");
            assert_eq!(tok.decode(&ids), text, "{enc}");
        }
    }

    #[test]
    fn test_is_known_id_edges() {
        assert!(Encoding::Cl100kBase.is_known_id(100_255));
        assert!(!Encoding::Cl100kBase.is_known_id(100_256));
        assert!(!Encoding::Cl100kBase.is_known_id(100_261));
        assert!(!Encoding::O200kBase.is_known_id(199_998));
        assert!(Encoding::R50kBase.is_known_id(50_256));
        assert!(!Encoding::R50kBase.is_known_id(50_257));
        assert!(Encoding::P50kBase.is_known_id(50_280));
        assert!(!Encoding::P50kBase.is_known_id(u32::MAX));
    }

    #[test]
    fn test_bytes_to_text_drops_truncated_tail() {
        let mut bytes = "ok ".as_bytes().to_vec();
        bytes.extend_from_slice(&"🦀".as_bytes()[..2]);
        assert_eq!(bytes_to_text(bytes), "ok ");
    }

    #[test]
    fn test_bytes_to_text_replaces_inner_garbage() {
        let bytes = vec![b'a', 0xff, b'b'];
        assert_eq!(bytes_to_text(bytes), "a\u{fffd}b");
    }
}
