//! Best-effort charset detection and UTF-8 transcoding.
//!
//! Detection samples the head of a file and runs a statistical guesser;
//! anything below the confidence threshold is treated as unknown. Callers
//! must treat `None` as "serve the bytes as they are": a wrong or missing
//! guess degrades output fidelity, never availability.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use encoding_rs::Encoding;

/// A named charset guess with the detector's confidence in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct EncodingGuess {
    pub name: String,
    pub confidence: f32,
}

impl EncodingGuess {
    /// UTF-8 sources are served untouched.
    pub fn is_utf8(&self) -> bool {
        self.name.eq_ignore_ascii_case("utf-8")
    }
}

/// Guess the encoding of a file from up to `sample_size` bytes at its head.
///
/// Returns `None` for empty or unreadable files and for guesses below
/// `min_confidence`.
pub fn detect_file(path: &Path, sample_size: usize, min_confidence: f32) -> Option<EncodingGuess> {
    let file = File::open(path).ok()?;
    let mut sample = Vec::new();
    file.take(sample_size as u64).read_to_end(&mut sample).ok()?;
    detect_bytes(&sample, min_confidence)
}

/// Guess the encoding of a byte sample.
pub fn detect_bytes(sample: &[u8], min_confidence: f32) -> Option<EncodingGuess> {
    if sample.is_empty() {
        return None;
    }

    let (name, confidence, _language) = chardet::detect(sample);
    if name.is_empty() || confidence < min_confidence {
        return None;
    }

    Some(EncodingGuess { name, confidence })
}

/// Map a detector charset name to a concrete encoding. The detector's names
/// are not all WHATWG labels, so the raw name is tried first and then the
/// detector's own label translation.
fn encoding_for_guess(guess: &EncodingGuess) -> Option<&'static Encoding> {
    Encoding::for_label(guess.name.as_bytes())
        .or_else(|| Encoding::for_label(chardet::charset2encoding(&guess.name).as_bytes()))
}

/// Rewrite `bytes` from the guessed encoding into UTF-8, replacing
/// undecodable sequences. Bytes come back unchanged when the guess is UTF-8,
/// resolves to UTF-8, or names an encoding we cannot map.
pub fn transcode_to_utf8(bytes: Vec<u8>, guess: &EncodingGuess) -> Vec<u8> {
    if guess.is_utf8() {
        return bytes;
    }

    let Some(encoding) = encoding_for_guess(guess) else {
        return bytes;
    };
    if encoding == encoding_rs::UTF_8 {
        return bytes;
    }

    let (text, _had_errors) = encoding.decode_without_bom_handling(&bytes);
    text.into_owned().into_bytes()
}
