//! Incremental sentence segmentation of the streamed reply.
//!
//! A sentence ends at `.`, `!` or `?` followed by whitespace. Deltas
//! arrive at arbitrary boundaries, so text is buffered until a boundary
//! is certain; a trailing fragment without terminal punctuation is
//! flushed when the stream completes.

pub struct SentenceSegmenter {
    buf: String,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    /// Feed a delta; returns the sentences completed by it, in order.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buf.push_str(delta);

        let mut completed = Vec::new();
        let chars: Vec<(usize, char)> = self.buf.char_indices().collect();
        let mut start = 0usize;
        let mut i = 0usize;

        while i < chars.len() {
            let (pos, c) = chars[i];
            if matches!(c, '.' | '!' | '?') {
                if let Some(&(_, next)) = chars.get(i + 1) {
                    if next.is_whitespace() {
                        let sentence = self.buf[start..pos + c.len_utf8()].trim();
                        if !sentence.is_empty() {
                            completed.push(sentence.to_string());
                        }
                        // Swallow the whitespace run after the boundary.
                        let mut j = i + 1;
                        while j < chars.len() && chars[j].1.is_whitespace() {
                            j += 1;
                        }
                        start = chars.get(j).map(|&(p, _)| p).unwrap_or(self.buf.len());
                        i = j;
                        continue;
                    }
                }
                // Punctuation at the very end of the buffer: the next
                // delta decides whether this is a boundary.
            }
            i += 1;
        }

        if start > 0 {
            self.buf.drain(..start);
        }
        completed
    }

    /// Flush the trailing fragment at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(deltas: &[&str]) -> Vec<String> {
        let mut seg = SentenceSegmenter::new();
        let mut out = Vec::new();
        for d in deltas {
            out.extend(seg.push(d));
        }
        out.extend(seg.finish());
        out
    }

    #[test]
    fn splits_on_terminal_punctuation_followed_by_whitespace() {
        let out = collect(&["Dag meneer. Hoe gaat het? Goed zo!"]);
        assert_eq!(out, vec!["Dag meneer.", "Hoe gaat het?", "Goed zo!"]);
    }

    #[test]
    fn trailing_fragment_without_punctuation_is_flushed_at_finish() {
        let out = collect(&["Ja. En dan nog iets"]);
        assert_eq!(out, vec!["Ja.", "En dan nog iets"]);
    }

    #[test]
    fn boundary_split_across_deltas() {
        // The period arrives in one delta, the whitespace in the next.
        let mut seg = SentenceSegmenter::new();
        assert!(seg.push("Goedemorgen.").is_empty());
        assert_eq!(seg.push(" Hoe gaat het?"), vec!["Goedemorgen."]);
        assert_eq!(seg.finish(), Some("Hoe gaat het?".to_string()));
    }

    #[test]
    fn never_splits_mid_sentence() {
        let out = collect(&["Dat is ", "nummer 3", " van de lijst. Klaar."]);
        assert_eq!(out[0], "Dat is nummer 3 van de lijst.");
    }

    #[test]
    fn period_without_following_whitespace_is_not_a_boundary() {
        let out = collect(&["Bel 112.nu direct"]);
        assert_eq!(out, vec!["Bel 112.nu direct"]);
    }

    #[test]
    fn concatenation_preserves_full_text_up_to_whitespace() {
        let full = "Eerste zin. Tweede zin! Derde zin? En een staartje";
        // Re-chunk the same text arbitrarily.
        let deltas: Vec<String> = full
            .as_bytes()
            .chunks(7)
            .map(|c| String::from_utf8(c.to_vec()).unwrap())
            .collect();
        let refs: Vec<&str> = deltas.iter().map(|s| s.as_str()).collect();
        let joined = collect(&refs).join(" ");
        assert_eq!(joined, full);
    }

    #[test]
    fn empty_and_whitespace_only_input_yields_nothing() {
        assert!(collect(&["   ", "\n"]).is_empty());
        assert!(collect(&[]).is_empty());
    }
}
