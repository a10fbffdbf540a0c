//! Disfluency removal for recognized speech.
//!
//! Filler words are removed only as whole whitespace-bounded tokens, so "umbrella"
//! and "likely" survive. Multi-word fillers ("you know") must match token by
//! token. Matching is case-insensitive and a single trailing comma on a filler
//! token is tolerated ("um, I need").

/// Fillers removed from every transcript.
pub const DEFAULT_FILLERS: &[&str] = &["um", "uh", "like", "you know", "sort of", "kind of", "I mean"];

/// Pure, idempotent transcript cleaner.
#[derive(Debug, Clone)]
pub struct SpeechNormalizer {
    /// Each filler split into lowercase tokens.
    fillers: Vec<Vec<String>>,
}

impl Default for SpeechNormalizer {
    fn default() -> Self {
        Self::with_fillers(DEFAULT_FILLERS.iter().copied())
    }
}

impl SpeechNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a normalizer over a custom filler vocabulary.
    pub fn with_fillers<'a, I: IntoIterator<Item = &'a str>>(fillers: I) -> Self {
        let mut fillers: Vec<Vec<String>> = fillers
            .into_iter()
            .map(|f| f.split_whitespace().map(str::to_lowercase).collect::<Vec<_>>())
            .filter(|tokens| !tokens.is_empty())
            .collect();
        // Longest first so "you know" wins over a shorter filler starting with "you".
        fillers.sort_by(|a, b| b.len().cmp(&a.len()));
        Self { fillers }
    }

    /// Remove fillers, collapse whitespace, and trim.
    ///
    /// Removal repeats until nothing changes, so fillers exposed by an earlier
    /// removal ("you um know") are also removed and `normalize` is idempotent.
    pub fn normalize(&self, text: &str) -> String {
        let mut tokens: Vec<&str> = text.split_whitespace().collect();
        loop {
            let kept = self.strip_pass(&tokens);
            if kept.len() == tokens.len() {
                break;
            }
            tokens = kept;
        }
        tokens.join(" ")
    }

    fn strip_pass<'t>(&self, tokens: &[&'t str]) -> Vec<&'t str> {
        let mut kept = Vec::with_capacity(tokens.len());
        let mut i = 0;
        while i < tokens.len() {
            match self.filler_at(&tokens[i..]) {
                Some(len) => i += len,
                None => {
                    kept.push(tokens[i]);
                    i += 1;
                }
            }
        }
        kept
    }

    /// Length in tokens of the filler starting at `tokens[0]`, if any.
    fn filler_at(&self, tokens: &[&str]) -> Option<usize> {
        self.fillers.iter().find_map(|filler| {
            if filler.len() > tokens.len() {
                return None;
            }
            let last = filler.len() - 1;
            let matches = filler.iter().zip(tokens).enumerate().all(|(idx, (want, &got))| {
                let got: &str = if idx == last {
                    got.strip_suffix(',').unwrap_or(got)
                } else {
                    got
                };
                got.eq_ignore_ascii_case(want)
            });
            matches.then_some(filler.len())
        })
    }
}
