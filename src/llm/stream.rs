//! Incremental parsing of newline-delimited JSON completion fragments.
//!
//! A streaming text-generation response is a sequence of lines such as
//! `{"response": "A photo", "done": false}`. [`FragmentChunks`] walks the body
//! lazily and yields the text chunks in arrival order, stopping at the first
//! fragment with `done: true` or at end of input.

use serde::Deserialize;

use crate::error::LlmError;

/// What to do with a line that is not valid JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedLinePolicy {
    /// Drop the line and keep going; a partial prompt beats none.
    #[default]
    Skip,
    /// Fail the whole response.
    Abort,
}

/// A single decoded fragment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Fragment {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// Lazy iterator over the text chunks of a fragment stream.
pub struct FragmentChunks<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    policy: MalformedLinePolicy,
    finished: bool,
    parsed: usize,
    skipped: usize,
}

impl<'a> FragmentChunks<'a> {
    pub fn new(body: &'a str, policy: MalformedLinePolicy) -> Self {
        Self {
            lines: body.lines().enumerate(),
            policy,
            finished: false,
            parsed: 0,
            skipped: 0,
        }
    }

    /// Number of fragments decoded so far.
    pub fn parsed(&self) -> usize {
        self.parsed
    }

    /// Number of malformed lines dropped so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// True once a `done` fragment has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Iterator for FragmentChunks<'_> {
    type Item = Result<String, LlmError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            let (index, line) = self.lines.next()?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let fragment: Fragment = match serde_json::from_str(line) {
                Ok(fragment) => fragment,
                Err(e) => match self.policy {
                    MalformedLinePolicy::Skip => {
                        self.skipped += 1;
                        tracing::debug!(line = index + 1, error = %e, "Skipping malformed fragment");
                        continue;
                    }
                    MalformedLinePolicy::Abort => {
                        self.finished = true;
                        return Some(Err(LlmError::MalformedFragment {
                            line: index + 1,
                            message: e.to_string(),
                        }));
                    }
                },
            };

            self.parsed += 1;
            self.finished = fragment.done;
            if let Some(chunk) = fragment.response {
                return Some(Ok(chunk));
            }
        }
        None
    }
}

/// Concatenates every chunk of `body`.
///
/// Errors if a malformed line is hit under [`MalformedLinePolicy::Abort`], or if
/// the body contains no decodable fragment at all.
pub fn collect_fragments(body: &str, policy: MalformedLinePolicy) -> Result<String, LlmError> {
    let mut chunks = FragmentChunks::new(body, policy);
    let mut text = String::new();
    for chunk in chunks.by_ref() {
        text.push_str(&chunk?);
    }

    if chunks.parsed() == 0 {
        return Err(LlmError::ParseError(
            "response contained no decodable fragment".to_string(),
        ));
    }
    if chunks.skipped() > 0 {
        tracing::warn!(skipped = chunks.skipped(), "Dropped malformed response fragments");
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_object_response() {
        let body = r#"{"response": "A photorealistic...", "done": true}"#;
        assert_eq!(
            collect_fragments(body, MalformedLinePolicy::Skip).unwrap(),
            "A photorealistic..."
        );
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let body = concat!(
            "{\"response\":\"Thin \",\"done\":false}\n",
            "{\"response\":\"smoke \",\"done\":false}\n",
            "{\"response\":\"rising\",\"done\":false}\n",
            "{\"response\":\"\",\"done\":true,\"total_duration\":123}\n",
        );
        assert_eq!(
            collect_fragments(body, MalformedLinePolicy::Skip).unwrap(),
            "Thin smoke rising"
        );
    }

    #[test]
    fn test_stops_at_done() {
        let body = "{\"response\":\"kept\",\"done\":true}\n{\"response\":\"ignored\"}\n";
        let chunks: Vec<_> = FragmentChunks::new(body, MalformedLinePolicy::Skip)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(chunks, vec!["kept".to_string()]);
    }

    #[test]
    fn test_missing_done_reads_to_end() {
        let body = "{\"response\":\"a\"}\n\n{\"response\":\"b\"}";
        assert_eq!(collect_fragments(body, MalformedLinePolicy::Skip).unwrap(), "ab");
    }

    #[test]
    fn test_skip_policy_drops_malformed_line() {
        let body = "{\"response\":\"a\"}\nnot json\n{\"response\":\"b\",\"done\":true}";
        let mut chunks = FragmentChunks::new(body, MalformedLinePolicy::Skip);
        let text: String = chunks.by_ref().map(|c| c.unwrap()).collect();
        assert_eq!(text, "ab");
        assert_eq!(chunks.skipped(), 1);
        assert!(chunks.is_finished());
    }

    #[test]
    fn test_abort_policy_fails_on_malformed_line() {
        let body = "{\"response\":\"a\"}\nnot json\n{\"response\":\"b\"}";
        let err = collect_fragments(body, MalformedLinePolicy::Abort).unwrap_err();
        assert!(matches!(err, LlmError::MalformedFragment { line: 2, .. }));
    }

    #[test]
    fn test_unparseable_body_is_error() {
        let err = collect_fragments("<html>502</html>", MalformedLinePolicy::Skip).unwrap_err();
        assert!(matches!(err, LlmError::ParseError(_)));
        assert!(collect_fragments("", MalformedLinePolicy::Skip).is_err());
    }
}
