use crate::types::StructuredReply;

/// The externally observed unit of a streaming turn, produced once per processed frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    /// False when the transport failed; `error` then says why.
    pub success: bool,

    /// The whole reply accumulated so far, not just the latest fragment.
    pub reply: String,

    /// True for the last result of the turn.
    pub is_final: bool,

    /// Error description for failed results; empty otherwise.
    pub error: String,

    /// Present only on a final result whose reply parsed as structured data.
    pub structured: Option<StructuredReply>,
}

impl FetchResult {
    /// A successful result carrying the accumulated `reply`.
    pub fn fragment(reply: impl Into<String>, is_final: bool) -> Self {
        Self {
            success: true,
            reply: reply.into(),
            is_final,
            error: String::new(),
            structured: None,
        }
    }

    /// A terminal failure.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            reply: String::new(),
            is_final: true,
            error: error.into(),
            structured: None,
        }
    }

    /// Attach the parsed structured reply.
    pub fn with_structured(mut self, structured: Option<StructuredReply>) -> Self {
        self.structured = structured;
        self
    }
}

impl From<crate::Error> for FetchResult {
    fn from(err: crate::Error) -> Self {
        Self::failure(err.to_string())
    }
}
