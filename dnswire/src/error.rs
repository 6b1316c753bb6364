use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("message too short")]
    TooShort,
    #[error("invalid label length")]
    InvalidLabelLength,
    #[error("offset out of bounds")]
    OutOfBounds,
    #[error("incomplete name")]
    IncompleteName,
    #[error("incomplete question")]
    IncompleteQuestion,
    #[error("incomplete resource record header")]
    IncompleteRecordHeader,
    #[error("incomplete resource record data")]
    IncompleteRecordData,
    #[error("too many compression pointers")]
    TooManyPointers,
}

/// Failure to decode a wire message: what went wrong plus where.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub detail: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, detail: impl Into<String>) -> ParseError {
        ParseError {
            kind,
            detail: detail.into(),
        }
    }

    pub(crate) fn context(self, context: impl AsRef<str>) -> ParseError {
        ParseError {
            kind: self.kind,
            detail: format!("{}: {}", context.as_ref(), self.detail),
        }
    }
}
