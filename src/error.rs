use thiserror::Error;

/// Lexical failure in raw markup: broken syntax, attributes or escapes.
/// Tags that do not pair up are recovered from and never reported here.
#[derive(Error, Debug)]
pub enum MarkupError {
    #[error("XML syntax error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("invalid attribute: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
}

/// A tagged term occurrence that could not be placed in its block's word list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("term has no words after normalization")]
    EmptyTerm,

    #[error("occurrence {occurrence} of \"{term}\" not found in block")]
    NotFound { term: String, occurrence: usize },
}

#[derive(Error, Debug)]
pub enum PageError {
    #[error("cannot derive folio from file name {0:?}")]
    BadFileName(String),
}

#[derive(Error, Debug)]
pub enum ThesaurusError {
    #[error("failed to read thesaurus {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed thesaurus JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown property {0:?} in thesaurus")]
    UnknownProperty(String),
}
