use thiserror::Error;

pub type MarkupResult<T> = Result<T, MarkupError>;

#[derive(Error, Debug, Clone)]
pub enum MarkupError {
    // --- resource errors ---

    #[error("Failed to read markup resource '{location}': {message}")]
    ResourceRead { location: String, message: String },

    #[error("Unsupported encoding '{encoding}' declared in '{location}'")]
    UnsupportedEncoding { location: String, encoding: String },

    // --- structural parse errors ---

    #[error("Parse error in '{location}' at line {line}, column {column}: {message}\n{context}")]
    ParseError {
        location: String,
        line: usize,
        column: usize,
        message: String,
        tag: Option<String>,
        context: String,
    },

    #[error("Close tag '{tag}' in '{location}' does not match open tag '{expected}'")]
    UnbalancedTag {
        location: String,
        tag: String,
        expected: String,
    },

    #[error("Tag '{tag}' in '{location}' has no matching close tag")]
    UnclosedTag { location: String, tag: String },

    // --- inheritance contract violations ---

    #[error("Expected to find <{namespace}:child/> in base markup '{location}' of class '{class}'")]
    MissingChildTag {
        class: String,
        location: String,
        namespace: String,
    },

    #[error("Expected to find </{namespace}:child> in base markup '{location}' of class '{class}'")]
    MissingChildCloseTag {
        class: String,
        location: String,
        namespace: String,
    },

    #[error("Did not expect a </{namespace}:child> tag in base markup '{location}' of class '{class}'")]
    UnexpectedChildClose {
        class: String,
        location: String,
        namespace: String,
    },

    #[error("Expected to find <{namespace}:extend> in derived markup '{location}' of class '{class}'")]
    MissingExtendTag {
        class: String,
        location: String,
        namespace: String,
    },

    #[error("Missing close tag </{namespace}:extend> in derived markup '{location}' of class '{class}'")]
    MissingExtendCloseTag {
        class: String,
        location: String,
        namespace: String,
    },

    #[error("Tag '{tag}' is not allowed between <{namespace}:child> and </{namespace}:child> in base markup '{location}' of class '{class}'")]
    ReservedTagInChild {
        class: String,
        location: String,
        namespace: String,
        tag: String,
    },

    #[error("<{namespace}:extend> in '{location}' of class '{class}' must come before component tag '{tag}'")]
    ExtendNotFirst {
        class: String,
        location: String,
        namespace: String,
        tag: String,
    },

    #[error("Class '{class}' uses markup inheritance but no base markup was found for any ancestor of it")]
    MissingBaseMarkup { class: String },

    // --- lookup misuse ---

    #[error("Class '{class}' is not assignable to container class '{container}'")]
    ClassNotAssignable { class: String, container: String },

    #[error("Unknown component class '{class}': not registered")]
    UnknownComponentClass { class: String },

    #[error("Markup fragment '{path}' not found in '{location}'")]
    FragmentNotFound { path: String, location: String },

    #[error("No markup found for component class '{class}'")]
    MarkupNotFound { class: String },

    #[error("Markup stream error in '{location}' at element {index}: {message}\n{context}")]
    MarkupStream {
        location: String,
        index: usize,
        message: String,
        context: String,
    },

    // --- mutability ---

    #[error("Markup '{location}' is immutable: {operation} is not allowed")]
    ImmutableMarkup { location: String, operation: String },

    #[error("Tag '{tag}' is immutable: call mutable() to get an editable copy")]
    ImmutableTag { tag: String },

    // --- configuration ---

    #[error("Settings error: {0}")]
    Settings(String),
}

impl From<serde_yaml::Error> for MarkupError {
    fn from(err: serde_yaml::Error) -> Self {
        MarkupError::Settings(err.to_string())
    }
}

impl MarkupError {
    /// True for errors that come from a missing or unreadable resource rather
    /// than from broken markup.
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            MarkupError::ResourceRead { .. } | MarkupError::UnsupportedEncoding { .. }
        )
    }

    /// True for inheritance contract violations (child/extend problems).
    pub fn is_inheritance_error(&self) -> bool {
        matches!(
            self,
            MarkupError::MissingChildTag { .. }
                | MarkupError::MissingChildCloseTag { .. }
                | MarkupError::UnexpectedChildClose { .. }
                | MarkupError::MissingExtendTag { .. }
                | MarkupError::MissingExtendCloseTag { .. }
                | MarkupError::ReservedTagInChild { .. }
                | MarkupError::ExtendNotFirst { .. }
                | MarkupError::MissingBaseMarkup { .. }
        )
    }
}
