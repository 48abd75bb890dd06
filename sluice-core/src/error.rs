use thiserror::Error;

/// Classified failures raised by the engine.
///
/// Every fallible operation returns [`crate::Result`], an `anyhow` alias. Callers that
/// need to branch on the failure category recover it with
/// `error.downcast_ref::<SluiceError>()`, which also sees through any added context.
#[derive(Debug, Error)]
pub enum SluiceError {
    /// A predicate, statement or mapping could not be turned into SQL.
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    /// Placeholder numbering does not match the supplied arguments.
    #[error("{message} (in `{sql}`)")]
    ParameterBinding { message: String, sql: String },
    /// A column value could not be converted into the destination field.
    #[error("Cannot convert column `{column}`: {message}")]
    Conversion { column: String, message: String },
    /// The server rejected a command. Bulk batches surface the server's own message here.
    #[error("{message}")]
    Execution {
        message: String,
        severity: Option<u8>,
        state: Option<u8>,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompilationError {
    #[error("Unsupported expression kind `{0}`")]
    UnsupportedExpressionKind(String),
    #[error("Member `{member}` is not mapped to a column of `{entity}`")]
    UnknownMember { member: String, entity: String },
    #[error("Cannot find a `SELECT ... FROM` shape in `{0}`")]
    UnparseableSelect(String),
    #[error("Invalid mapping for `{entity}`: {message}")]
    InvalidMapping { entity: String, message: String },
}

impl SluiceError {
    pub fn execution(message: impl Into<String>) -> Self {
        SluiceError::Execution {
            message: message.into(),
            severity: None,
            state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    fn fails() -> Result<()> {
        Err(SluiceError::from(CompilationError::UnsupportedExpressionKind(
            "Addition".into(),
        )))?
    }

    #[test]
    fn compilation_errors_are_classified() {
        let error = fails().unwrap_err();
        let error = error.context("While building the statement");
        assert!(matches!(
            error.downcast_ref::<SluiceError>(),
            Some(SluiceError::Compilation(
                CompilationError::UnsupportedExpressionKind(kind)
            )) if kind == "Addition"
        ));
    }

    #[test]
    fn execution_message_is_verbatim() {
        let error = SluiceError::Execution {
            message: "Violation of PRIMARY KEY constraint 'PK_FD_BaseData'".into(),
            severity: Some(14),
            state: Some(1),
        };
        assert_eq!(
            error.to_string(),
            "Violation of PRIMARY KEY constraint 'PK_FD_BaseData'"
        );
    }
}
