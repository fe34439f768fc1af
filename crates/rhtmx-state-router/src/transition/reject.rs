/// Transition rejections
///
/// Every failed transition settles with exactly one [`Rejection`]. It is a
/// plain cloneable value so the same outcome can be handed to every waiter.
use std::fmt;
use std::sync::Arc;

use super::Transition;
use crate::error::ResolveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectType {
    /// Another transition started, or a hook redirected elsewhere
    Superseded,
    /// A hook returned `Abort` or failed synchronously
    Aborted,
    /// The target state does not exist, is abstract, or its params are invalid
    Invalid,
    /// The target is the current state with the same params
    Ignored,
    /// A resolvable or an asynchronous hook failed
    Error,
}

impl fmt::Display for RejectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectType::Superseded => "SUPERSEDED",
            RejectType::Aborted => "ABORTED",
            RejectType::Invalid => "INVALID",
            RejectType::Ignored => "IGNORED",
            RejectType::Error => "ERROR",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Default)]
pub enum RejectDetail {
    #[default]
    None,
    Message(String),
    /// The transition a redirect created
    Redirect(Transition),
    /// The producer or hook error
    Error(Arc<anyhow::Error>),
}

impl fmt::Debug for RejectDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectDetail::None => f.write_str("None"),
            RejectDetail::Message(message) => f.debug_tuple("Message").field(message).finish(),
            RejectDetail::Redirect(transition) => f.debug_tuple("Redirect").field(&transition.to_string()).finish(),
            RejectDetail::Error(err) => f.debug_tuple("Error").field(&format!("{err:#}")).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rejection {
    kind: RejectType,
    message: String,
    detail: RejectDetail,
    redirected: bool,
}

impl Rejection {
    fn new(kind: RejectType, message: impl Into<String>, detail: RejectDetail) -> Self {
        Self {
            kind,
            message: message.into(),
            detail,
            redirected: false,
        }
    }

    pub fn superseded() -> Self {
        Self::new(
            RejectType::Superseded,
            "The transition has been superseded by a different transition",
            RejectDetail::None,
        )
    }

    pub fn redirected(to: Transition) -> Self {
        Self {
            redirected: true,
            ..Self::new(
                RejectType::Superseded,
                "The transition has been superseded by a different transition",
                RejectDetail::Redirect(to),
            )
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(
            RejectType::Aborted,
            "The transition has been aborted",
            RejectDetail::Message(reason),
        )
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self::new(RejectType::Invalid, "This transition is invalid", RejectDetail::Message(reason))
    }

    pub fn ignored() -> Self {
        Self::new(
            RejectType::Ignored,
            "The transition was ignored",
            RejectDetail::Message("Same as current state".to_string()),
        )
    }

    pub fn error(err: anyhow::Error) -> Self {
        Self::errored(Arc::new(err))
    }

    pub fn errored(err: Arc<anyhow::Error>) -> Self {
        Self::new(RejectType::Error, "The transition errored", RejectDetail::Error(err))
    }

    pub fn kind(&self) -> RejectType {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn detail(&self) -> &RejectDetail {
        &self.detail
    }

    pub fn is_redirected(&self) -> bool {
        self.redirected
    }

    /// The transition a redirect created
    pub fn redirect(&self) -> Option<&Transition> {
        match &self.detail {
            RejectDetail::Redirect(transition) => Some(transition),
            _ => None,
        }
    }

    /// The underlying error of an `Error` rejection
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match &self.detail {
            RejectDetail::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ResolveError> for Rejection {
    fn from(err: ResolveError) -> Self {
        Rejection::error(anyhow::Error::new(err))
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transition Rejection ({}): {}", self.kind, self.message)?;
        match &self.detail {
            RejectDetail::None => Ok(()),
            RejectDetail::Message(message) => write!(f, " ({message})"),
            RejectDetail::Redirect(transition) => write!(f, " (redirected to {transition})"),
            RejectDetail::Error(err) => write!(f, " ({err:#})"),
        }
    }
}

impl std::error::Error for Rejection {}
