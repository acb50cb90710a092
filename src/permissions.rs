use axum::http::Method;

use crate::{auth::AuthUser, error::ApiError, models::Role};

/// Action
///
/// What the request wants to do, derived from its HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
}

impl From<&Method> for Action {
    fn from(method: &Method) -> Self {
        match method {
            &Method::POST => Action::Create,
            &Method::PUT | &Method::PATCH => Action::Update,
            &Method::DELETE => Action::Delete,
            // GET, HEAD, OPTIONS and anything exotic only read.
            _ => Action::Read,
        }
    }
}

/// Resource
///
/// The protection class of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Titles, categories and genres.
    Catalog,
    /// Reviews and comments.
    Content,
    /// User management under `/users/`.
    Account,
    /// The requester's own profile at `/users/me/`.
    OwnProfile,
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    AuthenticationRequired,
    PermissionDenied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    /// Converts a denial into the matching request error.
    pub fn into_result(self) -> Result<(), ApiError> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(DenyReason::AuthenticationRequired) => {
                Err(ApiError::AuthenticationRequired)
            }
            Decision::Deny(DenyReason::PermissionDenied) => Err(ApiError::PermissionDenied),
        }
    }
}

/// Who may act, before the requester is known.
enum Requirement {
    Anyone,
    Authenticated,
    Admin,
    // Admin, moderator, or the author of the object.
    Staff,
}

fn requirement(action: Action, resource: Resource) -> Requirement {
    use Action::*;
    use Resource::*;

    match (action, resource) {
        (Read, Catalog | Content) => Requirement::Anyone,
        (Read, OwnProfile) => Requirement::Authenticated,
        (Read, Account) => Requirement::Admin,

        (Create, Content) => Requirement::Authenticated,
        (Update, OwnProfile) => Requirement::Authenticated,
        (Update | Delete, Content) => Requirement::Staff,

        // Catalog and account writes, plus anything on `/users/me/` besides read/update.
        _ => Requirement::Admin,
    }
}

/// check
///
/// The single authorization rule of the API. Pure: the caller resolves the
/// requester and, for object-level actions, whether they authored the object.
///
/// An anonymous requester is told to authenticate wherever the rule needs an
/// identity; an authenticated one lacking the role gets a permission error.
pub fn check(
    action: Action,
    resource: Resource,
    requester: Option<&AuthUser>,
    is_author: bool,
) -> Decision {
    let requirement = requirement(action, resource);
    if matches!(requirement, Requirement::Anyone) {
        return Decision::Allow;
    }

    let Some(user) = requester else {
        return Decision::Deny(DenyReason::AuthenticationRequired);
    };

    let allowed = match requirement {
        Requirement::Anyone | Requirement::Authenticated => true,
        Requirement::Admin => user.is_admin(),
        Requirement::Staff => user.is_admin() || user.role == Role::Moderator || is_author,
    };

    if allowed {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::PermissionDenied)
    }
}

/// Shorthand for handlers: evaluate [`check`] and turn a denial into an error.
pub fn authorize(
    action: Action,
    resource: Resource,
    requester: Option<&AuthUser>,
    is_author: bool,
) -> Result<(), ApiError> {
    let decision = check(action, resource, requester, is_author);
    if let Decision::Deny(reason) = decision {
        tracing::debug!(?action, ?resource, ?reason, "request denied");
    }
    decision.into_result()
}
