//! crates/rapid_review_core/src/access.rs
//!
//! Project role checks shared by the flows. The store's own policies stay
//! authoritative; these checks only fail fast with a readable reason.

use uuid::Uuid;

use crate::domain::Role;
use crate::error::{CoreError, CoreResult};
use crate::ports::DatabaseService;

/// Returns the caller's role, or `Forbidden` when they are not a project member.
pub async fn require_member(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
) -> CoreResult<Role> {
    db.get_member_role(project_id, user_id)
        .await?
        .ok_or_else(|| {
            CoreError::Forbidden(format!("user {} is not a member of project {}", user_id, project_id))
        })
}

/// Like `require_member`, but only senior reviewers and admins pass.
pub async fn require_senior(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
) -> CoreResult<Role> {
    let role = require_member(db, project_id, user_id).await?;
    if role.is_senior() {
        Ok(role)
    } else {
        Err(CoreError::Forbidden(format!(
            "role '{}' cannot perform this action",
            role.as_str()
        )))
    }
}

pub async fn require_admin(
    db: &dyn DatabaseService,
    project_id: Uuid,
    user_id: Uuid,
) -> CoreResult<Role> {
    match require_member(db, project_id, user_id).await? {
        Role::Admin => Ok(Role::Admin),
        role => Err(CoreError::Forbidden(format!(
            "role '{}' cannot manage project members",
            role.as_str()
        ))),
    }
}
