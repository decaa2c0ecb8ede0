// Operator identity used to namespace backup slots.

use crate::refname::sanitize;

/// Resolve the ref-safe identity for the current operator.
///
/// Precedence: a non-empty `override_user`, then a non-empty committer
/// name, then the local part of the committer email (the whole email when
/// it has no `@`). The winner is passed through [`sanitize`].
///
/// Returns an empty string only when every input is blank; callers must
/// treat that as a hard precondition failure.
pub fn resolve_identity(
    override_user: &str,
    committer_name: &str,
    committer_email: &str,
) -> String {
    let override_user = override_user.trim();
    if !override_user.is_empty() {
        return sanitize(override_user);
    }

    let committer_name = committer_name.trim();
    if !committer_name.is_empty() {
        return sanitize(committer_name);
    }

    let email = committer_email.trim();
    let local_part = email.split_once('@').map(|(local, _)| local).unwrap_or(email);
    sanitize(local_part)
}
