// Backup ref naming: sanitization, slot composition, and listing parsers.
//
// Slot:     backups/<sanitized-identity>/<sanitized-branch>
// Ref name: refs/backups/<sanitized-identity>/<sanitized-branch>
// Listing:  whitespace-separated `<hash> <ref>` lines (ls-remote output).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace segment shared by every backup slot.
pub const BACKUP_NAMESPACE: &str = "backups";

const REFS_PREFIX: &str = "refs/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefNameError {
    #[error("backup identity is empty")]
    EmptyIdentity,

    #[error("branch name is empty")]
    EmptyBranch,
}

/// Replace every character that is illegal in a backup ref segment.
///
/// `@` becomes `_at_`; space, `:`, `/`, `\`, `^`, `~`, `?`, `*` and `[`
/// become `_`. Everything else is kept verbatim, so the function is total
/// and idempotent.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '@' => out.push_str("_at_"),
            ' ' | ':' | '/' | '\\' | '^' | '~' | '?' | '*' | '[' => out.push('_'),
            other => out.push(other),
        }
    }
    out
}

/// Build the canonical slot string for an (identity, branch) pair.
pub fn compose(identity: &str, branch: &str) -> String {
    format!("{BACKUP_NAMESPACE}/{}/{}", sanitize(identity), sanitize(branch))
}

/// Listing pattern for one identity, narrowed to a branch when given.
pub fn pattern(identity: &str, branch: Option<&str>) -> String {
    let branch = branch.map(sanitize).unwrap_or_else(|| "*".to_string());
    format!("{REFS_PREFIX}{BACKUP_NAMESPACE}/{}/{branch}", sanitize(identity))
}

/// Listing pattern matching every backup slot in the remote.
pub fn all_pattern() -> String {
    format!("{REFS_PREFIX}{BACKUP_NAMESPACE}/*")
}

/// A deterministic backup slot for one (identity, branch) pair.
///
/// Both segments are stored sanitized. Pushing a new hash to the same
/// location overwrites the previous pointer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BackupLocation {
    identity: String,
    branch: String,
}

impl BackupLocation {
    pub fn new(identity: &str, branch: &str) -> Result<Self, RefNameError> {
        let identity = sanitize(identity.trim());
        let branch = sanitize(branch.trim());
        if identity.is_empty() {
            return Err(RefNameError::EmptyIdentity);
        }
        if branch.is_empty() {
            return Err(RefNameError::EmptyBranch);
        }
        Ok(Self { identity, branch })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// `backups/<identity>/<branch>`
    pub fn slot(&self) -> String {
        format!("{BACKUP_NAMESPACE}/{}/{}", self.identity, self.branch)
    }

    /// `refs/backups/<identity>/<branch>`
    pub fn ref_name(&self) -> String {
        format!("{REFS_PREFIX}{}", self.slot())
    }

    /// Refspec written by a push of `hash` into this slot.
    pub fn push_refspec(&self, hash: &str) -> String {
        format!("{hash}:{}", self.ref_name())
    }
}

impl fmt::Display for BackupLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ref_name())
    }
}

/// Inverse of [`compose`]. Accepts a slot or a full ref name.
///
/// Returns `None` unless the input is exactly
/// `[refs/]backups/<identity>/<branch>` with non-empty segments.
pub fn parse(ref_or_slot: &str) -> Option<BackupLocation> {
    let slot = ref_or_slot.strip_prefix(REFS_PREFIX).unwrap_or(ref_or_slot);
    let mut parts = slot.split('/');
    if parts.next()? != BACKUP_NAMESPACE {
        return None;
    }
    let identity = parts.next()?;
    let branch = parts.next()?;
    if parts.next().is_some() || identity.is_empty() || branch.is_empty() {
        return None;
    }
    Some(BackupLocation { identity: identity.to_string(), branch: branch.to_string() })
}

// ── Listing ─────────────────────────────────────────────────────────

/// One `{hash, ref}` pair reported by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRef {
    pub hash: String,
    pub ref_name: String,
}

impl BackupRef {
    /// First 12 characters of the hash, for display.
    pub fn short_hash(&self) -> &str {
        let end = self.hash.char_indices().nth(12).map(|(idx, _)| idx).unwrap_or(self.hash.len());
        &self.hash[..end]
    }

    pub fn location(&self) -> Option<BackupLocation> {
        parse(&self.ref_name)
    }
}

/// Parse a two-column listing response. Blank and malformed lines are skipped.
pub fn parse_listing(output: &str) -> Vec<BackupRef> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let hash = fields.next()?;
            let ref_name = fields.next()?;
            Some(BackupRef { hash: hash.to_string(), ref_name: ref_name.to_string() })
        })
        .collect()
}

/// Every identity that owns at least one slot, sorted and de-duplicated.
pub fn users_in(refs: &[BackupRef]) -> Vec<String> {
    refs.iter()
        .filter_map(BackupRef::location)
        .map(|location| location.identity)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Branches with a slot for `identity`, sorted and de-duplicated.
pub fn branches_in(refs: &[BackupRef], identity: &str) -> Vec<String> {
    let identity = sanitize(identity);
    refs.iter()
        .filter_map(BackupRef::location)
        .filter(|location| location.identity == identity)
        .map(|location| location.branch)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // ── sanitize ────────────────────────────────────────────────────

    #[test]
    fn sanitize_replaces_at_sign() {
        assert_eq!(sanitize("user@example.com"), "user_at_example.com");
    }

    #[test]
    fn sanitize_replaces_each_disallowed_character() {
        assert_eq!(sanitize("a b:c/d\\e^f~g?h*i[j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn sanitize_keeps_safe_input() {
        assert_eq!(sanitize("feature-x_1.2"), "feature-x_1.2");
    }

    #[test]
    fn sanitize_empty_is_empty() {
        assert_eq!(sanitize(""), "");
    }

    #[test]
    fn sanitize_branch_with_slashes() {
        assert_eq!(sanitize("feature/login/form"), "feature_login_form");
    }

    proptest! {
        #[test]
        fn sanitize_output_has_no_disallowed_characters(raw in ".*") {
            let safe = sanitize(&raw);
            for ch in ['@', ' ', ':', '/', '\\', '^', '~', '?', '*', '['] {
                prop_assert!(!safe.contains(ch), "{safe:?} still contains {ch:?}");
            }
        }

        #[test]
        fn sanitize_is_idempotent(raw in ".*") {
            let once = sanitize(&raw);
            prop_assert_eq!(sanitize(&once), once);
        }

        #[test]
        fn compose_then_parse_recovers_sanitized_segments(
            identity in "[a-zA-Z0-9@. _-]{1,20}",
            branch in "[a-zA-Z0-9/._-]{1,20}",
        ) {
            let slot = compose(&identity, &branch);
            let location = parse(&slot).expect("composed slot should parse");
            prop_assert_eq!(location.identity(), sanitize(&identity));
            prop_assert_eq!(location.branch(), sanitize(&branch));
        }
    }

    // ── compose / parse ─────────────────────────────────────────────

    #[test]
    fn compose_builds_slot() {
        assert_eq!(compose("jane@corp.io", "feature/x"), "backups/jane_at_corp.io/feature_x");
    }

    #[test]
    fn location_ref_name_and_refspec() {
        let location = BackupLocation::new("jane", "main").unwrap();
        assert_eq!(location.slot(), "backups/jane/main");
        assert_eq!(location.ref_name(), "refs/backups/jane/main");
        assert_eq!(location.push_refspec("abc123"), "abc123:refs/backups/jane/main");
        assert_eq!(location.to_string(), "refs/backups/jane/main");
    }

    #[test]
    fn location_rejects_empty_segments() {
        assert_eq!(BackupLocation::new("", "main"), Err(RefNameError::EmptyIdentity));
        assert_eq!(BackupLocation::new("jane", "  "), Err(RefNameError::EmptyBranch));
    }

    #[test]
    fn parse_accepts_slot_and_full_ref() {
        let from_slot = parse("backups/jane/main").unwrap();
        let from_ref = parse("refs/backups/jane/main").unwrap();
        assert_eq!(from_slot, from_ref);
        assert_eq!(from_slot.identity(), "jane");
        assert_eq!(from_slot.branch(), "main");
    }

    #[test]
    fn parse_rejects_foreign_and_malformed_refs() {
        assert!(parse("refs/heads/main").is_none());
        assert!(parse("refs/backups/jane").is_none());
        assert!(parse("refs/backups/jane/main/extra").is_none());
        assert!(parse("refs/backups//main").is_none());
    }

    #[test]
    fn pattern_with_and_without_branch() {
        assert_eq!(pattern("jane@corp.io", Some("dev/1")), "refs/backups/jane_at_corp.io/dev_1");
        assert_eq!(pattern("jane", None), "refs/backups/jane/*");
        assert_eq!(all_pattern(), "refs/backups/*");
    }

    // ── listing ─────────────────────────────────────────────────────

    #[test]
    fn parse_listing_reads_two_columns() {
        let output = "abc123\trefs/backups/jane/main\n\ndef456 refs/backups/bob/dev\nlonely\n";
        let refs = parse_listing(output);
        assert_eq!(
            refs,
            vec![
                BackupRef { hash: "abc123".into(), ref_name: "refs/backups/jane/main".into() },
                BackupRef { hash: "def456".into(), ref_name: "refs/backups/bob/dev".into() },
            ]
        );
    }

    #[test]
    fn parse_listing_of_empty_output_is_empty() {
        assert!(parse_listing("").is_empty());
        assert!(parse_listing("\n\n").is_empty());
    }

    #[test]
    fn short_hash_truncates_to_twelve() {
        let r = BackupRef { hash: "0123456789abcdef".into(), ref_name: String::new() };
        assert_eq!(r.short_hash(), "0123456789ab");
        let short = BackupRef { hash: "abc".into(), ref_name: String::new() };
        assert_eq!(short.short_hash(), "abc");
    }

    #[test]
    fn users_and_branches_are_sorted_and_unique() {
        let refs = parse_listing(
            "a refs/backups/zed/main\n\
             b refs/backups/amy/dev\n\
             c refs/backups/amy/main\n\
             d refs/backups/amy/dev\n\
             e refs/heads/main\n",
        );
        assert_eq!(users_in(&refs), vec!["amy".to_string(), "zed".to_string()]);
        assert_eq!(branches_in(&refs, "amy"), vec!["dev".to_string(), "main".to_string()]);
        assert!(branches_in(&refs, "nobody").is_empty());
    }

    #[test]
    fn branches_in_sanitizes_requested_identity() {
        let refs = parse_listing("a refs/backups/jane_at_corp.io/main\n");
        assert_eq!(branches_in(&refs, "jane@corp.io"), vec!["main".to_string()]);
    }
}
