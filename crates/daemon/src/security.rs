// Owner-only file helpers and credential display/encoding.
//
// The global config holds a git access token, so it and its directory are
// kept at 0600 / 0700 on unix.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub fn ensure_owner_only_file(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o600 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

pub fn ensure_owner_only_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if !path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(path)
            .with_context(|| format!("failed to read metadata for `{}`", path.display()))?;
        let mode = metadata.permissions().mode() & 0o777;
        if mode != 0o700 {
            fs::set_permissions(path, fs::Permissions::from_mode(0o700))
                .with_context(|| format!("failed to set owner-only mode on `{}`", path.display()))?;
        }
    }

    #[cfg(not(unix))]
    {
        let _ = path;
    }

    Ok(())
}

/// Mask a token for display: first and last four characters survive,
/// tokens of eight characters or fewer are fully masked.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }

    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}{}{suffix}", "*".repeat(chars.len() - 8))
}

/// `Authorization` header value for HTTP basic auth with a personal access token.
///
/// Hosts that authenticate by token alone accept any username, so a blank
/// user falls back to `x-access-token`.
pub fn basic_auth_header(user: &str, token: &str) -> String {
    let user = if user.trim().is_empty() { "x-access-token" } else { user.trim() };
    let encoded = STANDARD.encode(format!("{user}:{token}"));
    format!("Authorization: Basic {encoded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mask_token_keeps_edges() {
        assert_eq!(mask_token("ghp_1234567890abcd"), "ghp_**********abcd");
    }

    #[test]
    fn mask_token_hides_short_tokens_entirely() {
        assert_eq!(mask_token("12345678"), "********");
        assert_eq!(mask_token(""), "");
    }

    #[test]
    fn basic_auth_header_encodes_user_and_token() {
        // base64("jane:secret")
        assert_eq!(basic_auth_header("jane", "secret"), "Authorization: Basic amFuZTpzZWNyZXQ=");
    }

    #[test]
    fn basic_auth_header_defaults_blank_user() {
        let header = basic_auth_header("  ", "tok");
        let encoded = header.trim_start_matches("Authorization: Basic ");
        let decoded = STANDARD.decode(encoded).expect("header should be valid base64");
        assert_eq!(decoded, b"x-access-token:tok");
    }

    #[test]
    fn helpers_ignore_missing_paths() {
        let tmp = tempdir().expect("tempdir should be created");
        ensure_owner_only_file(&tmp.path().join("missing")).expect("missing file is a no-op");
        ensure_owner_only_dir(&tmp.path().join("missing-dir")).expect("missing dir is a no-op");
    }

    #[cfg(unix)]
    #[test]
    fn owner_only_helpers_apply_expected_modes() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempdir().expect("tempdir should be created");
        let dir_path = tmp.path().join("private-dir");
        let file_path = dir_path.join("config.toml");

        fs::create_dir_all(&dir_path).expect("directory should be created");
        fs::write(&file_path, b"git_token = \"x\"").expect("file should be created");

        fs::set_permissions(&dir_path, fs::Permissions::from_mode(0o755))
            .expect("directory permissions should be set");
        fs::set_permissions(&file_path, fs::Permissions::from_mode(0o644))
            .expect("file permissions should be set");

        ensure_owner_only_dir(&dir_path).expect("directory mode should be tightened");
        ensure_owner_only_file(&file_path).expect("file mode should be tightened");

        let dir_mode =
            fs::metadata(&dir_path).expect("directory metadata should load").permissions().mode()
                & 0o777;
        let file_mode =
            fs::metadata(&file_path).expect("file metadata should load").permissions().mode()
                & 0o777;
        assert_eq!(dir_mode, 0o700);
        assert_eq!(file_mode, 0o600);
    }
}
