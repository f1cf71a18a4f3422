//! Process and admin-session security helpers shared by the vidshelf
//! binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

pub const SESSION_COOKIE: &str = "vidshelf_admin";
pub const SESSION_MAX_AGE_SECS: u32 = 7 * 24 * 60 * 60;
const SESSION_CONTEXT: &str = "vidshelf 2025 admin session cookie v1";

/// Fails fast when a binary is started as root.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Admin login material read from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminCredentials {
    pub user: String,
    pub password: String,
    pub token: String,
}

/// Compares through BLAKE3 digests, whose equality check is constant time.
fn same_secret(given: &str, expected: &str) -> bool {
    blake3::hash(given.as_bytes()) == blake3::hash(expected.as_bytes())
}

impl AdminCredentials {
    /// Login stays disabled until both a password and a token are set.
    pub fn is_configured(&self) -> bool {
        !self.password.is_empty() && !self.token.is_empty()
    }

    /// First login step: user name and password only.
    pub fn check_password(&self, user: &str, password: &str) -> bool {
        self.is_configured() && same_secret(user, &self.user) && same_secret(password, &self.password)
    }

    pub fn check_login(&self, user: &str, password: &str, token: &str) -> bool {
        self.check_password(user, password) && same_secret(token, &self.token)
    }

    /// Cookie value proving a successful login. Derived from the credentials,
    /// so changing any of them signs every session out.
    pub fn session_value(&self) -> String {
        let key = blake3::derive_key(SESSION_CONTEXT, self.token.as_bytes());
        let mut material = Vec::with_capacity(self.user.len() + self.password.len() + 1);
        material.extend_from_slice(self.user.as_bytes());
        material.push(0);
        material.extend_from_slice(self.password.as_bytes());
        blake3::keyed_hash(&key, &material).to_hex().to_string()
    }

    pub fn verify_session(&self, cookie_value: &str) -> bool {
        self.is_configured() && same_secret(cookie_value, &self.session_value())
    }
}

/// `Set-Cookie` value that starts an admin session.
pub fn session_cookie(value: &str, secure: bool) -> String {
    let secure = if secure { " Secure;" } else { "" };
    format!(
        "{SESSION_COOKIE}={value}; HttpOnly;{secure} SameSite=Lax; Path=/; Max-Age={SESSION_MAX_AGE_SECS}"
    )
}

/// `Set-Cookie` value that ends the admin session.
pub fn clear_session_cookie(secure: bool) -> String {
    let secure = if secure { " Secure;" } else { "" };
    format!("{SESSION_COOKIE}=; HttpOnly;{secure} SameSite=Lax; Path=/; Max-Age=0")
}
