//! Authentication and authorization.
//!
//! Clients log in with username and password at `/api/users/login/` and receive a JWT
//! access/refresh pair. Requests carry the access token in `Authorization: Bearer <token>`.
//! Access control is role-based on the account's `user_type`.
//!
//! - [`current_user`]: extractor resolving the bearer token to an active account
//! - [`password`]: Argon2 hashing and random password/OTP generation
//! - [`permissions`]: permission classes and the `RequiresPermission` extractor
//! - [`session`]: JWT issuance and verification

pub mod current_user;
pub mod password;
pub mod permissions;
pub mod session;

/// Lowercase the domain part of an email address, leaving the local part untouched.
pub fn normalize_email(email: &str) -> String {
    let email = email.trim();
    match email.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::normalize_email;

    #[test]
    fn normalize_email_lowercases_domain_only() {
        assert_eq!(normalize_email("Alice@Example.COM"), "Alice@example.com");
        assert_eq!(normalize_email("  bob@host.io "), "bob@host.io");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }
}
