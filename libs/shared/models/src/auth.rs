use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub aud: Option<String>,
}

/// Authenticated caller, resolved from the JWT by the auth middleware.
/// `id` doubles as the patient id or dentist id of the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }

    /// Staff and admin accounts act on any appointment; everyone else is
    /// restricted to records they own.
    pub fn is_staff(&self) -> bool {
        matches!(self.role.as_deref(), Some("staff") | Some("admin"))
    }
}
