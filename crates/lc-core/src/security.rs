// ============== Authorization ==============

/// Whether any of the caller's role names is an admin role. An empty allow
/// list authorizes nobody.
pub fn is_authorized(roles: &[String], allowed_roles: &[String]) -> bool {
    if allowed_roles.is_empty() {
        return false;
    }
    roles
        .iter()
        .any(|role| allowed_roles.iter().any(|allowed| allowed.eq_ignore_ascii_case(role)))
}
