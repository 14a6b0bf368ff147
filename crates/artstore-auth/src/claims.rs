//! Raw token claims, the dual scope representation, and role resolution.

use artstore_model::{AuthClaims, Role, SubjectType, effective_role};
use serde::Deserialize;

use crate::error::{AuthError, AuthResult};

/// `realm_access` object carried by the identity provider's tokens.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealmAccess {
    /// Realm role names.
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Claims as decoded straight from a validated token.
#[derive(Debug, Clone, Deserialize)]
pub struct RawClaims {
    /// Token subject.
    pub sub: Option<String>,
    /// Preferred username.
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Email address.
    #[serde(default)]
    pub email: Option<String>,
    /// Group memberships.
    #[serde(default)]
    pub groups: Vec<String>,
    /// Realm roles.
    #[serde(default)]
    pub realm_access: RealmAccess,
    /// Space-separated scope string.
    #[serde(default)]
    pub scope: Option<String>,
    /// Scope array; producers should emit this form.
    #[serde(default)]
    pub scopes: Option<Vec<String>>,
    /// OAuth client id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Authorized party, used as a client-id fallback.
    #[serde(default)]
    pub azp: Option<String>,
    /// Expiry timestamp; presence is enforced by the validator.
    #[serde(default)]
    pub exp: i64,
}

/// Union of the token's `scope` string and `scopes` array, deduplicated in
/// first-seen order.
#[must_use]
pub fn scopes_union(raw: &RawClaims) -> Vec<String> {
    let mut union: Vec<String> = Vec::new();
    let mut push = |scope: &str| {
        if !scope.is_empty() && !union.iter().any(|held| held == scope) {
            union.push(scope.to_string());
        }
    };
    if let Some(joined) = &raw.scope {
        for scope in joined.split_whitespace() {
            push(scope);
        }
    }
    if let Some(listed) = &raw.scopes {
        for scope in listed {
            push(scope);
        }
    }
    union
}

/// Maps identity-provider groups and realm roles onto the local role
/// vocabulary.
#[derive(Debug, Clone)]
pub struct RoleResolver {
    admin_groups: Vec<String>,
    readonly_groups: Vec<String>,
}

impl RoleResolver {
    /// Create a resolver over the configured group lists.
    #[must_use]
    pub const fn new(admin_groups: Vec<String>, readonly_groups: Vec<String>) -> Self {
        Self {
            admin_groups,
            readonly_groups,
        }
    }

    /// Resolve the identity-provider role: admin groups first, then
    /// readonly groups, then the highest-ranked recognizable realm role.
    #[must_use]
    pub fn idp_role(&self, groups: &[String], realm_roles: &[String]) -> Option<Role> {
        if Self::member_of(groups, &self.admin_groups) {
            return Some(Role::Admin);
        }
        if Self::member_of(groups, &self.readonly_groups) {
            return Some(Role::Readonly);
        }
        realm_roles
            .iter()
            .filter_map(|role| role.parse::<Role>().ok())
            .max()
    }

    fn member_of(held: &[String], configured: &[String]) -> bool {
        held.iter().any(|group| {
            // Keycloak reports group paths; accept both `name` and `/name`.
            let normalized = group.strip_prefix('/').unwrap_or(group);
            configured.iter().any(|wanted| wanted == normalized)
        })
    }
}

/// Assemble request-scoped claims from validated raw claims.
///
/// A token carrying both a client id and a non-empty scope set classifies as
/// a service account: it never consults the override and never carries an
/// effective role. Users fold the override in under the monotone-upgrade
/// rule.
///
/// # Errors
///
/// Returns an error when the token lacks a subject.
pub fn build_claims(
    raw: &RawClaims,
    resolver: &RoleResolver,
    role_override: Option<Role>,
) -> AuthResult<AuthClaims> {
    let subject = raw
        .sub
        .clone()
        .ok_or(AuthError::InvalidToken {
            reason: "missing_sub",
        })?;
    let client_id = raw.client_id.clone().or_else(|| raw.azp.clone());
    let scopes = scopes_union(raw);

    let is_service_account = client_id.is_some() && !scopes.is_empty();
    if is_service_account {
        return Ok(AuthClaims {
            subject,
            subject_type: SubjectType::ServiceAccount,
            preferred_username: raw.preferred_username.clone(),
            email: raw.email.clone(),
            roles: raw.realm_access.roles.clone(),
            groups: raw.groups.clone(),
            idp_role: None,
            role_override: None,
            effective_role: None,
            scopes,
            client_id,
        });
    }

    let idp_role = resolver.idp_role(&raw.groups, &raw.realm_access.roles);
    Ok(AuthClaims {
        subject,
        subject_type: SubjectType::User,
        preferred_username: raw.preferred_username.clone(),
        email: raw.email.clone(),
        roles: raw.realm_access.roles.clone(),
        groups: raw.groups.clone(),
        idp_role,
        role_override,
        effective_role: effective_role(idp_role, role_override),
        scopes,
        client_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(groups: &[&str], realm_roles: &[&str]) -> RawClaims {
        RawClaims {
            sub: Some("user-1".to_string()),
            preferred_username: Some("alice".to_string()),
            email: None,
            groups: groups.iter().map(ToString::to_string).collect(),
            realm_access: RealmAccess {
                roles: realm_roles.iter().map(ToString::to_string).collect(),
            },
            scope: None,
            scopes: None,
            client_id: None,
            azp: None,
            exp: 0,
        }
    }

    fn resolver() -> RoleResolver {
        RoleResolver::new(
            vec!["artstore-admins".to_string()],
            vec!["artstore-viewers".to_string()],
        )
    }

    #[test]
    fn admin_group_wins_over_readonly_group() {
        let role = resolver().idp_role(
            &["artstore-viewers".to_string(), "artstore-admins".to_string()],
            &[],
        );
        assert_eq!(role, Some(Role::Admin));
    }

    #[test]
    fn group_paths_with_leading_slash_match() {
        let role = resolver().idp_role(&["/artstore-viewers".to_string()], &[]);
        assert_eq!(role, Some(Role::Readonly));
    }

    #[test]
    fn realm_roles_fill_in_when_groups_say_nothing() {
        let role = resolver().idp_role(
            &["unrelated".to_string()],
            &["offline_access".to_string(), "readonly".to_string()],
        );
        assert_eq!(role, Some(Role::Readonly));

        let role = resolver().idp_role(
            &[],
            &["readonly".to_string(), "admin".to_string()],
        );
        assert_eq!(role, Some(Role::Admin));
    }

    #[test]
    fn no_match_yields_no_role() {
        assert_eq!(resolver().idp_role(&[], &["uma_protection".to_string()]), None);
    }

    #[test]
    fn scope_string_and_array_union() {
        let mut claims = raw(&[], &[]);
        claims.scope = Some("files:read files:write".to_string());
        claims.scopes = Some(vec!["files:write".to_string(), "admin:sync".to_string()]);
        assert_eq!(
            scopes_union(&claims),
            vec!["files:read", "files:write", "admin:sync"]
        );
    }

    #[test]
    fn client_id_with_scopes_classifies_as_service_account() {
        let mut sa = raw(&["artstore-admins"], &[]);
        sa.client_id = Some("sa_backup_0a1b2c3d".to_string());
        sa.scope = Some("files:read".to_string());
        let claims = build_claims(&sa, &resolver(), Some(Role::Admin)).expect("claims");
        assert_eq!(claims.subject_type, SubjectType::ServiceAccount);
        assert_eq!(claims.effective_role, None);
        assert_eq!(claims.role_override, None);
        assert!(claims.has_any_scope(&["files:read"]));
    }

    #[test]
    fn client_id_without_scopes_is_still_a_user() {
        let mut user = raw(&["artstore-viewers"], &[]);
        user.azp = Some("artstore-ui".to_string());
        let claims = build_claims(&user, &resolver(), None).expect("claims");
        assert_eq!(claims.subject_type, SubjectType::User);
        assert_eq!(claims.effective_role, Some(Role::Readonly));
    }

    #[test]
    fn override_upgrades_but_never_demotes() {
        let viewer = raw(&["artstore-viewers"], &[]);
        let upgraded =
            build_claims(&viewer, &resolver(), Some(Role::Admin)).expect("claims");
        assert_eq!(upgraded.effective_role, Some(Role::Admin));

        let admin = raw(&["artstore-admins"], &[]);
        let unchanged =
            build_claims(&admin, &resolver(), Some(Role::Readonly)).expect("claims");
        assert_eq!(unchanged.effective_role, Some(Role::Admin));
    }

    #[test]
    fn missing_subject_is_rejected() {
        let mut claims = raw(&[], &[]);
        claims.sub = None;
        assert!(build_claims(&claims, &resolver(), None).is_err());
    }
}
