use domain::TenantContext;
use sentinel_auth::{AuthError, Authenticator, JwtManager};

#[test]
fn jwt_issue_and_decode() {
    let jwt = JwtManager::new("secret".to_string(), 3600);
    let ctx = TenantContext::new("tenant-1", "user-1", vec!["operator".to_string()]);

    let token = jwt.issue_access(&ctx).expect("token");
    let decoded = jwt.verify_access_token(&token).expect("access");

    assert_eq!(decoded.tenant_id, "tenant-1");
    assert_eq!(decoded.user_id, "user-1");
    assert!(decoded.has_role("operator"));
    assert!(!decoded.has_role("admin"));
}

#[test]
fn wrong_secret_is_invalid() {
    let issuer = JwtManager::new("secret-a".to_string(), 3600);
    let verifier = JwtManager::new("secret-b".to_string(), 3600);
    let ctx = TenantContext::new("tenant-1", "user-1", vec!["viewer".to_string()]);
    let token = issuer.issue_access(&ctx).expect("token");

    let err = verifier.decode_access(&token).expect_err("invalid");
    assert!(matches!(err, AuthError::TokenInvalid));
}

#[test]
fn garbage_token_is_invalid() {
    let jwt = JwtManager::new("secret".to_string(), 3600);
    assert!(matches!(
        jwt.decode_access("not-a-token"),
        Err(AuthError::TokenInvalid)
    ));
}

#[test]
fn empty_tenant_is_rejected() {
    let jwt = JwtManager::new("secret".to_string(), 3600);
    let ctx = TenantContext::new("", "user-1", vec!["admin".to_string()]);
    let token = jwt.issue_access(&ctx).expect("token");
    assert!(matches!(
        jwt.decode_access(&token),
        Err(AuthError::TokenInvalid)
    ));
}
