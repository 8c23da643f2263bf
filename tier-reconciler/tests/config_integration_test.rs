//! Integration tests for configuration loading and the HTTP client built from it.

use tier_reconciler::{
    ErrorKind, HttpUpgradeApi, NavigationContext, ReconcileError, ReconcilerConfig,
    account::Tier,
    token::resolve_token,
};

#[test]
fn test_full_configuration_flow() {
    let toml = r#"
        base_url = "https://billing.example.com/app"
        target_tier = "elite"
        home_path = "/dashboard"
        redirect_delay_ms = 1500

        [endpoints]
        complete_upgrade = "/v2/upgrades/complete"
        subscription_status = "/v2/subscription"
        current_user = "/v2/me"

        [token]
        primary = "cs"
        aliases = ["checkoutSession", "stripe_session"]

        [http]
        timeout_secs = 15
        connect_timeout_secs = 5
    "#;

    let config = ReconcilerConfig::from_toml(toml).expect("should parse valid TOML");

    assert_eq!(config.target_tier, Tier::Elite);
    assert_eq!(config.home_path, "/dashboard");
    assert_eq!(config.redirect_delay().as_millis(), 1500);
    assert_eq!(config.http.timeout().as_secs(), 15);

    // Endpoint paths replace the base URL's path.
    let api = HttpUpgradeApi::new(&config).expect("client should build");
    assert_eq!(
        api.endpoint_url(&config.endpoints.complete_upgrade).as_str(),
        "https://billing.example.com/v2/upgrades/complete"
    );
    assert_eq!(
        api.endpoint_url(&config.endpoints.current_user).as_str(),
        "https://billing.example.com/v2/me"
    );

    // Custom token parameter names drive resolution.
    let url = "https://billing.example.com/done?stripe_session=cs_live_1";
    let ctx = NavigationContext::from_url(url).unwrap();
    let token = resolve_token(&ctx, &config.token).expect("alias should resolve");
    assert_eq!(token.as_str(), "cs_live_1");
}

#[test]
fn test_minimal_configuration_uses_defaults() {
    let config = ReconcilerConfig::from_toml(r#"base_url = "https://app.example.com""#).unwrap();

    assert_eq!(config.target_tier, Tier::Pro);
    assert_eq!(config.home_path, "/");
    assert_eq!(config.redirect_delay().as_millis(), 3000);
    assert_eq!(config.endpoints.complete_upgrade, "/api/complete-upgrade");
    assert_eq!(config.endpoints.subscription_status, "/api/subscription-status");
    assert_eq!(config.endpoints.current_user, "/api/user");
    assert_eq!(config.token.primary, "session_id");
}

#[test]
fn test_configuration_rejections() {
    let cases = [
        r#"base_url = "http://app.example.com""#,
        r#"base_url = "https://localhost""#,
        r#"base_url = "https://127.0.0.1:8443""#,
        "base_url = \"https://app.example.com\"\ntarget_tier = \"free\"",
        "base_url = \"https://app.example.com\"\nhome_path = \"dashboard\"",
        "base_url = \"https://app.example.com\"\nredirect_delay_ms = 600000",
        "base_url = \"https://app.example.com\"\n[endpoints]\ncurrent_user = \"/api/../admin\"",
        "base_url = \"https://app.example.com\"\n[http]\ntimeout_secs = 0",
        "target_tier = \"pro\"",
    ];

    for toml in cases {
        let err = ReconcilerConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidConfig(_)), "{toml}: {err:?}");
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}

#[test]
fn test_from_file_reports_missing_file() {
    let err = ReconcilerConfig::from_file("/nonexistent/tier-reconciler.toml").unwrap_err();
    assert!(err.to_string().contains("tier-reconciler.toml"));
}
