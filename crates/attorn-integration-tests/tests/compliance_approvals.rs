//! Integration tests for compliance checks on authorized actions.
//!
//! Restrictions travel inside the access token, so every check here runs
//! against what the principal granted, after the policy permits.

use std::collections::BTreeMap;
use std::sync::Arc;

use attorn_compliance::{
    ActionRequest, Approval, ApprovalLevel, ComplianceError, JurisdictionRegistry,
    JurisdictionRules, MemoryComplianceSink,
};
use attorn_core::{Restrictions, ValueLimits};
use attorn_engine::{AuthorizeRequest, Engine, EngineError};
use attorn_test::prelude::*;
use chrono::{Duration, Utc};

fn limits() -> Restrictions {
    Restrictions {
        value_limits: Some(ValueLimits {
            max_transaction_value: 1_000.0,
            daily_limit: 1_500.0,
            currency: "USD".into(),
        }),
        geographic_constraints: vec!["US".into(), "CA".into()],
        time_constraints: None,
        custom_limits: BTreeMap::from([("leverage".to_string(), 2.0)]),
    }
}

fn engine(sink: &Arc<MemoryComplianceSink>) -> Engine {
    let rules = JurisdictionRules::new("US")
        .approval("wire", ApprovalLevel::Multi)
        .value_limit("wire", 900.0)
        .duty("loyalty")
        .approval_duration(Duration::hours(1));
    test_engine_builder()
        .with_jurisdictions(JurisdictionRegistry::new().with(rules))
        .with_compliance_sink(sink.clone())
        .build()
        .unwrap()
}

fn pay(token: &str, amount: f64) -> AuthorizeRequest {
    AuthorizeRequest::new(token, "accounts/main", "pay").with_action(
        ActionRequest::new("pay")
            .by(TEST_DELEGATE, "agent")
            .amount(amount, "USD")
            .region("US"),
    )
}

fn violation(err: EngineError) -> ComplianceError {
    match err {
        EngineError::Compliance(e) => e,
        other => panic!("expected compliance violation, got {other}"),
    }
}

#[tokio::test]
async fn test_value_limits_and_daily_ledger() {
    let sink = Arc::new(MemoryComplianceSink::new());
    let engine = engine(&sink);
    let grant = engine
        .grant(test_grant_request().with_restrictions(limits()))
        .await
        .unwrap();
    let token = &grant.access.value;

    let err = engine.authorize(&pay(token, 1_200.0)).await.unwrap_err();
    assert!(matches!(violation(err), ComplianceError::TransactionLimit { .. }));

    engine.authorize(&pay(token, 800.0)).await.unwrap();
    let err = engine.authorize(&pay(token, 800.0)).await.unwrap_err();
    assert!(matches!(violation(err), ComplianceError::DailyLimit { .. }));
    // A refused spend is not recorded.
    engine.authorize(&pay(token, 700.0)).await.unwrap();

    let stats = sink.stats_for(grant.access.id.as_str());
    assert_eq!(stats.total, 4);
    assert_eq!(stats.violations, 2);
    assert_eq!(stats.by_type.get("value_limit"), Some(&2));
}

#[tokio::test]
async fn test_region_currency_and_custom_limits() {
    let sink = Arc::new(MemoryComplianceSink::new());
    let engine = engine(&sink);
    let grant = engine
        .grant(test_grant_request().with_restrictions(limits()))
        .await
        .unwrap();
    let token = &grant.access.value;

    let abroad = AuthorizeRequest::new(token, "accounts/main", "pay")
        .with_action(ActionRequest::new("pay").amount(10.0, "USD").region("FR"));
    let err = engine.authorize(&abroad).await.unwrap_err();
    assert_eq!(err.code(), "geographic");

    let euros = AuthorizeRequest::new(token, "accounts/main", "pay")
        .with_action(ActionRequest::new("pay").amount(10.0, "EUR").region("us"));
    assert!(matches!(
        violation(engine.authorize(&euros).await.unwrap_err()),
        ComplianceError::CurrencyMismatch { .. }
    ));

    let leveraged = AuthorizeRequest::new(token, "accounts/main", "trade")
        .with_action(ActionRequest::new("trade").region("CA").metric("leverage", 3.0));
    assert_eq!(
        engine.authorize(&leveraged).await.unwrap_err().code(),
        "custom_limit"
    );
}

#[tokio::test]
async fn test_jurisdiction_approvals() {
    let sink = Arc::new(MemoryComplianceSink::new());
    let engine = engine(&sink);
    let grant = engine
        .grant(test_grant_request().with_jurisdiction("US"))
        .await
        .unwrap();
    let token = &grant.access.value;
    let now = Utc::now();

    let wire = |approvals: Vec<Approval>| {
        let mut action = ActionRequest::new("wire")
            .by(TEST_DELEGATE, "agent")
            .amount(500.0, "USD")
            .acknowledge("loyalty");
        for approval in approvals {
            action = action.approval(approval);
        }
        AuthorizeRequest::new(token, "accounts/main", "wire").with_action(action)
    };

    // Self-approval, a repeated role and a stale approval do not count.
    let weak = wire(vec![
        Approval::new(TEST_DELEGATE, "cfo", now),
        Approval::new("carol", "agent", now),
        Approval::new("dave", "controller", now - Duration::hours(2)),
        Approval::new("erin", "cfo", now),
    ]);
    match violation(engine.authorize(&weak).await.unwrap_err()) {
        ComplianceError::ApprovalMissing { required, valid } => {
            assert_eq!(required, ApprovalLevel::Multi);
            assert_eq!(valid, 1);
        },
        other => panic!("expected missing approval, got {other}"),
    }

    let strong = wire(vec![
        Approval::new("erin", "cfo", now),
        Approval::new("frank", "controller", now),
    ]);
    engine.authorize(&strong).await.unwrap();

    let unacknowledged = AuthorizeRequest::new(token, "accounts/main", "wire").with_action(
        ActionRequest::new("wire")
            .by(TEST_DELEGATE, "agent")
            .approval(Approval::new("erin", "cfo", now))
            .approval(Approval::new("frank", "controller", now)),
    );
    assert!(matches!(
        violation(engine.authorize(&unacknowledged).await.unwrap_err()),
        ComplianceError::FiduciaryDuties { .. }
    ));
}

#[tokio::test]
async fn test_jurisdiction_value_limit_and_unknown_country() {
    let sink = Arc::new(MemoryComplianceSink::new());
    let engine = engine(&sink);
    let us = engine
        .grant(test_grant_request().with_jurisdiction("US"))
        .await
        .unwrap();

    let large = AuthorizeRequest::new(&us.access.value, "accounts/main", "wire").with_action(
        ActionRequest::new("wire")
            .by(TEST_DELEGATE, "agent")
            .amount(950.0, "USD")
            .approval(Approval::new("erin", "cfo", Utc::now()))
            .approval(Approval::new("frank", "controller", Utc::now()))
            .acknowledge("loyalty"),
    );
    assert!(matches!(
        violation(engine.authorize(&large).await.unwrap_err()),
        ComplianceError::JurisdictionValueLimit { .. }
    ));

    let elsewhere = engine
        .grant(test_grant_request().with_jurisdiction("ZZ"))
        .await
        .unwrap();
    let err = engine
        .authorize(&AuthorizeRequest::new(&elsewhere.access.value, "accounts/main", "pay"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "jurisdiction");

    let events = sink.events();
    assert!(events.iter().all(|e| !e.compliant));
    assert!(events.iter().all(|e| e.violation_type.is_some()));
}
