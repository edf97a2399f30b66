#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::too_many_lines)]

use common::{Behavior, Harness, StubChannelType, channel, template, vars};
use courier_server::adapters::memory::InMemoryChannelRepository;
use courier_server::domain::{
    ChannelConfig, ChannelId, ChannelOverride, ErrorCode, MessageStatus, Recipient, RecipientType, TemplateId,
    Variables,
};
use courier_server::services::DispatchError;
use courier_server::storage::{ChannelRepository, MessageRepository};
use courier_server::transport::{SendContext, TransportError};
use std::collections::BTreeMap;
use std::sync::Arc;

mod common;

fn ids(raw: &[&str]) -> Vec<ChannelId> {
    raw.iter().map(|id| ChannelId::from(*id)).collect()
}

#[tokio::test]
async fn test_single_channel_with_template() {
    let (email, log) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_template(template("t1", "email", "Hi {n}", "Hello {n}")).await;
    h.add_channel(channel("c1", "email", "u@x").with_template(TemplateId::from("t1"))).await;

    let message = h.send(&["c1"], vars(&[("n", "Ada")])).await;

    assert_eq!(message.status(), MessageStatus::Success);
    assert_eq!(message.results().len(), 1);
    let result = &message.results()[0];
    assert!(result.is_success());
    assert_eq!(result.channel_id, ChannelId::from("c1"));
    assert!(result.sent_at.unwrap() >= message.created_at);

    let deliveries = log.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].content.subject, "Hi Ada");
    assert_eq!(deliveries[0].content.body, "Hello Ada");
    assert_eq!(deliveries[0].recipients, vec!["u@x".to_string()]);
}

#[tokio::test]
async fn test_missing_variable_fails_channel() {
    let (email, log) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_template(template("t1", "email", "Hi {n}", "Hello {n}")).await;
    h.add_channel(channel("c1", "email", "u@x").with_template(TemplateId::from("t1"))).await;

    let message = h.send(&["c1"], Variables::new()).await;

    assert_eq!(message.status(), MessageStatus::Failed);
    let result = &message.results()[0];
    assert_eq!(result.error_code(), Some(ErrorCode::MissingVariables));
    assert!(result.error.as_ref().unwrap().details.contains('n'));
    assert!(log.deliveries().is_empty());
}

#[tokio::test]
async fn test_mixed_outcome_is_partial_success() {
    let (email, _) = StubChannelType::new("email", Behavior::Succeed);
    let (slack, _) =
        StubChannelType::new("slack", Behavior::Fail(TransportError::permanent("http_403", "webhook 403")));
    let h = Harness::new(vec![email, slack]);
    h.add_channel(channel("c1", "email", "u@x")).await;
    h.add_channel(channel("c2", "slack", "#ops")).await;

    let message = h.send(&["c1", "c2"], Variables::new()).await;

    assert_eq!(message.status(), MessageStatus::PartialSuccess);
    let results = message.results();
    assert_eq!(results[0].channel_id, ChannelId::from("c1"));
    assert!(results[0].is_success());
    assert_eq!(results[1].channel_id, ChannelId::from("c2"));
    assert_eq!(results[1].error_code(), Some(ErrorCode::SendError));
    assert_eq!(results[1].error.as_ref().unwrap().details, "webhook 403");
}

#[tokio::test]
async fn test_template_type_mismatch() {
    let (sms, log) = StubChannelType::new("sms", Behavior::Succeed);
    let (email, _) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![sms, email]);
    h.add_template(template("t1", "email", "Hi", "Hello")).await;
    h.add_channel(channel("c1", "sms", "+15550001111").with_template(TemplateId::from("t1"))).await;

    let message = h.send(&["c1"], Variables::new()).await;

    assert_eq!(message.status(), MessageStatus::Failed);
    assert_eq!(message.results()[0].error_code(), Some(ErrorCode::TypeMismatch));
    assert_eq!(log.attempts(), 0);
}

#[tokio::test]
async fn test_override_subject_and_recipients() {
    let (email, log) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_template(template("t1", "email", "Hi {n}", "Hello {n}")).await;
    h.add_channel(channel("c1", "email", "a@x").with_template(TemplateId::from("t1"))).await;

    let overrides = BTreeMap::from([(
        ChannelId::from("c1"),
        ChannelOverride {
            recipients: Some(vec![Recipient::new("b", RecipientType::To, "b@x")]),
            subject: Some("X".into()),
            ..ChannelOverride::default()
        },
    )]);
    let message = h
        .service
        .send_message(&SendContext::default(), ids(&["c1"]), vars(&[("n", "Ada")]), overrides)
        .await
        .unwrap();

    assert_eq!(message.status(), MessageStatus::Success);
    let delivery = &log.deliveries()[0];
    assert_eq!(delivery.recipients, vec!["b@x".to_string()]);
    assert_eq!(delivery.content.subject, "X");
    assert_eq!(delivery.content.body, "Hello Ada");

    // The stored channel keeps its own recipients.
    let stored = h.channels.find_by_id(&ChannelId::from("c1")).await.unwrap();
    assert_eq!(stored.recipients[0].target, "a@x");
}

#[tokio::test]
async fn test_duplicate_ids_yield_one_result() {
    let (email, log) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_channel(channel("c1", "email", "u@x")).await;

    let message = h.send(&["c1", "c1"], Variables::new()).await;

    assert_eq!(message.channel_ids(), ids(&["c1"]).as_slice());
    assert_eq!(message.results().len(), 1);
    assert_eq!(message.status(), MessageStatus::Success);
    assert_eq!(log.deliveries().len(), 1);
}

#[tokio::test]
async fn test_empty_channel_list_is_invalid_request() {
    let (email, _) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);

    let err = h
        .service
        .send_message(&SendContext::default(), Vec::new(), Variables::new(), BTreeMap::new())
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidRequest(_)));
    assert!(h.messages.is_empty());
}

#[tokio::test]
async fn test_channel_level_failure_codes() {
    let (email, log) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);

    let mut deleted = channel("deleted", "email", "u@x");
    deleted.soft_delete(2_000);
    h.add_channel(deleted).await;
    h.add_channel(channel("disabled", "email", "u@x").disabled()).await;
    h.add_channel(channel("lonely", "email", "u@x").with_recipients(Vec::new())).await;
    h.add_channel(channel("fax", "fax", "u@x")).await;
    h.add_channel(channel("broken", "email", "u@x").with_config(ChannelConfig::new().with("broken", true))).await;
    h.add_channel(channel("orphan", "email", "u@x").with_template(TemplateId::from("nope"))).await;

    let message =
        h.send(&["missing", "deleted", "disabled", "lonely", "fax", "broken", "orphan"], Variables::new()).await;

    let codes: Vec<_> = message.results().iter().map(|r| r.error_code().unwrap()).collect();
    assert_eq!(
        codes,
        vec![
            ErrorCode::ChannelNotFound,
            ErrorCode::ChannelNotFound,
            ErrorCode::ChannelDisabled,
            ErrorCode::NoRecipients,
            ErrorCode::UnknownChannelType,
            ErrorCode::InvalidConfig,
            ErrorCode::TemplateNotFound,
        ]
    );
    assert_eq!(message.status(), MessageStatus::Failed);
    assert_eq!(log.attempts(), 0);
}

#[tokio::test]
async fn test_empty_override_recipients_is_no_recipients() {
    let (email, _) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_channel(channel("c1", "email", "u@x")).await;

    let overrides = BTreeMap::from([(
        ChannelId::from("c1"),
        ChannelOverride { recipients: Some(Vec::new()), ..ChannelOverride::default() },
    )]);
    let message =
        h.service.send_message(&SendContext::default(), ids(&["c1"]), Variables::new(), overrides).await.unwrap();

    assert_eq!(message.results()[0].error_code(), Some(ErrorCode::NoRecipients));
}

#[tokio::test]
async fn test_no_template_uses_default_body() {
    let (email, log) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_channel(channel("c1", "email", "u@x")).await;

    h.send(&["c1"], Variables::new()).await;

    let delivery = &log.deliveries()[0];
    assert_eq!(delivery.content.subject, "");
    assert_eq!(delivery.content.body, "Default message body");
}

#[tokio::test]
async fn test_override_body_replaces_template_body_before_variable_check() {
    let (email, log) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_template(template("t1", "email", "Hi", "Hello {n}")).await;
    h.add_channel(channel("c1", "email", "u@x").with_template(TemplateId::from("t1"))).await;

    // The template body needs `n`, but the override body does not.
    let overrides = BTreeMap::from([(
        ChannelId::from("c1"),
        ChannelOverride { body: Some("Plain text".into()), ..ChannelOverride::default() },
    )]);
    let message =
        h.service.send_message(&SendContext::default(), ids(&["c1"]), Variables::new(), overrides).await.unwrap();

    assert_eq!(message.status(), MessageStatus::Success);
    assert_eq!(log.deliveries()[0].content.body, "Plain text");
}

#[tokio::test]
async fn test_result_invariants_hold_across_mixed_request() {
    let (email, _) = StubChannelType::new("email", Behavior::Succeed);
    let (slack, _) = StubChannelType::new("slack", Behavior::Fail(TransportError::permanent("http_400", "bad")));
    let h = Harness::new(vec![email, slack]);
    for id in ["a", "b", "c"] {
        h.add_channel(channel(id, "email", "u@x")).await;
    }
    h.add_channel(channel("s", "slack", "#ops")).await;

    let requested = ["c", "s", "a", "missing", "c", "b", "a"];
    let message = h.send(&requested, Variables::new()).await;

    let expected = ids(&["c", "s", "a", "missing", "b"]);
    let seen: Vec<_> = message.results().iter().map(|r| r.channel_id.clone()).collect();
    assert_eq!(seen, expected);
    assert_eq!(message.results().len(), message.channel_ids().len());

    for result in message.results() {
        if result.is_success() {
            assert!(result.sent_at.unwrap() >= message.created_at);
            assert!(result.error.is_none());
        } else {
            let code = result.error_code().unwrap();
            assert!(ErrorCode::ALL.contains(&code));
        }
    }
    assert_eq!(message.status(), MessageStatus::PartialSuccess);
    let summary = message.summary();
    assert_eq!((summary.total, summary.succeeded, summary.failed), (5, 3, 2));
}

#[tokio::test]
async fn test_message_is_persisted_with_results() {
    let (email, _) = StubChannelType::new("email", Behavior::Succeed);
    let h = Harness::new(vec![email]);
    h.add_channel(channel("c1", "email", "u@x")).await;

    let message = h.send(&["c1", "missing"], vars(&[("k", "v")])).await;

    let stored = h.messages.find_by_id(&message.id).await.unwrap();
    assert_eq!(stored, message);
    assert_eq!(h.service.get_message(&message.id).await.unwrap().status(), MessageStatus::PartialSuccess);
}

#[tokio::test]
async fn test_success_marks_channel_as_used() {
    let (email, _) = StubChannelType::new("email", Behavior::Succeed);
    let (slack, _) = StubChannelType::new("slack", Behavior::Fail(TransportError::permanent("http_400", "bad")));
    let h = Harness::new(vec![email, slack]);
    h.add_channel(channel("c1", "email", "u@x")).await;
    h.add_channel(channel("c2", "slack", "#ops")).await;

    let message = h.send(&["c1", "c2"], Variables::new()).await;

    let used = h.channels.get_raw(&ChannelId::from("c1")).unwrap();
    assert_eq!(used.last_used_at, message.results()[0].sent_at);
    let failed = h.channels.get_raw(&ChannelId::from("c2")).unwrap();
    assert!(failed.last_used_at.is_none());
}

#[tokio::test]
async fn test_channel_deleted_during_send_stays_deleted() {
    let channels = Arc::new(InMemoryChannelRepository::new());
    let (email, log) = StubChannelType::new("email", Behavior::DeleteWhileSending(Arc::clone(&channels)));
    let h = Harness::with_channels(vec![email], channels);
    h.add_channel(channel("c1", "email", "u@x")).await;

    let message = h.send(&["c1"], Variables::new()).await;

    assert_eq!(message.status(), MessageStatus::Success);
    assert_eq!(log.deliveries().len(), 1);
    let stored = h.channels.get_raw(&ChannelId::from("c1")).unwrap();
    assert_eq!(stored.deleted_at, Some(1_500));
    assert!(stored.last_used_at.is_none());
    assert!(h.channels.find_by_id(&ChannelId::from("c1")).await.is_err());
}
