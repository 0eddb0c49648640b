//! Transport outcomes: validation, timeouts, retries and the attempt cap.

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use herald_core::types::UserId;
use herald_entity::{Channel, DeliveryError, DeliveryStatus, EntityRef, ErrorClass, Recipient};
use herald_service::StaticAudienceProvider;

use crate::helpers::{self, ScriptedAdapter, Step};

#[tokio::test]
async fn test_chat_phone_normalized_or_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({"phone": "5511999999999"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "wamid.1"})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = helpers::test_config();
    config.channels.whatsapp.enabled = true;
    config.channels.whatsapp.bridge_url = server.uri();

    let valid = UserId::new();
    let invalid = UserId::new();
    let audience = StaticAudienceProvider::new()
        .with_user(Recipient::new(valid).with_phone("11999999999"))
        .with_user(Recipient::new(invalid).with_phone("123"));
    let engine = helpers::engine(config, audience, Vec::new());

    let result = engine
        .dispatch(helpers::unreturned(vec![valid, invalid]))
        .await
        .unwrap();
    let records = helpers::settle(&engine, result.notification_id).await;

    let chat: Vec<_> = records
        .iter()
        .filter(|r| r.channel == Channel::WhatsApp)
        .collect();
    assert_eq!(chat.len(), 2);
    for record in chat {
        if record.user_id == valid {
            assert_eq!(record.status, DeliveryStatus::Delivered);
            assert_eq!(record.attempts, 1);
        } else {
            assert_eq!(record.status, DeliveryStatus::FailedPermanent);
            assert_eq!(record.attempts, 0);
            let error = record.last_error.as_ref().unwrap();
            assert_eq!(error.class, ErrorClass::Validation);
            assert_eq!(error.code, "INVALID_PHONE");
        }
    }

    engine.shutdown().await.unwrap();
    server.verify().await;
}

fn overdue_task(assignee: UserId) -> (StaticAudienceProvider, herald_entity::NotificationIntent) {
    let audience = StaticAudienceProvider::new()
        .with_user(Recipient::new(assignee).with_push_token("device-token"))
        .with_assignees(EntityRef::new("task", "9"), [assignee]);
    let intent = herald_entity::NotificationIntent::new("task.overdue".parse().unwrap())
        .for_entity("task", "9")
        .with_data("task", "Fire drill")
        .with_data("task_id", 9)
        .with_data("due_date", "2026-10-10");
    (audience, intent)
}

#[tokio::test(start_paused = true)]
async fn test_push_timeout_retried_after_first_backoff() {
    let assignee = UserId::new();
    let (audience, intent) = overdue_task(assignee);
    let push = ScriptedAdapter::scripted(Channel::Push, vec![Step::Stall]);
    let engine = helpers::engine(helpers::test_config(), audience, vec![push.clone()]);

    let result = engine.dispatch(intent).await.unwrap();
    let records = helpers::settle(&engine, result.notification_id).await;

    let record = helpers::on_channel(&records, Channel::Push);
    assert_eq!(record.status, DeliveryStatus::Delivered);
    assert_eq!(record.attempts, 2);

    let calls = push.call_times();
    assert_eq!(calls.len(), 2);
    let gap = calls[1] - calls[0];
    assert!(gap >= Duration::from_secs(5), "retried after {gap:?}");
    assert!(gap < Duration::from_secs(6), "retried after {gap:?}");
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_retryable_failures_stop_at_three_attempts() {
    let assignee = UserId::new();
    let (audience, intent) = overdue_task(assignee);
    let push = ScriptedAdapter::always(
        Channel::Push,
        Step::Reject(DeliveryError::retryable("HTTP_502", "bad gateway")),
    );
    let engine = helpers::engine(helpers::test_config(), audience, vec![push.clone()]);

    let result = engine.dispatch(intent).await.unwrap();
    let records = helpers::settle(&engine, result.notification_id).await;

    let record = helpers::on_channel(&records, Channel::Push);
    assert_eq!(record.status, DeliveryStatus::FailedPermanent);
    assert_eq!(record.attempts, 3);
    assert_eq!(record.last_error.as_ref().unwrap().code, "HTTP_502");
    assert_eq!(push.call_count(), 3);

    let calls = push.call_times();
    assert!(calls[1] - calls[0] >= Duration::from_secs(5));
    assert!(calls[2] - calls[1] >= Duration::from_secs(10));

    let stats = engine.stats(result.notification_id).await.unwrap();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.failed, 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let assignee = UserId::new();
    let (audience, intent) = overdue_task(assignee);
    let push = ScriptedAdapter::always(
        Channel::Push,
        Step::Reject(DeliveryError::permanent("NOT_REGISTERED", "token revoked")),
    );
    let engine = helpers::engine(helpers::test_config(), audience, vec![push.clone()]);

    let result = engine.dispatch(intent).await.unwrap();
    let records = helpers::settle(&engine, result.notification_id).await;

    let record = helpers::on_channel(&records, Channel::Push);
    assert_eq!(record.status, DeliveryStatus::FailedPermanent);
    assert_eq!(record.attempts, 1);
    assert_eq!(push.call_count(), 1);
    engine.shutdown().await.unwrap();
}
