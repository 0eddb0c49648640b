//! Seen tracking, cancellation and restart recovery.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use herald_core::types::UserId;
use herald_database::{MemoryNotificationStore, NotificationStore};
use herald_dispatch::EngineBuilder;
use herald_entity::{Channel, DeliveryError, DeliveryStatus, EntityRef, ErrorClass, Recipient};
use herald_service::StaticAudienceProvider;

use crate::helpers::{self, ScriptedAdapter, Step};

#[tokio::test]
async fn test_mark_seen_is_idempotent() {
    let user = UserId::new();
    let audience = StaticAudienceProvider::new().with_role("stock_manager", [user]);
    let engine = helpers::engine(helpers::test_config(), audience, Vec::new());

    let result = engine.dispatch(helpers::out_of_stock()).await.unwrap();
    let id = result.notification_id;
    helpers::settle(&engine, id).await;
    assert_eq!(engine.unseen_count(user).await.unwrap(), 1);

    assert!(engine.mark_seen(user, id).await.unwrap());
    assert!(!engine.mark_seen(user, id).await.unwrap());

    assert_eq!(engine.unseen_count(user).await.unwrap(), 0);
    let stats = engine.stats(id).await.unwrap();
    assert_eq!(stats.recipients, 1);
    assert_eq!(stats.seen, 1);
    assert!(engine.notifications_for(user).await.unwrap()[0].seen_at.is_some());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cancel_supersedes_scheduled_deliveries() {
    let users = vec![UserId::new(), UserId::new()];
    let engine = helpers::engine(
        helpers::test_config(),
        StaticAudienceProvider::new(),
        Vec::new(),
    );

    let intent = helpers::unreturned(users).scheduled_for(Utc::now() + chrono::Duration::hours(1));
    let result = engine.dispatch(intent).await.unwrap();
    assert_eq!(result.submitted_count(), 2);

    let cancelled = engine.cancel(result.notification_id).await.unwrap();
    assert_eq!(cancelled, 2);
    assert_eq!(engine.cancel(result.notification_id).await.unwrap(), 0);

    let report = engine.delivery_status(result.notification_id).await.unwrap();
    assert!(report.is_settled());
    let in_app = &report.channels[&Channel::InApp];
    assert_eq!(in_app.failed_permanent, 2);
    for record in &report.records {
        assert_eq!(record.attempts, 0);
        assert_eq!(
            record.last_error.as_ref().unwrap().class,
            ErrorClass::Superseded
        );
    }
    engine.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_recover_resumes_pending_retry() {
    let assignee = UserId::new();
    let audience = || {
        StaticAudienceProvider::new()
            .with_user(Recipient::new(assignee).with_push_token("device-token"))
            .with_assignees(EntityRef::new("task", "3"), [assignee])
    };
    let store: Arc<dyn NotificationStore> = Arc::new(MemoryNotificationStore::new());
    let mut config = helpers::test_config();
    config.retry.base_delay_ms = 60_000;
    config.retry.max_delay_ms = 240_000;

    let failing = ScriptedAdapter::always(
        Channel::Push,
        Step::Reject(DeliveryError::retryable("HTTP_503", "gateway down")),
    );
    let first = EngineBuilder::new(config.clone())
        .store(Arc::clone(&store))
        .audience(Arc::new(audience()))
        .adapter(failing.clone())
        .build()
        .unwrap();
    let intent = herald_entity::NotificationIntent::new("task.overdue".parse().unwrap())
        .for_entity("task", "3")
        .with_data("task", "Calibrate scale")
        .with_data("task_id", 3)
        .with_data("due_date", "2026-10-12");
    let id = first.dispatch(intent).await.unwrap().notification_id;

    while failing.call_count() == 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.shutdown().await.unwrap();

    let report = first.delivery_status(id).await.unwrap();
    let push = helpers::on_channel(&report.records, Channel::Push);
    assert_eq!(push.status, DeliveryStatus::Retrying);
    assert!(push.next_retry_at.is_some());

    let healthy = ScriptedAdapter::accepting(Channel::Push);
    let second = EngineBuilder::new(config)
        .store(Arc::clone(&store))
        .audience(Arc::new(audience()))
        .adapter(healthy.clone())
        .build()
        .unwrap();
    assert_eq!(second.recover().await.unwrap(), 1);

    let records = helpers::settle(&second, id).await;
    let push = helpers::on_channel(&records, Channel::Push);
    assert_eq!(push.status, DeliveryStatus::Delivered);
    assert_eq!(push.attempts, 2);
    assert_eq!(failing.call_count(), 1);
    assert_eq!(healthy.call_count(), 1);
    second.shutdown().await.unwrap();
}
