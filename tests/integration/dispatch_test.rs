//! Dispatch orchestration: audience, preferences, dedup and templates.

use std::collections::BTreeSet;

use herald_core::error::ErrorKind;
use herald_core::types::UserId;
use herald_entity::{Actor, Channel, DeliveryStatus, EntityRef, Recipient};
use herald_service::StaticAudienceProvider;

use crate::helpers::{self, ScriptedAdapter};

fn manager(id: UserId) -> Recipient {
    Recipient::new(id)
        .with_phone("11999999999")
        .with_push_token("device-token")
        .with_email("manager@example.com")
}

#[tokio::test]
async fn test_mandatory_channels_ignore_opt_out() {
    let user = UserId::new();
    let audience = StaticAudienceProvider::new()
        .with_user(manager(user))
        .with_role("stock_manager", [user]);
    let push = ScriptedAdapter::accepting(Channel::Push);
    let chat = ScriptedAdapter::accepting(Channel::WhatsApp);
    let email = ScriptedAdapter::accepting(Channel::Email);
    let engine = helpers::engine(
        helpers::test_config(),
        audience,
        vec![push.clone(), chat.clone(), email.clone()],
    );

    let key = "item.out_of_stock".parse().unwrap();
    let view = engine
        .preferences()
        .update(
            user,
            &key,
            None,
            BTreeSet::from([Channel::Push, Channel::WhatsApp, Channel::Email]),
        )
        .await
        .unwrap();
    assert_eq!(
        view.effective,
        BTreeSet::from([Channel::InApp, Channel::Push, Channel::WhatsApp])
    );

    let result = engine.dispatch(helpers::out_of_stock()).await.unwrap();
    let submitted: BTreeSet<Channel> = result.recipients[0].submitted.keys().copied().collect();
    assert_eq!(
        submitted,
        BTreeSet::from([Channel::InApp, Channel::Push, Channel::WhatsApp])
    );

    let records = helpers::settle(&engine, result.notification_id).await;
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.status == DeliveryStatus::Delivered));
    assert_eq!(email.call_count(), 0);
    assert_eq!(push.call_count(), 1);
    assert_eq!(chat.call_count(), 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_repeated_dedup_key_is_noop() {
    let user = UserId::new();
    let audience = StaticAudienceProvider::new().with_role("stock_manager", [user]);
    let engine = helpers::engine(helpers::test_config(), audience, Vec::new());
    let day = chrono::NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

    let first = engine
        .dispatch(helpers::out_of_stock().deduplicated_daily(day))
        .await
        .unwrap();
    let second = engine
        .dispatch(helpers::out_of_stock().deduplicated_daily(day))
        .await
        .unwrap();

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(second.notification_id, first.notification_id);
    assert_eq!(second.submitted_count(), 0);

    helpers::settle(&engine, first.notification_id).await;
    let inbox = engine.notifications_for(user).await.unwrap();
    assert_eq!(inbox.len(), 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_assignees_receive_task_and_actor_is_skipped() {
    let assignee = UserId::new();
    let author = UserId::new();
    let audience = StaticAudienceProvider::new()
        .with_assignees(EntityRef::new("task", "7"), [assignee, author]);
    let engine = helpers::engine(helpers::test_config(), audience, Vec::new());

    let intent = herald_entity::NotificationIntent::new("task.assigned".parse().unwrap())
        .for_entity("task", "7")
        .with_data("task", "Inventory audit")
        .with_data("task_id", 7)
        .by(Actor::User(author));
    let result = engine.dispatch(intent).await.unwrap();

    let users: Vec<UserId> = result.recipients.iter().map(|r| r.user_id).collect();
    assert_eq!(users, vec![assignee]);

    let records = helpers::settle(&engine, result.notification_id).await;
    let in_app = helpers::on_channel(&records, Channel::InApp);
    assert_eq!(in_app.user_id, assignee);
    assert_eq!(engine.unseen_count(author).await.unwrap(), 0);
    assert_eq!(engine.unseen_count(assignee).await.unwrap(), 1);
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_missing_template_field_is_rejected() {
    let user = UserId::new();
    let audience = StaticAudienceProvider::new().with_role("stock_manager", [user]);
    let engine = helpers::engine(helpers::test_config(), audience, Vec::new());

    let intent = herald_entity::NotificationIntent::new("item.low_stock".parse().unwrap())
        .with_data("item", "Gloves");
    let err = engine.dispatch(intent).await.unwrap_err();

    assert!(err.is(ErrorKind::Validation));
    assert!(err.message.contains("item_id"));
    assert!(err.message.contains("quantity"));
    assert!(engine.notifications_for(user).await.unwrap().is_empty());
    engine.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_rendered_content_reaches_inbox() {
    let user = UserId::new();
    let audience = StaticAudienceProvider::new().with_role("stock_manager", [user]);
    let engine = helpers::engine(helpers::test_config(), audience, Vec::new());

    let result = engine.dispatch(helpers::out_of_stock()).await.unwrap();
    helpers::settle(&engine, result.notification_id).await;

    let inbox = engine.notifications_for(user).await.unwrap();
    let notification = &inbox[0].notification;
    assert_eq!(notification.title, "Gloves is out of stock");
    assert_eq!(notification.body, "Gloves has no units left in stock.");
    assert_eq!(notification.action_url.as_deref(), Some("/inventory/items/42"));
    assert!(notification.sent_at.is_some());
    engine.shutdown().await.unwrap();
}
