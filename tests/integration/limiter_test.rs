//! Channel admission limits under a burst of deliveries.

use std::time::Duration;

use herald_core::config::WindowLimitConfig;
use herald_core::types::UserId;
use herald_entity::{Channel, DeliveryStatus, Recipient};
use herald_service::StaticAudienceProvider;

use crate::helpers::{self, ScriptedAdapter};

#[tokio::test(start_paused = true)]
async fn test_chat_burst_respects_window() {
    let mut config = helpers::test_config();
    config.rate_limits.channels.insert(
        "whatsapp".to_string(),
        WindowLimitConfig {
            max_requests: 2,
            window_seconds: 10,
        },
    );

    let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
    let audience = users.iter().enumerate().fold(
        StaticAudienceProvider::new(),
        |audience, (i, &user)| {
            audience.with_user(Recipient::new(user).with_phone(format!("1199999000{i}")))
        },
    );
    let chat = ScriptedAdapter::accepting(Channel::WhatsApp);
    let engine = helpers::engine(config, audience, vec![chat.clone()]);

    let result = engine
        .dispatch(helpers::unreturned(users.clone()))
        .await
        .unwrap();
    let records = helpers::settle(&engine, result.notification_id).await;

    let chat_records: Vec<_> = records
        .iter()
        .filter(|r| r.channel == Channel::WhatsApp)
        .collect();
    assert_eq!(chat_records.len(), 5);
    for record in chat_records {
        assert_eq!(record.status, DeliveryStatus::Delivered);
        assert_eq!(record.attempts, 1, "denied admissions must not count");
    }

    let mut calls = chat.call_times();
    calls.sort();
    assert_eq!(calls.len(), 5);
    for pair in calls.windows(3) {
        assert!(
            pair[2] - pair[0] >= Duration::from_secs(10),
            "three sends inside one window"
        );
    }
    engine.shutdown().await.unwrap();
}
