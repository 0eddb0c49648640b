//! Dispatch orchestration.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::try_join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use herald_core::error::{AppError, ErrorKind};
use herald_core::result::AppResult;
use herald_core::types::{NotificationId, UserId};
use herald_database::{DispatchCreation, NotificationStore};
use herald_entity::{
    AudienceRule, Channel, DeliveryRecord, DispatchPolicy, Notification, NotificationIntent,
};
use herald_service::formatter::render_content;
use herald_service::{AudienceProvider, PolicyResolver, PreferenceService};
use herald_worker::{DeliveryTask, Submitter};

use crate::outcome::{DispatchResult, RecipientOutcome, SkippedChannel};

/// Keeps the first occurrence of every id.
fn unique(ids: impl IntoIterator<Item = UserId>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Resolves an intent into persisted deliveries and queues them.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    policies: Arc<PolicyResolver>,
    preferences: PreferenceService,
    audience: Arc<dyn AudienceProvider>,
    store: Arc<dyn NotificationStore>,
    submitter: Submitter,
    exclude_actor: bool,
}

impl NotificationDispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        policies: Arc<PolicyResolver>,
        preferences: PreferenceService,
        audience: Arc<dyn AudienceProvider>,
        store: Arc<dyn NotificationStore>,
        submitter: Submitter,
        exclude_actor: bool,
    ) -> Self {
        Self {
            policies,
            preferences,
            audience,
            store,
            submitter,
            exclude_actor,
        }
    }

    /// Dispatch one intent.
    ///
    /// Fails before anything is persisted when the key is unconfigured, the
    /// template data is incomplete or the audience cannot be resolved.
    /// Past that point per-delivery problems never fail the call: channels
    /// without a transport are reported as skipped and bad contact data
    /// fails the single delivery it belongs to.
    pub async fn dispatch(&self, intent: NotificationIntent) -> AppResult<DispatchResult> {
        let policy = self.policies.resolve(&intent.key).inspect_err(|e| {
            error!(key = %intent.key, error = %e, "Dispatch refused");
        })?;
        let content = render_content(policy, &intent)?;

        let user_ids = self.resolve_recipients(policy, &intent).await?;
        let recipients = self.audience.lookup_recipients(&user_ids).await?;
        let channel_sets = try_join_all(
            recipients
                .iter()
                .map(|r| self.preferences.effective_channels(r.user_id, policy)),
        )
        .await?;

        let available: BTreeSet<Channel> = self.submitter.channels().into_iter().collect();
        let notification_id = NotificationId::new();
        let mut records = Vec::new();
        let mut outcomes = Vec::with_capacity(recipients.len());
        let mut targeted = BTreeSet::new();

        for (recipient, channels) in recipients.iter().zip(channel_sets) {
            let mut outcome = RecipientOutcome {
                user_id: recipient.user_id,
                submitted: BTreeMap::new(),
                skipped: Vec::new(),
            };
            for channel in channels {
                if !available.contains(&channel) {
                    warn!(
                        key = %intent.key,
                        user_id = %recipient.user_id,
                        channel = %channel,
                        "Channel has no transport, skipped"
                    );
                    outcome.skipped.push(SkippedChannel {
                        channel,
                        reason: format!("No transport configured for {channel}"),
                    });
                    continue;
                }
                let record = DeliveryRecord::pending(
                    notification_id,
                    recipient.user_id,
                    channel,
                    recipient.destination_for(channel),
                );
                outcome.submitted.insert(channel, record.id);
                targeted.insert(channel);
                records.push(record);
            }
            outcomes.push(outcome);
        }

        let now = Utc::now();
        let notification = Notification {
            id: notification_id,
            key: intent.key.clone(),
            title: content.title,
            body: content.body,
            importance: policy.importance,
            action_url: content.action_url,
            entity: intent.entity,
            data: Value::Object(intent.data),
            channels: targeted,
            actor: intent.actor,
            dedup_key: intent.dedup_key,
            created_at: now,
            scheduled_at: intent.scheduled_at,
            sent_at: None,
        };

        if let DispatchCreation::Duplicate(existing) =
            self.store.create_dispatch(&notification, &records).await?
        {
            debug!(
                key = %notification.key,
                dedup_key = ?notification.dedup_key,
                notification_id = %existing,
                "Duplicate dispatch skipped"
            );
            return Ok(DispatchResult::duplicate(existing));
        }

        if records.is_empty() {
            warn!(
                key = %notification.key,
                notification_id = %notification_id,
                "Notification created with no deliveries"
            );
        }
        info!(
            key = %notification.key,
            notification_id = %notification_id,
            recipients = outcomes.len(),
            deliveries = records.len(),
            "Notification dispatched"
        );

        let delay = notification
            .scheduled_at
            .filter(|at| *at > now)
            .and_then(|at| (at - now).to_std().ok());
        for record in &records {
            let task = DeliveryTask {
                delivery_id: record.id,
                channel: record.channel,
            };
            match delay {
                Some(delay) => self.submitter.submit_after(task, delay),
                None => {
                    if let Err(e) = self.submitter.submit(task).await {
                        error!(
                            delivery_id = %record.id,
                            channel = %record.channel,
                            error = %e,
                            "Could not queue delivery; it stays pending until recovery"
                        );
                    }
                }
            }
        }

        Ok(DispatchResult {
            notification_id,
            duplicate: false,
            recipients: outcomes,
        })
    }

    async fn resolve_recipients(
        &self,
        policy: &DispatchPolicy,
        intent: &NotificationIntent,
    ) -> AppResult<Vec<UserId>> {
        if let Some(explicit) = &intent.recipients {
            return Ok(unique(explicit.iter().copied()));
        }
        if policy.audience == AudienceRule::Explicit {
            return Err(AppError::validation(format!(
                "Notification '{}' needs an explicit recipient list",
                policy.key
            )));
        }

        let members = self
            .audience
            .resolve_audience(&policy.audience, intent.entity.as_ref())
            .await
            .map_err(|e| {
                if e.is(ErrorKind::Validation) {
                    e
                } else {
                    AppError::with_source(
                        ErrorKind::ExternalService,
                        format!("Audience '{}' could not be resolved", policy.audience),
                        e,
                    )
                }
            })?;

        let actor = intent
            .actor
            .and_then(|a| a.user_id())
            .filter(|_| self.exclude_actor);
        let members = unique(members.into_iter().filter(|id| Some(*id) != actor));
        if members.is_empty() {
            warn!(key = %policy.key, audience = %policy.audience, "Audience resolved to nobody");
        }
        Ok(members)
    }
}
