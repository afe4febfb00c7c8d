/// Ban, unban and delete with best-effort fan-out
use super::{BanSignal, SignalHub, SignalStatus, StatusMirror};
use crate::{
    error::AppResult,
    identity::{IdentityProvider, StatusUpdate, UserRecord, UserStatus},
    metrics,
};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_BAN_REASON: &str = "Policy violation";

#[derive(Clone)]
pub struct BanService {
    identity: Arc<dyn IdentityProvider>,
    mirror: Arc<dyn StatusMirror>,
    hub: SignalHub,
}

impl BanService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        mirror: Arc<dyn StatusMirror>,
        hub: SignalHub,
    ) -> Self {
        Self { identity, mirror, hub }
    }

    /// Ban a user. Fails only if the provider update fails.
    pub async fn ban(
        &self,
        user_id: &str,
        reason: Option<&str>,
        admin_id: &str,
    ) -> AppResult<UserRecord> {
        let reason = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_BAN_REASON)
            .to_string();

        let user = self
            .identity
            .update_status(
                user_id,
                StatusUpdate {
                    status: UserStatus::Banned,
                    reason: Some(reason.clone()),
                    changed_by: admin_id.to_string(),
                    approve: false,
                },
            )
            .await?;

        info!(user_id, admin_id, "user banned");
        self.fan_out(BanSignal::new(user_id, SignalStatus::Banned, Some(reason)))
            .await;

        Ok(user)
    }

    /// Lift a ban and mark the user approved
    pub async fn unban(&self, user_id: &str, admin_id: &str) -> AppResult<UserRecord> {
        let user = self
            .identity
            .update_status(
                user_id,
                StatusUpdate {
                    status: UserStatus::Active,
                    reason: None,
                    changed_by: admin_id.to_string(),
                    approve: true,
                },
            )
            .await?;

        info!(user_id, admin_id, "user unbanned");
        self.fan_out(BanSignal::new(user_id, SignalStatus::Active, None))
            .await;

        Ok(user)
    }

    /// Delete a user from the provider
    pub async fn delete(&self, user_id: &str, admin_id: &str) -> AppResult<()> {
        self.identity.delete_user(user_id).await?;

        info!(user_id, admin_id, "user deleted");
        self.fan_out(BanSignal::new(user_id, SignalStatus::Deleted, None))
            .await;

        Ok(())
    }

    /// Mirror and broadcast. Never fails; enforcement does not depend on it.
    async fn fan_out(&self, signal: BanSignal) {
        let status = signal.status.as_str();

        match self.mirror.record(&signal).await {
            Ok(()) => metrics::record_ban_signal(status, "mirrored"),
            Err(e) => {
                warn!(user_id = %signal.user_id, error = %e, "failed to mirror ban signal");
                metrics::record_ban_signal(status, "mirror_failed");
            }
        }

        let receivers = self.hub.publish(signal);
        metrics::record_ban_signal(status, if receivers > 0 { "pushed" } else { "no_listeners" });
    }
}
