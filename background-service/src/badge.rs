use feedfilter_core::{CoreError, KeyValueStore, StorageSubscription, CREDENTIAL_KEY};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info};

pub const BADGE_ALERT_COLOR: &str = "#f4212e";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BadgeState {
    Active,
    CredentialRequired,
}

impl BadgeState {
    fn from_credential(value: Option<&Value>) -> Self {
        let present = match value {
            Some(Value::String(key)) => !key.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        };
        if present {
            BadgeState::Active
        } else {
            BadgeState::CredentialRequired
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            BadgeState::Active => "",
            BadgeState::CredentialRequired => "!",
        }
    }

    pub fn color(&self) -> Option<&'static str> {
        match self {
            BadgeState::Active => None,
            BadgeState::CredentialRequired => Some(BADGE_ALERT_COLOR),
        }
    }
}

/// Tracks whether a credential is stored and publishes the badge state.
#[derive(Debug)]
pub struct BadgeMonitor {
    state: watch::Sender<BadgeState>,
    subscription: StorageSubscription,
}

impl BadgeMonitor {
    pub async fn start<S: KeyValueStore>(store: &S) -> Result<Self, CoreError> {
        // Subscribe first so no change between the read and the subscription is lost
        let subscription = store.subscribe();
        let credential = store.get_one(CREDENTIAL_KEY).await?;
        let initial = BadgeState::from_credential(credential.as_ref());
        info!("Badge state: {:?}", initial);

        let (state, _) = watch::channel(initial);
        Ok(Self {
            state,
            subscription,
        })
    }

    pub fn state(&self) -> BadgeState {
        *self.state.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<BadgeState> {
        self.state.subscribe()
    }

    /// Follows credential changes until the store stops publishing.
    pub async fn run(mut self) {
        while let Some(change) = self.subscription.recv().await {
            if change.key != CREDENTIAL_KEY {
                continue;
            }
            let next = BadgeState::from_credential(change.new_value.as_ref());
            let changed = self.state.send_if_modified(|current| {
                let changed = *current != next;
                *current = next;
                changed
            });
            if changed {
                info!("Badge state: {:?}", next);
            }
        }
        debug!("Storage subscription closed, badge monitor stopping");
    }
}
