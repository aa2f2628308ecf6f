//! Named synchronous hook chains.
//!
//! The engine fires a small set of lifecycle and message hooks. Each
//! hook name owns an ordered chain of callbacks; a callback either
//! passes the (possibly modified) payload along or stops the chain.
//! What a stop means is decided per call site by the engine.

use super::session::Message;
use crate::protocol::ReasonCode;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub const CLIENT_CONNECTED: &str = "client.connected";
pub const CLIENT_DISCONNECTED: &str = "client.disconnected";
pub const CLIENT_SUBSCRIBE: &str = "client.subscribe";
pub const CLIENT_UNSUBSCRIBE: &str = "client.unsubscribe";
pub const MESSAGE_DELIVERED: &str = "message.delivered";

/// Connection identity visible to every hook invocation.
#[derive(Debug, Clone)]
pub struct HookContext<'a> {
    pub zone: &'a str,
    pub client_id: &'a str,
    pub username: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub enum HookPayload {
    Connected { reason: ReasonCode },
    Disconnected { reason: String },
    Subscribe { filters: Vec<String> },
    Unsubscribe { topics: Vec<String> },
    Delivered { message: Message },
}

#[derive(Debug, Clone)]
pub enum HookVerdict {
    Pass(HookPayload),
    Stop(HookPayload),
}

/// Outcome of running a full chain: the folded payload plus whether a
/// callback stopped it.
#[derive(Debug, Clone)]
pub struct HookRun {
    pub payload: HookPayload,
    pub stopped: bool,
}

type HookFn = dyn Fn(&HookContext<'_>, HookPayload) -> HookVerdict + Send + Sync;

/// Registry of named hook chains.
#[derive(Default)]
pub struct HookRegistry {
    chains: RwLock<HashMap<&'static str, Vec<Arc<HookFn>>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach<F>(&self, hook: &'static str, callback: F)
    where
        F: Fn(&HookContext<'_>, HookPayload) -> HookVerdict + Send + Sync + 'static,
    {
        let mut chains = self.chains.write();
        chains.entry(hook).or_default().push(Arc::new(callback));
    }

    /// Fold the payload through the chain registered under `hook`.
    /// An empty chain passes the payload through untouched.
    pub fn run(&self, hook: &'static str, ctx: &HookContext<'_>, payload: HookPayload) -> HookRun {
        let chain = {
            let chains = self.chains.read();
            chains.get(hook).cloned().unwrap_or_default()
        };
        let mut acc = payload;
        for callback in chain {
            match callback(ctx, acc) {
                HookVerdict::Pass(next) => acc = next,
                HookVerdict::Stop(stopped) => {
                    return HookRun {
                        payload: stopped,
                        stopped: true,
                    }
                }
            }
        }
        HookRun {
            payload: acc,
            stopped: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>() -> HookContext<'a> {
        HookContext {
            zone: "default",
            client_id: "c1",
            username: None,
        }
    }

    #[test]
    fn empty_chain_passes_through() {
        let registry = HookRegistry::new();
        let run = registry.run(
            CLIENT_CONNECTED,
            &ctx(),
            HookPayload::Connected {
                reason: ReasonCode::Success,
            },
        );
        assert!(!run.stopped);
    }

    #[test]
    fn chain_folds_payload_in_order() {
        let registry = HookRegistry::new();
        registry.attach(CLIENT_SUBSCRIBE, |_, payload| {
            if let HookPayload::Subscribe { mut filters } = payload {
                filters.push("a".into());
                HookVerdict::Pass(HookPayload::Subscribe { filters })
            } else {
                HookVerdict::Pass(payload)
            }
        });
        registry.attach(CLIENT_SUBSCRIBE, |_, payload| {
            if let HookPayload::Subscribe { mut filters } = payload {
                filters.push("b".into());
                HookVerdict::Pass(HookPayload::Subscribe { filters })
            } else {
                HookVerdict::Pass(payload)
            }
        });
        let run = registry.run(
            CLIENT_SUBSCRIBE,
            &ctx(),
            HookPayload::Subscribe { filters: vec![] },
        );
        assert!(!run.stopped);
        match run.payload {
            HookPayload::Subscribe { filters } => assert_eq!(filters, vec!["a", "b"]),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[test]
    fn stop_short_circuits_the_chain() {
        let registry = HookRegistry::new();
        registry.attach(CLIENT_SUBSCRIBE, |_, payload| HookVerdict::Stop(payload));
        registry.attach(CLIENT_SUBSCRIBE, |_, _| {
            panic!("callback after stop must not run")
        });
        let run = registry.run(
            CLIENT_SUBSCRIBE,
            &ctx(),
            HookPayload::Subscribe { filters: vec![] },
        );
        assert!(run.stopped);
    }
}
