use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::net::{MessageKey, NodeCtx};

/// Which buffered messages make room for an incoming one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Only messages past their deadline.
    #[default]
    ExpiredOnly,
    /// Oldest insertion first.
    Fifo,
    /// Earliest deadline first.
    Edf,
    /// Latest deadline first.
    Ldf,
    Random,
}

/// Drop every buffered message whose deadline is before the current time.
pub fn drop_expired(ctx: &mut NodeCtx<'_>) -> Vec<MessageKey> {
    let now = ctx.now;
    let expired: Vec<MessageKey> = ctx
        .core
        .buf
        .iter_edf()
        .take_while(|m| m.deadline < now)
        .map(|m| m.key())
        .collect();
    for key in &expired {
        ctx.drop_message(key);
    }
    expired
}

/// Evict expired messages, then victims chosen by `policy` until `needed`
/// bits are free or nothing else can go. Returns every dropped key.
pub fn evict_for(
    ctx: &mut NodeCtx<'_>,
    needed: u64,
    policy: EvictionPolicy,
    rng: &mut StdRng,
) -> Vec<MessageKey> {
    let mut dropped = drop_expired(ctx);
    while ctx.core.buf.free() < needed {
        let buf = &ctx.core.buf;
        let victim = match policy {
            EvictionPolicy::ExpiredOnly => None,
            EvictionPolicy::Fifo => buf.oldest().map(|m| m.key()),
            EvictionPolicy::Edf => buf.peek_edf().map(|m| m.key()),
            EvictionPolicy::Ldf => buf.peek_ldf().map(|m| m.key()),
            EvictionPolicy::Random if buf.is_empty() => None,
            EvictionPolicy::Random => buf
                .nth_edf(rng.gen_range(0..buf.len()))
                .map(|m| m.key()),
        };
        let Some(key) = victim else { break };
        ctx.drop_message(&key);
        dropped.push(key);
    }
    dropped
}
