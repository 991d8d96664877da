use tracing::{debug, warn};

use crate::{domain::invite_token, messaging::port::ChannelClient};

/// Best-effort join through an invite link.
///
/// Plain handles are left alone. Join failures (already a member, expired or
/// invalid invite) are logged and swallowed: resolving the channel afterwards
/// is what decides whether it is actually reachable. Returns whether a join
/// request succeeded.
pub async fn ensure_joined<C: ChannelClient + ?Sized>(client: &C, reference: &str) -> bool {
    let Some(token) = invite_token(reference) else {
        return false;
    };

    match client.join_invite(&token).await {
        Ok(()) => {
            debug!("joined {reference}");
            true
        }
        Err(e) => {
            warn!("join failed or already a member: {reference}: {e}");
            false
        }
    }
}
