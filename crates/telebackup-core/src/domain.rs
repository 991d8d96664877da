use std::fmt;

/// Host used when building canonical message URLs.
pub const CANONICAL_HOST: &str = "t.me";

/// Platform message id (numeric, increases with chronology within a channel).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub i32);

/// A channel reference as written by the operator in the config file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelRef {
    /// Joinable invite (`t.me/+TOKEN` or legacy `t.me/joinchat/TOKEN`).
    Invite { token: String },
    /// Public username, without the leading `@` or URL prefix.
    Username(String),
    /// Numeric channel id (bare or `-100`-prefixed).
    Id(i64),
}

impl ChannelRef {
    /// Classify a raw reference.
    ///
    /// Returns `None` for references that cannot name a channel at all (blank input).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }

        if let Some(token) = invite_token(raw) {
            return Some(Self::Invite { token });
        }

        if let Ok(id) = raw.parse::<i64>() {
            return Some(Self::Id(id));
        }

        let path = strip_url_prefix(raw);
        let name = path
            .trim_start_matches('@')
            .split(['/', '?'])
            .next()
            .unwrap_or_default();
        if name.is_empty() {
            return None;
        }
        Some(Self::Username(name.to_string()))
    }
}

/// Extract the joinable token from an invite link.
///
/// `+`-style links take everything after the last `+`; legacy links take the
/// segment following `/joinchat/`. Plain handles yield `None`.
pub fn invite_token(reference: &str) -> Option<String> {
    let token = if reference.contains("/+") {
        reference.rsplit('+').next()
    } else if let Some((_, rest)) = reference.split_once("/joinchat/") {
        Some(rest)
    } else {
        None
    }?;

    let token = token.trim_end_matches('/').trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

fn strip_url_prefix(raw: &str) -> &str {
    let rest = raw
        .strip_prefix("https://")
        .or_else(|| raw.strip_prefix("http://"))
        .unwrap_or(raw);
    for host in ["t.me/", "telegram.me/", "telegram.dog/"] {
        if let Some(path) = rest.strip_prefix(host) {
            return path;
        }
    }
    rest
}

/// Identity of a resolved source channel, as far as dedup keys are concerned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub username: Option<String>,
    pub id: i64,
}

impl ChannelIdentity {
    /// Path segment used in canonical URLs: the public handle when there is
    /// one, otherwise `c<abs id>`.
    pub fn url_segment(&self) -> String {
        match self.username.as_deref().filter(|u| !u.is_empty()) {
            Some(username) => username.to_string(),
            None => format!("c{}", self.id.unsigned_abs()),
        }
    }
}

/// Canonical dedup key for a copied message.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SentId(String);

impl SentId {
    pub fn for_message(channel: &ChannelIdentity, message_id: MessageId) -> Self {
        Self(format!(
            "https://{CANONICAL_HOST}/{}/{}",
            channel.url_segment(),
            message_id.0
        ))
    }

    /// Wrap a line read back from a sent-id log.
    pub fn from_line(line: &str) -> Self {
        Self(line.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
