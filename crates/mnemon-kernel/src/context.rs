//! Per-request user identity.
//!
//! Every chat turn carries a [`UserContext`] derived from the front-end's
//! `X-User-*` request headers.  The context rides along the whole turn: it is
//! injected into the agent's system prompt and attached as headers to every
//! downstream backend call.  A request without recognisable identity headers
//! gets the anonymous marker instead of being rejected.

use serde::{Deserialize, Serialize};

/// The id used when no identity headers were supplied.
pub const ANONYMOUS_ID: &str = "anonymous";

/// Identity of the user behind the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContext {
    /// Stable user identifier from the front-end.
    pub id: String,

    /// Display name, used by agents to address the user.
    pub display_name: String,

    /// Email address, when the front-end supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Role string (e.g. `user`, `admin`).
    pub role: String,

    /// Whether the front-end authenticated this user.
    pub authenticated: bool,
}

impl UserContext {
    /// Build a context for an identified user.
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role: impl Into<String>,
        authenticated: bool,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: None,
            role: role.into(),
            authenticated,
        }
    }

    /// Attach an email address.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// The anonymous marker context used when no identity headers arrived.
    pub fn anonymous() -> Self {
        Self {
            id: ANONYMOUS_ID.to_owned(),
            display_name: "Unknown User".to_owned(),
            email: None,
            role: "user".to_owned(),
            authenticated: false,
        }
    }

    /// Whether this is the anonymous marker.
    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS_ID
    }

    /// Render the context as the block injected into agent system prompts so
    /// the model can address the user by name and tools can parse identity.
    pub fn prompt_block(&self) -> String {
        let mut block = format!(
            "## User Context\n- id: {}\n- name: {}\n- role: {}\n- authenticated: {}",
            self.id, self.display_name, self.role, self.authenticated
        );
        if let Some(ref email) = self.email {
            block.push_str(&format!("\n- email: {email}"));
        }
        block
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_marker() {
        let ctx = UserContext::anonymous();
        assert!(ctx.is_anonymous());
        assert!(!ctx.authenticated);
        assert_eq!(ctx.id, ANONYMOUS_ID);
    }

    #[test]
    fn prompt_block_includes_email_when_present() {
        let ctx = UserContext::new("u-1", "Ada", "user", true).with_email("ada@example.com");
        let block = ctx.prompt_block();
        assert!(block.contains("name: Ada"));
        assert!(block.contains("email: ada@example.com"));
    }

    #[test]
    fn prompt_block_omits_missing_email() {
        let ctx = UserContext::new("u-1", "Ada", "user", true);
        assert!(!ctx.prompt_block().contains("email"));
    }
}
