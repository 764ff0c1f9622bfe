//! Declared argument normalisers.
//!
//! Some models wrap literal arguments in prose: a tool expecting the text
//! `hello` occasionally receives `User message: 'hello'`.  A [`Normalizer`]
//! is declared per tool at registration and applied by the registry before
//! schema validation.  No coercion ever happens outside a declared
//! normaliser, and none is applied globally.

use serde_json::Value;

/// A name-scoped argument normaliser.
#[derive(Debug, Clone)]
pub enum Normalizer {
    /// Strip a `User message: '…'` / `User message: "…"` prose wrapper from
    /// the named string fields, leaving other fields untouched.
    StripProseWrapper { fields: Vec<String> },
}

impl Normalizer {
    /// Convenience constructor for [`Normalizer::StripProseWrapper`].
    pub fn strip_prose_wrapper<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StripProseWrapper {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Apply the normaliser to an argument object.  Non-object arguments and
    /// non-string fields pass through unchanged.
    pub fn apply(&self, args: &mut Value) {
        let Self::StripProseWrapper { fields } = self;

        let Some(map) = args.as_object_mut() else {
            return;
        };

        for field in fields {
            if let Some(Value::String(text)) = map.get_mut(field) {
                if let Some(unwrapped) = strip_wrapper(text) {
                    tracing::debug!(field = %field, "stripped prose wrapper from argument");
                    *text = unwrapped;
                }
            }
        }
    }
}

/// Extract the quoted payload from a `User message: '…'` wrapper, if the
/// whole value matches that shape.
fn strip_wrapper(text: &str) -> Option<String> {
    let rest = text.strip_prefix("User message:")?.trim_start();

    let quote = rest.chars().next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }

    let inner = &rest[quote.len_utf8()..];
    let end = inner.rfind(quote)?;
    Some(inner[..end].to_owned())
}
