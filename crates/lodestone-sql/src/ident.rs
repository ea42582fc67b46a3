//! Identifier naming transforms and quoting.
//!
//! Application-facing ("surface") column names and storage column names may
//! use different conventions. The transform pair is invertible so a loaded
//! row can be mapped back onto surface names exactly.

use std::fmt;
use std::sync::Arc;

/// A single direction of the naming transform.
pub type NameFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// An invertible surface/storage naming convention.
///
/// Two independently settable functions, one per direction; the pair must
/// be mutually inverse.
#[derive(Clone)]
pub struct NameStyle {
    to_storage: NameFn,
    to_surface: NameFn,
}

impl NameStyle {
    /// Surface and storage names are identical.
    #[must_use]
    pub fn identity() -> Self {
        Self::custom(|s: &str| s.to_string(), |s: &str| s.to_string())
    }

    /// camelCase surface names map to snake_case storage names.
    #[must_use]
    pub fn camel() -> Self {
        Self::custom(camel_to_snake, snake_to_camel)
    }

    /// A caller-supplied transform pair.
    pub fn custom<S, F>(to_storage: S, to_surface: F) -> Self
    where
        S: Fn(&str) -> String + Send + Sync + 'static,
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self {
            to_storage: Arc::new(to_storage),
            to_surface: Arc::new(to_surface),
        }
    }

    /// Converts an application-facing name to its storage form.
    #[must_use]
    pub fn to_storage(&self, surface: &str) -> String {
        (self.to_storage)(surface)
    }

    /// Converts a storage name back to its application-facing form.
    ///
    /// Exact inverse of [`NameStyle::to_storage`] for names produced by it.
    #[must_use]
    pub fn to_surface(&self, storage: &str) -> String {
        (self.to_surface)(storage)
    }
}

impl Default for NameStyle {
    fn default() -> Self {
        Self::identity()
    }
}

impl fmt::Debug for NameStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NameStyle").finish_non_exhaustive()
    }
}

fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            out.push('_');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(ch.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Quotes an identifier with the dialect quote character when it is not a
/// plain lowercase word. Embedded quote characters are doubled.
#[must_use]
pub fn quote_identifier(name: &str, quote: char) -> String {
    if is_plain(name) {
        return name.to_string();
    }
    let mut escaped = String::with_capacity(name.len() + 2);
    escaped.push(quote);
    for ch in name.chars() {
        if ch == quote {
            escaped.push(quote);
        }
        escaped.push(ch);
    }
    escaped.push(quote);
    escaped
}

fn is_plain(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_round_trip() {
        let style = NameStyle::identity();
        assert_eq!(style.to_storage("companyId"), "companyId");
        assert_eq!(style.to_surface("companyId"), "companyId");
    }

    #[test]
    fn test_camel_to_snake() {
        let style = NameStyle::camel();
        assert_eq!(style.to_storage("companyId"), "company_id");
        assert_eq!(style.to_storage("name"), "name");
        assert_eq!(style.to_storage("createdAtUtc"), "created_at_utc");
    }

    #[test]
    fn test_snake_to_camel() {
        let style = NameStyle::camel();
        assert_eq!(style.to_surface("company_id"), "companyId");
        assert_eq!(style.to_surface("name"), "name");
    }

    #[test]
    fn test_camel_round_trip() {
        let style = NameStyle::camel();
        for surface in ["companyId", "name", "someLongColumnName"] {
            assert_eq!(style.to_surface(&style.to_storage(surface)), surface);
        }
    }

    #[test]
    fn test_custom_transform_pair() {
        let style = NameStyle::custom(
            |surface: &str| format!("tbl_{surface}"),
            |storage: &str| storage.trim_start_matches("tbl_").to_string(),
        );
        assert_eq!(style.to_storage("users"), "tbl_users");
        assert_eq!(style.to_surface("tbl_users"), "users");
        assert_eq!(style.to_surface(&style.to_storage("orders")), "orders");
    }

    #[test]
    fn test_plain_identifiers_are_bare() {
        assert_eq!(quote_identifier("users", '"'), "users");
        assert_eq!(quote_identifier("user_name2", '"'), "user_name2");
    }

    #[test]
    fn test_reserved_characters_are_quoted() {
        assert_eq!(quote_identifier("Order", '"'), "\"Order\"");
        assert_eq!(quote_identifier("with space", '"'), "\"with space\"");
        assert_eq!(quote_identifier("odd\"name", '"'), "\"odd\"\"name\"");
    }
}
