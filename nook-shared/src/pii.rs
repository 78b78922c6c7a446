use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wrapper for guest contact details (email, phone) that never prints its value
/// through `Debug` or `Display`. Serialization passes the real value through,
/// since the payment gateway needs it.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Masked<String> {
    /// Log-safe hint for an email address: `j***@example.com`.
    pub fn email_hint(&self) -> String {
        match self.0.split_once('@') {
            Some((local, domain)) => {
                let first = local.chars().next().map(String::from).unwrap_or_default();
                format!("{}***@{}", first, domain)
            }
            None => "********".to_string(),
        }
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Masked(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_hide_value() {
        let email = Masked("guest@example.com".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(format!("{}", email), "********");
    }

    #[test]
    fn test_serialize_passes_value_through() {
        let phone = Masked("+265991234567".to_string());
        let json = serde_json::to_string(&phone).unwrap();
        assert_eq!(json, "\"+265991234567\"");
    }

    #[test]
    fn test_email_hint() {
        let email = Masked("jane@example.com".to_string());
        assert_eq!(email.email_hint(), "j***@example.com");
        assert_eq!(Masked("not-an-email".to_string()).email_hint(), "********");
    }
}
