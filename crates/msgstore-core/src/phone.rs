//! Telephony collaborator.
//!
//! The codec needs three answers from the radio layer: the device's own
//! number, the international form of a number, and whether the device is on
//! its home network. Number parsing itself lives outside this crate.

/// Telephony context consulted when preparing records.
pub trait PhoneContext: Send + Sync {
    /// The device's own number (MSISDN), if known.
    fn own_number(&self) -> Option<String>;

    /// The international form of `number`; returns it unchanged when it
    /// cannot be parsed.
    fn to_international(&self, number: &str) -> String;

    /// Whether the current network's country matches the SIM's.
    fn is_home_network(&self) -> bool;
}

/// Treat an absent number and the literal `"undefined"` alike.
///
/// Some radio layers report an unknown MSISDN as that string.
pub fn sanitize_own_number(number: Option<String>) -> Option<String> {
    number.filter(|n| !n.is_empty() && n != "undefined")
}

/// A fixed telephony context.
///
/// `to_international` prefixes bare national numbers (no leading `+`) with
/// the configured country code, which is enough to exercise normalization.
#[derive(Debug, Clone)]
pub struct StaticPhoneContext {
    own_number: Option<String>,
    country_code: Option<String>,
    home_network: bool,
}

impl StaticPhoneContext {
    pub fn new(own_number: Option<&str>) -> Self {
        Self {
            own_number: own_number.map(String::from),
            country_code: None,
            home_network: true,
        }
    }

    /// Prefix national numbers with `+<code>` when normalizing.
    pub fn with_country_code(mut self, code: &str) -> Self {
        self.country_code = Some(code.to_string());
        self
    }

    /// Simulate roaming (`false`) or home (`true`).
    pub fn with_home_network(mut self, home: bool) -> Self {
        self.home_network = home;
        self
    }
}

impl Default for StaticPhoneContext {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PhoneContext for StaticPhoneContext {
    fn own_number(&self) -> Option<String> {
        sanitize_own_number(self.own_number.clone())
    }

    fn to_international(&self, number: &str) -> String {
        match &self.country_code {
            Some(code)
                if !number.starts_with('+')
                    && !number.is_empty()
                    && number.chars().all(|c| c.is_ascii_digit()) =>
            {
                format!("+{}{}", code, number.trim_start_matches('0'))
            }
            _ => number.to_string(),
        }
    }

    fn is_home_network(&self) -> bool {
        self.home_network
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_own_number() {
        assert_eq!(sanitize_own_number(Some("undefined".into())), None);
        assert_eq!(sanitize_own_number(Some(String::new())), None);
        assert_eq!(sanitize_own_number(Some("+1".into())), Some("+1".into()));
    }

    #[test]
    fn test_static_normalization() {
        let phone = StaticPhoneContext::new(Some("+15550000")).with_country_code("1");
        assert_eq!(phone.to_international("5551234"), "+15551234");
        assert_eq!(phone.to_international("+445551234"), "+445551234");
        assert_eq!(phone.to_international("SHORTCODE"), "SHORTCODE");
    }

    #[test]
    fn test_without_country_code_is_identity() {
        let phone = StaticPhoneContext::default();
        assert_eq!(phone.to_international("5551234"), "5551234");
        assert_eq!(phone.own_number(), None);
    }
}
