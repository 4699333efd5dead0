//! POP3 capabilities (RFC 2449) and SASL mechanisms (RFC 5034).

/// Capabilities discovered with `AUTH` and `CAPA`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// SASL mechanisms, uppercase.
    pub sasl: Vec<String>,
    /// CAPA keywords, uppercase (`TOP`, `UIDL`, `STLS`, `USER`, ...).
    pub keywords: Vec<String>,
}

impl Capabilities {
    /// Records the lines of an `AUTH` listing, one mechanism per line.
    pub fn add_auth_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        for line in lines {
            if let Some(mechanism) = line.split_whitespace().next() {
                self.add_mechanism(mechanism);
            }
        }
    }

    /// Records the lines of a `CAPA` listing.
    ///
    /// A `SASL` line also contributes its mechanisms.
    pub fn add_capa_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) {
        for line in lines {
            let mut words = line.split_whitespace();
            let Some(keyword) = words.next() else {
                continue;
            };
            let keyword = keyword.to_ascii_uppercase();
            if keyword == "SASL" {
                for mechanism in words {
                    self.add_mechanism(mechanism);
                }
            }
            if !self.keywords.contains(&keyword) {
                self.keywords.push(keyword);
            }
        }
    }

    fn add_mechanism(&mut self, mechanism: &str) {
        let mechanism = mechanism.to_ascii_uppercase();
        if !self.sasl.contains(&mechanism) {
            self.sasl.push(mechanism);
        }
    }

    /// Returns true if the SASL mechanism is offered.
    #[must_use]
    pub fn supports_sasl(&self, mechanism: &str) -> bool {
        self.sasl.iter().any(|m| m.eq_ignore_ascii_case(mechanism))
    }

    /// Returns true if the CAPA keyword is present.
    #[must_use]
    pub fn has(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword))
    }

    /// Returns true if STLS is offered.
    #[must_use]
    pub fn supports_stls(&self) -> bool {
        self.has("STLS")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_and_capa_merge() {
        let mut caps = Capabilities::default();
        caps.add_auth_lines(["PLAIN", "cram-md5"]);
        caps.add_capa_lines(["TOP", "UIDL", "SASL PLAIN XOAUTH2", "STLS"]);

        assert_eq!(caps.sasl, vec!["PLAIN", "CRAM-MD5", "XOAUTH2"]);
        assert!(caps.supports_sasl("xoauth2"));
        assert!(caps.supports_stls());
        assert!(caps.has("top"));
        assert!(!caps.has("USER"));
    }

    #[test]
    fn test_blank_lines_ignored() {
        let mut caps = Capabilities::default();
        caps.add_auth_lines([""]);
        caps.add_capa_lines(["   "]);
        assert_eq!(caps, Capabilities::default());
    }
}
