//! Domain names managed by cfsync
//!
//! A [`Domain`] is either a fully-qualified name or a wildcard (`*.` followed
//! by a suffix). Names are normalized once at construction (lowercase ASCII,
//! no trailing dot) and never change afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::FusedIterator;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum length of a DNS name (RFC 1035)
const MAX_NAME_LEN: usize = 253;

/// Maximum length of a single label (RFC 1035)
const MAX_LABEL_LEN: usize = 63;

/// A managed domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Domain {
    /// A plain name such as `www.example.com`
    Fqdn(String),
    /// `*.` followed by the stored suffix, e.g. `Wildcard("example.com")`
    Wildcard(String),
}

impl Domain {
    /// Parse and normalize a domain name
    ///
    /// Accepts an optional trailing dot and any letter case. Names must
    /// already be in ASCII (punycode) form.
    pub fn parse(input: &str) -> Result<Self> {
        let name = input.trim().trim_end_matches('.').to_ascii_lowercase();

        if name.is_empty() {
            return Err(Error::invalid_input("domain name cannot be empty"));
        }

        if !name.is_ascii() {
            return Err(Error::invalid_input(format!(
                "domain name must be ASCII (punycode): {:?}",
                input
            )));
        }

        if name.len() > MAX_NAME_LEN {
            return Err(Error::invalid_input(format!(
                "domain name too long: {} chars (max {})",
                name.len(),
                MAX_NAME_LEN
            )));
        }

        match name.strip_prefix("*.") {
            Some(suffix) => {
                validate_labels(suffix)?;
                Ok(Domain::Wildcard(suffix.to_string()))
            }
            None => {
                validate_labels(&name)?;
                Ok(Domain::Fqdn(name))
            }
        }
    }

    /// The name as sent to the provider API
    pub fn dns_name_ascii(&self) -> String {
        match self {
            Domain::Fqdn(name) => name.clone(),
            Domain::Wildcard(suffix) => format!("*.{}", suffix),
        }
    }

    /// Human-readable form for logs and reports
    ///
    /// Only ASCII names are accepted at construction, so this is the ASCII
    /// name itself; it is never used for lookups.
    pub fn describe(&self) -> String {
        self.dns_name_ascii()
    }

    /// Candidate zone names, longest first
    ///
    /// For `a.b.example.com` this yields `a.b.example.com`, `b.example.com`,
    /// `example.com`, `com`. A wildcard starts at its suffix: the `*` label
    /// is never a zone name. Each call returns a fresh iterator.
    pub fn zone_candidates(&self) -> Suffixes<'_> {
        let start = match self {
            Domain::Fqdn(name) => name.as_str(),
            Domain::Wildcard(suffix) => suffix.as_str(),
        };

        Suffixes {
            rest: Some(start).filter(|s| !s.is_empty()),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Fqdn(name) => f.write_str(name),
            Domain::Wildcard(suffix) => write!(f, "*.{}", suffix),
        }
    }
}

impl FromStr for Domain {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Domain::parse(s)
    }
}

impl TryFrom<String> for Domain {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Domain::parse(&value)
    }
}

impl From<Domain> for String {
    fn from(domain: Domain) -> Self {
        domain.dns_name_ascii()
    }
}

/// Iterator over successively shorter DNS suffixes of a name
#[derive(Debug, Clone)]
pub struct Suffixes<'a> {
    rest: Option<&'a str>,
}

impl<'a> Iterator for Suffixes<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let current = self.rest?;
        self.rest = current.split_once('.').map(|(_, tail)| tail);
        Some(current)
    }
}

impl FusedIterator for Suffixes<'_> {}

fn validate_labels(name: &str) -> Result<()> {
    for label in name.split('.') {
        if label.is_empty() {
            return Err(Error::invalid_input(format!(
                "domain name has empty label: {:?}",
                name
            )));
        }

        if label.len() > MAX_LABEL_LEN {
            return Err(Error::invalid_input(format!(
                "domain label too long: {} chars (max {}). Label: {:?}",
                label.len(),
                MAX_LABEL_LEN,
                label
            )));
        }

        // Underscores are allowed for service labels such as `_acme-challenge`
        if !label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::invalid_input(format!(
                "domain label contains invalid characters: {:?}",
                label
            )));
        }

        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::invalid_input(format!(
                "domain label cannot start or end with hyphen: {:?}",
                label
            )));
        }
    }

    Ok(())
}
