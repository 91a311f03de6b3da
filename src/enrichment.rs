use crate::email::domain_of;
use crate::flag::{EvidenceFlag, Rule};
use crate::lookup::{
    absorb, bounded, Deadlines, DnsProbe, PageFetcher, RegistrationLookup, Resolution,
};
use base64::prelude::*;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use std::net::IpAddr;
use std::sync::Arc;
use url::Url;

/// Domains registered fewer than this many days ago are flagged.
pub const YOUNG_DOMAIN_DAYS: i64 = 30;

/// Number of distinct links in an email that get a registration-age check.
pub const MAX_EMAIL_LINKS: usize = 3;

pub const RISKY_TLDS: &[&str] = &["tk", "ml", "ga", "cf", "gq", "xyz", "top", "buzz"];

pub const UNRESOLVABLE_EMAIL_DOMAIN: Rule = Rule::new(
    "email_domain_unresolvable",
    2,
    "The domain of the email address has no DNS records, so mail to it cannot be delivered.",
);

pub const YOUNG_DOMAIN: Rule = Rule::new(
    "young_domain",
    2,
    "Scam sites are usually registered shortly before use and abandoned soon after.",
);

const YOUNG_LINK_EXPLANATION: &str =
    "A link in the message points to a domain registered only recently.";

pub const YOUNG_LINKS: [Rule; MAX_EMAIL_LINKS] = [
    Rule::new("young_link_1", 2, YOUNG_LINK_EXPLANATION),
    Rule::new("young_link_2", 2, YOUNG_LINK_EXPLANATION),
    Rule::new("young_link_3", 2, YOUNG_LINK_EXPLANATION),
];

pub const HOMOGRAPH_DOMAIN: Rule = Rule::new(
    "homograph_domain",
    2,
    "Internationalised characters can imitate a well-known domain letter for letter.",
);

pub const RISKY_TLD: Rule = Rule::new(
    "risky_tld",
    1,
    "This top-level domain is cheap or free to register and widely abused.",
);

pub const CREDENTIAL_FORM: Rule = Rule::new(
    "credential_harvesting",
    3,
    "The page asks for login, card or payment details.",
);

pub const HIDDEN_CONTENT: Rule = Rule::new(
    "hidden_content",
    1,
    "Inline frames and base64-embedded resources are used to hide content from filters.",
);

pub const CONTENT_UNAVAILABLE: Rule = Rule::new(
    "content_unavailable",
    2,
    "The page could not be retrieved; phishing pages are often short-lived or block scanners.",
);

const CREDENTIAL_MARKERS: &str = r#"(?i)(type\s*=\s*["']?password|\bpassword\b|\bpasscode\b|\botp\b|one[\s-]time\s+pass|\bcvv\b|card\s*number|credit\s+card|debit\s+card|upi\s+pin|net\s?banking|expiry\s+date|sign\s?in\s+to\s+your|verify\s+your\s+account)"#;

const HIDDEN_MARKERS: &str = r#"(?i)(<iframe\b|data:image/svg\+xml;base64,([a-z0-9+/=]+)|data:[a-z]+/[a-z0-9.+-]+;base64,)"#;

/// Registration-age, resolvability and live-page checks.
pub struct DomainEnricher {
    dns: Arc<dyn DnsProbe>,
    registry: Arc<dyn RegistrationLookup>,
    fetcher: Arc<dyn PageFetcher>,
    deadlines: Deadlines,
    credential_markers: Regex,
    hidden_markers: Regex,
}

impl DomainEnricher {
    pub fn new(
        dns: Arc<dyn DnsProbe>,
        registry: Arc<dyn RegistrationLookup>,
        fetcher: Arc<dyn PageFetcher>,
        deadlines: Deadlines,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            dns,
            registry,
            fetcher,
            deadlines,
            credential_markers: Regex::new(CREDENTIAL_MARKERS)?,
            hidden_markers: Regex::new(HIDDEN_MARKERS)?,
        })
    }

    /// Resolvability of the domain part of `email`.
    pub async fn check_email_domain(&self, email: &str) -> Option<EvidenceFlag> {
        let domain = domain_of(email)?;
        let outcome = bounded(self.deadlines.dns, self.dns.resolve(&domain)).await;

        match absorb("DNS resolution", &domain, outcome)? {
            Resolution::Resolves => None,
            Resolution::Unresolvable => Some(UNRESOLVABLE_EMAIL_DOMAIN.fire(format!(
                "Email domain {domain} does not resolve"
            ))),
        }
    }

    /// Age in whole days of the registration behind `host`, if known.
    /// Address literals have no registration.
    pub async fn domain_age_days(&self, host: &str) -> Option<i64> {
        if is_ip_literal(host) {
            log::debug!("Skipping registration lookup for address {host}");
            return None;
        }
        let outcome = bounded(
            self.deadlines.registration,
            self.registry.creation_date(host),
        )
        .await;
        let raw = absorb("Registration lookup", host, outcome)??;

        let Some(created) = parse_registration_date(&raw) else {
            log::debug!("Unparsable registration date for {host}: '{raw}'");
            return None;
        };

        let age = (Utc::now() - created).num_days();
        if age < 0 {
            log::debug!("Registration date for {host} is in the future: {created}");
            return None;
        }
        Some(age)
    }

    pub async fn check_registration_age(&self, host: &str, rule: &Rule) -> Option<EvidenceFlag> {
        let age = self.domain_age_days(host).await?;
        (age < YOUNG_DOMAIN_DAYS).then(|| {
            rule.fire(format!(
                "Domain {host} was registered only {age} days ago"
            ))
        })
    }

    pub async fn check_url_age(&self, url: &str, rule: &Rule) -> Option<EvidenceFlag> {
        let host = host_of(url)?;
        self.check_registration_age(&host, rule).await
    }

    /// Registration age of up to the first three distinct links, checked
    /// concurrently and reported in discovery order.
    pub async fn check_link_ages(&self, urls: &[String]) -> Vec<EvidenceFlag> {
        let (first, second, third) = tokio::join!(
            self.link_slot(urls, 0),
            self.link_slot(urls, 1),
            self.link_slot(urls, 2),
        );
        [first, second, third].into_iter().flatten().collect()
    }

    async fn link_slot(&self, urls: &[String], slot: usize) -> Option<EvidenceFlag> {
        let url = urls.get(slot)?;
        self.check_url_age(url, &YOUNG_LINKS[slot]).await
    }

    /// Live fetch of a directly submitted URL.
    pub async fn check_page(&self, url: &str) -> Vec<EvidenceFlag> {
        match bounded(self.deadlines.fetch, self.fetcher.fetch(url)).await {
            Ok(body) => self.scan_page(&body),
            Err(e) => {
                log::debug!("Fetch of {url} failed: {e}");
                vec![CONTENT_UNAVAILABLE.fire(format!("Could not retrieve page content: {e}"))]
            }
        }
    }

    pub fn scan_page(&self, body: &str) -> Vec<EvidenceFlag> {
        let mut flags = Vec::new();

        if let Some(m) = self.credential_markers.find(body) {
            flags.push(CREDENTIAL_FORM.fire(format!(
                "Page solicits sensitive details: '{}'",
                m.as_str()
            )));
        }

        let mut markers: Vec<&str> = Vec::new();
        for caps in self.hidden_markers.captures_iter(body) {
            let marker = if caps[0].to_lowercase().starts_with("<iframe") {
                "inline iframe"
            } else if let Some(svg) = caps.get(2) {
                if svg_has_script(svg.as_str()) {
                    "base64 SVG with script"
                } else {
                    "base64 SVG"
                }
            } else {
                "base64 data URI"
            };
            if !markers.contains(&marker) {
                markers.push(marker);
            }
        }
        if !markers.is_empty() {
            flags.push(HIDDEN_CONTENT.fire(format!(
                "Page contains hidden content markers: {}",
                markers.join(", ")
            )));
        }

        flags
    }

    /// Checks for a directly submitted URL, in reporting order: homograph,
    /// risky TLD, registration age, then page content.
    pub async fn check_url(&self, url: &Url) -> Vec<EvidenceFlag> {
        let Some(host) = url.host_str() else {
            return Vec::new();
        };

        let mut flags = Vec::new();
        flags.extend(check_homograph(host));
        flags.extend(check_tld(host));

        let (age, page) = tokio::join!(
            self.check_registration_age(host, &YOUNG_DOMAIN),
            self.check_page(url.as_str()),
        );
        flags.extend(age);
        flags.extend(page);
        flags
    }
}

pub fn is_ip_literal(host: &str) -> bool {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .is_ok()
}

fn svg_has_script(encoded: &str) -> bool {
    BASE64_STANDARD
        .decode(encoded)
        .map(|bytes| {
            let svg = String::from_utf8_lossy(&bytes).to_lowercase();
            svg.contains("<script") || svg.contains("onload=")
        })
        .unwrap_or(false)
}

pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
        .filter(|h| !h.is_empty())
}

/// Punycode labels or raw non-ASCII characters in the hostname.
pub fn check_homograph(host: &str) -> Option<EvidenceFlag> {
    let lower = host.to_lowercase();
    let punycode = lower.split('.').any(|label| label.starts_with("xn--"));

    (punycode || !host.is_ascii()).then(|| {
        HOMOGRAPH_DOMAIN.fire(format!(
            "Hostname {host} uses internationalised characters (possible homograph attack)"
        ))
    })
}

pub fn check_tld(host: &str) -> Option<EvidenceFlag> {
    let tld = host.trim_end_matches('.').rsplit('.').next()?.to_lowercase();
    RISKY_TLDS
        .contains(&tld.as_str())
        .then(|| RISKY_TLD.fire(format!("Hostname uses the high-abuse .{tld} domain")))
}

/// Parses the creation date formats seen in WHOIS records.
pub fn parse_registration_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const DATE_TIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%SZ",
        "%Y-%m-%dT%H:%M:%S%.fZ",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y.%m.%d %H:%M:%S",
        "%d.%m.%Y %H:%M:%S",
    ];
    for format in DATE_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc());
        }
    }

    // Records such as "2024-03-01 (YYYY-MM-DD)" carry trailing notes.
    let date_part = raw.split_whitespace().next().unwrap_or(raw);
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%d-%b-%Y", "%d-%m-%Y", "%Y.%m.%d", "%d.%m.%Y", "%Y/%m/%d", "%d/%m/%Y",
    ];
    DATE_FORMATS.iter().find_map(|format| {
        NaiveDate::parse_from_str(date_part, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
    })
}
