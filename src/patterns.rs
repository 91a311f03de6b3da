use crate::flag::{EvidenceFlag, Rule, SubjectType};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleGroup {
    Suspicious,
    PhishingTone,
    Credential,
}

/// One row of the text rule table.
#[derive(Debug, Clone, Copy)]
pub struct PatternRule {
    pub rule: Rule,
    pub group: RuleGroup,
    pub applies_to: &'static [SubjectType],
    pub pattern: &'static str,
    pub reason: &'static str,
}

// Rule words start on a word boundary and may carry a plural or verb
// suffix ("OTPs", "testing", "transferred").
const SUSPICIOUS_WORDS: &str =
    r"(?i)\b(fake|sample|specimen|demo|test|dummy|unofficial|for\s+training\s+only|not\s+valid)(s|es|d|ed|ing)?\b";

const PHISHING_TONE: &str = r"(?i)(urgent|immediate(ly)?\s+action|verify\s+your\s+(account|identity)|click\s+here|limited\s+time|act\s+now|reset\s+your\s+password|suspend(ed)?|account\s+(will\s+be\s+)?(locked|blocked|closed)|confirm\s+your\s+(details|account))";

const CREDENTIAL_REQUEST: &str = r"(?i)\b(otp|cvv|account\s+number|card\s+number|upi(\s+pin)?|pay\s+now|transfer|password|ifsc|net\s?banking|kyc)(s|es|d|ed|red|ing|ring)?\b";

pub const RULES: &[PatternRule] = &[
    PatternRule {
        rule: Rule::new(
            "suspicious_text",
            3,
            "Genuine documents rarely describe themselves as samples, demos or fakes.",
        ),
        group: RuleGroup::Suspicious,
        applies_to: &[SubjectType::Document],
        pattern: SUSPICIOUS_WORDS,
        reason: "Document text contains specimen wording",
    },
    PatternRule {
        rule: Rule::new(
            "suspicious_image_text",
            3,
            "Text recognised in the image marks it as a sample, demo or fake.",
        ),
        group: RuleGroup::Suspicious,
        applies_to: &[SubjectType::Image, SubjectType::Unknown],
        pattern: SUSPICIOUS_WORDS,
        reason: "Image text contains specimen wording",
    },
    PatternRule {
        rule: Rule::new(
            "suspicious_plain_text",
            3,
            "The text describes itself as a sample, demo or fake.",
        ),
        group: RuleGroup::Suspicious,
        applies_to: &[SubjectType::Text],
        pattern: SUSPICIOUS_WORDS,
        reason: "Text contains specimen wording",
    },
    PatternRule {
        rule: Rule::new(
            "phishy_text",
            3,
            "Urgency and account threats are common social-engineering levers used to rush victims.",
        ),
        group: RuleGroup::PhishingTone,
        applies_to: &[SubjectType::Text, SubjectType::Email],
        pattern: PHISHING_TONE,
        reason: "Urgent or account-threatening language",
    },
    PatternRule {
        rule: Rule::new(
            "sensitive_request",
            3,
            "Legitimate organisations do not ask for OTPs, PINs, passwords or payments this way.",
        ),
        group: RuleGroup::Credential,
        applies_to: &[SubjectType::Image, SubjectType::Unknown, SubjectType::Text],
        pattern: CREDENTIAL_REQUEST,
        reason: "Request for financial or authentication details",
    },
];

pub const EMAIL_FOUND: Rule = Rule::new(
    "email_found",
    0,
    "An email address appears in the text; shown for reference only.",
);

pub const URL_FOUND: Rule = Rule::new(
    "url_found",
    0,
    "A link appears in the text; shown for reference only.",
);

/// Compiled text rules plus email and URL discovery.
///
/// Built once at startup and shared read-only between requests.
#[derive(Debug)]
pub struct PatternMatcher {
    rules: Vec<(PatternRule, Regex)>,
    email_regex: Regex,
    url_regex: Regex,
}

impl PatternMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        let rules = RULES
            .iter()
            .map(|rule| Ok((*rule, Regex::new(rule.pattern)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            rules,
            email_regex: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")?,
            url_regex: Regex::new(r#"(?i)\bhttps?://[^\s<>"'()\[\]{}]+"#)?,
        })
    }

    /// Runs every rule that applies to `subject` over `text`.
    ///
    /// Each rule contributes at most one flag, built from its first match.
    pub fn match_text(&self, text: &str, subject: SubjectType) -> Vec<EvidenceFlag> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        self.rules
            .iter()
            .filter(|(rule, _)| rule.applies_to.contains(&subject))
            .filter_map(|(rule, regex)| {
                regex.find(text).map(|m| {
                    rule.rule
                        .fire(format!("{}: '{}'", rule.reason, m.as_str().trim()))
                })
            })
            .collect()
    }

    pub fn first_email(&self, text: &str) -> Option<String> {
        self.email_regex
            .find(text)
            .map(|m| m.as_str().trim_end_matches('.').to_string())
    }

    /// Distinct URLs in order of first appearance.
    pub fn urls(&self, text: &str) -> Vec<String> {
        let mut urls: Vec<String> = Vec::new();
        for m in self.url_regex.find_iter(text) {
            let url = m.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
            if !urls.iter().any(|u| u == url) {
                urls.push(url.to_string());
            }
        }
        urls
    }

    pub fn first_url(&self, text: &str) -> Option<String> {
        self.urls(text).into_iter().next()
    }
}

pub fn email_found(email: &str) -> EvidenceFlag {
    EMAIL_FOUND.fire(format!("Email address found: {email}"))
}

pub fn url_found(url: &str) -> EvidenceFlag {
    URL_FOUND.fire(format!("Link found: {url}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(flags: &[EvidenceFlag]) -> Vec<&str> {
        flags.iter().map(|f| f.key()).collect()
    }

    #[test]
    fn test_all_rules_compile() {
        let matcher = PatternMatcher::new().unwrap();
        assert_eq!(matcher.rules.len(), RULES.len());
    }

    #[test]
    fn test_fake_sample_certificate_fires_once() {
        let matcher = PatternMatcher::new().unwrap();
        let flags = matcher.match_text(
            "This is a fake sample certificate",
            SubjectType::Document,
        );

        assert_eq!(keys(&flags), vec!["suspicious_text"]);
        assert_eq!(flags[0].weight(), 3);
        assert!(flags[0].reason().contains("'fake'"));
    }

    #[test]
    fn test_suspicious_key_depends_on_subject() {
        let matcher = PatternMatcher::new().unwrap();
        let text = "DEMO copy";

        assert_eq!(
            keys(&matcher.match_text(text, SubjectType::Image)),
            vec!["suspicious_image_text"]
        );
        assert_eq!(
            keys(&matcher.match_text(text, SubjectType::Unknown)),
            vec!["suspicious_image_text"]
        );
        assert_eq!(
            keys(&matcher.match_text(text, SubjectType::Text)),
            vec!["suspicious_plain_text"]
        );
        assert!(matcher.match_text(text, SubjectType::Email).is_empty());
    }

    #[test]
    fn test_email_gets_tone_but_not_credential_rule() {
        let matcher = PatternMatcher::new().unwrap();
        let text = "URGENT: verify your account and share the OTP";

        assert_eq!(
            keys(&matcher.match_text(text, SubjectType::Email)),
            vec!["phishy_text"]
        );
        assert_eq!(
            keys(&matcher.match_text(text, SubjectType::Text)),
            vec!["phishy_text", "sensitive_request"]
        );
        assert_eq!(
            keys(&matcher.match_text(text, SubjectType::Image)),
            vec!["sensitive_request"]
        );
    }

    #[test]
    fn test_overlapping_rules_both_fire() {
        let matcher = PatternMatcher::new().unwrap();
        // "reset your password" is tone, "password" is credential
        let flags = matcher.match_text("Please reset your password", SubjectType::Text);
        assert_eq!(keys(&flags), vec!["phishy_text", "sensitive_request"]);
    }

    #[test]
    fn test_word_boundaries_avoid_partial_words() {
        let matcher = PatternMatcher::new().unwrap();
        assert!(matcher
            .match_text("The latest contest results", SubjectType::Document)
            .is_empty());
    }

    #[test]
    fn test_plural_and_inflected_forms_fire() {
        let matcher = PatternMatcher::new().unwrap();

        let flags = matcher.match_text("Reply with your passwords and OTPs", SubjectType::Text);
        assert_eq!(keys(&flags), vec!["sensitive_request"]);
        assert!(flags[0].reason().contains("'passwords'"));

        let flags = matcher.match_text("These SAMPLES are for testing", SubjectType::Document);
        assert_eq!(keys(&flags), vec!["suspicious_text"]);
        assert!(flags[0].reason().contains("'SAMPLES'"));

        let flags = matcher.match_text(
            "Funds transferred; confirm the transfers",
            SubjectType::Image,
        );
        assert_eq!(keys(&flags), vec!["sensitive_request"]);
        assert!(flags[0].reason().contains("'transferred'"));

        assert!(matcher
            .match_text("Democracy and testament", SubjectType::Document)
            .is_empty());
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let matcher = PatternMatcher::new().unwrap();
        assert!(matcher.match_text("   ", SubjectType::Text).is_empty());
    }

    #[test]
    fn test_first_email() {
        let matcher = PatternMatcher::new().unwrap();
        assert_eq!(
            matcher.first_email("Write to support@bank-help.com or admin@other.org."),
            Some("support@bank-help.com".to_string())
        );
        assert_eq!(matcher.first_email("no address here"), None);
    }

    #[test]
    fn test_urls_are_distinct_and_trimmed() {
        let matcher = PatternMatcher::new().unwrap();
        let urls = matcher.urls(
            "Go to https://a.example.com/login. Then http://b.example.net, and https://a.example.com/login again",
        );
        assert_eq!(
            urls,
            vec![
                "https://a.example.com/login".to_string(),
                "http://b.example.net".to_string()
            ]
        );
        assert_eq!(
            matcher.first_url("<a href=\"https://x.test/p\">x</a>"),
            Some("https://x.test/p".to_string())
        );
    }

    #[test]
    fn test_informational_flags_have_zero_weight() {
        assert_eq!(email_found("a@b.com").weight(), 0);
        assert_eq!(url_found("https://b.com").weight(), 0);
        assert!(email_found("a@b.com").reason().contains("a@b.com"));
    }
}
