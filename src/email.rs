use crate::flag::{EvidenceFlag, Rule};

pub const RETURN_PATH_MISMATCH: Rule = Rule::new(
    "return_path_mismatch",
    2,
    "Bounces go to a domain that is not part of the visible sender, a common sign of a spoofed From header.",
);

/// Sender headers of a raw message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SenderHeaders {
    pub from: Option<String>,
    pub return_path: Option<String>,
}

/// Reads `From` and `Return-Path` from the header block of a raw message.
///
/// The header block ends at the first empty line. Folded continuation lines
/// are joined onto the header they continue; the first occurrence wins.
pub fn parse_sender_headers(raw: &str) -> SenderHeaders {
    let mut headers = SenderHeaders::default();
    let mut current: Option<(String, String)> = None;

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        store(current.take(), &mut headers);
        current = line
            .split_once(':')
            .map(|(name, value)| (name.trim().to_lowercase(), value.to_string()));
    }
    store(current, &mut headers);

    headers
}

fn store(entry: Option<(String, String)>, headers: &mut SenderHeaders) {
    let Some((name, value)) = entry else {
        return;
    };
    let value = value.trim().to_string();
    match name.as_str() {
        "from" if headers.from.is_none() => headers.from = Some(value),
        "return-path" if headers.return_path.is_none() => headers.return_path = Some(value),
        _ => {}
    }
}

/// Domain part of an address, cleaned of SMTP decoration.
///
/// `"Name <user@Example.com>"` gives `example.com`.
pub fn domain_of(address: &str) -> Option<String> {
    let at_pos = address.rfind('@')?;
    if at_pos == 0 {
        return None;
    }

    let domain = address[at_pos + 1..]
        .split_whitespace()
        .next()?
        .split('>')
        .next()?
        .split(',')
        .next()?
        .split(';')
        .next()?
        .trim()
        .trim_end_matches('.');

    if domain.contains('.')
        && domain.len() < 255
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        Some(domain.to_lowercase())
    } else {
        None
    }
}

/// Fires when the Return-Path domain does not appear in the From header.
///
/// Missing headers, or a Return-Path with no usable domain (`<>`), are not
/// evidence.
pub fn check_return_path(headers: &SenderHeaders) -> Option<EvidenceFlag> {
    let from = headers.from.as_deref()?;
    let return_path = headers.return_path.as_deref()?;
    let bounce_domain = domain_of(return_path)?;

    if from.to_lowercase().contains(&bounce_domain) {
        return None;
    }

    Some(RETURN_PATH_MISMATCH.fire(format!(
        "Return-Path domain {bounce_domain} does not match From header '{from}'"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPOOFED: &str = "From: a@good.com\r\n\
Return-Path: <x@evil.com>\r\n\
Subject: Your account\r\n\
\r\n\
Return-Path: <ignored@body.com>\r\n";

    #[test]
    fn test_parse_sender_headers() {
        let headers = parse_sender_headers(SPOOFED);
        assert_eq!(headers.from.as_deref(), Some("a@good.com"));
        assert_eq!(headers.return_path.as_deref(), Some("<x@evil.com>"));
    }

    #[test]
    fn test_parse_folded_header_and_case() {
        let raw = "FROM: \"Bank Support\"\n <support@bank.example>\nreturn-path: <b@bank.example>\n\nbody";
        let headers = parse_sender_headers(raw);
        assert_eq!(
            headers.from.as_deref(),
            Some("\"Bank Support\" <support@bank.example>")
        );
        assert_eq!(headers.return_path.as_deref(), Some("<b@bank.example>"));
    }

    #[test]
    fn test_mismatch_fires() {
        let flag = check_return_path(&parse_sender_headers(SPOOFED)).unwrap();
        assert_eq!(flag.key(), "return_path_mismatch");
        assert_eq!(flag.weight(), 2);
        assert!(flag.reason().contains("evil.com"));
    }

    #[test]
    fn test_matching_domains_do_not_fire() {
        let headers = SenderHeaders {
            from: Some("Good Co <news@Good.com>".to_string()),
            return_path: Some("<bounce@good.com>".to_string()),
        };
        assert!(check_return_path(&headers).is_none());
    }

    #[test]
    fn test_missing_header_is_not_evidence() {
        let headers = SenderHeaders {
            from: Some("a@good.com".to_string()),
            return_path: None,
        };
        assert!(check_return_path(&headers).is_none());

        let null_sender = SenderHeaders {
            from: Some("a@good.com".to_string()),
            return_path: Some("<>".to_string()),
        };
        assert!(check_return_path(&null_sender).is_none());
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("user@example.com"), Some("example.com".to_string()));
        assert_eq!(
            domain_of("Name <user@Mail.Example.org>"),
            Some("mail.example.org".to_string())
        );
        assert_eq!(
            domain_of("user@sendgrid.net>,body=8bitmime"),
            Some("sendgrid.net".to_string())
        );
        assert_eq!(domain_of("invalid"), None);
        assert_eq!(domain_of("@domain.com"), None);
        assert_eq!(domain_of("user@"), None);
        assert_eq!(domain_of("user@invalid_chars!"), None);
    }
}
