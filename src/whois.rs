use crate::config::WhoisConfig;
use crate::lookup::{LookupError, LookupFuture, RegistrationLookup};
use regex::Regex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const TWO_PART_TLDS: &[&str] = &[
    "co.uk", "com.au", "co.jp", "co.kr", "com.br", "co.za", "com.mx", "co.in", "com.sg", "co.nz",
    "com.ar", "co.il", "org.uk", "net.au", "gov.uk", "ac.uk", "edu.au", "org.in", "net.in",
    "gov.in",
];

const CREATION_PATTERNS: &[&str] = &[
    r"(?im)^\s*creation\s*date[:\s]+([^\r\n]+)",
    r"(?im)^\s*created\s*on[:\s]+([^\r\n]+)",
    r"(?im)^\s*registered\s*on[:\s]+([^\r\n]+)",
    r"(?im)^\s*registration\s*(date|time)[:\s]+([^\r\n]+)",
    r"(?im)^\s*domain\s*created[:\s]+([^\r\n]+)",
    r"(?im)^\s*domain_date_created[:\s]+([^\r\n]+)",
    r"(?im)^\s*create_date[:\s]+([^\r\n]+)",
    r"(?im)^\s*created_date[:\s]+([^\r\n]+)",
    r"(?im)^\s*created[:\s]+([^\r\n]+)",
    r"(?im)^\s*registered[:\s]+([^\r\n]+)",
];

/// Primary, one referral and two fallbacks share the lookup deadline.
const QUERY_SLOTS: u32 = 4;

/// Registration lookup over the plain-text WHOIS protocol (TCP port 43).
#[derive(Debug)]
pub struct WhoisClient {
    query_timeout: Duration,
    fallback_servers: Vec<String>,
    creation_patterns: Vec<Regex>,
    referral: Regex,
    servers: HashMap<&'static str, &'static str>,
}

impl WhoisClient {
    pub fn new(config: &WhoisConfig, timeout: Duration) -> Result<Self, regex::Error> {
        let creation_patterns = CREATION_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            query_timeout: timeout / QUERY_SLOTS,
            fallback_servers: config.fallback_servers.clone(),
            creation_patterns,
            referral: Regex::new(r"(?im)^\s*(refer|whois\s*server)\s*:\s*(\S+)")?,
            servers: HashMap::from([
                ("com", "whois.verisign-grs.com"),
                ("net", "whois.verisign-grs.com"),
                ("org", "whois.pir.org"),
                ("info", "whois.afilias.net"),
                ("biz", "whois.neulevel.biz"),
                ("us", "whois.nic.us"),
                ("uk", "whois.nic.uk"),
                ("in", "whois.registry.in"),
                ("de", "whois.denic.de"),
                ("fr", "whois.afnic.fr"),
                ("it", "whois.nic.it"),
                ("nl", "whois.domain-registry.nl"),
                ("au", "whois.auda.org.au"),
                ("ca", "whois.cira.ca"),
                ("jp", "whois.jprs.jp"),
                ("ru", "whois.tcinet.ru"),
                ("br", "whois.registro.br"),
                ("xyz", "whois.nic.xyz"),
                ("top", "whois.nic.top"),
                ("tk", "whois.dot.tk"),
                ("ml", "whois.dot.ml"),
                ("ga", "whois.dot.ga"),
                ("cf", "whois.dot.cf"),
            ]),
        })
    }

    fn server_for(&self, domain: &str) -> String {
        let tld = domain.rsplit('.').next().unwrap_or(domain);
        self.servers
            .get(tld)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "whois.iana.org".to_string())
    }

    /// One connect, write and read exchange, bounded as a whole by the
    /// per-query share of the lookup deadline.
    async fn query(&self, server: &str, domain: &str) -> Result<String, LookupError> {
        let addr = if server.contains(':') {
            server.to_string()
        } else {
            format!("{server}:43")
        };
        log::debug!("Querying WHOIS server {addr} for {domain}");

        let response = timeout(self.query_timeout, exchange(&addr, domain))
            .await
            .map_err(|_| LookupError::Timeout)?
            .map_err(|e| LookupError::Unavailable(format!("{server}: {e}")))?;

        if response.is_empty() {
            return Err(LookupError::Malformed(format!(
                "empty WHOIS response from {server}"
            )));
        }

        Ok(String::from_utf8_lossy(&response).into_owned())
    }

    /// Queries the registry for `domain`, following one referral and then the
    /// configured fallback servers.
    async fn lookup(&self, domain: &str) -> Result<Option<String>, LookupError> {
        let primary = self.server_for(domain);
        let mut last_error = None;

        match self.query(&primary, domain).await {
            Ok(text) => {
                if let Some(date) = self.extract_creation_date(&text) {
                    return Ok(Some(date));
                }
                if let Some(referral) = self.referral_server(&text, &primary) {
                    log::debug!("WHOIS {primary} referred {domain} to {referral}");
                    match self.query(&referral, domain).await {
                        Ok(text) => return Ok(self.extract_creation_date(&text)),
                        Err(e) => last_error = Some(e),
                    }
                } else {
                    return Ok(None);
                }
            }
            Err(e) => {
                log::debug!("WHOIS query to {primary} failed: {e}");
                last_error = Some(e);
            }
        }

        for server in self.fallback_servers.iter().filter(|s| **s != primary) {
            match self.query(server, domain).await {
                Ok(text) => {
                    if let Some(date) = self.extract_creation_date(&text) {
                        return Ok(Some(date));
                    }
                }
                Err(e) => {
                    log::debug!("Fallback WHOIS server {server} failed: {e}");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    pub fn extract_creation_date(&self, text: &str) -> Option<String> {
        self.creation_patterns.iter().find_map(|regex| {
            regex
                .captures(text)
                .and_then(|caps| caps.iter().skip(1).flatten().last())
                .map(|m| m.as_str().trim().to_string())
                .filter(|date| !date.is_empty())
        })
    }

    fn referral_server(&self, text: &str, current: &str) -> Option<String> {
        self.referral
            .captures(text)
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str().trim().to_lowercase())
            .filter(|server| server != current && !server.is_empty())
    }
}

async fn exchange(addr: &str, domain: &str) -> std::io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(format!("{domain}\r\n").as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(response)
}

impl RegistrationLookup for WhoisClient {
    fn creation_date<'a>(&'a self, domain: &'a str) -> LookupFuture<'a, Option<String>> {
        Box::pin(async move {
            let root = root_domain(domain);
            if root.is_empty() || !root.contains('.') || domain.parse::<IpAddr>().is_ok() {
                return Err(LookupError::Malformed(format!(
                    "not a registrable domain: {domain}"
                )));
            }
            self.lookup(&root).await
        })
    }
}

/// Registrable root of a hostname (`mail.example.co.uk` -> `example.co.uk`).
pub fn root_domain(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    let parts: Vec<&str> = host.split('.').collect();

    if parts.len() < 2 {
        return host;
    }

    let last_two = format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1]);
    if parts.len() >= 3 && TWO_PART_TLDS.contains(&last_two.as_str()) {
        format!("{}.{}", parts[parts.len() - 3], last_two)
    } else {
        last_two
    }
}
