use crate::lookup::{DnsProbe, LookupError, LookupFuture, Resolution};
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;

/// Resolvability probe backed by the system resolver configuration.
pub struct SystemDnsProbe {
    resolver: TokioAsyncResolver,
}

impl SystemDnsProbe {
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
            Ok(conf) => conf,
            Err(e) => {
                log::warn!("Could not read system resolver configuration, using defaults: {e}");
                (ResolverConfig::default(), ResolverOpts::default())
            }
        };
        opts.timeout = timeout;
        opts.attempts = 1;

        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

impl DnsProbe for SystemDnsProbe {
    fn resolve<'a>(&'a self, host: &'a str) -> LookupFuture<'a, Resolution> {
        Box::pin(async move {
            match self.resolver.lookup_ip(host).await {
                Ok(lookup) if lookup.iter().next().is_some() => Ok(Resolution::Resolves),
                Ok(_) => Ok(Resolution::Unresolvable),
                Err(e) => match e.kind() {
                    ResolveErrorKind::NoRecordsFound { .. } => {
                        log::debug!("Domain {host} does not resolve: {e}");
                        Ok(Resolution::Unresolvable)
                    }
                    ResolveErrorKind::Timeout => Err(LookupError::Timeout),
                    _ => Err(LookupError::Unavailable(e.to_string())),
                },
            }
        })
    }
}
