use chrono::Utc;
use phishlens::config::WhoisConfig;
use phishlens::enrichment::{parse_registration_date, YOUNG_DOMAIN_DAYS};
use phishlens::lookup::RegistrationLookup;
use phishlens::whois::{root_domain, WhoisClient};
use std::time::Duration;

/// Live WHOIS probe: prints the creation date and age of each domain given
/// on the command line.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut domains: Vec<String> = std::env::args().skip(1).collect();
    if domains.is_empty() {
        domains = vec!["example.com".to_string(), "github.com".to_string()];
    }

    let client = WhoisClient::new(&WhoisConfig::default(), Duration::from_secs(10))?;

    for domain in &domains {
        println!("\n=== {domain} (registrable root {}) ===", root_domain(domain));

        match client.creation_date(domain).await {
            Ok(Some(raw)) => {
                println!("  Creation date: {raw}");
                match parse_registration_date(&raw) {
                    Some(created) => {
                        let age = (Utc::now() - created).num_days();
                        println!("  Age: {age} days");
                        if age < YOUNG_DOMAIN_DAYS {
                            println!("  Would be flagged as a young domain");
                        }
                    }
                    None => println!("  Date format not recognised"),
                }
            }
            Ok(None) => println!("  No creation date in the WHOIS record"),
            Err(e) => println!("  Lookup failed: {e}"),
        }
    }

    Ok(())
}
