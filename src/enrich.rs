//! Enrichment steps: reverse-DNS hostnames and offline geo lookups.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use hickory_resolver::Resolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use serde_json::{Map, Value};

use crate::normalize::{NormalizeError, NormalizeStep};
use crate::record::LogRecord;
use crate::security::DNS_CACHE_SIZE;

const DEFAULT_IP_FIELDS: &[&str] = &["ip", "client_ip", "source_ip", "remote_addr"];

/// Resolve IP fields to hostnames through reverse DNS.
///
/// Lookups run with a short timeout and results (including misses) are
/// cached; when the cache fills, the older half is evicted. A resolver that
/// cannot be constructed disables the step instead of failing the pipeline.
pub struct HostnameEnricher {
    ip_fields: Vec<String>,
    cache_size: usize,
    cache: HashMap<String, Option<String>>,
    insertion_order: Vec<String>,
    resolver: Option<Resolver>,
}

impl HostnameEnricher {
    pub fn new() -> HostnameEnricher {
        Self::with_config(
            DEFAULT_IP_FIELDS.iter().map(|s| s.to_string()).collect(),
            DNS_CACHE_SIZE,
            Duration::from_millis(500),
        )
    }

    pub fn with_config(
        ip_fields: Vec<String>,
        cache_size: usize,
        timeout: Duration,
    ) -> HostnameEnricher {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|_| (ResolverConfig::default(), ResolverOpts::default()));
        opts.timeout = timeout;
        opts.attempts = 1;
        let resolver = Resolver::new(config, opts).ok();
        if resolver.is_none() {
            tracing::warn!("reverse-DNS resolver unavailable, hostname enrichment disabled");
        }
        HostnameEnricher {
            ip_fields,
            cache_size: cache_size.max(2),
            cache: HashMap::new(),
            insertion_order: Vec::new(),
            resolver,
        }
    }

    fn resolve(&mut self, ip: &str) -> Option<String> {
        if let Some(cached) = self.cache.get(ip) {
            return cached.clone();
        }
        let addr: IpAddr = ip.parse().ok()?;
        let resolver = self.resolver.as_ref()?;

        let hostname = resolver
            .reverse_lookup(addr)
            .ok()
            .and_then(|response| response.iter().next().map(|name| name.to_utf8()));

        if self.cache.len() >= self.cache_size {
            // Evict the older half.
            let cutoff = self.insertion_order.len() / 2;
            for key in self.insertion_order.drain(..cutoff) {
                self.cache.remove(&key);
            }
        }
        self.cache.insert(ip.to_string(), hostname.clone());
        self.insertion_order.push(ip.to_string());
        hostname
    }
}

impl Default for HostnameEnricher {
    fn default() -> Self {
        HostnameEnricher::new()
    }
}

impl NormalizeStep for HostnameEnricher {
    fn name(&self) -> &'static str {
        "hostname_enricher"
    }

    fn normalize(&mut self, mut record: LogRecord) -> Result<LogRecord, NormalizeError> {
        if self.resolver.is_none() {
            return Ok(record);
        }
        for field in self.ip_fields.clone() {
            let Some(Value::String(ip)) = record.structured_data.get(&field) else {
                continue;
            };
            let ip = ip.clone();
            if let Some(hostname) = self.resolve(&ip) {
                record
                    .structured_data
                    .insert(format!("{field}_hostname"), Value::String(hostname));
            }
            break;
        }
        Ok(record)
    }
}

/// Attach country/city/coordinates from an offline JSON database keyed by IP.
/// Without a database the step passes records through unchanged. No network
/// I/O is performed.
pub struct GeoEnricher {
    ip_fields: Vec<String>,
    database: Option<Map<String, Value>>,
}

impl GeoEnricher {
    pub fn new(database_path: Option<&Path>) -> GeoEnricher {
        let database = database_path.and_then(|path| {
            let text = std::fs::read_to_string(path)
                .map_err(|e| {
                    tracing::warn!(path = %path.display(), error = %e, "geo database unreadable");
                    e
                })
                .ok()?;
            match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => Some(map),
                _ => {
                    tracing::warn!(path = %path.display(), "geo database is not a JSON object");
                    None
                }
            }
        });
        GeoEnricher {
            ip_fields: ["ip", "client_ip", "source_ip"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            database,
        }
    }
}

impl NormalizeStep for GeoEnricher {
    fn name(&self) -> &'static str {
        "geo_enricher"
    }

    fn normalize(&mut self, mut record: LogRecord) -> Result<LogRecord, NormalizeError> {
        let Some(database) = &self.database else {
            return Ok(record);
        };
        for field in &self.ip_fields {
            let Some(Value::String(ip)) = record.structured_data.get(field) else {
                continue;
            };
            if let Some(geo) = database.get(ip) {
                record.structured_data.insert("geo".to_string(), geo.clone());
            }
            break;
        }
        Ok(record)
    }
}
