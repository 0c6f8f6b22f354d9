//! Flat environment variable overrides.
//!
//! Deployments predating the structured `DEPOT_*` configuration set plain
//! variables like `PORT` and `S3_BUCKET`. These are applied on top of the
//! parsed configuration and win over file and `DEPOT_*` values.

use depot_core::config::{AppConfig, CatalogConfig, StorageConfig};

/// Apply flat environment overrides to `config`.
///
/// `var` is the environment lookup; tests pass a map instead of touching
/// process environment.
pub fn apply_flat_env_overrides(
    config: &mut AppConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), String> {
    if let Some(port) = var("PORT") {
        let port: u16 = port
            .parse()
            .map_err(|_| format!("PORT must be a port number, got {port:?}"))?;
        config.server.bind = format!("0.0.0.0:{port}");
    }

    if let Some(origins) = var("CORS_ORIGIN") {
        config.server.cors_origins = origins
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(url) = var("DATABASE_URL") {
        let max_connections = match &config.catalog {
            CatalogConfig::Postgres {
                max_connections, ..
            } => *max_connections,
            CatalogConfig::Sqlite { .. } => 10,
        };
        config.catalog = CatalogConfig::Postgres {
            url,
            max_connections,
        };
    }

    if let Some(bucket) = var("S3_BUCKET") {
        let force_path_style = match var("S3_FORCE_PATH_STYLE") {
            Some(v) => v
                .parse()
                .map_err(|_| format!("S3_FORCE_PATH_STYLE must be true or false, got {v:?}"))?,
            None => match &config.storage {
                StorageConfig::S3 {
                    force_path_style, ..
                } => *force_path_style,
                StorageConfig::Filesystem { .. } => false,
            },
        };
        let existing = match &config.storage {
            StorageConfig::S3 {
                endpoint,
                region,
                prefix,
                access_key_id,
                secret_access_key,
                ..
            } => (
                endpoint.clone(),
                region.clone(),
                prefix.clone(),
                access_key_id.clone(),
                secret_access_key.clone(),
            ),
            StorageConfig::Filesystem { .. } => (None, None, None, None, None),
        };
        config.storage = StorageConfig::S3 {
            bucket,
            endpoint: var("S3_ENDPOINT").or(existing.0),
            region: var("S3_REGION").or(existing.1),
            prefix: var("S3_PREFIX").or(existing.2),
            access_key_id: var("S3_ACCESS_KEY_ID").or(existing.3),
            secret_access_key: var("S3_SECRET_ACCESS_KEY").or(existing.4),
            force_path_style,
        };
    }

    if let Some(hours) = var("VALIDATION_WORKER_INTERVAL_HOURS") {
        config.workers.validation_interval_hours = hours.parse().map_err(|_| {
            format!("VALIDATION_WORKER_INTERVAL_HOURS must be a number, got {hours:?}")
        })?;
    }

    if let Some(days) = var("CLEANUP_RETENTION_DAYS") {
        config.workers.cleanup_retention_days = days
            .parse()
            .map_err(|_| format!("CLEANUP_RETENTION_DAYS must be a number, got {days:?}"))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| v.to_string())
    }

    #[test]
    fn port_override_rewrites_bind() {
        let mut config = AppConfig::for_testing();
        apply_flat_env_overrides(&mut config, lookup(&[("PORT", "9090")])).expect("apply");
        assert_eq!(config.server.bind, "0.0.0.0:9090");
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut config = AppConfig::for_testing();
        let err = apply_flat_env_overrides(&mut config, lookup(&[("PORT", "not-a-port")]));
        assert!(err.is_err());
    }

    #[test]
    fn database_url_switches_to_postgres() {
        let mut config = AppConfig::for_testing();
        apply_flat_env_overrides(
            &mut config,
            lookup(&[("DATABASE_URL", "postgres://db/depot")]),
        )
        .expect("apply");
        match config.catalog {
            CatalogConfig::Postgres {
                url,
                max_connections,
            } => {
                assert_eq!(url, "postgres://db/depot");
                assert_eq!(max_connections, 10);
            }
            _ => panic!("expected postgres catalog"),
        }
    }

    #[test]
    fn s3_bucket_switches_storage_backend() {
        let mut config = AppConfig::for_testing();
        apply_flat_env_overrides(
            &mut config,
            lookup(&[
                ("S3_BUCKET", "mirror"),
                ("S3_ENDPOINT", "http://localhost:9000"),
                ("S3_FORCE_PATH_STYLE", "true"),
            ]),
        )
        .expect("apply");
        match config.storage {
            StorageConfig::S3 {
                bucket,
                endpoint,
                force_path_style,
                ..
            } => {
                assert_eq!(bucket, "mirror");
                assert_eq!(endpoint.as_deref(), Some("http://localhost:9000"));
                assert!(force_path_style);
            }
            _ => panic!("expected s3 storage"),
        }
    }

    #[test]
    fn cors_origins_are_comma_split() {
        let mut config = AppConfig::for_testing();
        apply_flat_env_overrides(
            &mut config,
            lookup(&[("CORS_ORIGIN", "https://a.example, https://b.example")]),
        )
        .expect("apply");
        assert_eq!(
            config.server.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn worker_overrides_parse_numbers() {
        let mut config = AppConfig::for_testing();
        apply_flat_env_overrides(
            &mut config,
            lookup(&[
                ("VALIDATION_WORKER_INTERVAL_HOURS", "6"),
                ("CLEANUP_RETENTION_DAYS", "30"),
            ]),
        )
        .expect("apply");
        assert_eq!(config.workers.validation_interval_hours, 6);
        assert_eq!(config.workers.cleanup_retention_days, 30);
    }
}
