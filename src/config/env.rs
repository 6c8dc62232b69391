use super::BuddyConfig;

/// Environment variable whose value could not be parsed; the configured
/// value was kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOverride {
    pub variable: &'static str,
    pub value: String,
}

/// Apply environment overrides on top of file (or default) configuration.
///
/// Names are the usual TeslaMate-stack ones (`DATABASE_HOST`, `MQTT_PORT`,
/// `VIN`, ...); empty values are ignored. This runs before logging is set
/// up, so unparsable values are returned for the caller to report.
pub fn apply_env_overrides(config: &mut BuddyConfig) -> Vec<RejectedOverride> {
    apply_overrides(config, |key| std::env::var(key).ok())
}

/// Same as [`apply_env_overrides`] with an injectable lookup.
pub fn apply_overrides<F>(config: &mut BuddyConfig, lookup: F) -> Vec<RejectedOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
    let mut rejected = Vec::new();

    if let Some(v) = get("DATABASE_HOST") {
        config.database.host = v;
    }
    if let Some(v) = get("DATABASE_USER") {
        config.database.user = v;
    }
    if let Some(v) = get("DATABASE_PASS") {
        config.database.pass = v;
    }
    if let Some(v) = get("DATABASE_NAME") {
        config.database.name = v;
    }
    if let Some(v) = get("DATABASE_PORT") {
        parse_into("DATABASE_PORT", v, &mut config.database.port, &mut rejected);
    }

    if let Some(v) = get("MQTT_HOST") {
        config.mqtt.host = v;
    }
    if let Some(v) = get("MQTT_PORT") {
        parse_into("MQTT_PORT", v, &mut config.mqtt.port, &mut rejected);
    }
    if let Some(v) = get("MQTT_USERNAME") {
        config.mqtt.username = Some(v);
    }
    if let Some(v) = get("MQTT_PASSWORD") {
        config.mqtt.password = Some(v);
    }
    if let Some(v) = get("BASE_TOPIC") {
        config.mqtt.base_topic = v;
    }
    if let Some(v) = get("DISCOVERY_PREFIX") {
        config.mqtt.discovery_prefix = v;
    }

    if let Some(v) = get("VIN") {
        config.vehicle.vin = Some(v);
    }
    if let Some(v) = get("HOME_GEOFENCE") {
        config.vehicle.home_geofence = v;
    }

    if let Some(v) = get("POLL_INTERVAL") {
        parse_into("POLL_INTERVAL", v, &mut config.sync.poll_interval_seconds, &mut rejected);
    }

    if let Some(v) = get("TESLAMATE_URL") {
        config.api.teslamate_url = v;
    }
    if let Some(v) = get("TESLA_API_URL") {
        config.api.tesla_api_url = v;
    }

    if let Some(v) = get("DEBUG") {
        config.debug = v.eq_ignore_ascii_case("true");
    }

    rejected
}

fn parse_into<T: std::str::FromStr>(
    variable: &'static str,
    raw: String,
    target: &mut T,
    rejected: &mut Vec<RejectedOverride>,
) {
    match raw.parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => rejected.push(RejectedOverride {
            variable,
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_overrides_applied() {
        let vars = env(&[
            ("DATABASE_HOST", "postgres.local"),
            ("DATABASE_PORT", "6543"),
            ("MQTT_HOST", "broker"),
            ("VIN", "5YJ3E7EB0KF000001"),
            ("BASE_TOPIC", "teslas"),
            ("POLL_INTERVAL", "12"),
            ("DEBUG", "TRUE"),
        ]);
        let mut config = BuddyConfig::default();
        let rejected = apply_overrides(&mut config, |k| vars.get(k).cloned());

        assert!(rejected.is_empty());
        assert_eq!(config.database.host, "postgres.local");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.mqtt.host, "broker");
        assert_eq!(config.vehicle.vin.as_deref(), Some("5YJ3E7EB0KF000001"));
        assert_eq!(config.mqtt.base_topic, "teslas");
        assert_eq!(config.sync.poll_interval_seconds, 12);
        assert!(config.debug);
    }

    #[test]
    fn test_unparsable_and_empty_values_ignored() {
        let vars = env(&[
            ("MQTT_PORT", "not-a-port"),
            ("POLL_INTERVAL", "-5"),
            ("VIN", ""),
        ]);
        let mut config = BuddyConfig::default();
        let rejected = apply_overrides(&mut config, |k| vars.get(k).cloned());

        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.sync.poll_interval_seconds, 30);
        assert!(config.vehicle.vin.is_none());
        assert_eq!(
            rejected,
            vec![
                RejectedOverride {
                    variable: "MQTT_PORT",
                    value: "not-a-port".to_string(),
                },
                RejectedOverride {
                    variable: "POLL_INTERVAL",
                    value: "-5".to_string(),
                },
            ]
        );
    }
}
