use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub kafka_bootstrap_servers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub kafka_auto_offset_reset: String,
    pub kafka_sasl_mechanism: String,
    pub kafka_username: String,
    pub kafka_password: String,
    pub kafka_security_protocol: String,
    pub kafka_max_retries: u32,
    pub kafka_circuit_breaker_cooldown: u64,
    pub database_url: String,
    pub db_max_connections: u32,
    pub trip_change_channel: String,
    pub log_level: String,
    pub monitor: MonitorSettings,
}

/// Tunables for stop detection, geofencing and store access.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorSettings {
    /// Completion radius for live telemetry and long-stop evaluation.
    pub live_radius_km: f64,
    /// Relaxed radius used when reconstructing completion from history.
    pub backfill_radius_km: f64,
    pub long_stop_minutes: i64,
    pub store_timeout: Duration,
    /// A vehicle worker with no samples for this long is shut down.
    pub vehicle_idle: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            live_radius_km: 1.0,
            backfill_radius_km: 5.0,
            long_stop_minutes: 5,
            store_timeout: Duration::from_millis(5000),
            vehicle_idle: Duration::from_secs(600),
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let kafka_bootstrap_servers = var_or("KAFKA_BOOTSTRAP_SERVERS", "localhost:9092");
        let kafka_topic = var_or("KAFKA_TOPIC", "vehicle-telemetry");
        let kafka_group_id = var_or("KAFKA_GROUP_ID", "trip-monitor");
        let kafka_auto_offset_reset = var_or("KAFKA_AUTO_OFFSET_RESET", "latest");
        let kafka_sasl_mechanism = var_or("KAFKA_SASL_MECHANISM", "SCRAM-SHA-256");
        let kafka_username = env::var("KAFKA_USERNAME").unwrap_or_default();
        let kafka_password = env::var("KAFKA_PASSWORD").unwrap_or_default();
        let kafka_security_protocol = var_or("KAFKA_SECURITY_PROTOCOL", "SASL_PLAINTEXT");
        let kafka_max_retries = parsed_or("KAFKA_MAX_RETRIES", 5);
        let kafka_circuit_breaker_cooldown = parsed_or("KAFKA_CIRCUIT_BREAKER_COOLDOWN", 300);

        let db_host = var_or("DB_HOST", "localhost");
        let db_port = var_or("DB_PORT", "5432");
        let db_name = var_or("DB_DATABASE", "fleet");
        let db_user = var_or("DB_USER", "fleet");
        let db_pwd = var_or("DB_PWD", "fleet");

        let database_url = format!(
            "postgres://{}:{}@{}:{}/{}",
            db_user, db_pwd, db_host, db_port, db_name
        );
        let db_max_connections = parsed_or("DB_MAX_CONNECTIONS", 50);

        let trip_change_channel = var_or("TRIP_CHANGE_CHANNEL", "trip_changes");
        let log_level = var_or("LOG_LEVEL", "info");

        let defaults = MonitorSettings::default();
        let monitor = MonitorSettings {
            live_radius_km: parsed_or("LIVE_COMPLETION_RADIUS_KM", defaults.live_radius_km),
            backfill_radius_km: parsed_or(
                "BACKFILL_COMPLETION_RADIUS_KM",
                defaults.backfill_radius_km,
            ),
            long_stop_minutes: parsed_or("LONG_STOP_MINUTES", defaults.long_stop_minutes),
            store_timeout: Duration::from_millis(parsed_or("STORE_TIMEOUT_MS", 5000)),
            vehicle_idle: Duration::from_secs(parsed_or("VEHICLE_IDLE_SECS", 600)),
        };

        Ok(Self {
            kafka_bootstrap_servers,
            kafka_topic,
            kafka_group_id,
            kafka_auto_offset_reset,
            kafka_sasl_mechanism,
            kafka_username,
            kafka_password,
            kafka_security_protocol,
            kafka_max_retries,
            kafka_circuit_breaker_cooldown,
            database_url,
            db_max_connections,
            trip_change_channel,
            log_level,
            monitor,
        })
    }
}
