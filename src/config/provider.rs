//! Provider (database endpoint) configuration, including the legacy-shape migration.

use serde::Deserialize;

/// Closed set of supported database engine types. Only `MySQL` is implemented;
/// other tags are reserved so the config schema doesn't need to change when a
/// second engine is added (see Provider capability set in DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Mysql,
    #[serde(other)]
    Reserved,
}

impl Default for ProviderType {
    fn default() -> Self {
        ProviderType::Mysql
    }
}

/// Engine-specific dump knobs, passed through to the Subprocess Adapter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Use the parallel dump tool (mydumper) instead of the classic client (mysqldump).
    pub use_parallel_dump: bool,
    pub single_transaction: bool,
    pub include_routines: bool,
    pub include_events: bool,
    pub include_triggers: bool,
    /// Number of mydumper worker threads (ignored by the classic engine).
    pub threads: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            use_parallel_dump: true,
            single_transaction: true,
            include_routines: true,
            include_events: true,
            include_triggers: true,
            threads: 4,
        }
    }
}

/// One configured database endpoint.
///
/// Deserialized directly from a `[[databases]]` table in the TOML config. A
/// legacy-shaped entry (no explicit `type`) is migrated at load time by
/// [`ProviderConfig::migrate_legacy`]: `type` defaults to MySQL, and a bare
/// `port` of 3306 or 5432 is used only as a hint while `type` is still unset.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub db_type: Option<ProviderType>,
    pub host: String,
    pub port: u16,
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Path to a MySQL `--defaults-file` / `.my.cnf` holding credentials.
    /// When set, credentials are never passed on the command line (§4.1).
    #[serde(default)]
    pub defaults_file: Option<std::path::PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub engine: EngineOptions,
}

fn default_connect_timeout() -> u64 {
    10
}

impl ProviderConfig {
    /// Returns the effective engine type, migrating legacy (type-less) entries.
    ///
    /// Legacy rule: `type` absent ⇒ MySQL. Port is only consulted as a *hint*
    /// when type is absent — it never overrides an explicit `type`.
    pub fn migrate_legacy(&self) -> ProviderType {
        match self.db_type {
            Some(t) => t,
            None => match self.port {
                3306 => ProviderType::Mysql,
                5432 => ProviderType::Reserved,
                _ => ProviderType::Mysql,
            },
        }
    }

    pub fn connection_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/",
            self.username, self.password, self.host, self.port
        )
    }

    pub fn database_url(&self, database: &str) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, database
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(port: u16, db_type: Option<ProviderType>) -> ProviderConfig {
        ProviderConfig {
            name: "orders".into(),
            db_type,
            host: "localhost".into(),
            port,
            username: "root".into(),
            password: String::new(),
            defaults_file: None,
            connect_timeout_secs: 10,
            engine: EngineOptions::default(),
        }
    }

    #[test]
    fn legacy_without_type_defaults_to_mysql() {
        let cfg = base(3306, None);
        assert_eq!(cfg.migrate_legacy(), ProviderType::Mysql);
    }

    #[test]
    fn explicit_type_wins_over_port_hint() {
        let cfg = base(5432, Some(ProviderType::Mysql));
        assert_eq!(cfg.migrate_legacy(), ProviderType::Mysql);
    }

    #[test]
    fn unknown_port_without_type_still_defaults_mysql() {
        let cfg = base(9999, None);
        assert_eq!(cfg.migrate_legacy(), ProviderType::Mysql);
    }
}
