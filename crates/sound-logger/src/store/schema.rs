//! Table DDL and naming rules.
//!
//! Every data table carries the `(id, timestamp, ..., is_sent,
//! is_aggregated)` shape with indexes on `timestamp`, `is_sent`,
//! `is_aggregated` and `(is_sent, is_aggregated)`.

const MEASUREMENT_INDEXES: &str = "    INDEX idx_timestamp (timestamp),\n    \
     INDEX idx_is_sent (is_sent),\n    \
     INDEX idx_is_aggregated (is_aggregated),\n    \
     INDEX idx_is_sent_is_aggregated (is_sent, is_aggregated)";

/// DDL for a plain measurement table: one float value per timestamp.
pub(crate) fn measurement_table_ddl(db: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{db}`.`{table}` (\n    \
         id INT PRIMARY KEY AUTO_INCREMENT,\n    \
         timestamp DATETIME NOT NULL,\n    \
         value FLOAT NOT NULL,\n    \
         is_sent TINYINT NOT NULL DEFAULT 0,\n    \
         is_aggregated TINYINT NOT NULL DEFAULT 0,\n{MEASUREMENT_INDEXES}\n);"
    )
}

/// DDL for the daily Lden table with all component levels and timestamps.
pub(crate) fn lden_table_ddl(db: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{db}`.`{table}` (\n    \
         id INT PRIMARY KEY AUTO_INCREMENT,\n    \
         timestamp DATETIME NOT NULL,\n    \
         lden_ro FLOAT,\n    \
         lden_eu FLOAT,\n    \
         lday_ro FLOAT,\n    \
         timestamp_lday_ro DATETIME,\n    \
         lday_eu FLOAT,\n    \
         levening_ro FLOAT,\n    \
         timestamp_levening_ro DATETIME,\n    \
         levening_eu FLOAT,\n    \
         lnight_ro FLOAT,\n    \
         timestamp_lnight_ro DATETIME,\n    \
         lnight_eu FLOAT,\n    \
         is_sent TINYINT NOT NULL DEFAULT 0,\n    \
         is_aggregated TINYINT NOT NULL DEFAULT 0,\n{MEASUREMENT_INDEXES}\n);"
    )
}

/// DDL for a statistical percentile table.
pub(crate) fn percentile_table_ddl(db: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{db}`.`{table}` (\n    \
         id INT PRIMARY KEY AUTO_INCREMENT,\n    \
         timestamp DATETIME NOT NULL,\n    \
         L5 FLOAT NOT NULL,\n    \
         L10 FLOAT NOT NULL,\n    \
         L50 FLOAT NOT NULL,\n    \
         L90 FLOAT NOT NULL,\n    \
         L95 FLOAT NOT NULL,\n    \
         is_sent TINYINT NOT NULL DEFAULT 0,\n    \
         is_aggregated TINYINT NOT NULL DEFAULT 0,\n{MEASUREMENT_INDEXES}\n);"
    )
}

/// DDL for the connectivity transition log.
pub(crate) fn connectivity_table_ddl(db: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS `{db}`.`{table}` (\n    \
         id INT PRIMARY KEY AUTO_INCREMENT,\n    \
         timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
         event_type VARCHAR(255),\n    \
         status VARCHAR(100),\n    \
         message TEXT,\n    \
         details TEXT,\n    \
         is_sent TINYINT NOT NULL DEFAULT 0,\n    \
         is_aggregated TINYINT NOT NULL DEFAULT 1,\n{MEASUREMENT_INDEXES}\n);"
    )
}

/// Remote time-series granularity hint for a table name.
///
/// Minute-level aggregates map to `minutes`, half-hour and hourly tables to
/// `hours`, everything else (raw 1 Hz and daily tables) to `seconds`.
pub(crate) fn granularity_hint(table: &str) -> &'static str {
    let name = table.to_lowercase();
    if name.contains("1min") || name.contains("5min") {
        "minutes"
    } else if name.contains("30min") || name.contains("1h") {
        "hours"
    } else {
        "seconds"
    }
}
