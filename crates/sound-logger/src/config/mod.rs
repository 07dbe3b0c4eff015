mod env;
mod parameters;

pub(crate) use {
    env::EnvConfig,
    parameters::{Parameters, UpdatedParameters},
};

pub(crate) const DEFAULT_RETENTION_DAYS: u32 = 60;
pub(crate) const DEFAULT_DATA_DIR: &str = "data_storage";
pub(crate) const DEFAULT_LOG_DIR: &str = "logs";
pub(crate) const PARAMETERS_PATH: &str = "config/parameters.json";
