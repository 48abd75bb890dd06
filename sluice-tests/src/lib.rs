mod driver;
mod fixtures;

pub use driver::*;
pub use fixtures::*;

use log::LevelFilter;
use sluice::{Database, MaterializerCache};
use std::{env, sync::Arc};

pub fn init_logs() {
    let mut logger = env_logger::builder();
    logger
        .is_test(true)
        .format_file(true)
        .format_line_number(true);
    if env::var("RUST_LOG").is_err() {
        logger.filter_level(LevelFilter::Warn);
    }
    let _ = logger.try_init();
}

pub const TEST_URL: &str = "mssql://sa@localhost:1433/sluice_test";

/// Database over `driver` with its own materializer cache.
pub fn database(driver: &ScriptedDriver) -> Database<ScriptedDriver> {
    Database::new(driver.clone(), TEST_URL)
        .expect("The test url is valid")
        .with_materializers(Arc::new(MaterializerCache::new()))
}
