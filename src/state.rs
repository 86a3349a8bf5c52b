use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::geocode::ReverseGeocoder;
use crate::storage::ObjectStore;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub storage: Arc<dyn ObjectStore>,
    pub geocoder: Arc<ReverseGeocoder>,
}
