use cookie::Key;

use crate::auth::signing_key;
use crate::db::Db;
use crate::views::Templates;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub templates: Templates,
    pub key: Key,
}

impl AppState {
    pub fn new(db: Db, secret: &str) -> anyhow::Result<Self> {
        Ok(Self {
            db,
            templates: Templates::new()?,
            key: signing_key(secret),
        })
    }
}
