// state module: AppState, initialization, and re-exports of submodules.

use anyhow::Result;
use mongodb::{Client, Collection};
use serde::{Deserialize, Serialize};
use std::env;

use crate::models::{AuthToken, Bill, Gr, Spill, TechnicalSanction, Tender, User, Work};

mod bills;
mod grs;
mod sanctions;
mod seed;
mod status;
mod tenders;
mod users;
mod works;

pub use bills::*;
pub use grs::*;
pub use sanctions::*;
pub use status::*;
pub use tenders::*;
pub use users::*;
pub use works::*;

pub const ACCESS_TTL_SECONDS: u64 = 60 * 60; // 1 hour
pub const REFRESH_TTL_SECONDS: u64 = 60 * 60 * 24 * 7; // 7 days
pub const APPROVAL_TTL_SECONDS: u64 = 60 * 60 * 24 * 7; // 7 days

/// Which data partition a request operates on. Threaded explicitly into
/// every read and write so the demo sandbox shares one implementation with
/// production instead of a duplicated endpoint set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    Production,
    Demo,
}

impl Scope {
    pub fn is_demo(self) -> bool {
        matches!(self, Scope::Demo)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub users: Collection<User>,
    pub tokens: Collection<AuthToken>,
    pub grs: Collection<Gr>,
    pub works: Collection<Work>,
    pub spills: Collection<Spill>,
    pub sanctions: Collection<TechnicalSanction>,
    pub tenders: Collection<Tender>,
    pub bills: Collection<Bill>,
}

pub async fn init_state() -> Result<AppState> {
    let uri = env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
    let db_name = env::var("MONGODB_DB").unwrap_or_else(|_| "nirman".to_string());

    let client = Client::with_uri_str(uri).await?;
    let db = client.database(&db_name);

    seed::ensure_collections(&db).await?;

    let state = AppState {
        users: db.collection::<User>("users"),
        tokens: db.collection::<AuthToken>("tokens"),
        grs: db.collection::<Gr>("grs"),
        works: db.collection::<Work>("works"),
        spills: db.collection::<Spill>("spills"),
        sanctions: db.collection::<TechnicalSanction>("technical_sanctions"),
        tenders: db.collection::<Tender>("tenders"),
        bills: db.collection::<Bill>("bills"),
    };

    // Only seed the demo sandbox, and only when it is empty.
    if seed::is_demo_partition_empty(&state).await? {
        seed::seed_demo_data(&state).await?;
    }

    Ok(state)
}
