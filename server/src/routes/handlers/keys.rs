use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{error::AppJsonResult, state::KeyPool};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeysResponse {
    pub count: usize,
    pub keys: Vec<String>,
}

impl KeysResponse {
    fn from_pool(key_pool: &KeyPool) -> Self {
        let keys = key_pool.masked_keys();
        Self {
            count: keys.len(),
            keys,
        }
    }
}

/// # GET /api/keys
pub async fn get_keys(State(key_pool): State<KeyPool>) -> AppJsonResult<KeysResponse> {
    Ok(Json(KeysResponse::from_pool(&key_pool)))
}

/// # PUT /api/keys

#[derive(Debug, Deserialize)]
pub struct ConfigureKeysBody {
    pub keys: Vec<String>,
}

pub async fn configure_keys(
    State(key_pool): State<KeyPool>,
    Json(ConfigureKeysBody { keys }): Json<ConfigureKeysBody>,
) -> AppJsonResult<KeysResponse> {
    key_pool.configure_required(keys)?;
    tracing::info!("Key pool reconfigured with {} keys", key_pool.len());

    Ok(Json(KeysResponse::from_pool(&key_pool)))
}
