use std::time::Duration;

use axum::{extract::State, Json};
use rand::{seq::IndexedRandom, Rng};
use serde_json::{json, Value};
use tracing::debug;

use crate::{error::ApiResult, routes::AppState};

const CATEGORIES: [&str; 4] = ["A", "B", "C", "D"];

/// 模拟一个慢速的数据查询接口
pub async fn get_random_data(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    state.shutdown.ensure_ready()?;

    let delay = {
        let min = state.data_delay.min.as_millis() as u64;
        let max = (state.data_delay.max.as_millis() as u64).max(min);
        Duration::from_millis(rand::rng().random_range(min..=max))
    };
    debug!("模拟数据查询延迟 {:?}", delay);
    tokio::time::sleep(delay).await;

    Ok(Json(random_item()))
}

fn random_item() -> Value {
    let mut rng = rand::rng();
    let tag_count = rng.random_range(1..=5);
    let tags: Vec<String> = (0..tag_count).map(|i| format!("tag_{i}")).collect();

    json!({
        "id": rng.random_range(1..=1000),
        "name": format!("Item_{}", rng.random_range(1..=100)),
        "value": rng.random_range(0.0..100.0),
        "timestamp": chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        "metadata": {
            "category": CATEGORIES.choose(&mut rng).copied().unwrap_or("A"),
            "tags": tags,
        },
    })
}
