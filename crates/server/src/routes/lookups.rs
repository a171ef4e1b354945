use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use db::models::{region::Region, trade::Trade};
use deployment::Deployment;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

pub async fn list_trades(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Trade>>>, ApiError> {
    let trades = Trade::find_all(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(trades)))
}

pub async fn list_regions(
    State(deployment): State<DeploymentImpl>,
) -> Result<ResponseJson<ApiResponse<Vec<Region>>>, ApiError> {
    let regions = Region::find_all(&deployment.db().pool).await?;
    Ok(ResponseJson(ApiResponse::success(regions)))
}

pub fn router(_deployment: &DeploymentImpl) -> Router<DeploymentImpl> {
    Router::new()
        .route("/trades", get(list_trades))
        .route("/regions", get(list_regions))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};

    use crate::routes::test_support::{deployment, send};

    #[tokio::test]
    async fn seeded_lookups_are_sorted_by_name() {
        let deployment = deployment().await;
        for uri in ["/api/trades", "/api/regions"] {
            let (status, body) = send(&deployment, Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::OK);
            let names: Vec<&str> = body["data"]
                .as_array()
                .unwrap()
                .iter()
                .map(|row| row["name"].as_str().unwrap())
                .collect();
            assert!(!names.is_empty(), "{uri} returned no rows");
            let mut sorted = names.clone();
            sorted.sort();
            assert_eq!(names, sorted);
        }
    }
}
