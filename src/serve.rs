mod env;
mod error;
mod pagination;
mod transactions;

use std::{net::SocketAddr, process, sync::Arc};

use anyhow::Result;
use axum::{
    http::{Method, StatusCode},
    routing::get,
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use self::env::APP_CONFIG;
use crate::{
    log,
    store::{TransactionReader, TransactionStore},
};

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn TransactionReader>,
}

pub fn app(store: Arc<dyn TransactionReader>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    Router::new()
        .route("/healthz", get(health))
        .route("/transactions", get(transactions::transactions_by_value))
        .route(
            "/transactions/:address",
            get(transactions::transactions_for_address),
        )
        .route(
            "/transactions/:address/count",
            get(transactions::transaction_count_for_address),
        )
        .with_state(AppState { store })
        .layer(cors)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn start_server() -> Result<()> {
    log::init();

    let store = match TransactionStore::connect(&APP_CONFIG.database_url).await {
        Ok(store) => store,
        Err(err) => {
            error!("failed to connect to database: {}", err);
            process::exit(1);
        }
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], APP_CONFIG.port));
    let app = app(Arc::new(store));

    info!("listening on {}", addr);
    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use axum::{body::Body, http::Request};
    use chrono::{TimeZone, Utc};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::app;
    use crate::store::TransactionReader;
    use crate::transaction::{Address, StoredTransaction};

    const ALICE: &str = "0x71c7656ec7ab88b098defb751b7401b5f6d8976f";
    const BOB: &str = "0x3cd751e6b0078be393132286c442345e5dc49699";
    const CAROL: &str = "0x503828976d22510aad0201ac7ec88293211d23da";
    const NOBODY: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

    /// In-memory reader applying the same filter, order and window semantics
    /// as the SQL paths.
    struct FakeReader {
        rows: Vec<StoredTransaction>,
    }

    fn window(mut rows: Vec<StoredTransaction>, limit: i64, offset: i64) -> Vec<StoredTransaction> {
        let offset = offset.max(0) as usize;
        if offset >= rows.len() {
            return vec![];
        }
        rows.drain(..offset);
        rows.truncate(limit.max(0) as usize);
        rows
    }

    #[async_trait]
    impl TransactionReader for FakeReader {
        async fn page_by_address(
            &self,
            address: &Address,
            limit: i64,
            offset: i64,
        ) -> Result<(Vec<StoredTransaction>, i64)> {
            let mut matching: Vec<StoredTransaction> = self
                .rows
                .iter()
                .filter(|row| {
                    row.from_address == address.as_str() || row.to_address == address.as_str()
                })
                .cloned()
                .collect();
            matching.sort_by(|a, b| {
                (b.block_number, b.tx_index).cmp(&(a.block_number, a.tx_index))
            });
            let total = matching.len() as i64;
            Ok((window(matching, limit, offset), total))
        }

        async fn page_by_value(
            &self,
            limit: i64,
            offset: i64,
        ) -> Result<(Vec<StoredTransaction>, i64)> {
            let mut rows = self.rows.clone();
            rows.sort_by(|a, b| {
                b.value
                    .parse::<u128>()
                    .unwrap()
                    .cmp(&a.value.parse::<u128>().unwrap())
            });
            let total = rows.len() as i64;
            Ok((window(rows, limit, offset), total))
        }

        async fn count_by_address(&self, address: &Address) -> Result<i64> {
            let count = self
                .rows
                .iter()
                .filter(|row| {
                    row.from_address == address.as_str() || row.to_address == address.as_str()
                })
                .count();
            Ok(count as i64)
        }
    }

    struct BrokenReader;

    #[async_trait]
    impl TransactionReader for BrokenReader {
        async fn page_by_address(
            &self,
            _address: &Address,
            _limit: i64,
            _offset: i64,
        ) -> Result<(Vec<StoredTransaction>, i64)> {
            Err(anyhow!("pool timed out"))
        }

        async fn page_by_value(
            &self,
            _limit: i64,
            _offset: i64,
        ) -> Result<(Vec<StoredTransaction>, i64)> {
            Err(anyhow!("pool timed out"))
        }

        async fn count_by_address(&self, _address: &Address) -> Result<i64> {
            Err(anyhow!("pool timed out"))
        }
    }

    fn row(id: i64, block_number: i64, tx_index: i32, from: &str, to: &str, value: u64) -> StoredTransaction {
        StoredTransaction {
            id,
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            status: true,
            block_number,
            tx_index,
            from_address: from.to_string(),
            to_address: to.to_string(),
            value: value.to_string(),
            gas_limit: "21000".to_string(),
            gas_used: "21000".to_string(),
            gas_price: "25000000000".to_string(),
        }
    }

    fn seeded_rows() -> Vec<StoredTransaction> {
        let mut rows = vec![];
        // 25 transfers spread over blocks 100..=112, alice in most of them
        for id in 0..25i64 {
            let (from, to) = match id % 3 {
                0 => (ALICE, BOB),
                1 => (BOB, ALICE),
                _ => (BOB, CAROL),
            };
            rows.push(row(
                id,
                100 + id / 2,
                (id % 2) as i32,
                from,
                to,
                1_000 + (id as u64 * 37) % 500,
            ));
        }
        rows
    }

    async fn get_json(router: axum::Router, uri: &str) -> (u16, Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status().as_u16();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn router() -> axum::Router {
        app(Arc::new(FakeReader { rows: seeded_rows() }))
    }

    #[tokio::test]
    async fn healthz_responds_ok() {
        let (status, _) = get_json(router(), "/healthz").await;
        assert_eq!(status, 200);
    }

    #[tokio::test]
    async fn address_pages_return_only_matching_rows_most_recent_first() {
        let (status, body) = get_json(router(), &format!("/transactions/{}?limit=100", ALICE)).await;
        assert_eq!(status, 200);

        let data = body["data"].as_array().unwrap();
        assert!(!data.is_empty());

        let mut previous: Option<(i64, i64)> = None;
        for tx in data {
            let from = tx["from_address"].as_str().unwrap();
            let to = tx["to_address"].as_str().unwrap();
            assert!(from == ALICE || to == ALICE);

            let position = (
                tx["block_number"].as_i64().unwrap(),
                tx["tx_index"].as_i64().unwrap(),
            );
            if let Some(previous) = previous {
                assert!(position <= previous, "expected descending block position");
            }
            previous = Some(position);
        }

        // every seeded row touching alice is accounted for
        let expected = seeded_rows()
            .iter()
            .filter(|r| r.from_address == ALICE || r.to_address == ALICE)
            .count();
        assert_eq!(body["pagination"]["totalItems"].as_u64().unwrap() as usize, expected);
        assert_eq!(data.len(), expected);
    }

    #[tokio::test]
    async fn value_pages_concatenate_non_increasing() {
        let mut values = vec![];
        for page in 1..=3 {
            let (status, body) =
                get_json(router(), &format!("/transactions?page={}&limit=10", page)).await;
            assert_eq!(status, 200);
            for tx in body["data"].as_array().unwrap() {
                values.push(tx["value"].as_str().unwrap().parse::<u128>().unwrap());
            }
        }

        assert_eq!(values.len(), 25);
        assert!(values.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[tokio::test]
    async fn pagination_envelope_carries_the_arithmetic() {
        let (_, body) = get_json(router(), "/transactions?page=1&limit=10").await;
        let pagination = &body["pagination"];
        assert_eq!(pagination["currentPage"], 1);
        assert_eq!(pagination["pageSize"], 10);
        assert_eq!(pagination["totalItems"], 25);
        assert_eq!(pagination["totalPages"], 3);
        assert_eq!(pagination["hasNext"], true);
        assert_eq!(pagination["hasPrevious"], false);

        let (_, body) = get_json(router(), "/transactions?page=3&limit=10").await;
        let pagination = &body["pagination"];
        assert_eq!(pagination["hasNext"], false);
        assert_eq!(pagination["hasPrevious"], true);
    }

    #[tokio::test]
    async fn malformed_paging_input_falls_back_to_defaults() {
        let (status, body) = get_json(router(), "/transactions?page=banana&limit=wat").await;
        assert_eq!(status, 200);
        assert_eq!(body["pagination"]["currentPage"], 1);
        assert_eq!(body["pagination"]["pageSize"], 10);
    }

    #[tokio::test]
    async fn paging_input_is_clamped() {
        let (_, body) = get_json(router(), "/transactions?page=0&limit=1000").await;
        assert_eq!(body["pagination"]["currentPage"], 1);
        assert_eq!(body["pagination"]["pageSize"], 100);
    }

    #[tokio::test]
    async fn an_extreme_page_returns_a_valid_empty_page() {
        let (status, body) = get_json(
            router(),
            "/transactions?page=9223372036854775807&limit=100",
        )
        .await;
        assert_eq!(status, 200);
        assert!(body["data"].as_array().unwrap().is_empty());
        assert_eq!(body["pagination"]["totalItems"], 25);
        assert_eq!(body["pagination"]["hasNext"], false);
    }

    #[tokio::test]
    async fn a_zero_match_address_page_is_a_404() {
        let (status, body) = get_json(router(), &format!("/transactions/{}", NOBODY)).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "no transactions found for address");
    }

    #[tokio::test]
    async fn a_zero_match_count_is_a_404() {
        let (status, body) = get_json(router(), &format!("/transactions/{}/count", NOBODY)).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "no transactions found for address");
    }

    #[tokio::test]
    async fn a_matching_count_returns_the_count_body() {
        let expected = seeded_rows()
            .iter()
            .filter(|r| r.from_address == CAROL || r.to_address == CAROL)
            .count();
        let (status, body) = get_json(router(), &format!("/transactions/{}/count", CAROL)).await;
        assert_eq!(status, 200);
        assert_eq!(body["count"].as_u64().unwrap() as usize, expected);
    }

    #[tokio::test]
    async fn a_malformed_address_is_a_400() {
        let (status, _) = get_json(router(), "/transactions/0x1234").await;
        assert_eq!(status, 400);

        let (status, _) = get_json(router(), "/transactions/0x1234/count").await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn a_store_failure_is_a_500() {
        let broken = || app(Arc::new(BrokenReader));

        let (status, body) = get_json(broken(), "/transactions").await;
        assert_eq!(status, 500);
        assert_eq!(body["error"], "failed to fetch transactions");

        let (status, _) = get_json(broken(), &format!("/transactions/{}", ALICE)).await;
        assert_eq!(status, 500);

        let (status, _) = get_json(broken(), &format!("/transactions/{}/count", ALICE)).await;
        assert_eq!(status, 500);
    }
}
