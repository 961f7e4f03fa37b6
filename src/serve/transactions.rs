use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Serialize;

use super::{
    error::AppError,
    pagination::{PageQuery, PageRequest, PaginatedResponse, Pagination},
    AppState,
};
use crate::transaction::{Address, StoredTransaction};

type ApiResponse<T> = Result<Json<T>, AppError>;

fn parse_address(raw: &str) -> Result<Address, AppError> {
    raw.parse().map_err(|_| {
        AppError::BadRequest("address must match 0x followed by 40 hex digits".to_string())
    })
}

pub async fn transactions_by_value(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> ApiResponse<PaginatedResponse<StoredTransaction>> {
    let request = PageRequest::from_query(&query);
    let (data, total_items) = state
        .store
        .page_by_value(request.limit, request.offset())
        .await?;

    Ok(Json(PaginatedResponse {
        data,
        pagination: Pagination::new(&request, total_items),
    }))
}

pub async fn transactions_for_address(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<PageQuery>,
) -> ApiResponse<PaginatedResponse<StoredTransaction>> {
    let address = parse_address(&address)?;
    let request = PageRequest::from_query(&query);

    let (data, total_items) = state
        .store
        .page_by_address(&address, request.limit, request.offset())
        .await?;

    if total_items == 0 {
        return Err(AppError::NotFound(
            "no transactions found for address".to_string(),
        ));
    }

    Ok(Json(PaginatedResponse {
        data,
        pagination: Pagination::new(&request, total_items),
    }))
}

#[derive(Serialize)]
pub struct CountBody {
    pub count: i64,
}

pub async fn transaction_count_for_address(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> ApiResponse<CountBody> {
    let address = parse_address(&address)?;
    let count = state.store.count_by_address(&address).await?;

    if count == 0 {
        return Err(AppError::NotFound(
            "no transactions found for address".to_string(),
        ));
    }

    Ok(Json(CountBody { count }))
}
