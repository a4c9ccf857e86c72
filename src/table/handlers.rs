use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
};
use std::sync::Arc;

use super::layout::TableLayout;
use super::protocol::{
    ClaimRequest, ClaimResponse, ENDPOINT_CLAIM, ENDPOINT_HANDLE, ENDPOINT_PEEK, ENDPOINT_READ,
    ENDPOINT_WRITE, PartitionHandle, PeekResponse, ReadResponse, WriteRequest, WriteResponse,
};
use super::slots::PartitionSlots;

/// Router serving one rank's partition to every other rank.
pub fn partition_router(slots: Arc<PartitionSlots>, layout: TableLayout) -> Router {
    let handle = PartitionHandle {
        rank: slots.rank(),
        capacity: layout.capacity(),
        partitions: layout.partitions(),
        len: slots.len(),
    };

    Router::new()
        .route(ENDPOINT_HANDLE, get(handle_handle))
        .route(ENDPOINT_CLAIM, post(handle_claim))
        .route(&format!("{}/:offset", ENDPOINT_PEEK), get(handle_peek))
        .route(&format!("{}/:offset", ENDPOINT_READ), get(handle_read))
        .route(ENDPOINT_WRITE, post(handle_write))
        .layer(Extension(slots))
        .layer(Extension(handle))
}

async fn handle_handle(
    Extension(handle): Extension<PartitionHandle>,
) -> (StatusCode, Json<PartitionHandle>) {
    (StatusCode::OK, Json(handle))
}

async fn handle_claim(
    Extension(slots): Extension<Arc<PartitionSlots>>,
    Json(req): Json<ClaimRequest>,
) -> (StatusCode, Json<ClaimResponse>) {
    match slots.claim_with_op(&req.op_id, req.offset) {
        Ok(previous) => (StatusCode::OK, Json(ClaimResponse { previous })),
        Err(e) => {
            tracing::error!("Failed to claim slot {}: {}", req.offset, e);
            (StatusCode::BAD_REQUEST, Json(ClaimResponse { previous: 0 }))
        }
    }
}

async fn handle_peek(
    Extension(slots): Extension<Arc<PartitionSlots>>,
    Path(offset): Path<u32>,
) -> (StatusCode, Json<PeekResponse>) {
    match slots.peek(offset) {
        Ok(count) => (StatusCode::OK, Json(PeekResponse { count })),
        Err(e) => {
            tracing::error!("Failed to peek slot {}: {}", offset, e);
            (StatusCode::BAD_REQUEST, Json(PeekResponse { count: 0 }))
        }
    }
}

async fn handle_read(
    Extension(slots): Extension<Arc<PartitionSlots>>,
    Path(offset): Path<u32>,
) -> (StatusCode, Json<ReadResponse>) {
    match slots.read(offset) {
        Ok(record) => (StatusCode::OK, Json(ReadResponse { record })),
        Err(e) => {
            tracing::error!("Failed to read slot {}: {}", offset, e);
            (StatusCode::BAD_REQUEST, Json(ReadResponse { record: None }))
        }
    }
}

async fn handle_write(
    Extension(slots): Extension<Arc<PartitionSlots>>,
    Json(req): Json<WriteRequest>,
) -> (StatusCode, Json<WriteResponse>) {
    match slots.write(req.offset, req.record) {
        Ok(()) => (StatusCode::OK, Json(WriteResponse { success: true })),
        Err(e) => {
            tracing::error!("Failed to write slot {}: {}", req.offset, e);
            (
                StatusCode::BAD_REQUEST,
                Json(WriteResponse { success: false }),
            )
        }
    }
}
