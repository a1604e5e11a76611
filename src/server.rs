// Fortuna Lottery - HTTP surface
use std::sync::Arc;

use axum::{body::Bytes, extract::State, http::StatusCode, routing::post, Json, Router};
use log::info;
use serde_json::Value;

use crate::{
    error::LotteryResult,
    instruction::LotteryInstruction,
    processor::{Processor, Response},
};

pub fn router(processor: Arc<Processor>) -> Router {
    Router::new()
        .route("/api/process-deposits", post(process_deposits))
        .route("/api/draw", post(draw))
        .with_state(processor)
}

pub async fn serve(processor: Arc<Processor>, bind_addr: &str) -> LotteryResult<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Listening on {}", bind_addr);
    axum::serve(listener, router(processor)).await?;
    Ok(())
}

async fn process_deposits(State(processor): State<Arc<Processor>>) -> (StatusCode, Json<Value>) {
    into_http(processor.process(LotteryInstruction::ProcessDeposits).await)
}

async fn draw(State(processor): State<Arc<Processor>>, body: Bytes) -> (StatusCode, Json<Value>) {
    into_http(processor.process(LotteryInstruction::unpack_draw(&body)).await)
}

fn into_http(response: Response) -> (StatusCode, Json<Value>) {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response.body))
}
