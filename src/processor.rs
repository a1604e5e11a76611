// Fortuna Lottery - Request processor
use std::sync::Arc;

use log::{error, info};
use serde_json::{json, Value};

use crate::{
    config::Config,
    draw::{DrawEngine, DrawResult},
    error::{LotteryError, LotteryResult},
    gateway::ChainGateway,
    ingest::{IngestReport, Ingestor},
    instruction::LotteryInstruction,
    state::{NewRound, Round},
    store::RoundStore,
    utils::unix_timestamp,
};

/// Status and JSON body returned for a request
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    fn error(e: &LotteryError) -> Self {
        Self {
            status: e.status_code(),
            body: json!({ "error": e.to_string() }),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// Program state handler.
pub struct Processor {
    store: Arc<dyn RoundStore>,
    ingestor: Arc<Ingestor>,
    engine: DrawEngine,
    ticket_price: u64,
    round_duration_secs: i64,
}

impl Processor {
    pub fn new(config: &Config, store: Arc<dyn RoundStore>, gateway: Arc<dyn ChainGateway>) -> LotteryResult<Self> {
        let settler = config.settler()?.map(Arc::new);
        match &settler {
            Some(settler) => info!("Settlement key loaded, payer {}", settler.payer_address()),
            None => info!("No settlement key configured, refunds and payouts are disabled"),
        }

        let ingestor = Arc::new(Ingestor::new(config, store.clone(), gateway.clone(), settler.clone()));
        let engine = DrawEngine::new(config, store.clone(), gateway, ingestor.clone(), settler);
        Ok(Self {
            store,
            ingestor,
            engine,
            ticket_price: config.ticket_price,
            round_duration_secs: config.round_duration_secs,
        })
    }

    /// Open round 1 if the store holds no round at all
    pub fn bootstrap(&self) -> LotteryResult<Option<Round>> {
        if self.store.latest_round()?.is_some() {
            return Ok(None);
        }
        let round = self.store.open_round(NewRound {
            round_number: 1,
            jackpot_amount: 0,
            draw_time: unix_timestamp() + self.round_duration_secs,
            ticket_price: self.ticket_price,
        })?;
        info!("Bootstrapped round {}, draws at {}", round.round_number, round.draw_time);
        Ok(Some(round))
    }

    /// Run one request, turning every failure into an error envelope
    pub async fn process(&self, instruction: LotteryInstruction) -> Response {
        info!("Instruction: {}", instruction.name());
        let response = match instruction {
            LotteryInstruction::ProcessDeposits => self
                .process_deposits()
                .await
                .map(|report| Response::ok(json!(report))),
            LotteryInstruction::Draw { secret } => self
                .process_draw(&secret)
                .await
                .map(|result| Response::ok(json!(result))),
        };
        response.unwrap_or_else(|e| {
            error!("Request failed: {}", e);
            Response::error(&e)
        })
    }

    pub async fn process_deposits(&self) -> LotteryResult<IngestReport> {
        self.ingestor.ingest().await
    }

    pub async fn process_draw(&self, secret: &str) -> LotteryResult<DrawResult> {
        self.engine.draw(secret).await
    }
}
