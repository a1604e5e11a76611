use std::{env, process::ExitCode, sync::Arc};

use anyhow::{bail, Context};
use fortuna::{
    config::Config,
    gateway::{ChainGateway, RpcGateway},
    instruction::LotteryInstruction,
    processor::Processor,
    server,
    store::{RoundStore, Store},
};

const USAGE: &str = "usage: fortuna [serve | ingest | draw <secret>]";

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("loading configuration")?;
    let store: Arc<dyn RoundStore> = Arc::new(Store::open(&config.store_path)?);
    let gateway: Arc<dyn ChainGateway> = Arc::new(RpcGateway::new(&config.rpc_url, config.rpc_timeout())?);
    let processor = Arc::new(Processor::new(&config, store, gateway)?);
    processor.bootstrap()?;

    let mut args = env::args().skip(1);
    let instruction = match args.next().as_deref() {
        None | Some("serve") => {
            server::serve(processor, &config.bind_addr).await?;
            return Ok(ExitCode::SUCCESS);
        }
        Some("ingest") => LotteryInstruction::ProcessDeposits,
        Some("draw") => LotteryInstruction::Draw {
            secret: args.next().unwrap_or_else(|| config.draw_secret.clone()),
        },
        Some(other) => bail!("unknown command {:?}\n{}", other, USAGE),
    };

    // One-shot mode. The store is opened exclusively, so a scheduler
    // calls the HTTP endpoints instead while a server is running.
    let response = processor.process(instruction).await;
    println!("{}", response.body);
    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
