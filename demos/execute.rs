//! Interactive CLI for the transaction engine
//!
//! Run with: cargo run --example execute
//!
//! Requires PRIVATE_KEY and NETWORK_* environment variables (see
//! `NetworkConfig::from_env`). TOKEN and SPENDER select the ERC20 approval
//! used as the demo call.

use std::io::{self, Write};
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use wallet_tx_engine::{
    contracts::IERC20, BatchTransactionRequest, BundlerProvider, ContractCall, EngineConfig,
    EngineContext, ExecutionPreferences, ExecutionResult, ExecutionStage, NetworkConfig,
    Orchestrator, ProgressFn, RpcChainClient, SigningKey, TransactionRequest,
};

type Engine = Orchestrator<RpcChainClient, BundlerProvider>;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let key = SigningKey::from_hex(dotenvy::var("PRIVATE_KEY")?)?;
    let token: Address = dotenvy::var("TOKEN")?.parse()?;
    let spender: Address = dotenvy::var("SPENDER")?.parse()?;

    // Initialize engine
    let config = EngineConfig::from_env()?;
    let network = NetworkConfig::from_env("NETWORK")?;
    let provider = Arc::new(BundlerProvider::new(&config)?);
    let context = Arc::new(EngineContext::new(provider, config.clone()));
    let chain = RpcChainClient::new(key.clone(), &config);
    let engine = Orchestrator::new(chain, key, context)?;

    println!("\n========================================");
    println!("     Wallet Transaction Engine CLI");
    println!("========================================");
    println!("EOA:     {}", engine.eoa_address());
    println!("Network: {} (chain {})", network.id, network.chain_id);
    println!("AA:      {}", network.aa.is_available());

    loop {
        println!("\n----------------------------------------");
        println!("Select an option:");
        println!("  1. Approve (smart account preferred)");
        println!("  2. Approve twice as one batch");
        println!("  3. Approve (force EOA)");
        println!("  4. View identity and quota");
        println!("  q. Quit");
        println!("----------------------------------------");

        print!("Enter choice: ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        match input.trim() {
            "1" => {
                let request = TransactionRequest::new(approve(token, spender, 1), network.clone());
                show(&run_single(&engine, &request).await);
            }
            "2" => {
                let calls = vec![approve(token, spender, 0), approve(token, spender, 1)];
                let request = BatchTransactionRequest::new(calls, network.clone());
                show(&engine.execute_batch(&request).await);
            }
            "3" => {
                let request = TransactionRequest::new(approve(token, spender, 1), network.clone())
                    .with_preferences(ExecutionPreferences::eoa_only());
                show(&run_single(&engine, &request).await);
            }
            "4" => view_info(&engine, &network).await?,
            "q" | "Q" => {
                println!("\nGoodbye!");
                break;
            }
            _ => println!("Invalid choice"),
        }
    }

    Ok(())
}

fn approve(token: Address, spender: Address, amount: u64) -> ContractCall {
    ContractCall::typed(
        token,
        &IERC20::approveCall {
            spender,
            amount: U256::from(amount),
        },
    )
}

async fn run_single(engine: &Engine, request: &TransactionRequest) -> ExecutionResult {
    let progress: &ProgressFn<'_> = &|stage: ExecutionStage| println!("  ... {stage}");
    engine.execute_with_progress(request, Some(progress)).await
}

fn show(result: &ExecutionResult) {
    if result.success {
        println!("\nSuccess via {:?}", result.path_used);
        if let Some(hash) = result.tx_hash {
            println!("Tx hash: {hash}");
        }
        if let Some(url) = &result.explorer_url {
            println!("Explorer: {url}");
        }
    } else if let Some(error) = &result.error {
        println!("\nFailed ({:?}): {}", error.kind, error.message);
    }

    if let Some(batch) = &result.batch {
        println!(
            "Batch: {}/{} completed (atomic: {})",
            batch.completed(),
            batch.total,
            batch.atomic
        );
    }
}

async fn view_info(engine: &Engine, network: &NetworkConfig) -> eyre::Result<()> {
    let identity = engine.identity(network).await;
    let balance = engine.balance(network).await?;
    let quota = &engine.context().quota;

    println!("\nEOA:           {}", identity.eoa_address);
    match identity.smart_account_address {
        Some(address) => println!("Smart account: {address}"),
        None => println!("Smart account: (not initialized)"),
    }
    println!("Linking:       {:?}", identity.linking_state);
    println!("Balance:       {balance} wei");
    println!(
        "Quota:         ${:.4} used, ${:.4} remaining",
        quota.consumed(),
        quota.remaining()
    );
    Ok(())
}
