//! Load Testing Tool
//!
//! Fires concurrent withdrawals at one in-memory account and checks that the
//! balance never goes negative and agrees with the ledger.
//!
//! Run with: cargo run --bin load_test --release -- --requests 1000 --amount 7.50

use std::sync::Arc;
use std::time::Instant;

use rust_decimal::Decimal;

use bank_ledger::domain::{AccountType, CoreError, NewAccount, OperationContext, TransactionStatus, UserId};
use bank_ledger::handlers::{AccountManager, TransactionCoordinator, TransactionIntent};
use bank_ledger::store::{MemoryStore, Store};

fn arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let requests: u64 = arg(&args, "--requests", 1000);
    let amount: Decimal = arg(&args, "--amount", Decimal::new(750, 2));
    let opening: Decimal = arg(&args, "--balance", Decimal::new(100_000, 2));

    println!(
        "Load Test - {} concurrent withdrawals of {} from a balance of {}",
        requests, amount, opening
    );

    let memory = MemoryStore::new();
    let store: Arc<dyn Store> = Arc::new(memory.clone());
    let accounts = AccountManager::new(store.clone());
    let coordinator = TransactionCoordinator::new(store);

    let user_id = UserId::new();
    let account = accounts
        .open_account(
            user_id,
            NewAccount {
                account_number: "LOAD-0001".to_string(),
                account_holder_name: "Load Test".to_string(),
                bank_name: "Memory Bank".to_string(),
                ifsc_code: "MEM0000001".to_string(),
                account_type: AccountType::Checking,
                opening_balance: opening,
                is_primary: true,
            },
            &OperationContext::new(),
        )
        .await?;

    let start = Instant::now();
    let mut tasks = Vec::with_capacity(requests as usize);
    for _ in 0..requests {
        let coordinator = coordinator.clone();
        let intent = TransactionIntent::new(user_id, account.id, amount.to_string(), "withdrawal");
        tasks.push(tokio::spawn(async move {
            coordinator.execute(intent, &OperationContext::new()).await
        }));
    }

    let mut success_count = 0u64;
    let mut insufficient_count = 0u64;
    let mut error_count = 0u64;
    for task in tasks {
        match task.await? {
            Ok(_) => success_count += 1,
            Err(CoreError::InsufficientFunds { .. }) => insufficient_count += 1,
            Err(e) => {
                error_count += 1;
                eprintln!("Unexpected error: {}", e);
            }
        }
    }
    let elapsed = start.elapsed();

    let final_balance = memory
        .account(account.id)
        .await
        .map(|a| a.balance)
        .ok_or_else(|| anyhow::anyhow!("account {} vanished", account.id))?;

    let withdrawn: Decimal = memory
        .entries()
        .await
        .iter()
        .filter(|e| e.account_id == account.id && e.status == TransactionStatus::Completed)
        .map(|e| e.amount.value())
        .sum();

    println!("\n=== Load Test Results ===");
    println!("Requests: {}", requests);
    println!("Successful: {}", success_count);
    println!("Insufficient funds: {}", insufficient_count);
    println!("Other errors: {}", error_count);
    println!("Final balance: {}", final_balance);
    println!("Time: {:.2}s", elapsed.as_secs_f64());
    println!(
        "Rate: {:.0} requests/sec",
        requests as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
    );

    if final_balance < Decimal::ZERO {
        anyhow::bail!("balance went negative: {}", final_balance);
    }
    if opening - withdrawn != final_balance {
        anyhow::bail!(
            "ledger disagrees with balance: {} - {} != {}",
            opening,
            withdrawn,
            final_balance
        );
    }

    println!("Invariants hold");
    Ok(())
}
