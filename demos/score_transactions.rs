//! Transaction scoring example
//!
//! This example demonstrates fraud-risk scoring including feature
//! extraction from user history, risk flags, batch scoring, and
//! contribution-based explanations.

use chrono::{Duration, Utc};
use fraud_risk_engine::{InMemoryHistoryStore, ScoreRequest, ScoringEngine};
use std::sync::Arc;

fn main() {
    env_logger::init();

    println!("=== Fraud Risk Engine ===\n");

    // Seed some user history so the extractor has something to work with
    let store = Arc::new(InMemoryHistoryStore::new());
    let now = Utc::now();
    for i in 1..=6 {
        store.record_transaction(
            "USER-12345",
            40.0 + i as f64 * 5.0,
            now - Duration::days(i),
            Some("DEV-HOME"),
        );
    }
    store.set_location_risk("Unknown Region", 0.85);

    let engine = ScoringEngine::new(store);

    // Example 1: Routine transaction on a known device
    println!("1. Scoring a routine transaction");
    let routine = ScoreRequest {
        transaction_id: "TXN-2024-06-12-001".to_string(),
        user_id: "USER-12345".to_string(),
        amount: 55.0,
        location: "Berlin".to_string(),
        device_id: Some("DEV-HOME".to_string()),
        timestamp: Some(now),
        payment_method: Some("card".to_string()),
        merchant_category: Some("groceries".to_string()),
    };

    let result = engine.score(&routine).unwrap();
    println!("   Transaction ID: {}", result.transaction_id);
    println!("   Risk Score: {:.4}", result.risk_score);
    println!("   Risk Level: {}", result.risk_level);
    println!("   Confidence: {:.4}", result.confidence);
    println!("   Flags: {:?}", result.flags);
    println!();

    // Example 2: Large amount from an unseen device at 2am
    println!("2. Scoring a suspicious transaction");
    let suspicious = ScoreRequest {
        transaction_id: "TXN-2024-06-12-002".to_string(),
        user_id: "USER-12345".to_string(),
        amount: 4800.0,
        location: "Unknown Region".to_string(),
        device_id: Some("DEV-NEVER-SEEN".to_string()),
        timestamp: Some(now.date_naive().and_hms_opt(2, 15, 0).unwrap().and_utc()),
        payment_method: Some("card".to_string()),
        merchant_category: None,
    };

    let result = engine.score(&suspicious).unwrap();
    println!("   Risk Score: {:.4}", result.risk_score);
    println!("   Risk Level: {}", result.risk_level);
    println!("   Flags: {:?}", result.flags);
    println!();

    // Example 3: Explanation for the suspicious transaction
    println!("3. Explaining the decision");
    let explanation = engine.explain(&suspicious).unwrap();
    for (i, factor) in explanation.top_factors.iter().enumerate() {
        println!("   {}. {}", i + 1, factor);
    }
    println!();

    // Example 4: Batch scoring with an invalid item in the middle
    println!("4. Batch scoring (one invalid item)");
    let mut invalid = routine.clone();
    invalid.transaction_id = "TXN-2024-06-12-003".to_string();
    invalid.amount = -10.0;
    let mut another = routine.clone();
    another.transaction_id = "TXN-2024-06-12-004".to_string();

    let results = engine.score_batch(&[routine, invalid, another]);
    for result in &results {
        match result {
            Ok(response) => println!(
                "   {} -> {} ({:.4})",
                response.transaction_id, response.risk_level, response.risk_score
            ),
            Err(e) => println!("   error: {}", e),
        }
    }
    println!();

    // Example 5: Audit trail
    println!("5. Audit trail");
    println!("   Records: {}", engine.audit().len());
    println!("   Chain valid: {}", engine.audit().verify());
}
