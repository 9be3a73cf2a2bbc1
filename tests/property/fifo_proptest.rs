//! Property-based tests for per-entity ordering

use crate::common::{booking, fast_config, memory_context};
use booking_sync::shared::OperationKind;
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashMap;

const ENTITIES: [&str; 3] = ["B1", "B2", "B3"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn test_offline_writes_apply_in_entity_order(
        writes in prop::collection::vec((0..ENTITIES.len(), 0..10_000i64), 1..24)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let ctx = memory_context(fast_config()).await;
            for id in ENTITIES {
                ctx.remote.seed(booking(id), serde_json::Map::new()).await;
            }
            ctx.go_offline().await;

            for (seq, (entity, value)) in writes.iter().enumerate() {
                ctx.manager
                    .perform(
                        OperationKind::Update,
                        "bookings",
                        ENTITIES[*entity],
                        json!({ "seq": seq, "value": value }),
                    )
                    .await
                    .unwrap();
            }

            ctx.remote.set_online(true).await;
            let report = ctx.manager.sync().await.unwrap();

            assert_eq!(report.succeeded as usize, writes.len());
            assert_eq!(ctx.manager.queue().count().await.unwrap(), 0);

            // Per entity, the remote saw writes in the order they were made
            let mut last_seq: HashMap<String, u64> = HashMap::new();
            for mutation in ctx.remote.applied().await {
                let seq = mutation.payload["seq"].as_u64().unwrap();
                if let Some(previous) = last_seq.insert(mutation.entity.entity_id.clone(), seq) {
                    assert!(previous < seq, "{} applied out of order", mutation.entity);
                }
            }

            // Last write wins on every entity
            for (index, id) in ENTITIES.iter().enumerate() {
                let expected = writes.iter().rev().find(|(entity, _)| *entity == index);
                let document = ctx.remote.document(&booking(id)).await.unwrap();
                match expected {
                    Some((_, value)) => assert_eq!(document.fields["value"], json!(value)),
                    None => assert!(document.fields.get("value").is_none()),
                }
            }
        });
    }

    #[test]
    fn test_direct_and_queued_writes_keep_entity_order(
        writes in prop::collection::vec((0..ENTITIES.len(), any::<bool>()), 1..24)
    ) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let ctx = memory_context(fast_config()).await;
            for id in ENTITIES {
                ctx.remote.seed(booking(id), serde_json::Map::new()).await;
            }

            // The store comes and goes while the monitor keeps reporting online
            for (seq, (entity, reachable)) in writes.iter().enumerate() {
                ctx.remote.set_online(*reachable).await;
                ctx.manager
                    .perform(OperationKind::Update, "bookings", ENTITIES[*entity], json!({ "seq": seq }))
                    .await
                    .unwrap();
            }

            ctx.remote.set_online(true).await;
            ctx.manager.sync().await.unwrap();
            assert_eq!(ctx.manager.queue().count().await.unwrap(), 0);

            let mut last_seq: HashMap<String, u64> = HashMap::new();
            for mutation in ctx.remote.applied().await {
                let seq = mutation.payload["seq"].as_u64().unwrap();
                if let Some(previous) = last_seq.insert(mutation.entity.entity_id.clone(), seq) {
                    assert!(previous < seq, "{} applied out of order", mutation.entity);
                }
            }
            for (index, id) in ENTITIES.iter().enumerate() {
                if let Some(seq) = writes.iter().rposition(|(entity, _)| *entity == index) {
                    let document = ctx.remote.document(&booking(id)).await.unwrap();
                    assert_eq!(document.fields["seq"], json!(seq));
                }
            }
        });
    }
}
