//! End-to-end broadcast run against real storage, with a scripted
//! transport instead of the network.

#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use orenda_bot::bot::broadcast::{
    BroadcastPayload, BroadcastTransport, Broadcaster, DeliveryError, NoProgress,
};
use orenda_bot::storage::{Repository, SqliteRepository};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct ScriptedTransport {
    forbidden: Vec<i64>,
    sent_to: Mutex<Vec<i64>>,
}

#[async_trait]
impl BroadcastTransport for ScriptedTransport {
    async fn deliver(
        &self,
        tg_id: i64,
        _payload: &BroadcastPayload,
    ) -> Result<(), DeliveryError> {
        if self.forbidden.contains(&tg_id) {
            return Err(DeliveryError::Forbidden);
        }
        self.sent_to.lock().unwrap().push(tg_id);
        Ok(())
    }
}

async fn repo_with_users(tg_ids: &[i64]) -> Arc<dyn Repository> {
    let repo = SqliteRepository::in_memory().await.unwrap();
    repo.init_schema().await.unwrap();
    repo.seed_cities().await.unwrap();
    for &tg_id in tg_ids {
        repo.save_user(tg_id, None, Some("user"), None).await.unwrap();
    }
    Arc::new(repo)
}

#[tokio::test]
async fn test_forbidden_recipient_is_flagged_and_run_continues() {
    let repo = repo_with_users(&[10, 20, 30]).await;
    let broadcaster = Broadcaster::with_pacing(repo.clone(), Duration::ZERO, 10);
    let transport = ScriptedTransport {
        forbidden: vec![20],
        sent_to: Mutex::new(Vec::new()),
    };

    let report = broadcaster
        .run(
            "test",
            &BroadcastPayload::Text("привіт!".to_string()),
            10,
            &transport,
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.sent, 2);
    assert_eq!(report.blocked, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(*transport.sent_to.lock().unwrap(), vec![10, 30]);

    // The forbidden user is now excluded from everything
    let user = repo.get_user_by_tg_id(20).await.unwrap().unwrap();
    assert!(user.is_blocked);
    assert_eq!(repo.count_users(true).await.unwrap(), 2);

    let stats = repo.get_admin_stats().await.unwrap();
    assert_eq!(stats.total_unsubscriptions, 1);
}

#[tokio::test]
async fn test_second_run_skips_blocked_user() {
    let repo = repo_with_users(&[10, 20]).await;
    let broadcaster = Broadcaster::with_pacing(repo.clone(), Duration::ZERO, 10);

    let first = ScriptedTransport {
        forbidden: vec![20],
        sent_to: Mutex::new(Vec::new()),
    };
    broadcaster
        .run(
            "one",
            &BroadcastPayload::Text("перше".to_string()),
            10,
            &first,
            &NoProgress,
        )
        .await
        .unwrap();

    let second = ScriptedTransport {
        forbidden: vec![],
        sent_to: Mutex::new(Vec::new()),
    };
    let report = broadcaster
        .run(
            "two",
            &BroadcastPayload::Text("друге".to_string()),
            10,
            &second,
            &NoProgress,
        )
        .await
        .unwrap();

    // User 20 blocked the bot during run one and gets nothing in run two
    assert_eq!(report.total, 1);
    assert_eq!(report.sent, 1);
    assert_eq!(*second.sent_to.lock().unwrap(), vec![10]);
}

#[tokio::test]
async fn test_broadcast_without_recipients() {
    let repo = repo_with_users(&[]).await;
    let broadcaster = Broadcaster::with_pacing(repo, Duration::ZERO, 10);
    let transport = ScriptedTransport {
        forbidden: vec![],
        sent_to: Mutex::new(Vec::new()),
    };

    let report = broadcaster
        .run(
            "empty",
            &BroadcastPayload::Text("нікому".to_string()),
            99,
            &transport,
            &NoProgress,
        )
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert!(report.success_ratio().abs() < f64::EPSILON);
}
