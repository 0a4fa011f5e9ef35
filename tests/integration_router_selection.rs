//! S1-S3: routing selects the only eligible connector, prefers a Preferred
//! connector over a merely Eligible one, and queues a message when every
//! candidate is ineligible or down.

use std::sync::Arc;

use bearerbox::message::Sms;
use bearerbox::queue::Queue;
use bearerbox::router::{rout, RouteOutcome};
use bearerbox::smsc::mock::MockDriver;
use bearerbox::smsc::{ConnStatus, ConnectorPool, RouteConfig, SmscConn};

fn sms_to(receiver: &str) -> Sms {
    Sms {
        receiver: Some(receiver.as_bytes().to_vec()),
        ..Default::default()
    }
}

async fn active_connector(id: &str, route: RouteConfig) -> Arc<SmscConn> {
    let conn = Arc::new(SmscConn::new(id, route, Arc::new(MockDriver::new(id, true))));
    conn.set_status(ConnStatus::Active);
    conn
}

#[tokio::test]
async fn s1_routes_to_the_only_eligible_connector() {
    let pool = ConnectorPool::new(Queue::new());
    let only = active_connector(
        "only",
        RouteConfig {
            allowed_prefixes: vec!["44".into()],
            ..Default::default()
        },
    )
    .await;
    pool.add(only).await.unwrap();

    let outcome = rout(&pool, &sms_to("44123")).await.unwrap();
    assert_eq!(outcome, RouteOutcome::Dispatched("only".to_string()));
}

#[tokio::test]
async fn s2_preferred_connector_wins_over_merely_eligible() {
    let pool = ConnectorPool::new(Queue::new());
    let eligible = active_connector("eligible", RouteConfig::default()).await;
    pool.add(eligible).await.unwrap();

    let preferred = active_connector(
        "preferred",
        RouteConfig {
            preferred_prefixes: vec!["44".into()],
            ..Default::default()
        },
    )
    .await;
    // Bias load heavily against the preferred connector: it must still win
    // because Preferred strictly outranks Eligible regardless of load.
    preferred.queued.set(1_000_000);
    pool.add(preferred).await.unwrap();

    let outcome = rout(&pool, &sms_to("44999")).await.unwrap();
    assert_eq!(outcome, RouteOutcome::Dispatched("preferred".to_string()));
}

#[tokio::test]
async fn s3_all_candidates_ineligible_or_down_queues_the_message() {
    let pool = ConnectorPool::new(Queue::new());
    let wrong_prefix = active_connector(
        "wrong-prefix",
        RouteConfig {
            allowed_prefixes: vec!["99".into()],
            ..Default::default()
        },
    )
    .await;
    pool.add(wrong_prefix).await.unwrap();

    let down = Arc::new(SmscConn::new(
        "down",
        // Denied for every prefix the test sends, so it stays NotEligible
        // even once the mock driver reports itself connected.
        RouteConfig {
            denied_prefixes: vec!["4".into()],
            ..Default::default()
        },
        Arc::new(MockDriver::new("down", true)),
    ));
    pool.add(down).await.unwrap();

    let outcome = rout(&pool, &sms_to("44123")).await.unwrap();
    assert_eq!(outcome, RouteOutcome::Queued);
}
