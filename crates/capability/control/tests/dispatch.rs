use domain::RelayStates;
use sentinel_control::{
    ControlError, FallbackPublisher, InMemoryPublisher, InMemoryShadowClient, RelayDispatcher,
    RelayPublisher, ShadowClient,
};
use std::sync::Arc;

fn relays() -> RelayStates {
    RelayStates {
        relay1: true,
        ..RelayStates::default()
    }
}

#[tokio::test]
async fn publish_then_update_desired() {
    let publisher = Arc::new(InMemoryPublisher::new());
    let shadow = Arc::new(InMemoryShadowClient::new());
    let dispatcher = RelayDispatcher::new(publisher.clone(), Some(shadow.clone()));

    let receipt = dispatcher
        .dispatch("tenant-1", "zonex_3", &relays())
        .await
        .expect("dispatch");
    assert!(receipt.shadow_updated);
    assert_eq!(
        publisher.published(),
        vec![("zonex_3/relay/control".to_string(), relays())]
    );
    assert_eq!(shadow.desired("zonex_3"), Some(relays()));
}

#[tokio::test]
async fn shadow_failure_is_not_fatal() {
    let publisher = Arc::new(InMemoryPublisher::new());
    let shadow = Arc::new(InMemoryShadowClient::new());
    shadow.set_failing("zonex_3", true);
    let dispatcher = RelayDispatcher::new(publisher.clone(), Some(shadow));

    let receipt = dispatcher
        .dispatch("tenant-1", "zonex_3", &relays())
        .await
        .expect("dispatch");
    assert!(!receipt.shadow_updated);
    assert_eq!(publisher.published().len(), 1);
}

#[tokio::test]
async fn publish_failure_surfaces() {
    let publisher = Arc::new(InMemoryPublisher::new());
    publisher.set_failing(true);
    let dispatcher = RelayDispatcher::new(publisher, None);
    let result = dispatcher.dispatch("tenant-1", "zonex_3", &relays()).await;
    assert!(matches!(result, Err(ControlError::Publish(_))));
}

#[tokio::test]
async fn fallback_publisher_takes_over() {
    let primary = Arc::new(InMemoryPublisher::named("mqtt"));
    primary.set_failing(true);
    let secondary = Arc::new(InMemoryPublisher::named("data_plane"));
    let publisher = FallbackPublisher::new(primary.clone(), Some(secondary.clone()));

    let channel = publisher
        .publish("zonex_3", &relays())
        .await
        .expect("fallback publish");
    assert_eq!(channel, "data_plane");
    assert!(primary.published().is_empty());
    assert_eq!(secondary.published().len(), 1);
}

#[tokio::test]
async fn receipt_names_channel_that_delivered() {
    let primary = Arc::new(InMemoryPublisher::named("mqtt"));
    let secondary = Arc::new(InMemoryPublisher::named("data_plane"));
    let publisher = Arc::new(FallbackPublisher::new(
        primary.clone(),
        Some(secondary.clone()),
    ));
    let dispatcher = RelayDispatcher::new(publisher, None);

    let receipt = dispatcher
        .dispatch("tenant-1", "zonex_3", &relays())
        .await
        .expect("dispatch");
    assert_eq!(receipt.channel, "mqtt");

    primary.set_failing(true);
    let receipt = dispatcher
        .dispatch("tenant-1", "zonex_3", &relays())
        .await
        .expect("dispatch");
    assert_eq!(receipt.channel, "data_plane");
    assert_eq!(secondary.published().len(), 1);
}

#[tokio::test]
async fn fallback_without_secondary_fails() {
    let primary = Arc::new(InMemoryPublisher::new());
    primary.set_failing(true);
    let publisher = FallbackPublisher::new(primary, None);
    assert!(publisher.publish("zonex_3", &relays()).await.is_err());
}

#[tokio::test]
async fn in_memory_shadow_round_trip() {
    let shadow = InMemoryShadowClient::new();
    assert!(shadow.get_shadow("missing").await.is_err());
    shadow.set_reported("pole-1", relays());
    let document = shadow.get_shadow("pole-1").await.expect("document");
    assert_eq!(document.state.reported, Some(relays()));
}
