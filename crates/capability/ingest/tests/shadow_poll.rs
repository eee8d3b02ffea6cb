use async_trait::async_trait;
use domain::{DeviceSignal, RelayStates, SignalEnvelope};
use sentinel_control::InMemoryShadowClient;
use sentinel_ingest::{DeviceDirectory, IngestError, ShadowPollSource, SignalHandler};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FixedDirectory(Vec<(String, String)>);

#[async_trait]
impl DeviceDirectory for FixedDirectory {
    async fn registered_devices(&self) -> Vec<(String, String)> {
        self.0.clone()
    }
}

#[derive(Default)]
struct Collector {
    envelopes: Mutex<Vec<SignalEnvelope>>,
}

#[async_trait]
impl SignalHandler for Collector {
    async fn handle_signal(&self, envelope: SignalEnvelope) -> Result<(), IngestError> {
        self.envelopes.lock().expect("lock").push(envelope);
        Ok(())
    }

    async fn broker_status(&self, _connected: bool) {}
}

#[tokio::test]
async fn poll_maps_reported_and_failures() {
    let shadow = Arc::new(InMemoryShadowClient::new());
    shadow.set_reported(
        "pole-1",
        RelayStates {
            relay1: true,
            ..RelayStates::default()
        },
    );
    shadow.set_failing("pole-2", true);
    let directory = Arc::new(FixedDirectory(vec![
        ("tenant-a".to_string(), "pole-1".to_string()),
        ("tenant-a".to_string(), "pole-2".to_string()),
        ("tenant-b".to_string(), "pole-3".to_string()),
    ]));
    let source = ShadowPollSource::new(shadow, directory, Duration::from_secs(60));
    let collector = Collector::default();

    let delivered = source.poll_once(&collector).await;
    // pole-3 has no shadow document at all, which counts as a read failure
    assert_eq!(delivered, 3);

    let envelopes = collector.envelopes.lock().expect("lock");
    assert_eq!(envelopes[0].tenant_id.as_deref(), Some("tenant-a"));
    assert!(matches!(envelopes[0].signal, DeviceSignal::ShadowReported(_)));
    assert!(matches!(
        envelopes[1].signal,
        DeviceSignal::ShadowUnavailable { .. }
    ));
    assert_eq!(envelopes[2].tenant_id.as_deref(), Some("tenant-b"));
}

#[tokio::test]
async fn desired_only_shadow_produces_nothing() {
    use sentinel_control::ShadowClient;
    let shadow = Arc::new(InMemoryShadowClient::new());
    shadow
        .update_desired("pole-1", &RelayStates::default())
        .await
        .expect("desired");
    let directory = Arc::new(FixedDirectory(vec![(
        "tenant-a".to_string(),
        "pole-1".to_string(),
    )]));
    let source = ShadowPollSource::new(shadow, directory, Duration::from_secs(60));
    let collector = Collector::default();
    assert_eq!(source.poll_once(&collector).await, 0);
}
