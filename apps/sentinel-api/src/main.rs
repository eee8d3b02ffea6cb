//! Sentinel HTTP / WebSocket 服务入口。
//!
//! 启动顺序：配置 → 日志 → 存储 → 下发通道 → 状态引擎（加载已注册设备）→ 采集链路 → HTTP。

mod handlers;
mod ingest;
mod middleware;
mod routes;
mod utils;


use sentinel_auth::{Authenticator, JwtManager};
use sentinel_config::AppConfig;
use sentinel_control::{
    FallbackPublisher, HttpDataPlanePublisher, HttpShadowClient, MqttPublisher,
    MqttPublisherConfig, NoopPublisher, RelayDispatcher, RelayPublisher, ShadowClient,
};
use sentinel_ingest::{DeviceSubscriber, MqttSource, MqttSourceConfig, NoopSubscriber};
use sentinel_monitor::{MonitorConfig, MonitorHandle, spawn_monitor};
use sentinel_status::SystemClock;
use sentinel_storage::{
    DeviceStore, GroupStore, InMemoryDeviceStore, InMemoryGroupStore, PgDeviceStore,
    PgGroupStore, connect_pool, run_migrations,
};
use sentinel_telemetry::init_tracing;
use std::sync::Arc;
use tracing::{info, warn};

/// access token 有效期只用于本地签发（测试、运维脚本），校验不依赖它。
const ACCESS_TTL_SECONDS: u64 = 3600;

#[derive(Clone)]
pub struct AppState {
    pub monitor: MonitorHandle,
    pub device_store: Arc<dyn DeviceStore>,
    pub group_store: Arc<dyn GroupStore>,
    /// 未配置 JWT 密钥时为 `None`，改为信任上游网关注入的身份头。
    pub auth: Option<Arc<dyn Authenticator>>,
    /// 每个看板连接的发送缓冲。
    pub connection_buffer: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    let (device_store, group_store) = open_stores(&config).await?;
    let shadow: Option<Arc<dyn ShadowClient>> = config.data_plane_url.as_deref().map(|url| {
        Arc::new(HttpShadowClient::new(url, config.data_plane_token.clone())) as Arc<dyn ShadowClient>
    });
    let publisher = build_publisher(&config);

    let (source, subscriber): (Option<MqttSource>, Arc<dyn DeviceSubscriber>) =
        if config.mqtt_enabled {
            let (source, subscriber) = MqttSource::connect(MqttSourceConfig {
                host: config.mqtt_host.clone(),
                port: config.mqtt_port,
                username: config.mqtt_username.clone(),
                password: config.mqtt_password.clone(),
                qos: config.mqtt_qos,
            });
            (Some(source), Arc::new(subscriber))
        } else {
            (None, Arc::new(NoopSubscriber))
        };

    let monitor_config = MonitorConfig {
        offline_timeout: config.offline_timeout(),
        status_check_interval: config.status_check_interval(),
        ack_timeout: config.ack_timeout(),
        queue_capacity: config.monitor_queue_capacity,
        activity_capacity: config.activity_capacity,
    };
    let (monitor, monitor_task) = spawn_monitor(
        monitor_config,
        RelayDispatcher::new(publisher, shadow.clone()),
        subscriber,
        Arc::new(SystemClock),
    );

    // 重启后设备从 offline 开始，由后续信号重新推导
    let records = device_store.scan_devices().await?;
    let mut loaded = 0usize;
    for record in records {
        match monitor.load_device(record.to_profile()).await {
            Ok(_) => loaded += 1,
            Err(err) => warn!(
                target: "sentinel.api",
                tenant_id = %record.tenant_id,
                device_id = %record.device_id,
                error = %err,
                "device_load_failed"
            ),
        }
    }
    info!(target: "sentinel.api", devices = loaded, "devices_loaded");

    let ingest_task = ingest::spawn_ingest(
        source,
        shadow,
        monitor.clone(),
        config.shadow_poll_interval(),
    );

    let auth: Option<Arc<dyn Authenticator>> = config.jwt_secret.clone().map(|secret| {
        Arc::new(JwtManager::new(secret, ACCESS_TTL_SECONDS)) as Arc<dyn Authenticator>
    });
    if auth.is_none() {
        warn!(target: "sentinel.api", "jwt_disabled_trusting_gateway_headers");
    }

    let state = AppState {
        monitor: monitor.clone(),
        device_store,
        group_store,
        auth,
        connection_buffer: config.connection_buffer,
    };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    info!(target: "sentinel.api", addr = %config.http_addr, "http_listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ingest_task.abort();
    if let Err(err) = monitor.shutdown().await {
        warn!(target: "sentinel.api", error = %err, "monitor_shutdown_failed");
    }
    let _ = monitor_task.await;
    info!(target: "sentinel.api", "shutdown_complete");
    Ok(())
}

async fn open_stores(
    config: &AppConfig,
) -> Result<(Arc<dyn DeviceStore>, Arc<dyn GroupStore>), Box<dyn std::error::Error>> {
    match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_pool(url).await?;
            run_migrations(&pool).await?;
            info!(target: "sentinel.api", "postgres_storage_ready");
            Ok((
                Arc::new(PgDeviceStore::new(pool.clone())),
                Arc::new(PgGroupStore::new(pool)),
            ))
        }
        None => {
            warn!(target: "sentinel.api", "database_url_missing_using_in_memory_storage");
            Ok((
                Arc::new(InMemoryDeviceStore::new()),
                Arc::new(InMemoryGroupStore::new()),
            ))
        }
    }
}

/// MQTT 为主通道，配置了数据面时作为备用通道。
fn build_publisher(config: &AppConfig) -> Arc<dyn RelayPublisher> {
    let data_plane: Option<Arc<dyn RelayPublisher>> = config.data_plane_url.as_deref().map(|url| {
        Arc::new(HttpDataPlanePublisher::new(
            url,
            config.data_plane_token.clone(),
            config.mqtt_qos,
        )) as Arc<dyn RelayPublisher>
    });
    if config.mqtt_enabled {
        let mqtt = MqttPublisher::connect(MqttPublisherConfig {
            host: config.mqtt_host.clone(),
            port: config.mqtt_port,
            username: config.mqtt_username.clone(),
            password: config.mqtt_password.clone(),
            qos: config.mqtt_qos,
        });
        match mqtt {
            Ok((publisher, _eventloop)) => {
                return Arc::new(FallbackPublisher::new(Arc::new(publisher), data_plane));
            }
            Err(err) => {
                warn!(target: "sentinel.api", error = %err, "mqtt_publisher_unavailable");
            }
        }
    }
    match data_plane {
        Some(publisher) => publisher,
        None => {
            warn!(target: "sentinel.api", "no_command_channel_configured");
            Arc::new(NoopPublisher)
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(target: "sentinel.api", error = %err, "ctrl_c_listener_failed");
        std::future::pending::<()>().await;
    }
    info!(target: "sentinel.api", "shutdown_requested");
}
