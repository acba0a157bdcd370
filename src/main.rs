use anyhow::{Context, Result};
use clap::Parser;
use schemapi::data::put_value;
use schemapi::mapper::{AnnotationField, LabelField, object_mappers};
use schemapi::{
    ApiServer, Field, Filter, MemoryClient, Object, ProxyStore, Schema, Schemas, Scope, ServerConfig,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Demo API server serving namespaced widgets from memory.
#[derive(Parser, Debug)]
#[command(name = "schemapi", version)]
struct Cli {
    /// Listen address, overrides SCHEMAPI_BIND_ADDR.
    #[arg(long)]
    bind: Option<String>,

    /// Overrides SCHEMAPI_DEFAULT_NAMESPACE.
    #[arg(long)]
    default_namespace: Option<String>,

    /// Version path prefix, overrides SCHEMAPI_API_VERSION.
    #[arg(long)]
    api_version: Option<String>,

    /// Overrides SCHEMAPI_MAX_BODY_BYTES.
    #[arg(long)]
    max_body_bytes: Option<usize>,

    /// Start with a few sample widgets.
    #[arg(long)]
    seed: bool,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(namespace) = &self.default_namespace {
            config.default_namespace = namespace.clone();
        }
        if let Some(version) = &self.api_version {
            config.api_version = version.clone();
        }
        if let Some(max) = self.max_body_bytes {
            config.max_body_bytes = max;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = ServerConfig::from_env().context("failed to load server configuration")?;
    cli.apply(&mut config);
    config.validate()?;

    let client = Arc::new(MemoryClient::new());
    if cli.seed {
        seed(&client).await;
    }

    let server = config
        .apply(ApiServer::builder(widget_schemas(client)))
        .build()
        .context("invalid schema registry")?;
    let app = server.router();

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_addr))?;
    info!(address = %config.bind_addr, version = %config.version_path(), "schemapi started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn widget_schemas(client: Arc<MemoryClient>) -> Schemas {
    let mut schemas = Schemas::new();
    schemas
        .add_schema(
            Schema::new("objectMeta")
                .with_collection_methods(&[])
                .with_resource_methods(&[])
                .with_field("name", Field::new("dnsLabel").creatable())
                .with_field("namespace", Field::new("dnsLabel").creatable())
                .with_field("labels", Field::new("map[string]").writable())
                .with_field("annotations", Field::new("map[string]").writable())
                .with_field("resourceVersion", Field::new("string").updatable())
                .with_field("creationTimestamp", Field::new("date")),
        )
        .add_schema(
            Schema::new("widgetSpec")
                .with_collection_methods(&[])
                .with_resource_methods(&[])
                .with_field("size", Field::new("int").writable().with_range(Some(0), Some(100)))
                .with_field(
                    "color",
                    Field::new("enum")
                        .writable()
                        .with_options(["red", "green", "blue"])
                        .with_default("red"),
                ),
        )
        .add_schema(
            Schema::new("widget")
                .with_scope(Scope::Namespace)
                .with_field("metadata", Field::new("objectMeta"))
                .with_field("spec", Field::new("widgetSpec"))
                .with_field("status", Field::new("json"))
                .with_field("kind", Field::new("string"))
                .with_field("apiVersion", Field::new("string"))
                .with_field("description", Field::new("string").writable())
                .with_field("tier", Field::new("string").writable())
                .with_filter("name", Filter::all())
                .with_filter("color", Filter::default())
                .with_filter("size", Filter::all())
                .with_mapper(Arc::new(object_mappers(vec![
                    Arc::new(AnnotationField::new("description")),
                    Arc::new(LabelField::new("tier")),
                ])))
                .with_store(Arc::new(ProxyStore::new(client, "Widget", "demo.schemapi.io/v1"))),
        );
    schemas
}

async fn seed(client: &MemoryClient) {
    for (name, size, color) in [("alpha", 1, "red"), ("beta", 5, "green"), ("gamma", 9, "blue")] {
        let mut object = Object::new();
        object.insert("kind".into(), Value::from("Widget"));
        object.insert("apiVersion".into(), Value::from("demo.schemapi.io/v1"));
        put_value(&mut object, Value::from(name), &["metadata", "name"]);
        put_value(&mut object, Value::from(size), &["spec", "size"]);
        put_value(&mut object, Value::from(color), &["spec", "color"]);
        client.insert(Some("default"), object).await;
    }
    info!("seeded 3 widgets in namespace default");
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutting down");
}
