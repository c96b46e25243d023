use std::sync::Arc;

use actix_web::HttpServer;
use clap::Parser;
use files_service::config::Opt;
use files_service::state::AppState;
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();
    init_tracing(&opt);

    let state = Arc::new(AppState::bootstrap(&opt)?);
    spawn_background_jobs(state.clone(), &opt);

    tracing::info!(addr = %opt.http_addr, "starting files service");
    HttpServer::new({
        let state = state.clone();
        move || files_service::create_app(state.clone())
    })
    .bind(opt.http_addr)?
    .run()
    .await?;

    Ok(())
}

fn init_tracing(opt: &Opt) {
    let filter = EnvFilter::try_new(&opt.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if opt.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn spawn_background_jobs(state: Arc<AppState>, opt: &Opt) {
    {
        let pipeline = state.event_ingestion.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run_analysis_updates().await {
                tracing::error!(error = %e, "analysis-update consumer exited");
            }
        });
    }
    {
        let pipeline = state.event_ingestion.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run_clinical_updates().await {
                tracing::error!(error = %e, "clinical-update consumer exited");
            }
        });
    }
    if opt.recalculate_topic.is_some() {
        let pipeline = state.event_ingestion.clone();
        tokio::spawn(async move {
            if let Err(e) = pipeline.run_recalculate_trigger().await {
                tracing::error!(error = %e, "recalculate-trigger consumer exited");
            }
        });
    } else {
        let pipeline = state.event_ingestion.clone();
        let interval_secs = opt.recalculation_interval_secs;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                interval.tick().await;
                if let Err(e) = pipeline.run_recalculation().await {
                    tracing::error!(error = %e, "periodic recalculation pass failed");
                }
            }
        });
    }
}
