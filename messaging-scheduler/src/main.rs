//! Process entrypoint (§4.7, §10.3), grounded on `basic-server/src/main.rs`'s minimal wiring —
//! upgraded to the multi-threaded runtime since this process runs concurrent per-tenant fan-out,
//! unlike the single-adapter demo binary it's grounded on.

mod unconfigured;

use std::sync::Arc;

use messaging_core::{App, AppState, Config, SchedulerKernel};
use messaging_generator::GeneratorContext;
use messaging_sender::SenderLoop;
use messaging_store_adapter_sqlite::MessageStoreSqlite;
use messaging_template::TemplateEngine;
use messaging_types::prelude::*;
use unconfigured::UnconfiguredCollaborator;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

	if let Err(err) = run().await {
		error!(%err, "fatal startup error");
		std::process::exit(1);
	}
}

async fn run() -> MessagingResult<()> {
	let config = Config::from_env()?;

	if let Some(path) = &config.template_constants_path {
		match std::fs::read_to_string(path) {
			Ok(_) => info!(path, "loaded template constants file"),
			Err(err) => warn!(path, %err, "could not read template constants file, continuing without it"),
		}
	}

	let message_store: Arc<dyn MessageStore> =
		Arc::new(MessageStoreSqlite::new(&config.message_db_url, &config.global_db_url).await?);

	let user_directory: Arc<dyn UserDirectory> =
		Arc::new(UnconfiguredCollaborator { addr: config.service_urls.user_directory.clone() });
	let study_service: Arc<dyn StudyService> =
		Arc::new(UnconfiguredCollaborator { addr: config.service_urls.study_service.clone() });
	let email_client: Arc<dyn EmailClient> =
		Arc::new(UnconfiguredCollaborator { addr: config.service_urls.email_client.clone() });
	let logging_service: Arc<dyn LoggingService> =
		Arc::new(UnconfiguredCollaborator { addr: config.service_urls.logging_service.clone() });

	let scheduler = SchedulerKernel::new();

	let app: App = Arc::new(AppState {
		config: config.clone(),
		scheduler: scheduler.clone(),
		message_store: Arc::clone(&message_store),
		user_directory: Arc::clone(&user_directory),
		study_service: Arc::clone(&study_service),
		email_client: Arc::clone(&email_client),
		logging_service,
	});

	let generator_ctx = GeneratorContext {
		message_store: Arc::clone(&app.message_store),
		user_directory: Arc::clone(&app.user_directory),
		study_service: Arc::clone(&app.study_service),
		template_engine: Arc::new(TemplateEngine::new()),
	};

	let high_prio_sender = Arc::new(SenderLoop {
		message_store: Arc::clone(&app.message_store),
		email_client: Arc::clone(&app.email_client),
		only_high_prio: true,
		period_secs: config.periods.high_prio_send,
	});
	let low_prio_sender = Arc::new(SenderLoop {
		message_store: Arc::clone(&app.message_store),
		email_client: Arc::clone(&app.email_client),
		only_high_prio: false,
		period_secs: config.periods.low_prio_send,
	});

	{
		let sender = Arc::clone(&high_prio_sender);
		scheduler.spawn("high-prio-send", config.periods.high_prio_send, move || {
			let sender = Arc::clone(&sender);
			async move { sender.tick().await }
		});
	}
	{
		let sender = Arc::clone(&low_prio_sender);
		scheduler.spawn("low-prio-send", config.periods.low_prio_send, move || {
			let sender = Arc::clone(&sender);
			async move { sender.tick().await }
		});
	}
	{
		let ctx = generator_ctx.clone();
		scheduler.spawn("auto-message-tick", config.periods.auto_message_tick, move || {
			let ctx = ctx.clone();
			async move { messaging_generator::tick_all_tenants_auto_messages(ctx).await }
		});
	}
	{
		let ctx = generator_ctx.clone();
		scheduler.spawn("participant-message-tick", config.periods.participant_message_tick, move || {
			let ctx = ctx.clone();
			async move { messaging_generator::tick_all_tenants_participant_messages(ctx).await }
		});
	}
	{
		let ctx = generator_ctx.clone();
		scheduler.spawn("researcher-notification-tick", config.periods.researcher_notification_tick, move || {
			let ctx = ctx.clone();
			async move { messaging_generator::tick_all_tenants_researcher_notifications(ctx).await }
		});
	}

	wait_for_shutdown_signal().await;
	scheduler.shutdown();
	info!("shutdown signal received, scheduler kernel stopped accepting new ticks");

	Ok(())
}

async fn wait_for_shutdown_signal() {
	#[cfg(unix)]
	{
		use tokio::signal::unix::{signal, SignalKind};
		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(s) => s,
			Err(err) => {
				warn!(%err, "could not install SIGTERM handler");
				let _ = tokio::signal::ctrl_c().await;
				return;
			}
		};
		tokio::select! {
			_ = tokio::signal::ctrl_c() => {}
			_ = sigterm.recv() => {}
		}
	}
	#[cfg(not(unix))]
	{
		let _ = tokio::signal::ctrl_c().await;
	}
}
