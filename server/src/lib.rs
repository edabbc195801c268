pub mod jobs;

use actix_web::{App, HttpResponse, HttpServer, web};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use utoipa_actix_web::AppExt;
use vulndash_common::{config, crypto::SecretCipher, db::Database};
use vulndash_module_alert::{AlertSender, AlertService};
use vulndash_module_importer::cpe::sync::CpeSyncJob;
use vulndash_module_ingestor::{scheduler::Processor, service::IngestService};
use vulndash_module_llm::ProviderRegistry;

/// Everything the API profile runs: the HTTP surface plus all background
/// loops, sharing one database handle and one shutdown token.
pub struct Server {
    db: Database,
    http: config::Http,
    cipher: SecretCipher,
    registry: Arc<ProviderRegistry>,
    cancel: CancellationToken,
}

impl Server {
    /// The encryption key is required here: this profile handles secrets.
    pub fn new(
        db: Database,
        http: config::Http,
        cancel: CancellationToken,
    ) -> Result<Self, anyhow::Error> {
        let cipher = SecretCipher::from_env()?;

        Ok(Self {
            db,
            http,
            cipher,
            registry: Arc::new(ProviderRegistry::default()),
            cancel,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let Self {
            db,
            http,
            cipher,
            registry,
            cancel,
        } = self;

        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let ingest = IngestService::new(db.clone(), events_tx);
        let processor = Processor::new(
            db.clone(),
            ingest.clone(),
            registry.clone(),
            cipher.clone(),
        );
        let sync = CpeSyncJob::new(db.clone());
        let alerts = AlertService::new(db.clone());
        let sender = AlertSender::new(db.clone(), cipher.clone());

        // background loops; each observes the shutdown token on its own
        let mut tasks = Vec::new();
        {
            let db = db.clone();
            let ingest = ingest.clone();
            let cipher = cipher.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                vulndash_module_importer::server::importer(db, ingest, cipher, cancel).await
            }));
        }
        {
            let processor = processor.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { processor.run(cancel).await }));
        }
        {
            let processor = processor.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(
                async move { processor.run_retention(cancel).await },
            ));
        }
        {
            let sync = sync.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { sync.run(cancel).await }));
        }
        {
            let alerts = alerts.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                alerts.run_listener(events_rx, cancel).await
            }));
        }
        {
            let sender = sender.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { sender.run(cancel).await }));
        }
        {
            let sender = sender.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move { sender.run_digest(cancel).await }));
        }

        let jobs = jobs::JobsContext::new(processor, sync, cancel.clone());

        let http_server = {
            let db = db.clone();
            let cipher = cipher.clone();
            let registry = registry.clone();

            HttpServer::new(move || {
                let db = db.clone();
                let cipher = cipher.clone();
                let registry = registry.clone();
                let ingest = ingest.clone();
                let jobs = jobs.clone();

                let (app, api) = App::new()
                    .into_utoipa_app()
                    .service(utoipa_actix_web::scope("/api").configure(|svc| {
                        // public, read-only (plus the remediation toggle)
                        vulndash_module_fundamental::vulnerability::endpoints::configure(
                            svc,
                            db.clone(),
                        );
                    }))
                    .service(utoipa_actix_web::scope("/admin").configure(|svc| {
                        // the only path tree accepting mutations; a future
                        // auth guard wraps exactly this scope
                        vulndash_module_importer::endpoints::configure(svc, db.clone());
                        vulndash_module_fundamental::product::endpoints::configure(
                            svc,
                            db.clone(),
                        );
                        vulndash_module_fundamental::review::endpoints::configure(
                            svc,
                            db.clone(),
                            ingest.clone(),
                        );
                        vulndash_module_fundamental::settings::endpoints::configure(
                            svc,
                            db.clone(),
                            cipher.clone(),
                            registry.clone(),
                        );
                        vulndash_module_fundamental::health::endpoints::configure(
                            svc,
                            db.clone(),
                            cipher.clone(),
                            registry.clone(),
                        );
                        vulndash_module_alert::endpoints::configure(
                            svc,
                            db.clone(),
                            cipher.clone(),
                        );
                        jobs::configure(svc, jobs.clone());
                    }))
                    .split_for_parts();

                app.route(
                    "/openapi.json",
                    web::get().to(move || {
                        let api = api.clone();
                        async move { HttpResponse::Ok().json(api) }
                    }),
                )
            })
            .bind(&http.bind)?
            .run()
        };

        log::info!("listening on {}", http.bind);

        let handle = http_server.handle();
        let shutdown = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancelled().await;
                handle.stop(true).await;
            })
        };

        let result = http_server.await;

        // HTTP is down; stop the loops and let them drain
        cancel.cancel();
        for task in tasks {
            if let Err(err) = task.await {
                log::warn!("background task panicked: {err}");
            }
        }
        shutdown.abort();

        Ok(result?)
    }
}
