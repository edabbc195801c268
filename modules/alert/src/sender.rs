use crate::{service::Error, template};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType,
    transport::smtp::authentication::Credentials,
};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use std::{collections::BTreeMap, time::Duration};
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use vulndash_common::{
    crypto::SecretCipher,
    db::Database,
    settings::{self, NotificationSettings, SmtpSettings},
};
use vulndash_entity::{
    email_alert::{self, Status},
    setting, vulnerability,
};

const SEND_TICK: Duration = Duration::from_secs(5 * 60);
const DIGEST_TICK: Duration = Duration::from_secs(60 * 60);

/// Background delivery of queued alerts.
///
/// SMTP failure marks the affected row and goes no further; there is no
/// automatic retry, re-queueing is a manual admin action.
#[derive(Clone)]
pub struct AlertSender {
    db: Database,
    cipher: SecretCipher,
}

impl AlertSender {
    pub fn new(db: Database, cipher: SecretCipher) -> Self {
        Self { db, cipher }
    }

    /// The send loop: every five minutes, deliver pending single alerts.
    /// Paused while digests are enabled.
    pub async fn run(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(SEND_TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            match self.send_pending().await {
                Ok(0) => {}
                Ok(sent) => log::info!("delivered {sent} alerts"),
                Err(err) => log::error!("alert delivery failed: {err}"),
            }
        }

        Ok(())
    }

    /// The digest loop: batch everything pending per recipient once the
    /// digest period has elapsed.
    pub async fn run_digest(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let mut interval = tokio::time::interval(DIGEST_TICK);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut last_digest: Option<OffsetDateTime> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let config = setting::fetch::<NotificationSettings>(
                settings::NOTIFICATIONS,
                &*self.db,
            )
            .await?;

            if !config.digest_enabled {
                continue;
            }

            let due = match last_digest {
                None => true,
                Some(last) => {
                    OffsetDateTime::now_utc() - last
                        >= time::Duration::hours(config.digest_hours as i64)
                }
            };
            if !due {
                continue;
            }

            match self.send_digests().await {
                Ok(sent) => {
                    last_digest = Some(OffsetDateTime::now_utc());
                    if sent > 0 {
                        log::info!("delivered {sent} digest emails");
                    }
                }
                Err(err) => log::error!("digest delivery failed: {err}"),
            }
        }

        Ok(())
    }

    /// Deliver every pending alert individually. No-op while digests are
    /// enabled, those rows wait for the digest loop.
    #[instrument(skip_all, err)]
    pub async fn send_pending(&self) -> Result<u64, Error> {
        let notifications =
            setting::fetch::<NotificationSettings>(settings::NOTIFICATIONS, &*self.db).await?;
        if notifications.digest_enabled {
            return Ok(0);
        }

        let smtp = setting::fetch::<SmtpSettings>(settings::SMTP, &*self.db).await?;
        let transport = self.transport(&smtp)?;

        let pending = self.pending().await?;

        let mut sent = 0;
        for (alert, vuln) in pending {
            let Some(vuln) = vuln else {
                self.mark(alert.id, Status::Failed, Some("curated record disappeared".into()), false)
                    .await?;
                continue;
            };

            let (subject, body) = template::render_alert(alert.alert_type, &vuln);

            match self
                .deliver(&transport, &smtp, &alert.recipient, &subject, body)
                .await
            {
                Ok(()) => {
                    self.mark(alert.id, Status::Sent, None, false).await?;
                    sent += 1;
                }
                Err(err) => {
                    log::warn!("sending alert {} failed: {err}", alert.id);
                    self.mark(alert.id, Status::Failed, Some(err.to_string()), false)
                        .await?;
                }
            }
        }

        Ok(sent)
    }

    /// One digest email per recipient with pending alerts.
    #[instrument(skip_all, err)]
    pub async fn send_digests(&self) -> Result<u64, Error> {
        let smtp = setting::fetch::<SmtpSettings>(settings::SMTP, &*self.db).await?;
        let transport = self.transport(&smtp)?;

        let pending = self.pending().await?;

        let mut by_recipient: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for (alert, vuln) in pending {
            if let Some(vuln) = vuln {
                by_recipient
                    .entry(alert.recipient.clone())
                    .or_default()
                    .push((alert, vuln));
            }
        }

        let mut sent = 0;
        for (recipient, entries) in by_recipient {
            let rendered: Vec<_> = entries
                .iter()
                .map(|(alert, vuln)| (alert.alert_type, vuln.clone()))
                .collect();
            let (subject, body) = template::render_digest(&rendered);

            match self
                .deliver(&transport, &smtp, &recipient, &subject, body)
                .await
            {
                Ok(()) => {
                    for (alert, _) in entries {
                        self.mark(alert.id, Status::Sent, None, true).await?;
                    }
                    sent += 1;
                }
                Err(err) => {
                    log::warn!("digest for {recipient} failed: {err}");
                    for (alert, _) in entries {
                        self.mark(alert.id, Status::Failed, Some(err.to_string()), false)
                            .await?;
                    }
                }
            }
        }

        Ok(sent)
    }

    /// Probe the configured SMTP endpoint.
    pub async fn test_connection(&self) -> Result<bool, Error> {
        let smtp = setting::fetch::<SmtpSettings>(settings::SMTP, &*self.db).await?;
        let transport = self.transport(&smtp)?;

        transport
            .test_connection()
            .await
            .map_err(|err| Error::Smtp(err.to_string()))
    }

    async fn pending(
        &self,
    ) -> Result<Vec<(email_alert::Model, Option<vulnerability::Model>)>, Error> {
        Ok(email_alert::Entity::find()
            .filter(email_alert::Column::Status.eq(Status::Pending))
            .order_by_asc(email_alert::Column::CreatedAt)
            .find_also_related(vulnerability::Entity)
            .all(&*self.db)
            .await?)
    }

    async fn mark(
        &self,
        id: uuid::Uuid,
        status: Status,
        error: Option<String>,
        via_digest: bool,
    ) -> Result<(), Error> {
        let update = email_alert::ActiveModel {
            id: Set(id),
            status: Set(status),
            error: Set(error),
            sent_via_digest: Set(via_digest),
            sent_at: Set((status == Status::Sent).then(OffsetDateTime::now_utc)),
            ..Default::default()
        };
        email_alert::Entity::update(update).exec(&*self.db).await?;

        Ok(())
    }

    fn transport(&self, smtp: &SmtpSettings) -> Result<AsyncSmtpTransport<Tokio1Executor>, Error> {
        let mut builder = if smtp.tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
                .map_err(|err| Error::Smtp(err.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp.host)
        };

        builder = builder.port(smtp.port);

        if let Some(username) = &smtp.username {
            let password = match &smtp.password_enc {
                Some(encrypted) => self
                    .cipher
                    .decrypt(encrypted)
                    .map_err(|err| Error::Smtp(err.to_string()))?,
                None => String::new(),
            };
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        Ok(builder.build())
    }

    async fn deliver(
        &self,
        transport: &AsyncSmtpTransport<Tokio1Executor>,
        smtp: &SmtpSettings,
        recipient: &str,
        subject: &str,
        body: String,
    ) -> Result<(), Error> {
        let message = Message::builder()
            .from(
                smtp.from
                    .parse()
                    .map_err(|err| Error::Smtp(format!("invalid from address: {err}")))?,
            )
            .to(recipient
                .parse()
                .map_err(|err| Error::Smtp(format!("invalid recipient: {err}")))?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|err| Error::Smtp(err.to_string()))?;

        transport
            .send(message)
            .await
            .map_err(|err| Error::Smtp(err.to_string()))?;

        Ok(())
    }
}
