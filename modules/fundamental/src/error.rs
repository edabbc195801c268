use actix_web::{HttpResponse, ResponseError, body::BoxBody};
use sea_orm::DbErr;
use std::borrow::Cow;
use vulndash_common::error::ErrorInformation;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Ingestor(#[from] vulndash_module_ingestor::service::Error),
    #[error("Bad request: {0}: {1:?}")]
    BadRequest(Cow<'static, str>, Option<Cow<'static, str>>),
    #[error("Conflict: {0}")]
    Conflict(Cow<'static, str>),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("revision not found")]
    RevisionNotFound,
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl Error {
    pub fn bad_request(
        message: impl Into<Cow<'static, str>>,
        details: Option<impl Into<Cow<'static, str>>>,
    ) -> Self {
        Self::BadRequest(message.into(), details.map(|d| d.into()))
    }
}

impl ResponseError for Error {
    fn error_response(&self) -> HttpResponse<BoxBody> {
        match self {
            Self::BadRequest(message, details) => {
                HttpResponse::BadRequest().json(ErrorInformation {
                    error: "BadRequest".into(),
                    message: message.to_string(),
                    details: details.as_ref().map(|d| d.to_string()),
                })
            }
            Self::Conflict(msg) => {
                HttpResponse::Conflict().json(ErrorInformation::new("Conflict", msg))
            }
            Self::NotFound(msg) => {
                HttpResponse::NotFound().json(ErrorInformation::new("NotFound", msg))
            }
            Self::RevisionNotFound => HttpResponse::PreconditionFailed()
                .json(ErrorInformation::new("RevisionNotFound", self)),
            Self::Ingestor(inner) => match inner {
                vulndash_module_ingestor::service::Error::NotFound(msg) => {
                    HttpResponse::NotFound().json(ErrorInformation::new("NotFound", msg))
                }
                vulndash_module_ingestor::service::Error::BadRequest(msg) => {
                    HttpResponse::BadRequest().json(ErrorInformation::new("BadRequest", msg))
                }
                vulndash_module_ingestor::service::Error::Conflict(msg) => {
                    HttpResponse::Conflict().json(ErrorInformation::new("Conflict", msg))
                }
                err => {
                    log::warn!("{err}");
                    HttpResponse::InternalServerError().json(ErrorInformation::new("Internal", ""))
                }
            },

            // All other cases are internal system errors that are not expected
            // to occur. They are logged and a generic error response is
            // returned to avoid leaking internal state to end users.
            err => {
                log::warn!("{err}");
                HttpResponse::InternalServerError().json(ErrorInformation::new("Internal", ""))
            }
        }
    }
}
